/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Two-step instruction identification and decoding (C8, spec.md §4.8).
//! Shared by the simulator (fetch, against live memory) and the
//! disassembler (against a fixed byte buffer, which additionally reports
//! `DecodeError::ShortRead` when the buffer runs out).

use crate::errors::DecodeError;
use crate::model::raw::Endianness;
use crate::model::{InstrIdx, Instruction, Model, OperandDescriptor};
use crate::rtl::eval::{Memory, mask};
use std::collections::{BTreeMap, HashMap};

/// One decoded instruction, with recursively decoded slot contents if it
/// carries a bundle format.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub instr: InstrIdx,
    pub width: u32,
    pub operands: HashMap<String, u128>,
    pub slots: Vec<Decoded>,
}

fn candidate_ids(model: &Model, allow_bundles: bool) -> Vec<InstrIdx> {
    model
        .instructions
        .iter()
        .enumerate()
        .filter(|(_, ins)| allow_bundles || ins.bundle_format.is_none())
        .map(|(i, _)| InstrIdx(i as u32))
        .collect()
}

fn width_groups(model: &Model, allow_bundles: bool) -> BTreeMap<u32, Vec<InstrIdx>> {
    let mut groups: BTreeMap<u32, Vec<InstrIdx>> = BTreeMap::new();
    for idx in candidate_ids(model, allow_bundles) {
        let w = model.format_at(model.instruction_at(idx).format).width;
        groups.entry(w).or_default().push(idx);
    }
    groups
}

fn matches(model: &Model, instr: &Instruction, loaded: u128) -> bool {
    let format = model.format_at(instr.format);
    for name in &format.identification_fields {
        let Some(field) = format.field(name) else { continue };
        let expected = field.constant.or_else(|| instr.encoding.iter().find(|(n, _)| n == name).map(|(_, v)| *v));
        let Some(expected) = expected else { continue };
        let actual = (loaded >> field.lsb) & mask(field.width());
        if actual != expected as u128 {
            return false;
        }
    }
    true
}

/// Step 1-5 of spec.md §4.8 against a generic bit loader: widen the load
/// width group by group until exactly one candidate of that width matches.
fn identify_progressive(
    model: &Model,
    allow_bundles: bool,
    mut load: impl FnMut(u32) -> Result<u128, DecodeError>,
) -> Result<(InstrIdx, u32), DecodeError> {
    for (&width, group) in width_groups(model, allow_bundles).iter() {
        let loaded = load(width)?;
        let matched: Vec<InstrIdx> =
            group.iter().copied().filter(|&idx| matches(model, model.instruction_at(idx), loaded)).collect();
        match matched.len() {
            0 => continue,
            1 => return Ok((matched[0], width)),
            _ => {
                let names = matched.iter().map(|&i| model.instruction_at(i).name.clone()).collect();
                return Err(DecodeError::Ambiguous(names, width));
            }
        }
    }
    Err(DecodeError::NoMatch)
}

/// Slot-local identification considers only instructions whose format width
/// equals the slot width exactly, and excludes bundle instructions
/// (spec.md §4.8 "recursion barred one level deep").
fn identify_exact(model: &Model, loaded: u128, width: u32) -> Result<InstrIdx, DecodeError> {
    let matched: Vec<InstrIdx> = candidate_ids(model, false)
        .into_iter()
        .filter(|&idx| model.format_at(model.instruction_at(idx).format).width == width)
        .filter(|&idx| matches(model, model.instruction_at(idx), loaded))
        .collect();
    match matched.len() {
        0 => Err(DecodeError::NoMatch),
        1 => Ok(matched[0]),
        _ => {
            let names = matched.iter().map(|&i| model.instruction_at(i).name.clone()).collect();
            Err(DecodeError::Ambiguous(names, width))
        }
    }
}

pub fn extract_operands(model: &Model, instr: &Instruction, loaded: u128) -> HashMap<String, u128> {
    let format = model.format_at(instr.format);
    let mut out = HashMap::new();
    for op in &instr.operands {
        match op {
            OperandDescriptor::Simple(name) => {
                let field = format.field(name).expect("operand field resolved during validation");
                out.insert(name.clone(), (loaded >> field.lsb) & mask(field.width()));
            }
            OperandDescriptor::Distributed { name, fields } => {
                let mut value: u128 = 0;
                let mut shift = 0u32;
                for fname in fields {
                    let field = format.field(fname).expect("operand field resolved during validation");
                    let piece = (loaded >> field.lsb) & mask(field.width());
                    value |= piece << shift;
                    shift += field.width();
                }
                out.insert(name.clone(), value);
            }
        }
    }
    out
}

fn load_word_mem(memory: &Memory, endianness: Endianness, addr: u64, width_bits: u32) -> u128 {
    let bytes = (width_bits + 7) / 8;
    memory.read(addr, bytes, endianness) & mask(width_bits)
}

fn load_word_buf(buf: &[u8], offset: usize, width_bits: u32, endianness: Endianness) -> Result<u128, DecodeError> {
    let bytes = ((width_bits + 7) / 8) as usize;
    if offset + bytes > buf.len() {
        return Err(DecodeError::ShortRead { needed: width_bits, available: ((buf.len() - offset.min(buf.len())) * 8) as u32 });
    }
    let mut value: u128 = 0;
    for i in 0..bytes {
        let byte = buf[offset + i] as u128;
        let shift = match endianness {
            Endianness::Little => i * 8,
            Endianness::Big => (bytes - 1 - i) * 8,
        };
        value |= byte << shift;
    }
    Ok(value & mask(width_bits))
}

fn decode_from(
    model: &Model,
    instr_idx: InstrIdx,
    full_width: u32,
    loaded: u128,
    bundle_bits: Option<(u32, u128)>,
) -> Result<Decoded, DecodeError> {
    let instr = model.instruction_at(instr_idx);
    let operands = extract_operands(model, instr, loaded);

    let Some(bf_idx) = instr.bundle_format else {
        return Ok(Decoded { instr: instr_idx, width: full_width, operands, slots: vec![] });
    };
    let bf = model.bundle_format_at(bf_idx);
    let (bundle_width, bundle_loaded) = bundle_bits.expect("bundle instruction requires bundle-width bits");
    debug_assert_eq!(bundle_width, bf.width);

    let mut slots = Vec::with_capacity(bf.slots.len());
    for slot in &bf.slots {
        let slot_width = slot.width();
        let slot_bits = (bundle_loaded >> slot.lsb) & mask(slot_width);
        let sub_idx = identify_exact(model, slot_bits, slot_width)?;
        let sub_instr = model.instruction_at(sub_idx);
        let sub_operands = extract_operands(model, sub_instr, slot_bits);
        slots.push(Decoded { instr: sub_idx, width: slot_width, operands: sub_operands, slots: vec![] });
    }
    Ok(Decoded { instr: instr_idx, width: bundle_width, operands, slots })
}

/// Fetch + identify + decode at a live-memory address (used by the
/// simulator). Memory reads of unwritten bytes are zero, so this never
/// short-reads; it can still fail with `NoMatch`/`Ambiguous`.
pub fn decode_at(model: &Model, memory: &Memory, addr: u64) -> Result<Decoded, DecodeError> {
    let (idx, _w_min) = identify_progressive(model, true, |w| Ok(load_word_mem(memory, model.endianness, addr, w)))?;
    let instr = model.instruction_at(idx);
    let format_width = model.format_at(instr.format).width;
    let loaded = load_word_mem(memory, model.endianness, addr, format_width);
    let bundle_bits = instr.bundle_format.map(|bf_idx| {
        let bw = model.bundle_format_at(bf_idx).width;
        (bw, load_word_mem(memory, model.endianness, addr, bw))
    });
    decode_from(model, idx, format_width, loaded, bundle_bits)
}

/// Fetch + identify + decode against a fixed byte buffer at `offset`
/// (used by the disassembler), reporting `ShortRead` if the buffer runs
/// out before a full-width load can be made.
pub fn decode_in_buffer(model: &Model, buf: &[u8], offset: usize) -> Result<Decoded, DecodeError> {
    let (idx, _w_min) = identify_progressive(model, true, |w| load_word_buf(buf, offset, w, model.endianness))?;
    let instr = model.instruction_at(idx);
    let format_width = model.format_at(instr.format).width;
    let loaded = load_word_buf(buf, offset, format_width, model.endianness)?;
    let bundle_bits = match instr.bundle_format {
        Some(bf_idx) => {
            let bw = model.bundle_format_at(bf_idx).width;
            Some((bw, load_word_buf(buf, offset, bw, model.endianness)?))
        }
        None => None,
    };
    decode_from(model, idx, format_width, loaded, bundle_bits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::raw::*;
    use crate::model::{Format, FormatField, Instruction as ModelInstruction, Model, OperandDescriptor as ModelOperand, Register};
    use std::collections::BTreeMap as StdBTreeMap;

    fn demo_model() -> Model {
        let format = Format {
            name: "R_TYPE".into(),
            width: 16,
            fields: vec![
                FormatField { name: "opcode".into(), lsb: 0, msb: 3, constant: None },
                FormatField { name: "rd".into(), lsb: 4, msb: 7, constant: None },
            ],
            identification_fields: vec!["opcode".to_string()],
        };
        let mut add_encoding = StdBTreeMap::new();
        add_encoding.insert("opcode".to_string(), 1u64);
        let mut sub_encoding = StdBTreeMap::new();
        sub_encoding.insert("opcode".to_string(), 2u64);

        let add = ModelInstruction {
            name: "ADD".into(),
            format: crate::model::FormatIdx(0),
            bundle_format: None,
            encoding: add_encoding.into_iter().collect(),
            operands: vec![ModelOperand::Simple("rd".into())],
            syntax: None,
            behavior: None,
            external_behavior: false,
        };
        let sub = ModelInstruction {
            name: "SUB".into(),
            format: crate::model::FormatIdx(0),
            bundle_format: None,
            encoding: sub_encoding.into_iter().collect(),
            operands: vec![ModelOperand::Simple("rd".into())],
            syntax: None,
            behavior: None,
            external_behavior: false,
        };

        Model::new(
            "Demo".into(),
            16,
            Endianness::Little,
            Vec::<Register>::new(),
            vec![format],
            vec![],
            vec![add, sub],
            vec![],
        )
    }

    #[test]
    fn identifies_unique_instruction_by_opcode() {
        let model = demo_model();
        let mut memory = Memory::new();
        // opcode=1 (ADD), rd=5
        memory.write(0, 2, 0x0051, Endianness::Little);
        let decoded = decode_at(&model, &memory, 0).unwrap();
        assert_eq!(model.instruction_at(decoded.instr).name, "ADD");
        assert_eq!(decoded.operands["rd"], 5);
    }

    #[test]
    fn no_match_when_opcode_unknown() {
        let model = demo_model();
        let mut memory = Memory::new();
        memory.write(0, 2, 0x00F0, Endianness::Little);
        assert_eq!(decode_at(&model, &memory, 0).unwrap_err(), DecodeError::NoMatch);
    }

    #[test]
    fn buffer_decode_short_reads_at_end_of_input() {
        let model = demo_model();
        let buf = [0x01u8];
        assert!(matches!(decode_in_buffer(&model, &buf, 0).unwrap_err(), DecodeError::ShortRead { .. }));
    }
}
