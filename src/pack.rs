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

//! Instruction encoding (C7, spec.md §4.7): build the bit pattern for an
//! instruction and its operand values, or for a bundle's slots.

use crate::errors::EncodeError;
use crate::model::{Format, Instruction, Model, OperandDescriptor};
use crate::rtl::eval::mask;
use std::collections::HashMap;

fn write_field_bits(word: &mut u128, lsb: u32, width: u32, value: u128, field_name: &str) -> Result<(), EncodeError> {
    if value > mask(width) {
        return Err(EncodeError::FieldOverflow { field: field_name.to_string(), width });
    }
    if *word & (mask(width) << lsb) != 0 {
        return Err(EncodeError::Overwrite { field: field_name.to_string() });
    }
    *word |= value << lsb;
    Ok(())
}

fn apply_format_constants(format: &Format, word: &mut u128) -> Result<(), EncodeError> {
    for field in &format.fields {
        if let Some(c) = field.constant {
            write_field_bits(word, field.lsb, field.width(), c as u128, &field.name)?;
        }
    }
    Ok(())
}

fn apply_encoding_overrides(format: &Format, instr: &Instruction, word: &mut u128) -> Result<(), EncodeError> {
    for (name, value) in &instr.encoding {
        let field = format
            .field(name)
            .unwrap_or_else(|| panic!("encoding references unknown field `{name}`; should have been caught by validation"));
        write_field_bits(word, field.lsb, field.width(), *value as u128, name)?;
    }
    Ok(())
}

fn apply_operands(format: &Format, instr: &Instruction, operand_values: &HashMap<String, u128>, word: &mut u128) -> Result<(), EncodeError> {
    for op in &instr.operands {
        let value = *operand_values
            .get(op.name())
            .unwrap_or_else(|| panic!("missing value for operand `{}`", op.name()));
        match op {
            OperandDescriptor::Simple(name) => {
                let field = format.field(name).expect("operand field resolved during validation");
                write_field_bits(word, field.lsb, field.width(), value, name)?;
            }
            OperandDescriptor::Distributed { fields, .. } => {
                let mut shift = 0u32;
                for fname in fields {
                    let field = format.field(fname).expect("operand field resolved during validation");
                    let piece = (value >> shift) & mask(field.width());
                    write_field_bits(word, field.lsb, field.width(), piece, fname)?;
                    shift += field.width();
                }
            }
        }
    }
    Ok(())
}

/// Encode one (non-bundled) instruction: zero word, apply format constants,
/// apply instruction-level encoding overrides, then apply operand values,
/// per the five steps of spec.md §4.7.
pub fn pack_instruction(model: &Model, instr: &Instruction, operand_values: &HashMap<String, u128>) -> Result<u128, EncodeError> {
    let format = model.format_at(instr.format);
    let mut word: u128 = 0;
    apply_format_constants(format, &mut word)?;
    apply_encoding_overrides(format, instr, &mut word)?;
    apply_operands(format, instr, operand_values, &mut word)?;
    Ok(word)
}

/// Encode a bundle: the bundle instruction's own identification bits are
/// packed normally (its format's field offsets are already absolute
/// within the bundle word — `instruction_start` only marks where that
/// format ends for validation purposes, it is not a shift); each
/// sub-instruction is packed to its own format width and OR'd into its
/// slot's bit range. `BundleFitError` if a sub-instruction's encoded width
/// exceeds its slot.
pub fn pack_bundle(
    model: &Model,
    bundle_instr: &Instruction,
    bundle_instr_operands: &HashMap<String, u128>,
    subs: &[(&Instruction, HashMap<String, u128>)],
) -> Result<u128, EncodeError> {
    let bf_idx = bundle_instr.bundle_format.expect("pack_bundle called on a non-bundle instruction");
    let bundle_format = model.bundle_format_at(bf_idx);

    let mut word: u128 = pack_instruction(model, bundle_instr, bundle_instr_operands)?;

    for (slot, (sub_instr, sub_operands)) in bundle_format.slots.iter().zip(subs.iter()) {
        let sub_format = model.format_at(sub_instr.format);
        if sub_format.width > slot.width() {
            return Err(EncodeError::BundleFitError {
                sub: sub_instr.name.clone(),
                sub_width: sub_format.width,
                slot: slot.name.clone(),
                slot_width: slot.width(),
            });
        }
        let sub_bits = pack_instruction(model, sub_instr, sub_operands)?;
        if (word >> slot.lsb) & mask(slot.width()) != 0 {
            return Err(EncodeError::Overwrite { field: slot.name.clone() });
        }
        word |= sub_bits << slot.lsb;
    }

    Ok(word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::raw::Endianness;
    use crate::model::{Format, FormatField, Instruction as ModelInstruction, OperandDescriptor as ModelOperand, Register};
    use std::collections::BTreeMap;

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
        let mut add_encoding = BTreeMap::new();
        add_encoding.insert("opcode".to_string(), 1u64);
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
        Model::new("Demo".into(), 16, Endianness::Little, Vec::<Register>::new(), vec![format], vec![], vec![add], vec![])
    }

    #[test]
    fn packs_opcode_and_operand_into_expected_word() {
        let model = demo_model();
        let instr = model.instruction("ADD").unwrap();
        let mut ops = HashMap::new();
        ops.insert("rd".to_string(), 5u128);
        let word = pack_instruction(&model, instr, &ops).unwrap();
        assert_eq!(word, 0x0051);
    }

    #[test]
    fn overflowing_operand_value_is_rejected() {
        let model = demo_model();
        let instr = model.instruction("ADD").unwrap();
        let mut ops = HashMap::new();
        ops.insert("rd".to_string(), 16u128); // rd field is 4 bits wide, max 15
        assert!(matches!(pack_instruction(&model, instr, &ops), Err(EncodeError::FieldOverflow { .. })));
    }

    // Mirrors spec.md §8 Scenario 3: an 8-bit identification format whose
    // 0xFF opcode must land in bits[0:7] regardless of `instruction_start`,
    // with two 8-bit sub-instructions packed into the slots above it.
    fn demo_bundle_model() -> Model {
        let id_format = Format {
            name: "BUNDLE_ID".into(),
            width: 8,
            fields: vec![FormatField { name: "opcode".into(), lsb: 0, msb: 7, constant: None }],
            identification_fields: vec!["opcode".to_string()],
        };
        let sub_format = Format {
            name: "SUB".into(),
            width: 8,
            fields: vec![
                FormatField { name: "op".into(), lsb: 0, msb: 3, constant: None },
                FormatField { name: "rd".into(), lsb: 4, msb: 7, constant: None },
            ],
            identification_fields: vec!["op".to_string()],
        };
        let bundle_format = crate::model::BundleFormat {
            name: "BUNDLE_24".into(),
            width: 24,
            slots: vec![
                crate::model::Slot { name: "slot0".into(), lsb: 8, msb: 15 },
                crate::model::Slot { name: "slot1".into(), lsb: 16, msb: 23 },
            ],
            instruction_start: Some(8),
            identification_fields: vec!["opcode".to_string()],
        };
        let bundle_instr = ModelInstruction {
            name: "BUNDLE".into(),
            format: crate::model::FormatIdx(0),
            bundle_format: Some(crate::model::BundleFormatIdx(0)),
            encoding: vec![("opcode".to_string(), 0xFF)],
            operands: vec![],
            syntax: None,
            behavior: None,
            external_behavior: false,
        };
        let add = ModelInstruction {
            name: "ADD".into(),
            format: crate::model::FormatIdx(1),
            bundle_format: None,
            encoding: vec![("op".to_string(), 1)],
            operands: vec![ModelOperand::Simple("rd".into())],
            syntax: None,
            behavior: None,
            external_behavior: false,
        };
        let sub = ModelInstruction {
            name: "SUB".into(),
            format: crate::model::FormatIdx(1),
            bundle_format: None,
            encoding: vec![("op".to_string(), 2)],
            operands: vec![ModelOperand::Simple("rd".into())],
            syntax: None,
            behavior: None,
            external_behavior: false,
        };
        Model::new(
            "Bundle".into(),
            24,
            Endianness::Little,
            Vec::<Register>::new(),
            vec![id_format, sub_format],
            vec![bundle_format],
            vec![bundle_instr, add, sub],
            vec![],
        )
    }

    #[test]
    fn bundle_identification_bits_land_unshifted_at_instruction_start() {
        let model = demo_bundle_model();
        let bundle_instr = model.instruction("BUNDLE").unwrap();
        let add = model.instruction("ADD").unwrap();
        let sub = model.instruction("SUB").unwrap();

        let mut add_ops = HashMap::new();
        add_ops.insert("rd".to_string(), 3u128);
        let mut sub_ops = HashMap::new();
        sub_ops.insert("rd".to_string(), 5u128);

        let word = pack_bundle(&model, bundle_instr, &HashMap::new(), &[(add, add_ops), (sub, sub_ops)]).unwrap();

        // lowest byte is the 0xFF identifier, unshifted.
        assert_eq!(word & 0xFF, 0xFF);
        assert_eq!((word >> 8) & 0xFF, 0x31); // ADD: op=1, rd=3
        assert_eq!((word >> 16) & 0xFF, 0x52); // SUB: op=2, rd=5
    }
}
