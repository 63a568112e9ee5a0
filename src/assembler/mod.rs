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

//! Two-pass assembler (C9, spec.md §4.9), generalized with the
//! constant-table prepass and `.org`/`.byte`/`.word` directives of
//! SPEC_FULL.md §3.

pub mod ast;
pub mod lexer;
pub mod parse;
pub mod symbol_table;

use crate::alias::infer_operand_mapping;
use crate::errors::AssembleError;
use crate::model::{InstrIdx, Instruction, Model};
use crate::pack::{pack_bundle, pack_instruction};
use ast::{AssemblyLine, Directive, InstructionStmt, Operand};
use std::collections::HashMap;
use symbol_table::{AddrCounter, ConstantTable, SymbolTable};

/// One assembled output word, its bit width, and the byte address it was
/// placed at (used by directives that need to interleave raw data).
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledWord {
    pub address: u64,
    pub width_bits: u32,
    pub value: u128,
}

/// Pass 0: collect `.define` constants. Mirrors `build_constant_table`,
/// generalized from Cicada-16's `.define`/immediate-only form.
pub fn build_constant_table(file: &str, lines: &[AssemblyLine]) -> Result<ConstantTable, AssembleError> {
    let mut table = ConstantTable::new();
    for line in lines {
        if let AssemblyLine::Directive { directive: Directive::Define(name, value), line: line_no } = line {
            if table.contains_key(name) {
                return Err(AssembleError::DuplicateConstant { file: file.to_string(), line: *line_no, name: name.clone() });
            }
            let v = match value {
                Operand::Immediate(v) => *v,
                Operand::Ident(_) => {
                    return Err(AssembleError::Syntax {
                        file: file.to_string(),
                        line: *line_no,
                        reason: format!("`.define {name}` requires an immediate value"),
                    });
                }
            };
            table.insert(name.clone(), v);
        }
    }
    Ok(table)
}

fn instruction_for_mnemonic<'m>(model: &'m Model, mnemonic: &str) -> Option<(&'m Instruction, Vec<String>)> {
    if let Some(instr) = model.instruction(mnemonic) {
        return Some((instr, instr.operands.iter().map(|o| o.name().to_string()).collect()));
    }
    let alias = model.alias(mnemonic)?;
    let target = model.instruction_at(alias.target);
    Some((target, alias.operands.clone()))
}

fn bundle_instruction_for_slot_count(model: &Model, slot_count: usize) -> Option<InstrIdx> {
    model
        .instructions
        .iter()
        .enumerate()
        .find(|(_, ins)| ins.bundle_format.map(|bf| model.bundle_format_at(bf).slots.len() == slot_count).unwrap_or(false))
        .map(|(i, _)| InstrIdx(i as u32))
}

fn instruction_width_bits(model: &Model, stmt: &InstructionStmt, file: &str, line: usize) -> Result<u32, AssembleError> {
    let (instr, _) = instruction_for_mnemonic(model, &stmt.mnemonic)
        .ok_or_else(|| AssembleError::UnknownMnemonic { file: file.to_string(), line, mnemonic: stmt.mnemonic.clone() })?;
    Ok(model.format_at(instr.format).width)
}

fn bundle_width_bits(model: &Model, subs: &[InstructionStmt], file: &str, line: usize) -> Result<u32, AssembleError> {
    let idx = bundle_instruction_for_slot_count(model, subs.len()).ok_or_else(|| AssembleError::Syntax {
        file: file.to_string(),
        line,
        reason: format!("no bundle format with {} slot(s) found for this `bundle{{...}}`", subs.len()),
    })?;
    let instr = model.instruction_at(idx);
    Ok(model.bundle_format_at(instr.bundle_format.unwrap()).width)
}

/// Pass 1: walk the line stream accumulating a byte address, recording a
/// label's address whenever one is declared.
pub fn build_symbol_table(model: &Model, file: &str, lines: &[AssemblyLine], constants: &ConstantTable) -> Result<SymbolTable, AssembleError> {
    let mut symbols = SymbolTable::new();
    let mut addr = AddrCounter::new();

    for line in lines {
        match line {
            AssemblyLine::Label { name, line: line_no } => {
                if symbols.contains_key(name) {
                    return Err(AssembleError::Syntax { file: file.to_string(), line: *line_no, reason: format!("duplicate label `{name}`") });
                }
                if constants.contains_key(name) {
                    return Err(AssembleError::ConstantLabelClash { file: file.to_string(), line: *line_no, name: name.clone() });
                }
                symbols.insert(name.clone(), addr.addr);
            }
            AssemblyLine::Instruction { stmt, line: line_no } => {
                addr.advance((instruction_width_bits(model, stmt, file, *line_no)? as u64 + 7) / 8);
            }
            AssemblyLine::Bundle { subs, line: line_no } => {
                addr.advance((bundle_width_bits(model, subs, file, *line_no)? as u64 + 7) / 8);
            }
            AssemblyLine::Directive { directive, line: line_no } => match directive {
                Directive::Org(op) => {
                    addr.addr = resolve_operand_addr_phase(op, constants, file, *line_no)?;
                }
                Directive::Byte(items) => addr.advance(items.len() as u64),
                Directive::Word(items) => addr.advance(items.len() as u64 * (model.word_size as u64 / 8).max(1)),
                Directive::Define(..) => {}
            },
        }
    }
    Ok(symbols)
}

/// `.org`/`.define` operands are resolved before labels exist, so only
/// constants and immediates are legal there.
fn resolve_operand_addr_phase(op: &Operand, constants: &ConstantTable, file: &str, line: usize) -> Result<u64, AssembleError> {
    match op {
        Operand::Immediate(v) => Ok(*v),
        Operand::Ident(name) => constants
            .get(name)
            .copied()
            .ok_or_else(|| AssembleError::UnknownLabel { file: file.to_string(), line, label: name.clone() }),
    }
}

/// Register-token resolution (spec.md §4.9: "a register token recognized
/// by name-pattern, alias table, or virtual-register table"): a file
/// register `F` with `count` elements accepts tokens `F0`..`F{count-1}`;
/// an aliased register whose target is a file element resolves to that
/// element's index.
fn register_operand_value(model: &Model, token: &str) -> Option<u64> {
    for reg in &model.registers {
        if let crate::model::RegisterKind::File { count, .. } = &reg.kind {
            if let Some(suffix) = token.strip_prefix(reg.name.as_str()) {
                if let Ok(index) = suffix.parse::<u64>() {
                    if index < *count as u64 {
                        return Some(index);
                    }
                }
            }
        }
    }
    for reg in &model.registers {
        if reg.name == token {
            if let crate::model::RegisterKind::Alias { target } = &reg.kind {
                if let crate::model::raw::AliasTarget::FileElement { index, .. } = target {
                    return Some(*index as u64);
                }
            }
        }
    }
    None
}

fn resolve_operand_value(op: &Operand, model: &Model, symbols: &SymbolTable, constants: &ConstantTable, file: &str, line: usize) -> Result<u128, AssembleError> {
    match op {
        Operand::Immediate(v) => Ok(*v as u128),
        Operand::Ident(name) => {
            if let Some(v) = constants.get(name) {
                return Ok(*v as u128);
            }
            if let Some(v) = register_operand_value(model, name) {
                return Ok(v as u128);
            }
            if let Some(addr) = symbols.get(name) {
                return Ok(*addr as u128);
            }
            Err(AssembleError::UnknownLabel { file: file.to_string(), line, label: name.clone() })
        }
    }
}

/// Resolve one textual statement to (target instruction, named operand
/// values) ready for C7, handling alias operand-order inference.
fn resolve_instruction(
    model: &Model,
    stmt: &InstructionStmt,
    symbols: &SymbolTable,
    constants: &ConstantTable,
    file: &str,
    line: usize,
) -> Result<(InstrIdx, HashMap<String, u128>), AssembleError> {
    if let Some(instr) = model.instruction(&stmt.mnemonic) {
        let idx = model.instruction_idx(&stmt.mnemonic).unwrap();
        let names: Vec<String> = instr.operands.iter().map(|o| o.name().to_string()).collect();
        if stmt.operands.len() != names.len() {
            return Err(AssembleError::Syntax {
                file: file.to_string(),
                line,
                reason: format!("`{}` expects {} operand(s), got {}", stmt.mnemonic, names.len(), stmt.operands.len()),
            });
        }
        let mut values = HashMap::new();
        for (name, op) in names.iter().zip(stmt.operands.iter()) {
            values.insert(name.clone(), resolve_operand_value(op, model, symbols, constants, file, line)?);
        }
        return Ok((idx, values));
    }

    if let Some(alias) = model.alias(&stmt.mnemonic) {
        if stmt.operands.len() != alias.operands.len() {
            return Err(AssembleError::Syntax {
                file: file.to_string(),
                line,
                reason: format!("`{}` expects {} operand(s), got {}", stmt.mnemonic, alias.operands.len(), stmt.operands.len()),
            });
        }
        let mut alias_values = HashMap::new();
        for (name, op) in alias.operands.iter().zip(stmt.operands.iter()) {
            alias_values.insert(name.clone(), resolve_operand_value(op, model, symbols, constants, file, line)?);
        }
        let target = model.instruction_at(alias.target);
        let target_names: Vec<String> = target.operands.iter().map(|o| o.name().to_string()).collect();
        let mapping = infer_operand_mapping(&alias.operands, &target_names)
            .ok_or_else(|| AssembleError::AliasInference { file: file.to_string(), line, alias: stmt.mnemonic.clone() })?;
        let mut values = HashMap::new();
        for (target_name, source_name) in target_names.iter().zip(mapping.iter()) {
            let v = *alias_values
                .get(source_name)
                .ok_or_else(|| AssembleError::AliasInference { file: file.to_string(), line, alias: stmt.mnemonic.clone() })?;
            values.insert(target_name.clone(), v);
        }
        return Ok((alias.target, values));
    }

    Err(AssembleError::UnknownMnemonic { file: file.to_string(), line, mnemonic: stmt.mnemonic.clone() })
}

/// Pass 2: encode every instruction/bundle/data directive into an ordered
/// stream of output words.
pub fn generate_words(
    model: &Model,
    file: &str,
    lines: &[AssemblyLine],
    symbols: &SymbolTable,
    constants: &ConstantTable,
) -> Result<Vec<AssembledWord>, AssembleError> {
    let mut out = Vec::new();
    let mut addr = AddrCounter::new();

    for line in lines {
        match line {
            AssemblyLine::Label { .. } => {}
            AssemblyLine::Instruction { stmt, line: line_no } => {
                let (idx, values) = resolve_instruction(model, stmt, symbols, constants, file, *line_no)?;
                let instr = model.instruction_at(idx);
                let word = pack_instruction(model, instr, &values)?;
                let width_bits = model.format_at(instr.format).width;
                out.push(AssembledWord { address: addr.addr, width_bits, value: word });
                addr.advance((width_bits as u64 + 7) / 8);
            }
            AssemblyLine::Bundle { subs, line: line_no } => {
                let bundle_idx = bundle_instruction_for_slot_count(model, subs.len()).ok_or_else(|| AssembleError::Syntax {
                    file: file.to_string(),
                    line: *line_no,
                    reason: format!("no bundle format with {} slot(s) found for this `bundle{{...}}`", subs.len()),
                })?;
                let bundle_instr = model.instruction_at(bundle_idx);

                let mut sub_pairs = Vec::with_capacity(subs.len());
                for sub_stmt in subs {
                    let (sub_idx, sub_values) = resolve_instruction(model, sub_stmt, symbols, constants, file, *line_no)?;
                    sub_pairs.push((model.instruction_at(sub_idx), sub_values));
                }
                let sub_refs: Vec<(&Instruction, HashMap<String, u128>)> = sub_pairs;
                let empty_operands = HashMap::new();
                let word = pack_bundle(model, bundle_instr, &empty_operands, &sub_refs)?;
                let width_bits = model.bundle_format_at(bundle_instr.bundle_format.unwrap()).width;
                out.push(AssembledWord { address: addr.addr, width_bits, value: word });
                addr.advance((width_bits as u64 + 7) / 8);
            }
            AssemblyLine::Directive { directive, line: line_no } => match directive {
                Directive::Org(op) => {
                    addr.addr = resolve_operand_addr_phase(op, constants, file, *line_no)?;
                }
                Directive::Byte(items) => {
                    for item in items {
                        let v = resolve_operand_value(item, model, symbols, constants, file, *line_no)?;
                        out.push(AssembledWord { address: addr.addr, width_bits: 8, value: v & 0xFF });
                        addr.advance(1);
                    }
                }
                Directive::Word(items) => {
                    let width_bits = model.word_size;
                    for item in items {
                        let v = resolve_operand_value(item, model, symbols, constants, file, *line_no)?;
                        out.push(AssembledWord { address: addr.addr, width_bits, value: v });
                        addr.advance((width_bits as u64 + 7) / 8);
                    }
                }
                Directive::Define(..) => {}
            },
        }
    }
    Ok(out)
}

/// Assemble one source file against a validated model, end to end
/// (constant prepass, label collection, encoding).
pub fn assemble(model: &Model, file: &str, source: &str) -> Result<Vec<AssembledWord>, AssembleError> {
    let lines = parse::parse_source(file, source)?;
    let constants = build_constant_table(file, &lines)?;
    let symbols = build_symbol_table(model, file, &lines, &constants)?;
    generate_words(model, file, &lines, &symbols, &constants)
}

/// Flatten assembled words into a contiguous byte stream in the
/// architecture's byte order (spec.md §6 "concatenated instruction words
/// in the architecture's byte order; no headers, no padding beyond the
/// instructions themselves"). Gaps left by `.org` are zero-filled.
pub fn to_bytes(model: &Model, words: &[AssembledWord]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for word in words {
        let target = word.address as usize;
        if bytes.len() < target {
            bytes.resize(target, 0);
        }
        let nbytes = ((word.width_bits + 7) / 8) as usize;
        let mut word_bytes = Vec::with_capacity(nbytes);
        for i in 0..nbytes {
            let shift = match model.endianness {
                crate::model::raw::Endianness::Little => i * 8,
                crate::model::raw::Endianness::Big => (nbytes - 1 - i) * 8,
            };
            word_bytes.push(((word.value >> shift) & 0xFF) as u8);
        }
        let end = target + nbytes;
        if bytes.len() < end {
            bytes.resize(end, 0);
        }
        bytes[target..end].copy_from_slice(&word_bytes);
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::raw::Endianness;
    use crate::model::{Format, FormatField, Instruction as ModelInstruction, InstructionAlias, OperandDescriptor as ModelOperand, Register, RegisterKind};
    use std::collections::BTreeMap;

    fn demo_model() -> Model {
        let format = Format {
            name: "R_TYPE".into(),
            width: 16,
            fields: vec![
                FormatField { name: "opcode".into(), lsb: 0, msb: 3, constant: None },
                FormatField { name: "rd".into(), lsb: 4, msb: 7, constant: None },
                FormatField { name: "imm".into(), lsb: 8, msb: 15, constant: None },
            ],
            identification_fields: vec!["opcode".to_string()],
        };
        let mut add_encoding = BTreeMap::new();
        add_encoding.insert("opcode".to_string(), 1u64);
        let add = ModelInstruction {
            name: "ADDI".into(),
            format: crate::model::FormatIdx(0),
            bundle_format: None,
            encoding: add_encoding.into_iter().collect(),
            operands: vec![ModelOperand::Simple("rd".into()), ModelOperand::Simple("imm".into())],
            syntax: None,
            behavior: None,
            external_behavior: false,
        };
        let regfile = Register { name: "R".into(), kind: RegisterKind::File { element_width: 16, count: 8 }, fields: vec![] };
        Model::new("Demo".into(), 16, Endianness::Little, vec![regfile], vec![format], vec![], vec![add], vec![])
    }

    #[test]
    fn assembles_label_reference_and_register_operand() {
        let model = demo_model();
        let src = "start:\n  ADDI R3, start\n";
        let words = assemble(&model, "t.s", src).unwrap();
        assert_eq!(words.len(), 1);
        // opcode=1, rd=3, imm=0 (start resolves to address 0)
        assert_eq!(words[0].value, 0x0031);
    }

    #[test]
    fn define_constant_is_usable_as_immediate() {
        let model = demo_model();
        let src = ".define COUNT, 5\nADDI R1, COUNT\n";
        let words = assemble(&model, "t.s", src).unwrap();
        assert_eq!(words[0].value, 0x0511);
    }

    #[test]
    fn unknown_mnemonic_is_rejected() {
        let model = demo_model();
        let err = assemble(&model, "t.s", "NOPE R1, R2\n").unwrap_err();
        assert!(matches!(err, AssembleError::UnknownMnemonic { .. }));
    }

    #[test]
    fn alias_with_repeated_operand_broadcasts_to_target() {
        let base = demo_model();
        let alias = InstructionAlias {
            name: "DUP".into(),
            target: crate::model::InstrIdx(0),
            syntax: None,
            operands: vec!["rd".to_string()],
        };
        let model = Model::new(base.name, base.word_size, base.endianness, base.registers, base.formats, base.bundle_formats, base.instructions, vec![alias]);
        let src = "DUP R2\n";
        let words = assemble(&model, "t.s", src).unwrap();
        // rd=2 supplies both `rd` and `imm` target operands
        assert_eq!(words[0].value, 0x0221);
    }
}
