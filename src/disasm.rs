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

//! Disassembler (C11, spec.md §4.11): repeatedly decode a byte stream via
//! C8 and render each decoded instruction through its assembly-syntax
//! template, or a default rendering when it has none.

use crate::decode::{Decoded, decode_in_buffer};
use crate::errors::DecodeError;
use crate::model::Model;

#[derive(Debug, Clone, PartialEq)]
pub struct DisassembledLine {
    pub offset: usize,
    pub width_bytes: u32,
    pub text: String,
}

/// Render one decoded instruction. Operand values are rendered as decimal;
/// a template, if present, is applied Python-`.format`-style (spec.md §6):
/// `{name}` substitutes an operand's value, `{{`/`}}` are literal braces,
/// and for bundles `{slot0}`, `{slot1}`, … substitute each slot's own
/// recursively rendered text.
pub fn render(model: &Model, decoded: &Decoded) -> String {
    let instr = model.instruction_at(decoded.instr);

    if !decoded.slots.is_empty() {
        let slot_texts: Vec<String> = decoded.slots.iter().map(|s| render(model, s)).collect();
        return match &instr.syntax {
            Some(template) => apply_template(template, &[], &slot_texts),
            None => default_bundle_rendering(&slot_texts),
        };
    }

    let operand_names: Vec<(&str, u128)> = instr.operands.iter().map(|op| (op.name(), decoded.operands[op.name()])).collect();
    match &instr.syntax {
        Some(template) => apply_template(template, &operand_names, &[]),
        None => default_instruction_rendering(&instr.name, &operand_names),
    }
}

fn default_instruction_rendering(mnemonic: &str, operands: &[(&str, u128)]) -> String {
    if operands.is_empty() {
        return mnemonic.to_string();
    }
    let rendered: Vec<String> = operands.iter().map(|(_, v)| v.to_string()).collect();
    format!("{mnemonic} {}", rendered.join(", "))
}

fn default_bundle_rendering(slot_texts: &[String]) -> String {
    let parts: Vec<String> = slot_texts.iter().enumerate().map(|(i, t)| format!("slot{i}={t}")).collect();
    format!("BUNDLE[{}]", parts.join(", "))
}

/// Python-`.format`-compatible substitution over a fixed set of named
/// placeholders: operand names and `slot0`, `slot1`, … for bundle slots.
fn apply_template(template: &str, operands: &[(&str, u128)], slots: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                for nc in chars.by_ref() {
                    if nc == '}' {
                        break;
                    }
                    name.push(nc);
                }
                out.push_str(&resolve_placeholder(&name, operands, slots));
            }
            other => out.push(other),
        }
    }
    out
}

fn resolve_placeholder(name: &str, operands: &[(&str, u128)], slots: &[String]) -> String {
    if let Some(idx_str) = name.strip_prefix("slot") {
        if let Ok(idx) = idx_str.parse::<usize>() {
            if let Some(text) = slots.get(idx) {
                return text.clone();
            }
        }
    }
    operands
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, v)| v.to_string())
        .unwrap_or_else(|| format!("{{{name}}}"))
}

/// Disassemble an entire buffer, stopping (without error) on `ShortRead`
/// once at least one instruction has been produced, since a trailing
/// partial instruction is expected at the end of a buffer rather than
/// a malformed stream.
pub fn disassemble_buffer(model: &Model, buf: &[u8]) -> Result<Vec<DisassembledLine>, DecodeError> {
    let mut lines = Vec::new();
    let mut offset = 0usize;
    while offset < buf.len() {
        let decoded = match decode_in_buffer(model, buf, offset) {
            Ok(d) => d,
            Err(DecodeError::ShortRead { .. }) if !lines.is_empty() => break,
            Err(e) => return Err(e),
        };
        let width_bytes = decoded.width / 8;
        let text = render(model, &decoded);
        lines.push(DisassembledLine { offset, width_bytes, text });
        offset += width_bytes as usize;
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::raw::Endianness;
    use crate::model::{Format, FormatField, Instruction as ModelInstruction, OperandDescriptor as ModelOperand, Register};
    use std::collections::BTreeMap;

    fn demo_model(syntax: Option<&str>) -> Model {
        let format = Format {
            name: "R_TYPE".into(),
            width: 16,
            fields: vec![
                FormatField { name: "opcode".into(), lsb: 0, msb: 3, constant: None },
                FormatField { name: "rd".into(), lsb: 4, msb: 7, constant: None },
            ],
            identification_fields: vec!["opcode".to_string()],
        };
        let mut enc = BTreeMap::new();
        enc.insert("opcode".to_string(), 1u64);
        let add = ModelInstruction {
            name: "ADD".into(),
            format: crate::model::FormatIdx(0),
            bundle_format: None,
            encoding: enc.into_iter().collect(),
            operands: vec![ModelOperand::Simple("rd".into())],
            syntax: syntax.map(str::to_string),
            behavior: None,
            external_behavior: false,
        };
        Model::new("Demo".into(), 16, Endianness::Little, Vec::<Register>::new(), vec![format], vec![], vec![add], vec![])
    }

    #[test]
    fn default_rendering_lists_mnemonic_and_operands() {
        let model = demo_model(None);
        let mut buf = [0u8; 2];
        buf[0] = 0x51; // opcode=1, rd=5
        let lines = disassemble_buffer(&model, &buf).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "ADD 5");
    }

    #[test]
    fn template_substitutes_named_operand_and_literal_braces() {
        let model = demo_model(Some("ADD R{rd} {{literal}}"));
        let mut buf = [0u8; 2];
        buf[0] = 0x51;
        let lines = disassemble_buffer(&model, &buf).unwrap();
        assert_eq!(lines[0].text, "ADD R5 {literal}");
    }

    #[test]
    fn trailing_partial_instruction_is_dropped_without_error() {
        let model = demo_model(None);
        let buf = [0x51u8, 0x00, 0x51u8]; // one whole instruction, one stray byte
        let lines = disassemble_buffer(&model, &buf).unwrap();
        assert_eq!(lines.len(), 1);
    }
}
