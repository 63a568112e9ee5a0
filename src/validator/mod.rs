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

//! C5: enforces every invariant of spec.md §4.5 over a merged
//! `RawArchitecture`, collecting every failure rather than stopping at the
//! first one, then freezes the result into the arena-indexed `Model`.

mod rtl_check;

use crate::errors::{ValidationError, ValidationErrorKind, ValidationErrors};
use crate::model::raw::{
    AliasTarget, RawArchitecture, RawFormat, RawFormatField, RawInstruction, RawRegister, RegisterKind,
    VirtualComponent,
};
use crate::model::{self, FormatIdx, Model};
use std::collections::{HashMap, HashSet};

pub fn validate(raw: RawArchitecture) -> Result<Model, ValidationErrors> {
    let mut errors = Vec::new();

    check_unique(&raw.registers, |r| &r.name, "register", &mut errors);
    check_unique(&raw.formats, |f| &f.name, "format", &mut errors);
    check_unique(&raw.bundle_formats, |b| &b.name, "bundle format", &mut errors);
    check_unique(&raw.instructions, |i| &i.name, "instruction", &mut errors);
    check_unique(&raw.aliases, |a| &a.name, "instruction alias", &mut errors);

    for f in &raw.formats {
        check_format_geometry(f, &mut errors);
    }
    for b in &raw.bundle_formats {
        check_bundle_geometry(b, &mut errors);
    }

    let registers: HashMap<&str, &RawRegister> = raw.registers.iter().map(|r| (r.name.as_str(), r)).collect();
    for r in &raw.registers {
        check_register_fields(r, &mut errors);
        check_virtual_register(r, &registers, &mut errors);
        check_register_alias(r, &registers, &mut errors);
    }

    let formats: HashMap<&str, &RawFormat> = raw.formats.iter().map(|f| (f.name.as_str(), f)).collect();
    let bundle_formats: HashMap<&str, &crate::model::raw::RawBundleFormat> =
        raw.bundle_formats.iter().map(|b| (b.name.as_str(), b)).collect();
    for ins in &raw.instructions {
        check_instruction(ins, &formats, &bundle_formats, &registers, &mut errors);
    }

    let instructions: HashMap<&str, &RawInstruction> = raw.instructions.iter().map(|i| (i.name.as_str(), i)).collect();
    for alias in &raw.aliases {
        check_alias(alias, &instructions, &mut errors);
    }

    check_identification_uniqueness(&raw, &formats, &mut errors);

    if !errors.is_empty() {
        return Err(ValidationErrors(errors));
    }

    Ok(build_model(raw))
}

fn push(errors: &mut Vec<ValidationError>, kind: ValidationErrorKind, location: impl Into<String>, message: impl Into<String>) {
    errors.push(ValidationError::new(kind, location, message));
}

fn check_unique<T>(items: &[T], name_of: impl Fn(&T) -> &String, kind: &str, errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();
    for item in items {
        let name = name_of(item);
        if !seen.insert(name.as_str()) {
            push(errors, ValidationErrorKind::DuplicateName, kind, format!("duplicate {kind} name `{name}`"));
        }
    }
}

fn ranges_overlap(a_lsb: u32, a_msb: u32, b_lsb: u32, b_msb: u32) -> bool {
    a_lsb <= b_msb && b_lsb <= a_msb
}

fn fits(value: u64, width: u32) -> bool {
    width >= 64 || value < (1u64 << width)
}

fn field_in<'a>(format: &'a RawFormat, name: &str) -> Option<&'a RawFormatField> {
    format.fields.iter().find(|f| f.name == name)
}

// ---------- item 2: format geometry ----------

fn check_format_geometry(f: &RawFormat, errors: &mut Vec<ValidationError>) {
    let loc = format!("format:{}", f.name);
    for field in &f.fields {
        if field.msb >= f.width {
            push(errors, ValidationErrorKind::FieldOutOfRange, &loc, format!("field `{}` exceeds format width {}", field.name, f.width));
        }
        if let Some(c) = field.constant {
            let w = field.msb - field.lsb + 1;
            if !fits(c, w) {
                push(errors, ValidationErrorKind::ConstantTooWide, &loc, format!("constant on field `{}` does not fit in {} bit(s)", field.name, w));
            }
        }
    }
    for i in 0..f.fields.len() {
        for j in (i + 1)..f.fields.len() {
            let a = &f.fields[i];
            let b = &f.fields[j];
            if ranges_overlap(a.lsb, a.msb, b.lsb, b.msb) {
                push(errors, ValidationErrorKind::FieldOverlap, &loc, format!("fields `{}` and `{}` overlap", a.name, b.name));
            }
        }
    }
    if let Some(ids) = &f.identification_fields {
        for name in ids {
            if field_in(f, name).is_none() {
                push(errors, ValidationErrorKind::UnknownField, &loc, format!("identification field `{name}` is not a field of this format"));
            }
        }
    }
}

// ---------- item 3: bundle format geometry ----------

fn check_bundle_geometry(b: &crate::model::raw::RawBundleFormat, errors: &mut Vec<ValidationError>) {
    let loc = format!("bundle_format:{}", b.name);
    for slot in &b.slots {
        if slot.msb >= b.width {
            push(errors, ValidationErrorKind::FieldOutOfRange, &loc, format!("slot `{}` exceeds bundle width {}", slot.name, b.width));
        }
    }
    for i in 0..b.slots.len() {
        for j in (i + 1)..b.slots.len() {
            let a = &b.slots[i];
            let c = &b.slots[j];
            if ranges_overlap(a.lsb, a.msb, c.lsb, c.msb) {
                push(errors, ValidationErrorKind::FieldOverlap, &loc, format!("slots `{}` and `{}` overlap", a.name, c.name));
            }
        }
    }
    if let Some(start) = b.instruction_start {
        if start >= b.width {
            push(errors, ValidationErrorKind::FieldOutOfRange, &loc, format!("instruction_start {start} outside bundle width {}", b.width));
        }
    }
}

// ---------- items 7/8/9: registers ----------

fn register_known_width(kind: &RegisterKind) -> Option<u32> {
    match kind {
        RegisterKind::File { element_width, .. } => Some(*element_width),
        RegisterKind::Scalar { width } => Some(*width),
        RegisterKind::Vector { total_width, .. } => Some(*total_width),
        RegisterKind::Virtual { width, .. } => Some(*width),
        RegisterKind::Alias { .. } => None,
    }
}

fn check_register_fields(r: &RawRegister, errors: &mut Vec<ValidationError>) {
    let loc = format!("register:{}", r.name);
    let width = register_known_width(&r.kind);
    for field in &r.fields {
        if let Some(w) = width {
            if field.msb >= w {
                push(errors, ValidationErrorKind::FieldOutOfRange, &loc, format!("field `{}` exceeds register width {w}", field.name));
            }
        }
    }
    for i in 0..r.fields.len() {
        for j in (i + 1)..r.fields.len() {
            let a = &r.fields[i];
            let b = &r.fields[j];
            if ranges_overlap(a.lsb, a.msb, b.lsb, b.msb) {
                push(errors, ValidationErrorKind::RegisterFieldOverlap, &loc, format!("fields `{}` and `{}` overlap", a.name, b.name));
            }
        }
    }
}

fn component_width(start: &RawRegister, registers: &HashMap<&str, &RawRegister>) -> Option<u32> {
    let mut reg = start;
    for _ in 0..8 {
        match &reg.kind {
            RegisterKind::Alias { target } => match target {
                AliasTarget::Scalar(s) => reg = *registers.get(s.as_str())?,
                AliasTarget::FileElement { file, .. } => {
                    let f = *registers.get(file.as_str())?;
                    return match &f.kind {
                        RegisterKind::File { element_width, .. } => Some(*element_width),
                        _ => None,
                    };
                }
            },
            other => return register_known_width(other),
        }
    }
    None
}

fn check_virtual_register(r: &RawRegister, registers: &HashMap<&str, &RawRegister>, errors: &mut Vec<ValidationError>) {
    let RegisterKind::Virtual { width, components } = &r.kind else {
        return;
    };
    let loc = format!("register:{}", r.name);
    let mut sum = 0u32;
    let mut ok = true;
    for c in components {
        match c {
            VirtualComponent::Scalar(name) => match registers.get(name.as_str()) {
                Some(target) => match component_width(target, registers) {
                    Some(w) => sum += w,
                    None => {
                        push(errors, ValidationErrorKind::UnresolvedReference, &loc, format!("component `{name}` has no resolvable width"));
                        ok = false;
                    }
                },
                None => {
                    push(errors, ValidationErrorKind::UnresolvedReference, &loc, format!("component register `{name}` not found"));
                    ok = false;
                }
            },
            VirtualComponent::FileElement { file, index } => match registers.get(file.as_str()) {
                Some(target) => match &target.kind {
                    RegisterKind::File { element_width, count } => {
                        if *index >= *count {
                            push(errors, ValidationErrorKind::FieldOutOfRange, &loc, format!("component index {index} out of range for `{file}` (count {count})"));
                            ok = false;
                        }
                        sum += element_width;
                    }
                    _ => {
                        push(errors, ValidationErrorKind::UnresolvedReference, &loc, format!("`{file}` is not a register file"));
                        ok = false;
                    }
                },
                None => {
                    push(errors, ValidationErrorKind::UnresolvedReference, &loc, format!("component register file `{file}` not found"));
                    ok = false;
                }
            },
        }
    }
    if ok && sum != *width {
        push(errors, ValidationErrorKind::VirtualRegisterWidthMismatch, &loc, format!("component widths sum to {sum}, expected {width}"));
    }
}

fn check_register_alias(r: &RawRegister, registers: &HashMap<&str, &RawRegister>, errors: &mut Vec<ValidationError>) {
    let RegisterKind::Alias { target } = &r.kind else {
        return;
    };
    let loc = format!("register:{}", r.name);
    match target {
        AliasTarget::Scalar(s) => {
            if !registers.contains_key(s.as_str()) {
                push(errors, ValidationErrorKind::UnresolvedReference, &loc, format!("alias target `{s}` not found"));
            }
        }
        AliasTarget::FileElement { file, index } => match registers.get(file.as_str()) {
            Some(f) => match &f.kind {
                RegisterKind::File { count, .. } => {
                    if *index >= *count {
                        push(errors, ValidationErrorKind::FieldOutOfRange, &loc, format!("alias index {index} out of range for `{file}` (count {count})"));
                    }
                }
                _ => push(errors, ValidationErrorKind::UnresolvedReference, &loc, format!("`{file}` is not a register file")),
            },
            None => push(errors, ValidationErrorKind::UnresolvedReference, &loc, format!("alias target file `{file}` not found")),
        },
    }
}

// ---------- items 4/5/6: instructions ----------

fn check_instruction(
    ins: &RawInstruction,
    formats: &HashMap<&str, &RawFormat>,
    bundle_formats: &HashMap<&str, &crate::model::raw::RawBundleFormat>,
    registers: &HashMap<&str, &RawRegister>,
    errors: &mut Vec<ValidationError>,
) {
    let loc = format!("instruction:{}", ins.name);

    let Some(format) = formats.get(ins.format.as_str()).copied() else {
        push(errors, ValidationErrorKind::UnresolvedReference, &loc, format!("unknown format `{}`", ins.format));
        return;
    };

    if let Some(bf) = &ins.bundle_format {
        if !bundle_formats.contains_key(bf.as_str()) {
            push(errors, ValidationErrorKind::UnresolvedReference, &loc, format!("unknown bundle format `{bf}`"));
        }
    }

    for (name, value) in &ins.encoding {
        match field_in(format, name) {
            None => push(errors, ValidationErrorKind::UnknownField, &loc, format!("encoding field `{name}` not found in format `{}`", format.name)),
            Some(field) => {
                if field.constant.is_some() {
                    push(errors, ValidationErrorKind::ConstantOverridden, &loc, format!("encoding `{name}` overrides a format constant"));
                } else if !fits(*value, field.msb - field.lsb + 1) {
                    push(errors, ValidationErrorKind::ConstantTooWide, &loc, format!("encoding value for `{name}` does not fit its field"));
                }
            }
        }
    }

    let mut claimed: HashSet<String> = HashSet::new();
    for op in &ins.operands {
        let field_names: Vec<&String> = match op {
            crate::model::raw::OperandDescriptor::Simple(n) => vec![n],
            crate::model::raw::OperandDescriptor::Distributed { fields, .. } => fields.iter().collect(),
        };
        for fname in field_names {
            match field_in(format, fname) {
                None => push(errors, ValidationErrorKind::UnresolvedReference, &loc, format!("operand field `{fname}` not found in format `{}`", format.name)),
                Some(field) => {
                    if field.constant.is_some() || ins.encoding.contains_key(fname) {
                        push(errors, ValidationErrorKind::OperandMismatch, &loc, format!("operand field `{fname}` conflicts with a fixed encoding value"));
                    }
                }
            }
            if !claimed.insert(fname.clone()) {
                push(errors, ValidationErrorKind::OperandMismatch, &loc, format!("operand field `{fname}` claimed by more than one operand"));
            }
        }
    }

    for name in resolved_id_fields(format) {
        match field_in(format, &name) {
            Some(field) => {
                let has_value = field.constant.is_some() || ins.encoding.contains_key(&name);
                if !has_value {
                    push(errors, ValidationErrorKind::IdentificationAmbiguity, &loc, format!("identification field `{name}` has no fixed value for this instruction"));
                }
            }
            None => {} // already reported by check_format_geometry
        }
    }

    if let Some(block) = &ins.behavior {
        let operand_names: HashSet<String> = ins.operands.iter().map(|o| o.name().to_string()).collect();
        rtl_check::check_block(block, &operand_names, registers, &loc, errors);
    }
}

/// Default identification fields: every field carrying an explicit
/// format-level constant (spec.md §3 "default is all fields that appear
/// in the encoding" — resolved to the format's own fixed bits, see
/// SPEC_FULL.md §6).
pub fn resolved_id_fields(format: &RawFormat) -> Vec<String> {
    match &format.identification_fields {
        Some(explicit) => explicit.clone(),
        None => format.fields.iter().filter(|f| f.constant.is_some()).map(|f| f.name.clone()).collect(),
    }
}

// ---------- item 10: instruction aliases ----------

fn check_alias(alias: &crate::model::raw::RawInstructionAlias, instructions: &HashMap<&str, &RawInstruction>, errors: &mut Vec<ValidationError>) {
    let loc = format!("instruction_alias:{}", alias.name);
    match instructions.get(alias.target.as_str()) {
        None => push(errors, ValidationErrorKind::UnresolvedReference, &loc, format!("alias target `{}` not found", alias.target)),
        Some(target) => {
            let target_operand_names: Vec<String> = target.operands.iter().map(|o| o.name().to_string()).collect();
            if crate::alias::infer_operand_mapping(&alias.operands, &target_operand_names).is_none() {
                push(
                    errors,
                    ValidationErrorKind::OperandMismatch,
                    &loc,
                    format!("operand declaration does not permit unambiguous inference onto `{}`", alias.target),
                );
            }
        }
    }
}

// ---------- item 12: identification uniqueness ----------

struct IdEntry<'a> {
    name: &'a str,
    format: &'a RawFormat,
    ids: Vec<String>,
    values: HashMap<String, u64>,
}

fn range_mask(lsb: u32, msb: u32) -> u128 {
    let w = msb - lsb + 1;
    let bits: u128 = if w >= 128 { u128::MAX } else { (1u128 << w) - 1 };
    bits << lsb
}

fn bits_for_truncated(format: &RawFormat, ids: &[String], values: &HashMap<String, u64>, window: u32) -> (u128, u128) {
    let mut mask = 0u128;
    let mut val = 0u128;
    for name in ids {
        if let Some(field) = field_in(format, name) {
            if field.msb < window {
                mask |= range_mask(field.lsb, field.msb);
                val |= (values[name] as u128) << field.lsb;
            }
        }
    }
    (mask, val)
}

fn check_identification_uniqueness(raw: &RawArchitecture, formats: &HashMap<&str, &RawFormat>, errors: &mut Vec<ValidationError>) {
    let mut entries = Vec::new();
    for ins in &raw.instructions {
        let Some(format) = formats.get(ins.format.as_str()).copied() else { continue };
        let ids = resolved_id_fields(format);
        let mut values = HashMap::new();
        let mut ok = true;
        for name in &ids {
            let Some(field) = field_in(format, name) else {
                ok = false;
                break;
            };
            let v = field.constant.or_else(|| ins.encoding.get(name).copied());
            match v {
                Some(v) => {
                    values.insert(name.clone(), v);
                }
                None => {
                    ok = false;
                    break;
                }
            }
        }
        if ok {
            entries.push(IdEntry { name: &ins.name, format, ids, values });
        }
    }

    for i in 0..entries.len() {
        for j in (i + 1)..entries.len() {
            let a = &entries[i];
            let b = &entries[j];
            let window = a.format.width.min(b.format.width);
            let (mask_a, val_a) = bits_for_truncated(a.format, &a.ids, &a.values, window);
            let (mask_b, val_b) = bits_for_truncated(b.format, &b.ids, &b.values, window);
            let common = mask_a & mask_b;
            let conflicts = (val_a & common) == (val_b & common);
            if !conflicts {
                continue;
            }
            let loc = format!("instruction:{}", a.name);
            if a.format.name == b.format.name && a.ids == b.ids {
                push(errors, ValidationErrorKind::DuplicateIdentificationTuple, &loc, format!("`{}` and `{}` share an identical identification tuple", a.name, b.name));
            } else {
                push(errors, ValidationErrorKind::IdentificationAmbiguity, &loc, format!("`{}` and `{}` are ambiguous at decode time", a.name, b.name));
            }
        }
    }
}

// ---------- freezing the validated raw architecture into the Model ----------

fn build_model(raw: RawArchitecture) -> Model {
    let registers: Vec<model::Register> = raw
        .registers
        .into_iter()
        .map(|r| model::Register {
            name: r.name,
            kind: r.kind,
            fields: r
                .fields
                .into_iter()
                .map(|f| model::RegisterField { name: f.name, lsb: f.lsb, msb: f.msb })
                .collect(),
        })
        .collect();

    let formats: Vec<model::Format> = raw
        .formats
        .iter()
        .map(|f| model::Format {
            name: f.name.clone(),
            width: f.width,
            fields: f
                .fields
                .iter()
                .map(|ff| model::FormatField { name: ff.name.clone(), lsb: ff.lsb, msb: ff.msb, constant: ff.constant })
                .collect(),
            identification_fields: resolved_id_fields(f),
        })
        .collect();
    let format_name_to_idx: HashMap<&str, u32> = raw.formats.iter().enumerate().map(|(i, f)| (f.name.as_str(), i as u32)).collect();

    let bundle_name_to_idx: HashMap<&str, u32> =
        raw.bundle_formats.iter().enumerate().map(|(i, b)| (b.name.as_str(), i as u32)).collect();
    let bundle_formats: Vec<model::BundleFormat> = raw
        .bundle_formats
        .iter()
        .map(|b| model::BundleFormat {
            name: b.name.clone(),
            width: b.width,
            slots: b.slots.iter().map(|s| model::Slot { name: s.name.clone(), lsb: s.lsb, msb: s.msb }).collect(),
            instruction_start: b.instruction_start,
            identification_fields: b.identification_fields.clone().unwrap_or_default(),
        })
        .collect();

    let instructions: Vec<model::Instruction> = raw
        .instructions
        .iter()
        .map(|ins| model::Instruction {
            name: ins.name.clone(),
            format: FormatIdx(format_name_to_idx[ins.format.as_str()]),
            bundle_format: ins.bundle_format.as_ref().map(|n| model::BundleFormatIdx(bundle_name_to_idx[n.as_str()])),
            encoding: ins.encoding.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            operands: ins
                .operands
                .iter()
                .map(|o| match o {
                    crate::model::raw::OperandDescriptor::Simple(n) => model::OperandDescriptor::Simple(n.clone()),
                    crate::model::raw::OperandDescriptor::Distributed { name, fields } => {
                        model::OperandDescriptor::Distributed { name: name.clone(), fields: fields.clone() }
                    }
                })
                .collect(),
            syntax: ins.syntax.clone(),
            behavior: ins.behavior.clone(),
            external_behavior: ins.external_behavior,
        })
        .collect();
    let instruction_name_to_idx: HashMap<&str, u32> = raw.instructions.iter().enumerate().map(|(i, ins)| (ins.name.as_str(), i as u32)).collect();

    let aliases: Vec<model::InstructionAlias> = raw
        .aliases
        .into_iter()
        .map(|a| model::InstructionAlias {
            name: a.name,
            target: crate::model::InstrIdx(instruction_name_to_idx[a.target.as_str()]),
            syntax: a.syntax,
            operands: a.operands,
        })
        .collect();

    Model::new(raw.name, raw.word_size, raw.endianness.unwrap_or_default(), registers, formats, bundle_formats, instructions, aliases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::raw::*;
    use std::collections::BTreeMap;

    fn demo_format() -> RawFormat {
        RawFormat {
            name: "R_TYPE".into(),
            width: 32,
            fields: vec![
                RawFormatField { name: "opcode".into(), lsb: 0, msb: 5, constant: Some(0x01), line: 1 },
                RawFormatField { name: "funct".into(), lsb: 15, msb: 20, constant: None, line: 1 },
                RawFormatField { name: "rd".into(), lsb: 6, msb: 8, constant: None, line: 1 },
                RawFormatField { name: "rs1".into(), lsb: 9, msb: 11, constant: None, line: 1 },
                RawFormatField { name: "rs2".into(), lsb: 12, msb: 14, constant: None, line: 1 },
            ],
            identification_fields: None,
            line: 1,
        }
    }

    fn demo_arch() -> RawArchitecture {
        let mut encoding = BTreeMap::new();
        encoding.insert("funct".to_string(), 0x0A);
        RawArchitecture {
            name: "Demo".into(),
            word_size: 32,
            endianness: Some(Endianness::Little),
            registers: vec![],
            formats: vec![demo_format()],
            bundle_formats: vec![],
            instructions: vec![RawInstruction {
                name: "ADD".into(),
                format: "R_TYPE".into(),
                bundle_format: None,
                encoding,
                operands: vec![
                    OperandDescriptor::Simple("rd".into()),
                    OperandDescriptor::Simple("rs1".into()),
                    OperandDescriptor::Simple("rs2".into()),
                ],
                syntax: Some("ADD {rd}, {rs1}, {rs2}".into()),
                behavior: None,
                external_behavior: false,
                line: 1,
            }],
            aliases: vec![],
        }
    }

    #[test]
    fn valid_architecture_passes() {
        let model = validate(demo_arch()).unwrap();
        assert_eq!(model.formats.len(), 1);
        assert_eq!(model.format("R_TYPE").unwrap().identification_fields, vec!["opcode".to_string()]);
    }

    #[test]
    fn encoding_overriding_constant_fails() {
        let mut arch = demo_arch();
        arch.instructions[0].encoding.insert("opcode".into(), 0x02);
        let err = validate(arch).unwrap_err();
        assert!(err.0.iter().any(|e| e.kind == ValidationErrorKind::ConstantOverridden));
    }

    #[test]
    fn overlapping_format_fields_fail() {
        let mut arch = demo_arch();
        arch.formats[0].fields.push(RawFormatField { name: "bad".into(), lsb: 4, msb: 7, constant: None, line: 1 });
        let err = validate(arch).unwrap_err();
        assert!(err.0.iter().any(|e| e.kind == ValidationErrorKind::FieldOverlap));
    }
}
