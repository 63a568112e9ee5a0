//! C1 (lexer/parser) and C3 (model builder) for one `.isa` file. As in the
//! teacher's `parse_source`, tokenizing and typed-AST construction happen
//! in the same traversal of the `pest` parse tree rather than as two
//! materialized stages: `build_file` walks `Pairs<Rule>` and immediately
//! produces `crate::model::raw` structures, normalizing literals and bit
//! ranges as it goes (spec.md §4.3).

pub mod expr;

use crate::errors::SyntaxError;
use crate::model::raw::*;
use crate::rtl::ast::{Block as RtlBlock, Stmt};
use pest::Parser;
use pest::iterators::{Pair, Pairs};
use pest_derive::Parser;
use std::collections::BTreeMap;

#[derive(Parser)]
#[grammar = "grammar.pest"]
pub struct IsaParser;

/// Everything declared directly in one file outside of an `architecture`
/// block (merge-mode ingredients, spec.md §4.4).
#[derive(Debug, Clone, Default)]
pub struct PartialFile {
    pub registers: Vec<RawRegister>,
    pub formats: Vec<RawFormat>,
    pub bundle_formats: Vec<RawBundleFormat>,
    pub instructions: Vec<RawInstruction>,
    pub aliases: Vec<RawInstructionAlias>,
}

#[derive(Debug, Clone, Default)]
pub struct FileModel {
    pub includes: Vec<String>,
    pub architecture: Option<RawArchitecture>,
    pub partial: PartialFile,
}

pub fn parse_source(file: &str, source: &str) -> Result<FileModel, SyntaxError> {
    let mut pairs =
        IsaParser::parse(Rule::file, source).map_err(|e| SyntaxError::from_pest(file, e))?;
    let file_pair = pairs.next().expect("file rule always produces one pair");

    let mut model = FileModel::default();
    for item in file_pair.into_inner() {
        match item.as_rule() {
            Rule::include_stmt => model.includes.push(parse_include(item)),
            Rule::architecture => {
                let (arch, nested_includes) = build_architecture(item)?;
                model.includes.extend(nested_includes);
                model.architecture = Some(arch);
            }
            Rule::register_decl => model.partial.registers.push(build_register(item)?),
            Rule::format_decl => model.partial.formats.push(build_format(item)?),
            Rule::bundle_format_decl => model.partial.bundle_formats.push(build_bundle_format(item)?),
            Rule::instruction_decl => model.partial.instructions.push(build_instruction(item)?),
            Rule::alias_decl => model.partial.aliases.push(build_alias(item)),
            Rule::EOI => {}
            other => unreachable!("unexpected top-level rule {other:?}"),
        }
    }
    Ok(model)
}

fn line_of(pair: &Pair<Rule>) -> usize {
    pair.as_span().start_pos().line_col().0
}

fn parse_include(pair: Pair<Rule>) -> String {
    let str_pair = pair.into_inner().next().expect("include has a string");
    unescape_string(str_pair)
}

/// `#include` is legal at top level or inside an architecture block
/// (spec.md §6); nested includes are returned alongside the architecture
/// and spliced into `FileModel::includes` by the caller so C2 sees one
/// flat, order-preserving list for this file.
fn build_architecture(pair: Pair<Rule>) -> Result<(RawArchitecture, Vec<String>), SyntaxError> {
    let mut inner = pair.into_inner();
    let name = inner.next().expect("architecture name").as_str().to_string();

    let mut arch = RawArchitecture {
        name,
        word_size: 0,
        endianness: None,
        ..Default::default()
    };
    let mut includes = Vec::new();

    for item in inner {
        match item.as_rule() {
            Rule::include_stmt => includes.push(parse_include(item)),
            Rule::prop_stmt => apply_arch_prop(&mut arch, item),
            Rule::register_decl => arch.registers.push(build_register(item)?),
            Rule::format_decl => arch.formats.push(build_format(item)?),
            Rule::bundle_format_decl => arch.bundle_formats.push(build_bundle_format(item)?),
            Rule::instruction_decl => arch.instructions.push(build_instruction(item)?),
            Rule::alias_decl => arch.aliases.push(build_alias(item)),
            other => unreachable!("unexpected architecture item {other:?}"),
        }
    }
    Ok((arch, includes))
}

fn apply_arch_prop(arch: &mut RawArchitecture, pair: Pair<Rule>) {
    let mut inner = pair.into_inner();
    let key = inner.next().unwrap().as_str();
    let value = inner.next().unwrap();
    match key {
        "word_size" => arch.word_size = parse_prop_int(value) as u32,
        "endianness" => {
            let v = prop_value_str(value);
            arch.endianness = Some(if v == "big" { Endianness::Big } else { Endianness::Little });
        }
        _ => {}
    }
}

fn parse_prop_int(value: Pair<Rule>) -> u64 {
    let inner = value.into_inner().next().unwrap();
    parse_int_lit(inner)
}

fn prop_value_str(value: Pair<Rule>) -> String {
    let inner = value.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::string_lit => unescape_string(inner),
        _ => inner.as_str().to_string(),
    }
}

// ---------- registers ----------

fn build_register(pair: Pair<Rule>) -> Result<RawRegister, SyntaxError> {
    let line = line_of(&pair);
    let mut inner = pair.into_inner();
    let kind_tok = inner.next().unwrap().as_str();
    let name = inner.next().unwrap().as_str().to_string();

    let mut width: Option<u32> = None;
    let mut count: Option<u32> = None;
    let mut lane_width: Option<u32> = None;
    let mut lane_count: Option<u32> = None;
    let mut total_width: Option<u32> = None;
    let mut components: Vec<VirtualComponent> = Vec::new();
    let mut target: Option<AliasTarget> = None;
    let mut fields = Vec::new();

    for item in inner {
        match item.as_rule() {
            Rule::field_decl => fields.push(build_register_field(item)),
            Rule::components_stmt => components = build_components(item),
            Rule::target_stmt => target = Some(build_alias_target(item)),
            Rule::prop_stmt => {
                let mut p = item.into_inner();
                let key = p.next().unwrap().as_str();
                let value = p.next().unwrap();
                match key {
                    "width" => width = Some(parse_prop_int(value) as u32),
                    "count" => count = Some(parse_prop_int(value) as u32),
                    "lane_width" => lane_width = Some(parse_prop_int(value) as u32),
                    "lane_count" => lane_count = Some(parse_prop_int(value) as u32),
                    "total_width" => total_width = Some(parse_prop_int(value) as u32),
                    _ => {}
                }
            }
            other => unreachable!("unexpected register item {other:?}"),
        }
    }

    let kind = match kind_tok {
        "file" => RegisterKind::File {
            element_width: width.unwrap_or(0),
            count: count.unwrap_or(1),
        },
        "scalar" => RegisterKind::Scalar { width: width.unwrap_or(0) },
        "vector" => {
            let lw = lane_width.unwrap_or(0);
            let lc = lane_count.unwrap_or(0);
            RegisterKind::Vector {
                total_width: total_width.unwrap_or(lw * lc),
                lane_width: lw,
                lane_count: lc,
                count,
            }
        }
        "virtual" => RegisterKind::Virtual {
            width: width.unwrap_or(0),
            components,
        },
        "alias" => RegisterKind::Alias {
            target: target.unwrap_or(AliasTarget::Scalar(String::new())),
        },
        other => {
            return Err(SyntaxError::Parse {
                file: String::new(),
                line,
                column: 0,
                expected: "register kind".to_string(),
                found: other.to_string(),
            });
        }
    };

    Ok(RawRegister { name, kind, fields, line })
}

fn build_register_field(pair: Pair<Rule>) -> RawRegisterField {
    let line = line_of(&pair);
    let mut inner = pair.into_inner();
    let name = inner.next().unwrap().as_str().to_string();
    let (lsb, msb) = build_bit_range(inner.next().unwrap());
    RawRegisterField { name, lsb, msb, line }
}

fn build_components(pair: Pair<Rule>) -> Vec<VirtualComponent> {
    pair.into_inner().map(build_component_ref).collect()
}

fn build_component_ref(pair: Pair<Rule>) -> VirtualComponent {
    let mut inner = pair.into_inner();
    let name = inner.next().unwrap().as_str().to_string();
    match inner.next() {
        Some(idx) => VirtualComponent::FileElement {
            file: name,
            index: parse_int_lit(idx) as u32,
        },
        None => VirtualComponent::Scalar(name),
    }
}

fn build_alias_target(pair: Pair<Rule>) -> AliasTarget {
    let component = pair.into_inner().next().unwrap();
    match build_component_ref(component) {
        VirtualComponent::FileElement { file, index } => AliasTarget::FileElement { file, index },
        VirtualComponent::Scalar(s) => AliasTarget::Scalar(s),
    }
}

// ---------- formats ----------

fn build_format(pair: Pair<Rule>) -> Result<RawFormat, SyntaxError> {
    let line = line_of(&pair);
    let mut inner = pair.into_inner();
    let name = inner.next().unwrap().as_str().to_string();

    let mut width = 0u32;
    let mut fields = Vec::new();
    let mut identification_fields = None;

    for item in inner {
        match item.as_rule() {
            Rule::format_field_decl => fields.push(build_format_field(item)),
            Rule::identification_stmt => identification_fields = Some(build_name_list(item)),
            Rule::prop_stmt => {
                let mut p = item.into_inner();
                let key = p.next().unwrap().as_str();
                let value = p.next().unwrap();
                if key == "width" {
                    width = parse_prop_int(value) as u32;
                }
            }
            other => unreachable!("unexpected format item {other:?}"),
        }
    }

    Ok(RawFormat { name, width, fields, identification_fields, line })
}

fn build_format_field(pair: Pair<Rule>) -> RawFormatField {
    let line = line_of(&pair);
    let mut inner = pair.into_inner();
    let name = inner.next().unwrap().as_str().to_string();
    let (lsb, msb) = build_bit_range(inner.next().unwrap());
    let constant = inner.next().map(parse_int_lit);
    RawFormatField { name, lsb, msb, constant, line }
}

fn build_name_list(pair: Pair<Rule>) -> Vec<String> {
    let list = pair.into_inner().next().unwrap();
    list.into_inner().map(|p| p.as_str().to_string()).collect()
}

fn build_bundle_format(pair: Pair<Rule>) -> Result<RawBundleFormat, SyntaxError> {
    let line = line_of(&pair);
    let mut inner = pair.into_inner();
    let name = inner.next().unwrap().as_str().to_string();

    let mut width = 0u32;
    let mut slots = Vec::new();
    let mut instruction_start = None;
    let mut identification_fields = None;

    for item in inner {
        match item.as_rule() {
            Rule::slot_decl => {
                let mut p = item.into_inner();
                let sname = p.next().unwrap().as_str().to_string();
                let (lsb, msb) = build_bit_range(p.next().unwrap());
                slots.push(RawSlot { name: sname, lsb, msb });
            }
            Rule::identification_stmt => identification_fields = Some(build_name_list(item)),
            Rule::prop_stmt => {
                let mut p = item.into_inner();
                let key = p.next().unwrap().as_str();
                let value = p.next().unwrap();
                match key {
                    "width" => width = parse_prop_int(value) as u32,
                    "instruction_start" => instruction_start = Some(parse_prop_int(value) as u32),
                    _ => {}
                }
            }
            other => unreachable!("unexpected bundle format item {other:?}"),
        }
    }

    Ok(RawBundleFormat { name, width, slots, instruction_start, identification_fields, line })
}

// ---------- instructions ----------

fn build_instruction(pair: Pair<Rule>) -> Result<RawInstruction, SyntaxError> {
    let line = line_of(&pair);
    let mut inner = pair.into_inner();
    let name = inner.next().unwrap().as_str().to_string();

    let mut format = None;
    let mut bundle_format = None;
    let mut encoding = BTreeMap::new();
    let mut operands = Vec::new();
    let mut syntax = None;
    let mut behavior = None;
    let mut external_behavior = false;

    for item in inner {
        match item.as_rule() {
            Rule::encoding_decl => {
                for f in item.into_inner() {
                    let mut p = f.into_inner();
                    let fname = p.next().unwrap().as_str().to_string();
                    let value = parse_int_lit(p.next().unwrap());
                    encoding.insert(fname, value);
                }
            }
            Rule::operands_decl => {
                operands = item
                    .into_inner()
                    .map(|op| {
                        let mut p = op.into_inner();
                        let oname = p.next().unwrap().as_str().to_string();
                        let rest: Vec<String> = p.map(|f| f.as_str().to_string()).collect();
                        if rest.is_empty() {
                            OperandDescriptor::Simple(oname)
                        } else {
                            OperandDescriptor::Distributed { name: oname, fields: rest }
                        }
                    })
                    .collect();
            }
            Rule::syntax_decl => syntax = Some(unescape_string(item.into_inner().next().unwrap())),
            Rule::behavior_decl => behavior = Some(build_block(item.into_inner().next().unwrap())?),
            Rule::external_behavior_stmt => external_behavior = true,
            Rule::prop_stmt => {
                let mut p = item.into_inner();
                let key = p.next().unwrap().as_str();
                let value = p.next().unwrap();
                match key {
                    "format" => format = Some(prop_value_str(value)),
                    "bundle_format" => bundle_format = Some(prop_value_str(value)),
                    _ => {}
                }
            }
            other => unreachable!("unexpected instruction item {other:?}"),
        }
    }

    Ok(RawInstruction {
        name,
        format: format.unwrap_or_default(),
        bundle_format,
        encoding,
        operands,
        syntax,
        behavior,
        external_behavior,
        line,
    })
}

fn build_alias(pair: Pair<Rule>) -> RawInstructionAlias {
    let line = line_of(&pair);
    let mut inner = pair.into_inner();
    let name = inner.next().unwrap().as_str().to_string();

    let mut target = String::new();
    let mut operands = Vec::new();
    let mut syntax = None;

    for item in inner.by_ref() {
        match item.as_rule() {
            Rule::target_instr_stmt => target = item.into_inner().next().unwrap().as_str().to_string(),
            Rule::operands_decl => {
                operands = item.into_inner().map(|op| op.into_inner().next().unwrap().as_str().to_string()).collect()
            }
            Rule::syntax_decl => syntax = Some(unescape_string(item.into_inner().next().unwrap())),
            Rule::prop_stmt => {}
            other => unreachable!("unexpected alias item {other:?}"),
        }
    }

    RawInstructionAlias { name, target, syntax, operands, line }
}

// ---------- RTL ----------

fn build_block(pair: Pair<Rule>) -> Result<RtlBlock, SyntaxError> {
    pair.into_inner().map(build_stmt).collect()
}

fn build_stmt(pair: Pair<Rule>) -> Result<Stmt, SyntaxError> {
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::assign_stmt => {
            let assign = inner.into_inner().next().unwrap();
            build_assign(assign).map(|(lv, e)| Stmt::Assign(lv, e))
        }
        Rule::if_stmt => {
            let mut p = inner.into_inner();
            let cond = expr::build_expr(p.next().unwrap())?;
            let then_block = build_block(p.next().unwrap())?;
            let else_block = match p.next() {
                Some(b) => build_block(b)?,
                None => Vec::new(),
            };
            Ok(Stmt::If(cond, then_block, else_block))
        }
        Rule::for_stmt => {
            let mut p = inner.into_inner();
            let (init_lv, init_e) = build_assign(p.next().unwrap())?;
            let cond = expr::build_expr(p.next().unwrap())?;
            let (step_lv, step_e) = build_assign(p.next().unwrap())?;
            let body = build_block(p.next().unwrap())?;
            Ok(Stmt::For {
                init: Box::new(Stmt::Assign(init_lv, init_e)),
                cond,
                step: Box::new(Stmt::Assign(step_lv, step_e)),
                body,
            })
        }
        other => unreachable!("unexpected statement rule {other:?}"),
    }
}

fn build_assign(pair: Pair<Rule>) -> Result<(crate::rtl::ast::Lvalue, crate::rtl::ast::Expr), SyntaxError> {
    let mut inner = pair.into_inner();
    let lv = expr::build_lvalue(inner.next().unwrap())?;
    let e = expr::build_expr(inner.next().unwrap())?;
    Ok((lv, e))
}

// ---------- lexical helpers ----------

pub fn build_bit_range(pair: Pair<Rule>) -> (u32, u32) {
    let mut inner = pair.into_inner();
    let a = parse_int_lit(inner.next().unwrap()) as u32;
    let b = parse_int_lit(inner.next().unwrap()) as u32;
    if a <= b { (a, b) } else { (b, a) }
}

pub fn parse_int_lit(pair: Pair<Rule>) -> u64 {
    let text = pair.as_str();
    if let Some(hex) = text.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).unwrap_or(0)
    } else if let Some(bin) = text.strip_prefix("0b") {
        u64::from_str_radix(bin, 2).unwrap_or(0)
    } else {
        text.parse().unwrap_or(0)
    }
}

pub fn unescape_string(pair: Pair<Rule>) -> String {
    let inner = pair.into_inner().next().unwrap();
    let raw = inner.as_str();
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
