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

//! Item 11 of spec.md §4.5: every name an RTL behavior block references
//! must resolve, indexed/field/vector accesses must target a register of
//! the matching kind, and every built-in call must match §4.6's arity
//! table (and, where the width argument is a literal, its legal range).

use super::{ValidationError, ValidationErrorKind, push};
use crate::model::raw::{RawRegister, RegisterKind};
use crate::rtl::ast::{Block, Expr, Lvalue, Stmt, builtin_arity};
use std::collections::{HashMap, HashSet};

pub fn check_block(
    block: &Block,
    operand_names: &HashSet<String>,
    registers: &HashMap<&str, &RawRegister>,
    loc: &str,
    errors: &mut Vec<ValidationError>,
) {
    let mut temps: HashSet<String> = HashSet::new();
    walk_block(block, operand_names, registers, &mut temps, loc, errors);
}

fn walk_block(
    block: &Block,
    operands: &HashSet<String>,
    registers: &HashMap<&str, &RawRegister>,
    temps: &mut HashSet<String>,
    loc: &str,
    errors: &mut Vec<ValidationError>,
) {
    for stmt in block {
        walk_stmt(stmt, operands, registers, temps, loc, errors);
    }
}

fn walk_stmt(
    stmt: &Stmt,
    operands: &HashSet<String>,
    registers: &HashMap<&str, &RawRegister>,
    temps: &mut HashSet<String>,
    loc: &str,
    errors: &mut Vec<ValidationError>,
) {
    match stmt {
        Stmt::Assign(lv, e) => {
            walk_expr(e, operands, registers, temps, loc, errors);
            walk_lvalue(lv, operands, registers, temps, loc, errors);
            if let Lvalue::Scalar(name) = lv {
                if !operands.contains(name) && !registers.contains_key(name.as_str()) {
                    temps.insert(name.clone());
                }
            }
        }
        Stmt::If(cond, then_block, else_block) => {
            walk_expr(cond, operands, registers, temps, loc, errors);
            walk_block(then_block, operands, registers, temps, loc, errors);
            walk_block(else_block, operands, registers, temps, loc, errors);
        }
        Stmt::For { init, cond, step, body } => {
            walk_stmt(init, operands, registers, temps, loc, errors);
            walk_expr(cond, operands, registers, temps, loc, errors);
            walk_stmt(step, operands, registers, temps, loc, errors);
            walk_block(body, operands, registers, temps, loc, errors);
        }
    }
}

fn walk_lvalue(
    lv: &Lvalue,
    operands: &HashSet<String>,
    registers: &HashMap<&str, &RawRegister>,
    temps: &mut HashSet<String>,
    loc: &str,
    errors: &mut Vec<ValidationError>,
) {
    match lv {
        Lvalue::Scalar(_) => {}
        Lvalue::RegField(name, field) => check_field_access(name, field, registers, loc, errors),
        Lvalue::Indexed(name, idx) => {
            check_indexed_access(name, registers, loc, errors);
            walk_expr(idx, operands, registers, temps, loc, errors);
        }
        Lvalue::VectorLane(name, idx, lane) => {
            check_vector_access(name, registers, loc, errors);
            walk_expr(idx, operands, registers, temps, loc, errors);
            walk_expr(lane, operands, registers, temps, loc, errors);
        }
        Lvalue::Mem(addr, _) => walk_expr(addr, operands, registers, temps, loc, errors),
    }
}

fn walk_expr(
    expr: &Expr,
    operands: &HashSet<String>,
    registers: &HashMap<&str, &RawRegister>,
    temps: &mut HashSet<String>,
    loc: &str,
    errors: &mut Vec<ValidationError>,
) {
    match expr {
        Expr::IntLit(_) => {}
        Expr::Operand(_) => {}
        Expr::Scalar(name) => {
            if !operands.contains(name) && !temps.contains(name) && !registers.contains_key(name.as_str()) {
                push(errors, ValidationErrorKind::RtlReferenceNotFound, loc, format!("`{name}` is not an operand, register, or previously assigned temporary"));
            }
        }
        Expr::RegField(name, field) => check_field_access(name, field, registers, loc, errors),
        Expr::Indexed(name, idx) => {
            check_indexed_access(name, registers, loc, errors);
            walk_expr(idx, operands, registers, temps, loc, errors);
        }
        Expr::VectorLane(name, idx, lane) => {
            check_vector_access(name, registers, loc, errors);
            walk_expr(idx, operands, registers, temps, loc, errors);
            walk_expr(lane, operands, registers, temps, loc, errors);
        }
        Expr::Mem(addr, _) => walk_expr(addr, operands, registers, temps, loc, errors),
        Expr::Unary(_, e) => walk_expr(e, operands, registers, temps, loc, errors),
        Expr::Binary(_, a, b) => {
            walk_expr(a, operands, registers, temps, loc, errors);
            walk_expr(b, operands, registers, temps, loc, errors);
        }
        Expr::Ternary(c, a, b) => {
            walk_expr(c, operands, registers, temps, loc, errors);
            walk_expr(a, operands, registers, temps, loc, errors);
            walk_expr(b, operands, registers, temps, loc, errors);
        }
        Expr::BitExtract(v, msb, lsb) => {
            walk_expr(v, operands, registers, temps, loc, errors);
            walk_expr(msb, operands, registers, temps, loc, errors);
            walk_expr(lsb, operands, registers, temps, loc, errors);
        }
        Expr::Call(name, args) => {
            check_call(name, args, loc, errors);
            for a in args {
                walk_expr(a, operands, registers, temps, loc, errors);
            }
        }
    }
}

fn check_field_access(name: &str, field: &str, registers: &HashMap<&str, &RawRegister>, loc: &str, errors: &mut Vec<ValidationError>) {
    match registers.get(name) {
        None => push(errors, ValidationErrorKind::RtlReferenceNotFound, loc, format!("register `{name}` not found")),
        Some(reg) => {
            if !reg.fields.iter().any(|f| f.name == field) {
                push(errors, ValidationErrorKind::UnknownField, loc, format!("`{name}` has no field `{field}`"));
            }
        }
    }
}

fn check_indexed_access(name: &str, registers: &HashMap<&str, &RawRegister>, loc: &str, errors: &mut Vec<ValidationError>) {
    match registers.get(name) {
        None => push(errors, ValidationErrorKind::RtlReferenceNotFound, loc, format!("register file `{name}` not found")),
        Some(reg) => {
            if !matches!(reg.kind, RegisterKind::File { .. }) {
                push(errors, ValidationErrorKind::RtlReferenceNotFound, loc, format!("`{name}` is not a register file"));
            }
        }
    }
}

fn check_vector_access(name: &str, registers: &HashMap<&str, &RawRegister>, loc: &str, errors: &mut Vec<ValidationError>) {
    match registers.get(name) {
        None => push(errors, ValidationErrorKind::RtlReferenceNotFound, loc, format!("vector register `{name}` not found")),
        Some(reg) => {
            if !matches!(reg.kind, RegisterKind::Vector { .. }) {
                push(errors, ValidationErrorKind::RtlReferenceNotFound, loc, format!("`{name}` is not a vector register"));
            }
        }
    }
}

/// Positions of width-like arguments for each built-in that takes one,
/// checked only when the argument is a literal (dynamic values are a
/// runtime `RtlError::BadWidth`, spec.md §4.6).
fn width_arg_positions(name: &str) -> &'static [usize] {
    match name {
        "sign_extend" | "sext" | "sx" | "zero_extend" | "zext" | "zx"
        | "to_signed" | "to_unsigned" | "ssov" | "suov" => &[1],
        _ => &[],
    }
}

fn check_call(name: &str, args: &[Expr], loc: &str, errors: &mut Vec<ValidationError>) {
    match builtin_arity(name) {
        None => push(errors, ValidationErrorKind::BuiltinArity, loc, format!("unknown built-in function `{name}`")),
        Some((min, max)) => {
            if args.len() < min || args.len() > max {
                push(errors, ValidationErrorKind::BuiltinArity, loc, format!("`{name}` expects {min}..={max} argument(s), got {}", args.len()));
                return;
            }
            for &pos in width_arg_positions(name) {
                if let Some(Expr::IntLit(v)) = args.get(pos) {
                    if *v == 0 || *v > 64 {
                        push(errors, ValidationErrorKind::BuiltinWidthOutOfRange, loc, format!("`{name}` width argument {v} outside [1,64]"));
                    }
                }
            }
        }
    }
}
