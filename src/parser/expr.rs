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

//! Builds `crate::rtl::ast` expressions/lvalues from the precedence-climbing
//! grammar rules (`ternary`, `cmp`, `bit_or`, ... down to `atom`).

use super::{Rule, parse_int_lit};
use crate::errors::SyntaxError;
use crate::rtl::ast::{BinOp, Expr, Lvalue, MemWidth, UnOp};
use pest::iterators::Pair;

pub fn build_expr(pair: Pair<Rule>) -> Result<Expr, SyntaxError> {
    build_ternary(pair.into_inner().next().unwrap())
}

fn build_ternary(pair: Pair<Rule>) -> Result<Expr, SyntaxError> {
    let mut inner = pair.into_inner();
    let cond = build_cmp(inner.next().unwrap())?;
    match (inner.next(), inner.next()) {
        (Some(t), Some(f)) => Ok(Expr::Ternary(Box::new(cond), Box::new(build_expr(t)?), Box::new(build_expr(f)?))),
        _ => Ok(cond),
    }
}

fn build_cmp(pair: Pair<Rule>) -> Result<Expr, SyntaxError> {
    build_left_assoc(pair, build_bit_or, |op| match op {
        "==" => BinOp::Eq,
        "!=" => BinOp::Ne,
        "<=" => BinOp::Le,
        ">=" => BinOp::Ge,
        "<" => BinOp::Lt,
        ">" => BinOp::Gt,
        other => unreachable!("unexpected comparison operator {other}"),
    })
}

fn build_bit_or(pair: Pair<Rule>) -> Result<Expr, SyntaxError> {
    build_left_assoc(pair, build_bit_xor, |_| BinOp::Or)
}

fn build_bit_xor(pair: Pair<Rule>) -> Result<Expr, SyntaxError> {
    build_left_assoc(pair, build_bit_and, |_| BinOp::Xor)
}

fn build_bit_and(pair: Pair<Rule>) -> Result<Expr, SyntaxError> {
    build_left_assoc(pair, build_shift, |_| BinOp::And)
}

fn build_shift(pair: Pair<Rule>) -> Result<Expr, SyntaxError> {
    build_left_assoc(pair, build_additive, |op| match op {
        "<<" => BinOp::Shl,
        ">>" => BinOp::Shr,
        other => unreachable!("unexpected shift operator {other}"),
    })
}

fn build_additive(pair: Pair<Rule>) -> Result<Expr, SyntaxError> {
    build_left_assoc(pair, build_multiplicative, |op| match op {
        "+" => BinOp::Add,
        "-" => BinOp::Sub,
        other => unreachable!("unexpected additive operator {other}"),
    })
}

fn build_multiplicative(pair: Pair<Rule>) -> Result<Expr, SyntaxError> {
    build_left_assoc(pair, build_unary, |op| match op {
        "*" => BinOp::Mul,
        "/" => BinOp::Div,
        "%" => BinOp::Mod,
        other => unreachable!("unexpected multiplicative operator {other}"),
    })
}

/// Every left-associative binary level shares the shape `operand (op
/// operand)*`; `op_rule` pairs come interleaved with `operand` pairs in
/// `pair`'s children.
fn build_left_assoc(
    pair: Pair<Rule>,
    mut operand: impl FnMut(Pair<Rule>) -> Result<Expr, SyntaxError>,
    op_of: impl Fn(&str) -> BinOp,
) -> Result<Expr, SyntaxError> {
    let mut children = pair.into_inner();
    let mut acc = operand(children.next().unwrap())?;
    while let Some(op_pair) = children.next() {
        let op = op_of(op_pair.as_str());
        let rhs = operand(children.next().unwrap())?;
        acc = Expr::Binary(op, Box::new(acc), Box::new(rhs));
    }
    Ok(acc)
}

fn build_unary(pair: Pair<Rule>) -> Result<Expr, SyntaxError> {
    let mut ops = Vec::new();
    let mut postfix_pair = None;
    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::unary_op => ops.push(match item.as_str() {
                "-" => UnOp::Neg,
                "~" => UnOp::Not,
                other => unreachable!("unexpected unary operator {other}"),
            }),
            Rule::postfix => postfix_pair = Some(item),
            other => unreachable!("unexpected unary child {other:?}"),
        }
    }
    let mut expr = build_postfix(postfix_pair.unwrap())?;
    for op in ops.into_iter().rev() {
        expr = Expr::Unary(op, Box::new(expr));
    }
    Ok(expr)
}

fn build_postfix(pair: Pair<Rule>) -> Result<Expr, SyntaxError> {
    let mut inner = pair.into_inner();
    let atom = build_atom(inner.next().unwrap())?;
    match inner.next() {
        Some(suffix) => {
            let mut s = suffix.into_inner();
            let msb = build_expr(s.next().unwrap())?;
            let lsb = build_expr(s.next().unwrap())?;
            Ok(Expr::BitExtract(Box::new(atom), Box::new(msb), Box::new(lsb)))
        }
        None => Ok(atom),
    }
}

fn build_atom(pair: Pair<Rule>) -> Result<Expr, SyntaxError> {
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::call_expr => {
            let mut p = inner.into_inner();
            let name = p.next().unwrap().as_str().to_string();
            let args = p.map(build_expr).collect::<Result<Vec<_>, _>>()?;
            Ok(Expr::Call(name, args))
        }
        Rule::mem_expr => {
            let mut p = inner.into_inner();
            let width = mem_width(p.next().unwrap().as_str());
            let addr = build_expr(p.next().unwrap())?;
            Ok(Expr::Mem(Box::new(addr), width))
        }
        Rule::vector_expr => {
            let mut p = inner.into_inner();
            let name = p.next().unwrap().as_str().to_string();
            let idx = build_expr(p.next().unwrap())?;
            let lane = build_expr(p.next().unwrap())?;
            Ok(Expr::VectorLane(name, Box::new(idx), Box::new(lane)))
        }
        Rule::indexed_expr => {
            let mut p = inner.into_inner();
            let name = p.next().unwrap().as_str().to_string();
            let idx = build_expr(p.next().unwrap())?;
            Ok(Expr::Indexed(name, Box::new(idx)))
        }
        Rule::field_expr => {
            let mut p = inner.into_inner();
            let name = p.next().unwrap().as_str().to_string();
            let field = p.next().unwrap().as_str().to_string();
            Ok(Expr::RegField(name, field))
        }
        Rule::int_lit => Ok(Expr::IntLit(parse_int_lit(inner) as u128)),
        Rule::ident => Ok(Expr::Scalar(inner.as_str().to_string())),
        Rule::expr => build_expr(inner),
        other => unreachable!("unexpected atom rule {other:?}"),
    }
}

pub fn build_lvalue(pair: Pair<Rule>) -> Result<Lvalue, SyntaxError> {
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::mem_lvalue => {
            let mut p = inner.into_inner();
            let width = mem_width(p.next().unwrap().as_str());
            let addr = build_expr(p.next().unwrap())?;
            Ok(Lvalue::Mem(addr, width))
        }
        Rule::vector_lvalue => {
            let mut p = inner.into_inner();
            let name = p.next().unwrap().as_str().to_string();
            let idx = build_expr(p.next().unwrap())?;
            let lane = build_expr(p.next().unwrap())?;
            Ok(Lvalue::VectorLane(name, idx, lane))
        }
        Rule::indexed_lvalue => {
            let mut p = inner.into_inner();
            let name = p.next().unwrap().as_str().to_string();
            let idx = build_expr(p.next().unwrap())?;
            Ok(Lvalue::Indexed(name, idx))
        }
        Rule::field_lvalue => {
            let mut p = inner.into_inner();
            let name = p.next().unwrap().as_str().to_string();
            let field = p.next().unwrap().as_str().to_string();
            Ok(Lvalue::RegField(name, field))
        }
        Rule::scalar_lvalue => Ok(Lvalue::Scalar(inner.into_inner().next().unwrap().as_str().to_string())),
        other => unreachable!("unexpected lvalue rule {other:?}"),
    }
}

fn mem_width(tok: &str) -> MemWidth {
    match tok {
        "MEM8" => MemWidth::Bytes(1),
        "MEM16" => MemWidth::Bytes(2),
        "MEM32" => MemWidth::Bytes(4),
        "MEM64" => MemWidth::Bytes(8),
        _ => MemWidth::Word,
    }
}
