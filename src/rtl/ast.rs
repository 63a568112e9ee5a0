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

//! RTL expression/statement AST (C6). Built by the parser, walked by
//! `crate::rtl::eval` and cross-checked by `crate::validator`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

/// Byte width of a memory access. `Word` means "the architecture's
/// `word_size`", used by the bare `MEM[addr]` form; the others are the
/// explicit `MEM8`/`MEM16`/`MEM32`/`MEM64` forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemWidth {
    Word,
    Bytes(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntLit(u128),
    /// Reference to an operand of the enclosing instruction.
    Operand(String),
    /// A bare scalar register, alias, or temporary name.
    Scalar(String),
    /// `name.field`
    RegField(String, String),
    /// `name[index]` where `name` names a register file.
    Indexed(String, Box<Expr>),
    /// `name[index][lane]` where `name` names a vector register (file).
    VectorLane(String, Box<Expr>, Box<Expr>),
    Mem(Box<Expr>, MemWidth),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    /// `x[msb:lsb]`
    BitExtract(Box<Expr>, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Lvalue {
    Scalar(String),
    RegField(String, String),
    Indexed(String, Expr),
    VectorLane(String, Expr, Expr),
    Mem(Expr, MemWidth),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign(Lvalue, Expr),
    If(Expr, Block, Block),
    For {
        init: Box<Stmt>,
        cond: Expr,
        step: Box<Stmt>,
        body: Block,
    },
}

pub type Block = Vec<Stmt>;

/// Arity table for built-in functions, used by both the evaluator and the
/// validator (spec.md §4.5 item 11, §4.6 built-ins table).
pub fn builtin_arity(name: &str) -> Option<(usize, usize)> {
    match name {
        "sign_extend" | "sext" | "sx" => Some((2, 3)),
        "zero_extend" | "zext" | "zx" => Some((2, 3)),
        "extract_bits" => Some((3, 3)),
        "to_signed" => Some((2, 2)),
        "to_unsigned" => Some((2, 2)),
        "ssov" => Some((2, 2)),
        "suov" => Some((2, 2)),
        "carry" => Some((3, 3)),
        "borrow" => Some((3, 3)),
        "reverse16" => Some((1, 1)),
        "leading_ones" | "leading_zeros" | "leading_signs" => Some((1, 1)),
        _ => None,
    }
}
