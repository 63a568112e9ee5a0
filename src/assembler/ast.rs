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

//! Assembly-source AST (spec.md §4.9, §6). Mnemonics, register names and
//! directive shapes all come from the loaded `Model` rather than the
//! grammar, so this is a thin line-oriented structure rather than a `pest`
//! grammar.

/// One operand token before semantic resolution. Which of these a bare
/// identifier turns out to be (register, label, or constant) is decided
/// against the loaded `Model` and the running symbol/constant tables, not
/// by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Immediate(u64),
    Ident(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// `.define NAME, value` / `#define NAME value`
    Define(String, Operand),
    /// `.org <addr>`
    Org(Operand),
    /// `.byte b1, b2, ...`
    Byte(Vec<Operand>),
    /// `.word w1, w2, ...`
    Word(Vec<Operand>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstructionStmt {
    pub mnemonic: String,
    pub operands: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssemblyLine {
    /// `label:` with no other content on the line.
    Label { name: String, line: usize },
    Instruction { stmt: InstructionStmt, line: usize },
    /// `bundle{ stmt1, stmt2, ... }`
    Bundle { subs: Vec<InstructionStmt>, line: usize },
    Directive { directive: Directive, line: usize },
}

impl AssemblyLine {
    pub fn line(&self) -> usize {
        match self {
            AssemblyLine::Label { line, .. } => *line,
            AssemblyLine::Instruction { line, .. } => *line,
            AssemblyLine::Bundle { line, .. } => *line,
            AssemblyLine::Directive { line, .. } => *line,
        }
    }
}
