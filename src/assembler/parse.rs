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

//! Turns tokenized lines into `AssemblyLine`s. A label may appear on its
//! own line or prefix an instruction (spec.md §4.9); both forms are
//! represented uniformly by letting one physical line yield a `Label`
//! entry followed optionally by an `Instruction`/`Bundle`/`Directive` entry.
//! `bundle{stmt1; stmt2; ...}` separates its slot statements with `;` so
//! that a slot's own comma-separated operand list is unambiguous.

use super::ast::{AssemblyLine, Directive, InstructionStmt, Operand};
use super::lexer::{Token, tokenize_line};
use crate::errors::AssembleError;

pub fn parse_source(file: &str, source: &str) -> Result<Vec<AssemblyLine>, AssembleError> {
    let mut out = Vec::new();
    for (idx, raw_line) in source.lines().enumerate() {
        let line_no = idx + 1;
        let tokens = tokenize_line(file, line_no, raw_line)?;
        if tokens.is_empty() {
            continue;
        }
        parse_tokens(file, line_no, tokens, &mut out)?;
    }
    Ok(out)
}

fn parse_tokens(file: &str, line_no: usize, mut tokens: Vec<Token>, out: &mut Vec<AssemblyLine>) -> Result<(), AssembleError> {
    if tokens.len() >= 2 {
        if let (Token::Ident(name), Token::Colon) = (&tokens[0], &tokens[1]) {
            out.push(AssemblyLine::Label { name: name.clone(), line: line_no });
            tokens.drain(0..2);
        }
    }
    if tokens.is_empty() {
        return Ok(());
    }

    match &tokens[0] {
        Token::Directive(name) => {
            let directive = parse_directive(file, line_no, name, &tokens[1..])?;
            out.push(AssemblyLine::Directive { directive, line: line_no });
        }
        Token::Ident(mnemonic) if mnemonic.eq_ignore_ascii_case("bundle") => {
            let subs = parse_bundle(file, line_no, &tokens[1..])?;
            out.push(AssemblyLine::Bundle { subs, line: line_no });
        }
        Token::Ident(mnemonic) => {
            let operands = parse_operand_list(file, line_no, &tokens[1..])?;
            out.push(AssemblyLine::Instruction {
                stmt: InstructionStmt { mnemonic: mnemonic.clone(), operands },
                line: line_no,
            });
        }
        other => {
            return Err(syntax(file, line_no, &format!("expected a mnemonic, directive, or label, found {other:?}")));
        }
    }
    Ok(())
}

fn parse_directive(file: &str, line_no: usize, name: &str, rest: &[Token]) -> Result<Directive, AssembleError> {
    match name {
        "define" => {
            let (name_tok, rest) = rest.split_first().ok_or_else(|| syntax(file, line_no, "`.define` requires a name"))?;
            let name = match name_tok {
                Token::Ident(n) => n.clone(),
                other => return Err(syntax(file, line_no, &format!("expected identifier after `.define`, found {other:?}"))),
            };
            // optional comma between name and value: `.define NAME, value` or `.define NAME value`
            let rest = match rest.first() {
                Some(Token::Comma) => &rest[1..],
                _ => rest,
            };
            let value = parse_one_operand(file, line_no, rest)?;
            Ok(Directive::Define(name, value))
        }
        "org" => Ok(Directive::Org(parse_one_operand(file, line_no, rest)?)),
        "byte" => Ok(Directive::Byte(parse_operand_list(file, line_no, rest)?)),
        "word" => Ok(Directive::Word(parse_operand_list(file, line_no, rest)?)),
        other => Err(syntax(file, line_no, &format!("unknown directive `.{other}`"))),
    }
}

fn parse_one_operand(file: &str, line_no: usize, tokens: &[Token]) -> Result<Operand, AssembleError> {
    let ops = parse_operand_list(file, line_no, tokens)?;
    match ops.len() {
        1 => Ok(ops.into_iter().next().unwrap()),
        _ => Err(syntax(file, line_no, "expected exactly one operand")),
    }
}

fn parse_operand_list(file: &str, line_no: usize, tokens: &[Token]) -> Result<Vec<Operand>, AssembleError> {
    let mut operands = Vec::new();
    let mut expect_operand = true;
    for tok in tokens {
        match tok {
            Token::Comma => {
                if expect_operand {
                    return Err(syntax(file, line_no, "unexpected `,`"));
                }
                expect_operand = true;
            }
            Token::Ident(name) => {
                if !expect_operand {
                    return Err(syntax(file, line_no, "expected `,` between operands"));
                }
                operands.push(Operand::Ident(name.clone()));
                expect_operand = false;
            }
            Token::IntLit(v) => {
                if !expect_operand {
                    return Err(syntax(file, line_no, "expected `,` between operands"));
                }
                operands.push(Operand::Immediate(*v));
                expect_operand = false;
            }
            other => return Err(syntax(file, line_no, &format!("unexpected token {other:?} in operand list"))),
        }
    }
    if expect_operand && !operands.is_empty() {
        return Err(syntax(file, line_no, "trailing `,`"));
    }
    Ok(operands)
}

fn parse_bundle(file: &str, line_no: usize, tokens: &[Token]) -> Result<Vec<InstructionStmt>, AssembleError> {
    if tokens.first() != Some(&Token::LBrace) {
        return Err(syntax(file, line_no, "expected `{` after `bundle`"));
    }
    let end = tokens
        .iter()
        .rposition(|t| *t == Token::RBrace)
        .ok_or_else(|| syntax(file, line_no, "unterminated `bundle{...}`"))?;
    let inner = &tokens[1..end];

    let mut subs = Vec::new();
    for stmt_tokens in inner.split(|t| *t == Token::Semicolon) {
        if stmt_tokens.is_empty() {
            continue;
        }
        let mnemonic = match &stmt_tokens[0] {
            Token::Ident(m) => m.clone(),
            other => return Err(syntax(file, line_no, &format!("expected mnemonic in bundle slot, found {other:?}"))),
        };
        let operands = parse_operand_list(file, line_no, &stmt_tokens[1..])?;
        subs.push(InstructionStmt { mnemonic, operands });
    }
    Ok(subs)
}

fn syntax(file: &str, line: usize, reason: &str) -> AssembleError {
    AssembleError::Syntax { file: file.to_string(), line, reason: reason.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_and_instruction_share_a_line() {
        let lines = parse_source("t.s", "loop: ADD R1, R2, R3").unwrap();
        assert_eq!(lines.len(), 2);
        assert!(matches!(&lines[0], AssemblyLine::Label { name, .. } if name == "loop"));
        assert!(matches!(&lines[1], AssemblyLine::Instruction { .. }));
    }

    #[test]
    fn bundle_splits_slots_on_semicolon() {
        let lines = parse_source("t.s", "bundle{ADD R1, R2, R3; SUB R4, R5, R6}").unwrap();
        assert_eq!(lines.len(), 1);
        match &lines[0] {
            AssemblyLine::Bundle { subs, .. } => {
                assert_eq!(subs.len(), 2);
                assert_eq!(subs[0].mnemonic, "ADD");
                assert_eq!(subs[1].mnemonic, "SUB");
            }
            other => panic!("expected bundle, got {other:?}"),
        }
    }

    #[test]
    fn define_directive_with_and_without_comma() {
        let a = parse_source("t.s", ".define FOO, 5").unwrap();
        let b = parse_source("t.s", ".define FOO 5").unwrap();
        assert_eq!(a, b);
    }
}
