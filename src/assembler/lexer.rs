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

//! Line-oriented hand-rolled tokenizer for assembly source (spec.md §6:
//! "`#` begins a line comment; `label:` declares an address; `mnemonic
//! op1, op2, ...` is a statement"). Mnemonics and register names are not
//! grammar-level concepts here; they fall out as plain identifiers that
//! the assembler resolves against the loaded `Model`.

use crate::errors::AssembleError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    IntLit(u64),
    Comma,
    Colon,
    Semicolon,
    LBrace,
    RBrace,
    /// A `.name` directive keyword, or a `#name` preprocessor directive
    /// (spec.md §3 supplemented `.define`/`#define`).
    Directive(String),
}

pub fn tokenize_line(file: &str, line_no: usize, raw: &str) -> Result<Vec<Token>, AssembleError> {
    let line = strip_comment(raw);
    let mut tokens = Vec::new();
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            ';' => {
                tokens.push(Token::Semicolon);
                i += 1;
            }
            '{' => {
                tokens.push(Token::LBrace);
                i += 1;
            }
            '}' => {
                tokens.push(Token::RBrace);
                i += 1;
            }
            '.' | '#' => {
                let start = i;
                i += 1;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start + 1..i].iter().collect();
                if word.is_empty() {
                    return Err(AssembleError::Syntax {
                        file: file.to_string(),
                        line: line_no,
                        reason: format!("stray `{c}` with no directive name"),
                    });
                }
                tokens.push(Token::Directive(word));
            }
            _ if c.is_ascii_digit() => {
                let start = i;
                if c == '0' && i + 1 < chars.len() && (chars[i + 1] == 'x' || chars[i + 1] == 'X') {
                    i += 2;
                    while i < chars.len() && chars[i].is_ascii_hexdigit() {
                        i += 1;
                    }
                    let text: String = chars[start + 2..i].iter().collect();
                    let value = u64::from_str_radix(&text, 16).map_err(|_| AssembleError::Syntax {
                        file: file.to_string(),
                        line: line_no,
                        reason: format!("invalid hex literal `{}`", chars[start..i].iter().collect::<String>()),
                    })?;
                    tokens.push(Token::IntLit(value));
                } else if c == '0' && i + 1 < chars.len() && (chars[i + 1] == 'b' || chars[i + 1] == 'B') {
                    i += 2;
                    while i < chars.len() && (chars[i] == '0' || chars[i] == '1') {
                        i += 1;
                    }
                    let text: String = chars[start + 2..i].iter().collect();
                    let value = u64::from_str_radix(&text, 2).map_err(|_| AssembleError::Syntax {
                        file: file.to_string(),
                        line: line_no,
                        reason: format!("invalid binary literal `{}`", chars[start..i].iter().collect::<String>()),
                    })?;
                    tokens.push(Token::IntLit(value));
                } else {
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                    let text: String = chars[start..i].iter().collect();
                    let value = text.parse::<u64>().map_err(|_| AssembleError::Syntax {
                        file: file.to_string(),
                        line: line_no,
                        reason: format!("invalid decimal literal `{text}`"),
                    })?;
                    tokens.push(Token::IntLit(value));
                }
            }
            _ if is_ident_start(c) => {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Ident(text));
            }
            _ => {
                return Err(AssembleError::Syntax {
                    file: file.to_string(),
                    line: line_no,
                    reason: format!("unexpected character `{c}`"),
                });
            }
        }
    }

    Ok(tokens)
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        // A leading `#define` is a directive, not a comment; anything else
        // starting with `#` mid-line is a comment to end of line.
        Some(idx) if line[idx..].starts_with("#define") => line,
        Some(idx) => &line[..idx],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_instruction_with_register_and_immediate_operands() {
        let tokens = tokenize_line("t.s", 1, "ADD R1, R2, 0x0A").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("ADD".into()),
                Token::Ident("R1".into()),
                Token::Comma,
                Token::Ident("R2".into()),
                Token::Comma,
                Token::IntLit(10),
            ]
        );
    }

    #[test]
    fn strips_trailing_comment() {
        let tokens = tokenize_line("t.s", 1, "ADD R1, R2 # bump counter").unwrap();
        assert_eq!(tokens, vec![Token::Ident("ADD".into()), Token::Ident("R1".into()), Token::Comma, Token::Ident("R2".into())]);
    }

    #[test]
    fn recognizes_label_colon() {
        let tokens = tokenize_line("t.s", 1, "loop:").unwrap();
        assert_eq!(tokens, vec![Token::Ident("loop".into()), Token::Colon]);
    }
}
