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

//! Unresolved, string-keyed model produced by C3 (model builder) and
//! combined by C4 (merger). Every cross reference here is a bare name;
//! `crate::validator` resolves names into the arena-indexed `Model` of
//! `crate::model` while checking every invariant of spec.md §4.5.

use crate::rtl::ast::Block as RtlBlock;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawRegisterField {
    pub name: String,
    pub lsb: u32,
    pub msb: u32,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VirtualComponent {
    FileElement { file: String, index: u32 },
    Scalar(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AliasTarget {
    Scalar(String),
    FileElement { file: String, index: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegisterKind {
    File {
        element_width: u32,
        count: u32,
    },
    Scalar {
        width: u32,
    },
    Vector {
        total_width: u32,
        lane_width: u32,
        lane_count: u32,
        count: Option<u32>,
    },
    Virtual {
        width: u32,
        components: Vec<VirtualComponent>,
    },
    Alias {
        target: AliasTarget,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawRegister {
    pub name: String,
    pub kind: RegisterKind,
    pub fields: Vec<RawRegisterField>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawFormatField {
    pub name: String,
    pub lsb: u32,
    pub msb: u32,
    pub constant: Option<u64>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawFormat {
    pub name: String,
    pub width: u32,
    pub fields: Vec<RawFormatField>,
    /// `None` means "use the default" (computed during validation once every
    /// instruction's encoding is known, spec.md §3 Format).
    pub identification_fields: Option<Vec<String>>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawSlot {
    pub name: String,
    pub lsb: u32,
    pub msb: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawBundleFormat {
    pub name: String,
    pub width: u32,
    pub slots: Vec<RawSlot>,
    pub instruction_start: Option<u32>,
    pub identification_fields: Option<Vec<String>>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperandDescriptor {
    Simple(String),
    Distributed { name: String, fields: Vec<String> },
}

impl OperandDescriptor {
    pub fn name(&self) -> &str {
        match self {
            OperandDescriptor::Simple(n) => n,
            OperandDescriptor::Distributed { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawInstruction {
    pub name: String,
    pub format: String,
    pub bundle_format: Option<String>,
    pub encoding: BTreeMap<String, u64>,
    pub operands: Vec<OperandDescriptor>,
    pub syntax: Option<String>,
    pub behavior: Option<RtlBlock>,
    pub external_behavior: bool,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawInstructionAlias {
    pub name: String,
    pub target: String,
    pub syntax: Option<String>,
    pub operands: Vec<String>,
    pub line: usize,
}

/// A single `.isa` architecture declaration, already include-expanded and
/// merge/inheritance-resolved by C4, but with all cross references still
/// bare names (C5's job to resolve and gate).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawArchitecture {
    pub name: String,
    pub word_size: u32,
    pub endianness: Option<Endianness>,
    pub registers: Vec<RawRegister>,
    pub formats: Vec<RawFormat>,
    pub bundle_formats: Vec<RawBundleFormat>,
    pub instructions: Vec<RawInstruction>,
    pub aliases: Vec<RawInstructionAlias>,
}

impl Default for Endianness {
    fn default() -> Self {
        Endianness::Little
    }
}
