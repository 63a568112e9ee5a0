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

//! The validated, immutable ISA model (spec.md §3). Entities are owned by
//! arena vectors on `Model`; every cross reference is an index newtype
//! resolved once by `crate::validator` (design notes §9: "cross-cutting
//! references by name ... resolved eagerly into indices into arena-owned
//! tables").

pub mod raw;

use std::collections::HashMap;

pub use raw::{AliasTarget, Endianness, VirtualComponent};
use crate::rtl::ast::Block as RtlBlock;

macro_rules! arena_index {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_index!(RegIdx);
arena_index!(FormatIdx);
arena_index!(BundleFormatIdx);
arena_index!(InstrIdx);
arena_index!(AliasIdx);

#[derive(Debug, Clone, PartialEq)]
pub struct RegisterField {
    pub name: String,
    pub lsb: u32,
    pub msb: u32,
}

impl RegisterField {
    pub fn width(&self) -> u32 {
        self.msb - self.lsb + 1
    }
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
pub struct Register {
    pub name: String,
    pub kind: RegisterKind,
    pub fields: Vec<RegisterField>,
}

impl Register {
    /// Width of the register for storage purposes. Aliases report the
    /// width of whatever they resolve to (looked up via `Model::register`).
    pub fn width(&self) -> Option<u32> {
        match &self.kind {
            RegisterKind::File { element_width, .. } => Some(*element_width),
            RegisterKind::Scalar { width } => Some(*width),
            RegisterKind::Vector { total_width, .. } => Some(*total_width),
            RegisterKind::Virtual { width, .. } => Some(*width),
            RegisterKind::Alias { .. } => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&RegisterField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormatField {
    pub name: String,
    pub lsb: u32,
    pub msb: u32,
    pub constant: Option<u64>,
}

impl FormatField {
    pub fn width(&self) -> u32 {
        self.msb - self.lsb + 1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Format {
    pub name: String,
    pub width: u32,
    pub fields: Vec<FormatField>,
    pub identification_fields: Vec<String>,
}

impl Format {
    pub fn field(&self, name: &str) -> Option<&FormatField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub name: String,
    pub lsb: u32,
    pub msb: u32,
}

impl Slot {
    pub fn width(&self) -> u32 {
        self.msb - self.lsb + 1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BundleFormat {
    pub name: String,
    pub width: u32,
    pub slots: Vec<Slot>,
    pub instruction_start: Option<u32>,
    pub identification_fields: Vec<String>,
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
pub struct Instruction {
    pub name: String,
    pub format: FormatIdx,
    pub bundle_format: Option<BundleFormatIdx>,
    pub encoding: Vec<(String, u64)>,
    pub operands: Vec<OperandDescriptor>,
    pub syntax: Option<String>,
    pub behavior: Option<RtlBlock>,
    pub external_behavior: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstructionAlias {
    pub name: String,
    pub target: InstrIdx,
    pub syntax: Option<String>,
    pub operands: Vec<String>,
}

/// The frozen, validated ISA. Shareable (`Arc`-free, plain `&Model`) across
/// simulator instances: spec.md §5 "the ISA model, once validated, is
/// immutable and freely shareable."
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub name: String,
    pub word_size: u32,
    pub endianness: Endianness,
    pub registers: Vec<Register>,
    pub formats: Vec<Format>,
    pub bundle_formats: Vec<BundleFormat>,
    pub instructions: Vec<Instruction>,
    pub aliases: Vec<InstructionAlias>,

    register_index: HashMap<String, RegIdx>,
    format_index: HashMap<String, FormatIdx>,
    bundle_format_index: HashMap<String, BundleFormatIdx>,
    instruction_index: HashMap<String, InstrIdx>,
    alias_index: HashMap<String, AliasIdx>,
}

impl Model {
    pub fn new(
        name: String,
        word_size: u32,
        endianness: Endianness,
        registers: Vec<Register>,
        formats: Vec<Format>,
        bundle_formats: Vec<BundleFormat>,
        instructions: Vec<Instruction>,
        aliases: Vec<InstructionAlias>,
    ) -> Self {
        let register_index = registers
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.clone(), RegIdx(i as u32)))
            .collect();
        let format_index = formats
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), FormatIdx(i as u32)))
            .collect();
        let bundle_format_index = bundle_formats
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), BundleFormatIdx(i as u32)))
            .collect();
        let instruction_index = instructions
            .iter()
            .enumerate()
            .map(|(i, ins)| (ins.name.clone(), InstrIdx(i as u32)))
            .collect();
        let alias_index = aliases
            .iter()
            .enumerate()
            .map(|(i, a)| (a.name.clone(), AliasIdx(i as u32)))
            .collect();

        Self {
            name,
            word_size,
            endianness,
            registers,
            formats,
            bundle_formats,
            instructions,
            aliases,
            register_index,
            format_index,
            bundle_format_index,
            instruction_index,
            alias_index,
        }
    }

    pub fn register_idx(&self, name: &str) -> Option<RegIdx> {
        self.register_index.get(name).copied()
    }
    pub fn register(&self, name: &str) -> Option<&Register> {
        self.register_idx(name).map(|i| &self.registers[i.index()])
    }
    pub fn register_at(&self, idx: RegIdx) -> &Register {
        &self.registers[idx.index()]
    }

    pub fn format_idx(&self, name: &str) -> Option<FormatIdx> {
        self.format_index.get(name).copied()
    }
    pub fn format(&self, name: &str) -> Option<&Format> {
        self.format_idx(name).map(|i| &self.formats[i.index()])
    }
    pub fn format_at(&self, idx: FormatIdx) -> &Format {
        &self.formats[idx.index()]
    }

    pub fn bundle_format_idx(&self, name: &str) -> Option<BundleFormatIdx> {
        self.bundle_format_index.get(name).copied()
    }
    pub fn bundle_format(&self, name: &str) -> Option<&BundleFormat> {
        self.bundle_format_idx(name).map(|i| &self.bundle_formats[i.index()])
    }
    pub fn bundle_format_at(&self, idx: BundleFormatIdx) -> &BundleFormat {
        &self.bundle_formats[idx.index()]
    }

    pub fn instruction_idx(&self, name: &str) -> Option<InstrIdx> {
        self.instruction_index.get(name).copied()
    }
    pub fn instruction(&self, name: &str) -> Option<&Instruction> {
        self.instruction_idx(name).map(|i| &self.instructions[i.index()])
    }
    pub fn instruction_at(&self, idx: InstrIdx) -> &Instruction {
        &self.instructions[idx.index()]
    }

    pub fn alias(&self, name: &str) -> Option<&InstructionAlias> {
        self.alias_index.get(name).map(|i| &self.aliases[i.index()])
    }

    /// Resolve a register name to its ultimate backing (scalar or file
    /// element) width and storage kind, following alias chains. Used by the
    /// RTL evaluator and by validation of virtual register components.
    pub fn resolve_register_width(&self, name: &str) -> Option<u32> {
        let reg = self.register(name)?;
        match &reg.kind {
            RegisterKind::Alias { target } => match target {
                AliasTarget::Scalar(s) => self.resolve_register_width(s),
                AliasTarget::FileElement { file, .. } => match &self.register(file)?.kind {
                    RegisterKind::File { element_width, .. } => Some(*element_width),
                    _ => None,
                },
            },
            other => Register {
                name: reg.name.clone(),
                kind: other.clone(),
                fields: vec![],
            }
            .width(),
        }
    }

    /// Every instruction sharing the same format as `fmt`, grouped for
    /// identification-uniqueness checking (spec.md §4.5 item 12).
    pub fn instructions_for_format(&self, fmt: FormatIdx) -> Vec<InstrIdx> {
        self.instructions
            .iter()
            .enumerate()
            .filter(|(_, ins)| ins.format == fmt)
            .map(|(i, _)| InstrIdx(i as u32))
            .collect()
    }
}
