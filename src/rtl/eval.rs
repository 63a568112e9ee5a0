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

//! Bit-exact RTL interpreter (C6, spec.md §4.6). Runtime values are plain
//! `i128`: unsigned results are kept non-negative, and `sign_extend`/
//! `to_signed`/friends produce a genuinely negative `i128` so that the
//! host language's own signed comparison and arithmetic already give the
//! "unsigned by default, signed once extended" behavior the spec asks
//! for, with no separate signedness tag to carry around.

use crate::errors::RtlError;
use crate::model::raw::{AliasTarget, Endianness, VirtualComponent};
use crate::model::{Model, RegIdx, RegisterKind};
use crate::rtl::ast::{BinOp, Block, Expr, Lvalue, MemWidth, Stmt, UnOp};
use std::collections::HashMap;

pub(crate) fn mask(width: u32) -> u128 {
    if width >= 128 { u128::MAX } else { (1u128 << width) - 1 }
}

/// Byte-addressed memory, zero on first read (spec.md §4.6 memory semantics).
#[derive(Debug, Clone, Default)]
pub struct Memory {
    cells: HashMap<u64, u8>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_byte(&self, addr: u64) -> u8 {
        *self.cells.get(&addr).unwrap_or(&0)
    }

    pub fn write_byte(&mut self, addr: u64, value: u8) {
        self.cells.insert(addr, value);
    }

    pub fn read(&self, addr: u64, bytes: u32, endianness: Endianness) -> u128 {
        let mut value: u128 = 0;
        for i in 0..bytes {
            let byte = self.read_byte(addr.wrapping_add(i as u64)) as u128;
            let shift = match endianness {
                Endianness::Little => i * 8,
                Endianness::Big => (bytes - 1 - i) * 8,
            };
            value |= byte << shift;
        }
        value
    }

    pub fn write(&mut self, addr: u64, bytes: u32, value: u128, endianness: Endianness) {
        for i in 0..bytes {
            let shift = match endianness {
                Endianness::Little => i * 8,
                Endianness::Big => (bytes - 1 - i) * 8,
            };
            self.write_byte(addr.wrapping_add(i as u64), ((value >> shift) & 0xff) as u8);
        }
    }
}

/// Concrete register storage for a validated model. Virtual and alias
/// registers hold no storage of their own; they are resolved through
/// their components/target on every access.
#[derive(Debug, Clone)]
pub struct Machine<'m> {
    pub model: &'m Model,
    scalars: HashMap<RegIdx, u128>,
    files: HashMap<RegIdx, Vec<u128>>,
    vectors: HashMap<RegIdx, Vec<Vec<u128>>>,
    pub memory: Memory,
}

impl<'m> Machine<'m> {
    pub fn new(model: &'m Model) -> Self {
        let mut scalars = HashMap::new();
        let mut files = HashMap::new();
        let mut vectors = HashMap::new();
        for (i, reg) in model.registers.iter().enumerate() {
            let idx = RegIdx(i as u32);
            match &reg.kind {
                RegisterKind::Scalar { .. } | RegisterKind::Virtual { .. } => {
                    scalars.insert(idx, 0);
                }
                RegisterKind::File { count, .. } => {
                    files.insert(idx, vec![0u128; *count as usize]);
                }
                RegisterKind::Vector { lane_count, count, .. } => {
                    vectors.insert(idx, vec![vec![0u128; *lane_count as usize]; count.unwrap_or(1) as usize]);
                }
                RegisterKind::Alias { .. } => {}
            }
        }
        Self { model, scalars, files, vectors, memory: Memory::new() }
    }

    fn reg_idx(&self, name: &str) -> Result<RegIdx, RtlError> {
        self.model.register_idx(name).ok_or_else(|| RtlError::UnknownRegister(name.to_string()))
    }

    pub fn read_register(&self, name: &str) -> Result<i128, RtlError> {
        let idx = self.reg_idx(name)?;
        let reg = self.model.register_at(idx);
        match &reg.kind {
            RegisterKind::Scalar { width } => Ok((self.scalars[&idx] & mask(*width)) as i128),
            RegisterKind::Virtual { components, .. } => {
                let mut acc: u128 = 0;
                let mut shift = 0u32;
                for c in components {
                    let (value, width) = self.read_component(c)?;
                    acc |= (value & mask(width)) << shift;
                    shift += width;
                }
                Ok(acc as i128)
            }
            RegisterKind::Alias { target } => match target {
                AliasTarget::Scalar(s) => self.read_register(s),
                AliasTarget::FileElement { file, index } => self.read_indexed(file, *index as i128),
            },
            RegisterKind::File { .. } | RegisterKind::Vector { .. } => {
                Err(RtlError::UnknownRegister(format!("{name} requires an index")))
            }
        }
    }

    fn read_component(&self, c: &VirtualComponent) -> Result<(u128, u32), RtlError> {
        match c {
            VirtualComponent::Scalar(name) => {
                let idx = self.reg_idx(name)?;
                let width = self.model.register_at(idx).width().unwrap_or(64);
                Ok((self.read_register(name)? as u128 & mask(width), width))
            }
            VirtualComponent::FileElement { file, index } => {
                let file_idx = self.reg_idx(file)?;
                let width = match &self.model.register_at(file_idx).kind {
                    RegisterKind::File { element_width, .. } => *element_width,
                    _ => return Err(RtlError::UnknownRegister(file.clone())),
                };
                Ok((self.read_indexed(file, *index as i128)? as u128 & mask(width), width))
            }
        }
    }

    pub fn write_register(&mut self, name: &str, value: i128) -> Result<(), RtlError> {
        let idx = self.reg_idx(name)?;
        let reg = self.model.register_at(idx).clone();
        match &reg.kind {
            RegisterKind::Scalar { width } => {
                self.scalars.insert(idx, (value as u128) & mask(*width));
                Ok(())
            }
            RegisterKind::Virtual { components, .. } => {
                let mut remaining = value as u128;
                for c in components {
                    let width = self.component_width(c)?;
                    let piece = remaining & mask(width);
                    self.write_component(c, piece as i128)?;
                    remaining >>= width;
                }
                Ok(())
            }
            RegisterKind::Alias { target } => match target {
                AliasTarget::Scalar(s) => self.write_register(s, value),
                AliasTarget::FileElement { file, index } => self.write_indexed(file, *index as i128, value),
            },
            RegisterKind::File { .. } | RegisterKind::Vector { .. } => {
                Err(RtlError::UnknownRegister(format!("{name} requires an index")))
            }
        }
    }

    fn component_width(&self, c: &VirtualComponent) -> Result<u32, RtlError> {
        match c {
            VirtualComponent::Scalar(name) => {
                let idx = self.reg_idx(name)?;
                Ok(self.model.register_at(idx).width().unwrap_or(64))
            }
            VirtualComponent::FileElement { file, .. } => {
                let idx = self.reg_idx(file)?;
                match &self.model.register_at(idx).kind {
                    RegisterKind::File { element_width, .. } => Ok(*element_width),
                    _ => Err(RtlError::UnknownRegister(file.clone())),
                }
            }
        }
    }

    fn write_component(&mut self, c: &VirtualComponent, value: i128) -> Result<(), RtlError> {
        match c {
            VirtualComponent::Scalar(name) => self.write_register(name, value),
            VirtualComponent::FileElement { file, index } => self.write_indexed(file, *index as i128, value),
        }
    }

    pub fn read_field(&self, name: &str, field: &str) -> Result<i128, RtlError> {
        let idx = self.reg_idx(name)?;
        let reg = self.model.register_at(idx);
        let f = reg.field(field).ok_or_else(|| RtlError::UnknownRegister(format!("{name}.{field}")))?;
        let whole = self.read_register(name)? as u128;
        Ok(((whole >> f.lsb) & mask(f.width())) as i128)
    }

    pub fn write_field(&mut self, name: &str, field: &str, value: i128) -> Result<(), RtlError> {
        let idx = self.reg_idx(name)?;
        let reg = self.model.register_at(idx).clone();
        let f = reg.field(field).ok_or_else(|| RtlError::UnknownRegister(format!("{name}.{field}")))?;
        let whole = self.read_register(name)? as u128;
        let cleared = whole & !(mask(f.width()) << f.lsb);
        let merged = cleared | ((value as u128 & mask(f.width())) << f.lsb);
        self.write_register(name, merged as i128)
    }

    pub fn read_indexed(&self, name: &str, index: i128) -> Result<i128, RtlError> {
        let idx = self.reg_idx(name)?;
        let width = match &self.model.register_at(idx).kind {
            RegisterKind::File { element_width, .. } => *element_width,
            _ => return Err(RtlError::UnknownRegister(format!("{name} is not a register file"))),
        };
        let arr = self.files.get(&idx).ok_or_else(|| RtlError::UnknownRegister(name.to_string()))?;
        let i = index as usize;
        arr.get(i).map(|v| (v & mask(width)) as i128).ok_or_else(|| RtlError::UnknownRegister(format!("{name}[{index}]")))
    }

    pub fn write_indexed(&mut self, name: &str, index: i128, value: i128) -> Result<(), RtlError> {
        let idx = self.reg_idx(name)?;
        let width = match &self.model.register_at(idx).kind {
            RegisterKind::File { element_width, .. } => *element_width,
            _ => return Err(RtlError::UnknownRegister(format!("{name} is not a register file"))),
        };
        let arr = self.files.get_mut(&idx).ok_or_else(|| RtlError::UnknownRegister(name.to_string()))?;
        let i = index as usize;
        let slot = arr.get_mut(i).ok_or_else(|| RtlError::UnknownRegister(format!("{name}[{index}]")))?;
        *slot = (value as u128) & mask(width);
        Ok(())
    }

    pub fn read_vector_lane(&self, name: &str, index: i128, lane: i128) -> Result<i128, RtlError> {
        let idx = self.reg_idx(name)?;
        let lane_width = match &self.model.register_at(idx).kind {
            RegisterKind::Vector { lane_width, .. } => *lane_width,
            _ => return Err(RtlError::UnknownRegister(format!("{name} is not a vector register"))),
        };
        let banks = self.vectors.get(&idx).ok_or_else(|| RtlError::UnknownRegister(name.to_string()))?;
        let bank = banks.get(index as usize).ok_or_else(|| RtlError::UnknownRegister(format!("{name}[{index}]")))?;
        bank.get(lane as usize).map(|v| (v & mask(lane_width)) as i128).ok_or_else(|| RtlError::UnknownRegister(format!("{name}[{index}][{lane}]")))
    }

    pub fn write_vector_lane(&mut self, name: &str, index: i128, lane: i128, value: i128) -> Result<(), RtlError> {
        let idx = self.reg_idx(name)?;
        let lane_width = match &self.model.register_at(idx).kind {
            RegisterKind::Vector { lane_width, .. } => *lane_width,
            _ => return Err(RtlError::UnknownRegister(format!("{name} is not a vector register"))),
        };
        let banks = self.vectors.get_mut(&idx).ok_or_else(|| RtlError::UnknownRegister(name.to_string()))?;
        let bank = banks.get_mut(index as usize).ok_or_else(|| RtlError::UnknownRegister(format!("{name}[{index}]")))?;
        let slot = bank.get_mut(lane as usize).ok_or_else(|| RtlError::UnknownRegister(format!("{name}[{index}][{lane}]")))?;
        *slot = (value as u128) & mask(lane_width);
        Ok(())
    }
}

/// Execution context for one behavior block: the bound operand values, and
/// block-local temporaries introduced on first assignment (spec.md §4.6).
pub struct Exec<'a, 'm> {
    pub machine: &'a mut Machine<'m>,
    pub operands: &'a HashMap<String, i128>,
    temps: HashMap<String, i128>,
    pc_register: &'a str,
    pc_assigned: bool,
}

impl<'a, 'm> Exec<'a, 'm> {
    pub fn new(machine: &'a mut Machine<'m>, operands: &'a HashMap<String, i128>, pc_register: &'a str) -> Self {
        Self { machine, operands, temps: HashMap::new(), pc_register, pc_assigned: false }
    }

    /// Runs `block` to completion, returning whether `PC` was assigned
    /// directly by name during execution (spec.md §4.10 step 3).
    pub fn run(&mut self, block: &Block) -> Result<bool, RtlError> {
        self.exec_block(block)?;
        Ok(self.pc_assigned)
    }

    fn exec_block(&mut self, block: &Block) -> Result<(), RtlError> {
        for stmt in block {
            self.exec_stmt(stmt)?;
        }
        Ok(())
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<(), RtlError> {
        match stmt {
            Stmt::Assign(lv, e) => {
                let value = self.eval(e)?;
                self.assign(lv, value)
            }
            Stmt::If(cond, then_b, else_b) => {
                if self.eval(cond)? != 0 {
                    self.exec_block(then_b)
                } else {
                    self.exec_block(else_b)
                }
            }
            Stmt::For { init, cond, step, body } => {
                self.exec_stmt(init)?;
                while self.eval(cond)? != 0 {
                    self.exec_block(body)?;
                    self.exec_stmt(step)?;
                }
                Ok(())
            }
        }
    }

    fn assign(&mut self, lv: &Lvalue, value: i128) -> Result<(), RtlError> {
        match lv {
            Lvalue::Scalar(name) => {
                if self.operands.contains_key(name) {
                    // Operands are bound inputs, not writable storage; an
                    // assignment to an operand name introduces/updates a
                    // same-named temporary instead (mirrors a C-like shadow).
                    self.temps.insert(name.clone(), value);
                } else if self.temps.contains_key(name) {
                    self.temps.insert(name.clone(), value);
                } else if self.machine.model.register_idx(name).is_some() {
                    self.machine.write_register(name, value)?;
                    if name == self.pc_register {
                        self.pc_assigned = true;
                    }
                } else {
                    self.temps.insert(name.clone(), value);
                }
                Ok(())
            }
            Lvalue::RegField(name, field) => self.machine.write_field(name, field, value),
            Lvalue::Indexed(name, idx) => {
                let i = self.eval(idx)?;
                self.machine.write_indexed(name, i, value)
            }
            Lvalue::VectorLane(name, idx, lane) => {
                let i = self.eval(idx)?;
                let l = self.eval(lane)?;
                self.machine.write_vector_lane(name, i, l, value)
            }
            Lvalue::Mem(addr, width) => {
                let a = self.eval(addr)? as u64;
                let bytes = self.mem_bytes(*width);
                self.machine.memory.write(a, bytes, value as u128, self.machine.model.endianness);
                Ok(())
            }
        }
    }

    fn mem_bytes(&self, width: MemWidth) -> u32 {
        match width {
            MemWidth::Word => self.machine.model.word_size / 8,
            MemWidth::Bytes(n) => n,
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<i128, RtlError> {
        match expr {
            Expr::IntLit(v) => Ok(*v as i128),
            Expr::Operand(name) => self.operands.get(name).copied().ok_or_else(|| RtlError::UnknownRegister(name.clone())),
            Expr::Scalar(name) => {
                if let Some(v) = self.operands.get(name) {
                    Ok(*v)
                } else if let Some(v) = self.temps.get(name) {
                    Ok(*v)
                } else {
                    self.machine.read_register(name)
                }
            }
            Expr::RegField(name, field) => self.machine.read_field(name, field),
            Expr::Indexed(name, idx) => {
                let i = self.eval(idx)?;
                self.machine.read_indexed(name, i)
            }
            Expr::VectorLane(name, idx, lane) => {
                let i = self.eval(idx)?;
                let l = self.eval(lane)?;
                self.machine.read_vector_lane(name, i, l)
            }
            Expr::Mem(addr, width) => {
                let a = self.eval(addr)? as u64;
                let bytes = self.mem_bytes(*width);
                Ok(self.machine.memory.read(a, bytes, self.machine.model.endianness) as i128)
            }
            Expr::Unary(op, e) => {
                let v = self.eval(e)?;
                Ok(match op {
                    UnOp::Neg => -v,
                    UnOp::Not => !v,
                })
            }
            Expr::Binary(op, a, b) => {
                let lhs = self.eval(a)?;
                let rhs = self.eval(b)?;
                eval_binop(*op, lhs, rhs)
            }
            Expr::Ternary(c, a, b) => {
                if self.eval(c)? != 0 { self.eval(a) } else { self.eval(b) }
            }
            Expr::BitExtract(v, msb, lsb) => {
                let value = self.eval(v)? as u128;
                let m = self.eval(msb)? as u32;
                let l = self.eval(lsb)? as u32;
                Ok(bit_extract(value, m, l) as i128)
            }
            Expr::Call(name, args) => {
                let values: Vec<i128> = args.iter().map(|a| self.eval(a)).collect::<Result<_, _>>()?;
                call_builtin(name, &values, self.machine.model.word_size)
            }
        }
    }
}

fn bit_extract(value: u128, msb: u32, lsb: u32) -> u128 {
    let width = msb - lsb + 1;
    (value >> lsb) & mask(width)
}

fn eval_binop(op: BinOp, a: i128, b: i128) -> Result<i128, RtlError> {
    Ok(match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0 {
                return Err(RtlError::DivByZero);
            }
            a / b
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(RtlError::DivByZero);
            }
            a % b
        }
        BinOp::And => a & b,
        BinOp::Or => a | b,
        BinOp::Xor => a ^ b,
        BinOp::Shl => a << (b as u32),
        BinOp::Shr => a >> (b as u32),
        BinOp::Eq => bool_val(a == b),
        BinOp::Ne => bool_val(a != b),
        BinOp::Lt => bool_val(a < b),
        BinOp::Gt => bool_val(a > b),
        BinOp::Le => bool_val(a <= b),
        BinOp::Ge => bool_val(a >= b),
    })
}

fn bool_val(b: bool) -> i128 {
    if b { 1 } else { 0 }
}

fn require_width(w: i128) -> Result<u32, RtlError> {
    if w < 1 || w > 64 {
        return Err(RtlError::BadWidth(w as u32));
    }
    Ok(w as u32)
}

fn sign_extend_value(v: i128, from_bits: u32) -> i128 {
    let masked = (v as u128) & mask(from_bits);
    if from_bits < 128 && (masked & (1u128 << (from_bits - 1))) != 0 {
        (masked as i128) - (1i128 << from_bits)
    } else {
        masked as i128
    }
}

/// Built-in function table (spec.md §4.6). Arity is assumed already valid
/// (checked statically by C5); only dynamic width arguments are range
/// checked here, raising `RtlError::BadWidth` per spec.
pub fn call_builtin(name: &str, args: &[i128], word_size: u32) -> Result<i128, RtlError> {
    match name {
        "sign_extend" | "sext" | "sx" => {
            let from_bits = require_width(args[1])?;
            Ok(sign_extend_value(args[0], from_bits))
        }
        "zero_extend" | "zext" | "zx" => {
            let from_bits = require_width(args[1])?;
            Ok(((args[0] as u128) & mask(from_bits)) as i128)
        }
        "extract_bits" => Ok(bit_extract(args[0] as u128, args[1] as u32, args[2] as u32) as i128),
        "to_signed" => {
            let width = require_width(args[1])?;
            Ok(sign_extend_value(args[0], width))
        }
        "to_unsigned" => {
            let width = require_width(args[1])?;
            Ok(((args[0] as u128) & mask(width)) as i128)
        }
        "ssov" => {
            let width = require_width(args[1])?;
            let lo = -(1i128 << (width - 1));
            let hi = (1i128 << (width - 1)) - 1;
            Ok(args[0].clamp(lo, hi))
        }
        "suov" => {
            let width = require_width(args[1])?;
            let hi = mask(width) as i128;
            Ok(args[0].clamp(0, hi))
        }
        "carry" => {
            let w = word_size;
            let a = (args[0] as u128) & mask(w);
            let b = (args[1] as u128) & mask(w);
            let cin = (args[2] as u128) & 1;
            let sum = a + b + cin;
            Ok(bool_val(sum > mask(w)))
        }
        "borrow" => {
            let w = word_size;
            let a = (args[0] as u128) & mask(w);
            let b = (args[1] as u128) & mask(w);
            let bin = (args[2] as u128) & 1;
            Ok(bool_val(a < b + bin))
        }
        "reverse16" => {
            let mut v = (args[0] as u128) & 0xffff;
            let mut out: u128 = 0;
            for _ in 0..16 {
                out = (out << 1) | (v & 1);
                v >>= 1;
            }
            Ok(out as i128)
        }
        "leading_zeros" => Ok(leading_run(args[0] as u128, word_size, false) as i128),
        "leading_ones" => Ok(leading_run(args[0] as u128, word_size, true) as i128),
        "leading_signs" => {
            let w = word_size;
            let v = (args[0] as u128) & mask(w);
            let sign = (v >> (w - 1)) & 1;
            let rest = v & mask(w.saturating_sub(1));
            Ok(leading_run(rest, w - 1, sign == 1) as i128)
        }
        other => Err(RtlError::UnknownRegister(format!("unknown built-in `{other}`"))),
    }
}

fn leading_run(value: u128, width: u32, ones: bool) -> u32 {
    let target: u128 = if ones { 1 } else { 0 };
    let mut count = 0;
    for i in (0..width).rev() {
        if ((value >> i) & 1) != target {
            break;
        }
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_extend_produces_negative_value() {
        // 8-bit 0xFF sign-extends to -1.
        assert_eq!(sign_extend_value(0xFF, 8), -1);
        assert_eq!(sign_extend_value(0x7F, 8), 127);
    }

    #[test]
    fn shr_is_arithmetic_on_signed_values() {
        let v = sign_extend_value(0xF0, 8); // -16
        assert_eq!(eval_binop(BinOp::Shr, v, 2).unwrap(), -4);
    }

    #[test]
    fn div_by_zero_errors() {
        assert_eq!(eval_binop(BinOp::Div, 4, 0), Err(RtlError::DivByZero));
    }

    #[test]
    fn ssov_clamps_to_signed_range() {
        assert_eq!(call_builtin("ssov", &[200, 8], 32).unwrap(), 127);
        assert_eq!(call_builtin("ssov", &[-200, 8], 32).unwrap(), -128);
    }

    #[test]
    fn suov_clamps_to_unsigned_range() {
        assert_eq!(call_builtin("suov", &[-5, 8], 32).unwrap(), 0);
        assert_eq!(call_builtin("suov", &[300, 8], 32).unwrap(), 255);
    }

    #[test]
    fn carry_detects_overflow_at_word_size() {
        assert_eq!(call_builtin("carry", &[0xFFFFFFFF_u128 as i128, 1, 0], 32).unwrap(), 1);
        assert_eq!(call_builtin("carry", &[1, 1, 0], 32).unwrap(), 0);
    }

    #[test]
    fn leading_zeros_counts_from_msb() {
        assert_eq!(call_builtin("leading_zeros", &[1], 8).unwrap(), 7);
        assert_eq!(call_builtin("leading_zeros", &[0xFF], 8).unwrap(), 0);
    }

    #[test]
    fn reverse16_reverses_bit_order() {
        assert_eq!(call_builtin("reverse16", &[0b1], 32).unwrap(), 0b1000000000000000);
    }

    #[test]
    fn memory_round_trips_little_endian() {
        let mut mem = Memory::new();
        mem.write(0x10, 4, 0x1122_3344, Endianness::Little);
        assert_eq!(mem.read_byte(0x10), 0x44);
        assert_eq!(mem.read(0x10, 4, Endianness::Little), 0x1122_3344);
    }

    #[test]
    fn memory_round_trips_big_endian() {
        let mut mem = Memory::new();
        mem.write(0x10, 4, 0x1122_3344, Endianness::Big);
        assert_eq!(mem.read_byte(0x10), 0x11);
        assert_eq!(mem.read(0x10, 4, Endianness::Big), 0x1122_3344);
    }

    #[test]
    fn unwritten_memory_reads_zero() {
        let mem = Memory::new();
        assert_eq!(mem.read(0x1000, 2, Endianness::Little), 0);
    }
}
