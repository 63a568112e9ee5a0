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

//! Fetch/identify/decode/execute loop (C10, spec.md §4.10). Per-instance
//! state (registers, memory) is exclusively owned by the `Simulator`; the
//! `Model` it runs against is immutable and shared by reference (spec.md
//! §5).

use crate::decode::{Decoded, decode_at};
use crate::errors::{DecodeError, RtlError};
use crate::model::Model;
use crate::rtl::eval::{Exec, Machine};
use std::collections::HashMap;

/// An externally-supplied implementation for an instruction whose model
/// entry has `external_behavior = true` (spec.md §9 "External behavior
/// instructions"). Returns whether it assigned the PC itself, exactly
/// like `Exec::run`, so the caller's auto-advance rule still applies.
pub type ExternalHandler<'m> = Box<dyn FnMut(&mut Machine<'m>, &HashMap<String, i128>) -> Result<bool, RtlError> + 'm>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    StepCapReached,
    Halted,
}

#[derive(Debug, PartialEq)]
pub enum StepOutcome {
    Continued,
    Stopped(StopReason),
}

pub struct Simulator<'m> {
    pub machine: Machine<'m>,
    model: &'m Model,
    pc_register: String,
    external: HashMap<String, ExternalHandler<'m>>,
    /// Set by an external handler to request a stop after the current step
    /// completes; there is no RTL-level halt primitive (spec.md §4.10 is
    /// silent on the mechanism), so only external-behavior instructions can
    /// halt explicitly.
    halted: bool,
}

impl<'m> Simulator<'m> {
    pub fn new(model: &'m Model) -> Self {
        Self::with_pc_register(model, "PC")
    }

    pub fn with_pc_register(model: &'m Model, pc_register: &str) -> Self {
        Self {
            machine: Machine::new(model),
            model,
            pc_register: pc_register.to_string(),
            external: HashMap::new(),
            halted: false,
        }
    }

    /// Register an external-behavior implementation for `instr_name`.
    pub fn register_external(&mut self, instr_name: &str, handler: ExternalHandler<'m>) {
        self.external.insert(instr_name.to_string(), handler);
    }

    pub fn request_halt(&mut self) {
        self.halted = true;
    }

    fn pc(&self) -> Result<u64, RtlError> {
        Ok(self.machine.read_register(&self.pc_register)? as u64)
    }

    fn advance_pc(&mut self, bytes: u32) -> Result<(), RtlError> {
        let next = self.pc()? + bytes as u64;
        self.machine.write_register(&self.pc_register, next as i128)
    }

    /// Execute one instruction's RTL behavior (or its external handler),
    /// binding `operands` and leaving PC auto-advance to the caller.
    fn execute_leaf(&mut self, instr_name: &str, operands: &HashMap<String, u128>) -> Result<bool, RtlError> {
        let signed_operands: HashMap<String, i128> = operands.iter().map(|(k, v)| (k.clone(), *v as i128)).collect();

        if let Some(handler) = self.external.get_mut(instr_name) {
            return handler(&mut self.machine, &signed_operands);
        }

        let instr = self.model.instruction(instr_name).expect("decoded instruction must exist in the model");
        match &instr.behavior {
            Some(block) => {
                let mut exec = Exec::new(&mut self.machine, &signed_operands, &self.pc_register);
                exec.run(block)
            }
            None => Ok(false),
        }
    }

    /// One fetch/identify/decode/execute cycle (spec.md §4.10 steps 1-3).
    pub fn step(&mut self) -> Result<StepOutcome, DecodeError> {
        let pc = self.pc().map_err(|_| DecodeError::NoMatch)?;
        let decoded: Decoded = decode_at(self.model, &self.machine.memory, pc)?;
        let width_bytes = decoded.width / 8;

        if decoded.slots.is_empty() {
            let name = self.model.instruction_at(decoded.instr).name.clone();
            let pc_assigned = self
                .execute_leaf(&name, &decoded.operands)
                .unwrap_or_else(|e| panic!("RTL evaluation error executing `{name}`: {e}"));
            if !pc_assigned {
                self.advance_pc(width_bytes).expect("PC register must be writable");
            }
        } else {
            for slot in &decoded.slots {
                let name = self.model.instruction_at(slot.instr).name.clone();
                self.execute_leaf(&name, &slot.operands).unwrap_or_else(|e| panic!("RTL evaluation error executing `{name}`: {e}"));
            }
            self.advance_pc(width_bytes).expect("PC register must be writable");
        }

        if self.halted {
            return Ok(StepOutcome::Stopped(StopReason::Halted));
        }
        Ok(StepOutcome::Continued)
    }

    /// Run until halt, a `DecodeError`, or `step_cap` steps have executed.
    pub fn run(&mut self, step_cap: u64) -> Result<StopReason, DecodeError> {
        for _ in 0..step_cap {
            match self.step()? {
                StepOutcome::Continued => continue,
                StepOutcome::Stopped(reason) => return Ok(reason),
            }
        }
        Ok(StopReason::StepCapReached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::raw::Endianness;
    use crate::model::{Format, FormatField, Instruction as ModelInstruction, OperandDescriptor as ModelOperand, Register, RegisterKind};
    use crate::rtl::ast::{BinOp, Expr, Lvalue, Stmt};
    use std::collections::BTreeMap;

    fn demo_model() -> Model {
        // ADD rd, imm: R[rd] = R[rd] + imm; PC auto-advances.
        let format = Format {
            name: "R_TYPE".into(),
            width: 16,
            fields: vec![
                FormatField { name: "opcode".into(), lsb: 0, msb: 3, constant: None },
                FormatField { name: "rd".into(), lsb: 4, msb: 6, constant: None },
                FormatField { name: "imm".into(), lsb: 7, msb: 15, constant: None },
            ],
            identification_fields: vec!["opcode".to_string()],
        };
        let mut enc = BTreeMap::new();
        enc.insert("opcode".to_string(), 1u64);
        let behavior = vec![Stmt::Assign(
            Lvalue::Indexed("R".into(), Expr::Scalar("rd".into())),
            Expr::Binary(BinOp::Add, Box::new(Expr::Indexed("R".into(), Box::new(Expr::Scalar("rd".into())))), Box::new(Expr::Scalar("imm".into()))),
        )];
        let add = ModelInstruction {
            name: "ADD".into(),
            format: crate::model::FormatIdx(0),
            bundle_format: None,
            encoding: enc.into_iter().collect(),
            operands: vec![ModelOperand::Simple("rd".into()), ModelOperand::Simple("imm".into())],
            syntax: None,
            behavior: Some(behavior),
            external_behavior: false,
        };
        let pc = Register { name: "PC".into(), kind: RegisterKind::Scalar { width: 16 }, fields: vec![] };
        let regfile = Register { name: "R".into(), kind: RegisterKind::File { element_width: 16, count: 4 }, fields: vec![] };
        Model::new("Demo".into(), 16, Endianness::Little, vec![pc, regfile], vec![format], vec![], vec![add], vec![])
    }

    #[test]
    fn steps_and_auto_advances_pc_when_not_assigned() {
        let model = demo_model();
        let mut sim = Simulator::new(&model);
        // opcode=1, rd=0, imm=5 -> word = 1 | (0<<4) | (5<<7) = 0x281
        sim.machine.memory.write(0, 2, 0x0281, model.endianness);
        let outcome = sim.step().unwrap();
        assert_eq!(outcome, StepOutcome::Continued);
        assert_eq!(sim.machine.read_indexed("R", 0).unwrap(), 5);
        assert_eq!(sim.pc().unwrap(), 2);
    }

    #[test]
    fn external_handler_can_request_halt() {
        let model = demo_model();
        let mut sim = Simulator::new(&model);
        sim.machine.memory.write(0, 2, 0x0281, model.endianness);
        sim.register_external(
            "ADD",
            Box::new(|_machine, _ops| {
                Ok(false)
            }),
        );
        sim.request_halt();
        let outcome = sim.step().unwrap();
        assert_eq!(outcome, StepOutcome::Stopped(StopReason::Halted));
    }
}
