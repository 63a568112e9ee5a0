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

//! End-to-end tests driving the full pipeline — parse, merge, validate,
//! assemble, decode, simulate, disassemble — against one small ISA.

use isadsl::assembler::{assemble, to_bytes};
use isadsl::decode::decode_in_buffer;
use isadsl::disasm::disassemble_buffer;
use isadsl::file_reader::MockFileReader;
use isadsl::load_model;
use isadsl::simulator::{Simulator, StepOutcome};
use std::path::Path;

const TOY_ISA: &str = r#"
architecture "Toy" {
    word_size: 16;
    endianness: little;

    register file R {
        width: 16;
        count: 8;
    }

    register scalar PC {
        width: 16;
    }

    format R_TYPE {
        width: 16;
        field opcode[0:3];
        field rd[4:6];
        field imm[7:15];
        identification_fields: [opcode];
    }

    instruction ADDI {
        format: R_TYPE;
        encoding: {opcode=1};
        operands: [rd, imm];
        syntax: "ADDI R{rd}, {imm}";
        behavior {
            R[rd] = R[rd] + imm;
        }
    }

    instruction HALT {
        format: R_TYPE;
        encoding: {opcode=2, rd=0, imm=0};
        operands: [];
        syntax: "HALT";
        external_behavior;
    }
}
"#;

fn load() -> isadsl::model::Model {
    let mut reader = MockFileReader::default();
    reader.add_file("toy.isa", TOY_ISA);
    load_model(Path::new("toy.isa"), &reader).expect("toy ISA should validate")
}

#[test]
fn parses_merges_and_validates_a_complete_isa() {
    let model = load();
    assert_eq!(model.name, "Toy");
    assert_eq!(model.word_size, 16);
    assert!(model.instruction("ADDI").is_some());
    assert!(model.instruction("HALT").is_some());
}

#[test]
fn assembles_labels_constants_and_register_operands_then_decodes_back() {
    let model = load();
    let src = ".define STEP, 3\nstart:\n  ADDI R1, STEP\n  ADDI R2, start\n";
    let words = assemble(&model, "prog.s", src).unwrap();
    assert_eq!(words.len(), 2);

    let bytes = to_bytes(&model, &words);
    assert_eq!(bytes.len(), 4);

    let first = decode_in_buffer(&model, &bytes, 0).unwrap();
    assert_eq!(model.instruction_at(first.instr).name, "ADDI");
    assert_eq!(first.operands["rd"], 1);
    assert_eq!(first.operands["imm"], 3);

    let second = decode_in_buffer(&model, &bytes, 2).unwrap();
    assert_eq!(second.operands["rd"], 2);
    assert_eq!(second.operands["imm"], 0); // `start` resolves to address 0
}

#[test]
fn simulator_executes_addi_and_auto_advances_pc() {
    let model = load();
    let words = assemble(&model, "prog.s", "ADDI R3, 7\n").unwrap();
    let bytes = to_bytes(&model, &words);

    let mut sim = Simulator::new(&model);
    for (i, byte) in bytes.iter().enumerate() {
        sim.machine.memory.write_byte(i as u64, *byte);
    }

    let outcome = sim.step().unwrap();
    assert_eq!(outcome, StepOutcome::Continued);
    assert_eq!(sim.machine.read_indexed("R", 3).unwrap(), 7);
    assert_eq!(sim.machine.read_register("PC").unwrap(), 2);
}

#[test]
fn simulator_external_behavior_instruction_can_halt() {
    use isadsl::simulator::StopReason;

    let model = load();
    let words = assemble(&model, "prog.s", "HALT\n").unwrap();
    let bytes = to_bytes(&model, &words);

    let mut sim = Simulator::new(&model);
    for (i, byte) in bytes.iter().enumerate() {
        sim.machine.memory.write_byte(i as u64, *byte);
    }
    sim.register_external(
        "HALT",
        Box::new(|machine, _ops| {
            machine.write_register("PC", 2)?;
            Ok(true)
        }),
    );
    sim.request_halt();
    let outcome = sim.step().unwrap();
    assert_eq!(outcome, StepOutcome::Stopped(StopReason::Halted));
    assert_eq!(sim.machine.read_register("PC").unwrap(), 2);
}

#[test]
fn disassembler_renders_template_for_each_instruction() {
    let model = load();
    let words = assemble(&model, "prog.s", "ADDI R5, 9\nHALT\n").unwrap();
    let bytes = to_bytes(&model, &words);

    let lines = disassemble_buffer(&model, &bytes).unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].text, "ADDI R5, 9");
    assert_eq!(lines[1].text, "HALT");
}

#[test]
fn loads_an_isa_split_across_included_files_on_disk() {
    use isadsl::file_reader::AsmFileReader;
    use std::fs;

    let dir = tempfile::tempdir().unwrap();
    let regs_path = dir.path().join("registers.isa");
    fs::write(
        &regs_path,
        r#"
        register file R {
            width: 16;
            count: 8;
        }

        register scalar PC {
            width: 16;
        }
        "#,
    )
    .unwrap();

    let root_path = dir.path().join("main.isa");
    fs::write(
        &root_path,
        format!(
            r#"
            architecture "Toy" {{
                word_size: 16;
                endianness: little;

                #include "{}"

                format R_TYPE {{
                    width: 16;
                    field opcode[0:3];
                    field rd[4:6];
                    field imm[7:15];
                    identification_fields: [opcode];
                }}

                instruction ADDI {{
                    format: R_TYPE;
                    encoding: {{opcode=1}};
                    operands: [rd, imm];
                    syntax: "ADDI R{{rd}}, {{imm}}";
                    behavior {{
                        R[rd] = R[rd] + imm;
                    }}
                }}
            }}
            "#,
            regs_path.display()
        ),
    )
    .unwrap();

    let model = load_model(&root_path, &AsmFileReader).expect("on-disk ISA with an #include should validate");
    assert_eq!(model.name, "Toy");
    assert!(model.register_idx("R").is_some());
    assert!(model.instruction("ADDI").is_some());
}

#[test]
fn unknown_mnemonic_is_reported_with_file_and_line() {
    let model = load();
    let err = assemble(&model, "prog.s", "NOPE R1, 2\n").unwrap_err();
    match err {
        isadsl::errors::AssembleError::UnknownMnemonic { file, line, mnemonic } => {
            assert_eq!(file, "prog.s");
            assert_eq!(line, 1);
            assert_eq!(mnemonic, "NOPE");
        }
        other => panic!("expected UnknownMnemonic, got {other:?}"),
    }
}
