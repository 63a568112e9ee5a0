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

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use isadsl::errors::IsaError;
use isadsl::file_reader::AsmFileReader;
use isadsl::load_model;
use isadsl::model::Model;
use serde::Serialize;

#[derive(Parser)]
#[clap(version = "0.1.0", author = "Connor Nolan")]
struct Opts {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate an ISA-DSL file (and everything it `#include`s).
    Validate { file: PathBuf },
    /// Print a JSON summary of a validated ISA: registers, formats, instructions.
    Info { file: PathBuf },
    /// Emit generated artifacts for a validated ISA: a JSON model dump and
    /// a markdown instruction reference, under `--output`.
    Generate {
        file: PathBuf,
        #[clap(short, long)]
        output: PathBuf,
        #[clap(long)]
        no_assembler: bool,
        #[clap(long)]
        no_simulator: bool,
        #[clap(long)]
        no_disassembler: bool,
        #[clap(long)]
        no_docs: bool,
    },
}

fn main() -> ExitCode {
    let opts = Opts::parse();
    match run(opts) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(opts: Opts) -> Result<(), String> {
    match opts.command {
        Command::Validate { file } => validate(&file),
        Command::Info { file } => info(&file),
        Command::Generate { file, output, no_assembler, no_simulator, no_disassembler, no_docs } => {
            generate(&file, &output, no_assembler, no_simulator, no_disassembler, no_docs)
        }
    }
}

fn validate(file: &PathBuf) -> Result<(), String> {
    let reader = AsmFileReader;
    match load_model(file, &reader) {
        Ok(model) => {
            println!("{}: valid ISA, {} instructions", model.name, model.instructions.len());
            Ok(())
        }
        Err(e) => Err(format_isa_error(&e)),
    }
}

/// Render every individual error's file/line/kind, per spec.md §6's exit
/// code contract ("a human-readable message listing each error's file,
/// line, and kind").
fn format_isa_error(err: &IsaError) -> String {
    match err {
        IsaError::Validation(errors) => errors
            .0
            .iter()
            .map(|e| format!("{:?} at {}: {}", e.kind, e.location, e.message))
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

#[derive(Serialize)]
struct RegisterSummary {
    name: String,
    kind: &'static str,
}

#[derive(Serialize)]
struct FormatSummary {
    name: String,
    width: u32,
}

#[derive(Serialize)]
struct InstructionSummary {
    name: String,
    format: String,
    operands: Vec<String>,
    external_behavior: bool,
}

#[derive(Serialize)]
struct ModelSummary {
    name: String,
    word_size: u32,
    registers: Vec<RegisterSummary>,
    formats: Vec<FormatSummary>,
    instructions: Vec<InstructionSummary>,
}

fn summarize(model: &Model) -> ModelSummary {
    ModelSummary {
        name: model.name.clone(),
        word_size: model.word_size,
        registers: model
            .registers
            .iter()
            .map(|r| RegisterSummary {
                name: r.name.clone(),
                kind: match &r.kind {
                    isadsl::model::RegisterKind::Scalar { .. } => "scalar",
                    isadsl::model::RegisterKind::File { .. } => "file",
                    isadsl::model::RegisterKind::Vector { .. } => "vector",
                    isadsl::model::RegisterKind::Virtual { .. } => "virtual",
                    isadsl::model::RegisterKind::Alias { .. } => "alias",
                },
            })
            .collect(),
        formats: model.formats.iter().map(|f| FormatSummary { name: f.name.clone(), width: f.width }).collect(),
        instructions: model
            .instructions
            .iter()
            .map(|i| InstructionSummary {
                name: i.name.clone(),
                format: model.format_at(i.format).name.clone(),
                operands: i.operands.iter().map(|o| o.name().to_string()).collect(),
                external_behavior: i.external_behavior,
            })
            .collect(),
    }
}

fn info(file: &PathBuf) -> Result<(), String> {
    let reader = AsmFileReader;
    let model = load_model(file, &reader).map_err(|e| format_isa_error(&e))?;
    let summary = summarize(&model);
    let json = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}

fn render_docs(model: &Model, include_assembler: bool, include_simulator: bool, include_disassembler: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", model.name));
    out.push_str(&format!("Word size: {} bits\n\n", model.word_size));
    out.push_str("## Instructions\n\n");
    for instr in &model.instructions {
        let format = model.format_at(instr.format);
        out.push_str(&format!("### {}\n\n", instr.name));
        out.push_str(&format!("Format: `{}` ({} bits)\n\n", format.name, format.width));
        if include_assembler {
            if let Some(syntax) = &instr.syntax {
                out.push_str(&format!("Assembly syntax: `{syntax}`\n\n"));
            }
        }
        if include_simulator {
            out.push_str(if instr.external_behavior {
                "Behavior: supplied externally by the driver.\n\n"
            } else if instr.behavior.is_some() {
                "Behavior: defined by RTL.\n\n"
            } else {
                "Behavior: none.\n\n"
            });
        }
        if include_disassembler && instr.bundle_format.is_some() {
            out.push_str("Bundle instruction.\n\n");
        }
    }
    out
}

fn generate(
    file: &PathBuf,
    output: &PathBuf,
    no_assembler: bool,
    no_simulator: bool,
    no_disassembler: bool,
    no_docs: bool,
) -> Result<(), String> {
    let reader = AsmFileReader;
    let model = load_model(file, &reader).map_err(|e| format_isa_error(&e))?;

    fs::create_dir_all(output).map_err(|e| e.to_string())?;

    let summary = summarize(&model);
    let json = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
    fs::write(output.join("model.json"), json).map_err(|e| e.to_string())?;

    if !no_docs {
        let docs = render_docs(&model, !no_assembler, !no_simulator, !no_disassembler);
        fs::write(output.join("docs.md"), docs).map_err(|e| e.to_string())?;
    }

    println!("Generated artifacts for {} in {}", model.name, output.display());
    Ok(())
}
