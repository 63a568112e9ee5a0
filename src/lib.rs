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

pub mod alias;
pub mod assembler;
pub mod decode;
pub mod disasm;
pub mod errors;
pub mod file_reader;
pub mod include;
pub mod merge;
pub mod model;
pub mod pack;
pub mod parser;
pub mod rtl;
pub mod simulator;
pub mod validator;

extern crate pest;
extern crate pest_derive;

use std::path::Path;

use errors::IsaError;
use file_reader::FileReader;
use model::Model;

/// Run C1 (parse) through C5 (validate) over `root` and every file it
/// transitively `#include`s, producing a frozen, validated `Model`.
pub fn load_model<F: FileReader>(root: &Path, reader: &F) -> Result<Model, IsaError> {
    let resolved = include::resolve(root, reader)?;
    let root_path = root.display().to_string();
    let raw = merge::merge(&root_path, resolved)?;
    let model = validator::validate(raw)?;
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use file_reader::MockFileReader;

    #[test]
    fn load_model_surfaces_validation_errors_as_isa_error() {
        let mut reader = MockFileReader::default();
        reader.add_file(
            "bad.isa",
            r#"
            architecture "Bad" {
                word_size: 16
                endianness: little
            }
            "#,
        );
        let result = load_model(Path::new("bad.isa"), &reader);
        assert!(result.is_err());
    }
}
