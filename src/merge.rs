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

//! C4: combine the depth-first preorder sequence of parsed files from C2
//! into the single `RawArchitecture` that C5 validates. Per spec.md §4.4,
//! the shape of the inputs selects one of two modes: merge (every included
//! file is partial) or inheritance (an included file is itself an
//! architecture, used as a base). A file must be entirely one or the
//! other; mixing inside a single file is rejected before either mode runs.

use crate::errors::MergeError;
use crate::include::ResolvedFile;
use crate::model::raw::{RawArchitecture, RawBundleFormat, RawFormat, RawInstruction, RawInstructionAlias, RawRegister};
use crate::parser::FileModel;

pub fn merge(root_path: &str, files: Vec<ResolvedFile>) -> Result<RawArchitecture, MergeError> {
    for f in &files {
        let path = f.path.display().to_string();
        let is_partial = !f.model.partial.registers.is_empty()
            || !f.model.partial.formats.is_empty()
            || !f.model.partial.bundle_formats.is_empty()
            || !f.model.partial.instructions.is_empty()
            || !f.model.partial.aliases.is_empty();
        if f.model.architecture.is_some() && is_partial {
            return Err(MergeError::MixedFileContent { file: path });
        }
    }

    let root = files
        .iter()
        .find(|f| f.path.display().to_string() == root_path)
        .expect("root file is always present in the resolved sequence");

    let root_arch = root
        .model
        .architecture
        .clone()
        .expect("root file must declare an architecture block");

    let bases: Vec<&FileModel> = files
        .iter()
        .filter(|f| f.path.display().to_string() != root_path && f.model.architecture.is_some())
        .map(|f| &f.model)
        .collect();

    let mut arch = if let Some(base_model) = bases.first() {
        inherit(root_arch, base_model.architecture.as_ref().unwrap().clone())
    } else {
        root_arch
    };

    // Merge mode: concatenate every partial file's collections, in include
    // (i.e. depth-first preorder) order, into the root architecture.
    for f in &files {
        if f.path.display().to_string() == root_path {
            continue;
        }
        if f.model.architecture.is_some() {
            continue;
        }
        let p = &f.model.partial;
        arch.registers.extend(p.registers.iter().cloned());
        arch.formats.extend(p.formats.iter().cloned());
        arch.bundle_formats.extend(p.bundle_formats.iter().cloned());
        arch.instructions.extend(p.instructions.iter().cloned());
        arch.aliases.extend(p.aliases.iter().cloned());
    }

    check_duplicates(&arch)?;
    Ok(arch)
}

/// Inheritance mode: `root` inherits `base`'s properties, registers,
/// formats and instructions; entities in `root` sharing a name with one in
/// `base` replace it, everything else is added (spec.md §4.4).
fn inherit(root: RawArchitecture, base: RawArchitecture) -> RawArchitecture {
    let word_size = if root.word_size != 0 { root.word_size } else { base.word_size };
    let endianness = root.endianness.or(base.endianness);

    let registers = override_by_name(base.registers, root.registers, |r| &r.name);
    let formats = override_by_name(base.formats, root.formats, |f| &f.name);
    let bundle_formats = override_by_name(base.bundle_formats, root.bundle_formats, |b| &b.name);
    let instructions = override_by_name(base.instructions, root.instructions, |i| &i.name);
    let aliases = override_by_name(base.aliases, root.aliases, |a| &a.name);

    RawArchitecture {
        name: root.name,
        word_size,
        endianness,
        registers,
        formats,
        bundle_formats,
        instructions,
        aliases,
    }
}

fn override_by_name<T: Clone>(base: Vec<T>, overrides: Vec<T>, name_of: impl Fn(&T) -> &String) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(base.len() + overrides.len());
    for item in base {
        if !overrides.iter().any(|o| name_of(o) == name_of(&item)) {
            out.push(item);
        }
    }
    out.extend(overrides);
    out
}

fn check_duplicates(arch: &RawArchitecture) -> Result<(), MergeError> {
    find_dup(&arch.registers, |r: &RawRegister| &r.name, "register")?;
    find_dup(&arch.formats, |f: &RawFormat| &f.name, "format")?;
    find_dup(&arch.bundle_formats, |b: &RawBundleFormat| &b.name, "bundle format")?;
    find_dup(&arch.instructions, |i: &RawInstruction| &i.name, "instruction")?;
    find_dup(&arch.aliases, |a: &RawInstructionAlias| &a.name, "instruction alias")?;
    Ok(())
}

fn find_dup<T>(items: &[T], name_of: impl Fn(&T) -> &String, kind: &'static str) -> Result<(), MergeError> {
    let mut seen = std::collections::HashSet::new();
    for item in items {
        let name = name_of(item);
        if !seen.insert(name) {
            return Err(MergeError::DuplicateDefinition { kind, name: name.clone() });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_reader::MockFileReader;
    use crate::include;
    use std::path::Path;

    #[test]
    fn merge_mode_concatenates_partial_files() {
        let mut r = MockFileReader::default();
        r.add_file(
            "root.isa",
            "#include \"regs.isa\"\narchitecture Demo { word_size: 32; endianness: little; }\n",
        );
        r.add_file("regs.isa", "register scalar R0 { width: 32; }\n");

        let files = include::resolve(Path::new("root.isa"), &r).unwrap();
        let arch = merge("root.isa", files).unwrap();
        assert_eq!(arch.registers.len(), 1);
        assert_eq!(arch.registers[0].name, "R0");
    }

    #[test]
    fn inheritance_mode_overrides_by_name() {
        let mut r = MockFileReader::default();
        r.add_file(
            "root.isa",
            "#include \"base.isa\"\narchitecture Demo { register scalar R0 { width: 64; } }\n",
        );
        r.add_file(
            "base.isa",
            "architecture Base { word_size: 32; endianness: little; register scalar R0 { width: 32; } register scalar R1 { width: 32; } }\n",
        );

        let files = include::resolve(Path::new("root.isa"), &r).unwrap();
        let arch = merge("root.isa", files).unwrap();
        assert_eq!(arch.word_size, 32);
        assert_eq!(arch.registers.len(), 2);
        let r0 = arch.registers.iter().find(|r| r.name == "R0").unwrap();
        assert_eq!(r0.kind, crate::model::raw::RegisterKind::Scalar { width: 64 });
    }

    #[test]
    fn mixed_file_content_rejected() {
        let mut r = MockFileReader::default();
        r.add_file(
            "root.isa",
            "#include \"mixed.isa\"\narchitecture Demo { word_size: 32; endianness: little; }\n",
        );
        r.add_file(
            "mixed.isa",
            "architecture Base { word_size: 32; } register scalar Stray { width: 8; }\n",
        );

        let files = include::resolve(Path::new("root.isa"), &r).unwrap();
        let err = merge("root.isa", files).unwrap_err();
        assert!(matches!(err, MergeError::MixedFileContent { .. }));
    }

    #[test]
    fn duplicate_names_across_files_rejected() {
        let mut r = MockFileReader::default();
        r.add_file(
            "root.isa",
            "#include \"a.isa\"\n#include \"b.isa\"\narchitecture Demo { word_size: 32; endianness: little; }\n",
        );
        r.add_file("a.isa", "register scalar R0 { width: 32; }\n");
        r.add_file("b.isa", "register scalar R0 { width: 32; }\n");

        let files = include::resolve(Path::new("root.isa"), &r).unwrap();
        let err = merge("root.isa", files).unwrap_err();
        assert!(matches!(err, MergeError::DuplicateDefinition { .. }));
    }
}
