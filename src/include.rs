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

//! C2: `#include` resolution. Paths are resolved relative to the
//! including file (absolute paths accepted as-is), cycles are rejected,
//! and each distinct file is parsed at most once; the resulting sequence
//! is depth-first preorder, exactly as spec.md §4.2 requires.

use crate::errors::SyntaxError;
use crate::file_reader::FileReader;
use crate::parser::{self, FileModel};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub struct ResolvedFile {
    pub path: PathBuf,
    pub model: FileModel,
}

pub fn resolve<F: FileReader>(root: &Path, reader: &F) -> Result<Vec<ResolvedFile>, SyntaxError> {
    let mut out = Vec::new();
    let mut open: Vec<PathBuf> = Vec::new();
    let mut visited: HashSet<PathBuf> = HashSet::new();
    visit(root, reader, &mut open, &mut visited, &mut out)?;
    Ok(out)
}

fn visit<F: FileReader>(
    path: &Path,
    reader: &F,
    open: &mut Vec<PathBuf>,
    visited: &mut HashSet<PathBuf>,
    out: &mut Vec<ResolvedFile>,
) -> Result<(), SyntaxError> {
    let path = path.to_path_buf();

    if open.contains(&path) {
        let mut cycle: Vec<String> = open.iter().map(|p| p.display().to_string()).collect();
        cycle.push(path.display().to_string());
        return Err(SyntaxError::CircularInclude { cycle });
    }
    if visited.contains(&path) {
        return Ok(());
    }

    let source = reader.read_to_string(&path).map_err(|e| SyntaxError::IncludeIo {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let model = parser::parse_source(&path.display().to_string(), &source)?;

    open.push(path.clone());
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    for include in &model.includes {
        let included = resolve_relative(&dir, include);
        visit(&included, reader, open, visited, out)?;
    }
    open.pop();

    visited.insert(path.clone());
    out.push(ResolvedFile { path, model });
    Ok(())
}

fn resolve_relative(including_dir: &Path, include_path: &str) -> PathBuf {
    let p = Path::new(include_path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        including_dir.join(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_reader::MockFileReader;

    #[test]
    fn resolves_depth_first_preorder() {
        let mut r = MockFileReader::default();
        r.add_file("root.isa", "#include \"a.isa\"\n#include \"b.isa\"\nregister scalar R0 { width: 32; }\n");
        r.add_file("a.isa", "register scalar A { width: 32; }\n");
        r.add_file("b.isa", "register scalar B { width: 32; }\n");

        let files = resolve(Path::new("root.isa"), &r).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.path.display().to_string()).collect();
        assert_eq!(names, vec!["a.isa", "b.isa", "root.isa"]);
    }

    #[test]
    fn detects_cycles() {
        let mut r = MockFileReader::default();
        r.add_file("root.isa", "#include \"a.isa\"\n");
        r.add_file("a.isa", "#include \"root.isa\"\n");

        let err = resolve(Path::new("root.isa"), &r).unwrap_err();
        assert!(matches!(err, SyntaxError::CircularInclude { .. }));
    }

    #[test]
    fn diamond_include_parsed_once() {
        let mut r = MockFileReader::default();
        r.add_file("root.isa", "#include \"a.isa\"\n#include \"b.isa\"\n");
        r.add_file("a.isa", "#include \"shared.isa\"\n");
        r.add_file("b.isa", "#include \"shared.isa\"\n");
        r.add_file("shared.isa", "register scalar S { width: 32; }\n");

        let files = resolve(Path::new("root.isa"), &r).unwrap();
        let shared_count = files.iter().filter(|f| f.path.display().to_string() == "shared.isa").count();
        assert_eq!(shared_count, 1);
    }
}
