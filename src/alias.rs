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

//! Instruction alias operand inference (spec.md §4.9, §9 Open Questions),
//! shared by C5 (a static, names-only run checks the alias is well-formed)
//! and C9 (the same mapping, then resolved against concrete parsed values).
//!
//! Rule adopted to resolve the spec's documented underspecification: a
//! target operand whose name matches one of the alias's declared operands
//! takes that operand's value directly. Any target operand left unmatched
//! is inferred from the single alias operand that named no target,
//! provided exactly one of each remains — the one worked example (`PUSH
//! rd` -> `STM rd, rd`) is the degenerate case where every target operand
//! happens to match by name. Any other shape is rejected as ambiguous.

/// For each target operand (in order), the alias operand name supplying
/// its value. `None` if the alias's operand declaration does not permit
/// an unambiguous inference.
pub fn infer_operand_mapping(alias_operands: &[String], target_operands: &[String]) -> Option<Vec<String>> {
    let mut mapping: Vec<Option<String>> = vec![None; target_operands.len()];
    let mut unmatched_target = Vec::new();

    for (i, t) in target_operands.iter().enumerate() {
        if alias_operands.iter().any(|a| a == t) {
            mapping[i] = Some(t.clone());
        } else {
            unmatched_target.push(i);
        }
    }

    if unmatched_target.is_empty() {
        return Some(mapping.into_iter().map(|m| m.unwrap()).collect());
    }

    // An alias operand that directly named a target (e.g. `rs` above) is
    // still eligible to also fill a differently-named unmatched target — it
    // is consumed by *position* within the alias's own operand list, not by
    // having matched anything. So "remaining alias operands" here counts the
    // alias's operand list itself, not a name-based leftover set.
    if unmatched_target.len() == 1 && alias_operands.len() == 1 {
        mapping[unmatched_target[0]] = Some(alias_operands[0].clone());
        Some(mapping.into_iter().map(|m| m.unwrap()).collect())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcasts_single_alias_operand_to_repeated_target_name() {
        let alias = vec!["rd".to_string()];
        let target = vec!["rd".to_string(), "rd".to_string()];
        let mapping = infer_operand_mapping(&alias, &target).unwrap();
        assert_eq!(mapping, vec!["rd".to_string(), "rd".to_string()]);
    }

    #[test]
    fn direct_name_match_when_counts_equal() {
        let alias = vec!["a".to_string(), "b".to_string()];
        let target = vec!["a".to_string(), "b".to_string()];
        let mapping = infer_operand_mapping(&alias, &target).unwrap();
        assert_eq!(mapping, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn single_unmatched_pair_infers() {
        let alias = vec!["rs".to_string()];
        let target = vec!["rd".to_string(), "rs".to_string()];
        let mapping = infer_operand_mapping(&alias, &target).unwrap();
        assert_eq!(mapping, vec!["rs".to_string(), "rs".to_string()]);
    }

    #[test]
    fn ambiguous_when_multiple_unmatched() {
        let alias = vec!["a".to_string()];
        let target = vec!["x".to_string(), "y".to_string()];
        assert!(infer_operand_mapping(&alias, &target).is_none());
    }
}
