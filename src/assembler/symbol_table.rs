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

//! Label addresses and `.define` constants (spec.md §4.9 pass 1, §3
//! constant-table prepass). Addresses are a single linear byte counter —
//! this ISA-DSL has no ROM-banking concept, unlike the teacher's console
//! target.

use std::collections::HashMap;

pub type SymbolTable = HashMap<String, u64>;
pub type ConstantTable = HashMap<String, u64>;

#[derive(Debug, Clone, Default)]
pub struct AddrCounter {
    pub addr: u64,
}

impl AddrCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, bytes: u64) {
        self.addr += bytes;
    }
}
