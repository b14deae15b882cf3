// This file is part of Bundleguard.
//
// Bundleguard is free software: you can redistribute it and/or modify it under the
// terms of the GNU Lesser General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version.
//
// Bundleguard is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with Bundleguard.
// If not, see https://www.gnu.org/licenses/.

use std::collections::BTreeSet;

use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::{EntityType, Opcode, Violation, ViolationRule};

/// A storage access observed during validation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageAccess {
    /// Contract whose storage was accessed
    pub address: Address,
    /// The slot
    pub slot: U256,
    /// SSTORE or TSTORE
    pub is_write: bool,
    /// TLOAD or TSTORE
    pub is_transient: bool,
    /// Entity executing at the time
    pub entity: Option<EntityType>,
    /// Call depth
    pub depth: usize,
}

/// An executed opcode. The raw byte is kept since unassigned bytes are recorded too.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpcodeExecution {
    /// The raw opcode byte
    pub opcode: u8,
    /// Executing contract
    pub address: Address,
    /// Program counter
    pub pc: u64,
    /// Call depth
    pub depth: usize,
    /// Entity executing at the time
    pub entity: Option<EntityType>,
}

impl OpcodeExecution {
    /// The decoded opcode, `None` when the byte is unassigned
    pub fn decoded(&self) -> Option<Opcode> {
        Opcode::try_from(self.opcode).ok()
    }
}

/// A message call observed during validation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    /// Calling contract
    pub from: Address,
    /// Called contract
    pub to: Address,
    /// Value transferred
    pub value: U256,
    /// Call data
    pub data: Bytes,
    /// Call depth of the caller
    pub depth: usize,
    /// Entity executing at the time
    pub entity: Option<EntityType>,
}

/// Outcome of validating a single user operation
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// True iff there are no violations
    pub is_valid: bool,
    /// All violations, in the order they were observed
    pub violations: Vec<Violation>,
    /// Storage access history
    pub storage_accesses: Vec<StorageAccess>,
    /// Opcode history
    pub opcode_executions: Vec<OpcodeExecution>,
    /// Call history
    pub calls: Vec<CallRecord>,
    /// Every address touched during validation
    pub accessed_addresses: BTreeSet<Address>,
}

impl ValidationResult {
    /// A result carrying a single violation and no history
    pub fn failed(violation: Violation) -> Self {
        Self {
            is_valid: false,
            violations: vec![violation],
            ..Default::default()
        }
    }

    /// Whether any violation of `rule` was recorded
    pub fn has_violation(&self, rule: ViolationRule) -> bool {
        self.violations.iter().any(|v| v.rule == rule)
    }

    /// The rule codes of all violations, in order
    pub fn rule_codes(&self) -> Vec<&'static str> {
        self.violations.iter().map(|v| v.rule_code()).collect()
    }
}
