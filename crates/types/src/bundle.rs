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

use std::{
    collections::{BTreeSet, HashMap},
    time::Duration,
};

use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

use crate::{EntityInfos, PackedUserOperation, StorageSlot, ValidationResult};

/// The storage footprint of one user operation's validation
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOpStorageProfile {
    /// Hash of the operation
    pub op_hash: H256,
    /// Sender of the operation
    pub sender: Address,
    /// Factory, if any
    pub factory: Option<Address>,
    /// Paymaster, if any
    pub paymaster: Option<Address>,
    /// Slots read, persistent and transient
    pub read_slots: BTreeSet<StorageSlot>,
    /// Slots written, persistent and transient
    pub write_slots: BTreeSet<StorageSlot>,
    /// Contracts whose storage or code was touched
    pub accessed_contracts: BTreeSet<Address>,
    /// Slots proven to be associated with `sender`
    pub associated_slots: BTreeSet<StorageSlot>,
}

impl UserOpStorageProfile {
    /// Whether `slot` is associated with this profile's sender
    pub fn is_associated(&self, slot: &StorageSlot) -> bool {
        self.associated_slots.contains(slot)
    }
}

/// The kinds of conflict between two operations of a bundle
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, parse_display::Display, Serialize,
    Deserialize,
)]
pub enum ConflictKind {
    /// Both operations write the same slot
    WriteWrite,
    /// One operation reads a slot the other writes
    ReadWrite,
    /// Both operations write the same slot of a shared factory or paymaster
    EntityConflict,
    /// Both operations come from the same sender
    SenderConflict,
}

/// A conflict between two operations of a bundle
#[derive(Clone, Debug, PartialEq, Eq, parse_display::Display, Serialize, Deserialize)]
#[display("{kind}: {message}")]
#[serde(rename_all = "camelCase")]
pub struct StorageConflict {
    /// Hash of the first operation, in bundle order
    pub op_hash_1: H256,
    /// Hash of the second operation, in bundle order
    pub op_hash_2: H256,
    /// Contract owning the conflicting slot. The sender for a sender conflict.
    pub contract: Address,
    /// The conflicting slot. Zero for a sender conflict.
    pub slot: U256,
    /// Conflict kind
    pub kind: ConflictKind,
    /// Human readable description
    pub message: String,
}

/// Structural failures of bundle validation
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BundleValidationError {
    /// No operations were given
    #[error("Bundle is empty")]
    EmptyBundle,
    /// The simulations did not complete in time
    #[error("Bundle validation timed out after {0:?}")]
    TimedOut(Duration),
}

impl Serialize for BundleValidationError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Outcome of validating a bundle
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleValidationResult {
    /// Whether the bundle can be submitted as is
    pub is_valid: bool,
    /// Every conflict contributing to the verdict
    pub conflicts: Vec<StorageConflict>,
    /// Individual validation results, by operation hash
    pub per_op_results: HashMap<H256, ValidationResult>,
    /// Operations that must be dropped, in bundle order
    pub rejected_hashes: Vec<H256>,
    /// Set when validation failed as a whole
    pub error: Option<BundleValidationError>,
}

impl BundleValidationResult {
    /// A failed result with no per operation data
    pub fn failed(error: BundleValidationError) -> Self {
        Self {
            is_valid: false,
            error: Some(error),
            ..Default::default()
        }
    }
}

/// Bundle acceptance policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BundleValidationOptions {
    /// Invalidate the bundle if any operation has a violation
    pub reject_on_any_violation: bool,
    /// Run conflict detection over the surviving operations
    pub reject_on_storage_conflict: bool,
    /// Ignore write/write conflicts
    pub allow_write_write_conflicts: bool,
    /// Deadline for all simulations to complete
    pub timeout: Option<Duration>,
}

impl Default for BundleValidationOptions {
    fn default() -> Self {
        Self {
            reject_on_any_violation: true,
            reject_on_storage_conflict: true,
            allow_write_write_conflicts: false,
            timeout: None,
        }
    }
}

/// A bundle candidate: the operation and its entities' staking data
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundleUserOpInfo {
    /// The operation
    pub user_op: PackedUserOperation,
    /// Its entities
    pub entities: EntityInfos,
}
