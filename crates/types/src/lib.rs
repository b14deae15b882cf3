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

#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]
//! Bundleguard common types

mod bundle;
pub use bundle::{
    BundleUserOpInfo, BundleValidationError, BundleValidationOptions, BundleValidationResult,
    ConflictKind, StorageConflict, UserOpStorageProfile,
};

mod entity;
pub use entity::{Entity, EntityInfo, EntityInfos, EntityType, StakeRequirements};

mod opcode;
pub use opcode::Opcode;

mod storage;
pub use storage::StorageSlot;

mod user_operation;
pub use user_operation::{concat_128, PackedUserOperation, UserOperationId};

mod validation;
pub use validation::{CallRecord, OpcodeExecution, StorageAccess, ValidationResult};

mod violation;
pub use violation::{Violation, ViolationRule};
