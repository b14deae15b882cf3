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

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

use crate::{EntityType, Opcode};

/// The ERC-7562 validation rules, plus the entry point revert codes and the
/// synthetic simulation failure code
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    AsRefStr,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
pub enum ViolationRule {
    /// Forbidden opcode
    #[strum(serialize = "OP-011")]
    #[serde(rename = "OP-011")]
    ForbiddenOpcode,
    /// GAS not followed by a call
    #[strum(serialize = "OP-012")]
    #[serde(rename = "OP-012")]
    GasNotFollowedByCall,
    /// Unassigned opcode
    #[strum(serialize = "OP-013")]
    #[serde(rename = "OP-013")]
    UnassignedOpcode,
    /// CREATE2 outside of the sender deployment
    #[strum(serialize = "OP-031")]
    #[serde(rename = "OP-031")]
    Create2,
    /// CREATE by an unprivileged entity
    #[strum(serialize = "OP-032")]
    #[serde(rename = "OP-032")]
    Create,
    /// Access to an address without code
    #[strum(serialize = "OP-041")]
    #[serde(rename = "OP-041")]
    AccessedUndeployedContract,
    /// Entry point `depositTo` from an entity other than sender or factory
    #[strum(serialize = "OP-052")]
    #[serde(rename = "OP-052")]
    EntryPointDepositTo,
    /// Entry point fallback call from an entity other than the sender
    #[strum(serialize = "OP-053")]
    #[serde(rename = "OP-053")]
    EntryPointFallback,
    /// Entry point `incrementNonce` from an entity other than the sender
    #[strum(serialize = "OP-054")]
    #[serde(rename = "OP-054")]
    EntryPointIncrementNonce,
    /// Any other entry point method
    #[strum(serialize = "OP-055")]
    #[serde(rename = "OP-055")]
    EntryPointMethod,
    /// Call with value to an address other than the entry point
    #[strum(serialize = "OP-061")]
    #[serde(rename = "OP-061")]
    CallWithValue,
    /// Call to a forbidden precompile
    #[strum(serialize = "OP-062")]
    #[serde(rename = "OP-062")]
    ForbiddenPrecompile,
    /// BALANCE or SELFBALANCE by an unstaked entity
    #[strum(serialize = "OP-080")]
    #[serde(rename = "OP-080")]
    Balance,
    /// Direct access to entry point storage
    #[strum(serialize = "STO-010")]
    #[serde(rename = "STO-010")]
    EntryPointStorage,
    /// Unauthorized storage read
    #[strum(serialize = "STO-031")]
    #[serde(rename = "STO-031")]
    StorageRead,
    /// Unauthorized storage write
    #[strum(serialize = "STO-032")]
    #[serde(rename = "STO-032")]
    StorageWrite,
    /// Sender has no code and no init code
    #[strum(serialize = "AA20")]
    #[serde(rename = "AA20")]
    SenderNotDeployed,
    /// Paymaster has no code
    #[strum(serialize = "AA30")]
    #[serde(rename = "AA30")]
    PaymasterNotDeployed,
    /// The simulation itself failed
    #[strum(serialize = "SIMULATION_ERROR")]
    #[serde(rename = "SIMULATION_ERROR")]
    SimulationError,
}

impl ViolationRule {
    /// The stable rule code, e.g. `"OP-011"`
    pub fn code(&self) -> &'static str {
        self.into()
    }
}

/// A rule violation observed during the validation of a user operation.
///
/// Violations are data: they are accumulated and never abort the remaining trace.
#[derive(Clone, Debug, PartialEq, Eq, parse_display::Display, Serialize, Deserialize)]
#[display("[{rule}] {message}")]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// The violated rule
    pub rule: ViolationRule,
    /// Human readable description
    pub message: String,
    /// The address the violation is attributed to
    pub address: Address,
    /// The offending opcode, for opcode rules
    pub opcode: Option<Opcode>,
    /// The offending slot, for storage rules
    pub slot: Option<U256>,
    /// The entity executing when the violation occurred
    pub entity: Option<EntityType>,
}

impl Violation {
    /// Create a violation with no opcode, slot or entity attached
    pub fn new(rule: ViolationRule, message: impl Into<String>, address: Address) -> Self {
        Self {
            rule,
            message: message.into(),
            address,
            opcode: None,
            slot: None,
            entity: None,
        }
    }

    /// Attach the offending opcode
    pub fn with_opcode(mut self, opcode: Opcode) -> Self {
        self.opcode = Some(opcode);
        self
    }

    /// Attach the offending slot
    pub fn with_slot(mut self, slot: U256) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Attach the entity executing at the time
    pub fn with_entity(mut self, entity: Option<EntityType>) -> Self {
        self.entity = entity;
        self
    }

    /// The stable rule code
    pub fn rule_code(&self) -> &'static str {
        self.rule.code()
    }
}
