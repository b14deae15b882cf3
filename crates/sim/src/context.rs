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

use std::collections::{BTreeSet, HashMap};

use bundleguard_types::{
    CallRecord, EntityInfo, EntityInfos, EntityType, OpcodeExecution, StorageAccess, StorageSlot,
    Violation, ViolationRule,
};
use ethers::types::{Address, Bytes, U256};

/// Mutable state of the validation of a single user operation.
///
/// Created at the start of a simulation and consumed when its result is extracted.
/// Never shared between operations.
#[derive(Clone, Debug)]
pub struct ValidationContext {
    pub(crate) entry_point: Address,
    pub(crate) entities: EntityInfos,
    pub(crate) current_entity: Option<EntityType>,
    pub(crate) current_address: Address,
    pub(crate) call_depth: usize,
    pub(crate) is_deployment_phase: bool,
    pub(crate) allow_rip7212_precompile: bool,
    pub(crate) opcode_executions: Vec<OpcodeExecution>,
    pub(crate) storage_accesses: Vec<StorageAccess>,
    pub(crate) calls: Vec<CallRecord>,
    pub(crate) keccak_inputs: Vec<Bytes>,
    pub(crate) accessed_addresses: BTreeSet<Address>,
    pub(crate) associated_slots: HashMap<Address, BTreeSet<U256>>,
    pub(crate) violations: Vec<Violation>,
    pub(crate) create2_count: u32,
    pub(crate) create_count: u32,
}

impl ValidationContext {
    /// Create the context for an operation validated through `entry_point`
    pub fn new(entry_point: Address, entities: EntityInfos, allow_rip7212_precompile: bool) -> Self {
        Self {
            entry_point,
            entities,
            current_entity: None,
            current_address: entities.sender_address(),
            call_depth: 0,
            is_deployment_phase: false,
            allow_rip7212_precompile,
            opcode_executions: vec![],
            storage_accesses: vec![],
            calls: vec![],
            keccak_inputs: vec![],
            accessed_addresses: BTreeSet::new(),
            associated_slots: HashMap::new(),
            violations: vec![],
            create2_count: 0,
            create_count: 0,
        }
    }

    /// Start the validation phase of `kind`. Execution restarts at the entity's
    /// address, at depth zero.
    pub fn enter_phase(&mut self, kind: EntityType) {
        self.current_entity = Some(kind);
        if let Some(info) = self.entities.get(kind) {
            self.current_address = info.address();
        }
        self.call_depth = 0;
    }

    /// Mark whether the sender is being deployed
    pub fn set_deployment_phase(&mut self, is_deployment_phase: bool) {
        self.is_deployment_phase = is_deployment_phase;
    }

    /// Update the currently executing contract and call depth
    pub fn set_execution_frame(&mut self, address: Address, depth: usize) {
        self.current_address = address;
        self.call_depth = depth;
    }

    /// The info of the entity whose phase is running
    pub fn current_entity_info(&self) -> Option<&EntityInfo> {
        self.current_entity.and_then(|kind| self.entities.get(kind))
    }

    /// The role of `address` in the operation, if any
    pub fn role_of(&self, address: Address) -> Option<EntityType> {
        self.entities.role_of(address)
    }

    /// Whether `address` is one of the operation's entities
    pub fn is_entity_address(&self, address: Address) -> bool {
        self.entities.is_entity_address(address)
    }

    /// Whether `slot` of `address` was recorded as associated with the sender
    pub fn is_associated_slot(&self, address: Address, slot: U256) -> bool {
        self.associated_slots
            .get(&address)
            .is_some_and(|slots| slots.contains(&slot))
    }

    /// Record `slot` of `address` as associated with the sender
    pub fn track_associated_slot(&mut self, address: Address, slot: U256) {
        self.associated_slots.entry(address).or_default().insert(slot);
    }

    /// Record a violation attributed to the executing contract and entity
    pub fn add_violation(&mut self, rule: ViolationRule, message: impl Into<String>) {
        let violation = Violation::new(rule, message, self.current_address)
            .with_entity(self.current_entity);
        self.push_violation(violation);
    }

    /// Record a violation
    pub fn push_violation(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    /// The entry point address
    pub fn entry_point(&self) -> Address {
        self.entry_point
    }

    /// The operation's entities
    pub fn entities(&self) -> &EntityInfos {
        &self.entities
    }

    /// The sender address
    pub fn sender(&self) -> Address {
        self.entities.sender_address()
    }

    /// The factory, if any
    pub fn factory(&self) -> Option<&EntityInfo> {
        self.entities.factory.as_ref()
    }

    /// The entity whose phase is running
    pub fn current_entity(&self) -> Option<EntityType> {
        self.current_entity
    }

    /// The executing contract
    pub fn current_address(&self) -> Address {
        self.current_address
    }

    /// Current call depth
    pub fn call_depth(&self) -> usize {
        self.call_depth
    }

    /// Whether the sender is being deployed
    pub fn is_deployment_phase(&self) -> bool {
        self.is_deployment_phase
    }

    /// Whether the RIP-7212 secp256r1 precompile may be called
    pub fn allow_rip7212_precompile(&self) -> bool {
        self.allow_rip7212_precompile
    }

    /// Accepted CREATE2 executions so far
    pub fn create2_count(&self) -> u32 {
        self.create2_count
    }

    /// Accepted CREATE executions so far
    pub fn create_count(&self) -> u32 {
        self.create_count
    }

    /// Violations recorded so far
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// KECCAK256 inputs observed so far
    pub fn keccak_inputs(&self) -> &[Bytes] {
        &self.keccak_inputs
    }

    /// Associated slots recorded so far, flattened
    pub fn associated_storage_slots(&self) -> BTreeSet<StorageSlot> {
        self.associated_slots
            .iter()
            .flat_map(|(address, slots)| {
                slots.iter().map(|slot| StorageSlot::new(*address, *slot))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_phase() {
        let sender = Address::random();
        let paymaster = Address::random();
        let entities = EntityInfos::new(EntityInfo::sender(sender, false))
            .with_paymaster(EntityInfo::paymaster(paymaster, true));
        let mut ctx = ValidationContext::new(Address::random(), entities, false);

        assert!(ctx.current_entity_info().is_none());

        ctx.enter_phase(EntityType::Paymaster);
        assert_eq!(ctx.current_address(), paymaster);
        assert!(ctx.current_entity_info().unwrap().is_staked);

        ctx.set_execution_frame(Address::random(), 2);
        ctx.enter_phase(EntityType::Sender);
        assert_eq!(ctx.current_address(), sender);
        assert_eq!(ctx.call_depth(), 0);
        assert_eq!(ctx.role_of(paymaster), Some(EntityType::Paymaster));
    }

    #[test]
    fn test_add_violation_attribution() {
        let sender = Address::random();
        let mut ctx = ValidationContext::new(
            Address::random(),
            EntityInfos::new(EntityInfo::sender(sender, false)),
            false,
        );
        ctx.enter_phase(EntityType::Sender);
        ctx.add_violation(ViolationRule::ForbiddenOpcode, "nope");

        let v = &ctx.violations()[0];
        assert_eq!(v.address, sender);
        assert_eq!(v.entity, Some(EntityType::Sender));
        assert_eq!(v.rule, ViolationRule::ForbiddenOpcode);
    }

    #[test]
    fn test_associated_slots() {
        let contract = Address::random();
        let mut ctx = ValidationContext::new(
            Address::random(),
            EntityInfos::new(EntityInfo::sender(Address::random(), false)),
            false,
        );
        assert!(!ctx.is_associated_slot(contract, 1.into()));
        ctx.track_associated_slot(contract, 1.into());
        assert!(ctx.is_associated_slot(contract, 1.into()));
        assert!(!ctx.is_associated_slot(Address::random(), 1.into()));
        assert_eq!(
            ctx.associated_storage_slots(),
            [StorageSlot::new(contract, 1.into())].into_iter().collect()
        );
    }
}
