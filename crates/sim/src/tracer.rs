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

use bundleguard_types::{
    CallRecord, EntityType, Opcode, OpcodeExecution, StorageAccess, StorageSlot,
    UserOpStorageProfile, ValidationResult, Violation,
};
use ethers::types::{Address, Bytes, H256, U256};

use crate::{
    associated::{AssociatedStorageCalculator, KeccakPreimage},
    context::ValidationContext,
    rules::RuleEnforcer,
};

/// Turns the execution events of one user operation's validation into violations
/// and an access history.
///
/// Opcodes are checked with one instruction of lookahead: an opcode is validated
/// when its successor arrives, or without a successor when the interceptor is
/// flushed. Other events are checked as they arrive. Every event is recorded
/// whether or not it violates a rule.
#[derive(Debug)]
pub struct TracingInterceptor {
    ctx: ValidationContext,
    calculator: AssociatedStorageCalculator,
    enforcer: RuleEnforcer,
    previous: Option<OpcodeExecution>,
    finalized: bool,
}

impl TracingInterceptor {
    /// Create an interceptor over a fresh context
    pub fn new(ctx: ValidationContext) -> Self {
        Self {
            ctx,
            calculator: AssociatedStorageCalculator::new(),
            enforcer: RuleEnforcer,
            previous: None,
            finalized: false,
        }
    }

    /// The validation context
    pub fn context(&self) -> &ValidationContext {
        &self.ctx
    }

    /// The associated storage calculator
    pub fn calculator_mut(&mut self) -> &mut AssociatedStorageCalculator {
        &mut self.calculator
    }

    /// Flush the buffered opcode and start the phase of `kind`
    pub fn enter_phase(&mut self, kind: EntityType) {
        self.flush();
        self.ctx.enter_phase(kind);
    }

    /// Flush the buffered opcode and mark whether the sender is being deployed
    pub fn set_deployment_phase(&mut self, is_deployment_phase: bool) {
        self.flush();
        self.ctx.set_deployment_phase(is_deployment_phase);
    }

    /// Record a violation detected outside of the trace
    pub fn push_violation(&mut self, violation: Violation) {
        self.ctx.push_violation(violation);
    }

    /// An instruction was executed
    pub fn on_opcode(&mut self, opcode: u8, address: Address, pc: u64, depth: usize) {
        if self.finalized {
            return;
        }
        if let Some(previous) = self.previous.take() {
            self.validate_buffered(previous, Some(opcode));
        }
        self.ctx.set_execution_frame(address, depth);
        let execution = OpcodeExecution {
            opcode,
            address,
            pc,
            depth,
            entity: self.ctx.current_entity,
        };
        self.ctx.opcode_executions.push(execution);
        self.previous = Some(execution);
    }

    /// Validate the buffered opcode as the last of its phase
    pub fn flush(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.validate_buffered(previous, None);
        }
    }

    /// Flush and stop accepting events
    pub fn finalize(&mut self) {
        self.flush();
        self.finalized = true;
    }

    fn validate_buffered(&mut self, execution: OpcodeExecution, next: Option<u8>) {
        let frame = (self.ctx.current_address, self.ctx.call_depth);
        self.ctx.set_execution_frame(execution.address, execution.depth);
        if let Some(v) = self
            .enforcer
            .validate_opcode(execution.opcode, next, &mut self.ctx)
        {
            self.ctx.push_violation(v);
        }
        self.ctx.set_execution_frame(frame.0, frame.1);
    }

    /// A persistent or transient storage slot was accessed by the executing contract.
    ///
    /// Persistent slots proven to derive from the sender are recorded as associated
    /// before the access is checked.
    pub fn on_storage_access(
        &mut self,
        address: Address,
        slot: U256,
        is_write: bool,
        is_transient: bool,
    ) {
        if self.finalized {
            return;
        }
        if !is_transient
            && self
                .calculator
                .is_associated_slot(address, slot, self.ctx.sender())
        {
            self.ctx.track_associated_slot(address, slot);
        }
        self.ctx.storage_accesses.push(StorageAccess {
            address,
            slot,
            is_write,
            is_transient,
            entity: self.ctx.current_entity,
            depth: self.ctx.call_depth,
        });
        self.ctx.accessed_addresses.insert(address);
        if let Some(v) =
            self.enforcer
                .validate_storage_access(address, slot, is_write, is_transient, &self.ctx)
        {
            self.ctx.push_violation(v);
        }
    }

    /// A message call to a non precompile target
    pub fn on_call(&mut self, from: Address, target: Address, value: U256, data: Bytes) {
        if self.finalized {
            return;
        }
        let violation = self
            .enforcer
            .validate_call(from, target, value, &data, &self.ctx);
        self.record_call(from, target, value, data);
        if let Some(v) = violation {
            self.ctx.push_violation(v);
        }
    }

    /// A message call to a precompile
    pub fn on_precompile_call(&mut self, from: Address, precompile: Address, data: Bytes) {
        if self.finalized {
            return;
        }
        self.record_call(from, precompile, U256::zero(), data);
        if let Some(v) = self.enforcer.validate_precompile_call(precompile, &self.ctx) {
            self.ctx.push_violation(v);
        }
    }

    /// The code of `target` is about to run
    pub fn on_code_access(&mut self, target: Address, has_code: bool) {
        if self.finalized {
            return;
        }
        self.ctx.accessed_addresses.insert(target);
        if let Some(v) = self.enforcer.validate_code_access(target, has_code, &self.ctx) {
            self.ctx.push_violation(v);
        }
    }

    /// EXTCODESIZE, EXTCODEHASH or EXTCODECOPY on `target`
    pub fn on_ext_code_access(&mut self, opcode: Opcode, target: Address, has_code: bool) {
        if self.finalized {
            return;
        }
        self.ctx.accessed_addresses.insert(target);
        if let Some(v) = self
            .enforcer
            .validate_ext_code_opcode(opcode, target, has_code, &self.ctx)
        {
            self.ctx.push_violation(v);
        }
    }

    /// A contract was created. CREATE and CREATE2 are checked on the opcode stream.
    pub fn on_create(&mut self, from: Address, created: Option<Address>, is_create2: bool) {
        if self.finalized {
            return;
        }
        tracing::trace!(?from, ?created, is_create2, "contract creation");
        if let Some(created) = created {
            self.ctx.accessed_addresses.insert(created);
        }
    }

    /// A KECCAK256 of `input` produced `hash`
    pub fn on_keccak256(&mut self, input: &[u8], hash: U256) {
        if self.finalized {
            return;
        }
        self.ctx.keccak_inputs.push(Bytes::from(input.to_vec()));
        if let Some(KeccakPreimage::AddressMapping { address, .. }) =
            self.calculator.track_keccak_from_hash(input, hash)
        {
            if address == self.ctx.sender() {
                self.ctx.track_associated_slot(self.ctx.current_address, hash);
            }
        }
    }

    /// Record an address touched outside of the trace, such as a nested call target
    pub fn on_address_accessed(&mut self, address: Address) {
        if self.finalized {
            return;
        }
        self.ctx.accessed_addresses.insert(address);
    }

    fn record_call(&mut self, from: Address, to: Address, value: U256, data: Bytes) {
        self.ctx.calls.push(CallRecord {
            from,
            to,
            value,
            data,
            depth: self.ctx.call_depth,
            entity: self.ctx.current_entity,
        });
    }

    /// Snapshot of the result so far
    pub fn get_result(&self) -> ValidationResult {
        ValidationResult {
            is_valid: self.ctx.violations.is_empty(),
            violations: self.ctx.violations.clone(),
            storage_accesses: self.ctx.storage_accesses.clone(),
            opcode_executions: self.ctx.opcode_executions.clone(),
            calls: self.ctx.calls.clone(),
            accessed_addresses: self.ctx.accessed_addresses.clone(),
        }
    }

    /// The storage footprint of the operation, derived from the recorded accesses
    pub fn storage_profile(&self, op_hash: H256) -> UserOpStorageProfile {
        let entities = self.ctx.entities();
        let mut profile = UserOpStorageProfile {
            op_hash,
            sender: entities.sender_address(),
            factory: entities.factory.map(|f| f.address()),
            paymaster: entities.paymaster.map(|p| p.address()),
            accessed_contracts: self.ctx.accessed_addresses.clone(),
            associated_slots: self.ctx.associated_storage_slots(),
            ..Default::default()
        };
        for access in &self.ctx.storage_accesses {
            let key = StorageSlot::new(access.address, access.slot);
            if access.is_write {
                profile.write_slots.insert(key);
            } else {
                profile.read_slots.insert(key);
            }
        }
        profile
    }

    /// Finalize and consume the interceptor into its result and storage profile
    pub fn into_result(mut self, op_hash: H256) -> (ValidationResult, UserOpStorageProfile) {
        self.finalize();
        let profile = self.storage_profile(op_hash);
        let ctx = self.ctx;
        let result = ValidationResult {
            is_valid: ctx.violations.is_empty(),
            violations: ctx.violations,
            storage_accesses: ctx.storage_accesses,
            opcode_executions: ctx.opcode_executions,
            calls: ctx.calls,
            accessed_addresses: ctx.accessed_addresses,
        };
        (result, profile)
    }
}
