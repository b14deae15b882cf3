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

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bundleguard_types::{
    EntityInfos, EntityType, Opcode, PackedUserOperation, StakeRequirements,
    UserOpStorageProfile, ValidationResult, Violation, ViolationRule,
};
use ethers::{
    abi::{encode, Token},
    types::{Address, Bytes, H256, U256},
    utils::keccak256,
};
#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;
use tracing::{debug, warn};

use crate::{
    context::ValidationContext,
    executor::{BlockContext, CallKind, EvmExecutor, ExecutionRequest, NodeDataService, TraceStep},
    rules::{is_precompile_address, CALL_OPCODES, EXT_CODE_OPCODES},
    tracer::TracingInterceptor,
};

/// `validateUserOp(op, userOpHash, missingAccountFunds)`
pub const VALIDATE_USER_OP_SELECTOR: [u8; 4] = [0x3a, 0x87, 0x1c, 0xdd];

/// `validatePaymasterUserOp(op, userOpHash, maxCost)`
pub const VALIDATE_PAYMASTER_USER_OP_SELECTOR: [u8; 4] = [0xf4, 0x65, 0xc7, 0x7e];

/// The result of simulating the validation of a user operation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimulationOutput {
    /// Violations and access history
    pub result: ValidationResult,
    /// Storage footprint, for bundle conflict detection
    pub profile: UserOpStorageProfile,
}

/// Simulates the validation of user operations and checks them against the
/// ERC-7562 rules.
///
/// Simulation never fails: collaborator errors are reported as a
/// `SIMULATION_ERROR` violation.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait Simulator: Send + Sync + 'static {
    /// Simulate the validation of `op` and return both its result and its
    /// storage profile
    async fn simulate_validation(
        &self,
        op: PackedUserOperation,
        entry_point: Address,
        entities: EntityInfos,
        block: BlockContext,
    ) -> SimulationOutput;

    /// Validate `op` against the ERC-7562 rules
    async fn validate_user_operation(
        &self,
        op: PackedUserOperation,
        entry_point: Address,
        entities: EntityInfos,
        block: BlockContext,
    ) -> ValidationResult {
        self.simulate_validation(op, entry_point, entities, block)
            .await
            .result
    }

    /// The storage footprint of `op`'s validation
    async fn get_storage_profile(
        &self,
        op: PackedUserOperation,
        entry_point: Address,
        entities: EntityInfos,
        block: BlockContext,
    ) -> UserOpStorageProfile {
        self.simulate_validation(op, entry_point, entities, block)
            .await
            .profile
    }
}

/// Simulation settings
#[derive(Clone, Copy, Debug)]
pub struct Settings {
    /// Number of mapping base slots for which the sender's entry is registered
    /// as associated up front
    pub associated_base_slots: u64,
    /// Whether the RIP-7212 secp256r1 precompile may be called
    pub allow_rip7212_precompile: bool,
    /// Gas limit of each simulated call
    pub gas_limit: u64,
    /// Minimum stake for an entity to count as staked
    pub min_stake_value: U256,
    /// Minimum unstake delay for an entity to count as staked
    pub min_unstake_delay: u64,
}

impl Settings {
    /// Create new settings
    pub fn new(
        associated_base_slots: u64,
        allow_rip7212_precompile: bool,
        gas_limit: u64,
        min_stake_value: U256,
        min_unstake_delay: u64,
    ) -> Self {
        Self {
            associated_base_slots,
            allow_rip7212_precompile,
            gas_limit,
            min_stake_value,
            min_unstake_delay,
        }
    }

    /// The stake thresholds
    pub fn stake_requirements(&self) -> StakeRequirements {
        StakeRequirements {
            min_stake_value: self.min_stake_value,
            min_unstake_delay: self.min_unstake_delay,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        let stake = StakeRequirements::default();
        Self {
            associated_base_slots: 10,
            allow_rip7212_precompile: false,
            gas_limit: 10_000_000,
            min_stake_value: stake.min_stake_value,
            min_unstake_delay: stake.min_unstake_delay,
        }
    }
}

/// Simulator running validation through an external EVM against node state
#[derive(Debug)]
pub struct SimulatorImpl<N, E> {
    node: Arc<N>,
    executor: Arc<E>,
    settings: Settings,
}

impl<N, E> SimulatorImpl<N, E>
where
    N: NodeDataService,
    E: EvmExecutor,
{
    /// Create a new simulator
    pub fn new(node: Arc<N>, executor: Arc<E>, settings: Settings) -> Self {
        Self {
            node,
            executor,
            settings,
        }
    }

    /// The settings in use
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

#[async_trait]
impl<N, E> Simulator for SimulatorImpl<N, E>
where
    N: NodeDataService,
    E: EvmExecutor,
{
    async fn simulate_validation(
        &self,
        op: PackedUserOperation,
        entry_point: Address,
        entities: EntityInfos,
        block: BlockContext,
    ) -> SimulationOutput {
        let op_hash = op.hash(entry_point, block.chain_id);
        let sender = entities.sender_address();

        let ctx = ValidationContext::new(
            entry_point,
            entities,
            self.settings.allow_rip7212_precompile,
        );
        let mut interceptor = TracingInterceptor::new(ctx);
        for base_slot in 0..self.settings.associated_base_slots {
            interceptor
                .calculator_mut()
                .register_sender_slot(sender, base_slot.into());
        }

        let mut run = ValidationRun {
            node: self.node.as_ref(),
            executor: self.executor.as_ref(),
            settings: &self.settings,
            block,
            entry_point,
            code: HashMap::new(),
            interceptor,
        };

        if let Err(error) = run.run_phases(&op, op_hash).await {
            warn!("Simulation of op {op_hash:?} failed: {error:?}");
            run.interceptor.flush();
            let ctx = run.interceptor.context();
            let entity = ctx.current_entity();
            let address = ctx
                .current_entity_info()
                .map_or(sender, |info| info.address());
            run.interceptor.push_violation(
                Violation::new(
                    ViolationRule::SimulationError,
                    format!("Simulation failed: {error}"),
                    address,
                )
                .with_entity(entity),
            );
        }

        let (result, profile) = run.interceptor.into_result(op_hash);
        debug!(
            "Simulated op {op_hash:?}: {} violations, {} storage accesses",
            result.violations.len(),
            result.storage_accesses.len()
        );
        SimulationOutput { result, profile }
    }
}

struct ValidationRun<'a, N, E> {
    node: &'a N,
    executor: &'a E,
    settings: &'a Settings,
    block: BlockContext,
    entry_point: Address,
    // code presence, including contracts created during this run
    code: HashMap<Address, bool>,
    interceptor: TracingInterceptor,
}

impl<'a, N, E> ValidationRun<'a, N, E>
where
    N: NodeDataService,
    E: EvmExecutor,
{
    async fn run_phases(&mut self, op: &PackedUserOperation, op_hash: H256) -> anyhow::Result<()> {
        let entities = *self.interceptor.context().entities();
        let sender = op.sender;
        anyhow::ensure!(
            sender == entities.sender_address(),
            "operation sender {sender:?} does not match sender entity {:?}",
            entities.sender_address()
        );

        if entities.factory.is_some() {
            debug!("Running factory phase for op {op_hash:?}");
            self.interceptor.enter_phase(EntityType::Factory);
            self.interceptor.set_deployment_phase(true);
            // the factory is only called through a well formed initCode
            if let Some(factory) = op.factory() {
                self.execute(self.entry_point, factory, op.factory_data())
                    .await?;
            }
            self.interceptor.set_deployment_phase(false);
        }

        debug!("Running sender phase for op {op_hash:?}");
        self.interceptor.enter_phase(EntityType::Sender);
        if !self.has_code(sender).await? && op.init_code.is_empty() {
            self.interceptor.push_violation(
                Violation::new(
                    ViolationRule::SenderNotDeployed,
                    format!("Sender {sender:?} has no code and no initCode provided"),
                    sender,
                )
                .with_entity(Some(EntityType::Sender)),
            );
            return Ok(());
        }
        let missing_funds = if entities.paymaster.is_some() {
            U256::zero()
        } else {
            op.max_gas_cost()
        };
        let data = encode_call(VALIDATE_USER_OP_SELECTOR, op, op_hash, missing_funds);
        self.execute(self.entry_point, sender, data).await?;

        if let Some(paymaster) = entities.paymaster {
            debug!("Running paymaster phase for op {op_hash:?}");
            let paymaster = paymaster.address();
            self.interceptor.enter_phase(EntityType::Paymaster);
            if !self.has_code(paymaster).await? {
                self.interceptor.push_violation(
                    Violation::new(
                        ViolationRule::PaymasterNotDeployed,
                        format!("Paymaster {paymaster:?} has no code deployed"),
                        paymaster,
                    )
                    .with_entity(Some(EntityType::Paymaster)),
                );
                return Ok(());
            }
            let data = encode_call(
                VALIDATE_PAYMASTER_USER_OP_SELECTOR,
                op,
                op_hash,
                op.max_gas_cost(),
            );
            self.execute(self.entry_point, paymaster, data).await?;
        }

        Ok(())
    }

    async fn execute(&mut self, from: Address, to: Address, data: Bytes) -> anyhow::Result<()> {
        if !self.has_code(to).await? {
            self.interceptor
                .on_ext_code_access(Opcode::EXTCODESIZE, to, false);
            return Ok(());
        }

        let from_balance = self.node.get_balance(from).await?;
        let outcome = self
            .executor
            .execute(ExecutionRequest {
                from,
                to,
                data,
                value: U256::zero(),
                gas_limit: self.settings.gas_limit,
                from_balance,
                block: self.block,
            })
            .await?;

        for call in &outcome.inner_calls {
            if matches!(call.kind, CallKind::Create | CallKind::Create2) {
                self.code.insert(call.to, true);
            }
        }
        for step in &outcome.traces {
            self.process_step(step).await?;
        }
        for call in &outcome.inner_calls {
            self.interceptor.on_address_accessed(call.to);
        }
        if !outcome.success {
            debug!("Validation call to {to:?} reverted");
        }
        Ok(())
    }

    async fn process_step(&mut self, step: &TraceStep) -> anyhow::Result<()> {
        self.interceptor
            .on_opcode(step.opcode, step.address, step.pc, step.depth);
        let Ok(op) = Opcode::try_from(step.opcode) else {
            return Ok(());
        };

        match op {
            Opcode::SLOAD | Opcode::SSTORE | Opcode::TLOAD | Opcode::TSTORE => {
                if let Some(slot) = step.stack_item(0) {
                    let is_write = matches!(op, Opcode::SSTORE | Opcode::TSTORE);
                    let is_transient = matches!(op, Opcode::TLOAD | Opcode::TSTORE);
                    self.interceptor
                        .on_storage_access(step.address, slot, is_write, is_transient);
                }
            }
            op if CALL_OPCODES.contains(&op) => {
                let Some(target) = step.stack_address(1) else {
                    return Ok(());
                };
                let (value, args) = if op == Opcode::CALL {
                    (step.stack_item(2).unwrap_or_default(), 3)
                } else if op == Opcode::CALLCODE {
                    (U256::zero(), 3)
                } else {
                    (U256::zero(), 2)
                };
                let data = match (step.stack_item(args), step.stack_item(args + 1)) {
                    (Some(offset), Some(len)) => step.memory_slice(offset, len).unwrap_or_default(),
                    _ => vec![],
                };

                if is_precompile_address(target) {
                    self.interceptor
                        .on_precompile_call(step.address, target, data.into());
                } else {
                    let has_code = self.has_code(target).await?;
                    self.interceptor.on_code_access(target, has_code);
                    self.interceptor
                        .on_call(step.address, target, value, data.into());
                }
            }
            op if EXT_CODE_OPCODES.contains(&op) => {
                if let Some(target) = step.stack_address(0) {
                    let has_code = self.has_code(target).await?;
                    self.interceptor.on_ext_code_access(op, target, has_code);
                }
            }
            Opcode::CREATE | Opcode::CREATE2 => {
                self.interceptor
                    .on_create(step.address, None, op == Opcode::CREATE2);
            }
            Opcode::KECCAK256 => {
                let input = match (step.stack_item(0), step.stack_item(1)) {
                    (Some(offset), Some(len)) => step.memory_slice(offset, len),
                    _ => None,
                };
                if let Some(input) = input {
                    let hash = U256::from_big_endian(&keccak256(&input));
                    self.interceptor.on_keccak256(&input, hash);
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn has_code(&mut self, address: Address) -> anyhow::Result<bool> {
        if let Some(has_code) = self.code.get(&address) {
            return Ok(*has_code);
        }
        let has_code = !self.node.get_code(address).await?.is_empty();
        self.code.insert(address, has_code);
        Ok(has_code)
    }
}

fn encode_call(
    selector: [u8; 4],
    op: &PackedUserOperation,
    op_hash: H256,
    amount: U256,
) -> Bytes {
    let mut data = selector.to_vec();
    data.extend(encode(&[
        op.to_token(),
        Token::FixedBytes(op_hash.as_bytes().to_vec()),
        Token::Uint(amount),
    ]));
    data.into()
}
