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

use std::sync::Arc;

use bundleguard_types::{
    BundleUserOpInfo, BundleValidationError, BundleValidationOptions, BundleValidationResult,
    ConflictKind,
};
use ethers::types::Address;
use futures_util::future;
use tracing::{debug, info, warn};

use crate::{
    conflict::BundleStorageConflictDetector,
    executor::BlockContext,
    simulator::{SimulationOutput, Simulator},
};

/// Validates a candidate bundle: every operation individually, then the
/// storage dependencies between the ones that pass.
#[derive(Debug)]
pub struct BundleValidator<S> {
    simulator: Arc<S>,
    entry_point: Address,
    block: BlockContext,
    detector: BundleStorageConflictDetector,
}

impl<S: Simulator> BundleValidator<S> {
    /// Create a validator for bundles sent to `entry_point` in `block`
    pub fn new(simulator: Arc<S>, entry_point: Address, block: BlockContext) -> Self {
        Self {
            simulator,
            entry_point,
            block,
            detector: BundleStorageConflictDetector,
        }
    }

    /// Validate `ops`, in bundle order
    pub async fn validate_bundle(
        &self,
        ops: Vec<BundleUserOpInfo>,
        options: BundleValidationOptions,
    ) -> BundleValidationResult {
        if ops.is_empty() {
            return BundleValidationResult::failed(BundleValidationError::EmptyBundle);
        }
        let op_count = ops.len();

        let hashes = ops
            .iter()
            .map(|info| info.user_op.hash(self.entry_point, self.block.chain_id))
            .collect::<Vec<_>>();
        let simulations = future::join_all(ops.into_iter().map(|info| {
            self.simulator.simulate_validation(
                info.user_op,
                self.entry_point,
                info.entities,
                self.block,
            )
        }));
        let outputs: Vec<SimulationOutput> = match options.timeout {
            Some(limit) => match tokio::time::timeout(limit, simulations).await {
                Ok(outputs) => outputs,
                Err(_) => {
                    warn!("Validation of bundle of {op_count} ops timed out after {limit:?}");
                    return BundleValidationResult::failed(BundleValidationError::TimedOut(limit));
                }
            },
            None => simulations.await,
        };

        let mut result = BundleValidationResult {
            is_valid: true,
            ..Default::default()
        };
        let mut survivors = vec![];
        for (hash, mut output) in hashes.into_iter().zip(outputs) {
            if output.result.is_valid {
                output.profile.op_hash = hash;
                survivors.push(output.profile);
            } else {
                debug!(
                    "Op {hash:?} failed validation: {:?}",
                    output.result.rule_codes()
                );
                result.rejected_hashes.push(hash);
                if options.reject_on_any_violation {
                    result.is_valid = false;
                }
            }
            result.per_op_results.insert(hash, output.result);
        }

        if options.reject_on_storage_conflict && survivors.len() > 1 {
            let conflicts = self
                .detector
                .detect_conflicts(&survivors)
                .into_iter()
                .filter(|c| {
                    !(options.allow_write_write_conflicts && c.kind == ConflictKind::WriteWrite)
                })
                .collect::<Vec<_>>();
            for conflict in &conflicts {
                debug!("Bundle conflict: {conflict}");
                if !result.rejected_hashes.contains(&conflict.op_hash_2) {
                    result.rejected_hashes.push(conflict.op_hash_2);
                }
                result.is_valid = false;
            }
            result.conflicts = conflicts;
        }

        if result.rejected_hashes.len() == op_count {
            result.is_valid = false;
        }

        info!(
            "Validated bundle of {op_count} ops: valid: {}, rejected: {}, conflicts: {}",
            result.is_valid,
            result.rejected_hashes.len(),
            result.conflicts.len()
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use bundleguard_types::{
        EntityInfo, EntityInfos, PackedUserOperation, StorageSlot, UserOpStorageProfile,
        ValidationResult, Violation, ViolationRule,
    };
    use ethers::types::H256;

    use super::*;
    use crate::simulator::MockSimulator;

    fn op(sender: Address) -> BundleUserOpInfo {
        BundleUserOpInfo {
            user_op: PackedUserOperation {
                sender,
                ..Default::default()
            },
            entities: EntityInfos::new(EntityInfo::sender(sender, false)),
        }
    }

    fn valid() -> ValidationResult {
        ValidationResult {
            is_valid: true,
            ..Default::default()
        }
    }

    fn violating(sender: Address) -> ValidationResult {
        ValidationResult::failed(Violation::new(
            ViolationRule::ForbiddenOpcode,
            "Forbidden opcode during validation: TIMESTAMP",
            sender,
        ))
    }

    // simulator answering from `outputs`, by sender
    fn simulator(outputs: Vec<(Address, SimulationOutput)>) -> MockSimulator {
        let mut simulator = MockSimulator::new();
        simulator
            .expect_simulate_validation()
            .returning(move |op, _, _, _| {
                outputs
                    .iter()
                    .find(|(sender, _)| *sender == op.sender)
                    .map(|(_, output)| output.clone())
                    .unwrap_or_default()
            });
        simulator
    }

    fn output(sender: Address, result: ValidationResult, writes: &[StorageSlot]) -> SimulationOutput {
        SimulationOutput {
            result,
            profile: UserOpStorageProfile {
                sender,
                write_slots: writes.iter().copied().collect(),
                ..Default::default()
            },
        }
    }

    fn validator(simulator: MockSimulator) -> BundleValidator<MockSimulator> {
        BundleValidator::new(Arc::new(simulator), Address::random(), BlockContext::default())
    }

    fn hash_of(validator: &BundleValidator<MockSimulator>, info: &BundleUserOpInfo) -> H256 {
        info.user_op
            .hash(validator.entry_point, validator.block.chain_id)
    }

    #[tokio::test]
    async fn test_empty_bundle() {
        let mut simulator = MockSimulator::new();
        simulator.expect_simulate_validation().times(0);
        let result = validator(simulator)
            .validate_bundle(vec![], BundleValidationOptions::default())
            .await;
        assert!(!result.is_valid);
        assert_eq!(result.error, Some(BundleValidationError::EmptyBundle));
        assert!(result.per_op_results.is_empty());
    }

    #[tokio::test]
    async fn test_independent_ops_are_valid() {
        let (s1, s2) = (Address::random(), Address::random());
        let contract = Address::random();
        let v = validator(simulator(vec![
            (s1, output(s1, valid(), &[StorageSlot::new(contract, 1.into())])),
            (s2, output(s2, valid(), &[StorageSlot::new(contract, 2.into())])),
        ]));

        let result = v
            .validate_bundle(vec![op(s1), op(s2)], BundleValidationOptions::default())
            .await;
        assert!(result.is_valid);
        assert!(result.conflicts.is_empty());
        assert!(result.rejected_hashes.is_empty());
        assert_eq!(result.per_op_results.len(), 2);
        assert_eq!(result.error, None);
    }

    #[tokio::test]
    async fn test_write_write_conflict_rejects_second_op() {
        let (s1, s2) = (Address::random(), Address::random());
        let contract: Address = "0xcafecafecafecafecafecafecafecafecafecafe".parse().unwrap();
        let shared = [StorageSlot::new(contract, 7.into())];
        let ops = vec![op(s1), op(s2)];
        let v = validator(simulator(vec![
            (s1, output(s1, valid(), &shared)),
            (s2, output(s2, valid(), &shared)),
        ]));

        let result = v
            .validate_bundle(ops.clone(), BundleValidationOptions::default())
            .await;
        assert!(!result.is_valid);
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].kind, ConflictKind::WriteWrite);
        assert_eq!(result.conflicts[0].slot, 7.into());
        assert_eq!(result.rejected_hashes, vec![hash_of(&v, &ops[1])]);

        let result = v
            .validate_bundle(
                ops,
                BundleValidationOptions {
                    allow_write_write_conflicts: true,
                    ..Default::default()
                },
            )
            .await;
        assert!(result.is_valid);
        assert!(result.conflicts.is_empty());
    }

    #[tokio::test]
    async fn test_violating_op() {
        let (s1, s2) = (Address::random(), Address::random());
        let ops = vec![op(s1), op(s2)];
        let v = validator(simulator(vec![
            (s1, output(s1, violating(s1), &[])),
            (s2, output(s2, valid(), &[])),
        ]));

        let result = v
            .validate_bundle(ops.clone(), BundleValidationOptions::default())
            .await;
        assert!(!result.is_valid);
        assert_eq!(result.rejected_hashes, vec![hash_of(&v, &ops[0])]);
        assert!(!result.per_op_results[&hash_of(&v, &ops[0])].is_valid);

        let result = v
            .validate_bundle(
                ops,
                BundleValidationOptions {
                    reject_on_any_violation: false,
                    ..Default::default()
                },
            )
            .await;
        assert!(result.is_valid);
        assert_eq!(result.rejected_hashes.len(), 1);
    }

    #[tokio::test]
    async fn test_no_survivors_is_invalid() {
        let s1 = Address::random();
        let v = validator(simulator(vec![(s1, output(s1, violating(s1), &[]))]));
        let result = v
            .validate_bundle(
                vec![op(s1)],
                BundleValidationOptions {
                    reject_on_any_violation: false,
                    ..Default::default()
                },
            )
            .await;
        assert!(!result.is_valid);
    }

    #[tokio::test]
    async fn test_conflict_detection_disabled() {
        let sender = Address::random();
        let mut second = op(sender);
        second.user_op.nonce = 1.into();
        let v = validator(simulator(vec![(sender, output(sender, valid(), &[]))]));

        let result = v
            .validate_bundle(
                vec![op(sender), second.clone()],
                BundleValidationOptions {
                    reject_on_storage_conflict: false,
                    ..Default::default()
                },
            )
            .await;
        assert!(result.is_valid);

        let result = v
            .validate_bundle(vec![op(sender), second.clone()], BundleValidationOptions::default())
            .await;
        assert!(!result.is_valid);
        assert_eq!(result.conflicts[0].kind, ConflictKind::SenderConflict);
        assert_eq!(result.rejected_hashes, vec![hash_of(&v, &second)]);
    }

    struct SlowSimulator;

    #[async_trait]
    impl Simulator for SlowSimulator {
        async fn simulate_validation(
            &self,
            _op: PackedUserOperation,
            _entry_point: Address,
            _entities: EntityInfos,
            _block: BlockContext,
        ) -> SimulationOutput {
            tokio::time::sleep(Duration::from_secs(5)).await;
            SimulationOutput::default()
        }
    }

    #[tokio::test]
    async fn test_timeout_fails_whole_bundle() {
        let v = BundleValidator::new(
            Arc::new(SlowSimulator),
            Address::random(),
            BlockContext::default(),
        );
        let limit = Duration::from_millis(10);
        let result = v
            .validate_bundle(
                vec![op(Address::random())],
                BundleValidationOptions {
                    timeout: Some(limit),
                    ..Default::default()
                },
            )
            .await;
        assert!(!result.is_valid);
        assert_eq!(result.error, Some(BundleValidationError::TimedOut(limit)));
        assert!(result.per_op_results.is_empty());
        assert!(result.conflicts.is_empty());
    }
}
