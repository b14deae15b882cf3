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

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use bundleguard_sim::{
    BlockContext, EvmExecutor, ExecutionOutcome, ExecutionRequest, NodeDataService,
};
use bundleguard_types::{
    BundleUserOpInfo, Entity, EntityInfo, EntityInfos, PackedUserOperation, StakeRequirements,
};
use ethers::types::{Address, Bytes, H256, U256};
use serde::Deserialize;

/// A recorded validation environment: chain state, the traces of every
/// validation call and the bundle to check.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayFile {
    pub entry_point: Address,
    pub block: BlockContext,
    #[serde(default)]
    pub accounts: HashMap<Address, ReplayAccount>,
    #[serde(default)]
    pub block_hashes: HashMap<u64, H256>,
    /// Outcome of the validation call to each target
    #[serde(default)]
    pub executions: HashMap<Address, ExecutionOutcome>,
    pub ops: Vec<ReplayOp>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayAccount {
    #[serde(default)]
    pub code: Bytes,
    #[serde(default)]
    pub balance: U256,
    #[serde(default)]
    pub storage: HashMap<U256, H256>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayStake {
    pub stake: U256,
    pub unstake_delay_sec: u64,
}

/// An operation of the bundle with the entry point stake of its entities.
/// Entities without stake data are unstaked.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOp {
    pub user_op: PackedUserOperation,
    #[serde(default)]
    pub sender_stake: Option<ReplayStake>,
    #[serde(default)]
    pub factory_stake: Option<ReplayStake>,
    #[serde(default)]
    pub paymaster_stake: Option<ReplayStake>,
    #[serde(default)]
    pub aggregator: Option<Address>,
    #[serde(default)]
    pub aggregator_stake: Option<ReplayStake>,
}

impl ReplayOp {
    pub fn into_bundle_op(self, requirements: &StakeRequirements) -> BundleUserOpInfo {
        let info = |entity: Entity, stake: Option<ReplayStake>| match stake {
            Some(s) => EntityInfo::from_stake(entity, s.stake, s.unstake_delay_sec, requirements),
            None => EntityInfo::new(entity, false),
        };

        let op = &self.user_op;
        let mut entities = EntityInfos::new(info(Entity::sender(op.sender), self.sender_stake));
        if let Some(factory) = op.factory() {
            entities = entities.with_factory(info(Entity::factory(factory), self.factory_stake));
        }
        if let Some(paymaster) = op.paymaster() {
            entities =
                entities.with_paymaster(info(Entity::paymaster(paymaster), self.paymaster_stake));
        }
        if let Some(aggregator) = self.aggregator {
            entities = entities
                .with_aggregator(info(Entity::aggregator(aggregator), self.aggregator_stake));
        }

        BundleUserOpInfo {
            user_op: self.user_op,
            entities,
        }
    }
}

/// Serves chain state and executions from a replay file
#[derive(Debug)]
pub struct ReplayNode {
    accounts: HashMap<Address, ReplayAccount>,
    block_hashes: HashMap<u64, H256>,
    executions: HashMap<Address, ExecutionOutcome>,
}

impl ReplayNode {
    pub fn new(
        accounts: HashMap<Address, ReplayAccount>,
        block_hashes: HashMap<u64, H256>,
        executions: HashMap<Address, ExecutionOutcome>,
    ) -> Self {
        Self {
            accounts,
            block_hashes,
            executions,
        }
    }
}

#[async_trait]
impl NodeDataService for ReplayNode {
    async fn get_code(&self, address: Address) -> anyhow::Result<Bytes> {
        Ok(self
            .accounts
            .get(&address)
            .map(|a| a.code.clone())
            .unwrap_or_default())
    }

    async fn get_balance(&self, address: Address) -> anyhow::Result<U256> {
        Ok(self
            .accounts
            .get(&address)
            .map(|a| a.balance)
            .unwrap_or_default())
    }

    async fn get_storage_at(&self, address: Address, slot: U256) -> anyhow::Result<H256> {
        Ok(self
            .accounts
            .get(&address)
            .and_then(|a| a.storage.get(&slot))
            .copied()
            .unwrap_or_default())
    }

    async fn get_block_hash(&self, number: u64) -> anyhow::Result<H256> {
        self.block_hashes
            .get(&number)
            .copied()
            .with_context(|| format!("no hash recorded for block {number}"))
    }
}

#[async_trait]
impl EvmExecutor for ReplayNode {
    async fn execute(&self, request: ExecutionRequest) -> anyhow::Result<ExecutionOutcome> {
        self.executions
            .get(&request.to)
            .cloned()
            .with_context(|| format!("no execution recorded for call to {:?}", request.to))
    }
}
