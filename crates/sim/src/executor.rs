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

//! Interfaces to the EVM and the chain state the simulation runs against

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;
use serde::{Deserialize, Serialize};

const MAX_MEMORY_SLICE: usize = 1 << 24;

/// Block environment the validation is simulated in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockContext {
    /// Block number
    pub number: u64,
    /// Block timestamp, in seconds
    pub timestamp: u64,
    /// Fee recipient
    pub coinbase: Address,
    /// Base fee per gas
    pub base_fee: U256,
    /// Block gas limit
    pub gas_limit: u64,
    /// Chain id
    pub chain_id: u64,
}

/// A message call to execute with tracing enabled
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionRequest {
    /// Caller
    pub from: Address,
    /// Callee
    pub to: Address,
    /// Call data
    pub data: Bytes,
    /// Value transferred
    pub value: U256,
    /// Gas available to the call
    pub gas_limit: u64,
    /// Balance of the caller on chain, seeded into the execution state
    pub from_balance: U256,
    /// Block environment
    pub block: BlockContext,
}

/// One executed instruction
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStep {
    /// The executing contract
    pub address: Address,
    /// Raw opcode byte
    pub opcode: u8,
    /// Program counter
    #[serde(default)]
    pub pc: u64,
    /// Call depth, starting at one for the outer call
    #[serde(default)]
    pub depth: usize,
    /// Stack before the instruction executes, top first
    #[serde(default)]
    pub stack: Vec<U256>,
    /// Memory before the instruction executes
    #[serde(default)]
    pub memory: Bytes,
}

impl TraceStep {
    /// The `n`th stack item from the top
    pub fn stack_item(&self, n: usize) -> Option<U256> {
        self.stack.get(n).copied()
    }

    /// The `n`th stack item from the top, as an address
    pub fn stack_address(&self, n: usize) -> Option<Address> {
        self.stack_item(n).map(|word| {
            let mut buf = [0u8; 32];
            word.to_big_endian(&mut buf);
            Address::from_slice(&buf[12..])
        })
    }

    /// `len` bytes of memory starting at `offset`. Bytes past the end of memory
    /// read as zero. `None` if the range cannot be addressed.
    pub fn memory_slice(&self, offset: U256, len: U256) -> Option<Vec<u8>> {
        if len.is_zero() {
            return Some(vec![]);
        }
        if offset > U256::from(u32::MAX) || len > U256::from(MAX_MEMORY_SLICE) {
            return None;
        }
        let offset = offset.as_usize();
        let len = len.as_usize();
        let mut out = vec![0u8; len];
        if offset < self.memory.len() {
            let end = self.memory.len().min(offset.saturating_add(len));
            out[..end - offset].copy_from_slice(&self.memory[offset..end]);
        }
        Some(out)
    }
}

/// The kind of a nested call frame
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallKind {
    /// CALL
    Call,
    /// STATICCALL
    StaticCall,
    /// DELEGATECALL
    DelegateCall,
    /// CALLCODE
    CallCode,
    /// CREATE
    Create,
    /// CREATE2
    Create2,
}

/// A nested call frame opened during execution
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InnerCall {
    /// Frame kind
    pub kind: CallKind,
    /// Caller
    pub from: Address,
    /// Callee, or the created contract
    pub to: Address,
    /// Value transferred
    #[serde(default)]
    pub value: U256,
}

/// Result of a traced execution
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    /// Whether the outer call succeeded
    pub success: bool,
    /// Return or revert data of the outer call
    #[serde(default)]
    pub return_data: Bytes,
    /// Every executed instruction, in order
    #[serde(default)]
    pub traces: Vec<TraceStep>,
    /// Every nested frame, in order of opening
    #[serde(default)]
    pub inner_calls: Vec<InnerCall>,
}

/// An EVM able to execute a message call against chain state with per-step tracing
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait EvmExecutor: Send + Sync + 'static {
    /// Execute `request` and return its trace
    async fn execute(&self, request: ExecutionRequest) -> anyhow::Result<ExecutionOutcome>;
}

/// Read access to chain state at a fixed block
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait NodeDataService: Send + Sync + 'static {
    /// Code deployed at `address`
    async fn get_code(&self, address: Address) -> anyhow::Result<Bytes>;

    /// Balance of `address`
    async fn get_balance(&self, address: Address) -> anyhow::Result<U256>;

    /// Value of `slot` of `address`
    async fn get_storage_at(&self, address: Address, slot: U256) -> anyhow::Result<H256>;

    /// Hash of block `number`
    async fn get_block_hash(&self, number: u64) -> anyhow::Result<H256>;
}
