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

use ethers::{
    abi::{encode, Token},
    types::{Address, Bytes, H256, U256},
    utils::keccak256,
};
use serde::{Deserialize, Serialize};

use crate::Entity;

/// Length of the address prefix of `init_code` and `paymaster_and_data`
const ADDRESS_LEN: usize = 20;
/// Offset of the paymaster data, after the address and the two packed gas limits
const PAYMASTER_DATA_OFFSET: usize = 52;

/// Unique identifier for a user operation from a given sender
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct UserOperationId {
    /// sender of user operation
    pub sender: Address,
    /// nonce of user operation
    pub nonce: U256,
}

/// An ERC-4337 v0.7 user operation in its packed, onchain layout
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackedUserOperation {
    /// The account making the operation
    pub sender: Address,
    /// Anti-replay nonce
    pub nonce: U256,
    /// Factory address followed by factory call data, empty if the account exists
    pub init_code: Bytes,
    /// Data passed to the account's execution call
    pub call_data: Bytes,
    /// Verification gas limit (high 16 bytes) and call gas limit (low 16 bytes)
    pub account_gas_limits: H256,
    /// Gas paid to the bundler for pre-verification work
    pub pre_verification_gas: U256,
    /// Max priority fee (high 16 bytes) and max fee per gas (low 16 bytes)
    pub gas_fees: H256,
    /// Paymaster address, its gas limits and its data, empty if unsponsored
    pub paymaster_and_data: Bytes,
    /// Data passed to the account along with the nonce during verification
    pub signature: Bytes,
}

impl PackedUserOperation {
    /// The factory deploying the sender, if any
    pub fn factory(&self) -> Option<Address> {
        address_prefix(&self.init_code)
    }

    /// Call data sent to the factory
    pub fn factory_data(&self) -> Bytes {
        if self.init_code.len() > ADDRESS_LEN {
            Bytes::from(self.init_code[ADDRESS_LEN..].to_vec())
        } else {
            Bytes::new()
        }
    }

    /// The paymaster sponsoring the operation, if any
    pub fn paymaster(&self) -> Option<Address> {
        address_prefix(&self.paymaster_and_data)
    }

    /// Data passed to the paymaster, after its address and gas limits
    pub fn paymaster_data(&self) -> Bytes {
        if self.paymaster_and_data.len() > PAYMASTER_DATA_OFFSET {
            Bytes::from(self.paymaster_and_data[PAYMASTER_DATA_OFFSET..].to_vec())
        } else {
            Bytes::new()
        }
    }

    /// Gas limit of the verification phase
    pub fn verification_gas_limit(&self) -> U256 {
        high_128(&self.account_gas_limits)
    }

    /// Gas limit of the execution phase
    pub fn call_gas_limit(&self) -> U256 {
        low_128(&self.account_gas_limits)
    }

    /// Max priority fee per gas
    pub fn max_priority_fee_per_gas(&self) -> U256 {
        high_128(&self.gas_fees)
    }

    /// Max fee per gas
    pub fn max_fee_per_gas(&self) -> U256 {
        low_128(&self.gas_fees)
    }

    /// Upper bound of what the operation can be charged, used as the
    /// paymaster's `maxCost`
    pub fn max_gas_cost(&self) -> U256 {
        let pm_gas = if self.paymaster_and_data.len() >= PAYMASTER_DATA_OFFSET {
            U256::from_big_endian(&self.paymaster_and_data[20..36])
                + U256::from_big_endian(&self.paymaster_and_data[36..52])
        } else {
            U256::zero()
        };
        self.max_fee_per_gas().saturating_mul(
            self.pre_verification_gas
                .saturating_add(self.verification_gas_limit())
                .saturating_add(self.call_gas_limit())
                .saturating_add(pm_gas),
        )
    }

    /// The entities present in the operation. Aggregators are not derivable from
    /// the operation itself.
    pub fn entities(&self) -> Vec<Entity> {
        let mut ret = vec![Entity::sender(self.sender)];
        if let Some(factory) = self.factory() {
            ret.push(Entity::factory(factory));
        }
        if let Some(paymaster) = self.paymaster() {
            ret.push(Entity::paymaster(paymaster));
        }
        ret
    }

    /// The ERC-4337 hash of the operation for the given entry point and chain
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> H256 {
        let packed = encode(&[
            Token::Address(self.sender),
            Token::Uint(self.nonce),
            Token::FixedBytes(keccak256(&self.init_code).to_vec()),
            Token::FixedBytes(keccak256(&self.call_data).to_vec()),
            Token::FixedBytes(self.account_gas_limits.as_bytes().to_vec()),
            Token::Uint(self.pre_verification_gas),
            Token::FixedBytes(self.gas_fees.as_bytes().to_vec()),
            Token::FixedBytes(keccak256(&self.paymaster_and_data).to_vec()),
        ]);

        keccak256(encode(&[
            Token::FixedBytes(keccak256(packed).to_vec()),
            Token::Address(entry_point),
            Token::Uint(chain_id.into()),
        ]))
        .into()
    }

    /// Unique identifier of the operation
    pub fn id(&self) -> UserOperationId {
        UserOperationId {
            sender: self.sender,
            nonce: self.nonce,
        }
    }

    /// The operation as an ABI tuple, as it is passed to `validateUserOp` and
    /// `validatePaymasterUserOp`
    pub fn to_token(&self) -> Token {
        Token::Tuple(vec![
            Token::Address(self.sender),
            Token::Uint(self.nonce),
            Token::Bytes(self.init_code.to_vec()),
            Token::Bytes(self.call_data.to_vec()),
            Token::FixedBytes(self.account_gas_limits.as_bytes().to_vec()),
            Token::Uint(self.pre_verification_gas),
            Token::FixedBytes(self.gas_fees.as_bytes().to_vec()),
            Token::Bytes(self.paymaster_and_data.to_vec()),
            Token::Bytes(self.signature.to_vec()),
        ])
    }
}

/// Pack two 128 bit values into a single 32 byte word, `high` first
pub fn concat_128(high: u128, low: u128) -> H256 {
    let mut word = [0u8; 32];
    word[..16].copy_from_slice(&high.to_be_bytes());
    word[16..].copy_from_slice(&low.to_be_bytes());
    H256(word)
}

fn address_prefix(data: &Bytes) -> Option<Address> {
    if data.len() >= ADDRESS_LEN {
        Some(Address::from_slice(&data[..ADDRESS_LEN]))
    } else {
        None
    }
}

fn high_128(word: &H256) -> U256 {
    U256::from_big_endian(&word.as_bytes()[..16])
}

fn low_128(word: &H256) -> U256 {
    U256::from_big_endian(&word.as_bytes()[16..])
}
