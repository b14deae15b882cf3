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

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use bundleguard_types::StorageSlot;
use ethers::{
    types::{Address, U256},
    utils::keccak256,
};

/// Slots at an offset below this from an associated slot are associated too
const ASSOCIATED_SLOT_MAX_OFFSET: u64 = 128;

/// Decoded input of a KECCAK256 observed during execution
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeccakPreimage {
    /// `keccak256(pad32(address) ++ base_slot)`, a `mapping(address => _)` entry
    AddressMapping {
        /// The mapping key
        address: Address,
        /// Slot of the mapping
        base_slot: U256,
    },
    /// `keccak256(key ++ base_slot)`, any other mapping entry
    ValueMapping {
        /// The mapping key
        key: U256,
        /// Slot of the mapping
        base_slot: U256,
    },
    /// `keccak256(base_slot)`, the start of a dynamic array's data
    ArraySlot {
        /// Slot of the array
        base_slot: U256,
    },
}

impl KeccakPreimage {
    /// Decode a KECCAK256 input. Returns `None` for inputs that are neither 32 nor 64 bytes.
    pub fn decode(input: &[u8]) -> Option<Self> {
        match input.len() {
            64 => {
                let base_slot = U256::from_big_endian(&input[32..64]);
                if input[..12].iter().all(|b| *b == 0) {
                    Some(KeccakPreimage::AddressMapping {
                        address: Address::from_slice(&input[12..32]),
                        base_slot,
                    })
                } else {
                    Some(KeccakPreimage::ValueMapping {
                        key: U256::from_big_endian(&input[..32]),
                        base_slot,
                    })
                }
            }
            32 => Some(KeccakPreimage::ArraySlot {
                base_slot: U256::from_big_endian(input),
            }),
            _ => None,
        }
    }

    /// The slot this preimage derives from
    pub fn base_slot(&self) -> U256 {
        match self {
            KeccakPreimage::AddressMapping { base_slot, .. }
            | KeccakPreimage::ValueMapping { base_slot, .. }
            | KeccakPreimage::ArraySlot { base_slot } => *base_slot,
        }
    }
}

/// Reconstructs which storage slots belong to an address from the KECCAK256
/// preimages observed during a single simulation.
#[derive(Debug, Default)]
pub struct AssociatedStorageCalculator {
    preimages: BTreeMap<U256, KeccakPreimage>,
    // positive results, by (sender, contract)
    memo: HashMap<(Address, Address), BTreeSet<U256>>,
}

impl AssociatedStorageCalculator {
    /// Create an empty calculator
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the preimage of `output`. Inputs of unsupported length are ignored.
    pub fn track_keccak(&mut self, input: &[u8], output: [u8; 32]) -> Option<KeccakPreimage> {
        self.track_keccak_from_hash(input, U256::from_big_endian(&output))
    }

    /// Record the preimage of `hash`. Inputs of unsupported length are ignored.
    pub fn track_keccak_from_hash(&mut self, input: &[u8], hash: U256) -> Option<KeccakPreimage> {
        let preimage = KeccakPreimage::decode(input)?;
        self.preimages.insert(hash, preimage);
        Some(preimage)
    }

    /// Record the slot of `sender`'s entry in a `mapping(address => _)` declared at
    /// `base_slot`, without having observed its hash.
    pub fn register_sender_slot(&mut self, sender: Address, base_slot: U256) -> U256 {
        let mut input = [0u8; 64];
        input[12..32].copy_from_slice(sender.as_bytes());
        base_slot.to_big_endian(&mut input[32..]);
        let hash = keccak256(input);
        self.track_keccak(&input, hash);
        U256::from_big_endian(&hash)
    }

    /// Whether `slot` of `contract` is associated with `sender`.
    ///
    /// A slot is associated if it equals the sender address, if it is the entry of
    /// the sender in an address mapping, if it derives (as a mapping entry or array
    /// element) from an associated slot, or if it lies less than 128 slots after an
    /// associated slot. Positive results are memoized.
    pub fn is_associated_slot(&mut self, contract: Address, slot: U256, sender: Address) -> bool {
        if slot == address_word(sender) {
            return true;
        }
        if self
            .memo
            .get(&(sender, contract))
            .is_some_and(|slots| slots.contains(&slot))
        {
            return true;
        }
        let mut visited = HashSet::new();
        if self.derives_from_sender(slot, sender, &mut visited) {
            self.memo.entry((sender, contract)).or_default().insert(slot);
            return true;
        }
        false
    }

    /// Slots proven to be associated with `sender`, across contracts
    pub fn associated_slots(&self, sender: Address) -> BTreeSet<StorageSlot> {
        self.memo
            .iter()
            .filter(|((s, _), _)| *s == sender)
            .flat_map(|((_, contract), slots)| {
                slots.iter().map(|slot| StorageSlot::new(*contract, *slot))
            })
            .collect()
    }

    /// The recorded preimage of `hash`, if any
    pub fn preimage(&self, hash: U256) -> Option<&KeccakPreimage> {
        self.preimages.get(&hash)
    }

    fn derives_from_sender(
        &self,
        slot: U256,
        sender: Address,
        visited: &mut HashSet<U256>,
    ) -> bool {
        // guards against cycles in malformed preimage data
        if !visited.insert(slot) {
            return false;
        }
        let lower = slot.saturating_sub(U256::from(ASSOCIATED_SLOT_MAX_OFFSET - 1));
        let candidates: Vec<(U256, KeccakPreimage)> = self
            .preimages
            .range(lower..=slot)
            .rev()
            .map(|(hash, preimage)| (*hash, *preimage))
            .collect();

        candidates.into_iter().any(|(hash, preimage)| {
            if hash != slot && visited.contains(&hash) {
                return false;
            }
            match preimage {
                KeccakPreimage::AddressMapping { address, .. } if address == sender => true,
                _ => self.derives_from_sender(preimage.base_slot(), sender, visited),
            }
        })
    }
}

fn address_word(address: Address) -> U256 {
    U256::from_big_endian(address.as_bytes())
}
