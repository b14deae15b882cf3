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

//! Types for interacting with EVM storage

use ethers::types::{Address, U256};
use parse_display::Display;
use serde::{Deserialize, Serialize};

/// An EVM storage slot, the unit of read and write set membership
#[derive(
    Clone, Copy, Debug, Display, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[display("{address:?}[{slot:#x}]")]
pub struct StorageSlot {
    /// The address of the contract owning this slot
    pub address: Address,
    /// The storage slot
    pub slot: U256,
}

impl StorageSlot {
    /// Create a slot key
    pub fn new(address: Address, slot: U256) -> Self {
        Self { address, slot }
    }
}
