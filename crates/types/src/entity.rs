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

use std::{fmt::Display, str::FromStr};

use anyhow::bail;
use ethers::{
    types::{Address, U256},
    utils::to_checksum,
};
use parse_display::Display;
use serde::{ser::SerializeStruct, Deserialize, Serialize};
use strum::EnumIter;

/// The role an address plays in the validation of a user operation
#[derive(
    Display, Debug, Clone, Copy, Hash, Ord, Eq, PartialEq, PartialOrd, EnumIter, Deserialize,
)]
#[display(style = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    /// The account sending the operation
    Sender,
    /// The factory deploying the sender
    Factory,
    /// The paymaster sponsoring the operation
    Paymaster,
    /// The signature aggregator
    Aggregator,
}

impl EntityType {
    /// Get the string representation of the entity type
    pub fn to_str(&self) -> &'static str {
        match self {
            EntityType::Sender => "sender",
            EntityType::Factory => "factory",
            EntityType::Paymaster => "paymaster",
            EntityType::Aggregator => "aggregator",
        }
    }
}

impl FromStr for EntityType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sender" | "account" => Ok(EntityType::Sender),
            "factory" => Ok(EntityType::Factory),
            "paymaster" => Ok(EntityType::Paymaster),
            "aggregator" => Ok(EntityType::Aggregator),
            _ => bail!("Invalid entity type: {s}"),
        }
    }
}

impl Serialize for EntityType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.to_str())
    }
}

/// An entity participating in a user operation
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Entity {
    /// The type of entity
    pub kind: EntityType,
    /// The address of the entity
    pub address: Address,
}

impl Entity {
    /// Create a new entity of the given type and address
    pub fn new(kind: EntityType, address: Address) -> Self {
        Self { kind, address }
    }

    /// Create a new sender entity at address
    pub fn sender(address: Address) -> Self {
        Self::new(EntityType::Sender, address)
    }

    /// Create a new factory entity at address
    pub fn factory(address: Address) -> Self {
        Self::new(EntityType::Factory, address)
    }

    /// Create a new paymaster entity at address
    pub fn paymaster(address: Address) -> Self {
        Self::new(EntityType::Paymaster, address)
    }

    /// Create a new aggregator entity at address
    pub fn aggregator(address: Address) -> Self {
        Self::new(EntityType::Aggregator, address)
    }
}

impl Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, to_checksum(&self.address, None))
    }
}

impl Serialize for Entity {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut e = serializer.serialize_struct("Entity", 1)?;
        e.serialize_field(self.kind.to_str(), &to_checksum(&self.address, None))?;
        e.end()
    }
}

/// Stake thresholds an entity must meet on the entry point to count as staked
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StakeRequirements {
    /// Minimum stake, in wei
    pub min_stake_value: U256,
    /// Minimum unstake delay, in seconds
    pub min_unstake_delay: u64,
}

impl Default for StakeRequirements {
    fn default() -> Self {
        Self {
            // 10^18 wei = 1 eth
            min_stake_value: U256::exp10(18),
            // one day in seconds
            min_unstake_delay: 86_400,
        }
    }
}

/// An entity and its staking status at the time of validation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityInfo {
    /// The entity
    pub entity: Entity,
    /// Whether the entity counts as staked
    pub is_staked: bool,
    /// Amount staked on the entry point
    pub stake: U256,
    /// Unstake delay configured on the entry point, in seconds
    pub unstake_delay_sec: u64,
}

impl EntityInfo {
    /// Create an entity info with an explicit staking status and no stake data
    pub fn new(entity: Entity, is_staked: bool) -> Self {
        Self {
            entity,
            is_staked,
            stake: U256::zero(),
            unstake_delay_sec: 0,
        }
    }

    /// Create an entity info from the stake reported by the entry point
    pub fn from_stake(
        entity: Entity,
        stake: U256,
        unstake_delay_sec: u64,
        requirements: &StakeRequirements,
    ) -> Self {
        Self {
            entity,
            is_staked: stake >= requirements.min_stake_value
                && unstake_delay_sec >= requirements.min_unstake_delay,
            stake,
            unstake_delay_sec,
        }
    }

    /// Sender entity info
    pub fn sender(address: Address, is_staked: bool) -> Self {
        Self::new(Entity::sender(address), is_staked)
    }

    /// Factory entity info
    pub fn factory(address: Address, is_staked: bool) -> Self {
        Self::new(Entity::factory(address), is_staked)
    }

    /// Paymaster entity info
    pub fn paymaster(address: Address, is_staked: bool) -> Self {
        Self::new(Entity::paymaster(address), is_staked)
    }

    /// Aggregator entity info
    pub fn aggregator(address: Address, is_staked: bool) -> Self {
        Self::new(Entity::aggregator(address), is_staked)
    }

    /// The address of the entity
    pub fn address(&self) -> Address {
        self.entity.address
    }

    /// The role of the entity
    pub fn kind(&self) -> EntityType {
        self.entity.kind
    }
}

/// All the entities of a user operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityInfos {
    /// The sender, always present
    pub sender: EntityInfo,
    /// The factory, if the operation deploys its sender
    pub factory: Option<EntityInfo>,
    /// The paymaster, if the operation is sponsored
    pub paymaster: Option<EntityInfo>,
    /// The aggregator, if the operation uses aggregated signatures
    pub aggregator: Option<EntityInfo>,
}

impl EntityInfos {
    /// Entity infos for an operation with only a sender
    pub fn new(sender: EntityInfo) -> Self {
        Self {
            sender,
            factory: None,
            paymaster: None,
            aggregator: None,
        }
    }

    /// Set the factory
    pub fn with_factory(mut self, factory: EntityInfo) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Set the paymaster
    pub fn with_paymaster(mut self, paymaster: EntityInfo) -> Self {
        self.paymaster = Some(paymaster);
        self
    }

    /// Set the aggregator
    pub fn with_aggregator(mut self, aggregator: EntityInfo) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    /// Get the info of the entity playing `kind`, if present
    pub fn get(&self, kind: EntityType) -> Option<&EntityInfo> {
        match kind {
            EntityType::Sender => Some(&self.sender),
            EntityType::Factory => self.factory.as_ref(),
            EntityType::Paymaster => self.paymaster.as_ref(),
            EntityType::Aggregator => self.aggregator.as_ref(),
        }
    }

    /// The sender address
    pub fn sender_address(&self) -> Address {
        self.sender.address()
    }

    /// The role `address` plays in the operation. The sender wins over any other
    /// role when an address is reused.
    pub fn role_of(&self, address: Address) -> Option<EntityType> {
        self.iter()
            .find(|ei| ei.address() == address)
            .map(|ei| ei.kind())
    }

    /// Whether `address` is one of the operation's entities
    pub fn is_entity_address(&self, address: Address) -> bool {
        self.role_of(address).is_some()
    }

    /// Iterate over the present entities, sender first
    pub fn iter(&self) -> impl Iterator<Item = &EntityInfo> {
        std::iter::once(&self.sender)
            .chain(self.factory.as_ref())
            .chain(self.paymaster.as_ref())
            .chain(self.aggregator.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_stake() {
        let requirements = StakeRequirements::default();
        let addr = Address::random();

        let staked = EntityInfo::from_stake(
            Entity::paymaster(addr),
            U256::exp10(18),
            86_400,
            &requirements,
        );
        assert!(staked.is_staked);

        let short_delay = EntityInfo::from_stake(
            Entity::paymaster(addr),
            U256::exp10(19),
            60,
            &requirements,
        );
        assert!(!short_delay.is_staked);

        let low_stake =
            EntityInfo::from_stake(Entity::paymaster(addr), U256::one(), 86_400, &requirements);
        assert!(!low_stake.is_staked);
    }

    #[test]
    fn test_role_of() {
        let sender = Address::random();
        let factory = Address::random();
        let paymaster = Address::random();
        let infos = EntityInfos::new(EntityInfo::sender(sender, false))
            .with_factory(EntityInfo::factory(factory, true))
            .with_paymaster(EntityInfo::paymaster(paymaster, false));

        assert_eq!(infos.role_of(sender), Some(EntityType::Sender));
        assert_eq!(infos.role_of(factory), Some(EntityType::Factory));
        assert_eq!(infos.role_of(paymaster), Some(EntityType::Paymaster));
        assert_eq!(infos.role_of(Address::random()), None);
        assert!(infos.get(EntityType::Aggregator).is_none());
        assert!(infos.get(EntityType::Factory).unwrap().is_staked);
    }

    #[test]
    fn test_entity_type_round_trip_str() {
        for kind in [
            EntityType::Sender,
            EntityType::Factory,
            EntityType::Paymaster,
            EntityType::Aggregator,
        ] {
            assert_eq!(kind.to_str().parse::<EntityType>().unwrap(), kind);
        }
        assert!("bundler".parse::<EntityType>().is_err());
    }
}
