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

use std::collections::{btree_map::Entry, BTreeMap};

use bundleguard_types::{ConflictKind, StorageConflict, StorageSlot, UserOpStorageProfile};
use ethers::types::{Address, U256};

/// Finds the storage dependencies between the operations of a bundle that would
/// make the validation of one depend on the execution of another.
#[derive(Clone, Copy, Debug, Default)]
pub struct BundleStorageConflictDetector;

impl BundleStorageConflictDetector {
    /// Every conflict between two profiles, pairs in bundle order.
    ///
    /// For each pair the first operand precedes the second in `profiles`.
    pub fn detect_conflicts(&self, profiles: &[UserOpStorageProfile]) -> Vec<StorageConflict> {
        let mut conflicts = vec![];
        for (i, first) in profiles.iter().enumerate() {
            for second in &profiles[i + 1..] {
                conflicts.extend(self.detect_pair_conflicts(first, second));
            }
        }
        conflicts
    }

    /// The conflicts between two profiles, at most one per slot, sorted by slot
    pub fn detect_pair_conflicts(
        &self,
        first: &UserOpStorageProfile,
        second: &UserOpStorageProfile,
    ) -> Vec<StorageConflict> {
        if first.sender == second.sender {
            return vec![StorageConflict {
                op_hash_1: first.op_hash,
                op_hash_2: second.op_hash,
                contract: first.sender,
                slot: U256::zero(),
                kind: ConflictKind::SenderConflict,
                message: format!("Multiple operations from sender {:?}", first.sender),
            }];
        }

        let mut found = BTreeMap::<StorageSlot, ConflictKind>::new();
        let mut record = |slot: &StorageSlot, kind: ConflictKind| {
            // entity storage is shared even when both senders own the slot
            if kind != ConflictKind::EntityConflict
                && first.is_associated(slot)
                && second.is_associated(slot)
            {
                return;
            }
            if let Entry::Vacant(entry) = found.entry(*slot) {
                entry.insert(kind);
            }
        };

        let shared_entities = [
            shared(first.factory, second.factory),
            shared(first.paymaster, second.paymaster),
        ];
        for entity in shared_entities.into_iter().flatten() {
            for slot in first
                .write_slots
                .intersection(&second.write_slots)
                .filter(|s| s.address == entity)
            {
                record(slot, ConflictKind::EntityConflict);
            }
        }
        for slot in first.write_slots.intersection(&second.write_slots) {
            record(slot, ConflictKind::WriteWrite);
        }
        for slot in first
            .read_slots
            .intersection(&second.write_slots)
            .chain(first.write_slots.intersection(&second.read_slots))
        {
            record(slot, ConflictKind::ReadWrite);
        }

        found
            .into_iter()
            .map(|(slot, kind)| StorageConflict {
                op_hash_1: first.op_hash,
                op_hash_2: second.op_hash,
                contract: slot.address,
                slot: slot.slot,
                kind,
                message: conflict_message(kind, &slot),
            })
            .collect()
    }
}

fn shared(first: Option<Address>, second: Option<Address>) -> Option<Address> {
    match (first, second) {
        (Some(a), Some(b)) if a == b => Some(a),
        _ => None,
    }
}

fn conflict_message(kind: ConflictKind, slot: &StorageSlot) -> String {
    match kind {
        ConflictKind::EntityConflict => format!("Both operations write shared entity storage {slot}"),
        ConflictKind::WriteWrite => format!("Both operations write {slot}"),
        ConflictKind::ReadWrite => format!("One operation reads {slot} written by the other"),
        ConflictKind::SenderConflict => format!("Multiple operations from sender {:?}", slot.address),
    }
}

#[cfg(test)]
mod tests {
    use ethers::types::H256;

    use super::*;

    fn profile(sender: Address) -> UserOpStorageProfile {
        UserOpStorageProfile {
            op_hash: H256::random(),
            sender,
            ..Default::default()
        }
    }

    fn slot(contract: Address, slot: u64) -> StorageSlot {
        StorageSlot::new(contract, slot.into())
    }

    #[test]
    fn test_write_write() {
        let contract: Address = "0xcafecafecafecafecafecafecafecafecafecafe".parse().unwrap();
        let mut p1 = profile(Address::random());
        let mut p2 = profile(Address::random());
        p1.write_slots.insert(slot(contract, 7));
        p2.write_slots.insert(slot(contract, 7));

        let conflicts = BundleStorageConflictDetector.detect_conflicts(&[p1.clone(), p2.clone()]);
        assert_eq!(conflicts.len(), 1);
        let c = &conflicts[0];
        assert_eq!(c.kind, ConflictKind::WriteWrite);
        assert_eq!(c.contract, contract);
        assert_eq!(c.slot, 7.into());
        assert_eq!(c.op_hash_1, p1.op_hash);
        assert_eq!(c.op_hash_2, p2.op_hash);
    }

    #[test]
    fn test_different_slots_do_not_conflict() {
        let contract = Address::random();
        let mut p1 = profile(Address::random());
        let mut p2 = profile(Address::random());
        p1.write_slots.insert(slot(contract, 1));
        p2.write_slots.insert(slot(contract, 2));
        p2.read_slots.insert(slot(Address::random(), 1));

        assert!(BundleStorageConflictDetector
            .detect_conflicts(&[p1, p2])
            .is_empty());
    }

    #[test]
    fn test_read_write_is_symmetric() {
        let contract = Address::random();
        let mut reader = profile(Address::random());
        let mut writer = profile(Address::random());
        reader.read_slots.insert(slot(contract, 3));
        writer.write_slots.insert(slot(contract, 3));

        let forward = BundleStorageConflictDetector.detect_conflicts(&[reader.clone(), writer.clone()]);
        let backward = BundleStorageConflictDetector.detect_conflicts(&[writer.clone(), reader.clone()]);
        assert_eq!(forward.len(), 1);
        assert_eq!(backward.len(), 1);
        assert_eq!(forward[0].kind, ConflictKind::ReadWrite);
        assert_eq!(backward[0].kind, ConflictKind::ReadWrite);
        assert_eq!(forward[0].op_hash_2, writer.op_hash);
        assert_eq!(backward[0].op_hash_2, reader.op_hash);
    }

    #[test]
    fn test_same_sender_is_a_single_conflict() {
        let sender = Address::random();
        let contract = Address::random();
        let mut p1 = profile(sender);
        let mut p2 = profile(sender);
        p1.write_slots.insert(slot(contract, 1));
        p2.write_slots.insert(slot(contract, 1));

        let conflicts = BundleStorageConflictDetector.detect_conflicts(&[p1, p2]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::SenderConflict);
        assert_eq!(conflicts[0].contract, sender);
    }

    #[test]
    fn test_shared_paymaster_storage() {
        let paymaster = Address::random();
        let mut p1 = profile(Address::random());
        let mut p2 = profile(Address::random());
        p1.paymaster = Some(paymaster);
        p2.paymaster = Some(paymaster);
        p1.write_slots.insert(slot(paymaster, 0));
        p2.write_slots.insert(slot(paymaster, 0));
        p2.read_slots.insert(slot(paymaster, 0));

        let conflicts = BundleStorageConflictDetector.detect_conflicts(&[p1, p2]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::EntityConflict);
    }

    #[test]
    fn test_slot_associated_with_both_senders_is_exempt() {
        let contract = Address::random();
        let key = slot(contract, 9);
        let mut p1 = profile(Address::random());
        let mut p2 = profile(Address::random());
        p1.write_slots.insert(key);
        p2.write_slots.insert(key);
        p1.associated_slots.insert(key);

        assert_eq!(
            BundleStorageConflictDetector
                .detect_conflicts(&[p1.clone(), p2.clone()])
                .len(),
            1
        );

        p2.associated_slots.insert(key);
        assert!(BundleStorageConflictDetector
            .detect_conflicts(&[p1, p2])
            .is_empty());
    }

    #[test]
    fn test_associated_slot_of_shared_entity_still_conflicts() {
        let paymaster = Address::random();
        let key = slot(paymaster, 4);
        let mut p1 = profile(Address::random());
        let mut p2 = profile(Address::random());
        for p in [&mut p1, &mut p2] {
            p.paymaster = Some(paymaster);
            p.write_slots.insert(key);
            p.associated_slots.insert(key);
        }

        let conflicts = BundleStorageConflictDetector.detect_conflicts(&[p1, p2]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::EntityConflict);
        assert_eq!(conflicts[0].slot, 4.into());
    }

    #[test]
    fn test_conflicts_sorted_per_pair() {
        let a = Address::from_low_u64_be(0x1000);
        let b = Address::from_low_u64_be(0x2000);
        let mut p1 = profile(Address::random());
        let mut p2 = profile(Address::random());
        let mut p3 = profile(Address::random());
        for s in [slot(b, 1), slot(a, 5), slot(a, 2)] {
            p1.write_slots.insert(s);
            p2.write_slots.insert(s);
        }
        p3.read_slots.insert(slot(a, 2));

        let conflicts = BundleStorageConflictDetector.detect_conflicts(&[p1, p2, p3]);
        let keys: Vec<_> = conflicts
            .iter()
            .map(|c| (c.contract, c.slot.as_u64(), c.kind))
            .collect();
        assert_eq!(
            keys,
            vec![
                (a, 2, ConflictKind::WriteWrite),
                (a, 5, ConflictKind::WriteWrite),
                (b, 1, ConflictKind::WriteWrite),
                (a, 2, ConflictKind::ReadWrite),
                (a, 2, ConflictKind::ReadWrite),
            ]
        );
    }
}
