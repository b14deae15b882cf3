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

//! The ERC-7562 rule table

use bundleguard_types::{EntityType, Opcode, Violation, ViolationRule};
use ethers::types::{Address, U256};

use crate::context::ValidationContext;

/// Opcodes forbidden during validation regardless of entity or stake
pub const ALWAYS_FORBIDDEN_OPCODES: &[Opcode] = &[
    Opcode::ORIGIN,
    Opcode::GASPRICE,
    Opcode::BLOCKHASH,
    Opcode::COINBASE,
    Opcode::TIMESTAMP,
    Opcode::NUMBER,
    Opcode::DIFFICULTY,
    Opcode::GASLIMIT,
    Opcode::BASEFEE,
    Opcode::BLOBHASH,
    Opcode::BLOBBASEFEE,
    Opcode::INVALID,
    Opcode::SELFDESTRUCT,
];

/// Opcodes only a staked entity may use
pub const STAKED_ONLY_OPCODES: &[Opcode] = &[Opcode::BALANCE, Opcode::SELFBALANCE];

/// Opcodes that may follow GAS
pub const CALL_OPCODES: &[Opcode] = &[
    Opcode::CALL,
    Opcode::STATICCALL,
    Opcode::DELEGATECALL,
    Opcode::CALLCODE,
];

/// Opcodes inspecting the code of another account
pub const EXT_CODE_OPCODES: &[Opcode] = &[
    Opcode::EXTCODESIZE,
    Opcode::EXTCODEHASH,
    Opcode::EXTCODECOPY,
];

/// Precompiles callable during validation
pub const ALLOWED_PRECOMPILES: std::ops::RangeInclusive<u64> = 0x01..=0x0a;

/// The secp256r1 verification precompile
pub const RIP7212_PRECOMPILE: u64 = 0x100;

/// Highest address treated as a precompile
pub const MAX_PRECOMPILE_ADDRESS: u64 = 0x1ff;

/// `EntryPoint.depositTo(address)`
pub const DEPOSIT_TO_SELECTOR: [u8; 4] = [0xb7, 0x60, 0xfa, 0xf9];

/// `EntryPoint.incrementNonce(uint192)`
pub const INCREMENT_NONCE_SELECTOR: [u8; 4] = [0x0b, 0xd2, 0x8e, 0x3b];

/// Whether calls to `address` are precompile calls
pub fn is_precompile_address(address: Address) -> bool {
    let value = U256::from_big_endian(address.as_bytes());
    !value.is_zero() && value <= U256::from(MAX_PRECOMPILE_ADDRESS)
}

/// Whether `address` is a precompile callable during validation
pub fn is_allowed_precompile(address: Address, allow_rip7212: bool) -> bool {
    let value = U256::from_big_endian(address.as_bytes());
    if value > U256::from(MAX_PRECOMPILE_ADDRESS) {
        return false;
    }
    let value = value.as_u64();
    ALLOWED_PRECOMPILES.contains(&value) || (allow_rip7212 && value == RIP7212_PRECOMPILE)
}

/// Classifies validation events against the ERC-7562 rules.
///
/// Each check returns at most one violation. The only side effects are the CREATE
/// and CREATE2 counters of the context.
#[derive(Clone, Copy, Debug, Default)]
pub struct RuleEnforcer;

impl RuleEnforcer {
    /// Check `opcode`, given the opcode executed right after it
    pub fn validate_opcode(
        &self,
        opcode: u8,
        next: Option<u8>,
        ctx: &mut ValidationContext,
    ) -> Option<Violation> {
        let Ok(op) = Opcode::try_from(opcode) else {
            return Some(opcode_violation(
                ViolationRule::UnassignedOpcode,
                format!("Unassigned opcode: {opcode:#04x}"),
                None,
                ctx,
            ));
        };

        if ALWAYS_FORBIDDEN_OPCODES.contains(&op) {
            return Some(opcode_violation(
                ViolationRule::ForbiddenOpcode,
                format!("Forbidden opcode during validation: {op}"),
                Some(op),
                ctx,
            ));
        }

        if STAKED_ONLY_OPCODES.contains(&op) && !current_is_staked(ctx) {
            return Some(opcode_violation(
                ViolationRule::Balance,
                format!("{op} opcode requires staked entity"),
                Some(op),
                ctx,
            ));
        }

        match op {
            Opcode::GAS => {
                let next = next.and_then(|b| Opcode::try_from(b).ok());
                if !next.is_some_and(|n| CALL_OPCODES.contains(&n)) {
                    return Some(opcode_violation(
                        ViolationRule::GasNotFollowedByCall,
                        "GAS opcode must be immediately followed by CALL/STATICCALL/DELEGATECALL/CALLCODE",
                        Some(op),
                        ctx,
                    ));
                }
            }
            Opcode::CREATE2 => return self.validate_create2(ctx),
            Opcode::CREATE => return self.validate_create(ctx),
            _ => {}
        }
        None
    }

    fn validate_create2(&self, ctx: &mut ValidationContext) -> Option<Violation> {
        if current_is_staked(ctx) {
            return None;
        }
        if ctx.create2_count > 0 {
            return Some(opcode_violation(
                ViolationRule::Create2,
                "CREATE2 already used - unstaked entity can only use it once for sender deployment",
                Some(Opcode::CREATE2),
                ctx,
            ));
        }
        if !ctx.is_deployment_phase && ctx.current_entity != Some(EntityType::Factory) {
            return Some(opcode_violation(
                ViolationRule::Create2,
                "CREATE2 only allowed in deployment phase by factory",
                Some(Opcode::CREATE2),
                ctx,
            ));
        }
        ctx.create2_count += 1;
        None
    }

    fn validate_create(&self, ctx: &mut ValidationContext) -> Option<Violation> {
        let allowed = match ctx.factory() {
            Some(factory) if factory.is_staked => true,
            Some(_) if ctx.current_entity == Some(EntityType::Sender) => true,
            _ => ctx.current_entity == Some(EntityType::Sender) && current_is_staked(ctx),
        };
        if !allowed {
            return Some(opcode_violation(
                ViolationRule::Create,
                "CREATE not allowed: requires staked entity or factory-deployed sender",
                Some(Opcode::CREATE),
                ctx,
            ));
        }
        ctx.create_count += 1;
        None
    }

    /// Check an access to `slot` of `address`
    pub fn validate_storage_access(
        &self,
        address: Address,
        slot: U256,
        is_write: bool,
        is_transient: bool,
        ctx: &ValidationContext,
    ) -> Option<Violation> {
        let entity = ctx.current_entity_info();

        if ctx.current_entity == Some(EntityType::Sender) && address == ctx.sender() {
            return None;
        }
        if entity.is_some_and(|e| e.address() == address && e.is_staked) {
            return None;
        }

        let associated = ctx.is_associated_slot(address, slot);
        if associated
            && (ctx.factory().is_some_and(|f| f.is_staked) || !ctx.is_deployment_phase)
        {
            return None;
        }

        if entity.is_some_and(|e| e.is_staked)
            && ((!is_write && !ctx.is_entity_address(address)) || associated)
        {
            return None;
        }

        if address == ctx.entry_point {
            return Some(storage_violation(
                ViolationRule::EntryPointStorage,
                "Direct EntryPoint storage access not allowed".to_string(),
                address,
                slot,
                ctx,
            ));
        }

        let (rule, access) = if is_write {
            (ViolationRule::StorageWrite, "write")
        } else {
            (ViolationRule::StorageRead, "read")
        };
        let kind = if is_transient {
            "transient storage"
        } else {
            "storage"
        };
        Some(storage_violation(
            rule,
            format!("Unauthorized {kind} {access}: contract={address:?}, slot={slot:#x}"),
            address,
            slot,
            ctx,
        ))
    }

    /// Check a message call from `from` to `target`
    pub fn validate_call(
        &self,
        _from: Address,
        target: Address,
        value: U256,
        data: &[u8],
        ctx: &ValidationContext,
    ) -> Option<Violation> {
        if target == ctx.sender() && ctx.is_deployment_phase {
            return None;
        }

        if !value.is_zero() && target != ctx.entry_point {
            return Some(call_violation(
                ViolationRule::CallWithValue,
                format!("CALL with value ({value}) only allowed to EntryPoint"),
                target,
                ctx,
            ));
        }

        if target != ctx.entry_point {
            return None;
        }

        let entity = ctx.current_entity;
        if data.len() < 4 {
            if entity != Some(EntityType::Sender) {
                return Some(call_violation(
                    ViolationRule::EntryPointFallback,
                    "EntryPoint fallback call only allowed from sender".to_string(),
                    target,
                    ctx,
                ));
            }
            return None;
        }

        let selector = [data[0], data[1], data[2], data[3]];
        match selector {
            DEPOSIT_TO_SELECTOR => {
                if !matches!(entity, Some(EntityType::Sender | EntityType::Factory)) {
                    return Some(call_violation(
                        ViolationRule::EntryPointDepositTo,
                        "EntryPoint.depositTo only allowed from sender or factory".to_string(),
                        target,
                        ctx,
                    ));
                }
                None
            }
            INCREMENT_NONCE_SELECTOR => {
                if entity != Some(EntityType::Sender) {
                    return Some(call_violation(
                        ViolationRule::EntryPointIncrementNonce,
                        "EntryPoint.incrementNonce only allowed from sender".to_string(),
                        target,
                        ctx,
                    ));
                }
                None
            }
            _ => Some(call_violation(
                ViolationRule::EntryPointMethod,
                format!(
                    "Unauthorized EntryPoint method call: 0x{}",
                    hex_selector(&selector)
                ),
                target,
                ctx,
            )),
        }
    }

    /// Check a code access to `target` made by a call
    pub fn validate_code_access(
        &self,
        target: Address,
        has_code: bool,
        ctx: &ValidationContext,
    ) -> Option<Violation> {
        if has_code || is_deploying_sender(target, ctx) {
            return None;
        }
        Some(call_violation(
            ViolationRule::AccessedUndeployedContract,
            format!("Access to address without deployed code: {target:?}"),
            target,
            ctx,
        ))
    }

    /// Check an EXTCODESIZE, EXTCODEHASH or EXTCODECOPY of `target`
    pub fn validate_ext_code_opcode(
        &self,
        opcode: Opcode,
        target: Address,
        has_code: bool,
        ctx: &ValidationContext,
    ) -> Option<Violation> {
        if has_code || is_deploying_sender(target, ctx) {
            return None;
        }
        Some(
            Violation::new(
                ViolationRule::AccessedUndeployedContract,
                format!("EXTCODE access to address without code: {target:?}"),
                target,
            )
            .with_opcode(opcode)
            .with_entity(ctx.current_entity),
        )
    }

    /// Check a call to the precompile at `address`
    pub fn validate_precompile_call(
        &self,
        address: Address,
        ctx: &ValidationContext,
    ) -> Option<Violation> {
        if is_allowed_precompile(address, ctx.allow_rip7212_precompile) {
            return None;
        }
        Some(call_violation(
            ViolationRule::ForbiddenPrecompile,
            format!("Precompile not allowed: {address:?}"),
            address,
            ctx,
        ))
    }
}

fn current_is_staked(ctx: &ValidationContext) -> bool {
    ctx.current_entity_info().is_some_and(|e| e.is_staked)
}

fn is_deploying_sender(target: Address, ctx: &ValidationContext) -> bool {
    target == ctx.sender() && ctx.is_deployment_phase
}

fn opcode_violation(
    rule: ViolationRule,
    message: impl Into<String>,
    opcode: Option<Opcode>,
    ctx: &ValidationContext,
) -> Violation {
    let v = Violation::new(rule, message, ctx.current_address).with_entity(ctx.current_entity);
    match opcode {
        Some(op) => v.with_opcode(op),
        None => v,
    }
}

fn storage_violation(
    rule: ViolationRule,
    message: String,
    address: Address,
    slot: U256,
    ctx: &ValidationContext,
) -> Violation {
    Violation::new(rule, message, address)
        .with_slot(slot)
        .with_entity(ctx.current_entity)
}

fn call_violation(
    rule: ViolationRule,
    message: String,
    target: Address,
    ctx: &ValidationContext,
) -> Violation {
    Violation::new(rule, message, target).with_entity(ctx.current_entity)
}

fn hex_selector(selector: &[u8]) -> String {
    selector.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use bundleguard_types::{EntityInfo, EntityInfos};

    use super::*;

    struct Fixture {
        entry_point: Address,
        sender: Address,
        factory: Address,
        paymaster: Address,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                entry_point: Address::random(),
                sender: Address::random(),
                factory: Address::random(),
                paymaster: Address::random(),
            }
        }

        fn context(
            &self,
            sender_staked: bool,
            factory_staked: Option<bool>,
            paymaster_staked: Option<bool>,
        ) -> ValidationContext {
            let mut entities = EntityInfos::new(EntityInfo::sender(self.sender, sender_staked));
            if let Some(staked) = factory_staked {
                entities = entities.with_factory(EntityInfo::factory(self.factory, staked));
            }
            if let Some(staked) = paymaster_staked {
                entities = entities.with_paymaster(EntityInfo::paymaster(self.paymaster, staked));
            }
            ValidationContext::new(self.entry_point, entities, false)
        }
    }

    fn rule_of(v: Option<Violation>) -> Option<ViolationRule> {
        v.map(|v| v.rule)
    }

    #[test]
    fn test_unassigned_opcode_checked_first() {
        let f = Fixture::new();
        let mut ctx = f.context(false, None, None);
        ctx.enter_phase(EntityType::Sender);
        let v = RuleEnforcer.validate_opcode(0x0c, None, &mut ctx).unwrap();
        assert_eq!(v.rule, ViolationRule::UnassignedOpcode);
        assert_eq!(v.opcode, None);
        assert_eq!(v.message, "Unassigned opcode: 0x0c");
    }

    #[test]
    fn test_always_forbidden() {
        let f = Fixture::new();
        let mut ctx = f.context(true, None, None);
        ctx.enter_phase(EntityType::Sender);
        for op in ALWAYS_FORBIDDEN_OPCODES {
            let v = RuleEnforcer
                .validate_opcode((*op).into(), None, &mut ctx)
                .unwrap();
            assert_eq!(v.rule, ViolationRule::ForbiddenOpcode);
            assert_eq!(v.opcode, Some(*op));
        }
        assert_eq!(
            rule_of(RuleEnforcer.validate_opcode(Opcode::SLOAD.into(), None, &mut ctx)),
            None
        );
    }

    #[test]
    fn test_balance_requires_stake() {
        let f = Fixture::new();
        let mut ctx = f.context(false, None, Some(true));
        ctx.enter_phase(EntityType::Sender);
        assert_eq!(
            rule_of(RuleEnforcer.validate_opcode(Opcode::SELFBALANCE.into(), None, &mut ctx)),
            Some(ViolationRule::Balance)
        );
        ctx.enter_phase(EntityType::Paymaster);
        assert_eq!(
            rule_of(RuleEnforcer.validate_opcode(Opcode::BALANCE.into(), None, &mut ctx)),
            None
        );
    }

    #[test]
    fn test_gas_must_precede_call() {
        let f = Fixture::new();
        let mut ctx = f.context(false, None, None);
        ctx.enter_phase(EntityType::Sender);
        let gas = Opcode::GAS.into();

        for call in CALL_OPCODES {
            assert_eq!(
                rule_of(RuleEnforcer.validate_opcode(gas, Some((*call).into()), &mut ctx)),
                None
            );
        }
        for next in [Some(Opcode::POP.into()), Some(0x0c), None] {
            assert_eq!(
                rule_of(RuleEnforcer.validate_opcode(gas, next, &mut ctx)),
                Some(ViolationRule::GasNotFollowedByCall)
            );
        }
    }

    #[test]
    fn test_create2_once_during_deployment() {
        let f = Fixture::new();
        let mut ctx = f.context(false, Some(false), None);
        ctx.enter_phase(EntityType::Sender);
        ctx.set_deployment_phase(true);
        let create2 = Opcode::CREATE2.into();

        assert_eq!(
            rule_of(RuleEnforcer.validate_opcode(create2, None, &mut ctx)),
            None
        );
        assert_eq!(ctx.create2_count(), 1);
        assert_eq!(
            rule_of(RuleEnforcer.validate_opcode(create2, None, &mut ctx)),
            Some(ViolationRule::Create2)
        );
        assert_eq!(ctx.create2_count(), 1);
    }

    #[test]
    fn test_create2_outside_deployment() {
        let f = Fixture::new();
        let mut ctx = f.context(false, None, Some(false));
        ctx.enter_phase(EntityType::Paymaster);
        let v = RuleEnforcer
            .validate_opcode(Opcode::CREATE2.into(), None, &mut ctx)
            .unwrap();
        assert_eq!(v.rule, ViolationRule::Create2);
        assert_eq!(v.message, "CREATE2 only allowed in deployment phase by factory");

        let mut staked = f.context(false, None, Some(true));
        staked.enter_phase(EntityType::Paymaster);
        for _ in 0..3 {
            assert!(RuleEnforcer
                .validate_opcode(Opcode::CREATE2.into(), None, &mut staked)
                .is_none());
        }
    }

    #[test]
    fn test_create_precedence() {
        let f = Fixture::new();
        let create = Opcode::CREATE.into();

        // staked factory allows any entity
        let mut ctx = f.context(false, Some(true), Some(false));
        ctx.enter_phase(EntityType::Paymaster);
        assert!(RuleEnforcer.validate_opcode(create, None, &mut ctx).is_none());
        assert_eq!(ctx.create_count(), 1);

        // unstaked factory allows the sender only
        let mut ctx = f.context(false, Some(false), Some(false));
        ctx.enter_phase(EntityType::Sender);
        assert!(RuleEnforcer.validate_opcode(create, None, &mut ctx).is_none());
        ctx.enter_phase(EntityType::Factory);
        assert_eq!(
            rule_of(RuleEnforcer.validate_opcode(create, None, &mut ctx)),
            Some(ViolationRule::Create)
        );

        // no factory, staked sender
        let mut ctx = f.context(true, None, None);
        ctx.enter_phase(EntityType::Sender);
        assert!(RuleEnforcer.validate_opcode(create, None, &mut ctx).is_none());

        // no factory, unstaked sender
        let mut ctx = f.context(false, None, None);
        ctx.enter_phase(EntityType::Sender);
        assert_eq!(
            rule_of(RuleEnforcer.validate_opcode(create, None, &mut ctx)),
            Some(ViolationRule::Create)
        );
    }

    #[test]
    fn test_storage_own_and_entry_point() {
        let f = Fixture::new();
        let mut ctx = f.context(false, None, Some(false));
        ctx.enter_phase(EntityType::Sender);

        assert!(RuleEnforcer
            .validate_storage_access(f.sender, 1.into(), true, false, &ctx)
            .is_none());

        let v = RuleEnforcer
            .validate_storage_access(f.entry_point, 1.into(), true, false, &ctx)
            .unwrap();
        assert_eq!(v.rule, ViolationRule::EntryPointStorage);
        assert_eq!(v.address, f.entry_point);
        assert_eq!(v.slot, Some(1.into()));

        // unstaked paymaster on its own storage
        ctx.enter_phase(EntityType::Paymaster);
        assert_eq!(
            rule_of(RuleEnforcer.validate_storage_access(f.paymaster, 1.into(), false, false, &ctx)),
            Some(ViolationRule::StorageRead)
        );
    }

    #[test]
    fn test_storage_associated() {
        let f = Fixture::new();
        let token = Address::random();
        let mut ctx = f.context(false, Some(false), None);
        ctx.track_associated_slot(token, 5.into());
        ctx.enter_phase(EntityType::Sender);

        assert!(RuleEnforcer
            .validate_storage_access(token, 5.into(), true, false, &ctx)
            .is_none());

        // unstaked factory, deployment phase
        ctx.set_deployment_phase(true);
        let v = RuleEnforcer
            .validate_storage_access(token, 5.into(), true, false, &ctx)
            .unwrap();
        assert_eq!(v.rule, ViolationRule::StorageWrite);

        let v = RuleEnforcer
            .validate_storage_access(token, 6.into(), false, true, &ctx)
            .unwrap();
        assert_eq!(v.rule, ViolationRule::StorageRead);
        assert!(v.message.starts_with("Unauthorized transient storage read"));
    }

    #[test]
    fn test_storage_staked_privileges() {
        let f = Fixture::new();
        let other = Address::random();
        let mut ctx = f.context(false, None, Some(true));
        ctx.enter_phase(EntityType::Paymaster);

        assert!(RuleEnforcer
            .validate_storage_access(f.paymaster, 1.into(), true, false, &ctx)
            .is_none());
        assert!(RuleEnforcer
            .validate_storage_access(other, 1.into(), false, false, &ctx)
            .is_none());
        assert_eq!(
            rule_of(RuleEnforcer.validate_storage_access(other, 1.into(), true, false, &ctx)),
            Some(ViolationRule::StorageWrite)
        );
        // reading another entity's storage is not covered
        assert_eq!(
            rule_of(RuleEnforcer.validate_storage_access(f.sender, 1.into(), false, false, &ctx)),
            Some(ViolationRule::StorageRead)
        );
    }

    #[test]
    fn test_call_rules() {
        let f = Fixture::new();
        let mut ctx = f.context(false, Some(false), Some(false));
        let other = Address::random();

        ctx.enter_phase(EntityType::Sender);
        assert_eq!(
            rule_of(RuleEnforcer.validate_call(f.sender, other, 1.into(), &[], &ctx)),
            Some(ViolationRule::CallWithValue)
        );
        assert!(RuleEnforcer
            .validate_call(f.sender, f.entry_point, 1.into(), &[], &ctx)
            .is_none());
        assert!(RuleEnforcer
            .validate_call(f.sender, f.entry_point, 0.into(), &INCREMENT_NONCE_SELECTOR, &ctx)
            .is_none());
        let v = RuleEnforcer
            .validate_call(f.sender, f.entry_point, 0.into(), &[0xde, 0xad, 0xbe, 0xef], &ctx)
            .unwrap();
        assert_eq!(v.rule, ViolationRule::EntryPointMethod);
        assert_eq!(v.message, "Unauthorized EntryPoint method call: 0xdeadbeef");

        ctx.enter_phase(EntityType::Factory);
        assert!(RuleEnforcer
            .validate_call(f.factory, f.entry_point, 0.into(), &DEPOSIT_TO_SELECTOR, &ctx)
            .is_none());
        assert_eq!(
            rule_of(RuleEnforcer.validate_call(
                f.factory,
                f.entry_point,
                0.into(),
                &INCREMENT_NONCE_SELECTOR,
                &ctx
            )),
            Some(ViolationRule::EntryPointIncrementNonce)
        );

        ctx.enter_phase(EntityType::Paymaster);
        assert_eq!(
            rule_of(RuleEnforcer.validate_call(
                f.paymaster,
                f.entry_point,
                0.into(),
                &DEPOSIT_TO_SELECTOR,
                &ctx
            )),
            Some(ViolationRule::EntryPointDepositTo)
        );
        assert_eq!(
            rule_of(RuleEnforcer.validate_call(f.paymaster, f.entry_point, 0.into(), &[], &ctx)),
            Some(ViolationRule::EntryPointFallback)
        );
    }

    #[test]
    fn test_call_to_sender_during_deployment() {
        let f = Fixture::new();
        let mut ctx = f.context(false, Some(false), None);
        ctx.enter_phase(EntityType::Factory);
        ctx.set_deployment_phase(true);
        assert!(RuleEnforcer
            .validate_call(f.factory, f.sender, 1.into(), &[], &ctx)
            .is_none());
        assert!(RuleEnforcer
            .validate_code_access(f.sender, false, &ctx)
            .is_none());
        ctx.set_deployment_phase(false);
        assert_eq!(
            rule_of(RuleEnforcer.validate_code_access(f.sender, false, &ctx)),
            Some(ViolationRule::AccessedUndeployedContract)
        );
    }

    #[test]
    fn test_ext_code_access() {
        let f = Fixture::new();
        let mut ctx = f.context(false, None, None);
        ctx.enter_phase(EntityType::Sender);
        let target = Address::random();

        assert!(RuleEnforcer
            .validate_ext_code_opcode(Opcode::EXTCODESIZE, target, true, &ctx)
            .is_none());
        let v = RuleEnforcer
            .validate_ext_code_opcode(Opcode::EXTCODEHASH, target, false, &ctx)
            .unwrap();
        assert_eq!(v.rule, ViolationRule::AccessedUndeployedContract);
        assert_eq!(v.opcode, Some(Opcode::EXTCODEHASH));
    }

    #[test]
    fn test_precompiles() {
        let f = Fixture::new();
        let mut ctx = f.context(false, None, None);
        ctx.enter_phase(EntityType::Sender);

        for allowed in [0x01, 0x02, 0x09, 0x0a] {
            assert!(RuleEnforcer
                .validate_precompile_call(Address::from_low_u64_be(allowed), &ctx)
                .is_none());
        }
        for forbidden in [0x0b, 0x20, 0xff, 0x100] {
            assert_eq!(
                rule_of(
                    RuleEnforcer
                        .validate_precompile_call(Address::from_low_u64_be(forbidden), &ctx)
                ),
                Some(ViolationRule::ForbiddenPrecompile)
            );
        }

        let mut rip = ValidationContext::new(f.entry_point, *ctx.entities(), true);
        rip.enter_phase(EntityType::Sender);
        assert!(RuleEnforcer
            .validate_precompile_call(Address::from_low_u64_be(0x100), &rip)
            .is_none());
    }

    #[test]
    fn test_precompile_address_range() {
        assert!(!is_precompile_address(Address::zero()));
        assert!(is_precompile_address(Address::from_low_u64_be(0x01)));
        assert!(is_precompile_address(Address::from_low_u64_be(0x100)));
        assert!(!is_precompile_address(Address::from_low_u64_be(0x200)));
        assert!(!is_allowed_precompile(Address::random(), true));
    }
}
