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

use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumCount, EnumIter, EnumString};

/// An [EVM Opcode](https://evm.codes), Cancun instruction set.
///
/// Bytes with no variant are unassigned; `Opcode::try_from(byte)` fails for them.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    AsRefStr,
    Display,
    EnumString,
    EnumIter,
    EnumCount,
    TryFromPrimitive,
    Serialize,
    Deserialize,
)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Opcode {
    // 0x00 range - arithmetic
    STOP = 0x00,
    ADD,
    MUL,
    SUB,
    DIV,
    SDIV,
    MOD,
    SMOD,
    ADDMOD,
    MULMOD,
    EXP,
    SIGNEXTEND,

    // 0x10 range - comparison and bitwise
    LT = 0x10,
    GT,
    SLT,
    SGT,
    EQ,
    ISZERO,
    AND,
    OR,
    XOR,
    NOT,
    BYTE,
    SHL,
    SHR,
    SAR,

    // 0x20 - hashing
    #[serde(alias = "SHA3")]
    #[strum(to_string = "KECCAK256", serialize = "SHA3")]
    KECCAK256 = 0x20,

    // 0x30 range - environment
    ADDRESS = 0x30,
    BALANCE,
    ORIGIN,
    CALLER,
    CALLVALUE,
    CALLDATALOAD,
    CALLDATASIZE,
    CALLDATACOPY,
    CODESIZE,
    CODECOPY,
    GASPRICE,
    EXTCODESIZE,
    EXTCODECOPY,
    RETURNDATASIZE,
    RETURNDATACOPY,
    EXTCODEHASH,

    // 0x40 range - block information
    BLOCKHASH = 0x40,
    COINBASE,
    TIMESTAMP,
    NUMBER,
    #[serde(alias = "PREVRANDAO", alias = "RANDOM")]
    #[strum(
        to_string = "DIFFICULTY",
        serialize = "PREVRANDAO",
        serialize = "RANDOM"
    )]
    DIFFICULTY,
    GASLIMIT,
    CHAINID,
    SELFBALANCE,
    BASEFEE,
    BLOBHASH,
    BLOBBASEFEE,

    // 0x50 range - stack, memory, storage and flow
    POP = 0x50,
    MLOAD,
    MSTORE,
    MSTORE8,
    SLOAD,
    SSTORE,
    JUMP,
    JUMPI,
    PC,
    MSIZE,
    GAS,
    JUMPDEST,
    TLOAD,
    TSTORE,
    MCOPY,
    PUSH0,

    // 0x60 range - pushes
    PUSH1 = 0x60,
    PUSH2,
    PUSH3,
    PUSH4,
    PUSH5,
    PUSH6,
    PUSH7,
    PUSH8,
    PUSH9,
    PUSH10,
    PUSH11,
    PUSH12,
    PUSH13,
    PUSH14,
    PUSH15,
    PUSH16,
    PUSH17,
    PUSH18,
    PUSH19,
    PUSH20,
    PUSH21,
    PUSH22,
    PUSH23,
    PUSH24,
    PUSH25,
    PUSH26,
    PUSH27,
    PUSH28,
    PUSH29,
    PUSH30,
    PUSH31,
    PUSH32,

    // 0x80 range - dups
    DUP1 = 0x80,
    DUP2,
    DUP3,
    DUP4,
    DUP5,
    DUP6,
    DUP7,
    DUP8,
    DUP9,
    DUP10,
    DUP11,
    DUP12,
    DUP13,
    DUP14,
    DUP15,
    DUP16,

    // 0x90 range - swaps
    SWAP1 = 0x90,
    SWAP2,
    SWAP3,
    SWAP4,
    SWAP5,
    SWAP6,
    SWAP7,
    SWAP8,
    SWAP9,
    SWAP10,
    SWAP11,
    SWAP12,
    SWAP13,
    SWAP14,
    SWAP15,
    SWAP16,

    // 0xa0 range - logging
    LOG0 = 0xa0,
    LOG1,
    LOG2,
    LOG3,
    LOG4,

    // 0xf0 range - system
    CREATE = 0xf0,
    CALL,
    CALLCODE,
    RETURN,
    DELEGATECALL,
    CREATE2,
    STATICCALL = 0xfa,
    REVERT = 0xfd,
    #[default]
    INVALID = 0xfe,
    SELFDESTRUCT = 0xff,
}

impl Opcode {
    /// Whether this is one of the four message-call opcodes
    pub fn is_call(&self) -> bool {
        matches!(
            self,
            Opcode::CALL | Opcode::CALLCODE | Opcode::DELEGATECALL | Opcode::STATICCALL
        )
    }

    /// Whether this opcode creates a contract
    pub fn is_create(&self) -> bool {
        matches!(self, Opcode::CREATE | Opcode::CREATE2)
    }

    /// Whether this opcode inspects the code of another account
    pub fn is_ext_code(&self) -> bool {
        matches!(
            self,
            Opcode::EXTCODESIZE | Opcode::EXTCODEHASH | Opcode::EXTCODECOPY
        )
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> Self {
        op as u8
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_unassigned_bytes() {
        for byte in [0x0c, 0x1e, 0x21, 0x4b, 0xa5, 0xef, 0xf6, 0xfb, 0xfc] {
            assert!(Opcode::try_from(byte).is_err(), "{byte:#x} should be unassigned");
        }
        assert_eq!(Opcode::try_from(0x5f).unwrap(), Opcode::PUSH0);
        assert_eq!(Opcode::try_from(0x5c).unwrap(), Opcode::TLOAD);
        assert_eq!(Opcode::try_from(0x4a).unwrap(), Opcode::BLOBBASEFEE);
    }

    #[test]
    fn test_byte_round_trip() {
        for op in Opcode::iter() {
            assert_eq!(Opcode::try_from(u8::from(op)).unwrap(), op);
        }
    }

    #[test]
    fn test_aliases() {
        assert_eq!(Opcode::from_str("SHA3").unwrap(), Opcode::KECCAK256);
        assert_eq!(Opcode::from_str("PREVRANDAO").unwrap(), Opcode::DIFFICULTY);
        assert_eq!(Opcode::KECCAK256.to_string(), "KECCAK256");
        let op: Opcode = serde_json::from_str("\"SHA3\"").unwrap();
        assert_eq!(op, Opcode::KECCAK256);
    }
}
