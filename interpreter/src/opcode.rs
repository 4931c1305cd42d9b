use core::fmt;

use lazy_static::lazy_static;

use crate::revision::Revision;
use crate::types::Gas;

/// Sentinel gas price reported for unknown opcodes, so that lookups stay
/// branch-free at the call site.
pub const UNKNOWN_GAS: Gas = 999_999;

/// One byte of EVM code.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpCode(pub u8);

macro_rules! opcodes {
	($($name:ident = $value:expr;)*) => {
		impl OpCode {
			$(pub const $name: OpCode = OpCode($value);)*
		}

		fn mnemonic(op: OpCode) -> Option<&'static str> {
			match op {
				$(OpCode::$name => Some(stringify!($name)),)*
				_ => None,
			}
		}
	};
}

opcodes! {
	STOP = 0x00;
	ADD = 0x01;
	MUL = 0x02;
	SUB = 0x03;
	DIV = 0x04;
	SDIV = 0x05;
	MOD = 0x06;
	SMOD = 0x07;
	ADDMOD = 0x08;
	MULMOD = 0x09;
	EXP = 0x0a;
	SIGNEXTEND = 0x0b;

	LT = 0x10;
	GT = 0x11;
	SLT = 0x12;
	SGT = 0x13;
	EQ = 0x14;
	ISZERO = 0x15;
	AND = 0x16;
	OR = 0x17;
	XOR = 0x18;
	NOT = 0x19;
	BYTE = 0x1a;
	SHL = 0x1b;
	SHR = 0x1c;
	SAR = 0x1d;

	SHA3 = 0x20;

	ADDRESS = 0x30;
	BALANCE = 0x31;
	ORIGIN = 0x32;
	CALLER = 0x33;
	CALLVALUE = 0x34;
	CALLDATALOAD = 0x35;
	CALLDATASIZE = 0x36;
	CALLDATACOPY = 0x37;
	CODESIZE = 0x38;
	CODECOPY = 0x39;
	GASPRICE = 0x3a;
	EXTCODESIZE = 0x3b;
	EXTCODECOPY = 0x3c;
	RETURNDATASIZE = 0x3d;
	RETURNDATACOPY = 0x3e;
	EXTCODEHASH = 0x3f;

	BLOCKHASH = 0x40;
	COINBASE = 0x41;
	TIMESTAMP = 0x42;
	NUMBER = 0x43;
	PREVRANDAO = 0x44;
	GASLIMIT = 0x45;
	CHAINID = 0x46;
	SELFBALANCE = 0x47;
	BASEFEE = 0x48;
	BLOBHASH = 0x49;
	BLOBBASEFEE = 0x4a;

	POP = 0x50;
	MLOAD = 0x51;
	MSTORE = 0x52;
	MSTORE8 = 0x53;
	SLOAD = 0x54;
	SSTORE = 0x55;
	JUMP = 0x56;
	JUMPI = 0x57;
	PC = 0x58;
	MSIZE = 0x59;
	GAS = 0x5a;
	JUMPDEST = 0x5b;
	TLOAD = 0x5c;
	TSTORE = 0x5d;
	MCOPY = 0x5e;

	PUSH0 = 0x5f;
	PUSH1 = 0x60;
	PUSH2 = 0x61;
	PUSH3 = 0x62;
	PUSH4 = 0x63;
	PUSH5 = 0x64;
	PUSH6 = 0x65;
	PUSH7 = 0x66;
	PUSH8 = 0x67;
	PUSH9 = 0x68;
	PUSH10 = 0x69;
	PUSH11 = 0x6a;
	PUSH12 = 0x6b;
	PUSH13 = 0x6c;
	PUSH14 = 0x6d;
	PUSH15 = 0x6e;
	PUSH16 = 0x6f;
	PUSH17 = 0x70;
	PUSH18 = 0x71;
	PUSH19 = 0x72;
	PUSH20 = 0x73;
	PUSH21 = 0x74;
	PUSH22 = 0x75;
	PUSH23 = 0x76;
	PUSH24 = 0x77;
	PUSH25 = 0x78;
	PUSH26 = 0x79;
	PUSH27 = 0x7a;
	PUSH28 = 0x7b;
	PUSH29 = 0x7c;
	PUSH30 = 0x7d;
	PUSH31 = 0x7e;
	PUSH32 = 0x7f;

	DUP1 = 0x80;
	DUP2 = 0x81;
	DUP3 = 0x82;
	DUP4 = 0x83;
	DUP5 = 0x84;
	DUP6 = 0x85;
	DUP7 = 0x86;
	DUP8 = 0x87;
	DUP9 = 0x88;
	DUP10 = 0x89;
	DUP11 = 0x8a;
	DUP12 = 0x8b;
	DUP13 = 0x8c;
	DUP14 = 0x8d;
	DUP15 = 0x8e;
	DUP16 = 0x8f;

	SWAP1 = 0x90;
	SWAP2 = 0x91;
	SWAP3 = 0x92;
	SWAP4 = 0x93;
	SWAP5 = 0x94;
	SWAP6 = 0x95;
	SWAP7 = 0x96;
	SWAP8 = 0x97;
	SWAP9 = 0x98;
	SWAP10 = 0x99;
	SWAP11 = 0x9a;
	SWAP12 = 0x9b;
	SWAP13 = 0x9c;
	SWAP14 = 0x9d;
	SWAP15 = 0x9e;
	SWAP16 = 0x9f;

	LOG0 = 0xa0;
	LOG1 = 0xa1;
	LOG2 = 0xa2;
	LOG3 = 0xa3;
	LOG4 = 0xa4;

	CREATE = 0xf0;
	CALL = 0xf1;
	CALLCODE = 0xf2;
	RETURN = 0xf3;
	DELEGATECALL = 0xf4;
	CREATE2 = 0xf5;
	STATICCALL = 0xfa;
	REVERT = 0xfd;
	INVALID = 0xfe;
	SELFDESTRUCT = 0xff;
}

impl OpCode {
	/// Number of immediate data bytes for PUSH1..PUSH32, `None` otherwise.
	#[must_use]
	pub fn push_data_len(self) -> Option<usize> {
		if (Self::PUSH1.0..=Self::PUSH32.0).contains(&self.0) {
			Some((self.0 - Self::PUSH1.0) as usize + 1)
		} else {
			None
		}
	}

	/// DUP depth for DUP1..DUP16, `None` otherwise.
	#[must_use]
	pub fn dup_depth(self) -> Option<usize> {
		if (Self::DUP1.0..=Self::DUP16.0).contains(&self.0) {
			Some((self.0 - Self::DUP1.0) as usize + 1)
		} else {
			None
		}
	}

	/// SWAP depth for SWAP1..SWAP16, `None` otherwise.
	#[must_use]
	pub fn swap_depth(self) -> Option<usize> {
		if (Self::SWAP1.0..=Self::SWAP16.0).contains(&self.0) {
			Some((self.0 - Self::SWAP1.0) as usize + 1)
		} else {
			None
		}
	}

	/// Topic count for LOG0..LOG4, `None` otherwise.
	#[must_use]
	pub fn log_topic_count(self) -> Option<usize> {
		if (Self::LOG0.0..=Self::LOG4.0).contains(&self.0) {
			Some((self.0 - Self::LOG0.0) as usize)
		} else {
			None
		}
	}

	#[inline]
	#[must_use]
	pub const fn as_u8(self) -> u8 {
		self.0
	}

	#[inline]
	#[must_use]
	pub const fn as_usize(self) -> usize {
		self.0 as usize
	}

	/// The opcode's table entry.
	#[inline]
	#[must_use]
	pub fn properties(self) -> &'static OpProperties {
		&PROPERTIES[self.as_usize()]
	}

	/// Static gas under the given revision's schedule.
	#[inline]
	#[must_use]
	pub fn static_gas(self, revision: Revision) -> Gas {
		let properties = self.properties();
		if revision >= Revision::Berlin {
			properties.gas_berlin
		} else {
			properties.gas
		}
	}
}

impl fmt::Debug for OpCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match mnemonic(*self) {
			Some(name) => f.write_str(name),
			None => write!(f, "OpCode(0x{:02x})", self.0),
		}
	}
}

impl fmt::Display for OpCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

/// Per-opcode entry of the 256-slot lookup table.
#[derive(Clone, Debug)]
pub struct OpProperties {
	pub name: &'static str,
	pub valid: bool,
	/// Instruction width in bytes, including PUSH immediates.
	pub width: usize,
	pub pops: usize,
	pub pushes: usize,
	/// Static gas under the pre-Berlin schedule.
	pub gas: Gas,
	/// Static gas from Berlin on. Account-touching opcodes drop to zero
	/// here; their access surcharge is billed dynamically.
	pub gas_berlin: Gas,
	pub min_revision: Revision,
}

impl OpProperties {
	/// Net stack growth of one execution.
	#[must_use]
	pub fn stack_delta(&self) -> isize {
		self.pushes as isize - self.pops as isize
	}
}

fn stack_io(op: OpCode) -> (usize, usize) {
	if op.push_data_len().is_some() {
		return (0, 1);
	}
	if let Some(n) = op.dup_depth() {
		return (n, n + 1);
	}
	if let Some(n) = op.swap_depth() {
		return (n + 1, n + 1);
	}
	if let Some(n) = op.log_topic_count() {
		return (n + 2, 0);
	}
	match op {
		OpCode::STOP | OpCode::JUMPDEST | OpCode::INVALID => (0, 0),
		OpCode::ADD
		| OpCode::MUL
		| OpCode::SUB
		| OpCode::DIV
		| OpCode::SDIV
		| OpCode::MOD
		| OpCode::SMOD
		| OpCode::EXP
		| OpCode::SIGNEXTEND
		| OpCode::LT
		| OpCode::GT
		| OpCode::SLT
		| OpCode::SGT
		| OpCode::EQ
		| OpCode::AND
		| OpCode::OR
		| OpCode::XOR
		| OpCode::BYTE
		| OpCode::SHL
		| OpCode::SHR
		| OpCode::SAR
		| OpCode::SHA3 => (2, 1),
		OpCode::ADDMOD | OpCode::MULMOD => (3, 1),
		OpCode::ISZERO | OpCode::NOT => (1, 1),
		OpCode::ADDRESS
		| OpCode::ORIGIN
		| OpCode::CALLER
		| OpCode::CALLVALUE
		| OpCode::CALLDATASIZE
		| OpCode::CODESIZE
		| OpCode::GASPRICE
		| OpCode::RETURNDATASIZE
		| OpCode::COINBASE
		| OpCode::TIMESTAMP
		| OpCode::NUMBER
		| OpCode::PREVRANDAO
		| OpCode::GASLIMIT
		| OpCode::CHAINID
		| OpCode::SELFBALANCE
		| OpCode::BASEFEE
		| OpCode::BLOBBASEFEE
		| OpCode::PC
		| OpCode::MSIZE
		| OpCode::GAS
		| OpCode::PUSH0 => (0, 1),
		OpCode::BALANCE
		| OpCode::CALLDATALOAD
		| OpCode::EXTCODESIZE
		| OpCode::EXTCODEHASH
		| OpCode::BLOCKHASH
		| OpCode::BLOBHASH
		| OpCode::MLOAD
		| OpCode::SLOAD
		| OpCode::TLOAD => (1, 1),
		OpCode::CALLDATACOPY | OpCode::CODECOPY | OpCode::RETURNDATACOPY | OpCode::MCOPY => (3, 0),
		OpCode::EXTCODECOPY => (4, 0),
		OpCode::POP | OpCode::JUMP | OpCode::SELFDESTRUCT => (1, 0),
		OpCode::MSTORE
		| OpCode::MSTORE8
		| OpCode::SSTORE
		| OpCode::TSTORE
		| OpCode::JUMPI
		| OpCode::RETURN
		| OpCode::REVERT => (2, 0),
		OpCode::CREATE => (3, 1),
		OpCode::CREATE2 => (4, 1),
		OpCode::CALL | OpCode::CALLCODE => (7, 1),
		OpCode::DELEGATECALL | OpCode::STATICCALL => (6, 1),
		_ => (0, 0),
	}
}

fn base_gas(op: OpCode) -> Gas {
	if op.push_data_len().is_some() || op.dup_depth().is_some() || op.swap_depth().is_some() {
		return 3;
	}
	if let Some(n) = op.log_topic_count() {
		return 375 * (n as Gas + 1);
	}
	match op {
		OpCode::STOP | OpCode::RETURN | OpCode::REVERT | OpCode::SSTORE => 0,
		OpCode::JUMPDEST => 1,
		OpCode::ADDRESS
		| OpCode::ORIGIN
		| OpCode::CALLER
		| OpCode::CALLVALUE
		| OpCode::CALLDATASIZE
		| OpCode::CODESIZE
		| OpCode::GASPRICE
		| OpCode::RETURNDATASIZE
		| OpCode::COINBASE
		| OpCode::TIMESTAMP
		| OpCode::NUMBER
		| OpCode::PREVRANDAO
		| OpCode::GASLIMIT
		| OpCode::CHAINID
		| OpCode::BASEFEE
		| OpCode::BLOBBASEFEE
		| OpCode::POP
		| OpCode::PC
		| OpCode::MSIZE
		| OpCode::GAS
		| OpCode::PUSH0 => 2,
		OpCode::ADD
		| OpCode::SUB
		| OpCode::LT
		| OpCode::GT
		| OpCode::SLT
		| OpCode::SGT
		| OpCode::EQ
		| OpCode::ISZERO
		| OpCode::AND
		| OpCode::OR
		| OpCode::XOR
		| OpCode::NOT
		| OpCode::BYTE
		| OpCode::SHL
		| OpCode::SHR
		| OpCode::SAR
		| OpCode::CALLDATALOAD
		| OpCode::CALLDATACOPY
		| OpCode::CODECOPY
		| OpCode::RETURNDATACOPY
		| OpCode::BLOBHASH
		| OpCode::MLOAD
		| OpCode::MSTORE
		| OpCode::MSTORE8
		| OpCode::MCOPY => 3,
		OpCode::MUL
		| OpCode::DIV
		| OpCode::SDIV
		| OpCode::MOD
		| OpCode::SMOD
		| OpCode::SIGNEXTEND
		| OpCode::SELFBALANCE => 5,
		OpCode::ADDMOD | OpCode::MULMOD => 8,
		OpCode::EXP => 10,
		OpCode::SHA3 => 30,
		OpCode::BLOCKHASH => 20,
		OpCode::JUMP => 8,
		OpCode::JUMPI => 10,
		OpCode::TLOAD | OpCode::TSTORE => 100,
		// Istanbul values; repriced to zero plus a dynamic warm/cold
		// surcharge from Berlin on.
		OpCode::SLOAD => 800,
		OpCode::BALANCE | OpCode::EXTCODESIZE | OpCode::EXTCODECOPY | OpCode::EXTCODEHASH => 700,
		OpCode::CALL | OpCode::CALLCODE | OpCode::DELEGATECALL | OpCode::STATICCALL => 700,
		OpCode::CREATE | OpCode::CREATE2 => 32_000,
		OpCode::SELFDESTRUCT => 5_000,
		_ => UNKNOWN_GAS,
	}
}

fn berlin_gas(op: OpCode) -> Gas {
	match op {
		OpCode::SLOAD
		| OpCode::BALANCE
		| OpCode::EXTCODESIZE
		| OpCode::EXTCODECOPY
		| OpCode::EXTCODEHASH
		| OpCode::CALL
		| OpCode::CALLCODE
		| OpCode::DELEGATECALL
		| OpCode::STATICCALL => 0,
		_ => base_gas(op),
	}
}

fn min_revision(op: OpCode) -> Revision {
	match op {
		OpCode::BASEFEE => Revision::London,
		OpCode::PUSH0 => Revision::Shanghai,
		OpCode::TLOAD | OpCode::TSTORE | OpCode::MCOPY | OpCode::BLOBHASH | OpCode::BLOBBASEFEE => {
			Revision::Cancun
		}
		_ => Revision::Istanbul,
	}
}

fn build_entry(op: OpCode) -> OpProperties {
	let name = mnemonic(op);
	let valid = name.is_some() && op != OpCode::INVALID;
	let (pops, pushes) = stack_io(op);
	OpProperties {
		name: name.unwrap_or("UNKNOWN"),
		valid,
		width: 1 + op.push_data_len().unwrap_or(0),
		pops,
		pushes,
		gas: if valid { base_gas(op) } else { UNKNOWN_GAS },
		gas_berlin: if valid { berlin_gas(op) } else { UNKNOWN_GAS },
		min_revision: min_revision(op),
	}
}

lazy_static! {
	static ref PROPERTIES: [OpProperties; 256] =
		core::array::from_fn(|value| build_entry(OpCode(value as u8)));
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn every_valid_opcode_has_positive_width() {
		for value in 0..=255u8 {
			let properties = OpCode(value).properties();
			if properties.valid {
				assert!(properties.width >= 1, "{:?}", OpCode(value));
			}
		}
	}

	#[test]
	fn push_widths_cover_their_immediates() {
		for n in 1..=32usize {
			let op = OpCode(OpCode::PUSH1.0 + n as u8 - 1);
			assert_eq!(op.properties().width, n + 1);
			assert_eq!(op.push_data_len(), Some(n));
		}
		assert_eq!(OpCode::PUSH0.properties().width, 1);
	}

	#[test]
	fn unknown_opcodes_report_the_sentinel() {
		let properties = OpCode(0x0c).properties();
		assert!(!properties.valid);
		assert_eq!(properties.gas, UNKNOWN_GAS);
		assert_eq!(properties.gas_berlin, UNKNOWN_GAS);
	}

	#[test]
	fn repriced_opcodes_have_zero_static_gas_from_berlin() {
		for op in [
			OpCode::SLOAD,
			OpCode::BALANCE,
			OpCode::EXTCODESIZE,
			OpCode::EXTCODECOPY,
			OpCode::EXTCODEHASH,
			OpCode::CALL,
			OpCode::CALLCODE,
			OpCode::DELEGATECALL,
			OpCode::STATICCALL,
		] {
			assert!(op.static_gas(Revision::Istanbul) > 0);
			assert_eq!(op.static_gas(Revision::Berlin), 0);
		}
		assert_eq!(OpCode::ADD.static_gas(Revision::Berlin), 3);
	}

	#[test]
	fn stack_delta_composes_linearly() {
		for value in 0..=255u8 {
			let properties = OpCode(value).properties();
			if !properties.valid {
				continue;
			}
			let delta = properties.stack_delta();
			for k in 0..5isize {
				assert_eq!(delta * k, (0..k).map(|_| delta).sum::<isize>());
			}
		}
	}

	#[test]
	fn log_gas_scales_with_topic_count() {
		assert_eq!(OpCode::LOG0.properties().gas, 375);
		assert_eq!(OpCode::LOG4.properties().gas, 1875);
	}
}
