//! Reference semantics of one interpreter step, expressed directly over
//! the conformance-test [`State`]. This is a separate implementation
//! from the engines; the differential driver holds the two against each
//! other.

use std::cmp::min;

use primitive_types::{H160, H256, U256};
use sha3::{Digest, Keccak256};

use tosca_interpreter::analysis::find_jump_destinations;
use tosca_interpreter::gas::{
	self, CALL_NEW_ACCOUNT_GAS, CALL_STIPEND, CALL_VALUE_TRANSFER_GAS, COLD_ACCOUNT_ACCESS_COST,
	COLD_SLOAD_COST, COPY_WORD_GAS, INIT_CODE_WORD_GAS, KECCAK_WORD_GAS, LOG_DATA_GAS,
	MAX_INIT_CODE_SIZE, SELFDESTRUCT_REFUND_GAS, SSTORE_SENTRY_GAS, WARM_STORAGE_READ_COST,
};
use tosca_interpreter::memory::{memory_cost, size_in_words, MAX_MEMORY_EXPANSION_SIZE};
use tosca_interpreter::uint;
use tosca_interpreter::{Gas, OpCode, Revision, Status, STACK_LIMIT};

use crate::state::{CtLog, PlannedCall, State};
use crate::ser;

/// Terminate the state with a fault: failed, all gas gone.
pub fn fail(state: &mut State) {
	state.status = Status::Failed;
	state.gas = 0;
	state.gas_refund = 0;
}

/// The deterministic stand-in for recent block hashes used on both
/// sides of the differential comparison.
#[must_use]
pub fn block_hash_stub(number: u64) -> H256 {
	H256::from_slice(&Keccak256::digest(number.to_be_bytes()))
}

fn use_gas(state: &mut State, cost: Gas) -> bool {
	if cost < 0 || state.gas < cost {
		fail(state);
		return false;
	}
	state.gas -= cost;
	true
}

/// Mirror of the frame memory's metered growth.
fn expand_memory(state: &mut State, offset: U256, size: U256) -> bool {
	if size.is_zero() {
		return true;
	}
	let limit = U256::from(MAX_MEMORY_EXPANSION_SIZE);
	if offset > limit || size > limit {
		fail(state);
		return false;
	}
	let end = offset.as_u64() + size.as_u64();
	if end > MAX_MEMORY_EXPANSION_SIZE {
		fail(state);
		return false;
	}
	let current_words = size_in_words(state.memory.len() as u64);
	let new_words = size_in_words(end);
	if new_words > current_words {
		let cost = memory_cost(new_words) - memory_cost(current_words);
		if !use_gas(state, cost) {
			return false;
		}
		state.memory.resize((new_words * 32) as usize, 0);
	}
	true
}

fn read_padded(source: &[u8], offset: U256, len: usize) -> Vec<u8> {
	let mut out = vec![0u8; len];
	if offset <= U256::from(usize::MAX as u64) {
		let offset = offset.as_u64() as usize;
		if offset < source.len() {
			let available = min(len, source.len() - offset);
			out[..available].copy_from_slice(&source[offset..offset + available]);
		}
	}
	out
}

fn memory_read(state: &State, offset: U256, len: U256) -> Vec<u8> {
	if len.is_zero() {
		return Vec::new();
	}
	state.memory[offset.as_u64() as usize..(offset.as_u64() + len.as_u64()) as usize].to_vec()
}

fn account_code<'a>(state: &'a State, address: &H160) -> Option<&'a [u8]> {
	state
		.accounts
		.get(address)
		.map(|account| account.code.as_slice())
}

fn account_access_cost(state: &mut State, address: H160) -> Gas {
	if state.revision < Revision::Berlin {
		return 0;
	}
	if state.warm_accounts.insert(address) {
		COLD_ACCOUNT_ACCESS_COST
	} else {
		WARM_STORAGE_READ_COST
	}
}

fn pop_planned_call(state: &mut State) -> Option<PlannedCall> {
	if state.future_call_results.is_empty() {
		None
	} else {
		Some(state.future_call_results.remove(0))
	}
}

/// Execute one full step of the instruction under the program counter.
pub fn apply_op(state: &mut State) {
	if state.status != Status::Running {
		return;
	}
	if state.pc as usize >= state.code.len() {
		state.status = Status::Stopped;
		return;
	}
	let op = OpCode(state.code[state.pc as usize]);
	let properties = op.properties();
	if !properties.valid || state.revision < properties.min_revision {
		fail(state);
		return;
	}
	if state.stack.len() < properties.pops {
		fail(state);
		return;
	}
	if state.stack.len() - properties.pops + properties.pushes > STACK_LIMIT {
		fail(state);
		return;
	}
	if !use_gas(state, op.static_gas(state.revision)) {
		return;
	}

	run_op(state, op);
}

fn binary(state: &mut State, f: impl Fn(U256, U256) -> U256) {
	let a = state.stack_pop();
	let b = state.stack_pop();
	state.stack_push(f(a, b));
	state.pc += 1;
}

fn compare(state: &mut State, f: impl Fn(U256, U256) -> bool) {
	binary(state, |a, b| if f(a, b) { U256::one() } else { U256::zero() });
}

#[allow(clippy::too_many_lines)]
fn run_op(state: &mut State, op: OpCode) {
	use OpCode as Op;

	if let Some(data_len) = op.push_data_len() {
		let value = tosca_interpreter::code::decode_push(&state.code, state.pc as usize, data_len);
		state.stack_push(value);
		state.pc += 1 + data_len as u64;
		return;
	}
	if let Some(depth) = op.dup_depth() {
		let value = state.stack_get(depth - 1).unwrap_or_default();
		state.stack_push(value);
		state.pc += 1;
		return;
	}
	if let Some(depth) = op.swap_depth() {
		let len = state.stack.len();
		state.stack.swap(len - 1, len - depth - 1);
		state.pc += 1;
		return;
	}
	if op.log_topic_count().is_some() {
		return run_log(state, op);
	}

	match op {
		Op::STOP => state.status = Status::Stopped,
		Op::ADD => binary(state, |a, b| a.overflowing_add(b).0),
		Op::MUL => binary(state, |a, b| a.overflowing_mul(b).0),
		Op::SUB => binary(state, |a, b| a.overflowing_sub(b).0),
		Op::DIV => binary(state, |a, b| if b.is_zero() { U256::zero() } else { a / b }),
		Op::SDIV => binary(state, uint::sdiv),
		Op::MOD => binary(state, |a, b| if b.is_zero() { U256::zero() } else { a % b }),
		Op::SMOD => binary(state, uint::smod),
		Op::ADDMOD => {
			let (a, b, m) = (state.stack_pop(), state.stack_pop(), state.stack_pop());
			let result = if m.is_zero() {
				U256::zero()
			} else {
				let wide = primitive_types::U512::from(a) + primitive_types::U512::from(b);
				U256::try_from(wide % primitive_types::U512::from(m)).expect("mod fits")
			};
			state.stack_push(result);
			state.pc += 1;
		}
		Op::MULMOD => {
			let (a, b, m) = (state.stack_pop(), state.stack_pop(), state.stack_pop());
			let result = if m.is_zero() {
				U256::zero()
			} else {
				let wide = primitive_types::U512::from(a) * primitive_types::U512::from(b);
				U256::try_from(wide % primitive_types::U512::from(m)).expect("mod fits")
			};
			state.stack_push(result);
			state.pc += 1;
		}
		Op::EXP => {
			let base = state.stack_pop();
			let exponent = state.stack_pop();
			let exponent_bytes = (exponent.bits() + 7) / 8;
			if !use_gas(state, 50 * exponent_bytes as Gas) {
				return;
			}
			state.stack_push(base.overflowing_pow(exponent).0);
			state.pc += 1;
		}
		Op::SIGNEXTEND => binary(state, uint::sign_extend),
		Op::LT => compare(state, |a, b| a < b),
		Op::GT => compare(state, |a, b| a > b),
		Op::SLT => compare(state, uint::slt),
		Op::SGT => compare(state, uint::sgt),
		Op::EQ => compare(state, |a, b| a == b),
		Op::ISZERO => {
			let value = state.stack_pop();
			state.stack_push(if value.is_zero() { U256::one() } else { U256::zero() });
			state.pc += 1;
		}
		Op::AND => binary(state, |a, b| a & b),
		Op::OR => binary(state, |a, b| a | b),
		Op::XOR => binary(state, |a, b| a ^ b),
		Op::NOT => {
			let value = state.stack_pop();
			state.stack_push(!value);
			state.pc += 1;
		}
		Op::BYTE => binary(state, |index, value| {
			if index >= U256::from(32u64) {
				U256::zero()
			} else {
				U256::from(value.byte(31 - index.as_u64() as usize))
			}
		}),
		Op::SHL => binary(state, |shift, value| {
			if shift >= U256::from(256u64) {
				U256::zero()
			} else {
				value << shift.as_u64() as usize
			}
		}),
		Op::SHR => binary(state, |shift, value| {
			if shift >= U256::from(256u64) {
				U256::zero()
			} else {
				value >> shift.as_u64() as usize
			}
		}),
		Op::SAR => binary(state, uint::sar),
		Op::SHA3 => {
			let offset = state.stack_pop();
			let len = state.stack_pop();
			if !expand_memory(state, offset, len) {
				return;
			}
			if !use_gas(state, KECCAK_WORD_GAS * size_in_words(len.as_u64()) as Gas) {
				return;
			}
			let data = memory_read(state, offset, len);
			state.stack_push(U256::from_big_endian(&Keccak256::digest(&data)));
			state.pc += 1;
		}
		Op::ADDRESS => push_value(state, uint::h160_to_u256(state.call_context.account_address)),
		Op::ORIGIN => push_value(state, uint::h160_to_u256(state.transaction.origin)),
		Op::CALLER => push_value(state, uint::h160_to_u256(state.call_context.caller_address)),
		Op::CALLVALUE => push_value(state, state.call_context.value),
		Op::GASPRICE => push_value(state, state.transaction.gas_price),
		Op::BALANCE => {
			let address = uint::u256_to_h160(state.stack_pop());
			let cost = account_access_cost(state, address);
			if !use_gas(state, cost) {
				return;
			}
			let balance = state
				.accounts
				.get(&address)
				.map(|account| account.balance)
				.unwrap_or_default();
			state.stack_push(balance);
			state.pc += 1;
		}
		Op::SELFBALANCE => {
			let balance = state
				.accounts
				.get(&state.call_context.account_address)
				.map(|account| account.balance)
				.unwrap_or_default();
			push_value(state, balance);
		}
		Op::EXTCODESIZE => {
			let address = uint::u256_to_h160(state.stack_pop());
			let cost = account_access_cost(state, address);
			if !use_gas(state, cost) {
				return;
			}
			let size = account_code(state, &address).map_or(0, <[u8]>::len);
			state.stack_push(U256::from(size as u64));
			state.pc += 1;
		}
		Op::EXTCODEHASH => {
			let address = uint::u256_to_h160(state.stack_pop());
			let cost = account_access_cost(state, address);
			if !use_gas(state, cost) {
				return;
			}
			let hash = match account_code(state, &address) {
				Some(code) => U256::from_big_endian(&Keccak256::digest(code)),
				None => U256::zero(),
			};
			state.stack_push(hash);
			state.pc += 1;
		}
		Op::EXTCODECOPY => {
			let address = uint::u256_to_h160(state.stack_pop());
			let memory_offset = state.stack_pop();
			let code_offset = state.stack_pop();
			let len = state.stack_pop();
			let cost = account_access_cost(state, address);
			if !use_gas(state, cost) {
				return;
			}
			if !len.is_zero() {
				if !expand_memory(state, memory_offset, len) {
					return;
				}
				if !use_gas(state, COPY_WORD_GAS * size_in_words(len.as_u64()) as Gas) {
					return;
				}
				let code = account_code(state, &address).unwrap_or(&[]).to_vec();
				let data = read_padded(&code, code_offset, len.as_u64() as usize);
				let start = memory_offset.as_u64() as usize;
				state.memory[start..start + data.len()].copy_from_slice(&data);
			}
			state.pc += 1;
		}
		Op::CALLDATALOAD => {
			let offset = state.stack_pop();
			let word = read_padded(&state.call_data, offset, 32);
			state.stack_push(U256::from_big_endian(&word));
			state.pc += 1;
		}
		Op::CALLDATASIZE => push_value(state, U256::from(state.call_data.len() as u64)),
		Op::CALLDATACOPY => copy_op(state, CopySource::CallData),
		Op::CODESIZE => push_value(state, U256::from(state.code.len() as u64)),
		Op::CODECOPY => copy_op(state, CopySource::Code),
		Op::RETURNDATASIZE => push_value(state, U256::from(state.last_call_return.len() as u64)),
		Op::RETURNDATACOPY => {
			let data_offset = state.stack_get(1).unwrap_or_default();
			let len = state.stack_get(2).unwrap_or_default();
			match data_offset.checked_add(len) {
				Some(end) if end <= U256::from(state.last_call_return.len() as u64) => {
					copy_op(state, CopySource::ReturnData);
				}
				_ => {
					// Reads past the return buffer fault instead of padding.
					fail(state);
				}
			}
		}
		Op::BLOCKHASH => {
			let number = state.stack_pop();
			let current = state.block.number;
			let result = if number < U256::from(current)
				&& number + U256::from(256u64) >= U256::from(current)
			{
				U256::from_big_endian(block_hash_stub(number.as_u64()).as_bytes())
			} else {
				U256::zero()
			};
			state.stack_push(result);
			state.pc += 1;
		}
		Op::COINBASE => push_value(state, uint::h160_to_u256(state.block.coinbase)),
		Op::TIMESTAMP => push_value(state, U256::from(state.block.timestamp)),
		Op::NUMBER => push_value(state, U256::from(state.block.number)),
		Op::PREVRANDAO => push_value(state, uint::h256_to_u256(state.block.prev_randao)),
		Op::GASLIMIT => push_value(state, U256::from(state.block.gas_limit as u64)),
		Op::CHAINID => push_value(state, state.block.chain_id),
		Op::BASEFEE => push_value(state, state.block.base_fee),
		Op::BLOBBASEFEE => push_value(state, state.block.blob_base_fee),
		Op::BLOBHASH => {
			let index = state.stack_pop();
			let hashes = state.transaction_parameters().blob_hashes;
			let result = if index < U256::from(hashes.len() as u64) {
				uint::h256_to_u256(hashes[index.as_u64() as usize])
			} else {
				U256::zero()
			};
			state.stack_push(result);
			state.pc += 1;
		}
		Op::POP => {
			state.stack_pop();
			state.pc += 1;
		}
		Op::PUSH0 => push_value(state, U256::zero()),
		Op::MLOAD => {
			let offset = state.stack_pop();
			if !expand_memory(state, offset, U256::from(32u64)) {
				return;
			}
			let word = memory_read(state, offset, U256::from(32u64));
			state.stack_push(U256::from_big_endian(&word));
			state.pc += 1;
		}
		Op::MSTORE => {
			let offset = state.stack_pop();
			let value = state.stack_pop();
			if !expand_memory(state, offset, U256::from(32u64)) {
				return;
			}
			let start = offset.as_u64() as usize;
			state.memory[start..start + 32].copy_from_slice(ser::u256_to_word(value).as_bytes());
			state.pc += 1;
		}
		Op::MSTORE8 => {
			let offset = state.stack_pop();
			let value = state.stack_pop();
			if !expand_memory(state, offset, U256::one()) {
				return;
			}
			state.memory[offset.as_u64() as usize] = value.byte(0);
			state.pc += 1;
		}
		Op::MSIZE => push_value(state, U256::from(state.memory.len() as u64)),
		Op::MCOPY => {
			let dst = state.stack_pop();
			let src = state.stack_pop();
			let len = state.stack_pop();
			if !len.is_zero() {
				if !expand_memory(state, dst.max(src), len) {
					return;
				}
				if !use_gas(state, COPY_WORD_GAS * size_in_words(len.as_u64()) as Gas) {
					return;
				}
				let start = src.as_u64() as usize;
				let data = state.memory[start..start + len.as_u64() as usize].to_vec();
				let dst = dst.as_u64() as usize;
				state.memory[dst..dst + data.len()].copy_from_slice(&data);
			}
			state.pc += 1;
		}
		Op::SLOAD => {
			let key = state.stack_pop();
			if state.revision >= Revision::Berlin {
				let cost = if state.storage.is_warm(key) {
					WARM_STORAGE_READ_COST
				} else {
					COLD_SLOAD_COST
				};
				state.storage.mark_warm(key);
				if !use_gas(state, cost) {
					return;
				}
			}
			let value = state.storage.get_current(key);
			state.stack_push(value);
			state.pc += 1;
		}
		Op::SSTORE => run_sstore(state),
		Op::TLOAD => {
			let key = state.stack_pop();
			let value = state.transient.get(&key).copied().unwrap_or_default();
			state.stack_push(value);
			state.pc += 1;
		}
		Op::TSTORE => {
			if state.call_context.is_static {
				return fail(state);
			}
			let key = state.stack_pop();
			let value = state.stack_pop();
			if value.is_zero() {
				state.transient.remove(&key);
			} else {
				state.transient.insert(key, value);
			}
			state.pc += 1;
		}
		Op::JUMP => {
			let target = state.stack_pop();
			jump_to(state, target);
		}
		Op::JUMPI => {
			let target = state.stack_pop();
			let condition = state.stack_pop();
			if condition.is_zero() {
				state.pc += 1;
			} else {
				jump_to(state, target);
			}
		}
		Op::JUMPDEST => state.pc += 1,
		Op::PC => push_value(state, U256::from(state.pc)),
		Op::GAS => push_value(state, U256::from(state.gas as u64)),
		Op::RETURN => {
			let offset = state.stack_pop();
			let len = state.stack_pop();
			if !expand_memory(state, offset, len) {
				return;
			}
			state.return_data = memory_read(state, offset, len);
			state.status = Status::Returned;
		}
		Op::REVERT => {
			let offset = state.stack_pop();
			let len = state.stack_pop();
			if !expand_memory(state, offset, len) {
				return;
			}
			state.return_data = memory_read(state, offset, len);
			state.status = Status::Reverted;
		}
		Op::SELFDESTRUCT => run_selfdestruct(state),
		Op::CALL | Op::CALLCODE | Op::DELEGATECALL | Op::STATICCALL => run_call(state, op),
		Op::CREATE | Op::CREATE2 => run_create(state, op),
		_ => fail(state),
	}
}

fn push_value(state: &mut State, value: U256) {
	state.stack_push(value);
	state.pc += 1;
}

enum CopySource {
	CallData,
	Code,
	ReturnData,
}

fn copy_op(state: &mut State, source: CopySource) {
	let memory_offset = state.stack_pop();
	let data_offset = state.stack_pop();
	let len = state.stack_pop();
	if !len.is_zero() {
		if !expand_memory(state, memory_offset, len) {
			return;
		}
		if !use_gas(state, COPY_WORD_GAS * size_in_words(len.as_u64()) as Gas) {
			return;
		}
		let data = match source {
			CopySource::CallData => read_padded(&state.call_data, data_offset, len.as_u64() as usize),
			CopySource::Code => read_padded(&state.code, data_offset, len.as_u64() as usize),
			CopySource::ReturnData => {
				read_padded(&state.last_call_return, data_offset, len.as_u64() as usize)
			}
		};
		let start = memory_offset.as_u64() as usize;
		state.memory[start..start + data.len()].copy_from_slice(&data);
	}
	state.pc += 1;
}

fn jump_to(state: &mut State, target: U256) {
	if target > U256::from(usize::MAX as u64) {
		return fail(state);
	}
	let jumpdests = find_jump_destinations(&state.code);
	let target = target.as_u64() as usize;
	if target >= state.code.len() || !jumpdests.is_jump_dest(target) {
		return fail(state);
	}
	state.pc = target as u64;
}

fn run_log(state: &mut State, op: OpCode) {
	if state.call_context.is_static {
		return fail(state);
	}
	let topic_count = op.log_topic_count().unwrap_or_default();
	let offset = state.stack_pop();
	let len = state.stack_pop();
	let mut topics = Vec::with_capacity(topic_count);
	for _ in 0..topic_count {
		topics.push(ser::format_bytes(
			ser::u256_to_word(state.stack_pop()).as_bytes(),
		));
	}
	if !expand_memory(state, offset, len) {
		return;
	}
	if !use_gas(state, LOG_DATA_GAS * len.as_u64() as Gas) {
		return;
	}
	let data = memory_read(state, offset, len);
	state.logs.push(CtLog {
		address: state.call_context.account_address,
		topics,
		data,
	});
	state.pc += 1;
}

fn run_sstore(state: &mut State) {
	if state.call_context.is_static {
		return fail(state);
	}
	if state.gas <= SSTORE_SENTRY_GAS {
		return fail(state);
	}
	let key = state.stack_pop();
	let value = state.stack_pop();

	let mut cost = 0;
	if state.revision >= Revision::Berlin && !state.storage.is_warm(key) {
		cost += COLD_SLOAD_COST;
	}
	state.storage.mark_warm(key);

	let status = state.storage.classify(key, value);
	cost += gas::sstore_dynamic_gas(state.revision, status);
	if !use_gas(state, cost) {
		return;
	}
	state.gas_refund += gas::sstore_refund(state.revision, status);
	state.storage.set_current(key, value);
	state.pc += 1;
}

fn run_selfdestruct(state: &mut State) {
	if state.call_context.is_static {
		return fail(state);
	}
	let beneficiary = uint::u256_to_h160(state.stack_pop());
	let own = state.call_context.account_address;

	if state.revision >= Revision::Berlin && state.warm_accounts.insert(beneficiary) {
		if !use_gas(state, COLD_ACCOUNT_ACCESS_COST) {
			return;
		}
	}
	let own_balance = state
		.accounts
		.get(&own)
		.map(|account| account.balance)
		.unwrap_or_default();
	if !state.accounts.contains_key(&beneficiary) && !own_balance.is_zero() {
		if !use_gas(state, CALL_NEW_ACCOUNT_GAS) {
			return;
		}
	}

	// Balance moves immediately; from Cancun the destroyed account is
	// always emptied, even when it pays itself.
	if state.revision >= Revision::Cancun {
		state.accounts.entry(own).or_default().balance = U256::zero();
	}
	if beneficiary != own {
		let account = state.accounts.entry(beneficiary).or_default();
		account.balance = account.balance.saturating_add(own_balance);
	}
	if state.revision < Revision::London {
		state.gas_refund += SELFDESTRUCT_REFUND_GAS;
	}
	state.status = Status::SelfDestructed;
}

fn run_call(state: &mut State, op: OpCode) {
	use OpCode as Op;
	let gas_limit = state.stack_pop();
	let address = uint::u256_to_h160(state.stack_pop());
	let value = if op == Op::CALL || op == Op::CALLCODE {
		state.stack_pop()
	} else {
		U256::zero()
	};
	let in_offset = state.stack_pop();
	let in_len = state.stack_pop();
	let out_offset = state.stack_pop();
	let out_len = state.stack_pop();

	if state.call_context.is_static && op == Op::CALL && !value.is_zero() {
		return fail(state);
	}
	if !expand_memory(state, in_offset, in_len) {
		return;
	}
	if !expand_memory(state, out_offset, out_len) {
		return;
	}
	let access = account_access_cost(state, address);
	if !use_gas(state, access) {
		return;
	}
	if !value.is_zero() && (op == Op::CALL || op == Op::CALLCODE) {
		if !use_gas(state, CALL_VALUE_TRANSFER_GAS) {
			return;
		}
		if op == Op::CALL && !state.accounts.contains_key(&address) {
			if !use_gas(state, CALL_NEW_ACCOUNT_GAS) {
				return;
			}
		}
	}

	let cap = gas::callable_gas(state.gas);
	let mut forwarded = if gas_limit > U256::from(i64::MAX as u64) {
		cap
	} else {
		min(gas_limit.as_u64() as Gas, cap)
	};
	if !use_gas(state, forwarded) {
		return;
	}
	if !value.is_zero() && (op == Op::CALL || op == Op::CALLCODE) {
		forwarded += CALL_STIPEND;
	}

	let planned = pop_planned_call(state);
	let (success, output, gas_left, gas_refund) = match planned {
		Some(call) => (
			call.success,
			call.output,
			forwarded - min(forwarded, call.gas_consumed.max(0)),
			call.gas_refund,
		),
		None => (false, Vec::new(), 0, 0),
	};

	if !out_len.is_zero() && !output.is_empty() {
		let copied = min(out_len.as_u64() as usize, output.len());
		let start = out_offset.as_u64() as usize;
		state.memory[start..start + copied].copy_from_slice(&output[..copied]);
	}
	state.last_call_return = output;
	state.gas += gas_left;
	state.gas_refund += gas_refund;
	state.stack_push(if success { U256::one() } else { U256::zero() });
	state.pc += 1;
}

fn run_create(state: &mut State, op: OpCode) {
	if state.call_context.is_static {
		return fail(state);
	}
	let _value = state.stack_pop();
	let offset = state.stack_pop();
	let len = state.stack_pop();
	if op == OpCode::CREATE2 {
		state.stack_pop();
	}

	if !expand_memory(state, offset, len) {
		return;
	}
	let init_len = len.as_u64() as usize;
	if state.revision >= Revision::Shanghai {
		if init_len > MAX_INIT_CODE_SIZE {
			return fail(state);
		}
		if !use_gas(state, INIT_CODE_WORD_GAS * size_in_words(init_len as u64) as Gas) {
			return;
		}
	}
	if op == OpCode::CREATE2 {
		if !use_gas(state, KECCAK_WORD_GAS * size_in_words(init_len as u64) as Gas) {
			return;
		}
	}

	let forwarded = gas::callable_gas(state.gas);
	if !use_gas(state, forwarded) {
		return;
	}

	let planned = pop_planned_call(state);
	let (success, output, gas_left, gas_refund, created) = match planned {
		Some(call) => (
			call.success,
			call.output,
			forwarded - min(forwarded, call.gas_consumed.max(0)),
			call.gas_refund,
			call.created_address,
		),
		None => (false, Vec::new(), 0, 0, H160::zero()),
	};

	state.gas += gas_left;
	state.gas_refund += gas_refund;
	if success {
		state.last_call_return = Vec::new();
		state.stack_push(uint::h160_to_u256(created));
	} else {
		state.last_call_return = output;
		state.stack_push(U256::zero());
	}
	state.pc += 1;
}
