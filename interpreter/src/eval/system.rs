use core::cmp::min;

use primitive_types::{H160, H256, U256};

use crate::error::Fault;
use crate::frame::Frame;
use crate::gas::{
	self, CALL_NEW_ACCOUNT_GAS, CALL_STIPEND, CALL_VALUE_TRANSFER_GAS, COLD_ACCOUNT_ACCESS_COST,
	COLD_SLOAD_COST, INIT_CODE_WORD_GAS, KECCAK_WORD_GAS, LOG_DATA_GAS, MAX_INIT_CODE_SIZE,
	SELFDESTRUCT_REFUND_GAS, SSTORE_SENTRY_GAS, WARM_STORAGE_READ_COST,
};
use crate::memory::size_in_words;
use crate::opcode::OpCode;
use crate::revision::Revision;
use crate::runtime::{RunContext, TransactionContext, WorldState};
use crate::types::{CallKind, CallParameters, Log, Status};
use crate::uint::{h160_to_u256, h256_to_u256, u256_to_h160, u256_to_h256};

use super::misc::read_padded;

/// Charge the EIP-2929 account-access surcharge and mark the account warm.
fn charge_account_access(
	frame: &mut Frame,
	context: &mut dyn RunContext,
	address: H160,
) -> Result<(), Fault> {
	if frame.revision() < Revision::Berlin {
		return Ok(());
	}
	let cost = if context.is_account_warm(address) {
		WARM_STORAGE_READ_COST
	} else {
		COLD_ACCOUNT_ACCESS_COST
	};
	context.access_account(address);
	frame.use_gas(cost)
}

pub fn address(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	push!(frame, h160_to_u256(frame.recipient));
	frame.pc += 1;
	Ok(())
}

pub fn origin(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	push!(frame, h160_to_u256(frame.transaction.origin));
	frame.pc += 1;
	Ok(())
}

pub fn caller(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	push!(frame, h160_to_u256(frame.sender));
	frame.pc += 1;
	Ok(())
}

pub fn callvalue(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	push!(frame, frame.value);
	frame.pc += 1;
	Ok(())
}

pub fn gasprice(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	push!(frame, frame.transaction.gas_price);
	frame.pc += 1;
	Ok(())
}

pub fn balance(frame: &mut Frame, context: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, address);
	let address = u256_to_h160(address);
	charge_account_access(frame, context, address)?;
	push!(frame, context.balance(address));
	frame.pc += 1;
	Ok(())
}

pub fn selfbalance(frame: &mut Frame, context: &mut dyn RunContext) -> Result<(), Fault> {
	push!(frame, context.balance(frame.recipient));
	frame.pc += 1;
	Ok(())
}

pub fn extcodesize(frame: &mut Frame, context: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, address);
	let address = u256_to_h160(address);
	charge_account_access(frame, context, address)?;
	push!(frame, U256::from(context.code_size(address) as u64));
	frame.pc += 1;
	Ok(())
}

pub fn extcodehash(frame: &mut Frame, context: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, address);
	let address = u256_to_h160(address);
	charge_account_access(frame, context, address)?;
	push!(frame, h256_to_u256(context.code_hash(address)));
	frame.pc += 1;
	Ok(())
}

pub fn extcodecopy(frame: &mut Frame, context: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, address, memory_offset, code_offset, len);
	let address = u256_to_h160(address);
	charge_account_access(frame, context, address)?;
	if !len.is_zero() {
		frame
			.memory
			.expand(memory_offset, len, &mut frame.gas)?;
		frame.use_gas(super::misc::copy_gas(len.as_u64()))?;
		let code = context.code(address);
		let data = read_padded(&code, code_offset, len.as_u64() as usize);
		frame.memory.write(memory_offset.as_u64() as usize, &data);
	}
	frame.pc += 1;
	Ok(())
}

pub fn blockhash(frame: &mut Frame, context: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, number);
	let current = frame.block.number;
	let result = if number < U256::from(current)
		&& number + U256::from(256u64) >= U256::from(current)
	{
		h256_to_u256(context.block_hash(number.as_u64()))
	} else {
		U256::zero()
	};
	push!(frame, result);
	frame.pc += 1;
	Ok(())
}

pub fn coinbase(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	push!(frame, h160_to_u256(frame.block.coinbase));
	frame.pc += 1;
	Ok(())
}

pub fn timestamp(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	push!(frame, U256::from(frame.block.timestamp));
	frame.pc += 1;
	Ok(())
}

pub fn number(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	push!(frame, U256::from(frame.block.number));
	frame.pc += 1;
	Ok(())
}

pub fn prevrandao(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	push!(frame, h256_to_u256(frame.block.prev_randao));
	frame.pc += 1;
	Ok(())
}

pub fn gaslimit(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	push!(frame, U256::from(frame.block.gas_limit as u64));
	frame.pc += 1;
	Ok(())
}

pub fn chainid(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	push!(frame, frame.block.chain_id);
	frame.pc += 1;
	Ok(())
}

pub fn basefee(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	push!(frame, frame.block.base_fee);
	frame.pc += 1;
	Ok(())
}

pub fn blobbasefee(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	push!(frame, frame.block.blob_base_fee);
	frame.pc += 1;
	Ok(())
}

pub fn blobhash(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, index);
	let hashes = &frame.transaction.blob_hashes;
	let result = if index < U256::from(hashes.len() as u64) {
		h256_to_u256(hashes[index.as_u64() as usize])
	} else {
		U256::zero()
	};
	push!(frame, result);
	frame.pc += 1;
	Ok(())
}

pub fn sload(frame: &mut Frame, context: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, key);
	let key = u256_to_h256(key);
	if frame.revision() >= Revision::Berlin {
		let cost = if context.is_slot_warm(frame.recipient, key) {
			WARM_STORAGE_READ_COST
		} else {
			COLD_SLOAD_COST
		};
		context.access_storage(frame.recipient, key);
		frame.use_gas(cost)?;
	}
	push!(frame, h256_to_u256(context.storage(frame.recipient, key)));
	frame.pc += 1;
	Ok(())
}

pub fn sstore(frame: &mut Frame, context: &mut dyn RunContext) -> Result<(), Fault> {
	if frame.is_static {
		return Err(Fault::WriteProtection);
	}
	// EIP-2200: refuse to run on a nearly-empty gas tank.
	if frame.gas <= SSTORE_SENTRY_GAS {
		return Err(Fault::OutOfGas);
	}
	pop!(frame, key, value);
	let key = u256_to_h256(key);
	let value = u256_to_h256(value);

	let mut cost = 0;
	if frame.revision() >= Revision::Berlin && !context.is_slot_warm(frame.recipient, key) {
		cost += COLD_SLOAD_COST;
	}
	context.access_storage(frame.recipient, key);

	let status = context.set_storage(frame.recipient, key, value);
	cost += gas::sstore_dynamic_gas(frame.revision(), status);
	frame.use_gas(cost)?;
	frame.gas_refund += gas::sstore_refund(frame.revision(), status);
	frame.pc += 1;
	Ok(())
}

pub fn tload(frame: &mut Frame, context: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, key);
	let key = u256_to_h256(key);
	push!(
		frame,
		h256_to_u256(context.transient_storage(frame.recipient, key))
	);
	frame.pc += 1;
	Ok(())
}

pub fn tstore(frame: &mut Frame, context: &mut dyn RunContext) -> Result<(), Fault> {
	if frame.is_static {
		return Err(Fault::WriteProtection);
	}
	pop!(frame, key, value);
	context.set_transient_storage(frame.recipient, u256_to_h256(key), u256_to_h256(value));
	frame.pc += 1;
	Ok(())
}

pub fn log(frame: &mut Frame, context: &mut dyn RunContext) -> Result<(), Fault> {
	if frame.is_static {
		return Err(Fault::WriteProtection);
	}
	let op = frame.code.opcode_at(frame.pc);
	let topic_count = op.log_topic_count().expect("dispatched for LOG only");
	pop!(frame, offset, len);
	let mut topics = Vec::with_capacity(topic_count);
	for _ in 0..topic_count {
		topics.push(u256_to_h256(frame.stack.pop()?));
	}
	frame.memory.expand(offset, len, &mut frame.gas)?;
	frame.use_gas(LOG_DATA_GAS * len.as_u64() as i64)?;
	let data = if len.is_zero() {
		Vec::new()
	} else {
		frame
			.memory
			.read(offset.as_u64() as usize, len.as_u64() as usize)
			.to_vec()
	};
	context.emit_log(Log {
		address: frame.recipient,
		topics,
		data,
	});
	frame.pc += 1;
	Ok(())
}

pub fn selfdestruct(frame: &mut Frame, context: &mut dyn RunContext) -> Result<(), Fault> {
	if frame.is_static {
		return Err(Fault::WriteProtection);
	}
	pop!(frame, beneficiary);
	let beneficiary = u256_to_h160(beneficiary);

	if frame.revision() >= Revision::Berlin && !context.is_account_warm(beneficiary) {
		context.access_account(beneficiary);
		frame.use_gas(COLD_ACCOUNT_ACCESS_COST)?;
	}
	if !context.account_exists(beneficiary) && !context.balance(frame.recipient).is_zero() {
		frame.use_gas(CALL_NEW_ACCOUNT_GAS)?;
	}

	let first = context.self_destruct(frame.recipient, beneficiary);
	if first && frame.revision() < Revision::London {
		frame.gas_refund += SELFDESTRUCT_REFUND_GAS;
	}
	frame.status = Status::SelfDestructed;
	Ok(())
}

pub fn call(frame: &mut Frame, context: &mut dyn RunContext) -> Result<(), Fault> {
	let op = frame.code.opcode_at(frame.pc);

	pop!(frame, gas_limit, address);
	let address = u256_to_h160(address);
	let value = if op == OpCode::CALL || op == OpCode::CALLCODE {
		frame.stack.pop()?
	} else {
		U256::zero()
	};
	pop!(frame, in_offset, in_len, out_offset, out_len);

	if frame.is_static && op == OpCode::CALL && !value.is_zero() {
		return Err(Fault::WriteProtection);
	}

	frame.memory.expand(in_offset, in_len, &mut frame.gas)?;
	frame.memory.expand(out_offset, out_len, &mut frame.gas)?;

	charge_account_access(frame, context, address)?;
	if !value.is_zero() && (op == OpCode::CALL || op == OpCode::CALLCODE) {
		frame.use_gas(CALL_VALUE_TRANSFER_GAS)?;
		if op == OpCode::CALL && !context.account_exists(address) {
			frame.use_gas(CALL_NEW_ACCOUNT_GAS)?;
		}
	}

	// Forward at most all-but-one-64th of what is left.
	let cap = gas::callable_gas(frame.gas);
	let mut forwarded = if gas_limit > U256::from(i64::MAX as u64) {
		cap
	} else {
		min(gas_limit.as_u64() as i64, cap)
	};
	frame.use_gas(forwarded)?;
	if !value.is_zero() && (op == OpCode::CALL || op == OpCode::CALLCODE) {
		forwarded += CALL_STIPEND;
	}

	let input = if in_len.is_zero() {
		Vec::new()
	} else {
		frame
			.memory
			.read(in_offset.as_u64() as usize, in_len.as_u64() as usize)
			.to_vec()
	};

	let (kind, parameters) = match op {
		OpCode::CALL => (
			CallKind::Call,
			CallParameters {
				sender: frame.recipient,
				recipient: address,
				code_address: address,
				input,
				value,
				gas: forwarded,
				salt: H256::zero(),
			},
		),
		OpCode::CALLCODE => (
			CallKind::CallCode,
			CallParameters {
				sender: frame.recipient,
				recipient: frame.recipient,
				code_address: address,
				input,
				value,
				gas: forwarded,
				salt: H256::zero(),
			},
		),
		OpCode::DELEGATECALL => (
			CallKind::DelegateCall,
			CallParameters {
				sender: frame.sender,
				recipient: frame.recipient,
				code_address: address,
				input,
				value: frame.value,
				gas: forwarded,
				salt: H256::zero(),
			},
		),
		_ => (
			CallKind::StaticCall,
			CallParameters {
				sender: frame.recipient,
				recipient: address,
				code_address: address,
				input,
				value: U256::zero(),
				gas: forwarded,
				salt: H256::zero(),
			},
		),
	};

	let result = context.call(kind, parameters)?;

	if !out_len.is_zero() && !result.output.is_empty() {
		let copied = min(out_len.as_u64() as usize, result.output.len());
		frame
			.memory
			.write(out_offset.as_u64() as usize, &result.output[..copied]);
	}
	frame.last_call_return = result.output;
	frame.gas += result.gas_left;
	frame.gas_refund += result.gas_refund;
	push!(
		frame,
		if result.success {
			U256::one()
		} else {
			U256::zero()
		}
	);
	frame.pc += 1;
	Ok(())
}

pub fn create(frame: &mut Frame, context: &mut dyn RunContext) -> Result<(), Fault> {
	if frame.is_static {
		return Err(Fault::WriteProtection);
	}
	let op = frame.code.opcode_at(frame.pc);

	pop!(frame, value, offset, len);
	let salt = if op == OpCode::CREATE2 {
		u256_to_h256(frame.stack.pop()?)
	} else {
		H256::zero()
	};

	frame.memory.expand(offset, len, &mut frame.gas)?;
	let init_len = len.as_u64() as usize;
	if frame.revision() >= Revision::Shanghai {
		if init_len > MAX_INIT_CODE_SIZE {
			return Err(Fault::MaxCodeSizeExceeded);
		}
		frame.use_gas(INIT_CODE_WORD_GAS * size_in_words(init_len as u64) as i64)?;
	}
	if op == OpCode::CREATE2 {
		frame.use_gas(KECCAK_WORD_GAS * size_in_words(init_len as u64) as i64)?;
	}

	let forwarded = gas::callable_gas(frame.gas);
	frame.use_gas(forwarded)?;

	let input = if init_len == 0 {
		Vec::new()
	} else {
		frame
			.memory
			.read(offset.as_u64() as usize, init_len)
			.to_vec()
	};

	let kind = if op == OpCode::CREATE2 {
		CallKind::Create2
	} else {
		CallKind::Create
	};
	let result = context.call(
		kind,
		CallParameters {
			sender: frame.recipient,
			recipient: H160::zero(),
			code_address: H160::zero(),
			input,
			value,
			gas: forwarded,
			salt,
		},
	)?;

	frame.gas += result.gas_left;
	frame.gas_refund += result.gas_refund;
	if result.success {
		// Only a reverting create populates the return buffer.
		frame.last_call_return = Vec::new();
		push!(frame, h160_to_u256(result.created_address));
	} else {
		frame.last_call_return = result.output;
		push!(frame, U256::zero());
	}
	frame.pc += 1;
	Ok(())
}
