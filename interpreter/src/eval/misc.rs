use core::cmp::min;

use primitive_types::U256;
use sha3::{Digest, Keccak256};

use crate::error::Fault;
use crate::frame::Frame;
use crate::gas::{COPY_WORD_GAS, KECCAK_WORD_GAS};
use crate::memory::size_in_words;
use crate::runtime::RunContext;
use crate::types::Status;

/// Copy `len` bytes of `src` starting at `offset`, zero-padded where the
/// source runs out.
pub(crate) fn read_padded(src: &[u8], offset: U256, len: usize) -> Vec<u8> {
	let mut out = vec![0u8; len];
	if offset <= U256::from(usize::MAX as u64) {
		let offset = offset.as_u64() as usize;
		if offset < src.len() {
			let available = min(len, src.len() - offset);
			out[..available].copy_from_slice(&src[offset..offset + available]);
		}
	}
	out
}

pub(crate) fn copy_gas(len: u64) -> i64 {
	COPY_WORD_GAS * size_in_words(len) as i64
}

pub fn stop(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	frame.status = Status::Stopped;
	Ok(())
}

pub fn pop(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, _value);
	frame.pc += 1;
	Ok(())
}

pub fn push0(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	push!(frame, U256::zero());
	frame.pc += 1;
	Ok(())
}

pub fn push(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	let op = frame.code.opcode_at(frame.pc);
	let data_len = op.push_data_len().expect("dispatched for PUSH only");
	push!(frame, frame.code.push_value(frame.pc, data_len));
	frame.pc += 1 + data_len;
	Ok(())
}

pub fn dup(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	let op = frame.code.opcode_at(frame.pc);
	let depth = op.dup_depth().expect("dispatched for DUP only");
	frame.stack.dup(depth)?;
	frame.pc += 1;
	Ok(())
}

pub fn swap(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	let op = frame.code.opcode_at(frame.pc);
	let depth = op.swap_depth().expect("dispatched for SWAP only");
	frame.stack.swap(depth)?;
	frame.pc += 1;
	Ok(())
}

pub fn mload(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, offset);
	frame.memory.expand(offset, U256::from(32u64), &mut frame.gas)?;
	let word = frame.memory.read_word(offset.as_u64() as usize);
	push!(frame, U256::from_big_endian(&word));
	frame.pc += 1;
	Ok(())
}

pub fn mstore(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, offset, value);
	frame.memory.expand(offset, U256::from(32u64), &mut frame.gas)?;
	let mut bytes = [0u8; 32];
	value.to_big_endian(&mut bytes);
	frame.memory.write(offset.as_u64() as usize, &bytes);
	frame.pc += 1;
	Ok(())
}

pub fn mstore8(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, offset, value);
	frame.memory.expand(offset, U256::one(), &mut frame.gas)?;
	frame
		.memory
		.write_byte(offset.as_u64() as usize, value.byte(0));
	frame.pc += 1;
	Ok(())
}

pub fn msize(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	push!(frame, U256::from(frame.memory.len() as u64));
	frame.pc += 1;
	Ok(())
}

pub fn mcopy(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, dst, src, len);
	if !len.is_zero() {
		// Expanding for the further of the two ranges covers both.
		let far = dst.max(src);
		frame.memory.expand(far, len, &mut frame.gas)?;
		frame.use_gas(copy_gas(len.as_u64()))?;
		frame
			.memory
			.copy_within(src.as_u64() as usize, dst.as_u64() as usize, len.as_u64() as usize);
	}
	frame.pc += 1;
	Ok(())
}

pub fn jump(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, target);
	jump_to(frame, target)
}

pub fn jumpi(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, target, condition);
	if condition.is_zero() {
		frame.pc += 1;
		return Ok(());
	}
	jump_to(frame, target)
}

fn jump_to(frame: &mut Frame, target: U256) -> Result<(), Fault> {
	// The target must fit the code's address space and land on a JUMPDEST.
	if target > U256::from(usize::MAX as u64) {
		return Err(Fault::InvalidJumpDestination);
	}
	let target = target.as_u64() as usize;
	if target >= frame.code.len() || !frame.code.is_jump_dest(target) {
		return Err(Fault::InvalidJumpDestination);
	}
	frame.pc = target;
	Ok(())
}

pub fn jumpdest(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	frame.pc += 1;
	Ok(())
}

pub fn pc(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	push!(frame, U256::from(frame.pc as u64));
	frame.pc += 1;
	Ok(())
}

pub fn gas(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	push!(frame, U256::from(frame.gas as u64));
	frame.pc += 1;
	Ok(())
}

pub fn calldataload(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, offset);
	let word = read_padded(&frame.input, offset, 32);
	push!(frame, U256::from_big_endian(&word));
	frame.pc += 1;
	Ok(())
}

pub fn calldatasize(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	push!(frame, U256::from(frame.input.len() as u64));
	frame.pc += 1;
	Ok(())
}

pub fn calldatacopy(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, memory_offset, data_offset, len);
	copy_to_memory(frame, memory_offset, data_offset, len, CopySource::Input)
}

pub fn codesize(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	push!(frame, U256::from(frame.code.len() as u64));
	frame.pc += 1;
	Ok(())
}

pub fn codecopy(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, memory_offset, code_offset, len);
	copy_to_memory(frame, memory_offset, code_offset, len, CopySource::Code)
}

pub fn returndatasize(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	push!(frame, U256::from(frame.last_call_return.len() as u64));
	frame.pc += 1;
	Ok(())
}

pub fn returndatacopy(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, memory_offset, data_offset, len);
	// Reads past the end of the return buffer are a hard fault rather
	// than zero-padded.
	let end = data_offset
		.checked_add(len)
		.ok_or(Fault::OutOfMemory)?;
	if end > U256::from(frame.last_call_return.len() as u64) {
		return Err(Fault::OutOfMemory);
	}
	copy_to_memory(frame, memory_offset, data_offset, len, CopySource::ReturnData)
}

enum CopySource {
	Input,
	Code,
	ReturnData,
}

fn copy_to_memory(
	frame: &mut Frame,
	memory_offset: U256,
	data_offset: U256,
	len: U256,
	source: CopySource,
) -> Result<(), Fault> {
	if !len.is_zero() {
		frame.memory.expand(memory_offset, len, &mut frame.gas)?;
		frame.use_gas(copy_gas(len.as_u64()))?;
		let data = match source {
			CopySource::Input => read_padded(&frame.input, data_offset, len.as_u64() as usize),
			CopySource::Code => read_padded(frame.code.raw(), data_offset, len.as_u64() as usize),
			CopySource::ReturnData => {
				read_padded(&frame.last_call_return, data_offset, len.as_u64() as usize)
			}
		};
		frame.memory.write(memory_offset.as_u64() as usize, &data);
	}
	frame.pc += 1;
	Ok(())
}

pub fn sha3(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, offset, len);
	frame.memory.expand(offset, len, &mut frame.gas)?;
	frame.use_gas(KECCAK_WORD_GAS * size_in_words(len.as_u64()) as i64)?;
	let data = if len.is_zero() {
		&[][..]
	} else {
		frame
			.memory
			.read(offset.as_u64() as usize, len.as_u64() as usize)
	};
	let hash = Keccak256::digest(data);
	push!(frame, U256::from_big_endian(&hash));
	frame.pc += 1;
	Ok(())
}

pub fn ret(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, offset, len);
	frame.memory.expand(offset, len, &mut frame.gas)?;
	frame.return_data = if len.is_zero() {
		Vec::new()
	} else {
		frame
			.memory
			.read(offset.as_u64() as usize, len.as_u64() as usize)
			.to_vec()
	};
	frame.status = Status::Returned;
	Ok(())
}

pub fn revert(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, offset, len);
	frame.memory.expand(offset, len, &mut frame.gas)?;
	frame.return_data = if len.is_zero() {
		Vec::new()
	} else {
		frame
			.memory
			.read(offset.as_u64() as usize, len.as_u64() as usize)
			.to_vec()
	};
	frame.status = Status::Reverted;
	Ok(())
}
