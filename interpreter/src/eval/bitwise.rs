use primitive_types::U256;

use crate::error::Fault;
use crate::frame::Frame;
use crate::runtime::RunContext;
use crate::uint;

pub fn lt(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	compare_op!(frame, |a: U256, b: U256| a < b)
}

pub fn gt(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	compare_op!(frame, |a: U256, b: U256| a > b)
}

pub fn slt(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	compare_op!(frame, uint::slt)
}

pub fn sgt(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	compare_op!(frame, uint::sgt)
}

pub fn eq(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	compare_op!(frame, |a: U256, b: U256| a == b)
}

pub fn iszero(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, value);
	push!(
		frame,
		if value.is_zero() {
			U256::one()
		} else {
			U256::zero()
		}
	);
	frame.pc += 1;
	Ok(())
}

pub fn and(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	binary_op!(frame, |a: U256, b: U256| a & b)
}

pub fn or(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	binary_op!(frame, |a: U256, b: U256| a | b)
}

pub fn xor(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	binary_op!(frame, |a: U256, b: U256| a ^ b)
}

pub fn not(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, value);
	push!(frame, !value);
	frame.pc += 1;
	Ok(())
}

pub fn byte(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, index, value);
	let result = if index >= U256::from(32u64) {
		U256::zero()
	} else {
		// `U256::byte` indexes from the little end; BYTE from the big end.
		U256::from(value.byte(31 - index.as_u64() as usize))
	};
	push!(frame, result);
	frame.pc += 1;
	Ok(())
}

pub fn shl(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, shift, value);
	let result = if shift >= U256::from(256u64) {
		U256::zero()
	} else {
		value << shift.as_u64() as usize
	};
	push!(frame, result);
	frame.pc += 1;
	Ok(())
}

pub fn shr(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, shift, value);
	let result = if shift >= U256::from(256u64) {
		U256::zero()
	} else {
		value >> shift.as_u64() as usize
	};
	push!(frame, result);
	frame.pc += 1;
	Ok(())
}

pub fn sar(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, shift, value);
	push!(frame, uint::sar(shift, value));
	frame.pc += 1;
	Ok(())
}
