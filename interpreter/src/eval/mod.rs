//! The step loop and the per-opcode semantic handlers.

#[macro_use]
mod macros;

mod bitwise;
mod misc;
mod system;

use lazy_static::lazy_static;
use primitive_types::{U256, U512};

use crate::error::Fault;
use crate::frame::Frame;
use crate::opcode::OpCode;
use crate::runtime::RunContext;
use crate::stack::STACK_LIMIT;
use crate::types::Status;
use crate::uint;

/// Semantic handler of one opcode. Handlers charge their dynamic costs,
/// mutate the frame and the world, and advance the program counter.
pub type OpFn = fn(&mut Frame, &mut dyn RunContext) -> Result<(), Fault>;

lazy_static! {
	static ref DISPATCH: [OpFn; 256] = core::array::from_fn(|value| handler_for(OpCode(value as u8)));
}

/// Execute a single instruction. Does nothing once the frame has left
/// `Running`.
pub fn step(frame: &mut Frame, context: &mut dyn RunContext) {
	if frame.status != Status::Running {
		return;
	}
	if frame.pc >= frame.code.len() {
		// Running past the end of code is an implicit STOP.
		frame.status = Status::Stopped;
		return;
	}

	let op = frame.code.opcode_at(frame.pc);
	let properties = op.properties();
	if !properties.valid || frame.revision() < properties.min_revision {
		frame.fail(Fault::InvalidInstruction);
		return;
	}
	if frame.stack.len() < properties.pops {
		frame.fail(Fault::StackUnderflow);
		return;
	}
	if frame.stack.len() - properties.pops + properties.pushes > STACK_LIMIT {
		frame.fail(Fault::StackOverflow);
		return;
	}
	if let Err(fault) = frame.use_gas(op.static_gas(frame.revision())) {
		frame.fail(fault);
		return;
	}

	if let Err(fault) = DISPATCH[op.as_usize()](frame, context) {
		frame.fail(fault);
	}
}

/// Run the frame until it terminates.
pub fn run(frame: &mut Frame, context: &mut dyn RunContext) {
	while frame.status == Status::Running {
		step(frame, context);
	}
}

/// Run at most `n` steps; the conformance tester's entry point.
pub fn step_n(frame: &mut Frame, context: &mut dyn RunContext, n: usize) {
	for _ in 0..n {
		if frame.status != Status::Running {
			return;
		}
		step(frame, context);
	}
}

fn handler_for(op: OpCode) -> OpFn {
	if op.push_data_len().is_some() {
		return misc::push;
	}
	if op.dup_depth().is_some() {
		return misc::dup;
	}
	if op.swap_depth().is_some() {
		return misc::swap;
	}
	if op.log_topic_count().is_some() {
		return system::log;
	}
	match op {
		OpCode::STOP => misc::stop,
		OpCode::ADD => add,
		OpCode::MUL => mul,
		OpCode::SUB => sub,
		OpCode::DIV => div,
		OpCode::SDIV => sdiv,
		OpCode::MOD => modulo,
		OpCode::SMOD => smod,
		OpCode::ADDMOD => addmod,
		OpCode::MULMOD => mulmod,
		OpCode::EXP => exp,
		OpCode::SIGNEXTEND => signextend,
		OpCode::LT => bitwise::lt,
		OpCode::GT => bitwise::gt,
		OpCode::SLT => bitwise::slt,
		OpCode::SGT => bitwise::sgt,
		OpCode::EQ => bitwise::eq,
		OpCode::ISZERO => bitwise::iszero,
		OpCode::AND => bitwise::and,
		OpCode::OR => bitwise::or,
		OpCode::XOR => bitwise::xor,
		OpCode::NOT => bitwise::not,
		OpCode::BYTE => bitwise::byte,
		OpCode::SHL => bitwise::shl,
		OpCode::SHR => bitwise::shr,
		OpCode::SAR => bitwise::sar,
		OpCode::SHA3 => misc::sha3,
		OpCode::ADDRESS => system::address,
		OpCode::BALANCE => system::balance,
		OpCode::ORIGIN => system::origin,
		OpCode::CALLER => system::caller,
		OpCode::CALLVALUE => system::callvalue,
		OpCode::CALLDATALOAD => misc::calldataload,
		OpCode::CALLDATASIZE => misc::calldatasize,
		OpCode::CALLDATACOPY => misc::calldatacopy,
		OpCode::CODESIZE => misc::codesize,
		OpCode::CODECOPY => misc::codecopy,
		OpCode::GASPRICE => system::gasprice,
		OpCode::EXTCODESIZE => system::extcodesize,
		OpCode::EXTCODECOPY => system::extcodecopy,
		OpCode::RETURNDATASIZE => misc::returndatasize,
		OpCode::RETURNDATACOPY => misc::returndatacopy,
		OpCode::EXTCODEHASH => system::extcodehash,
		OpCode::BLOCKHASH => system::blockhash,
		OpCode::COINBASE => system::coinbase,
		OpCode::TIMESTAMP => system::timestamp,
		OpCode::NUMBER => system::number,
		OpCode::PREVRANDAO => system::prevrandao,
		OpCode::GASLIMIT => system::gaslimit,
		OpCode::CHAINID => system::chainid,
		OpCode::SELFBALANCE => system::selfbalance,
		OpCode::BASEFEE => system::basefee,
		OpCode::BLOBHASH => system::blobhash,
		OpCode::BLOBBASEFEE => system::blobbasefee,
		OpCode::POP => misc::pop,
		OpCode::MLOAD => misc::mload,
		OpCode::MSTORE => misc::mstore,
		OpCode::MSTORE8 => misc::mstore8,
		OpCode::SLOAD => system::sload,
		OpCode::SSTORE => system::sstore,
		OpCode::JUMP => misc::jump,
		OpCode::JUMPI => misc::jumpi,
		OpCode::PC => misc::pc,
		OpCode::MSIZE => misc::msize,
		OpCode::GAS => misc::gas,
		OpCode::JUMPDEST => misc::jumpdest,
		OpCode::TLOAD => system::tload,
		OpCode::TSTORE => system::tstore,
		OpCode::MCOPY => misc::mcopy,
		OpCode::PUSH0 => misc::push0,
		OpCode::CREATE | OpCode::CREATE2 => system::create,
		OpCode::CALL | OpCode::CALLCODE | OpCode::DELEGATECALL | OpCode::STATICCALL => system::call,
		OpCode::RETURN => misc::ret,
		OpCode::REVERT => misc::revert,
		OpCode::SELFDESTRUCT => system::selfdestruct,
		_ => invalid,
	}
}

fn invalid(_frame: &mut Frame, _context: &mut dyn RunContext) -> Result<(), Fault> {
	Err(Fault::InvalidInstruction)
}

fn add(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	binary_op!(frame, |a: U256, b: U256| a.overflowing_add(b).0)
}

fn mul(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	binary_op!(frame, |a: U256, b: U256| a.overflowing_mul(b).0)
}

fn sub(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	binary_op!(frame, |a: U256, b: U256| a.overflowing_sub(b).0)
}

fn div(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	binary_op!(frame, |a: U256, b: U256| if b.is_zero() {
		U256::zero()
	} else {
		a / b
	})
}

fn sdiv(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	binary_op!(frame, uint::sdiv)
}

fn modulo(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	binary_op!(frame, |a: U256, b: U256| if b.is_zero() {
		U256::zero()
	} else {
		a % b
	})
}

fn smod(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	binary_op!(frame, uint::smod)
}

fn addmod(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, a, b, m);
	let result = if m.is_zero() {
		U256::zero()
	} else {
		let wide = U512::from(a) + U512::from(b);
		U256::try_from(wide % U512::from(m)).expect("modulo fits 256 bits")
	};
	push!(frame, result);
	frame.pc += 1;
	Ok(())
}

fn mulmod(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, a, b, m);
	let result = if m.is_zero() {
		U256::zero()
	} else {
		let wide = U512::from(a) * U512::from(b);
		U256::try_from(wide % U512::from(m)).expect("modulo fits 256 bits")
	};
	push!(frame, result);
	frame.pc += 1;
	Ok(())
}

fn exp(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, base, exponent);
	let exponent_bytes = (exponent.bits() + 7) / 8;
	frame.use_gas(50 * exponent_bytes as i64)?;
	push!(frame, base.overflowing_pow(exponent).0);
	frame.pc += 1;
	Ok(())
}

fn signextend(frame: &mut Frame, _: &mut dyn RunContext) -> Result<(), Fault> {
	pop!(frame, byte_index, value);
	push!(frame, uint::sign_extend(byte_index, value));
	frame.pc += 1;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::code::CodeView;
	use crate::memory::Memory;
	use crate::stack::Stack;
	use crate::testing::NullContext;
	use crate::types::{BlockParameters, TransactionParameters};

	fn frame_with_code(code: Vec<u8>, gas: i64) -> Frame {
		Frame {
			code: CodeView::raw_without_analysis(code),
			pc: 0,
			stack: Stack::new(),
			memory: Memory::new(),
			gas,
			gas_refund: 0,
			status: Status::Running,
			return_data: Vec::new(),
			last_call_return: Vec::new(),
			is_static: false,
			depth: 0,
			recipient: Default::default(),
			sender: Default::default(),
			value: U256::zero(),
			input: Vec::new(),
			block: BlockParameters::default(),
			transaction: TransactionParameters::default(),
		}
	}

	#[test]
	fn add_program_leaves_seven_and_91_gas() {
		let code = vec![
			OpCode::PUSH1.0,
			3,
			OpCode::PUSH1.0,
			4,
			OpCode::ADD.0,
		];
		let mut frame = frame_with_code(code, 100);
		let mut context = NullContext::default();
		for _ in 0..4 {
			step(&mut frame, &mut context);
		}
		assert_eq!(frame.status, Status::Stopped);
		assert_eq!(frame.stack.peek(0).unwrap(), U256::from(7u64));
		assert_eq!(frame.gas, 100 - 3 - 3 - 3);
	}

	#[test]
	fn division_by_zero_yields_zero() {
		let code = vec![
			OpCode::PUSH1.0,
			0,
			OpCode::PUSH1.0,
			7,
			OpCode::DIV.0,
		];
		let mut frame = frame_with_code(code, 100);
		let mut context = NullContext::default();
		run(&mut frame, &mut context);
		assert_eq!(frame.status, Status::Stopped);
		assert_eq!(frame.stack.peek(0).unwrap(), U256::zero());
	}

	#[test]
	fn stack_underflow_fails_and_consumes_all_gas() {
		let mut frame = frame_with_code(vec![OpCode::ADD.0], 100);
		let mut context = NullContext::default();
		step(&mut frame, &mut context);
		assert_eq!(frame.status, Status::Failed);
		assert_eq!(frame.gas, 0);
	}

	#[test]
	fn unknown_opcode_fails() {
		let mut frame = frame_with_code(vec![0x0c], 100);
		let mut context = NullContext::default();
		step(&mut frame, &mut context);
		assert_eq!(frame.status, Status::Failed);
	}

	#[test]
	fn push0_requires_shanghai() {
		let mut frame = frame_with_code(vec![OpCode::PUSH0.0], 100);
		let mut context = NullContext::default();
		step(&mut frame, &mut context);
		assert_eq!(frame.status, Status::Failed);

		let mut frame = frame_with_code(vec![OpCode::PUSH0.0], 100);
		frame.block.revision = crate::revision::Revision::Shanghai;
		let mut context = NullContext::default();
		step(&mut frame, &mut context);
		assert_eq!(frame.status, Status::Running);
		assert_eq!(frame.stack.peek(0).unwrap(), U256::zero());
	}

	#[test]
	fn step_budget_is_honoured() {
		let code = vec![OpCode::PUSH1.0, 1, OpCode::PUSH1.0, 2, OpCode::ADD.0];
		let mut frame = frame_with_code(code, 100);
		let mut context = NullContext::default();
		step_n(&mut frame, &mut context, 2);
		assert_eq!(frame.status, Status::Running);
		assert_eq!(frame.stack.len(), 2);
	}
}
