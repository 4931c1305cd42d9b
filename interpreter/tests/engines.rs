//! End-to-end scenarios exercised through both engines.

use primitive_types::{H256, U256};

use tosca_interpreter::testing::NullContext;
use tosca_interpreter::uint::u256_to_h256;
use tosca_interpreter::{
	Interpreter, Lfvm, OpCode, Parameters, Revision, Sfvm, Status, SteppableInterpreter,
};

fn engines() -> Vec<(&'static str, Box<dyn Interpreter>)> {
	vec![
		("sfvm", Box::new(Sfvm::default())),
		("lfvm", Box::new(Lfvm::default())),
	]
}

fn parameters(code: Vec<u8>, gas: i64, revision: Revision) -> Parameters {
	let mut parameters = Parameters {
		gas,
		code,
		..Default::default()
	};
	parameters.block.revision = revision;
	parameters
}

#[test]
fn addition_program_stops_with_seven_on_the_stack() {
	let code = vec![OpCode::PUSH1.0, 3, OpCode::PUSH1.0, 4, OpCode::ADD.0];
	for (name, engine) in engines() {
		let steppable = engine.steppable().unwrap();
		let mut frame = steppable
			.new_frame(parameters(code.clone(), 100, Revision::Istanbul))
			.unwrap();
		let mut context = NullContext::default();
		steppable.step_n(&mut frame, &mut context, 4);
		assert_eq!(frame.status, Status::Stopped, "{name}");
		assert_eq!(frame.stack.peek(0).unwrap(), U256::from(7u64), "{name}");
		assert_eq!(frame.gas, 100 - 3 - 3 - 3, "{name}");
	}
}

#[test]
fn jump_outside_the_code_range_fails() {
	// A JUMPDEST at position 0 does not make 0x1_0000_0000 a valid target.
	let mut code = vec![OpCode::JUMPDEST.0, OpCode::PUSH5.0];
	code.extend_from_slice(&[0x01, 0x00, 0x00, 0x00, 0x00]);
	code.push(OpCode::JUMP.0);
	for (name, engine) in engines() {
		let mut context = NullContext::default();
		let result = engine
			.run(parameters(code.clone(), 1_000, Revision::Istanbul), &mut context)
			.unwrap();
		assert!(!result.success, "{name}");
		assert_eq!(result.gas_left, 0, "{name}");
	}
}

#[test]
fn sstore_under_staticcall_fails_with_write_protection() {
	let code = vec![OpCode::PUSH1.0, 1, OpCode::PUSH1.0, 0, OpCode::SSTORE.0];
	for (name, engine) in engines() {
		let mut params = parameters(code.clone(), 100_000, Revision::Istanbul);
		params.is_static = true;
		let mut context = NullContext::default();
		let result = engine.run(params, &mut context).unwrap();
		assert!(!result.success, "{name}");
		assert_eq!(result.gas_left, 0, "{name}");
		assert!(context.storage.is_empty(), "{name}");
	}
}

#[test]
fn berlin_call_to_missing_account_without_value_succeeds() {
	// CALL(gas=0, addr=0xBB.., value=0, no input, no output) on Berlin.
	let mut code = vec![
		OpCode::PUSH1.0,
		0, // out size
		OpCode::PUSH1.0,
		0, // out offset
		OpCode::PUSH1.0,
		0, // in size
		OpCode::PUSH1.0,
		0, // in offset
		OpCode::PUSH1.0,
		0, // value
		OpCode::PUSH20.0,
	];
	code.extend_from_slice(&[0xbb; 20]);
	code.extend_from_slice(&[OpCode::PUSH1.0, 0, OpCode::CALL.0]);
	for (name, engine) in engines() {
		let mut context = NullContext::default();
		let result = engine
			.run(parameters(code.clone(), 100_000, Revision::Berlin), &mut context)
			.unwrap();
		assert!(result.success, "{name}");
		// The sub-call was issued through the run context with zero value.
		assert_eq!(context.seen_calls.len(), 1, "{name}");
		assert!(context.seen_calls[0].1.value.is_zero(), "{name}");
	}
}

#[test]
fn cancun_sstore_deleting_a_warm_slot_costs_2900_and_refunds_4800() {
	let key = u256_to_h256(U256::from(1u64));
	let value = H256::repeat_byte(0x77);
	let code = vec![OpCode::PUSH1.0, 0, OpCode::PUSH1.0, 1, OpCode::SSTORE.0];
	for (name, engine) in engines() {
		let steppable = engine.steppable().unwrap();
		let mut context = NullContext::default();
		context.storage.insert((Default::default(), key), value);
		context.original.insert((Default::default(), key), value);
		context.warm_slots.insert((Default::default(), key));

		let mut frame = steppable
			.new_frame(parameters(code.clone(), 100_000, Revision::Cancun))
			.unwrap();
		steppable.step_n(&mut frame, &mut context, 3);
		assert_eq!(frame.status, Status::Running, "{name}");
		assert_eq!(frame.gas, 100_000 - 3 - 3 - 2_900, "{name}");
		assert_eq!(frame.gas_refund, 4_800, "{name}");
	}
}

#[test]
fn return_hands_back_the_written_memory_byte() {
	// MSTORE8(0, 0xFA); RETURN(0, 1)
	let code = vec![
		OpCode::PUSH1.0,
		0xfa,
		OpCode::PUSH1.0,
		0,
		OpCode::MSTORE8.0,
		OpCode::PUSH1.0,
		1,
		OpCode::PUSH1.0,
		0,
		OpCode::RETURN.0,
	];
	for (name, engine) in engines() {
		let mut context = NullContext::default();
		let result = engine
			.run(parameters(code.clone(), 1_000, Revision::Istanbul), &mut context)
			.unwrap();
		assert!(result.success, "{name}");
		assert_eq!(result.output, vec![0xfa], "{name}");
	}
}

#[test]
fn engines_agree_on_a_mixed_program() {
	// Exercise jumps over push data, memory, and hashing in one program.
	let code = vec![
		OpCode::PUSH1.0,
		0x06,
		OpCode::JUMP.0,
		OpCode::PUSH2.0,
		0x5b,
		0x5b, // data bytes that look like JUMPDESTs
		OpCode::JUMPDEST.0,
		OpCode::PUSH1.0,
		0x20,
		OpCode::PUSH1.0,
		0,
		OpCode::SHA3.0,
		OpCode::PUSH1.0,
		0,
		OpCode::MSTORE.0,
		OpCode::PUSH1.0,
		0x20,
		OpCode::PUSH1.0,
		0,
		OpCode::RETURN.0,
	];
	let mut outputs = Vec::new();
	for (_, engine) in engines() {
		let mut context = NullContext::default();
		let result = engine
			.run(parameters(code.clone(), 100_000, Revision::Shanghai), &mut context)
			.unwrap();
		assert!(result.success);
		outputs.push((result.output, result.gas_left));
	}
	assert_eq!(outputs[0], outputs[1]);
}

#[test]
fn jumping_into_push_data_is_rejected() {
	let code = vec![
		OpCode::PUSH1.0,
		0x04,
		OpCode::JUMP.0,
		OpCode::PUSH1.0,
		OpCode::JUMPDEST.0, // immediate data, not a real JUMPDEST
	];
	for (name, engine) in engines() {
		let mut context = NullContext::default();
		let result = engine
			.run(parameters(code.clone(), 1_000, Revision::Istanbul), &mut context)
			.unwrap();
		assert!(!result.success, "{name}");
		assert_eq!(result.gas_left, 0, "{name}");
	}
}
