//! Bridges between conformance-test states and real interpreter frames.

use std::cmp::min;
use std::collections::BTreeSet;

use primitive_types::{H160, H256, U256};
use sha3::{Digest, Keccak256};

use tosca_interpreter::memory::Memory;
use tosca_interpreter::runtime::{RunContext, Snapshot, TransactionContext, WorldState};
use tosca_interpreter::stack::Stack;
use tosca_interpreter::uint::{h256_to_u256, u256_to_h256};
use tosca_interpreter::{
	storage_status, AccessStatus, CallKind, CallParameters, CallResult, Fault, Log, Parameters,
	StorageStatus, SteppableInterpreter,
};

use crate::semantics::block_hash_stub;
use crate::state::{CtLog, State};

/// A run context backed by a conformance-test state. Gives an engine
/// exactly the world slice the state describes; nested calls are
/// answered from the planned call journal.
pub struct CtContext<'a> {
	state: &'a mut State,
	destructed: BTreeSet<H160>,
}

impl<'a> CtContext<'a> {
	pub fn new(state: &'a mut State) -> Self {
		Self {
			state,
			destructed: BTreeSet::new(),
		}
	}
}

impl WorldState for CtContext<'_> {
	fn account_exists(&self, address: H160) -> bool {
		self.state.accounts.contains_key(&address)
	}

	fn create_account(&mut self, address: H160) {
		self.state.accounts.entry(address).or_default();
	}

	fn balance(&self, address: H160) -> U256 {
		self.state
			.accounts
			.get(&address)
			.map(|account| account.balance)
			.unwrap_or_default()
	}

	fn set_balance(&mut self, address: H160, balance: U256) {
		self.state.accounts.entry(address).or_default().balance = balance;
	}

	fn nonce(&self, _address: H160) -> u64 {
		0
	}

	fn set_nonce(&mut self, _address: H160, _nonce: u64) {}

	fn code(&self, address: H160) -> Vec<u8> {
		self.state
			.accounts
			.get(&address)
			.map(|account| account.code.clone())
			.unwrap_or_default()
	}

	fn code_hash(&self, address: H160) -> H256 {
		match self.state.accounts.get(&address) {
			Some(account) => H256::from_slice(&Keccak256::digest(&account.code)),
			None => H256::zero(),
		}
	}

	fn code_size(&self, address: H160) -> usize {
		self.state
			.accounts
			.get(&address)
			.map(|account| account.code.len())
			.unwrap_or_default()
	}

	fn set_code(&mut self, address: H160, code: Vec<u8>) {
		self.state.accounts.entry(address).or_default().code = code;
	}

	fn has_empty_storage(&self, _address: H160) -> bool {
		true
	}

	fn storage(&self, address: H160, key: H256) -> H256 {
		if address != self.state.call_context.account_address {
			return H256::zero();
		}
		u256_to_h256(self.state.storage.get_current(h256_to_u256(key)))
	}

	fn set_storage(&mut self, address: H160, key: H256, value: H256) -> StorageStatus {
		let key = h256_to_u256(key);
		let original = self.state.storage.get_original(key);
		let current = self.state.storage.get_current(key);
		if address == self.state.call_context.account_address {
			self.state.storage.set_current(key, h256_to_u256(value));
		}
		storage_status(u256_to_h256(original), u256_to_h256(current), value)
	}

	fn self_destruct(&mut self, address: H160, beneficiary: H160) -> bool {
		let balance = self.balance(address);
		if self.state.revision >= tosca_interpreter::Revision::Cancun {
			self.set_balance(address, U256::zero());
		}
		if address != beneficiary {
			let previous = self.balance(beneficiary);
			self.set_balance(beneficiary, previous.saturating_add(balance));
		}
		self.destructed.insert(address)
	}
}

impl TransactionContext for CtContext<'_> {
	fn original_storage(&self, address: H160, key: H256) -> H256 {
		if address != self.state.call_context.account_address {
			return H256::zero();
		}
		u256_to_h256(self.state.storage.get_original(h256_to_u256(key)))
	}

	fn transient_storage(&self, _address: H160, key: H256) -> H256 {
		u256_to_h256(
			self.state
				.transient
				.get(&h256_to_u256(key))
				.copied()
				.unwrap_or_default(),
		)
	}

	fn set_transient_storage(&mut self, _address: H160, key: H256, value: H256) {
		let key = h256_to_u256(key);
		let value = h256_to_u256(value);
		if value.is_zero() {
			self.state.transient.remove(&key);
		} else {
			self.state.transient.insert(key, value);
		}
	}

	fn access_account(&mut self, address: H160) -> AccessStatus {
		if self.state.warm_accounts.insert(address) {
			AccessStatus::Cold
		} else {
			AccessStatus::Warm
		}
	}

	fn access_storage(&mut self, _address: H160, key: H256) -> AccessStatus {
		let key = h256_to_u256(key);
		if self.state.storage.is_warm(key) {
			AccessStatus::Warm
		} else {
			self.state.storage.mark_warm(key);
			AccessStatus::Cold
		}
	}

	fn is_account_warm(&self, address: H160) -> bool {
		self.state.warm_accounts.contains(&address)
	}

	fn is_slot_warm(&self, _address: H160, key: H256) -> bool {
		self.state.storage.is_warm(h256_to_u256(key))
	}

	fn emit_log(&mut self, log: Log) {
		self.state.logs.push(CtLog::from(log));
	}

	fn logs(&self) -> Vec<Log> {
		Vec::new()
	}

	fn create_snapshot(&mut self) -> Snapshot {
		0
	}

	fn restore_snapshot(&mut self, _snapshot: Snapshot) {}

	fn created_in_transaction(&self, _address: H160) -> bool {
		false
	}

	fn block_hash(&self, number: u64) -> H256 {
		block_hash_stub(number)
	}
}

impl RunContext for CtContext<'_> {
	fn call(&mut self, _kind: CallKind, parameters: CallParameters) -> Result<CallResult, Fault> {
		if self.state.future_call_results.is_empty() {
			return Ok(CallResult::default());
		}
		let planned = self.state.future_call_results.remove(0);
		let forwarded = parameters.gas;
		Ok(CallResult {
			success: planned.success,
			output: planned.output,
			gas_left: forwarded - min(forwarded, planned.gas_consumed.max(0)),
			gas_refund: planned.gas_refund,
			created_address: planned.created_address,
		})
	}
}

/// Run `steps` instructions of `engine` on a clone of `state` and return
/// the resulting state.
pub fn step_state(
	engine: &dyn SteppableInterpreter,
	state: &State,
	steps: usize,
) -> Result<State, Fault> {
	let mut working = state.clone();
	let code_hash = H256::from_slice(&Keccak256::digest(&state.code));
	let parameters = Parameters {
		block: state.block_parameters(),
		transaction: state.transaction_parameters(),
		is_static: state.call_context.is_static,
		depth: state.call_context.depth as usize,
		gas: state.gas,
		recipient: state.call_context.account_address,
		sender: state.call_context.caller_address,
		input: state.call_data.clone(),
		value: state.call_context.value,
		code_hash: Some(code_hash),
		code: state.code.clone(),
	};
	let mut frame = engine.new_frame(parameters)?;
	frame.pc = state.pc as usize;
	frame.stack = Stack::from_values(state.stack.clone());
	frame.memory = Memory::from_bytes(state.memory.clone());
	frame.status = state.status;
	frame.gas_refund = state.gas_refund;
	frame.return_data = state.return_data.clone();
	frame.last_call_return = state.last_call_return.clone();

	{
		let mut context = CtContext::new(&mut working);
		engine.step_n(&mut frame, &mut context, steps);
	}

	working.status = frame.status;
	working.pc = frame.pc as u64;
	working.gas = frame.gas;
	working.gas_refund = frame.gas_refund;
	working.stack = frame.stack.data().to_vec();
	working.memory = frame.memory.data().to_vec();
	working.return_data = frame.return_data;
	working.last_call_return = frame.last_call_return;
	Ok(working)
}

#[cfg(test)]
mod tests {
	use super::*;
	use tosca_interpreter::{OpCode, Sfvm, Status};

	#[test]
	fn one_step_of_an_add_program() {
		let mut state = State::default();
		state.code = vec![OpCode::ADD.as_u8()];
		state.stack = vec![U256::from(4u64), U256::from(3u64)];
		state.gas = 100;
		let engine = Sfvm::default();
		let result = step_state(&engine, &state, 1).unwrap();
		assert_eq!(result.status, Status::Running);
		assert_eq!(result.pc, 1);
		assert_eq!(result.gas, 97);
		assert_eq!(result.stack, vec![U256::from(7u64)]);
	}

	#[test]
	fn stepping_preserves_the_input_state() {
		let mut state = State::default();
		state.code = vec![OpCode::PUSH1.as_u8(), 9];
		state.gas = 10;
		let copy = state.clone();
		let engine = Sfvm::default();
		let _ = step_state(&engine, &state, 1).unwrap();
		assert_eq!(state, copy);
	}
}
