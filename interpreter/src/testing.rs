//! Minimal in-memory run context for exercising frames in isolation.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use primitive_types::{H160, H256, U256};
use sha3::{Digest, Keccak256};

use crate::error::Fault;
use crate::runtime::{RunContext, Snapshot, TransactionContext, WorldState};
use crate::types::{
	storage_status, AccessStatus, CallKind, CallParameters, CallResult, Log, StorageStatus,
};

/// A flat, journal-free world. Snapshots are accepted and ignored; calls
/// are answered from a queue of planned results (success with all gas
/// returned when the queue is empty).
#[derive(Default)]
pub struct NullContext {
	pub balances: BTreeMap<H160, U256>,
	pub nonces: BTreeMap<H160, u64>,
	pub codes: BTreeMap<H160, Vec<u8>>,
	pub storage: BTreeMap<(H160, H256), H256>,
	pub original: BTreeMap<(H160, H256), H256>,
	pub transient: BTreeMap<(H160, H256), H256>,
	pub warm_accounts: BTreeSet<H160>,
	pub warm_slots: BTreeSet<(H160, H256)>,
	pub logs: Vec<Log>,
	pub destructed: BTreeSet<H160>,
	pub created: BTreeSet<H160>,
	pub planned_calls: VecDeque<CallResult>,
	/// Records of the calls issued through this context.
	pub seen_calls: Vec<(CallKind, CallParameters)>,
}

impl WorldState for NullContext {
	fn account_exists(&self, address: H160) -> bool {
		self.balances.contains_key(&address)
			|| self.nonces.contains_key(&address)
			|| self.codes.contains_key(&address)
	}

	fn create_account(&mut self, address: H160) {
		self.nonces.entry(address).or_insert(0);
		self.created.insert(address);
	}

	fn balance(&self, address: H160) -> U256 {
		self.balances.get(&address).copied().unwrap_or_default()
	}

	fn set_balance(&mut self, address: H160, balance: U256) {
		self.balances.insert(address, balance);
	}

	fn nonce(&self, address: H160) -> u64 {
		self.nonces.get(&address).copied().unwrap_or_default()
	}

	fn set_nonce(&mut self, address: H160, nonce: u64) {
		self.nonces.insert(address, nonce);
	}

	fn code(&self, address: H160) -> Vec<u8> {
		self.codes.get(&address).cloned().unwrap_or_default()
	}

	fn code_hash(&self, address: H160) -> H256 {
		match self.codes.get(&address) {
			Some(code) => H256::from_slice(&Keccak256::digest(code)),
			None => H256::zero(),
		}
	}

	fn code_size(&self, address: H160) -> usize {
		self.codes.get(&address).map(Vec::len).unwrap_or_default()
	}

	fn set_code(&mut self, address: H160, code: Vec<u8>) {
		self.codes.insert(address, code);
	}

	fn has_empty_storage(&self, address: H160) -> bool {
		!self
			.storage
			.iter()
			.any(|((a, _), value)| *a == address && !value.is_zero())
	}

	fn storage(&self, address: H160, key: H256) -> H256 {
		self.storage
			.get(&(address, key))
			.copied()
			.unwrap_or_default()
	}

	fn set_storage(&mut self, address: H160, key: H256, value: H256) -> StorageStatus {
		let current = self.storage(address, key);
		let original = self.original_storage(address, key);
		self.original.entry((address, key)).or_insert(current);
		self.storage.insert((address, key), value);
		storage_status(original, current, value)
	}

	fn self_destruct(&mut self, address: H160, beneficiary: H160) -> bool {
		let balance = self.balance(address);
		self.set_balance(address, U256::zero());
		let previous = self.balance(beneficiary);
		self.set_balance(beneficiary, previous + balance);
		self.destructed.insert(address)
	}
}

impl TransactionContext for NullContext {
	fn original_storage(&self, address: H160, key: H256) -> H256 {
		match self.original.get(&(address, key)) {
			Some(value) => *value,
			None => self.storage(address, key),
		}
	}

	fn transient_storage(&self, address: H160, key: H256) -> H256 {
		self.transient
			.get(&(address, key))
			.copied()
			.unwrap_or_default()
	}

	fn set_transient_storage(&mut self, address: H160, key: H256, value: H256) {
		self.transient.insert((address, key), value);
	}

	fn access_account(&mut self, address: H160) -> AccessStatus {
		if self.warm_accounts.insert(address) {
			AccessStatus::Cold
		} else {
			AccessStatus::Warm
		}
	}

	fn access_storage(&mut self, address: H160, key: H256) -> AccessStatus {
		if self.warm_slots.insert((address, key)) {
			AccessStatus::Cold
		} else {
			AccessStatus::Warm
		}
	}

	fn is_account_warm(&self, address: H160) -> bool {
		self.warm_accounts.contains(&address)
	}

	fn is_slot_warm(&self, address: H160, key: H256) -> bool {
		self.warm_slots.contains(&(address, key))
	}

	fn emit_log(&mut self, log: Log) {
		self.logs.push(log);
	}

	fn logs(&self) -> Vec<Log> {
		self.logs.clone()
	}

	fn create_snapshot(&mut self) -> Snapshot {
		0
	}

	fn restore_snapshot(&mut self, _snapshot: Snapshot) {}

	fn created_in_transaction(&self, address: H160) -> bool {
		self.created.contains(&address)
	}

	fn block_hash(&self, number: u64) -> H256 {
		H256::from_low_u64_be(number)
	}
}

impl RunContext for NullContext {
	fn call(&mut self, kind: CallKind, parameters: CallParameters) -> Result<CallResult, Fault> {
		let gas = parameters.gas;
		self.seen_calls.push((kind, parameters));
		Ok(self.planned_calls.pop_front().unwrap_or(CallResult {
			success: true,
			output: Vec::new(),
			gas_left: gas,
			gas_refund: 0,
			created_address: H160::zero(),
		}))
	}
}
