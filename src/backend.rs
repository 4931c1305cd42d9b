//! In-memory world state with an append-only undo journal.
//!
//! Snapshots are indices into the journal; restoring truncates the
//! journal and reverses the popped entries, which invalidates every
//! snapshot taken later. Access lists, transient storage, logs, and
//! self-destruct flags all participate in the journal.

use std::collections::{BTreeMap, BTreeSet};

use primitive_types::{H160, H256, U256};
use sha3::{Digest, Keccak256};

use tosca_interpreter::runtime::{Snapshot, TransactionContext, WorldState};
use tosca_interpreter::{storage_status, AccessStatus, Log, Revision, StorageStatus};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Account {
	pub balance: U256,
	pub nonce: u64,
	pub code: Vec<u8>,
	pub storage: BTreeMap<H256, H256>,
}

#[derive(Clone, Debug)]
enum JournalEntry {
	Balance { address: H160, previous: U256 },
	Nonce { address: H160, previous: u64 },
	Code { address: H160, previous: Vec<u8> },
	Storage {
		address: H160,
		key: H256,
		previous: H256,
		recorded_original: bool,
	},
	Transient { address: H160, key: H256, previous: H256 },
	AccountCreated { address: H160, existed: bool },
	AccountWarmed { address: H160 },
	SlotWarmed { address: H160, key: H256 },
	LogEmitted,
	Destructed { address: H160, first: bool },
}

/// The framework's own [`TransactionContext`] implementation.
#[derive(Default)]
pub struct InMemoryState {
	accounts: BTreeMap<H160, Account>,
	/// Slot values as of the start of the transaction, captured on first
	/// write.
	original_storage: BTreeMap<(H160, H256), H256>,
	transient: BTreeMap<(H160, H256), H256>,
	warm_accounts: BTreeSet<H160>,
	warm_slots: BTreeSet<(H160, H256)>,
	logs: Vec<Log>,
	created: BTreeSet<H160>,
	destructed: BTreeSet<H160>,
	block_hashes: BTreeMap<u64, H256>,
	journal: Vec<JournalEntry>,
}

impl InMemoryState {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Install an account without journaling; test and block setup.
	pub fn insert_account(&mut self, address: H160, account: Account) {
		self.accounts.insert(address, account);
	}

	#[must_use]
	pub fn account(&self, address: H160) -> Option<&Account> {
		self.accounts.get(&address)
	}

	pub fn set_block_hash(&mut self, number: u64, hash: H256) {
		self.block_hashes.insert(number, hash);
	}

	/// Close the transaction: apply self-destructions (from Cancun on,
	/// only accounts created in the same transaction disappear) and drop
	/// all transaction-scoped bookkeeping.
	pub fn end_transaction(&mut self, revision: Revision) {
		let doomed: Vec<H160> = self
			.destructed
			.iter()
			.copied()
			.filter(|address| revision < Revision::Cancun || self.created.contains(address))
			.collect();
		for address in doomed {
			self.accounts.remove(&address);
		}
		self.original_storage.clear();
		self.transient.clear();
		self.warm_accounts.clear();
		self.warm_slots.clear();
		self.logs.clear();
		self.created.clear();
		self.destructed.clear();
		self.journal.clear();
	}

	fn undo(&mut self, entry: JournalEntry) {
		match entry {
			JournalEntry::Balance { address, previous } => {
				if let Some(account) = self.accounts.get_mut(&address) {
					account.balance = previous;
				}
			}
			JournalEntry::Nonce { address, previous } => {
				if let Some(account) = self.accounts.get_mut(&address) {
					account.nonce = previous;
				}
			}
			JournalEntry::Code { address, previous } => {
				if let Some(account) = self.accounts.get_mut(&address) {
					account.code = previous;
				}
			}
			JournalEntry::Storage {
				address,
				key,
				previous,
				recorded_original,
			} => {
				if let Some(account) = self.accounts.get_mut(&address) {
					if previous.is_zero() {
						account.storage.remove(&key);
					} else {
						account.storage.insert(key, previous);
					}
				}
				if recorded_original {
					self.original_storage.remove(&(address, key));
				}
			}
			JournalEntry::Transient {
				address,
				key,
				previous,
			} => {
				if previous.is_zero() {
					self.transient.remove(&(address, key));
				} else {
					self.transient.insert((address, key), previous);
				}
			}
			JournalEntry::AccountCreated { address, existed } => {
				self.created.remove(&address);
				if !existed {
					self.accounts.remove(&address);
				}
			}
			JournalEntry::AccountWarmed { address } => {
				self.warm_accounts.remove(&address);
			}
			JournalEntry::SlotWarmed { address, key } => {
				self.warm_slots.remove(&(address, key));
			}
			JournalEntry::LogEmitted => {
				self.logs.pop();
			}
			JournalEntry::Destructed { address, first } => {
				if first {
					self.destructed.remove(&address);
				}
			}
		}
	}
}

impl WorldState for InMemoryState {
	fn account_exists(&self, address: H160) -> bool {
		self.accounts.contains_key(&address)
	}

	fn create_account(&mut self, address: H160) {
		let existed = self.accounts.contains_key(&address);
		self.accounts.entry(address).or_default();
		self.created.insert(address);
		self.journal
			.push(JournalEntry::AccountCreated { address, existed });
	}

	fn balance(&self, address: H160) -> U256 {
		self.accounts
			.get(&address)
			.map(|account| account.balance)
			.unwrap_or_default()
	}

	fn set_balance(&mut self, address: H160, balance: U256) {
		let account = self.accounts.entry(address).or_default();
		self.journal.push(JournalEntry::Balance {
			address,
			previous: account.balance,
		});
		account.balance = balance;
	}

	fn nonce(&self, address: H160) -> u64 {
		self.accounts
			.get(&address)
			.map(|account| account.nonce)
			.unwrap_or_default()
	}

	fn set_nonce(&mut self, address: H160, nonce: u64) {
		let account = self.accounts.entry(address).or_default();
		self.journal.push(JournalEntry::Nonce {
			address,
			previous: account.nonce,
		});
		account.nonce = nonce;
	}

	fn code(&self, address: H160) -> Vec<u8> {
		self.accounts
			.get(&address)
			.map(|account| account.code.clone())
			.unwrap_or_default()
	}

	fn code_hash(&self, address: H160) -> H256 {
		match self.accounts.get(&address) {
			Some(account) => H256::from_slice(&Keccak256::digest(&account.code)),
			None => H256::zero(),
		}
	}

	fn code_size(&self, address: H160) -> usize {
		self.accounts
			.get(&address)
			.map(|account| account.code.len())
			.unwrap_or_default()
	}

	fn set_code(&mut self, address: H160, code: Vec<u8>) {
		let account = self.accounts.entry(address).or_default();
		self.journal.push(JournalEntry::Code {
			address,
			previous: std::mem::take(&mut account.code),
		});
		account.code = code;
	}

	fn has_empty_storage(&self, address: H160) -> bool {
		match self.accounts.get(&address) {
			Some(account) => account.storage.values().all(H256::is_zero),
			None => true,
		}
	}

	fn storage(&self, address: H160, key: H256) -> H256 {
		self.accounts
			.get(&address)
			.and_then(|account| account.storage.get(&key).copied())
			.unwrap_or_default()
	}

	fn set_storage(&mut self, address: H160, key: H256, value: H256) -> StorageStatus {
		let current = self.storage(address, key);
		let original = self.original_storage(address, key);
		let recorded_original = if self.original_storage.contains_key(&(address, key)) {
			false
		} else {
			self.original_storage.insert((address, key), current);
			true
		};
		self.journal.push(JournalEntry::Storage {
			address,
			key,
			previous: current,
			recorded_original,
		});
		let account = self.accounts.entry(address).or_default();
		if value.is_zero() {
			account.storage.remove(&key);
		} else {
			account.storage.insert(key, value);
		}
		storage_status(original, current, value)
	}

	fn self_destruct(&mut self, address: H160, _beneficiary: H160) -> bool {
		let first = self.destructed.insert(address);
		self.journal.push(JournalEntry::Destructed { address, first });
		first
	}
}

impl TransactionContext for InMemoryState {
	fn original_storage(&self, address: H160, key: H256) -> H256 {
		match self.original_storage.get(&(address, key)) {
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
		let previous = self.transient_storage(address, key);
		self.journal.push(JournalEntry::Transient {
			address,
			key,
			previous,
		});
		if value.is_zero() {
			self.transient.remove(&(address, key));
		} else {
			self.transient.insert((address, key), value);
		}
	}

	fn access_account(&mut self, address: H160) -> AccessStatus {
		if self.warm_accounts.insert(address) {
			self.journal.push(JournalEntry::AccountWarmed { address });
			AccessStatus::Cold
		} else {
			AccessStatus::Warm
		}
	}

	fn access_storage(&mut self, address: H160, key: H256) -> AccessStatus {
		if self.warm_slots.insert((address, key)) {
			self.journal.push(JournalEntry::SlotWarmed { address, key });
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
		self.journal.push(JournalEntry::LogEmitted);
	}

	fn logs(&self) -> Vec<Log> {
		self.logs.clone()
	}

	fn create_snapshot(&mut self) -> Snapshot {
		self.journal.len()
	}

	fn restore_snapshot(&mut self, snapshot: Snapshot) {
		while self.journal.len() > snapshot {
			let entry = self.journal.pop().expect("journal is non-empty");
			self.undo(entry);
		}
	}

	fn created_in_transaction(&self, address: H160) -> bool {
		self.created.contains(&address)
	}

	fn block_hash(&self, number: u64) -> H256 {
		self.block_hashes
			.get(&number)
			.copied()
			.unwrap_or_default()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn address(byte: u8) -> H160 {
		H160::repeat_byte(byte)
	}

	fn key(byte: u8) -> H256 {
		H256::repeat_byte(byte)
	}

	#[test]
	fn restore_undoes_everything_after_the_snapshot() {
		let mut state = InMemoryState::new();
		state.set_balance(address(1), U256::from(100u64));
		let snapshot = state.create_snapshot();

		state.set_balance(address(1), U256::from(5u64));
		state.set_nonce(address(1), 7);
		state.set_storage(address(1), key(2), key(3));
		state.set_transient_storage(address(1), key(2), key(4));
		state.access_account(address(2));
		state.emit_log(Log::default());
		state.create_account(address(3));

		state.restore_snapshot(snapshot);

		assert_eq!(state.balance(address(1)), U256::from(100u64));
		assert_eq!(state.nonce(address(1)), 0);
		assert_eq!(state.storage(address(1), key(2)), H256::zero());
		assert_eq!(state.transient_storage(address(1), key(2)), H256::zero());
		assert!(!state.is_account_warm(address(2)));
		assert!(state.logs().is_empty());
		assert!(!state.account_exists(address(3)));
	}

	#[test]
	fn snapshots_nest() {
		let mut state = InMemoryState::new();
		let outer = state.create_snapshot();
		state.set_balance(address(1), U256::from(1u64));
		let inner = state.create_snapshot();
		state.set_balance(address(1), U256::from(2u64));

		state.restore_snapshot(inner);
		assert_eq!(state.balance(address(1)), U256::from(1u64));
		state.restore_snapshot(outer);
		assert_eq!(state.balance(address(1)), U256::zero());
	}

	#[test]
	fn original_storage_is_the_transaction_start_value() {
		let mut state = InMemoryState::new();
		state.insert_account(
			address(1),
			Account {
				storage: [(key(1), key(9))].into_iter().collect(),
				..Default::default()
			},
		);
		assert_eq!(state.original_storage(address(1), key(1)), key(9));
		let status = state.set_storage(address(1), key(1), key(5));
		assert_eq!(status, StorageStatus::Modified);
		assert_eq!(state.original_storage(address(1), key(1)), key(9));
		let status = state.set_storage(address(1), key(1), key(9));
		assert_eq!(status, StorageStatus::ModifiedRestored);
	}

	#[test]
	fn cancun_keeps_accounts_not_created_in_transaction() {
		let mut state = InMemoryState::new();
		state.insert_account(address(1), Account::default());
		state.self_destruct(address(1), address(2));
		state.end_transaction(Revision::Cancun);
		assert!(state.account_exists(address(1)));

		let mut state = InMemoryState::new();
		state.insert_account(address(1), Account::default());
		state.self_destruct(address(1), address(2));
		state.end_transaction(Revision::London);
		assert!(!state.account_exists(address(1)));
	}

	#[test]
	fn access_status_reports_prior_state() {
		let mut state = InMemoryState::new();
		assert_eq!(state.access_account(address(1)), AccessStatus::Cold);
		assert_eq!(state.access_account(address(1)), AccessStatus::Warm);
		assert_eq!(state.access_storage(address(1), key(1)), AccessStatus::Cold);
		assert_eq!(state.access_storage(address(1), key(1)), AccessStatus::Warm);
	}
}
