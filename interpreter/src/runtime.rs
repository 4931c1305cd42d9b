//! Interfaces between the interpreter, the world state, and the processor.

use primitive_types::{H160, H256, U256};

use crate::error::Fault;
use crate::types::{
	AccessStatus, CallKind, CallParameters, CallResult, Log, StorageStatus,
};

/// Opaque handle into the world-state journal. Snapshots are strictly
/// nested: restoring an outer snapshot invalidates every inner one.
pub type Snapshot = usize;

/// Persistent account state of the chain.
pub trait WorldState {
	fn account_exists(&self, address: H160) -> bool;
	fn create_account(&mut self, address: H160);

	fn balance(&self, address: H160) -> U256;
	fn set_balance(&mut self, address: H160, balance: U256);

	fn nonce(&self, address: H160) -> u64;
	fn set_nonce(&mut self, address: H160, nonce: u64);

	fn code(&self, address: H160) -> Vec<u8>;
	fn code_hash(&self, address: H160) -> H256;
	fn code_size(&self, address: H160) -> usize;
	fn set_code(&mut self, address: H160, code: Vec<u8>);

	/// Whether the account has no populated storage slots.
	fn has_empty_storage(&self, address: H160) -> bool;
	fn storage(&self, address: H160, key: H256) -> H256;
	/// Write a slot and classify the transition for SSTORE metering.
	fn set_storage(&mut self, address: H160, key: H256, value: H256) -> StorageStatus;

	/// Destroy `address`, crediting its balance to `beneficiary`. Returns
	/// true the first time the account is destructed in this transaction.
	fn self_destruct(&mut self, address: H160, beneficiary: H160) -> bool;
}

/// Transaction-scoped view of the world: the persistent state plus the
/// journal, access lists, transient storage, and logs.
pub trait TransactionContext: WorldState {
	/// Value of the slot at the start of the transaction.
	fn original_storage(&self, address: H160, key: H256) -> H256;

	fn transient_storage(&self, address: H160, key: H256) -> H256;
	fn set_transient_storage(&mut self, address: H160, key: H256, value: H256);

	/// Mark the account warm; reports its state before the call.
	fn access_account(&mut self, address: H160) -> AccessStatus;
	/// Mark the slot warm; reports its state before the call.
	fn access_storage(&mut self, address: H160, key: H256) -> AccessStatus;
	fn is_account_warm(&self, address: H160) -> bool;
	fn is_slot_warm(&self, address: H160, key: H256) -> bool;

	fn emit_log(&mut self, log: Log);
	fn logs(&self) -> Vec<Log>;

	fn create_snapshot(&mut self) -> Snapshot;
	fn restore_snapshot(&mut self, snapshot: Snapshot);

	/// Whether the account was created within this transaction (EIP-6780).
	fn created_in_transaction(&self, address: H160) -> bool;

	/// Hash of a recent block, for BLOCKHASH.
	fn block_hash(&self, number: u64) -> H256;
}

/// The callback surface the interpreter uses to re-enter the processor
/// for CALL and CREATE. Passed down into every frame.
pub trait RunContext: TransactionContext {
	fn call(&mut self, kind: CallKind, parameters: CallParameters) -> Result<CallResult, Fault>;
}
