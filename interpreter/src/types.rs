use primitive_types::{H160, H256, U256};

use crate::revision::Revision;

/// Gas counter. Signed so that intermediate refund arithmetic cannot wrap;
/// a negative amount never escapes an operation.
pub type Gas = i64;

/// Frame execution status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Status {
	#[default]
	Running,
	Stopped,
	Returned,
	Reverted,
	Failed,
	SelfDestructed,
}

impl Status {
	/// Whether a frame that ended in this status counts as successful.
	#[must_use]
	pub fn is_success(self) -> bool {
		matches!(
			self,
			Status::Stopped | Status::Returned | Status::SelfDestructed
		)
	}
}

/// Access-list state of an account or storage slot (EIP-2929).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessStatus {
	Cold,
	Warm,
}

/// Effect of a storage write within the current transaction, derived from
/// the `(original, current, new)` triple. Drives SSTORE gas and refunds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageStatus {
	/// Catch-all for transitions that neither add, delete, nor restore.
	Assigned,
	/// 0 -> 0 -> Z
	Added,
	/// X -> X -> 0
	Deleted,
	/// X -> X -> Z
	Modified,
	/// X -> 0 -> Z
	DeletedAdded,
	/// X -> Y -> 0
	ModifiedDeleted,
	/// X -> 0 -> X
	DeletedRestored,
	/// 0 -> Y -> 0
	AddedDeleted,
	/// X -> Y -> X
	ModifiedRestored,
}

impl StorageStatus {
	pub const fn all() -> [StorageStatus; 9] {
		[
			StorageStatus::Assigned,
			StorageStatus::Added,
			StorageStatus::Deleted,
			StorageStatus::Modified,
			StorageStatus::DeletedAdded,
			StorageStatus::ModifiedDeleted,
			StorageStatus::DeletedRestored,
			StorageStatus::AddedDeleted,
			StorageStatus::ModifiedRestored,
		]
	}
}

/// Classify a storage transition into its [`StorageStatus`].
#[must_use]
pub fn storage_status(original: H256, current: H256, new: H256) -> StorageStatus {
	let zero = H256::zero();
	if current == new {
		return StorageStatus::Assigned;
	}
	if original == current {
		if original == zero {
			return StorageStatus::Added;
		}
		if new == zero {
			return StorageStatus::Deleted;
		}
		return StorageStatus::Modified;
	}
	// The slot is dirty: it was already changed within this transaction.
	if original != zero {
		if current == zero {
			if new == original {
				StorageStatus::DeletedRestored
			} else {
				StorageStatus::DeletedAdded
			}
		} else if new == zero {
			StorageStatus::ModifiedDeleted
		} else if new == original {
			StorageStatus::ModifiedRestored
		} else {
			StorageStatus::Assigned
		}
	} else if new == zero {
		StorageStatus::AddedDeleted
	} else {
		StorageStatus::Assigned
	}
}

/// A log record emitted by LOG0..LOG4.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Log {
	pub address: H160,
	pub topics: Vec<H256>,
	pub data: Vec<u8>,
}

/// Kind of a call or create frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
	Call,
	CallCode,
	DelegateCall,
	StaticCall,
	Create,
	Create2,
}

/// Arguments of a call or create issued through the run context.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallParameters {
	pub sender: H160,
	pub recipient: H160,
	/// Address the executed code is loaded from. Differs from the recipient
	/// for CALLCODE and DELEGATECALL.
	pub code_address: H160,
	pub input: Vec<u8>,
	pub value: U256,
	pub gas: Gas,
	/// CREATE2 salt; ignored for every other kind.
	pub salt: H256,
}

/// Result of a call or create issued through the run context.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallResult {
	pub success: bool,
	pub output: Vec<u8>,
	pub gas_left: Gas,
	pub gas_refund: Gas,
	pub created_address: H160,
}

/// Per-block execution environment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockParameters {
	pub number: u64,
	pub timestamp: u64,
	pub coinbase: H160,
	pub gas_limit: Gas,
	pub prev_randao: H256,
	pub chain_id: U256,
	pub base_fee: U256,
	pub blob_base_fee: U256,
	pub revision: Revision,
}

/// Per-transaction execution environment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionParameters {
	pub origin: H160,
	pub gas_price: U256,
	pub blob_hashes: Vec<H256>,
}

/// Everything an interpreter needs to execute one frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Parameters {
	pub block: BlockParameters,
	pub transaction: TransactionParameters,
	pub is_static: bool,
	pub depth: usize,
	pub gas: Gas,
	pub recipient: H160,
	pub sender: H160,
	pub input: Vec<u8>,
	pub value: U256,
	/// Hash of `code`, when it has a stable one. Init code has none.
	pub code_hash: Option<H256>,
	pub code: Vec<u8>,
}

/// Observable outcome of running one frame to completion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunResult {
	pub success: bool,
	pub output: Vec<u8>,
	pub gas_left: Gas,
	pub gas_refund: Gas,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn word(value: u64) -> H256 {
		H256::from_low_u64_be(value)
	}

	#[test]
	fn storage_status_covers_all_nine_transitions() {
		let x = word(1);
		let y = word(2);
		let z = word(3);
		let o = H256::zero();

		assert_eq!(storage_status(o, o, z), StorageStatus::Added);
		assert_eq!(storage_status(x, x, o), StorageStatus::Deleted);
		assert_eq!(storage_status(x, x, z), StorageStatus::Modified);
		assert_eq!(storage_status(x, o, z), StorageStatus::DeletedAdded);
		assert_eq!(storage_status(x, y, o), StorageStatus::ModifiedDeleted);
		assert_eq!(storage_status(x, o, x), StorageStatus::DeletedRestored);
		assert_eq!(storage_status(o, y, o), StorageStatus::AddedDeleted);
		assert_eq!(storage_status(x, y, x), StorageStatus::ModifiedRestored);
		// No-op writes and dirty rewrites both fall back to Assigned.
		assert_eq!(storage_status(x, x, x), StorageStatus::Assigned);
		assert_eq!(storage_status(o, o, o), StorageStatus::Assigned);
		assert_eq!(storage_status(x, y, z), StorageStatus::Assigned);
		assert_eq!(storage_status(o, y, z), StorageStatus::Assigned);
	}

	#[test]
	fn success_statuses() {
		assert!(Status::Stopped.is_success());
		assert!(Status::Returned.is_success());
		assert!(Status::SelfDestructed.is_success());
		assert!(!Status::Running.is_success());
		assert!(!Status::Reverted.is_success());
		assert!(!Status::Failed.is_success());
	}
}
