//! Dynamic gas rules shared by the engines.

use crate::revision::Revision;
use crate::types::{Gas, StorageStatus};

/// Paid for CALL when the destination did not exist before.
pub const CALL_NEW_ACCOUNT_GAS: Gas = 25_000;
/// Paid for CALL when the transferred value is non-zero.
pub const CALL_VALUE_TRANSFER_GAS: Gas = 9_000;
/// Free gas granted to the callee of a value-bearing call.
pub const CALL_STIPEND: Gas = 2_300;

/// Cold/warm access surcharges (EIP-2929, Berlin).
pub const COLD_SLOAD_COST: Gas = 2_100;
pub const COLD_ACCOUNT_ACCESS_COST: Gas = 2_600;
pub const WARM_STORAGE_READ_COST: Gas = 100;

/// SSTORE cannot run on less than this much gas (EIP-2200).
pub const SSTORE_SENTRY_GAS: Gas = 2_300;

/// Per-word surcharges.
pub const COPY_WORD_GAS: Gas = 3;
pub const KECCAK_WORD_GAS: Gas = 6;
pub const INIT_CODE_WORD_GAS: Gas = 2;
pub const LOG_DATA_GAS: Gas = 8;

/// Code deposit cost per byte of deployed code.
pub const CREATE_GAS_PER_BYTE: Gas = 200;
/// Largest code a CREATE may deploy.
pub const MAX_CODE_SIZE: usize = 24_576;
/// Largest init code a create frame accepts (EIP-3860, Shanghai).
pub const MAX_INIT_CODE_SIZE: usize = 2 * MAX_CODE_SIZE;

/// Refund for clearing an account via SELFDESTRUCT, dropped by London.
pub const SELFDESTRUCT_REFUND_GAS: Gas = 24_000;

/// Dynamic cost of an SSTORE transition, excluding the cold-slot
/// surcharge.
#[must_use]
pub fn sstore_dynamic_gas(revision: Revision, status: StorageStatus) -> Gas {
	match status {
		StorageStatus::Added => 20_000,
		StorageStatus::Modified | StorageStatus::Deleted => {
			if revision >= Revision::Berlin {
				2_900
			} else {
				5_000
			}
		}
		_ => {
			if revision >= Revision::Berlin {
				100
			} else {
				800
			}
		}
	}
}

/// Refund granted (or clawed back) by an SSTORE transition.
#[must_use]
pub fn sstore_refund(revision: Revision, status: StorageStatus) -> Gas {
	match status {
		StorageStatus::Deleted | StorageStatus::ModifiedDeleted => {
			if revision >= Revision::London {
				4_800
			} else {
				15_000
			}
		}
		StorageStatus::DeletedAdded => {
			if revision >= Revision::London {
				-4_800
			} else {
				-15_000
			}
		}
		StorageStatus::DeletedRestored => {
			if revision >= Revision::London {
				-4_800 + 5_000 - 2_100 - 100
			} else if revision >= Revision::Berlin {
				-15_000 + 5_000 - 2_100 - 100
			} else {
				-15_000 + 4_200
			}
		}
		StorageStatus::AddedDeleted => {
			if revision >= Revision::Berlin {
				19_900
			} else {
				19_200
			}
		}
		StorageStatus::ModifiedRestored => {
			if revision >= Revision::Berlin {
				5_000 - 2_100 - 100
			} else {
				4_200
			}
		}
		_ => 0,
	}
}

/// Cap applied to the accumulated refund when a frame closes.
#[must_use]
pub fn max_refund(revision: Revision, gas_used: Gas) -> Gas {
	if revision >= Revision::London {
		gas_used / 5
	} else {
		gas_used / 2
	}
}

/// All-but-one-64th rule (EIP-150): the most gas a frame may forward.
#[must_use]
pub fn callable_gas(available: Gas) -> Gas {
	available - available / 64
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sstore_x_x_zero_costs_2900_refunds_4800_on_cancun() {
		let status = StorageStatus::Deleted;
		assert_eq!(sstore_dynamic_gas(Revision::Cancun, status), 2_900);
		assert_eq!(sstore_refund(Revision::Cancun, status), 4_800);
	}

	#[test]
	fn refund_cap_switches_at_london() {
		assert_eq!(max_refund(Revision::Berlin, 100), 50);
		assert_eq!(max_refund(Revision::London, 100), 20);
	}

	#[test]
	fn callable_gas_keeps_one_64th() {
		assert_eq!(callable_gas(6_400), 6_300);
		assert_eq!(callable_gas(63), 63);
	}
}
