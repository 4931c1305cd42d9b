//! The precompiled-contract surface.
//!
//! The processor needs the address roster for access-list pre-warming and
//! dispatch. SHA-256 and the identity copy are implemented natively; the
//! remaining built-ins live in external library bindings and are reported
//! as unavailable here.

use primitive_types::H160;

use sha2::{Digest, Sha256};
use tosca_interpreter::{CallResult, Gas, Revision};

fn precompile_address(index: u8) -> H160 {
	let mut bytes = [0u8; 20];
	bytes[19] = index;
	H160(bytes)
}

/// Addresses of the contracts built into the given revision.
#[must_use]
pub fn addresses(revision: Revision) -> Vec<H160> {
	let count = if revision >= Revision::Cancun { 10 } else { 9 };
	(1..=count).map(precompile_address).collect()
}

#[must_use]
pub fn is_precompile(address: H160, revision: Revision) -> bool {
	let last = if revision >= Revision::Cancun { 10 } else { 9 };
	let bytes = address.as_bytes();
	bytes[..19].iter().all(|byte| *byte == 0) && (1..=last).contains(&bytes[19])
}

fn linear_cost(len: usize, base: Gas, word: Gas) -> Gas {
	base + word * ((len as Gas) + 31) / 32
}

fn out_of_gas() -> CallResult {
	CallResult {
		success: false,
		..Default::default()
	}
}

/// Execute the built-in at `address`. Contracts without a native
/// implementation fail the call; their results come from external
/// bindings when those are linked in.
#[must_use]
pub fn run_precompile(
	_revision: Revision,
	address: H160,
	input: &[u8],
	gas: Gas,
) -> CallResult {
	match address.as_bytes()[19] {
		0x02 => {
			let cost = linear_cost(input.len(), 60, 12);
			if cost > gas {
				return out_of_gas();
			}
			CallResult {
				success: true,
				output: Sha256::digest(input).to_vec(),
				gas_left: gas - cost,
				..Default::default()
			}
		}
		0x04 => {
			let cost = linear_cost(input.len(), 15, 3);
			if cost > gas {
				return out_of_gas();
			}
			CallResult {
				success: true,
				output: input.to_vec(),
				gas_left: gas - cost,
				..Default::default()
			}
		}
		other => {
			log::debug!("no native implementation for precompile 0x{other:02x}");
			out_of_gas()
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn roster_grows_at_cancun() {
		assert_eq!(addresses(Revision::Shanghai).len(), 9);
		assert_eq!(addresses(Revision::Cancun).len(), 10);
		assert!(is_precompile(precompile_address(9), Revision::Istanbul));
		assert!(!is_precompile(precompile_address(10), Revision::Shanghai));
		assert!(is_precompile(precompile_address(10), Revision::Cancun));
		assert!(!is_precompile(precompile_address(0), Revision::Cancun));
		assert!(!is_precompile(H160::repeat_byte(1), Revision::Cancun));
	}

	#[test]
	fn identity_copies_input() {
		let result = run_precompile(Revision::Cancun, precompile_address(4), b"abc", 100);
		assert!(result.success);
		assert_eq!(result.output, b"abc");
		assert_eq!(result.gas_left, 100 - 18);
	}

	#[test]
	fn sha256_hashes_input() {
		let result = run_precompile(Revision::Cancun, precompile_address(2), b"", 100);
		assert!(result.success);
		assert_eq!(
			hex::encode(result.output),
			"e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
		);
		assert_eq!(result.gas_left, 100 - 60);
	}

	#[test]
	fn deficient_gas_fails_the_call() {
		let result = run_precompile(Revision::Cancun, precompile_address(4), b"abc", 10);
		assert!(!result.success);
		assert_eq!(result.gas_left, 0);
	}
}
