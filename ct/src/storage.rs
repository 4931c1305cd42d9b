//! The storage view of a conformance-test state: per-key original and
//! current values plus the EIP-2929 warm set.

use std::collections::{BTreeMap, BTreeSet};

use primitive_types::U256;

use tosca_interpreter::{storage_status, StorageStatus};

use crate::ser::u256_map_string;

/// Storage of the executing account, with both per-transaction views.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Storage {
	#[serde(with = "u256_map_string", default)]
	pub current: BTreeMap<U256, U256>,
	#[serde(with = "u256_map_string", default)]
	pub original: BTreeMap<U256, U256>,
	#[serde(with = "crate::ser::u256_set_string", default)]
	pub warm: BTreeSet<U256>,
}

impl Storage {
	#[must_use]
	pub fn get_current(&self, key: U256) -> U256 {
		self.current.get(&key).copied().unwrap_or_default()
	}

	#[must_use]
	pub fn get_original(&self, key: U256) -> U256 {
		self.original.get(&key).copied().unwrap_or_default()
	}

	pub fn set_current(&mut self, key: U256, value: U256) {
		if value.is_zero() {
			self.current.remove(&key);
		} else {
			self.current.insert(key, value);
		}
	}

	pub fn set_original(&mut self, key: U256, value: U256) {
		if value.is_zero() {
			self.original.remove(&key);
		} else {
			self.original.insert(key, value);
		}
	}

	#[must_use]
	pub fn is_warm(&self, key: U256) -> bool {
		self.warm.contains(&key)
	}

	pub fn mark_warm(&mut self, key: U256) {
		self.warm.insert(key);
	}

	/// Classify the write `key <- value` without applying it.
	#[must_use]
	pub fn classify(&self, key: U256, value: U256) -> StorageStatus {
		storage_status(
			crate::ser::u256_to_word(self.get_original(key)),
			crate::ser::u256_to_word(self.get_current(key)),
			crate::ser::u256_to_word(value),
		)
	}

	/// Report the fields in which `self` and `other` differ.
	pub fn diff(&self, other: &Storage, out: &mut Vec<String>) {
		diff_map(&self.current, &other.current, "storage.current", out);
		diff_map(&self.original, &other.original, "storage.original", out);
		for key in self.warm.symmetric_difference(&other.warm) {
			out.push(format!("storage.warm differs for key {key}"));
		}
	}
}

fn diff_map(
	a: &BTreeMap<U256, U256>,
	b: &BTreeMap<U256, U256>,
	name: &str,
	out: &mut Vec<String>,
) {
	for (key, value) in a {
		match b.get(key) {
			None if !value.is_zero() => out.push(format!("{name}[{key}]: {value} vs missing")),
			Some(other) if other != value => {
				out.push(format!("{name}[{key}]: {value} vs {other}"));
			}
			_ => {}
		}
	}
	for (key, value) in b {
		if !a.contains_key(key) && !value.is_zero() {
			out.push(format!("{name}[{key}]: missing vs {value}"));
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn classification_follows_the_nine_codes() {
		let mut storage = Storage::default();
		storage.set_original(U256::one(), U256::from(7u64));
		storage.set_current(U256::one(), U256::from(7u64));
		assert_eq!(storage.classify(U256::one(), U256::zero()), StorageStatus::Deleted);
		assert_eq!(
			storage.classify(U256::one(), U256::from(9u64)),
			StorageStatus::Modified
		);
		assert_eq!(
			storage.classify(U256::one(), U256::from(7u64)),
			StorageStatus::Assigned
		);
		assert_eq!(
			storage.classify(U256::from(2u64), U256::from(1u64)),
			StorageStatus::Added
		);
	}

	#[test]
	fn zero_values_equal_missing_entries() {
		let mut a = Storage::default();
		a.set_current(U256::one(), U256::zero());
		let b = Storage::default();
		let mut out = Vec::new();
		a.diff(&b, &mut out);
		assert!(out.is_empty());
		assert_eq!(a, b);
	}
}
