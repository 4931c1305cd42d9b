//! Jump-destination analysis and its content-addressed cache.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use primitive_types::H256;

use crate::opcode::OpCode;

/// Code size up to which analyses are cached. Matches the on-chain code
/// limit; init code has no stable hash and is never cached.
pub const MAX_CACHED_CODE_SIZE: usize = 24_576;

/// Default cache capacity in bytes.
pub const DEFAULT_CACHE_SIZE: usize = 1 << 28;

/// Packed bitmap of valid jump destinations within one code blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JumpDestMap {
	bitmap: Vec<u64>,
	code_size: usize,
}

impl JumpDestMap {
	fn with_code_size(code_size: usize) -> Self {
		let mut words = code_size / 64;
		if code_size % 64 != 0 {
			words += 1;
		}
		Self {
			bitmap: vec![0; words],
			code_size,
		}
	}

	/// Whether `index` is a valid jump destination. Out-of-range indices
	/// are never valid.
	#[must_use]
	pub fn is_jump_dest(&self, index: usize) -> bool {
		if index >= self.code_size {
			return false;
		}
		let (word, mask) = index_and_mask(index);
		match self.bitmap.get(word) {
			Some(bits) => bits & mask != 0,
			None => false,
		}
	}

	/// Mark `index` as a jump destination. Out-of-range marks are no-ops.
	fn mark(&mut self, index: usize) {
		if index >= self.code_size {
			return;
		}
		let (word, mask) = index_and_mask(index);
		if let Some(bits) = self.bitmap.get_mut(word) {
			*bits |= mask;
		}
	}

	#[must_use]
	pub fn code_size(&self) -> usize {
		self.code_size
	}
}

fn index_and_mask(index: usize) -> (usize, u64) {
	(index / 64, 1u64 << (index % 64))
}

/// Scan `code` and mark every JUMPDEST byte that is not covered by the
/// immediate data of a preceding PUSH.
#[must_use]
pub fn find_jump_destinations(code: &[u8]) -> JumpDestMap {
	let mut map = JumpDestMap::with_code_size(code.len());
	let mut index = 0;
	while index < code.len() {
		let op = OpCode(code[index]);
		if let Some(data) = op.push_data_len() {
			index += data + 1;
			continue;
		}
		if op == OpCode::JUMPDEST {
			map.mark(index);
		}
		index += 1;
	}
	map
}

/// LRU cache of jump-destination analyses, keyed by code hash.
///
/// Capacity is expressed in bytes and translated into an entry count via
/// the maximum cacheable code size. Writes are serialised through the
/// inner lock; two concurrent misses for the same key both compute the
/// same bitmap, so either result may win.
pub struct AnalysisCache {
	cache: Mutex<LruCache<H256, Arc<JumpDestMap>>>,
	max_cached_code_size: usize,
}

impl AnalysisCache {
	#[must_use]
	pub fn new(size_in_bytes: usize, max_cached_code_size: usize) -> Self {
		// One bit of bitmap per code byte.
		let entries = (size_in_bytes / max_cached_code_size.max(1)) * 8;
		let capacity = NonZeroUsize::new(entries.max(1)).unwrap();
		log::debug!(
			"analysis cache: {} bytes -> {} entries",
			size_in_bytes,
			capacity
		);
		Self {
			cache: Mutex::new(LruCache::new(capacity)),
			max_cached_code_size,
		}
	}

	/// Analyse `code`, consulting the cache when a stable hash is known.
	/// Over-long codes bypass the cache entirely.
	pub fn analyze(&self, code: &[u8], code_hash: Option<H256>) -> Arc<JumpDestMap> {
		let Some(hash) = code_hash else {
			return Arc::new(find_jump_destinations(code));
		};

		if let Some(map) = self.cache.lock().unwrap().get(&hash) {
			return Arc::clone(map);
		}

		if code.len() > self.max_cached_code_size {
			return Arc::new(find_jump_destinations(code));
		}

		let map = Arc::new(find_jump_destinations(code));
		self.cache
			.lock()
			.unwrap()
			.put(hash, Arc::clone(&map));
		map
	}
}

impl Default for AnalysisCache {
	fn default() -> Self {
		Self::new(DEFAULT_CACHE_SIZE, MAX_CACHED_CODE_SIZE)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn jumpdest_outside_push_data_is_valid() {
		let code = [OpCode::JUMPDEST.0, OpCode::ADD.0, OpCode::JUMPDEST.0];
		let map = find_jump_destinations(&code);
		assert!(map.is_jump_dest(0));
		assert!(!map.is_jump_dest(1));
		assert!(map.is_jump_dest(2));
	}

	#[test]
	fn jumpdest_inside_push_data_is_not_valid() {
		let code = [OpCode::PUSH2.0, OpCode::JUMPDEST.0, OpCode::JUMPDEST.0, OpCode::JUMPDEST.0];
		let map = find_jump_destinations(&code);
		assert!(!map.is_jump_dest(0));
		assert!(!map.is_jump_dest(1));
		assert!(!map.is_jump_dest(2));
		assert!(map.is_jump_dest(3));
	}

	#[test]
	fn truncated_push_covers_the_tail() {
		let code = [OpCode::PUSH32.0, OpCode::JUMPDEST.0];
		let map = find_jump_destinations(&code);
		assert!(!map.is_jump_dest(1));
	}

	#[test]
	fn out_of_range_queries_are_false() {
		let code = [OpCode::JUMPDEST.0];
		let map = find_jump_destinations(&code);
		assert!(map.is_jump_dest(0));
		assert!(!map.is_jump_dest(1));
		assert!(!map.is_jump_dest(1 << 20));
	}

	#[test]
	fn bitmap_spans_the_whole_code() {
		for size in [0usize, 1, 63, 64, 65, 1000] {
			let code = vec![OpCode::JUMPDEST.0; size];
			let map = find_jump_destinations(&code);
			assert!(map.bitmap.len() * 64 >= size);
			for index in 0..size {
				assert!(map.is_jump_dest(index));
			}
		}
	}

	#[test]
	fn cached_and_uncached_results_agree() {
		let cache = AnalysisCache::new(1 << 20, MAX_CACHED_CODE_SIZE);
		let code = [
			OpCode::PUSH1.0,
			OpCode::JUMPDEST.0,
			OpCode::JUMPDEST.0,
			OpCode::STOP.0,
		];
		let hash = H256::repeat_byte(0x42);
		let uncached = find_jump_destinations(&code);
		let first = cache.analyze(&code, Some(hash));
		let second = cache.analyze(&code, Some(hash));
		assert_eq!(*first, uncached);
		assert_eq!(*second, uncached);
		assert!(Arc::ptr_eq(&first, &second));
	}

	#[test]
	fn long_code_bypasses_the_cache() {
		let cache = AnalysisCache::new(1 << 20, 16);
		let code = vec![OpCode::JUMPDEST.0; 17];
		let hash = H256::repeat_byte(0x01);
		let first = cache.analyze(&code, Some(hash));
		let second = cache.analyze(&code, Some(hash));
		assert_eq!(*first, *second);
		assert!(!Arc::ptr_eq(&first, &second));
	}

	#[test]
	fn missing_hash_bypasses_the_cache() {
		let cache = AnalysisCache::default();
		let code = [OpCode::JUMPDEST.0];
		let first = cache.analyze(&code, None);
		let second = cache.analyze(&code, None);
		assert!(!Arc::ptr_eq(&first, &second));
	}
}
