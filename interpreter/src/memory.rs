use primitive_types::U256;

use crate::error::Fault;
use crate::types::Gas;

/// Hard cap on memory expansion. Accesses that would grow memory past this
/// point fail the frame before any quadratic-cost overflow can occur.
pub const MAX_MEMORY_EXPANSION_SIZE: u64 = 1 << 32;

/// Number of 32-byte words needed to hold `size` bytes.
#[must_use]
pub const fn size_in_words(size: u64) -> u64 {
	size.div_ceil(32)
}

/// Total cost of a memory of `words` words: `3·w + w²/512`.
#[must_use]
pub const fn memory_cost(words: u64) -> Gas {
	(3 * words + words * words / 512) as Gas
}

/// Word-addressed, gas-metered expanding memory of one frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Memory {
	data: Vec<u8>,
}

impl Memory {
	#[must_use]
	pub fn new() -> Self {
		Self { data: Vec::new() }
	}

	#[must_use]
	pub fn from_bytes(data: Vec<u8>) -> Self {
		Self { data }
	}

	/// Current size in bytes; always a multiple of 32.
	#[inline]
	#[must_use]
	pub fn len(&self) -> usize {
		self.data.len()
	}

	#[inline]
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}

	#[must_use]
	pub fn data(&self) -> &[u8] {
		&self.data
	}

	/// Cost of growing from the current size to cover `end` bytes.
	/// Zero when no growth is needed.
	#[must_use]
	pub fn expansion_cost(&self, end: u64) -> Gas {
		let current_words = size_in_words(self.data.len() as u64);
		let new_words = size_in_words(end);
		if new_words <= current_words {
			return 0;
		}
		memory_cost(new_words) - memory_cost(current_words)
	}

	/// Grow memory to cover `[offset, offset + size)`, charging the growth
	/// differential against `gas`. Zero-sized accesses never expand.
	pub fn expand(&mut self, offset: U256, size: U256, gas: &mut Gas) -> Result<(), Fault> {
		if size.is_zero() {
			return Ok(());
		}
		let limit = U256::from(MAX_MEMORY_EXPANSION_SIZE);
		if offset > limit || size > limit {
			*gas = 0;
			return Err(Fault::OutOfMemory);
		}
		let end = offset.as_u64() + size.as_u64();
		if end > MAX_MEMORY_EXPANSION_SIZE {
			*gas = 0;
			return Err(Fault::OutOfMemory);
		}

		let cost = self.expansion_cost(end);
		if cost > *gas {
			*gas = 0;
			return Err(Fault::OutOfGas);
		}
		*gas -= cost;

		let new_len = (size_in_words(end) * 32) as usize;
		if new_len > self.data.len() {
			self.data.resize(new_len, 0);
		}
		Ok(())
	}

	/// Read `len` bytes at `offset`. The range must have been expanded.
	#[must_use]
	pub fn read(&self, offset: usize, len: usize) -> &[u8] {
		&self.data[offset..offset + len]
	}

	/// Copy a 32-byte word at `offset`.
	#[must_use]
	pub fn read_word(&self, offset: usize) -> [u8; 32] {
		let mut word = [0u8; 32];
		word.copy_from_slice(&self.data[offset..offset + 32]);
		word
	}

	/// Write `data` at `offset`. The range must have been expanded.
	pub fn write(&mut self, offset: usize, data: &[u8]) {
		self.data[offset..offset + data.len()].copy_from_slice(data);
	}

	pub fn write_byte(&mut self, offset: usize, byte: u8) {
		self.data[offset] = byte;
	}

	/// Copy within memory, with overlapping ranges allowed (MCOPY).
	pub fn copy_within(&mut self, src: usize, dst: usize, len: usize) {
		self.data.copy_within(src..src + len, dst);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn expansion_is_word_granular() {
		let mut memory = Memory::new();
		let mut gas: Gas = 1_000_000;
		memory
			.expand(U256::zero(), U256::from(1u64), &mut gas)
			.unwrap();
		assert_eq!(memory.len(), 32);
		memory
			.expand(U256::from(31u64), U256::from(2u64), &mut gas)
			.unwrap();
		assert_eq!(memory.len(), 64);
	}

	#[test]
	fn expansion_cost_is_monotone() {
		let memory = Memory::new();
		let mut last = 0;
		for end in (0..8192u64).step_by(32) {
			let cost = memory.expansion_cost(end);
			assert!(cost >= last);
			last = cost;
		}
	}

	#[test]
	fn quadratic_cost_matches_the_formula() {
		let memory = Memory::new();
		// One word costs 3, 1024 words cost 3*1024 + 1024*1024/512.
		assert_eq!(memory.expansion_cost(32), 3);
		assert_eq!(memory.expansion_cost(1024 * 32), 3 * 1024 + 2048);
	}

	#[test]
	fn writing_at_zero_expands_at_most_one_word_per_32_bytes() {
		let mut memory = Memory::new();
		let mut gas: Gas = 1_000_000;
		memory
			.expand(U256::zero(), U256::from(40u64), &mut gas)
			.unwrap();
		assert_eq!(memory.len(), 64);
	}

	#[test]
	fn zero_size_never_expands() {
		let mut memory = Memory::new();
		let mut gas: Gas = 0;
		memory
			.expand(U256::MAX, U256::zero(), &mut gas)
			.unwrap();
		assert_eq!(memory.len(), 0);
	}

	#[test]
	fn expansion_past_the_cap_faults() {
		let mut memory = Memory::new();
		let mut gas: Gas = i64::MAX;
		let err = memory
			.expand(U256::from(MAX_MEMORY_EXPANSION_SIZE), U256::from(1u64), &mut gas)
			.unwrap_err();
		assert_eq!(err, Fault::OutOfMemory);
		assert_eq!(gas, 0);
	}

	#[test]
	fn insufficient_gas_faults_and_consumes_everything() {
		let mut memory = Memory::new();
		let mut gas: Gas = 2;
		let err = memory
			.expand(U256::zero(), U256::from(32u64), &mut gas)
			.unwrap_err();
		assert_eq!(err, Fault::OutOfGas);
		assert_eq!(gas, 0);
		assert_eq!(memory.len(), 0);
	}
}
