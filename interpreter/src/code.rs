//! Code representations of the two engines: raw bytecode with a
//! jump-destination bitmap, and the rewritten long-form instruction
//! stream with pre-decoded PUSH immediates.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use primitive_types::{H256, U256};

use crate::analysis::{find_jump_destinations, JumpDestMap};
use crate::opcode::OpCode;

/// One slot of the long-form stream. The stream is index-aligned with the
/// raw code, so program counters translate one-to-one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LongInstruction {
	/// A plain instruction.
	Op(OpCode),
	/// A PUSH with its immediate already decoded (zero-padded at the end
	/// of code).
	Push(U256),
	/// A byte covered by a preceding PUSH immediate.
	Data,
	/// A valid jump destination.
	JumpDest,
}

/// Rewritten form of one code blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LongCode {
	raw: Vec<u8>,
	instructions: Vec<LongInstruction>,
}

impl LongCode {
	/// Rewrite raw bytecode into the long form.
	#[must_use]
	pub fn rewrite(code: &[u8]) -> Self {
		let mut instructions = Vec::with_capacity(code.len());
		let mut index = 0;
		while index < code.len() {
			let op = OpCode(code[index]);
			if op == OpCode::JUMPDEST {
				instructions.push(LongInstruction::JumpDest);
				index += 1;
				continue;
			}
			if let Some(data_len) = op.push_data_len() {
				instructions.push(LongInstruction::Push(decode_push(code, index, data_len)));
				let available = data_len.min(code.len() - index - 1);
				for _ in 0..available {
					instructions.push(LongInstruction::Data);
				}
				index += 1 + available;
				continue;
			}
			instructions.push(LongInstruction::Op(op));
			index += 1;
		}
		Self {
			raw: code.to_vec(),
			instructions,
		}
	}

	#[must_use]
	pub fn raw(&self) -> &[u8] {
		&self.raw
	}

	#[must_use]
	pub fn instruction(&self, index: usize) -> Option<&LongInstruction> {
		self.instructions.get(index)
	}
}

/// Immediate value of the PUSH at `pc`, zero-padded past the end of code.
#[must_use]
pub fn decode_push(code: &[u8], pc: usize, data_len: usize) -> U256 {
	let start = pc + 1;
	let end = (start + data_len).min(code.len());
	let mut bytes = [0u8; 32];
	if start < end {
		bytes[32 - data_len..32 - data_len + (end - start)].copy_from_slice(&code[start..end]);
	}
	U256::from_big_endian(&bytes)
}

/// The frame's view of its code. Both variants expose identical
/// observable semantics; they differ in how fetch and jump checks are
/// implemented.
#[derive(Clone, Debug)]
pub enum CodeView {
	Raw {
		code: Arc<Vec<u8>>,
		jumpdests: Arc<JumpDestMap>,
	},
	Long(Arc<LongCode>),
}

impl CodeView {
	#[must_use]
	pub fn raw_without_analysis(code: Vec<u8>) -> Self {
		let jumpdests = Arc::new(find_jump_destinations(&code));
		CodeView::Raw {
			code: Arc::new(code),
			jumpdests,
		}
	}

	#[inline]
	#[must_use]
	pub fn len(&self) -> usize {
		self.raw().len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.raw().is_empty()
	}

	#[inline]
	#[must_use]
	pub fn raw(&self) -> &[u8] {
		match self {
			CodeView::Raw { code, .. } => code,
			CodeView::Long(long) => long.raw(),
		}
	}

	/// The opcode at `pc`. A byte inside a PUSH immediate decodes as the
	/// opcode of its raw value.
	#[inline]
	#[must_use]
	pub fn opcode_at(&self, pc: usize) -> OpCode {
		match self {
			CodeView::Raw { code, .. } => OpCode(code[pc]),
			CodeView::Long(long) => match long.instruction(pc) {
				Some(LongInstruction::Op(op)) => *op,
				Some(LongInstruction::JumpDest) => OpCode::JUMPDEST,
				Some(LongInstruction::Push(_)) | Some(LongInstruction::Data) | None => {
					OpCode(long.raw()[pc])
				}
			},
		}
	}

	/// Immediate of the PUSH instruction at `pc`.
	#[inline]
	#[must_use]
	pub fn push_value(&self, pc: usize, data_len: usize) -> U256 {
		match self {
			CodeView::Raw { code, .. } => decode_push(code, pc, data_len),
			CodeView::Long(long) => match long.instruction(pc) {
				Some(LongInstruction::Push(value)) => *value,
				_ => decode_push(long.raw(), pc, data_len),
			},
		}
	}

	#[inline]
	#[must_use]
	pub fn is_jump_dest(&self, target: usize) -> bool {
		match self {
			CodeView::Raw { jumpdests, .. } => jumpdests.is_jump_dest(target),
			CodeView::Long(long) => {
				matches!(long.instruction(target), Some(LongInstruction::JumpDest))
			}
		}
	}
}

/// LRU cache of long-form rewrites, keyed by code hash. Idempotent:
/// concurrent misses for one key produce equal streams.
pub struct ConversionCache {
	cache: Mutex<LruCache<H256, Arc<LongCode>>>,
	max_cached_code_size: usize,
}

impl ConversionCache {
	#[must_use]
	pub fn new(entries: usize, max_cached_code_size: usize) -> Self {
		let capacity = NonZeroUsize::new(entries.max(1)).unwrap();
		Self {
			cache: Mutex::new(LruCache::new(capacity)),
			max_cached_code_size,
		}
	}

	pub fn convert(&self, code: &[u8], code_hash: Option<H256>) -> Arc<LongCode> {
		let Some(hash) = code_hash else {
			return Arc::new(LongCode::rewrite(code));
		};
		if let Some(long) = self.cache.lock().unwrap().get(&hash) {
			return Arc::clone(long);
		}
		if code.len() > self.max_cached_code_size {
			return Arc::new(LongCode::rewrite(code));
		}
		let long = Arc::new(LongCode::rewrite(code));
		self.cache.lock().unwrap().put(hash, Arc::clone(&long));
		long
	}
}

impl Default for ConversionCache {
	fn default() -> Self {
		Self::new(1 << 13, crate::analysis::MAX_CACHED_CODE_SIZE)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rewrite_marks_push_data() {
		let code = [OpCode::PUSH2.0, 0x11, 0x22, OpCode::ADD.0];
		let long = LongCode::rewrite(&code);
		assert_eq!(
			long.instruction(0),
			Some(&LongInstruction::Push(U256::from(0x1122u64)))
		);
		assert_eq!(long.instruction(1), Some(&LongInstruction::Data));
		assert_eq!(long.instruction(2), Some(&LongInstruction::Data));
		assert_eq!(long.instruction(3), Some(&LongInstruction::Op(OpCode::ADD)));
	}

	#[test]
	fn truncated_push_is_zero_padded() {
		let code = [OpCode::PUSH4.0, 0xff];
		let long = LongCode::rewrite(&code);
		assert_eq!(
			long.instruction(0),
			Some(&LongInstruction::Push(U256::from(0xff000000u64)))
		);
		let view = CodeView::Long(Arc::new(long));
		assert_eq!(view.push_value(0, 4), U256::from(0xff000000u64));

		let raw = CodeView::raw_without_analysis(code.to_vec());
		assert_eq!(raw.push_value(0, 4), U256::from(0xff000000u64));
	}

	#[test]
	fn both_views_agree_on_jump_destinations() {
		let code = [
			OpCode::PUSH1.0,
			OpCode::JUMPDEST.0,
			OpCode::JUMPDEST.0,
			OpCode::STOP.0,
		];
		let raw = CodeView::raw_without_analysis(code.to_vec());
		let long = CodeView::Long(Arc::new(LongCode::rewrite(&code)));
		for pc in 0..5 {
			assert_eq!(raw.is_jump_dest(pc), long.is_jump_dest(pc), "pc {pc}");
		}
	}

	#[test]
	fn conversion_cache_is_content_addressed() {
		let cache = ConversionCache::default();
		let code = [OpCode::PUSH1.0, 0x01, OpCode::STOP.0];
		let hash = H256::repeat_byte(0x07);
		let first = cache.convert(&code, Some(hash));
		let second = cache.convert(&code, Some(hash));
		assert!(Arc::ptr_eq(&first, &second));
		let uncached = cache.convert(&code, None);
		assert_eq!(*uncached, *first);
	}
}
