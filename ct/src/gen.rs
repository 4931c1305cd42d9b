//! The seeded state generator: builds random states satisfying a set of
//! constraints collected from a rule's condition, or reports that the
//! constraints are unsatisfiable.

use primitive_types::{H160, H256, U256};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tosca_interpreter::memory::MAX_MEMORY_EXPANSION_SIZE;
use tosca_interpreter::{Gas, OpCode, Revision, Status, StorageStatus, STACK_LIMIT};

use crate::state::{AccountStub, BlockInfo, CallContext, PlannedCall, State, TxInfo};

/// The constraints could not be met together.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("constraints are unsatisfiable: {0}")]
pub struct Unsatisfiable(pub String);

/// Classes of operation parameters, each with a finite list of
/// interesting sample values used when fuzzing the space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParameterKind {
	Numeric,
	JumpTarget,
	StorageKey,
	MemoryOffset,
	DataOffset,
	Size,
	Topic,
	Address,
	Gas,
	Value,
}

impl ParameterKind {
	/// Interesting concrete values of this parameter class. The slices
	/// are shared; callers must not modify them.
	#[must_use]
	pub fn samples(self) -> &'static [U256] {
		use lazy_static::lazy_static;
		lazy_static! {
			static ref NUMERIC: Vec<U256> = vec![
				U256::zero(),
				U256::one(),
				U256::from(1u64 << 8),
				U256::from(1u64 << 16),
				U256::from(1u64 << 32),
				U256::from(1u64 << 48),
				U256::one() << 64,
				U256::one() << 128,
				U256::one() << 192,
				U256::one() << 255,
				U256::MAX,
				(U256::one() << 64) | U256::one(),
			];
			static ref JUMP_TARGET: Vec<U256> = vec![
				U256::zero(),
				U256::one(),
				U256::from(1u64 << 8),
				U256::from(u64::from(u32::MAX) + 1),
				(U256::one() << 64) | U256::one(),
			];
			static ref MEMORY_OFFSET: Vec<U256> = vec![
				U256::zero(),
				U256::one(),
				U256::from(32u64),
				U256::from(MAX_MEMORY_EXPANSION_SIZE),
				U256::from(MAX_MEMORY_EXPANSION_SIZE + 1),
				U256::one() << 64,
			];
			static ref DATA_OFFSET: Vec<U256> = vec![
				U256::zero(),
				U256::one(),
				U256::from(32u64),
				U256::from(u64::MAX),
				U256::MAX,
			];
			static ref SIZE: Vec<U256> = vec![
				U256::zero(),
				U256::one(),
				U256::from(32u64),
				U256::one() << 64,
				U256::from(2u64 * 24_576 - 1),
				U256::from(2u64 * 24_576),
				U256::from(2u64 * 24_576 + 1),
				U256::from(MAX_MEMORY_EXPANSION_SIZE),
				U256::from(MAX_MEMORY_EXPANSION_SIZE + 1),
			];
			// Two values keep the LOG case count small while still
			// catching topic-order mistakes.
			static ref TOPIC: Vec<U256> = vec![U256::from(101u64), U256::from(102u64)];
			static ref ADDRESS: Vec<U256> = vec![U256::zero(), U256::MAX];
			static ref GAS: Vec<U256> = vec![
				U256::zero(),
				U256::one(),
				U256::from(i64::MAX as u64),
				U256::from(i64::MAX as u64 + 1),
			];
			static ref VALUE: Vec<U256> = vec![U256::zero(), U256::one(), U256::MAX];
		}
		match self {
			ParameterKind::Numeric => &NUMERIC,
			ParameterKind::JumpTarget => &JUMP_TARGET,
			ParameterKind::StorageKey => &NUMERIC,
			ParameterKind::MemoryOffset => &MEMORY_OFFSET,
			ParameterKind::DataOffset => &DATA_OFFSET,
			ParameterKind::Size => &SIZE,
			ParameterKind::Topic => &TOPIC,
			ParameterKind::Address => &ADDRESS,
			ParameterKind::Gas => &GAS,
			ParameterKind::Value => &VALUE,
		}
	}
}

/// Constraint on one stack parameter.
#[derive(Clone, Debug, Default)]
pub struct ParamConstraint {
	pub fixed: Option<U256>,
	pub min: Option<U256>,
	pub max: Option<U256>,
	pub non_zero: bool,
}

/// Cooperating constraint store of all sub-generators.
#[derive(Clone, Debug)]
pub struct StateGenerator {
	pub status: Status,
	pub revision_min: Revision,
	pub revision_max: Revision,
	pub op_at_pc: Option<OpCode>,
	pub pc_past_end: bool,
	pub gas_min: Gas,
	pub gas_max: Gas,
	pub stack_size_min: usize,
	pub stack_size_max: usize,
	pub params: Vec<ParamConstraint>,
	pub parameter_kinds: Vec<ParameterKind>,
	/// Required relation between original, current, and the new value
	/// (parameter 1) of the slot addressed by parameter 0.
	pub storage_config: Option<StorageStatus>,
	/// Warm/cold requirement of the slot addressed by parameter 0.
	pub slot_warm: Option<bool>,
	pub is_static: Option<bool>,
}

impl Default for StateGenerator {
	fn default() -> Self {
		Self {
			status: Status::Running,
			revision_min: Revision::Istanbul,
			revision_max: tosca_interpreter::NEWEST_SUPPORTED_REVISION,
			op_at_pc: None,
			pc_past_end: false,
			gas_min: 0,
			gas_max: 10_000_000,
			stack_size_min: 0,
			stack_size_max: STACK_LIMIT,
			params: Vec::new(),
			parameter_kinds: Vec::new(),
			storage_config: None,
			slot_warm: None,
			is_static: None,
		}
	}
}

impl StateGenerator {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn param_mut(&mut self, index: usize) -> &mut ParamConstraint {
		if self.params.len() <= index {
			self.params.resize_with(index + 1, Default::default);
		}
		&mut self.params[index]
	}

	pub fn restrict_gas_min(&mut self, min: Gas) {
		self.gas_min = self.gas_min.max(min);
	}

	pub fn restrict_gas_max(&mut self, max: Gas) {
		self.gas_max = self.gas_max.min(max);
	}

	pub fn restrict_stack_size_min(&mut self, min: usize) {
		self.stack_size_min = self.stack_size_min.max(min);
	}

	pub fn restrict_stack_size_max(&mut self, max: usize) {
		self.stack_size_max = self.stack_size_max.min(max);
	}

	pub fn restrict_revision_min(&mut self, min: Revision) {
		self.revision_min = self.revision_min.max(min);
	}

	pub fn restrict_revision_max(&mut self, max: Revision) {
		self.revision_max = self.revision_max.min(max);
	}

	fn pick_param(
		&self,
		rng: &mut StdRng,
		index: usize,
	) -> Result<U256, Unsatisfiable> {
		let constraint = self.params.get(index).cloned().unwrap_or_default();
		if let Some(fixed) = constraint.fixed {
			if constraint.non_zero && fixed.is_zero() {
				return Err(Unsatisfiable(format!(
					"parameter {index} fixed to zero but required non-zero"
				)));
			}
			return Ok(fixed);
		}
		for _ in 0..64 {
			let candidate = self.random_param_value(rng, index);
			if constraint.non_zero && candidate.is_zero() {
				continue;
			}
			if let Some(min) = constraint.min {
				if candidate < min {
					continue;
				}
			}
			if let Some(max) = constraint.max {
				if candidate > max {
					continue;
				}
			}
			return Ok(candidate);
		}
		// Directed fallback for tight ranges.
		if let Some(min) = constraint.min {
			return Ok(min);
		}
		if let Some(max) = constraint.max {
			return Ok(max);
		}
		if constraint.non_zero {
			return Ok(U256::one());
		}
		Ok(U256::zero())
	}

	fn random_param_value(&self, rng: &mut StdRng, index: usize) -> U256 {
		let kind = self
			.parameter_kinds
			.get(index)
			.copied()
			.unwrap_or(ParameterKind::Numeric);
		let samples = kind.samples();
		if !samples.is_empty() && rng.gen_bool(0.5) {
			samples[rng.gen_range(0..samples.len())]
		} else {
			random_u256(rng)
		}
	}

	/// Build a state satisfying every collected constraint.
	pub fn generate(&self, rng: &mut StdRng) -> Result<State, Unsatisfiable> {
		if self.revision_min > self.revision_max {
			return Err(Unsatisfiable("empty revision range".to_string()));
		}
		if self.gas_min > self.gas_max {
			return Err(Unsatisfiable("empty gas range".to_string()));
		}
		if self.stack_size_min > self.stack_size_max {
			return Err(Unsatisfiable("empty stack size range".to_string()));
		}
		if self.pc_past_end && self.op_at_pc.is_some() {
			return Err(Unsatisfiable(
				"cannot fix an opcode past the end of code".to_string(),
			));
		}

		let revisions = Revision::all();
		let candidates: Vec<Revision> = revisions
			.iter()
			.copied()
			.filter(|revision| *revision >= self.revision_min && *revision <= self.revision_max)
			.collect();
		let revision = candidates[rng.gen_range(0..candidates.len())];

		let code_len = rng.gen_range(1..=48usize);
		let mut code: Vec<u8> = (0..code_len).map(|_| rng.gen()).collect();
		let pc = if self.pc_past_end {
			code_len as u64 + rng.gen_range(0..4u64)
		} else {
			let pc = rng.gen_range(0..code_len) as u64;
			if let Some(op) = self.op_at_pc {
				code[pc as usize] = op.as_u8();
			}
			pc
		};

		let gas = rng.gen_range(self.gas_min..=self.gas_max);

		let stack_size = rng
			.gen_range(self.stack_size_min..=self.stack_size_max.min(self.stack_size_min + 32));
		let mut params = Vec::new();
		let constrained = self.params.len().max(self.parameter_kinds.len());
		for index in 0..constrained.min(stack_size) {
			params.push(self.pick_param(rng, index)?);
		}
		// Top of the stack first; the remaining slots are free.
		let mut stack: Vec<U256> = Vec::with_capacity(stack_size);
		for _ in params.len()..stack_size {
			stack.push(random_u256(rng));
		}
		for value in params.iter().rev() {
			stack.push(*value);
		}

		let memory_words = rng.gen_range(0..4usize);
		let memory: Vec<u8> = (0..memory_words * 32).map(|_| rng.gen()).collect();

		let mut state = State {
			status: self.status,
			revision,
			pc,
			gas,
			gas_refund: rng.gen_range(0..10_000),
			code,
			stack,
			memory,
			..Default::default()
		};

		state.call_context = CallContext {
			account_address: random_address(rng),
			caller_address: random_address(rng),
			value: random_u256(rng),
			is_static: match self.is_static {
				Some(is_static) => is_static,
				None => rng.gen_bool(0.125),
			},
			depth: rng.gen_range(0..1024),
		};

		// A couple of background storage slots besides the constrained one.
		for _ in 0..rng.gen_range(0..3) {
			let key = random_u256(rng);
			let value = random_u256(rng);
			state.storage.set_current(key, value);
			state.storage.set_original(key, value);
			if rng.gen_bool(0.5) {
				state.storage.mark_warm(key);
			}
		}

		self.apply_storage_constraints(&mut state, rng)?;

		state.transient.insert(random_u256(rng), random_u256(rng));

		let own = state.call_context.account_address;
		state.accounts.insert(
			own,
			AccountStub {
				balance: random_u256(rng),
				code: state.code.clone(),
			},
		);
		for _ in 0..rng.gen_range(0..2) {
			state.accounts.insert(
				random_address(rng),
				AccountStub {
					balance: random_u256(rng),
					code: (0..rng.gen_range(0..8)).map(|_| rng.gen()).collect(),
				},
			);
		}
		state.warm_accounts.insert(own);

		state.future_call_results = (0..2)
			.map(|_| PlannedCall {
				success: rng.gen_bool(0.75),
				output: (0..rng.gen_range(0..40)).map(|_| rng.gen()).collect(),
				gas_consumed: rng.gen_range(0..100_000),
				gas_refund: rng.gen_range(0..1_000),
				created_address: random_address(rng),
			})
			.collect();
		state.last_call_return = (0..rng.gen_range(0..40)).map(|_| rng.gen()).collect();
		state.call_data = (0..rng.gen_range(0..64)).map(|_| rng.gen()).collect();

		state.block = BlockInfo {
			number: rng.gen_range(1..1 << 32),
			timestamp: rng.gen(),
			coinbase: random_address(rng),
			gas_limit: rng.gen_range(0..i64::MAX),
			prev_randao: random_h256(rng),
			chain_id: U256::from(rng.gen_range(1..1024u64)),
			base_fee: U256::from(rng.gen::<u64>()),
			blob_base_fee: U256::from(rng.gen::<u64>()),
		};
		state.transaction = TxInfo {
			origin: random_address(rng),
			gas_price: U256::from(rng.gen::<u64>()),
			blob_hashes: Vec::new(),
		};

		Ok(state)
	}

	fn apply_storage_constraints(
		&self,
		state: &mut State,
		rng: &mut StdRng,
	) -> Result<(), Unsatisfiable> {
		let key = match state.stack_get(0) {
			Some(key) => key,
			None => {
				if self.storage_config.is_some() || self.slot_warm.is_some() {
					return Err(Unsatisfiable(
						"storage constraints need a key parameter".to_string(),
					));
				}
				return Ok(());
			}
		};

		if let Some(config) = self.storage_config {
			let new = state.stack_get(1).unwrap_or_default();
			let (original, current) = storage_shape(config, new, rng)
				.ok_or_else(|| Unsatisfiable(format!("no storage shape for {config:?}")))?;
			state.storage.set_original(key, original);
			state.storage.set_current(key, current);
			debug_assert_eq!(state.storage.classify(key, new), config);
		}

		match self.slot_warm {
			Some(true) => state.storage.mark_warm(key),
			Some(false) => {
				state.storage.warm.remove(&key);
			}
			None => {
				if rng.gen_bool(0.5) {
					state.storage.mark_warm(key);
				}
			}
		}
		Ok(())
	}
}

/// Pick `(original, current)` so that writing `new` yields `config`.
/// `None` when no such shape exists for this `new` value.
fn storage_shape(
	config: StorageStatus,
	new: U256,
	rng: &mut StdRng,
) -> Option<(U256, U256)> {
	let fresh = |rng: &mut StdRng, exclude: &[U256]| loop {
		let candidate = random_u256(rng);
		if !candidate.is_zero() && !exclude.contains(&candidate) {
			return candidate;
		}
	};
	let zero = U256::zero();
	match config {
		StorageStatus::Assigned => Some((new, new)),
		StorageStatus::Added => (!new.is_zero()).then(|| (zero, zero)),
		StorageStatus::Deleted => new.is_zero().then(|| {
			let x = fresh(rng, &[]);
			(x, x)
		}),
		StorageStatus::Modified => (!new.is_zero()).then(|| {
			let x = fresh(rng, &[new]);
			(x, x)
		}),
		StorageStatus::DeletedAdded => (!new.is_zero()).then(|| (fresh(rng, &[new]), zero)),
		StorageStatus::ModifiedDeleted => new.is_zero().then(|| {
			let x = fresh(rng, &[]);
			(x, fresh(rng, &[x]))
		}),
		StorageStatus::DeletedRestored => (!new.is_zero()).then_some((new, zero)),
		StorageStatus::AddedDeleted => new.is_zero().then(|| (zero, fresh(rng, &[]))),
		StorageStatus::ModifiedRestored => {
			(!new.is_zero()).then(|| (new, fresh(rng, &[new])))
		}
	}
}

pub fn random_u256(rng: &mut StdRng) -> U256 {
	U256([rng.gen(), rng.gen(), rng.gen(), rng.gen()])
}

fn random_address(rng: &mut StdRng) -> H160 {
	let mut bytes = [0u8; 20];
	rng.fill(&mut bytes);
	H160(bytes)
}

fn random_h256(rng: &mut StdRng) -> H256 {
	let mut bytes = [0u8; 32];
	rng.fill(&mut bytes);
	H256(bytes)
}

/// A seeded generator run.
pub fn seeded_rng(seed: u64) -> StdRng {
	StdRng::seed_from_u64(seed)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn same_seed_same_state() {
		let generator = StateGenerator::new();
		let a = generator.generate(&mut seeded_rng(42)).unwrap();
		let b = generator.generate(&mut seeded_rng(42)).unwrap();
		assert_eq!(a, b);
		let c = generator.generate(&mut seeded_rng(43)).unwrap();
		assert_ne!(a, c);
	}

	#[test]
	fn fixed_opcode_lands_under_the_pc(){
		let mut generator = StateGenerator::new();
		generator.op_at_pc = Some(OpCode::ADD);
		generator.restrict_stack_size_min(2);
		let state = generator.generate(&mut seeded_rng(7)).unwrap();
		assert_eq!(state.op_at_pc(), Some(OpCode::ADD.as_u8()));
		assert!(state.stack.len() >= 2);
	}

	#[test]
	fn inconsistent_ranges_are_rejected() {
		let mut generator = StateGenerator::new();
		generator.restrict_gas_min(100);
		generator.restrict_gas_max(50);
		assert!(generator.generate(&mut seeded_rng(1)).is_err());

		let mut generator = StateGenerator::new();
		generator.restrict_revision_min(Revision::Cancun);
		generator.restrict_revision_max(Revision::Berlin);
		assert!(generator.generate(&mut seeded_rng(1)).is_err());
	}

	#[test]
	fn storage_configs_generate_matching_shapes() {
		for config in StorageStatus::all() {
			let mut generator = StateGenerator::new();
			generator.storage_config = Some(config);
			generator.restrict_stack_size_min(2);
			generator.parameter_kinds =
				vec![ParameterKind::StorageKey, ParameterKind::Numeric];
			match config {
				StorageStatus::Deleted
				| StorageStatus::ModifiedDeleted
				| StorageStatus::AddedDeleted => {
					generator.param_mut(1).fixed = Some(U256::zero());
				}
				StorageStatus::Assigned => {}
				_ => generator.param_mut(1).non_zero = true,
			}
			let state = generator.generate(&mut seeded_rng(11)).unwrap();
			let key = state.stack_get(0).unwrap();
			let new = state.stack_get(1).unwrap();
			assert_eq!(state.storage.classify(key, new), config, "{config:?}");
		}
	}
}
