//! The boolean condition language over conformance-test states. Every
//! variant can test a state, narrow the state generator so that every
//! generated state satisfies it, and print itself.

use core::fmt;

use primitive_types::U256;

use tosca_interpreter::{Gas, OpCode, Revision, Status, StorageStatus};

use crate::gen::StateGenerator;
use crate::ser::status_string;
use crate::state::State;

/// A condition over states.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Condition {
	And(Vec<Condition>),
	Or(Vec<Condition>),
	Not(Box<Condition>),
	/// The frame is in the given status.
	StatusIs(Status),
	RevisionAtLeast(Revision),
	RevisionAtMost(Revision),
	RevisionIs(Revision),
	/// The program counter is inside the code and the byte under it is
	/// this opcode.
	Op(OpCode),
	/// The program counter sits on an instruction boundary.
	IsCode,
	/// The program counter sits inside PUSH immediate data.
	IsData,
	/// The program counter is at or past the end of the code.
	PcPastEnd,
	GasAtLeast(Gas),
	GasBelow(Gas),
	StackSizeAtLeast(usize),
	StackSizeBelow(usize),
	/// The stack value `depth` below the top equals the constant.
	ParamEq(usize, U256),
	ParamNe(usize, U256),
	ParamLt(usize, U256),
	ParamLe(usize, U256),
	ParamGt(usize, U256),
	ParamGe(usize, U256),
	/// Writing parameter 1 to the slot addressed by parameter 0 yields
	/// the given storage transition.
	StorageStatusIs(StorageStatus),
	/// Warmth of the slot addressed by parameter 0.
	IsStorageWarm,
	IsStorageCold,
	/// The frame runs under a STATICCALL.
	IsStatic,
}

impl Condition {
	/// Whether the state satisfies this condition.
	#[must_use]
	pub fn check(&self, state: &State) -> bool {
		match self {
			Condition::And(conditions) => conditions.iter().all(|c| c.check(state)),
			Condition::Or(conditions) => conditions.iter().any(|c| c.check(state)),
			Condition::Not(condition) => !condition.check(state),
			Condition::StatusIs(status) => state.status == *status,
			Condition::RevisionAtLeast(revision) => state.revision >= *revision,
			Condition::RevisionAtMost(revision) => state.revision <= *revision,
			Condition::RevisionIs(revision) => state.revision == *revision,
			Condition::Op(op) => state.op_at_pc() == Some(op.as_u8()),
			Condition::IsCode => is_instruction_boundary(state) == Some(true),
			Condition::IsData => is_instruction_boundary(state) == Some(false),
			Condition::PcPastEnd => state.pc as usize >= state.code.len(),
			Condition::GasAtLeast(gas) => state.gas >= *gas,
			Condition::GasBelow(gas) => state.gas < *gas,
			Condition::StackSizeAtLeast(size) => state.stack.len() >= *size,
			Condition::StackSizeBelow(size) => state.stack.len() < *size,
			Condition::ParamEq(index, value) => state.stack_get(*index) == Some(*value),
			Condition::ParamNe(index, value) => {
				state.stack_get(*index).is_some_and(|v| v != *value)
			}
			Condition::ParamLt(index, value) => {
				state.stack_get(*index).is_some_and(|v| v < *value)
			}
			Condition::ParamLe(index, value) => {
				state.stack_get(*index).is_some_and(|v| v <= *value)
			}
			Condition::ParamGt(index, value) => {
				state.stack_get(*index).is_some_and(|v| v > *value)
			}
			Condition::ParamGe(index, value) => {
				state.stack_get(*index).is_some_and(|v| v >= *value)
			}
			Condition::StorageStatusIs(status) => {
				match (state.stack_get(0), state.stack_get(1)) {
					(Some(key), Some(new)) => state.storage.classify(key, new) == *status,
					_ => false,
				}
			}
			Condition::IsStorageWarm => state
				.stack_get(0)
				.is_some_and(|key| state.storage.is_warm(key)),
			Condition::IsStorageCold => state
				.stack_get(0)
				.is_some_and(|key| !state.storage.is_warm(key)),
			Condition::IsStatic => state.call_context.is_static,
		}
	}

	/// Narrow `generator` so every state it emits satisfies this
	/// condition. Negations and disjunctions are not restrictable and
	/// are skipped; the driver re-checks generated states.
	pub fn restrict(&self, generator: &mut StateGenerator) {
		match self {
			Condition::And(conditions) => {
				for condition in conditions {
					condition.restrict(generator);
				}
			}
			Condition::Or(_) | Condition::Not(_) | Condition::IsCode | Condition::IsData => {}
			Condition::StatusIs(status) => generator.status = *status,
			Condition::RevisionAtLeast(revision) => generator.restrict_revision_min(*revision),
			Condition::RevisionAtMost(revision) => generator.restrict_revision_max(*revision),
			Condition::RevisionIs(revision) => {
				generator.restrict_revision_min(*revision);
				generator.restrict_revision_max(*revision);
			}
			Condition::Op(op) => generator.op_at_pc = Some(*op),
			Condition::PcPastEnd => generator.pc_past_end = true,
			Condition::GasAtLeast(gas) => generator.restrict_gas_min(*gas),
			Condition::GasBelow(gas) => generator.restrict_gas_max(gas - 1),
			Condition::StackSizeAtLeast(size) => generator.restrict_stack_size_min(*size),
			Condition::StackSizeBelow(size) => {
				generator.restrict_stack_size_max(size.saturating_sub(1));
			}
			Condition::ParamEq(index, value) => {
				generator.param_mut(*index).fixed = Some(*value);
			}
			Condition::ParamNe(index, value) => {
				if value.is_zero() {
					generator.param_mut(*index).non_zero = true;
				}
			}
			Condition::ParamLt(index, value) => {
				generator.param_mut(*index).max = Some(value.saturating_sub(U256::one()));
			}
			Condition::ParamLe(index, value) => {
				generator.param_mut(*index).max = Some(*value);
			}
			Condition::ParamGt(index, value) => {
				generator.param_mut(*index).min = Some(value.saturating_add(U256::one()));
			}
			Condition::ParamGe(index, value) => {
				generator.param_mut(*index).min = Some(*value);
			}
			Condition::StorageStatusIs(status) => {
				generator.storage_config = Some(*status);
				match status {
					StorageStatus::Deleted
					| StorageStatus::ModifiedDeleted
					| StorageStatus::AddedDeleted => {
						generator.param_mut(1).fixed = Some(U256::zero());
					}
					StorageStatus::Assigned => {}
					_ => generator.param_mut(1).non_zero = true,
				}
			}
			Condition::IsStorageWarm => generator.slot_warm = Some(true),
			Condition::IsStorageCold => generator.slot_warm = Some(false),
			Condition::IsStatic => generator.is_static = Some(true),
		}
	}
}

/// `Some(true)` when the pc addresses an instruction, `Some(false)` when
/// it addresses PUSH immediate data, `None` past the end of code.
fn is_instruction_boundary(state: &State) -> Option<bool> {
	let pc = state.pc as usize;
	if pc >= state.code.len() {
		return None;
	}
	let mut index = 0;
	while index < state.code.len() {
		if index == pc {
			return Some(true);
		}
		let op = OpCode(state.code[index]);
		let width = 1 + op.push_data_len().unwrap_or(0);
		if pc < index + width {
			return Some(false);
		}
		index += width;
	}
	Some(false)
}

impl fmt::Display for Condition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Condition::And(conditions) => {
				write!(f, "(")?;
				for (index, condition) in conditions.iter().enumerate() {
					if index > 0 {
						write!(f, " ∧ ")?;
					}
					write!(f, "{condition}")?;
				}
				write!(f, ")")
			}
			Condition::Or(conditions) => {
				write!(f, "(")?;
				for (index, condition) in conditions.iter().enumerate() {
					if index > 0 {
						write!(f, " ∨ ")?;
					}
					write!(f, "{condition}")?;
				}
				write!(f, ")")
			}
			Condition::Not(condition) => write!(f, "¬{condition}"),
			Condition::StatusIs(status) => {
				write!(f, "status = {}", status_string::name(*status))
			}
			Condition::RevisionAtLeast(revision) => write!(f, "revision ≥ {revision}"),
			Condition::RevisionAtMost(revision) => write!(f, "revision ≤ {revision}"),
			Condition::RevisionIs(revision) => write!(f, "revision = {revision}"),
			Condition::Op(op) => write!(f, "code[pc] = {op}"),
			Condition::IsCode => write!(f, "isCode(pc)"),
			Condition::IsData => write!(f, "isData(pc)"),
			Condition::PcPastEnd => write!(f, "pc ≥ len(code)"),
			Condition::GasAtLeast(gas) => write!(f, "gas ≥ {gas}"),
			Condition::GasBelow(gas) => write!(f, "gas < {gas}"),
			Condition::StackSizeAtLeast(size) => write!(f, "stackSize ≥ {size}"),
			Condition::StackSizeBelow(size) => write!(f, "stackSize < {size}"),
			Condition::ParamEq(index, value) => write!(f, "param[{index}] = {value}"),
			Condition::ParamNe(index, value) => write!(f, "param[{index}] ≠ {value}"),
			Condition::ParamLt(index, value) => write!(f, "param[{index}] < {value}"),
			Condition::ParamLe(index, value) => write!(f, "param[{index}] ≤ {value}"),
			Condition::ParamGt(index, value) => write!(f, "param[{index}] > {value}"),
			Condition::ParamGe(index, value) => write!(f, "param[{index}] ≥ {value}"),
			Condition::StorageStatusIs(status) => write!(f, "storageConfig = {status:?}"),
			Condition::IsStorageWarm => write!(f, "warm(param[0])"),
			Condition::IsStorageCold => write!(f, "cold(param[0])"),
			Condition::IsStatic => write!(f, "static"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::gen::seeded_rng;

	#[test]
	fn restricted_generation_satisfies_the_condition() {
		let condition = Condition::And(vec![
			Condition::StatusIs(Status::Running),
			Condition::Op(OpCode::ADD),
			Condition::GasAtLeast(3),
			Condition::StackSizeAtLeast(2),
		]);
		for seed in 0..20 {
			let mut generator = StateGenerator::new();
			condition.restrict(&mut generator);
			let state = generator.generate(&mut seeded_rng(seed)).unwrap();
			assert!(condition.check(&state), "seed {seed}");
		}
	}

	#[test]
	fn storage_conditions_restrict_and_check() {
		for status in StorageStatus::all() {
			let condition = Condition::And(vec![
				Condition::Op(OpCode::SSTORE),
				Condition::StackSizeAtLeast(2),
				Condition::StorageStatusIs(status),
				Condition::IsStorageCold,
			]);
			let mut generator = StateGenerator::new();
			condition.restrict(&mut generator);
			let state = generator.generate(&mut seeded_rng(5)).unwrap();
			assert!(condition.check(&state), "{status:?}");
		}
	}

	#[test]
	fn data_positions_are_detected() {
		let mut state = State {
			code: vec![OpCode::PUSH2.as_u8(), 0x5b, 0x5b, OpCode::ADD.as_u8()],
			..Default::default()
		};
		state.pc = 0;
		assert!(Condition::IsCode.check(&state));
		state.pc = 1;
		assert!(Condition::IsData.check(&state));
		state.pc = 3;
		assert!(Condition::IsCode.check(&state));
		state.pc = 4;
		assert!(Condition::PcPastEnd.check(&state));
		assert!(!Condition::IsCode.check(&state));
		assert!(!Condition::IsData.check(&state));
	}
}
