//! The rule catalog: a complete, mutually exclusive partition of the
//! running-state space. For every reachable running state exactly one
//! rule applies; its effect is the oracle against which every engine is
//! stepped.

use tosca_interpreter::{Gas, OpCode, Revision, Status, StorageStatus, STACK_LIMIT};

use crate::condition::Condition;
use crate::effect::Effect;
use crate::gen::{ParameterKind, StateGenerator};
use crate::state::State;

/// A named condition/effect pair.
#[derive(Clone, Debug)]
pub struct Rule {
	pub name: String,
	pub condition: Condition,
	pub effect: Effect,
	pub parameter_kinds: Vec<ParameterKind>,
}

impl Rule {
	#[must_use]
	pub fn matches(&self, state: &State) -> bool {
		self.condition.check(state)
	}

	/// A generator narrowed to this rule's condition.
	#[must_use]
	pub fn generator(&self) -> StateGenerator {
		let mut generator = StateGenerator::new();
		generator.parameter_kinds = self.parameter_kinds.clone();
		self.condition.restrict(&mut generator);
		generator
	}
}

fn running() -> Condition {
	Condition::StatusIs(Status::Running)
}

fn parameter_kinds(op: OpCode) -> Vec<ParameterKind> {
	use ParameterKind as K;
	if op.push_data_len().is_some() || op.dup_depth().is_some() || op.swap_depth().is_some() {
		return Vec::new();
	}
	if let Some(topics) = op.log_topic_count() {
		let mut kinds = vec![K::MemoryOffset, K::Size];
		kinds.extend(std::iter::repeat(K::Topic).take(topics));
		return kinds;
	}
	match op {
		OpCode::EXP | OpCode::SIGNEXTEND | OpCode::BYTE | OpCode::SHL | OpCode::SHR
		| OpCode::SAR => {
			vec![K::Numeric, K::Numeric]
		}
		OpCode::SHA3 | OpCode::RETURN | OpCode::REVERT => vec![K::MemoryOffset, K::Size],
		OpCode::MLOAD => vec![K::MemoryOffset],
		OpCode::MSTORE | OpCode::MSTORE8 => vec![K::MemoryOffset, K::Numeric],
		OpCode::MCOPY => vec![K::MemoryOffset, K::MemoryOffset, K::Size],
		OpCode::CALLDATACOPY | OpCode::CODECOPY | OpCode::RETURNDATACOPY => {
			vec![K::MemoryOffset, K::DataOffset, K::Size]
		}
		OpCode::EXTCODECOPY => vec![K::Address, K::MemoryOffset, K::DataOffset, K::Size],
		OpCode::CALLDATALOAD => vec![K::DataOffset],
		OpCode::JUMP => vec![K::JumpTarget],
		OpCode::JUMPI => vec![K::JumpTarget, K::Numeric],
		OpCode::SLOAD | OpCode::TLOAD => vec![K::StorageKey],
		OpCode::SSTORE | OpCode::TSTORE => vec![K::StorageKey, K::Numeric],
		OpCode::BALANCE | OpCode::EXTCODESIZE | OpCode::EXTCODEHASH | OpCode::SELFDESTRUCT => {
			vec![K::Address]
		}
		OpCode::BLOCKHASH | OpCode::BLOBHASH => vec![K::Numeric],
		OpCode::CALL | OpCode::CALLCODE => vec![
			K::Gas,
			K::Address,
			K::Value,
			K::MemoryOffset,
			K::Size,
			K::MemoryOffset,
			K::Size,
		],
		OpCode::DELEGATECALL | OpCode::STATICCALL => vec![
			K::Gas,
			K::Address,
			K::MemoryOffset,
			K::Size,
			K::MemoryOffset,
			K::Size,
		],
		OpCode::CREATE => vec![K::Value, K::MemoryOffset, K::Size],
		OpCode::CREATE2 => vec![K::Value, K::MemoryOffset, K::Size, K::Numeric],
		_ => Vec::new(),
	}
}

/// Revision bands over which the op's static gas is constant:
/// `(lower bound, upper bound, static gas)`.
fn gas_bands(op: OpCode) -> Vec<(Option<Revision>, Option<Revision>, Gas)> {
	let properties = op.properties();
	if properties.gas != properties.gas_berlin {
		vec![
			(None, Some(Revision::Istanbul), properties.gas),
			(Some(Revision::Berlin), None, properties.gas_berlin),
		]
	} else {
		let lower = (properties.min_revision > Revision::Istanbul)
			.then_some(properties.min_revision);
		vec![(lower, None, properties.gas)]
	}
}

fn band_conditions(lower: Option<Revision>, upper: Option<Revision>) -> Vec<Condition> {
	let mut conditions = Vec::new();
	if let Some(lower) = lower {
		conditions.push(Condition::RevisionAtLeast(lower));
	}
	if let Some(upper) = upper {
		conditions.push(Condition::RevisionAtMost(upper));
	}
	conditions
}

fn band_suffix(lower: Option<Revision>, upper: Option<Revision>) -> String {
	match (lower, upper) {
		(None, None) => String::new(),
		(Some(lower), None) => format!("_{}", lower.to_string().to_lowercase()),
		(None, Some(upper)) => format!("_to_{}", upper.to_string().to_lowercase()),
		(Some(lower), Some(upper)) => format!(
			"_{}_to_{}",
			lower.to_string().to_lowercase(),
			upper.to_string().to_lowercase()
		),
	}
}

fn push_rule(
	rules: &mut Vec<Rule>,
	name: String,
	mut conditions: Vec<Condition>,
	effect: Effect,
	parameter_kinds: Vec<ParameterKind>,
) {
	let condition = if conditions.len() == 1 {
		conditions.remove(0)
	} else {
		Condition::And(conditions)
	};
	rules.push(Rule {
		name,
		condition,
		effect,
		parameter_kinds,
	});
}

/// The regular (all-preconditions-met) rules of one opcode within one
/// revision band. SSTORE fans out over the nine storage transitions and
/// the slot's warmth; everything else is a single rule.
fn regular_rules(
	rules: &mut Vec<Rule>,
	op: OpCode,
	name: &str,
	suffix: &str,
	base: &[Condition],
	kinds: &[ParameterKind],
) {
	if op == OpCode::SSTORE {
		for status in StorageStatus::all() {
			for warm in [false, true] {
				let mut conditions = base.to_vec();
				conditions.push(Condition::StorageStatusIs(status));
				conditions.push(if warm {
					Condition::IsStorageWarm
				} else {
					Condition::IsStorageCold
				});
				let warmth = if warm { "warm" } else { "cold" };
				push_rule(
					rules,
					format!(
						"{name}_{}_{warmth}{suffix}",
						format!("{status:?}").to_lowercase()
					),
					conditions,
					Effect::OpStep(op),
					kinds.to_vec(),
				);
			}
		}
	} else {
		push_rule(
			rules,
			format!("{name}_regular{suffix}"),
			base.to_vec(),
			Effect::OpStep(op),
			kinds.to_vec(),
		);
	}
}

/// Build the full catalog.
#[must_use]
pub fn catalog() -> Vec<Rule> {
	let mut rules = Vec::new();

	push_rule(
		&mut rules,
		"stop_at_end_of_code".to_string(),
		vec![running(), Condition::PcPastEnd],
		Effect::StopAtEnd,
		Vec::new(),
	);

	for byte in 0..=255u8 {
		let op = OpCode(byte);
		let properties = op.properties();
		let base = vec![running(), Condition::Op(op)];

		if !properties.valid {
			let name = if op == OpCode::INVALID {
				"invalid_instruction".to_string()
			} else {
				format!("op_0x{byte:02x}_undefined")
			};
			push_rule(&mut rules, name, base, Effect::Fail, Vec::new());
			continue;
		}

		let name = properties.name.to_lowercase();
		let kinds = parameter_kinds(op);

		// Before the opcode's introduction it is just another invalid byte.
		if properties.min_revision > Revision::Istanbul {
			let preceding = Revision::all()
				[properties.min_revision.as_u8() as usize - 1];
			let mut conditions = base.clone();
			conditions.push(Condition::RevisionAtMost(preceding));
			push_rule(
				&mut rules,
				format!("{name}_pre_{}", properties.min_revision.to_string().to_lowercase()),
				conditions,
				Effect::Fail,
				Vec::new(),
			);
		}

		for (band_lower, band_upper, static_gas) in gas_bands(op) {
			let suffix = band_suffix(band_lower, band_upper);
			let mut band_base = base.clone();
			band_base.extend(band_conditions(band_lower, band_upper));

			// SSTORE refuses to run on a nearly-empty tank instead of a
			// static charge.
			let gas_floor = if op == OpCode::SSTORE {
				tosca_interpreter::gas::SSTORE_SENTRY_GAS + 1
			} else {
				static_gas
			};

			if gas_floor > 0 {
				let mut conditions = band_base.clone();
				conditions.push(Condition::GasBelow(gas_floor));
				push_rule(
					&mut rules,
					format!("{name}_with_too_little_gas{suffix}"),
					conditions,
					Effect::Fail,
					Vec::new(),
				);
				band_base.push(Condition::GasAtLeast(gas_floor));
			}

			if properties.pops > 0 {
				let mut conditions = band_base.clone();
				conditions.push(Condition::StackSizeBelow(properties.pops));
				push_rule(
					&mut rules,
					format!("{name}_with_too_few_elements{suffix}"),
					conditions,
					Effect::Fail,
					Vec::new(),
				);
				band_base.push(Condition::StackSizeAtLeast(properties.pops));
			}

			if properties.pushes > properties.pops {
				let overflow_from =
					STACK_LIMIT + 1 + properties.pops - properties.pushes;
				let mut conditions = band_base.clone();
				conditions.push(Condition::StackSizeAtLeast(overflow_from));
				push_rule(
					&mut rules,
					format!("{name}_with_overflow{suffix}"),
					conditions,
					Effect::Fail,
					Vec::new(),
				);
				band_base.push(Condition::StackSizeBelow(overflow_from));
			}

			regular_rules(&mut rules, op, &name, &suffix, &band_base, &kinds);
		}
	}

	rules
}

/// All rules whose condition the state satisfies.
#[must_use]
pub fn rules_matching<'a>(rules: &'a [Rule], state: &State) -> Vec<&'a Rule> {
	rules.iter().filter(|rule| rule.matches(state)).collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::gen::seeded_rng;

	#[test]
	fn catalog_is_not_empty_and_names_are_unique() {
		let rules = catalog();
		assert!(rules.len() > 400);
		let mut names: Vec<&str> = rules.iter().map(|rule| rule.name.as_str()).collect();
		names.sort_unstable();
		let before = names.len();
		names.dedup();
		assert_eq!(before, names.len());
	}

	#[test]
	fn generated_states_match_exactly_one_rule() {
		let rules = catalog();
		let mut checked = 0;
		for (index, rule) in rules.iter().enumerate() {
			let generator = rule.generator();
			let state = match generator.generate(&mut seeded_rng(index as u64)) {
				Ok(state) => state,
				Err(_) => continue,
			};
			let matching = rules_matching(&rules, &state);
			assert_eq!(
				matching.len(),
				1,
				"state for {} matched {:?}",
				rule.name,
				matching.iter().map(|r| &r.name).collect::<Vec<_>>()
			);
			assert_eq!(matching[0].name, rule.name);
			checked += 1;
		}
		assert!(checked > 300, "only {checked} rules produced states");
	}

	#[test]
	fn every_running_state_matches_a_rule() {
		let rules = catalog();
		let generator = StateGenerator::new();
		for seed in 0..50 {
			let state = generator.generate(&mut seeded_rng(seed)).unwrap();
			let matching = rules_matching(&rules, &state);
			assert_eq!(matching.len(), 1, "seed {seed}: {:?}", state.op_at_pc());
		}
	}
}
