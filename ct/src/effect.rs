//! Deterministic state transformers: the right-hand side of a rule.

use core::fmt;

use tosca_interpreter::{OpCode, Status};

use crate::semantics;
use crate::state::State;

/// An effect applied to a state in place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
	/// Leave the state untouched.
	NoEffect,
	/// Terminate the frame: `Failed`, all gas consumed.
	Fail,
	/// One full semantic step of the given opcode, including its dynamic
	/// gas and any journal consumption.
	OpStep(OpCode),
	/// Synthesised STOP for a program counter past the end of code.
	StopAtEnd,
	/// Apply the effects in order.
	Seq(Vec<Effect>),
	/// A named ad-hoc transformer.
	Change {
		name: &'static str,
		apply: fn(&mut State),
	},
}

impl Effect {
	pub fn apply(&self, state: &mut State) {
		match self {
			Effect::NoEffect => {}
			Effect::Fail => semantics::fail(state),
			Effect::OpStep(_) => semantics::apply_op(state),
			Effect::StopAtEnd => state.status = Status::Stopped,
			Effect::Seq(effects) => {
				for effect in effects {
					effect.apply(state);
				}
			}
			Effect::Change { apply, .. } => apply(state),
		}
	}
}

impl fmt::Display for Effect {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Effect::NoEffect => write!(f, "noEffect"),
			Effect::Fail => write!(f, "fail"),
			Effect::OpStep(op) => write!(f, "step({op})"),
			Effect::StopAtEnd => write!(f, "stop"),
			Effect::Seq(effects) => {
				for (index, effect) in effects.iter().enumerate() {
					if index > 0 {
						write!(f, "; ")?;
					}
					write!(f, "{effect}")?;
				}
				Ok(())
			}
			Effect::Change { name, .. } => write!(f, "{name}"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fail_zeroes_gas_and_marks_failed() {
		let mut state = State {
			gas: 100,
			gas_refund: 7,
			..Default::default()
		};
		Effect::Fail.apply(&mut state);
		assert_eq!(state.status, Status::Failed);
		assert_eq!(state.gas, 0);
		assert_eq!(state.gas_refund, 0);
	}

	#[test]
	fn sequences_apply_in_order() {
		fn bump_pc(state: &mut State) {
			state.pc += 1;
		}
		let mut state = State::default();
		Effect::Seq(vec![
			Effect::Change {
				name: "bumpPc",
				apply: bump_pc,
			},
			Effect::Change {
				name: "bumpPc",
				apply: bump_pc,
			},
		])
		.apply(&mut state);
		assert_eq!(state.pc, 2);
	}
}
