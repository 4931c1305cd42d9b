//! Rule-based conformance testing for Tosca interpreters.
//!
//! States are symbolic descriptions of a frame mid-execution. A catalog
//! of rules partitions the running-state space; each rule pairs a
//! condition with a deterministic effect. The differential driver
//! generates states per rule, applies the effect as the oracle, steps
//! every registered engine once, and compares structurally.

pub mod adapter;
pub mod condition;
pub mod driver;
pub mod effect;
pub mod gen;
pub mod rules;
pub mod semantics;
pub mod ser;
pub mod smt;
pub mod state;
pub mod storage;

pub use crate::condition::Condition;
pub use crate::effect::Effect;
pub use crate::gen::{ParameterKind, StateGenerator, Unsatisfiable};
pub use crate::rules::{catalog, Rule};
pub use crate::state::State;
pub use crate::storage::Storage;
