//! Tosca: a multi-interpreter EVM execution framework.
//!
//! The root crate hosts the transaction processor, the journaled
//! in-memory world state, the precompile and system-contract surfaces,
//! and the registries through which interpreters and processors are
//! selected by name. The execution engines themselves live in
//! [`tosca_interpreter`], re-exported here as [`interpreter`].

pub mod backend;
pub mod precompiles;
pub mod processor;
pub mod registry;
mod transaction;

pub use tosca_interpreter as interpreter;

pub use crate::backend::{Account, InMemoryState};
pub use crate::processor::Floria;
pub use crate::transaction::{AccessTuple, Processor, ProcessorError, Receipt, Transaction};
pub use tosca_interpreter::{
	BlockParameters, CallKind, CallParameters, CallResult, Fault, Gas, Interpreter, Log,
	Parameters, Revision, RunResult, Status, SteppableInterpreter, StorageStatus,
	TransactionParameters,
};
