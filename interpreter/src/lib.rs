//! Stepping EVM interpreter engines.
//!
//! Two engines share one set of semantic handlers: the simple-form
//! engine executes raw bytecode against a cached jump-destination
//! bitmap, while the long-form engine first rewrites the code into an
//! instruction stream with pre-decoded immediates. Both expose the same
//! observable semantics, which the conformance tester checks in
//! lockstep.

pub mod analysis;
pub mod code;
mod error;
pub mod eval;
mod frame;
pub mod gas;
pub mod lfvm;
pub mod memory;
mod opcode;
mod revision;
pub mod runtime;
pub mod sfvm;
pub mod stack;
pub mod testing;
mod types;
pub mod uint;

pub use crate::error::Fault;
pub use crate::frame::Frame;
pub use crate::lfvm::{Lfvm, LfvmConfig};
pub use crate::memory::MAX_MEMORY_EXPANSION_SIZE;
pub use crate::opcode::{OpCode, OpProperties, UNKNOWN_GAS};
pub use crate::revision::{Revision, UnknownRevision, NEWEST_SUPPORTED_REVISION};
pub use crate::sfvm::{Sfvm, SfvmConfig};
pub use crate::stack::STACK_LIMIT;
pub use crate::types::{
	storage_status, AccessStatus, BlockParameters, CallKind, CallParameters, CallResult, Gas, Log,
	Parameters, RunResult, Status, StorageStatus, TransactionParameters,
};

use crate::code::CodeView;
use crate::memory::Memory;
use crate::runtime::RunContext;

/// An execution engine. Implementations are shared across threads; all
/// per-frame state lives in the [`Frame`].
pub trait Interpreter: Send + Sync {
	/// Execute one frame to completion.
	fn run(&self, parameters: Parameters, context: &mut dyn RunContext)
		-> Result<RunResult, Fault>;

	/// Access to single-stepping, for engines that support it.
	fn steppable(&self) -> Option<&dyn SteppableInterpreter> {
		None
	}
}

/// An engine that can execute a bounded number of steps on an explicit
/// frame; the conformance tester drives engines through this interface.
pub trait SteppableInterpreter: Interpreter {
	fn new_frame(&self, parameters: Parameters) -> Result<Frame, Fault>;
	fn step_n(&self, frame: &mut Frame, context: &mut dyn RunContext, n: usize);
}

pub(crate) fn build_frame(code: CodeView, parameters: Parameters) -> Result<Frame, Fault> {
	if parameters.block.revision > NEWEST_SUPPORTED_REVISION {
		return Err(Fault::UnsupportedRevision(parameters.block.revision));
	}
	Ok(Frame {
		code,
		pc: 0,
		stack: stack::acquire_stack(),
		memory: Memory::new(),
		gas: parameters.gas,
		gas_refund: 0,
		status: Status::Running,
		return_data: Vec::new(),
		last_call_return: Vec::new(),
		is_static: parameters.is_static,
		depth: parameters.depth,
		recipient: parameters.recipient,
		sender: parameters.sender,
		value: parameters.value,
		input: parameters.input,
		block: parameters.block,
		transaction: parameters.transaction,
	})
}

/// Collect the frame's result and return its stack to the pool.
pub(crate) fn finish_frame(mut frame: Frame) -> RunResult {
	let result = frame.result();
	stack::release_stack(std::mem::take(&mut frame.stack));
	result
}
