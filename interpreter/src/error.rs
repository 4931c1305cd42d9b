use crate::revision::Revision;

/// Execution fault. Inside a frame every fault terminates the frame with
/// `Status::Failed` and consumes all remaining gas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
	#[error("stack underflow")]
	StackUnderflow,
	#[error("stack overflow")]
	StackOverflow,
	#[error("out of gas")]
	OutOfGas,
	#[error("invalid instruction")]
	InvalidInstruction,
	#[error("invalid jump destination")]
	InvalidJumpDestination,
	#[error("write protection")]
	WriteProtection,
	#[error("memory expansion above limit")]
	OutOfMemory,
	#[error("maximum code size exceeded")]
	MaxCodeSizeExceeded,
	#[error("invalid code prefix")]
	InvalidCodePrefix,
	#[error("maximum call depth exceeded")]
	MaxDepthExceeded,
	#[error("insufficient balance")]
	InsufficientBalance,
	#[error("unsupported revision {0}")]
	UnsupportedRevision(Revision),
}
