use primitive_types::{H160, U256};

use crate::code::CodeView;
use crate::error::Fault;
use crate::memory::Memory;
use crate::revision::Revision;
use crate::stack::Stack;
use crate::types::{BlockParameters, Gas, RunResult, Status, TransactionParameters};

/// One activation of the interpreter for one call or create.
#[derive(Clone, Debug)]
pub struct Frame {
	pub code: CodeView,
	pub pc: usize,
	pub stack: Stack,
	pub memory: Memory,
	pub gas: Gas,
	pub gas_refund: Gas,
	pub status: Status,
	/// Data returned by this frame via RETURN or REVERT.
	pub return_data: Vec<u8>,
	/// Output buffer of the most recent completed sub-call.
	pub last_call_return: Vec<u8>,
	pub is_static: bool,
	pub depth: usize,
	pub recipient: H160,
	pub sender: H160,
	pub value: U256,
	pub input: Vec<u8>,
	pub block: BlockParameters,
	pub transaction: TransactionParameters,
}

impl Frame {
	#[inline]
	#[must_use]
	pub fn revision(&self) -> Revision {
		self.block.revision
	}

	/// Charge `cost` against the frame's gas.
	#[inline]
	pub fn use_gas(&mut self, cost: Gas) -> Result<(), Fault> {
		if cost < 0 || self.gas < cost {
			return Err(Fault::OutOfGas);
		}
		self.gas -= cost;
		Ok(())
	}

	/// Terminate the frame with a fault: `Failed`, all gas consumed.
	pub fn fail(&mut self, fault: Fault) {
		log::trace!("frame failed at pc {}: {}", self.pc, fault);
		self.status = Status::Failed;
		self.gas = 0;
		self.gas_refund = 0;
	}

	/// Observable outcome once the frame has left `Running`.
	#[must_use]
	pub fn result(&self) -> RunResult {
		match self.status {
			Status::Stopped | Status::SelfDestructed => RunResult {
				success: true,
				output: Vec::new(),
				gas_left: self.gas,
				gas_refund: self.gas_refund,
			},
			Status::Returned => RunResult {
				success: true,
				output: self.return_data.clone(),
				gas_left: self.gas,
				gas_refund: self.gas_refund,
			},
			Status::Reverted => RunResult {
				success: false,
				output: self.return_data.clone(),
				gas_left: self.gas,
				gas_refund: 0,
			},
			Status::Running | Status::Failed => RunResult {
				success: false,
				output: Vec::new(),
				gas_left: 0,
				gas_refund: 0,
			},
		}
	}
}
