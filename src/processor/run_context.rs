//! The run context: the interpreter's re-entry point for CALL and
//! CREATE, layered over the transaction context the processor owns.

use primitive_types::{H160, H256, U256};
use rlp::RlpStream;
use sha3::{Digest, Keccak256};

use tosca_interpreter::runtime::{RunContext, Snapshot, TransactionContext, WorldState};
use tosca_interpreter::{
	gas::{CREATE_GAS_PER_BYTE, MAX_CODE_SIZE},
	AccessStatus, BlockParameters, CallKind, CallParameters, CallResult, Fault, Gas, Log,
	Parameters, Revision, RunResult, StorageStatus, TransactionParameters,
};

use crate::precompiles;
use crate::processor::state_contracts;
use crate::Interpreter;

/// Maximum depth of the call/create stack.
pub const MAX_RECURSIVE_DEPTH: usize = 1024;

lazy_static::lazy_static! {
	static ref EMPTY_CODE_HASH: H256 = H256::from_slice(&Keccak256::digest([]));
}

/// Per-transaction execution driver. Carries the depth and static flags
/// downward and re-enters itself for nested frames.
pub struct FloriaRunContext<'a> {
	context: &'a mut dyn TransactionContext,
	interpreter: &'a dyn Interpreter,
	block: &'a BlockParameters,
	transaction: TransactionParameters,
	depth: usize,
	is_static: bool,
}

impl<'a> FloriaRunContext<'a> {
	pub fn new(
		context: &'a mut dyn TransactionContext,
		interpreter: &'a dyn Interpreter,
		block: &'a BlockParameters,
		transaction: TransactionParameters,
	) -> Self {
		Self {
			context,
			interpreter,
			block,
			transaction,
			depth: 0,
			is_static: false,
		}
	}

	fn revision(&self) -> Revision {
		self.block.revision
	}

	fn execute_call(
		&mut self,
		kind: CallKind,
		parameters: CallParameters,
	) -> Result<CallResult, Fault> {
		let err_result = CallResult {
			success: false,
			gas_left: parameters.gas,
			..Default::default()
		};
		if self.depth > MAX_RECURSIVE_DEPTH {
			return Ok(err_result);
		}
		self.depth += 1;
		let was_static = self.is_static;
		if kind == CallKind::StaticCall {
			self.is_static = true;
		}
		let result = self.execute_call_inner(kind, parameters, err_result);
		self.is_static = was_static;
		self.depth -= 1;
		result
	}

	fn execute_call_inner(
		&mut self,
		kind: CallKind,
		parameters: CallParameters,
		err_result: CallResult,
	) -> Result<CallResult, Fault> {
		let snapshot = self.context.create_snapshot();

		if kind == CallKind::Call || kind == CallKind::CallCode {
			if !can_transfer_value(
				self.context,
				parameters.value,
				parameters.sender,
				Some(parameters.recipient),
			) {
				return Ok(err_result);
			}
			if kind == CallKind::Call {
				transfer_value(
					self.context,
					parameters.value,
					parameters.sender,
					parameters.recipient,
				);
			}
		}

		if kind == CallKind::Call && state_contracts::is_state_contract(parameters.code_address) {
			let mut result = state_contracts::run_state_contract(
				self.context,
				parameters.sender,
				parameters.code_address,
				&parameters.input,
				parameters.gas,
			);
			if !result.success {
				self.context.restore_snapshot(snapshot);
				result.gas_left = 0;
			}
			return Ok(result);
		}

		if precompiles::is_precompile(parameters.code_address, self.revision()) {
			let result = precompiles::run_precompile(
				self.revision(),
				parameters.code_address,
				&parameters.input,
				parameters.gas,
			);
			if !result.success {
				self.context.restore_snapshot(snapshot);
			}
			return Ok(result);
		}

		// Touching a non-existent account without moving value must not
		// create it; succeed without running anything.
		if kind == CallKind::Call
			&& self.revision() >= Revision::Berlin
			&& parameters.value.is_zero()
			&& !self.context.account_exists(parameters.recipient)
		{
			return Ok(CallResult {
				success: true,
				gas_left: parameters.gas,
				..Default::default()
			});
		}

		let result = self.run_interpreter(kind, parameters);
		match result {
			Ok(mut outcome) => {
				if !outcome.success {
					self.context.restore_snapshot(snapshot);
					if !is_revert(&outcome) {
						outcome.gas_left = 0;
					}
				}
				Ok(CallResult {
					success: outcome.success,
					output: outcome.output,
					gas_left: outcome.gas_left,
					gas_refund: outcome.gas_refund,
					created_address: H160::zero(),
				})
			}
			Err(fault) => {
				self.context.restore_snapshot(snapshot);
				Err(fault)
			}
		}
	}

	fn execute_create(
		&mut self,
		kind: CallKind,
		mut parameters: CallParameters,
	) -> Result<CallResult, Fault> {
		let err_result = CallResult {
			success: false,
			gas_left: parameters.gas,
			..Default::default()
		};
		if self.depth > MAX_RECURSIVE_DEPTH {
			return Ok(err_result);
		}
		self.depth += 1;
		let result = self.execute_create_inner(kind, &mut parameters, err_result);
		self.depth -= 1;
		result
	}

	fn execute_create_inner(
		&mut self,
		kind: CallKind,
		parameters: &mut CallParameters,
		err_result: CallResult,
	) -> Result<CallResult, Fault> {
		if !can_transfer_value(self.context, parameters.value, parameters.sender, None) {
			return Ok(err_result);
		}
		if increment_nonce(self.context, parameters.sender).is_err() {
			return Ok(err_result);
		}

		let created = match self.derive_create_address(kind, parameters) {
			Some(address) => address,
			// Collision with a live account consumes everything.
			None => return Ok(CallResult::default()),
		};

		let snapshot = self.context.create_snapshot();
		self.context.create_account(created);
		self.context.set_nonce(created, 1);
		transfer_value(self.context, parameters.value, parameters.sender, created);

		parameters.recipient = created;
		let result = self.run_interpreter(kind, parameters.clone());
		let outcome = match result {
			Ok(outcome) => outcome,
			Err(fault) => {
				self.context.restore_snapshot(snapshot);
				return Err(fault);
			}
		};
		if !outcome.success {
			self.context.restore_snapshot(snapshot);
			if !is_revert(&outcome) {
				return Ok(CallResult::default());
			}
			return Ok(CallResult {
				success: false,
				output: outcome.output,
				gas_left: outcome.gas_left,
				gas_refund: 0,
				created_address: created,
			});
		}

		Ok(self.finalize_create(outcome, created, snapshot))
	}

	/// Address derivation plus the emptiness check of the created slot.
	fn derive_create_address(
		&mut self,
		kind: CallKind,
		parameters: &CallParameters,
	) -> Option<H160> {
		let created = if kind == CallKind::Create {
			// The sender's nonce was already incremented for this create.
			let nonce = self.context.nonce(parameters.sender) - 1;
			let mut stream = RlpStream::new_list(2);
			stream.append(&parameters.sender);
			stream.append(&nonce);
			let hash = Keccak256::digest(stream.out());
			H160::from_slice(&hash[12..])
		} else {
			let init_hash = Keccak256::digest(&parameters.input);
			let mut preimage = Vec::with_capacity(1 + 20 + 32 + 32);
			preimage.push(0xff);
			preimage.extend_from_slice(parameters.sender.as_bytes());
			preimage.extend_from_slice(parameters.salt.as_bytes());
			preimage.extend_from_slice(&init_hash);
			let hash = Keccak256::digest(&preimage);
			H160::from_slice(&hash[12..])
		};

		if self.revision() >= Revision::Berlin {
			self.context.access_account(created);
		}

		let code_hash = self.context.code_hash(created);
		if self.context.nonce(created) != 0
			|| !self.context.has_empty_storage(created)
			|| (code_hash != H256::zero() && code_hash != *EMPTY_CODE_HASH)
		{
			log::debug!("create collision at {created:?}");
			return None;
		}
		Some(created)
	}

	fn finalize_create(
		&mut self,
		mut outcome: RunResult,
		created: H160,
		snapshot: Snapshot,
	) -> CallResult {
		let code = &outcome.output;
		let mut success = outcome.success;
		if code.len() > MAX_CODE_SIZE {
			success = false;
		}
		if self.revision() >= Revision::London && code.first() == Some(&0xef) {
			success = false;
		}
		let deposit_gas = (code.len() as Gas) * CREATE_GAS_PER_BYTE;
		if outcome.gas_left < deposit_gas {
			success = false;
		} else {
			outcome.gas_left -= deposit_gas;
		}

		if success {
			let code = std::mem::take(&mut outcome.output);
			self.context.set_code(created, code);
			CallResult {
				success: true,
				output: Vec::new(),
				gas_left: outcome.gas_left,
				gas_refund: outcome.gas_refund,
				created_address: created,
			}
		} else {
			self.context.restore_snapshot(snapshot);
			CallResult {
				success: false,
				output: Vec::new(),
				gas_left: 0,
				gas_refund: 0,
				created_address: created,
			}
		}
	}

	fn run_interpreter(
		&mut self,
		kind: CallKind,
		parameters: CallParameters,
	) -> Result<RunResult, Fault> {
		let is_create = kind == CallKind::Create || kind == CallKind::Create2;
		let (code, code_hash, input) = match kind {
			CallKind::Call | CallKind::StaticCall => (
				self.context.code(parameters.recipient),
				Some(self.context.code_hash(parameters.recipient)),
				parameters.input,
			),
			CallKind::CallCode | CallKind::DelegateCall => (
				self.context.code(parameters.code_address),
				Some(self.context.code_hash(parameters.code_address)),
				parameters.input,
			),
			CallKind::Create | CallKind::Create2 => (parameters.input, None, Vec::new()),
		};

		let interpreter_parameters = Parameters {
			block: self.block.clone(),
			transaction: self.transaction.clone(),
			is_static: self.is_static,
			// The depth was already incremented for this frame.
			depth: self.depth - 1,
			gas: parameters.gas,
			recipient: parameters.recipient,
			sender: parameters.sender,
			input,
			value: parameters.value,
			code_hash: if is_create { None } else { code_hash },
			code,
		};

		let interpreter = self.interpreter;
		interpreter.run(interpreter_parameters, self)
	}
}

fn is_revert(outcome: &RunResult) -> bool {
	!outcome.success && (outcome.gas_left > 0 || !outcome.output.is_empty())
}

pub(crate) fn can_transfer_value(
	context: &dyn TransactionContext,
	value: U256,
	sender: H160,
	recipient: Option<H160>,
) -> bool {
	if value.is_zero() {
		return true;
	}
	let sender_balance = context.balance(sender);
	if sender_balance < value {
		return false;
	}
	match recipient {
		None => true,
		Some(recipient) if recipient == sender => true,
		Some(recipient) => {
			// Reject transfers that would overflow the recipient.
			context
				.balance(recipient)
				.checked_add(value)
				.is_some()
		}
	}
}

/// Move `value` between accounts. Only to be called after
/// [`can_transfer_value`].
pub(crate) fn transfer_value(
	context: &mut dyn TransactionContext,
	value: U256,
	sender: H160,
	recipient: H160,
) {
	if value.is_zero() || sender == recipient {
		return;
	}
	let sender_balance = context.balance(sender);
	let recipient_balance = context.balance(recipient);
	context.set_balance(sender, sender_balance - value);
	context.set_balance(recipient, recipient_balance + value);
}

pub(crate) fn increment_nonce(
	context: &mut dyn TransactionContext,
	address: H160,
) -> Result<(), ()> {
	let nonce = context.nonce(address);
	let incremented = nonce.checked_add(1).ok_or(())?;
	context.set_nonce(address, incremented);
	Ok(())
}

// The world-state surface is a plain pass-through to the owned context,
// except for SELFDESTRUCT's balance handling which is revision-aware.
impl WorldState for FloriaRunContext<'_> {
	fn account_exists(&self, address: H160) -> bool {
		self.context.account_exists(address)
	}
	fn create_account(&mut self, address: H160) {
		self.context.create_account(address);
	}
	fn balance(&self, address: H160) -> U256 {
		self.context.balance(address)
	}
	fn set_balance(&mut self, address: H160, balance: U256) {
		self.context.set_balance(address, balance);
	}
	fn nonce(&self, address: H160) -> u64 {
		self.context.nonce(address)
	}
	fn set_nonce(&mut self, address: H160, nonce: u64) {
		self.context.set_nonce(address, nonce);
	}
	fn code(&self, address: H160) -> Vec<u8> {
		self.context.code(address)
	}
	fn code_hash(&self, address: H160) -> H256 {
		self.context.code_hash(address)
	}
	fn code_size(&self, address: H160) -> usize {
		self.context.code_size(address)
	}
	fn set_code(&mut self, address: H160, code: Vec<u8>) {
		self.context.set_code(address, code);
	}
	fn has_empty_storage(&self, address: H160) -> bool {
		self.context.has_empty_storage(address)
	}
	fn storage(&self, address: H160, key: H256) -> H256 {
		self.context.storage(address, key)
	}
	fn set_storage(&mut self, address: H160, key: H256, value: H256) -> StorageStatus {
		self.context.set_storage(address, key, value)
	}

	fn self_destruct(&mut self, address: H160, beneficiary: H160) -> bool {
		let balance = self.context.balance(address);
		if self.revision() >= Revision::Cancun {
			self.context.set_balance(address, U256::zero());
		}
		if address != beneficiary {
			let beneficiary_balance = self.context.balance(beneficiary);
			self.context
				.set_balance(beneficiary, beneficiary_balance.saturating_add(balance));
		}
		self.context.self_destruct(address, beneficiary)
	}
}

impl TransactionContext for FloriaRunContext<'_> {
	fn original_storage(&self, address: H160, key: H256) -> H256 {
		self.context.original_storage(address, key)
	}
	fn transient_storage(&self, address: H160, key: H256) -> H256 {
		self.context.transient_storage(address, key)
	}
	fn set_transient_storage(&mut self, address: H160, key: H256, value: H256) {
		self.context.set_transient_storage(address, key, value);
	}
	fn access_account(&mut self, address: H160) -> AccessStatus {
		self.context.access_account(address)
	}
	fn access_storage(&mut self, address: H160, key: H256) -> AccessStatus {
		self.context.access_storage(address, key)
	}
	fn is_account_warm(&self, address: H160) -> bool {
		self.context.is_account_warm(address)
	}
	fn is_slot_warm(&self, address: H160, key: H256) -> bool {
		self.context.is_slot_warm(address, key)
	}
	fn emit_log(&mut self, log: Log) {
		self.context.emit_log(log);
	}
	fn logs(&self) -> Vec<Log> {
		self.context.logs()
	}
	fn create_snapshot(&mut self) -> Snapshot {
		self.context.create_snapshot()
	}
	fn restore_snapshot(&mut self, snapshot: Snapshot) {
		self.context.restore_snapshot(snapshot);
	}
	fn created_in_transaction(&self, address: H160) -> bool {
		self.context.created_in_transaction(address)
	}
	fn block_hash(&self, number: u64) -> H256 {
		self.context.block_hash(number)
	}
}

impl RunContext for FloriaRunContext<'_> {
	fn call(&mut self, kind: CallKind, parameters: CallParameters) -> Result<CallResult, Fault> {
		match kind {
			CallKind::Create | CallKind::Create2 => self.execute_create(kind, parameters),
			_ => self.execute_call(kind, parameters),
		}
	}
}
