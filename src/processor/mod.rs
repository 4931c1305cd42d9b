//! The transaction processor: pre-checks, gas purchase, the top-level
//! frame, and finalisation.

mod run_context;
pub mod state_contracts;

pub use run_context::{FloriaRunContext, MAX_RECURSIVE_DEPTH};

use primitive_types::{H160, H256, U256};
use sha3::{Digest, Keccak256};

use tosca_interpreter::memory::size_in_words;
use tosca_interpreter::runtime::{RunContext, TransactionContext, WorldState};
use tosca_interpreter::{
	gas::MAX_INIT_CODE_SIZE, BlockParameters, CallKind, CallParameters, CallResult, Gas, Revision,
	TransactionParameters,
};

use crate::precompiles;
use crate::transaction::{Processor, ProcessorError, Receipt, Transaction};
use crate::Interpreter;

pub const TX_GAS: Gas = 21_000;
pub const TX_GAS_CONTRACT_CREATION: Gas = 53_000;
pub const TX_DATA_NON_ZERO_GAS: Gas = 16;
pub const TX_DATA_ZERO_GAS: Gas = 4;
pub const TX_ACCESS_LIST_ADDRESS_GAS: Gas = 2_400;
pub const TX_ACCESS_LIST_STORAGE_KEY_GAS: Gas = 1_900;
/// Once per word of init code of a creation transaction (Shanghai on).
pub const INIT_CODE_WORD_GAS: Gas = 2;
pub const BLOB_GAS_PER_BLOB: u64 = 1 << 17;

/// The framework's transaction processor. The Ethereum-compatible
/// variant differs in exactly three points: rejected transactions are
/// reported as errors, the 10% flat fee on remaining gas is not taken,
/// and the coinbase receives the tip.
pub struct Floria {
	interpreter: Box<dyn Interpreter>,
	ethereum_compatible: bool,
}

impl Floria {
	#[must_use]
	pub fn new(interpreter: Box<dyn Interpreter>) -> Self {
		Self {
			interpreter,
			ethereum_compatible: false,
		}
	}

	#[must_use]
	pub fn new_ethereum_compatible(interpreter: Box<dyn Interpreter>) -> Self {
		Self {
			interpreter,
			ethereum_compatible: true,
		}
	}

	/// Map a pre-check rejection: a typed error in Ethereum-compatible
	/// mode, a silent receipt otherwise.
	fn reject(
		&self,
		error: ProcessorError,
		receipt: Receipt,
	) -> Result<Receipt, ProcessorError> {
		if self.ethereum_compatible {
			Err(error)
		} else {
			log::debug!("transaction rejected: {error}");
			Ok(receipt)
		}
	}
}

impl Processor for Floria {
	fn run(
		&self,
		block: &BlockParameters,
		transaction: &Transaction,
		context: &mut dyn TransactionContext,
	) -> Result<Receipt, ProcessorError> {
		let snapshot = context.create_snapshot();
		let error_receipt = Receipt {
			success: false,
			gas_used: transaction.gas_limit,
			..Default::default()
		};

		let gas_price = calculate_gas_price(
			block.base_fee,
			transaction.gas_fee_cap,
			transaction.gas_tip_cap,
		)?;

		if let Err(error) = nonce_check(transaction.nonce, context.nonce(transaction.sender)) {
			return self.reject(error, Receipt::default());
		}
		if let Err(error) = eoa_check(transaction.sender, context) {
			return self.reject(error, Receipt::default());
		}
		if let Err(error) = blob_check(transaction, block) {
			return self.reject(error, error_receipt);
		}

		if let Err(error) = buy_gas(
			transaction,
			context,
			gas_price,
			block.blob_base_fee,
			self.ethereum_compatible,
		) {
			context.restore_snapshot(snapshot);
			return self.reject(error, Receipt::default());
		}

		let setup_gas = calculate_setup_gas(transaction, block.revision);
		if transaction.gas_limit < setup_gas {
			context.restore_snapshot(snapshot);
			return self.reject(ProcessorError::InsufficientSetupGas, error_receipt);
		}
		let gas = transaction.gas_limit - setup_gas;

		if block.revision >= Revision::Shanghai
			&& transaction.recipient.is_none()
			&& transaction.input.len() > MAX_INIT_CODE_SIZE
		{
			context.restore_snapshot(snapshot);
			return self.reject(ProcessorError::InitCodeTooLarge, Receipt::default());
		}

		if block.revision >= Revision::Berlin {
			set_up_access_list(transaction, context, block);
		}

		let transaction_parameters = TransactionParameters {
			origin: transaction.sender,
			gas_price,
			blob_hashes: transaction.blob_hashes.clone().unwrap_or_default(),
		};
		let mut run_context = FloriaRunContext::new(
			&mut *context,
			self.interpreter.as_ref(),
			block,
			transaction_parameters,
		);

		let kind = if transaction.recipient.is_none() {
			CallKind::Create
		} else {
			CallKind::Call
		};
		if kind == CallKind::Call {
			let nonce = run_context.nonce(transaction.sender);
			run_context.set_nonce(transaction.sender, nonce + 1);
		}

		let result = run_context
			.call(kind, call_parameters(transaction, gas))
			.map_err(ProcessorError::Interpreter)?;

		let created_address = (kind == CallKind::Create && result.success)
			.then_some(result.created_address);

		let gas_left = calculate_gas_left(
			transaction,
			&result,
			block.revision,
			self.ethereum_compatible,
		);
		refund_gas(context, transaction.sender, gas_price, gas_left);

		if self.ethereum_compatible {
			payment_to_coinbase(
				transaction,
				gas_price,
				transaction.gas_limit - gas_left,
				block,
				context,
			);
		}

		Ok(Receipt {
			success: result.success,
			gas_used: transaction.gas_limit - gas_left,
			contract_address: created_address,
			output: result.output,
			logs: context.logs(),
		})
	}
}

/// Effective gas price under EIP-1559.
pub fn calculate_gas_price(
	base_fee: U256,
	gas_fee_cap: U256,
	gas_tip_cap: U256,
) -> Result<U256, ProcessorError> {
	if gas_fee_cap < base_fee {
		return Err(ProcessorError::FeeCapBelowBaseFee);
	}
	if gas_fee_cap < gas_tip_cap {
		return Err(ProcessorError::TipCapAboveFeeCap);
	}
	Ok(base_fee + gas_tip_cap.min(gas_fee_cap - base_fee))
}

fn nonce_check(transaction_nonce: u64, account_nonce: u64) -> Result<(), ProcessorError> {
	if transaction_nonce != account_nonce {
		return Err(ProcessorError::NonceMismatch {
			transaction: transaction_nonce,
			account: account_nonce,
		});
	}
	if account_nonce.checked_add(1).is_none() {
		return Err(ProcessorError::NonceOverflow);
	}
	Ok(())
}

/// Only externally owned accounts may send transactions.
fn eoa_check(
	sender: H160,
	context: &dyn TransactionContext,
) -> Result<(), ProcessorError> {
	lazy_static::lazy_static! {
		static ref EMPTY_CODE_HASH: H256 = H256::from_slice(&Keccak256::digest([]));
	}
	let code_hash = context.code_hash(sender);
	if code_hash != H256::zero() && code_hash != *EMPTY_CODE_HASH {
		return Err(ProcessorError::SenderNotEoa);
	}
	Ok(())
}

fn blob_check(
	transaction: &Transaction,
	block: &BlockParameters,
) -> Result<(), ProcessorError> {
	let Some(hashes) = &transaction.blob_hashes else {
		return Ok(());
	};
	if transaction.recipient.is_none() {
		return Err(ProcessorError::MissingBlobRecipient);
	}
	if hashes.is_empty() {
		return Err(ProcessorError::MissingBlobHashes);
	}
	for hash in hashes {
		// Only version 1 (KZG commitment) hashes exist so far.
		if hash.as_bytes()[0] != 0x01 {
			return Err(ProcessorError::InvalidBlobHashVersion);
		}
	}
	if block.revision >= Revision::Cancun
		&& !transaction.blob_gas_fee_cap.is_zero()
		&& transaction.blob_gas_fee_cap < block.blob_base_fee
	{
		return Err(ProcessorError::BlobFeeCapTooLow);
	}
	Ok(())
}

fn buy_gas(
	transaction: &Transaction,
	context: &mut dyn TransactionContext,
	gas_price: U256,
	blob_base_fee: U256,
	ethereum_compatible: bool,
) -> Result<(), ProcessorError> {
	let mut cost = gas_price * U256::from(transaction.gas_limit as u64);

	if ethereum_compatible {
		ethereum_balance_check(gas_price, transaction, context)?;
	}

	let blob_count = transaction
		.blob_hashes
		.as_ref()
		.map(Vec::len)
		.unwrap_or_default();
	if blob_count > 0 {
		cost += blob_base_fee * U256::from(blob_count as u64 * BLOB_GAS_PER_BLOB);
	}

	let balance = context.balance(transaction.sender);
	if balance < cost {
		return Err(ProcessorError::InsufficientBalance);
	}
	context.set_balance(transaction.sender, balance - cost);
	Ok(())
}

/// The stricter up-front balance check of the Ethereum-compatible mode:
/// the fee cap, the transferred value, and the blob fee cap must all be
/// covered together.
fn ethereum_balance_check(
	gas_price: U256,
	transaction: &Transaction,
	context: &dyn TransactionContext,
) -> Result<(), ProcessorError> {
	let price = if transaction.gas_fee_cap.is_zero() {
		gas_price
	} else {
		transaction.gas_fee_cap
	};
	let mut cap = price
		.checked_mul(U256::from(transaction.gas_limit as u64))
		.ok_or(ProcessorError::InsufficientBalance)?;
	cap = cap
		.checked_add(transaction.value)
		.ok_or(ProcessorError::InsufficientBalance)?;
	let blob_count = transaction
		.blob_hashes
		.as_ref()
		.map(Vec::len)
		.unwrap_or_default();
	if blob_count > 0 {
		let blob_fee = transaction.blob_gas_fee_cap
			* U256::from(blob_count as u64 * BLOB_GAS_PER_BLOB);
		cap = cap
			.checked_add(blob_fee)
			.ok_or(ProcessorError::InsufficientBalance)?;
	}
	if context.balance(transaction.sender) < cap {
		return Err(ProcessorError::InsufficientBalance);
	}
	Ok(())
}

/// Intrinsic gas of the transaction itself.
pub fn calculate_setup_gas(transaction: &Transaction, revision: Revision) -> Gas {
	let mut gas = if transaction.recipient.is_none() {
		TX_GAS_CONTRACT_CREATION
	} else {
		TX_GAS
	};

	if !transaction.input.is_empty() {
		let non_zero_bytes = transaction.input.iter().filter(|byte| **byte != 0).count() as Gas;
		let zero_bytes = transaction.input.len() as Gas - non_zero_bytes;
		gas += zero_bytes * TX_DATA_ZERO_GAS + non_zero_bytes * TX_DATA_NON_ZERO_GAS;

		if transaction.recipient.is_none() && revision >= Revision::Shanghai {
			gas += INIT_CODE_WORD_GAS * size_in_words(transaction.input.len() as u64) as Gas;
		}
	}

	if let Some(access_list) = &transaction.access_list {
		gas += access_list.len() as Gas * TX_ACCESS_LIST_ADDRESS_GAS;
		for tuple in access_list {
			gas += tuple.keys.len() as Gas * TX_ACCESS_LIST_STORAGE_KEY_GAS;
		}
	}

	gas
}

/// Warm up everything the transaction is allowed to touch cheaply.
fn set_up_access_list(
	transaction: &Transaction,
	context: &mut dyn TransactionContext,
	block: &BlockParameters,
) {
	context.access_account(transaction.sender);
	if let Some(recipient) = transaction.recipient {
		context.access_account(recipient);
	}
	for address in precompiles::addresses(block.revision) {
		context.access_account(address);
	}

	if let Some(access_list) = &transaction.access_list {
		for tuple in access_list {
			context.access_account(tuple.address);
			for key in &tuple.keys {
				context.access_storage(tuple.address, *key);
			}
		}
	}

	if block.revision >= Revision::Shanghai {
		context.access_account(block.coinbase);
	}
}

fn call_parameters(transaction: &Transaction, gas: Gas) -> CallParameters {
	let mut parameters = CallParameters {
		sender: transaction.sender,
		input: transaction.input.clone(),
		value: transaction.value,
		gas,
		..Default::default()
	};
	if let Some(recipient) = transaction.recipient {
		parameters.recipient = recipient;
		parameters.code_address = recipient;
	}
	parameters
}

fn calculate_gas_left(
	transaction: &Transaction,
	result: &CallResult,
	revision: Revision,
	ethereum_compatible: bool,
) -> Gas {
	let mut gas_left = result.gas_left;

	// A flat 10% of the remaining gas is kept from external senders.
	if !ethereum_compatible && transaction.sender != H160::zero() {
		gas_left -= gas_left / 10;
	}

	if result.success {
		let gas_used = transaction.gas_limit - gas_left;
		let refund = result
			.gas_refund
			.min(tosca_interpreter::gas::max_refund(revision, gas_used));
		gas_left += refund;
	}

	gas_left
}

fn refund_gas(
	context: &mut dyn TransactionContext,
	sender: H160,
	gas_price: U256,
	gas_left: Gas,
) {
	let refund = gas_price * U256::from(gas_left as u64);
	let balance = context.balance(sender);
	context.set_balance(sender, balance + refund);
}

fn payment_to_coinbase(
	transaction: &Transaction,
	gas_price: U256,
	gas_used: Gas,
	block: &BlockParameters,
	context: &mut dyn TransactionContext,
) {
	if transaction.gas_fee_cap.is_zero() && transaction.gas_tip_cap.is_zero() {
		return;
	}
	let effective_tip = if block.revision >= Revision::London {
		(transaction.gas_fee_cap - block.base_fee).min(transaction.gas_tip_cap)
	} else {
		gas_price
	};
	let fee = effective_tip * U256::from(gas_used as u64);
	let balance = context.balance(block.coinbase);
	context.set_balance(block.coinbase, balance + fee);
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::transaction::AccessTuple;

	#[test]
	fn gas_price_is_base_fee_plus_capped_tip() {
		let price = calculate_gas_price(U256::from(10u64), U256::from(30u64), U256::from(5u64))
			.unwrap();
		assert_eq!(price, U256::from(15u64));
		let price = calculate_gas_price(U256::from(10u64), U256::from(12u64), U256::from(5u64))
			.unwrap();
		assert_eq!(price, U256::from(12u64));
		assert_eq!(
			calculate_gas_price(U256::from(10u64), U256::from(9u64), U256::zero()),
			Err(ProcessorError::FeeCapBelowBaseFee)
		);
		assert_eq!(
			calculate_gas_price(U256::zero(), U256::from(3u64), U256::from(5u64)),
			Err(ProcessorError::TipCapAboveFeeCap)
		);
	}

	#[test]
	fn setup_gas_counts_bytes_and_access_list() {
		let transaction = Transaction {
			recipient: Some(H160::repeat_byte(1)),
			input: vec![0, 0, 7],
			access_list: Some(vec![AccessTuple {
				address: H160::repeat_byte(2),
				keys: vec![H256::zero(), H256::zero()],
			}]),
			..Default::default()
		};
		let gas = calculate_setup_gas(&transaction, Revision::London);
		assert_eq!(gas, 21_000 + 2 * 4 + 16 + 2_400 + 2 * 1_900);
	}

	#[test]
	fn creation_setup_gas_charges_init_words_from_shanghai() {
		let transaction = Transaction {
			recipient: None,
			input: vec![7; 33],
			..Default::default()
		};
		let london = calculate_setup_gas(&transaction, Revision::London);
		let shanghai = calculate_setup_gas(&transaction, Revision::Shanghai);
		assert_eq!(shanghai - london, 2 * 2);
	}

	#[test]
	fn flat_fee_keeps_a_tenth_of_remaining_gas() {
		let transaction = Transaction {
			sender: H160::repeat_byte(1),
			gas_limit: 100,
			..Default::default()
		};
		let result = CallResult {
			success: true,
			gas_left: 50,
			..Default::default()
		};
		assert_eq!(
			calculate_gas_left(&transaction, &result, Revision::London, false),
			45
		);
		assert_eq!(
			calculate_gas_left(&transaction, &result, Revision::London, true),
			50
		);
	}
}
