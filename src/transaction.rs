//! Transactions, receipts, and the processor interface.

use primitive_types::{H160, H256, U256};

use tosca_interpreter::runtime::TransactionContext;
use tosca_interpreter::{BlockParameters, Fault, Gas, Log, Revision};

/// One entry of an EIP-2930 access list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessTuple {
	pub address: H160,
	pub keys: Vec<H256>,
}

/// A transaction as handed to a processor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transaction {
	pub sender: H160,
	/// Absent for contract-creation transactions.
	pub recipient: Option<H160>,
	pub nonce: u64,
	pub input: Vec<u8>,
	pub value: U256,
	pub gas_limit: Gas,
	pub gas_fee_cap: U256,
	pub gas_tip_cap: U256,
	pub access_list: Option<Vec<AccessTuple>>,
	pub blob_hashes: Option<Vec<H256>>,
	pub blob_gas_fee_cap: U256,
}

/// Outcome of processing one transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Receipt {
	pub success: bool,
	pub gas_used: Gas,
	/// Address of the deployed contract for successful creations.
	pub contract_address: Option<H160>,
	pub output: Vec<u8>,
	pub logs: Vec<Log>,
}

/// Reasons a transaction is rejected before or during processing.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProcessorError {
	#[error("nonce mismatch: transaction {transaction} != account {account}")]
	NonceMismatch { transaction: u64, account: u64 },
	#[error("nonce overflow")]
	NonceOverflow,
	#[error("sender is not an externally owned account")]
	SenderNotEoa,
	#[error("gas fee cap is below the base fee")]
	FeeCapBelowBaseFee,
	#[error("gas tip cap is above the fee cap")]
	TipCapAboveFeeCap,
	#[error("insufficient balance to buy gas")]
	InsufficientBalance,
	#[error("gas limit below the intrinsic setup gas")]
	InsufficientSetupGas,
	#[error("init code exceeds the maximum size")]
	InitCodeTooLarge,
	#[error("blob transaction without recipient")]
	MissingBlobRecipient,
	#[error("blob transaction without blob hashes")]
	MissingBlobHashes,
	#[error("blob hash with invalid version byte")]
	InvalidBlobHashVersion,
	#[error("blob gas fee cap is below the blob base fee")]
	BlobFeeCapTooLow,
	#[error("unsupported revision {0}")]
	UnsupportedRevision(Revision),
	#[error("interpreter fault: {0}")]
	Interpreter(#[from] Fault),
}

/// Drives one transaction through the world state and an interpreter.
pub trait Processor: Send + Sync {
	fn run(
		&self,
		block: &BlockParameters,
		transaction: &Transaction,
		context: &mut dyn TransactionContext,
	) -> Result<Receipt, ProcessorError>;
}
