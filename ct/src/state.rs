//! The conformance-test state: a complete, structural description of
//! one interpreter frame mid-execution, together with the slice of the
//! world it can observe.

use std::collections::{BTreeMap, BTreeSet};

use primitive_types::{H160, H256, U256};
use serde::{Deserialize, Serialize};

use tosca_interpreter::{BlockParameters, Gas, Log, Revision, Status, TransactionParameters};

use crate::ser;
use crate::storage::Storage;

/// World-visible slice of an account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStub {
	#[serde(with = "ser::u256_string", default)]
	pub balance: U256,
	#[serde(with = "ser::hex_string", default)]
	pub code: Vec<u8>,
}

/// Identity of the executing frame.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
	#[serde(with = "ser::h160_hex", default)]
	pub account_address: H160,
	#[serde(with = "ser::h160_hex", default)]
	pub caller_address: H160,
	#[serde(with = "ser::u256_string", default)]
	pub value: U256,
	#[serde(default)]
	pub is_static: bool,
	#[serde(default)]
	pub depth: u64,
}

/// Block-level observables.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
	#[serde(default)]
	pub number: u64,
	#[serde(default)]
	pub timestamp: u64,
	#[serde(with = "ser::h160_hex", default)]
	pub coinbase: H160,
	#[serde(default)]
	pub gas_limit: Gas,
	#[serde(with = "ser::h256_hex", default)]
	pub prev_randao: H256,
	#[serde(with = "ser::u256_string", default)]
	pub chain_id: U256,
	#[serde(with = "ser::u256_string", default)]
	pub base_fee: U256,
	#[serde(with = "ser::u256_string", default)]
	pub blob_base_fee: U256,
}

/// Transaction-level observables.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInfo {
	#[serde(with = "ser::h160_hex", default)]
	pub origin: H160,
	#[serde(with = "ser::u256_string", default)]
	pub gas_price: U256,
	#[serde(default)]
	pub blob_hashes: Vec<String>,
}

/// The predetermined outcome of the next nested call or create. The
/// engines under test and the rule oracle both consume the journal in
/// order, so their sub-call results coincide by construction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedCall {
	#[serde(default)]
	pub success: bool,
	#[serde(with = "ser::hex_string", default)]
	pub output: Vec<u8>,
	/// Gas consumed by the callee, clamped to the forwarded amount.
	#[serde(default)]
	pub gas_consumed: Gas,
	#[serde(default)]
	pub gas_refund: Gas,
	#[serde(with = "ser::h160_hex", default)]
	pub created_address: H160,
}

/// One complete conformance-test state. Equality is structural.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
	#[serde(with = "ser::status_string", default)]
	pub status: Status,
	#[serde(with = "ser::revision_string", default)]
	pub revision: Revision,
	#[serde(default)]
	pub pc: u64,
	#[serde(default)]
	pub gas: Gas,
	#[serde(default)]
	pub gas_refund: Gas,
	#[serde(with = "ser::hex_string", default)]
	pub code: Vec<u8>,
	/// Bottom-first; `stack_get(0)` reads the top.
	#[serde(with = "ser::u256_vec_string", default)]
	pub stack: Vec<U256>,
	#[serde(with = "ser::hex_string", default)]
	pub memory: Vec<u8>,
	#[serde(default)]
	pub storage: Storage,
	#[serde(with = "ser::u256_map_string", default)]
	pub transient: BTreeMap<U256, U256>,
	#[serde(default)]
	pub accounts: BTreeMap<H160, AccountStub>,
	/// Accounts already touched within the transaction (EIP-2929).
	#[serde(default)]
	pub warm_accounts: BTreeSet<H160>,
	#[serde(default)]
	pub call_context: CallContext,
	/// Outcomes of nested calls, consumed front to back.
	#[serde(default)]
	pub future_call_results: Vec<PlannedCall>,
	/// Return-data buffer of the most recent completed sub-call.
	#[serde(with = "ser::hex_string", default)]
	pub last_call_return: Vec<u8>,
	/// Data this frame returned via RETURN or REVERT.
	#[serde(with = "ser::hex_string", default)]
	pub return_data: Vec<u8>,
	#[serde(with = "ser::hex_string", default)]
	pub call_data: Vec<u8>,
	#[serde(default)]
	pub block: BlockInfo,
	#[serde(default)]
	pub transaction: TxInfo,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub logs: Vec<CtLog>,
}

/// A log entry in wire form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CtLog {
	#[serde(with = "ser::h160_hex", default)]
	pub address: H160,
	#[serde(default)]
	pub topics: Vec<String>,
	#[serde(with = "ser::hex_string", default)]
	pub data: Vec<u8>,
}

impl From<Log> for CtLog {
	fn from(log: Log) -> Self {
		CtLog {
			address: log.address,
			topics: log
				.topics
				.iter()
				.map(|topic| ser::format_bytes(topic.as_bytes()))
				.collect(),
			data: log.data,
		}
	}
}

impl State {
	/// Read the stack `depth` positions below the top.
	#[must_use]
	pub fn stack_get(&self, depth: usize) -> Option<U256> {
		if depth < self.stack.len() {
			Some(self.stack[self.stack.len() - depth - 1])
		} else {
			None
		}
	}

	pub fn stack_push(&mut self, value: U256) {
		self.stack.push(value);
	}

	pub fn stack_pop(&mut self) -> U256 {
		self.stack.pop().unwrap_or_default()
	}

	/// The raw byte under the program counter, when inside the code.
	#[must_use]
	pub fn op_at_pc(&self) -> Option<u8> {
		self.code.get(self.pc as usize).copied()
	}

	/// Block parameters as the engines consume them.
	#[must_use]
	pub fn block_parameters(&self) -> BlockParameters {
		BlockParameters {
			number: self.block.number,
			timestamp: self.block.timestamp,
			coinbase: self.block.coinbase,
			gas_limit: self.block.gas_limit,
			prev_randao: self.block.prev_randao,
			chain_id: self.block.chain_id,
			base_fee: self.block.base_fee,
			blob_base_fee: self.block.blob_base_fee,
			revision: self.revision,
		}
	}

	#[must_use]
	pub fn transaction_parameters(&self) -> TransactionParameters {
		TransactionParameters {
			origin: self.transaction.origin,
			gas_price: self.transaction.gas_price,
			blob_hashes: self
				.transaction
				.blob_hashes
				.iter()
				.filter_map(|hash| {
					ser::parse_bytes(hash)
						.ok()
						.filter(|bytes| bytes.len() == 32)
						.map(|bytes| H256::from_slice(&bytes))
				})
				.collect(),
		}
	}

	/// List every differing field, first difference first.
	#[must_use]
	pub fn diff(&self, other: &State) -> Vec<String> {
		let mut out = Vec::new();
		if self.status != other.status {
			out.push(format!(
				"status: {} vs {}",
				ser::status_string::name(self.status),
				ser::status_string::name(other.status)
			));
		}
		if self.revision != other.revision {
			out.push(format!("revision: {} vs {}", self.revision, other.revision));
		}
		if self.pc != other.pc {
			out.push(format!("pc: {} vs {}", self.pc, other.pc));
		}
		if self.gas != other.gas {
			out.push(format!("gas: {} vs {}", self.gas, other.gas));
		}
		if self.gas_refund != other.gas_refund {
			out.push(format!(
				"gas_refund: {} vs {}",
				self.gas_refund, other.gas_refund
			));
		}
		if self.code != other.code {
			out.push("code differs".to_string());
		}
		if self.stack != other.stack {
			if self.stack.len() != other.stack.len() {
				out.push(format!(
					"stack size: {} vs {}",
					self.stack.len(),
					other.stack.len()
				));
			} else {
				for depth in 0..self.stack.len() {
					let (a, b) = (self.stack_get(depth), other.stack_get(depth));
					if a != b {
						out.push(format!(
							"stack[{depth}]: {} vs {}",
							ser::format_u256(a.unwrap_or_default()),
							ser::format_u256(b.unwrap_or_default())
						));
					}
				}
			}
		}
		if self.memory != other.memory {
			out.push(format!(
				"memory: {} vs {}",
				ser::format_bytes(&self.memory),
				ser::format_bytes(&other.memory)
			));
		}
		self.storage.diff(&other.storage, &mut out);
		if self.transient != other.transient {
			out.push("transient storage differs".to_string());
		}
		if self.accounts != other.accounts {
			out.push("accounts differ".to_string());
		}
		if self.warm_accounts != other.warm_accounts {
			out.push("warm account set differs".to_string());
		}
		if self.call_context != other.call_context {
			out.push("call context differs".to_string());
		}
		if self.future_call_results != other.future_call_results {
			out.push("future call results differ".to_string());
		}
		if self.last_call_return != other.last_call_return {
			out.push(format!(
				"last call return: {} vs {}",
				ser::format_bytes(&self.last_call_return),
				ser::format_bytes(&other.last_call_return)
			));
		}
		if self.return_data != other.return_data {
			out.push(format!(
				"return data: {} vs {}",
				ser::format_bytes(&self.return_data),
				ser::format_bytes(&other.return_data)
			));
		}
		if self.call_data != other.call_data {
			out.push("call data differs".to_string());
		}
		if self.block != other.block {
			out.push("block info differs".to_string());
		}
		if self.transaction != other.transaction {
			out.push("transaction info differs".to_string());
		}
		if self.logs != other.logs {
			out.push(format!(
				"logs: {} entries vs {}",
				self.logs.len(),
				other.logs.len()
			));
		}
		out
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn equal_states_have_no_diff() {
		let state = State::default();
		assert!(state.diff(&state.clone()).is_empty());
		assert_eq!(state, state.clone());
	}

	#[test]
	fn diff_reports_the_first_differing_field_first(){
		let a = State::default();
		let mut b = a.clone();
		b.status = Status::Failed;
		b.gas = 5;
		let diff = a.diff(&b);
		assert!(diff[0].starts_with("status:"), "{diff:?}");
		assert!(diff.iter().any(|line| line.starts_with("gas:")));
	}

	#[test]
	fn state_serialization_round_trips() {
		let mut state = State::default();
		state.revision = Revision::Cancun;
		state.pc = 3;
		state.gas = 100;
		state.code = vec![0x60, 0x01, 0x60, 0x02, 0x01];
		state.stack = vec![U256::from(7u64), U256::MAX];
		state.memory = vec![0xfa; 32];
		state.storage.set_current(U256::one(), U256::from(9u64));
		state.storage.set_original(U256::one(), U256::from(9u64));
		state.storage.mark_warm(U256::one());
		state.transient.insert(U256::from(2u64), U256::from(3u64));
		state.call_data = vec![1, 2, 3];

		let json = serde_json::to_string_pretty(&state).unwrap();
		let decoded: State = serde_json::from_str(&json).unwrap();
		assert_eq!(decoded, state);
	}

	#[test]
	fn accepts_the_bare_hex_dialect() {
		let json = r#"{"code": "6001", "status": "Running", "revision": "Berlin"}"#;
		let decoded: State = serde_json::from_str(json).unwrap();
		assert_eq!(decoded.code, vec![0x60, 0x01]);
		assert_eq!(decoded.revision, Revision::Berlin);
	}
}
