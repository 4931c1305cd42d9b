//! Reserved system addresses handled by registered native routines
//! instead of bytecode. The chain embedding decides what lives here;
//! nothing is registered by default.

use std::collections::BTreeMap;
use std::sync::Mutex;

use lazy_static::lazy_static;
use primitive_types::H160;

use tosca_interpreter::runtime::TransactionContext;
use tosca_interpreter::{CallResult, Gas};

/// A native routine bound to a reserved address.
pub type StateContractHandler =
	fn(&mut dyn TransactionContext, sender: H160, address: H160, input: &[u8], gas: Gas) -> CallResult;

lazy_static! {
	static ref HANDLERS: Mutex<BTreeMap<H160, StateContractHandler>> = Mutex::new(BTreeMap::new());
}

/// Bind `handler` to `address`. Replaces any previous binding.
pub fn register_state_contract(address: H160, handler: StateContractHandler) {
	HANDLERS.lock().unwrap().insert(address, handler);
}

#[must_use]
pub fn is_state_contract(address: H160) -> bool {
	HANDLERS.lock().unwrap().contains_key(&address)
}

pub(crate) fn run_state_contract(
	context: &mut dyn TransactionContext,
	sender: H160,
	address: H160,
	input: &[u8],
	gas: Gas,
) -> CallResult {
	let handler = HANDLERS.lock().unwrap().get(&address).copied();
	match handler {
		Some(handler) => handler(context, sender, address, input, gas),
		None => CallResult::default(),
	}
}
