//! Transaction-level scenarios through the floria processor.

use primitive_types::{H160, H256, U256};

use tosca::backend::{Account, InMemoryState};
use tosca::interpreter::{BlockParameters, OpCode, Revision};
use tosca::registry;
use tosca::{Floria, Processor, ProcessorError, Transaction};
use tosca_interpreter::runtime::WorldState;

fn address(byte: u8) -> H160 {
	H160::repeat_byte(byte)
}

fn funded_state(sender: H160) -> InMemoryState {
	let mut state = InMemoryState::new();
	state.insert_account(
		sender,
		Account {
			balance: U256::from(1u64) << 96,
			..Default::default()
		},
	);
	state
}

fn block(revision: Revision) -> BlockParameters {
	BlockParameters {
		number: 10,
		gas_limit: 30_000_000,
		coinbase: address(0xcc),
		revision,
		..Default::default()
	}
}

fn floria() -> Floria {
	Floria::new(registry::new_interpreter("sfvm").unwrap())
}

#[test]
fn plain_call_to_a_stop_contract_costs_intrinsic_gas() {
	let sender = H160::zero();
	let recipient = address(0x11);
	let mut state = funded_state(sender);
	state.insert_account(
		recipient,
		Account {
			code: vec![OpCode::STOP.0],
			..Default::default()
		},
	);

	let transaction = Transaction {
		sender,
		recipient: Some(recipient),
		gas_limit: 100_000,
		..Default::default()
	};
	let receipt = floria()
		.run(&block(Revision::London), &transaction, &mut state)
		.unwrap();
	assert!(receipt.success);
	assert_eq!(receipt.gas_used, 21_000);
	assert_eq!(state.nonce(sender), 1);
}

#[test]
fn external_senders_forfeit_a_tenth_of_the_remaining_gas() {
	let sender = address(0x01);
	let recipient = address(0x11);
	let mut state = funded_state(sender);
	state.insert_account(recipient, Account::default());

	let transaction = Transaction {
		sender,
		recipient: Some(recipient),
		gas_limit: 100_000,
		..Default::default()
	};
	let receipt = floria()
		.run(&block(Revision::London), &transaction, &mut state)
		.unwrap();
	assert!(receipt.success);
	// 79,000 remain after the intrinsic charge; 10% of that is kept.
	assert_eq!(receipt.gas_used, 21_000 + 7_900);
}

#[test]
fn value_transfer_moves_the_balance() {
	let sender = address(0x01);
	let recipient = address(0x22);
	let mut state = funded_state(sender);
	state.insert_account(recipient, Account::default());
	let before = state.balance(sender);

	let transaction = Transaction {
		sender,
		recipient: Some(recipient),
		value: U256::from(1_234u64),
		gas_limit: 50_000,
		..Default::default()
	};
	let receipt = floria()
		.run(&block(Revision::London), &transaction, &mut state)
		.unwrap();
	assert!(receipt.success);
	assert_eq!(state.balance(recipient), U256::from(1_234u64));
	// Gas was free (zero gas price), only the value left the sender.
	assert_eq!(state.balance(sender), before - U256::from(1_234u64));
}

#[test]
fn create_deploys_returned_code() {
	let sender = H160::zero();
	let mut state = funded_state(sender);

	// MSTORE8(0, 0xFA); RETURN(0, 1)
	let init = vec![
		OpCode::PUSH1.0,
		0xfa,
		OpCode::PUSH1.0,
		0,
		OpCode::MSTORE8.0,
		OpCode::PUSH1.0,
		1,
		OpCode::PUSH1.0,
		0,
		OpCode::RETURN.0,
	];
	let transaction = Transaction {
		sender,
		recipient: None,
		input: init,
		gas_limit: 200_000,
		..Default::default()
	};
	let receipt = floria()
		.run(&block(Revision::London), &transaction, &mut state)
		.unwrap();
	assert!(receipt.success);
	let created = receipt.contract_address.expect("created address");
	assert_eq!(state.code(created), vec![0xfa]);
	assert_eq!(state.nonce(created), 1);
	assert_eq!(state.nonce(sender), 1);
}

#[test]
fn oversized_deployment_is_rejected_and_rolled_back() {
	let sender = H160::zero();
	let mut state = funded_state(sender);

	// RETURN(0, 30000): the returned code exceeds the deployment limit.
	let init = vec![
		OpCode::PUSH2.0,
		0x75,
		0x30,
		OpCode::PUSH1.0,
		0,
		OpCode::RETURN.0,
	];
	let transaction = Transaction {
		sender,
		recipient: None,
		input: init,
		gas_limit: 200_000,
		..Default::default()
	};
	let receipt = floria()
		.run(&block(Revision::London), &transaction, &mut state)
		.unwrap();
	assert!(!receipt.success);
	assert_eq!(receipt.gas_used, 200_000);
	assert!(receipt.contract_address.is_none());
	assert!(receipt.output.is_empty());
}

#[test]
fn berlin_call_to_a_missing_account_succeeds_without_creating_it() {
	let sender = H160::zero();
	let missing = address(0x44);
	let mut state = funded_state(sender);

	let transaction = Transaction {
		sender,
		recipient: Some(missing),
		gas_limit: 60_000,
		..Default::default()
	};
	let receipt = floria()
		.run(&block(Revision::Berlin), &transaction, &mut state)
		.unwrap();
	assert!(receipt.success);
	// The frame returned all of its gas; only the intrinsic part is used.
	assert_eq!(receipt.gas_used, 21_000);
	assert!(!state.account_exists(missing));
}

#[test]
fn sstore_transaction_writes_storage_and_collects_refunds() {
	let sender = H160::zero();
	let contract = address(0x55);
	let mut state = funded_state(sender);
	let key = H256::from_low_u64_be(0);
	state.insert_account(
		contract,
		Account {
			// SSTORE(0, 1); STOP
			code: vec![OpCode::PUSH1.0, 1, OpCode::PUSH1.0, 0, OpCode::SSTORE.0],
			..Default::default()
		},
	);

	let transaction = Transaction {
		sender,
		recipient: Some(contract),
		gas_limit: 100_000,
		..Default::default()
	};
	let receipt = floria()
		.run(&block(Revision::London), &transaction, &mut state)
		.unwrap();
	assert!(receipt.success);
	assert_eq!(state.storage(contract, key), H256::from_low_u64_be(1));
	// 21000 intrinsic + 3 + 3 + 20000 (fresh slot) + 2100 (cold slot).
	assert_eq!(receipt.gas_used, 21_000 + 3 + 3 + 20_000 + 2_100);
}

#[test]
fn nonce_mismatch_is_silent_in_tosca_mode_and_an_error_in_eth_mode() {
	let sender = address(0x01);
	let transaction = Transaction {
		sender,
		recipient: Some(address(0x02)),
		nonce: 7,
		gas_limit: 30_000,
		..Default::default()
	};

	let mut state = funded_state(sender);
	let receipt = floria()
		.run(&block(Revision::London), &transaction, &mut state)
		.unwrap();
	assert!(!receipt.success);
	assert_eq!(receipt.gas_used, 0);

	let mut state = funded_state(sender);
	let eth = Floria::new_ethereum_compatible(registry::new_interpreter("sfvm").unwrap());
	let error = eth
		.run(&block(Revision::London), &transaction, &mut state)
		.unwrap_err();
	assert_eq!(
		error,
		ProcessorError::NonceMismatch {
			transaction: 7,
			account: 0
		}
	);
}

#[test]
fn contract_senders_are_rejected() {
	let sender = address(0x01);
	let mut state = funded_state(sender);
	let mut account = state.account(sender).unwrap().clone();
	account.code = vec![OpCode::STOP.0];
	state.insert_account(sender, account);

	let transaction = Transaction {
		sender,
		recipient: Some(address(0x02)),
		gas_limit: 30_000,
		..Default::default()
	};
	let eth = Floria::new_ethereum_compatible(registry::new_interpreter("sfvm").unwrap());
	let error = eth
		.run(&block(Revision::London), &transaction, &mut state)
		.unwrap_err();
	assert_eq!(error, ProcessorError::SenderNotEoa);
}

#[test]
fn insufficient_gas_limit_is_rejected() {
	let sender = address(0x01);
	let mut state = funded_state(sender);
	let transaction = Transaction {
		sender,
		recipient: Some(address(0x02)),
		gas_limit: 20_999,
		..Default::default()
	};
	let receipt = floria()
		.run(&block(Revision::London), &transaction, &mut state)
		.unwrap();
	assert!(!receipt.success);
	assert_eq!(receipt.gas_used, 20_999);
}

#[test]
fn eth_mode_pays_the_coinbase_tip() {
	let sender = address(0x01);
	let recipient = address(0x11);
	let coinbase = address(0xcc);
	let mut state = funded_state(sender);
	state.insert_account(recipient, Account::default());

	let mut block = block(Revision::London);
	block.base_fee = U256::from(10u64);
	let transaction = Transaction {
		sender,
		recipient: Some(recipient),
		gas_limit: 30_000,
		gas_fee_cap: U256::from(15u64),
		gas_tip_cap: U256::from(2u64),
		..Default::default()
	};
	let eth = Floria::new_ethereum_compatible(registry::new_interpreter("sfvm").unwrap());
	let receipt = eth.run(&block, &transaction, &mut state).unwrap();
	assert!(receipt.success);
	assert_eq!(receipt.gas_used, 21_000);
	// Effective tip of 2 per used gas unit.
	assert_eq!(state.balance(coinbase), U256::from(2u64 * 21_000));
}
