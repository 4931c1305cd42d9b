//! Process-wide registries of interpreter and processor factories.
//!
//! Built-in engines are pre-registered; external library bindings add
//! themselves at start-up. Iteration order is insertion order, which
//! keeps differential runs deterministic.

use std::sync::Mutex;

use lazy_static::lazy_static;

use crate::processor::Floria;
use crate::transaction::Processor;
use crate::Interpreter;
use tosca_interpreter::{Lfvm, Sfvm};

pub type InterpreterFactory = fn() -> Box<dyn Interpreter>;
pub type ProcessorFactory = fn(Box<dyn Interpreter>) -> Box<dyn Processor>;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("a factory named {0:?} is already registered")]
pub struct DuplicateFactory(pub String);

fn new_sfvm() -> Box<dyn Interpreter> {
	Box::new(Sfvm::default())
}

fn new_lfvm() -> Box<dyn Interpreter> {
	Box::new(Lfvm::default())
}

fn new_floria(interpreter: Box<dyn Interpreter>) -> Box<dyn Processor> {
	Box::new(Floria::new(interpreter))
}

fn new_floria_eth(interpreter: Box<dyn Interpreter>) -> Box<dyn Processor> {
	Box::new(Floria::new_ethereum_compatible(interpreter))
}

lazy_static! {
	static ref INTERPRETERS: Mutex<Vec<(String, InterpreterFactory)>> = Mutex::new(vec![
		("sfvm".to_string(), new_sfvm as InterpreterFactory),
		("lfvm".to_string(), new_lfvm as InterpreterFactory),
	]);
	static ref PROCESSORS: Mutex<Vec<(String, ProcessorFactory)>> = Mutex::new(vec![
		("floria".to_string(), new_floria as ProcessorFactory),
		("floria-eth".to_string(), new_floria_eth as ProcessorFactory),
	]);
}

pub fn register_interpreter_factory(
	name: &str,
	factory: InterpreterFactory,
) -> Result<(), DuplicateFactory> {
	let mut interpreters = INTERPRETERS.lock().unwrap();
	if interpreters.iter().any(|(existing, _)| existing == name) {
		return Err(DuplicateFactory(name.to_string()));
	}
	interpreters.push((name.to_string(), factory));
	Ok(())
}

pub fn register_processor_factory(
	name: &str,
	factory: ProcessorFactory,
) -> Result<(), DuplicateFactory> {
	let mut processors = PROCESSORS.lock().unwrap();
	if processors.iter().any(|(existing, _)| existing == name) {
		return Err(DuplicateFactory(name.to_string()));
	}
	processors.push((name.to_string(), factory));
	Ok(())
}

/// Instantiate a registered interpreter, or `None` for unknown names.
#[must_use]
pub fn new_interpreter(name: &str) -> Option<Box<dyn Interpreter>> {
	let interpreters = INTERPRETERS.lock().unwrap();
	let factory = interpreters
		.iter()
		.find(|(existing, _)| existing == name)
		.map(|(_, factory)| *factory)?;
	Some(factory())
}

/// Instantiate a registered processor around the given interpreter.
#[must_use]
pub fn new_processor(name: &str, interpreter: Box<dyn Interpreter>) -> Option<Box<dyn Processor>> {
	let processors = PROCESSORS.lock().unwrap();
	let factory = processors
		.iter()
		.find(|(existing, _)| existing == name)
		.map(|(_, factory)| *factory)?;
	Some(factory(interpreter))
}

/// Registered interpreter names, in registration order.
#[must_use]
pub fn interpreter_names() -> Vec<String> {
	INTERPRETERS
		.lock()
		.unwrap()
		.iter()
		.map(|(name, _)| name.clone())
		.collect()
}

/// Registered processor names, in registration order.
#[must_use]
pub fn processor_names() -> Vec<String> {
	PROCESSORS
		.lock()
		.unwrap()
		.iter()
		.map(|(name, _)| name.clone())
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn built_in_engines_are_registered() {
		let names = interpreter_names();
		assert!(names.contains(&"sfvm".to_string()));
		assert!(names.contains(&"lfvm".to_string()));
		assert!(new_interpreter("sfvm").is_some());
		assert!(new_interpreter("no-such-engine").is_none());
	}

	#[test]
	fn built_in_processors_are_registered() {
		assert_eq!(processor_names()[..2], ["floria", "floria-eth"]);
		let interpreter = new_interpreter("sfvm").unwrap();
		assert!(new_processor("floria", interpreter).is_some());
	}

	#[test]
	fn duplicate_names_are_rejected() {
		assert!(register_interpreter_factory("sfvm", super::new_sfvm).is_err());
	}
}
