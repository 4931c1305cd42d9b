//! Interface to an external SMT solver. The rule partition (pairwise
//! disjointness, and the disjunction covering every running state) can
//! be checked symbolically; the wire adapter that talks to an actual
//! solver binary is an external collaborator and plugs in here.

use std::sync::Mutex;

use lazy_static::lazy_static;

/// Reply of a satisfiability check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SatResult {
	/// Satisfiable; carries the model text when the solver produced one.
	Sat(Option<String>),
	Unsat,
	Unknown,
}

#[derive(Debug, thiserror::Error)]
pub enum SolverError {
	/// No solver binding is installed in this build.
	#[error("solver tool is not installed")]
	ToolNotInstalled,
	#[error("malformed solver reply: {0}")]
	MalformedReply(String),
	#[error("solver failed: {0}")]
	Failed(String),
}

/// A connected SMT solver consuming SMT-LIB2 problem text.
pub trait Solver: Send {
	fn check_sat(&mut self, problem: &str) -> Result<SatResult, SolverError>;
}

type SolverFactory = fn() -> Result<Box<dyn Solver>, SolverError>;

lazy_static! {
	static ref SOLVER_FACTORY: Mutex<Option<SolverFactory>> = Mutex::new(None);
}

/// Install the solver binding. Called by the wire adapter at start-up.
pub fn register_solver_factory(factory: SolverFactory) {
	*SOLVER_FACTORY.lock().unwrap() = Some(factory);
}

/// Connect to the installed solver, or report its absence.
pub fn connect_solver() -> Result<Box<dyn Solver>, SolverError> {
	match *SOLVER_FACTORY.lock().unwrap() {
		Some(factory) => factory(),
		None => Err(SolverError::ToolNotInstalled),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_solver_is_reported_as_not_installed() {
		match connect_solver() {
			Err(SolverError::ToolNotInstalled) => {}
			Err(other) => panic!("unexpected: {other:?}"),
			Ok(_) => panic!("unexpected: Ok"),
		}
	}
}
