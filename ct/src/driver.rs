//! The differential harness: generate states, apply the matching rule's
//! effect as the oracle, step every registered engine, and compare.

use std::fs;
use std::path::Path;

use regex::Regex;

use tosca::registry;
use tosca::Interpreter;
use tosca_interpreter::Status;

use crate::adapter::step_state;
use crate::gen::seeded_rng;
use crate::rules::{catalog, rules_matching, Rule};
use crate::state::State;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
	#[error("unknown interpreter: {0}")]
	UnknownInterpreter(String),
	#[error("interpreter {0} does not support single stepping")]
	NotSteppable(String),
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

/// One observed divergence.
#[derive(Debug)]
pub struct Failure {
	pub rule: String,
	pub interpreter: String,
	pub seed: u64,
	/// Human-readable description, first differing field first.
	pub details: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Report {
	pub rules_covered: usize,
	pub states_tested: usize,
	pub unsatisfiable: usize,
	pub failures: Vec<Failure>,
}

impl Report {
	#[must_use]
	pub fn success(&self) -> bool {
		self.failures.is_empty()
	}
}

#[derive(Debug, Clone)]
pub struct RunOptions {
	pub filter: Option<Regex>,
	pub seed: u64,
	pub samples_per_rule: usize,
	pub max_failures: usize,
	/// Engine names to exercise; empty means every registered engine.
	pub interpreters: Vec<String>,
}

impl Default for RunOptions {
	fn default() -> Self {
		Self {
			filter: None,
			seed: 0,
			samples_per_rule: 8,
			max_failures: 16,
			interpreters: Vec::new(),
		}
	}
}

/// Rules selected by the filter, in catalog order.
#[must_use]
pub fn filtered_rules(filter: Option<&Regex>) -> Vec<Rule> {
	catalog()
		.into_iter()
		.filter(|rule| filter.map_or(true, |regex| regex.is_match(&rule.name)))
		.collect()
}

fn engines(options: &RunOptions) -> Result<Vec<(String, Box<dyn Interpreter>)>, DriverError> {
	let names = if options.interpreters.is_empty() {
		registry::interpreter_names()
	} else {
		options.interpreters.clone()
	};
	names
		.into_iter()
		.map(|name| {
			registry::new_interpreter(&name)
				.map(|engine| (name.clone(), engine))
				.ok_or(DriverError::UnknownInterpreter(name))
		})
		.collect()
}

/// A frame that failed is fully dead: its gas is gone and nothing it
/// held can be observed any more, so two failed states are equal.
fn states_agree(oracle: &State, actual: &State) -> bool {
	if oracle == actual {
		return true;
	}
	oracle.status == Status::Failed
		&& actual.status == Status::Failed
		&& oracle.gas == 0
		&& actual.gas == 0
}

fn check_one(
	rules: &[Rule],
	rule: &Rule,
	state: &State,
	engines: &[(String, Box<dyn Interpreter>)],
	seed: u64,
	report: &mut Report,
) {
	let matching = rules_matching(rules, state);
	if matching.len() != 1 {
		report.failures.push(Failure {
			rule: rule.name.clone(),
			interpreter: "<partition>".to_string(),
			seed,
			details: vec![format!(
				"expected exactly one matching rule, found {:?}",
				matching.iter().map(|r| &r.name).collect::<Vec<_>>()
			)],
		});
		return;
	}

	let mut oracle = state.clone();
	matching[0].effect.apply(&mut oracle);

	for (name, engine) in engines {
		let Some(steppable) = engine.steppable() else {
			continue;
		};
		match step_state(steppable, state, 1) {
			Ok(actual) => {
				if !states_agree(&oracle, &actual) {
					report.failures.push(Failure {
						rule: rule.name.clone(),
						interpreter: name.clone(),
						seed,
						details: oracle.diff(&actual),
					});
				}
			}
			Err(fault) => report.failures.push(Failure {
				rule: rule.name.clone(),
				interpreter: name.clone(),
				seed,
				details: vec![format!("engine rejected the state: {fault}")],
			}),
		}
		report.states_tested += 1;
	}
}

/// Run the differential test over the filtered catalog.
pub fn run_differential(options: &RunOptions) -> Result<Report, DriverError> {
	let rules = filtered_rules(options.filter.as_ref());
	let engines = engines(options)?;
	let mut report = Report::default();

	'rules: for (rule_index, rule) in rules.iter().enumerate() {
		report.rules_covered += 1;
		for sample in 0..options.samples_per_rule {
			let seed = options
				.seed
				.wrapping_add((rule_index * options.samples_per_rule + sample) as u64);
			let generator = rule.generator();
			let state = match generator.generate(&mut seeded_rng(seed)) {
				Ok(state) => state,
				Err(_) => {
					report.unsatisfiable += 1;
					continue;
				}
			};
			debug_assert!(rule.matches(&state), "{}", rule.name);
			check_one(&rules, rule, &state, &engines, seed, &mut report);
			if report.failures.len() >= options.max_failures {
				log::warn!("stopping after {} failures", report.failures.len());
				break 'rules;
			}
		}
	}
	Ok(report)
}

/// Self-check of the rule engine itself: the partition property and the
/// determinism of generation and effects, without touching any engine.
pub fn run_self_check(options: &RunOptions) -> Result<Report, DriverError> {
	let rules = filtered_rules(options.filter.as_ref());
	let mut report = Report::default();

	for (rule_index, rule) in rules.iter().enumerate() {
		report.rules_covered += 1;
		for sample in 0..options.samples_per_rule {
			let seed = options
				.seed
				.wrapping_add((rule_index * options.samples_per_rule + sample) as u64);
			let generator = rule.generator();
			let state = match generator.generate(&mut seeded_rng(seed)) {
				Ok(state) => state,
				Err(_) => {
					report.unsatisfiable += 1;
					continue;
				}
			};
			report.states_tested += 1;

			let replay = generator.generate(&mut seeded_rng(seed)).expect("was satisfiable");
			if replay != state {
				report.failures.push(Failure {
					rule: rule.name.clone(),
					interpreter: "<generator>".to_string(),
					seed,
					details: vec!["generation is not deterministic".to_string()],
				});
			}

			let matching = rules_matching(&rules, &state);
			if matching.len() != 1 || matching[0].name != rule.name {
				report.failures.push(Failure {
					rule: rule.name.clone(),
					interpreter: "<partition>".to_string(),
					seed,
					details: vec![format!(
						"matched rules: {:?}",
						matching.iter().map(|r| &r.name).collect::<Vec<_>>()
					)],
				});
				continue;
			}

			let mut once = state.clone();
			rule.effect.apply(&mut once);
			let mut twice = state.clone();
			rule.effect.apply(&mut twice);
			if once != twice {
				report.failures.push(Failure {
					rule: rule.name.clone(),
					interpreter: "<effect>".to_string(),
					seed,
					details: vec!["effect is not deterministic".to_string()],
				});
			}
		}
	}
	Ok(report)
}

/// Replay every serialized state below `path` against all engines.
pub fn run_regressions(path: &Path, options: &RunOptions) -> Result<Report, DriverError> {
	let rules = filtered_rules(None);
	let engines = engines(options)?;
	let mut report = Report::default();

	let mut files: Vec<_> = fs::read_dir(path)?
		.filter_map(Result::ok)
		.map(|entry| entry.path())
		.filter(|path| path.extension().is_some_and(|ext| ext == "json"))
		.collect();
	files.sort();

	for file in files {
		let state: State = serde_json::from_reader(fs::File::open(&file)?)?;
		if state.status != Status::Running {
			continue;
		}
		let matching = rules_matching(&rules, &state);
		let Some(rule) = matching.first().copied() else {
			report.failures.push(Failure {
				rule: file.display().to_string(),
				interpreter: "<partition>".to_string(),
				seed: 0,
				details: vec!["no rule matches the replayed state".to_string()],
			});
			continue;
		};
		report.rules_covered += 1;
		check_one(&rules, rule, &state, &engines, 0, &mut report);
	}
	Ok(report)
}

/// Generate and return one state satisfying the named rule.
pub fn probe_rule(name: &str, seed: u64) -> Option<State> {
	let rules = catalog();
	let rule = rules.iter().find(|rule| rule.name == name)?;
	let generator = rule.generator();
	generator.generate(&mut seeded_rng(seed)).ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn arithmetic_rules_agree_across_engines() {
		let options = RunOptions {
			filter: Some(Regex::new("^(add|sub|mul|div|iszero|push1)_").unwrap()),
			samples_per_rule: 4,
			..Default::default()
		};
		let report = run_differential(&options).unwrap();
		assert!(report.rules_covered > 0);
		assert!(
			report.success(),
			"failures: {:#?}",
			&report.failures[..report.failures.len().min(3)]
		);
	}

	#[test]
	fn self_check_passes_for_flow_rules() {
		let options = RunOptions {
			filter: Some(Regex::new("^(jump|jumpi|stop|pc)_").unwrap()),
			samples_per_rule: 4,
			..Default::default()
		};
		let report = run_self_check(&options).unwrap();
		assert!(report.success(), "failures: {:#?}", report.failures);
	}
}
