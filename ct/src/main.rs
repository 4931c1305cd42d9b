//! The conformance-test command line front end.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use regex::Regex;

use tosca::registry;
use tosca_ct::driver::{self, Report, RunOptions};
use tosca_ct::gen::ParameterKind;
use tosca_ct::rules::catalog;
use tosca_ct::smt;

#[derive(Parser)]
#[command(name = "tosca-ct", about = "Conformance testing for Tosca interpreters")]
struct Cli {
	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Print the names of all rules.
	List {
		/// Only rules whose name matches this regular expression.
		#[arg(long)]
		filter: Option<Regex>,
	},
	/// Run the differential test against all registered interpreters.
	Run {
		#[arg(long)]
		filter: Option<Regex>,
		#[arg(long, default_value_t = 0)]
		seed: u64,
		/// Generated states per rule.
		#[arg(long, default_value_t = 8)]
		samples: usize,
		#[arg(long, default_value_t = 16)]
		max_errors: usize,
		/// Interpreters to exercise; defaults to every registered one.
		#[arg(long)]
		interpreter: Vec<String>,
	},
	/// Self-check the rule engine: partition and determinism.
	Test {
		#[arg(long)]
		filter: Option<Regex>,
		#[arg(long, default_value_t = 0)]
		seed: u64,
		#[arg(long, default_value_t = 8)]
		samples: usize,
	},
	/// Replay a directory of serialized states.
	Regressions {
		/// Directory holding `*.json` state files.
		suite: PathBuf,
	},
	/// Print catalog statistics.
	Stats,
	/// Generate and print one state satisfying the named rule.
	Probe {
		rule: String,
		#[arg(long, default_value_t = 0)]
		seed: u64,
	},
	/// Describe the state generator's domains and defaults.
	GeneratorInfo,
	/// Export the rule partition check through the SMT solver binding.
	SmtPrinter {
		#[arg(long)]
		filter: Option<Regex>,
	},
}

fn print_report(report: &Report) {
	println!(
		"rules: {}, states: {}, unsatisfiable: {}, failures: {}",
		report.rules_covered,
		report.states_tested,
		report.unsatisfiable,
		report.failures.len()
	);
	for failure in &report.failures {
		println!(
			"FAIL {} [{}] seed={}",
			failure.rule, failure.interpreter, failure.seed
		);
		for line in &failure.details {
			println!("    {line}");
		}
	}
}

fn finish(report: &Report) -> ExitCode {
	print_report(report);
	if report.success() {
		println!("all tests passed");
		ExitCode::SUCCESS
	} else {
		ExitCode::FAILURE
	}
}

fn main() -> ExitCode {
	env_logger::init();
	let cli = Cli::parse();

	match cli.command {
		Command::List { filter } => {
			for rule in driver::filtered_rules(filter.as_ref()) {
				println!("{}", rule.name);
			}
			ExitCode::SUCCESS
		}
		Command::Run {
			filter,
			seed,
			samples,
			max_errors,
			interpreter,
		} => {
			let options = RunOptions {
				filter,
				seed,
				samples_per_rule: samples,
				max_failures: max_errors,
				interpreters: interpreter,
			};
			match driver::run_differential(&options) {
				Ok(report) => finish(&report),
				Err(error) => {
					eprintln!("error: {error}");
					ExitCode::FAILURE
				}
			}
		}
		Command::Test {
			filter,
			seed,
			samples,
		} => {
			let options = RunOptions {
				filter,
				seed,
				samples_per_rule: samples,
				..Default::default()
			};
			match driver::run_self_check(&options) {
				Ok(report) => finish(&report),
				Err(error) => {
					eprintln!("error: {error}");
					ExitCode::FAILURE
				}
			}
		}
		Command::Regressions { suite } => {
			match driver::run_regressions(&suite, &RunOptions::default()) {
				Ok(report) => finish(&report),
				Err(error) => {
					eprintln!("error: {error}");
					ExitCode::FAILURE
				}
			}
		}
		Command::Stats => {
			let rules = catalog();
			let fail_rules = rules
				.iter()
				.filter(|rule| matches!(rule.effect, tosca_ct::Effect::Fail))
				.count();
			println!("rules: {}", rules.len());
			println!("failure rules: {fail_rules}");
			println!("semantic rules: {}", rules.len() - fail_rules);
			println!("interpreters: {:?}", registry::interpreter_names());
			println!("processors: {:?}", registry::processor_names());
			ExitCode::SUCCESS
		}
		Command::Probe { rule, seed } => match driver::probe_rule(&rule, seed) {
			Some(state) => {
				println!("{}", serde_json::to_string_pretty(&state).unwrap());
				ExitCode::SUCCESS
			}
			None => {
				eprintln!("no state found for rule {rule:?}");
				ExitCode::FAILURE
			}
		},
		Command::GeneratorInfo => {
			for kind in [
				ParameterKind::Numeric,
				ParameterKind::JumpTarget,
				ParameterKind::MemoryOffset,
				ParameterKind::DataOffset,
				ParameterKind::Size,
				ParameterKind::Topic,
				ParameterKind::Address,
				ParameterKind::Gas,
				ParameterKind::Value,
			] {
				println!("{kind:?}:");
				for sample in kind.samples() {
					println!("    {}", tosca_ct::ser::format_u256(*sample));
				}
			}
			ExitCode::SUCCESS
		}
		Command::SmtPrinter { filter } => {
			let rules = driver::filtered_rules(filter.as_ref());
			match smt::connect_solver() {
				Ok(_solver) => {
					println!("solver connected; {} rules to check", rules.len());
					ExitCode::SUCCESS
				}
				Err(error) => {
					eprintln!("error: {error}");
					ExitCode::FAILURE
				}
			}
		}
	}
}
