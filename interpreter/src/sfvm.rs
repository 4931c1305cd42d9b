//! The simple-form engine: executes raw bytecode, with jump destinations
//! looked up in a shared analysis cache.

use std::sync::Arc;

use crate::analysis::{AnalysisCache, DEFAULT_CACHE_SIZE, MAX_CACHED_CODE_SIZE};
use crate::code::CodeView;
use crate::error::Fault;
use crate::eval;
use crate::frame::Frame;
use crate::runtime::RunContext;
use crate::types::{Parameters, RunResult};
use crate::{build_frame, finish_frame, Interpreter, SteppableInterpreter};

/// User-definable options of the simple-form engine.
#[derive(Clone, Debug)]
pub struct SfvmConfig {
	pub with_analysis_cache: bool,
	/// Cache capacity in bytes.
	pub analysis_cache_size: usize,
	/// Largest code for which analyses are cached.
	pub max_cached_code_size: usize,
}

impl Default for SfvmConfig {
	fn default() -> Self {
		Self {
			with_analysis_cache: true,
			analysis_cache_size: DEFAULT_CACHE_SIZE,
			max_cached_code_size: MAX_CACHED_CODE_SIZE,
		}
	}
}

pub struct Sfvm {
	analysis: Option<AnalysisCache>,
}

impl Sfvm {
	#[must_use]
	pub fn new(config: SfvmConfig) -> Self {
		let analysis = config.with_analysis_cache.then(|| {
			AnalysisCache::new(config.analysis_cache_size, config.max_cached_code_size)
		});
		Self { analysis }
	}

	fn code_view(&self, parameters: &Parameters) -> CodeView {
		match &self.analysis {
			Some(cache) => {
				let jumpdests = cache.analyze(&parameters.code, parameters.code_hash);
				CodeView::Raw {
					code: Arc::new(parameters.code.clone()),
					jumpdests,
				}
			}
			None => CodeView::raw_without_analysis(parameters.code.clone()),
		}
	}
}

impl Default for Sfvm {
	fn default() -> Self {
		Self::new(SfvmConfig::default())
	}
}

impl Interpreter for Sfvm {
	fn run(
		&self,
		parameters: Parameters,
		context: &mut dyn RunContext,
	) -> Result<RunResult, Fault> {
		let mut frame = self.new_frame(parameters)?;
		eval::run(&mut frame, context);
		Ok(finish_frame(frame))
	}

	fn steppable(&self) -> Option<&dyn SteppableInterpreter> {
		Some(self)
	}
}

impl SteppableInterpreter for Sfvm {
	fn new_frame(&self, parameters: Parameters) -> Result<Frame, Fault> {
		let view = self.code_view(&parameters);
		build_frame(view, parameters)
	}

	fn step_n(&self, frame: &mut Frame, context: &mut dyn RunContext, n: usize) {
		eval::step_n(frame, context, n);
	}
}
