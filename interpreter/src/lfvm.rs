//! The long-form engine: rewrites bytecode into an instruction stream
//! with pre-decoded PUSH immediates and runs on the stream. Rewrites are
//! cached by code hash.

use crate::code::{CodeView, ConversionCache, LongCode};
use crate::error::Fault;
use crate::eval;
use crate::frame::Frame;
use crate::runtime::RunContext;
use crate::types::{Parameters, RunResult};
use crate::{build_frame, finish_frame, Interpreter, SteppableInterpreter};

/// User-definable options of the long-form engine.
#[derive(Clone, Debug)]
pub struct LfvmConfig {
	pub with_conversion_cache: bool,
	/// Cache capacity in entries.
	pub conversion_cache_entries: usize,
}

impl Default for LfvmConfig {
	fn default() -> Self {
		Self {
			with_conversion_cache: true,
			conversion_cache_entries: 1 << 13,
		}
	}
}

pub struct Lfvm {
	conversion: Option<ConversionCache>,
}

impl Lfvm {
	#[must_use]
	pub fn new(config: LfvmConfig) -> Self {
		let conversion = config.with_conversion_cache.then(|| {
			ConversionCache::new(
				config.conversion_cache_entries,
				crate::analysis::MAX_CACHED_CODE_SIZE,
			)
		});
		Self { conversion }
	}

	fn code_view(&self, parameters: &Parameters) -> CodeView {
		let long = match &self.conversion {
			Some(cache) => cache.convert(&parameters.code, parameters.code_hash),
			None => std::sync::Arc::new(LongCode::rewrite(&parameters.code)),
		};
		CodeView::Long(long)
	}
}

impl Default for Lfvm {
	fn default() -> Self {
		Self::new(LfvmConfig::default())
	}
}

impl Interpreter for Lfvm {
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

impl SteppableInterpreter for Lfvm {
	fn new_frame(&self, parameters: Parameters) -> Result<Frame, Fault> {
		let view = self.code_view(&parameters);
		build_frame(view, parameters)
	}

	fn step_n(&self, frame: &mut Frame, context: &mut dyn RunContext, n: usize) {
		eval::step_n(frame, context, n);
	}
}
