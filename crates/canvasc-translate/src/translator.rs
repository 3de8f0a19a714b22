//! The per-target translator seam.

use std::time::Instant;

use canvasc_core::{AbstractCodeModel, SubgraphInterface};

use crate::config::TranslationConfig;
use crate::debug_map::DebugSymbolMap;
use crate::error::TranslateError;
use crate::result::TargetResult;
use crate::runtime_inputs::RuntimeInputs;
use crate::target::TargetKind;

/// What a translator produces before the aggregator attaches the shared
/// interface and timing.
#[derive(Debug, Clone)]
pub struct Emission {
    pub text: String,
    pub runtime_inputs: RuntimeInputs,
    pub debug_map: DebugSymbolMap,
}

/// Turns a validated model into text for one target.
///
/// Implementations must be pure with respect to the model and hold no
/// mutable state, since the compiler may run several on worker threads.
pub trait Translator: Send + Sync {
    fn target(&self) -> TargetKind;

    /// Produces the target text, or every problem found.
    fn emit(
        &self,
        model: &AbstractCodeModel,
        interface: &SubgraphInterface,
        config: &TranslationConfig,
    ) -> Result<Emission, Vec<TranslateError>>;

    /// Runs [`Translator::emit`] and bundles the timed result.
    fn translate(
        &self,
        model: &AbstractCodeModel,
        interface: &SubgraphInterface,
        config: &TranslationConfig,
    ) -> Result<TargetResult, Vec<TranslateError>> {
        let start = Instant::now();
        let emission = self.emit(model, interface, config)?;
        Ok(TargetResult::new(
            self.target(),
            emission.text,
            interface.clone(),
            emission.runtime_inputs,
            emission.debug_map,
            start.elapsed(),
        ))
    }
}
