//! The result aggregator.
//!
//! [`Compiler::compile`] validates the model once, derives the subgraph
//! interface once, and then runs the translator of every requested target.
//! A failing (or panicking) translator only affects its own target. When
//! [`TranslationConfig::parallel`] is set the translators run on scoped
//! threads; results are merged on the calling thread after all of them have
//! joined.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use canvasc_core::{AbstractCodeModel, SubgraphInterface};

use crate::config::TranslationConfig;
use crate::error::TranslateError;
use crate::lua::LuaTranslator;
use crate::native::{HeaderTranslator, SourceTranslator};
use crate::result::{sum_durations, Errors, TargetResult, TranslationResult, Translations};
use crate::target::{TargetFlags, TargetKind};
use crate::translator::Translator;

type Outcome = Result<TargetResult, Vec<String>>;

/// Registry of translators keyed by target.
#[derive(Clone)]
pub struct Compiler {
    translators: BTreeMap<TargetKind, Arc<dyn Translator>>,
}

impl Default for Compiler {
    /// A compiler with the Lua, C++ source and C++ header translators.
    fn default() -> Self {
        let mut compiler = Compiler::empty();
        compiler.register(LuaTranslator);
        compiler.register(SourceTranslator);
        compiler.register(HeaderTranslator);
        compiler
    }
}

impl std::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler")
            .field("targets", &self.translators.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Compiler {
    /// A compiler with no translators registered.
    pub fn empty() -> Self {
        Compiler {
            translators: BTreeMap::new(),
        }
    }

    /// Registers `translator` for its target, returning the one it replaces.
    pub fn register(&mut self, translator: impl Translator + 'static) -> Option<Arc<dyn Translator>> {
        self.translators.insert(translator.target(), Arc::new(translator))
    }

    pub fn supports(&self, target: TargetKind) -> bool {
        self.translators.contains_key(&target)
    }

    /// Parses a model from JSON, validates it, and compiles it.
    pub fn compile_json(
        &self,
        text: &str,
        targets: TargetFlags,
        config: &TranslationConfig,
    ) -> TranslationResult {
        let start = Instant::now();
        match AbstractCodeModel::from_json(text) {
            Ok(model) => self.compile_validated(Arc::new(model), start.elapsed(), targets, config),
            Err(err) => {
                warn!(error = %err, "model rejected");
                TranslationResult::invalid_source(err.to_string(), start.elapsed())
            }
        }
    }

    /// Compiles `model` for every target in `targets`.
    ///
    /// A missing or structurally invalid model yields the invalid-source
    /// result without running any translator.
    pub fn compile(
        &self,
        model: Option<Arc<AbstractCodeModel>>,
        targets: TargetFlags,
        config: &TranslationConfig,
    ) -> TranslationResult {
        let start = Instant::now();
        let Some(model) = model else {
            warn!("compile requested without a model");
            return TranslationResult::invalid_source("no model supplied", start.elapsed());
        };
        if let Err(errors) = model.validate() {
            let info = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            warn!(graph = %model.name, errors = errors.len(), "model failed validation");
            return TranslationResult::invalid_source(info, start.elapsed());
        }
        self.compile_validated(model, start.elapsed(), targets, config)
    }

    fn compile_validated(
        &self,
        model: Arc<AbstractCodeModel>,
        parse_duration: Duration,
        targets: TargetFlags,
        config: &TranslationConfig,
    ) -> TranslationResult {
        if targets.is_empty() {
            debug!(graph = %model.name, "no targets requested");
            return TranslationResult::untranslated(model, parse_duration);
        }

        let interface = SubgraphInterface::from_model(&model);
        let kinds = targets.kinds();
        info!(
            graph = %model.name,
            targets = ?kinds.as_slice(),
            parallel = config.parallel,
            "translating"
        );

        let outcomes: Vec<(TargetKind, Outcome)> = if config.parallel && kinds.len() > 1 {
            std::thread::scope(|scope| {
                let handles: Vec<_> = kinds
                    .iter()
                    .map(|&kind| {
                        let model = &model;
                        let interface = &interface;
                        (
                            kind,
                            scope.spawn(move || self.run_one(kind, model, interface, config)),
                        )
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|(kind, handle)| {
                        let outcome = handle.join().unwrap_or_else(|payload| {
                            Err(vec![TranslateError::Panicked(panic_message(payload.as_ref())).to_string()])
                        });
                        (kind, outcome)
                    })
                    .collect()
            })
        } else {
            kinds
                .iter()
                .map(|&kind| (kind, self.run_one(kind, &model, &interface, config)))
                .collect()
        };

        let mut translations = Translations::new();
        let mut errors = Errors::new();
        for (kind, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    debug!(target_kind = %kind, elapsed = ?result.duration(), "target translated");
                    translations.insert(kind, result);
                }
                Err(messages) => {
                    warn!(target_kind = %kind, errors = messages.len(), "target failed");
                    errors.insert(kind, messages);
                }
            }
        }

        let translation_duration = sum_durations(&translations);
        info!(
            graph = %model.name,
            succeeded = translations.len(),
            failed = errors.len(),
            elapsed = ?translation_duration,
            "translation finished"
        );
        TranslationResult::translated(model, translations, errors, parse_duration, translation_duration)
    }

    fn run_one(
        &self,
        kind: TargetKind,
        model: &AbstractCodeModel,
        interface: &SubgraphInterface,
        config: &TranslationConfig,
    ) -> Outcome {
        let Some(translator) = self.translators.get(&kind) else {
            return Err(vec![TranslateError::NoTranslator(kind.to_string()).to_string()]);
        };

        let run = panic::catch_unwind(AssertUnwindSafe(|| {
            translator.translate(model, interface, config)
        }));
        match run {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(errors)) => Err(errors.iter().map(ToString::to_string).collect()),
            Err(payload) => Err(vec![
                TranslateError::Panicked(panic_message(payload.as_ref())).to_string()
            ]),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-text panic payload".to_string()
    }
}
