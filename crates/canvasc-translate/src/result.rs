//! Translation outputs: per-target results and the aggregate result.
//!
//! A [`TranslationResult`] is built by exactly one of three constructors and
//! never changes afterwards. For every requested target it holds either a
//! [`TargetResult`] in `translations` or an error list in `errors`, never
//! both.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use canvasc_core::{AbstractCodeModel, SubgraphInterface};

use crate::debug_map::DebugSymbolMap;
use crate::runtime_inputs::RuntimeInputs;
use crate::target::TargetKind;

/// Immutable output of one successful translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetResult {
    target: TargetKind,
    text: String,
    interface: SubgraphInterface,
    runtime_inputs: RuntimeInputs,
    debug_map: DebugSymbolMap,
    duration: Duration,
}

impl TargetResult {
    pub fn new(
        target: TargetKind,
        text: String,
        interface: SubgraphInterface,
        runtime_inputs: RuntimeInputs,
        debug_map: DebugSymbolMap,
        duration: Duration,
    ) -> Self {
        TargetResult {
            target,
            text,
            interface,
            runtime_inputs,
            debug_map,
            duration,
        }
    }

    pub fn target(&self) -> TargetKind {
        self.target
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn interface(&self) -> &SubgraphInterface {
        &self.interface
    }

    pub fn runtime_inputs(&self) -> &RuntimeInputs {
        &self.runtime_inputs
    }

    pub fn debug_map(&self) -> &DebugSymbolMap {
        &self.debug_map
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// blake3 hex digest of the emitted text.
    pub fn digest(&self) -> String {
        blake3::hash(self.text.as_bytes()).to_hex().to_string()
    }
}

/// Successful translations keyed by target.
pub type Translations = BTreeMap<TargetKind, TargetResult>;

/// Failed translations keyed by target, messages in emission order.
pub type Errors = BTreeMap<TargetKind, Vec<String>>;

/// Total translation time of the successful targets.
pub fn sum_durations(translations: &Translations) -> Duration {
    translations.values().map(TargetResult::duration).sum()
}

/// Aggregate result of a compile request.
#[derive(Debug, Clone)]
pub struct TranslationResult {
    invalid_source: Option<String>,
    model: Option<Arc<AbstractCodeModel>>,
    translations: Translations,
    errors: Errors,
    parse_duration: Duration,
    translation_duration: Duration,
}

impl TranslationResult {
    /// The source could not produce a valid model; nothing was translated.
    pub fn invalid_source(info: impl Into<String>, parse_duration: Duration) -> Self {
        TranslationResult {
            invalid_source: Some(info.into()),
            model: None,
            translations: Translations::new(),
            errors: Errors::new(),
            parse_duration,
            translation_duration: Duration::ZERO,
        }
    }

    /// A valid model for which no translation was requested.
    pub fn untranslated(model: Arc<AbstractCodeModel>, parse_duration: Duration) -> Self {
        TranslationResult {
            invalid_source: None,
            model: Some(model),
            translations: Translations::new(),
            errors: Errors::new(),
            parse_duration,
            translation_duration: Duration::ZERO,
        }
    }

    /// A valid model together with its per-target outcomes.
    pub fn translated(
        model: Arc<AbstractCodeModel>,
        translations: Translations,
        errors: Errors,
        parse_duration: Duration,
        translation_duration: Duration,
    ) -> Self {
        debug_assert!(
            translations.keys().all(|t| !errors.contains_key(t)),
            "a target cannot both succeed and fail"
        );
        TranslationResult {
            invalid_source: None,
            model: Some(model),
            translations,
            errors,
            parse_duration,
            translation_duration,
        }
    }

    pub fn invalid_source_info(&self) -> Option<&str> {
        self.invalid_source.as_deref()
    }

    pub fn model(&self) -> Option<&Arc<AbstractCodeModel>> {
        self.model.as_ref()
    }

    pub fn translations(&self) -> &Translations {
        &self.translations
    }

    pub fn errors(&self) -> &Errors {
        &self.errors
    }

    pub fn translation(&self, target: TargetKind) -> Option<&TargetResult> {
        self.translations.get(&target)
    }

    pub fn parse_duration(&self) -> Duration {
        self.parse_duration
    }

    pub fn translation_duration(&self) -> Duration {
        self.translation_duration
    }

    pub fn is_source_valid(&self) -> bool {
        self.invalid_source.is_none()
    }

    pub fn is_model_valid(&self) -> bool {
        self.model.is_some()
    }

    /// `Ok` iff `target` translated; otherwise the reason it did not.
    pub fn is_success(&self, target: TargetKind) -> Result<(), String> {
        if self.translations.contains_key(&target) {
            return Ok(());
        }
        if let Some(messages) = self.errors.get(&target) {
            return Err(messages.join("\n"));
        }
        match &self.invalid_source {
            Some(info) => Err(format!("invalid source: {info}")),
            None => Err(format!("target '{target}' was not requested")),
        }
    }

    pub fn translation_succeed(&self, target: TargetKind) -> bool {
        self.translations.contains_key(&target)
    }

    /// Every error, targets in ascending bit order, one `[target] message`
    /// line per error.
    pub fn errors_to_string(&self) -> String {
        let mut out = String::new();
        for (target, messages) in &self.errors {
            for message in messages {
                out.push_str(&format!("[{target}] {message}\n"));
            }
        }
        out
    }
}
