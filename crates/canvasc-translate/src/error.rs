//! Translation error types.

use canvasc_core::{NodeId, VariableId};

/// A failure local to one target's translation.
///
/// The aggregator flattens these into the per-target error list of a
/// [`crate::TranslationResult`]; only their display text survives.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TranslateError {
    /// The target cannot express a construct used by the model.
    #[error("unsupported construct: {construct} at node {node}")]
    Unsupported { construct: String, node: NodeId },

    /// A variable was entered into more than one runtime input bucket.
    #[error("variable {id} already present in runtime inputs")]
    DuplicateRuntimeInput { id: VariableId },

    /// Structural model problem found by a translator.
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// A translator panicked; the message is the panic payload if textual.
    #[error("translator panicked: {0}")]
    Panicked(String),

    /// No translator is registered for a requested target.
    #[error("no translator registered for target '{0}'")]
    NoTranslator(String),
}
