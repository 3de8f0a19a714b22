//! Core error types for canvasc-core.
//!
//! Builder failures are reported eagerly through [`CoreError`]. Structural
//! problems that need the whole model in view are collected by
//! [`crate::validate`] instead.

use crate::id::{FunctionId, VariableId};
use crate::validate::ModelError;
use thiserror::Error;

/// Errors produced while assembling or loading a model.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A variable with this id was already added.
    #[error("duplicate variable: {id}")]
    DuplicateVariable { id: VariableId },

    /// A function with this name was already added.
    #[error("duplicate function name: '{name}'")]
    DuplicateFunction { name: String },

    /// An out-event with this name was already declared.
    #[error("duplicate out-event: '{name}'")]
    DuplicateOutEvent { name: String },

    /// A function ID was not found.
    #[error("function not found: FunctionId({id})", id = id.0)]
    FunctionNotFound { id: FunctionId },

    /// The model failed structural validation.
    #[error("invalid model: {}", format_model_errors(.0))]
    InvalidModel(Vec<ModelError>),

    /// The model could not be parsed from its serialized form.
    #[error("malformed model: {0}")]
    Malformed(#[from] serde_json::Error),
}

fn format_model_errors(errors: &[ModelError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
