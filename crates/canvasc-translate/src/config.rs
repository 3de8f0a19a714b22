//! Translation configuration.

use serde::{Deserialize, Serialize};

/// Options shared by every translator in a compile request.
///
/// The configuration is part of the idempotence key: the same model,
/// target and configuration always produce byte-identical text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    /// Emit a `node N` comment above each translated statement.
    pub emit_node_comments: bool,

    /// Spaces per indentation level.
    pub indent_width: usize,

    /// Run translators on scoped worker threads.
    pub parallel: bool,

    /// C++ namespace wrapping the native output.
    pub native_namespace: String,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        TranslationConfig {
            emit_node_comments: false,
            indent_width: 4,
            parallel: false,
            native_namespace: "canvas".to_string(),
        }
    }
}
