//! Bridge error types.
//!
//! Every failure crossing the host/VM boundary surfaces as a
//! [`BridgeError`]. VM errors raised while a call runs only ever arrive as
//! [`BridgeError::Runtime`], produced by the safe-call wrapper.

use std::fmt;

use canvasc_translate::ExecutionMode;

/// Lifecycle state of a graph instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Uninitialized,
    Activated,
    Running,
    SuspendedOnOut,
    Unloaded,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstanceState::Uninitialized => "uninitialized",
            InstanceState::Activated => "activated",
            InstanceState::Running => "running",
            InstanceState::SuspendedOnOut => "suspended on out",
            InstanceState::Unloaded => "unloaded",
        };
        f.write_str(name)
    }
}

/// Errors produced by the interpreter bridge.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    /// The operation is not allowed in the instance's current state.
    #[error("lifecycle violation: cannot {operation} while {state}")]
    Lifecycle {
        operation: &'static str,
        state: InstanceState,
    },

    /// A stack value did not have the requested type.
    #[error("type mismatch at index {index}: expected {expected}, found {found}")]
    TypeMismatch {
        index: i32,
        expected: String,
        found: String,
    },

    /// Fewer values on the stack than the operation consumes.
    #[error("stack underflow: needed {needed} values, stack holds {available}")]
    StackUnderflow { needed: usize, available: usize },

    /// Index 0 or beyond either end of the stack.
    #[error("invalid stack index {index} (stack holds {len})")]
    InvalidIndex { index: i32, len: usize },

    /// The value in call position was not a function.
    #[error("value in call position is {found}, not a function")]
    NotCallable { found: String },

    /// A VM error caught by safe-call.
    #[error("script error: {0}")]
    Runtime(String),

    /// The chunk failed to load or evaluate.
    #[error("failed to load chunk '{chunk}': {message}")]
    Load { chunk: String, message: String },

    #[error("unknown out-event '{0}'")]
    UnknownOut(String),

    #[error("unknown In function '{0}'")]
    UnknownIn(String),

    #[error("argument count mismatch for '{name}': expected {expected}, got {found}")]
    ArgumentCount {
        name: String,
        expected: usize,
        found: usize,
    },

    /// Runtime inputs built for another execution mode.
    #[error("runtime inputs are for {0:?} execution, not interpreted")]
    WrongExecutionMode(ExecutionMode),

    #[error("expected {expected} nodeables, got {found}")]
    NodeableCount { expected: usize, found: usize },

    /// Internal VM failure outside a call (registry, allocation).
    #[error("vm error: {0}")]
    Vm(String),
}

impl From<rlua::Error> for BridgeError {
    fn from(err: rlua::Error) -> Self {
        BridgeError::Vm(err.to_string())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {reason}")]
    InvalidEnv { name: &'static str, reason: String },
}
