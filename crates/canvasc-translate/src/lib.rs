//! Target translation for canvasc abstract code models.
//!
//! This crate turns a validated [`canvasc_core::AbstractCodeModel`] into
//! target text plus the metadata needed to run it.
//!
//! # Modules
//!
//! - [`target`] -- Target kinds and the request bitmask
//! - [`compiler`] -- The aggregator that runs translators and merges results
//! - [`result`] -- Per-target and aggregate results
//! - [`runtime_inputs`] -- Instance-construction data for compiled graphs
//! - [`debug_map`] -- Emitted-line to graph-node map (interpreted target)
//! - [`lua`] -- Interpreted target (Lua 5.4)
//! - [`native`] -- Native C++ source and header targets

pub mod compiler;
pub mod config;
pub mod debug_map;
pub mod error;
pub mod literal;
pub mod lua;
pub mod naming;
pub mod native;
pub mod result;
pub mod runtime_inputs;
pub mod target;
pub mod translator;
pub mod writer;

pub use compiler::Compiler;
pub use config::TranslationConfig;
pub use debug_map::{DebugMapBuilder, DebugSymbol, DebugSymbolMap};
pub use error::TranslateError;
pub use lua::LuaTranslator;
pub use native::{HeaderTranslator, SourceTranslator};
pub use result::{sum_durations, Errors, TargetResult, TranslationResult, Translations};
pub use runtime_inputs::{ExecutionMode, NodeableInput, RuntimeInputs};
pub use target::{TargetFlags, TargetKind, UnknownTarget};
pub use translator::{Emission, Translator};
