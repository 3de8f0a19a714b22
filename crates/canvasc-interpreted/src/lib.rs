//! Interpreter bridge for canvasc's Lua target.
//!
//! Runs interpreted translations inside an embedded Lua 5.4 VM and lets host
//! code and scripts call each other.
//!
//! # Modules
//!
//! - [`vm`] -- The VM, its value stack, safe-call and execution modes
//! - [`instance`] -- Live graph instances and their lifecycle
//! - [`dispatch`] -- Host services and out-event dispatch
//! - [`marshal`] -- Host/VM value conversion
//! - [`config`] -- Execution configuration and lazily built clients
//! - [`mode`] -- Build configurations and their policies

pub mod config;
pub mod dispatch;
pub mod error;
pub mod instance;
pub mod marshal;
pub mod mode;
pub mod vm;

pub use canvasc_core::codec::{create_id_from_string_fast, create_string_fast_from_id, CodecError};
pub use config::{ClientConfig, ConfiguredClient, ExecutionConfig};
pub use dispatch::{OutEventRecord, OutMode};
pub use error::{BridgeError, ConfigError, InstanceState};
pub use instance::{GraphInstance, InstanceArgs};
pub use mode::{BuildConfiguration, ExecutionPolicy, UnknownBuildConfiguration};
pub use vm::{Callable, ScriptVm};
