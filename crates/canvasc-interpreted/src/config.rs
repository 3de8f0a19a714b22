//! Execution configuration and the lazily built client it produces.
//!
//! An [`ExecutionConfig`] may point at a parent; unset fields fall back to
//! the parent and then to the built-in defaults. [`ClientConfig`] turns a
//! configuration into a shared client of any type implementing
//! [`ConfiguredClient`], building it on first use.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, ConfigError};
use crate::mode::BuildConfiguration;
use crate::vm::{ScriptVm, DEFAULT_HOOK_INTERVAL};

/// Environment variable selecting the build configuration.
pub const BUILD_ENV: &str = "CANVASC_BUILD";
/// Environment variable holding the per-call instruction limit.
pub const INSTRUCTION_LIMIT_ENV: &str = "CANVASC_INSTRUCTION_LIMIT";

/// Settings for a script VM.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub build: Option<BuildConfiguration>,
    pub instruction_limit: Option<u64>,
    pub hook_interval: Option<u32>,
    #[serde(skip)]
    pub parent: Option<Arc<ExecutionConfig>>,
}

impl ExecutionConfig {
    pub fn with_parent(parent: Arc<ExecutionConfig>) -> Self {
        ExecutionConfig {
            parent: Some(parent),
            ..Default::default()
        }
    }

    pub fn build(&self) -> BuildConfiguration {
        self.build
            .or_else(|| self.parent.as_ref().map(|p| p.build()))
            .unwrap_or_default()
    }

    pub fn instruction_limit(&self) -> Option<u64> {
        self.instruction_limit
            .or_else(|| self.parent.as_ref().and_then(|p| p.instruction_limit()))
    }

    pub fn hook_interval(&self) -> u32 {
        self.hook_interval
            .or_else(|| self.parent.as_ref().map(|p| p.hook_interval()))
            .unwrap_or(DEFAULT_HOOK_INTERVAL)
    }

    /// Reads [`BUILD_ENV`] and [`INSTRUCTION_LIMIT_ENV`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`ExecutionConfig::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = ExecutionConfig::default();
        if let Some(raw) = lookup(BUILD_ENV) {
            let build = raw.parse().map_err(|e: crate::mode::UnknownBuildConfiguration| {
                ConfigError::InvalidEnv {
                    name: BUILD_ENV,
                    reason: e.to_string(),
                }
            })?;
            config.build = Some(build);
        }
        if let Some(raw) = lookup(INSTRUCTION_LIMIT_ENV) {
            let limit = raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidEnv {
                name: INSTRUCTION_LIMIT_ENV,
                reason: e.to_string(),
            })?;
            config.instruction_limit = Some(limit);
        }
        Ok(config)
    }
}

/// A client that can be built from an [`ExecutionConfig`].
pub trait ConfiguredClient: Sized {
    type Error;

    fn from_config(config: &ExecutionConfig) -> Result<Self, Self::Error>;
}

impl ConfiguredClient for ScriptVm {
    type Error = BridgeError;

    fn from_config(config: &ExecutionConfig) -> Result<Self, BridgeError> {
        let vm = ScriptVm::with_hook_interval(config.hook_interval());
        vm.set_instruction_limit(config.instruction_limit());
        vm.set_execution_mode(config.build());
        vm.activate()?;
        Ok(vm)
    }
}

type Initializer = Box<dyn Fn(&mut ExecutionConfig)>;

/// Builds one shared client of type `C` from a configuration.
pub struct ClientConfig<C: ConfiguredClient> {
    config: ExecutionConfig,
    initializer: Option<Initializer>,
    client: OnceCell<Rc<C>>,
}

impl<C: ConfiguredClient> fmt::Debug for ClientConfig<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("config", &self.config)
            .field("has_initializer", &self.initializer.is_some())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl<C: ConfiguredClient> ClientConfig<C> {
    pub fn new(config: ExecutionConfig) -> Self {
        ClientConfig {
            config,
            initializer: None,
            client: OnceCell::new(),
        }
    }

    /// A client configuration whose unset fields fall back to `parent`.
    pub fn with_parent(parent: Arc<ExecutionConfig>) -> Self {
        Self::new(ExecutionConfig::with_parent(parent))
    }

    /// Adjusts the configuration right before the client is built.
    pub fn with_initializer(mut self, initializer: impl Fn(&mut ExecutionConfig) + 'static) -> Self {
        self.initializer = Some(Box::new(initializer));
        self
    }

    /// The configuration the client is (or will be) built from.
    pub fn effective_config(&self) -> ExecutionConfig {
        let mut config = self.config.clone();
        if let Some(init) = &self.initializer {
            init(&mut config);
        }
        config
    }

    /// Returns the client, building it on the first call. A failed build is
    /// not cached.
    pub fn client(&self) -> Result<Rc<C>, C::Error> {
        self.client
            .get_or_try_init(|| C::from_config(&self.effective_config()).map(Rc::new))
            .cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.client.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn defaults() {
        let config = ExecutionConfig::default();
        assert_eq!(config.build(), BuildConfiguration::Debug);
        assert_eq!(config.instruction_limit(), None);
        assert_eq!(config.hook_interval(), DEFAULT_HOOK_INTERVAL);
    }

    #[test]
    fn child_falls_back_to_parent() {
        let parent = Arc::new(ExecutionConfig {
            build: Some(BuildConfiguration::Release),
            instruction_limit: Some(500),
            ..Default::default()
        });
        let mut child = ExecutionConfig::with_parent(parent);
        assert_eq!(child.build(), BuildConfiguration::Release);
        assert_eq!(child.instruction_limit(), Some(500));

        child.build = Some(BuildConfiguration::Performance);
        assert_eq!(child.build(), BuildConfiguration::Performance);
    }

    #[test]
    fn serde_roundtrip_skips_parent() {
        let config = ExecutionConfig {
            build: Some(BuildConfiguration::Performance),
            instruction_limit: Some(10),
            hook_interval: None,
            parent: Some(Arc::new(ExecutionConfig::default())),
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: ExecutionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.build, config.build);
        assert_eq!(back.instruction_limit, Some(10));
        assert!(back.parent.is_none());

        let empty: ExecutionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, ExecutionConfig::default());
    }

    #[test]
    fn env_lookup() {
        let config = ExecutionConfig::from_lookup(|name| match name {
            BUILD_ENV => Some("release".into()),
            INSTRUCTION_LIMIT_ENV => Some(" 2000 ".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.build, Some(BuildConfiguration::Release));
        assert_eq!(config.instruction_limit, Some(2000));

        let err = ExecutionConfig::from_lookup(|name| {
            (name == INSTRUCTION_LIMIT_ENV).then(|| "lots".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains(INSTRUCTION_LIMIT_ENV));
    }

    struct Counting;

    thread_local! {
        static BUILDS: Cell<u32> = const { Cell::new(0) };
    }

    impl ConfiguredClient for Counting {
        type Error = String;

        fn from_config(config: &ExecutionConfig) -> Result<Self, String> {
            BUILDS.with(|b| b.set(b.get() + 1));
            match config.instruction_limit() {
                Some(0) => Err("zero limit".into()),
                _ => Ok(Counting),
            }
        }
    }

    #[test]
    fn client_is_built_once_and_shared() {
        BUILDS.with(|b| b.set(0));
        let config = ClientConfig::<Counting>::new(ExecutionConfig::default());
        assert!(!config.is_initialized());
        let a = config.client().unwrap();
        let b = config.client().unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert!(config.is_initialized());
        assert_eq!(BUILDS.with(Cell::get), 1);
    }

    #[test]
    fn failed_builds_are_retried() {
        BUILDS.with(|b| b.set(0));
        let config = ClientConfig::<Counting>::new(ExecutionConfig::default())
            .with_initializer(|c| c.instruction_limit = Some(0));
        assert_eq!(config.client().err(), Some("zero limit".to_string()));
        assert_eq!(config.client().err(), Some("zero limit".to_string()));
        assert!(!config.is_initialized());
        assert_eq!(BUILDS.with(Cell::get), 2);
    }

    #[test]
    fn script_vm_client_applies_config() {
        let parent = Arc::new(ExecutionConfig {
            build: Some(BuildConfiguration::Release),
            ..Default::default()
        });
        let config = ClientConfig::<ScriptVm>::with_parent(parent)
            .with_initializer(|c| c.instruction_limit = Some(1_000_000));
        let vm = config.client().unwrap();
        assert_eq!(vm.mode(), BuildConfiguration::Release);
        assert_eq!(vm.instruction_limit(), Some(1_000_000));
        assert!(vm.is_activated());
    }
}
