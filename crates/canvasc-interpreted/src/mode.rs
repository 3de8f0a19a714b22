//! Execution modes and the policies they select.
//!
//! A mode is a per-VM value. Switching it changes how calls are checked and
//! reported; it never touches the translated chunk.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Build configuration of an execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildConfiguration {
    #[default]
    Debug,
    Performance,
    Release,
}

/// What a mode turns on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionPolicy {
    /// Keep VM tracebacks in error messages.
    pub keep_traceback: bool,
    /// Append the originating graph node to VM errors.
    pub annotate_errors: bool,
    /// Check out-event arguments against their declared types.
    pub check_out_args: bool,
    /// Emit `trace!` events for every out dispatch.
    pub trace_dispatch: bool,
    /// Enforce the configured instruction limit.
    pub instruction_limit: bool,
}

impl BuildConfiguration {
    pub fn policy(self) -> ExecutionPolicy {
        match self {
            BuildConfiguration::Debug => ExecutionPolicy {
                keep_traceback: true,
                annotate_errors: true,
                check_out_args: true,
                trace_dispatch: true,
                instruction_limit: true,
            },
            BuildConfiguration::Performance => ExecutionPolicy {
                keep_traceback: false,
                annotate_errors: false,
                check_out_args: false,
                trace_dispatch: false,
                instruction_limit: false,
            },
            BuildConfiguration::Release => ExecutionPolicy {
                keep_traceback: false,
                annotate_errors: false,
                check_out_args: false,
                trace_dispatch: false,
                instruction_limit: true,
            },
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            BuildConfiguration::Debug => 0,
            BuildConfiguration::Performance => 1,
            BuildConfiguration::Release => 2,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => BuildConfiguration::Performance,
            2 => BuildConfiguration::Release,
            _ => BuildConfiguration::Debug,
        }
    }
}

impl fmt::Display for BuildConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildConfiguration::Debug => "debug",
            BuildConfiguration::Performance => "performance",
            BuildConfiguration::Release => "release",
        };
        f.write_str(name)
    }
}

/// Error for an unrecognised mode name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown build configuration '{0}' (expected debug, performance or release)")]
pub struct UnknownBuildConfiguration(pub String);

impl FromStr for BuildConfiguration {
    type Err = UnknownBuildConfiguration;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(BuildConfiguration::Debug),
            "performance" | "perf" => Ok(BuildConfiguration::Performance),
            "release" => Ok(BuildConfiguration::Release),
            other => Err(UnknownBuildConfiguration(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policies_per_mode() {
        let debug = BuildConfiguration::Debug.policy();
        assert!(debug.keep_traceback && debug.annotate_errors && debug.instruction_limit);

        let perf = BuildConfiguration::Performance.policy();
        assert!(!perf.keep_traceback && !perf.check_out_args && !perf.instruction_limit);

        let release = BuildConfiguration::Release.policy();
        assert!(release.instruction_limit);
        assert!(!release.annotate_errors);
    }

    #[test]
    fn raw_roundtrip() {
        for mode in [
            BuildConfiguration::Debug,
            BuildConfiguration::Performance,
            BuildConfiguration::Release,
        ] {
            assert_eq!(BuildConfiguration::from_u8(mode.to_u8()), mode);
            assert_eq!(mode.to_string().parse::<BuildConfiguration>().unwrap(), mode);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert!("turbo".parse::<BuildConfiguration>().is_err());
    }
}
