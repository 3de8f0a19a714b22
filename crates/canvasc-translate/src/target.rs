//! Output target kinds and the request bitmask.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A translation target. The discriminant is the target's bit in
/// [`TargetFlags`]; ordering follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TargetKind {
    /// Interpreted script (Lua 5.4).
    Lua = 1,
    /// Native source (C++).
    Cpp = 2,
    /// Native header (C++).
    Hpp = 4,
}

impl TargetKind {
    pub const ALL: [TargetKind; 3] = [TargetKind::Lua, TargetKind::Cpp, TargetKind::Hpp];

    pub fn bit(self) -> u8 {
        self as u8
    }

    /// File extension of the emitted artifact.
    pub fn extension(self) -> &'static str {
        match self {
            TargetKind::Lua => "lua",
            TargetKind::Cpp => "cpp",
            TargetKind::Hpp => "h",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetKind::Lua => "lua",
            TargetKind::Cpp => "cpp",
            TargetKind::Hpp => "hpp",
        };
        f.write_str(name)
    }
}

/// Error for an unrecognised target name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown target '{0}' (expected lua, cpp or hpp)")]
pub struct UnknownTarget(pub String);

impl FromStr for TargetKind {
    type Err = UnknownTarget;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lua" => Ok(TargetKind::Lua),
            "cpp" => Ok(TargetKind::Cpp),
            "hpp" | "h" => Ok(TargetKind::Hpp),
            other => Err(UnknownTarget(other.to_string())),
        }
    }
}

/// Set of requested targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetFlags(u8);

impl TargetFlags {
    pub const NONE: TargetFlags = TargetFlags(0);
    pub const ALL: TargetFlags = TargetFlags(1 | 2 | 4);

    /// Builds flags from raw bits, ignoring unknown bits.
    pub fn from_bits_truncate(bits: u8) -> Self {
        TargetFlags(bits & Self::ALL.0)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, kind: TargetKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Requested kinds in ascending bit order.
    pub fn kinds(self) -> SmallVec<[TargetKind; 3]> {
        TargetKind::ALL
            .into_iter()
            .filter(|k| self.contains(*k))
            .collect()
    }

    /// Parses a comma-separated list such as `lua,cpp`.
    pub fn parse_list(list: &str) -> Result<Self, UnknownTarget> {
        list.split(',')
            .filter(|s| !s.trim().is_empty())
            .try_fold(TargetFlags::NONE, |acc, name| Ok(acc | name.parse::<TargetKind>()?))
    }
}

impl From<TargetKind> for TargetFlags {
    fn from(kind: TargetKind) -> Self {
        TargetFlags(kind.bit())
    }
}

impl BitOr for TargetFlags {
    type Output = TargetFlags;

    fn bitor(self, rhs: TargetFlags) -> TargetFlags {
        TargetFlags(self.0 | rhs.0)
    }
}

impl BitOr<TargetKind> for TargetFlags {
    type Output = TargetFlags;

    fn bitor(self, rhs: TargetKind) -> TargetFlags {
        TargetFlags(self.0 | rhs.bit())
    }
}

impl BitOr for TargetKind {
    type Output = TargetFlags;

    fn bitor(self, rhs: TargetKind) -> TargetFlags {
        TargetFlags(self.bit() | rhs.bit())
    }
}

impl BitOrAssign<TargetKind> for TargetFlags {
    fn bitor_assign(&mut self, rhs: TargetKind) {
        self.0 |= rhs.bit();
    }
}
