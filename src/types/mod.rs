use crate::error::Error;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub use event::{Event, EventFactory};
pub use stack::{capture_stack, StackFrame};

pub mod event;
pub mod stack;

/// Caller-assigned, monotonically increasing event identifier.
pub type EventId = u64;

/// Canonical level names, indexed by ordinal.
pub const LEVEL_NAMES: [&str; 8] = [
    "Debug",
    "Info",
    "Notice",
    "Warning",
    "Error",
    "Critical",
    "Alert",
    "Emergency",
];

const LEVEL_ALIASES: [Option<&str>; 8] = [
    Some("Dbg"),
    None,
    None,
    Some("Warn"),
    Some("Err"),
    Some("Crit"),
    Some("Alrt"),
    Some("Emerg"),
];

/// Event severity, ordered from least to most severe.
#[derive(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Debug,
    IntoPrimitive,
    TryFromPrimitive,
    Serialize,
    Deserialize,
)]
#[num_enum(error_type(name = Error, constructor = Error::InvalidLevelOrdinal))]
#[serde(try_from = "String")]
#[repr(i32)]
pub enum Level {
    Debug = 0,
    Info = 1,
    Notice = 2,
    Warning = 3,
    Error = 4,
    Critical = 5,
    Alert = 6,
    Emergency = 7,
}

impl Level {
    pub const DBG: Level = Level::Debug;
    pub const WARN: Level = Level::Warning;
    pub const ERR: Level = Level::Error;
    pub const CRIT: Level = Level::Critical;
    pub const ALRT: Level = Level::Alert;
    pub const EMERG: Level = Level::Emergency;

    /// All levels in severity order.
    pub const ALL: [Level; 8] = [
        Level::Debug,
        Level::Info,
        Level::Notice,
        Level::Warning,
        Level::Error,
        Level::Critical,
        Level::Alert,
        Level::Emergency,
    ];

    pub fn name(self) -> &'static str {
        LEVEL_NAMES[self as usize]
    }

    /// The short alias, `None` for Info and Notice.
    pub fn alias(self) -> Option<&'static str> {
        LEVEL_ALIASES[self as usize]
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .into_iter()
            .find(|l| {
                l.name().eq_ignore_ascii_case(s)
                    || l.alias().is_some_and(|a| a.eq_ignore_ascii_case(s))
            })
            .ok_or_else(|| Error::InvalidLevel(s.to_owned()))
    }
}

impl TryFrom<String> for Level {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Error> {
        s.parse()
    }
}
