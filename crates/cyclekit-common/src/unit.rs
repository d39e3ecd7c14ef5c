//! Time units for cycle-to-time conversion.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unit used by calls that return a converted time.
///
/// The discriminant is the number of units per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TimeUnit {
    /// Seconds.
    #[default]
    #[serde(rename = "s")]
    Seconds = 1,
    /// Milliseconds.
    #[serde(rename = "ms")]
    Milliseconds = 1_000,
    /// Microseconds.
    #[serde(rename = "us")]
    Microseconds = 1_000_000,
    /// Nanoseconds.
    #[serde(rename = "ns")]
    Nanoseconds = 1_000_000_000,
}

impl TimeUnit {
    /// All units, coarsest first.
    pub const ALL: [TimeUnit; 4] = [
        TimeUnit::Seconds,
        TimeUnit::Milliseconds,
        TimeUnit::Microseconds,
        TimeUnit::Nanoseconds,
    ];

    /// Units per second.
    #[must_use]
    pub const fn per_second(self) -> u64 {
        self as u64
    }

    /// Units per second as a float conversion factor.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // all factors are exact in f64
    pub fn scale(self) -> f64 {
        self.per_second() as f64
    }

    /// Short suffix, e.g. `ms`.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Seconds => "s",
            Self::Milliseconds => "ms",
            Self::Microseconds => "us",
            Self::Nanoseconds => "ns",
        }
    }

    /// Convert a tick count to this unit at `clock_rate` ticks per second.
    ///
    /// Plain floating-point division; no rounding guarantees beyond that.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_ticks(self, ticks: u64, clock_rate: u64) -> f64 {
        ticks as f64 / (clock_rate as f64 / self.scale())
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Error returned when parsing an unknown unit name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown time unit '{0}' (expected s, ms, us or ns)")]
pub struct ParseTimeUnitError(pub String);

impl FromStr for TimeUnit {
    type Err = ParseTimeUnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s" | "sec" | "seconds" => Ok(Self::Seconds),
            "ms" | "millis" | "milliseconds" => Ok(Self::Milliseconds),
            "us" | "µs" | "micros" | "microseconds" => Ok(Self::Microseconds),
            "ns" | "nanos" | "nanoseconds" => Ok(Self::Nanoseconds),
            other => Err(ParseTimeUnitError(other.to_string())),
        }
    }
}
