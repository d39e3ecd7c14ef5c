use crate::config::ConfigError;
use crate::state::TimerPhase;
use thiserror::Error;

/// No usable hardware cycle counter on this architecture.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("no hardware cycle counter available on {arch}")]
pub struct UnsupportedPlatform {
    /// Target architecture name (as in `std::env::consts::ARCH`).
    pub arch: &'static str,
}

impl UnsupportedPlatform {
    /// Error for the architecture this binary was compiled for.
    #[must_use]
    pub fn current() -> Self {
        Self {
            arch: std::env::consts::ARCH,
        }
    }
}

/// Timer error types covering capability, usage, and setup failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TimerError {
    /// The platform has no hardware cycle counter.
    #[error(transparent)]
    UnsupportedPlatform(#[from] UnsupportedPlatform),

    /// An accessor was called before the start/stop sequence it depends on.
    #[error("{operation} called out of order: timer is {phase}")]
    MisuseOrder {
        /// Operation that was rejected.
        operation: &'static str,
        /// Phase the timer was in.
        phase: TimerPhase,
    },

    /// The end reading is lower than the start reading.
    #[error("counter went backwards: start {start}, end {end}")]
    NonMonotonic {
        /// Counter value at start.
        start: u64,
        /// Counter value at the end of the interval.
        end: u64,
    },

    /// Clock rate of zero ticks per second.
    #[error("invalid clock rate: {0} ticks per second")]
    InvalidClockRate(u64),

    /// Clock rate calibration did not produce a usable value.
    #[error("calibration failed: {0}")]
    Calibration(String),

    /// Thread pinning failed.
    #[error("CPU affinity error: {0}")]
    Affinity(String),

    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<ConfigError> for TimerError {
    fn from(err: ConfigError) -> Self {
        TimerError::Config(err.to_string())
    }
}

/// Convenience type alias for timer operations.
pub type TimerResult<T> = Result<T, TimerError>;
