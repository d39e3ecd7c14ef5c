//! Timer phase tracking.
//!
//! A timer moves through a small lifecycle:
//! RESET → RUNNING → STOPPED
//!
//! `stop()` on a reset timer is a no-op for the phase, and `start()` is
//! accepted from every phase.

use crate::error::{TimerError, TimerResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Measurement phase of a single timer instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimerPhase {
    /// Freshly constructed or reset; no `start()` recorded.
    #[default]
    Reset,
    /// `start()` recorded, no `stop()` since.
    Running,
    /// `stop()` recorded after the most recent `start()`.
    Stopped,
}

impl fmt::Display for TimerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reset => write!(f, "RESET"),
            Self::Running => write!(f, "RUNNING"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

impl TimerPhase {
    /// Phase after a `start()`.
    #[must_use]
    pub fn after_start(self) -> TimerPhase {
        TimerPhase::Running
    }

    /// Phase after a `stop()`.
    ///
    /// A stop without a preceding start leaves the timer reset, so a later
    /// `cycles()` is still rejected.
    #[must_use]
    pub fn after_stop(self) -> TimerPhase {
        match self {
            TimerPhase::Reset => TimerPhase::Reset,
            TimerPhase::Running | TimerPhase::Stopped => TimerPhase::Stopped,
        }
    }

    /// Returns true once a `start()` has been recorded.
    #[must_use]
    pub fn has_started(self) -> bool {
        matches!(self, Self::Running | Self::Stopped)
    }

    /// Require a start/stop pair, as needed by `cycles()`.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::MisuseOrder`] unless the phase is `Stopped`.
    pub fn require_stopped(self, operation: &'static str) -> TimerResult<()> {
        if self == TimerPhase::Stopped {
            Ok(())
        } else {
            Err(TimerError::MisuseOrder {
                operation,
                phase: self,
            })
        }
    }

    /// Require a recorded start, as needed by `check_cycles()`.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::MisuseOrder`] if the timer is still reset.
    pub fn require_started(self, operation: &'static str) -> TimerResult<()> {
        if self.has_started() {
            Ok(())
        } else {
            Err(TimerError::MisuseOrder {
                operation,
                phase: self,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let phase = TimerPhase::default();
        assert_eq!(phase, TimerPhase::Reset);

        let phase = phase.after_start();
        assert_eq!(phase, TimerPhase::Running);

        let phase = phase.after_stop();
        assert_eq!(phase, TimerPhase::Stopped);

        // Restarting a stopped timer
        assert_eq!(phase.after_start(), TimerPhase::Running);
    }

    #[test]
    fn test_stop_without_start_stays_reset() {
        assert_eq!(TimerPhase::Reset.after_stop(), TimerPhase::Reset);
        assert!(TimerPhase::Reset.require_stopped("cycles").is_err());
    }

    #[test]
    fn test_restop_keeps_stopped() {
        assert_eq!(TimerPhase::Stopped.after_stop(), TimerPhase::Stopped);
    }

    #[test]
    fn test_require_started() {
        assert!(TimerPhase::Reset.require_started("check_cycles").is_err());
        assert!(TimerPhase::Running.require_started("check_cycles").is_ok());
        assert!(TimerPhase::Stopped.require_started("check_cycles").is_ok());
    }

    #[test]
    fn test_require_stopped_reports_phase() {
        let err = TimerPhase::Running.require_stopped("cycles").unwrap_err();
        assert_eq!(
            err,
            TimerError::MisuseOrder {
                operation: "cycles",
                phase: TimerPhase::Running,
            }
        );
        assert_eq!(
            err.to_string(),
            "cycles called out of order: timer is RUNNING"
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(TimerPhase::Reset.to_string(), "RESET");
        assert_eq!(TimerPhase::Running.to_string(), "RUNNING");
        assert_eq!(TimerPhase::Stopped.to_string(), "STOPPED");
    }
}
