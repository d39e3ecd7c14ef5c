//! Configuration structures for cycle timers.
//!
//! Supports TOML deserialization with sensible defaults so that a
//! missing file behaves like an empty one.

use crate::unit::TimeUnit;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Clock rate assumed when nothing else is known (4 GHz).
pub const DEFAULT_CLOCK_RATE: u64 = 4_000_000_000;

/// Top-level timer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Where the ticks-per-second value comes from.
    pub clock_rate: ClockRateSetting,

    /// Default unit for reported times.
    pub unit: TimeUnit,

    /// Calibration parameters, used when `clock_rate = "calibrate"`.
    pub calibration: CalibrationConfig,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            clock_rate: ClockRateSetting::Fixed(DEFAULT_CLOCK_RATE),
            unit: TimeUnit::Seconds,
            calibration: CalibrationConfig::default(),
        }
    }
}

/// Source of the clock rate used for unit conversion.
///
/// In TOML this is either an integer (ticks per second) or one of the
/// strings `"nominal"` and `"calibrate"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockRateSetting {
    /// Fixed ticks per second.
    Fixed(u64),
    /// Frequency reported by the hardware (CPUID leaf 0x15/0x16, `CNTFRQ_EL0`).
    Nominal,
    /// Measure against the OS monotonic clock at startup.
    Calibrate,
}

impl Default for ClockRateSetting {
    fn default() -> Self {
        ClockRateSetting::Fixed(DEFAULT_CLOCK_RATE)
    }
}

impl fmt::Display for ClockRateSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockRateSetting::Fixed(hz) => write!(f, "{hz} Hz"),
            ClockRateSetting::Nominal => write!(f, "nominal"),
            ClockRateSetting::Calibrate => write!(f, "calibrate"),
        }
    }
}

impl Serialize for ClockRateSetting {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            ClockRateSetting::Fixed(hz) => serializer.serialize_u64(*hz),
            ClockRateSetting::Nominal => serializer.serialize_str("nominal"),
            ClockRateSetting::Calibrate => serializer.serialize_str("calibrate"),
        }
    }
}

impl<'de> Deserialize<'de> for ClockRateSetting {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct ClockRateVisitor;

        impl<'de> Visitor<'de> for ClockRateVisitor {
            type Value = ClockRateSetting;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a positive integer, \"nominal\", or \"calibrate\"")
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if value == 0 {
                    return Err(de::Error::custom("clock rate must be non-zero"));
                }
                Ok(ClockRateSetting::Fixed(value))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                let value = u64::try_from(value)
                    .map_err(|_| de::Error::custom("clock rate cannot be negative"))?;
                self.visit_u64(value)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                match value {
                    "nominal" => Ok(ClockRateSetting::Nominal),
                    "calibrate" => Ok(ClockRateSetting::Calibrate),
                    other => Err(de::Error::unknown_variant(other, &["nominal", "calibrate"])),
                }
            }
        }

        deserializer.deserialize_any(ClockRateVisitor)
    }
}

/// Clock rate calibration parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Wall-clock length of one calibration window.
    #[serde(with = "humantime_serde")]
    pub window: Duration,

    /// Number of windows; the median rate is used.
    pub rounds: u32,

    /// CPU to pin the calibrating thread to.
    pub cpu: Option<usize>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(10),
            rounds: 25,
            cpu: None,
        }
    }
}

impl CalibrationConfig {
    /// Check that the parameters can produce a measurement.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for zero rounds or a zero window.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rounds == 0 {
            return Err(ConfigError::Invalid(
                "calibration.rounds must be non-zero".into(),
            ));
        }
        if self.window.is_zero() {
            return Err(ConfigError::Invalid(
                "calibration.window must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

impl TimerConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        debug!(?path, "Reading timer configuration");
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when calibration is requested with
    /// unusable parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clock_rate == ClockRateSetting::Calibrate {
            self.calibration.validate()?;
        }
        Ok(())
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Semantically invalid value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Serde helper module for `Duration` using humantime format.
///
/// Use with `#[serde(with = "...")]` or `serialize_with`.
pub mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Write `duration` as a humantime string such as `"10ms"`.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    /// Parse a humantime string such as `"1s 500ms"`.
    ///
    /// # Errors
    ///
    /// Fails on strings humantime cannot parse.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
