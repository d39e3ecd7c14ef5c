//! Clock rate resolution and calibration.
//!
//! Raw cycle counts never depend on the clock rate; only converted times
//! do. When the rate is not known up front it can be taken from the
//! hardware (`nominal`) or measured against the OS monotonic clock
//! (`calibrate`).

use crate::affinity::pin_current_thread;
use crate::counter::{HardwareCounter, TickSource};
use cyclekit_common::config::{CalibrationConfig, ClockRateSetting, TimerConfig};
use cyclekit_common::error::{TimerError, TimerResult};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of a calibration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Calibration {
    /// Median ticks per second across windows.
    pub clock_rate: u64,
    /// Slowest window, in ticks per second.
    pub min_rate: u64,
    /// Fastest window, in ticks per second.
    pub max_rate: u64,
    /// Windows that produced a usable rate.
    pub rounds: u32,
    /// Wall-clock length of each window.
    #[serde(serialize_with = "cyclekit_common::config::humantime_serde::serialize")]
    pub window: Duration,
}

impl Calibration {
    /// Relative spread between the slowest and fastest window.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn spread(&self) -> f64 {
        if self.clock_rate == 0 {
            return 0.0;
        }
        (self.max_rate - self.min_rate) as f64 / self.clock_rate as f64
    }
}

/// Measure the hardware counter's rate.
///
/// When `config.cpu` is set the windows run on a scratch thread pinned to
/// that CPU. The calling thread's affinity is never changed.
///
/// # Errors
///
/// Returns an error if the counter is unavailable, the pin fails, the
/// parameters are invalid, or no window produced a usable rate.
pub fn calibrate(config: &CalibrationConfig) -> TimerResult<Calibration> {
    let counter = HardwareCounter::detect()?;
    let Some(cpu) = config.cpu else {
        return calibrate_with(&counter, config);
    };

    debug!(cpu, "Calibrating on pinned scratch thread");
    std::thread::scope(|scope| {
        scope
            .spawn(move || {
                pin_current_thread(cpu)?;
                calibrate_with(&counter, config)
            })
            .join()
    })
    .unwrap_or_else(|_| {
        Err(TimerError::Calibration(
            "calibration thread panicked".to_string(),
        ))
    })
}

/// Measure the rate of any tick source against [`Instant`].
///
/// # Errors
///
/// Returns [`TimerError::Config`] for zero rounds or window and
/// [`TimerError::Calibration`] if no window produced a usable rate.
pub fn calibrate_with<S: TickSource>(
    source: &S,
    config: &CalibrationConfig,
) -> TimerResult<Calibration> {
    config.validate()?;

    debug!(
        counter = source.name(),
        rounds = config.rounds,
        window = ?config.window,
        "Calibrating clock rate"
    );

    let mut rates = Vec::with_capacity(config.rounds as usize);

    for round in 0..config.rounds {
        let start_ticks = source.read_start();
        let start_time = Instant::now();

        std::thread::sleep(config.window);

        let end_ticks = source.read_stop();
        let elapsed = start_time.elapsed();

        match window_rate(start_ticks, end_ticks, elapsed) {
            Some(rate) => rates.push(rate),
            None => warn!(round, start_ticks, end_ticks, ?elapsed, "Discarding calibration window"),
        }
    }

    let clock_rate = median(&mut rates).ok_or_else(|| {
        TimerError::Calibration(format!(
            "no usable windows out of {} from {}",
            config.rounds,
            source.name()
        ))
    })?;

    let calibration = Calibration {
        clock_rate,
        min_rate: rates[0],
        max_rate: rates[rates.len() - 1],
        rounds: u32::try_from(rates.len()).unwrap_or(u32::MAX),
        window: config.window,
    };

    info!(
        clock_rate = calibration.clock_rate,
        min_rate = calibration.min_rate,
        max_rate = calibration.max_rate,
        rounds = calibration.rounds,
        "Clock rate calibrated"
    );

    Ok(calibration)
}

/// Ticks per second in one window, or `None` if the window is unusable.
fn window_rate(start_ticks: u64, end_ticks: u64, elapsed: Duration) -> Option<u64> {
    let ticks = end_ticks.checked_sub(start_ticks)?;
    let nanos = elapsed.as_nanos();
    if ticks == 0 || nanos == 0 {
        return None;
    }
    u64::try_from(u128::from(ticks) * 1_000_000_000 / nanos).ok()
}

/// Sort `values` in place and return the median (lower-middle average for
/// even lengths).
pub(crate) fn median(values: &mut [u64]) -> Option<u64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        // Average without overflow
        let (a, b) = (values[mid - 1], values[mid]);
        Some(a / 2 + b / 2 + (a % 2 + b % 2) / 2)
    } else {
        Some(values[mid])
    }
}

/// Resolve the clock rate a config asks for.
///
/// # Errors
///
/// Returns [`TimerError::Calibration`] when `nominal` is requested but the
/// hardware reports no frequency, or when calibration fails.
pub fn resolve_clock_rate(counter: &HardwareCounter, config: &TimerConfig) -> TimerResult<u64> {
    match config.clock_rate {
        ClockRateSetting::Fixed(hz) => Ok(hz),
        ClockRateSetting::Nominal => counter
            .capabilities()
            .nominal_frequency_hz
            .ok_or_else(|| {
                TimerError::Calibration(format!(
                    "{} does not report a nominal frequency",
                    counter.name()
                ))
            }),
        ClockRateSetting::Calibrate => calibrate(&config.calibration).map(|c| c.clock_rate),
    }
}
