//! Manual start/stop cycle timer.
//!
//! ```no_run
//! use cyclekit_common::TimeUnit;
//! use cyclekit_timer::CycleTimer;
//!
//! # fn main() -> Result<(), cyclekit_common::TimerError> {
//! let mut timer = CycleTimer::new(3_000_000_000)?;
//! timer.start();
//! // ... measured region ...
//! timer.stop();
//! println!("{} cycles, {:.3} us", timer.cycles()?, timer.time(TimeUnit::Microseconds)?);
//! # Ok(())
//! # }
//! ```
//!
//! `start()` and `stop()` are the measured path: one serialized counter read
//! and two stores each, with no branches that depend on timer state around
//! the read. Ordering mistakes are reported by the accessors instead.

use crate::calibrate::resolve_clock_rate;
use crate::counter::{HardwareCounter, TickSource};
use cyclekit_common::config::{TimerConfig, DEFAULT_CLOCK_RATE};
use cyclekit_common::error::{TimerError, TimerResult};
use cyclekit_common::state::TimerPhase;
use cyclekit_common::unit::TimeUnit;
use static_assertions::{assert_impl_all, assert_not_impl_any};
use std::hint::black_box;
use std::time::Duration;
use tracing::info;

/// Cycle-precision stopwatch over a [`TickSource`].
///
/// Not synchronized: `start`/`stop` take `&mut self`, and callers timing
/// several threads use one instance per thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTimer<S = HardwareCounter> {
    source: S,
    clock_rate: u64,
    start_ticks: u64,
    stop_ticks: u64,
    phase: TimerPhase,
}

assert_impl_all!(CycleTimer: Send, Sync, Copy);
assert_not_impl_any!(CycleTimer<crate::counter::SimulatedCounter>: Sync);

impl CycleTimer<HardwareCounter> {
    /// Create a timer on the hardware counter.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::UnsupportedPlatform`] without a hardware counter
    /// and [`TimerError::InvalidClockRate`] for a zero clock rate.
    pub fn new(clock_rate: u64) -> TimerResult<Self> {
        Self::with_source(HardwareCounter::detect()?, clock_rate)
    }

    /// Create a timer assuming [`DEFAULT_CLOCK_RATE`] (4 GHz).
    ///
    /// Raw cycle counts are exact regardless; converted times are only as
    /// right as the assumed rate.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::UnsupportedPlatform`] without a hardware counter.
    pub fn with_default_clock_rate() -> TimerResult<Self> {
        Self::new(DEFAULT_CLOCK_RATE)
    }

    /// Create a timer with the clock rate resolved from configuration.
    ///
    /// May run a calibration when the config asks for one.
    ///
    /// # Errors
    ///
    /// Returns an error if the counter is unavailable or the clock rate
    /// cannot be resolved.
    pub fn from_config(config: &TimerConfig) -> TimerResult<Self> {
        let counter = HardwareCounter::detect()?;
        let clock_rate = resolve_clock_rate(&counter, config)?;
        info!(clock_rate, source = %config.clock_rate, "Cycle timer configured");
        Self::with_source(counter, clock_rate)
    }
}

impl<S: TickSource> CycleTimer<S> {
    /// Create a timer on an arbitrary tick source.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::InvalidClockRate`] for a zero clock rate.
    pub fn with_source(source: S, clock_rate: u64) -> TimerResult<Self> {
        if clock_rate == 0 {
            return Err(TimerError::InvalidClockRate(clock_rate));
        }
        Ok(Self {
            source,
            clock_rate,
            start_ticks: 0,
            stop_ticks: 0,
            phase: TimerPhase::Reset,
        })
    }

    /// Configured clock rate in ticks per second.
    #[must_use]
    pub fn clock_rate(&self) -> u64 {
        self.clock_rate
    }

    /// Underlying tick source.
    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    /// Returns true between `start()` and `stop()`.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.phase == TimerPhase::Running
    }

    /// Counter value recorded by the last `start()` (0 when reset).
    #[must_use]
    pub fn start_ticks(&self) -> u64 {
        self.start_ticks
    }

    /// Counter value recorded by the last `stop()` (0 when reset).
    #[must_use]
    pub fn stop_ticks(&self) -> u64 {
        self.stop_ticks
    }

    /// Start the timer.
    #[inline]
    pub fn start(&mut self) {
        self.phase = self.phase.after_start();
        self.start_ticks = self.source.read_start();
    }

    /// Stop the timer.
    #[inline]
    pub fn stop(&mut self) {
        self.stop_ticks = self.source.read_stop();
        self.phase = self.phase.after_stop();
    }

    /// Return to the freshly constructed state.
    pub fn reset(&mut self) {
        self.start_ticks = 0;
        self.stop_ticks = 0;
        self.phase = TimerPhase::Reset;
    }

    /// Cycles between the last `start()` and the `stop()` after it.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::MisuseOrder`] without a completed start/stop
    /// pair and [`TimerError::NonMonotonic`] if the counter went backwards.
    pub fn cycles(&self) -> TimerResult<u64> {
        self.phase.require_stopped("cycles")?;
        span(self.start_ticks, self.stop_ticks)
    }

    /// Cycles since the last `start()`, without stopping the timer.
    ///
    /// The extra serialized read adds a little noise to the running
    /// measurement. `stop_ticks` and the phase are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::MisuseOrder`] before any `start()` and
    /// [`TimerError::NonMonotonic`] if the counter went backwards.
    pub fn check_cycles(&self) -> TimerResult<u64> {
        let now = self.source.read_stop();
        self.phase.require_started("check_cycles")?;
        span(self.start_ticks, now)
    }

    /// Elapsed time between `start()` and `stop()` in `unit`.
    ///
    /// # Errors
    ///
    /// Same as [`CycleTimer::cycles`].
    pub fn time(&self, unit: TimeUnit) -> TimerResult<f64> {
        self.cycles().map(|cycles| self.cycles_to_time(cycles, unit))
    }

    /// Elapsed time since `start()` in `unit`, without stopping the timer.
    ///
    /// # Errors
    ///
    /// Same as [`CycleTimer::check_cycles`].
    pub fn check_time(&self, unit: TimeUnit) -> TimerResult<f64> {
        self.check_cycles()
            .map(|cycles| self.cycles_to_time(cycles, unit))
    }

    /// Elapsed time between `start()` and `stop()` as a [`Duration`].
    ///
    /// Truncated to whole nanoseconds.
    ///
    /// # Errors
    ///
    /// Same as [`CycleTimer::cycles`].
    pub fn elapsed(&self) -> TimerResult<Duration> {
        let cycles = self.cycles()?;
        let nanos = u128::from(cycles) * 1_000_000_000 / u128::from(self.clock_rate);
        Ok(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
    }

    /// Counter value since processor reset, converted to `unit`.
    #[must_use]
    pub fn running_time(&self, unit: TimeUnit) -> f64 {
        self.cycles_to_time(self.source.read_now(), unit)
    }

    /// Convert a cycle count to `unit` at this timer's clock rate.
    #[must_use]
    pub fn cycles_to_time(&self, cycles: u64, unit: TimeUnit) -> f64 {
        unit.from_ticks(cycles, self.clock_rate)
    }

    /// Time `f` between a `start()` and a `stop()`.
    ///
    /// The result of `f` passes through [`black_box`] so the work cannot be
    /// optimized out of the measured region.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::NonMonotonic`] if the counter went backwards.
    pub fn measure<F, T>(&mut self, f: F) -> TimerResult<(T, u64)>
    where
        F: FnOnce() -> T,
    {
        self.start();
        let out = black_box(f());
        self.stop();
        Ok((out, self.cycles()?))
    }
}

fn span(start: u64, end: u64) -> TimerResult<u64> {
    end.checked_sub(start)
        .ok_or(TimerError::NonMonotonic { start, end })
}
