//! Probe reports and their text rendering.
//!
//! Every report is `Serialize` so `--json` can print it as-is.

use cyclekit_common::unit::TimeUnit;
use cyclekit_timer::{Calibration, CounterCapabilities, StopRead};
use serde::Serialize;
use std::fmt::Write as _;
use std::time::Duration;

/// Output of the `info` command.
#[derive(Debug, Clone, Serialize)]
pub struct InfoReport {
    /// Whether a hardware counter is usable.
    pub supported: bool,
    /// Counter capabilities, when supported.
    pub capabilities: Option<CounterCapabilities>,
    /// Why the counter is unusable, when unsupported.
    pub error: Option<String>,
    /// CPU the probe ran on.
    pub cpu: Option<usize>,
}

/// Output of the `calibrate` command.
#[derive(Debug, Clone, Serialize)]
pub struct CalibrateReport {
    /// Calibration result.
    pub calibration: Calibration,
    /// Hardware-reported frequency, for comparison.
    pub nominal_frequency_hz: Option<u64>,
}

/// One `check_time` reading taken while the timer was running.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Peek {
    /// Iterations completed at the time of the reading.
    pub iterations: u64,
    /// Cycles since start.
    pub cycles: u64,
    /// Cycles since start, converted.
    pub time: f64,
}

/// Output of the `measure` command.
#[derive(Debug, Clone, Serialize)]
pub struct MeasureReport {
    /// Counter the timer read.
    pub counter: &'static str,
    /// Clock rate used for conversion.
    pub clock_rate: u64,
    /// Busy-loop iterations.
    pub iterations: u64,
    /// Cycles between start and stop.
    pub cycles: u64,
    /// Unit of `time` and peek times.
    pub unit: TimeUnit,
    /// Elapsed time in `unit`.
    pub time: f64,
    /// Elapsed time truncated to nanoseconds.
    #[serde(serialize_with = "cyclekit_common::config::humantime_serde::serialize")]
    pub elapsed: Duration,
    /// Intermediate readings.
    pub peeks: Vec<Peek>,
    /// CPU at start and at stop.
    pub cpu: (Option<usize>, Option<usize>),
}

fn stop_read_label(stop_read: StopRead) -> &'static str {
    match stop_read {
        StopRead::Rdtscp => "rdtscp; cpuid",
        StopRead::LfenceRdtsc => "lfence; rdtsc; cpuid",
        StopRead::IsbCntvct => "isb; mrs cntvct_el0; isb",
    }
}

fn format_hz(hz: u64) -> String {
    #[allow(clippy::cast_precision_loss)]
    let hz_f = hz as f64;
    if hz >= 1_000_000_000 {
        format!("{:.3} GHz", hz_f / 1e9)
    } else if hz >= 1_000_000 {
        format!("{:.3} MHz", hz_f / 1e6)
    } else {
        format!("{hz} Hz")
    }
}

fn format_cpu(cpu: Option<usize>) -> String {
    cpu.map_or_else(|| "unknown".to_string(), |c| c.to_string())
}

/// Render an [`InfoReport`] for a terminal.
pub fn format_info(report: &InfoReport) -> String {
    let mut out = String::new();

    match (&report.capabilities, &report.error) {
        (Some(caps), _) => {
            let _ = writeln!(out, "cycle counter: supported");
            let _ = writeln!(out, "  arch:       {}", caps.arch);
            let _ = writeln!(out, "  counter:    {}", caps.counter);
            let _ = writeln!(out, "  stop read:  {}", stop_read_label(caps.stop_read));
            let invariant = match caps.invariant {
                Some(true) => "yes",
                Some(false) => "no",
                None => "unknown",
            };
            let _ = writeln!(out, "  invariant:  {invariant}");
            let nominal = caps
                .nominal_frequency_hz
                .map_or_else(|| "not reported".to_string(), format_hz);
            let _ = writeln!(out, "  nominal:    {nominal}");
        }
        (None, error) => {
            let _ = writeln!(out, "cycle counter: unsupported");
            if let Some(error) = error {
                let _ = writeln!(out, "  reason:     {error}");
            }
        }
    }

    let _ = writeln!(out, "  cpu:        {}", format_cpu(report.cpu));
    out
}

/// Render a [`CalibrateReport`] for a terminal.
pub fn format_calibrate(report: &CalibrateReport) -> String {
    let c = &report.calibration;
    let mut out = String::new();
    let _ = writeln!(out, "clock rate:   {} ({} Hz)", format_hz(c.clock_rate), c.clock_rate);
    let _ = writeln!(
        out,
        "range:        {} .. {} ({:.4}% spread)",
        format_hz(c.min_rate),
        format_hz(c.max_rate),
        c.spread() * 100.0
    );
    let _ = writeln!(
        out,
        "windows:      {} x {}",
        c.rounds,
        humantime::format_duration(c.window)
    );
    if let Some(nominal) = report.nominal_frequency_hz {
        let _ = writeln!(out, "nominal:      {}", format_hz(nominal));
    }
    out
}

/// Render a [`MeasureReport`] for a terminal.
pub fn format_measure(report: &MeasureReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} iterations: {} cycles = {:.6} {} ({})",
        report.iterations,
        report.cycles,
        report.time,
        report.unit,
        humantime::format_duration(report.elapsed)
    );
    let _ = writeln!(
        out,
        "counter {} at {}, cpu {} -> {}",
        report.counter,
        format_hz(report.clock_rate),
        format_cpu(report.cpu.0),
        format_cpu(report.cpu.1)
    );
    for peek in &report.peeks {
        let _ = writeln!(
            out,
            "  peek @ {:>12} iterations: {:>14} cycles = {:.6} {}",
            peek.iterations, peek.cycles, peek.time, report.unit
        );
    }
    out
}
