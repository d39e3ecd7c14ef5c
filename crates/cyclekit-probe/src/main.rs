//! cyclekit probe entry point.
//!
//! Reports what the hardware counter supports, calibrates its rate, and
//! times busy loops with `CycleTimer`.

mod report;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cyclekit_common::config::{ClockRateSetting, TimerConfig};
use cyclekit_timer::{
    calibrate, capabilities, current_cpu, pin_current_thread, CycleTimer, HardwareCounter,
    TickSource, TimeUnit,
};
use serde::Serialize;
use std::hint::black_box;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::report::{
    format_calibrate, format_info, format_measure, CalibrateReport, InfoReport, MeasureReport,
    Peek,
};

/// Most intermediate readings `measure` takes.
const MAX_PEEKS: u64 = 100_000;

/// Probe command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "cyclekit-probe",
    about = "cyclekit probe - hardware cycle counter inspection and timing",
    version,
    long_about = None
)]
struct Args {
    /// Path to a timer configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "warn", global = true)]
    log_level: String,

    /// Print reports as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Pin to this CPU before reading the counter (overrides config).
    #[arg(long, value_name = "N", global = true)]
    cpu: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report cycle counter capabilities.
    Info,

    /// Measure the counter rate against the OS monotonic clock.
    Calibrate {
        /// Number of measurement windows (overrides config).
        #[arg(long, value_name = "N")]
        rounds: Option<u32>,

        /// Length of each window, e.g. "10ms" (overrides config).
        #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
        window: Option<Duration>,

        /// Write a config with the measured rate pinned as `clock_rate`.
        #[arg(long, value_name = "FILE")]
        write_config: Option<PathBuf>,
    },

    /// Time a busy loop.
    Measure {
        /// Busy-loop iterations.
        #[arg(long, short = 'n', default_value = "10000000")]
        iterations: u64,

        /// Unit for reported times (overrides config).
        #[arg(long, short = 'u')]
        unit: Option<TimeUnit>,

        /// Intermediate readings taken while the timer runs.
        #[arg(long, default_value = "0", value_parser = clap::value_parser!(u64).range(..=MAX_PEEKS))]
        peeks: u64,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    debug!(version = env!("CARGO_PKG_VERSION"), "Starting cyclekit probe");

    let mut config = load_config(&args)?;
    if args.cpu.is_some() {
        config.calibration.cpu = args.cpu;
    }

    match &args.command {
        Command::Info => run_info(&config, args.json),
        Command::Calibrate {
            rounds,
            window,
            write_config,
        } => {
            if let Some(rounds) = rounds {
                config.calibration.rounds = *rounds;
            }
            if let Some(window) = window {
                config.calibration.window = *window;
            }
            run_calibrate(&config, write_config.as_ref(), args.json)
        }
        Command::Measure {
            iterations,
            unit,
            peeks,
        } => {
            if let Some(unit) = unit {
                config.unit = *unit;
            }
            run_measure(&config, *iterations, *peeks, args.json)
        }
    }
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!("cyclekit_probe={level},cyclekit_timer={level},cyclekit_common={level}");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `CYCLEKIT_CONFIG` environment variable
/// 3. `cyclekit.toml` in the working directory
/// 4. Built-in defaults
fn load_config(args: &Args) -> Result<TimerConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return TimerConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"));
    }

    if let Ok(env_path) = std::env::var("CYCLEKIT_CONFIG") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from CYCLEKIT_CONFIG");
            return TimerConfig::from_file(&config_path).with_context(|| {
                format!("Failed to load config from CYCLEKIT_CONFIG={env_path:?}")
            });
        }
        warn!(
            path = %env_path,
            "CYCLEKIT_CONFIG set but file does not exist, checking other locations"
        );
    }

    let local_path = PathBuf::from("cyclekit.toml");
    if local_path.exists() {
        info!(?local_path, "Loading config from working directory");
        return TimerConfig::from_file(&local_path)
            .with_context(|| format!("Failed to load config from {local_path:?}"));
    }

    info!("No config file found, using built-in defaults");
    Ok(TimerConfig::default())
}

fn emit<T: Serialize>(report: &T, json: bool, format: fn(&T) -> String) -> Result<()> {
    if json {
        let text = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
        println!("{text}");
    } else {
        print!("{}", format(report));
    }
    Ok(())
}

fn pin_if_requested(cpu: Option<usize>) -> Result<()> {
    if let Some(cpu) = cpu {
        let pinned =
            pin_current_thread(cpu).with_context(|| format!("Failed to pin to CPU {cpu}"))?;
        if !pinned {
            warn!(cpu, "Running unpinned; start and stop may read different counters");
        }
    }
    Ok(())
}

fn run_info(config: &TimerConfig, json: bool) -> Result<()> {
    pin_if_requested(config.calibration.cpu)?;

    let report = match capabilities() {
        Ok(caps) => InfoReport {
            supported: true,
            capabilities: Some(caps),
            error: None,
            cpu: current_cpu(),
        },
        Err(e) => InfoReport {
            supported: false,
            capabilities: None,
            error: Some(e.to_string()),
            cpu: current_cpu(),
        },
    };

    emit(&report, json, format_info)
}

fn run_calibrate(config: &TimerConfig, write_config: Option<&PathBuf>, json: bool) -> Result<()> {
    let calibration = calibrate(&config.calibration).context("Calibration failed")?;
    let nominal_frequency_hz = capabilities().ok().and_then(|c| c.nominal_frequency_hz);

    if let Some(path) = write_config {
        let pinned = TimerConfig {
            clock_rate: ClockRateSetting::Fixed(calibration.clock_rate),
            ..config.clone()
        };
        let text = pinned.to_toml().context("Failed to serialize config")?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write config to {path:?}"))?;
        info!(?path, clock_rate = calibration.clock_rate, "Config written");
    }

    let report = CalibrateReport {
        calibration,
        nominal_frequency_hz,
    };
    emit(&report, json, format_calibrate)
}

fn spin(iterations: u64) -> u64 {
    let mut acc = 0u64;
    for i in 0..iterations {
        acc = black_box(acc.wrapping_mul(31).wrapping_add(i));
    }
    acc
}

/// Time `iterations` of busy work, reading the timer `peeks` times on the way.
///
/// The count is capped at [`MAX_PEEKS`] and at `iterations - 1`, so every
/// segment runs at least one iteration.
fn time_busy_loop<S: TickSource>(
    timer: &mut CycleTimer<S>,
    iterations: u64,
    peeks: u64,
    unit: TimeUnit,
) -> Result<Vec<Peek>> {
    let effective = peeks.min(MAX_PEEKS).min(iterations.saturating_sub(1));
    if effective != peeks {
        warn!(requested = peeks, effective, iterations, "Peek count capped");
    }

    // Peeks split the loop into equal segments; the remainder runs last.
    let segment = iterations / (effective + 1);
    let mut readings = Vec::with_capacity(usize::try_from(effective).unwrap_or(0));

    timer.start();
    let mut done = 0u64;
    for _ in 0..effective {
        black_box(spin(segment));
        done += segment;
        let cycles = timer.check_cycles().context("Intermediate reading failed")?;
        readings.push(Peek {
            iterations: done,
            cycles,
            time: timer.cycles_to_time(cycles, unit),
        });
    }
    black_box(spin(iterations - done));
    timer.stop();

    Ok(readings)
}

fn run_measure(config: &TimerConfig, iterations: u64, peeks: u64, json: bool) -> Result<()> {
    pin_if_requested(config.calibration.cpu)?;

    let mut timer: CycleTimer<HardwareCounter> =
        CycleTimer::from_config(config).context("Failed to create cycle timer")?;
    let unit = config.unit;

    let cpu_before = current_cpu();
    let readings = time_busy_loop(&mut timer, iterations, peeks, unit)?;
    let cpu_after = current_cpu();

    if cpu_before != cpu_after {
        warn!(?cpu_before, ?cpu_after, "Thread migrated during measurement");
    }

    let cycles = timer.cycles().context("Failed to read cycle count")?;
    let report = MeasureReport {
        counter: timer.source().name(),
        clock_rate: timer.clock_rate(),
        iterations,
        cycles,
        unit,
        time: timer.time(unit).context("Failed to convert cycle count")?,
        elapsed: timer.elapsed().context("Failed to convert cycle count")?,
        peeks: readings,
        cpu: (cpu_before, cpu_after),
    };

    emit(&report, json, format_measure)
}
