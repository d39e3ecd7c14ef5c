//! Busy-wait acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - A busy loop between start and stop registers more than 0 cycles
//! - Longer loops register more cycles than shorter ones
//! - Converted time tracks the OS monotonic clock at the calibrated rate

use super::common::{has_invariant_counter, spin, CycleStats};
use cyclekit_common::config::CalibrationConfig;
use cyclekit_timer::{calibrate, CycleTimer, TimeUnit};
use std::hint::black_box;
use std::time::{Duration, Instant};

/// Time `iterations` of busy work `rounds` times.
fn sample_busy_wait(iterations: u64, rounds: usize) -> Vec<u64> {
    let mut timer = CycleTimer::with_default_clock_rate().expect("counter available");
    (0..rounds)
        .map(|_| {
            timer.start();
            black_box(spin(iterations));
            timer.stop();
            timer.cycles().expect("completed start/stop pair")
        })
        .collect()
}

#[test]
fn test_busy_wait_positive() {
    let samples = sample_busy_wait(100_000, 50);
    let stats = CycleStats::from_samples(&samples);
    println!("busy wait 100k: {stats:?}");
    assert!(stats.min > 0, "{stats:?}");
}

#[test]
fn test_longer_loops_take_more_cycles() {
    let short = CycleStats::from_samples(&sample_busy_wait(10_000, 31));
    let long = CycleStats::from_samples(&sample_busy_wait(1_000_000, 31));
    println!("short: {short:?}");
    println!("long:  {long:?}");
    assert!(long.median > short.median, "short={short:?} long={long:?}");
}

#[test]
fn test_empty_interval_overhead() {
    let samples = sample_busy_wait(0, 1_000);
    let stats = CycleStats::from_samples(&samples);
    println!("empty start/stop: {stats:?}");
    // Adjacent serialized reads are well under a millisecond apart.
    let timer = CycleTimer::with_default_clock_rate().expect("counter available");
    assert!(timer.cycles_to_time(stats.min, TimeUnit::Milliseconds) < 1.0);
}

#[test]
#[ignore = "Requires an invariant counter and a quiet machine"]
fn test_time_matches_monotonic_clock() {
    if !has_invariant_counter() {
        eprintln!("Skipping test: counter is not invariant");
        return;
    }

    let calibration = calibrate(&CalibrationConfig::default()).expect("calibration");
    let mut timer = CycleTimer::new(calibration.clock_rate).expect("counter available");

    let wall = Instant::now();
    timer.start();
    while wall.elapsed() < Duration::from_millis(50) {
        black_box(spin(1_000));
    }
    timer.stop();
    let wall = wall.elapsed();

    let measured = timer.time(TimeUnit::Seconds).expect("completed start/stop pair");
    let expected = wall.as_secs_f64();
    println!("measured={measured:.6}s wall={expected:.6}s");
    assert!(
        (measured - expected).abs() / expected < 0.05,
        "measured={measured} wall={expected}"
    );
}
