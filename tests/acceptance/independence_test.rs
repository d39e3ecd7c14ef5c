//! Timer independence acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - Interleaved timers keep their own start and stop readings
//! - Timers copied to other threads measure independently

use super::common::{on_pinned_thread, online_cpus, spin};
use cyclekit_timer::{CycleTimer, TimerPhase};
use std::hint::black_box;

#[test]
fn test_nested_timers() {
    let mut outer = CycleTimer::with_default_clock_rate().expect("counter available");
    let mut inner = outer;

    outer.start();
    black_box(spin(10_000));
    inner.start();
    black_box(spin(10_000));
    inner.stop();
    black_box(spin(10_000));
    outer.stop();

    let outer_cycles = outer.cycles().expect("outer stopped");
    let inner_cycles = inner.cycles().expect("inner stopped");
    assert!(outer_cycles > inner_cycles, "outer={outer_cycles} inner={inner_cycles}");
    assert!(outer.start_ticks() <= inner.start_ticks());
    assert!(inner.stop_ticks() <= outer.stop_ticks());
}

#[test]
fn test_copy_is_a_snapshot() {
    let mut timer = CycleTimer::with_default_clock_rate().expect("counter available");
    timer.start();
    black_box(spin(1_000));
    timer.stop();

    let snapshot = timer;
    timer.reset();

    assert_eq!(timer.phase(), TimerPhase::Reset);
    assert_eq!(snapshot.phase(), TimerPhase::Stopped);
    assert!(snapshot.cycles().is_ok());
}

#[test]
fn test_timers_on_separate_threads() {
    let cpus = online_cpus().min(4);
    let template = CycleTimer::with_default_clock_rate().expect("counter available");

    let handles: Vec<_> = (0..cpus)
        .map(|cpu| {
            let mut timer = template;
            std::thread::spawn(move || {
                on_pinned_thread(cpu, move || {
                    timer.start();
                    black_box(spin(50_000));
                    timer.stop();
                    timer.cycles()
                })
            })
        })
        .collect();

    for handle in handles {
        if let Some(result) = handle.join().expect("worker panicked") {
            assert!(result.expect("completed start/stop pair") > 0);
        }
    }

    // The template was copied, never started.
    assert_eq!(template.phase(), TimerPhase::Reset);
}
