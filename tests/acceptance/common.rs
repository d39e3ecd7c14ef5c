//! Common utilities for acceptance tests.
//!
//! Provides helpers for:
//! - Generating calibrated busy-wait work
//! - Running closures on a pinned scratch thread
//! - Summarising cycle samples

#![allow(dead_code)] // Not every test file uses every helper

use cyclekit_timer::{capabilities, pin_current_thread};
use std::hint::black_box;

/// Summary of a set of cycle samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleStats {
    /// Smallest sample.
    pub min: u64,
    /// Median sample.
    pub median: u64,
    /// Largest sample.
    pub max: u64,
    /// Number of samples.
    pub samples: usize,
}

impl CycleStats {
    /// Summarise `samples`. Returns the default for an empty slice.
    pub fn from_samples(samples: &[u64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let mut sorted = samples.to_vec();
        sorted.sort_unstable();
        Self {
            min: sorted[0],
            median: sorted[sorted.len() / 2],
            max: sorted[sorted.len() - 1],
            samples: sorted.len(),
        }
    }
}

/// Busy loop the optimiser cannot remove.
pub fn spin(iterations: u64) -> u64 {
    let mut acc = 0u64;
    for i in 0..iterations {
        acc = black_box(acc.wrapping_mul(31).wrapping_add(i));
    }
    acc
}

/// Number of CPUs online.
#[cfg(target_os = "linux")]
pub fn online_cpus() -> usize {
    // SAFETY: sysconf has no preconditions.
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    usize::try_from(n).unwrap_or(1).max(1)
}

/// Number of CPUs online.
#[cfg(not(target_os = "linux"))]
pub fn online_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
}

/// Whether the counter is known to tick at a constant rate.
pub fn has_invariant_counter() -> bool {
    capabilities()
        .map(|caps| caps.invariant.unwrap_or(false))
        .unwrap_or(false)
}

/// Run `f` on a fresh thread pinned to `cpu`.
///
/// Returns `None` when the platform refused the pin.
pub fn on_pinned_thread<T, F>(cpu: usize, f: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    std::thread::spawn(move || {
        if pin_current_thread(cpu).ok()? {
            Some(f())
        } else {
            None
        }
    })
    .join()
    .expect("pinned thread panicked")
}

#[test]
fn test_cycle_stats() {
    let stats = CycleStats::from_samples(&[5, 1, 9, 3, 7]);
    assert_eq!(stats.min, 1);
    assert_eq!(stats.median, 5);
    assert_eq!(stats.max, 9);
    assert_eq!(stats.samples, 5);

    assert_eq!(CycleStats::from_samples(&[]).samples, 0);
}
