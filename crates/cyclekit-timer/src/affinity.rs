//! CPU pinning for measurements.
//!
//! Cycle counters are only guaranteed to be monotonic on one core. Pinning
//! the measuring thread keeps start and stop reads on the same counter.

#![allow(unused_imports)] // Platform-specific code may not use all imports

use cyclekit_common::error::{TimerError, TimerResult};
use tracing::{debug, info, warn};

/// Pin the calling thread to `cpu`.
///
/// Returns `Ok(true)` when the pin took effect and `Ok(false)` when the
/// platform cannot pin or the CPU is not part of the allowed set.
///
/// # Errors
///
/// Returns [`TimerError::Affinity`] for an out-of-range CPU index or an
/// unexpected `sched_setaffinity` failure.
#[cfg(target_os = "linux")]
pub fn pin_current_thread(cpu: usize) -> TimerResult<bool> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    debug!(cpu, "Setting CPU affinity");

    let mut cpu_set = CpuSet::new();
    cpu_set
        .set(cpu)
        .map_err(|e| TimerError::Affinity(format!("invalid CPU index {cpu}: {e}")))?;

    match sched_setaffinity(Pid::from_raw(0), &cpu_set) {
        Ok(()) => {
            info!(cpu, "Thread pinned");
            Ok(true)
        }
        Err(nix::errno::Errno::EINVAL) => {
            warn!(cpu, "CPU not available for pinning");
            Ok(false)
        }
        Err(e) => Err(TimerError::Affinity(format!("sched_setaffinity failed: {e}"))),
    }
}

/// Pin the calling thread to `cpu`.
///
/// Not available on this platform; logs a warning and returns `Ok(false)`.
///
/// # Errors
///
/// Never fails on this platform.
#[cfg(not(target_os = "linux"))]
pub fn pin_current_thread(cpu: usize) -> TimerResult<bool> {
    warn!(cpu, "CPU affinity not available on this platform");
    Ok(false)
}

/// CPU the calling thread is currently running on.
#[cfg(target_os = "linux")]
#[must_use]
pub fn current_cpu() -> Option<usize> {
    // SAFETY: sched_getcpu has no preconditions.
    let cpu = unsafe { libc::sched_getcpu() };
    usize::try_from(cpu).ok()
}

/// CPU the calling thread is currently running on (unknown on this platform).
#[cfg(not(target_os = "linux"))]
#[must_use]
pub fn current_cpu() -> Option<usize> {
    None
}
