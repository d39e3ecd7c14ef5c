//! Hardware cycle counter access.
//!
//! All architecture-specific code lives in this module. Everything above it
//! sees a [`TickSource`] with two reads:
//!
//! - **start read**: a barrier that waits for all earlier instructions to
//!   retire, then the counter read. Work issued before `start()` is not
//!   counted.
//! - **stop read**: a counter read that itself waits for earlier
//!   instructions, then a barrier so later instructions cannot begin
//!   before the read. Work issued after `stop()` is not counted.
//!
//! | Arch    | start                | stop                                   |
//! |---------|----------------------|----------------------------------------|
//! | x86_64  | `cpuid; rdtsc`       | `rdtscp; cpuid` (`lfence; rdtsc; cpuid`) |
//! | aarch64 | `isb; mrs cntvct_el0`| `isb; mrs cntvct_el0; isb`             |
//!
//! Other architectures have no counter: [`HardwareCounter`] is uninhabited
//! there and every entry point returns [`UnsupportedPlatform`].

use cyclekit_common::error::UnsupportedPlatform;
use serde::Serialize;
use std::cell::Cell;
use std::sync::OnceLock;
use tracing::debug;

/// A source of monotonically increasing ticks.
pub trait TickSource {
    /// Serialized read for the beginning of an interval.
    fn read_start(&self) -> u64;

    /// Serialized read for the end of an interval.
    fn read_stop(&self) -> u64;

    /// Point-in-time read; same ordering as [`TickSource::read_stop`].
    fn read_now(&self) -> u64 {
        self.read_stop()
    }

    /// Counter name for diagnostics.
    fn name(&self) -> &'static str;
}

/// How the stop read is serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopRead {
    /// `rdtscp` followed by `cpuid`.
    Rdtscp,
    /// `lfence; rdtsc` followed by `cpuid`, for CPUs without `rdtscp`.
    LfenceRdtsc,
    /// `isb; mrs cntvct_el0; isb`.
    IsbCntvct,
}

/// What the platform counter can do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterCapabilities {
    /// Target architecture.
    pub arch: &'static str,
    /// Counter register name.
    pub counter: &'static str,
    /// Serialization strategy of the stop read.
    pub stop_read: StopRead,
    /// Counter ticks at a constant rate across P-/C-states, when known.
    pub invariant: Option<bool>,
    /// Tick frequency reported by the hardware, when it reports one.
    pub nominal_frequency_hz: Option<u64>,
}

/// Capability token for the platform's hardware counter.
///
/// Obtainable only through [`HardwareCounter::detect`]. On architectures
/// without a counter the type has no values, so a timer over it cannot be
/// constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareCounter {
    inner: imp::Counter,
}

static DETECTED: OnceLock<Result<(HardwareCounter, CounterCapabilities), UnsupportedPlatform>> =
    OnceLock::new();

fn detected() -> &'static Result<(HardwareCounter, CounterCapabilities), UnsupportedPlatform> {
    DETECTED.get_or_init(|| {
        let result = imp::detect().map(|(inner, caps)| (HardwareCounter { inner }, caps));
        match &result {
            Ok((_, caps)) => debug!(?caps, "Hardware cycle counter detected"),
            Err(e) => debug!(%e, "Hardware cycle counter unavailable"),
        }
        result
    })
}

impl HardwareCounter {
    /// Detect the platform counter. Detection runs once per process.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedPlatform`] on architectures without a counter.
    pub fn detect() -> Result<Self, UnsupportedPlatform> {
        detected().as_ref().map(|(counter, _)| *counter).map_err(|e| *e)
    }

    /// Capabilities of the detected counter.
    #[must_use]
    pub fn capabilities(&self) -> CounterCapabilities {
        self.inner.capabilities()
    }
}

impl TickSource for HardwareCounter {
    #[inline(always)]
    fn read_start(&self) -> u64 {
        self.inner.read_start()
    }

    #[inline(always)]
    fn read_stop(&self) -> u64 {
        self.inner.read_stop()
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

/// Returns true if this platform has a usable hardware cycle counter.
#[must_use]
pub fn is_supported() -> bool {
    detected().is_ok()
}

/// Capabilities of the platform counter.
///
/// # Errors
///
/// Returns [`UnsupportedPlatform`] on architectures without a counter.
pub fn capabilities() -> Result<CounterCapabilities, UnsupportedPlatform> {
    detected().as_ref().map(|(_, caps)| caps.clone()).map_err(|e| *e)
}

/// Read the hardware cycle counter with a serializing read.
///
/// # Errors
///
/// Returns [`UnsupportedPlatform`] on architectures without a counter.
#[inline]
pub fn read_hardware_cycle_counter() -> Result<u64, UnsupportedPlatform> {
    HardwareCounter::detect().map(|counter| counter.read_now())
}

/// Current value of the hardware cycle counter.
///
/// # Errors
///
/// Returns [`UnsupportedPlatform`] on architectures without a counter.
#[inline]
pub fn cycle_count() -> Result<u64, UnsupportedPlatform> {
    read_hardware_cycle_counter()
}

#[cfg(target_arch = "x86_64")]
mod imp {
    use super::{CounterCapabilities, StopRead};
    use cyclekit_common::error::UnsupportedPlatform;
    use std::arch::x86_64::{CpuidResult, __cpuid, __rdtscp, _mm_lfence, _rdtsc};
    use std::sync::atomic::{compiler_fence, Ordering};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(super) struct Counter {
        rdtscp: bool,
    }

    #[inline]
    fn cpuid(leaf: u32) -> CpuidResult {
        // SAFETY: cpuid is available on every x86_64 processor.
        unsafe { __cpuid(leaf) }
    }

    fn has_rdtscp(max_extended: u32) -> bool {
        max_extended >= 0x8000_0001 && (cpuid(0x8000_0001).edx >> 27) & 1 == 1
    }

    fn has_invariant_tsc(max_extended: u32) -> bool {
        max_extended >= 0x8000_0007 && (cpuid(0x8000_0007).edx >> 8) & 1 == 1
    }

    /// TSC frequency from leaf 0x15 (crystal ratio), else leaf 0x16 base MHz.
    fn nominal_frequency_hz() -> Option<u64> {
        let max_leaf = cpuid(0).eax;

        if max_leaf >= 0x15 {
            let tsc = cpuid(0x15);
            if tsc.eax != 0 && tsc.ebx != 0 && tsc.ecx != 0 {
                return Some(u64::from(tsc.ecx) * u64::from(tsc.ebx) / u64::from(tsc.eax));
            }
        }

        if max_leaf >= 0x16 {
            let base_mhz = cpuid(0x16).eax & 0xFFFF;
            if base_mhz != 0 {
                return Some(u64::from(base_mhz) * 1_000_000);
            }
        }

        None
    }

    pub(super) fn detect() -> Result<(Counter, CounterCapabilities), UnsupportedPlatform> {
        let max_extended = cpuid(0x8000_0000).eax;
        let counter = Counter {
            rdtscp: has_rdtscp(max_extended),
        };
        Ok((counter, counter.probe(max_extended)))
    }

    impl Counter {
        fn probe(self, max_extended: u32) -> CounterCapabilities {
            CounterCapabilities {
                arch: "x86_64",
                counter: "rdtsc",
                stop_read: if self.rdtscp {
                    StopRead::Rdtscp
                } else {
                    StopRead::LfenceRdtsc
                },
                invariant: Some(has_invariant_tsc(max_extended)),
                nominal_frequency_hz: nominal_frequency_hz(),
            }
        }

        pub(super) fn capabilities(self) -> CounterCapabilities {
            self.probe(cpuid(0x8000_0000).eax)
        }

        pub(super) fn name(self) -> &'static str {
            if self.rdtscp {
                "rdtscp"
            } else {
                "rdtsc"
            }
        }

        #[inline(always)]
        pub(super) fn read_start(self) -> u64 {
            compiler_fence(Ordering::SeqCst);

            // SAFETY: cpuid and rdtsc are available on every x86_64 processor.
            // cpuid retires all earlier instructions before rdtsc executes.
            let ticks = unsafe {
                let _ = __cpuid(0);
                _rdtsc()
            };

            compiler_fence(Ordering::SeqCst);
            ticks
        }

        #[inline(always)]
        pub(super) fn read_stop(self) -> u64 {
            compiler_fence(Ordering::SeqCst);

            // SAFETY: rdtscp is only used when CPUID reports it; lfence is
            // part of SSE2, which every x86_64 processor implements.
            let ticks = unsafe {
                let ticks = if self.rdtscp {
                    let mut aux = 0u32;
                    __rdtscp(&mut aux)
                } else {
                    _mm_lfence();
                    _rdtsc()
                };
                // Keep later instructions from starting before the read.
                let _ = __cpuid(0);
                ticks
            };

            compiler_fence(Ordering::SeqCst);
            ticks
        }
    }
}

#[cfg(target_arch = "aarch64")]
mod imp {
    use super::{CounterCapabilities, StopRead};
    use cyclekit_common::error::UnsupportedPlatform;
    use std::arch::asm;
    use std::sync::atomic::{compiler_fence, Ordering};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(super) struct Counter;

    fn counter_frequency_hz() -> u64 {
        let hz: u64;
        // SAFETY: CNTFRQ_EL0 is readable from EL0 on every ARMv8-A system.
        unsafe {
            asm!("mrs {}, cntfrq_el0", out(reg) hz, options(nostack, nomem));
        }
        hz
    }

    pub(super) fn detect() -> Result<(Counter, CounterCapabilities), UnsupportedPlatform> {
        Ok((Counter, Counter.capabilities()))
    }

    impl Counter {
        pub(super) fn capabilities(self) -> CounterCapabilities {
            let hz = counter_frequency_hz();
            CounterCapabilities {
                arch: "aarch64",
                counter: "cntvct_el0",
                stop_read: StopRead::IsbCntvct,
                // The generic timer runs at a fixed frequency by architecture.
                invariant: Some(true),
                nominal_frequency_hz: (hz != 0).then_some(hz),
            }
        }

        pub(super) fn name(self) -> &'static str {
            "cntvct_el0"
        }

        #[inline(always)]
        pub(super) fn read_start(self) -> u64 {
            compiler_fence(Ordering::SeqCst);

            let ticks: u64;
            // SAFETY: CNTVCT_EL0 is readable from EL0 on every ARMv8-A system.
            unsafe {
                asm!(
                    "isb",
                    "mrs {}, cntvct_el0",
                    out(reg) ticks,
                    options(nostack, nomem),
                );
            }

            compiler_fence(Ordering::SeqCst);
            ticks
        }

        #[inline(always)]
        pub(super) fn read_stop(self) -> u64 {
            compiler_fence(Ordering::SeqCst);

            let ticks: u64;
            // SAFETY: as in read_start.
            unsafe {
                asm!(
                    "isb",
                    "mrs {}, cntvct_el0",
                    "isb",
                    out(reg) ticks,
                    options(nostack, nomem),
                );
            }

            compiler_fence(Ordering::SeqCst);
            ticks
        }
    }
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
mod imp {
    use super::CounterCapabilities;
    use cyclekit_common::error::UnsupportedPlatform;
    use std::convert::Infallible;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(super) struct Counter(Infallible);

    pub(super) fn detect() -> Result<(Counter, CounterCapabilities), UnsupportedPlatform> {
        Err(UnsupportedPlatform::current())
    }

    impl Counter {
        pub(super) fn capabilities(self) -> CounterCapabilities {
            match self.0 {}
        }

        pub(super) fn name(self) -> &'static str {
            match self.0 {}
        }

        pub(super) fn read_start(self) -> u64 {
            match self.0 {}
        }

        pub(super) fn read_stop(self) -> u64 {
            match self.0 {}
        }
    }
}

/// Deterministic tick source for tests and hosts without a counter.
///
/// Every read returns the current value, then advances it by `step`.
#[derive(Debug, Clone, Default)]
pub struct SimulatedCounter {
    now: Cell<u64>,
    step: u64,
}

impl SimulatedCounter {
    /// Create a counter starting at `start` that advances `step` per read.
    #[must_use]
    pub fn new(start: u64, step: u64) -> Self {
        Self {
            now: Cell::new(start),
            step,
        }
    }

    /// Advance the counter without reading it.
    pub fn advance(&self, ticks: u64) {
        self.now.set(self.now.get().wrapping_add(ticks));
    }

    /// Set the counter to an arbitrary value (including backwards).
    pub fn set(&self, value: u64) {
        self.now.set(value);
    }

    /// Current value without advancing.
    #[must_use]
    pub fn peek(&self) -> u64 {
        self.now.get()
    }

    fn tick(&self) -> u64 {
        let value = self.now.get();
        self.now.set(value.wrapping_add(self.step));
        value
    }
}

impl TickSource for SimulatedCounter {
    fn read_start(&self) -> u64 {
        self.tick()
    }

    fn read_stop(&self) -> u64 {
        self.tick()
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_counter_steps() {
        let counter = SimulatedCounter::new(100, 5);
        assert_eq!(counter.read_start(), 100);
        assert_eq!(counter.read_stop(), 105);
        assert_eq!(counter.read_now(), 110);
        assert_eq!(counter.peek(), 115);

        counter.advance(1000);
        assert_eq!(counter.read_stop(), 1115);

        counter.set(3);
        assert_eq!(counter.read_start(), 3);
        assert_eq!(counter.name(), "simulated");
    }

    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    mod hardware {
        use crate::counter::*;

        #[test]
        fn test_detect_supported() {
            assert!(is_supported());
            let counter = HardwareCounter::detect().unwrap();
            let caps = counter.capabilities();
            assert_eq!(caps.arch, std::env::consts::ARCH);
            assert_eq!(capabilities().unwrap(), caps);
        }

        #[test]
        fn test_counter_nonzero() {
            // Counters start at processor reset; any live system is far past zero.
            assert!(cycle_count().unwrap() > 0);
        }

        #[test]
        fn test_reads_monotonic() {
            let counter = HardwareCounter::detect().unwrap();
            let a = counter.read_start();
            let b = counter.read_stop();
            let c = counter.read_now();
            assert!(b >= a, "start={a} stop={b}");
            assert!(c >= b, "stop={b} now={c}");
        }

        #[test]
        fn test_capabilities_serialize() {
            let caps = capabilities().unwrap();
            let json = serde_json::to_value(&caps).unwrap();
            assert_eq!(json["arch"], std::env::consts::ARCH);
            assert!(json["stop_read"].is_string());
        }
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_x86_64_counter_names() {
        let caps = capabilities().unwrap();
        assert_eq!(caps.counter, "rdtsc");
        assert!(matches!(
            caps.stop_read,
            StopRead::Rdtscp | StopRead::LfenceRdtsc
        ));
        assert!(caps.invariant.is_some());
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    #[test]
    fn test_unsupported_platform_reported() {
        assert!(!is_supported());
        let expected = UnsupportedPlatform::current();
        assert_eq!(HardwareCounter::detect().unwrap_err(), expected);
        assert_eq!(capabilities().unwrap_err(), expected);
        assert_eq!(read_hardware_cycle_counter().unwrap_err(), expected);
        assert_eq!(cycle_count().unwrap_err(), expected);
    }
}
