#![doc = "Cycle-precision timing on hardware timestamp counters."]

pub mod affinity;
pub mod calibrate;
pub mod counter;
pub mod timer;

pub use affinity::*;
pub use calibrate::*;
pub use counter::*;
pub use timer::*;

pub use cyclekit_common::{TimeUnit, TimerError, TimerPhase, TimerResult, UnsupportedPlatform};
