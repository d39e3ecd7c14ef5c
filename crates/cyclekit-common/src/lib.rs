#![doc = "Common types shared across the cyclekit workspace."]

pub mod config;
pub mod error;
pub mod state;
pub mod unit;

pub use config::*;
pub use error::*;
pub use state::*;
pub use unit::*;
