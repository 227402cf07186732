//! Granular synthesis
//!
//! - [`GrainScheduler`]: lookahead grain stream around a movable position
//! - [`RadioNoise`]: single random bursts for the fake radio

pub mod radio;
pub mod scheduler;

pub use radio::RadioNoise;
pub use scheduler::{synth_grain, Grain, GrainScheduler};
