//! LoopLab - Interactive Audio Demos
//!
//! LoopLab implements a set of small interactive audio demos on top of a
//! scheduled audio graph:
//! 1. Loop playback - looping buffers locked to a shared loop clock, in a
//!    deck or a lockable matrix, with drift correction for companion videos
//! 2. Granular synthesis - a lookahead grain scheduler driven by pointers,
//!    and the fake radio built on the same grains
//! 3. Instruments and meters - drum pads, a saw synth and the intensity
//!    circle
//!
//! # Architecture
//!
//! Controllers never touch audio directly. They schedule against the
//! [`engine::AudioGraph`] trait through an [`engine::AudioSession`] that
//! becomes ready on the first gesture. [`engine::OfflineGraph`] renders the
//! graph into memory, which is what the tests and the CLI run on.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod gesture;
pub mod grain;
pub mod loops;
pub mod meter;
pub mod pads;
pub mod synth;

pub use config::Config;
pub use error::{LoopLabError, Result};
