//! Loop playback
//!
//! Looped buffer playback on a shared loop clock:
//! - [`Loop`]: one looping buffer with fades
//! - [`LoopDeck`] and [`LoopMatrix`]: button layouts driving loops
//! - [`DriftCorrector`]: keeps companion videos in phase with the audio

pub mod clock;
pub mod deck;
pub mod drift;
pub mod matrix;
pub mod player;
pub mod timing;

pub use clock::LoopClock;
pub use deck::LoopDeck;
pub use drift::{Correction, DriftCorrector, DriftStats, MediaElement, Rearm, SimulatedMedia};
pub use matrix::{column_pan, Cell, Lane, LoopMatrix};
pub use player::{Loop, LoopVoice, DEFAULT_FADE_TIME};
pub use timing::LoopTiming;
