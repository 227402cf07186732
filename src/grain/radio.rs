//! Fake radio
//!
//! Tuning noise for a radio dial: every slider input plays one unfiltered
//! burst from a random position of a noise recording.

use log::debug;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::config::RadioConfig;
use crate::engine::buffer::AudioBuffer;
use crate::engine::graph::AudioGraph;
use crate::engine::session::AudioSession;
use crate::error::Result;
use crate::grain::scheduler::{synth_grain, Grain};

#[derive(Debug, Clone)]
pub struct RadioNoise {
    buffer: AudioBuffer,
    burst_duration: f64,
    gain: f32,
    rng: SmallRng,
}

impl RadioNoise {
    pub fn new(buffer: AudioBuffer, config: &RadioConfig) -> Self {
        Self {
            buffer,
            burst_duration: config.burst_duration,
            gain: config.gain,
            rng: SmallRng::from_os_rng(),
        }
    }

    /// Use a deterministic offset sequence
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    pub fn burst_duration(&self) -> f64 {
        self.burst_duration
    }

    /// Play one burst at the current time
    ///
    /// Activates the session on the first input. Returns the scheduled
    /// grain.
    pub fn on_input<G: AudioGraph>(&mut self, session: &mut AudioSession<G>) -> Result<Grain> {
        session.activate()?;
        let graph = session.graph_mut()?;

        let span = self.buffer.duration_secs() - self.burst_duration;
        let offset = if span > 0.0 {
            self.rng.random::<f64>() * span
        } else {
            0.0
        };

        let grain = Grain {
            start: graph.current_time(),
            offset,
            duration: self.burst_duration,
            gain: self.gain,
            cutoff: None,
            resonance: 1.0,
        };
        let destination = graph.destination();
        synth_grain(graph, destination, &self.buffer, &grain);

        debug!("[RADIO] burst at {:.3}s from {:.3}s", grain.start, offset);
        Ok(grain)
    }
}
