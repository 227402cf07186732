//! Grain scheduling
//!
//! Granular synthesis from a buffer: short enveloped slices ("grains")
//! start at a fixed period and overlap. A lookahead loop calls
//! [`GrainScheduler::render_until`] with a target a little in the future,
//! and the scheduler queues every grain that starts before it. Grain times
//! are counted from an origin instead of being accumulated, so long
//! sessions do not drift off the period grid.

use log::trace;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::config::GrainConfig;
use crate::engine::buffer::AudioBuffer;
use crate::engine::graph::{AudioGraph, NodeId, Time};

/// One scheduled grain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grain {
    /// Onset on the graph clock
    pub start: Time,
    /// Read position in the buffer, in seconds
    pub offset: f64,
    pub duration: f64,
    /// Peak envelope gain
    pub gain: f32,
    /// Lowpass cutoff in Hz, `None` for no filter
    pub cutoff: Option<f32>,
    /// Lowpass resonance (linear Q)
    pub resonance: f32,
}

/// Schedule one grain into `destination`
///
/// Builds `source -> [lowpass ->] envelope -> destination`. The envelope
/// rises linearly to `gain` over the first half of the grain and falls back
/// to zero over the second half. Returns the source node.
pub fn synth_grain<G: AudioGraph + ?Sized>(
    graph: &mut G,
    destination: NodeId,
    buffer: &AudioBuffer,
    grain: &Grain,
) -> NodeId {
    let fade = 0.5 * grain.duration;
    let end = grain.start + grain.duration;

    let env = graph.create_gain(0.0);
    graph.connect(env, destination);
    graph.schedule_value(env.gain(), grain.start, 0.0);
    graph.schedule_ramp(env.gain(), grain.start + fade, grain.gain);
    graph.schedule_value(env.gain(), end - fade, grain.gain);
    graph.schedule_ramp(env.gain(), end, 0.0);

    let input = match grain.cutoff {
        Some(cutoff) => {
            let lowpass = graph.create_lowpass(cutoff, grain.resonance);
            graph.connect(lowpass, env);
            lowpass
        }
        None => env,
    };

    let source = graph.create_buffer_source(buffer.clone(), None);
    graph.connect(source, input);
    graph.start(source, grain.start, grain.offset);
    graph.stop(source, end);

    trace!(
        "[GRAIN] {:.3}s +{:.3}s from {:.3}s, gain {:.3}",
        grain.start,
        grain.duration,
        grain.offset,
        grain.gain
    );
    source
}

/// Granular synthesizer reading around a movable position of one buffer
#[derive(Debug, Clone)]
pub struct GrainScheduler {
    buffer: AudioBuffer,
    /// Length of the scrub range in seconds
    loop_duration: f64,

    period: f64,
    grain_duration: f64,
    offset_variation: f64,
    min_cutoff: f32,
    max_cutoff: f32,
    resonance: f32,

    offset_factor: f64,
    cutoff_factor: f64,

    /// Onset of grain zero
    origin: Option<Time>,
    /// Grains scheduled since the origin
    count: u64,
    rng: SmallRng,
}

impl GrainScheduler {
    /// Create a scheduler over `buffer`
    ///
    /// The scrub range excludes the last `config.tail` seconds of the
    /// buffer, so grains read near the end still have material to play.
    pub fn new(buffer: AudioBuffer, config: &GrainConfig) -> Self {
        let loop_duration = (buffer.duration_secs() - config.tail).max(0.0);
        Self {
            buffer,
            loop_duration,
            period: config.period,
            grain_duration: config.duration,
            offset_variation: config.offset_variation,
            min_cutoff: config.min_cutoff,
            max_cutoff: config.max_cutoff,
            resonance: config.resonance,
            offset_factor: 0.0,
            cutoff_factor: 0.0,
            origin: None,
            count: 0,
            rng: SmallRng::from_os_rng(),
        }
    }

    /// Use a deterministic jitter sequence
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    /// Scrub range in seconds
    pub fn loop_duration(&self) -> f64 {
        self.loop_duration
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    pub fn grain_duration(&self) -> f64 {
        self.grain_duration
    }

    /// Set the read position as a fraction of the scrub range
    pub fn set_offset(&mut self, factor: f64) {
        self.offset_factor = factor.clamp(0.0, 1.0);
    }

    /// Set the cutoff as a fraction of the exponential cutoff range
    pub fn set_cutoff(&mut self, factor: f64) {
        self.cutoff_factor = factor.clamp(0.0, 1.0);
    }

    pub fn offset_factor(&self) -> f64 {
        self.offset_factor
    }

    pub fn cutoff_factor(&self) -> f64 {
        self.cutoff_factor
    }

    /// Number of grains sounding at once
    pub fn overlap(&self) -> usize {
        ((self.grain_duration / self.period).ceil() as usize).max(1)
    }

    /// Per-grain gain that keeps the summed power of overlapping grains at 1
    pub fn grain_gain(&self) -> f32 {
        (1.0 / self.overlap() as f64).sqrt() as f32
    }

    /// Current lowpass cutoff in Hz
    pub fn cutoff(&self) -> f32 {
        let ratio = (self.max_cutoff / self.min_cutoff).ln();
        self.min_cutoff * (ratio * self.cutoff_factor as f32).exp()
    }

    /// Onset of the next grain, once rendering has started
    pub fn next_start(&self) -> Option<Time> {
        self.origin
            .map(|origin| origin + self.count as f64 * self.period)
    }

    /// Schedule every grain starting before `target`; returns how many
    ///
    /// The first call starts the grain stream at the graph's current time.
    /// Afterwards the next onset is at or after `target`.
    pub fn render_until<G: AudioGraph + ?Sized>(
        &mut self,
        graph: &mut G,
        destination: NodeId,
        target: Time,
    ) -> usize {
        let origin = *self.origin.get_or_insert_with(|| graph.current_time());
        let base_offset = self.loop_duration * self.offset_factor;
        let gain = self.grain_gain();
        let cutoff = self.cutoff();

        let mut scheduled = 0;
        loop {
            let start = origin + self.count as f64 * self.period;
            if start >= target {
                break;
            }

            let jitter = self.offset_variation * self.rng.random::<f64>();
            let grain = Grain {
                start,
                offset: base_offset + jitter,
                duration: self.grain_duration,
                gain,
                cutoff: Some(cutoff),
                resonance: self.resonance,
            };
            synth_grain(graph, destination, &self.buffer, &grain);

            self.count += 1;
            scheduled += 1;
        }

        scheduled
    }
}
