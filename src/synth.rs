//! Saw synth
//!
//! Monophonic sawtooth voice for the touch and mouse synths: oscillator
//! into a resonant lowpass into a fading envelope. Pitch and cutoff follow
//! the pointer through exponential maps.

use log::debug;

use crate::config::SynthConfig;
use crate::engine::graph::{AudioGraph, NodeId, ParamKind, Time, Waveform};

/// Oscillator frequency before the first move
pub const INITIAL_FREQUENCY: f32 = 100.0;
/// Filter cutoff before the first move
pub const INITIAL_CUTOFF: f32 = 1000.0;

/// Map a factor in `[0, 1]` exponentially onto `[min, max]`
pub fn exp_map(min: f32, max: f32, factor: f64) -> f32 {
    let ratio = (max / min).ln();
    min * (ratio * factor.clamp(0.0, 1.0) as f32).exp()
}

#[derive(Debug, Clone)]
pub struct SawSynth {
    config: SynthConfig,
    osc: NodeId,
    lowpass: NodeId,
    env: NodeId,
    started_at: Time,
    frequency: f32,
    cutoff: f32,
    stopped: bool,
}

impl SawSynth {
    /// Build the voice into the graph's destination and fade it in
    pub fn start<G: AudioGraph + ?Sized>(graph: &mut G, config: &SynthConfig) -> Self {
        let now = graph.current_time();
        let destination = graph.destination();

        let env = graph.create_gain(0.0);
        graph.connect(env, destination);
        graph.schedule_value(env.gain(), now, 0.0);
        graph.schedule_ramp(env.gain(), now + config.fade_time, 1.0);

        let lowpass = graph.create_lowpass(INITIAL_CUTOFF, config.q);
        graph.connect(lowpass, env);

        let osc = graph.create_oscillator(Waveform::Sawtooth, INITIAL_FREQUENCY);
        graph.connect(osc, lowpass);
        graph.start(osc, now, 0.0);

        debug!("[SYNTH] voice {} started at {:.3}s", osc, now);
        Self {
            config: config.clone(),
            osc,
            lowpass,
            env,
            started_at: now,
            frequency: INITIAL_FREQUENCY,
            cutoff: INITIAL_CUTOFF,
            stopped: false,
        }
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }

    pub fn started_at(&self) -> Time {
        self.started_at
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Set the pitch from a factor in `[0, 1]`
    pub fn set_freq<G: AudioGraph + ?Sized>(&mut self, graph: &mut G, factor: f64) {
        self.frequency = exp_map(self.config.min_osc_freq, self.config.max_osc_freq, factor);
        graph.set_value(self.osc.frequency(), self.frequency);
    }

    /// Set the filter cutoff from a factor in `[0, 1]`
    pub fn set_cutoff<G: AudioGraph + ?Sized>(&mut self, graph: &mut G, factor: f64) {
        self.cutoff = exp_map(self.config.min_cutoff, self.config.max_cutoff, factor);
        graph.set_value(self.lowpass.param(ParamKind::Frequency), self.cutoff);
    }

    /// Fade out from wherever the fade-in got to and stop the oscillator
    ///
    /// Returns false if the voice was already stopped.
    pub fn stop<G: AudioGraph + ?Sized>(&mut self, graph: &mut G) -> bool {
        if self.stopped {
            return false;
        }
        let now = graph.current_time();
        let fade = self.config.fade_time;
        let level = if fade > 0.0 {
            ((now - self.started_at) / fade).clamp(0.0, 1.0) as f32
        } else {
            1.0
        };

        graph.cancel_scheduled(self.env.gain(), now);
        graph.schedule_value(self.env.gain(), now, level);
        graph.schedule_ramp(self.env.gain(), now + fade, 0.0);
        graph.stop(self.osc, now + fade);
        self.stopped = true;

        debug!("[SYNTH] voice {} released at {:.3}s from {:.2}", self.osc, now, level);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{GraphEvent, OfflineGraph};
    use approx::assert_relative_eq;

    #[test]
    fn test_exponential_maps() {
        let mut graph = OfflineGraph::new(1000);
        let mut synth = SawSynth::start(&mut graph, &SynthConfig::default());

        synth.set_freq(&mut graph, 0.0);
        assert_relative_eq!(synth.frequency(), 20.0);
        synth.set_freq(&mut graph, 1.0);
        assert_relative_eq!(synth.frequency(), 1000.0, max_relative = 1e-5);
        synth.set_freq(&mut graph, 0.5);
        assert_relative_eq!(synth.frequency(), (20.0f32 * 1000.0).sqrt(), max_relative = 1e-5);

        synth.set_cutoff(&mut graph, 2.0);
        assert_relative_eq!(synth.cutoff(), 4000.0, max_relative = 1e-5);
    }

    #[test]
    fn test_mouse_cutoff_floor() {
        let mut graph = OfflineGraph::new(1000);
        let mut synth = SawSynth::start(&mut graph, &SynthConfig::mouse());
        synth.set_cutoff(&mut graph, 0.0);
        assert_relative_eq!(synth.cutoff(), 40.0);
    }

    #[test]
    fn test_early_stop_fades_from_partial_level() {
        let mut graph = OfflineGraph::new(1000);
        let mut synth = SawSynth::start(&mut graph, &SynthConfig::default());
        graph.render_to(0.125);
        graph.take_events();

        assert!(synth.stop(&mut graph));
        let env = synth.env.gain();
        assert_eq!(
            graph.events(),
            &[
                GraphEvent::Cancel { param: env, from: 0.125 },
                GraphEvent::ScheduleValue { param: env, time: 0.125, value: 0.5 },
                GraphEvent::ScheduleRamp { param: env, time: 0.375, value: 0.0 },
                GraphEvent::Stop { node: synth.osc, time: 0.375 },
            ]
        );
        assert!(!synth.stop(&mut graph));
    }

    #[test]
    fn test_late_stop_starts_from_full_level() {
        let mut graph = OfflineGraph::new(1000);
        let mut synth = SawSynth::start(&mut graph, &SynthConfig::default());
        graph.render_to(1.0);
        graph.take_events();
        synth.stop(&mut graph);

        assert!(graph.events().contains(&GraphEvent::ScheduleValue {
            param: synth.env.gain(),
            time: 1.0,
            value: 1.0
        }));
    }

    #[test]
    fn test_voice_renders_and_releases() {
        let mut graph = OfflineGraph::new(8000);
        let mut synth = SawSynth::start(&mut graph, &SynthConfig::default());
        synth.set_cutoff(&mut graph, 1.0);
        graph.render_to(0.5);
        synth.stop(&mut graph);
        graph.render_to(1.0);

        let out = graph.output_buffer().unwrap();
        let sustain = &out.channel(0)[2400..4000];
        assert!(sustain.iter().any(|s| s.abs() > 0.1));
        assert!(out.channel(0)[7000..].iter().all(|&s| s == 0.0));
        assert_eq!(graph.live_nodes(), 1);
    }
}
