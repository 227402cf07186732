//! Audio graph abstraction
//!
//! Every demo talks to audio through [`AudioGraph`]. Nodes are addressed by
//! [`NodeId`], automatable parameters by [`ParamId`]. All calls are
//! fire-and-forget: an implementation logs and ignores calls that name
//! unknown nodes instead of failing, so scheduling code never has to
//! handle errors mid-gesture.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::buffer::AudioBuffer;

/// Time on the graph clock, in seconds
pub type Time = f64;

/// Handle to a node in an audio graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Automatable parameter of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// Gain node amplitude
    Gain,
    /// Filter cutoff or oscillator frequency (Hz)
    Frequency,
    /// Filter resonance
    Q,
    /// Stereo panner position (-1..1)
    Pan,
    /// Buffer source playback rate
    PlaybackRate,
}

/// A parameter on a specific node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParamId {
    pub node: NodeId,
    pub kind: ParamKind,
}

impl NodeId {
    /// Address one of this node's parameters
    pub fn param(self, kind: ParamKind) -> ParamId {
        ParamId { node: self, kind }
    }

    pub fn gain(self) -> ParamId {
        self.param(ParamKind::Gain)
    }

    pub fn frequency(self) -> ParamId {
        self.param(ParamKind::Frequency)
    }
}

/// Oscillator waveform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    Sine,
    Sawtooth,
    Square,
    Triangle,
}

/// Looping options for a buffer source
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LoopRegion {
    pub start: f64,
    /// End of the loop; `None` loops the whole buffer
    pub end: Option<f64>,
}

/// Kind of node, as recorded in the event log
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum NodeKind {
    Destination,
    Gain,
    Lowpass,
    Panner,
    Analyser { fft_size: usize },
    BufferSource { looping: bool },
    Oscillator { waveform: Waveform },
}

/// One graph-construction or scheduling call
///
/// Implementations that keep an event log record these in call order,
/// which is what the scheduling tests assert against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum GraphEvent {
    Create { node: NodeId, kind: NodeKind },
    Connect { from: NodeId, to: NodeId },
    SetValue { param: ParamId, value: f32 },
    ScheduleValue { param: ParamId, time: Time, value: f32 },
    ScheduleRamp { param: ParamId, time: Time, value: f32 },
    Cancel { param: ParamId, from: Time },
    Start { node: NodeId, time: Time, offset: f64 },
    Stop { node: NodeId, time: Time },
}

/// The platform audio-graph API the demos schedule against
pub trait AudioGraph {
    /// Current time of the audio clock
    fn current_time(&self) -> Time;

    /// Output sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Final output node
    fn destination(&self) -> NodeId;

    /// Create a gain node with an initial amplitude
    fn create_gain(&mut self, gain: f32) -> NodeId;

    /// Create a resonant lowpass filter
    fn create_lowpass(&mut self, cutoff: f32, q: f32) -> NodeId;

    /// Create an equal-power stereo panner
    fn create_panner(&mut self, pan: f32) -> NodeId;

    /// Create an analyser keeping the last `fft_size` input samples
    fn create_analyser(&mut self, fft_size: usize) -> NodeId;

    /// Create a buffer source; `looping` repeats over the given region
    fn create_buffer_source(&mut self, buffer: AudioBuffer, looping: Option<LoopRegion>) -> NodeId;

    /// Create an oscillator
    fn create_oscillator(&mut self, waveform: Waveform, frequency: f32) -> NodeId;

    /// Route the output of `from` into `to`
    fn connect(&mut self, from: NodeId, to: NodeId);

    /// Set a parameter immediately, dropping any automation on it
    fn set_value(&mut self, param: ParamId, value: f32);

    /// Jump to `value` at `time`
    fn schedule_value(&mut self, param: ParamId, time: Time, value: f32);

    /// Ramp linearly from the previous event to `value`, arriving at `time`
    fn schedule_ramp(&mut self, param: ParamId, time: Time, value: f32);

    /// Drop automation events at or after `from`
    fn cancel_scheduled(&mut self, param: ParamId, from: Time);

    /// Start a source at `time`, reading from `offset` seconds into its buffer
    fn start(&mut self, node: NodeId, time: Time, offset: f64);

    /// Stop a source at `time`
    fn stop(&mut self, node: NodeId, time: Time);

    /// Copy the analyser's most recent samples into `out`, oldest first
    fn time_domain_data(&self, analyser: NodeId, out: &mut [f32]);
}
