//! Offline audio graph renderer
//!
//! [`OfflineGraph`] implements [`AudioGraph`] without an audio device: the
//! clock only moves when the caller renders, every call is appended to an
//! event log, and the destination output accumulates into a stereo buffer
//! that can be exported as WAV. The demos and tests run against it.
//!
//! Rendering is sample by sample in topological order. Sources that have
//! stopped are released, along with any node whose inputs were all
//! released and their slots compacted away, so long grain streams do not
//! grow the graph without bound. The event log can be switched off for the
//! same reason.

use std::collections::HashMap;
use std::f64::consts::PI;

use log::{trace, warn};

use crate::engine::automation::ParamTimeline;
use crate::engine::buffer::AudioBuffer;
use crate::engine::graph::{
    AudioGraph, GraphEvent, LoopRegion, NodeId, NodeKind, ParamId, ParamKind, Time, Waveform,
};
use crate::error::Result;

/// Frames rendered between two release passes
const BLOCK_SIZE: u64 = 128;

const DESTINATION: NodeId = NodeId(0);

// ============================================================================
// Lowpass filter
// ============================================================================

/// Biquad filter coefficients, normalized by a0
#[derive(Debug, Clone, Copy, Default)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadCoeffs {
    /// Lowpass coefficients from the Audio EQ Cookbook
    fn lowpass(sample_rate: f64, frequency: f64, q: f64) -> Self {
        let freq = frequency.clamp(10.0, sample_rate / 2.0 - 1.0);
        let q = q.clamp(0.1, 20.0);

        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let a0 = 1.0 + alpha;
        BiquadCoeffs {
            b0: (1.0 - cos_w0) / 2.0 / a0,
            b1: (1.0 - cos_w0) / a0,
            b2: (1.0 - cos_w0) / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        }
    }
}

/// Biquad filter state for one channel
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    fn process(&mut self, input: f64, coeffs: &BiquadCoeffs) -> f64 {
        let output = coeffs.b0 * input + coeffs.b1 * self.x1 + coeffs.b2 * self.x2
            - coeffs.a1 * self.y1
            - coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }
}

#[derive(Debug, Clone)]
struct Lowpass {
    coeffs: BiquadCoeffs,
    /// (frequency, q) the coefficients were computed for
    tuned: (f32, f32),
    state: [BiquadState; 2],
}

// ============================================================================
// Sources
// ============================================================================

/// Start/stop bookkeeping shared by buffer sources and oscillators
#[derive(Debug, Clone, Copy, Default)]
struct Playback {
    start: Option<(Time, f64)>,
    stop: Option<Time>,
    running: bool,
    finished: bool,
}

impl Playback {
    /// Whether the source sounds at `t`; marks it finished once stopped
    fn is_live(&mut self, t: Time) -> bool {
        if self.finished {
            return false;
        }
        if let Some(stop) = self.stop {
            if t >= stop {
                self.finished = true;
                return false;
            }
        }
        matches!(self.start, Some((start, _)) if t >= start)
    }
}

#[derive(Debug, Clone)]
struct BufferSource {
    buffer: AudioBuffer,
    looping: Option<LoopRegion>,
    playback: Playback,
    /// Read position in seconds
    head: f64,
}

impl BufferSource {
    /// Loop bounds clamped to the buffer
    fn loop_bounds(&self) -> Option<(f64, f64)> {
        let region = self.looping?;
        let duration = self.buffer.duration_secs();
        let end = region.end.unwrap_or(duration).min(duration);
        let start = region.start.clamp(0.0, end);
        if end - start <= 0.0 {
            Some((0.0, duration))
        } else {
            Some((start, end))
        }
    }

    fn wrap(&mut self) {
        if let Some((start, end)) = self.loop_bounds() {
            let len = end - start;
            if len > 0.0 && self.head >= end {
                self.head = start + (self.head - start).rem_euclid(len);
            }
        }
    }

    fn render(&mut self, t: Time, rate: f32, sample_rate: f64) -> [f32; 2] {
        if !self.playback.is_live(t) {
            return [0.0; 2];
        }

        if !self.playback.running {
            let (start, offset) = self.playback.start.unwrap_or((t, 0.0));
            self.head = offset.max(0.0) + (t - start) * rate as f64;
            self.playback.running = true;
            self.wrap();
        }

        if self.looping.is_none() && self.head >= self.buffer.duration_secs() {
            self.playback.finished = true;
            return [0.0; 2];
        }

        let frame = self.buffer.frame_at(self.head);
        self.head += rate as f64 / sample_rate;
        self.wrap();
        frame
    }
}

#[derive(Debug, Clone)]
struct Oscillator {
    waveform: Waveform,
    playback: Playback,
    /// Phase in cycles, [0, 1)
    phase: f64,
}

impl Oscillator {
    fn render(&mut self, t: Time, frequency: f32, sample_rate: f64) -> [f32; 2] {
        if !self.playback.is_live(t) {
            return [0.0; 2];
        }

        let p = self.phase;
        let value = match self.waveform {
            Waveform::Sine => (2.0 * PI * p).sin(),
            Waveform::Sawtooth => 2.0 * p - 1.0,
            Waveform::Square => {
                if p < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Triangle => 1.0 - 4.0 * (p - 0.5).abs(),
        } as f32;

        self.phase = (self.phase + frequency as f64 / sample_rate).rem_euclid(1.0);
        [value, value]
    }
}

// ============================================================================
// Nodes
// ============================================================================

#[derive(Debug, Clone)]
enum Processor {
    Destination,
    Gain,
    Lowpass(Lowpass),
    Panner,
    Analyser { ring: Vec<f32>, write: usize },
    BufferSource(BufferSource),
    Oscillator(Oscillator),
}

impl Processor {
    fn is_finished(&self) -> bool {
        match self {
            Processor::BufferSource(src) => src.playback.finished,
            Processor::Oscillator(osc) => osc.playback.finished,
            _ => false,
        }
    }

    fn playback_mut(&mut self) -> Option<&mut Playback> {
        match self {
            Processor::BufferSource(src) => Some(&mut src.playback),
            Processor::Oscillator(osc) => Some(&mut osc.playback),
            _ => None,
        }
    }

    /// Whether the node is dropped once everything feeding it is gone
    fn is_transient(&self) -> bool {
        matches!(
            self,
            Processor::Gain | Processor::Lowpass(_) | Processor::Panner
        )
    }
}

#[derive(Debug, Clone)]
struct Node {
    id: NodeId,
    processor: Processor,
    params: Vec<(ParamKind, ParamTimeline)>,
    inputs: Vec<NodeId>,
    /// Slots of `inputs`, resolved when the render order is rebuilt
    sources: Vec<usize>,
    had_inputs: bool,
    out: [f32; 2],
}

impl Node {
    fn new(id: NodeId, processor: Processor, params: Vec<(ParamKind, ParamTimeline)>) -> Self {
        Self {
            id,
            processor,
            params,
            inputs: Vec::new(),
            sources: Vec::new(),
            had_inputs: false,
            out: [0.0; 2],
        }
    }

    fn param_mut(&mut self, kind: ParamKind) -> Option<&mut ParamTimeline> {
        find_param(&mut self.params, kind)
    }

    fn process(&mut self, t: Time, input: [f32; 2], sample_rate: f64) -> [f32; 2] {
        let Node {
            processor, params, ..
        } = self;
        let mut value = |kind| {
            find_param(params, kind)
                .map(|p| p.value_at(t))
                .unwrap_or(0.0)
        };

        match processor {
            Processor::Destination => input,
            Processor::Gain => {
                let g = value(ParamKind::Gain);
                [input[0] * g, input[1] * g]
            }
            Processor::Panner => {
                let pan = value(ParamKind::Pan).clamp(-1.0, 1.0);
                let x = (pan + 1.0) * 0.5 * std::f32::consts::FRAC_PI_2;
                let mono = (input[0] + input[1]) * 0.5;
                [mono * x.cos(), mono * x.sin()]
            }
            Processor::Lowpass(filter) => {
                let freq = value(ParamKind::Frequency);
                let q = value(ParamKind::Q);
                if filter.tuned != (freq, q) {
                    filter.coeffs = BiquadCoeffs::lowpass(sample_rate, freq as f64, q as f64);
                    filter.tuned = (freq, q);
                }
                let coeffs = filter.coeffs;
                [
                    filter.state[0].process(input[0] as f64, &coeffs) as f32,
                    filter.state[1].process(input[1] as f64, &coeffs) as f32,
                ]
            }
            Processor::Analyser { ring, write } => {
                if !ring.is_empty() {
                    ring[*write] = (input[0] + input[1]) * 0.5;
                    *write = (*write + 1) % ring.len();
                }
                input
            }
            Processor::BufferSource(src) => src.render(t, value(ParamKind::PlaybackRate), sample_rate),
            Processor::Oscillator(osc) => osc.render(t, value(ParamKind::Frequency), sample_rate),
        }
    }
}

fn find_param(
    params: &mut [(ParamKind, ParamTimeline)],
    kind: ParamKind,
) -> Option<&mut ParamTimeline> {
    params
        .iter_mut()
        .find(|(k, _)| *k == kind)
        .map(|(_, timeline)| timeline)
}

// ============================================================================
// Offline Graph
// ============================================================================

/// Headless [`AudioGraph`] that renders into memory
///
/// # Example
/// ```
/// use looplab::engine::{AudioGraph, OfflineGraph, Waveform};
///
/// let mut graph = OfflineGraph::new(48000);
/// let osc = graph.create_oscillator(Waveform::Sine, 440.0);
/// let dest = graph.destination();
/// graph.connect(osc, dest);
/// graph.start(osc, 0.0, 0.0);
/// graph.render_to(0.5);
/// assert_eq!(graph.output_frames(), 24000);
/// ```
#[derive(Debug, Clone)]
pub struct OfflineGraph {
    sample_rate: u32,
    frame: u64,
    next_id: u32,
    /// Live nodes, densely packed; the destination stays in slot 0
    nodes: Vec<Node>,
    slots: HashMap<NodeId, usize>,
    /// Slot indices, inputs before the nodes they feed
    order: Vec<usize>,
    order_dirty: bool,
    output: [Vec<f32>; 2],
    log_events: bool,
    events: Vec<GraphEvent>,
}

impl OfflineGraph {
    /// Create an empty graph at time zero
    pub fn new(sample_rate: u32) -> Self {
        let mut graph = Self {
            sample_rate: sample_rate.max(1),
            frame: 0,
            next_id: 0,
            nodes: Vec::new(),
            slots: HashMap::new(),
            order: Vec::new(),
            order_dirty: true,
            output: [Vec::new(), Vec::new()],
            log_events: true,
            events: Vec::new(),
        };
        let dest = graph.add_node(Processor::Destination, Vec::new(), NodeKind::Destination);
        debug_assert_eq!(dest, DESTINATION);
        graph
    }

    /// Turn the event log on or off (on by default)
    ///
    /// Long renderings that never inspect [`Self::events`] should switch it
    /// off, the log keeps every call.
    pub fn with_event_log(mut self, enabled: bool) -> Self {
        self.log_events = enabled;
        if !enabled {
            self.events = Vec::new();
        }
        self
    }

    /// Render until the clock reaches `time`
    pub fn render_to(&mut self, time: Time) {
        // Absorb float noise so 0.3 * 10 does not become frame 4
        let target = (time * self.sample_rate as f64 - 1e-9).ceil().max(0.0) as u64;

        while self.frame < target {
            if self.order_dirty {
                self.rebuild_order();
            }

            let block_end = (self.frame + BLOCK_SIZE).min(target);
            while self.frame < block_end {
                self.render_frame();
                self.frame += 1;
            }

            self.release_finished();
        }
    }

    /// Render `secs` more seconds
    pub fn advance(&mut self, secs: f64) {
        let now = self.current_time();
        self.render_to(now + secs);
    }

    /// Number of frames rendered so far
    pub fn output_frames(&self) -> usize {
        self.output[0].len()
    }

    /// Rendered stereo output so far
    pub fn output_buffer(&self) -> Result<AudioBuffer> {
        AudioBuffer::from_channels(self.output.to_vec(), self.sample_rate)
    }

    /// Every graph call made so far, in order
    pub fn events(&self) -> &[GraphEvent] {
        &self.events
    }

    /// Drain the event log
    pub fn take_events(&mut self) -> Vec<GraphEvent> {
        std::mem::take(&mut self.events)
    }

    /// Number of nodes still alive (destination included)
    pub fn live_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Whether a node is still part of the graph
    pub fn contains(&self, node: NodeId) -> bool {
        self.slots.contains_key(&node)
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(&id).map(|&slot| &self.nodes[slot])
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let slot = *self.slots.get(&id)?;
        self.nodes.get_mut(slot)
    }

    fn record(&mut self, event: GraphEvent) {
        if self.log_events {
            self.events.push(event);
        }
    }

    fn add_node(
        &mut self,
        processor: Processor,
        params: Vec<(ParamKind, f32)>,
        kind: NodeKind,
    ) -> NodeId {
        // Ids are never reused, so a stale id can not reach a newer node
        let id = NodeId(self.next_id);
        self.next_id += 1;

        let now = self.current_time();
        let params = params
            .into_iter()
            .map(|(k, v)| (k, ParamTimeline::new(now, v)))
            .collect();

        self.slots.insert(id, self.nodes.len());
        self.nodes.push(Node::new(id, processor, params));
        self.order_dirty = true;
        self.record(GraphEvent::Create { node: id, kind });
        trace!("create {} {:?}", id, kind);
        id
    }

    fn with_param(&mut self, param: ParamId, f: impl FnOnce(&mut ParamTimeline)) {
        match self.node_mut(param.node).and_then(|n| n.param_mut(param.kind)) {
            Some(timeline) => f(timeline),
            None => warn!("ignoring automation on unknown param {:?}", param),
        }
    }

    fn rebuild_order(&mut self) {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Visiting,
            Done,
        }

        let Self { nodes, slots, .. } = self;
        for node in nodes.iter_mut() {
            node.sources = node
                .inputs
                .iter()
                .filter_map(|input| slots.get(input).copied())
                .collect();
        }

        let mut marks = vec![Mark::New; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());

        for root in 0..self.nodes.len() {
            if marks[root] != Mark::New {
                continue;
            }

            // Iterative post-order walk over inputs
            let mut stack = vec![(root, 0usize)];
            marks[root] = Mark::Visiting;
            while let Some(top) = stack.last_mut() {
                let (idx, cursor) = *top;
                top.1 += 1;

                match self.nodes[idx].sources.get(cursor).copied() {
                    Some(input) => match marks[input] {
                        Mark::New => {
                            marks[input] = Mark::Visiting;
                            stack.push((input, 0));
                        }
                        Mark::Visiting => {
                            warn!("cycle through {} ignored", self.nodes[input].id);
                        }
                        Mark::Done => {}
                    },
                    None => {
                        marks[idx] = Mark::Done;
                        order.push(idx);
                        stack.pop();
                    }
                }
            }
        }

        self.order = order;
        self.order_dirty = false;
    }

    fn render_frame(&mut self) {
        let t = self.frame as f64 / self.sample_rate as f64;
        let sample_rate = self.sample_rate as f64;
        let Self { nodes, order, .. } = self;

        for &idx in order.iter() {
            let mut input = [0.0_f32; 2];
            for &src in &nodes[idx].sources {
                let out = nodes[src].out;
                input[0] += out[0];
                input[1] += out[1];
            }

            let node = &mut nodes[idx];
            node.out = node.process(t, input, sample_rate);
        }

        let mix = self.nodes[0].out;
        self.output[0].push(mix[0]);
        self.output[1].push(mix[1]);
    }

    /// Drop finished sources and any node left without inputs because of it
    fn release_finished(&mut self) {
        let mut released: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|n| n.processor.is_finished())
            .map(|n| n.id)
            .collect();

        while let Some(id) = released.pop() {
            let Some(slot) = self.slots.remove(&id) else {
                continue;
            };
            self.nodes.swap_remove(slot);
            if let Some(moved) = self.nodes.get(slot) {
                self.slots.insert(moved.id, slot);
            }
            self.order_dirty = true;
            trace!("release {}", id);

            for node in self.nodes.iter_mut() {
                let before = node.inputs.len();
                node.inputs.retain(|&input| input != id);
                if node.inputs.len() != before
                    && node.inputs.is_empty()
                    && node.had_inputs
                    && node.processor.is_transient()
                {
                    released.push(node.id);
                }
            }
        }
    }
}

impl AudioGraph for OfflineGraph {
    fn current_time(&self) -> Time {
        self.frame as f64 / self.sample_rate as f64
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn destination(&self) -> NodeId {
        DESTINATION
    }

    fn create_gain(&mut self, gain: f32) -> NodeId {
        self.add_node(Processor::Gain, vec![(ParamKind::Gain, gain)], NodeKind::Gain)
    }

    fn create_lowpass(&mut self, cutoff: f32, q: f32) -> NodeId {
        let filter = Lowpass {
            coeffs: BiquadCoeffs::lowpass(self.sample_rate as f64, cutoff as f64, q as f64),
            tuned: (cutoff, q),
            state: [BiquadState::default(); 2],
        };
        self.add_node(
            Processor::Lowpass(filter),
            vec![(ParamKind::Frequency, cutoff), (ParamKind::Q, q)],
            NodeKind::Lowpass,
        )
    }

    fn create_panner(&mut self, pan: f32) -> NodeId {
        self.add_node(Processor::Panner, vec![(ParamKind::Pan, pan)], NodeKind::Panner)
    }

    fn create_analyser(&mut self, fft_size: usize) -> NodeId {
        self.add_node(
            Processor::Analyser {
                ring: vec![0.0; fft_size],
                write: 0,
            },
            Vec::new(),
            NodeKind::Analyser { fft_size },
        )
    }

    fn create_buffer_source(&mut self, buffer: AudioBuffer, looping: Option<LoopRegion>) -> NodeId {
        let source = BufferSource {
            buffer,
            looping,
            playback: Playback::default(),
            head: 0.0,
        };
        self.add_node(
            Processor::BufferSource(source),
            vec![(ParamKind::PlaybackRate, 1.0)],
            NodeKind::BufferSource {
                looping: looping.is_some(),
            },
        )
    }

    fn create_oscillator(&mut self, waveform: Waveform, frequency: f32) -> NodeId {
        let osc = Oscillator {
            waveform,
            playback: Playback::default(),
            phase: 0.0,
        };
        self.add_node(
            Processor::Oscillator(osc),
            vec![(ParamKind::Frequency, frequency)],
            NodeKind::Oscillator { waveform },
        )
    }

    fn connect(&mut self, from: NodeId, to: NodeId) {
        if from == to || self.node(from).is_none() {
            warn!("ignoring connect from unknown node {}", from);
            return;
        }
        let Some(sink) = self.node_mut(to) else {
            warn!("ignoring connect to unknown node {}", to);
            return;
        };
        if !sink.inputs.contains(&from) {
            sink.inputs.push(from);
            sink.had_inputs = true;
        }
        self.order_dirty = true;
        self.record(GraphEvent::Connect { from, to });
    }

    fn set_value(&mut self, param: ParamId, value: f32) {
        let now = self.current_time();
        self.with_param(param, |p| p.set(now, value));
        self.record(GraphEvent::SetValue { param, value });
    }

    fn schedule_value(&mut self, param: ParamId, time: Time, value: f32) {
        self.with_param(param, |p| p.schedule_value(time, value));
        self.record(GraphEvent::ScheduleValue { param, time, value });
    }

    fn schedule_ramp(&mut self, param: ParamId, time: Time, value: f32) {
        self.with_param(param, |p| p.schedule_ramp(time, value));
        self.record(GraphEvent::ScheduleRamp { param, time, value });
    }

    fn cancel_scheduled(&mut self, param: ParamId, from: Time) {
        self.with_param(param, |p| p.cancel(from));
        self.record(GraphEvent::Cancel { param, from });
    }

    fn start(&mut self, node: NodeId, time: Time, offset: f64) {
        match self.node_mut(node).and_then(|n| n.processor.playback_mut()) {
            Some(playback) if playback.start.is_none() => {
                playback.start = Some((time, offset));
            }
            Some(_) => {
                warn!("source {} already started", node);
                return;
            }
            None => {
                warn!("ignoring start of unknown source {}", node);
                return;
            }
        }
        self.record(GraphEvent::Start { node, time, offset });
    }

    fn stop(&mut self, node: NodeId, time: Time) {
        match self.node_mut(node).and_then(|n| n.processor.playback_mut()) {
            Some(playback) => playback.stop = Some(time),
            None => {
                warn!("ignoring stop of unknown source {}", node);
                return;
            }
        }
        self.record(GraphEvent::Stop { node, time });
    }

    fn time_domain_data(&self, analyser: NodeId, out: &mut [f32]) {
        out.fill(0.0);
        let Some(Processor::Analyser { ring, write }) = self.node(analyser).map(|n| &n.processor)
        else {
            warn!("{} is not an analyser", analyser);
            return;
        };

        let n = ring.len().min(out.len());
        let skip = out.len() - n;
        // Oldest of the last n samples sits n slots behind the write cursor
        let first = (write + ring.len() - n) % ring.len().max(1);
        for i in 0..n {
            out[skip + i] = ring[(first + i) % ring.len()];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GrainConfig;
    use crate::grain::GrainScheduler;
    use approx::assert_relative_eq;

    fn constant_buffer(value: f32, secs: f64, sample_rate: u32) -> AudioBuffer {
        let len = (secs * sample_rate as f64) as usize;
        AudioBuffer::mono(vec![value; len], sample_rate).unwrap()
    }

    #[test]
    fn test_renders_requested_frames() {
        let mut graph = OfflineGraph::new(1000);
        graph.render_to(0.25);
        assert_eq!(graph.output_frames(), 250);
        assert_relative_eq!(graph.current_time(), 0.25);

        graph.advance(0.125);
        assert_eq!(graph.output_frames(), 375);
    }

    #[test]
    fn test_source_through_gain() {
        let mut graph = OfflineGraph::new(1000);
        let src = graph.create_buffer_source(constant_buffer(1.0, 1.0, 1000), None);
        let gain = graph.create_gain(0.5);
        let dest = graph.destination();
        graph.connect(src, gain);
        graph.connect(gain, dest);
        graph.start(src, 0.1, 0.0);
        graph.render_to(0.2);

        let out = graph.output_buffer().unwrap();
        assert_eq!(out.channel(0)[50], 0.0);
        assert_relative_eq!(out.channel(0)[150], 0.5);
        assert_relative_eq!(out.channel(1)[150], 0.5);
    }

    #[test]
    fn test_gain_ramp_is_rendered() {
        let mut graph = OfflineGraph::new(1000);
        let src = graph.create_buffer_source(constant_buffer(1.0, 1.0, 1000), None);
        let gain = graph.create_gain(0.0);
        let dest = graph.destination();
        graph.connect(src, gain);
        graph.connect(gain, dest);
        graph.schedule_value(gain.gain(), 0.0, 0.0);
        graph.schedule_ramp(gain.gain(), 0.1, 1.0);
        graph.start(src, 0.0, 0.0);
        graph.render_to(0.2);

        let out = graph.output_buffer().unwrap();
        assert_relative_eq!(out.channel(0)[50], 0.5, epsilon = 1e-4);
        assert_relative_eq!(out.channel(0)[150], 1.0);
    }

    #[test]
    fn test_looping_source_wraps() {
        let samples: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let buffer = AudioBuffer::mono(samples, 8).unwrap();
        let mut graph = OfflineGraph::new(8);
        let src = graph.create_buffer_source(
            buffer,
            Some(LoopRegion {
                start: 0.0,
                end: Some(0.5),
            }),
        );
        let dest = graph.destination();
        graph.connect(src, dest);
        graph.start(src, 0.0, 0.25);
        graph.render_to(1.0);

        let out = graph.output_buffer().unwrap();
        assert_eq!(out.channel(0), &[2.0, 3.0, 0.0, 1.0, 2.0, 3.0, 0.0, 1.0]);
    }

    #[test]
    fn test_stopped_chain_is_released() {
        let mut graph = OfflineGraph::new(1000);
        let src = graph.create_buffer_source(constant_buffer(1.0, 1.0, 1000), None);
        let env = graph.create_gain(1.0);
        let filter = graph.create_lowpass(1000.0, 0.7);
        let analyser = graph.create_analyser(32);
        let dest = graph.destination();
        graph.connect(src, filter);
        graph.connect(filter, env);
        graph.connect(env, dest);
        graph.connect(env, analyser);
        graph.start(src, 0.0, 0.0);
        graph.stop(src, 0.1);
        assert_eq!(graph.live_nodes(), 5);

        graph.render_to(0.5);
        assert!(!graph.contains(src));
        assert!(!graph.contains(filter));
        assert!(!graph.contains(env));
        assert!(graph.contains(analyser));
        assert_eq!(graph.live_nodes(), 2);

        // Calls naming released nodes are ignored
        graph.connect(src, dest);
        graph.stop(src, 1.0);
    }

    #[test]
    fn test_oscillator_waveforms() {
        let mut graph = OfflineGraph::new(8);
        let osc = graph.create_oscillator(Waveform::Sawtooth, 1.0);
        let dest = graph.destination();
        graph.connect(osc, dest);
        graph.start(osc, 0.0, 0.0);
        graph.render_to(0.5);

        let out = graph.output_buffer().unwrap();
        assert_eq!(out.channel(0), &[-1.0, -0.75, -0.5, -0.25]);
    }

    #[test]
    fn test_panner_hard_left() {
        let mut graph = OfflineGraph::new(1000);
        let src = graph.create_buffer_source(constant_buffer(1.0, 1.0, 1000), None);
        let panner = graph.create_panner(-1.0);
        let dest = graph.destination();
        graph.connect(src, panner);
        graph.connect(panner, dest);
        graph.start(src, 0.0, 0.0);
        graph.render_to(0.01);

        let out = graph.output_buffer().unwrap();
        assert_relative_eq!(out.channel(0)[5], 1.0, epsilon = 1e-6);
        assert_relative_eq!(out.channel(1)[5], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_lowpass_attenuates_high_tone() {
        let mut graph = OfflineGraph::new(48000);
        let osc = graph.create_oscillator(Waveform::Sine, 8000.0);
        let filter = graph.create_lowpass(200.0, 0.7071);
        let dest = graph.destination();
        graph.connect(osc, filter);
        graph.connect(filter, dest);
        graph.start(osc, 0.0, 0.0);
        graph.render_to(0.2);

        let out = graph.output_buffer().unwrap();
        let tail = &out.channel(0)[4800..];
        let peak = tail.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(peak < 0.01, "peak {}", peak);
    }

    #[test]
    fn test_analyser_reports_latest_samples() {
        let samples: Vec<f32> = (0..20).map(|i| i as f32).collect();
        let buffer = AudioBuffer::mono(samples, 10).unwrap();
        let mut graph = OfflineGraph::new(10);
        let src = graph.create_buffer_source(buffer, None);
        let analyser = graph.create_analyser(4);
        graph.connect(src, analyser);
        graph.start(src, 0.0, 0.0);
        graph.render_to(1.0);

        let mut out = [0.0; 4];
        graph.time_domain_data(analyser, &mut out);
        assert_eq!(out, [6.0, 7.0, 8.0, 9.0]);

        let mut wide = [1.0; 6];
        graph.time_domain_data(analyser, &mut wide);
        assert_eq!(wide, [0.0, 0.0, 6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_event_log_records_calls() {
        let mut graph = OfflineGraph::new(1000);
        let gain = graph.create_gain(1.0);
        let dest = graph.destination();
        graph.connect(gain, dest);
        graph.schedule_ramp(gain.gain(), 1.0, 0.0);

        let events = graph.take_events();
        assert!(matches!(events[0], GraphEvent::Create { kind: NodeKind::Destination, .. }));
        assert_eq!(events[2], GraphEvent::Connect { from: gain, to: dest });
        assert_eq!(
            events[3],
            GraphEvent::ScheduleRamp {
                param: gain.gain(),
                time: 1.0,
                value: 0.0
            }
        );
        assert!(graph.events().is_empty());
    }

    #[test]
    fn test_long_grain_stream_stays_bounded() {
        let buffer = constant_buffer(0.5, 3.0, 8000);
        let mut graph = OfflineGraph::new(8000).with_event_log(false);
        let mut grains = GrainScheduler::new(buffer, &GrainConfig::default()).with_seed(3);
        let dest = graph.destination();

        let mut most_live = 0;
        for i in 1..=100 {
            let now = graph.current_time();
            grains.render_until(&mut graph, dest, now + 0.1);
            graph.render_to(f64::from(i) * 0.1);
            most_live = most_live.max(graph.live_nodes());
        }

        assert!(most_live < 100, "{} live nodes", most_live);
        assert_eq!(graph.slots.len(), graph.live_nodes());
        assert!(graph.events().is_empty());

        let out = graph.output_buffer().unwrap();
        assert_eq!(out.channel(0).len(), 80000);
        assert!(out.channel(0)[79000].abs() > 0.1);
    }

    #[test]
    fn test_released_ids_are_not_reused() {
        let mut graph = OfflineGraph::new(1000);
        let dest = graph.destination();
        let src = graph.create_buffer_source(constant_buffer(1.0, 1.0, 1000), None);
        let gain = graph.create_gain(1.0);
        graph.connect(src, gain);
        graph.connect(gain, dest);
        graph.start(src, 0.0, 0.0);
        graph.stop(src, 0.05);

        // Created last, so compaction moves it into a freed slot
        let tone = graph.create_buffer_source(constant_buffer(1.0, 1.0, 1000), None);
        let level = graph.create_gain(0.5);
        graph.connect(tone, level);
        graph.connect(level, dest);
        graph.start(tone, 0.0, 0.0);
        graph.render_to(0.2);

        assert!(!graph.contains(gain));
        assert!(graph.contains(level));
        let fresh = graph.create_gain(1.0);
        assert_ne!(fresh, src);
        assert_ne!(fresh, gain);

        // Automation through a stale id reaches nothing
        graph.set_value(gain.gain(), 0.0);
        graph.render_to(0.3);
        let out = graph.output_buffer().unwrap();
        assert_relative_eq!(out.channel(0)[250], 0.5);
    }
}
