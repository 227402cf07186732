//! Pointer layer
//!
//! Touch and mouse input for the scrubber and the synths. Every pointer
//! (finger or mouse) owns one voice, keyed by a stable pointer id; the
//! mouse is always [`MOUSE_POINTER`]. Coordinates are client coordinates,
//! clamped into the [`Surface`] before they become control factors.

use std::collections::BTreeMap;

use log::debug;

use crate::config::{GrainConfig, SynthConfig};
use crate::engine::buffer::AudioBuffer;
use crate::engine::graph::{AudioGraph, Time};
use crate::engine::session::AudioSession;
use crate::error::Result;
use crate::grain::scheduler::GrainScheduler;
use crate::loops::drift::Rearm;
use crate::synth::SawSynth;

/// Stable id of a pointer
pub type PointerId = u64;

/// Pointer id used for the mouse
pub const MOUSE_POINTER: PointerId = 0;

// ============================================================================
// Surface
// ============================================================================

/// The area pointers move on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Surface {
    pub width: f64,
    pub height: f64,
}

impl Surface {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Clamp a client position into the surface
    pub fn clamp(&self, x: f64, y: f64) -> (f64, f64) {
        (x.clamp(0.0, self.width), y.clamp(0.0, self.height))
    }

    /// Horizontal control factor, 0 at the left edge
    pub fn x_factor(&self, x: f64) -> f64 {
        if self.width > 0.0 {
            (x / self.width).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Vertical control factor, 1 at the top edge
    pub fn y_factor(&self, y: f64) -> f64 {
        if self.height > 0.0 {
            (1.0 - y / self.height).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

// ============================================================================
// Pointer map
// ============================================================================

/// A pressed pointer and its voice
#[derive(Debug, Clone)]
pub struct Pointer<V> {
    pub x: f64,
    pub y: f64,
    pub voice: V,
}

/// Voices of the pointers currently down
#[derive(Debug, Clone)]
pub struct PointerMap<V> {
    pointers: BTreeMap<PointerId, Pointer<V>>,
}

impl<V> Default for PointerMap<V> {
    fn default() -> Self {
        Self {
            pointers: BTreeMap::new(),
        }
    }
}

impl<V> PointerMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pointers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty()
    }

    pub fn contains(&self, id: PointerId) -> bool {
        self.pointers.contains_key(&id)
    }

    pub fn get(&self, id: PointerId) -> Option<&Pointer<V>> {
        self.pointers.get(&id)
    }

    /// Add a pointer; returns the pointer it replaced, if any
    pub fn press(&mut self, id: PointerId, x: f64, y: f64, voice: V) -> Option<Pointer<V>> {
        self.pointers.insert(id, Pointer { x, y, voice })
    }

    /// Move a pointer; returns its voice, or `None` for unknown pointers
    pub fn move_to(&mut self, id: PointerId, x: f64, y: f64) -> Option<&mut V> {
        let pointer = self.pointers.get_mut(&id)?;
        pointer.x = x;
        pointer.y = y;
        Some(&mut pointer.voice)
    }

    /// Remove a pointer; releasing an unknown pointer returns `None`
    pub fn release(&mut self, id: PointerId) -> Option<Pointer<V>> {
        self.pointers.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PointerId, &Pointer<V>)> {
        self.pointers.iter().map(|(id, p)| (*id, p))
    }

    pub fn voices_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.pointers.values_mut().map(|p| &mut p.voice)
    }
}

// ============================================================================
// Scrubber
// ============================================================================

/// Granular scrubber: one grain stream per play head
///
/// The x position picks the read position in the buffer, the y position
/// the lowpass cutoff. The host calls [`Scrubber::render_audio`] every
/// render period while it returns [`Rearm::Continue`].
#[derive(Debug)]
pub struct Scrubber {
    buffer: AudioBuffer,
    config: GrainConfig,
    surface: Surface,
    heads: PointerMap<GrainScheduler>,
    seed: Option<u64>,
}

impl Scrubber {
    pub fn new(buffer: AudioBuffer, config: GrainConfig, surface: Surface) -> Self {
        Self {
            buffer,
            config,
            surface,
            heads: PointerMap::new(),
            seed: None,
        }
    }

    /// Seed the grain jitter of every new head
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    /// Track a resized surface
    pub fn resize(&mut self, surface: Surface) {
        self.surface = surface;
    }

    pub fn heads(&self) -> &PointerMap<GrainScheduler> {
        &self.heads
    }

    /// Lookahead of the render loop in seconds
    pub fn render_period(&self) -> f64 {
        self.config.render_period
    }

    /// Put a play head down
    ///
    /// Activates the session on the first gesture. The first head renders
    /// straight away; the return value says whether the host has to start
    /// its render loop.
    pub fn press<G: AudioGraph>(
        &mut self,
        session: &mut AudioSession<G>,
        id: PointerId,
        x: f64,
        y: f64,
    ) -> Result<bool> {
        session.activate()?;

        let mut head = GrainScheduler::new(self.buffer.clone(), &self.config);
        if let Some(seed) = self.seed {
            head = head.with_seed(seed.wrapping_add(id));
        }
        let (x, y) = self.surface.clamp(x, y);
        head.set_offset(self.surface.x_factor(x));
        head.set_cutoff(self.surface.y_factor(y));

        let first = self.heads.is_empty();
        self.heads.press(id, x, y, head);
        debug!("[SCRUB] head {} down at ({:.0}, {:.0})", id, x, y);

        if first {
            self.render_audio(session)?;
        }
        Ok(first)
    }

    /// Move a play head; unknown pointers are ignored
    pub fn move_to(&mut self, id: PointerId, x: f64, y: f64) -> bool {
        let surface = self.surface;
        let (x, y) = surface.clamp(x, y);
        match self.heads.move_to(id, x, y) {
            Some(head) => {
                head.set_offset(surface.x_factor(x));
                head.set_cutoff(surface.y_factor(y));
                true
            }
            None => false,
        }
    }

    /// Lift a play head; grains already scheduled play out
    pub fn release(&mut self, id: PointerId) -> bool {
        let released = self.heads.release(id).is_some();
        if released {
            debug!("[SCRUB] head {} up", id);
        }
        released
    }

    /// Schedule grains up to one render period ahead for every head
    pub fn render_audio<G: AudioGraph>(&mut self, session: &mut AudioSession<G>) -> Result<Rearm> {
        let graph = session.graph_mut()?;
        let target: Time = graph.current_time() + self.config.render_period;
        let destination = graph.destination();

        for head in self.heads.voices_mut() {
            head.render_until(&mut *graph, destination, target);
        }

        Ok(if self.heads.is_empty() {
            Rearm::Stop
        } else {
            Rearm::Continue
        })
    }
}

// ============================================================================
// Touch synth
// ============================================================================

/// One saw synth per finger: x sets the pitch, y the cutoff
#[derive(Debug)]
pub struct TouchSynth {
    config: SynthConfig,
    surface: Surface,
    fingers: PointerMap<SawSynth>,
}

impl TouchSynth {
    pub fn new(config: SynthConfig, surface: Surface) -> Self {
        Self {
            config,
            surface,
            fingers: PointerMap::new(),
        }
    }

    /// Single-voice mouse variant with the higher cutoff floor
    pub fn mouse(surface: Surface) -> Self {
        Self::new(SynthConfig::mouse(), surface)
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn resize(&mut self, surface: Surface) {
        self.surface = surface;
    }

    pub fn fingers(&self) -> &PointerMap<SawSynth> {
        &self.fingers
    }

    /// Start a voice for a new pointer
    ///
    /// Pressing a pointer that is already down releases its old voice.
    pub fn press<G: AudioGraph>(
        &mut self,
        session: &mut AudioSession<G>,
        id: PointerId,
        x: f64,
        y: f64,
    ) -> Result<()> {
        session.activate()?;
        let graph = session.graph_mut()?;

        let (x, y) = self.surface.clamp(x, y);
        let mut synth = SawSynth::start(&mut *graph, &self.config);
        synth.set_freq(&mut *graph, self.surface.x_factor(x));
        synth.set_cutoff(&mut *graph, self.surface.y_factor(y));

        if let Some(mut old) = self.fingers.press(id, x, y, synth) {
            old.voice.stop(graph);
        }
        Ok(())
    }

    /// Move a pointer's voice; returns false for unknown pointers
    pub fn move_to<G: AudioGraph>(
        &mut self,
        session: &mut AudioSession<G>,
        id: PointerId,
        x: f64,
        y: f64,
    ) -> Result<bool> {
        let graph = session.graph_mut()?;
        let surface = self.surface;
        let (x, y) = surface.clamp(x, y);
        Ok(match self.fingers.move_to(id, x, y) {
            Some(synth) => {
                synth.set_freq(&mut *graph, surface.x_factor(x));
                synth.set_cutoff(&mut *graph, surface.y_factor(y));
                true
            }
            None => false,
        })
    }

    /// Fade out a pointer's voice; unknown pointers are a no-op
    pub fn release<G: AudioGraph>(
        &mut self,
        session: &mut AudioSession<G>,
        id: PointerId,
    ) -> Result<bool> {
        let graph = session.graph_mut()?;
        Ok(match self.fingers.release(id) {
            Some(mut finger) => finger.voice.stop(graph),
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{GraphEvent, OfflineGraph};
    use approx::assert_relative_eq;

    fn session() -> AudioSession<OfflineGraph> {
        AudioSession::new(OfflineGraph::new(1000))
    }

    fn grain_count(session: &AudioSession<OfflineGraph>) -> usize {
        session
            .graph()
            .unwrap()
            .events()
            .iter()
            .filter(|e| matches!(e, GraphEvent::Start { .. }))
            .count()
    }

    #[test]
    fn test_surface_clamps_and_maps() {
        let surface = Surface::new(800.0, 400.0);
        assert_eq!(surface.clamp(-20.0, 500.0), (0.0, 400.0));
        assert_relative_eq!(surface.x_factor(200.0), 0.25);
        assert_relative_eq!(surface.y_factor(100.0), 0.75);
        assert_relative_eq!(surface.y_factor(400.0), 0.0);
    }

    #[test]
    fn test_pointer_map_lifecycle() {
        let mut map = PointerMap::new();
        assert!(map.press(3, 1.0, 2.0, "a").is_none());
        assert_eq!(map.move_to(3, 5.0, 6.0).map(|v| *v), Some("a"));
        assert_eq!(map.get(3).unwrap().x, 5.0);
        assert!(map.move_to(9, 0.0, 0.0).is_none());
        assert!(map.release(9).is_none());
        assert!(map.release(3).is_some());
        assert!(map.is_empty());
    }

    #[test]
    fn test_first_head_renders_immediately() {
        let mut session = session();
        let buffer = AudioBuffer::mono(vec![0.2; 3000], 1000).unwrap();
        let mut scrubber =
            Scrubber::new(buffer, GrainConfig::default(), Surface::new(100.0, 100.0)).with_seed(5);

        assert!(scrubber.press(&mut session, MOUSE_POINTER, 50.0, 0.0).unwrap());
        assert!(session.is_ready());
        assert_eq!(grain_count(&session), 10);

        let head = scrubber.heads().get(MOUSE_POINTER).unwrap();
        assert_relative_eq!(head.voice.offset_factor(), 0.5);
        assert_relative_eq!(head.voice.cutoff_factor(), 1.0);

        // a second finger joins the running loop
        assert!(!scrubber.press(&mut session, 7, 10.0, 10.0).unwrap());
    }

    #[test]
    fn test_render_loop_stops_without_heads() {
        let mut session = session();
        let buffer = AudioBuffer::mono(vec![0.2; 3000], 1000).unwrap();
        let mut scrubber =
            Scrubber::new(buffer, GrainConfig::default(), Surface::new(100.0, 100.0)).with_seed(5);
        scrubber.press(&mut session, 1, 10.0, 10.0).unwrap();

        session.graph_mut().unwrap().render_to(0.1);
        assert_eq!(scrubber.render_audio(&mut session).unwrap(), Rearm::Continue);
        assert_eq!(grain_count(&session), 20);

        assert!(scrubber.move_to(1, 500.0, 50.0));
        assert_relative_eq!(scrubber.heads().get(1).unwrap().x, 100.0);
        assert!(scrubber.release(1));
        assert!(!scrubber.release(1));
        assert_eq!(scrubber.render_audio(&mut session).unwrap(), Rearm::Stop);
    }

    #[test]
    fn test_touch_synth_voices() {
        let mut session = session();
        let mut synth = TouchSynth::new(SynthConfig::default(), Surface::new(100.0, 100.0));

        synth.press(&mut session, 1, 0.0, 100.0).unwrap();
        synth.press(&mut session, 2, 100.0, 0.0).unwrap();
        assert_eq!(synth.fingers().len(), 2);
        assert_relative_eq!(synth.fingers().get(1).unwrap().voice.frequency(), 20.0);
        assert_relative_eq!(
            synth.fingers().get(2).unwrap().voice.cutoff(),
            4000.0,
            max_relative = 1e-5
        );

        assert!(synth.move_to(&mut session, 1, 100.0, 100.0).unwrap());
        assert!(!synth.move_to(&mut session, 5, 0.0, 0.0).unwrap());

        assert!(synth.release(&mut session, 1).unwrap());
        assert!(!synth.release(&mut session, 1).unwrap());
        assert_eq!(synth.fingers().len(), 1);
    }

    #[test]
    fn test_mouse_synth_uses_pointer_zero() {
        let mut session = session();
        let mut synth = TouchSynth::mouse(Surface::new(100.0, 100.0));
        synth.press(&mut session, MOUSE_POINTER, 50.0, 100.0).unwrap();
        assert_relative_eq!(
            synth.fingers().get(MOUSE_POINTER).unwrap().voice.cutoff(),
            40.0
        );
    }

    #[test]
    fn test_move_needs_ready_session() {
        let mut session = session();
        let mut synth = TouchSynth::new(SynthConfig::default(), Surface::new(10.0, 10.0));
        let err = synth.move_to(&mut session, 0, 1.0, 1.0).unwrap_err();
        assert_eq!(err.error_code(), "SESSION_NOT_READY");
    }
}
