//! Loop deck
//!
//! A row of loop buttons sharing one loop clock. The first press into an
//! empty deck starts its loop from the loop point and establishes the
//! clock; later presses join in phase. Once the last loop stops the clock
//! is reset, so the next press starts a fresh timeline.

use crate::engine::graph::AudioGraph;
use crate::engine::session::AudioSession;
use crate::error::{LoopLabError, Result};
use crate::loops::clock::LoopClock;
use crate::loops::player::Loop;
use crate::meter::IntensityMapping;

#[derive(Debug)]
pub struct LoopDeck {
    loops: Vec<Loop>,
    clock: LoopClock,
    mapping: IntensityMapping,
}

impl LoopDeck {
    pub fn new(loops: Vec<Loop>) -> Self {
        Self {
            loops,
            clock: LoopClock::new(),
            mapping: IntensityMapping::BUTTON,
        }
    }

    /// Use a different RMS to opacity map for [`Self::intensities`]
    pub fn with_mapping(mut self, mapping: IntensityMapping) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Loop> {
        self.loops.get(index)
    }

    pub fn clock(&self) -> &LoopClock {
        &self.clock
    }

    /// Indices of the playing loops
    pub fn active(&self) -> impl Iterator<Item = usize> + '_ {
        self.loops
            .iter()
            .enumerate()
            .filter(|(_, lp)| lp.is_playing())
            .map(|(i, _)| i)
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.loops.get(index).map_or(false, Loop::is_playing)
    }

    /// Press a loop button: start the loop if stopped, stop it if playing
    ///
    /// Activates the session on the first press. Returns whether the loop
    /// plays afterwards.
    pub fn toggle<G: AudioGraph>(
        &mut self,
        session: &mut AudioSession<G>,
        index: usize,
    ) -> Result<bool> {
        session.activate()?;
        let graph = session.graph_mut()?;
        self.check_index(index)?;

        let now = graph.current_time();
        let sync = self.active_count() > 0;
        let lp = &mut self.loops[index];

        let playing = if lp.is_playing() {
            lp.stop(graph, now);
            false
        } else {
            lp.start(graph, &mut self.clock, now, sync);
            true
        };

        self.settle();
        Ok(playing)
    }

    /// Stop one loop; stopping a stopped loop does nothing
    pub fn stop<G: AudioGraph>(
        &mut self,
        session: &mut AudioSession<G>,
        index: usize,
    ) -> Result<bool> {
        let graph = session.graph_mut()?;
        self.check_index(index)?;

        let now = graph.current_time();
        let stopped = self.loops[index].stop(graph, now);
        self.settle();
        Ok(stopped)
    }

    /// Stop every playing loop; returns how many were stopped
    pub fn stop_all<G: AudioGraph>(&mut self, session: &mut AudioSession<G>) -> Result<usize> {
        let graph = session.graph_mut()?;
        let now = graph.current_time();
        let stopped = self
            .loops
            .iter_mut()
            .filter(|lp| lp.is_playing())
            .map(|lp| lp.stop(&mut *graph, now))
            .filter(|&s| s)
            .count();
        self.settle();
        Ok(stopped)
    }

    /// Button opacity of every playing loop
    pub fn intensities<G: AudioGraph>(
        &mut self,
        session: &AudioSession<G>,
    ) -> Result<Vec<(usize, f32)>> {
        let graph = session.graph()?;
        let mapping = self.mapping;
        Ok(self
            .loops
            .iter_mut()
            .enumerate()
            .filter(|(_, lp)| lp.is_playing())
            .filter_map(|(i, lp)| lp.intensity(graph).map(|rms| (i, mapping.map(rms))))
            .collect())
    }

    /// Let `dt` seconds of wall time pass for every attached media element
    pub fn advance_media(&mut self, dt: f64) {
        for media in self.loops.iter_mut().filter_map(|lp| lp.companion_mut()) {
            media.advance(dt);
        }
    }

    /// Split borrow for the drift corrector
    pub(crate) fn clock_and_loops_mut(&mut self) -> (&LoopClock, &mut Vec<Loop>) {
        (&self.clock, &mut self.loops)
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.loops.len() {
            Ok(())
        } else {
            Err(LoopLabError::IndexOutOfRange {
                what: "loop",
                index,
                len: self.loops.len(),
            })
        }
    }

    fn settle(&mut self) {
        if self.active_count() == 0 {
            self.clock.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AudioBuffer, OfflineGraph};
    use approx::assert_relative_eq;

    fn deck(n: usize) -> LoopDeck {
        let loops = (0..n)
            .map(|i| {
                let buffer = AudioBuffer::mono(vec![0.1 * (i + 1) as f32; 2000], 1000).unwrap();
                Loop::new(buffer, 2.0).unwrap()
            })
            .collect();
        LoopDeck::new(loops)
    }

    fn session() -> AudioSession<OfflineGraph> {
        AudioSession::new(OfflineGraph::new(1000))
    }

    #[test]
    fn test_first_press_activates_and_establishes_clock() {
        let mut session = session();
        let mut deck = deck(2);
        session.activate().unwrap();
        session.graph_mut().unwrap().render_to(1.5);

        assert!(deck.toggle(&mut session, 0).unwrap());
        assert_eq!(deck.clock().origin(), Some(1.5));
        assert!(deck.is_active(0));
    }

    #[test]
    fn test_press_activates_session() {
        let mut session = session();
        let mut deck = deck(1);
        deck.toggle(&mut session, 0).unwrap();
        assert!(session.is_ready());
    }

    #[test]
    fn test_second_press_joins_in_phase() {
        let mut session = session();
        let mut deck = deck(2);
        deck.toggle(&mut session, 0).unwrap();
        session.graph_mut().unwrap().render_to(0.75);
        deck.toggle(&mut session, 1).unwrap();

        assert_eq!(deck.clock().origin(), Some(0.0));
        let phase = deck.get(1).unwrap().phase_at(0.75).unwrap();
        assert_relative_eq!(phase, 0.75);
        assert_eq!(deck.active().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_clock_resets_when_empty() {
        let mut session = session();
        let mut deck = deck(1);
        deck.toggle(&mut session, 0).unwrap();
        assert!(!deck.toggle(&mut session, 0).unwrap());
        assert!(!deck.clock().is_established());

        session.graph_mut().unwrap().render_to(3.0);
        deck.toggle(&mut session, 0).unwrap();
        assert_eq!(deck.clock().origin(), Some(3.0));
    }

    #[test]
    fn test_stop_is_safe_when_stopped() {
        let mut session = session();
        let mut deck = deck(2);
        session.activate().unwrap();
        assert!(!deck.stop(&mut session, 1).unwrap());

        deck.toggle(&mut session, 0).unwrap();
        deck.toggle(&mut session, 1).unwrap();
        assert_eq!(deck.stop_all(&mut session).unwrap(), 2);
        assert_eq!(deck.active_count(), 0);
    }

    #[test]
    fn test_out_of_range_press() {
        let mut session = session();
        let mut deck = deck(2);
        let err = deck.toggle(&mut session, 5).unwrap_err();
        assert_eq!(err.error_code(), "INDEX_OUT_OF_RANGE");
    }

    #[test]
    fn test_stop_needs_ready_session() {
        let mut session = session();
        let mut deck = deck(1);
        let err = deck.stop(&mut session, 0).unwrap_err();
        assert_eq!(err.error_code(), "SESSION_NOT_READY");
    }

    #[test]
    fn test_intensities_of_active_loops() {
        let mut session = session();
        let mut deck = deck(2);
        deck.toggle(&mut session, 1).unwrap();
        session.graph_mut().unwrap().render_to(3.0);

        let levels = deck.intensities(&session).unwrap();
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].0, 1);
        // rms 0.2 saturates the button opacity
        assert_relative_eq!(levels[0].1, 1.0);
    }
}
