//! Loop clock
//!
//! The shared reference point every synced loop measures its phase from.
//! The first loop started into an empty set establishes it; it is reset
//! once nothing plays any more.

use log::debug;

use crate::engine::graph::Time;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopClock {
    origin: Option<Time>,
}

impl LoopClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph time the running loops are aligned to
    pub fn origin(&self) -> Option<Time> {
        self.origin
    }

    pub fn is_established(&self) -> bool {
        self.origin.is_some()
    }

    pub fn establish(&mut self, at: Time) {
        debug!("[CLOCK] established at {:.3}s", at);
        self.origin = Some(at);
    }

    pub fn reset(&mut self) {
        if self.origin.take().is_some() {
            debug!("[CLOCK] reset");
        }
    }

    /// Phase a loop of `duration` with loop point `offset` has at `now`
    ///
    /// Always in `[0, duration)`, also for `now` before the origin.
    pub fn phase(&self, now: Time, offset: f64, duration: f64) -> Option<f64> {
        self.origin
            .map(|origin| (now - origin + offset).rem_euclid(duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_unestablished_has_no_phase() {
        let clock = LoopClock::new();
        assert!(!clock.is_established());
        assert_eq!(clock.phase(1.0, 0.0, 2.0), None);
    }

    #[test]
    fn test_phase_wraps() {
        let mut clock = LoopClock::new();
        clock.establish(10.0);
        assert_relative_eq!(clock.phase(10.8, 0.0, 2.0).unwrap(), 0.8);
        assert_relative_eq!(clock.phase(13.5, 0.57, 2.0).unwrap(), 0.07, epsilon = 1e-9);
    }

    #[test]
    fn test_phase_before_origin_stays_in_range() {
        let mut clock = LoopClock::new();
        clock.establish(10.0);
        let phase = clock.phase(9.5, 0.0, 2.0).unwrap();
        assert_relative_eq!(phase, 1.5);
    }

    #[test]
    fn test_reset() {
        let mut clock = LoopClock::new();
        clock.establish(1.0);
        clock.reset();
        assert_eq!(clock.origin(), None);
    }
}
