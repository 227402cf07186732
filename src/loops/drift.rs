//! Video drift correction
//!
//! A video running next to an audio loop has its own clock and slowly
//! drifts away from the audio. Every correction period the expected loop
//! phase is compared with the video position: small drift is absorbed by
//! nudging the playback rate, drift beyond half the loop is fixed with a
//! hard seek.
//!
//! Sign convention: `drift = position - expected`. A video ahead of the
//! audio (positive drift) gets a rate below 1, a video behind gets a rate
//! above 1. The rate is chosen so that the drift would be gone after one
//! more period at that rate.

use std::fmt;

use log::debug;

use crate::config::DriftConfig;
use crate::engine::graph::Time;
use crate::loops::clock::LoopClock;
use crate::loops::deck::LoopDeck;
use crate::loops::player::Loop;

/// Slack on the period check for ticks landing exactly one period apart
const PERIOD_TOLERANCE: f64 = 1e-9;

// ============================================================================
// Media elements
// ============================================================================

/// A visual media element with its own playback clock
pub trait MediaElement: fmt::Debug {
    /// Current position in seconds
    fn position(&self) -> f64;

    fn seek(&mut self, position: f64);

    fn playback_rate(&self) -> f64;

    fn set_playback_rate(&mut self, rate: f64);

    fn play(&mut self);

    fn pause(&mut self);

    fn is_playing(&self) -> bool;

    /// Let `dt` seconds of wall time pass
    ///
    /// Elements with their own clock ignore this; simulated elements are
    /// driven by it.
    fn advance(&mut self, _dt: f64) {}
}

/// Looping media element running on a skewed clock
///
/// `skew` is the ratio of the element's clock to the audio clock: 1.01
/// plays one percent fast at rate 1.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedMedia {
    duration: f64,
    position: f64,
    rate: f64,
    skew: f64,
    playing: bool,
    seeks: usize,
}

impl SimulatedMedia {
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            position: 0.0,
            rate: 1.0,
            skew: 1.0,
            playing: false,
            seeks: 0,
        }
    }

    pub fn with_skew(mut self, skew: f64) -> Self {
        self.skew = skew;
        self
    }

    /// Number of seeks since creation
    pub fn seeks(&self) -> usize {
        self.seeks
    }
}

impl MediaElement for SimulatedMedia {
    fn position(&self) -> f64 {
        self.position
    }

    fn seek(&mut self, position: f64) {
        self.position = position.rem_euclid(self.duration);
        self.seeks += 1;
    }

    fn playback_rate(&self) -> f64 {
        self.rate
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.rate = rate;
    }

    fn play(&mut self) {
        self.playing = true;
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn advance(&mut self, dt: f64) {
        if self.playing {
            self.position = (self.position + dt * self.rate * self.skew).rem_euclid(self.duration);
        }
    }
}

// ============================================================================
// Drift Corrector
// ============================================================================

/// What to do with one media element
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    /// Jump to the expected position
    Seek(f64),
    /// Play at this rate until the next correction
    Rate(f64),
}

/// Whether the periodic task wants to run again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rearm {
    Continue,
    Stop,
}

/// Running totals, for reporting
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DriftStats {
    /// Ticks that corrected at least one media element
    pub passes: usize,
    pub seeks: usize,
    pub rate_changes: usize,
    /// Largest drift seen, in seconds
    pub max_drift: f64,
}

#[derive(Debug, Clone)]
pub struct DriftCorrector {
    period: f64,
    max_speed: f64,
    last_adjust: Option<Time>,
    stats: DriftStats,
}

impl Default for DriftCorrector {
    fn default() -> Self {
        Self::from_config(&DriftConfig::default())
    }
}

impl DriftCorrector {
    pub fn new(period: f64, max_speed: f64) -> Self {
        Self {
            period,
            max_speed,
            last_adjust: None,
            stats: DriftStats::default(),
        }
    }

    pub fn from_config(config: &DriftConfig) -> Self {
        Self::new(config.period, config.max_speed)
    }

    /// Correction period in seconds
    pub fn period(&self) -> f64 {
        self.period
    }

    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }

    pub fn min_speed(&self) -> f64 {
        1.0 / self.max_speed
    }

    pub fn stats(&self) -> DriftStats {
        self.stats
    }

    /// Correction for an element at `position` when the loop is at `expected`
    pub fn correction(&self, expected: f64, position: f64, duration: f64) -> Correction {
        let drift = position - expected;
        if drift.abs() > 0.5 * duration {
            Correction::Seek(expected)
        } else {
            let speed = (self.period - drift) / self.period;
            Correction::Rate(speed.clamp(self.min_speed(), self.max_speed))
        }
    }

    /// Periodic entry point for a loop deck
    pub fn tick(&mut self, now: Time, deck: &mut LoopDeck) -> Rearm {
        let (clock, loops) = deck.clock_and_loops_mut();
        self.tick_loops(now, clock, loops)
    }

    /// Correct every playing loop that has a media element
    ///
    /// Runs at most once per period; the first call always runs. Returns
    /// [`Rearm::Stop`] once no loop is playing.
    pub fn tick_loops<'a>(
        &mut self,
        now: Time,
        clock: &LoopClock,
        loops: impl IntoIterator<Item = &'a mut Loop>,
    ) -> Rearm {
        // A tick exactly one period later is due, float noise included
        let due = self
            .last_adjust
            .map_or(true, |last| now - last >= self.period - PERIOD_TOLERANCE);

        let mut any_playing = false;
        let mut corrected = false;
        for lp in loops.into_iter().filter(|lp| lp.is_playing()) {
            any_playing = true;
            if due {
                corrected |= self.correct(now, clock, lp);
            }
        }

        if due {
            self.last_adjust = Some(now);
        }
        if corrected {
            self.stats.passes += 1;
        }

        if any_playing {
            Rearm::Continue
        } else {
            debug!("[DRIFT] no active loops, stopping");
            self.last_adjust = None;
            Rearm::Stop
        }
    }

    /// Returns whether the loop had a media element to correct
    fn correct(&mut self, now: Time, clock: &LoopClock, lp: &mut Loop) -> bool {
        let duration = lp.duration();
        let Some(expected) = clock.phase(now, lp.offset(), duration) else {
            return false;
        };
        let Some(media) = lp.companion_mut() else {
            return false;
        };

        let position = media.position();
        self.stats.max_drift = self.stats.max_drift.max((position - expected).abs());

        match self.correction(expected, position, duration) {
            Correction::Seek(target) => {
                debug!(
                    "[DRIFT] seek {:.3}s -> {:.3}s at {:.3}s",
                    position, target, now
                );
                media.seek(target);
                self.stats.seeks += 1;
            }
            Correction::Rate(rate) => {
                media.set_playback_rate(rate);
                self.stats.rate_changes += 1;
            }
        }
        true
    }
}
