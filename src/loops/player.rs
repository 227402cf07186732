//! Loop player
//!
//! A [`Loop`] plays one buffer as an endless loop of fixed duration. Every
//! start builds a fresh source and gain pair in the graph; a stop fades the
//! current pair out and lets it go, so a restart during a fade-out never
//! touches the fading voice.
//!
//! Graph built per start:
//! ```text
//! source -> gain -> [panner ->] destination
//!             \-> analyser
//! ```

use log::{debug, warn};

use crate::engine::buffer::{db_to_linear, AudioBuffer};
use crate::engine::graph::{AudioGraph, LoopRegion, NodeId, Time};
use crate::error::{LoopLabError, Result};
use crate::loops::clock::LoopClock;
use crate::loops::drift::MediaElement;
use crate::meter::IntensityMeter;

/// Default fade-in/out time in seconds
pub const DEFAULT_FADE_TIME: f64 = 0.05;

/// Default analyser window in samples
pub const DEFAULT_ANALYSER_SIZE: usize = 2048;

/// Graph nodes of a playing loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopVoice {
    pub source: NodeId,
    pub gain: NodeId,
    pub panner: Option<NodeId>,
}

/// A looping buffer with its playback state
#[derive(Debug)]
pub struct Loop {
    buffer: AudioBuffer,
    duration: f64,
    offset: f64,
    amp: f32,
    fade_time: f64,
    pan: Option<f32>,
    analyser_size: usize,

    voice: Option<LoopVoice>,
    /// Start time and entry phase of the current voice
    started: Option<(Time, f64)>,
    meter: Option<IntensityMeter>,
    companion: Option<Box<dyn MediaElement>>,
}

impl Loop {
    /// Create a loop of `duration` seconds over `buffer`
    ///
    /// # Errors
    /// `InvalidDuration` if `duration` is not a positive number.
    pub fn new(buffer: AudioBuffer, duration: f64) -> Result<Self> {
        if !(duration.is_finite() && duration > 0.0) {
            return Err(LoopLabError::InvalidDuration { duration });
        }

        Ok(Self {
            buffer,
            duration,
            offset: 0.0,
            amp: 1.0,
            fade_time: DEFAULT_FADE_TIME,
            pan: None,
            analyser_size: DEFAULT_ANALYSER_SIZE,
            voice: None,
            started: None,
            meter: None,
            companion: None,
        })
    }

    /// Loop over the whole buffer
    pub fn from_buffer(buffer: AudioBuffer) -> Result<Self> {
        let duration = buffer.duration_secs();
        Self::new(buffer, duration)
    }

    /// Loop point offset in seconds
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Level in dB
    pub fn with_level(mut self, level_db: f32) -> Self {
        self.amp = db_to_linear(level_db);
        self
    }

    pub fn with_fade_time(mut self, fade_time: f64) -> Self {
        self.fade_time = fade_time.max(0.0);
        self
    }

    /// Stereo position, -1 (left) to 1 (right)
    pub fn with_pan(mut self, pan: f32) -> Self {
        self.pan = Some(pan.clamp(-1.0, 1.0));
        self
    }

    pub fn with_analyser_size(mut self, size: usize) -> Self {
        self.analyser_size = size;
        self
    }

    /// Attach a media element kept in phase with the audio
    pub fn with_companion(mut self, media: Box<dyn MediaElement>) -> Self {
        self.companion = Some(media);
        self
    }

    pub fn buffer(&self) -> &AudioBuffer {
        &self.buffer
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Linear amplitude
    pub fn amp(&self) -> f32 {
        self.amp
    }

    pub fn pan(&self) -> Option<f32> {
        self.pan
    }

    pub fn is_playing(&self) -> bool {
        self.voice.is_some()
    }

    pub fn voice(&self) -> Option<&LoopVoice> {
        self.voice.as_ref()
    }

    pub fn companion(&self) -> Option<&dyn MediaElement> {
        self.companion.as_deref()
    }

    pub fn companion_mut(&mut self) -> Option<&mut (dyn MediaElement + 'static)> {
        self.companion.as_deref_mut()
    }

    /// Phase of the playing voice at `now`
    pub fn phase_at(&self, now: Time) -> Option<f64> {
        self.started
            .filter(|_| self.is_playing())
            .map(|(at, phase)| (phase + (now - at).max(0.0)).rem_euclid(self.duration))
    }

    /// Start playing at `at`; returns the phase playback enters at
    ///
    /// With `sync` and an established clock the loop joins in phase with
    /// the clock and fades in. Otherwise it starts from its loop point
    /// without a fade and (re)establishes the clock at `at`. Starting a
    /// playing loop schedules nothing.
    pub fn start<G: AudioGraph + ?Sized>(
        &mut self,
        graph: &mut G,
        clock: &mut LoopClock,
        at: Time,
        sync: bool,
    ) -> f64 {
        if let Some(phase) = self.phase_at(at) {
            return phase;
        }

        let (phase, fade) = match clock.origin() {
            Some(origin) if sync => {
                if at < origin {
                    warn!(
                        "[LOOP] start at {:.3}s is before the loop clock origin {:.3}s",
                        at, origin
                    );
                }
                (
                    (at - origin + self.offset).rem_euclid(self.duration),
                    true,
                )
            }
            _ => {
                if sync {
                    warn!("[LOOP] synced start without a loop clock, starting a new one");
                }
                clock.establish(at);
                (self.offset.rem_euclid(self.duration), false)
            }
        };

        let source = graph.create_buffer_source(
            self.buffer.clone(),
            Some(LoopRegion {
                start: 0.0,
                end: Some(self.duration),
            }),
        );
        let gain = graph.create_gain(0.0);
        graph.connect(source, gain);

        if fade {
            graph.schedule_value(gain.gain(), at, 0.0);
            graph.schedule_ramp(gain.gain(), at + self.fade_time, self.amp);
        } else {
            graph.schedule_value(gain.gain(), at, self.amp);
        }

        let destination = graph.destination();
        let panner = self.pan.map(|pan| {
            let panner = graph.create_panner(pan);
            graph.connect(gain, panner);
            graph.connect(panner, destination);
            panner
        });
        if panner.is_none() {
            graph.connect(gain, destination);
        }

        let analyser_size = self.analyser_size;
        let meter = self
            .meter
            .get_or_insert_with(|| IntensityMeter::new(&mut *graph, analyser_size));
        graph.connect(gain, meter.analyser());

        graph.start(source, at, phase);

        if let Some(media) = self.companion.as_mut() {
            media.seek(phase);
            media.play();
        }

        self.voice = Some(LoopVoice {
            source,
            gain,
            panner,
        });
        self.started = Some((at, phase));

        debug!(
            "[LOOP] start at {:.3}s, phase {:.3}s{}",
            at,
            phase,
            if fade { " (fade in)" } else { "" }
        );
        phase
    }

    /// Fade out and stop at `at`; returns false if the loop was not playing
    pub fn stop<G: AudioGraph + ?Sized>(&mut self, graph: &mut G, at: Time) -> bool {
        let Some(voice) = self.voice.take() else {
            return false;
        };
        self.started = None;

        let end = at + self.fade_time;
        graph.cancel_scheduled(voice.gain.gain(), at);
        graph.schedule_value(voice.gain.gain(), at, self.amp);
        graph.schedule_ramp(voice.gain.gain(), end, 0.0);
        graph.stop(voice.source, end);

        if let Some(media) = self.companion.as_mut() {
            media.pause();
        }

        debug!("[LOOP] stop at {:.3}s, silent at {:.3}s", at, end);
        true
    }

    /// RMS of the loop output, if it has ever played
    pub fn intensity<G: AudioGraph + ?Sized>(&mut self, graph: &G) -> Option<f32> {
        self.meter.as_mut().map(|meter| meter.read(graph))
    }
}
