//! CLI Command Implementations
//!
//! Each command replays timed gestures against an [`OfflineGraph`] and
//! writes what it rendered. The clock advances in small steps; gestures
//! fire at their exact times in between, and periodic work (drift
//! correction, grain lookahead) runs on the steps.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::{debug, info};

use crate::cli::{SurfaceSize, TimedIndex, TimedPoint};
use crate::config::{Config, SynthConfig};
use crate::engine::buffer::AudioBuffer;
use crate::engine::graph::{AudioGraph, Time};
use crate::engine::io::{export_audio, load_audio, ExportFormat};
use crate::engine::offline::OfflineGraph;
use crate::engine::session::AudioSession;
use crate::gesture::{Scrubber, Surface, TouchSynth, MOUSE_POINTER};
use crate::grain::RadioNoise;
use crate::loops::{DriftCorrector, DriftStats, Loop, LoopDeck, Rearm, SimulatedMedia};
use crate::meter::{CircleStyle, IntensityCircle, IntensityMeter};
use crate::pads::DrumPads;

/// Clock step of the command drivers
pub const STEP: f64 = 0.01;

/// Longest rendering a command accepts, in seconds
pub const MAX_LENGTH: f64 = 3600.0;

/// Fastest meter animation a command accepts
pub const MAX_FPS: f64 = 1000.0;

/// Where and how a command renders
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub output: PathBuf,
    /// Rendered length in seconds
    pub length: f64,
    pub sample_rate: u32,
    pub format: ExportFormat,
}

/// Summary of a rendered file
#[derive(Debug, Clone, PartialEq)]
pub struct RenderReport {
    pub output: PathBuf,
    pub duration_secs: f64,
    pub peak: f32,
    pub rms: f32,
}

/// Result of the loops command
#[derive(Debug, Clone, PartialEq)]
pub struct LoopsReport {
    pub render: RenderReport,
    /// Drift corrections, when videos were attached
    pub drift: Option<DriftStats>,
}

/// One animation frame of the meter command
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterFrame {
    pub time: Time,
    pub style: CircleStyle,
}

/// Play a deck of loops and render the result.
///
/// `loop_duration` overrides the loop length of every file (from tempo and
/// bars); without it each loop spans its whole file. `video_skew` attaches
/// a simulated video per loop running on a clock skewed by that ratio.
pub fn render_loops(
    config: &Config,
    files: &[PathBuf],
    presses: &[TimedIndex],
    loop_duration: Option<f64>,
    video_skew: Option<f64>,
    options: &RenderOptions,
) -> Result<LoopsReport> {
    info!("Rendering {} loops to {}", files.len(), options.output.display());

    let mut loops = Vec::with_capacity(files.len());
    for path in files {
        let buffer = load(path)?;
        let lp = match loop_duration {
            Some(duration) => Loop::new(buffer, duration),
            None => Loop::from_buffer(buffer),
        }
        .with_context(|| format!("Invalid loop {}", path.display()))?;

        let mut lp = lp
            .with_fade_time(config.loops.fade_time)
            .with_analyser_size(config.meter.fft_size);
        if let Some(skew) = video_skew {
            let media = SimulatedMedia::new(lp.duration()).with_skew(skew);
            lp = lp.with_companion(Box::new(media));
        }
        loops.push(lp);
    }

    let mut deck = LoopDeck::new(loops);
    if let Some(skew) = video_skew.filter(|s| !(s.is_finite() && *s > 0.0)) {
        bail!("Video skew must be positive, got {}", skew);
    }
    let mut drift = video_skew.map(|_| DriftCorrector::from_config(&config.drift));
    let mut drift_armed = false;

    let mut presses = presses.to_vec();
    presses.sort_by(|a, b| a.time.total_cmp(&b.time));
    let mut pending = presses.iter().peekable();

    let mut session = start_session(options)?;
    let mut last = 0.0;
    for now in steps(options.length, presses.iter().map(|p| p.time)) {
        session.graph_mut()?.render_to(now);
        deck.advance_media(now - last);
        last = now;

        while let Some(press) = pending.next_if(|p| p.time <= now) {
            let playing = deck
                .toggle(&mut session, press.index)
                .with_context(|| format!("Press at {:.2}s", press.time))?;
            info!(
                "{:.2}s: loop {} {}",
                press.time,
                press.index,
                if playing { "on" } else { "off" }
            );
            drift_armed |= playing;
        }

        if let Some(corrector) = drift.as_mut() {
            if drift_armed && corrector.tick(now, &mut deck) == Rearm::Stop {
                debug!("drift correction idle at {:.2}s", now);
                drift_armed = false;
            }
        }
    }

    let render = finish(session, options)?;
    Ok(LoopsReport {
        render,
        drift: drift.map(|d| d.stats()),
    })
}

/// Scrub a file with one granular play head and render the result.
pub fn render_scrub(
    config: &Config,
    file: &Path,
    points: &[TimedPoint],
    release: Option<f64>,
    surface: SurfaceSize,
    options: &RenderOptions,
) -> Result<RenderReport> {
    info!("Scrubbing {} to {}", file.display(), options.output.display());

    let points = sorted_points(points)?;
    let buffer = load(file)?;
    let mut scrubber = Scrubber::new(
        buffer,
        config.grain.clone(),
        Surface::new(surface.width, surface.height),
    );
    let period = scrubber.render_period();

    let mut session = start_session(options)?;
    let mut pending = points.iter().peekable();
    let mut pressed = false;
    let mut released = false;
    let mut next_render: Option<Time> = None;

    let times = points.iter().map(|p| p.time).chain(release);
    for now in steps(options.length, times) {
        session.graph_mut()?.render_to(now);

        while let Some(point) = pending.next_if(|p| p.time <= now) {
            if !pressed {
                pressed = true;
                if scrubber.press(&mut session, MOUSE_POINTER, point.x, point.y)? {
                    next_render = Some(now + period);
                }
            } else {
                scrubber.move_to(MOUSE_POINTER, point.x, point.y);
            }
        }

        if let Some(at) = release.filter(|&at| !released && at <= now) {
            scrubber.release(MOUSE_POINTER);
            released = true;
            debug!("play head released at {:.2}s", at);
        }

        if let Some(at) = next_render.filter(|&at| at <= now + 1e-9) {
            next_render = match scrubber.render_audio(&mut session)? {
                Rearm::Continue => Some(at + period),
                Rearm::Stop => None,
            };
        }
    }

    finish(session, options)
}

/// Tune the fake radio and render the noise bursts.
pub fn render_radio(
    config: &Config,
    file: &Path,
    inputs: &[f64],
    seed: Option<u64>,
    options: &RenderOptions,
) -> Result<RenderReport> {
    info!("Radio noise from {} to {}", file.display(), options.output.display());

    let buffer = load(file)?;
    let mut radio = RadioNoise::new(buffer, &config.radio);
    if let Some(seed) = seed {
        radio = radio.with_seed(seed);
    }

    let mut inputs = inputs.to_vec();
    inputs.sort_by(f64::total_cmp);
    let mut pending = inputs.iter().peekable();

    let mut session = start_session(options)?;
    for now in steps(options.length, inputs.iter().copied()) {
        session.graph_mut()?.render_to(now);
        while pending.next_if(|&&t| t <= now).is_some() {
            let grain = radio.on_input(&mut session)?;
            debug!("burst from {:.3}s", grain.offset);
        }
    }

    finish(session, options)
}

/// Play the saw synth with one pointer and render the result.
pub fn render_synth(
    config: &Config,
    points: &[TimedPoint],
    release: f64,
    mouse: bool,
    surface: SurfaceSize,
    options: &RenderOptions,
) -> Result<RenderReport> {
    info!("Rendering synth to {}", options.output.display());

    let points = sorted_points(points)?;
    let mut synth_config = config.synth.clone();
    if mouse {
        synth_config.min_cutoff = SynthConfig::mouse().min_cutoff;
    }
    let mut synth = TouchSynth::new(
        synth_config,
        Surface::new(surface.width, surface.height),
    );

    let mut session = start_session(options)?;
    let mut pending = points.iter().peekable();
    let mut pressed = false;
    let mut released = false;

    let times = points.iter().map(|p| p.time).chain(Some(release));
    for now in steps(options.length, times) {
        session.graph_mut()?.render_to(now);

        if released {
            continue;
        }
        while let Some(point) = pending.next_if(|p| p.time <= now && p.time < release) {
            if pressed {
                synth.move_to(&mut session, MOUSE_POINTER, point.x, point.y)?;
            } else {
                synth.press(&mut session, MOUSE_POINTER, point.x, point.y)?;
                pressed = true;
            }
        }
        if release <= now {
            synth.release(&mut session, MOUSE_POINTER)?;
            released = true;
        }
    }

    finish(session, options)
}

/// Hit drum pads and render the result.
pub fn render_pads(files: &[PathBuf], hits: &[TimedIndex], options: &RenderOptions) -> Result<RenderReport> {
    info!("Rendering {} pads to {}", files.len(), options.output.display());

    let buffers = files.iter().map(|p| load(p)).collect::<Result<Vec<_>>>()?;
    let pads = DrumPads::new(buffers);

    let mut hits = hits.to_vec();
    hits.sort_by(|a, b| a.time.total_cmp(&b.time));
    let mut pending = hits.iter().peekable();

    let mut session = start_session(options)?;
    for now in steps(options.length, hits.iter().map(|h| h.time)) {
        session.graph_mut()?.render_to(now);
        while let Some(hit) = pending.next_if(|h| h.time <= now) {
            pads.hit(&mut session, hit.index)
                .with_context(|| format!("Hit at {:.2}s", hit.time))?;
        }
    }

    finish(session, options)
}

/// Play a file once through the intensity circle.
pub fn meter_frames(config: &Config, file: &Path, fps: f64, sample_rate: u32) -> Result<Vec<MeterFrame>> {
    if !(fps.is_finite() && fps > 0.0 && fps <= MAX_FPS) {
        bail!("Frame rate must be in (0, {}], got {}", MAX_FPS, fps);
    }
    let buffer = load(file)?;
    let length = buffer.duration_secs();

    let mut session = AudioSession::new(OfflineGraph::new(sample_rate).with_event_log(false));
    session.activate()?;
    let graph = session.graph_mut()?;

    let source = graph.create_buffer_source(buffer, None);
    let meter = IntensityMeter::new(&mut *graph, config.meter.fft_size);
    graph.connect(source, meter.analyser());
    graph.start(source, 0.0, 0.0);

    let mut circle = IntensityCircle::new(meter);
    circle.toggle();

    let frame_count = (length * fps).ceil() as usize;
    let mut frames = Vec::with_capacity(frame_count);
    for i in 1..=frame_count {
        let time = i as f64 / fps;
        graph.render_to(time);
        let style = circle.frame(&*graph);
        frames.push(MeterFrame { time, style });
    }
    Ok(frames)
}

/// Print the meter frames of a file.
pub fn print_meter(config: &Config, file: &Path, fps: f64, sample_rate: u32) -> Result<()> {
    let frames = meter_frames(config, file, fps, sample_rate)?;

    println!("{:>8} {:>8} {:>9}", "time", "opacity", "diameter");
    println!("{:-<27}", "");
    for frame in &frames {
        println!(
            "{:>8.3} {:>8.3} {:>9.1}",
            frame.time, frame.style.opacity, frame.style.diameter
        );
    }
    Ok(())
}

/// Default configuration as pretty JSON.
pub fn default_config() -> Result<String> {
    Ok(Config::default().to_json_pretty()?)
}

/// Print a render summary.
pub fn print_report(report: &RenderReport) {
    println!("Rendered: {}", report.output.display());
    println!("Duration: {:.2}s", report.duration_secs);
    println!("Peak: {:.3} | RMS: {:.3}", report.peak, report.rms);
}

/// Print drift correction totals.
pub fn print_drift(stats: &DriftStats) {
    println!("{:-<40}", "");
    println!("Drift passes: {}", stats.passes);
    println!(
        "Seeks: {} | Rate changes: {}",
        stats.seeks, stats.rate_changes
    );
    println!("Largest drift: {:.1} ms", stats.max_drift * 1000.0);
}

// ============================================================================
// Internal helper functions
// ============================================================================

fn load(path: &Path) -> Result<AudioBuffer> {
    load_audio(path).with_context(|| format!("Failed to load {}", path.display()))
}

fn check_length(length: f64) -> Result<()> {
    if length.is_finite() && length > 0.0 && length <= MAX_LENGTH {
        Ok(())
    } else {
        bail!("Length must be in (0, {}] seconds, got {}", MAX_LENGTH, length)
    }
}

fn start_session(options: &RenderOptions) -> Result<AudioSession<OfflineGraph>> {
    check_length(options.length)?;
    let graph = OfflineGraph::new(options.sample_rate).with_event_log(false);
    let mut session = AudioSession::new(graph);
    session.activate()?;
    Ok(session)
}

fn sorted_points(points: &[TimedPoint]) -> Result<Vec<TimedPoint>> {
    if points.is_empty() {
        bail!("At least one pointer position is required");
    }
    let mut points = points.to_vec();
    points.sort_by(|a, b| a.time.total_cmp(&b.time));
    Ok(points)
}

/// Clock steps up to `length`: every [`STEP`] plus the given event times
fn steps(length: f64, events: impl IntoIterator<Item = f64>) -> Vec<Time> {
    let ticks = (length / STEP).ceil().max(0.0) as usize;
    let mut times: Vec<Time> = (0..=ticks)
        .map(|i| (i as f64 * STEP).min(length))
        .chain(events.into_iter().filter(|&t| t <= length))
        .collect();
    times.sort_by(f64::total_cmp);
    times.dedup();
    times
}

fn finish(session: AudioSession<OfflineGraph>, options: &RenderOptions) -> Result<RenderReport> {
    let mut graph = session.into_graph();
    graph.render_to(options.length);

    let buffer = graph.output_buffer()?;
    export_audio(&buffer, &options.output, options.format.clone())
        .with_context(|| format!("Failed to write {}", options.output.display()))?;

    Ok(RenderReport {
        output: options.output.clone(),
        duration_secs: buffer.duration_secs(),
        peak: buffer.peak(),
        rms: buffer.rms(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_steps_include_events() {
        let times = steps(0.05, [0.025, 0.5]);
        assert_eq!(times.len(), 7);
        assert_eq!(times[0], 0.0);
        assert!(times.contains(&0.025));
        assert_relative_eq!(*times.last().unwrap(), 0.05);
        assert!(times.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_points_required() {
        assert!(sorted_points(&[]).is_err());
    }

    #[test]
    fn test_render_length_is_bounded() {
        let options = |length: f64| RenderOptions {
            output: PathBuf::from("out.wav"),
            length,
            sample_rate: 1000,
            format: ExportFormat::new(16),
        };
        for length in [f64::INFINITY, f64::NAN, 0.0, -1.0, 1e300] {
            assert!(start_session(&options(length)).is_err(), "length {}", length);
        }

        let session = start_session(&options(2.0)).unwrap();
        assert!(session.is_ready());
        assert!(session.graph().unwrap().events().is_empty());
    }

    #[test]
    fn test_default_config_round_trip() {
        let json = default_config().unwrap();
        assert_eq!(Config::from_json(&json).unwrap(), Config::default());
    }
}
