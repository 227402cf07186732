//! Intensity metering
//!
//! Reads the latest analyser window, reduces it to RMS and maps that onto
//! the visual properties the demos animate: loop button opacity and the
//! size and opacity of the intensity circle.

use crate::config::MeterConfig;
use crate::engine::graph::{AudioGraph, NodeId};

/// Root mean square of a sample window
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Affine RMS to opacity map with an upper bound
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntensityMapping {
    pub floor: f32,
    pub gain: f32,
    pub ceiling: f32,
}

impl IntensityMapping {
    /// Loop and pad buttons
    pub const BUTTON: Self = Self {
        floor: 0.25,
        gain: 10.0,
        ceiling: 1.0,
    };

    /// Intensity circle
    pub const CIRCLE: Self = Self {
        floor: 0.5,
        gain: 10.0,
        ceiling: 1.0,
    };

    pub fn map(&self, rms: f32) -> f32 {
        (self.floor + self.gain * rms).min(self.ceiling)
    }
}

impl From<&MeterConfig> for IntensityMapping {
    fn from(config: &MeterConfig) -> Self {
        Self {
            floor: config.floor,
            gain: config.gain,
            ceiling: 1.0,
        }
    }
}

/// Visual state of the intensity circle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleStyle {
    pub opacity: f32,
    /// Width and height in pixels
    pub diameter: f32,
    /// Top and left margin that keeps the circle centered
    pub margin: f32,
}

impl CircleStyle {
    pub const IDLE_OPACITY: f32 = 0.25;
    const BASE_DIAMETER: f32 = 100.0;
    const DIAMETER_PER_RMS: f32 = 500.0;

    pub fn from_intensity(rms: f32) -> Self {
        let diameter = Self::BASE_DIAMETER + Self::DIAMETER_PER_RMS * rms;
        Self {
            opacity: IntensityMapping::CIRCLE.map(rms),
            diameter,
            margin: -0.5 * diameter,
        }
    }

    /// Style while metering is switched off
    pub fn idle() -> Self {
        Self {
            opacity: Self::IDLE_OPACITY,
            diameter: Self::BASE_DIAMETER,
            margin: -0.5 * Self::BASE_DIAMETER,
        }
    }
}

/// An analyser node plus the scratch window it is read into
#[derive(Debug, Clone)]
pub struct IntensityMeter {
    analyser: NodeId,
    scratch: Vec<f32>,
}

impl IntensityMeter {
    /// Create the analyser node; connect a signal into [`Self::analyser`]
    pub fn new<G: AudioGraph + ?Sized>(graph: &mut G, fft_size: usize) -> Self {
        Self {
            analyser: graph.create_analyser(fft_size),
            scratch: vec![0.0; fft_size],
        }
    }

    pub fn analyser(&self) -> NodeId {
        self.analyser
    }

    /// RMS of the most recent analyser window
    pub fn read<G: AudioGraph + ?Sized>(&mut self, graph: &G) -> f32 {
        graph.time_domain_data(self.analyser, &mut self.scratch);
        rms(&self.scratch)
    }
}

/// The intensity circle: a meter that can be switched on and off
#[derive(Debug, Clone)]
pub struct IntensityCircle {
    meter: IntensityMeter,
    enabled: bool,
}

impl IntensityCircle {
    pub fn new(meter: IntensityMeter) -> Self {
        Self {
            meter,
            enabled: false,
        }
    }

    pub fn meter(&self) -> &IntensityMeter {
        &self.meter
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Switch metering on or off; returns the new state
    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        self.enabled
    }

    /// Style for the current animation frame
    pub fn frame<G: AudioGraph + ?Sized>(&mut self, graph: &G) -> CircleStyle {
        if self.enabled {
            CircleStyle::from_intensity(self.meter.read(graph))
        } else {
            CircleStyle::idle()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AudioBuffer, OfflineGraph};
    use approx::assert_relative_eq;

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert_relative_eq!(rms(&[0.5, -0.5, 0.5, -0.5]), 0.5);
    }

    #[test]
    fn test_button_mapping() {
        assert_relative_eq!(IntensityMapping::BUTTON.map(0.0), 0.25);
        assert_relative_eq!(IntensityMapping::BUTTON.map(0.05), 0.75);
        assert_eq!(IntensityMapping::BUTTON.map(0.5), 1.0);
    }

    #[test]
    fn test_mapping_from_config() {
        let mapping = IntensityMapping::from(&MeterConfig::default());
        assert_eq!(mapping, IntensityMapping::BUTTON);
    }

    #[test]
    fn test_circle_style() {
        let style = CircleStyle::from_intensity(0.02);
        assert_relative_eq!(style.opacity, 0.7);
        assert_relative_eq!(style.diameter, 110.0);
        assert_relative_eq!(style.margin, -55.0);

        let loud = CircleStyle::from_intensity(0.2);
        assert_eq!(loud.opacity, 1.0);
        assert_relative_eq!(loud.diameter, 200.0);

        assert_eq!(CircleStyle::idle().opacity, 0.25);
    }

    #[test]
    fn test_meter_reads_analyser() {
        let mut graph = OfflineGraph::new(1000);
        let buffer = AudioBuffer::mono(vec![0.5; 1000], 1000).unwrap();
        let src = graph.create_buffer_source(buffer, None);
        let mut meter = IntensityMeter::new(&mut graph, 64);
        graph.connect(src, meter.analyser());
        graph.start(src, 0.0, 0.0);

        assert_eq!(meter.read(&graph), 0.0);
        graph.render_to(0.5);
        assert_relative_eq!(meter.read(&graph), 0.5);
    }

    #[test]
    fn test_circle_toggle() {
        let mut graph = OfflineGraph::new(1000);
        let meter = IntensityMeter::new(&mut graph, 64);
        let mut circle = IntensityCircle::new(meter);

        assert_eq!(circle.frame(&graph), CircleStyle::idle());
        assert!(circle.toggle());
        assert_relative_eq!(circle.frame(&graph).opacity, 0.5);
        assert!(!circle.toggle());
    }
}
