//! CLI Module
//!
//! Command-line interface for the looplab demos. Every demo runs headless:
//! gestures are given as timed arguments and the result is rendered
//! offline to a WAV file.

pub mod commands;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};

use crate::cli::commands::MAX_LENGTH;
use crate::engine::buffer::DEFAULT_SAMPLE_RATE;

/// LoopLab - headless interactive audio demos
#[derive(Parser, Debug)]
#[command(name = "looplab")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON configuration file (defaults apply to missing fields)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Sample rate of the rendered output
    #[arg(long, global = true, default_value_t = DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,

    /// Bit depth of the rendered output (16, 24 or 32)
    #[arg(long, global = true, default_value_t = 24)]
    pub bit_depth: u16,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Play a deck of loops on a shared loop clock
    #[command(name = "loops")]
    Loops {
        /// Loop files, one per button
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Button press as TIME:INDEX (repeatable)
        #[arg(long = "press", required = true)]
        presses: Vec<TimedIndex>,

        /// Length of the rendering in seconds
        #[arg(short, long, default_value_t = 8.0, value_parser = parse_length)]
        length: f64,

        /// Output WAV file
        #[arg(short, long)]
        output: PathBuf,

        /// Attach simulated videos and correct their drift
        #[arg(long)]
        video: bool,

        /// Clock ratio of the simulated videos
        #[arg(long, default_value_t = 1.01, value_parser = parse_positive)]
        skew: f64,

        /// Tempo in BPM; sets the loop length together with --bars
        #[arg(long, value_parser = parse_positive)]
        tempo: Option<f64>,

        /// Loop length in bars
        #[arg(long, value_parser = parse_positive)]
        bars: Option<f64>,
    },

    /// Scrub through a file with a granular play head
    #[command(name = "scrub")]
    Scrub {
        /// Source file
        file: PathBuf,

        /// Play head position as TIME:X:Y; the first one puts the head down
        #[arg(long = "point", required = true)]
        points: Vec<TimedPoint>,

        /// Time the play head is lifted
        #[arg(long, value_parser = parse_time)]
        release: Option<f64>,

        #[arg(short, long, default_value_t = 4.0, value_parser = parse_length)]
        length: f64,

        #[arg(short, long)]
        output: PathBuf,

        /// Surface size as WIDTHxHEIGHT
        #[arg(long, default_value = "800x400")]
        surface: SurfaceSize,
    },

    /// Tune the fake radio
    #[command(name = "radio")]
    Radio {
        /// Noise file
        file: PathBuf,

        /// Time of a slider input (repeatable)
        #[arg(long = "input", required = true, value_parser = parse_time)]
        inputs: Vec<f64>,

        #[arg(short, long, default_value_t = 4.0, value_parser = parse_length)]
        length: f64,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Play the saw synth with one pointer
    #[command(name = "synth")]
    Synth {
        /// Pointer position as TIME:X:Y; the first one presses
        #[arg(long = "point", required = true)]
        points: Vec<TimedPoint>,

        /// Time the pointer is lifted
        #[arg(long, value_parser = parse_time)]
        release: f64,

        #[arg(short, long, default_value_t = 4.0, value_parser = parse_length)]
        length: f64,

        #[arg(short, long)]
        output: PathBuf,

        /// Use the mouse synth settings
        #[arg(long)]
        mouse: bool,

        #[arg(long, default_value = "800x400")]
        surface: SurfaceSize,
    },

    /// Hit drum pads
    #[command(name = "pads")]
    Pads {
        /// Sample files, one per pad
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Pad hit as TIME:INDEX (repeatable)
        #[arg(long = "hit", required = true)]
        hits: Vec<TimedIndex>,

        #[arg(short, long, default_value_t = 4.0, value_parser = parse_length)]
        length: f64,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print the intensity circle of a file played once
    #[command(name = "meter")]
    Meter {
        file: PathBuf,

        /// Animation frames per second
        #[arg(long, default_value_t = 30.0, value_parser = parse_positive)]
        fps: f64,
    },

    /// Print the default configuration
    #[command(name = "default-config")]
    DefaultConfig,
}

// ============================================================================
// Argument types
// ============================================================================

/// `TIME:INDEX`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedIndex {
    pub time: f64,
    pub index: usize,
}

/// `TIME:X:Y`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedPoint {
    pub time: f64,
    pub x: f64,
    pub y: f64,
}

/// `WIDTHxHEIGHT`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceSize {
    pub width: f64,
    pub height: f64,
}

fn parse_time(text: &str) -> Result<f64, String> {
    let time: f64 = text
        .trim()
        .parse()
        .map_err(|_| format!("invalid time '{}'", text))?;
    if time.is_finite() && time >= 0.0 {
        Ok(time)
    } else {
        Err(format!("time must be non-negative, got {}", text))
    }
}

fn parse_positive(text: &str) -> Result<f64, String> {
    let value: f64 = text
        .trim()
        .parse()
        .map_err(|_| format!("invalid number '{}'", text))?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(format!("must be a positive number, got {}", text))
    }
}

fn parse_length(text: &str) -> Result<f64, String> {
    let length = parse_positive(text)?;
    if length <= MAX_LENGTH {
        Ok(length)
    } else {
        Err(format!("length must be at most {} seconds, got {}", MAX_LENGTH, text))
    }
}

fn parse_coord(text: &str) -> Result<f64, String> {
    text.trim()
        .parse()
        .map_err(|_| format!("invalid coordinate '{}'", text))
}

impl FromStr for TimedIndex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (time, index) = s
            .split_once(':')
            .ok_or_else(|| format!("expected TIME:INDEX, got '{}'", s))?;
        Ok(Self {
            time: parse_time(time)?,
            index: index
                .trim()
                .parse()
                .map_err(|_| format!("invalid index '{}'", index))?,
        })
    }
}

impl FromStr for TimedPoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let [time, x, y] = parts.as_slice() else {
            return Err(format!("expected TIME:X:Y, got '{}'", s));
        };
        Ok(Self {
            time: parse_time(time)?,
            x: parse_coord(x)?,
            y: parse_coord(y)?,
        })
    }
}

impl FromStr for SurfaceSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
        let width = parse_coord(w)?;
        let height = parse_coord(h)?;
        if width > 0.0 && height > 0.0 {
            Ok(Self { width, height })
        } else {
            Err(format!("surface must have a positive size, got '{}'", s))
        }
    }
}

impl fmt::Display for SurfaceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timed_args() {
        let press: TimedIndex = "1.5:2".parse().unwrap();
        assert_eq!(press, TimedIndex { time: 1.5, index: 2 });

        let point: TimedPoint = "0.25:400:-10".parse().unwrap();
        assert_eq!(point.y, -10.0);

        assert!("1.5".parse::<TimedIndex>().is_err());
        assert!("-1:0".parse::<TimedIndex>().is_err());
        assert!("1:2".parse::<TimedPoint>().is_err());
    }

    #[test]
    fn test_parse_surface() {
        let size: SurfaceSize = "800x400".parse().unwrap();
        assert_eq!(size.width, 800.0);
        assert_eq!(size.to_string(), "800x400");
        assert!("0x400".parse::<SurfaceSize>().is_err());
    }

    #[test]
    fn test_rejects_unbounded_numbers() {
        let parse = |args: &[&str]| {
            let mut argv = vec!["looplab"];
            argv.extend_from_slice(args);
            Cli::try_parse_from(argv)
        };

        for length in ["inf", "NaN", "0", "-2", "1e300"] {
            assert!(
                parse(&["radio", "n.wav", "--input", "1", "-o", "o.wav", "-l", length]).is_err(),
                "length {}",
                length
            );
        }
        assert!(parse(&["radio", "n.wav", "--input", "NaN", "-o", "o.wav"]).is_err());
        assert!(parse(&["synth", "--point", "0:1:1", "--release", "inf", "-o", "o.wav"]).is_err());
        assert!(parse(&["loops", "a.wav", "--press", "0:0", "-o", "o.wav", "--skew", "0"]).is_err());
        assert!(parse(&["loops", "a.wav", "--press", "0:0", "-o", "o.wav", "--tempo", "NaN"]).is_err());
        assert!(parse(&["meter", "a.wav", "--fps", "inf"]).is_err());

        assert!(parse(&["radio", "n.wav", "--input", "1", "-o", "o.wav", "-l", "2.5"]).is_ok());
    }

    #[test]
    fn test_cli_parses_loops_command() {
        let cli = Cli::try_parse_from([
            "looplab", "-v", "loops", "a.wav", "b.wav", "--press", "0:0", "--press", "1.5:1",
            "--output", "out.wav", "--video",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Some(Commands::Loops {
                files,
                presses,
                video,
                ..
            }) => {
                assert_eq!(files.len(), 2);
                assert_eq!(presses[1], TimedIndex { time: 1.5, index: 1 });
                assert!(video);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
