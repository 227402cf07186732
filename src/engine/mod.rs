//! Audio Engine Module
//!
//! Everything that touches audio directly:
//! - Decoded buffers and WAV I/O
//! - The audio-graph abstraction and its automation timeline
//! - The offline renderer
//! - Session lifecycle

pub mod automation;
pub mod buffer;
pub mod graph;
pub mod io;
pub mod offline;
pub mod session;

pub use automation::ParamTimeline;
pub use buffer::{db_to_linear, linear_to_db, AudioBuffer, ChannelLayout, DEFAULT_SAMPLE_RATE};
pub use graph::{
    AudioGraph, GraphEvent, LoopRegion, NodeId, NodeKind, ParamId, ParamKind, Time, Waveform,
};
pub use io::{export_audio, generate_test_tone, load_audio, ExportFormat};
pub use offline::OfflineGraph;
pub use session::{AudioSession, SessionState};
