//! Drum pads
//!
//! One-shot sample playback: each pad plays its buffer once, straight into
//! the destination, at the time it is hit.

use log::debug;

use crate::engine::buffer::AudioBuffer;
use crate::engine::graph::{AudioGraph, NodeId};
use crate::engine::session::AudioSession;
use crate::error::{LoopLabError, Result};

#[derive(Debug, Clone)]
pub struct DrumPads {
    buffers: Vec<AudioBuffer>,
}

impl DrumPads {
    pub fn new(buffers: Vec<AudioBuffer>) -> Self {
        Self { buffers }
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Play pad `index` now; returns the source node
    ///
    /// Activates the session on the first hit.
    pub fn hit<G: AudioGraph>(
        &self,
        session: &mut AudioSession<G>,
        index: usize,
    ) -> Result<NodeId> {
        session.activate()?;
        let buffer = self
            .buffers
            .get(index)
            .ok_or(LoopLabError::IndexOutOfRange {
                what: "pad",
                index,
                len: self.buffers.len(),
            })?;

        let graph = session.graph_mut()?;
        let now = graph.current_time();
        let destination = graph.destination();
        let source = graph.create_buffer_source(buffer.clone(), None);
        graph.connect(source, destination);
        graph.start(source, now, 0.0);

        debug!("[PADS] pad {} at {:.3}s", index, now);
        Ok(source)
    }
}
