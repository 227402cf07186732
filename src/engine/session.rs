//! Audio session lifecycle
//!
//! Browsers only allow an audio context to start from a user gesture, so a
//! session is created inert and activated by the first press. Controllers
//! reach the graph through the session and get `SessionNotReady` before
//! activation and `SessionClosed` after shutdown.
//!
//! State machine:
//! - `Uninitialized` -> `Ready` on [`AudioSession::activate`]
//! - `Ready` -> `Closed` on [`AudioSession::close`]
//! - `Closed` is terminal

use std::fmt;

use log::debug;

use crate::engine::graph::{AudioGraph, Time};
use crate::error::{LoopLabError, Result};

/// Lifecycle state of an [`AudioSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Created, waiting for the first gesture (default state)
    #[default]
    Uninitialized,
    /// Graph available for scheduling
    Ready,
    /// Shut down; no further scheduling
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Uninitialized => write!(f, "Uninitialized"),
            SessionState::Ready => write!(f, "Ready"),
            SessionState::Closed => write!(f, "Closed"),
        }
    }
}

/// Owns the audio graph shared by every controller of a demo
///
/// # Example
/// ```
/// use looplab::engine::{AudioSession, OfflineGraph, SessionState};
///
/// let mut session = AudioSession::new(OfflineGraph::new(48000));
/// assert!(session.graph_mut().is_err());
///
/// session.activate().unwrap();
/// assert_eq!(session.state(), SessionState::Ready);
/// assert!(session.graph_mut().is_ok());
/// ```
#[derive(Debug)]
pub struct AudioSession<G: AudioGraph> {
    state: SessionState,
    graph: G,
}

impl<G: AudioGraph> AudioSession<G> {
    /// Wrap a graph in an inactive session
    pub fn new(graph: G) -> Self {
        Self {
            state: SessionState::Uninitialized,
            graph,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Activate on the first gesture
    ///
    /// Activating a ready session does nothing; a closed session stays
    /// closed.
    pub fn activate(&mut self) -> Result<()> {
        match self.state {
            SessionState::Uninitialized => {
                self.state = SessionState::Ready;
                debug!(
                    "[SESSION] activated at {:.3}s ({} Hz)",
                    self.graph.current_time(),
                    self.graph.sample_rate()
                );
                Ok(())
            }
            SessionState::Ready => Ok(()),
            SessionState::Closed => Err(LoopLabError::SessionClosed),
        }
    }

    /// Shut the session down
    pub fn close(&mut self) {
        if self.state != SessionState::Closed {
            debug!("[SESSION] closed from {}", self.state);
        }
        self.state = SessionState::Closed;
    }

    /// Graph clock, available once ready
    pub fn current_time(&self) -> Result<Time> {
        self.graph().map(|g| g.current_time())
    }

    /// Shared access to the graph
    pub fn graph(&self) -> Result<&G> {
        self.check_ready()?;
        Ok(&self.graph)
    }

    /// Mutable access to the graph for scheduling
    pub fn graph_mut(&mut self) -> Result<&mut G> {
        self.check_ready()?;
        Ok(&mut self.graph)
    }

    /// Give the graph back, whatever the state
    pub fn into_graph(self) -> G {
        self.graph
    }

    fn check_ready(&self) -> Result<()> {
        match self.state {
            SessionState::Ready => Ok(()),
            SessionState::Uninitialized => Err(LoopLabError::SessionNotReady),
            SessionState::Closed => Err(LoopLabError::SessionClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::OfflineGraph;

    #[test]
    fn test_initial_state() {
        let session = AudioSession::new(OfflineGraph::new(48000));
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert!(!session.is_ready());
        assert_eq!(
            session.current_time().unwrap_err().error_code(),
            "SESSION_NOT_READY"
        );
    }

    #[test]
    fn test_activate_is_idempotent() {
        let mut session = AudioSession::new(OfflineGraph::new(48000));
        session.activate().unwrap();
        session.activate().unwrap();
        assert!(session.is_ready());
        assert_eq!(session.current_time().unwrap(), 0.0);
    }

    #[test]
    fn test_close_is_terminal() {
        let mut session = AudioSession::new(OfflineGraph::new(48000));
        session.activate().unwrap();
        session.close();
        session.close();

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.graph_mut().unwrap_err().error_code(), "SESSION_CLOSED");
        assert!(session.activate().is_err());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Uninitialized.to_string(), "Uninitialized");
        assert_eq!(SessionState::Ready.to_string(), "Ready");
        assert_eq!(SessionState::Closed.to_string(), "Closed");
    }
}
