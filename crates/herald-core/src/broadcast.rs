//! Synchronous fan-out of rendered messages to connected sessions.

use std::sync::Arc;

use crate::config::ConfigStore;
use crate::error::SessionError;
use crate::labels::{Segment, Style, StyledMessage, TextColor};
use crate::obs;

/// One connected participant that can display messages.
pub trait Session: Send + Sync {
    fn name(&self) -> String;

    fn send(&self, message: &StyledMessage) -> Result<(), SessionError>;
}

/// Source of the currently connected sessions.
pub trait SessionDirectory: Send + Sync {
    fn sessions(&self) -> Vec<Arc<dyn Session>>;
}

/// Sends messages to every session when local notifications are enabled.
pub struct LocalBroadcaster {
    config: Arc<ConfigStore>,
    sessions: Arc<dyn SessionDirectory>,
}

impl LocalBroadcaster {
    pub fn new(config: Arc<ConfigStore>, sessions: Arc<dyn SessionDirectory>) -> Self {
        Self { config, sessions }
    }

    /// Deliver `message` to every session. Returns how many accepted it.
    ///
    /// A session that fails is skipped; nothing propagates to the caller.
    pub fn broadcast(&self, message: &StyledMessage) -> usize {
        if !self.config.snapshot().local_enabled {
            return 0;
        }
        self.deliver(message)
    }

    /// Raise an operator notice through the same channel.
    pub fn notice(&self, text: &str) -> usize {
        let message = StyledMessage {
            segments: vec![
                Segment::styled(
                    "[Herald]",
                    Style {
                        color: TextColor::Yellow,
                        bold: true,
                    },
                ),
                Segment::plain(" "),
                Segment::plain(text),
            ],
        };
        self.broadcast(&message)
    }

    fn deliver(&self, message: &StyledMessage) -> usize {
        let mut delivered = 0;
        for session in self.sessions.sessions() {
            match session.send(message) {
                Ok(()) => delivered += 1,
                Err(e) => obs::emit_session_skipped(&session.name(), &e),
            }
        }
        delivered
    }
}
