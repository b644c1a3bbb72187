//! Sinks that remember what reached them.

use std::sync::{Mutex, PoisonError};

use serde_json::Value;

use crate::sinks::ClientSinks;

/// One call received by [`RecordingSinks`].
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    /// `diagnostics` was called.
    Diagnostics { source: String, params: Value },
    /// `show_message` was called.
    Message(String),
    /// `server_log` was called.
    Log { source: String, message: String },
    /// `stderr_line` was called.
    Stderr { source: String, line: String },
}

/// Collects sink calls in arrival order.
#[derive(Default)]
pub struct RecordingSinks {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSinks {
    /// Snapshot of the calls so far.
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether `event` has been recorded.
    pub fn saw(&self, event: &SinkEvent) -> bool {
        self.events().contains(event)
    }

    fn push(&self, event: SinkEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl ClientSinks for RecordingSinks {
    fn diagnostics(&self, source: &str, params: Value) {
        self.push(SinkEvent::Diagnostics {
            source: source.to_owned(),
            params,
        });
    }

    fn show_message(&self, message: &str) {
        self.push(SinkEvent::Message(message.to_owned()));
    }

    fn server_log(&self, source: &str, message: &str) {
        self.push(SinkEvent::Log {
            source: source.to_owned(),
            message: message.to_owned(),
        });
    }

    fn stderr_line(&self, source: &str, line: &str) {
        self.push(SinkEvent::Stderr {
            source: source.to_owned(),
            line: line.to_owned(),
        });
    }
}
