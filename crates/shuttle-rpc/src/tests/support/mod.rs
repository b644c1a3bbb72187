//! Shared fixtures and helpers for client tests.

mod fake_server;
mod recording_sinks;
mod world;

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use shuttle_config::LogSwitches;

use crate::client::{Client, ClientBuilder};
use crate::correlator::{RequestFailure, ResponseHandler};
use crate::sinks::ClientSinks;

pub use fake_server::{FAKE_LABEL, FailingWriter, FakeServer, SharedBuffer};
pub use recording_sinks::{RecordingSinks, SinkEvent};
pub use world::TestWorld;

/// How long [`eventually`] waits before giving up.
const PATIENCE: Duration = Duration::from_secs(5);

/// Polls `condition` until it holds or [`PATIENCE`] runs out.
pub fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + PATIENCE;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// A response outcome tagged with the request that produced it.
pub type Outcome = (String, Result<Value, RequestFailure>);

/// Outcomes collected by handlers built with [`Outcomes::handler`].
#[derive(Clone, Default)]
pub struct Outcomes {
    seen: Arc<Mutex<Vec<Outcome>>>,
}

impl Outcomes {
    /// A response handler recording its outcome under `tag`.
    pub fn handler(&self, tag: &str) -> Option<ResponseHandler> {
        let seen = Arc::clone(&self.seen);
        let tag = tag.to_owned();
        Some(Box::new(move |outcome: Result<Value, RequestFailure>| {
            seen.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((tag, outcome));
        }))
    }

    /// Snapshot of the outcomes so far.
    pub fn all(&self) -> Vec<Outcome> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The outcome recorded under `tag`.
    pub fn get(&self, tag: &str) -> Option<Result<Value, RequestFailure>> {
        self.all()
            .into_iter()
            .find(|(seen, _)| seen == tag)
            .map(|(_, outcome)| outcome)
    }

    /// Waits until `count` outcomes have arrived.
    pub fn wait_for(&self, count: usize) -> bool {
        eventually(|| self.all().len() >= count)
    }
}

/// A started client wired to a [`FakeServer`].
pub struct Harness {
    pub client: Client,
    pub server: Arc<FakeServer>,
    pub stdin: SharedBuffer,
    pub sinks: Arc<RecordingSinks>,
}

impl Harness {
    /// Starts a client with default switches and no extra routes.
    pub fn new() -> Self {
        Self::with(ClientBuilder::new())
    }

    /// Starts a client from `builder`, replacing its sinks with recording
    /// ones.
    pub fn with(builder: ClientBuilder) -> Self {
        let (server, streams, stdin) = FakeServer::launch();
        let sinks = Arc::new(RecordingSinks::default());
        let host_sinks: Arc<dyn ClientSinks> = sinks.clone();
        let client = builder
            .sinks(host_sinks)
            .start(server.clone(), streams)
            .expect("client failed to start");
        Self {
            client,
            server,
            stdin,
            sinks,
        }
    }

    /// Starts a client with the given switches.
    pub fn with_switches(switches: LogSwitches) -> Self {
        Self::with(ClientBuilder::new().switches(switches))
    }

    /// Waits until the client has written `count` frames.
    pub fn wait_for_written(&self, count: usize) -> Vec<Value> {
        assert!(
            eventually(|| self.stdin.messages().len() >= count),
            "expected {count} frames, got {:?}",
            self.stdin.messages()
        );
        self.stdin.messages()
    }

    /// Waits until the sinks have seen `event`.
    pub fn wait_for_sink(&self, event: &SinkEvent) {
        assert!(
            eventually(|| self.sinks.saw(event)),
            "expected {event:?}, got {:?}",
            self.sinks.events()
        );
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        drop(self.client.kill());
    }
}
