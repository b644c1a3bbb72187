//! BDD test world wrapping a client and its fake server.

use serde_json::Value;

use crate::reader::ReaderExit;

use super::{Harness, Outcomes};

/// Shared state exercised by BDD step implementations.
#[derive(Default)]
pub struct TestWorld {
    harness: Option<Harness>,
    /// Outcomes of requests sent by the steps.
    pub outcomes: Outcomes,
    /// Reader exits observed after joining.
    pub exits: Option<(Option<ReaderExit>, Option<ReaderExit>)>,
}

impl TestWorld {
    /// Starts a fresh client and fake server.
    pub fn start(&mut self) {
        self.harness = Some(Harness::new());
    }

    /// The running harness.
    pub fn harness(&self) -> &Harness {
        self.harness.as_ref().expect("no server started")
    }

    /// Sends a request whose outcome is recorded under `tag`.
    pub fn send(&self, method: &str, tag: &str, params: Option<Value>) {
        self.harness()
            .client
            .send_request(method, params, self.outcomes.handler(tag))
            .expect("send failed");
    }

    /// Joins the reader threads and records how they ended.
    pub fn join(&mut self) {
        let exits = self.harness().client.join_readers();
        self.exits = Some((exits.protocol, exits.diagnostic));
    }
}
