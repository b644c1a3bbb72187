//! Request id allocation and the pending response table.
//!
//! The counter and the table live behind one mutex: the caller's thread
//! issues ids and registers handlers while the protocol reader resolves them.
//! Handlers always run after the lock is released so they may send further
//! requests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;
use thiserror::Error;

use crate::jsonrpc::{JsonRpcError, RequestId};

/// Why a request produced no result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestFailure {
    /// The server answered with an error object.
    #[error("server returned error: {0}")]
    Server(JsonRpcError),
    /// The client was killed before a response arrived.
    #[error("client terminated before a response arrived")]
    Terminated,
}

/// Callback invoked once with the outcome of a request.
pub type ResponseHandler = Box<dyn FnOnce(Result<Value, RequestFailure>) + Send>;

/// Result of routing a response to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A handler was removed and invoked.
    Delivered,
    /// No handler was waiting for the id.
    NotFound {
        /// Whether the id was ever issued by this client.
        issued: bool,
    },
}

struct PendingTable {
    last_id: RequestId,
    handlers: HashMap<RequestId, ResponseHandler>,
}

/// Issues request ids and matches responses to their handlers.
pub struct Correlator {
    table: Mutex<PendingTable>,
}

impl Correlator {
    /// Creates an empty table whose first id is 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Mutex::new(PendingTable {
                last_id: 0,
                handlers: HashMap::new(),
            }),
        }
    }

    /// Allocates the next id.
    pub fn next_id(&self) -> RequestId {
        let mut table = self.lock();
        table.last_id += 1;
        table.last_id
    }

    /// Allocates an id and registers its handler under a single lock.
    ///
    /// Without a handler the id is still consumed; any response to it is
    /// dropped by [`Correlator::resolve`].
    pub fn issue(&self, handler: Option<ResponseHandler>) -> RequestId {
        let mut table = self.lock();
        table.last_id += 1;
        let id = table.last_id;
        if let Some(handler) = handler {
            table.handlers.insert(id, handler);
        }
        id
    }

    /// Registers a handler for an already allocated id.
    ///
    /// A previous handler for the same id is replaced.
    pub fn register(&self, id: RequestId, handler: ResponseHandler) {
        self.lock().handlers.insert(id, handler);
    }

    /// Removes a handler without invoking it.
    ///
    /// Returns whether a handler was registered.
    pub fn deregister(&self, id: RequestId) -> bool {
        self.lock().handlers.remove(&id).is_some()
    }

    /// Removes the handler for `id` and invokes it with `outcome`.
    pub fn resolve(&self, id: RequestId, outcome: Result<Value, RequestFailure>) -> Resolution {
        let (handler, last_id) = {
            let mut table = self.lock();
            (table.handlers.remove(&id), table.last_id)
        };

        match handler {
            Some(handler) => {
                handler(outcome);
                Resolution::Delivered
            }
            None => Resolution::NotFound {
                issued: (1..=last_id).contains(&id),
            },
        }
    }

    /// Drains every pending handler, invoking each with
    /// [`RequestFailure::Terminated`].
    ///
    /// Returns the number of handlers released.
    pub fn cancel_all(&self) -> usize {
        let drained = self.drain();
        let count = drained.len();
        for handler in drained {
            handler(Err(RequestFailure::Terminated));
        }
        count
    }

    /// Removes every pending handler without invoking it.
    ///
    /// The caller decides when to run them, typically once its own locks are
    /// released.
    #[must_use]
    pub fn drain(&self) -> Vec<ResponseHandler> {
        self.lock()
            .handlers
            .drain()
            .map(|(_, handler)| handler)
            .collect()
    }

    /// Number of handlers still waiting for a response.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().handlers.len()
    }

    fn lock(&self) -> MutexGuard<'_, PendingTable> {
        // A panicking handler never runs under the lock, so the table is
        // consistent even if the mutex was poisoned.
        self.table
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}
