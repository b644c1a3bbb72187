//! Host-facing outputs of the client.
//!
//! The engine never shows dialogs or status messages itself; it hands text
//! and diagnostics to a [`ClientSinks`] implementation supplied by the host.

use serde_json::Value;
use tracing::{debug, info, warn};

/// Log target for server-originated output.
pub(crate) const SERVER_TARGET: &str = "shuttle_rpc::server";

/// Receivers for everything the server wants surfaced to the host.
pub trait ClientSinks: Send + Sync {
    /// Receives `textDocument/publishDiagnostics` params from `source`.
    fn diagnostics(&self, source: &str, params: Value);

    /// Receives a user-facing message (`window/showMessage` or an error
    /// reported by the server).
    fn show_message(&self, message: &str);

    /// Receives a `window/logMessage` line from `source`.
    fn server_log(&self, source: &str, message: &str);

    /// Receives one line the server wrote to stderr.
    fn stderr_line(&self, source: &str, line: &str) {
        self.server_log(source, line);
    }
}

/// Sinks that write everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSinks;

impl ClientSinks for TracingSinks {
    fn diagnostics(&self, source: &str, params: Value) {
        debug!(target: SERVER_TARGET, source, %params, "diagnostics published");
    }

    fn show_message(&self, message: &str) {
        warn!(target: SERVER_TARGET, message, "server message");
    }

    fn server_log(&self, source: &str, message: &str) {
        info!(target: SERVER_TARGET, source, message);
    }

    fn stderr_line(&self, source: &str, line: &str) {
        info!(target: SERVER_TARGET, source, stderr = line);
    }
}
