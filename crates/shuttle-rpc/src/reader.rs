//! Background readers for the server's stdout and stderr.
//!
//! Each reader runs on its own thread for the lifetime of the server and
//! stops on its own: the two loops share no shutdown signal. Both poll the
//! process liveness before every read.

use std::io::{BufRead, BufReader, Read};
use std::panic::{self, AssertUnwindSafe};

use lsp_types::notification::{LogMessage, Notification};
use serde_json::Value;
use tracing::{Level, debug, error, warn};

use crate::client::ClientShared;
use crate::correlator::{RequestFailure, Resolution};
use crate::errors::{DispatchError, TransportError};
use crate::jsonrpc::{IncomingMessage, JsonRpcResponse, request_id_from};
use crate::transport::{Frame, MessageReader};

/// Log target for reader threads.
const READER_TARGET: &str = "shuttle_rpc::reader";

/// Characters of each received payload included in debug logs.
const PREVIEW_CHARS: usize = 200;

/// Why a reader thread stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// The liveness check reported the process gone.
    ProcessExited,
    /// The stream closed.
    EndOfStream,
    /// A read or framing failure ended the loop.
    Failed,
}

/// Reads framed messages from stdout until the server goes away.
pub(crate) fn run_protocol_loop(shared: &ClientShared, stdout: Box<dyn Read + Send>) -> ReaderExit {
    let mut reader = MessageReader::new(stdout);
    let label = shared.process.label();

    let exit = loop {
        if !shared.process.is_alive() {
            break ReaderExit::ProcessExited;
        }

        match reader.read_message() {
            Ok(Frame::Message(payload)) => dispatch_payload(shared, payload),
            Ok(Frame::Empty) => {
                debug!(target: READER_TARGET, label, "skipping frame without body");
            }
            Ok(Frame::Malformed { raw, error }) => {
                warn!(
                    target: READER_TARGET,
                    label,
                    %error,
                    payload = %raw,
                    "received a non-JSON payload"
                );
            }
            Err(TransportError::EndOfStream) => break ReaderExit::EndOfStream,
            Err(error) => {
                warn!(
                    target: READER_TARGET,
                    label,
                    %error,
                    "protocol reader ending due to transport error"
                );
                if let Err(kill_error) = shared.process.kill() {
                    warn!(target: READER_TARGET, label, error = %kill_error, "failed to kill server");
                }
                break ReaderExit::Failed;
            }
        }
    };

    debug!(target: READER_TARGET, label, reason = ?exit, "protocol reader stopped");
    exit
}

/// Forwards stderr lines to the log sink until the server goes away.
pub(crate) fn run_diagnostic_loop(shared: &ClientShared, stderr: Box<dyn Read + Send>) -> ReaderExit {
    let mut reader = BufReader::new(stderr);
    let mut line = Vec::new();
    let label = shared.process.label();

    let exit = loop {
        if !shared.process.is_alive() {
            break ReaderExit::ProcessExited;
        }

        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break ReaderExit::EndOfStream,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                let trimmed = text.trim_end_matches(['\r', '\n']);
                if shared.switches.stderr && !trimmed.is_empty() {
                    shared.sinks.stderr_line(label, trimmed);
                }
            }
            Err(error) => {
                warn!(
                    target: READER_TARGET,
                    label,
                    %error,
                    "stderr reader ending due to exception"
                );
                break ReaderExit::Failed;
            }
        }
    };

    debug!(target: READER_TARGET, label, reason = ?exit, "stderr reader stopped");
    exit
}

/// Classifies and routes one payload, containing any failure to it.
fn dispatch_payload(shared: &ClientShared, payload: Value) {
    log_preview(shared.process.label(), &payload);

    let message = IncomingMessage::classify(payload);
    let method = message.method().map(str::to_owned);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| route(shared, message)));

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(error)) => warn!(
            target: READER_TARGET,
            label = shared.process.label(),
            method = method.as_deref(),
            %error,
            "error handling server message"
        ),
        Err(_) => error!(
            target: READER_TARGET,
            label = shared.process.label(),
            method = method.as_deref(),
            "handler panicked while handling server message"
        ),
    }
}

fn route(shared: &ClientShared, message: IncomingMessage) -> Result<(), DispatchError> {
    match message {
        IncomingMessage::Error { id, error } => {
            debug!(target: READER_TARGET, id = ?id, %error, "got error");
            shared.sinks.show_message(&error.message);
            if let Some(request_id) = id.as_ref().and_then(request_id_from) {
                let resolution = shared
                    .correlator
                    .resolve(request_id, Err(RequestFailure::Server(error)));
                if resolution != Resolution::Delivered {
                    debug!(target: READER_TARGET, id = request_id, "no handler for error response");
                }
            }
            Ok(())
        }
        IncomingMessage::ServerRequest { id, method, params } => {
            let outcome = shared.dispatcher.dispatch_request(&method, params);
            if let Err(error) = &outcome {
                debug!(
                    target: READER_TARGET,
                    method = %method,
                    %error,
                    "answering server request with error"
                );
            }
            shared.send(&JsonRpcResponse::from_outcome(id, outcome))?;
            Ok(())
        }
        IncomingMessage::Notification { method, params } => {
            shared.dispatcher.dispatch_notification(&method, params)?;
            Ok(())
        }
        IncomingMessage::Response { id, result } => {
            resolve_response(shared, &id, result);
            Ok(())
        }
        IncomingMessage::Unknown(payload) => {
            debug!(target: READER_TARGET, %payload, "unknown payload type");
            Ok(())
        }
    }
}

fn resolve_response(shared: &ClientShared, id: &Value, result: Value) {
    let Some(request_id) = request_id_from(id) else {
        warn!(target: READER_TARGET, %id, "response id is not a request id");
        return;
    };

    match shared.correlator.resolve(request_id, Ok(result)) {
        Resolution::Delivered => {}
        Resolution::NotFound { issued: true } => {
            debug!(target: READER_TARGET, id = request_id, "no handler waiting for response");
        }
        Resolution::NotFound { issued: false } => {
            warn!(target: READER_TARGET, id = request_id, "response for an id that was never issued");
        }
    }
}

fn log_preview(label: &str, payload: &Value) {
    if !tracing::enabled!(target: READER_TARGET, Level::DEBUG) {
        return;
    }
    if payload.get("method").and_then(Value::as_str) == Some(LogMessage::METHOD) {
        return;
    }
    let preview: String = payload.to_string().chars().take(PREVIEW_CHARS).collect();
    debug!(target: READER_TARGET, label, payload = %preview, "got json");
}
