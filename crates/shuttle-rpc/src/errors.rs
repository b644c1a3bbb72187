//! Error types for the client engine.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::jsonrpc::JsonRpcError;

/// Errors raised by the client facade.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The language server binary was not found.
    #[error("language server binary not found: {command}")]
    BinaryNotFound {
        /// The command that was not found.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// Failed to spawn the language server process.
    #[error("failed to spawn language server process: {message}")]
    SpawnFailed {
        /// Description of the spawn failure.
        message: String,
        /// The underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The server configuration has no command to run.
    #[error("client '{name}' has an empty command")]
    EmptyCommand {
        /// Name of the configuration entry.
        name: String,
    },

    /// A reader thread could not be started.
    #[error("failed to start {reader} reader thread: {source}")]
    ReaderSpawn {
        /// Which reader failed to start.
        reader: &'static str,
        /// The underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// Writing to the server failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server process could not be killed.
    #[error("failed to kill language server process: {0}")]
    Kill(#[source] Arc<io::Error>),

    /// The server process is no longer running.
    #[error("language server process exited")]
    ProcessExited,
}

/// Framing and stream errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error during read or write.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The stream closed while a header or body was expected.
    #[error("connection closed")]
    EndOfStream,

    /// A `Content-Length` header carried a value that is not a length.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// A frame declared a body larger than the reader accepts.
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Declared body length.
        size: usize,
        /// Largest accepted body length.
        max: usize,
    },

    /// A header line ran past the accepted length without a line feed.
    #[error("header line longer than {max} bytes")]
    HeaderTooLong {
        /// Largest accepted header line.
        max: usize,
    },

    /// An outbound payload could not be serialised.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failures raised by notification and request handlers.
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    /// The params object lacks a field the handler needs.
    #[error("params of `{method}` are missing `{field}`")]
    MissingField {
        /// Method being handled.
        method: String,
        /// Name of the absent field.
        field: &'static str,
    },

    /// The params could not be decoded.
    #[error("invalid params for `{method}`: {source}")]
    InvalidParams {
        /// Method being handled.
        method: String,
        /// Decoding failure.
        #[source]
        source: Arc<serde_json::Error>,
    },

    /// Handler-specific failure.
    #[error("{0}")]
    Failed(String),
}

impl From<HandlerError> for JsonRpcError {
    fn from(error: HandlerError) -> Self {
        match error {
            HandlerError::MissingField { .. } | HandlerError::InvalidParams { .. } => {
                Self::invalid_params(error.to_string())
            }
            HandlerError::Failed(message) => Self::internal(message),
        }
    }
}

/// Failures while routing one inbound message.
///
/// These are logged by the protocol reader and never stop it.
#[derive(Debug, Error)]
pub(crate) enum DispatchError {
    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error("failed to reply to server request: {0}")]
    Reply(#[from] TransportError),
}
