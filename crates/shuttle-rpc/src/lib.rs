//! JSON-RPC client engine for language servers spoken to over stdio.
//!
//! A [`Client`] owns one server process. Requests and notifications are
//! written on the caller's thread with `Content-Length` framing. Two reader
//! threads consume the server's stdout and stderr: the first decodes frames,
//! matches responses to the handlers registered by
//! [`Client::send_request`] and routes server-initiated messages through a
//! [`Dispatcher`]; the second forwards stderr lines to the host's
//! [`ClientSinks`].
//!
//! The process itself sits behind the [`ServerProcess`] trait, so tests and
//! hosts can drive the engine over in-memory pipes without spawning a real
//! server.

mod client;
mod correlator;
mod dispatch;
mod errors;
mod jsonrpc;
mod process;
mod reader;
mod sinks;
pub mod telemetry;
pub mod transport;

pub use client::{Capabilities, Client, ClientBuilder, ReaderExits};
pub use correlator::{Correlator, RequestFailure, Resolution, ResponseHandler};
pub use dispatch::{Dispatcher, NotificationHandler, RequestHandler, decode_params};
pub use errors::{ClientError, HandlerError, TransportError};
pub use jsonrpc::{
    INTERNAL_ERROR, INVALID_PARAMS, IncomingMessage, JSONRPC_VERSION, JsonRpcError,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, METHOD_NOT_FOUND, RequestId,
    request_id_from,
};
pub use process::{ChildProcess, ProcessStreams, ServerProcess};
pub use reader::ReaderExit;
pub use sinks::{ClientSinks, TracingSinks};

#[cfg(test)]
mod tests;
