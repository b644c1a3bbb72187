//! JSON-RPC 2.0 message types and inbound classification.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Identifier assigned to every outbound request.
pub type RequestId = i64;

/// Protocol version written into every outbound message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Error code for a method the client does not implement.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Error code for server request params a handler could not use.
pub const INVALID_PARAMS: i64 = -32602;

/// Error code for a failure inside a client-side handler.
pub const INTERNAL_ERROR: i64 = -32603;

/// A JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    /// Protocol version, always "2.0".
    pub jsonrpc: &'static str,
    /// Unique request identifier.
    pub id: RequestId,
    /// The method to invoke.
    pub method: String,
    /// Optional parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Creates a new request with a specific ID.
    #[must_use]
    pub fn with_id(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 notification (no response expected).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    /// Protocol version, always "2.0".
    pub jsonrpc: &'static str,
    /// The method to invoke.
    pub method: String,
    /// Optional parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Creates a new notification.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 response sent back for a server-initiated request.
///
/// The id is echoed verbatim because servers may use strings.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Protocol version, always "2.0".
    pub jsonrpc: &'static str,
    /// Identifier of the server request being answered.
    pub id: Value,
    /// The result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Builds a response from a handler outcome.
    #[must_use]
    pub fn from_outcome(id: Value, outcome: Result<Value, JsonRpcError>) -> Self {
        let (result, error) = match outcome {
            Ok(result) => (Some(result), None),
            Err(error) => (None, Some(error)),
        };
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result,
            error,
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{message} (code: {code})")]
pub struct JsonRpcError {
    /// Error code.
    #[serde(default)]
    pub code: i64,
    /// Human-readable error message.
    #[serde(default)]
    pub message: String,
    /// Optional additional data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Creates an error without additional data.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Error returned for server requests nobody handles.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("unhandled method {method}"))
    }

    /// Error returned when a request carries params the handler rejects.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    /// Error returned when a request handler fails.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }

    /// Reads an error object, keeping non-object errors as their text.
    fn from_payload(value: Value) -> Self {
        match value {
            Value::Object(_) => serde_json::from_value(value.clone())
                .unwrap_or_else(|_| Self::new(0, value.to_string())),
            Value::String(message) => Self::new(0, message),
            other => Self::new(0, other.to_string()),
        }
    }
}

/// A decoded inbound payload sorted into exactly one shape.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    /// The payload carries an `error` member.
    Error {
        /// Identifier of the failed request, if the server sent one.
        id: Option<Value>,
        /// The reported error.
        error: JsonRpcError,
    },
    /// A request initiated by the server.
    ServerRequest {
        /// Identifier to echo in the reply.
        id: Value,
        /// Requested method.
        method: String,
        /// Optional parameters.
        params: Option<Value>,
    },
    /// A one-way message from the server.
    Notification {
        /// Notified method.
        method: String,
        /// Optional parameters.
        params: Option<Value>,
    },
    /// A successful reply to one of our requests.
    Response {
        /// Identifier of the request being answered.
        id: Value,
        /// The result, `null` when absent.
        result: Value,
    },
    /// Anything else, kept for logging.
    Unknown(Value),
}

impl IncomingMessage {
    /// Classifies a decoded payload.
    ///
    /// The checks run in a fixed order: `error`, then `method` with `id`,
    /// then `method` alone, then `id` alone. A `method` that is not a string
    /// makes the payload unknown.
    #[must_use]
    pub fn classify(payload: Value) -> Self {
        let Value::Object(mut fields) = payload else {
            return Self::Unknown(payload);
        };

        if let Some(error) = fields.remove("error") {
            return Self::Error {
                id: fields.remove("id"),
                error: JsonRpcError::from_payload(error),
            };
        }

        match fields.get("method").map(Value::is_string) {
            Some(true) => Self::classify_method(fields),
            Some(false) => Self::Unknown(Value::Object(fields)),
            None => match fields.remove("id") {
                Some(id) => Self::Response {
                    id,
                    result: fields.remove("result").unwrap_or(Value::Null),
                },
                None => Self::Unknown(Value::Object(fields)),
            },
        }
    }

    fn classify_method(mut fields: Map<String, Value>) -> Self {
        let method = match fields.remove("method") {
            Some(Value::String(method)) => method,
            _ => return Self::Unknown(Value::Object(fields)),
        };
        let params = fields.remove("params");
        match fields.remove("id") {
            Some(id) => Self::ServerRequest { id, method, params },
            None => Self::Notification { method, params },
        }
    }

    /// Method name for requests and notifications.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::ServerRequest { method, .. } | Self::Notification { method, .. } => Some(method),
            Self::Error { .. } | Self::Response { .. } | Self::Unknown(_) => None,
        }
    }
}

/// Reads a response id, accepting numbers and numeric strings.
#[must_use]
pub fn request_id_from(id: &Value) -> Option<RequestId> {
    match id {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
