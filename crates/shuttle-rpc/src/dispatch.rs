//! Method routing for server-initiated messages.
//!
//! Notifications and server requests are looked up by method name. Unknown
//! methods go to an optional fallback; without one, notifications are dropped
//! and requests are answered with `MethodNotFound`.

use std::collections::HashMap;
use std::sync::Arc;

use lsp_types::notification::{LogMessage, Notification, PublishDiagnostics, ShowMessage};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shuttle_config::LogSwitches;
use tracing::debug;

use crate::errors::HandlerError;
use crate::jsonrpc::JsonRpcError;
use crate::sinks::ClientSinks;

/// Log target for dispatch decisions.
const DISPATCH_TARGET: &str = "shuttle_rpc::dispatch";

/// Handles one notification method.
pub trait NotificationHandler: Send + Sync {
    /// Consumes the notification.
    ///
    /// # Errors
    ///
    /// Failures are logged by the reader; they never stop it.
    fn handle(&self, method: &str, params: Option<Value>) -> Result<(), HandlerError>;
}

impl<F> NotificationHandler for F
where
    F: Fn(&str, Option<Value>) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, method: &str, params: Option<Value>) -> Result<(), HandlerError> {
        self(method, params)
    }
}

/// Answers one server request method.
pub trait RequestHandler: Send + Sync {
    /// Produces the result sent back to the server.
    ///
    /// # Errors
    ///
    /// The error object is sent back to the server as the reply.
    fn handle(&self, method: &str, params: Option<Value>) -> Result<Value, JsonRpcError>;
}

impl<F> RequestHandler for F
where
    F: Fn(&str, Option<Value>) -> Result<Value, JsonRpcError> + Send + Sync,
{
    fn handle(&self, method: &str, params: Option<Value>) -> Result<Value, JsonRpcError> {
        self(method, params)
    }
}

/// Method-name routes for inbound requests and notifications.
#[derive(Default, Clone)]
pub struct Dispatcher {
    requests: HashMap<String, Arc<dyn RequestHandler>>,
    notifications: HashMap<String, Arc<dyn NotificationHandler>>,
    fallback_request: Option<Arc<dyn RequestHandler>>,
    fallback_notification: Option<Arc<dyn NotificationHandler>>,
}

impl Dispatcher {
    /// Creates a dispatcher with no routes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a dispatcher with the standard notification routes.
    ///
    /// - `textDocument/publishDiagnostics` goes to [`ClientSinks::diagnostics`]
    /// - `window/showMessage` goes to [`ClientSinks::show_message`]
    /// - `window/logMessage` goes to [`ClientSinks::server_log`] when
    ///   `switches.server` is set
    #[must_use]
    pub fn standard(source: &str, sinks: &Arc<dyn ClientSinks>, switches: LogSwitches) -> Self {
        let mut dispatcher = Self::new();

        let diagnostics_sink = Arc::clone(sinks);
        let diagnostics_source = source.to_owned();
        dispatcher.on_notification(
            PublishDiagnostics::METHOD,
            move |_: &str, params: Option<Value>| -> Result<(), HandlerError> {
                diagnostics_sink.diagnostics(&diagnostics_source, params.unwrap_or(Value::Null));
                Ok(())
            },
        );

        let message_sink = Arc::clone(sinks);
        dispatcher.on_notification(
            ShowMessage::METHOD,
            move |method: &str, params: Option<Value>| -> Result<(), HandlerError> {
                let message = message_param(method, params.as_ref())?;
                message_sink.show_message(message);
                Ok(())
            },
        );

        let log_sink = Arc::clone(sinks);
        let log_source = source.to_owned();
        dispatcher.on_notification(
            LogMessage::METHOD,
            move |method: &str, params: Option<Value>| -> Result<(), HandlerError> {
                if !switches.server {
                    return Ok(());
                }
                let message = message_param(method, params.as_ref())?;
                log_sink.server_log(&log_source, message);
                Ok(())
            },
        );

        dispatcher
    }

    /// Routes `method` requests to `handler`, replacing any previous route.
    pub fn on_request(
        &mut self,
        method: impl Into<String>,
        handler: impl RequestHandler + 'static,
    ) -> &mut Self {
        self.requests.insert(method.into(), Arc::new(handler));
        self
    }

    /// Routes `method` notifications to `handler`, replacing any previous
    /// route.
    pub fn on_notification(
        &mut self,
        method: impl Into<String>,
        handler: impl NotificationHandler + 'static,
    ) -> &mut Self {
        self.notifications.insert(method.into(), Arc::new(handler));
        self
    }

    /// Handles requests no route matches.
    pub fn set_fallback_request(&mut self, handler: impl RequestHandler + 'static) -> &mut Self {
        self.fallback_request = Some(Arc::new(handler));
        self
    }

    /// Handles notifications no route matches.
    pub fn set_fallback_notification(
        &mut self,
        handler: impl NotificationHandler + 'static,
    ) -> &mut Self {
        self.fallback_notification = Some(Arc::new(handler));
        self
    }

    /// Copies every route and fallback of `other` over this dispatcher.
    pub fn merge(&mut self, other: Self) -> &mut Self {
        self.requests.extend(other.requests);
        self.notifications.extend(other.notifications);
        if other.fallback_request.is_some() {
            self.fallback_request = other.fallback_request;
        }
        if other.fallback_notification.is_some() {
            self.fallback_notification = other.fallback_notification;
        }
        self
    }

    /// Whether a request route exists for `method`.
    #[must_use]
    pub fn handles_request(&self, method: &str) -> bool {
        self.requests.contains_key(method)
    }

    /// Whether a notification route exists for `method`.
    #[must_use]
    pub fn handles_notification(&self, method: &str) -> bool {
        self.notifications.contains_key(method)
    }

    /// Routes a notification.
    ///
    /// # Errors
    ///
    /// Propagates the handler's failure.
    pub fn dispatch_notification(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), HandlerError> {
        match self
            .notifications
            .get(method)
            .or(self.fallback_notification.as_ref())
        {
            Some(handler) => handler.handle(method, params),
            None => {
                debug!(target: DISPATCH_TARGET, method, "unhandled notification");
                Ok(())
            }
        }
    }

    /// Routes a server request and returns the reply payload.
    ///
    /// # Errors
    ///
    /// Returns the handler's error, or `MethodNotFound` when nothing handles
    /// `method`.
    pub fn dispatch_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, JsonRpcError> {
        match self.requests.get(method).or(self.fallback_request.as_ref()) {
            Some(handler) => handler.handle(method, params),
            None => {
                debug!(target: DISPATCH_TARGET, method, "unhandled request");
                Err(JsonRpcError::method_not_found(method))
            }
        }
    }
}

/// Decodes the params of `method` into a typed value.
///
/// Absent params decode from `null`, so `Option` and unit targets accept
/// them.
///
/// # Errors
///
/// Returns [`HandlerError::InvalidParams`] if the params do not match `T`.
pub fn decode_params<T>(method: &str, params: Option<Value>) -> Result<T, HandlerError>
where
    T: DeserializeOwned,
{
    serde_json::from_value(params.unwrap_or(Value::Null)).map_err(|source| {
        HandlerError::InvalidParams {
            method: method.to_owned(),
            source: Arc::new(source),
        }
    })
}

fn message_param<'a>(method: &str, params: Option<&'a Value>) -> Result<&'a str, HandlerError> {
    params
        .and_then(|value| value.get("message"))
        .and_then(Value::as_str)
        .ok_or_else(|| HandlerError::MissingField {
            method: method.to_owned(),
            field: "message",
        })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Seen {
        Diagnostics(String, Value),
        Message(String),
        Log(String, String),
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Seen>>,
    }

    impl Recorder {
        fn take(&self) -> Vec<Seen> {
            std::mem::take(&mut *self.seen.lock().expect("recorder poisoned"))
        }

        fn push(&self, event: Seen) {
            self.seen.lock().expect("recorder poisoned").push(event);
        }
    }

    impl ClientSinks for Recorder {
        fn diagnostics(&self, source: &str, params: Value) {
            self.push(Seen::Diagnostics(source.to_owned(), params));
        }

        fn show_message(&self, message: &str) {
            self.push(Seen::Message(message.to_owned()));
        }

        fn server_log(&self, source: &str, message: &str) {
            self.push(Seen::Log(source.to_owned(), message.to_owned()));
        }
    }

    #[fixture]
    fn recorder() -> Arc<Recorder> {
        Arc::new(Recorder::default())
    }

    fn standard(recorder: &Arc<Recorder>, switches: LogSwitches) -> Dispatcher {
        let sinks: Arc<dyn ClientSinks> = Arc::clone(recorder) as Arc<dyn ClientSinks>;
        Dispatcher::standard("rust-analyzer", &sinks, switches)
    }

    #[rstest]
    fn routes_standard_notifications_to_sinks(recorder: Arc<Recorder>) {
        let dispatcher = standard(&recorder, LogSwitches::default());

        dispatcher
            .dispatch_notification(
                "textDocument/publishDiagnostics",
                Some(json!({"uri": "file:///a.rs", "diagnostics": []})),
            )
            .expect("diagnostics failed");
        dispatcher
            .dispatch_notification("window/showMessage", Some(json!({"type": 1, "message": "hello"})))
            .expect("show message failed");
        dispatcher
            .dispatch_notification("window/logMessage", Some(json!({"message": "hi"})))
            .expect("log message failed");

        assert_eq!(
            recorder.take(),
            vec![
                Seen::Diagnostics(
                    String::from("rust-analyzer"),
                    json!({"uri": "file:///a.rs", "diagnostics": []})
                ),
                Seen::Message(String::from("hello")),
                Seen::Log(String::from("rust-analyzer"), String::from("hi")),
            ]
        );
    }

    #[rstest]
    fn log_messages_respect_server_switch(recorder: Arc<Recorder>) {
        let switches = LogSwitches {
            server: false,
            ..LogSwitches::default()
        };
        let dispatcher = standard(&recorder, switches);

        dispatcher
            .dispatch_notification("window/logMessage", Some(json!({"message": "quiet"})))
            .expect("log message failed");

        assert!(recorder.take().is_empty());
    }

    #[rstest]
    fn show_message_without_text_is_a_handler_error(recorder: Arc<Recorder>) {
        let dispatcher = standard(&recorder, LogSwitches::default());

        let result = dispatcher.dispatch_notification("window/showMessage", Some(json!({})));

        assert!(matches!(
            result,
            Err(HandlerError::MissingField { field: "message", .. })
        ));
        assert!(recorder.take().is_empty());
    }

    #[rstest]
    fn unknown_notifications_are_dropped() {
        let dispatcher = Dispatcher::new();

        assert!(dispatcher.dispatch_notification("$/progress", None).is_ok());
    }

    #[rstest]
    fn unknown_requests_are_method_not_found() {
        let dispatcher = Dispatcher::new();

        let result = dispatcher.dispatch_request("workspace/configuration", None);

        assert_eq!(
            result.map_err(|error| error.code),
            Err(crate::jsonrpc::METHOD_NOT_FOUND)
        );
    }

    #[rstest]
    fn fallbacks_receive_the_method_name() {
        let mut dispatcher = Dispatcher::new();
        dispatcher
            .set_fallback_request(|method: &str, _: Option<Value>| -> Result<Value, JsonRpcError> {
                Ok(json!({ "echo": method }))
            })
            .set_fallback_notification(|method: &str, _: Option<Value>| -> Result<(), HandlerError> {
                Err(HandlerError::Failed(format!("refused {method}")))
            });

        assert_eq!(
            dispatcher.dispatch_request("custom/ping", None),
            Ok(json!({"echo": "custom/ping"}))
        );
        assert!(matches!(
            dispatcher.dispatch_notification("custom/event", None),
            Err(HandlerError::Failed(message)) if message == "refused custom/event"
        ));
    }

    #[rstest]
    fn merged_routes_override_standard_ones(recorder: Arc<Recorder>) {
        let mut custom = Dispatcher::new();
        custom
            .on_notification(
                "window/showMessage",
                |_: &str, _: Option<Value>| -> Result<(), HandlerError> { Ok(()) },
            )
            .on_request("workspace/applyEdit", |_: &str, _: Option<Value>| -> Result<Value, JsonRpcError> {
                Ok(json!({"applied": true}))
            });
        let mut dispatcher = standard(&recorder, LogSwitches::default());
        dispatcher.merge(custom);

        dispatcher
            .dispatch_notification("window/showMessage", Some(json!({"message": "hidden"})))
            .expect("show message failed");

        assert!(recorder.take().is_empty());
        assert!(dispatcher.handles_request("workspace/applyEdit"));
        assert!(dispatcher.handles_notification("window/logMessage"));
    }

    #[rstest]
    fn decode_params_reads_typed_params() {
        let params: lsp_types::ShowMessageParams = decode_params(
            "window/showMessage",
            Some(json!({"type": 2, "message": "low disk"})),
        )
        .expect("params rejected");

        assert_eq!(params.message, "low disk");
        assert_eq!(params.typ, lsp_types::MessageType::WARNING);
    }

    #[rstest]
    #[case::wrong_shape(Some(json!({"type": "loud"})))]
    #[case::absent(None)]
    fn decode_params_rejects_mismatched_params(#[case] params: Option<Value>) {
        let result: Result<lsp_types::ShowMessageParams, _> =
            decode_params("window/showMessage", params);

        assert!(matches!(
            result,
            Err(HandlerError::InvalidParams { ref method, .. }) if method == "window/showMessage"
        ));
    }
}
