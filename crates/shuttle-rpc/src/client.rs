//! The client facade.
//!
//! A [`Client`] is bound to one running server. Writes happen synchronously
//! on the caller's thread; everything the server sends is consumed by two
//! reader threads started together with the client.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use lsp_types::request::{ApplyWorkspaceEdit, Request};
use serde::Serialize;
use serde_json::{Map, Value};
use shuttle_config::{LogSwitches, ServerConfig};
use tracing::{debug, warn};

use crate::correlator::{Correlator, RequestFailure, ResponseHandler};
use crate::dispatch::{Dispatcher, NotificationHandler, RequestHandler};
use crate::errors::{ClientError, TransportError};
use crate::jsonrpc::{JsonRpcNotification, JsonRpcRequest, RequestId};
use crate::process::{ChildProcess, ProcessStreams, ServerProcess};
use crate::reader::{ReaderExit, run_diagnostic_loop, run_protocol_loop};
use crate::sinks::{ClientSinks, TracingSinks};
use crate::transport::write_message;

/// Log target for client operations.
const CLIENT_TARGET: &str = "shuttle_rpc::client";

/// State shared between the caller and the reader threads.
pub(crate) struct ClientShared {
    pub(crate) process: Arc<dyn ServerProcess>,
    pub(crate) correlator: Correlator,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) sinks: Arc<dyn ClientSinks>,
    pub(crate) switches: LogSwitches,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl ClientShared {
    fn lock_writer(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes one framed message to the server.
    pub(crate) fn send<T>(&self, payload: &T) -> Result<(), TransportError>
    where
        T: Serialize + ?Sized,
    {
        write_message(&mut *self.lock_writer(), payload)
    }
}

/// Capabilities advertised by the server.
///
/// Cloned handles share the same set, so an `initialize` response handler
/// running on the reader thread can store what the caller later queries.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    inner: Arc<RwLock<Map<String, Value>>>,
}

impl Capabilities {
    /// Replaces the whole set.
    pub fn set(&self, capabilities: Map<String, Value>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = capabilities;
    }

    /// Whether `name` was advertised.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// The descriptor advertised for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

/// How each reader thread ended, as returned by [`Client::join_readers`].
///
/// A field is `None` when the reader was already joined or panicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderExits {
    /// The stdout reader.
    pub protocol: Option<ReaderExit>,
    /// The stderr reader.
    pub diagnostic: Option<ReaderExit>,
}

#[derive(Default)]
struct ReaderThreads {
    protocol: Option<JoinHandle<ReaderExit>>,
    diagnostic: Option<JoinHandle<ReaderExit>>,
}

/// Configures routes and sinks before a client is started.
pub struct ClientBuilder {
    sinks: Arc<dyn ClientSinks>,
    switches: LogSwitches,
    project_path: Option<PathBuf>,
    routes: Dispatcher,
}

impl ClientBuilder {
    /// Creates a builder that logs everything through `tracing`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sinks: Arc::new(TracingSinks),
            switches: LogSwitches::default(),
            project_path: None,
            routes: Dispatcher::new(),
        }
    }

    /// Sets the sinks receiving diagnostics, messages and logs.
    #[must_use]
    pub fn sinks(mut self, sinks: Arc<dyn ClientSinks>) -> Self {
        self.sinks = sinks;
        self
    }

    /// Sets the switches gating server logs and stderr echo.
    #[must_use]
    pub fn switches(mut self, switches: LogSwitches) -> Self {
        self.switches = switches;
        self
    }

    /// Associates the client with a project root.
    #[must_use]
    pub fn project_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_path = Some(path.into());
        self
    }

    /// Routes a server request method to `handler`.
    #[must_use]
    pub fn on_request(
        mut self,
        method: impl Into<String>,
        handler: impl RequestHandler + 'static,
    ) -> Self {
        self.routes.on_request(method, handler);
        self
    }

    /// Routes `workspace/applyEdit` requests to `handler`.
    #[must_use]
    pub fn on_apply_edit(self, handler: impl RequestHandler + 'static) -> Self {
        self.on_request(ApplyWorkspaceEdit::METHOD, handler)
    }

    /// Routes a notification method to `handler`, overriding the standard
    /// route for that method if there is one.
    #[must_use]
    pub fn on_notification(
        mut self,
        method: impl Into<String>,
        handler: impl NotificationHandler + 'static,
    ) -> Self {
        self.routes.on_notification(method, handler);
        self
    }

    /// Handles server requests without a route.
    #[must_use]
    pub fn fallback_request(mut self, handler: impl RequestHandler + 'static) -> Self {
        self.routes.set_fallback_request(handler);
        self
    }

    /// Handles notifications without a route.
    #[must_use]
    pub fn fallback_notification(mut self, handler: impl NotificationHandler + 'static) -> Self {
        self.routes.set_fallback_notification(handler);
        self
    }

    /// Spawns the server described by `config` and starts a client for it.
    ///
    /// A configured project path becomes the server's working directory
    /// unless `config` already names one.
    ///
    /// # Errors
    ///
    /// Returns spawn failures from [`ChildProcess::spawn`] and any error of
    /// [`ClientBuilder::start`].
    pub fn spawn(self, config: &ServerConfig) -> Result<Client, ClientError> {
        let (process, streams) = match (&self.project_path, &config.working_dir) {
            (Some(project), None) => {
                ChildProcess::spawn(&config.clone().with_working_dir(project.clone()))?
            }
            _ => ChildProcess::spawn(config)?,
        };
        self.start(process, streams)
    }

    /// Starts a client bound to an already running process.
    ///
    /// Both reader threads are running when this returns.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ReaderSpawn`] if a reader thread cannot be
    /// started; the process is killed in that case.
    pub fn start(
        self,
        process: Arc<dyn ServerProcess>,
        streams: ProcessStreams,
    ) -> Result<Client, ClientError> {
        let ProcessStreams {
            stdin,
            stdout,
            stderr,
        } = streams;
        let label = process.label().to_owned();

        let mut dispatcher = Dispatcher::standard(&label, &self.sinks, self.switches);
        dispatcher.merge(self.routes);

        let shared = Arc::new(ClientShared {
            process,
            correlator: Correlator::new(),
            dispatcher,
            sinks: self.sinks,
            switches: self.switches,
            writer: Mutex::new(stdin),
        });

        let protocol = spawn_reader("protocol", &label, &shared, move |state| {
            run_protocol_loop(state, stdout)
        });
        let diagnostic = spawn_reader("stderr", &label, &shared, move |state| {
            run_diagnostic_loop(state, stderr)
        });
        let (protocol, diagnostic) = match (protocol, diagnostic) {
            (Ok(protocol), Ok(diagnostic)) => (protocol, diagnostic),
            (Err(error), _) | (_, Err(error)) => {
                if let Err(kill_error) = shared.process.kill() {
                    warn!(target: CLIENT_TARGET, label = %label, error = %kill_error, "failed to kill server");
                }
                return Err(error);
            }
        };

        debug!(target: CLIENT_TARGET, label = %label, "client started");

        Ok(Client {
            shared,
            capabilities: Capabilities::default(),
            project_path: self.project_path,
            readers: Mutex::new(ReaderThreads {
                protocol: Some(protocol),
                diagnostic: Some(diagnostic),
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_reader<F>(
    reader: &'static str,
    label: &str,
    shared: &Arc<ClientShared>,
    body: F,
) -> Result<JoinHandle<ReaderExit>, ClientError>
where
    F: FnOnce(&ClientShared) -> ReaderExit + Send + 'static,
{
    let state = Arc::clone(shared);
    thread::Builder::new()
        .name(format!("{label}-{reader}"))
        .spawn(move || body(&state))
        .map_err(|source| ClientError::ReaderSpawn {
            reader,
            source: Arc::new(source),
        })
}

/// A JSON-RPC client driving one language server over stdio.
///
/// # Example
///
/// ```ignore
/// use shuttle_config::ServerConfig;
/// use shuttle_rpc::ClientBuilder;
///
/// let client = ClientBuilder::new().spawn(&ServerConfig::new("ra", ["rust-analyzer"]))?;
/// let capabilities = client.capabilities();
/// client.send_request(
///     "initialize",
///     Some(serde_json::json!({ "capabilities": {} })),
///     Some(Box::new(move |outcome| {
///         if let Ok(result) = outcome {
///             if let Some(caps) = result.get("capabilities").and_then(|c| c.as_object()) {
///                 capabilities.set(caps.clone());
///             }
///         }
///     })),
/// )?;
/// ```
pub struct Client {
    shared: Arc<ClientShared>,
    capabilities: Capabilities,
    project_path: Option<PathBuf>,
    readers: Mutex<ReaderThreads>,
}

impl Client {
    /// Starts building a client.
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Sends a request and registers `handler` for its response.
    ///
    /// Ids are allocated under the write lock, so they reach the server in
    /// increasing order. Without a handler the response is dropped.
    ///
    /// The protocol reader answers server requests through the same write
    /// lock. While a caller blocks here on a full stdin pipe, the reader can
    /// block on that lock in turn and stop draining stdout. A server that
    /// refuses to read until its stdout is drained then deadlocks both sides.
    /// Keep request payloads modest or send them from a thread that can
    /// afford to wait. [`Client::kill`] does not need the write lock to stop
    /// the process, so it breaks such a stall.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ProcessExited`] if the server is gone and
    /// [`ClientError::Transport`] if the write fails. In both cases no
    /// handler stays registered.
    pub fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        handler: Option<ResponseHandler>,
    ) -> Result<RequestId, ClientError> {
        let label = self.label();
        let mut writer = self.shared.lock_writer();
        if !self.shared.process.is_alive() {
            return Err(ClientError::ProcessExited);
        }

        let id = self.shared.correlator.issue(handler);
        debug!(target: CLIENT_TARGET, label, id, method, "sending request");

        let request = JsonRpcRequest::with_id(id, method, params);
        if let Err(error) = write_message(&mut *writer, &request) {
            self.shared.correlator.deregister(id);
            warn!(
                target: CLIENT_TARGET,
                label,
                id,
                method,
                %error,
                "client unexpectedly died while sending request"
            );
            return Err(error.into());
        }
        Ok(id)
    }

    /// Sends a notification.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ProcessExited`] if the server is gone and
    /// [`ClientError::Transport`] if the write fails.
    pub fn send_notification(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), ClientError> {
        let label = self.label();
        let mut writer = self.shared.lock_writer();
        if !self.shared.process.is_alive() {
            return Err(ClientError::ProcessExited);
        }

        debug!(target: CLIENT_TARGET, label, method, "sending notification");

        let notification = JsonRpcNotification::new(method, params);
        write_message(&mut *writer, &notification).map_err(|error| {
            warn!(
                target: CLIENT_TARGET,
                label,
                method,
                %error,
                "client unexpectedly died while sending notification"
            );
            ClientError::from(error)
        })
    }

    /// Forcibly terminates the server.
    ///
    /// Pending response handlers are invoked with
    /// [`RequestFailure::Terminated`](crate::RequestFailure::Terminated) once
    /// the writer lock is released, so they may send again and see
    /// [`ClientError::ProcessExited`]. The
    /// reader threads are not joined; they notice the exit on their next
    /// liveness check or when their blocked read returns.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Kill`] if the process could not be killed.
    /// Pending handlers are released either way.
    pub fn kill(&self) -> Result<(), ClientError> {
        let label = self.label();
        debug!(target: CLIENT_TARGET, label, "killing language server");

        // Killing first unblocks a send stuck on a full stdin pipe. Draining
        // under the writer lock then waits out any send that passed its
        // liveness check before the kill, so its handler is swept too.
        let killed = self.shared.process.kill();
        let released = {
            let _writer = self.shared.lock_writer();
            self.shared.correlator.drain()
        };
        if !released.is_empty() {
            debug!(
                target: CLIENT_TARGET,
                label,
                cancelled = released.len(),
                "released pending requests"
            );
        }
        for handler in released {
            handler(Err(RequestFailure::Terminated));
        }
        killed.map_err(|error| ClientError::Kill(Arc::new(error)))
    }

    /// Waits for both reader threads to stop.
    ///
    /// Must not be called from a handler: handlers run on the protocol
    /// reader thread.
    pub fn join_readers(&self) -> ReaderExits {
        let threads = std::mem::take(
            &mut *self
                .readers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        ReaderExits {
            protocol: threads.protocol.and_then(|handle| handle.join().ok()),
            diagnostic: threads.diagnostic.and_then(|handle| handle.join().ok()),
        }
    }

    /// Replaces the advertised capabilities.
    pub fn set_capabilities(&self, capabilities: Map<String, Value>) {
        self.capabilities.set(capabilities);
    }

    /// Whether the server advertised `name`.
    #[must_use]
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.has(name)
    }

    /// The descriptor advertised for `name`.
    #[must_use]
    pub fn get_capability(&self, name: &str) -> Option<Value> {
        self.capabilities.get(name)
    }

    /// A shared handle on the capability set, usable from response handlers.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    /// The project root given at construction.
    #[must_use]
    pub fn project_path(&self) -> Option<&Path> {
        self.project_path.as_deref()
    }

    /// The server's label.
    #[must_use]
    pub fn label(&self) -> &str {
        self.shared.process.label()
    }

    /// Whether the server process is still running.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.shared.process.is_alive()
    }

    /// Number of requests still waiting for a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.shared.correlator.pending()
    }
}
