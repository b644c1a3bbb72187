//! The subordinate server process.
//!
//! [`ServerProcess`] is the narrow view the client needs: a label for logs,
//! a liveness check and a way to kill it. The stdio pipes are handed over
//! separately as [`ProcessStreams`] because each one is moved into the thread
//! that owns it.

use std::io::{self, Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};

use shuttle_config::ServerConfig;
use tracing::debug;

use crate::errors::ClientError;

/// Log target for process management.
const PROCESS_TARGET: &str = "shuttle_rpc::process";

/// A running language server as seen by the client.
pub trait ServerProcess: Send + Sync {
    /// Identifies the process in logs, typically the invoked command.
    fn label(&self) -> &str;

    /// Returns `false` once the process has exited or was killed.
    fn is_alive(&self) -> bool;

    /// Forcibly terminates the process.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the process cannot be signalled.
    fn kill(&self) -> io::Result<()>;
}

/// The three stdio channels of a server process.
pub struct ProcessStreams {
    /// Where requests and notifications are written.
    pub stdin: Box<dyn Write + Send>,
    /// Framed protocol messages from the server.
    pub stdout: Box<dyn Read + Send>,
    /// Free-form diagnostic text from the server.
    pub stderr: Box<dyn Read + Send>,
}

/// A [`ServerProcess`] backed by [`std::process::Child`].
pub struct ChildProcess {
    label: String,
    child: Mutex<Child>,
}

impl ChildProcess {
    /// Spawns the server described by `config` with all three pipes captured.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::EmptyCommand`] when the entry has no command,
    /// [`ClientError::BinaryNotFound`] when the executable does not exist and
    /// [`ClientError::SpawnFailed`] for any other spawn failure.
    pub fn spawn(config: &ServerConfig) -> Result<(Arc<Self>, ProcessStreams), ClientError> {
        let program = config.program().ok_or_else(|| ClientError::EmptyCommand {
            name: config.name.clone(),
        })?;

        debug!(
            target: PROCESS_TARGET,
            client = %config.name,
            command = program,
            args = ?config.args(),
            "spawning language server process"
        );

        let mut command = Command::new(program);
        command
            .args(config.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ClientError::BinaryNotFound {
                    command: program.to_owned(),
                    source: Arc::new(e),
                }
            } else {
                ClientError::SpawnFailed {
                    message: format!("failed to start {program}"),
                    source: Arc::new(e),
                }
            }
        })?;

        Self::from_child(program, child)
    }

    /// Adopts an already spawned child whose stdio pipes are still attached.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::SpawnFailed`] if any pipe was not captured.
    pub fn from_child(
        label: impl Into<String>,
        mut child: Child,
    ) -> Result<(Arc<Self>, ProcessStreams), ClientError> {
        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        let process = Self {
            label: label.into(),
            child: Mutex::new(child),
        };

        debug!(
            target: PROCESS_TARGET,
            label = %process.label,
            pid = process.id(),
            "language server process spawned"
        );

        let streams = ProcessStreams {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
        };
        Ok((Arc::new(process), streams))
    }

    /// Operating system identifier of the process.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.lock().id()
    }

    fn lock(&self) -> MutexGuard<'_, Child> {
        self.child
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl ServerProcess for ChildProcess {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_alive(&self) -> bool {
        matches!(self.lock().try_wait(), Ok(None))
    }

    fn kill(&self) -> io::Result<()> {
        let mut child = self.lock();
        if let Some(status) = child.try_wait()? {
            debug!(
                target: PROCESS_TARGET,
                label = %self.label,
                ?status,
                "language server already exited"
            );
            return Ok(());
        }
        child.kill()?;
        let status = child.wait()?;
        debug!(
            target: PROCESS_TARGET,
            label = %self.label,
            ?status,
            "language server killed"
        );
        Ok(())
    }
}

fn missing_pipe(name: &'static str) -> ClientError {
    ClientError::SpawnFailed {
        message: format!("failed to capture {name}"),
        source: Arc::new(io::Error::other(format!("no {name}"))),
    }
}
