//! A scripted server process backed by in-memory pipes.

use std::io::{self, Cursor, PipeReader, PipeWriter, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::process::{ProcessStreams, ServerProcess};
use crate::transport::{Frame, MessageReader, encode};

/// Label reported by every fake server.
pub const FAKE_LABEL: &str = "fake-ls";

/// Plays the server side of the conversation.
///
/// Killing the fake closes both output pipes so blocked readers wake up.
pub struct FakeServer {
    alive: AtomicBool,
    stdout: Mutex<Option<PipeWriter>>,
    stderr: Mutex<Option<PipeWriter>>,
    stdout_waiting: Arc<AtomicBool>,
    stderr_waiting: Arc<AtomicBool>,
}

impl FakeServer {
    /// Starts a fake whose stdin is recorded in the returned buffer.
    pub fn launch() -> (Arc<Self>, ProcessStreams, SharedBuffer) {
        let stdin = SharedBuffer::default();
        let (server, streams) = Self::launch_with_stdin(Box::new(stdin.clone()));
        (server, streams, stdin)
    }

    /// Starts a fake whose stdin is `stdin`.
    pub fn launch_with_stdin(stdin: Box<dyn Write + Send>) -> (Arc<Self>, ProcessStreams) {
        let (stdout_reader, stdout_writer) = io::pipe().expect("stdout pipe");
        let (stderr_reader, stderr_writer) = io::pipe().expect("stderr pipe");
        let stdout = WatchedReader::new(stdout_reader);
        let stderr = WatchedReader::new(stderr_reader);
        let server = Arc::new(Self {
            alive: AtomicBool::new(true),
            stdout: Mutex::new(Some(stdout_writer)),
            stderr: Mutex::new(Some(stderr_writer)),
            stdout_waiting: Arc::clone(&stdout.waiting),
            stderr_waiting: Arc::clone(&stderr.waiting),
        });
        let streams = ProcessStreams {
            stdin,
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
        };
        (server, streams)
    }

    /// Sends one framed message to the client.
    pub fn emit(&self, payload: &Value) {
        let frame = encode(payload).expect("encode frame");
        self.emit_raw(&frame);
    }

    /// Sends raw bytes on stdout.
    pub fn emit_raw(&self, bytes: &[u8]) {
        write_to(&self.stdout, bytes);
    }

    /// Writes text on stderr.
    pub fn emit_stderr(&self, text: &str) {
        write_to(&self.stderr, text.as_bytes());
    }

    /// Reports the process as exited while leaving the pipes open.
    pub fn mark_exited(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Whether both reader threads are blocked reading an output pipe.
    ///
    /// A blocked reader has already passed its liveness check, so closing
    /// the pipes now ends it with end of stream.
    pub fn readers_waiting(&self) -> bool {
        self.stdout_waiting.load(Ordering::SeqCst) && self.stderr_waiting.load(Ordering::SeqCst)
    }

    /// Closes both output pipes while still reporting the process alive.
    pub fn close_streams(&self) {
        take(&self.stdout);
        take(&self.stderr);
    }
}

impl ServerProcess for FakeServer {
    fn label(&self) -> &str {
        FAKE_LABEL
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn kill(&self) -> io::Result<()> {
        self.mark_exited();
        self.close_streams();
        Ok(())
    }
}

/// Flags while a read on the wrapped pipe is in progress.
struct WatchedReader {
    inner: PipeReader,
    waiting: Arc<AtomicBool>,
}

impl WatchedReader {
    fn new(inner: PipeReader) -> Self {
        Self {
            inner,
            waiting: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Read for WatchedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.waiting.store(true, Ordering::SeqCst);
        let read = self.inner.read(buf);
        self.waiting.store(false, Ordering::SeqCst);
        read
    }
}

/// Writes to a pipe whose reader may already have gone, as a dying
/// process would.
fn write_to(pipe: &Mutex<Option<PipeWriter>>, bytes: &[u8]) {
    let mut guard = pipe.lock().unwrap_or_else(PoisonError::into_inner);
    let writer = guard.as_mut().expect("pipe already closed");
    if let Err(error) = writer.write_all(bytes).and_then(|()| writer.flush()) {
        assert_eq!(error.kind(), io::ErrorKind::BrokenPipe, "write to pipe: {error}");
    }
}

fn take(pipe: &Mutex<Option<PipeWriter>>) {
    drop(pipe.lock().unwrap_or_else(PoisonError::into_inner).take());
}

/// Records everything the client writes to the server.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    /// Raw bytes written so far.
    pub fn bytes(&self) -> Vec<u8> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Decodes every complete frame written so far.
    pub fn messages(&self) -> Vec<Value> {
        let mut reader = MessageReader::new(Cursor::new(self.bytes()));
        let mut messages = Vec::new();
        while let Ok(frame) = reader.read_message() {
            if let Frame::Message(payload) = frame {
                messages.push(payload);
            }
        }
        messages
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A stdin whose every write fails as if the server closed it.
pub struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "server went away"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "server went away"))
    }
}
