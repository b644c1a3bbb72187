//! Header framing over byte streams.
//!
//! Every message is prefixed with its body length:
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <payload>
//! ```
//! Header lines may also end with a bare `\n`.

use std::io::{self, BufRead, BufReader, Read, Write};

use serde::Serialize;
use serde_json::Value;

use crate::errors::TransportError;

const CONTENT_LENGTH: &str = "content-length";

/// Largest body a frame may declare.
pub const MAX_CONTENT_LENGTH: usize = 64 * 1024 * 1024;

/// Largest header line, line feed included.
pub const MAX_HEADER_LINE: usize = 8 * 1024;

const HEADER_READ_LIMIT: u64 = MAX_HEADER_LINE as u64 + 1;

/// Serialises a payload and prefixes it with its `Content-Length` header.
///
/// # Errors
///
/// Returns [`TransportError::Encode`] if the payload cannot be serialised.
pub fn encode<T>(payload: &T) -> Result<Vec<u8>, TransportError>
where
    T: Serialize + ?Sized,
{
    let body = serde_json::to_vec(payload)?;
    let mut message = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    message.extend_from_slice(&body);
    Ok(message)
}

/// Encodes a payload, writes it in one call and flushes.
///
/// # Errors
///
/// Returns [`TransportError::Encode`] for serialisation failures and
/// [`TransportError::Io`] if the writer fails.
pub fn write_message<W, T>(writer: &mut W, payload: &T) -> Result<(), TransportError>
where
    W: Write + ?Sized,
    T: Serialize + ?Sized,
{
    let message = encode(payload)?;
    writer.write_all(&message)?;
    writer.flush()?;
    Ok(())
}

/// One unit read from the stream.
#[derive(Debug)]
pub enum Frame {
    /// A body that parsed as JSON.
    Message(Value),
    /// The header block declared no body.
    Empty,
    /// A body that is not JSON; the raw text is kept for logging.
    Malformed {
        /// The body decoded as UTF-8 (lossily).
        raw: String,
        /// Why parsing failed.
        error: serde_json::Error,
    },
}

/// Reads framed messages from a byte stream.
pub struct MessageReader<R> {
    reader: BufReader<R>,
    line: Vec<u8>,
}

impl<R: Read> MessageReader<R> {
    /// Wraps a readable stream.
    #[must_use]
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            line: Vec::new(),
        }
    }

    /// Reads the next frame (blocks until complete).
    ///
    /// A header block without `Content-Length`, or with a length of zero,
    /// yields [`Frame::Empty`] and no body is consumed.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::EndOfStream`] if the stream closes inside a
    /// frame, [`TransportError::InvalidHeader`] if the length is not a number,
    /// [`TransportError::FrameTooLarge`] if it exceeds
    /// [`MAX_CONTENT_LENGTH`], [`TransportError::HeaderTooLong`] for a header
    /// line past [`MAX_HEADER_LINE`] and [`TransportError::Io`] for any other
    /// read failure.
    pub fn read_message(&mut self) -> Result<Frame, TransportError> {
        let content_length = self.read_headers()?;
        if content_length == 0 {
            return Ok(Frame::Empty);
        }

        let mut body = vec![0u8; content_length];
        self.reader.read_exact(&mut body).map_err(eof_aware)?;

        match serde_json::from_slice(&body) {
            Ok(payload) => Ok(Frame::Message(payload)),
            Err(error) => Ok(Frame::Malformed {
                raw: String::from_utf8_lossy(&body).into_owned(),
                error,
            }),
        }
    }

    /// Reads headers up to the blank line and extracts the content length.
    fn read_headers(&mut self) -> Result<usize, TransportError> {
        let mut content_length = 0;

        loop {
            self.line.clear();
            let bytes_read = self
                .reader
                .by_ref()
                .take(HEADER_READ_LIMIT)
                .read_until(b'\n', &mut self.line)
                .map_err(eof_aware)?;
            if bytes_read == 0 {
                return Err(TransportError::EndOfStream);
            }
            if bytes_read > MAX_HEADER_LINE {
                return Err(TransportError::HeaderTooLong {
                    max: MAX_HEADER_LINE,
                });
            }

            let text = String::from_utf8_lossy(&self.line);
            let header = text.trim();
            if header.is_empty() {
                return Ok(content_length);
            }

            if let Some(length) = parse_content_length(header)? {
                content_length = length;
            }
            // Other headers (e.g. Content-Type) are ignored.
        }
    }
}

fn parse_content_length(header: &str) -> Result<Option<usize>, TransportError> {
    let Some((name, value)) = header.split_once(':') else {
        return Ok(None);
    };
    if !name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
        return Ok(None);
    }
    let length: usize = value
        .trim()
        .parse()
        .map_err(|_| TransportError::InvalidHeader(header.to_owned()))?;
    if length > MAX_CONTENT_LENGTH {
        return Err(TransportError::FrameTooLarge {
            size: length,
            max: MAX_CONTENT_LENGTH,
        });
    }
    Ok(Some(length))
}

fn eof_aware(error: io::Error) -> TransportError {
    if error.kind() == io::ErrorKind::UnexpectedEof {
        TransportError::EndOfStream
    } else {
        TransportError::Io(error)
    }
}
