//! Read-until-idle message framing.
//!
//! Peers send no length prefix. Everything that can be read without blocking
//! is accumulated, and the first read that would block ends the message.

use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use super::TransportError;

const READ_CHUNK: usize = 64 * 1024;
const SEND_BACKOFF: Duration = Duration::from_millis(1);

/// Outcome of draining a nonblocking source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReadEvent {
    /// A complete logical message.
    Message(Vec<u8>),
    /// Nothing was available.
    Idle,
    /// The peer closed its side. Bytes read before the close form a final
    /// message.
    Closed(Option<Vec<u8>>),
}

/// Per-connection accumulation buffer.
#[derive(Debug)]
pub(crate) struct Framer {
    peer: SocketAddr,
    buffer: Vec<u8>,
    chunk: Box<[u8]>,
    max_message_bytes: usize,
}

impl Framer {
    pub(crate) fn new(peer: SocketAddr, max_message_bytes: usize) -> Self {
        Self {
            peer,
            buffer: Vec::new(),
            chunk: vec![0_u8; READ_CHUNK].into_boxed_slice(),
            max_message_bytes,
        }
    }

    /// Reads until the source would block, closes, or fails.
    ///
    /// A message larger than the configured limit is an error and the
    /// partial buffer is discarded.
    pub(crate) fn drain(&mut self, source: &mut impl Read) -> Result<ReadEvent, TransportError> {
        loop {
            match source.read(&mut self.chunk) {
                Ok(0) => {
                    let trailing = (!self.buffer.is_empty()).then(|| self.take());
                    return Ok(ReadEvent::Closed(trailing));
                }
                Ok(read) => {
                    self.buffer
                        .extend_from_slice(self.chunk.get(..read).unwrap_or_default());
                    if self.buffer.len() > self.max_message_bytes {
                        self.buffer = Vec::new();
                        return Err(TransportError::MessageTooLarge {
                            peer: self.peer,
                            limit: self.max_message_bytes,
                        });
                    }
                }
                Err(error) if error.kind() == ErrorKind::WouldBlock => {
                    return Ok(if self.buffer.is_empty() {
                        ReadEvent::Idle
                    } else {
                        ReadEvent::Message(self.take())
                    });
                }
                Err(error) if error.kind() == ErrorKind::Interrupted => {}
                Err(error) => {
                    self.buffer.clear();
                    return Err(TransportError::Read {
                        peer: self.peer,
                        source: error,
                    });
                }
            }
        }
    }

    fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }
}

/// Writes all of `bytes` to a nonblocking sink within `timeout`.
pub(crate) fn send_all(
    sink: &mut impl Write,
    peer: SocketAddr,
    bytes: &[u8],
    timeout: Duration,
) -> Result<(), TransportError> {
    let deadline = Instant::now() + timeout;
    let mut remaining = bytes;
    while !remaining.is_empty() {
        match sink.write(remaining) {
            Ok(0) => {
                return Err(TransportError::Send {
                    peer,
                    source: io::Error::from(ErrorKind::WriteZero),
                });
            }
            Ok(written) => remaining = remaining.get(written..).unwrap_or_default(),
            Err(error) if error.kind() == ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return Err(TransportError::SendTimeout { peer, timeout });
                }
                thread::sleep(SEND_BACKOFF);
            }
            Err(error) if error.kind() == ErrorKind::Interrupted => {}
            Err(source) => return Err(TransportError::Send { peer, source }),
        }
    }
    match sink.flush() {
        Ok(()) => Ok(()),
        Err(source) => Err(TransportError::Send { peer, source }),
    }
}
