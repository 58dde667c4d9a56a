//! Blocking client for submitting commands and polling jobs.
//!
//! The protocol has no length prefix: a message ends when the sender stops
//! writing. The client therefore blocks until the first bytes of a response
//! arrive and then keeps reading until the stream stays quiet for the idle
//! window or the server closes it.

use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use prost::Message;
use tracing::debug;

use crate::commands::{Command, CommandResponse};
use crate::errors::{ClientError, CodecError};
use crate::wire::Execute;

const CLIENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::client");

/// Upper bound on establishing a connection.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);
/// Default wait for the first byte of a response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);
/// Default quiet period that ends a response.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(100);

const READ_CHUNK: usize = 64 * 1024;

/// Connection factory bound to one server address.
#[derive(Debug, Clone)]
pub struct Client {
    address: SocketAddr,
    response_timeout: Duration,
    idle_timeout: Duration,
}

impl Client {
    /// Creates a client for `address` with default timeouts.
    #[must_use]
    pub const fn new(address: SocketAddr) -> Self {
        Self {
            address,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Resolves `host:port` and creates a client for the first address.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Resolve`] when no address is found.
    pub fn resolve(host: &str, port: u16) -> Result<Self, ClientError> {
        let endpoint = format!("{host}:{port}");
        let address = (host, port)
            .to_socket_addrs()
            .and_then(|mut addrs| {
                addrs.next().ok_or_else(|| {
                    io::Error::new(ErrorKind::AddrNotAvailable, "no resolved addresses")
                })
            })
            .map_err(|source| ClientError::Resolve { endpoint, source })?;
        Ok(Self::new(address))
    }

    /// Overrides how long to wait for the first byte of a response.
    #[must_use]
    pub const fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Overrides the quiet period that ends a response.
    #[must_use]
    pub const fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Server address.
    #[must_use]
    pub const fn address(&self) -> SocketAddr {
        self.address
    }

    /// Opens a fresh connection.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connect`] when the server is unreachable.
    pub fn open(&self) -> Result<Session, ClientError> {
        let stream = TcpStream::connect_timeout(&self.address, CONNECTION_TIMEOUT).map_err(
            |source| ClientError::Connect {
                endpoint: self.address.to_string(),
                source,
            },
        )?;
        stream.set_nodelay(true)?;
        debug!(target: CLIENT_TARGET, address = %self.address, "connected");
        Ok(Session {
            stream,
            response_timeout: self.response_timeout,
            idle_timeout: self.idle_timeout,
        })
    }

    /// Submits a command on a new connection and returns the first response.
    ///
    /// For background jobs the first response is the pending acknowledgement
    /// carrying the job id.
    ///
    /// # Errors
    ///
    /// Propagates connection, timeout and parse failures.
    pub fn submit(
        &self,
        command: &Command,
        background: bool,
    ) -> Result<CommandResponse, ClientError> {
        let mut session = self.open()?;
        session.send(command, background)?;
        session.receive(command)
    }

    /// Polls an existing job on a new connection.
    ///
    /// `command` selects how the typed result is parsed.
    ///
    /// # Errors
    ///
    /// Propagates connection, timeout and parse failures.
    pub fn poll(&self, command: &Command, job_id: u64) -> Result<CommandResponse, ClientError> {
        let mut session = self.open()?;
        session.send_poll(job_id)?;
        session.receive(command)
    }
}

/// One open connection to the server.
#[derive(Debug)]
pub struct Session {
    stream: TcpStream,
    response_timeout: Duration,
    idle_timeout: Duration,
}

impl Session {
    /// Sends a command.
    ///
    /// # Errors
    ///
    /// Fails if the command cannot be encoded or written.
    pub fn send(&mut self, command: &Command, background: bool) -> Result<(), ClientError> {
        let bytes = command.serialize(background)?;
        self.send_raw(&bytes)
    }

    /// Sends a poll for `job_id`.
    ///
    /// # Errors
    ///
    /// Fails if the poll cannot be written.
    pub fn send_poll(&mut self, job_id: u64) -> Result<(), ClientError> {
        self.send_envelope(&Execute::poll(job_id))
    }

    /// Sends an arbitrary envelope.
    ///
    /// # Errors
    ///
    /// Fails if the envelope cannot be encoded or written.
    pub fn send_envelope(&mut self, envelope: &Execute) -> Result<(), ClientError> {
        let mut bytes = Vec::with_capacity(envelope.encoded_len());
        envelope
            .encode(&mut bytes)
            .map_err(|source| CodecError::Encode {
                what: "Execute",
                source,
            })?;
        self.send_raw(&bytes)
    }

    /// Writes one logical message.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] on a write failure.
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        self.stream.write_all(bytes)?;
        self.stream.flush()?;
        debug!(target: CLIENT_TARGET, bytes = bytes.len(), "sent message");
        Ok(())
    }

    /// Half-closes the connection after the last message, leaving the read
    /// side open for the reply.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] when the shutdown fails.
    pub fn close_write(&self) -> Result<(), ClientError> {
        self.stream.shutdown(Shutdown::Write)?;
        Ok(())
    }

    /// Receives and parses one response.
    ///
    /// # Errors
    ///
    /// Propagates timeout, closure and parse failures.
    pub fn receive(&mut self, command: &Command) -> Result<CommandResponse, ClientError> {
        let bytes = self.receive_raw()?;
        Ok(command.parse_response(&bytes)?)
    }

    /// Receives the bytes of one logical message.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Timeout`] when nothing arrives in time and
    /// [`ClientError::Closed`] when the server hangs up first.
    pub fn receive_raw(&mut self) -> Result<Vec<u8>, ClientError> {
        let mut message = Vec::new();
        let mut chunk = vec![0_u8; READ_CHUNK];

        self.stream.set_read_timeout(Some(self.response_timeout))?;
        match read_first(&mut self.stream, &mut chunk) {
            Ok(0) => return Err(ClientError::Closed),
            Ok(read) => message.extend_from_slice(chunk.get(..read).unwrap_or_default()),
            Err(error) if is_timeout(&error) => {
                return Err(ClientError::Timeout(self.response_timeout));
            }
            Err(error) => return Err(error.into()),
        }

        self.stream.set_read_timeout(Some(self.idle_timeout))?;
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(read) => message.extend_from_slice(chunk.get(..read).unwrap_or_default()),
                Err(error) if is_timeout(&error) => break,
                Err(error) if error.kind() == ErrorKind::Interrupted => {}
                Err(error) => return Err(error.into()),
            }
        }
        debug!(target: CLIENT_TARGET, bytes = message.len(), "received message");
        Ok(message)
    }

    /// Waits up to `wait` for the server to close the connection.
    ///
    /// Returns `false` when data arrives or the connection stays open.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] on an unexpected socket error.
    pub fn wait_for_close(&mut self, wait: Duration) -> Result<bool, ClientError> {
        self.stream.set_read_timeout(Some(wait))?;
        let mut byte = [0_u8; 1];
        match self.stream.read(&mut byte) {
            Ok(0) => Ok(true),
            Ok(_) => Ok(false),
            Err(error) if is_timeout(&error) => Ok(false),
            Err(error)
                if matches!(
                    error.kind(),
                    ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
                ) =>
            {
                Ok(true)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Closes the connection.
    pub fn close(self) {
        if let Err(error) = self.stream.shutdown(Shutdown::Both) {
            debug!(target: CLIENT_TARGET, %error, "shutdown failed");
        }
    }
}

/// Reads the opening bytes of a response, retrying interrupted reads.
fn read_first(reader: &mut impl Read, chunk: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(chunk) {
            Err(error) if error.kind() == ErrorKind::Interrupted => {}
            outcome => return outcome,
        }
    }
}

fn is_timeout(error: &io::Error) -> bool {
    matches!(error.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
