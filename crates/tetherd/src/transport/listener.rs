//! Listening socket with forward port scanning.

use std::io;
use std::net::{IpAddr, SocketAddr, TcpListener, ToSocketAddrs};

use tracing::debug;

use tether_config::ListenAddress;

use super::{LISTENER_TARGET, TransportError};

/// A bound, nonblocking listening socket.
#[derive(Debug)]
pub(crate) struct BoundListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    requested_port: u16,
}

impl BoundListener {
    /// Binds the preferred port, moving up one port at a time while the
    /// candidate is taken. Port 0 asks the OS for an ephemeral port.
    pub(crate) fn bind(address: &ListenAddress) -> Result<Self, TransportError> {
        let ip = resolve(address)?;
        let first = address.port();
        let mut port = first;
        loop {
            let candidate = SocketAddr::new(ip, port);
            match TcpListener::bind(candidate) {
                Ok(listener) => return Self::configure(listener, first),
                Err(error) if port != 0 && is_port_taken(&error) => {
                    debug!(
                        target: LISTENER_TARGET,
                        port,
                        error = %error,
                        "port unavailable, trying the next one"
                    );
                    port = port.checked_add(1).ok_or_else(|| TransportError::PortsExhausted {
                        host: address.host().to_owned(),
                        first,
                    })?;
                }
                Err(source) => {
                    return Err(TransportError::BindTcp {
                        addr: candidate,
                        source,
                    });
                }
            }
        }
    }

    fn configure(listener: TcpListener, requested_port: u16) -> Result<Self, TransportError> {
        listener
            .set_nonblocking(true)
            .map_err(|source| TransportError::Configure { source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TransportError::Configure { source })?;
        Ok(Self {
            listener,
            local_addr,
            requested_port,
        })
    }

    pub(crate) const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the bound port differs from the preferred one.
    pub(crate) const fn rebound(&self) -> bool {
        self.requested_port != 0 && self.requested_port != self.local_addr.port()
    }

    pub(crate) const fn requested_port(&self) -> u16 {
        self.requested_port
    }

    pub(crate) fn into_inner(self) -> TcpListener {
        self.listener
    }
}

fn resolve(address: &ListenAddress) -> Result<IpAddr, TransportError> {
    let host = address.host();
    let port = address.port();
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| TransportError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?;
    addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| TransportError::ResolveEmpty {
            host: host.to_owned(),
            port,
        })
}

fn is_port_taken(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::AddrInUse | io::ErrorKind::PermissionDenied
    )
}
