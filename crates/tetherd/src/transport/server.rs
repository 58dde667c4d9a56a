//! Server construction and its lifecycle handle.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use tracing::info;

use tether_config::{Config, IpFilter, IpFilterParseError, ListenAddress};

use super::event_loop::{EventLoop, LoopLimits};
use super::listener::BoundListener;
use super::{LISTENER_TARGET, TransportError};
use crate::dispatch::{CommandSignal, Intake};
use crate::health::ServerReporter;
use crate::jobs::JobQueue;

/// Settings the network thread runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Preferred bind address.
    pub listen: ListenAddress,
    /// Initial allow-filter. It can be replaced through [`ServerHandle`].
    pub ip_filter: IpFilter,
    /// Period of the result delivery check.
    pub tick_interval: Duration,
    /// Bound on one outbound delivery.
    pub send_timeout: Duration,
    /// Largest inbound message accepted.
    pub max_message_bytes: usize,
}

impl ServerSettings {
    /// Derives settings from resolved configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the configured allow-filter is malformed.
    pub fn from_config(config: &Config) -> Result<Self, IpFilterParseError> {
        Ok(Self {
            listen: config.listen_address(),
            ip_filter: config.ip_filter()?,
            tick_interval: config.tick_interval(),
            send_timeout: config.send_timeout(),
            max_message_bytes: config.max_message_bytes(),
        })
    }

    const fn limits(&self) -> LoopLimits {
        LoopLimits {
            tick_interval: self.tick_interval,
            send_timeout: self.send_timeout,
            max_message_bytes: self.max_message_bytes,
        }
    }
}

/// A bound server that has not started serving yet.
pub struct Server<R> {
    listener: BoundListener,
    settings: ServerSettings,
    queue: JobQueue,
    intake: Intake,
    reporter: R,
}

impl<R> Server<R>
where
    R: ServerReporter + 'static,
{
    /// Binds the listening socket.
    ///
    /// When the preferred port is taken the next free port is used and the
    /// reporter receives a port-rebound event.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when no port could be bound.
    pub fn bind(
        settings: ServerSettings,
        queue: JobQueue,
        signal: Arc<dyn CommandSignal>,
        reporter: R,
    ) -> Result<Self, TransportError> {
        let listener = BoundListener::bind(&settings.listen)?;
        if listener.rebound() {
            reporter.port_rebound(listener.requested_port(), listener.local_addr().port());
        }
        reporter.listening(listener.local_addr());
        let intake = Intake::new(queue.clone(), signal);
        Ok(Self {
            listener,
            settings,
            queue,
            intake,
            reporter,
        })
    }

    /// Address the server is listening on.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Starts the network thread.
    #[must_use]
    pub fn start(self) -> ServerHandle {
        let Self {
            listener,
            settings,
            queue,
            intake,
            reporter,
        } = self;
        let local_addr = listener.local_addr();
        let shutdown = Arc::new(AtomicBool::new(false));
        let filter = Arc::new(RwLock::new(settings.ip_filter.clone()));
        let event_loop = EventLoop::new(
            listener.into_inner(),
            intake,
            queue,
            reporter,
            Arc::clone(&filter),
            Arc::clone(&shutdown),
            settings.limits(),
        );
        let handle = thread::spawn(move || event_loop.run());
        ServerHandle {
            shutdown,
            filter,
            local_addr,
            handle: Some(handle),
        }
    }
}

/// Handle to the running network thread.
///
/// Dropping the handle stops the loop without waiting for it.
pub struct ServerHandle {
    shutdown: Arc<AtomicBool>,
    filter: Arc<RwLock<IpFilter>>,
    local_addr: SocketAddr,
    handle: Option<thread::JoinHandle<()>>,
}

impl ServerHandle {
    /// Address the server is listening on.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Replaces the allow-filter. Applies to connections accepted afterwards.
    pub fn set_ip_filter(&self, filter: IpFilter) {
        info!(target: LISTENER_TARGET, ip_filter = %filter, "allow-filter updated");
        *self.filter.write().unwrap_or_else(PoisonError::into_inner) = filter;
    }

    /// Current allow-filter.
    #[must_use]
    pub fn ip_filter(&self) -> IpFilter {
        self.filter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Asks the loop to exit after its current iteration.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Stops the loop and waits for the network thread to exit.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ThreadPanic`] if the thread panicked.
    pub fn join(mut self) -> Result<(), TransportError> {
        self.stop();
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| TransportError::ThreadPanic),
            None => Ok(()),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}
