//! Single-client event loop.

use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use tether_config::IpFilter;

use super::framer::{Framer, ReadEvent, send_all};
use super::{LISTENER_TARGET, TransportError};
use crate::dispatch::{Intake, IntakeAction, error_response};
use crate::health::ServerReporter;
use crate::jobs::{Delivery, JobId, JobQueue};

const IDLE_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Timing and size limits of the loop.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LoopLimits {
    pub(crate) tick_interval: Duration,
    pub(crate) send_timeout: Duration,
    pub(crate) max_message_bytes: usize,
}

struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    framer: Framer,
    awaiting: Option<JobId>,
    read_closed: bool,
}

impl Connection {
    fn close(&self) {
        if let Err(error) = self.stream.shutdown(Shutdown::Both)
            && error.kind() != io::ErrorKind::NotConnected
        {
            debug!(
                target: LISTENER_TARGET,
                peer = %self.peer,
                error = %error,
                "socket shutdown failed"
            );
        }
    }
}

pub(crate) struct EventLoop<R> {
    listener: TcpListener,
    intake: Intake,
    queue: JobQueue,
    reporter: R,
    filter: Arc<RwLock<IpFilter>>,
    shutdown: Arc<AtomicBool>,
    limits: LoopLimits,
    client: Option<Connection>,
    last_accept_error: Option<io::ErrorKind>,
}

impl<R: ServerReporter> EventLoop<R> {
    pub(crate) fn new(
        listener: TcpListener,
        intake: Intake,
        queue: JobQueue,
        reporter: R,
        filter: Arc<RwLock<IpFilter>>,
        shutdown: Arc<AtomicBool>,
        limits: LoopLimits,
    ) -> Self {
        Self {
            listener,
            intake,
            queue,
            reporter,
            filter,
            shutdown,
            limits,
            client: None,
            last_accept_error: None,
        }
    }

    pub(crate) fn run(mut self) {
        info!(target: LISTENER_TARGET, "event loop active");
        let mut next_tick = Instant::now() + self.limits.tick_interval;
        while !self.shutdown.load(Ordering::SeqCst) {
            let accepted = self.accept();
            let serviced = self.service_client();
            let now = Instant::now();
            if now >= next_tick {
                self.tick();
                next_tick = now + self.limits.tick_interval;
            } else if !accepted && !serviced {
                thread::sleep(IDLE_BACKOFF.min(next_tick - now));
            }
        }
        self.close_client();
        info!(target: LISTENER_TARGET, "event loop stopped");
    }

    fn accept(&mut self) -> bool {
        match self.listener.accept() {
            Ok((stream, peer)) => {
                self.last_accept_error = None;
                self.adopt(stream, peer);
                true
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => false,
            Err(source) => {
                let kind = source.kind();
                if self.last_accept_error != Some(kind) {
                    self.reporter
                        .transport_error(&TransportError::Accept { source });
                }
                self.last_accept_error = Some(kind);
                thread::sleep(ERROR_BACKOFF);
                false
            }
        }
    }

    fn adopt(&mut self, stream: TcpStream, peer: SocketAddr) {
        let admitted = self
            .filter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .admits(peer.ip());
        if !admitted {
            self.reporter.client_rejected(peer);
            return;
        }
        if let Err(source) = stream
            .set_nonblocking(true)
            .and_then(|()| stream.set_nodelay(true))
        {
            self.reporter
                .transport_error(&TransportError::Configure { source });
            return;
        }
        if let Some(previous) = self.client.take() {
            self.reporter.client_replaced(previous.peer, peer);
            previous.close();
        }
        self.reporter.client_accepted(peer);
        self.client = Some(Connection {
            stream,
            peer,
            framer: Framer::new(peer, self.limits.max_message_bytes),
            awaiting: None,
            read_closed: false,
        });
    }

    fn service_client(&mut self) -> bool {
        let Some(client) = self.client.as_mut().filter(|client| !client.read_closed) else {
            return false;
        };
        match client.framer.drain(&mut client.stream) {
            Ok(ReadEvent::Idle) => false,
            Ok(ReadEvent::Message(message)) => {
                self.handle_message(&message);
                true
            }
            Ok(ReadEvent::Closed(Some(message))) => {
                client.read_closed = true;
                self.handle_message(&message);
                true
            }
            Ok(ReadEvent::Closed(None)) => {
                self.close_client();
                true
            }
            Err(error) => {
                self.reporter.transport_error(&error);
                self.close_client();
                true
            }
        }
    }

    fn handle_message(&mut self, message: &[u8]) {
        let Some(peer) = self.client.as_ref().map(|client| client.peer) else {
            return;
        };
        match self.intake.accept(message) {
            Ok(IntakeAction::Queued {
                job_id,
                background,
                ack,
            }) => {
                self.reporter.job_queued(job_id, background);
                if ack.is_none_or(|bytes| self.send(&bytes)) {
                    self.await_job(job_id);
                }
            }
            Ok(IntakeAction::Pending {
                job_id,
                reply,
                background,
            }) => {
                if self.send(&reply) {
                    if background {
                        self.await_job(job_id);
                    } else {
                        self.close_client();
                    }
                }
            }
            Ok(IntakeAction::Delivered(delivery)) => self.deliver(&delivery),
            Err(error) => {
                self.reporter.protocol_error(peer, &error);
                if self.send(&error_response(&error)) {
                    if let Some(job_id) = error.recorded_job() {
                        self.retire(job_id);
                    }
                    self.close_client();
                }
            }
        }
    }

    fn await_job(&mut self, job_id: JobId) {
        if let Some(client) = self.client.as_mut() {
            client.awaiting = Some(job_id);
        }
    }

    /// Delivers the result of the job the client waits for, if it finished.
    fn tick(&mut self) {
        let Some(job_id) = self.client.as_ref().and_then(|client| client.awaiting) else {
            return;
        };
        if !self.queue.contains(job_id) {
            debug!(target: LISTENER_TARGET, job_id, "awaited job is gone");
            self.close_client();
            return;
        }
        if let Some(delivery) = self.queue.peek_finished(job_id) {
            self.deliver(&delivery);
        }
    }

    /// Sends a finished result and retires it. A failed send leaves the job
    /// queued so a later poll can still collect it.
    fn deliver(&mut self, delivery: &Delivery) {
        if !self.send(&delivery.result) {
            return;
        }
        self.retire(delivery.job_id);
        self.reporter
            .job_delivered(delivery.job_id, delivery.background);
        let keep_open = delivery.background
            && self.client.as_ref().is_some_and(|client| !client.read_closed);
        if keep_open {
            self.await_job(delivery.job_id);
        } else {
            self.close_client();
        }
    }

    /// Acknowledges a result that reached the client.
    fn retire(&self, job_id: JobId) {
        if !self.queue.acknowledge(job_id) {
            debug!(target: LISTENER_TARGET, job_id, "delivered job already retired");
        }
    }

    /// Writes `bytes` to the client. On failure the error is reported, the
    /// client is dropped and `false` is returned.
    fn send(&mut self, bytes: &[u8]) -> bool {
        let Some(client) = self.client.as_mut() else {
            return false;
        };
        match send_all(
            &mut client.stream,
            client.peer,
            bytes,
            self.limits.send_timeout,
        ) {
            Ok(()) => true,
            Err(error) => {
                self.reporter.transport_error(&error);
                self.close_client();
                false
            }
        }
    }

    fn close_client(&mut self) {
        if let Some(client) = self.client.take() {
            client.close();
            self.reporter.client_closed(client.peer);
        }
    }
}
