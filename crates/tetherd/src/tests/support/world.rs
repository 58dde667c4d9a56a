//! BDD world owning a running server, its reporter and client sessions.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tether_config::IpFilter;
use tether_protocol::{Client, ClientError, Command, CommandResponse, Session};

use crate::bootstrap::{BootstrapError, ConfigLoader, Daemon, Runtime, bootstrap_with};

use super::config_loader::TestConfigLoader;
use super::reporter::{RecordingServerReporter, ServerEvent};
use super::rpc_handler::{Gate, StubDebugger};

const WAIT_TIMEOUT: Duration = Duration::from_secs(3);
const POLL_INTERVAL: Duration = Duration::from_millis(20);
const QUIET_PERIOD: Duration = Duration::from_millis(300);

/// Retries `check` until it holds or the wait expires.
pub fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(POLL_INTERVAL);
    }
    check()
}

/// Scenario world shared across BDD steps.
pub struct ServerWorld {
    pub reporter: Arc<RecordingServerReporter>,
    gate: Arc<Gate>,
    loader: Box<dyn ConfigLoader>,
    daemon: Option<Daemon>,
    bootstrap_error: Option<BootstrapError>,
    runtime: Option<Runtime>,
    sessions: Vec<Session>,
    last: Option<Result<CommandResponse, ClientError>>,
    job_id: Option<u64>,
}

impl ServerWorld {
    #[must_use]
    pub fn new() -> Self {
        Self {
            reporter: Arc::new(RecordingServerReporter::default()),
            gate: Gate::open(),
            loader: Box::new(TestConfigLoader),
            daemon: None,
            bootstrap_error: None,
            runtime: None,
            sessions: Vec::new(),
            last: None,
            job_id: None,
        }
    }

    /// Replaces the configuration loader used by [`Self::bootstrap`].
    pub fn use_loader(&mut self, loader: impl ConfigLoader + 'static) {
        self.loader = Box::new(loader);
        self.daemon = None;
        self.bootstrap_error = None;
    }

    /// Runs the bootstrap sequence once.
    pub fn bootstrap(&mut self) {
        if self.daemon.is_some() || self.bootstrap_error.is_some() {
            return;
        }
        match bootstrap_with(&*self.loader, self.reporter.clone()) {
            Ok(daemon) => self.daemon = Some(daemon),
            Err(error) => self.bootstrap_error = Some(error),
        }
    }

    #[must_use]
    pub fn bootstrap_error(&self) -> Option<&BootstrapError> {
        self.bootstrap_error.as_ref()
    }

    #[must_use]
    pub const fn daemon(&self) -> Option<&Daemon> {
        self.daemon.as_ref()
    }

    /// Bootstraps and starts the server threads.
    pub fn start(&mut self) {
        self.bootstrap();
        let daemon = self.daemon.take().expect("bootstrap should succeed");
        let runtime = daemon
            .start(Arc::new(StubDebugger::new(Arc::clone(&self.gate))))
            .expect("server should bind");
        self.runtime = Some(runtime);
    }

    fn runtime(&self) -> &Runtime {
        self.runtime.as_ref().expect("server should be running")
    }

    /// Holds structured requests until [`Self::resume_debugger`].
    pub fn pause_debugger(&self) {
        self.gate.set(false);
    }

    pub fn resume_debugger(&self) {
        self.gate.set(true);
    }

    fn closed_count(&self) -> usize {
        self.reporter
            .count(|event| matches!(event, ServerEvent::ClientClosed(_)))
    }

    /// Waits until the server has released more connections than `before`.
    fn await_release(&self, before: usize) {
        let released = eventually(|| self.closed_count() > before);
        assert!(released, "server never released the connection");
    }

    #[must_use]
    pub fn client(&self) -> Client {
        Client::new(self.runtime().local_addr())
            .with_response_timeout(WAIT_TIMEOUT)
            .with_idle_timeout(Duration::from_millis(50))
    }

    pub fn set_ip_filter(&self, address: &str) {
        let filter = IpFilter::parse(address).expect("filter should parse");
        self.runtime().set_ip_filter(filter.clone());
        assert_eq!(self.runtime().ip_filter(), filter);
    }

    /// Opens a connection and keeps it as the newest session.
    pub fn connect(&mut self) {
        let session = self.client().open().expect("connection should open");
        self.sessions.push(session);
    }

    fn newest(&mut self) -> &mut Session {
        self.sessions.last_mut().expect("a session should be open")
    }

    /// Sends `command` on the newest session and records the first reply.
    pub fn submit(&mut self, command: &Command, background: bool) {
        let session = self.newest();
        let outcome = session
            .send(command, background)
            .and_then(|()| session.receive(command));
        self.record(outcome);
    }

    /// Records the next reply arriving on the newest session.
    pub fn receive(&mut self, command: &Command) {
        let outcome = self.newest().receive(command);
        self.record(outcome);
    }

    /// Sends `command`, shuts down the write side, then records the reply.
    pub fn submit_half_closed(&mut self, command: &Command) {
        let session = self.newest();
        let outcome = session
            .send(command, false)
            .and_then(|()| session.close_write())
            .and_then(|()| session.receive(command));
        self.record(outcome);
    }

    /// Sends `command` on the newest session without reading anything back.
    pub fn send_only(&mut self, command: &Command) {
        self.newest()
            .send(command, false)
            .expect("request should be written");
    }

    /// Remembers the most recently allocated job as the one to poll.
    pub fn remember_newest_job(&mut self) {
        let newest = self.runtime().queue().last_id();
        assert!(newest >= 1, "no job was ever queued");
        self.job_id = Some(newest);
    }

    /// Sends raw bytes on the newest session and records the reply.
    pub fn submit_raw(&mut self, bytes: &[u8]) {
        let session = self.newest();
        let outcome = session
            .send_raw(bytes)
            .and_then(|()| session.receive_raw())
            .and_then(|reply| Ok(Command::GetMemoryMap.parse_response(&reply)?));
        self.record(outcome);
    }

    /// Polls the remembered job on a fresh connection, then hangs up and
    /// waits for the server to let go of it.
    pub fn poll(&mut self, command: &Command) {
        let job_id = self.job_id.expect("a job id should be known");
        let before = self.closed_count();
        let mut session = self.client().open().expect("connection should open");
        let outcome = session
            .send_poll(job_id)
            .and_then(|()| session.receive(command));
        session.close();
        self.await_release(before);
        self.record(outcome);
    }

    /// Polls until the remembered job stops reporting pending.
    pub fn poll_until_finished(&mut self, command: &Command) {
        let finished = eventually(|| {
            self.poll(command);
            self.last
                .as_ref()
                .is_some_and(|last| last.as_ref().is_ok_and(|reply| !reply.header.pending))
        });
        assert!(finished, "job never finished: {:?}", self.last);
    }

    fn record(&mut self, outcome: Result<CommandResponse, ClientError>) {
        if let Ok(response) = &outcome
            && let Some(job_id) = response.header.job_id
        {
            self.job_id = Some(job_id);
        }
        self.last = Some(outcome);
    }

    /// Closes the newest session and waits for the server to notice.
    pub fn disconnect(&mut self) {
        let before = self.closed_count();
        if let Some(session) = self.sessions.pop() {
            session.close();
            self.await_release(before);
        }
    }

    /// Whether the server closed session `index` (oldest first).
    pub fn closed_by_server(&mut self, index: usize) -> bool {
        let session = self.sessions.get_mut(index).expect("session should exist");
        session
            .wait_for_close(WAIT_TIMEOUT)
            .expect("reading the session should not fail")
    }

    /// Whether session `index` is still open after a short quiet period.
    pub fn stays_open(&mut self, index: usize) -> bool {
        let session = self.sessions.get_mut(index).expect("session should exist");
        !session
            .wait_for_close(QUIET_PERIOD)
            .expect("reading the session should not fail")
    }

    #[must_use]
    pub fn last_response(&self) -> &CommandResponse {
        match self.last.as_ref().expect("a reply should be recorded") {
            Ok(response) => response,
            Err(error) => panic!("request failed: {error}"),
        }
    }

    #[must_use]
    pub fn last_failed(&self) -> bool {
        self.last.as_ref().is_some_and(Result::is_err)
    }

    #[must_use]
    pub const fn job_id(&self) -> Option<u64> {
        self.job_id
    }

    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.runtime().queue().len()
    }

    #[must_use]
    pub fn queue_contains(&self, job_id: u64) -> bool {
        self.runtime().queue().contains(job_id)
    }
}

impl Default for ServerWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ServerWorld {
    fn drop(&mut self) {
        self.gate.set(true);
        for session in self.sessions.drain(..) {
            session.close();
        }
        if let Some(runtime) = self.runtime.take()
            && let Err(error) = runtime.shutdown()
            && !thread::panicking()
        {
            panic!("server should stop cleanly: {error}");
        }
    }
}
