use crate::logging::LogFormat;

/// Port the debugger side listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 3852;

/// Bind address used when none is configured.
pub const DEFAULT_LISTEN_HOST: &str = "0.0.0.0";

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Period of the event loop tick that checks for finished jobs.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;

/// Largest inbound message accepted before the connection is dropped.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024 * 1024;

/// Upper bound on a single outbound delivery.
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 30 * 60 * 1_000;

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Owned bind address used by serde.
#[must_use]
pub fn default_listen_host() -> String {
    DEFAULT_LISTEN_HOST.to_owned()
}

/// Preferred listening port.
#[must_use]
pub const fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Event loop tick period in milliseconds.
#[must_use]
pub const fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}

/// Inbound message cap in bytes.
#[must_use]
pub const fn default_max_message_bytes() -> usize {
    DEFAULT_MAX_MESSAGE_BYTES
}

/// Outbound delivery timeout in milliseconds.
#[must_use]
pub const fn default_send_timeout_ms() -> u64 {
    DEFAULT_SEND_TIMEOUT_MS
}
