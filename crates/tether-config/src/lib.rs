//! Shared configuration for the tether debugger-side server.
//!
//! Configuration is layered by [`ortho_config`]: built-in defaults, then a
//! TOML file passed with `--config-path`, then `TETHER_*` environment
//! variables, then command-line flags. Later layers win.
//!
//! The same structure is read once at startup by `tetherd`. Fields that the
//! host may change while the server runs (the IP allow-filter) are copied into
//! runtime handles by the daemon rather than re-read from here.

mod defaults;
mod listen;
mod logging;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_LISTEN_HOST, DEFAULT_LOG_FILTER, DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_PORT,
    DEFAULT_SEND_TIMEOUT_MS, DEFAULT_TICK_INTERVAL_MS, default_listen_host, default_log_filter,
    default_log_filter_string, default_log_format, default_max_message_bytes, default_port,
    default_send_timeout_ms, default_tick_interval_ms,
};
pub use listen::{IpFilter, IpFilterParseError, ListenAddress};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved server configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, OrthoConfig)]
#[ortho_config(prefix = "TETHER")]
pub struct Config {
    /// Address the listening socket binds to.
    #[serde(default = "defaults::default_listen_host")]
    pub listen_host: String,
    /// Preferred listening port.
    #[serde(default = "defaults::default_port")]
    pub port: u16,
    /// IPv4 allow-filter. Empty admits every peer.
    #[serde(default)]
    pub ip_filter: String,
    /// Event loop tick period in milliseconds.
    #[serde(default = "defaults::default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Largest inbound message accepted, in bytes.
    #[serde(default = "defaults::default_max_message_bytes")]
    pub max_message_bytes: usize,
    /// Bound on a single outbound delivery, in milliseconds.
    #[serde(default = "defaults::default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Tracing filter expression.
    #[serde(default = "defaults::default_log_filter_string")]
    pub log_filter: String,
    /// Log output format.
    #[serde(default = "defaults::default_log_format")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_host: default_listen_host(),
            port: default_port(),
            ip_filter: String::new(),
            tick_interval_ms: default_tick_interval_ms(),
            max_message_bytes: default_max_message_bytes(),
            send_timeout_ms: default_send_timeout_ms(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Address the server should try to bind first.
    #[must_use]
    pub fn listen_address(&self) -> ListenAddress {
        ListenAddress::new(self.listen_host.clone(), self.port)
    }

    /// Parses the configured allow-filter.
    pub fn ip_filter(&self) -> Result<IpFilter, IpFilterParseError> {
        IpFilter::parse(&self.ip_filter)
    }

    /// Tick period of the event loop.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Timeout applied to each outbound delivery.
    #[must_use]
    pub const fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Maximum inbound message size in bytes.
    #[must_use]
    pub const fn max_message_bytes(&self) -> usize {
        self.max_message_bytes
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = Config::default();
        assert_eq!(config.listen_address(), ListenAddress::new("0.0.0.0", 3852));
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.send_timeout(), Duration::from_secs(30 * 60));
        assert_eq!(config.log_filter(), "info");
        assert_eq!(config.log_format(), LogFormat::Json);
        assert_eq!(config.ip_filter(), Ok(IpFilter::any()));
    }

    #[test]
    fn invalid_filter_surfaces_on_access() {
        let config = Config {
            ip_filter: "not-an-ip".to_owned(),
            ..Config::default()
        };
        assert!(config.ip_filter().is_err());
    }
}
