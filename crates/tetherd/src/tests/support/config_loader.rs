//! Configuration loaders for scenarios covering success and failure paths.

use std::ffi::OsString;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use tether_config::Config;

use crate::bootstrap::ConfigLoader;

/// Tick period used by every test server.
const TEST_TICK_MS: u64 = 20;

fn loopback() -> Config {
    Config {
        listen_host: "127.0.0.1".to_owned(),
        port: 0,
        tick_interval_ms: TEST_TICK_MS,
        send_timeout_ms: 2_000,
        log_filter: "warn".to_owned(),
        ..Config::default()
    }
}

/// Loader binding an ephemeral loopback port with a fast tick.
#[derive(Debug, Default)]
pub struct TestConfigLoader;

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(loopback())
    }
}

/// Loader overriding the message cap and send bound of the loopback config.
#[derive(Debug, Clone, Copy)]
pub struct LimitsConfigLoader {
    pub max_message_bytes: usize,
    pub send_timeout_ms: u64,
}

impl Default for LimitsConfigLoader {
    fn default() -> Self {
        let config = loopback();
        Self {
            max_message_bytes: config.max_message_bytes,
            send_timeout_ms: config.send_timeout_ms,
        }
    }
}

impl ConfigLoader for LimitsConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            max_message_bytes: self.max_message_bytes,
            send_timeout_ms: self.send_timeout_ms,
            ..loopback()
        })
    }
}

/// Loader that fails by passing an unparsable port on the command line.
#[derive(Debug, Default)]
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("tetherd"),
            OsString::from("--port"),
            OsString::from("not-a-port"),
        ];
        Config::load_from_iter(args)
    }
}

/// Loader whose allow-filter is not an IPv4 address.
#[derive(Debug, Default)]
pub struct InvalidFilterLoader;

impl ConfigLoader for InvalidFilterLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            ip_filter: "ten.one.two.three".to_owned(),
            ..loopback()
        })
    }
}
