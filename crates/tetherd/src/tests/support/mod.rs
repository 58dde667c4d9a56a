//! Test harness utilities shared by the behavioural suites.

mod config_loader;
mod reporter;
mod rpc_handler;
mod world;

pub use config_loader::{
    FailingConfigLoader, InvalidFilterLoader, LimitsConfigLoader, TestConfigLoader,
};
pub use reporter::{RecordingServerReporter, ServerEvent};
pub use rpc_handler::sample_regions;
pub use world::{ServerWorld, eventually};
