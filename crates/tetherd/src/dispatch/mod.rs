//! Request intake and job execution.
//!
//! Intake runs on the network thread: it decodes each inbound `Execute`
//! envelope, answers polls straight from the queue, and queues new jobs. A
//! queued job raises the "command available" signal, which feeds the
//! executor thread's work channel. The executor runs the job through a
//! [`ScriptHost`] and stores the finished response back into the queue.

mod errors;
mod executor;
mod intake;
mod rpc;
mod script;
mod signal;

pub use self::errors::{ExecutorError, IntakeError, RpcError};
pub use self::executor::{
    Captured, ExecutionOutcome, Executor, ExecutorHandle, GENERIC_FAILURE, ScriptHost,
};
#[cfg(test)]
pub(crate) use self::executor::MockScriptHost;
pub use self::intake::{Intake, IntakeAction, error_response, pending_response};
#[cfg(test)]
pub(crate) use self::rpc::MockRpcHandler;
pub use self::rpc::{RpcHandler, UnsupportedRpcHandler};
pub use self::script::{RhaiScriptHost, rpc_entry_script};
#[cfg(test)]
pub(crate) use self::signal::MockCommandSignal;
pub use self::signal::{ChannelSignal, CommandSignal, work_channel};

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
