//! Rhai script host.
//!
//! Each job runs in a fresh engine. `print` output is collected as the job's
//! standard output and `debug` output as its standard error. The JSON extern
//! object is bound as the constant `__extern__`.
//!
//! Host functions available to scripts:
//!
//! - `get_params(id)` returns the serialized structured request of a job.
//! - `set_binary_result(id, blob)` stores a typed result for a job.
//! - `set_error(id, text)` attaches error text to a job's response.
//! - `tether_version()` returns the protocol version string.
//! - `rpc_execute(id)` decodes a job's structured request, hands it to the
//!   [`RpcHandler`] and stores the typed result. Structured requests run
//!   through this function via [`rpc_entry_script`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use rhai::{Blob, Dynamic, Engine, EvalAltResult, Scope};

use tether_protocol::{Command, PROTOCOL_VERSION};

use super::executor::panic_reason;
use super::{Captured, ExecutionOutcome, RpcError, RpcHandler, ScriptHost};
use crate::jobs::{JobId, JobQueue, JobSnapshot};

const EXTERN_OBJECT: &str = "__extern__";

/// Source of the script synthesized for a structured request.
#[must_use]
pub fn rpc_entry_script(job_id: JobId) -> String {
    format!("rpc_execute({job_id});")
}

/// Runs Rhai scripts against the shared job queue.
pub struct RhaiScriptHost {
    queue: JobQueue,
    handler: Arc<dyn RpcHandler>,
}

impl RhaiScriptHost {
    /// Builds a host that routes structured requests to `handler`.
    #[must_use]
    pub fn new(queue: JobQueue, handler: Arc<dyn RpcHandler>) -> Self {
        Self { queue, handler }
    }

    fn engine(&self, std_out: &SharedBuffer, std_err: &SharedBuffer) -> Engine {
        let mut engine = Engine::new();

        let out = Arc::clone(std_out);
        engine.on_print(move |text| append_line(&out, text));
        let err = Arc::clone(std_err);
        engine.on_debug(move |text, _source, _position| append_line(&err, text));

        let params_source = self.queue.clone();
        engine.register_fn("get_params", move |id: i64| -> Result<Blob, Box<EvalAltResult>> {
            let job_id = job_id(id)?;
            params_source
                .params(job_id)
                .ok_or_else(|| script_error(RpcError::MissingJob(job_id)))
        });

        let result_sink = self.queue.clone();
        engine.register_fn(
            "set_binary_result",
            move |id: i64, blob: Blob| -> Result<(), Box<EvalAltResult>> {
                let job_id = job_id(id)?;
                if result_sink.set_binary_result(job_id, blob) {
                    Ok(())
                } else {
                    Err(script_error(RpcError::MissingJob(job_id)))
                }
            },
        );

        let error_sink = self.queue.clone();
        engine.register_fn(
            "set_error",
            move |id: i64, text: &str| -> Result<(), Box<EvalAltResult>> {
                let job_id = job_id(id)?;
                if error_sink.set_error(job_id, text) {
                    Ok(())
                } else {
                    Err(script_error(RpcError::MissingJob(job_id)))
                }
            },
        );

        engine.register_fn("tether_version", || PROTOCOL_VERSION.to_owned());

        let queue = self.queue.clone();
        let handler = Arc::clone(&self.handler);
        engine.register_fn("rpc_execute", move |id: i64| -> Result<(), Box<EvalAltResult>> {
            let job_id = job_id(id)?;
            execute_rpc(&queue, handler.as_ref(), job_id).map_err(|error| {
                if queue.set_error(job_id, error.to_string()) {
                    script_error(error)
                } else {
                    script_error(RpcError::MissingJob(job_id))
                }
            })
        });

        engine
    }
}

impl ScriptHost for RhaiScriptHost {
    fn run(&mut self, job: &JobSnapshot) -> ExecutionOutcome {
        let std_out = SharedBuffer::default();
        let std_err = SharedBuffer::default();
        let engine = self.engine(&std_out, &std_err);

        let mut scope = Scope::new();
        match extern_object(&job.extern_object) {
            Ok(value) => {
                scope.push_constant_dynamic(EXTERN_OBJECT, value);
            }
            Err(reason) => {
                return ExecutionOutcome::Failed {
                    captured: Captured {
                        std_out: String::new(),
                        std_err: format!("{reason}\n"),
                    },
                    reason,
                };
            }
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            engine.run_with_scope(&mut scope, &job.script)
        }));
        let mut captured = Captured {
            std_out: take(&std_out),
            std_err: take(&std_err),
        };
        match result {
            Ok(Ok(())) => ExecutionOutcome::Completed(captured),
            Ok(Err(error)) => {
                let reason = error.to_string();
                captured.std_err.push_str(&reason);
                captured.std_err.push('\n');
                ExecutionOutcome::Failed { captured, reason }
            }
            Err(payload) => ExecutionOutcome::Trapped {
                captured,
                reason: panic_reason(payload.as_ref()),
            },
        }
    }
}

type SharedBuffer = Arc<Mutex<String>>;

fn append_line(buffer: &SharedBuffer, text: &str) {
    let mut guard = buffer.lock().unwrap_or_else(PoisonError::into_inner);
    guard.push_str(text);
    guard.push('\n');
}

fn take(buffer: &SharedBuffer) -> String {
    std::mem::take(&mut *buffer.lock().unwrap_or_else(PoisonError::into_inner))
}

fn extern_object(bytes: &[u8]) -> Result<Dynamic, String> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Dynamic::UNIT);
    }
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|error| format!("invalid extern object: {error}"))?;
    rhai::serde::to_dynamic(value).map_err(|error| format!("invalid extern object: {error}"))
}

fn execute_rpc(queue: &JobQueue, handler: &dyn RpcHandler, job_id: JobId) -> Result<(), RpcError> {
    let params = queue.params(job_id).ok_or(RpcError::MissingJob(job_id))?;
    let command = Command::decode_request(&params)?;
    if let Some(result) = handler.handle(job_id, &command)? {
        if !queue.set_binary_result(job_id, result.encode()) {
            return Err(RpcError::MissingJob(job_id));
        }
    }
    Ok(())
}

fn job_id(id: i64) -> Result<JobId, Box<EvalAltResult>> {
    JobId::try_from(id).map_err(|_| Box::new(EvalAltResult::from(format!("invalid job id {id}"))))
}

fn script_error(error: RpcError) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::from(error.to_string()))
}

#[cfg(test)]
mod tests {
    use mockall::predicate::{always, eq};
    use prost::Message;
    use rstest::{fixture, rstest};

    use tether_protocol::wire::GetMemoryMapResult;
    use tether_protocol::{CommandResult, MemoryRegion};

    use super::*;
    use crate::dispatch::{MockRpcHandler, UnsupportedRpcHandler};
    use crate::jobs::Job;

    #[fixture]
    fn queue() -> JobQueue {
        JobQueue::new()
    }

    fn run(host: &mut RhaiScriptHost, queue: &JobQueue, job_id: JobId) -> ExecutionOutcome {
        let job = queue.snapshot(job_id).expect("job should be queued");
        host.run(&job)
    }

    fn script_job(queue: &JobQueue, script: &str, extern_object: &str) -> JobId {
        queue.push_with(|id| {
            Job::new(id, script, Vec::new(), false)
                .with_extern_object(extern_object.as_bytes().to_vec())
        })
    }

    fn rpc_job(queue: &JobQueue, command: &Command) -> JobId {
        let params = command
            .to_rpc_request()
            .map(|request| request.encode_to_vec())
            .expect("structured command");
        queue.push_with(|id| Job::new(id, rpc_entry_script(id), params, false))
    }

    #[rstest]
    fn print_and_debug_are_captured(queue: JobQueue) {
        let job_id = script_job(&queue, r#"print("hello"); debug("careful");"#, "");
        let mut host = RhaiScriptHost::new(queue.clone(), Arc::new(UnsupportedRpcHandler));

        let ExecutionOutcome::Completed(captured) = run(&mut host, &queue, job_id) else {
            panic!("script should complete");
        };
        assert_eq!(captured.std_out, "hello\n");
        assert!(captured.std_err.contains("careful"));
    }

    #[rstest]
    fn extern_object_is_bound_as_a_constant(queue: JobQueue) {
        let job_id = script_job(&queue, "print(__extern__.name);", r#"{"name":"kernel32"}"#);
        let mut host = RhaiScriptHost::new(queue.clone(), Arc::new(UnsupportedRpcHandler));

        let ExecutionOutcome::Completed(captured) = run(&mut host, &queue, job_id) else {
            panic!("script should complete");
        };
        assert_eq!(captured.std_out, "kernel32\n");
    }

    #[rstest]
    fn malformed_extern_object_fails_the_job(queue: JobQueue) {
        let job_id = script_job(&queue, "print(1);", "{not json");
        let mut host = RhaiScriptHost::new(queue.clone(), Arc::new(UnsupportedRpcHandler));

        assert!(matches!(
            run(&mut host, &queue, job_id),
            ExecutionOutcome::Failed { .. }
        ));
    }

    #[rstest]
    fn script_errors_keep_earlier_output(queue: JobQueue) {
        let job_id = script_job(&queue, r#"print("before"); throw "boom";"#, "");
        let mut host = RhaiScriptHost::new(queue.clone(), Arc::new(UnsupportedRpcHandler));

        let ExecutionOutcome::Failed { captured, reason } = run(&mut host, &queue, job_id) else {
            panic!("script should fail");
        };
        assert_eq!(captured.std_out, "before\n");
        assert!(reason.contains("boom"));
    }

    #[rstest]
    fn side_channel_functions_write_to_the_queue(queue: JobQueue) {
        let job_id = script_job(&queue, "", "");
        let script = format!(
            "let p = get_params({job_id}); set_binary_result({job_id}, blob(2, 7)); \
             set_error({job_id}, \"partial\"); print(tether_version());"
        );
        let scripted = queue.push_with(|id| Job::new(id, script, Vec::new(), false));
        let mut host = RhaiScriptHost::new(queue.clone(), Arc::new(UnsupportedRpcHandler));

        let ExecutionOutcome::Completed(captured) = run(&mut host, &queue, scripted) else {
            panic!("script should complete");
        };
        assert_eq!(captured.std_out.trim(), PROTOCOL_VERSION);
        let side = queue.side_channel(job_id).expect("target job exists");
        assert_eq!(side.binary_result, vec![7, 7]);
        assert_eq!(side.error.as_deref(), Some("partial"));
    }

    #[rstest]
    fn rpc_entry_routes_to_the_handler(queue: JobQueue) {
        let regions = vec![
            MemoryRegion {
                base: 0x1000,
                size: 0x1000,
                access: 4,
                name: "ntdll".to_owned(),
            },
            MemoryRegion {
                base: 0x4000,
                size: 0x2000,
                access: 2,
                name: String::new(),
            },
        ];
        let job_id = rpc_job(&queue, &Command::GetMemoryMap);
        let mut handler = MockRpcHandler::new();
        let reply = regions.clone();
        handler
            .expect_handle()
            .with(eq(job_id), eq(Command::GetMemoryMap))
            .times(1)
            .returning(move |_, _| Ok(Some(CommandResult::MemoryMap(reply.clone()))));
        let mut host = RhaiScriptHost::new(queue.clone(), Arc::new(handler));

        assert!(matches!(
            run(&mut host, &queue, job_id),
            ExecutionOutcome::Completed(_)
        ));
        let side = queue.side_channel(job_id).expect("job exists");
        let decoded = GetMemoryMapResult::decode(side.binary_result.as_slice())
            .expect("binary result should decode");
        assert_eq!(decoded.memories.len(), 2);
    }

    #[rstest]
    fn rpc_failure_sets_the_job_error(queue: JobQueue) {
        let job_id = rpc_job(&queue, &Command::GetMemoryMap);
        let mut handler = MockRpcHandler::new();
        handler
            .expect_handle()
            .with(always(), always())
            .returning(|_, _| Err(RpcError::Failed("debuggee not attached".to_owned())));
        let mut host = RhaiScriptHost::new(queue.clone(), Arc::new(handler));

        assert!(matches!(
            run(&mut host, &queue, job_id),
            ExecutionOutcome::Failed { .. }
        ));
        let side = queue.side_channel(job_id).expect("job exists");
        assert_eq!(side.error.as_deref(), Some("debuggee not attached"));
    }

    #[rstest]
    fn panicking_handler_is_trapped_with_earlier_output(queue: JobQueue) {
        let params = Command::GetMemoryMap
            .to_rpc_request()
            .map(|request| request.encode_to_vec())
            .expect("structured command");
        let job_id = queue.push_with(|id| {
            Job::new(id, format!("print(\"before\"); rpc_execute({id});"), params, false)
        });
        let mut handler = MockRpcHandler::new();
        handler
            .expect_handle()
            .returning(|_, _| panic!("debugger state corrupted"));
        let mut host = RhaiScriptHost::new(queue.clone(), Arc::new(handler));

        let ExecutionOutcome::Trapped { captured, reason } = run(&mut host, &queue, job_id) else {
            panic!("handler panic should be trapped");
        };
        assert_eq!(captured.std_out, "before\n");
        assert_eq!(reason, "debugger state corrupted");
    }

    #[rstest]
    fn entry_script_names_the_job() {
        assert_eq!(rpc_entry_script(12), "rpc_execute(12);");
    }
}
