//! Translation of a batch of semantic commands into ordered Delve calls.
//!
//! All calls of a batch are issued strictly one after another on the session connection.
//! Some commands are deferred: `goroutine` only flags the goroutine listing, `watch` stages
//! expressions. Both are resolved after the main loop, once the current goroutine is known
//! and the execution state is consistent. A deferred command that cannot be issued is still
//! answered, with `result: false` and the reason in `error_message`.

use crate::config::Config;
use crate::rpc::{Client, Error, ErrorCode, ProtocolError, Result};
use crate::worker::command::{Command, SemanticCommand};
use crate::worker::params::{
    ClearBreakpointArgs, EvalArgs, EvalScope, Parms, StacktraceArgs, VariableArgs, Watch,
};
use crate::worker::result::WorkResult;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::str::FromStr;

/// Remote procedure call seam of the sequencing engine.
pub trait Rpc {
    /// Call `RPCServer.<method>` with a single positional argument.
    fn invoke(&mut self, method: &str, params: Value) -> Result<Value>;
}

impl Rpc for Client {
    fn invoke(&mut self, method: &str, params: Value) -> Result<Value> {
        let call = self.call("RPCServer").ns(method).arg(params);
        Ok(self.execute(call)?.unwrap_or(Value::Null))
    }
}

/// Results of a single batch.
#[derive(Debug, Default)]
pub struct Outcome {
    pub results: Vec<WorkResult>,
    /// Session must be terminated.
    pub fatal: bool,
}

/// Execute `batch` against `rpc`.
pub fn run<R: Rpc>(rpc: &mut R, config: &Config, batch: &[SemanticCommand]) -> Outcome {
    let mut run = BatchRun::new(rpc, config);
    for command in batch {
        run.execute(command);
    }
    run.resync();
    if let Some(parms) = run.goroutine_request.take() {
        run.goroutines(parms);
    }
    if let Some((watches, parms)) = run.watch_request.take() {
        run.evaluate_watches(watches, parms);
    }
    Outcome {
        results: run.results,
        fatal: run.fatal,
    }
}

/// Current goroutine of a running process from a `State` (or `Command`) response.
fn current_goroutine(response: &Value) -> Option<i64> {
    let state = response.get("State")?;
    if state.get("exited").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }
    state.get("currentThread")?.get("goroutineID")?.as_i64()
}

fn to_params(args: impl Serialize) -> Result<Value> {
    serde_json::to_value(args).map_err(|e| {
        ProtocolError::with_message(
            ErrorCode::InvalidRequest,
            format!("{}: {e}", ErrorCode::InvalidRequest.message()),
        )
        .into()
    })
}

fn member(response: Value, name: &str) -> Result<Value> {
    match response {
        Value::Object(mut obj) => obj
            .remove(name)
            .ok_or_else(|| Error::InvalidResponse(format!("`{name}` field expected"))),
        other => Err(Error::InvalidResponse(format!(
            "object with `{name}` field expected, got `{other}`"
        ))),
    }
}

struct BatchRun<'a, R: Rpc> {
    rpc: &'a mut R,
    config: &'a Config,
    results: Vec<WorkResult>,
    /// Local execution-state view must be refreshed.
    errors: bool,
    fatal: bool,
    goroutine_id: Option<i64>,
    /// Last observed state says the process is gone.
    exited: bool,
    frame: i64,
    state_requested: bool,
    /// Parameters of a staged `goroutine` command.
    goroutine_request: Option<Value>,
    watch_request: Option<(Vec<Watch>, Value)>,
}

impl<'a, R: Rpc> BatchRun<'a, R> {
    fn new(rpc: &'a mut R, config: &'a Config) -> Self {
        Self {
            rpc,
            config,
            results: vec![],
            errors: false,
            fatal: false,
            goroutine_id: None,
            exited: false,
            frame: 0,
            state_requested: false,
            goroutine_request: None,
            watch_request: None,
        }
    }

    fn execute(&mut self, command: &SemanticCommand) {
        let Ok(kind) = Command::from_str(&command.cmd) else {
            self.errors = true;
            let e = Error::UnknownCommand(command.cmd.clone());
            self.fail(&command.cmd, command.parms_value(), e);
            return;
        };

        match self.dispatch(kind, command) {
            Ok(Some(response)) => self.results.push(WorkResult::success(&command.cmd, response)),
            Ok(None) => {}
            Err(e) => {
                if !kind.is_isolated() {
                    self.errors = true;
                }
                self.fail(&command.cmd, command.parms_value(), e);
            }
        }
    }

    fn fail(&mut self, cmd: &str, parms: Value, e: Error) {
        log::warn!(target: "worker", "command `{cmd}` failed: {e}");
        self.fatal |= e.is_fatal();
        self.results.push(WorkResult::failure(cmd, parms, &e));
    }

    fn skip(&mut self, cmd: &str, parms: Value, reason: &str) {
        log::debug!(target: "worker", "deferred command `{cmd}` not issued: {reason}");
        self.results.push(WorkResult::skipped(cmd, parms, reason));
    }

    fn stage_goroutines(&mut self, command: &SemanticCommand) {
        if self.goroutine_request.is_some() {
            let reason = "goroutine listing is already requested in this batch";
            return self.skip(&command.cmd, command.parms_value(), reason);
        }
        self.goroutine_request = Some(command.parms_value());
    }

    fn stage_watches(&mut self, command: &SemanticCommand, access: &Parms) -> Result<()> {
        let watches = access.watches()?;
        if access.contains("goroutine_id") {
            let goroutine_id = access.int("goroutine_id")?;
            self.frame = access.int("frame")?;
            self.goroutine_id = Some(goroutine_id);
        }
        let request = (watches, command.parms_value());
        if let Some((_, replaced)) = self.watch_request.replace(request) {
            self.skip(&command.cmd, replaced, "superseded by a later watch command");
        }
        Ok(())
    }

    /// Remember the execution state carried by a `State` (or `Command`) response.
    fn observe(&mut self, response: &Value) {
        self.exited = response
            .pointer("/State/exited")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        self.goroutine_id = current_goroutine(response);
    }

    /// Goroutine a deferred command runs against, or the reason it cannot be issued.
    fn deferred_scope(&self, current: Option<i64>) -> std::result::Result<i64, &'static str> {
        if self.errors {
            return Err("batch errored, execution state is unknown");
        }
        match current {
            Some(goroutine_id) => Ok(goroutine_id),
            None if self.exited => Err("process exited"),
            None => Err("no current goroutine"),
        }
    }

    /// Issue a command, [`None`] means the command was deferred.
    fn dispatch(&mut self, command: Command, semantic: &SemanticCommand) -> Result<Option<Value>> {
        let empty = Map::new();
        let parms = semantic.parms.as_ref().unwrap_or(&empty);
        let access = Parms::new(command.into(), parms);
        let response = match command {
            Command::Continue | Command::Next | Command::Step | Command::StepOut => {
                let mut args = parms.clone();
                if let Some(name) = command.delve_command() {
                    args.insert("name".to_string(), Value::from(name));
                }
                let response = self.rpc.invoke("Command", Value::Object(args))?;
                self.observe(&response);
                response
            }
            Command::State => {
                self.errors = false;
                self.state_requested = true;
                let response = self.rpc.invoke("State", Value::Object(parms.clone()))?;
                self.observe(&response);
                response
            }
            Command::Restart
            | Command::CancelNext
            | Command::CreateBreakpoint
            | Command::ListBreakpoints => {
                let method = command.rpc_method().unwrap_or_default();
                self.rpc.invoke(method, Value::Object(parms.clone()))?
            }
            Command::ClearBreakpoint => {
                let args = to_params(ClearBreakpointArgs {
                    id: access.value("bkpt_id")?,
                    name: access.value("bkpt_name")?,
                })?;
                self.rpc.invoke("ClearBreakpoint", args)?
            }
            Command::Stacktrace => {
                let args = to_params(StacktraceArgs {
                    id: access.int("goroutine_id")?,
                    depth: self.config.stacktrace_depth,
                })?;
                self.rpc.invoke("Stacktrace", args)?
            }
            Command::Variable => {
                let args = to_params(VariableArgs {
                    scope: EvalScope {
                        goroutine_id: access.int("goroutine_id")?,
                        frame: access.int("frame")?,
                    },
                    cfg: &self.config.load,
                })?;
                let locals = self.rpc.invoke("ListLocalVars", args.clone())?;
                let arguments = self.rpc.invoke("ListFunctionArgs", args)?;
                json!({
                    "Locals": member(locals, "Variables")?,
                    "Arguments": member(arguments, "Args")?,
                })
            }
            Command::Watch => {
                self.stage_watches(semantic, &access)?;
                return Ok(None);
            }
            Command::Goroutine => {
                self.stage_goroutines(semantic);
                return Ok(None);
            }
        };
        Ok(Some(response))
    }

    /// Refresh the execution state once if any command failed.
    fn resync(&mut self) {
        if !self.errors {
            return;
        }
        self.errors = false;

        let cmd: &str = Command::State.into();
        log::debug!(target: "worker", "resync execution state after failed commands");
        match self.rpc.invoke("State", json!({})) {
            Ok(response) => {
                self.observe(&response);
                self.results.push(WorkResult::success(cmd, response));
            }
            Err(e) => {
                self.errors = true;
                self.fail(cmd, Value::Null, e);
            }
        }
    }

    /// List goroutines and verify that the current goroutine is still there.
    fn goroutines(&mut self, parms: Value) {
        let cmd: &str = Command::Goroutine.into();
        let expected = match self.deferred_scope(self.goroutine_id) {
            Ok(goroutine_id) => goroutine_id,
            Err(reason) => return self.skip(cmd, parms, reason),
        };

        let response = match self.rpc.invoke("ListGoroutines", json!({})) {
            Ok(response) => response,
            Err(e) => {
                self.errors = true;
                self.fail(cmd, Value::Null, e);
                return;
            }
        };

        let found = response
            .get("Goroutines")
            .and_then(Value::as_array)
            .map(|goroutines| {
                goroutines
                    .iter()
                    .any(|g| g.get("id").and_then(Value::as_i64) == Some(expected))
            })
            .unwrap_or(false);

        if !found {
            log::warn!(target: "worker", "current goroutine {expected} is gone");
            self.errors = true;
            self.goroutine_id = Some(0);
            self.results.push(WorkResult {
                cmd: cmd.to_string(),
                result: false,
                response: Some(response),
                error_message: Some(format!(
                    "goroutine {expected} is no longer present, execution state is stale"
                )),
                current_goroutine_id: Some(0),
                ..Default::default()
            });
            return;
        }

        self.results
            .push(WorkResult::success(cmd, response).with_goroutine(expected));
        if self.state_requested {
            self.relist_breakpoints();
        }
    }

    fn relist_breakpoints(&mut self) {
        let cmd: &str = Command::ListBreakpoints.into();
        match self.rpc.invoke("ListBreakpoints", json!({})) {
            Ok(response) => self.results.push(WorkResult::success(cmd, response)),
            Err(e) => {
                self.errors = true;
                self.fail(cmd, Value::Null, e);
            }
        }
    }

    /// Evaluate staged watches in the scope of the current goroutine, each watch independently.
    fn evaluate_watches(&mut self, watches: Vec<Watch>, parms: Value) {
        let cmd: &str = Command::Watch.into();
        let goroutine_id = match self.deferred_scope(self.goroutine_id.filter(|id| *id > 0)) {
            Ok(goroutine_id) => goroutine_id,
            Err(reason) => return self.skip(cmd, parms, reason),
        };
        let scope = EvalScope {
            goroutine_id,
            frame: self.frame,
        };

        let mut evaluated = Vec::with_capacity(watches.len());
        for watch in watches {
            let eval = to_params(EvalArgs {
                scope,
                expr: &watch.expr,
                cfg: &self.config.load,
            })
            .and_then(|args| self.rpc.invoke("Eval", args));

            let mut entry = Map::new();
            entry.insert("watch_id".to_string(), watch.watch_id);
            match eval {
                Ok(value) => {
                    entry.insert("result".to_string(), Value::Bool(true));
                    entry.insert("eval".to_string(), value);
                }
                Err(e) => {
                    log::debug!(target: "worker", "watch `{}` evaluation: {e}", watch.expr);
                    self.fatal |= e.is_fatal();
                    entry.insert("result".to_string(), Value::Bool(false));
                    if let Some(code) = e.code() {
                        entry.insert("error_code".to_string(), Value::from(code));
                    }
                    entry.insert("error_message".to_string(), Value::from(e.message()));
                }
            }
            evaluated.push(Value::Object(entry));
        }

        self.results
            .push(WorkResult::success(cmd, Value::Array(evaluated)));
    }
}
