use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum_macros::{Display, EnumString, IntoStaticStr};

/// The worker's unit of work as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticCommand {
    pub cmd: String,
    #[serde(default)]
    pub parms: Option<Map<String, Value>>,
}

impl SemanticCommand {
    pub fn new(cmd: impl Into<String>, parms: Option<Map<String, Value>>) -> Self {
        Self {
            cmd: cmd.into(),
            parms,
        }
    }

    /// Parameters as a JSON value, [`Value::Null`] if absent.
    pub fn parms_value(&self) -> Value {
        self.parms.clone().map(Value::Object).unwrap_or(Value::Null)
    }
}

/// Known semantic commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Command {
    Continue,
    Next,
    Step,
    StepOut,
    Restart,
    CancelNext,
    State,
    CreateBreakpoint,
    ClearBreakpoint,
    ListBreakpoints,
    Stacktrace,
    Variable,
    Watch,
    Goroutine,
}

impl Command {
    /// Name of the `RPCServer` method the command is issued with, [`None`] for deferred commands.
    pub fn rpc_method(self) -> Option<&'static str> {
        let method = match self {
            Command::Continue | Command::Next | Command::Step | Command::StepOut => "Command",
            Command::Restart => "Restart",
            Command::CancelNext => "CancelNext",
            Command::State => "State",
            Command::CreateBreakpoint => "CreateBreakpoint",
            Command::ClearBreakpoint => "ClearBreakpoint",
            Command::ListBreakpoints => "ListBreakpoints",
            Command::Stacktrace => "Stacktrace",
            Command::Variable => "ListLocalVars",
            Command::Watch | Command::Goroutine => return None,
        };
        Some(method)
    }

    /// Name of the Delve debugger command for runtime control commands.
    pub fn delve_command(self) -> Option<&'static str> {
        match self {
            Command::Continue => Some("continue"),
            Command::Next => Some("next"),
            Command::Step => Some("step"),
            Command::StepOut => Some("stepOut"),
            _ => None,
        }
    }

    /// Failure of these commands is reported for the command only and does not require
    /// a state resync.
    pub fn is_isolated(self) -> bool {
        matches!(
            self,
            Command::State | Command::CreateBreakpoint | Command::ClearBreakpoint
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_command_table() {
        assert_eq!(Command::from_str("stepout").unwrap(), Command::StepOut);
        assert_eq!(Command::from_str("createbreakpoint").unwrap(), Command::CreateBreakpoint);
        assert_eq!(Command::from_str("listbreakpoints").unwrap(), Command::ListBreakpoints);
        assert!(Command::from_str("exit").is_err());

        assert_eq!(Command::CancelNext.to_string(), "cancelnext");
        assert_eq!(Command::StepOut.rpc_method(), Some("Command"));
        assert_eq!(Command::StepOut.delve_command(), Some("stepOut"));
        assert_eq!(Command::Restart.delve_command(), None);
        assert_eq!(Command::Goroutine.rpc_method(), None);
        assert!(Command::ClearBreakpoint.is_isolated());
        assert!(!Command::Stacktrace.is_isolated());
    }

    #[test]
    fn test_semantic_command_json() {
        let cmd: SemanticCommand = serde_json::from_str(r#"{"cmd": "continue"}"#).unwrap();
        assert_eq!(cmd, SemanticCommand::new("continue", None));
        assert_eq!(cmd.parms_value(), Value::Null);

        let cmd: SemanticCommand =
            serde_json::from_str(r#"{"cmd": "createbreakpoint", "parms": {"line": 5}}"#).unwrap();
        assert_eq!(cmd.parms_value()["line"], 5);
    }
}
