//! Argument shapes of Delve `RPCServer` methods.

use crate::rpc::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Delve `LoadConfig`, controls how much of a variable is read from the debugee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadConfig {
    pub follow_pointers: bool,
    pub max_variable_recurse: i64,
    pub max_string_len: i64,
    pub max_array_values: i64,
    /// -1 means load all fields.
    pub max_struct_fields: i64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            follow_pointers: true,
            max_variable_recurse: 1,
            max_string_len: 64,
            max_array_values: 64,
            max_struct_fields: -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvalScope {
    #[serde(rename = "GoroutineID")]
    pub goroutine_id: i64,
    #[serde(rename = "Frame")]
    pub frame: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClearBreakpointArgs<'a> {
    pub id: &'a Value,
    pub name: &'a Value,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StacktraceArgs {
    pub id: i64,
    pub depth: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VariableArgs<'a> {
    pub scope: EvalScope,
    pub cfg: &'a LoadConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EvalArgs<'a> {
    pub scope: EvalScope,
    pub expr: &'a str,
    pub cfg: &'a LoadConfig,
}

/// Watch expression staged by a `watch` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watch {
    pub watch_id: Value,
    pub expr: String,
}

/// Typed access to the parameters of a semantic command.
pub struct Parms<'a> {
    cmd: &'static str,
    map: &'a Map<String, Value>,
}

impl<'a> Parms<'a> {
    pub fn new(cmd: &'static str, map: &'a Map<String, Value>) -> Self {
        Self { cmd, map }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn value(&self, name: &'static str) -> Result<&'a Value> {
        self.map.get(name).ok_or(Error::MissingParameter {
            cmd: self.cmd,
            name,
        })
    }

    pub fn int(&self, name: &'static str) -> Result<i64> {
        self.value(name)?
            .as_i64()
            .ok_or_else(|| self.invalid(name, "integer expected"))
    }

    pub fn watches(&self) -> Result<Vec<Watch>> {
        let raw = self.value("watches")?;
        serde_json::from_value(raw.clone()).map_err(|e| self.invalid("watches", &e.to_string()))
    }

    fn invalid(&self, name: &str, reason: &str) -> Error {
        Error::InvalidParameter(format!("{}.{name}: {reason}", self.cmd))
    }
}
