use crate::rpc::{Error, ErrorCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of a single semantic command (or of a cascaded follow-up call).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkResult {
    pub cmd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parms: Option<Value>,
    pub result: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_goroutine_id: Option<i64>,
}

impl WorkResult {
    pub fn success(cmd: &str, response: Value) -> Self {
        Self {
            cmd: cmd.to_string(),
            result: true,
            response: Some(response),
            ..Default::default()
        }
    }

    pub fn failure(cmd: &str, parms: Value, err: &Error) -> Self {
        Self {
            cmd: cmd.to_string(),
            parms: (!parms.is_null()).then_some(parms),
            result: false,
            error_code: err.code(),
            error_message: Some(err.message()),
            ..Default::default()
        }
    }

    /// Result for a command that was never issued because no session is available.
    pub fn unavailable(cmd: &str, parms: Value) -> Self {
        Self::failure(cmd, parms, &Error::from(ErrorCode::ConnectionNotOpen))
    }

    /// Result for a deferred command that was never issued.
    pub fn skipped(cmd: &str, parms: Value, reason: &str) -> Self {
        Self {
            cmd: cmd.to_string(),
            parms: (!parms.is_null()).then_some(parms),
            result: false,
            error_message: Some(reason.to_string()),
            ..Default::default()
        }
    }

    pub fn with_goroutine(self, goroutine_id: i64) -> Self {
        Self {
            current_goroutine_id: Some(goroutine_id),
            ..self
        }
    }
}
