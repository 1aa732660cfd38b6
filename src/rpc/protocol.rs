//! JSON-RPC envelope encoding and response decoding.

use crate::rpc::error::{Error, ErrorCode, ProtocolError, Result};
use serde::Serialize;
use serde_json::{Map, Value};

pub const JSONRPC_VERSION: &str = "2.0";

/// Request parameters, positional or named.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Params {
    Positional(Vec<Value>),
    Named(Map<String, Value>),
}

impl Params {
    pub fn is_empty(&self) -> bool {
        match self {
            Params::Positional(args) => args.is_empty(),
            Params::Named(args) => args.is_empty(),
        }
    }
}

/// JSON-RPC request envelope. A request without an id is a notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Request {
    pub fn new(method: impl Into<String>, params: Option<Params>, id: Option<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params: params.filter(|p| !p.is_empty()),
            id,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Validated server response. Exactly one of result or error is meaningful.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: Option<String>,
    pub outcome: std::result::Result<Value, ProtocolError>,
}

impl Response {
    /// Check the structure of a decoded response object.
    ///
    /// A response must carry an `id` member (possibly null) and at least one of `result` or
    /// `error`, otherwise it is an [`Error::InvalidResponse`].
    pub fn from_value(value: Value) -> Result<Self> {
        let mut obj = match value {
            Value::Object(obj) => obj,
            other => {
                return Err(Error::InvalidResponse(format!(
                    "object expected, got `{other}`"
                )))
            }
        };
        if !obj.contains_key("id") || !(obj.contains_key("result") || obj.contains_key("error")) {
            return Err(Error::InvalidResponse(Value::Object(obj).to_string()));
        }

        let id = response_id(obj.get("id"));
        let outcome = match obj.remove("error") {
            Some(error) if !error.is_null() => Err(ProtocolError::from_server(&error)),
            _ => Ok(obj.remove("result").unwrap_or(Value::Null)),
        };
        Ok(Self { id, outcome })
    }

    pub fn into_result(self) -> Result<Value> {
        self.outcome.map_err(Error::Protocol)
    }
}

/// Correlation id of a response, absent and null ids are the same bucket.
pub fn response_id(id: Option<&Value>) -> Option<String> {
    match id? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn serialize<T: Serialize + ?Sized>(message: &T) -> Result<String> {
    serde_json::to_string(message).map_err(|e| {
        Error::Protocol(ProtocolError::with_message(
            ErrorCode::InvalidRequest,
            format!("{}: {e}", ErrorCode::InvalidRequest.message()),
        ))
    })
}

/// Serialize a single request.
pub fn encode(request: &Request) -> Result<String> {
    serialize(request)
}

/// Serialize a batch of requests into one JSON array.
pub fn encode_batch(requests: &[Request]) -> Result<String> {
    serialize(requests)
}

/// Decode raw response text.
///
/// Empty text means there is no response at all (notifications). A top-level object with
/// a non-null `error` member is reported as a server error.
pub fn decode(raw: &str) -> Result<Option<Value>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(raw).map_err(|e| {
        Error::Protocol(ProtocolError::with_message(
            ErrorCode::ParseError,
            format!("{}: {e}", ErrorCode::ParseError.message()),
        ))
    })?;

    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        return Err(Error::Protocol(ProtocolError::from_server(error)));
    }

    Ok(Some(value))
}
