use serde::Serialize;
use serde_json::Value;
use strum_macros::{Display, IntoStaticStr};

/// Client-local error codes. Disjoint from the codes a debugger server may return.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorCode {
    ConnectionNotOpen,
    SendFailure,
    ReceiveFailure,
    Timeout,
    BatchAlreadyActive,
    ParseError,
    ServerInternal,
    InvalidRequest,
}

impl ErrorCode {
    const ALL: [ErrorCode; 8] = [
        ErrorCode::ConnectionNotOpen,
        ErrorCode::SendFailure,
        ErrorCode::ReceiveFailure,
        ErrorCode::Timeout,
        ErrorCode::BatchAlreadyActive,
        ErrorCode::ParseError,
        ErrorCode::ServerInternal,
        ErrorCode::InvalidRequest,
    ];

    pub const fn code(self) -> i64 {
        match self {
            ErrorCode::ConnectionNotOpen => -32800,
            ErrorCode::SendFailure => -32801,
            ErrorCode::ReceiveFailure => -32802,
            ErrorCode::Timeout => -32803,
            ErrorCode::BatchAlreadyActive => -32804,
            ErrorCode::ParseError => -32700,
            ErrorCode::ServerInternal => -32701,
            ErrorCode::InvalidRequest => -32600,
        }
    }

    pub const fn message(self) -> &'static str {
        match self {
            ErrorCode::ConnectionNotOpen => "Client connection not opened",
            ErrorCode::SendFailure => "Client socket send error",
            ErrorCode::ReceiveFailure => "Client socket receive error",
            ErrorCode::Timeout => "Client socket timeout",
            ErrorCode::BatchAlreadyActive => "Client batch mode already enabled",
            ErrorCode::ParseError => "Parse server response error",
            ErrorCode::ServerInternal => "Internal server error",
            ErrorCode::InvalidRequest => "Invalid client request",
        }
    }

    /// Find a client-local code by its numeric value.
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }
}

/// Side of the connection that raised a protocol error.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Origin {
    Client,
    Server,
}

/// Coded protocol error, either produced locally or reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("protocol error {code}: {message}")]
pub struct ProtocolError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip)]
    pub origin: Origin,
}

impl ProtocolError {
    pub fn new(code: ErrorCode) -> Self {
        Self::with_message(code, code.message())
    }

    /// Local error with a more specific message than the default one.
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
            origin: Origin::Client,
        }
    }

    /// Build an error from the `error` member of a server response.
    ///
    /// An integer `code` is kept verbatim. Anything else (Go `net/rpc` servers report plain
    /// strings) falls back to [`ErrorCode::ServerInternal`].
    pub fn from_server(error: &Value) -> Self {
        let internal = ErrorCode::ServerInternal;
        let (code, message, data) = match error {
            Value::String(message) => (internal.code(), message.clone(), None),
            Value::Object(obj) => {
                let message = obj.get("message").and_then(Value::as_str);
                match obj.get("code").and_then(Value::as_i64) {
                    Some(code) => (
                        code,
                        message.unwrap_or(internal.message()).to_string(),
                        obj.get("data").cloned(),
                    ),
                    None => (
                        internal.code(),
                        message
                            .map(ToString::to_string)
                            .unwrap_or_else(|| error.to_string()),
                        Some(error.clone()),
                    ),
                }
            }
            _ => (
                internal.code(),
                internal.message().to_string(),
                Some(error.clone()),
            ),
        };
        Self {
            code,
            message,
            data,
            origin: Origin::Server,
        }
    }

    /// Return client-local code if this error is not a server one. A server may report any
    /// code, including the values of the local taxonomy.
    pub fn kind(&self) -> Option<ErrorCode> {
        match self.origin {
            Origin::Client => ErrorCode::from_code(self.code),
            Origin::Server => None,
        }
    }
}

impl From<ErrorCode> for ProtocolError {
    fn from(code: ErrorCode) -> Self {
        Self::new(code)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- coded errors ----------------------------------------------
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    // --------------------------------- protocol violations ---------------------------------------
    #[error("server returned invalid response: {0}")]
    InvalidResponse(String),
    #[error("response for request {0:?} does not exist or has already been retrieved")]
    AlreadyRetrieved(Option<String>),

    // --------------------------------- usage errors ----------------------------------------------
    #[error("JSON-RPC allows positional arguments or keyword arguments, not both")]
    MixedParams,
    #[error("invalid method path segment `{0}`")]
    InvalidMethod(String),
    #[error("no batch prepared")]
    NoBatch,
    #[error("unknown worker command: {0}")]
    UnknownCommand(String),
    #[error("command `{cmd}` requires parameter `{name}`")]
    MissingParameter { cmd: &'static str, name: &'static str },
    #[error("invalid command parameter {0}")]
    InvalidParameter(String),

    // --------------------------------- configuration errors --------------------------------------
    #[error("config file parsing error: {0}")]
    ConfigParsing(#[from] toml::de::Error),
    #[error(transparent)]
    IO(#[from] std::io::Error),
}

impl From<ErrorCode> for Error {
    fn from(code: ErrorCode) -> Self {
        Error::Protocol(ProtocolError::new(code))
    }
}

impl Error {
    /// Numeric code of coded errors, [`None`] for generic faults.
    pub fn code(&self) -> Option<i64> {
        match self {
            Error::Protocol(e) => Some(e.code),
            _ => None,
        }
    }

    /// Human-readable message (without the code prefix for coded errors).
    pub fn message(&self) -> String {
        match self {
            Error::Protocol(e) => e.message.clone(),
            _ => self.to_string(),
        }
    }

    /// Return a hint to a worker - continue the debug session after error or terminate it.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Protocol(e) => matches!(
                e.kind(),
                Some(ErrorCode::ConnectionNotOpen | ErrorCode::BatchAlreadyActive)
            ),
            Error::InvalidResponse(_) => false,
            Error::AlreadyRetrieved(_) => false,
            Error::MixedParams => false,
            Error::InvalidMethod(_) => false,
            Error::NoBatch => false,
            Error::UnknownCommand(_) => false,
            Error::MissingParameter { .. } => false,
            Error::InvalidParameter(_) => false,
            Error::ConfigParsing(_) => false,
            Error::IO(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
