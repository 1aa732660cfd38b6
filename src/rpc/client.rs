//! JSON-RPC client over a single [`Transport`].
//!
//! Method names are accumulated with a [`CallBuilder`]:
//!
//! ```no_run
//! # use dlvc::rpc::{Client, CallBuilder};
//! # use serde_json::json;
//! # fn f(client: &mut Client) -> dlvc::Result<()> {
//! let call = client
//!     .call("RPCServer")
//!     .ns("CreateBreakpoint")
//!     .arg(json!({"Breakpoint": {"file": "main.go", "line": 5}}));
//! let _created = client.execute(call)?;
//! # Ok(())
//! # }
//! ```

use crate::config::Config;
use crate::rpc::batch::BatchResponses;
use crate::rpc::error::{Error, ErrorCode, ProtocolError, Result};
use crate::rpc::protocol::{self, Params, Request, Response};
use crate::rpc::tracer::WireTracer;
use crate::rpc::transport::{TcpTransport, Transport};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Fluent builder of a single call.
///
/// Every [`CallBuilder::ns`] appends a dot-separated segment to the method path. A builder is
/// consumed when the request is built, so it is single-use by construction.
#[derive(Debug, Default)]
pub struct CallBuilder {
    path: Vec<String>,
    notify: bool,
    positional: Vec<Value>,
    named: Map<String, Value>,
    invalid: Option<Error>,
}

impl CallBuilder {
    /// Start a call, `path` may already contain several dotted segments.
    pub fn new(path: &str) -> Self {
        path.split('.')
            .fold(CallBuilder::default(), |builder, segment| builder.ns(segment))
    }

    /// Start a notification: the request has no id and no response is awaited.
    pub fn notification(path: &str) -> Self {
        Self {
            notify: true,
            ..Self::new(path)
        }
    }

    /// Append a path segment. Empty segments and segments starting with `_` are reserved.
    pub fn ns(mut self, segment: &str) -> Self {
        if segment.is_empty() || segment.starts_with('_') {
            self.invalid.get_or_insert(Error::InvalidMethod(segment.to_string()));
        } else {
            self.path.push(segment.to_string());
        }
        self
    }

    /// Add positional argument.
    pub fn arg<T: Serialize>(mut self, value: T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => self.positional.push(value),
            Err(e) => self.reject(e),
        }
        self
    }

    /// Add keyword argument.
    pub fn kwarg<T: Serialize>(mut self, name: &str, value: T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.named.insert(name.to_string(), value);
            }
            Err(e) => self.reject(e),
        }
        self
    }

    fn reject(&mut self, e: serde_json::Error) {
        self.invalid.get_or_insert(Error::Protocol(ProtocolError::with_message(
            ErrorCode::InvalidRequest,
            format!("{}: {e}", ErrorCode::InvalidRequest.message()),
        )));
    }

    /// Dotted method name accumulated so far.
    pub fn method(&self) -> String {
        self.path.join(".")
    }

    pub fn is_notification(&self) -> bool {
        self.notify
    }

    /// Materialize the request, a fresh correlation id is bound unless this is a notification.
    pub fn build(self) -> Result<Request> {
        if let Some(err) = self.invalid {
            return Err(err);
        }
        if !self.positional.is_empty() && !self.named.is_empty() {
            return Err(Error::MixedParams);
        }

        let params = if self.named.is_empty() {
            Params::Positional(self.positional)
        } else {
            Params::Named(self.named)
        };
        let id = (!self.notify).then(|| Uuid::new_v4().to_string());
        Ok(Request::new(self.path.join("."), Some(params), id))
    }
}

pub struct Client {
    transport: Box<dyn Transport>,
    batch: Option<Vec<Request>>,
}

impl Client {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            batch: None,
        }
    }

    /// Create a client over TCP transport configured by `config`.
    pub fn from_config(config: &Config) -> Self {
        let mut transport = TcpTransport::new(config.framing, config.buffer, config.timeout());
        if let Some(path) = &config.trace_file {
            match WireTracer::new(path) {
                Ok(tracer) => transport = transport.with_tracer(tracer),
                Err(e) => log::warn!(
                    target: "rpc",
                    "open trace file {}: {e}, wire tracing disabled",
                    path.display()
                ),
            }
        }
        Self::new(transport)
    }

    /// Connect to a server, resets any unfinished batch.
    pub fn open(&mut self, host: &str, port: u16) -> Result<()> {
        if !self.transport.is_open() {
            self.batch = None;
        }
        self.transport.open(host, port)
    }

    pub fn close(&mut self) {
        self.transport.close()
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    pub fn call(&self, path: &str) -> CallBuilder {
        CallBuilder::new(path)
    }

    pub fn notification(&self, path: &str) -> CallBuilder {
        CallBuilder::notification(path)
    }

    /// Build and issue a call.
    ///
    /// Returns the call result, or [`None`] for notifications and for calls accumulated into a
    /// prepared batch.
    pub fn execute(&mut self, call: CallBuilder) -> Result<Option<Value>> {
        let request = call.build()?;
        if !self.transport.is_open() {
            return Err(ErrorCode::ConnectionNotOpen.into());
        }

        if let Some(batch) = self.batch.as_mut() {
            batch.push(request);
            return Ok(None);
        }
        self.call_single(&request)
    }

    /// Switch the client into batch mode, following calls are accumulated until
    /// [`Client::fire_batch`].
    pub fn prepare_batch(&mut self) -> Result<()> {
        if self.batch.is_some() {
            return Err(ErrorCode::BatchAlreadyActive.into());
        }
        self.batch = Some(vec![]);
        Ok(())
    }

    pub fn is_batch(&self) -> bool {
        self.batch.is_some()
    }

    /// Send all accumulated calls as one array and index the responses by id.
    pub fn fire_batch(&mut self) -> Result<BatchResponses> {
        let requests = self.batch.take().ok_or(Error::NoBatch)?;
        if requests.is_empty() {
            return Ok(BatchResponses::default());
        }

        let ids: Vec<String> = requests.iter().filter_map(|r| r.id.clone()).collect();
        let message = protocol::encode_batch(&requests)?;
        let text = self.send_and_receive(&message, ids.is_empty())?;

        let decoded = protocol::decode(&text).and_then(|decoded| match decoded {
            None => Ok(vec![]),
            Some(Value::Array(responses)) => Ok(responses),
            Some(other) => Err(Error::InvalidResponse(format!(
                "array expected for batch, got `{other}`"
            ))),
        });
        let responses = self.drop_on_malformed(decoded)?;
        Ok(BatchResponses::new(responses, ids))
    }

    fn call_single(&mut self, request: &Request) -> Result<Option<Value>> {
        let message = protocol::encode(request)?;
        let text = self.send_and_receive(&message, request.is_notification())?;
        let decoded = protocol::decode(&text)
            .and_then(|response| response.map(Response::from_value).transpose());
        let Some(response) = self.drop_on_malformed(decoded)? else {
            return Ok(None);
        };
        response.into_result().map(Some)
    }

    /// A response that can not be decoded leaves the stream out of sync, the connection
    /// is closed. Errors reported by the server keep it open.
    fn drop_on_malformed<T>(&mut self, decoded: Result<T>) -> Result<T> {
        if let Err(e) = &decoded {
            let malformed = match e {
                Error::InvalidResponse(_) => true,
                Error::Protocol(e) => e.kind() == Some(ErrorCode::ParseError),
                _ => false,
            };
            if malformed {
                log::warn!(target: "rpc", "malformed response: {e}");
                self.transport.close();
            }
        }
        decoded
    }

    fn send_and_receive(&mut self, message: &str, notify: bool) -> Result<String> {
        self.transport.send(message)?;
        if notify {
            return Ok(String::new());
        }
        self.transport.receive()
    }
}
