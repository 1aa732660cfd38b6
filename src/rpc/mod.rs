//! JSON-RPC 2.0 client for the Delve debugger API.
//!
//! The protocol is half-duplex: a request is written and its response is read before anything
//! else is sent on the connection. Every operation returns an explicit [`Result`], errors carry
//! the client-local code taxonomy of [`ErrorCode`] or a code reported by the server.

pub mod batch;
pub mod client;
pub mod error;
pub mod protocol;
pub mod tracer;
pub mod transport;

pub use batch::BatchResponses;
pub use client::{CallBuilder, Client};
pub use error::{Error, ErrorCode, Origin, ProtocolError, Result};
pub use protocol::{Params, Request, Response};
pub use transport::{Framing, TcpTransport, Transport};
