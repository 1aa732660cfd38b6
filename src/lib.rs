//! Client side of the Delve JSON-RPC API.
//!
//! [`rpc`] speaks the wire protocol over a single TCP connection: request envelopes, batches,
//! notifications and the client-local error taxonomy. [`worker`] owns that connection on a
//! dedicated thread for the lifetime of a debug session and turns high-level debugger intents
//! into ordered RPC calls, delivering the results back to the caller asynchronously.

pub mod config;
pub mod log;
pub mod rpc;
pub mod worker;

pub use config::Config;
pub use rpc::{Client, Error, ErrorCode, ProtocolError, Result};
pub use worker::{SemanticCommand, SessionState, WorkResult, Worker};
