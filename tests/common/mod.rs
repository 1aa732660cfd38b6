#![allow(dead_code)]

use anyhow::{anyhow, Context};
use dlvc::{Config, WorkResult};
use serde_json::{json, Value};
use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub const RESULT_TIMEOUT: Duration = Duration::from_secs(5);

/// What the mock server does with a request.
pub enum Reply {
    Result(Value),
    Error(i64, &'static str),
    /// Do not answer (notifications).
    Silent,
    /// Drop the connection without answering.
    Close,
}

type Handler = dyn Fn(&str, &Value) -> Reply + Send + Sync;

/// Scripted Delve server on an ephemeral port.
///
/// Requests are parsed as a stream of JSON documents, so both newline-delimited and bare
/// messages are accepted. Every answer is written as one JSON line.
pub struct MockDelve {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Value>>>,
    connections: Arc<Mutex<usize>>,
}

impl MockDelve {
    /// Start a server, `handler` is called with the method name (without `RPCServer.`) and
    /// the first positional parameter.
    pub fn start(
        handler: impl Fn(&str, &Value) -> Reply + Send + Sync + 'static,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").context("bind mock server")?;
        let addr = listener.local_addr()?;
        let requests = Arc::new(Mutex::new(vec![]));
        let connections = Arc::new(Mutex::new(0));
        let handler: Arc<Handler> = Arc::new(handler);

        thread::spawn({
            let requests = requests.clone();
            let connections = connections.clone();
            move || {
                for stream in listener.incoming() {
                    let Ok(stream) = stream else {
                        break;
                    };
                    *connections.lock().unwrap() += 1;
                    let handler = handler.clone();
                    let requests = requests.clone();
                    thread::spawn(move || serve(stream, handler.as_ref(), &requests));
                }
            }
        });

        Ok(Self {
            addr,
            requests,
            connections,
        })
    }

    pub fn config(&self) -> Config {
        Config {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            timeout: 2,
            ..Config::default()
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// All received requests (batch arrays are flattened).
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    /// Method names of all received requests.
    pub fn methods(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(|r| r["method"].as_str().map(ToString::to_string))
            .collect()
    }

    pub fn connections(&self) -> usize {
        *self.connections.lock().unwrap()
    }
}

fn answer(request: &Value, handler: &Handler) -> Option<Value> {
    let method = request["method"].as_str().unwrap_or_default();
    let method = method.strip_prefix("RPCServer.").unwrap_or(method);
    let params = request["params"].get(0).cloned().unwrap_or(Value::Null);
    let id = request.get("id").cloned().unwrap_or(Value::Null);

    match handler(method, &params) {
        Reply::Result(result) => Some(json!({"jsonrpc": "2.0", "result": result, "id": id})),
        Reply::Error(code, message) => Some(json!({
            "jsonrpc": "2.0",
            "error": {"code": code, "message": message},
            "id": id
        })),
        Reply::Silent => None,
        Reply::Close => Some(Value::Null),
    }
}

fn serve(mut stream: TcpStream, handler: &Handler, requests: &Mutex<Vec<Value>>) {
    let Ok(reader) = stream.try_clone() else {
        return;
    };
    let messages = serde_json::Deserializer::from_reader(BufReader::new(reader)).into_iter::<Value>();

    for message in messages {
        let Ok(message) = message else {
            return;
        };

        let reply = match &message {
            Value::Array(batch) => {
                requests.lock().unwrap().extend(batch.iter().cloned());
                let answers: Vec<Value> = batch.iter().filter_map(|r| answer(r, handler)).collect();
                if answers.iter().any(Value::is_null) {
                    return;
                }
                // answer batches in reverse order, clients must demultiplex by id
                (!answers.is_empty()).then(|| Value::Array(answers.into_iter().rev().collect()))
            }
            request => {
                requests.lock().unwrap().push(request.clone());
                match answer(request, handler) {
                    Some(Value::Null) => return,
                    other => other,
                }
            }
        };

        if let Some(reply) = reply {
            let line = format!("{reply}\n");
            if stream.write_all(line.as_bytes()).is_err() {
                return;
            }
        }
    }
}

/// Delve `State` response of a stopped process.
pub fn state(goroutine_id: i64) -> Value {
    json!({
        "State": {
            "running": false,
            "exited": false,
            "currentThread": {"id": 100, "goroutineID": goroutine_id}
        }
    })
}

/// Wait for the next batch results.
pub fn next_results(rx: &Receiver<Vec<WorkResult>>) -> anyhow::Result<Vec<WorkResult>> {
    rx.recv_timeout(RESULT_TIMEOUT)
        .map_err(|e| anyhow!("no results from worker: {e}"))
}

/// Poll `condition` until it holds or the timeout expires.
pub fn wait_until(condition: impl Fn() -> bool) -> anyhow::Result<()> {
    let start = Instant::now();
    while !condition() {
        if start.elapsed() > RESULT_TIMEOUT {
            return Err(anyhow!("condition not reached"));
        }
        thread::sleep(Duration::from_millis(10));
    }
    Ok(())
}
