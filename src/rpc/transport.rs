//! Transport layer for the RPC client.
//! Owns one TCP connection to the debugger server and moves raw messages over it.

use crate::rpc::error::{Error, ErrorCode, ProtocolError, Result};
use crate::rpc::tracer::{Direction, WireTracer};
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;
use strum_macros::{Display, EnumString};

/// Message boundary strategy.
#[derive(
    Copy, Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Framing {
    /// One JSON document per line, the way Go `encoding/json` streams are written.
    #[default]
    Newline,
    /// Read fixed-size chunks until a short read or EOF. Ambiguous for messages whose length is
    /// a multiple of the chunk size, kept for compatibility with legacy servers.
    ShortRead,
}

/// Trait for message transport to a debugger server.
///
/// Requests and responses are strictly alternating: a caller must receive the response to one
/// request before sending the next one.
pub trait Transport: Send {
    /// Connect to a server. Opening an already opened transport is a no-op.
    fn open(&mut self, host: &str, port: u16) -> Result<()>;

    /// Drop the connection. Closing a closed transport is a no-op.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Write a whole message. On failure the transport closes itself.
    fn send(&mut self, message: &str) -> Result<()>;

    /// Read a single message. On failure the transport closes itself.
    fn receive(&mut self) -> Result<String>;
}

struct Connection {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

/// TCP-based transport.
pub struct TcpTransport {
    connection: Option<Connection>,
    framing: Framing,
    buffer: usize,
    timeout: Option<Duration>,
    tracer: Option<WireTracer>,
}

impl TcpTransport {
    /// Create a closed transport. Zero `timeout` disables socket deadlines.
    pub fn new(framing: Framing, buffer: usize, timeout: Duration) -> Self {
        Self {
            connection: None,
            framing,
            buffer: buffer.max(1),
            timeout: (!timeout.is_zero()).then_some(timeout),
            tracer: None,
        }
    }

    pub fn with_tracer(mut self, tracer: WireTracer) -> Self {
        self.tracer = Some(tracer);
        self
    }

    fn connect(&self, host: &str, port: u16) -> io::Result<Connection> {
        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            let stream = match self.timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match stream {
                Ok(stream) => {
                    stream.set_read_timeout(self.timeout)?;
                    stream.set_write_timeout(self.timeout)?;
                    stream.set_nodelay(true)?;
                    let reader = BufReader::new(stream.try_clone()?);
                    return Ok(Connection { stream, reader });
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "no address resolved")
        }))
    }

    fn mirror(&self, direction: Direction, text: &str) {
        let text = text.trim_end();
        crate::wire_trace!("{} {text}", direction.marker());
        if let Some(tracer) = &self.tracer {
            tracer.line(direction, text);
        }
    }

    /// Close the transport and wrap an IO failure into a coded error.
    fn fail(&mut self, fallback: ErrorCode, err: io::Error) -> Error {
        let code = match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ErrorCode::Timeout,
            _ => fallback,
        };
        log::warn!(target: "rpc", "{}: {err}", code.message());
        self.close();
        Error::Protocol(ProtocolError::with_message(
            code,
            format!("{}: {err}", code.message()),
        ))
    }
}

fn write_message(conn: &mut Connection, message: &str, framing: Framing) -> io::Result<()> {
    let mut payload = Vec::with_capacity(message.len() + 1);
    payload.extend_from_slice(message.as_bytes());
    if framing == Framing::Newline && !message.ends_with('\n') {
        payload.push(b'\n');
    }
    conn.stream.write_all(&payload)?;
    conn.stream.flush()
}

fn read_line(conn: &mut Connection) -> io::Result<Option<Vec<u8>>> {
    let mut line = Vec::new();
    let read_n = conn.reader.read_until(b'\n', &mut line)?;
    Ok((read_n != 0).then_some(line))
}

fn read_chunks(conn: &mut Connection, size: usize) -> io::Result<Option<Vec<u8>>> {
    let mut chunk = vec![0u8; size];
    let mut message = Vec::new();
    loop {
        let read_n = match conn.stream.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if read_n == 0 {
            break;
        }
        message.extend_from_slice(&chunk[..read_n]);
        if read_n < size {
            break;
        }
    }
    Ok((!message.is_empty()).then_some(message))
}

impl Transport for TcpTransport {
    fn open(&mut self, host: &str, port: u16) -> Result<()> {
        if self.connection.is_some() {
            log::debug!(target: "rpc", "socket already opened");
            return Ok(());
        }

        let connection = self.connect(host, port).map_err(|e| {
            Error::Protocol(ProtocolError::with_message(
                ErrorCode::ConnectionNotOpen,
                format!(
                    "{} ({host}:{port}): {e}",
                    ErrorCode::ConnectionNotOpen.message()
                ),
            ))
        })?;
        self.connection = Some(connection);
        log::info!(target: "rpc", "open socket {host}:{port}");
        Ok(())
    }

    fn close(&mut self) {
        match self.connection.take() {
            Some(conn) => {
                _ = conn.stream.shutdown(Shutdown::Both);
                log::info!(target: "rpc", "close socket");
            }
            None => log::debug!(target: "rpc", "socket already closed"),
        }
    }

    fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    fn send(&mut self, message: &str) -> Result<()> {
        if self.connection.is_none() {
            return Err(ErrorCode::ConnectionNotOpen.into());
        }
        self.mirror(Direction::Request, message);

        let framing = self.framing;
        let written = match self.connection.as_mut() {
            Some(conn) => write_message(conn, message, framing),
            None => return Err(ErrorCode::ConnectionNotOpen.into()),
        };
        written.map_err(|e| self.fail(ErrorCode::SendFailure, e))
    }

    fn receive(&mut self) -> Result<String> {
        let (framing, size) = (self.framing, self.buffer);
        let Some(conn) = self.connection.as_mut() else {
            return Err(ErrorCode::ConnectionNotOpen.into());
        };

        let read = match framing {
            Framing::Newline => read_line(conn),
            Framing::ShortRead => read_chunks(conn, size),
        };
        let bytes = match read {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by peer");
                return Err(self.fail(ErrorCode::ReceiveFailure, eof));
            }
            Err(e) => return Err(self.fail(ErrorCode::ReceiveFailure, e)),
        };

        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                let invalid = io::Error::new(io::ErrorKind::InvalidData, e);
                return Err(self.fail(ErrorCode::ParseError, invalid));
            }
        };
        self.mirror(Direction::Response, &text);
        Ok(text)
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if self.connection.is_some() {
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::Mutex;
    use std::thread::{self, ThreadId};

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Accept one client, read `expect_in` bytes, then write every reply in order.
    fn serve(expect_in: usize, replies: Vec<&'static [u8]>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = vec![0u8; expect_in];
            stream.read_exact(&mut buf).unwrap();
            for reply in replies {
                stream.write_all(reply).unwrap();
            }
            thread::sleep(Duration::from_millis(200));
        });
        port
    }

    #[test]
    fn test_short_read_concatenates_chunks() {
        let port = serve(4, vec![b"0123456789"]);
        let mut transport = TcpTransport::new(Framing::ShortRead, 4, TIMEOUT);
        transport.open("127.0.0.1", port).unwrap();
        transport.send("ping").unwrap();
        assert_eq!(transport.receive().unwrap(), "0123456789");
        assert!(transport.is_open());
    }

    #[test]
    fn test_newline_framing_keeps_boundaries() {
        let port = serve(5, vec![b"{\"a\":1}\n{\"b\":2}\n"]);
        let mut transport = TcpTransport::new(Framing::Newline, 4096, TIMEOUT);
        transport.open("127.0.0.1", port).unwrap();
        transport.send("ping").unwrap();
        assert_eq!(transport.receive().unwrap(), "{\"a\":1}\n");
        assert_eq!(transport.receive().unwrap(), "{\"b\":2}\n");
    }

    #[test]
    fn test_eof_closes_transport() {
        let port = serve(5, vec![]);
        let mut transport = TcpTransport::new(Framing::Newline, 4096, TIMEOUT);
        transport.open("127.0.0.1", port).unwrap();
        transport.send("ping").unwrap();
        let err = transport.receive().unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ReceiveFailure.code()));
        assert!(!transport.is_open());
    }

    #[test]
    fn test_invalid_utf8_closes_transport() {
        let port = serve(5, vec![b"{\"a\":\"\xff\"}\n"]);
        let mut transport = TcpTransport::new(Framing::Newline, 4096, TIMEOUT);
        transport.open("127.0.0.1", port).unwrap();
        transport.send("ping").unwrap();
        let err = transport.receive().unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ParseError.code()));
        assert!(!transport.is_open());
    }

    #[test]
    fn test_send_failure_closes_transport() {
        let port = serve(0, vec![]);
        let mut transport = TcpTransport::new(Framing::Newline, 4096, TIMEOUT);
        transport.open("127.0.0.1", port).unwrap();
        if let Some(conn) = transport.connection.as_ref() {
            conn.stream.shutdown(Shutdown::Write).unwrap();
        }

        let err = transport.send("ping").unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::SendFailure.code()));
        assert!(err.message().starts_with(ErrorCode::SendFailure.message()));
        assert!(!transport.is_open());
    }

    /// Keeps log records of the thread that emitted them.
    struct Capture(Mutex<Vec<(ThreadId, log::Level, String)>>);

    impl log::Log for Capture {
        fn enabled(&self, _: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            if record.target() == "rpc" {
                let entry = (thread::current().id(), record.level(), record.args().to_string());
                self.0.lock().unwrap().push(entry);
            }
        }

        fn flush(&self) {}
    }

    static CAPTURE: Capture = Capture(Mutex::new(vec![]));

    fn captured() -> Vec<(log::Level, String)> {
        let current = thread::current().id();
        CAPTURE
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|(thread, _, _)| *thread == current)
            .map(|(_, level, message)| (*level, message.clone()))
            .collect()
    }

    #[test]
    fn test_double_close_logs_teardown_once() {
        _ = log::set_logger(&CAPTURE);
        log::set_max_level(log::LevelFilter::Trace);

        let port = serve(0, vec![]);
        let mut transport = TcpTransport::new(Framing::Newline, 4096, TIMEOUT);
        transport.open("127.0.0.1", port).unwrap();
        transport.close();
        transport.close();
        drop(transport);

        let teardown: Vec<_> = captured()
            .into_iter()
            .filter(|(_, message)| message.contains("close"))
            .collect();
        assert_eq!(
            teardown,
            vec![
                (log::Level::Info, "close socket".to_string()),
                (log::Level::Debug, "socket already closed".to_string()),
            ]
        );
    }

    #[test]
    fn test_read_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(500));
            drop(stream);
        });

        let mut transport =
            TcpTransport::new(Framing::Newline, 4096, Duration::from_millis(100));
        transport.open("127.0.0.1", port).unwrap();
        transport.send("ping").unwrap();
        let err = transport.receive().unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Timeout.code()));
        assert!(!transport.is_open());
        server.join().unwrap();
    }

    #[test]
    fn test_closed_transport() {
        let mut transport = TcpTransport::new(Framing::Newline, 4096, TIMEOUT);
        assert!(!transport.is_open());
        transport.close();
        transport.close();
        assert_eq!(
            transport.send("ping").unwrap_err().code(),
            Some(ErrorCode::ConnectionNotOpen.code())
        );
        assert_eq!(
            transport.receive().unwrap_err().code(),
            Some(ErrorCode::ConnectionNotOpen.code())
        );
    }

    #[test]
    fn test_open_refused() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut transport = TcpTransport::new(Framing::Newline, 4096, TIMEOUT);
        let err = transport.open("127.0.0.1", port).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ConnectionNotOpen.code()));
        assert!(!transport.is_open());
    }

    #[test]
    fn test_open_twice_is_noop() {
        let port = serve(0, vec![]);
        let mut transport = TcpTransport::new(Framing::Newline, 4096, TIMEOUT);
        transport.open("127.0.0.1", port).unwrap();
        transport.open("127.0.0.1", port).unwrap();
        assert!(transport.is_open());
        transport.close();
        assert!(!transport.is_open());
    }
}
