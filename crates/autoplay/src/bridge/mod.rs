//! Reconnecting client for the game bridge.
//!
//! The bridge speaks one JSON object per line in each direction, strictly
//! request-then-response. [`BridgeClient`] keeps a single lazily opened TCP
//! connection, serializes callers behind a mutex, and on any transport failure
//! drops the connection and retries the whole request once on a fresh one.
//!
//! # Example
//!
//! ```no_run
//! use autoplay::bridge::{BridgeClient, BridgeClientConfig};
//!
//! # fn example() -> Result<(), autoplay::AgentError> {
//! let client = BridgeClient::new(BridgeClientConfig::default());
//! client.ping()?;
//! let state = client.get_state()?;
//! println!("map: {:?}", state.get("map_id"));
//! client.close();
//! # Ok(())
//! # }
//! ```

pub mod protocol;

use crate::config::BridgeConfig;
use crate::error::{AgentError, AgentResult, ErrorCode};
use serde_json::{Map, Value};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Longest response line accepted from the bridge.
pub const MAX_LINE_BYTES: u64 = 1 << 20;

/// Attempts per logical request: the first try plus one reconnect.
const ATTEMPTS: u32 = 2;

#[derive(Clone, Debug)]
pub struct BridgeClientConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for BridgeClientConfig {
    fn default() -> Self {
        Self::from(&BridgeConfig::default())
    }
}

impl From<&BridgeConfig> for BridgeClientConfig {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }
}

/// Opens the transport stream. Split out so tests can inject failures.
pub trait Connector: Send + Sync {
    fn connect(&self) -> io::Result<TcpStream>;
}

/// Plain TCP connect with a bounded timeout per resolved address.
#[derive(Clone, Debug)]
pub struct TcpConnector {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpConnector {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }
}

impl Connector for TcpConnector {
    fn connect(&self) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in (self.host.as_str(), self.port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => return Ok(stream),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "bridge host resolved to no addresses")
        }))
    }
}

struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Connection {
    fn open(stream: TcpStream, timeout: Duration) -> io::Result<Self> {
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }

    fn round_trip(&mut self, payload: &[u8]) -> AgentResult<Value> {
        self.writer
            .write_all(payload)
            .map_err(|err| AgentError::io(ErrorCode::Connection, "failed to write request", err))?;
        self.writer
            .flush()
            .map_err(|err| AgentError::io(ErrorCode::Connection, "failed to flush request", err))?;

        let mut line = Vec::new();
        let read = (&mut self.reader)
            .take(MAX_LINE_BYTES + 1)
            .read_until(b'\n', &mut line)
            .map_err(|err| AgentError::io(ErrorCode::Connection, "failed to read response", err))?;
        if read == 0 {
            return Err(AgentError::connection("bridge closed connection"));
        }
        if line.last() != Some(&b'\n') {
            let message = if read as u64 > MAX_LINE_BYTES {
                "bridge response line too long"
            } else {
                "bridge closed connection mid-line"
            };
            return Err(AgentError::connection(message));
        }
        serde_json::from_slice(&line).map_err(|err| {
            AgentError::io(ErrorCode::Protocol, "bridge response is not valid json", err)
        })
    }

    fn shutdown(self) {
        let _ = self.writer.shutdown(Shutdown::Both);
    }
}

/// Serialized, reconnecting request/response client.
pub struct BridgeClient {
    config: BridgeClientConfig,
    connector: Box<dyn Connector>,
    connection: Mutex<Option<Connection>>,
}

impl BridgeClient {
    #[must_use]
    pub fn new(config: BridgeClientConfig) -> Self {
        let connector = TcpConnector::new(config.host.clone(), config.port, config.connect_timeout);
        Self::with_connector(config, connector)
    }

    pub fn with_connector(config: BridgeClientConfig, connector: impl Connector + 'static) -> Self {
        Self {
            config,
            connector: Box::new(connector),
            connection: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    /// Send one request and wait for its response line.
    ///
    /// Any failure tears the connection down; the request is retried once on
    /// a fresh connection before giving up with [`ErrorCode::Connection`].
    pub fn request(&self, request: &Value) -> AgentResult<Value> {
        let mut payload = serde_json::to_vec(request)
            .map_err(|err| AgentError::io(ErrorCode::Protocol, "failed to encode request", err))?;
        payload.push(b'\n');

        let mut guard = self.lock();
        let mut last_error = None;
        for attempt in 1..=ATTEMPTS {
            match self.attempt(&mut guard, &payload) {
                Ok(response) => return Ok(response),
                Err(err) => {
                    tracing::warn!(attempt, error = %err.detail(), "bridge request failed");
                    close_connection(&mut guard);
                    last_error = Some(err);
                }
            }
        }
        Err(AgentError::new(
            ErrorCode::Connection,
            "bridge request failed after retries",
            last_error.map(|err| serde_json::json!({ "last_error": err.detail() })),
        ))
    }

    fn attempt(&self, slot: &mut Option<Connection>, payload: &[u8]) -> AgentResult<Value> {
        if slot.is_none() {
            let stream = self.connector.connect().map_err(|err| {
                AgentError::io(ErrorCode::Connection, "failed to connect to bridge", err)
            })?;
            let connection = Connection::open(stream, self.config.request_timeout).map_err(|err| {
                AgentError::io(ErrorCode::Connection, "failed to configure bridge socket", err)
            })?;
            tracing::debug!(host = %self.config.host, port = self.config.port, "bridge connected");
            *slot = Some(connection);
        }
        match slot.as_mut() {
            Some(connection) => connection.round_trip(payload),
            None => Err(AgentError::connection("bridge connection unavailable")),
        }
    }

    pub fn ping(&self) -> AgentResult<()> {
        let response = self.request(&protocol::ping_request())?;
        protocol::parse_pong(&response)
    }

    pub fn get_state(&self) -> AgentResult<Map<String, Value>> {
        let response = self.request(&protocol::state_request())?;
        protocol::parse_state(response)
    }

    pub fn get_events(&self) -> AgentResult<Vec<Map<String, Value>>> {
        let response = self.request(&protocol::events_request())?;
        protocol::parse_events(response)
    }

    pub fn set_debug(&self, enabled: bool) -> AgentResult<()> {
        let response = self.request(&protocol::set_debug_request(enabled))?;
        protocol::expect_ok(&response, "set")
    }

    /// Release the connection. Safe to call any number of times.
    pub fn close(&self) {
        close_connection(&mut self.lock());
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for BridgeClient {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeClient")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

fn close_connection(slot: &mut Option<Connection>) {
    if let Some(connection) = slot.take() {
        connection.shutdown();
    }
}
