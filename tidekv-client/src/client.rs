//! # Synchronous Client API
//!
//! Purpose: Expose a compact, blocking API for issuing commands to the
//! server over its line-oriented wire protocol.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `KVClient` hides pooling and protocol details.
//! 2. **Borrow-Friendly API**: Accept `&[u8]` to avoid unnecessary copies.
//! 3. **Fail Fast**: Protocol violations surface immediately as errors.
//! 4. **Performance First**: Prefer direct TCP writes and buffer reuse.

use std::fmt;
use std::time::Duration;

use tidekv_common::codec::Frame;

use crate::pool::{ConnectionPool, PoolConfig};

/// Result type for the sync client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the sync client.
#[derive(Debug)]
pub enum ClientError {
    /// Network or IO failure while reading/writing.
    Io(std::io::Error),
    /// Frame framing or parse error.
    Protocol,
    /// Server returned an `ERROR: ...` reply.
    Server { message: Vec<u8> },
    /// Response type did not match the expected command response.
    UnexpectedResponse,
    /// Pool is at capacity and no idle connections are available.
    PoolExhausted,
    /// Address could not be parsed into a socket address.
    InvalidAddress,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Io(err) => write!(f, "io error: {}", err),
            ClientError::Protocol => write!(f, "protocol error"),
            ClientError::Server { message } => {
                write!(f, "server error: {}", String::from_utf8_lossy(message))
            }
            ClientError::UnexpectedResponse => write!(f, "unexpected response"),
            ClientError::PoolExhausted => write!(f, "connection pool exhausted"),
            ClientError::InvalidAddress => write!(f, "invalid address"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Io(err)
    }
}

const ERROR_PREFIX: &[u8] = b"ERROR: ";

/// Checks whether a bulk reply is the server's `ERROR: <reason>` form.
fn as_server_error(data: &[u8]) -> Option<Vec<u8>> {
    if data.starts_with(ERROR_PREFIX) {
        Some(data.to_vec())
    } else {
        None
    }
}

/// Configuration for the synchronous client and its pool.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address, e.g. "127.0.0.1:6380".
    pub addr: String,
    /// Maximum idle connections kept in the pool.
    pub max_idle: usize,
    /// Maximum total connections (idle + in-use).
    pub max_total: usize,
    /// Optional TCP read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    pub write_timeout: Option<Duration>,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            addr: "127.0.0.1:6380".to_string(),
            max_idle: 8,
            max_total: 16,
            read_timeout: None,
            write_timeout: None,
            connect_timeout: None,
        }
    }
}

/// Synchronous client with connection pooling.
///
/// This is a facade over the pool and the shared wire codec. Each call
/// acquires a connection, executes one command, and returns the
/// connection to the pool.
pub struct KVClient {
    pool: ConnectionPool,
}

impl KVClient {
    /// Creates a client with default configuration.
    pub fn connect(addr: impl Into<String>) -> ClientResult<Self> {
        let mut config = ClientConfig::default();
        config.addr = addr.into();
        Self::with_config(config)
    }

    /// Creates a client with a custom configuration.
    pub fn with_config(config: ClientConfig) -> ClientResult<Self> {
        let pool = ConnectionPool::new(PoolConfig {
            addr: config.addr,
            max_idle: config.max_idle,
            max_total: config.max_total,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            connect_timeout: config.connect_timeout,
        })?;
        Ok(KVClient { pool })
    }

    /// Pings the server, returning `PONG`.
    pub fn ping(&self) -> ClientResult<Vec<u8>> {
        let mut conn = self.pool.acquire()?;
        match conn.exec(&[b"PING"])? {
            Frame::Simple(text) => Ok(text),
            Frame::Bulk(Some(data)) => match as_server_error(&data) {
                Some(message) => Err(ClientError::Server { message }),
                None => Ok(data),
            },
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Fetches server `INFO` output (e.g. `role:master`).
    pub fn info(&self) -> ClientResult<Vec<u8>> {
        let mut conn = self.pool.acquire()?;
        match conn.exec(&[b"INFO"])? {
            Frame::Bulk(Some(data)) => match as_server_error(&data) {
                Some(message) => Err(ClientError::Server { message }),
                None => Ok(data),
            },
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Echoes `args` back, joined by a single space.
    pub fn echo(&self, args: &[&[u8]]) -> ClientResult<Vec<u8>> {
        let mut cmd: Vec<&[u8]> = Vec::with_capacity(args.len() + 1);
        cmd.push(b"ECHO");
        cmd.extend_from_slice(args);

        let mut conn = self.pool.acquire()?;
        match conn.exec(&cmd)? {
            Frame::Bulk(Some(data)) => match as_server_error(&data) {
                Some(message) => Err(ClientError::Server { message }),
                None => Ok(data),
            },
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Fetches a value by key. Returns `Ok(None)` when the key is missing.
    pub fn get(&self, key: &[u8]) -> ClientResult<Option<Vec<u8>>> {
        let mut conn = self.pool.acquire()?;
        match conn.exec(&[b"GET", key])? {
            Frame::Bulk(Some(data)) => match as_server_error(&data) {
                Some(message) => Err(ClientError::Server { message }),
                None => Ok(Some(data)),
            },
            Frame::Bulk(None) => Ok(None),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Sets a value for a key without expiration.
    pub fn set(&self, key: &[u8], value: &[u8]) -> ClientResult<()> {
        let mut conn = self.pool.acquire()?;
        expect_ok(conn.exec(&[b"SET", key, value])?)
    }

    /// Sets a value with a millisecond time-to-live.
    pub fn set_with_ttl_ms(&self, key: &[u8], value: &[u8], ttl_ms: i64) -> ClientResult<()> {
        let ttl = ttl_ms.to_string();
        let mut conn = self.pool.acquire()?;
        expect_ok(conn.exec(&[b"SET", key, value, b"PX", ttl.as_bytes()])?)
    }

    /// Deletes a key. A no-op if the key is absent.
    pub fn delete(&self, key: &[u8]) -> ClientResult<()> {
        let mut conn = self.pool.acquire()?;
        expect_ok(conn.exec(&[b"DELETE", key])?)
    }
}

fn expect_ok(frame: Frame) -> ClientResult<()> {
    match frame {
        Frame::Simple(text) if text == b"OK" => Ok(()),
        Frame::Bulk(Some(data)) => match as_server_error(&data) {
            Some(message) => Err(ClientError::Server { message }),
            None => Err(ClientError::UnexpectedResponse),
        },
        _ => Err(ClientError::UnexpectedResponse),
    }
}
