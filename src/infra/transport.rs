//! Client side of a capacity-server exchange.

use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::config::EntranceConfig;
use crate::core::protocol;

/// Performs one request/response exchange with the capacity server.
///
/// Every call is a fresh connect, write, read, close cycle. Implementations
/// must not retry.
pub trait Transport: Send + Sync + 'static {
    /// Send `code` and return the server's response code.
    ///
    /// # Errors
    ///
    /// Any connect, write or read failure.
    fn exchange(&self, code: i32) -> io::Result<i32>;

    /// Like [`exchange`](Self::exchange), calling `on_connected` once the
    /// connection is open and before the request is written.
    ///
    /// Transports without a separate connect step call it up front.
    ///
    /// # Errors
    ///
    /// Any connect, write or read failure. `on_connected` is not called if
    /// the connect fails.
    fn exchange_connected(&self, code: i32, on_connected: &mut dyn FnMut()) -> io::Result<i32> {
        on_connected();
        self.exchange(code)
    }
}

/// TCP transport; one connection per exchange.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    addr: String,
    connect_timeout: Option<Duration>,
    io_timeout: Option<Duration>,
}

impl TcpTransport {
    /// Transport to `addr` (`host:port`) with OS default timeouts.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: None,
            io_timeout: None,
        }
    }

    /// Transport configured from an entrance configuration.
    #[must_use]
    pub fn from_config(cfg: &EntranceConfig) -> Self {
        Self {
            addr: cfg.server_addr.clone(),
            connect_timeout: cfg.connect_timeout(),
            io_timeout: cfg.io_timeout(),
        }
    }

    /// Bound the time spent connecting.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Bound the time spent waiting on the response (and on the write).
    #[must_use]
    pub const fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }

    /// Server address.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn connect(&self) -> io::Result<TcpStream> {
        let Some(timeout) = self.connect_timeout else {
            return TcpStream::connect(self.addr.as_str());
        };
        let mut last_err = None;
        for addr in self.addr.as_str().to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} did not resolve to any address", self.addr),
            )
        }))
    }
}

impl Transport for TcpTransport {
    fn exchange(&self, code: i32) -> io::Result<i32> {
        self.exchange_connected(code, &mut || {})
    }

    fn exchange_connected(&self, code: i32, on_connected: &mut dyn FnMut()) -> io::Result<i32> {
        let mut stream = self.connect()?;
        on_connected();
        stream.set_read_timeout(self.io_timeout)?;
        stream.set_write_timeout(self.io_timeout)?;
        let response = protocol::exchange(&mut stream, code)?;
        debug!(addr = %self.addr, code, response, "exchange complete");
        Ok(response)
    }
}
