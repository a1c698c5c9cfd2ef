//! One request, one TCP connection.
//!
//! The bridge forwards whatever arrives on its socket to the RS-485 line and
//! writes the slave's reply back. Every exchange opens a fresh connection,
//! writes the frame once, reads once and closes, so two frames never share a
//! socket.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("No response from {endpoint}")]
    NoResponse {
        endpoint: String,
        #[source]
        source: Option<io::Error>,
    },
}

/// Moves a raw request frame to the instrument and returns the raw reply.
pub trait Transport {
    fn send_and_receive(&self, request: &[u8]) -> Result<Vec<u8>, TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpTransport {
    host: String,
    port: u16,
    timeout: Duration,
    buffer_size: usize,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: DEFAULT_TIMEOUT,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Bounds the connect phase (across every resolved address), the write
    /// and the read.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn no_response(&self, source: Option<io::Error>) -> TransportError {
        let endpoint = self.endpoint();
        match &source {
            Some(err) => warn!(%endpoint, error = %err, "no response from instrument"),
            None => warn!(%endpoint, "instrument closed the connection without answering"),
        }
        TransportError::NoResponse { endpoint, source }
    }

    fn connect(&self) -> io::Result<TcpStream> {
        let deadline = Instant::now() + self.timeout;
        let addrs = (self.host.as_str(), self.port).to_socket_addrs()?;
        connect_before(addrs, deadline)
    }

    fn exchange(&self, request: &[u8]) -> io::Result<Vec<u8>> {
        let mut stream = self.connect()?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;

        stream.write_all(request)?;

        let mut buffer = vec![0u8; self.buffer_size];
        let received = stream.read(&mut buffer)?;
        buffer.truncate(received);
        Ok(buffer)
    }
}

impl Transport for TcpTransport {
    fn send_and_receive(&self, request: &[u8]) -> Result<Vec<u8>, TransportError> {
        debug!(endpoint = %self.endpoint(), request = %hex(request), "sending request");

        // The stream lives inside `exchange`, so it is closed on every path.
        let response = self.exchange(request).map_err(|e| self.no_response(Some(e)))?;
        if response.is_empty() {
            return Err(self.no_response(None));
        }

        debug!(
            endpoint = %self.endpoint(),
            len = response.len(),
            response = %hex(&response),
            "received response"
        );
        Ok(response)
    }
}

/// Tries each address in turn; all attempts share one deadline.
fn connect_before(addrs: impl IntoIterator<Item = SocketAddr>, deadline: Instant) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in addrs {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match TcpStream::connect_timeout(&addr, remaining) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::TimedOut, "connect deadline passed")))
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
