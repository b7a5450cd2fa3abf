//! Blocking TCP client transport.
//!
//! The link state machine only talks to the [`Transport`] trait; [`TcpTransport`]
//! is the std-net implementation used in production. Reads go into a
//! caller-owned buffer of [`BUFFER_SIZE`] bytes and are handed on as-is: a
//! payload longer than the buffer is split across reads and nothing here
//! reassembles or frames messages.

use std::io::{self, ErrorKind, Read, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::LinkError;

/// Size of the per-read buffer.
pub const BUFFER_SIZE: usize = 800;
/// Constant pause between connect attempts.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(1);
const MIN_ATTEMPT: Duration = Duration::from_millis(250);

/// Outcome of a single receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// `n` bytes were written to the front of the buffer.
    Data(usize),
    /// Peer performed an orderly close.
    EndOfStream,
    /// A transient read error was logged and swallowed.
    Empty,
}

pub trait Transport {
    type Conn;

    /// Keep attempting to connect until `timeout` has elapsed since the first attempt.
    fn connect_with_retry(
        &mut self,
        addr: SocketAddr,
        timeout: Duration,
    ) -> Result<Self::Conn, LinkError>;

    /// One blocking read. A reset peer is `Err(LinkError::ConnectionReset)`.
    fn receive(&mut self, conn: &mut Self::Conn, buf: &mut [u8]) -> Result<Received, LinkError>;

    /// One blocking write that must accept every byte.
    fn send(&mut self, conn: &mut Self::Conn, bytes: &[u8]) -> Result<(), LinkError>;

    fn close(&mut self, conn: Self::Conn) -> Result<(), LinkError>;
}

/// Parse an IPv4 or IPv6 literal. Host names are rejected, not resolved.
pub fn parse_target(ip: &str, port: u16) -> Result<SocketAddr, LinkError> {
    let addr: IpAddr = ip
        .parse()
        .map_err(|_| LinkError::InvalidAddress(ip.to_string()))?;
    Ok(SocketAddr::new(addr, port))
}

#[derive(Debug, Clone)]
pub struct TcpTransport {
    retry_interval: Duration,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self {
            retry_interval: RETRY_INTERVAL,
        }
    }
}

impl TcpTransport {
    pub fn with_retry_interval(retry_interval: Duration) -> Self {
        Self { retry_interval }
    }
}

// Errors that no amount of retrying fixes: the socket itself could not be made.
fn is_socket_create_failure(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::Unsupported | ErrorKind::OutOfMemory)
}

impl Transport for TcpTransport {
    type Conn = TcpStream;

    fn connect_with_retry(
        &mut self,
        addr: SocketAddr,
        timeout: Duration,
    ) -> Result<TcpStream, LinkError> {
        let start = Instant::now();
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            // bound each attempt so an unanswered SYN cannot outlive the deadline
            let remaining = timeout.saturating_sub(start.elapsed());
            match TcpStream::connect_timeout(&addr, remaining.max(MIN_ATTEMPT)) {
                Ok(stream) => {
                    info!("connected to {} (attempt {})", addr, attempts);
                    return Ok(stream);
                }
                Err(e) if is_socket_create_failure(&e) => {
                    return Err(LinkError::SocketCreate(e));
                }
                Err(e) => debug!("connect attempt {} to {} failed: {}", attempts, addr, e),
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                warn!("connection attempt to {} timed out", addr);
                return Err(LinkError::ConnectTimeout { addr, timeout });
            }
            info!("server not found at {}, re-attempting...", addr);
            thread::sleep(self.retry_interval.min(timeout - elapsed));
        }
    }

    fn receive(&mut self, conn: &mut TcpStream, buf: &mut [u8]) -> Result<Received, LinkError> {
        match conn.read(buf) {
            Ok(0) => Ok(Received::EndOfStream),
            Ok(n) => Ok(Received::Data(n)),
            Err(e) if e.kind() == ErrorKind::ConnectionReset => Err(LinkError::ConnectionReset),
            Err(e) => {
                warn!("error reading from socket: {}", e);
                Ok(Received::Empty)
            }
        }
    }

    fn send(&mut self, conn: &mut TcpStream, bytes: &[u8]) -> Result<(), LinkError> {
        // single write, no continuation of a partial send
        let sent = conn.write(bytes)?;
        if sent != bytes.len() {
            return Err(LinkError::ShortWrite {
                sent,
                len: bytes.len(),
            });
        }
        Ok(())
    }

    fn close(&mut self, conn: TcpStream) -> Result<(), LinkError> {
        conn.shutdown(Shutdown::Both)?;
        Ok(())
    }
}
