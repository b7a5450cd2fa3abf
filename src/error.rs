use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::link::ConnectionStatus;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("producer launch failed: {0}")]
    ProducerLaunch(#[source] io::Error),
    #[error("socket create failed: {0}")]
    SocketCreate(#[source] io::Error),
    #[error("invalid address / address not supported: {0:?}")]
    InvalidAddress(String),
    #[error("connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: SocketAddr, timeout: Duration },
    #[error("connection reset by remote host")]
    ConnectionReset,
    #[error("not connected")]
    NotConnected,
    #[error("short write: {sent} of {len} bytes accepted")]
    ShortWrite { sent: usize, len: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl LinkError {
    /// Status a failed connect attempt settles in for this error.
    pub fn status(&self) -> ConnectionStatus {
        match self {
            LinkError::ProducerLaunch(_) => ConnectionStatus::ProducerStartError,
            _ => ConnectionStatus::ConnectionError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_errors_surface_as_producer_start_error() {
        let err = LinkError::ProducerLaunch(io::Error::other("spawn"));
        assert_eq!(err.status(), ConnectionStatus::ProducerStartError);
    }

    #[test]
    fn socket_errors_surface_as_connection_error() {
        let addr: SocketAddr = "127.0.0.1:3456".parse().unwrap();
        let cases = [
            LinkError::SocketCreate(io::Error::other("emfile")),
            LinkError::InvalidAddress("nope".into()),
            LinkError::ConnectTimeout {
                addr,
                timeout: Duration::from_secs(30),
            },
        ];
        for err in cases {
            assert_eq!(err.status(), ConnectionStatus::ConnectionError, "{err}");
        }
    }
}
