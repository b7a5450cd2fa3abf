//! Connection parameters for one producer link.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::LinkError;
use crate::transport::parse_target;

pub const DEFAULT_IP: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3456;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Producer message rate in Hz.
pub const DEFAULT_MESSAGE_RATE: u32 = 1;
#[cfg(not(windows))]
pub const DEFAULT_INTERPRETER: &str = "python3";
#[cfg(windows)]
pub const DEFAULT_INTERPRETER: &str = "python";
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(10);

/// Everything needed to launch the producer and reach its TCP server.
///
/// A [`crate::link::Link`] owns its config; once the link is connected the
/// config is frozen and every `Link` mutator is rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    /// Producer program (or script, when `interpreter` is set).
    pub producer: PathBuf,
    /// Program used to run `producer`; `None` runs it directly.
    pub interpreter: Option<String>,
    /// Device locator forwarded to the producer as `--port`.
    pub device: String,
    pub ip: String,
    pub port: u16,
    pub connect_timeout_secs: u64,
    pub message_rate_hz: u32,
    /// Recording sink forwarded as `--save`; `None` disables recording.
    pub recording_path: Option<PathBuf>,
    /// Show the producer's video and output in a separate terminal.
    pub display: bool,
    pub stats_interval: Duration,
}

impl LinkConfig {
    pub fn new(producer: impl Into<PathBuf>, device: impl Into<String>) -> Self {
        Self {
            producer: producer.into(),
            interpreter: Some(DEFAULT_INTERPRETER.to_string()),
            device: device.into(),
            ip: DEFAULT_IP.to_string(),
            port: DEFAULT_PORT,
            connect_timeout_secs: DEFAULT_TIMEOUT_SECS,
            message_rate_hz: DEFAULT_MESSAGE_RATE,
            recording_path: None,
            display: false,
            stats_interval: DEFAULT_STATS_INTERVAL,
        }
    }

    pub fn with_interpreter(mut self, interpreter: Option<String>) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn with_address(mut self, ip: impl Into<String>, port: u16) -> Self {
        self.ip = ip.into();
        self.port = port;
        self
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn with_message_rate(mut self, hz: u32) -> Self {
        self.message_rate_hz = hz;
        self
    }

    pub fn with_recording(mut self, path: impl Into<PathBuf>) -> Self {
        self.recording_path = Some(path.into());
        self
    }

    pub fn with_display(mut self, display: bool) -> Self {
        self.display = display;
        self
    }

    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Parsed socket address of the producer's server.
    pub fn target(&self) -> Result<SocketAddr, LinkError> {
        parse_target(&self.ip, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = LinkConfig::new("./scripts/ImageTracker.py", "/dev/video0");
        assert_eq!(c.ip, "127.0.0.1");
        assert_eq!(c.port, 3456);
        assert_eq!(c.connect_timeout(), Duration::from_secs(30));
        assert_eq!(c.message_rate_hz, 1);
        assert_eq!(c.interpreter.as_deref(), Some(DEFAULT_INTERPRETER));
        assert!(c.recording_path.is_none());
        assert!(!c.display);
    }

    #[test]
    fn interpreter_follows_platform() {
        let expected = if cfg!(windows) { "python" } else { "python3" };
        assert_eq!(DEFAULT_INTERPRETER, expected);
    }

    #[test]
    fn target_parses_ip_literals() {
        let c = LinkConfig::new("p", "d").with_address("::1", 9000);
        assert_eq!(c.target().unwrap(), "[::1]:9000".parse().unwrap());

        let c = c.with_address("localhost", 9000);
        assert!(matches!(c.target(), Err(LinkError::InvalidAddress(_))));
    }
}
