//! Connection lifecycle for one producer.
//!
//! ```text
//! DISCONNECTED --connect--> CONNECTING --ok--> CONNECTED --stop--> DISCONNECTED
//!                               |                  |
//!                               | launch fails     | end of stream / reset
//!                               v                  v
//!                      PRODUCER_START_ERROR   RECONNECTING --one connect--> CONNECTED
//!                      CONNECTION_ERROR <---------------------- fails ------'
//! ```
//!
//! The live socket only exists inside [`LinkState::Connected`], so the status
//! can never claim a connection whose socket has been closed.

use std::fmt;
use std::mem;
use std::net::SocketAddr;
use std::path::PathBuf;

use log::{debug, error, info, warn};

use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::launch::{LaunchCommand, Launcher, ProcessLauncher};
use crate::sink::{LogSink, Sink};
use crate::stats::Stats;
use crate::transport::{BUFFER_SIZE, Received, TcpTransport, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    ConnectionError,
    ProducerStartError,
    Reconnecting,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionStatus::Disconnected => "DISCONNECTED",
            ConnectionStatus::Connecting => "CONNECTING",
            ConnectionStatus::Connected => "CONNECTED",
            ConnectionStatus::ConnectionError => "CONNECTION_ERROR",
            ConnectionStatus::ProducerStartError => "PRODUCER_START_ERROR",
            ConnectionStatus::Reconnecting => "RECONNECTING",
        })
    }
}

/// Live socket plus its read buffer and counters.
struct Handle<C> {
    conn: C,
    peer: SocketAddr,
    buf: [u8; BUFFER_SIZE],
    stats: Stats,
}

impl<C> Handle<C> {
    fn new(conn: C, peer: SocketAddr) -> Self {
        Self {
            conn,
            peer,
            buf: [0; BUFFER_SIZE],
            stats: Stats::new(),
        }
    }
}

enum LinkState<C> {
    Disconnected,
    Connecting,
    Connected(Handle<C>),
    Reconnecting,
    ConnectionError,
    ProducerStartError,
}

impl<C> LinkState<C> {
    fn status(&self) -> ConnectionStatus {
        match self {
            LinkState::Disconnected => ConnectionStatus::Disconnected,
            LinkState::Connecting => ConnectionStatus::Connecting,
            LinkState::Connected(_) => ConnectionStatus::Connected,
            LinkState::Reconnecting => ConnectionStatus::Reconnecting,
            LinkState::ConnectionError => ConnectionStatus::ConnectionError,
            LinkState::ProducerStartError => ConnectionStatus::ProducerStartError,
        }
    }

    fn failed(err: &LinkError) -> Self {
        match err.status() {
            ConnectionStatus::ProducerStartError => LinkState::ProducerStartError,
            _ => LinkState::ConnectionError,
        }
    }
}

/// Launches the producer, holds the connection to it and feeds its payloads
/// to a [`Sink`].
///
/// Not meant for concurrent use: run one `Link` per thread. All failures are
/// reported through boolean returns and [`Link::status`].
pub struct Link<T: Transport = TcpTransport, L: Launcher = ProcessLauncher, S: Sink = LogSink> {
    config: LinkConfig,
    transport: T,
    launcher: L,
    sink: S,
    state: LinkState<T::Conn>,
}

impl Link {
    pub fn new(config: LinkConfig) -> Self {
        Link::with_parts(config, TcpTransport::default(), ProcessLauncher, LogSink)
    }
}

impl<T: Transport, L: Launcher, S: Sink> Link<T, L, S> {
    pub fn with_parts(config: LinkConfig, transport: T, launcher: L, sink: S) -> Self {
        Self {
            config,
            transport,
            launcher,
            sink,
            state: LinkState::Disconnected,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.status()
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, LinkState::Connected(_))
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Messages received on the current connection.
    pub fn rx_count(&self) -> u64 {
        match &self.state {
            LinkState::Connected(h) => h.stats.rx,
            _ => 0,
        }
    }

    /// Messages sent on the current connection.
    pub fn tx_count(&self) -> u64 {
        match &self.state {
            LinkState::Connected(h) => h.stats.tx,
            _ => 0,
        }
    }

    /* ---------- configuration (frozen while connected) ---------- */

    pub fn set_connect_timeout(&mut self, secs: u64) -> bool {
        self.reconfigure(|c| c.connect_timeout_secs = secs)
    }

    pub fn set_message_rate(&mut self, hz: u32) -> bool {
        self.reconfigure(|c| c.message_rate_hz = hz)
    }

    pub fn enable_recording(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        self.reconfigure(|c| c.recording_path = Some(path))
    }

    pub fn enable_display(&mut self, display: bool) -> bool {
        self.reconfigure(|c| c.display = display)
    }

    /// Point the link at another producer address.
    pub fn setup(&mut self, ip: &str, port: u16) -> bool {
        self.reconfigure(|c| {
            c.ip = ip.to_string();
            c.port = port;
        })
    }

    fn reconfigure(&mut self, apply: impl FnOnce(&mut LinkConfig)) -> bool {
        if self.is_connected() {
            warn!("configuration is frozen while connected");
            return false;
        }
        apply(&mut self.config);
        true
    }

    /* ---------- lifecycle ---------- */

    /// Launch the producer and connect to it, retrying until the configured timeout.
    pub fn connect(&mut self) -> bool {
        if self.is_connected() {
            warn!("connect called while already connected");
            return true;
        }
        self.set_state(LinkState::Connecting);
        match self.establish() {
            Ok(handle) => {
                info!("connection to producer at {} successful", handle.peer);
                self.set_state(LinkState::Connected(handle));
                true
            }
            Err(e) => {
                error!("connect failed: {}", e);
                self.set_state(LinkState::failed(&e));
                false
            }
        }
    }

    fn establish(&mut self) -> Result<Handle<T::Conn>, LinkError> {
        self.launcher
            .launch(&LaunchCommand::from_config(&self.config))?;
        let target = self.config.target()?;
        let conn = self
            .transport
            .connect_with_retry(target, self.config.connect_timeout())?;
        Ok(Handle::new(conn, target))
    }

    /// Blocking receive loop. Connects first if needed, then feeds every
    /// payload to the sink until the connection is lost for good.
    ///
    /// Returns `false` only when the connection never came up.
    pub fn start(&mut self) -> bool {
        if !self.is_connected() && !self.connect() {
            return false;
        }
        while self.is_connected() {
            if let Some(payload) = self.receive() {
                let rx = self.rx_count();
                self.sink.ingest(rx, &payload);
            }
            if let LinkState::Connected(h) = &mut self.state {
                h.stats.maybe_log(self.config.stats_interval);
            }
        }
        info!("receive loop finished ({})", self.status());
        true
    }

    /// Close the connection. `false` when there was nothing to stop or the
    /// socket reported an error while closing; the status is DISCONNECTED
    /// either way once a live connection existed.
    pub fn stop(&mut self) -> bool {
        match mem::replace(&mut self.state, LinkState::Disconnected) {
            LinkState::Connected(handle) => {
                self.notify();
                self.close_handle(handle)
            }
            other => {
                self.state = other;
                false
            }
        }
    }

    /// One receive, decoded lossily. Drives the reconnect cycle when the
    /// producer goes away.
    pub fn read(&mut self) -> Option<String> {
        self.receive()
            .map(|payload| String::from_utf8_lossy(&payload).into_owned())
    }

    /// Send `data` in one write. Partial sends are failures.
    pub fn write(&mut self, data: &str) -> bool {
        let LinkState::Connected(handle) = &mut self.state else {
            return false;
        };
        match self.transport.send(&mut handle.conn, data.as_bytes()) {
            Ok(()) => {
                handle.stats.add_tx(data.len());
                true
            }
            Err(e) => {
                error!("error writing to socket: {}", e);
                false
            }
        }
    }

    fn receive(&mut self) -> Option<Vec<u8>> {
        let LinkState::Connected(handle) = &mut self.state else {
            return None;
        };
        match self.transport.receive(&mut handle.conn, &mut handle.buf) {
            Ok(Received::Data(n)) => {
                handle.stats.add_rx(n);
                Some(handle.buf[..n].to_vec())
            }
            Ok(Received::Empty) => None,
            Ok(Received::EndOfStream) => {
                warn!("server disconnected");
                self.reconnect();
                None
            }
            Err(LinkError::ConnectionReset) => {
                warn!("connection reset by remote host");
                self.reconnect();
                None
            }
            Err(e) => {
                warn!("error reading from socket: {}", e);
                None
            }
        }
    }

    /// Tear down the current connection and make exactly one connect attempt.
    fn reconnect(&mut self) -> bool {
        let previous = mem::replace(&mut self.state, LinkState::Reconnecting);
        self.notify();
        if let LinkState::Connected(handle) = previous {
            if self.close_handle(handle) {
                info!("stopped previous connection");
            } else {
                warn!("error stopping previous connection");
            }
        }

        if self.connect() {
            info!("reconnected successfully");
            return true;
        }
        // a failed connect holds no handle, so there is nothing left to release
        error!("reconnection attempt failed");
        if self.status() != ConnectionStatus::ConnectionError {
            self.set_state(LinkState::ConnectionError);
        }
        false
    }

    fn close_handle(&mut self, handle: Handle<T::Conn>) -> bool {
        info!("closing connection to {}: {}", handle.peer, handle.stats.summary());
        match self.transport.close(handle.conn) {
            Ok(()) => true,
            Err(e) => {
                error!("error closing socket: {}", e);
                false
            }
        }
    }

    fn set_state(&mut self, state: LinkState<T::Conn>) {
        self.state = state;
        self.notify();
    }

    fn notify(&mut self) {
        let status = self.state.status();
        debug!("status -> {}", status);
        self.sink.status_changed(status);
    }
}
