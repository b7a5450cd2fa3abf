//! Client-side link to an external telemetry producer: launch it, connect to
//! its TCP server, and consume its JSON telemetry with a single reconnect on
//! loss.

pub mod config;
pub mod error;
pub mod launch;
pub mod link;
pub mod sink;
pub mod stats;
pub mod transport;

pub use config::LinkConfig;
pub use error::LinkError;
pub use link::{ConnectionStatus, Link};
pub use sink::{LogSink, Sink, TelemetryRecord};
