//! Telemetry payload decoding and delivery.
//!
//! Each payload is whatever one receive returned. It is decoded on its own:
//! two messages that arrive in one read, or one message split across reads,
//! both fail to decode and are dropped with a warning.

use std::str::Utf8Error;

use log::{info, warn};
use serde::Deserialize;
use thiserror::Error;

use crate::link::ConnectionStatus;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not UTF-8: {0}")]
    Utf8(#[from] Utf8Error),
    #[error("error parsing JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
}

/// Field name and log label, in output order.
pub const FIELDS: [(&str, &str); 6] = [
    ("timestamp", "Timestamp"),
    ("latitude", "Latitude"),
    ("longitude", "Longitude"),
    ("azimuth", "Azimuth"),
    ("elevation", "Elevation"),
    ("distance", "Distance"),
];

/// One decoded payload. Every field is optional and unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TelemetryRecord {
    pub timestamp: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub azimuth: Option<f64>,
    pub elevation: Option<f64>,
    pub distance: Option<f64>,
}

impl TelemetryRecord {
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(payload)?;
        let value: serde_json::Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(DecodeError::NotAnObject);
        }
        Ok(serde_json::from_value(value)?)
    }

    fn values(&self) -> [Option<f64>; 6] {
        [
            self.timestamp,
            self.latitude,
            self.longitude,
            self.azimuth,
            self.elevation,
            self.distance,
        ]
    }

    /// Present fields as `(name, value)`, in [`FIELDS`] order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, f64)> {
        FIELDS
            .into_iter()
            .zip(self.values())
            .filter_map(|((name, _), value)| value.map(|v| (name, v)))
    }

    pub fn is_empty(&self) -> bool {
        self.values().iter().all(Option::is_none)
    }
}

/// Log line for one record, tagged with the receive counter.
pub fn format_record(rx_count: u64, record: &TelemetryRecord) -> String {
    let mut out = format!("{} ::", rx_count);
    for ((_, label), value) in FIELDS.into_iter().zip(record.values()) {
        if let Some(v) = value {
            out.push_str(&format!(" {}: {:.6}", label, v));
        }
    }
    out
}

/// Downstream consumer of received telemetry.
pub trait Sink {
    fn record(&mut self, rx_count: u64, record: TelemetryRecord);

    /// Called on every status transition, in order.
    fn status_changed(&mut self, _status: ConnectionStatus) {}

    /// Decode one payload and pass it on. Decode failures stop here.
    fn ingest(&mut self, rx_count: u64, payload: &[u8]) {
        match TelemetryRecord::decode(payload) {
            Ok(record) => self.record(rx_count, record),
            Err(e) => warn!("{} (payload {} bytes)", e, payload.len()),
        }
    }
}

/// Writes every record to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl Sink for LogSink {
    fn record(&mut self, rx_count: u64, record: TelemetryRecord) {
        info!("{}", format_record(rx_count, &record));
    }
}
