//! Telemetry and acknowledgment packets

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Status tag for a regular observation.
pub const STATUS_OK: &str = "OK";

/// Status tag for a sample synthesized by the receiver.
pub const STATUS_INTERPOLATED: &str = "INTERPOLATED";

/// Wall-clock point in time, as milliseconds since the Unix epoch.
///
/// Carried on the wire as a plain integer so no precision is lost.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        Self(millis)
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub const fn as_millis(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// One position observation in transit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct TelemetryPacket {
    /// Position in the sender's stream, starting at 1
    #[serde(rename = "seq")]
    pub sequence_number: u32,

    /// When the packet was produced or sent
    #[serde(default)]
    pub timestamp: Timestamp,

    /// Degrees, signed
    #[serde(default)]
    pub latitude: f64,

    /// Degrees, signed
    #[serde(default)]
    pub longitude: f64,

    /// km/h
    #[serde(default)]
    pub speed: f64,

    /// Opaque tag, see [`STATUS_OK`] and [`STATUS_INTERPOLATED`]
    #[serde(default)]
    pub status: String,

    /// Receiver must acknowledge this sequence number
    #[serde(rename = "needsAck", default)]
    pub needs_ack: bool,
}

impl Default for TelemetryPacket {
    fn default() -> Self {
        Self {
            sequence_number: 0,
            timestamp: Timestamp::default(),
            latitude: 0.0,
            longitude: 0.0,
            speed: 0.0,
            status: String::new(),
            needs_ack: false,
        }
    }
}

impl TelemetryPacket {
    /// A fresh reading with status `"OK"`.
    ///
    /// Sequence number, timestamp and `needs_ack` are stamped by the sender.
    pub fn reading(latitude: f64, longitude: f64, speed: f64) -> Self {
        Self {
            latitude,
            longitude,
            speed,
            status: STATUS_OK.to_string(),
            timestamp: Timestamp::now(),
            ..Self::default()
        }
    }

    /// Whether the receiver synthesized this packet to fill a gap.
    pub fn is_interpolated(&self) -> bool {
        self.status == STATUS_INTERPOLATED
    }

    /// Copy of this packet's position and speed placed at another sequence.
    pub(crate) fn substitute_for(&self, sequence_number: u32) -> Self {
        Self {
            sequence_number,
            timestamp: Timestamp::now(),
            needs_ack: false,
            ..self.clone()
        }
    }
}

/// Acknowledgment of one telemetry sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct AckPacket {
    #[serde(rename = "seq")]
    pub sequence_number: u32,

    #[serde(default)]
    pub timestamp: Timestamp,
}

impl AckPacket {
    /// Acknowledge `sequence_number` now.
    pub fn for_sequence(sequence_number: u32) -> Self {
        Self { sequence_number, timestamp: Timestamp::now() }
    }
}
