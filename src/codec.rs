//! JSON wire codec.
//!
//! Telemetry and ACKs share one channel, one document per datagram:
//!
//! ```text
//! {"seq":7,"timestamp":1700000000123,"latitude":39.0,"longitude":35.5,"speed":25.0,"status":"OK","needsAck":true}
//! {"type":"ACK","seq":7,"timestamp":1700000000150}
//! ```
//!
//! A document whose `type` is `"ACK"` is an acknowledgment. Anything else
//! that parses as an object with a `seq` is telemetry.

use serde::Serialize;
use serde_json::Value;

use crate::types::{AckPacket, TelemetryPacket};
use crate::{LinkError, Result};

/// Discriminator value marking an acknowledgment document.
pub const ACK_TYPE: &str = "ACK";

/// Largest datagram the receive loops accept.
pub const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// One decoded datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    Telemetry(TelemetryPacket),
    Ack(AckPacket),
}

impl From<TelemetryPacket> for WireMessage {
    fn from(packet: TelemetryPacket) -> Self {
        WireMessage::Telemetry(packet)
    }
}

impl From<AckPacket> for WireMessage {
    fn from(ack: AckPacket) -> Self {
        WireMessage::Ack(ack)
    }
}

#[derive(Serialize)]
struct AckDocument<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    ack: &'a AckPacket,
}

/// Encode a message as one compact JSON document.
pub fn encode(message: &WireMessage) -> Result<Vec<u8>> {
    match message {
        WireMessage::Telemetry(packet) => encode_telemetry(packet),
        WireMessage::Ack(ack) => encode_ack(ack),
    }
}

pub fn encode_telemetry(packet: &TelemetryPacket) -> Result<Vec<u8>> {
    serde_json::to_vec(packet).map_err(|e| LinkError::parse_error("telemetry encode", e.to_string()))
}

pub fn encode_ack(ack: &AckPacket) -> Result<Vec<u8>> {
    serde_json::to_vec(&AckDocument { kind: ACK_TYPE, ack })
        .map_err(|e| LinkError::parse_error("ack encode", e.to_string()))
}

/// Decode one datagram.
///
/// Returns [`LinkError::Parse`] for anything that is not a recognizable
/// document. Callers log and drop these.
pub fn decode(bytes: &[u8]) -> Result<WireMessage> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| LinkError::parse_error("datagram", e.to_string()))?;

    let Value::Object(ref object) = value else {
        return Err(LinkError::parse_error("datagram", "document is not an object"));
    };

    let is_ack = object.get("type").and_then(Value::as_str) == Some(ACK_TYPE);

    if is_ack {
        serde_json::from_value(value)
            .map(WireMessage::Ack)
            .map_err(|e| LinkError::parse_error("ack", e.to_string()))
    } else {
        serde_json::from_value(value)
            .map(WireMessage::Telemetry)
            .map_err(|e| LinkError::parse_error("telemetry", e.to_string()))
    }
}
