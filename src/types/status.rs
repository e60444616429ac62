//! Connectivity states and sender outcome events

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Connectivity state of a listening endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum LinkStatus {
    /// Socket closed, timers disarmed
    Stopped,

    /// Socket bound and periodic tasks running
    Listening { local_addr: SocketAddr },

    /// The last `start` could not bind; the endpoint stays stopped
    BindFailed { addr: SocketAddr, reason: String },
}

impl LinkStatus {
    pub fn is_listening(&self) -> bool {
        matches!(self, LinkStatus::Listening { .. })
    }
}

/// Outcome notifications from the sender reliability engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum SenderEvent {
    /// A pending packet was acknowledged
    AckReceived { sequence_number: u32 },

    /// A pending packet was sent again after its ACK timed out
    Retransmitted { sequence_number: u32, attempt: u32 },

    /// A packet exhausted its retransmission budget and was abandoned
    PacketTimeout { sequence_number: u32 },

    /// The transport refused a datagram; no retry is scheduled for it
    SendFailed { sequence_number: u32, reason: String },
}

impl SenderEvent {
    pub fn sequence_number(&self) -> u32 {
        match self {
            SenderEvent::AckReceived { sequence_number }
            | SenderEvent::Retransmitted { sequence_number, .. }
            | SenderEvent::PacketTimeout { sequence_number }
            | SenderEvent::SendFailed { sequence_number, .. } => *sequence_number,
        }
    }
}
