//! Link-quality statistics snapshots

use serde::{Deserialize, Serialize};
use std::fmt;

/// Receiver counters at one point in time.
///
/// Counters are monotonic for the lifetime of one listening session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct ReceiverStats {
    /// Telemetry datagrams accepted, duplicates included
    pub packets_received: u64,

    /// Sequences declared missing by the gap check
    pub packets_lost: u64,

    /// Lost sequences replaced by an interpolated sample
    pub packets_interpolated: u64,

    /// ACKs successfully written to the socket
    pub acks_sent: u64,

    /// Packets currently held in the receive buffer
    pub buffered: u64,

    /// Next sequence number not yet accounted for
    pub expected_sequence: u32,

    /// Highest sequence number actually received
    pub last_valid_sequence: u32,
}

impl ReceiverStats {
    /// Percentage of the stream that was lost.
    ///
    /// `lost / (received + lost) × 100`, or `0` before any traffic.
    pub fn loss_rate(&self) -> f64 {
        loss_rate(self.packets_received, self.packets_lost)
    }
}

impl fmt::Display for ReceiverStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "received {} | lost {} | interpolated {} | acks {} | loss {:.1}%",
            self.packets_received,
            self.packets_lost,
            self.packets_interpolated,
            self.acks_sent,
            self.loss_rate()
        )
    }
}

/// Sender counters at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct SenderStats {
    /// Send attempts, failed ones included
    pub packets_sent: u64,

    pub send_failures: u64,

    /// ACKs that resolved a pending packet
    pub acks_received: u64,

    /// ACKs for sequences that were not pending
    pub stale_acks: u64,

    pub retransmissions: u64,

    /// Packets abandoned after exhausting the retry budget
    pub timeouts: u64,

    /// Packets currently awaiting acknowledgment
    pub pending: u64,
}

impl fmt::Display for SenderStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent {} | acked {} | retransmitted {} | timed out {} | pending {}",
            self.packets_sent, self.acks_received, self.retransmissions, self.timeouts, self.pending
        )
    }
}

/// Loss percentage for the given counters.
pub fn loss_rate(received: u64, lost: u64) -> f64 {
    let total = received + lost;
    if total == 0 { 0.0 } else { lost as f64 / total as f64 * 100.0 }
}
