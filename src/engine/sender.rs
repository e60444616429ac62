//! Sender reliability engine.
//!
//! Stamps outgoing telemetry with a monotonically increasing sequence number,
//! remembers every reliable packet until its ACK arrives, and retransmits
//! packets whose ACK is overdue. A packet that stays unacknowledged after
//! `max_retransmissions` resends is abandoned with a [`SenderEvent::PacketTimeout`].

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::codec::{self, WireMessage};
use crate::config::SenderConfig;
use crate::transport::Transport;
use crate::types::{AckPacket, SenderEvent, SenderStats, TelemetryPacket, Timestamp};
use crate::{LinkError, Result};

/// Channels a sender engine publishes on.
#[derive(Debug, Clone)]
pub struct SenderOutputs {
    pub events: broadcast::Sender<SenderEvent>,
    pub statistics: watch::Sender<SenderStats>,
}

impl SenderOutputs {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        let (statistics, _) = watch::channel(SenderStats::default());
        Self { events, statistics }
    }
}

/// A reliable packet waiting for its ACK.
#[derive(Debug, Clone)]
pub struct PendingAck {
    pub packet: TelemetryPacket,
    pub sent_time: Instant,
    pub retransmission_count: u32,
}

/// Outcome of one timeout sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeoutReport {
    /// Sequences resent, in ascending order
    pub retransmitted: Vec<u32>,

    /// Sequences abandoned, in ascending order
    pub timed_out: Vec<u32>,
}

impl TimeoutReport {
    pub fn is_empty(&self) -> bool {
        self.retransmitted.is_empty() && self.timed_out.is_empty()
    }
}

#[derive(Debug, Default)]
struct Counters {
    packets_sent: AtomicU64,
    send_failures: AtomicU64,
    acks_received: AtomicU64,
    stale_acks: AtomicU64,
    retransmissions: AtomicU64,
    timeouts: AtomicU64,
}

pub struct SenderEngine {
    transport: Arc<dyn Transport>,
    config: SenderConfig,
    target: RwLock<SocketAddr>,
    next_sequence: AtomicU32,
    pending: Mutex<HashMap<u32, PendingAck>>,
    counters: Counters,
    outputs: SenderOutputs,
    closed: AtomicBool,
}

impl SenderEngine {
    pub fn new(transport: Arc<dyn Transport>, config: SenderConfig, outputs: SenderOutputs) -> Self {
        let target = config.target;
        Self {
            transport,
            config,
            target: RwLock::new(target),
            next_sequence: AtomicU32::new(1),
            pending: Mutex::new(HashMap::new()),
            counters: Counters::default(),
            outputs,
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    /// Send one reading and return the sequence number it was given.
    ///
    /// The sequence number, timestamp and ACK flag of `packet` are overwritten.
    /// A failed send consumes its sequence number but leaves nothing pending.
    /// Sequence numbers are never reused, so the last one a sender can hand
    /// out is `u32::MAX - 1`.
    pub async fn send(&self, packet: TelemetryPacket) -> Result<u32> {
        if self.is_closed() {
            return Err(LinkError::not_running("sender"));
        }

        let sequence_number = self
            .next_sequence
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |seq| seq.checked_add(1))
            .map_err(|last| LinkError::SequenceExhausted { last })?;
        let reliable = self.config.reliability_enabled;
        let packet = TelemetryPacket {
            sequence_number,
            timestamp: Timestamp::now(),
            needs_ack: reliable,
            ..packet
        };
        let bytes = codec::encode_telemetry(&packet)?;
        let target = self.target();

        // Registered before the send so an ACK can never beat its entry.
        if reliable {
            self.pending.lock().insert(
                sequence_number,
                PendingAck { packet: packet.clone(), sent_time: Instant::now(), retransmission_count: 0 },
            );
        }

        self.counters.packets_sent.fetch_add(1, Ordering::Relaxed);
        let result = self.transport.send_to(&bytes, target).await;

        match result {
            Ok(_) => {
                trace!(seq = sequence_number, target = %target, reliable, "Sent telemetry");
                self.publish();
                Ok(sequence_number)
            }
            Err(source) => {
                if reliable {
                    self.pending.lock().remove(&sequence_number);
                }
                self.counters.send_failures.fetch_add(1, Ordering::Relaxed);
                warn!(seq = sequence_number, target = %target, "Failed to send telemetry: {}", source);
                self.emit(SenderEvent::SendFailed { sequence_number, reason: source.to_string() });
                self.publish();
                Err(LinkError::send_failed(target, source))
            }
        }
    }

    /// Handle one datagram that arrived on the sending socket.
    pub fn on_datagram_received(&self, bytes: &[u8], from: SocketAddr) {
        match codec::decode(bytes) {
            Ok(WireMessage::Ack(ack)) => {
                self.on_ack_received(&ack);
            }
            Ok(WireMessage::Telemetry(packet)) => {
                trace!(seq = packet.sequence_number, peer = %from, "Ignoring telemetry on ACK path");
            }
            Err(e) => {
                warn!(peer = %from, len = bytes.len(), "Discarding datagram: {}", e);
            }
        }
    }

    /// Settle the pending entry for `ack`.
    ///
    /// Returns `false` for an ACK with nothing pending, which is counted as
    /// stale and otherwise ignored.
    pub fn on_ack_received(&self, ack: &AckPacket) -> bool {
        if self.is_closed() {
            return false;
        }

        let sequence_number = ack.sequence_number;
        let settled = self.pending.lock().remove(&sequence_number);

        let matched = match settled {
            Some(entry) => {
                self.counters.acks_received.fetch_add(1, Ordering::Relaxed);
                debug!(
                    seq = sequence_number,
                    retransmissions = entry.retransmission_count,
                    "ACK received"
                );
                self.emit(SenderEvent::AckReceived { sequence_number });
                true
            }
            None => {
                self.counters.stale_acks.fetch_add(1, Ordering::Relaxed);
                trace!(seq = sequence_number, "ACK for unknown sequence");
                false
            }
        };

        self.publish();
        matched
    }

    /// Retransmit or abandon every pending packet whose ACK is overdue.
    pub async fn check_timeouts(&self) -> TimeoutReport {
        self.check_timeouts_at(Instant::now()).await
    }

    /// Timeout sweep against an explicit clock reading.
    pub async fn check_timeouts_at(&self, now: Instant) -> TimeoutReport {
        if self.is_closed() {
            return TimeoutReport::default();
        }

        let ack_timeout = self.config.ack_timeout();
        let max_retransmissions = self.config.max_retransmissions;
        let mut resend = Vec::new();
        let mut report = TimeoutReport::default();

        {
            let mut pending = self.pending.lock();
            let mut overdue: Vec<u32> = pending
                .iter()
                .filter(|(_, entry)| now.saturating_duration_since(entry.sent_time) > ack_timeout)
                .map(|(&seq, _)| seq)
                .collect();
            overdue.sort_unstable();

            for seq in overdue {
                let Some(entry) = pending.get_mut(&seq) else { continue };
                if entry.retransmission_count < max_retransmissions {
                    entry.retransmission_count += 1;
                    entry.sent_time = now;
                    resend.push((seq, entry.retransmission_count, entry.packet.clone()));
                } else {
                    pending.remove(&seq);
                    report.timed_out.push(seq);
                }
            }
        }

        let target = self.target();
        for (sequence_number, attempt, packet) in resend {
            report.retransmitted.push(sequence_number);
            self.counters.packets_sent.fetch_add(1, Ordering::Relaxed);

            let sent = match codec::encode_telemetry(&packet) {
                Ok(bytes) => self
                    .transport
                    .send_to(&bytes, target)
                    .await
                    .map_err(|source| LinkError::send_failed(target, source)),
                Err(e) => Err(e),
            };

            match sent {
                Ok(_) => {
                    self.counters.retransmissions.fetch_add(1, Ordering::Relaxed);
                    debug!(seq = sequence_number, attempt, max = max_retransmissions, "Retransmitted packet");
                    self.emit(SenderEvent::Retransmitted { sequence_number, attempt });
                }
                Err(e) => {
                    self.counters.send_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(seq = sequence_number, attempt, "Retransmission failed: {}", e);
                    self.emit(SenderEvent::SendFailed { sequence_number, reason: e.to_string() });
                }
            }
        }

        for &sequence_number in &report.timed_out {
            self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
            warn!(
                seq = sequence_number,
                retransmissions = max_retransmissions,
                "Packet timed out without ACK"
            );
            self.emit(SenderEvent::PacketTimeout { sequence_number });
        }

        if !report.is_empty() {
            self.publish();
        }
        report
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Snapshot of one pending entry.
    pub fn pending(&self, sequence_number: u32) -> Option<PendingAck> {
        self.pending.lock().get(&sequence_number).cloned()
    }

    /// Sequence number the next send will use.
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence.load(Ordering::Relaxed)
    }

    pub fn target(&self) -> SocketAddr {
        *self.target.read()
    }

    /// Redirect later sends and retransmissions to `target`.
    pub fn set_target(&self, target: SocketAddr) {
        let previous = std::mem::replace(&mut *self.target.write(), target);
        if previous != target {
            debug!(from = %previous, to = %target, "Sender target changed");
        }
    }

    pub fn statistics(&self) -> SenderStats {
        SenderStats {
            packets_sent: self.counters.packets_sent.load(Ordering::Relaxed),
            send_failures: self.counters.send_failures.load(Ordering::Relaxed),
            acks_received: self.counters.acks_received.load(Ordering::Relaxed),
            stale_acks: self.counters.stale_acks.load(Ordering::Relaxed),
            retransmissions: self.counters.retransmissions.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
            pending: self.pending_count() as u64,
        }
    }

    /// Stop emitting and refuse further sends.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn emit(&self, event: SenderEvent) {
        if !self.is_closed() {
            let _ = self.outputs.events.send(event);
        }
    }

    fn publish(&self) {
        if !self.is_closed() {
            self.outputs.statistics.send_replace(self.statistics());
        }
    }
}
