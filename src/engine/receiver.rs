//! Receiver reliability engine.
//!
//! Ingests telemetry datagrams, acknowledges the ones that ask for it, tracks
//! how far the stream has progressed and fills holes in it:
//!
//! - `expected` is the next sequence not yet accounted for. It moves forward
//!   across every contiguous buffered sequence, so a packet that arrives ahead
//!   of it leaves a gap `[expected, last_valid)` open.
//! - `last_valid` is the highest sequence actually received. Older or
//!   duplicate arrivals never move it back.
//! - The periodic gap check declares each missing sequence in the open gap
//!   lost exactly once, emitting an interpolated or repeated substitute.
//! - Cleanup may evict received packets that still sit inside the open gap.
//!   Their sequences stay counted as received until `expected` passes them.
//!
//! Packets are delivered in arrival order, not sequence order. Out-of-order
//! and retransmitted packets reach the consumer as they come in.

use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::buffer::ReceiveBuffer;
use super::interpolate::interpolate;
use crate::codec::{self, WireMessage};
use crate::config::ReceiverConfig;
use crate::transport::Transport;
use crate::types::{AckPacket, ReceiverStats, TelemetryPacket};

/// Channels a receiver engine publishes on.
///
/// Cloning shares the channels, so subscribers survive engine restarts.
#[derive(Debug, Clone)]
pub struct ReceiverOutputs {
    pub telemetry: broadcast::Sender<TelemetryPacket>,
    pub statistics: watch::Sender<ReceiverStats>,
}

impl ReceiverOutputs {
    pub fn new(capacity: usize) -> Self {
        let (telemetry, _) = broadcast::channel(capacity.max(1));
        let (statistics, _) = watch::channel(ReceiverStats::default());
        Self { telemetry, statistics }
    }
}

/// What happened to one datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Telemetry handed to sequence processing
    Accepted { sequence_number: u32, acked: bool },

    /// An ACK arrived on the receive path; those belong to the sender role
    AckIgnored,

    /// Not a recognizable document
    Malformed,

    /// The engine was closed
    Stopped,
}

#[derive(Debug)]
struct SequenceState {
    buffer: ReceiveBuffer,
    evicted_ahead: BTreeSet<u32>,
    expected: u32,
    last_valid: u32,
    last_valid_packet: TelemetryPacket,
    gap_opened: Option<Instant>,
    packets_received: u64,
    packets_lost: u64,
    packets_interpolated: u64,
}

impl SequenceState {
    fn new() -> Self {
        Self {
            buffer: ReceiveBuffer::new(),
            evicted_ahead: BTreeSet::new(),
            expected: 1,
            last_valid: 0,
            last_valid_packet: TelemetryPacket::default(),
            gap_opened: None,
            packets_received: 0,
            packets_lost: 0,
            packets_interpolated: 0,
        }
    }

    fn has_gap(&self) -> bool {
        self.expected < self.last_valid
    }

    /// Whether `seq` arrived, buffered or since evicted.
    fn received(&self, seq: u32) -> bool {
        self.buffer.contains(seq) || self.evicted_ahead.contains(&seq)
    }

    /// Move `expected` across every received sequence at the front.
    fn advance_expected(&mut self) {
        while self.received(self.expected) {
            match self.expected.checked_add(1) {
                Some(next) => self.expected = next,
                None => break,
            }
        }
        self.forget_passed();
    }

    /// Drop eviction records that `expected` has moved past.
    fn forget_passed(&mut self) {
        if self.evicted_ahead.first().is_some_and(|&seq| seq < self.expected) {
            self.evicted_ahead = self.evicted_ahead.split_off(&self.expected);
        }
    }
}

/// Sequencing, gap filling and acknowledgment for one listening session.
pub struct ReceiverEngine {
    transport: Arc<dyn Transport>,
    config: ReceiverConfig,
    state: RwLock<SequenceState>,
    acks_sent: AtomicU64,
    outputs: ReceiverOutputs,
    closed: AtomicBool,
}

impl ReceiverEngine {
    pub fn new(transport: Arc<dyn Transport>, config: ReceiverConfig, outputs: ReceiverOutputs) -> Self {
        Self {
            transport,
            config,
            state: RwLock::new(SequenceState::new()),
            acks_sent: AtomicU64::new(0),
            outputs,
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Handle one raw datagram from `from`.
    ///
    /// Malformed datagrams are logged and dropped. Telemetry asking for an ACK
    /// is acknowledged before it is processed.
    pub async fn on_datagram_received(&self, bytes: &[u8], from: SocketAddr) -> Disposition {
        if self.is_closed() {
            return Disposition::Stopped;
        }

        let packet = match codec::decode(bytes) {
            Ok(WireMessage::Telemetry(packet)) => packet,
            Ok(WireMessage::Ack(ack)) => {
                trace!(seq = ack.sequence_number, peer = %from, "Ignoring ACK on receive path");
                return Disposition::AckIgnored;
            }
            Err(e) => {
                warn!(peer = %from, len = bytes.len(), "Discarding datagram: {}", e);
                return Disposition::Malformed;
            }
        };

        let sequence_number = packet.sequence_number;
        trace!(
            seq = sequence_number,
            lat = packet.latitude,
            lon = packet.longitude,
            peer = %from,
            "Received telemetry"
        );

        let acked = packet.needs_ack && self.send_ack(sequence_number, from).await;
        self.process_packet(packet);

        Disposition::Accepted { sequence_number, acked }
    }

    async fn send_ack(&self, sequence_number: u32, dest: SocketAddr) -> bool {
        let bytes = match codec::encode_ack(&AckPacket::for_sequence(sequence_number)) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(seq = sequence_number, "Failed to encode ACK: {}", e);
                return false;
            }
        };

        match self.transport.send_to(&bytes, dest).await {
            Ok(_) => {
                self.acks_sent.fetch_add(1, Ordering::Relaxed);
                debug!(seq = sequence_number, peer = %dest, "Sent ACK");
                true
            }
            Err(e) => {
                warn!(seq = sequence_number, peer = %dest, "Failed to send ACK: {}", e);
                false
            }
        }
    }

    /// Record an accepted telemetry packet and deliver it.
    pub fn process_packet(&self, packet: TelemetryPacket) {
        if self.is_closed() {
            return;
        }

        let mut state = self.state.write();
        let sequence_number = packet.sequence_number;

        // The first packet of a session anchors the stream, so joining a
        // running sender does not count everything before it as lost.
        if state.packets_received == 0 && state.last_valid == 0 {
            state.expected = sequence_number;
        }
        state.packets_received += 1;

        if sequence_number >= state.last_valid {
            state.last_valid = sequence_number;
            state.last_valid_packet = packet.clone();
        }

        state.buffer.insert(packet.clone());
        state.advance_expected();

        if !state.has_gap() {
            state.gap_opened = None;
        } else if state.gap_opened.is_none() {
            state.gap_opened = Some(Instant::now());
            debug!(from = state.expected, to = state.last_valid, "Sequence gap opened");
        }

        self.deliver(packet);
        self.publish(&state);
    }

    /// Declare missing sequences lost and emit substitutes for them.
    ///
    /// Returns how many sequences were filled.
    pub fn check_for_missing_packets(&self) -> usize {
        self.check_for_missing_packets_at(Instant::now())
    }

    /// Gap check against an explicit clock reading.
    pub fn check_for_missing_packets_at(&self, now: Instant) -> usize {
        if self.is_closed() {
            return 0;
        }

        let mut state = self.state.write();

        if !state.has_gap() {
            state.gap_opened = None;
            self.publish(&state);
            return 0;
        }

        let opened = *state.gap_opened.get_or_insert(now);
        if now.saturating_duration_since(opened) < self.config.packet_timeout() {
            trace!(from = state.expected, to = state.last_valid, "Gap still within packet timeout");
            return 0;
        }

        let limit = self.config.max_buffer_size;
        let end = state.last_valid;
        let mut filled = 0;
        let mut seq = state.expected;

        while seq < end && filled < limit {
            if !state.received(seq) {
                state.packets_lost += 1;

                let substitute = if self.config.interpolation_enabled {
                    state.packets_interpolated += 1;
                    debug!(seq, "Interpolated lost packet");
                    interpolate(&state.buffer, seq, &state.last_valid_packet)
                } else {
                    debug!(seq, "Repeated last valid packet for lost sequence");
                    state.last_valid_packet.substitute_for(seq)
                };

                self.deliver(substitute);
                filled += 1;
            }
            seq += 1;
            state.expected = seq;
        }
        state.forget_passed();

        if !state.has_gap() {
            state.gap_opened = None;
        }

        self.publish(&state);
        filled
    }

    /// Evict the lowest sequences once the buffer exceeds its bound.
    ///
    /// Evicted sequences inside the open gap are remembered, so a later gap
    /// check does not mistake them for losses.
    ///
    /// Returns how many packets were evicted.
    pub fn cleanup_old_packets(&self) -> usize {
        if self.is_closed() {
            return 0;
        }

        let mut state = self.state.write();
        let expected = state.expected;
        let removed = state.buffer.evict_to(self.config.max_buffer_size);
        let evicted = removed.len();
        state.evicted_ahead.extend(removed.into_iter().filter(|&seq| seq >= expected));
        if evicted > 0 {
            debug!(evicted, remaining = state.buffer.len(), "Cleaned up old packets");
        }
        self.publish(&state);
        evicted
    }

    /// Current counters.
    pub fn statistics(&self) -> ReceiverStats {
        self.snapshot(&self.state.read())
    }

    /// Whether a packet for `sequence_number` is buffered.
    pub fn is_buffered(&self, sequence_number: u32) -> bool {
        self.state.read().buffer.contains(sequence_number)
    }

    /// Stop emitting. Every later call becomes a no-op.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn snapshot(&self, state: &SequenceState) -> ReceiverStats {
        ReceiverStats {
            packets_received: state.packets_received,
            packets_lost: state.packets_lost,
            packets_interpolated: state.packets_interpolated,
            acks_sent: self.acks_sent.load(Ordering::Relaxed),
            buffered: state.buffer.len() as u64,
            expected_sequence: state.expected,
            last_valid_sequence: state.last_valid,
        }
    }

    fn deliver(&self, packet: TelemetryPacket) {
        // No subscribers is not an error; the packet is simply not observed.
        let _ = self.outputs.telemetry.send(packet);
    }

    fn publish(&self, state: &SequenceState) {
        if !self.is_closed() {
            self.outputs.statistics.send_replace(self.snapshot(state));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingTransport, packet};
    use std::time::Duration;

    fn engine_with(config: ReceiverConfig) -> (ReceiverEngine, Arc<RecordingTransport>, ReceiverOutputs) {
        let transport = Arc::new(RecordingTransport::new());
        let outputs = ReceiverOutputs::new(4096);
        let engine = ReceiverEngine::new(transport.clone(), config, outputs.clone());
        (engine, transport, outputs)
    }

    fn drain(rx: &mut broadcast::Receiver<TelemetryPacket>) -> Vec<TelemetryPacket> {
        let mut out = Vec::new();
        while let Ok(packet) = rx.try_recv() {
            out.push(packet);
        }
        out
    }

    fn peer() -> SocketAddr {
        "10.0.0.7:40000".parse().unwrap()
    }

    #[tokio::test]
    async fn acknowledges_packets_that_request_it() {
        let (engine, transport, _outputs) = engine_with(ReceiverConfig::default());
        let mut wanted = packet(1, 1.0, 2.0, 3.0);
        wanted.needs_ack = true;

        let bytes = codec::encode_telemetry(&wanted).unwrap();
        let disposition = engine.on_datagram_received(&bytes, peer()).await;

        assert_eq!(disposition, Disposition::Accepted { sequence_number: 1, acked: true });
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, peer());
        match codec::decode(&sent[0].0).unwrap() {
            WireMessage::Ack(ack) => assert_eq!(ack.sequence_number, 1),
            other => panic!("expected ACK, got {:?}", other),
        }
        assert_eq!(engine.statistics().acks_sent, 1);
    }

    #[tokio::test]
    async fn failed_ack_is_not_counted() {
        let (engine, transport, _outputs) = engine_with(ReceiverConfig::default());
        transport.set_fail_sends(true);
        let mut wanted = packet(1, 0.0, 0.0, 0.0);
        wanted.needs_ack = true;

        let bytes = codec::encode_telemetry(&wanted).unwrap();
        let disposition = engine.on_datagram_received(&bytes, peer()).await;

        assert_eq!(disposition, Disposition::Accepted { sequence_number: 1, acked: false });
        let stats = engine.statistics();
        assert_eq!(stats.acks_sent, 0);
        assert_eq!(stats.packets_received, 1);
    }

    #[tokio::test]
    async fn garbage_and_acks_are_dropped() {
        let (engine, transport, outputs) = engine_with(ReceiverConfig::default());
        let mut rx = outputs.telemetry.subscribe();

        assert_eq!(engine.on_datagram_received(b"\x00\xffnot json", peer()).await, Disposition::Malformed);
        let ack = codec::encode_ack(&AckPacket::for_sequence(3)).unwrap();
        assert_eq!(engine.on_datagram_received(&ack, peer()).await, Disposition::AckIgnored);

        assert!(drain(&mut rx).is_empty());
        assert!(transport.sent().is_empty());
        assert_eq!(engine.statistics().packets_received, 0);
    }

    #[test]
    fn delivers_in_arrival_order() {
        let (engine, _transport, outputs) = engine_with(ReceiverConfig::default());
        let mut rx = outputs.telemetry.subscribe();

        for seq in [1, 3, 2] {
            engine.process_packet(packet(seq, 0.0, 0.0, 0.0));
        }

        let seqs: Vec<u32> = drain(&mut rx).iter().map(|p| p.sequence_number).collect();
        assert_eq!(seqs, vec![1, 3, 2]);
        let stats = engine.statistics();
        assert_eq!(stats.expected_sequence, 4);
        assert_eq!(stats.last_valid_sequence, 3);
    }

    #[test]
    fn duplicates_never_regress_watermarks() {
        let (engine, _transport, _outputs) = engine_with(ReceiverConfig::default());
        for seq in 1..=5 {
            engine.process_packet(packet(seq, 0.0, 0.0, 0.0));
        }
        let before = engine.statistics();

        engine.process_packet(packet(5, 0.0, 0.0, 0.0));
        engine.process_packet(packet(2, 0.0, 0.0, 0.0));

        let after = engine.statistics();
        assert_eq!(after.last_valid_sequence, before.last_valid_sequence);
        assert_eq!(after.expected_sequence, before.expected_sequence);
        assert_eq!(after.packets_received, 7);
        assert_eq!(after.buffered, 5);
    }

    #[test]
    fn older_packet_does_not_replace_last_valid() {
        let (engine, _transport, outputs) = engine_with(ReceiverConfig::default().with_interpolation(false));
        engine.process_packet(packet(1, 1.0, 1.0, 1.0));
        engine.process_packet(packet(4, 4.0, 4.0, 4.0));
        engine.process_packet(packet(2, 2.0, 2.0, 2.0));

        let mut rx = outputs.telemetry.subscribe();
        assert_eq!(engine.check_for_missing_packets(), 1);

        let filled = drain(&mut rx);
        assert_eq!(filled.len(), 1);
        assert_eq!(filled[0].sequence_number, 3);
        assert_eq!(filled[0].latitude, 4.0);
    }

    #[test]
    fn gap_is_interpolated_exactly_once() {
        let (engine, _transport, outputs) = engine_with(ReceiverConfig::default());
        for seq in 1..=4 {
            engine.process_packet(packet(seq, 0.0, 0.0, 0.0));
        }
        engine.process_packet(packet(5, 10.0, 20.0, 8.0));
        engine.process_packet(packet(9, 14.0, 28.0, 16.0));
        assert_eq!(engine.statistics().expected_sequence, 6);

        let mut rx = outputs.telemetry.subscribe();
        assert_eq!(engine.check_for_missing_packets(), 3);

        let filled = drain(&mut rx);
        assert_eq!(filled.iter().map(|p| p.sequence_number).collect::<Vec<_>>(), vec![6, 7, 8]);
        for (packet, fraction) in filled.iter().zip([0.25, 0.5, 0.75]) {
            assert!(packet.is_interpolated());
            assert!((packet.latitude - (10.0 + 4.0 * fraction)).abs() < 1e-9);
            assert!((packet.longitude - (20.0 + 8.0 * fraction)).abs() < 1e-9);
            assert!((packet.speed - (8.0 + 8.0 * fraction)).abs() < 1e-9);
        }

        let stats = engine.statistics();
        assert_eq!(stats.expected_sequence, 9);
        assert_eq!(stats.packets_lost, 3);
        assert_eq!(stats.packets_interpolated, 3);

        assert_eq!(engine.check_for_missing_packets(), 0);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(engine.statistics().packets_lost, 3);
    }

    #[test]
    fn fallback_uses_last_valid_packet() {
        let (engine, _transport, outputs) = engine_with(ReceiverConfig::default());
        engine.process_packet(packet(1, 0.0, 0.0, 0.0));
        engine.process_packet(packet(30, 7.0, 8.0, 9.0));
        engine.cleanup_old_packets();

        let mut rx = outputs.telemetry.subscribe();
        engine.check_for_missing_packets();

        let filled = drain(&mut rx);
        assert_eq!(filled.len(), 28);
        // 15 is more than 9 away from both 1 and 30.
        let middle = filled.iter().find(|p| p.sequence_number == 15).unwrap();
        assert_eq!((middle.latitude, middle.longitude, middle.speed), (7.0, 8.0, 9.0));
        assert!(middle.is_interpolated());
    }

    #[test]
    fn disabled_interpolation_repeats_last_valid() {
        let (engine, _transport, outputs) = engine_with(ReceiverConfig::default().with_interpolation(false));
        engine.process_packet(packet(1, 1.0, 1.0, 1.0));
        engine.process_packet(packet(3, 3.0, 3.0, 3.0));

        let mut rx = outputs.telemetry.subscribe();
        assert_eq!(engine.check_for_missing_packets(), 1);

        let filled = drain(&mut rx);
        assert_eq!(filled[0].sequence_number, 2);
        assert_eq!(filled[0].latitude, 3.0);
        assert!(!filled[0].is_interpolated());

        let stats = engine.statistics();
        assert_eq!(stats.packets_lost, 1);
        assert_eq!(stats.packets_interpolated, 0);
    }

    #[test]
    fn late_arrival_closes_gap_before_check() {
        let (engine, _transport, outputs) = engine_with(ReceiverConfig::default());
        engine.process_packet(packet(1, 0.0, 0.0, 0.0));
        engine.process_packet(packet(3, 0.0, 0.0, 0.0));
        engine.process_packet(packet(2, 0.0, 0.0, 0.0));

        let mut rx = outputs.telemetry.subscribe();
        assert_eq!(engine.check_for_missing_packets(), 0);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(engine.statistics().expected_sequence, 4);
    }

    #[test]
    fn packet_timeout_delays_gap_declaration() {
        let config = ReceiverConfig::default().with_packet_timeout(Duration::from_secs(5));
        let (engine, _transport, _outputs) = engine_with(config);
        engine.process_packet(packet(1, 0.0, 0.0, 0.0));
        engine.process_packet(packet(3, 0.0, 0.0, 0.0));

        let now = Instant::now();
        assert_eq!(engine.check_for_missing_packets_at(now), 0);
        assert_eq!(engine.check_for_missing_packets_at(now + Duration::from_secs(6)), 1);
    }

    #[test]
    fn huge_gap_is_filled_in_bounded_batches() {
        let config = ReceiverConfig::default().with_max_buffer_size(10).with_interpolation(false);
        let (engine, _transport, _outputs) = engine_with(config);
        engine.process_packet(packet(1, 0.0, 0.0, 0.0));
        engine.process_packet(packet(26, 0.0, 0.0, 0.0));

        assert_eq!(engine.check_for_missing_packets(), 10);
        assert_eq!(engine.check_for_missing_packets(), 10);
        assert_eq!(engine.check_for_missing_packets(), 4);
        assert_eq!(engine.check_for_missing_packets(), 0);
        assert_eq!(engine.statistics().packets_lost, 24);
    }

    #[test]
    fn cleanup_evicts_lowest_sequences() {
        let (engine, _transport, _outputs) = engine_with(ReceiverConfig::default());
        for seq in 1..=1050 {
            engine.process_packet(packet(seq, 0.0, 0.0, 0.0));
        }

        assert_eq!(engine.cleanup_old_packets(), 50);
        assert_eq!(engine.statistics().buffered, 1000);
        assert!(!engine.is_buffered(50));
        assert!(engine.is_buffered(51));
        assert!(engine.is_buffered(1050));
        assert_eq!(engine.cleanup_old_packets(), 0);
    }

    #[test]
    fn evicted_packets_inside_gap_are_not_declared_lost() {
        let config = ReceiverConfig::default()
            .with_max_buffer_size(10)
            .with_packet_timeout(Duration::from_secs(5));
        let (engine, _transport, outputs) = engine_with(config);
        let mut rx = outputs.telemetry.subscribe();

        engine.process_packet(packet(1, 0.0, 0.0, 0.0));
        for seq in 3..=20 {
            engine.process_packet(packet(seq, 0.0, 0.0, 0.0));
        }
        drain(&mut rx);

        let now = Instant::now();
        assert_eq!(engine.check_for_missing_packets_at(now), 0);
        assert_eq!(engine.cleanup_old_packets(), 9);
        assert!(!engine.is_buffered(10));

        assert_eq!(engine.check_for_missing_packets_at(now + Duration::from_secs(6)), 1);
        let substitutes: Vec<u32> = drain(&mut rx).iter().map(|p| p.sequence_number).collect();
        assert_eq!(substitutes, vec![2]);

        let stats = engine.statistics();
        assert_eq!(stats.packets_lost, 1);
        assert_eq!(stats.packets_received, 19);
        assert_eq!(stats.expected_sequence, 20);
    }

    #[test]
    fn late_arrival_advances_across_evicted_sequences() {
        let config = ReceiverConfig::default().with_max_buffer_size(3);
        let (engine, _transport, _outputs) = engine_with(config);

        engine.process_packet(packet(1, 0.0, 0.0, 0.0));
        for seq in 3..=7 {
            engine.process_packet(packet(seq, 0.0, 0.0, 0.0));
        }
        assert_eq!(engine.cleanup_old_packets(), 3);

        // 2 closes the hole; 3 and 4 were evicted but still count as received.
        engine.process_packet(packet(2, 0.0, 0.0, 0.0));
        let stats = engine.statistics();
        assert_eq!(stats.expected_sequence, 8);
        assert_eq!(engine.check_for_missing_packets(), 0);
        assert_eq!(engine.statistics().packets_lost, 0);
    }

    #[test]
    fn loss_rate_reflects_counters() {
        let (engine, _transport, _outputs) = engine_with(ReceiverConfig::default());
        for seq in 1..=97 {
            engine.process_packet(packet(seq, 0.0, 0.0, 0.0));
        }
        engine.process_packet(packet(101, 0.0, 0.0, 0.0));
        engine.check_for_missing_packets();

        let stats = engine.statistics();
        assert_eq!(stats.packets_lost, 3);
        assert_eq!(stats.packets_received, 98);
        assert!((stats.loss_rate() - 3.0 / 101.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn statistics_are_published_after_each_batch() {
        let (engine, _transport, outputs) = engine_with(ReceiverConfig::default());
        let mut stats_rx = outputs.statistics.subscribe();

        engine.process_packet(packet(1, 0.0, 0.0, 0.0));
        assert!(stats_rx.has_changed().unwrap());
        assert_eq!(stats_rx.borrow_and_update().packets_received, 1);

        engine.check_for_missing_packets();
        assert!(stats_rx.has_changed().unwrap());
        stats_rx.borrow_and_update();

        engine.cleanup_old_packets();
        assert!(stats_rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn closed_engine_emits_nothing() {
        let (engine, transport, outputs) = engine_with(ReceiverConfig::default());
        let mut rx = outputs.telemetry.subscribe();
        let mut stats_rx = outputs.statistics.subscribe();
        engine.process_packet(packet(1, 0.0, 0.0, 0.0));
        drain(&mut rx);
        stats_rx.borrow_and_update();

        engine.close();

        let mut late = packet(5, 0.0, 0.0, 0.0);
        late.needs_ack = true;
        let bytes = codec::encode_telemetry(&late).unwrap();
        assert_eq!(engine.on_datagram_received(&bytes, peer()).await, Disposition::Stopped);
        engine.process_packet(packet(6, 0.0, 0.0, 0.0));
        assert_eq!(engine.check_for_missing_packets(), 0);
        engine.cleanup_old_packets();

        assert!(drain(&mut rx).is_empty());
        assert!(!stats_rx.has_changed().unwrap());
        assert!(transport.sent().is_empty());
    }
}
