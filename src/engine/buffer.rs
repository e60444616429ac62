//! Sequence-keyed receive buffer

use std::collections::BTreeMap;

use crate::types::TelemetryPacket;

/// Last packet seen per sequence number.
///
/// Ordered by sequence so eviction always drops the oldest part of the
/// stream and keeps the most recent window intact.
#[derive(Debug, Default)]
pub struct ReceiveBuffer {
    packets: BTreeMap<u32, TelemetryPacket>,
}

impl ReceiveBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `packet`, replacing any earlier copy of the same sequence.
    ///
    /// Returns `true` if the sequence was already buffered.
    pub fn insert(&mut self, packet: TelemetryPacket) -> bool {
        self.packets.insert(packet.sequence_number, packet).is_some()
    }

    pub fn contains(&self, sequence_number: u32) -> bool {
        self.packets.contains_key(&sequence_number)
    }

    pub fn get(&self, sequence_number: u32) -> Option<&TelemetryPacket> {
        self.packets.get(&sequence_number)
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Drop the lowest sequence numbers until at most `max_len` remain.
    ///
    /// Returns the evicted sequence numbers, lowest first.
    pub fn evict_to(&mut self, max_len: usize) -> Vec<u32> {
        let mut evicted = Vec::with_capacity(self.packets.len().saturating_sub(max_len));
        while self.packets.len() > max_len {
            match self.packets.pop_first() {
                Some((seq, _)) => evicted.push(seq),
                None => break,
            }
        }
        evicted
    }

    pub fn lowest(&self) -> Option<u32> {
        self.packets.keys().next().copied()
    }
}
