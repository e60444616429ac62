//! Gap interpolation policy.
//!
//! A missing sample is rebuilt from the nearest buffered neighbours within
//! [`SEARCH_WINDOW`] sequence numbers on either side:
//!
//! - both neighbours: linear blend at `(target - before) / (after - before)`
//! - one neighbour: its position and speed are copied
//! - none: the caller's fallback packet is copied
//!
//! The window bounds the cost of each lookup on sparse buffers.

use super::buffer::ReceiveBuffer;
use crate::types::{STATUS_INTERPOLATED, TelemetryPacket, Timestamp};

/// How far to search for a neighbour on each side.
pub const SEARCH_WINDOW: u32 = 9;

/// Nearest buffered packet below `target`, at most [`SEARCH_WINDOW`] away.
pub fn predecessor(buffer: &ReceiveBuffer, target: u32) -> Option<&TelemetryPacket> {
    (1..=SEARCH_WINDOW)
        .map_while(|distance| target.checked_sub(distance))
        .take_while(|&seq| seq > 0)
        .find_map(|seq| buffer.get(seq))
}

/// Nearest buffered packet above `target`, at most [`SEARCH_WINDOW`] away.
pub fn successor(buffer: &ReceiveBuffer, target: u32) -> Option<&TelemetryPacket> {
    (1..=SEARCH_WINDOW)
        .map_while(|distance| target.checked_add(distance))
        .find_map(|seq| buffer.get(seq))
}

/// Synthesize a replacement for `target`.
///
/// The result is tagged [`STATUS_INTERPOLATED`], stamped now, and never
/// requests an ACK.
pub fn interpolate(buffer: &ReceiveBuffer, target: u32, fallback: &TelemetryPacket) -> TelemetryPacket {
    let (latitude, longitude, speed) = match (predecessor(buffer, target), successor(buffer, target)) {
        (Some(before), Some(after)) => {
            let span = f64::from(after.sequence_number - before.sequence_number);
            let factor = f64::from(target - before.sequence_number) / span;
            (
                lerp(before.latitude, after.latitude, factor),
                lerp(before.longitude, after.longitude, factor),
                lerp(before.speed, after.speed, factor),
            )
        }
        (Some(only), None) | (None, Some(only)) => (only.latitude, only.longitude, only.speed),
        (None, None) => (fallback.latitude, fallback.longitude, fallback.speed),
    };

    TelemetryPacket {
        sequence_number: target,
        timestamp: Timestamp::now(),
        latitude,
        longitude,
        speed,
        status: STATUS_INTERPOLATED.to_string(),
        needs_ack: false,
    }
}

fn lerp(from: f64, to: f64, factor: f64) -> f64 {
    from + factor * (to - from)
}
