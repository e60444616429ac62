//! Core types for the telemetry link.
//!
//! ## Architecture
//!
//! - [`TelemetryPacket`] is one position observation, identified by its sequence number
//! - [`AckPacket`] acknowledges one sequence number on the same channel
//! - [`ReceiverStats`] / [`SenderStats`] are read-only counter snapshots
//! - [`LinkStatus`] and [`SenderEvent`] are the notifications consumers react to
//!
//! ## Usage Example
//!
//! ```rust
//! use shiplink::types::{ReceiverStats, TelemetryPacket};
//!
//! let packet = TelemetryPacket::reading(39.0, 35.5, 25.0);
//! assert!(!packet.is_interpolated());
//!
//! let stats = ReceiverStats { packets_received: 97, packets_lost: 3, ..Default::default() };
//! assert!((stats.loss_rate() - 3.0).abs() < f64::EPSILON);
//! ```

mod packet;
mod stats;
mod status;
mod update_rate;

pub use packet::{AckPacket, STATUS_INTERPOLATED, STATUS_OK, TelemetryPacket, Timestamp};
pub use stats::{ReceiverStats, SenderStats, loss_rate};
pub use status::{LinkStatus, SenderEvent};
pub use update_rate::UpdateRate;
