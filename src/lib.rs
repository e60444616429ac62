//! Reliable telemetry over UDP.
//!
//! Shiplink carries position reports from a moving vessel to a monitoring
//! station over plain UDP datagrams, adding just enough reliability on top:
//!
//! - **Acknowledgment**: the sender tracks every packet until the receiver ACKs it
//! - **Retransmission**: overdue packets are resent with their original sequence
//!   number, a bounded number of times
//! - **Gap filling**: the receiver spots missing sequence numbers and emits
//!   interpolated substitutes so a display never stalls
//! - **Statistics**: loss rate, ACK and retransmission counters as watch streams
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use shiplink::{ReceiverConfig, SenderConfig, Shiplink};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let receiver = Shiplink::listen(ReceiverConfig::default()).await?;
//!     let mut packets = Box::pin(receiver.subscribe());
//!
//!     let sender = Shiplink::transmit(SenderConfig::default()).await?;
//!     sender.send_reading(39.0, 35.5, 25.0).await?;
//!
//!     if let Some(packet) = packets.next().await {
//!         println!("#{} at {}, {}", packet.sequence_number, packet.latitude, packet.longitude);
//!     }
//!
//!     sender.stop().await;
//!     receiver.stop().await;
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Wire and configuration
pub mod codec;
pub mod config;
pub mod transport;

// Reliability engines and task plumbing
pub mod connection;
pub mod driver;
pub mod engine;
pub mod provider;
pub mod providers;
pub mod stream;

// Core exports
pub use error::*;
pub use types::*;

pub use config::{LinkConfig, ReceiverConfig, SenderConfig};
pub use connection::{ReceiverConnection, SenderConnection};
pub use provider::Provider;
pub use providers::SimulatedVessel;

/// Entry points for both ends of a link.
pub struct Shiplink;

impl Shiplink {
    /// Bind and start a receiver.
    pub async fn listen(config: ReceiverConfig) -> Result<ReceiverConnection> {
        let receiver = ReceiverConnection::new(config)?;
        receiver.start().await?;
        Ok(receiver)
    }

    /// Bind a sender socket aimed at `config.target`.
    pub async fn transmit(config: SenderConfig) -> Result<SenderConnection> {
        SenderConnection::connect(config).await
    }
}
