//! Provider trait for telemetry sources

use std::time::Duration;

use crate::Result;
use crate::types::TelemetryPacket;

/// Trait for sources of outgoing telemetry readings
///
/// Providers pace themselves: `next_reading` resolves when the next reading
/// is due. The sender overwrites sequence number, timestamp and ACK flag, so
/// a provider only fills in position, speed and status.
#[async_trait::async_trait]
pub trait Provider: Send + 'static {
    /// Wait for the next reading
    ///
    /// Returns:
    /// - `Ok(Some(packet))` - New reading available
    /// - `Ok(None)` - Source exhausted (normal termination)
    /// - `Err(e)` - Error occurred; the caller backs off and retries
    async fn next_reading(&mut self) -> Result<Option<TelemetryPacket>>;

    /// Nominal time between readings
    fn send_interval(&self) -> Duration;
}
