//! Simulated vessel provider

use tokio::time::{Duration, Instant, Interval, MissedTickBehavior, interval};
use tracing::{debug, info, trace};

use crate::Result;
use crate::provider::Provider;
use crate::types::TelemetryPacket;

/// Shortest pacing the simulator accepts.
pub const MIN_SEND_INTERVAL: Duration = Duration::from_millis(1);

/// A vessel steaming on a fixed heading.
///
/// Emits one reading per send interval and moves by a fixed latitude and
/// longitude increment once per movement interval, so consecutive readings
/// repeat the same position until the next move.
pub struct SimulatedVessel {
    latitude: f64,
    longitude: f64,
    speed: f64,
    latitude_step: f64,
    longitude_step: f64,

    send_interval: Duration,
    movement_interval: Duration,

    /// Created on the first read so construction works outside a runtime
    ticker: Option<Interval>,
    last_move: Option<Instant>,

    remaining: Option<u64>,
    emitted: u64,
}

impl Default for SimulatedVessel {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedVessel {
    pub fn new() -> Self {
        Self {
            latitude: 39.0,
            longitude: 35.5,
            speed: 25.0,
            latitude_step: 0.01,
            longitude_step: 0.01,
            send_interval: Duration::from_secs(1),
            movement_interval: Duration::from_secs(3),
            ticker: None,
            last_move: None,
            remaining: None,
            emitted: 0,
        }
    }

    pub fn with_position(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = latitude;
        self.longitude = longitude;
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// Degrees moved per movement interval.
    pub fn with_step(mut self, latitude_step: f64, longitude_step: f64) -> Self {
        self.latitude_step = latitude_step;
        self.longitude_step = longitude_step;
        self
    }

    /// Pacing between readings, clamped to [`MIN_SEND_INTERVAL`].
    pub fn with_send_interval(mut self, interval: Duration) -> Self {
        self.send_interval = interval.max(MIN_SEND_INTERVAL);
        self
    }

    pub fn with_movement_interval(mut self, interval: Duration) -> Self {
        self.movement_interval = interval;
        self
    }

    /// Stop after `count` readings.
    pub fn with_limit(mut self, count: u64) -> Self {
        self.remaining = Some(count);
        self
    }

    pub fn position(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    fn advance_position(&mut self, now: Instant) {
        let Some(last_move) = self.last_move else {
            self.last_move = Some(now);
            return;
        };
        if self.movement_interval.is_zero() {
            return;
        }

        let elapsed = now.saturating_duration_since(last_move);
        let steps = (elapsed.as_nanos() / self.movement_interval.as_nanos()) as u32;
        if steps == 0 {
            return;
        }

        self.latitude += self.latitude_step * f64::from(steps);
        self.longitude += self.longitude_step * f64::from(steps);
        self.last_move = Some(last_move + self.movement_interval * steps);
        debug!(lat = self.latitude, lon = self.longitude, steps, "Vessel moved");
    }
}

#[async_trait::async_trait]
impl Provider for SimulatedVessel {
    async fn next_reading(&mut self) -> Result<Option<TelemetryPacket>> {
        if self.remaining == Some(0) {
            info!("Simulated vessel finished after {} readings", self.emitted);
            return Ok(None);
        }

        let period = self.send_interval;
        let ticker = self.ticker.get_or_insert_with(|| {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        let now = ticker.tick().await;

        self.advance_position(now);
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        self.emitted += 1;

        trace!(lat = self.latitude, lon = self.longitude, speed = self.speed, "Simulated reading");
        Ok(Some(TelemetryPacket::reading(self.latitude, self.longitude, self.speed)))
    }

    fn send_interval(&self) -> Duration {
        self.send_interval
    }
}
