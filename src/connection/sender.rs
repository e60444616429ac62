//! Sending side of a telemetry link

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SenderConfig;
use crate::driver::Driver;
use crate::engine::{SenderEngine, SenderOutputs};
use crate::provider::Provider;
use crate::transport::{Transport, bind_udp};
use crate::types::{SenderEvent, SenderStats, TelemetryPacket};
use crate::Result;

/// Telemetry sender with ACK tracking and retransmission.
///
/// ACKs are read off the same socket the telemetry leaves from, since the
/// receiver answers to the address it observed.
pub struct SenderConnection {
    engine: Arc<SenderEngine>,
    outputs: SenderOutputs,
    local_addr: SocketAddr,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SenderConnection {
    /// Bind the configured local address and start the ACK loop.
    pub async fn connect(config: SenderConfig) -> Result<Self> {
        config.validate()?;
        let socket = bind_udp(config.bind_address).await?;
        Self::connect_with_transport(config, Arc::new(socket))
    }

    /// Run a sender over an already bound transport.
    pub fn connect_with_transport(config: SenderConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let local_addr = transport.local_addr()?;
        let outputs = SenderOutputs::new(config.channel_capacity);
        let target = config.target;
        let reliable = config.reliability_enabled;
        let engine = Arc::new(SenderEngine::new(Arc::clone(&transport), config, outputs.clone()));

        let cancel = CancellationToken::new();
        let tasks = Driver::spawn_sender(Arc::clone(&engine), transport, &cancel);

        info!(addr = %local_addr, target = %target, reliable, "Sender connected");
        Ok(Self { engine, outputs, local_addr, cancel, tasks: Mutex::new(tasks) })
    }

    /// Send one reading; returns its sequence number.
    pub async fn send(&self, packet: TelemetryPacket) -> Result<u32> {
        self.engine.send(packet).await
    }

    /// Send a plain position report.
    pub async fn send_reading(&self, latitude: f64, longitude: f64, speed: f64) -> Result<u32> {
        self.send(TelemetryPacket::reading(latitude, longitude, speed)).await
    }

    /// Feed readings from `provider` until it ends or the sender stops.
    pub fn drive<P>(&self, provider: P)
    where
        P: Provider,
    {
        let task = Driver::spawn_provider(provider, Arc::clone(&self.engine), self.cancel.child_token());
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }

    /// ACK, retransmission, timeout and failure events.
    pub fn events(&self) -> impl Stream<Item = SenderEvent> + 'static {
        BroadcastStream::new(self.outputs.events.subscribe()).filter_map(|item| async move {
            match item {
                Ok(event) => Some(event),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Sender event subscriber lagging, events skipped");
                    None
                }
            }
        })
    }

    pub fn statistics(&self) -> SenderStats {
        self.engine.statistics()
    }

    /// Current statistics, then one item per send, ACK or timeout sweep.
    pub fn statistics_updates(&self) -> impl Stream<Item = SenderStats> + 'static {
        WatchStream::new(self.outputs.statistics.subscribe())
    }

    pub fn pending_count(&self) -> usize {
        self.engine.pending_count()
    }

    pub fn target(&self) -> SocketAddr {
        self.engine.target()
    }

    /// Send later readings and retransmissions to `target`.
    pub fn set_target(&self, target: SocketAddr) {
        self.engine.set_target(target);
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        !self.engine.is_closed()
    }

    /// Stop sending and wait for every task to finish.
    ///
    /// Pending packets are abandoned without timeout events.
    pub async fn stop(&self) {
        if !self.engine.is_closed() {
            info!(addr = %self.local_addr, pending = self.engine.pending_count(), "Sender stopping");
        }
        self.engine.close();
        self.cancel.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Sender task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for SenderConnection {
    fn drop(&mut self) {
        if !self.engine.is_closed() {
            debug!("Sender dropped while running, cancelling tasks");
        }
        self.engine.close();
        self.cancel.cancel();
    }
}
