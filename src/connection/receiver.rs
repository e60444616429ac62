//! Listening side of a telemetry link

use futures::{Stream, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ReceiverConfig;
use crate::driver::Driver;
use crate::engine::{ReceiverEngine, ReceiverOutputs};
use crate::stream::ThrottleExt;
use crate::transport::{Transport, bind_udp};
use crate::types::{LinkStatus, ReceiverStats, TelemetryPacket, UpdateRate};
use crate::Result;

/// One bind-to-stop lifetime of the listener
struct Session {
    engine: Arc<ReceiverEngine>,
    local_addr: SocketAddr,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Telemetry receiver with acknowledgment, gap filling and statistics.
///
/// Channels belong to the connection rather than a session, so subscribers
/// keep receiving across `stop` and `start`. Every `start` begins a fresh
/// session with its own sequencing state.
pub struct ReceiverConnection {
    config: ReceiverConfig,
    outputs: ReceiverOutputs,
    status: watch::Sender<LinkStatus>,
    session: Mutex<Option<Session>>,
}

impl ReceiverConnection {
    /// Create a stopped receiver.
    pub fn new(config: ReceiverConfig) -> Result<Self> {
        config.validate()?;
        let outputs = ReceiverOutputs::new(config.channel_capacity);
        let (status, _) = watch::channel(LinkStatus::Stopped);
        Ok(Self { config, outputs, status, session: Mutex::new(None) })
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Bind the configured address and start listening.
    ///
    /// Returns the bound address. Calling this while already listening
    /// changes nothing. A bind failure is published as
    /// [`LinkStatus::BindFailed`] and leaves the receiver stopped.
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut session = self.session.lock().await;
        if let Some(running) = session.as_ref() {
            return Ok(running.local_addr);
        }

        let addr = self.config.listen_addr();
        let socket = match bind_udp(addr).await {
            Ok(socket) => socket,
            Err(e) => {
                error!(addr = %addr, "Failed to start receiver: {}", e);
                let reason = match &e {
                    crate::LinkError::Bind { source, .. } => source.to_string(),
                    other => other.to_string(),
                };
                self.status.send_replace(LinkStatus::BindFailed { addr, reason });
                return Err(e);
            }
        };

        let local_addr = self.launch(&mut session, Arc::new(socket))?;
        Ok(local_addr)
    }

    /// Start listening on an already bound transport.
    pub async fn start_with_transport(&self, transport: Arc<dyn Transport>) -> Result<SocketAddr> {
        let mut session = self.session.lock().await;
        if let Some(running) = session.as_ref() {
            return Ok(running.local_addr);
        }
        self.launch(&mut session, transport)
    }

    fn launch(&self, slot: &mut Option<Session>, transport: Arc<dyn Transport>) -> Result<SocketAddr> {
        let local_addr = transport.local_addr()?;
        let engine = Arc::new(ReceiverEngine::new(
            Arc::clone(&transport),
            self.config.clone(),
            self.outputs.clone(),
        ));
        self.outputs.statistics.send_replace(engine.statistics());

        let cancel = CancellationToken::new();
        let tasks = Driver::spawn_receiver(Arc::clone(&engine), transport, &cancel);

        *slot = Some(Session { engine, local_addr, cancel, tasks });
        self.status.send_replace(LinkStatus::Listening { local_addr });
        info!(
            addr = %local_addr,
            interpolation = self.config.interpolation_enabled,
            "Receiver listening"
        );
        Ok(local_addr)
    }

    /// Stop listening.
    ///
    /// Returns once the receive loop and both periodic tasks have finished;
    /// nothing is emitted for the stopped session afterwards.
    pub async fn stop(&self) {
        let Some(session) = self.session.lock().await.take() else {
            return;
        };

        session.engine.close();
        session.cancel.cancel();
        for task in session.tasks {
            if let Err(e) = task.await {
                warn!("Receiver task ended abnormally: {}", e);
            }
        }

        self.status.send_replace(LinkStatus::Stopped);
        info!(addr = %session.local_addr, "Receiver stopped");
    }

    pub fn is_listening(&self) -> bool {
        self.status.borrow().is_listening()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.status.borrow() {
            LinkStatus::Listening { local_addr } => Some(*local_addr),
            _ => None,
        }
    }

    /// Every delivered packet, received and synthesized, in emission order.
    ///
    /// A subscriber that falls more than `channel_capacity` packets behind
    /// skips the oldest ones.
    pub fn subscribe(&self) -> impl Stream<Item = TelemetryPacket> + 'static {
        packets(self.outputs.telemetry.subscribe())
    }

    /// Delivered packets at most once per `rate` interval.
    ///
    /// Within an interval the packet with the highest sequence number wins.
    pub fn subscribe_throttled(&self, rate: UpdateRate) -> impl Stream<Item = TelemetryPacket> + 'static {
        let stream = self.subscribe();
        match rate.normalize().throttle_interval() {
            None => stream.boxed(),
            Some(interval) => stream.throttle(interval).boxed(),
        }
    }

    /// Latest statistics snapshot.
    pub fn statistics(&self) -> ReceiverStats {
        *self.outputs.statistics.borrow()
    }

    /// Current statistics, then one item per update batch.
    pub fn statistics_updates(&self) -> impl Stream<Item = ReceiverStats> + 'static {
        WatchStream::new(self.outputs.statistics.subscribe())
    }

    pub fn status(&self) -> LinkStatus {
        self.status.borrow().clone()
    }

    /// Current status, then every transition.
    pub fn status_updates(&self) -> impl Stream<Item = LinkStatus> + 'static {
        WatchStream::new(self.status.subscribe())
    }
}

impl Drop for ReceiverConnection {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            debug!("Receiver dropped while listening, cancelling tasks");
            session.engine.close();
            session.cancel.cancel();
        }
    }
}

fn packets(rx: broadcast::Receiver<TelemetryPacket>) -> impl Stream<Item = TelemetryPacket> + 'static {
    BroadcastStream::new(rx).filter_map(|item| async move {
        match item {
            Ok(packet) => Some(packet),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "Telemetry subscriber lagging, packets skipped");
                None
            }
        }
    })
}
