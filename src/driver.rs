//! Driver spawns and manages link processing tasks

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::LinkError;
use crate::codec::MAX_DATAGRAM_SIZE;
use crate::engine::{ReceiverEngine, SenderEngine};
use crate::provider::Provider;
use crate::transport::Transport;

/// Consecutive failures before a loop escalates; the provider feed stops there
const MAX_ERRORS: u32 = 10;

/// Something that consumes datagrams off a transport
#[async_trait::async_trait]
pub trait DatagramHandler: Send + Sync + 'static {
    async fn on_datagram(&self, bytes: &[u8], from: SocketAddr);
}

#[async_trait::async_trait]
impl DatagramHandler for ReceiverEngine {
    async fn on_datagram(&self, bytes: &[u8], from: SocketAddr) {
        self.on_datagram_received(bytes, from).await;
    }
}

#[async_trait::async_trait]
impl DatagramHandler for SenderEngine {
    async fn on_datagram(&self, bytes: &[u8], from: SocketAddr) {
        self.on_datagram_received(bytes, from);
    }
}

/// Driver spawns and manages link processing tasks
///
/// Every task selects on the shared cancellation token, so cancelling it and
/// awaiting the returned handles halts all activity for a session.
pub struct Driver;

impl Driver {
    /// Spawn the receive loop and both periodic tasks of a receiver
    pub fn spawn_receiver(
        engine: Arc<ReceiverEngine>,
        transport: Arc<dyn Transport>,
        cancel: &CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        let config = engine.config().clone();

        let gap_engine = Arc::clone(&engine);
        let cleanup_engine = Arc::clone(&engine);

        vec![
            Self::spawn_receive_loop("receiver", transport, Arc::clone(&engine), cancel.child_token()),
            Self::spawn_periodic("gap-check", config.gap_check_interval(), cancel.child_token(), move || {
                let engine = Arc::clone(&gap_engine);
                async move {
                    engine.check_for_missing_packets();
                }
            }),
            Self::spawn_periodic("cleanup", config.cleanup_interval(), cancel.child_token(), move || {
                let engine = Arc::clone(&cleanup_engine);
                async move {
                    engine.cleanup_old_packets();
                }
            }),
        ]
    }

    /// Spawn the ACK receive loop and the timeout check of a sender
    pub fn spawn_sender(
        engine: Arc<SenderEngine>,
        transport: Arc<dyn Transport>,
        cancel: &CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        let period = engine.config().timeout_check_interval();
        let timeout_engine = Arc::clone(&engine);

        vec![
            Self::spawn_receive_loop("sender", transport, engine, cancel.child_token()),
            Self::spawn_periodic("timeout-check", period, cancel.child_token(), move || {
                let engine = Arc::clone(&timeout_engine);
                async move {
                    engine.check_timeouts().await;
                }
            }),
        ]
    }

    /// Spawn a task feeding `provider` readings into `engine`
    pub fn spawn_provider<P>(provider: P, engine: Arc<SenderEngine>, cancel: CancellationToken) -> JoinHandle<()>
    where
        P: Provider,
    {
        tokio::spawn(async move {
            Self::provider_task(provider, engine, cancel).await;
        })
    }

    fn spawn_receive_loop<H>(
        role: &'static str,
        transport: Arc<dyn Transport>,
        handler: Arc<H>,
        cancel: CancellationToken,
    ) -> JoinHandle<()>
    where
        H: DatagramHandler,
    {
        tokio::spawn(async move {
            Self::receive_task(role, transport, handler, cancel).await;
        })
    }

    /// Run `tick` every `period` until cancelled
    ///
    /// Ticks never overlap: the next one is scheduled only after the
    /// previous run completes.
    fn spawn_periodic<F, Fut>(
        name: &'static str,
        period: Duration,
        cancel: CancellationToken,
        mut tick: F,
    ) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it so the first run is one period out.
            interval.tick().await;

            debug!(task = name, period_ms = period.as_millis() as u64, "Periodic task started");
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => tick().await,
                }
            }
            debug!(task = name, "Periodic task stopped");
        })
    }

    /// Receive loop - reads datagrams and hands them to the engine
    async fn receive_task<H>(
        role: &'static str,
        transport: Arc<dyn Transport>,
        handler: Arc<H>,
        cancel: CancellationToken,
    ) where
        H: DatagramHandler,
    {
        info!(role, "Receive loop started");
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut datagrams = 0u64;
        let mut error_count = 0u32;

        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = transport.recv_from(&mut buf) => result,
            };

            match result {
                Ok((len, from)) => {
                    datagrams += 1;
                    error_count = 0;
                    trace!(role, len, peer = %from, "Datagram received");
                    handler.on_datagram(&buf[..len], from).await;
                }
                Err(e) => {
                    // Errors such as ICMP port-unreachable resets are transient on UDP
                    let err = LinkError::receive_failed(e);
                    error_count += 1;
                    if error_count >= MAX_ERRORS {
                        error!(role, suggestions = ?err.recovery_suggestions(), "{} ({}/{})", err, error_count, MAX_ERRORS);
                    } else {
                        warn!(role, "{} ({}/{})", err, error_count, MAX_ERRORS);
                    }

                    // Exponential backoff: 100ms, 200ms, 400ms, ... capped at 1.6s
                    let backoff = Duration::from_millis(50 * (1 << error_count.min(5)));
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        info!(role, datagrams, "Receive loop stopped");
    }

    /// Provider task - reads readings and sends them until the source ends
    async fn provider_task<P>(mut provider: P, engine: Arc<SenderEngine>, cancel: CancellationToken)
    where
        P: Provider,
    {
        info!(interval_ms = provider.send_interval().as_millis() as u64, "Provider task started");
        let mut readings = 0u64;
        let mut error_count = 0u32;

        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Provider task cancelled");
                    break;
                }
                result = provider.next_reading() => result,
            };

            match result {
                Ok(Some(packet)) => {
                    readings += 1;
                    error_count = 0;
                    // Send failures surface as SenderEvents; the feed keeps going.
                    if let Err(e) = engine.send(packet).await {
                        if engine.is_closed() {
                            break;
                        }
                        debug!("Provider reading not sent: {}", e);
                    }
                }
                Ok(None) => {
                    info!("Provider ended after {} readings", readings);
                    break;
                }
                Err(e) => {
                    error_count += 1;
                    error!("Provider error ({}/{}): {}", error_count, MAX_ERRORS, e);

                    if error_count >= MAX_ERRORS {
                        error!("Too many provider errors, stopping feed");
                        break;
                    }

                    let backoff = Duration::from_millis(50 * (1 << error_count.min(5)));
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        info!("Provider task ended (sent {} readings)", readings);
    }
}
