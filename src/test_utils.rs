//! Test utilities: in-memory transports and packet fixtures
//!
//! These let the reliability engines and connections run without a real
//! network, with full control over which datagrams get lost.

#![cfg(any(test, feature = "benchmark"))]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use tokio::sync::mpsc;

use crate::codec::{self, WireMessage};
use crate::transport::Transport;
use crate::types::TelemetryPacket;

/// Telemetry reading with an explicit sequence number.
pub fn packet(sequence_number: u32, latitude: f64, longitude: f64, speed: f64) -> TelemetryPacket {
    TelemetryPacket { sequence_number, ..TelemetryPacket::reading(latitude, longitude, speed) }
}

/// Transport that records every send and never receives anything.
#[derive(Debug)]
pub struct RecordingTransport {
    local_addr: SocketAddr,
    sent: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
    fail_sends: AtomicBool,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::with_addr(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 50_000))
    }

    pub fn with_addr(local_addr: SocketAddr) -> Self {
        Self { local_addr, sent: Mutex::new(Vec::new()), fail_sends: AtomicBool::new(false) }
    }

    /// Make every following send fail with an I/O error.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Raw datagrams with their destinations, in send order.
    pub fn sent(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        self.sent.lock().clone()
    }

    /// Decoded telemetry among the sent datagrams.
    pub fn sent_telemetry(&self) -> Vec<TelemetryPacket> {
        self.sent
            .lock()
            .iter()
            .filter_map(|(bytes, _)| match codec::decode(bytes) {
                Ok(WireMessage::Telemetry(packet)) => Some(packet),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> io::Result<usize> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(io::Error::other("simulated send failure"));
        }
        self.sent.lock().push((bytes.to_vec(), dest));
        Ok(bytes.len())
    }

    async fn recv_from(&self, _buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        std::future::pending().await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local_addr)
    }
}

type Datagram = (Vec<u8>, SocketAddr);
type DropFilter = Box<dyn Fn(&[u8], SocketAddr, SocketAddr) -> bool + Send + Sync>;

/// In-process datagram network connecting any number of endpoints.
///
/// Datagrams to an address with no endpoint vanish, as they would over UDP.
/// A drop filter sees `(bytes, from, to)` and returns `true` to lose the datagram.
#[derive(Default)]
pub struct MemoryNetwork {
    endpoints: Mutex<HashMap<SocketAddr, mpsc::UnboundedSender<Datagram>>>,
    drop_filter: Mutex<Option<DropFilter>>,
    next_port: AtomicU16,
}

impl MemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { next_port: AtomicU16::new(40_000), ..Default::default() })
    }

    /// Attach a new endpoint on the next free loopback port.
    pub fn endpoint(self: &Arc<Self>) -> Arc<MemoryEndpoint> {
        let port = self.next_port.fetch_add(1, Ordering::SeqCst);
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
        let (tx, rx) = mpsc::unbounded_channel();
        self.endpoints.lock().insert(addr, tx);
        Arc::new(MemoryEndpoint { addr, network: Arc::clone(self), inbox: tokio::sync::Mutex::new(rx) })
    }

    pub fn set_drop_filter<F>(&self, filter: F)
    where
        F: Fn(&[u8], SocketAddr, SocketAddr) -> bool + Send + Sync + 'static,
    {
        *self.drop_filter.lock() = Some(Box::new(filter));
    }

    pub fn clear_drop_filter(&self) {
        *self.drop_filter.lock() = None;
    }

    /// Deliver `bytes` to `to` as if sent from `from`.
    pub fn deliver(&self, bytes: &[u8], from: SocketAddr, to: SocketAddr) {
        let dropped = self.drop_filter.lock().as_ref().is_some_and(|filter| filter(bytes, from, to));
        if dropped {
            return;
        }
        if let Some(tx) = self.endpoints.lock().get(&to) {
            let _ = tx.send((bytes.to_vec(), from));
        }
    }

    fn detach(&self, addr: SocketAddr) {
        self.endpoints.lock().remove(&addr);
    }
}

/// Drop filter losing every ACK.
pub fn drop_acks(bytes: &[u8], _from: SocketAddr, _to: SocketAddr) -> bool {
    matches!(codec::decode(bytes), Ok(WireMessage::Ack(_)))
}

/// Drop filter losing telemetry whose sequence number is in `lost`.
pub fn drop_sequences(lost: Vec<u32>) -> impl Fn(&[u8], SocketAddr, SocketAddr) -> bool + Send + Sync + 'static {
    move |bytes, _, _| match codec::decode(bytes) {
        Ok(WireMessage::Telemetry(packet)) => lost.contains(&packet.sequence_number),
        _ => false,
    }
}

/// One attachment point on a [`MemoryNetwork`].
pub struct MemoryEndpoint {
    addr: SocketAddr,
    network: Arc<MemoryNetwork>,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<Datagram>>,
}

impl MemoryEndpoint {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for MemoryEndpoint {
    fn drop(&mut self) {
        self.network.detach(self.addr);
    }
}

#[async_trait]
impl Transport for MemoryEndpoint {
    async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> io::Result<usize> {
        self.network.deliver(bytes, self.addr, dest);
        Ok(bytes.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let mut inbox = self.inbox.lock().await;
        match inbox.recv().await {
            Some((bytes, from)) => {
                let len = bytes.len().min(buf.len());
                buf[..len].copy_from_slice(&bytes[..len]);
                Ok((len, from))
            }
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "endpoint detached")),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn endpoints_exchange_datagrams() {
        let network = MemoryNetwork::new();
        let a = network.endpoint();
        let b = network.endpoint();

        a.send_to(b"ping", b.addr()).await.unwrap();

        let mut buf = [0u8; 8];
        let (n, from) = b.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(from, a.addr());
    }

    #[tokio::test]
    async fn drop_filter_loses_matching_datagrams() {
        let network = MemoryNetwork::new();
        let a = network.endpoint();
        let b = network.endpoint();
        network.set_drop_filter(drop_sequences(vec![2]));

        for seq in 1..=3 {
            let bytes = codec::encode_telemetry(&packet(seq, 0.0, 0.0, 0.0)).unwrap();
            a.send_to(&bytes, b.addr()).await.unwrap();
        }

        let mut buf = [0u8; 512];
        let mut seqs = Vec::new();
        for _ in 0..2 {
            let (n, _) = b.recv_from(&mut buf).await.unwrap();
            if let Ok(WireMessage::Telemetry(p)) = codec::decode(&buf[..n]) {
                seqs.push(p.sequence_number);
            }
        }
        assert_eq!(seqs, vec![1, 3]);
    }

    #[tokio::test]
    async fn recording_transport_can_fail() {
        let transport = RecordingTransport::new();
        let dest: SocketAddr = "127.0.0.1:1".parse().unwrap();
        transport.send_to(b"x", dest).await.unwrap();
        transport.set_fail_sends(true);
        assert!(transport.send_to(b"y", dest).await.is_err());
        assert_eq!(transport.sent().len(), 1);
    }
}
