//! Datagram transport capability.
//!
//! The reliability engines never touch a socket directly; they are handed a
//! [`Transport`] so the same logic runs over UDP in production and over
//! in-memory channels in tests.

use std::io;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

use crate::{LinkError, Result};

/// Unreliable, message-oriented byte transport
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send one datagram to `dest`
    async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> io::Result<usize>;

    /// Wait for the next datagram
    ///
    /// Returns the number of bytes written into `buf` and the sender's address.
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Address this transport receives on
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait::async_trait]
impl Transport for UdpSocket {
    async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, bytes, dest).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

/// Bind a UDP socket, mapping failure to [`LinkError::Bind`].
pub async fn bind_udp(addr: SocketAddr) -> Result<UdpSocket> {
    UdpSocket::bind(addr).await.map_err(|source| LinkError::bind_failed(addr, source))
}
