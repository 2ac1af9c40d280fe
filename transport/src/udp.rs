//! Thin wrapper over `tokio::net::UdpSocket` (spec.md §1: "speaks plain,
//! unreliable UDP datagrams"). No ECN, GRO, or batched `sendmmsg`/`recvmmsg`
//! here — ARDP's own segment size already keeps every datagram under one MTU
//! (spec.md §4.5, `segbmax`), so the teacher's GSO/GRO batching machinery in
//! `udp.rs` has nothing left to do and was trimmed.

use std::io;
use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use tokio::net::UdpSocket as TokioUdpSocket;

use ardp::Transmit;

pub struct UdpSocket {
    io: TokioUdpSocket,
}

impl UdpSocket {
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let io = TokioUdpSocket::bind(addr).await?;
        Ok(UdpSocket { io })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.io.local_addr()
    }

    pub async fn send(&self, transmit: &Transmit) -> io::Result<()> {
        self.io.send_to(&transmit.data, transmit.remote).await?;
        Ok(())
    }

    /// Receives one datagram, returning its source and contents. Buffer size
    /// matches the largest single ARDP segment plus header (spec.md §4.5).
    pub async fn recv(&self, buf: &mut BytesMut) -> io::Result<(SocketAddr, Bytes)> {
        buf.resize(MAX_DATAGRAM_SIZE, 0);
        let (len, addr) = self.io.recv_from(buf).await?;
        Ok((addr, Bytes::copy_from_slice(&buf[..len])))
    }
}

/// Generous upper bound on ARDP's largest segment: header plus one
/// `segbmax`-sized fragment, rounded up well past any realistic MTU.
pub const MAX_DATAGRAM_SIZE: usize = 65536;
