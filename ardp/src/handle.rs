//! Per-handle collection of connections (spec.md §3, "ARDP Handle"): owns no
//! sockets itself (this crate performs no I/O — see `lib.rs`), but tracks
//! every [`ArdpConnection`] reachable through it, routes inbound datagrams to
//! the right one, and accepts/rejects new peers.
//!
//! Modeled after the teacher's `Endpoint` (`sctp-proto`'s `endpoint/mod.rs`):
//! "This object performs no I/O whatsoever. Instead, it generates a stream of
//! packets to send via `poll_transmit`, and consumes incoming packets ...
//! via `handle`." Slab + FxHashMap id table is the same structure, keyed by
//! ARDP connection id instead of SCTP association id.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;
use fxhash::FxHashMap;
use log::{debug, trace};
use slab::Slab;

use crate::config::ArdpConfig;
use crate::connection::{ArdpConnection, ConnEvent};
use crate::error::Result;
use crate::header::{ArdpHeader, Flags};
use crate::id::{ConnectionId, ConnectionIdGenerator, RandomConnectionIdGenerator};

/// Opaque handle into the handle's connection table, stable for the life of
/// the connection (spec.md §3, invariant 6).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(pub(crate) usize);

/// A datagram to be sent on the wire, paired with its destination.
#[derive(Debug, Clone)]
pub struct Transmit {
    pub remote: SocketAddr,
    pub data: Bytes,
}

/// A freshly arrived SYN, awaiting an admission decision from the layer
/// above (spec.md §4.1, "Admission on inbound SYN"). ARDP does not decide
/// acceptance itself — that is the Transport's job.
#[derive(Debug)]
pub struct Incoming {
    remote: SocketAddr,
    peer_conn_id: ConnectionId,
    peer_window: u16,
    pub hello: Bytes,
}

impl Incoming {
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }
}

/// Result of feeding one datagram to [`ArdpHandle::handle_datagram`].
#[derive(Debug)]
pub enum DatagramEvent {
    /// Routed to an existing connection; drain its events with
    /// [`ArdpHandle::connection_mut`] + `poll_event`.
    Connection(ConnectionHandle),
    /// A new peer is requesting a connection.
    NewConnection(Incoming),
}

pub struct ArdpHandle {
    config: ArdpConfig,
    connections: Slab<ArdpConnection>,
    by_local_id: FxHashMap<ConnectionId, ConnectionHandle>,
    id_generator: Box<dyn ConnectionIdGenerator>,
    transmits: VecDeque<Transmit>,
}

impl ArdpHandle {
    pub fn new(config: ArdpConfig) -> Self {
        ArdpHandle {
            config,
            connections: Slab::new(),
            by_local_id: FxHashMap::default(),
            id_generator: Box::new(RandomConnectionIdGenerator),
            transmits: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &ArdpConfig {
        &self.config
    }

    pub fn set_id_generator(&mut self, gen: Box<dyn ConnectionIdGenerator>) {
        self.id_generator = gen;
    }

    fn fresh_id(&mut self) -> ConnectionId {
        loop {
            let id = self.id_generator.generate();
            if !self.by_local_id.contains_key(&id) {
                return id;
            }
        }
    }

    /// Active open (spec.md §4.1, "Connect"): emits the initial SYN.
    pub fn connect(&mut self, now: Instant, remote: SocketAddr, hello: Bytes) -> ConnectionHandle {
        let id = self.fresh_id();
        let conn = ArdpConnection::connect(id, remote, now, &self.config, hello);
        let entry = self.connections.insert(conn);
        let handle = ConnectionHandle(entry);
        self.by_local_id.insert(id, handle);
        trace!("ardp: connect() to {} assigned local id {}", remote, id);
        handle
    }

    /// Feed one inbound datagram into the handle. A SYN for an unrecognized
    /// `(remote, peer connection id)` pair produces `NewConnection`;
    /// everything else routes to an existing connection by destination
    /// connection id.
    pub fn handle_datagram(
        &mut self,
        _now: Instant,
        remote: SocketAddr,
        data: Bytes,
    ) -> Result<Option<DatagramEvent>> {
        let (header, payload) = ArdpHeader::decode(data)?;

        if header.flags.contains(Flags::SYN) && !header.flags.contains(Flags::ACK) {
            if self.by_local_id.contains_key(&header.dst_conn_id) && header.dst_conn_id != 0 {
                // Retransmitted SYN for a connection we already created
                // (e.g. our SYN-ACK was lost); route it normally below.
            } else {
                return Ok(Some(DatagramEvent::NewConnection(Incoming {
                    remote,
                    peer_conn_id: header.src_conn_id,
                    peer_window: header.window,
                    hello: payload,
                })));
            }
        }

        match self.by_local_id.get(&header.dst_conn_id) {
            Some(&handle) => {
                if let Some(conn) = self.connections.get_mut(handle.0) {
                    conn.on_segment(_now, header, payload);
                }
                Ok(Some(DatagramEvent::Connection(handle)))
            }
            None => {
                debug!(
                    "ardp: dropping datagram for unknown connection id {}",
                    header.dst_conn_id
                );
                Ok(None)
            }
        }
    }

    /// Accept a pending [`Incoming`], admitting the peer (spec.md §4.1:
    /// "constructs a new Endpoint ... calls `ardp_accept` with the reply
    /// payload").
    pub fn accept(
        &mut self,
        now: Instant,
        incoming: Incoming,
        reply_hello: Bytes,
    ) -> ConnectionHandle {
        let id = self.fresh_id();
        let conn = ArdpConnection::accept(
            id,
            incoming.peer_conn_id,
            incoming.remote,
            now,
            &self.config,
            incoming.peer_window,
            reply_hello,
        );
        let entry = self.connections.insert(conn);
        let handle = ConnectionHandle(entry);
        self.by_local_id.insert(id, handle);
        handle
    }

    /// Reject a pending [`Incoming`] (spec.md §7, `CONNECTION_REJECTED`).
    /// No state is created; ARDP simply does not reply, matching "reject (return
    /// false)" in spec.md §4.1.
    pub fn reject(&mut self, _incoming: Incoming) {}

    pub fn connection_mut(&mut self, handle: ConnectionHandle) -> Option<&mut ArdpConnection> {
        self.connections.get_mut(handle.0)
    }

    pub fn connection(&self, handle: ConnectionHandle) -> Option<&ArdpConnection> {
        self.connections.get(handle.0)
    }

    /// Drain transmits across every connection into this handle's outbound
    /// queue. Call once per maintenance-loop wakeup before polling
    /// `poll_transmit` (spec.md §4.1, maintenance loop step 3).
    fn collect_transmits(&mut self) {
        for (_, conn) in self.connections.iter_mut() {
            while let Some(data) = conn.poll_transmit() {
                self.transmits.push_back(Transmit { remote: conn.remote, data });
            }
        }
    }

    pub fn poll_transmit(&mut self) -> Option<Transmit> {
        if self.transmits.is_empty() {
            self.collect_transmits();
        }
        self.transmits.pop_front()
    }

    /// Advance every connection's timers and reap connections that finished
    /// TIME-WAIT. Returns the next deadline across all connections, which the
    /// maintenance loop arms on its timer event (spec.md §4.5, "ARDP_run
    /// contract").
    pub fn handle_timeout(&mut self, now: Instant) -> Option<Instant> {
        let mut done = Vec::new();
        for (key, conn) in self.connections.iter_mut() {
            conn.on_timer(now);
            if conn.is_done() {
                done.push((key, conn.id));
            }
        }
        self.collect_transmits();

        for (key, id) in done {
            self.connections.remove(key);
            self.by_local_id.remove(&id);
        }

        self.connections
            .iter()
            .filter_map(|(_, conn)| conn.next_deadline())
            .min()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Drains every connection's event queue. Called by the owner once per
    /// maintenance-loop wakeup, analogous to how the teacher's `Endpoint`
    /// hands `AssociationEvent`s back to its driver for dispatch.
    pub fn poll_events(&mut self) -> Vec<(ConnectionHandle, ConnEvent)> {
        let mut out = Vec::new();
        for (key, conn) in self.connections.iter_mut() {
            while let Some(event) = conn.poll_event() {
                out.push((ConnectionHandle(key), event));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn full_handshake_across_two_handles() {
        let now = Instant::now();
        let mut client = ArdpHandle::new(ArdpConfig::default());
        let mut server = ArdpHandle::new(ArdpConfig::default());

        let client_conn = client.connect(now, addr(9955), Bytes::from_static(b"hello"));
        let syn = client.poll_transmit().unwrap();

        let event = server
            .handle_datagram(now, addr(40000), syn.data)
            .unwrap()
            .unwrap();
        let incoming = match event {
            DatagramEvent::NewConnection(incoming) => incoming,
            _ => panic!("expected a new connection"),
        };
        assert_eq!(incoming.hello, Bytes::from_static(b"hello"));
        let server_conn = server.accept(now, incoming, Bytes::from_static(b"hi-back"));
        let synack = server.poll_transmit().unwrap();

        client
            .handle_datagram(now, addr(9955), synack.data)
            .unwrap();
        assert!(matches!(
            client.connection_mut(client_conn).unwrap().poll_event(),
            Some(crate::connection::ConnEvent::Connected { passive: false, .. })
        ));
        let ack = client.poll_transmit().unwrap();

        server.handle_datagram(now, addr(40000), ack.data).unwrap();
        assert!(matches!(
            server.connection_mut(server_conn).unwrap().poll_event(),
            Some(crate::connection::ConnEvent::Connected { passive: true, .. })
        ));
    }

    #[test]
    fn unknown_connection_id_is_dropped_not_panicked() {
        let now = Instant::now();
        let mut handle = ArdpHandle::new(ArdpConfig::default());
        let mut garbage = bytes::BytesMut::new();
        ArdpHeader {
            flags: Flags::ACK,
            window: 1,
            seq: 1,
            ack: 1,
            src_conn_id: 1,
            dst_conn_id: 42,
            frag_index: 0,
            frag_count: 1,
        }
        .encode(0, &mut garbage);
        let result = handle
            .handle_datagram(now, addr(1), garbage.freeze())
            .unwrap();
        assert!(result.is_none());
    }
}
