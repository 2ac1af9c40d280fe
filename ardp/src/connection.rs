//! Per-peer reliability state: the SYN/SYN-ACK/ACK handshake, ordered
//! reliable delivery with retransmission, window-based flow control,
//! fragmentation/reassembly, idle keepalive, and graceful/sudden disconnect
//! (spec.md §4.5).
//!
//! This is the ARDP analogue of the teacher's `Association` — the bulk of
//! the protocol logic lives here, same as `sctp-proto`'s design note in
//! `lib.rs`: "`Association` types contain the bulk of the protocol logic
//! related to managing a single association and all the related state".

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use log::{debug, trace, warn};

use crate::config::ArdpConfig;
use crate::error::{ArdpError, Result};
use crate::header::{ArdpHeader, Flags};
use crate::id::ConnectionId;
use crate::pending::{PendingQueue, PendingSegment};
use crate::reassembly::ReassemblyBuffer;
use crate::timer::{Timer, TimerOutcome, TimerTable};

/// Connection role, carried over UDP datagrams but shaped like TCP (spec.md
/// §4.5, "State machine per connection").
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    SynSent,
    SynRcvd,
    Open,
    Closing,
    TimeWait,
    Closed,
}

/// Why a connection reached `Disconnected` (spec.md §7, "Peer disconnect").
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DisconnectStatus {
    /// Confirms a disconnect this side initiated.
    Ok,
    /// Retransmission, persist, or probe retries were exhausted.
    Timeout,
    /// The peer sent RST.
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnEvent {
    /// Handshake completed. `passive` mirrors spec.md §4.5: the connect side
    /// sees `passive = false` on SYN-ACK, the accept side sees `passive =
    /// true` on the final ACK.
    Connected { passive: bool, peer_hello: Bytes },
    /// The handshake never completed (spec.md §7, "Timeout"; §4.2, "Reap
    /// stalled authenticators" for the passive side). `passive` tells the
    /// caller which side of the handshake this connection was on, since by
    /// the time this fires the role has already moved past SYN-SENT/SYN-RCVD.
    ConnectFailed { passive: bool },
    /// A whole reassembled message (spec.md §4.3, `recv_cb`).
    Recv { data: Bytes },
    /// The message submitted via `send` with this id has been fully acked
    /// (spec.md §4.3, `send_cb`).
    Sent { message_id: u64 },
    SendWindowChanged { window: u16 },
    Disconnected { status: DisconnectStatus },
}

pub struct ArdpConnection {
    pub(crate) id: ConnectionId,
    pub(crate) peer_id: ConnectionId,
    pub(crate) remote: SocketAddr,
    role: Role,

    data_timeout: Duration,
    data_retries: u32,
    persist_timeout: Duration,
    persist_retries: u32,
    probe_timeout: Duration,
    probe_retries: u32,
    dupack_threshold: u32,
    timewait: Duration,

    send_next: u32,
    recv_next: u32,
    local_window: u16,
    peer_window: u16,
    segbmax: u16,
    next_message_id: u64,
    last_ack_number_seen: Option<u32>,
    dup_ack_run: u32,
    local_disconnect_requested: bool,

    pending: PendingQueue,
    reassembly: ReassemblyBuffer,
    timers: TimerTable,

    events: VecDeque<ConnEvent>,
    outbox: VecDeque<Bytes>,
}

impl ArdpConnection {
    fn base(
        id: ConnectionId,
        peer_id: ConnectionId,
        remote: SocketAddr,
        config: &ArdpConfig,
        role: Role,
    ) -> Self {
        let mut timers = TimerTable::new();
        // Handshake retransmission uses connect_timeout/connect_retries
        // (spec.md §4.1, "Connect": "timeout connect_timeout * (2 +
        // connect_retries)"); `on_segment_syn_sent`/`on_segment_syn_rcvd`
        // reconfigure this timer to data_timeout/data_retries once open.
        timers.configure(Timer::Retransmit, config.connect_timeout, config.connect_retries);
        timers.configure(Timer::Persist, config.persist_timeout, config.persist_retries);
        timers.configure(Timer::Probe, config.probe_timeout, config.probe_retries);
        timers.configure(Timer::TimeWait, config.timewait, 0);

        ArdpConnection {
            id,
            peer_id,
            remote,
            role,
            data_timeout: config.data_timeout,
            data_retries: config.data_retries,
            persist_timeout: config.persist_timeout,
            persist_retries: config.persist_retries,
            probe_timeout: config.probe_timeout,
            probe_retries: config.probe_retries,
            dupack_threshold: config.dupack_counter,
            timewait: config.timewait,
            send_next: 1,
            recv_next: 0,
            local_window: config.initial_window,
            peer_window: config.initial_window,
            segbmax: config.segbmax,
            next_message_id: 1,
            last_ack_number_seen: None,
            dup_ack_run: 0,
            local_disconnect_requested: false,
            pending: PendingQueue::new(),
            reassembly: ReassemblyBuffer::new(),
            timers,
            events: VecDeque::new(),
            outbox: VecDeque::new(),
        }
    }

    /// Active open: emits the initial SYN carrying `hello`.
    pub(crate) fn connect(
        id: ConnectionId,
        remote: SocketAddr,
        now: Instant,
        config: &ArdpConfig,
        hello: Bytes,
    ) -> Self {
        let mut conn = Self::base(id, 0, remote, config, Role::SynSent);
        conn.transmit(
            ArdpHeader {
                flags: Flags::SYN,
                window: conn.local_window,
                seq: 0,
                ack: 0,
                src_conn_id: conn.id,
                dst_conn_id: 0,
                frag_index: 0,
                frag_count: 1,
            },
            hello,
        );
        conn.timers.start(Timer::Retransmit, now);
        conn
    }

    /// Passive open, after the `Transport` has accepted the peer's SYN:
    /// emits SYN-ACK carrying `reply_hello`.
    pub(crate) fn accept(
        id: ConnectionId,
        peer_id: ConnectionId,
        remote: SocketAddr,
        now: Instant,
        config: &ArdpConfig,
        peer_window: u16,
        reply_hello: Bytes,
    ) -> Self {
        let mut conn = Self::base(id, peer_id, remote, config, Role::SynRcvd);
        conn.peer_window = peer_window;
        conn.recv_next = 1;
        conn.transmit(
            ArdpHeader {
                flags: Flags::SYN | Flags::ACK,
                window: conn.local_window,
                seq: 0,
                ack: 0,
                src_conn_id: conn.id,
                dst_conn_id: conn.peer_id,
                frag_index: 0,
                frag_count: 1,
            },
            reply_hello,
        );
        conn.timers.start(Timer::Retransmit, now);
        conn
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    pub fn is_done(&self) -> bool {
        self.role == Role::Closed
    }

    pub fn outstanding_segments(&self) -> usize {
        self.pending.len()
    }

    fn transmit(&mut self, header: ArdpHeader, payload: Bytes) {
        let mut buf = BytesMut::new();
        header.encode(payload.len() as u16, &mut buf);
        buf.extend_from_slice(&payload);
        self.outbox.push_back(buf.freeze());
    }

    pub(crate) fn poll_transmit(&mut self) -> Option<Bytes> {
        self.outbox.pop_front()
    }

    pub fn poll_event(&mut self) -> Option<ConnEvent> {
        self.events.pop_front()
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Submit one whole application message for reliable delivery. Returns
    /// the message id that the matching `ConnEvent::Sent` will carry.
    ///
    /// Per spec.md §4.4.1 step 5 ("BACKPRESSURE"): the entire message is
    /// queued or none of it is — partial sends never happen.
    pub fn send(&mut self, now: Instant, data: Bytes) -> Result<u64> {
        if self.role != Role::Open {
            return Err(ArdpError::InvalidState);
        }

        let segbmax = self.segbmax as usize;
        let frag_count = data.len().div_ceil(segbmax.max(1)).max(1);
        if frag_count > crate::config::MAX_FRAGMENTS {
            return Err(ArdpError::MessageTooLarge);
        }

        if self.pending.len() + frag_count > self.peer_window as usize {
            return Err(ArdpError::BackPressure);
        }

        let message_id = self.next_message_id;
        self.next_message_id += 1;

        for frag_index in 0..frag_count {
            let start = frag_index * segbmax;
            let end = ((frag_index + 1) * segbmax).min(data.len());
            let chunk = data.slice(start..end);
            let seq = self.send_next;
            self.send_next = self.send_next.wrapping_add(1);

            self.transmit(
                ArdpHeader {
                    flags: Flags::empty(),
                    window: self.local_window,
                    seq,
                    ack: self.recv_next,
                    src_conn_id: self.id,
                    dst_conn_id: self.peer_id,
                    frag_index: frag_index as u16,
                    frag_count: frag_count as u16,
                },
                chunk.clone(),
            );
            self.pending.push(PendingSegment {
                seq,
                payload: chunk,
                frag_index: frag_index as u16,
                frag_count: frag_count as u16,
                message_id,
                sent_at: now,
                dup_acks: 0,
            });
        }

        if !self.timers.is_running(Timer::Retransmit) {
            self.timers.start(Timer::Retransmit, now);
        }
        Ok(message_id)
    }

    /// Graceful close: spec.md §4.5 "OPEN --disconnect--> CLOSING".
    pub fn disconnect(&mut self, now: Instant) {
        if matches!(self.role, Role::Closing | Role::TimeWait | Role::Closed) {
            return;
        }
        self.local_disconnect_requested = true;
        self.role = Role::Closing;
        self.transmit(
            ArdpHeader {
                flags: Flags::FIN,
                window: self.local_window,
                seq: self.send_next,
                ack: self.recv_next,
                src_conn_id: self.id,
                dst_conn_id: self.peer_id,
                frag_index: 0,
                frag_count: 1,
            },
            Bytes::new(),
        );
        self.timers.stop(Timer::Probe);
        self.timers.stop(Timer::Persist);
        self.timers.configure(Timer::Retransmit, self.data_timeout, self.data_retries);
        self.timers.start(Timer::Retransmit, now);
    }

    /// Hard close: peer is unreachable or protocol was violated badly enough
    /// that continuing would be unsafe (spec.md §7, "Protocol invariant
    /// violation").
    pub fn reset(&mut self, now: Instant) {
        self.transmit(
            ArdpHeader {
                flags: Flags::RST,
                window: 0,
                seq: self.send_next,
                ack: self.recv_next,
                src_conn_id: self.id,
                dst_conn_id: self.peer_id,
                frag_index: 0,
                frag_count: 1,
            },
            Bytes::new(),
        );
        self.enter_closed(now, DisconnectStatus::Reset);
    }

    fn enter_closed(&mut self, now: Instant, status: DisconnectStatus) {
        if self.role == Role::Closed {
            return;
        }
        // The handshake never finished, so there is nothing to disconnect
        // from yet (spec.md §4.1, "Connect": a failed handshake reports
        // `ConnectFailed`, never `Disconnected`).
        let never_connected = matches!(self.role, Role::SynSent | Role::SynRcvd);
        let was_passive = self.role == Role::SynRcvd;
        self.role = Role::TimeWait;
        self.timers.stop(Timer::Retransmit);
        self.timers.stop(Timer::Persist);
        self.timers.stop(Timer::Probe);
        self.timers.start(Timer::TimeWait, now);
        if never_connected {
            self.events
                .push_back(ConnEvent::ConnectFailed { passive: was_passive });
        } else {
            self.events.push_back(ConnEvent::Disconnected { status });
        }
    }

    pub(crate) fn on_segment(&mut self, now: Instant, header: ArdpHeader, payload: Bytes) {
        if header.flags.contains(Flags::RST) {
            self.enter_closed(now, DisconnectStatus::Reset);
            return;
        }

        match self.role {
            Role::SynSent => self.on_segment_syn_sent(now, header, payload),
            Role::SynRcvd => self.on_segment_syn_rcvd(now, header),
            Role::Open | Role::Closing => self.on_segment_established(now, header, payload),
            Role::TimeWait | Role::Closed => {
                // Retransmitted final ACK/FIN for a connection already
                // winding down; nothing to do but stay quiet.
            }
        }
    }

    fn on_segment_syn_sent(&mut self, now: Instant, header: ArdpHeader, payload: Bytes) {
        if header.flags.contains(Flags::SYN) && header.flags.contains(Flags::ACK) {
            self.peer_id = header.src_conn_id;
            self.peer_window = header.window;
            self.recv_next = 1;
            self.role = Role::Open;
            self.timers.stop(Timer::Retransmit);
            self.timers.configure(Timer::Retransmit, self.data_timeout, self.data_retries);
            self.transmit(
                ArdpHeader {
                    flags: Flags::ACK,
                    window: self.local_window,
                    seq: self.send_next,
                    ack: self.recv_next,
                    src_conn_id: self.id,
                    dst_conn_id: self.peer_id,
                    frag_index: 0,
                    frag_count: 1,
                },
                Bytes::new(),
            );
            self.arm_idle_keepalive(now);
            self.events.push_back(ConnEvent::Connected {
                passive: false,
                peer_hello: payload,
            });
        }
    }

    fn on_segment_syn_rcvd(&mut self, now: Instant, header: ArdpHeader) {
        if header.flags.contains(Flags::ACK) {
            self.role = Role::Open;
            self.timers.stop(Timer::Retransmit);
            self.timers.configure(Timer::Retransmit, self.data_timeout, self.data_retries);
            self.arm_idle_keepalive(now);
            self.events.push_back(ConnEvent::Connected {
                passive: true,
                peer_hello: Bytes::new(),
            });
        }
    }

    fn on_segment_established(&mut self, now: Instant, header: ArdpHeader, payload: Bytes) {
        self.arm_idle_keepalive(now);

        if header.flags.contains(Flags::FIN) {
            self.transmit(
                ArdpHeader {
                    flags: Flags::ACK,
                    window: self.local_window,
                    seq: self.send_next,
                    ack: header.seq.wrapping_add(1),
                    src_conn_id: self.id,
                    dst_conn_id: self.peer_id,
                    frag_index: 0,
                    frag_count: 1,
                },
                Bytes::new(),
            );
            // A FIN exchanged cleanly, whichever side initiated it, is a
            // graceful close; `Timeout`/`Reset` are reserved for the abrupt
            // paths. The layer above maps this to "sudden" vs "solicited"
            // (spec.md §4.4.2).
            self.enter_closed(now, DisconnectStatus::Ok);
            return;
        }

        if header.flags.contains(Flags::NUL) {
            // Idle keepalive probe: the act of receiving anything already
            // reset the idle timer above; no payload to process.
            return;
        }

        // Every established-state segment carries a meaningful ack number
        // and advertised window, piggybacked whether or not it also carries
        // data (spec.md §4.5, "Window": "Each side advertises its
        // receive-window in every header").
        self.on_ack(now, header.ack, header.window);

        if !payload.is_empty() {
            self.on_data(now, header, payload);
        }

        if self.local_disconnect_requested
            && self.role == Role::Closing
            && self.pending.is_empty()
        {
            // Our own FIN has been acked and no data remains outstanding;
            // the peer's final ACK (handled above) is what actually retires
            // the connection, this just stops further retransmission noise.
            self.timers.stop(Timer::Retransmit);
        }
    }

    fn on_data(&mut self, now: Instant, header: ArdpHeader, payload: Bytes) {
        if header.seq != self.recv_next {
            // Out-of-order or duplicate: re-ack what we actually have so the
            // sender's duplicate-ack counter advances (spec.md §4.5,
            // "Duplicate-ack fast retransmit").
            self.send_pure_ack(now);
            return;
        }

        match self.reassembly.insert(header.frag_index, header.frag_count, payload) {
            Ok(Some(message)) => {
                self.recv_next = self.recv_next.wrapping_add(1);
                self.events.push_back(ConnEvent::Recv { data: message });
                self.send_pure_ack(now);
            }
            Ok(None) => {
                self.recv_next = self.recv_next.wrapping_add(1);
                self.send_pure_ack(now);
            }
            Err(e) => {
                warn!("ardp: dropping invalid fragment on connection {}: {}", self.id, e);
            }
        }
    }

    fn send_pure_ack(&mut self, _now: Instant) {
        self.transmit(
            ArdpHeader {
                flags: Flags::ACK,
                window: self.local_window,
                seq: self.send_next,
                ack: self.recv_next,
                src_conn_id: self.id,
                dst_conn_id: self.peer_id,
                frag_index: 0,
                frag_count: 1,
            },
            Bytes::new(),
        );
    }

    fn on_ack(&mut self, now: Instant, ack: u32, window: u16) {
        let prior_window = self.peer_window;
        self.peer_window = window;

        let completed = self.pending.ack_through(ack);
        for message_id in completed {
            self.events.push_back(ConnEvent::Sent { message_id });
        }

        if self.pending.is_empty() {
            self.timers.stop(Timer::Retransmit);
        } else {
            self.timers.start(Timer::Retransmit, now);
        }

        if window == 0 && !self.timers.is_running(Timer::Persist) {
            self.timers.start(Timer::Persist, now);
        } else if window > 0 {
            self.timers.stop(Timer::Persist);
        }

        if prior_window != window {
            self.events.push_back(ConnEvent::SendWindowChanged { window });
        }

        if Some(ack) == self.last_ack_number_seen {
            self.dup_ack_run += 1;
            if self.dup_ack_run >= self.dupack_threshold {
                self.fast_retransmit(now);
                self.dup_ack_run = 0;
            }
        } else {
            self.last_ack_number_seen = Some(ack);
            self.dup_ack_run = 0;
        }
    }

    fn fast_retransmit(&mut self, now: Instant) {
        if let Some(seg) = self.pending.front().cloned() {
            debug!("ardp: fast retransmit of seq {} on connection {}", seg.seq, self.id);
            self.transmit(
                ArdpHeader {
                    flags: Flags::empty(),
                    window: self.local_window,
                    seq: seg.seq,
                    ack: self.recv_next,
                    src_conn_id: self.id,
                    dst_conn_id: self.peer_id,
                    frag_index: seg.frag_index,
                    frag_count: seg.frag_count,
                },
                seg.payload,
            );
            self.timers.start(Timer::Retransmit, now);
        }
    }

    fn arm_idle_keepalive(&mut self, now: Instant) {
        self.timers.start(Timer::Probe, now);
    }

    /// Advance every running timer. Called by [`crate::handle::ArdpHandle::handle_timeout`]
    /// once per connection on every maintenance-loop wakeup.
    pub(crate) fn on_timer(&mut self, now: Instant) {
        match self.timers.poll(Timer::Retransmit, now) {
            TimerOutcome::Pending => {}
            TimerOutcome::Retry(_) => self.retransmit_oldest(now),
            TimerOutcome::Exhausted => {
                trace!("ardp: retransmission exhausted on connection {}", self.id);
                self.enter_closed(now, DisconnectStatus::Timeout);
            }
        }

        match self.timers.poll(Timer::Persist, now) {
            TimerOutcome::Pending => {}
            TimerOutcome::Retry(_) => self.send_persist_probe(now),
            TimerOutcome::Exhausted => self.enter_closed(now, DisconnectStatus::Timeout),
        }

        match self.timers.poll(Timer::Probe, now) {
            TimerOutcome::Pending => {}
            TimerOutcome::Retry(_) => self.send_nul_probe(now),
            TimerOutcome::Exhausted => self.enter_closed(now, DisconnectStatus::Timeout),
        }

        if let TimerOutcome::Exhausted = self.timers.poll(Timer::TimeWait, now) {
            self.role = Role::Closed;
        }
    }

    fn retransmit_oldest(&mut self, now: Instant) {
        if let Some(seg) = self.pending.front().cloned() {
            self.transmit(
                ArdpHeader {
                    flags: Flags::empty(),
                    window: self.local_window,
                    seq: seg.seq,
                    ack: self.recv_next,
                    src_conn_id: self.id,
                    dst_conn_id: self.peer_id,
                    frag_index: seg.frag_index,
                    frag_count: seg.frag_count,
                },
                seg.payload,
            );
        } else if self.role == Role::Closing {
            // Our FIN itself is what's unacked; resend it.
            self.transmit(
                ArdpHeader {
                    flags: Flags::FIN,
                    window: self.local_window,
                    seq: self.send_next,
                    ack: self.recv_next,
                    src_conn_id: self.id,
                    dst_conn_id: self.peer_id,
                    frag_index: 0,
                    frag_count: 1,
                },
                Bytes::new(),
            );
        }
    }

    fn send_persist_probe(&mut self, _now: Instant) {
        self.transmit(
            ArdpHeader {
                flags: Flags::empty(),
                window: self.local_window,
                seq: self.send_next.wrapping_sub(1),
                ack: self.recv_next,
                src_conn_id: self.id,
                dst_conn_id: self.peer_id,
                frag_index: 0,
                frag_count: 1,
            },
            Bytes::new(),
        );
    }

    fn send_nul_probe(&mut self, _now: Instant) {
        self.transmit(
            ArdpHeader {
                flags: Flags::NUL,
                window: self.local_window,
                seq: self.send_next,
                ack: self.recv_next,
                src_conn_id: self.id,
                dst_conn_id: self.peer_id,
                frag_index: 0,
                frag_count: 1,
            },
            Bytes::new(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn addr() -> SocketAddr {
        "127.0.0.1:9955".parse().unwrap()
    }

    #[test]
    fn handshake_then_single_fragment_message_round_trips() {
        let config = ArdpConfig::default();
        let now = Instant::now();

        let mut active = ArdpConnection::connect(1, addr(), now, &config, Bytes::from_static(b"hi"));
        let syn = active.poll_transmit().unwrap();
        let (syn_header, hello) = ArdpHeader::decode(syn).unwrap();
        assert!(syn_header.flags.contains(Flags::SYN));
        assert_eq!(hello, Bytes::from_static(b"hi"));

        let mut passive = ArdpConnection::accept(
            2,
            syn_header.src_conn_id,
            addr(),
            now,
            &config,
            syn_header.window,
            Bytes::from_static(b"hi-reply"),
        );
        let synack = passive.poll_transmit().unwrap();
        let (synack_header, reply) = ArdpHeader::decode(synack).unwrap();
        assert!(synack_header.flags.contains(Flags::SYN) && synack_header.flags.contains(Flags::ACK));

        active.on_segment(now, synack_header, reply.clone());
        assert_eq!(
            active.poll_event(),
            Some(ConnEvent::Connected { passive: false, peer_hello: reply })
        );
        let ack = active.poll_transmit().unwrap();
        let (ack_header, _) = ArdpHeader::decode(ack).unwrap();

        passive.on_segment(now, ack_header, Bytes::new());
        assert_eq!(
            passive.poll_event(),
            Some(ConnEvent::Connected { passive: true, peer_hello: Bytes::new() })
        );

        assert_eq!(active.role(), Role::Open);
        assert_eq!(passive.role(), Role::Open);

        let msg_id = active.send(now, Bytes::from_static(b"payload")).unwrap();
        let data_dgram = active.poll_transmit().unwrap();
        let (data_header, data_payload) = ArdpHeader::decode(data_dgram).unwrap();
        passive.on_segment(now, data_header, data_payload);
        assert_eq!(passive.poll_event(), Some(ConnEvent::Recv { data: Bytes::from_static(b"payload") }));

        let ack_dgram = passive.poll_transmit().unwrap();
        let (ack_header2, _) = ArdpHeader::decode(ack_dgram).unwrap();
        active.on_segment(now, ack_header2, Bytes::new());
        assert_eq!(active.poll_event(), Some(ConnEvent::Sent { message_id: msg_id }));
    }

    #[test]
    fn send_past_window_yields_backpressure() {
        let mut config = ArdpConfig::default();
        config.initial_window = 1;
        let now = Instant::now();
        let mut conn = ArdpConnection::base(1, 2, addr(), &config, Role::Open);
        conn.peer_window = 1;

        assert!(conn.send(now, Bytes::from_static(b"a")).is_ok());
        assert_eq!(conn.send(now, Bytes::from_static(b"b")), Err(ArdpError::BackPressure));
    }

    #[test]
    fn oversized_message_is_rejected() {
        let config = ArdpConfig::default();
        let now = Instant::now();
        let mut conn = ArdpConnection::base(1, 2, addr(), &config, Role::Open);
        let huge = vec![0u8; config.segbmax as usize * 4];
        assert_eq!(
            conn.send(now, Bytes::from(huge)),
            Err(ArdpError::MessageTooLarge)
        );
    }
}
