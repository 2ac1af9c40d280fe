//! Sans-I/O protocol logic for ARDP, the reliable datagram protocol that
//! layers ordered, reliable, flow-controlled, fragmented message delivery
//! over UDP (spec.md §4.5).
//!
//! `ardp` contains a fully deterministic implementation of the protocol
//! logic. It performs no networking and reads no wall-clock time itself —
//! every entry point takes an explicit `Instant`. Callers drive it by
//! feeding inbound datagrams to [`handle::ArdpHandle::handle_datagram`],
//! periodically calling [`handle::ArdpHandle::handle_timeout`], and draining
//! [`handle::ArdpHandle::poll_transmit`] and each connection's `poll_event`.
//!
//! The `transport` crate is the networked counterpart that owns real UDP
//! sockets and the thread/task model described in spec.md §5.

#![warn(rust_2018_idioms)]
#![allow(clippy::too_many_arguments)]

mod config;
mod connection;
mod error;
mod handle;
mod header;
mod id;
mod pending;
mod reassembly;
mod timer;

pub use config::ArdpConfig;
pub use connection::{ArdpConnection, ConnEvent, DisconnectStatus, Role};
pub use error::{ArdpError, Result};
pub use handle::{ArdpHandle, ConnectionHandle, DatagramEvent, Incoming, Transmit};
pub use header::{ArdpHeader, Flags, HEADER_LEN};
pub use id::{ConnectionId, ConnectionIdGenerator, RandomConnectionIdGenerator};
