//! Error taxonomy exposed to the bus and to producer threads (spec.md §7,
//! "Error Handling Design"). `BackPressure` is internal to the Stream retry
//! loop and never escapes `push_bytes`; every other variant is what a caller
//! actually observes.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Send window exhausted; handled internally by [`crate::stream::Stream`]
    /// and never returned from a public call.
    #[error("send window exhausted")]
    BackPressure,

    /// Deadline exhausted in `push_bytes`, `connect`, or ARDP's own retry
    /// limits (spec.md §7, "Timeout").
    #[error("operation timed out")]
    Timeout,

    /// Admission would exceed `max_incomplete_connections` or
    /// `max_completed_connections` (spec.md §4.1, "Admission on inbound SYN").
    #[error("connection rejected by admission control")]
    ConnectionRejected,

    /// Returned to any API call while the Transport is winding down
    /// (spec.md §7, "Shutdown-in-progress").
    #[error("transport is stopping")]
    Stopping,

    /// A connect target matches one of our own listen addresses (spec.md §7,
    /// "Self-connect refusal", and §8's boundary behavior).
    #[error("connect target is our own listen address")]
    AlreadyListening,

    /// `connect` targets an address unreachable from any local interface
    /// (spec.md §8, "`connect` called with a socket on a different network").
    #[error("no local interface can reach that address")]
    NoNetwork,

    /// Public API invoked before `start` or after `join` (spec.md §7,
    /// "Transport not started").
    #[error("transport has not been started, or has already been joined")]
    NotStarted,

    /// `start_listen` called for a spec already bound.
    #[error("already listening on that spec")]
    AlreadyListeningSpec,

    /// The peer disconnected, or the connection was reset/timed out
    /// underneath us (spec.md §7, "Peer disconnect"). Carries the same
    /// [`ardp::DisconnectStatus`] surfaced by `disconnect_cb`.
    #[error("peer disconnected: {0:?}")]
    Disconnected(ardp::DisconnectStatus),

    /// The endpoint was disconnected locally, via `Stream::disconnect`, and
    /// this is the confirmation path (spec.md §4.4.2, `(false, false, true)`
    /// row of the collapsed state table).
    #[error("local disconnect")]
    LocalDisconnect,

    /// A listen or connect spec failed to parse (spec.md §6, "Transport spec
    /// grammar") or carried a rejected key (`r4*`, `r6*`, `u6*`).
    #[error("invalid transport spec: {0}")]
    InvalidSpec(String),

    #[error(transparent)]
    Ardp(#[from] ardp::ArdpError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Manual impl since `std::io::Error` has none of its own; tests that
/// compare disconnect reasons only ever carry non-`Io` variants, so string
/// comparison on that one arm is sufficient rather than significant.
impl PartialEq for TransportError {
    fn eq(&self, other: &Self) -> bool {
        use TransportError::*;
        match (self, other) {
            (BackPressure, BackPressure) => true,
            (Timeout, Timeout) => true,
            (ConnectionRejected, ConnectionRejected) => true,
            (Stopping, Stopping) => true,
            (AlreadyListening, AlreadyListening) => true,
            (NoNetwork, NoNetwork) => true,
            (NotStarted, NotStarted) => true,
            (AlreadyListeningSpec, AlreadyListeningSpec) => true,
            (Disconnected(a), Disconnected(b)) => a == b,
            (LocalDisconnect, LocalDisconnect) => true,
            (InvalidSpec(a), InvalidSpec(b)) => a == b,
            (Ardp(a), Ardp(b)) => a == b,
            (Io(a), Io(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

impl Eq for TransportError {}

pub type Result<T> = std::result::Result<T, TransportError>;
