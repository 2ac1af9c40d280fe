//! Per-endpoint producer-side adapter (spec.md §4.4, "Stream"): a blocking
//! `push_bytes` with backpressure on top of ARDP's non-blocking `send`, and
//! the collapsed three-boolean disconnect state machine from spec.md §4.4.2.
//!
//! The condvar-guarded backpressure wait of the source becomes a
//! `tokio::sync::Notify`, per SPEC_FULL.md's concurrency translation notes;
//! the "threads inside" set becomes an atomic counter with an RAII guard,
//! the idiomatic Rust shape of spec.md §9's "Thread-set membership to defer
//! destruction" design note.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ardp::DisconnectStatus;
use bytes::Bytes;
use log::{trace, warn};
use tokio::sync::Notify;

use crate::endpoint::EndpointHandle;
use crate::error::{Result, TransportError};
use crate::transport::Shared;

/// The collapsed disconnect state (spec.md §4.4.2): `(disconnected,
/// local_disconnect_sent, disconnect_reason)`, initially
/// `(false, false, None)`.
#[derive(Debug, Default)]
struct DisconnectState {
    disconnected: bool,
    local_disconnect_sent: bool,
    reason: Option<TransportError>,
}

pub struct Stream {
    disconnect: DisconnectState,
    /// Producers currently inside `push_bytes` (spec.md invariant 4).
    threads_inside: AtomicUsize,
    /// Writes handed to ARDP awaiting their `send_cb` (spec.md §4.4.1 step
    /// 3, §4.4.3).
    outstanding_writes: AtomicUsize,
    /// Woken on every `send_cb` and on disconnect (spec.md §4.4.3).
    backpressure: Notify,
    data_timeout: Duration,
    data_retries: u32,
}

impl Stream {
    pub fn new(data_timeout: Duration, data_retries: u32) -> Self {
        Stream {
            disconnect: DisconnectState::default(),
            threads_inside: AtomicUsize::new(0),
            outstanding_writes: AtomicUsize::new(0),
            backpressure: Notify::new(),
            data_timeout,
            data_retries,
        }
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnect.disconnected
    }

    pub fn outstanding_writes(&self) -> usize {
        self.outstanding_writes.load(Ordering::SeqCst)
    }

    pub fn threads_inside_count(&self) -> usize {
        self.threads_inside.load(Ordering::SeqCst)
    }

    /// Wakes any `push_bytes` waiter without freeing a write, used when
    /// ARDP reports the peer's advertised window grew (spec.md §4.1,
    /// `send_window_cb`: not itself a workqueue entry, just a nudge for
    /// producers that may now be able to proceed).
    pub(crate) fn wake_waiters(&self) {
        self.backpressure.notify_waiters();
    }

    fn deadline(&self) -> Duration {
        self.data_timeout * (2 + self.data_retries)
    }

    /// The three-boolean transition table, collapsed from the source's
    /// eight-state table (spec.md §4.4.2).
    ///
    /// `issue_local_disconnect` performs the actual `ardp_disconnect()` call
    /// for the `(false, false, false)` row; it is a closure so this method
    /// stays free of ARDP/lock concerns (spec.md §9 first design note).
    fn disconnect(
        &mut self,
        sudden: bool,
        status: Option<DisconnectStatus>,
        issue_local_disconnect: impl FnOnce() -> Result<()>,
    ) {
        if self.disconnect.disconnected {
            // `(*, true, *)`: idempotent no-op.
            return;
        }

        if !sudden {
            if !self.disconnect.local_disconnect_sent {
                // `(false, false, false)`.
                self.disconnect.local_disconnect_sent = true;
                match issue_local_disconnect() {
                    Ok(()) => {
                        self.disconnect.reason = Some(TransportError::LocalDisconnect);
                    }
                    Err(e) => {
                        self.disconnect.disconnected = true;
                        self.disconnect.reason = Some(e);
                    }
                }
            } else {
                // `(false, true, *)`: confirmation of our own prior
                // disconnect.
                self.disconnect.disconnected = true;
            }
        } else {
            // `(true, *, *)`: remote or failure disconnect wins; first
            // status wins if one was already recorded by a racing local
            // disconnect attempt.
            self.disconnect.disconnected = true;
            if self.disconnect.reason.is_none() {
                self.disconnect.reason = Some(match status {
                    Some(s) => TransportError::Disconnected(s),
                    None => TransportError::Disconnected(DisconnectStatus::Reset),
                });
            }
        }

        if self.disconnect.disconnected {
            self.backpressure.notify_waiters();
        }
    }

    /// `send_cb` (spec.md §4.4.3): frees the buffer ARDP lent us and wakes
    /// any `push_bytes` waiter.
    fn on_send_cb(&self) {
        let prior = self.outstanding_writes.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prior > 0, "send_cb with no outstanding write");
        self.backpressure.notify_waiters();
    }
}

/// `push_bytes(buf, ttl) -> bytes_sent` (spec.md §4.4.1). Free function
/// rather than a `Stream` method because it must reach across the endpoint
/// table and the ARDP handle, both owned by [`Shared`], while never holding
/// either lock across an `.await`.
pub async fn push_bytes(
    shared: &Arc<Shared>,
    endpoint: EndpointHandle,
    data: Bytes,
) -> Result<usize> {
    let len = data.len();
    let deadline = {
        let endpoints = shared.endpoints.lock().unwrap();
        let ep = endpoints
            .get(endpoint)
            .ok_or(TransportError::NotStarted)?;
        if shared.is_stopping() {
            return Err(TransportError::Stopping);
        }
        if ep.stream.is_disconnected() {
            return Err(ep
                .stream
                .disconnect
                .reason
                .clone()
                .unwrap_or(TransportError::Stopping));
        }
        Instant::now() + ep.stream.deadline()
    };

    // Registers for the duration of the call; spec.md invariant 4. The
    // guard only ever re-acquires the table lock itself (on entry and on
    // drop), so it is safe to hold across the `.await` points below.
    let _guard = ThreadInsideGuardOwned::enter(shared.clone(), endpoint);

    loop {
        if Instant::now() >= deadline {
            return Err(TransportError::Timeout);
        }

        let send_result = {
            let mut endpoints = shared.endpoints.lock().unwrap();
            let ep = endpoints
                .get_mut(endpoint)
                .ok_or(TransportError::NotStarted)?;
            if ep.stream.is_disconnected() {
                return Err(ep
                    .stream
                    .disconnect
                    .reason
                    .clone()
                    .unwrap_or(TransportError::Stopping));
            }
            let conn = ep.ardp_conn.ok_or(TransportError::Stopping)?;
            let mut ardp = shared.ardp.lock().unwrap();
            let now = Instant::now();
            let result = ardp
                .connection_mut(conn)
                .ok_or(TransportError::Stopping)?
                .send(now, data.clone());
            if result.is_ok() {
                ep.stream.outstanding_writes.fetch_add(1, Ordering::SeqCst);
            }
            result
        };
        shared.nudge_maintenance();

        match send_result {
            Ok(_message_id) => {
                trace!("stream: queued {} bytes on {:?}", len, endpoint);
                return Ok(len);
            }
            Err(ardp::ArdpError::BackPressure) => {
                let still_outstanding = {
                    let endpoints = shared.endpoints.lock().unwrap();
                    endpoints
                        .get(endpoint)
                        .map(|ep| ep.stream.outstanding_writes())
                        .unwrap_or(0)
                };
                if still_outstanding == 0 {
                    // No send_cb will come to wake us; loop and retry
                    // immediately (spec.md §4.4.1 step 5, first bullet).
                    continue;
                }
                let notified = {
                    let endpoints = shared.endpoints.lock().unwrap();
                    match endpoints.get(endpoint) {
                        Some(ep) => ep.stream.backpressure.notified(),
                        None => return Err(TransportError::NotStarted),
                    }
                };
                let remaining = deadline.saturating_duration_since(Instant::now());
                let _ = tokio::time::timeout(remaining, notified).await;

                let endpoints = shared.endpoints.lock().unwrap();
                if let Some(ep) = endpoints.get(endpoint) {
                    if ep.stream.is_disconnected() {
                        return Err(ep
                            .stream
                            .disconnect
                            .reason
                            .clone()
                            .unwrap_or(TransportError::Stopping));
                    }
                }
            }
            Err(e) => {
                warn!("stream: push_bytes failed on {:?}: {}", endpoint, e);
                return Err(TransportError::Ardp(e));
            }
        }
    }
}

/// Owning variant of [`ThreadInsideGuard`], needed because `push_bytes`
/// re-acquires the table lock on every loop iteration rather than holding
/// it (or a borrow derived from it) for the whole call.
struct ThreadInsideGuardOwned {
    shared: Arc<Shared>,
    endpoint: EndpointHandle,
}

impl ThreadInsideGuardOwned {
    fn enter(shared: Arc<Shared>, endpoint: EndpointHandle) -> Self {
        if let Some(ep) = shared.endpoints.lock().unwrap().get(endpoint) {
            ep.stream.threads_inside.fetch_add(1, Ordering::SeqCst);
        }
        ThreadInsideGuardOwned { shared, endpoint }
    }
}

impl Drop for ThreadInsideGuardOwned {
    fn drop(&mut self) {
        if let Some(ep) = self.shared.endpoints.lock().unwrap().get(self.endpoint) {
            ep.stream.threads_inside.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Called from `disconnect_cb` (spec.md §4.3) and from `Endpoint::stop`'s
/// local-disconnect path. `issue_local_disconnect` runs under the ARDP
/// lock, matching the source calling `ardp_disconnect` while still holding
/// it.
pub fn disconnect(
    stream: &mut Stream,
    sudden: bool,
    status: Option<DisconnectStatus>,
    issue_local_disconnect: impl FnOnce() -> Result<()>,
) {
    stream.disconnect(sudden, status, issue_local_disconnect);
}

pub fn on_send_cb(stream: &Stream) {
    stream.on_send_cb();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_disconnect_then_confirmation_reaches_disconnected() {
        let mut stream = Stream::new(Duration::from_millis(10), 1);
        disconnect(&mut stream, false, None, || Ok(()));
        assert!(!stream.is_disconnected());
        disconnect(&mut stream, false, None, || Ok(()));
        assert!(stream.is_disconnected());
    }

    #[test]
    fn sudden_disconnect_wins_even_mid_local_attempt() {
        let mut stream = Stream::new(Duration::from_millis(10), 1);
        disconnect(&mut stream, false, None, || Ok(()));
        disconnect(&mut stream, true, Some(DisconnectStatus::Reset), || Ok(()));
        assert!(stream.is_disconnected());
        assert_eq!(
            stream.disconnect.reason,
            Some(TransportError::LocalDisconnect)
        );
    }

    #[test]
    fn repeated_disconnect_is_idempotent() {
        let mut stream = Stream::new(Duration::from_millis(10), 1);
        disconnect(&mut stream, true, Some(DisconnectStatus::Timeout), || Ok(()));
        let before = stream.disconnect.reason.clone();
        disconnect(&mut stream, true, Some(DisconnectStatus::Reset), || Ok(()));
        assert_eq!(stream.disconnect.reason, before);
    }

    #[test]
    fn send_cb_wakes_a_waiting_push() {
        let stream = Stream::new(Duration::from_millis(10), 1);
        stream.outstanding_writes.fetch_add(1, Ordering::SeqCst);
        on_send_cb(&stream);
        assert_eq!(stream.outstanding_writes(), 0);
    }
}
