//! The callback dispatcher (spec.md §4.6): "Single thread owning a queue of
//! workqueue entries ... Routing callbacks through this dispatcher ensures
//! the ARDP lock is never held while calling into the router and vice
//! versa." Here the "single thread" becomes a single long-lived tokio task
//! draining an `mpsc::UnboundedReceiver`, the way the teacher replaces a
//! dedicated driver thread with a spawned async task in
//! `endpoint::EndpointDriver`/`association::AssociationDriver`.

use std::sync::Arc;

use ardp::{ConnectionHandle, DisconnectStatus};
use bytes::Bytes;
use log::{debug, trace, warn};
use tokio::sync::mpsc;

use crate::endpoint::EndpointHandle;
use crate::endpoint_manager::request_manage_cycle;
use crate::transport::Shared;

/// One entry of the workqueue (spec.md §3, "Workqueue entry"): "Tagged
/// union: `{Exit, ConnectCb, DisconnectCb, RecvCb, SendCb}`, each carrying
/// the ARDP handle, connection, connection id, and kind-specific payload."
/// The ARDP handle itself is reached through `Shared`, so each variant here
/// only needs the connection and payload.
#[derive(Debug)]
pub enum WorkItem {
    /// A peer finished (or failed) the handshake on `conn`. `hello` carries
    /// the peer's hello/hello-reply payload on success; `None` on failure.
    ConnectCb {
        conn: ConnectionHandle,
        passive: bool,
        hello: Option<Bytes>,
    },
    /// `conn` reached `Disconnected` inside ARDP.
    DisconnectCb {
        conn: ConnectionHandle,
        status: DisconnectStatus,
    },
    /// A whole reassembled message arrived on `conn`.
    RecvCb { conn: ConnectionHandle, data: Bytes },
    /// `conn`'s outstanding write with this `message_id` was acked.
    SendCb { conn: ConnectionHandle, message_id: u64 },
    /// Detach an endpoint already in DONE/FAILED from the router (spec.md
    /// §4.6, `Exit`). Carries the endpoint handle, not the ARDP connection
    /// handle: by the time this fires ARDP may already have freed the
    /// connection (spec.md §3 invariant 6).
    Exit { endpoint: EndpointHandle },
    /// Stop the dispatcher task (spec.md §3, workqueue entry kinds).
    Shutdown,
}

pub type WorkSender = mpsc::UnboundedSender<WorkItem>;
pub type WorkReceiver = mpsc::UnboundedReceiver<WorkItem>;

/// Builds the channel before `Shared` exists, since `Shared` needs to hold
/// onto the sender and the receiver needs a fully-constructed `Shared` to
/// dispatch against (see `Transport::start`).
pub fn channel() -> (WorkSender, WorkReceiver) {
    mpsc::unbounded_channel()
}

/// Spawns the dispatcher task against an already-built [`Shared`]. Returns
/// the `JoinHandle` `Transport::join` waits on.
pub fn spawn_dispatcher(shared: Arc<Shared>, mut rx: WorkReceiver) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            if matches!(item, WorkItem::Shutdown) {
                break;
            }
            dispatch_one(&shared, item).await;
        }
        trace!("dispatcher: drained and exiting");
    })
}

/// Handles exactly one entry. Called with no ARDP lock held (spec.md §4.6
/// rationale; invariant 2 in spec.md §3).
async fn dispatch_one(shared: &Arc<Shared>, item: WorkItem) {
    match item {
        WorkItem::ConnectCb { conn, passive, hello } => {
            crate::endpoint_manager::on_connect_cb(shared, conn, passive, hello).await;
        }
        WorkItem::DisconnectCb { conn, status } => {
            crate::endpoint_manager::on_disconnect_cb(shared, conn, status).await;
        }
        WorkItem::RecvCb { conn, data } => {
            crate::endpoint_manager::on_recv_cb(shared, conn, data).await;
        }
        WorkItem::SendCb { conn, message_id } => {
            crate::endpoint_manager::on_send_cb(shared, conn, message_id);
        }
        WorkItem::Exit { endpoint } => {
            crate::endpoint_manager::on_exit(shared, endpoint);
        }
        WorkItem::Shutdown => unreachable!("handled by the caller before dispatch_one"),
    }
    request_manage_cycle(shared);
}

pub fn enqueue(sender: &WorkSender, item: WorkItem) {
    if sender.send(item).is_err() {
        warn!("workqueue: dispatcher already gone, dropping entry");
    } else {
        debug!("workqueue: enqueued one entry");
    }
}
