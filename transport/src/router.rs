//! External collaborators (spec.md §1, "Deliberately out of scope"; §6,
//! "Callback / API surface emitted by the core"). The message bus router and
//! the name service live outside this core; it only needs trait objects to
//! call into them.

use std::net::SocketAddr;

use bytes::Bytes;

use crate::endpoint::{EndpointFeatures, EndpointHandle};

/// A fully parsed message, as handed to the router after unmarshal (spec.md
/// §4.3, `recv_cb`: "Load the bytes into a message object, unmarshal ...").
/// Marshal/unmarshal itself is out of scope (spec.md §1); this core only
/// reassembles bytes and hands them up.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub endpoint: EndpointHandle,
    pub bytes: Bytes,
}

/// The higher-level message bus router (spec.md §1, "the higher-level
/// message bus router that decides which remote endpoint should receive a
/// given message"). Implemented outside this crate; the Transport only
/// calls through this trait.
pub trait Router: Send + Sync + 'static {
    /// Called once an endpoint reaches STARTED (spec.md §4.3, `recv_cb`
    /// precondition; §4.6, `ConnectCb` dispatch: "call `start` on it (which
    /// registers with the router)").
    fn register_endpoint(
        &self,
        endpoint: EndpointHandle,
        remote: SocketAddr,
        features: EndpointFeatures,
        unique_name: &str,
    );

    /// Called from the dispatcher's `Exit` handling (spec.md §4.6, `Exit`:
    /// "look up endpoint; call its `exit` (detach from router)").
    fn unregister_endpoint(&self, endpoint: EndpointHandle);

    /// One whole reassembled message, delivered in send order per endpoint
    /// (spec.md §8, ordering testable property).
    fn push_message(&self, message: InboundMessage);

    /// Reported exactly once per endpoint (spec.md §4.3, `disconnect_cb`:
    /// "Notify the bus-level listener that the connection was lost"; §8,
    /// "the router is informed of a lost connection exactly once per
    /// endpoint").
    fn connection_lost(&self, endpoint: EndpointHandle);
}

/// The name service (spec.md §1, "name-service discovery/advertisement" is
/// out of scope; spec.md §6 lists the upward calls this core makes into it).
/// `enable_advertisement`/`enable_discovery` on [`crate::transport::Transport`]
/// forward here.
pub trait NameService: Send + Sync + 'static {
    fn enable(&self);
    fn disable(&self);
    fn advertise(&self, name: &str);
    fn cancel_advertise(&self, name: &str);
    fn find(&self, prefix: &str);
    fn cancel_find(&self, prefix: &str);
    fn open_interface(&self, interface: &str);
}
