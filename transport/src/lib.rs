//! Reliable UDP transport core for a distributed message bus (spec.md §1):
//! endpoint lifecycle management, backpressure/flow control, and the ARDP
//! connection handshake, running on tokio.
//!
//! The wire protocol and retransmission/flow-control state machine live in
//! the sans-I/O [`ardp`] crate; this crate owns the sockets, the endpoint
//! table, the dispatcher, and the manage cycle that drive it (spec.md §5).

#![warn(rust_2018_idioms)]

mod config;
mod endpoint;
mod endpoint_manager;
mod error;
mod net;
mod router;
mod spec;
mod stream;
mod transport;
mod udp;
mod workqueue;

pub use config::Config;
pub use endpoint::{Direction, EndpointFeatures, EndpointHandle, EndpointState, NameTransferMode};
pub use error::{Result, TransportError};
pub use router::{InboundMessage, NameService, Router};
pub use spec::TransportSpec;
pub use transport::Transport;

pub use ardp::DisconnectStatus;
