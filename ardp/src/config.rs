//! Tunables for an [`crate::handle::ArdpHandle`], grouped the way the
//! teacher's `EndpointConfig`/`ClientConfig`/`ServerConfig` split
//! configuration that is shared across connections from configuration that is
//! per-direction (spec.md §4.5, "Defaults").

use std::time::Duration;

/// Segment payload size negotiated during the handshake; bounds how large a
/// user message can be before it must be split across more than 3 fragments
/// (spec.md §4.5, "Fragmentation").
pub(crate) const DEFAULT_SEGBMAX: u16 = 1472;
pub(crate) const DEFAULT_WINDOW: u16 = 32;
pub(crate) const MAX_FRAGMENTS: usize = 3;

/// Global configuration for an [`crate::handle::ArdpHandle`], affecting every
/// connection it carries. Defaults are the literal values from spec.md §4.5.
#[derive(Debug, Clone)]
pub struct ArdpConfig {
    pub connect_timeout: Duration,
    pub connect_retries: u32,
    pub data_timeout: Duration,
    pub data_retries: u32,
    pub persist_timeout: Duration,
    pub persist_retries: u32,
    pub probe_timeout: Duration,
    pub probe_retries: u32,
    pub dupack_counter: u32,
    pub timewait: Duration,
    /// Negotiated maximum segment/payload size; the smaller of this and the
    /// peer's advertised value wins (spec.md §6, "Peer hello", `segbmax`).
    pub segbmax: u16,
    /// Initial receive window, in segments, advertised on SYN/SYN-ACK.
    pub initial_window: u16,
}

impl Default for ArdpConfig {
    fn default() -> Self {
        ArdpConfig {
            connect_timeout: Duration::from_millis(3000),
            connect_retries: 3,
            data_timeout: Duration::from_millis(3000),
            data_retries: 5,
            persist_timeout: Duration::from_millis(5000),
            persist_retries: 5,
            probe_timeout: Duration::from_millis(10_000),
            probe_retries: 5,
            dupack_counter: 1,
            timewait: Duration::from_millis(1000),
            segbmax: DEFAULT_SEGBMAX,
            initial_window: DEFAULT_WINDOW,
        }
    }
}

impl ArdpConfig {
    /// The bound `push_bytes`/`connect` wait on in the layer above (spec.md
    /// §4.4.1 and §4.1): `timeout * (2 + retries)`.
    pub fn data_deadline(&self) -> Duration {
        self.data_timeout * (2 + self.data_retries)
    }

    pub fn connect_deadline(&self) -> Duration {
        self.connect_timeout * (2 + self.connect_retries)
    }
}
