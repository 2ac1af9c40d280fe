//! Configuration keys consumed by the Transport (spec.md §6, "Configuration
//! keys consumed"), mirroring the teacher's `EndpointConfig`/`ServerConfig`/
//! `ClientConfig` split between connection-wide and per-direction settings.

use std::time::Duration;

use ardp::ArdpConfig;

/// Transport-level tunables, independent of any one ARDP connection.
///
/// Defaults are the literal values from spec.md §6.
#[derive(Debug, Clone)]
pub struct Config {
    /// Deadline for a peer to complete the handshake after landing in the
    /// `auth` table (spec.md §4.2, "Reap stalled authenticators").
    pub auth_timeout: Duration,
    /// Upper bound on router-level session setup, carried for completeness;
    /// not enforced inside this core (spec.md §1, "out of scope": the router
    /// decides what happens above the transport).
    pub session_setup_timeout: Duration,
    /// Ceiling on endpoints in the `auth` table (spec.md §4.1, "Admission on
    /// inbound SYN").
    pub max_incomplete_connections: usize,
    /// Ceiling on `auth` + `active` combined.
    pub max_completed_connections: usize,
    /// Ceiling on untrusted (not yet bus-to-bus authenticated) clients; `0`
    /// disables the separate untrusted budget and folds it into
    /// `max_incomplete_connections`.
    pub max_untrusted_clients: usize,
    /// How often the Endpoint Manager runs absent a state-change nudge
    /// (spec.md §4.1, maintenance loop step 4).
    pub manage_cycle_interval: Duration,
    /// Interfaces the name service advertises/discovers on; `["*"]` is the
    /// wildcard (spec.md §6, `ns_interfaces`).
    pub ns_interfaces: Vec<String>,
    /// The wire-protocol tunables handed straight to `ardp::ArdpHandle`.
    pub ardp: ArdpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            auth_timeout: Duration::from_millis(20_000),
            session_setup_timeout: Duration::from_millis(30_000),
            max_incomplete_connections: 10,
            max_completed_connections: 50,
            max_untrusted_clients: 0,
            manage_cycle_interval: Duration::from_millis(1000),
            ns_interfaces: vec!["*".to_string()],
            ardp: ArdpConfig::default(),
        }
    }
}

impl Config {
    /// `udp_connect_timeout` / `udp_connect_retries` / ... are exposed
    /// through the nested `ardp` config rather than duplicated here; this
    /// helper rebuilds the bound `connect()` waits on (spec.md §4.1,
    /// "Connect": `connect_timeout * (2 + connect_retries)`).
    pub fn connect_deadline(&self) -> Duration {
        self.ardp.connect_deadline()
    }
}
