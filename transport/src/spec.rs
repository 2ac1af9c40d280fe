//! Transport spec grammar (spec.md §6, "Transport spec grammar"):
//! `"udp:" key "=" value ("," key "=" value)*`.
//!
//! Grounded on the teacher's listen-address parsing style in
//! `sctp-proto::config` (plain `&str` parsing, no external parser combinator
//! crate) rather than the `other_examples/` pack's heavier grammar crates —
//! the grammar here is a flat comma-separated key/value list, not worth a
//! parser-combinator dependency.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use crate::error::{Result, TransportError};

pub const DEFAULT_PORT: u16 = 9955;

/// A parsed and normalized transport spec (spec.md §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSpec {
    pub addr: Ipv4Addr,
    pub port: u16,
    /// Remote GUID, present only in connect specs emitted by the name
    /// service (spec.md §6, `guid`). Opaque to this crate.
    pub guid: Option<String>,
}

impl TransportSpec {
    /// Parses `"udp:key=value,key=value,..."`. Accepts the `addr`/`port`
    /// synonyms and normalizes them to `u4addr`/`u4port`; rejects any `r4*`,
    /// `r6*`, `u6*` key since this transport supports only unreliable IPv4.
    pub fn parse(spec: &str) -> Result<Self> {
        let rest = spec
            .strip_prefix("udp:")
            .ok_or_else(|| TransportError::InvalidSpec(format!("missing 'udp:' prefix: {spec}")))?;

        let mut kv = BTreeMap::new();
        if !rest.is_empty() {
            for pair in rest.split(',') {
                let (key, value) = pair.split_once('=').ok_or_else(|| {
                    TransportError::InvalidSpec(format!("malformed key=value pair: {pair}"))
                })?;
                let key = normalize_key(key);
                reject_unsupported(&key)?;
                kv.insert(key, value.to_string());
            }
        }

        let addr = match kv.get("u4addr") {
            Some(s) => s
                .parse()
                .map_err(|_| TransportError::InvalidSpec(format!("bad u4addr: {s}")))?,
            None => Ipv4Addr::UNSPECIFIED,
        };
        let port = match kv.get("u4port") {
            Some(s) => s
                .parse()
                .map_err(|_| TransportError::InvalidSpec(format!("bad u4port: {s}")))?,
            None => DEFAULT_PORT,
        };
        let guid = kv.get("guid").cloned();

        Ok(TransportSpec { addr, port, guid })
    }

    /// Serializes back to the canonical `udp:u4addr=...,u4port=...[,guid=...]`
    /// form. `normalize(normalize(spec)) == normalize(spec)` (spec.md §8,
    /// "Round-trip and idempotence laws").
    pub fn normalize(&self) -> String {
        let mut s = format!("udp:u4addr={},u4port={}", self.addr, self.port);
        if let Some(guid) = &self.guid {
            s.push_str(",guid=");
            s.push_str(guid);
        }
        s
    }
}

fn normalize_key(key: &str) -> String {
    match key {
        "addr" => "u4addr".to_string(),
        "port" => "u4port".to_string(),
        other => other.to_string(),
    }
}

fn reject_unsupported(key: &str) -> Result<()> {
    if key.starts_with("r4") || key.starts_with("r6") || key.starts_with("u6") {
        return Err(TransportError::InvalidSpec(format!(
            "key '{key}' names a reliable or IPv6 underlay, which this transport does not support"
        )));
    }
    // `family` is accepted for compatibility and ignored (spec.md §6).
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_defaults_when_keys_are_absent() {
        let spec = TransportSpec::parse("udp:").unwrap();
        assert_eq!(spec.addr, Ipv4Addr::UNSPECIFIED);
        assert_eq!(spec.port, DEFAULT_PORT);
        assert_eq!(spec.guid, None);
    }

    #[test]
    fn accepts_addr_port_synonyms() {
        let spec = TransportSpec::parse("udp:addr=127.0.0.1,port=9000").unwrap();
        assert_eq!(spec.addr, Ipv4Addr::new(127, 0, 0, 1));
        assert_eq!(spec.port, 9000);
    }

    #[test]
    fn rejects_reliable_and_ipv6_keys() {
        assert!(TransportSpec::parse("udp:r4addr=1.2.3.4").is_err());
        assert!(TransportSpec::parse("udp:u6addr=::1").is_err());
    }

    #[test]
    fn normalize_is_idempotent() {
        let spec = TransportSpec::parse("udp:u4addr=0.0.0.0,u4port=9955").unwrap();
        let once = spec.normalize();
        let twice = TransportSpec::parse(&once).unwrap().normalize();
        assert_eq!(once, twice);
    }

    #[test]
    fn round_trips_guid() {
        let spec = TransportSpec::parse("udp:u4addr=10.0.0.1,u4port=9955,guid=abc123").unwrap();
        assert_eq!(spec.guid.as_deref(), Some("abc123"));
        assert_eq!(
            TransportSpec::parse(&spec.normalize()).unwrap(),
            spec
        );
    }
}
