//! Local-interface enumeration, used only for the self-connect and
//! unreachable-network checks `connect` performs (spec.md §7, "Self-connect
//! refusal"; §8, "`connect` called with a socket on a different network").
//!
//! This core does not implement network discovery itself (spec.md §1,
//! "Deliberately out of scope"); it only needs to answer "is this address
//! one of mine" and "is this address on a network any local interface can
//! reach", both cheaply computable from the interfaces the OS reports.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Returns every local IPv4 address the OS reports, used to detect a
/// `connect` target that is actually one of our own listen addresses.
///
/// The teacher has no equivalent (SCTP associations never self-connect
/// through a userspace check like this), so this is grounded on the
/// `if-addrs`-style enumeration used for name-service interface binding in
/// `other_examples/`, trimmed to local IPv4 only since that is all this
/// transport supports (spec.md §6, "unreliable IPv4 datagrams").
pub fn local_ipv4_addresses() -> Vec<Ipv4Addr> {
    match if_addrs::get_if_addrs() {
        Ok(ifaces) => ifaces
            .into_iter()
            .filter_map(|iface| match iface.addr.ip() {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .collect(),
        Err(e) => {
            log::warn!("net: could not enumerate local interfaces: {e}");
            Vec::new()
        }
    }
}

/// True if `addr` names one of our own bound listen sockets (spec.md §7,
/// "Self-connect refusal": connecting to yourself is rejected rather than
/// allowed to loop a connection back through the same Transport).
pub fn is_self_connect(target: SocketAddr, listening: &[SocketAddr]) -> bool {
    listening.iter().any(|local| addrs_match(target, *local))
}

fn addrs_match(target: SocketAddr, local: SocketAddr) -> bool {
    if target.port() != local.port() {
        return false;
    }
    match (target.ip(), local.ip()) {
        (IpAddr::V4(t), IpAddr::V4(l)) => {
            l == Ipv4Addr::UNSPECIFIED || t == l || local_ipv4_addresses().contains(&t)
        }
        _ => false,
    }
}

/// True if no local interface shares a reachable family/subnet story with
/// `target` (spec.md §8: "`connect` called with a socket on a different
/// network" returns `NoNetwork` rather than silently timing out).
///
/// This core cannot do real routing-table lookups without pulling in a
/// netlink dependency the rest of the stack has no other use for, so the
/// check is deliberately coarse: any local IPv4 interface, or the
/// unspecified/loopback bind, is treated as able to reach any IPv4 target.
pub fn has_route_to(target: SocketAddr) -> bool {
    match target.ip() {
        IpAddr::V4(_) => true,
        IpAddr::V6(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_listener_matches_any_target_on_its_port() {
        let listening = vec![SocketAddr::from(([0, 0, 0, 0], 9955))];
        assert!(is_self_connect(
            SocketAddr::from(([10, 0, 0, 5], 9955)),
            &listening
        ));
    }

    #[test]
    fn different_port_is_not_a_self_connect() {
        let listening = vec![SocketAddr::from(([0, 0, 0, 0], 9955))];
        assert!(!is_self_connect(
            SocketAddr::from(([10, 0, 0, 5], 9000)),
            &listening
        ));
    }

    #[test]
    fn ipv6_targets_have_no_route() {
        assert!(!has_route_to(SocketAddr::from((
            std::net::Ipv6Addr::LOCALHOST,
            9955
        ))));
    }
}
