//! Resolution of `.local` remote candidate hostnames before pairing. A
//! remote peer that itself conceals its host address behind mDNS (RFC 8445
//! §5.1.1.3) advertises a candidate whose connection-address is a
//! `<uuid>.local` name rather than an IP; this module resolves that name to
//! an address via one-shot multicast DNS before the candidate is handed to
//! [`super::AgentInternal`] for pairing.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use mdns::config::Config;
use mdns::conn::DnsConn;

use crate::error::{Error, Result};

const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn is_mdns_candidate(address: &str) -> bool {
    address.ends_with(".local")
}

/// Resolves `hostname` (a `.local` name) to the address it advertises,
/// via a single multicast query on an ephemeral `DnsConn`. Callers only
/// reach this when [`crate::agent::AgentConfig::resolve_mdns`] is set and
/// the candidate's address passed [`is_mdns_candidate`].
pub async fn resolve(hostname: &str) -> Result<IpAddr> {
    let conn = DnsConn::server(
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        Config::default(),
    )
    .map_err(|err| Error::new(format!("mdns: failed to open query conn: {err}")))?;

    let (_msg, src) = conn
        .query(hostname, QUERY_TIMEOUT)
        .await
        .map_err(|err| Error::new(format!("mdns: query for {hostname} failed: {err}")))?;

    let _ = conn.close().await;
    Ok(src.ip())
}

/// Resolves `address` if it is a `.local` mDNS name, returning the
/// resolved IP as a string suitable for `CandidateBaseConfig::address`;
/// otherwise returns `address` unchanged. Callers parsing a remote
/// candidate line (SDP or an equivalent external format) call this before
/// constructing the candidate, since every `new_candidate_*` constructor
/// in [`crate::candidate`] requires an address that already parses as an
/// [`IpAddr`].
pub async fn resolve_candidate_address(address: &str, enabled: bool) -> Result<String> {
    if !enabled || !is_mdns_candidate(address) {
        return Ok(address.to_owned());
    }
    resolve(address).await.map(|ip| ip.to_string())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_is_mdns_candidate() {
        assert!(is_mdns_candidate("8f3e1c2a-1.local"));
        assert!(!is_mdns_candidate("192.168.1.5"));
        assert!(!is_mdns_candidate("example.org"));
    }

    #[tokio::test]
    async fn test_resolve_candidate_address_passthrough_when_disabled() {
        let got = resolve_candidate_address("8f3e1c2a-1.local", false).await.unwrap();
        assert_eq!(got, "8f3e1c2a-1.local");
    }

    #[tokio::test]
    async fn test_resolve_candidate_address_passthrough_for_non_mdns() {
        let got = resolve_candidate_address("192.168.1.5", true).await.unwrap();
        assert_eq!(got, "192.168.1.5");
    }
}
