use std::fmt;
use std::net::IpAddr;

use crate::error::Error;

/// Indicates the transport protocol and address family pair used to reach a
/// [`crate::candidate::Candidate`]. `Unspecified` only ever appears as a
/// default before a candidate's address has been resolved.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone, Hash)]
pub enum NetworkType {
    #[default]
    Unspecified = 0,
    Udp4,
    Udp6,
    Tcp4,
    Tcp6,
}

pub(crate) const UDP: &str = "udp";
pub(crate) const TCP: &str = "tcp";

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NetworkType::Udp4 => "udp4",
            NetworkType::Udp6 => "udp6",
            NetworkType::Tcp4 => "tcp4",
            NetworkType::Tcp6 => "tcp6",
            NetworkType::Unspecified => "unspecified",
        };
        write!(f, "{s}")
    }
}

impl From<u8> for NetworkType {
    fn from(v: u8) -> Self {
        match v {
            1 => NetworkType::Udp4,
            2 => NetworkType::Udp6,
            3 => NetworkType::Tcp4,
            4 => NetworkType::Tcp6,
            _ => NetworkType::Unspecified,
        }
    }
}

impl NetworkType {
    /// `true` for either IPv4 variant.
    pub fn is_ipv4(&self) -> bool {
        matches!(self, NetworkType::Udp4 | NetworkType::Tcp4)
    }

    /// `true` for either IPv6 variant.
    pub fn is_ipv6(&self) -> bool {
        matches!(self, NetworkType::Udp6 | NetworkType::Tcp6)
    }

    pub fn is_udp(&self) -> bool {
        matches!(self, NetworkType::Udp4 | NetworkType::Udp6)
    }

    pub fn is_tcp(&self) -> bool {
        matches!(self, NetworkType::Tcp4 | NetworkType::Tcp6)
    }

    /// Short transport label used when marshaling a candidate line.
    pub fn network_short(&self) -> String {
        if self.is_udp() {
            UDP.to_owned()
        } else if self.is_tcp() {
            TCP.to_owned()
        } else {
            "unspecified".to_owned()
        }
    }
}

/// Classifies `ip` against `network` ("udp"/"tcp") to produce a
/// [`NetworkType`], rejecting unknown transport labels the same way the
/// teacher's `determine_network_type` rejected unknown `network` strings.
pub fn determine_network_type(network: &str, ip: &IpAddr) -> Result<NetworkType, Error> {
    let network = network.to_lowercase();
    if network.starts_with(UDP) {
        if ip.is_ipv4() {
            Ok(NetworkType::Udp4)
        } else {
            Ok(NetworkType::Udp6)
        }
    } else if network.starts_with(TCP) {
        if ip.is_ipv4() {
            Ok(NetworkType::Tcp4)
        } else {
            Ok(NetworkType::Tcp6)
        }
    } else {
        Err(Error::new(format!("unsupported network type: {network}")))
    }
}

/// Address classification used by gathering to decide whether a candidate
/// IP is useful to advertise at all.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AddrScope {
    Loopback,
    LinkLocal,
    Ipv4Private,
    Other,
}

pub fn classify_addr(ip: &IpAddr) -> AddrScope {
    if ip.is_loopback() {
        return AddrScope::Loopback;
    }
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            let link_local = o[0] == 169 && o[1] == 254;
            if link_local {
                AddrScope::LinkLocal
            } else if o[0] == 10
                || (o[0] == 172 && (16..=31).contains(&o[1]))
                || (o[0] == 192 && o[1] == 168)
            {
                AddrScope::Ipv4Private
            } else {
                AddrScope::Other
            }
        }
        IpAddr::V6(v6) => {
            if (v6.segments()[0] & 0xffc0) == 0xfe80 {
                AddrScope::LinkLocal
            } else {
                AddrScope::Other
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_determine_network_type_udp4() {
        let ip: IpAddr = "192.168.1.5".parse().unwrap();
        assert_eq!(determine_network_type("udp", &ip).unwrap(), NetworkType::Udp4);
    }

    #[test]
    fn test_determine_network_type_tcp6() {
        let ip: IpAddr = "::1".parse().unwrap();
        assert_eq!(determine_network_type("tcp", &ip).unwrap(), NetworkType::Tcp6);
    }

    #[test]
    fn test_determine_network_type_rejects_unknown() {
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(determine_network_type("sctp", &ip).is_err());
    }

    #[test]
    fn test_classify_addr_loopback() {
        assert_eq!(classify_addr(&"127.0.0.1".parse().unwrap()), AddrScope::Loopback);
        assert_eq!(classify_addr(&"::1".parse().unwrap()), AddrScope::Loopback);
    }

    #[test]
    fn test_classify_addr_private_ranges() {
        assert_eq!(classify_addr(&"10.0.0.1".parse().unwrap()), AddrScope::Ipv4Private);
        assert_eq!(classify_addr(&"172.16.0.1".parse().unwrap()), AddrScope::Ipv4Private);
        assert_eq!(classify_addr(&"172.32.0.1".parse().unwrap()), AddrScope::Other);
        assert_eq!(classify_addr(&"192.168.0.1".parse().unwrap()), AddrScope::Ipv4Private);
        assert_eq!(classify_addr(&"8.8.8.8".parse().unwrap()), AddrScope::Other);
    }

    #[test]
    fn test_classify_addr_link_local() {
        assert_eq!(classify_addr(&"169.254.1.1".parse().unwrap()), AddrScope::LinkLocal);
        assert_eq!(classify_addr(&"fe80::1".parse().unwrap()), AddrScope::LinkLocal);
    }

    #[test]
    fn test_network_type_predicates() {
        assert!(NetworkType::Udp4.is_ipv4());
        assert!(NetworkType::Udp4.is_udp());
        assert!(!NetworkType::Udp4.is_tcp());
        assert!(NetworkType::Tcp6.is_ipv6());
        assert!(NetworkType::Tcp6.is_tcp());
        assert_eq!(NetworkType::Udp4.network_short(), "udp");
        assert_eq!(NetworkType::Tcp6.network_short(), "tcp");
    }
}
