use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use super::{AttrType, MAPPED_ADDRESS, XOR_MAPPED_ADDRESS, XOR_PEER_ADDRESS, XOR_RELAYED_ADDRESS};
use crate::error::{Error, Result};
use crate::stun::header::MAGIC_COOKIE;
use crate::stun::message::{Getter, Message, Setter};

const FAMILY_IPV4: u8 = 0x01;
const FAMILY_IPV6: u8 = 0x02;

fn encode_plain(addr: SocketAddr) -> Vec<u8> {
    let mut v = vec![0u8, 0u8];
    match addr.ip() {
        IpAddr::V4(ip) => {
            v[1] = FAMILY_IPV4;
            v.extend_from_slice(&addr.port().to_be_bytes());
            v.extend_from_slice(&ip.octets());
        }
        IpAddr::V6(ip) => {
            v[1] = FAMILY_IPV6;
            v.extend_from_slice(&addr.port().to_be_bytes());
            v.extend_from_slice(&ip.octets());
        }
    }
    v
}

fn decode_plain(value: &[u8]) -> Result<SocketAddr> {
    if value.len() < 4 {
        return Err(Error::ErrMalformed("address attribute too short".into()));
    }
    let family = value[1];
    let port = u16::from_be_bytes([value[2], value[3]]);
    match family {
        f if f == FAMILY_IPV4 => {
            if value.len() < 8 {
                return Err(Error::ErrMalformed("ipv4 address attribute too short".into()));
            }
            let ip = Ipv4Addr::new(value[4], value[5], value[6], value[7]);
            Ok(SocketAddr::new(IpAddr::V4(ip), port))
        }
        f if f == FAMILY_IPV6 => {
            if value.len() < 20 {
                return Err(Error::ErrMalformed("ipv6 address attribute too short".into()));
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&value[4..20]);
            Ok(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port))
        }
        _ => Err(Error::ErrMalformed(format!("unknown address family {family}"))),
    }
}

/// XORs `addr` against the magic cookie (and, for IPv6, the transaction id)
/// as required by RFC 5389 §15.2. Symmetric: calling this on an
/// already-XORed address and the same `transaction_id` undoes it, which is
/// what the X-variant decoders below rely on.
fn xor_addr(addr: SocketAddr, transaction_id: &[u8; 12]) -> SocketAddr {
    let cookie = MAGIC_COOKIE.to_be_bytes();
    let port = addr.port() ^ ((MAGIC_COOKIE >> 16) as u16);
    match addr.ip() {
        IpAddr::V4(ip) => {
            let octets = ip.octets();
            let mut out = [0u8; 4];
            for i in 0..4 {
                out[i] = octets[i] ^ cookie[i];
            }
            SocketAddr::new(IpAddr::V4(Ipv4Addr::from(out)), port)
        }
        IpAddr::V6(ip) => {
            let octets = ip.octets();
            let mut pad = [0u8; 16];
            pad[..4].copy_from_slice(&cookie);
            pad[4..16].copy_from_slice(transaction_id);
            let mut out = [0u8; 16];
            for i in 0..16 {
                out[i] = octets[i] ^ pad[i];
            }
            SocketAddr::new(IpAddr::V6(Ipv6Addr::from(out)), port)
        }
    }
}

/// MAPPED-ADDRESS (RFC 5389 §15.1). Used only by the `rfc3489` profile; all
/// modern servers send XOR-MAPPED-ADDRESS instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedAddress(pub SocketAddr);

impl Setter for MappedAddress {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.add_raw(MAPPED_ADDRESS, &encode_plain(self.0));
        Ok(())
    }
}

impl Getter for MappedAddress {
    fn get_from(m: &Message) -> Result<Self> {
        Ok(MappedAddress(decode_plain(&m.get(MAPPED_ADDRESS)?.value)?))
    }
}

macro_rules! xor_address_attr {
    ($name:ident, $attr:expr) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name(pub SocketAddr);

        impl Setter for $name {
            fn add_to(&self, m: &mut Message) -> Result<()> {
                let xored = xor_addr(self.0, &m.transaction_id.0);
                m.add_raw($attr, &encode_plain(xored));
                Ok(())
            }
        }

        impl Getter for $name {
            fn get_from(m: &Message) -> Result<Self> {
                let raw = decode_plain(&m.get($attr)?.value)?;
                Ok($name(xor_addr(raw, &m.transaction_id.0)))
            }
        }
    };
}

xor_address_attr!(XorMappedAddress, XOR_MAPPED_ADDRESS);
xor_address_attr!(XorPeerAddress, XOR_PEER_ADDRESS);
xor_address_attr!(XorRelayedAddress, XOR_RELAYED_ADDRESS);

/// The attribute type a particular address attribute was carried as; used
/// when we don't statically know which XOR-* variant to expect (e.g. a
/// generic address reader for debug logging).
pub fn attr_type_name(t: AttrType) -> &'static str {
    match t {
        MAPPED_ADDRESS => "MAPPED-ADDRESS",
        XOR_MAPPED_ADDRESS => "XOR-MAPPED-ADDRESS",
        XOR_PEER_ADDRESS => "XOR-PEER-ADDRESS",
        XOR_RELAYED_ADDRESS => "XOR-RELAYED-ADDRESS",
        _ => "ADDRESS",
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stun::header::{TransactionId, BINDING_REQUEST};
    use crate::stun::message::Message;
    use std::net::SocketAddr;

    #[test]
    fn test_xor_mapped_address_round_trip_v4() {
        let addr: SocketAddr = "1.2.3.4:9999".parse().unwrap();
        let tid = TransactionId([9; 12]);
        let attr = XorMappedAddress(addr);
        let mut m = Message::build(&[&BINDING_REQUEST, &tid, &attr]).unwrap();
        m.encode();

        let decoded = Message::decode(&m.raw).unwrap();
        let got = XorMappedAddress::get_from(&decoded).unwrap();
        assert_eq!(got.0, addr);
    }

    #[test]
    fn test_xor_mapped_address_round_trip_v6() {
        let addr: SocketAddr = "[2001:db8::1]:443".parse().unwrap();
        let tid = TransactionId([7; 12]);
        let attr = XorMappedAddress(addr);
        let mut m = Message::build(&[&BINDING_REQUEST, &tid, &attr]).unwrap();
        m.encode();

        let decoded = Message::decode(&m.raw).unwrap();
        let got = XorMappedAddress::get_from(&decoded).unwrap();
        assert_eq!(got.0, addr);
    }

    #[test]
    fn test_mapped_address_round_trip() {
        let addr: SocketAddr = "5.6.7.8:1234".parse().unwrap();
        let attr = MappedAddress(addr);
        let mut m = Message::build(&[&BINDING_REQUEST, &attr]).unwrap();
        m.encode();
        let decoded = Message::decode(&m.raw).unwrap();
        assert_eq!(MappedAddress::get_from(&decoded).unwrap().0, addr);
    }
}
