use super::{CHANNEL_NUMBER, DATA, DONT_FRAGMENT, EVEN_PORT, LIFETIME, RESERVATION_TOKEN, REQUESTED_TRANSPORT};
use crate::error::{Error, Result};
use crate::stun::message::{Getter, Message, Setter};

/// `protocol` field value for REQUESTED-TRANSPORT meaning "UDP" (RFC 5766
/// §14.7); TURN only ever allocates UDP relays in this design.
pub const PROTO_UDP: u8 = 17;

/// CHANNEL-NUMBER (RFC 5766 §14.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelNumber(pub u16);

impl Setter for ChannelNumber {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        let mut v = self.0.to_be_bytes().to_vec();
        v.extend_from_slice(&[0, 0]); // RFFU
        m.add_raw(CHANNEL_NUMBER, &v);
        Ok(())
    }
}

impl Getter for ChannelNumber {
    fn get_from(m: &Message) -> Result<Self> {
        let raw = &m.get(CHANNEL_NUMBER)?.value;
        if raw.len() < 2 {
            return Err(Error::ErrMalformed("channel-number too short".into()));
        }
        Ok(ChannelNumber(u16::from_be_bytes([raw[0], raw[1]])))
    }
}

/// LIFETIME (RFC 5766 §14.2), seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifetime(pub u32);

impl Setter for Lifetime {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.add_raw(LIFETIME, &self.0.to_be_bytes());
        Ok(())
    }
}

impl Getter for Lifetime {
    fn get_from(m: &Message) -> Result<Self> {
        let raw = &m.get(LIFETIME)?.value;
        if raw.len() < 4 {
            return Err(Error::ErrMalformed("lifetime too short".into()));
        }
        Ok(Lifetime(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]])))
    }
}

/// REQUESTED-TRANSPORT (RFC 5766 §14.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestedTransport(pub u8);

impl Setter for RequestedTransport {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.add_raw(REQUESTED_TRANSPORT, &[self.0, 0, 0, 0]);
        Ok(())
    }
}

impl Getter for RequestedTransport {
    fn get_from(m: &Message) -> Result<Self> {
        let raw = &m.get(REQUESTED_TRANSPORT)?.value;
        raw.first()
            .copied()
            .map(RequestedTransport)
            .ok_or_else(|| Error::ErrMalformed("requested-transport too short".into()))
    }
}

/// DONT-FRAGMENT (RFC 5766 §14.8): zero-length flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DontFragment;

impl Setter for DontFragment {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.add_raw(DONT_FRAGMENT, &[]);
        Ok(())
    }
}

/// EVEN-PORT (RFC 5766 §14.6): a single bit, "reserve the next port too".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvenPort {
    pub reserve_next: bool,
}

impl Setter for EvenPort {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        let flags = if self.reserve_next { 0x80 } else { 0x00 };
        m.add_raw(EVEN_PORT, &[flags]);
        Ok(())
    }
}

/// RESERVATION-TOKEN (RFC 5766 §14.9): an 8-byte opaque server-chosen token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationToken(pub [u8; 8]);

impl Setter for ReservationToken {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.add_raw(RESERVATION_TOKEN, &self.0);
        Ok(())
    }
}

impl Getter for ReservationToken {
    fn get_from(m: &Message) -> Result<Self> {
        let raw = &m.get(RESERVATION_TOKEN)?.value;
        if raw.len() < 8 {
            return Err(Error::ErrMalformed("reservation-token too short".into()));
        }
        let mut b = [0u8; 8];
        b.copy_from_slice(&raw[..8]);
        Ok(ReservationToken(b))
    }
}

/// DATA (RFC 5766 §14.4): the relayed application payload carried inside a
/// Send/Data indication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data(pub Vec<u8>);

impl Setter for Data {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.add_raw(DATA, &self.0);
        Ok(())
    }
}

impl Getter for Data {
    fn get_from(m: &Message) -> Result<Self> {
        Ok(Data(m.get(DATA)?.value.clone()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stun::header::ALLOCATE_REQUEST;
    use crate::stun::message::Message;

    #[test]
    fn test_requested_transport_round_trip() {
        let attr = RequestedTransport(PROTO_UDP);
        let mut m = Message::build(&[&ALLOCATE_REQUEST, &attr]).unwrap();
        m.encode();
        let decoded = Message::decode(&m.raw).unwrap();
        assert_eq!(RequestedTransport::get_from(&decoded).unwrap().0, PROTO_UDP);
    }

    #[test]
    fn test_lifetime_round_trip() {
        let attr = Lifetime(600);
        let mut m = Message::build(&[&ALLOCATE_REQUEST, &attr]).unwrap();
        m.encode();
        let decoded = Message::decode(&m.raw).unwrap();
        assert_eq!(Lifetime::get_from(&decoded).unwrap().0, 600);
    }

    #[test]
    fn test_channel_number_round_trip() {
        let attr = ChannelNumber(0x4001);
        let mut m = Message::build(&[&ALLOCATE_REQUEST, &attr]).unwrap();
        m.encode();
        let decoded = Message::decode(&m.raw).unwrap();
        assert_eq!(ChannelNumber::get_from(&decoded).unwrap().0, 0x4001);
    }
}
