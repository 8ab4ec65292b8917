//! Wire format for one pseudo-TCP segment: a fixed 24-byte header followed
//! by payload, modeled on TCP's segment layout (RFC 793 §3.1) over an
//! unreliable datagram transport.

use crate::error::{Error, Result};

pub const HEADER_SIZE: usize = 24;

pub const FLAG_CTL: u8 = 0x02;
pub const FLAG_RST: u8 = 0x04;

pub const CTL_CONNECT: u8 = 0;

/// Packet-size ladder the MTU-discovery step walks down through on a
/// "packet too large" write failure, matching the classic PMTUD table
/// (RFC 1191 §7.1).
pub const PACKET_MAXIMUMS: &[u16] = &[65535, 32000, 17914, 8166, 4352, 2002, 1492, 1006, 508, 296, 0];

pub const UDP_HEADER_SIZE: u32 = 8;
pub const IP_HEADER_SIZE: u32 = 20;
/// Budget reserved for whatever framing the candidate's transport adds on
/// top of raw UDP (STUN/TURN headers, any relay encapsulation).
pub const FRAMING_HEADER_SIZE: u32 = 64;
pub const PACKET_OVERHEAD: u32 = HEADER_SIZE as u32 + UDP_HEADER_SIZE + IP_HEADER_SIZE + FRAMING_HEADER_SIZE;

pub const MIN_PACKET: u16 = 296;
pub const MAX_PACKET: u16 = 65535;

/// One in-flight or queued segment: header fields plus owned payload bytes.
/// `xmit` tracks how many times it has been sent, used to pick the head
/// unacked segment during fast retransmit (RFC 5681 §3.2) and to bound
/// retry counts.
#[derive(Debug, Clone)]
pub struct Segment {
    pub conv: u32,
    pub seq: u32,
    pub ack: u32,
    pub control: u8,
    pub flags: u8,
    pub wnd: u16,
    pub ts_send: u32,
    pub ts_echo: u32,
    pub data: Vec<u8>,
    pub xmit: u32,
}

impl Segment {
    pub fn is_ctl(&self) -> bool {
        self.flags & FLAG_CTL != 0
    }

    pub fn is_rst(&self) -> bool {
        self.flags & FLAG_RST != 0
    }

    /// Total bytes this segment occupies on the wire, for window arithmetic
    /// (control segments count as 1 byte of sequence space, matching
    /// `translate_to_segment`'s handling of the original source).
    pub fn seq_len(&self) -> u32 {
        if self.is_ctl() {
            1
        } else {
            self.data.len() as u32
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.data.len());
        buf.extend_from_slice(&self.conv.to_be_bytes());
        buf.extend_from_slice(&self.seq.to_be_bytes());
        buf.extend_from_slice(&self.ack.to_be_bytes());
        buf.push(self.control);
        buf.push(self.flags);
        buf.extend_from_slice(&self.wnd.to_be_bytes());
        buf.extend_from_slice(&self.ts_send.to_be_bytes());
        buf.extend_from_slice(&self.ts_echo.to_be_bytes());
        buf.extend_from_slice(&self.data);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Segment> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::ErrIncomplete);
        }
        let conv = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        let seq = u32::from_be_bytes(buf[4..8].try_into().unwrap());
        let ack = u32::from_be_bytes(buf[8..12].try_into().unwrap());
        let control = buf[12];
        let flags = buf[13];
        let wnd = u16::from_be_bytes(buf[14..16].try_into().unwrap());
        let ts_send = u32::from_be_bytes(buf[16..20].try_into().unwrap());
        let ts_echo = u32::from_be_bytes(buf[20..24].try_into().unwrap());
        let data = buf[HEADER_SIZE..].to_vec();
        Ok(Segment { conv, seq, ack, control, flags, wnd, ts_send, ts_echo, data, xmit: 0 })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_segment_round_trip() {
        let s = Segment {
            conv: 0xdead_beef,
            seq: 42,
            ack: 7,
            control: CTL_CONNECT,
            flags: FLAG_CTL,
            wnd: 4096,
            ts_send: 1000,
            ts_echo: 2000,
            data: b"hello".to_vec(),
            xmit: 0,
        };
        let encoded = s.encode();
        assert_eq!(encoded.len(), HEADER_SIZE + 5);
        let decoded = Segment::decode(&encoded).unwrap();
        assert_eq!(decoded.conv, s.conv);
        assert_eq!(decoded.seq, s.seq);
        assert_eq!(decoded.ack, s.ack);
        assert_eq!(decoded.flags, s.flags);
        assert_eq!(decoded.wnd, s.wnd);
        assert_eq!(decoded.data, s.data);
    }

    #[test]
    fn test_decode_rejects_short_buffer() {
        assert!(Segment::decode(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_ctl_seq_len_is_one() {
        let s = Segment { conv: 0, seq: 0, ack: 0, control: CTL_CONNECT, flags: FLAG_CTL, wnd: 0, ts_send: 0, ts_echo: 0, data: vec![], xmit: 0 };
        assert_eq!(s.seq_len(), 1);
    }
}
