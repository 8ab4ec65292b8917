use crc::{Crc, CRC_32_ISO_HDLC};

use super::attributes::FINGERPRINT;
use crate::error::{Error, Result};
use crate::stun::message::Message;

/// RFC 5389 §15.5: FINGERPRINT XORs the standard CRC-32 with this constant
/// (ASCII "STUN" as an integer) so it can be told apart from a coincidental
/// CRC-32 appearing elsewhere in the attribute stream.
const FINGERPRINT_XOR: u32 = 0x5354_554E;

/// The `wlm2009` compatibility profile swaps two bytes in the computed CRC
/// before XORing, a vendor quirk from older Windows Live Messenger STUN
/// implementations that libnice's compatibility layer also works around.
pub fn crc32(data: &[u8], wlm2009_quirk: bool) -> u32 {
    let crc = Crc::<u32>::new(&CRC_32_ISO_HDLC).checksum(data);
    if wlm2009_quirk {
        crc.swap_bytes().rotate_left(16)
    } else {
        crc
    }
}

pub fn add_fingerprint(m: &mut Message, wlm2009_quirk: bool) -> Result<()> {
    let provisional_len = (m.raw.len() - 20 + 8) as u16;
    m.write_length(provisional_len);

    let crc = crc32(&m.raw, wlm2009_quirk) ^ FINGERPRINT_XOR;
    m.add_raw(FINGERPRINT, &crc.to_be_bytes());
    m.encode();
    Ok(())
}

pub fn verify_fingerprint(m: &Message, wlm2009_quirk: bool) -> Result<()> {
    let attr = m.get(FINGERPRINT)?;
    let span = m
        .span_before(FINGERPRINT)
        .ok_or_else(|| Error::ErrMalformed("no span before fingerprint".into()))?;

    let mut signed = span.to_vec();
    let provisional_len = (span.len() - 20 + 8) as u16;
    signed[2..4].copy_from_slice(&provisional_len.to_be_bytes());

    let expected = crc32(&signed, wlm2009_quirk) ^ FINGERPRINT_XOR;
    let got = u32::from_be_bytes([attr.value[0], attr.value[1], attr.value[2], attr.value[3]]);
    if expected == got {
        Ok(())
    } else {
        Err(Error::ErrFingerprintMismatch)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stun::header::BINDING_REQUEST;
    use crate::stun::message::Message;

    #[test]
    fn test_fingerprint_round_trip() {
        let mut m = Message::build(&[&BINDING_REQUEST]).unwrap();
        add_fingerprint(&mut m, false).unwrap();
        let decoded = Message::decode(&m.raw).unwrap();
        assert!(verify_fingerprint(&decoded, false).is_ok());
    }

    #[test]
    fn test_fingerprint_rejects_bit_flip() {
        let mut m = Message::build(&[&BINDING_REQUEST]).unwrap();
        add_fingerprint(&mut m, false).unwrap();
        let last = m.raw.len() - 1;
        m.raw[last] ^= 0xFF;
        let decoded = Message::decode(&m.raw).unwrap();
        assert!(verify_fingerprint(&decoded, false).is_err());
    }
}
