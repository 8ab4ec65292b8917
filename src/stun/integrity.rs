use md5::{Digest, Md5};
use ring::hmac;

use super::attributes::MESSAGE_INTEGRITY;
use crate::error::{Error, Result};
use crate::stun::message::Message;

/// Derives the long-term credential key per RFC 5389 §15.4:
/// `MD5(username ":" realm ":" password)`. Shared by the STUN agent's
/// long-term-credential mode and the TURN usage layer.
pub fn long_term_key(username: &str, realm: &str, password: &str) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update([username, realm, password].join(":"));
    hasher.finalize().to_vec()
}

/// Appends MESSAGE-INTEGRITY: an HMAC-SHA1 over everything in `m.raw` up to
/// (but not including) this attribute's own header, with the length field
/// written as if the attribute were the last thing in the message (RFC 5389
/// §15.4). `key` is the short-term password bytes or the long-term MD5 key.
pub fn add_message_integrity(m: &mut Message, key: &[u8]) -> Result<()> {
    // Temporarily pretend the message ends right after this attribute so the
    // length field HMAC-SHA1 covers matches what the verifier will compute.
    let provisional_len = (m.raw.len() - 20 + 4 + 20) as u16;
    m.write_length(provisional_len);

    let hmac_key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, key);
    let tag = hmac::sign(&hmac_key, &m.raw);

    m.add_raw(MESSAGE_INTEGRITY, tag.as_ref());
    m.encode();
    Ok(())
}

/// Verifies MESSAGE-INTEGRITY against `key`. `span` is `m.raw` truncated to
/// just before the attribute, matching what was signed on write.
pub fn verify_message_integrity(m: &Message, key: &[u8]) -> Result<()> {
    let attr = m.get(MESSAGE_INTEGRITY)?;
    let span = m
        .span_before(MESSAGE_INTEGRITY)
        .ok_or_else(|| Error::ErrMalformed("no span before message-integrity".into()))?;

    // Re-derive the length-as-if-truncated-here the same way `add_message_integrity` wrote it.
    let mut signed = span.to_vec();
    let provisional_len = (span.len() - 20 + 4 + 20) as u16;
    signed[2..4].copy_from_slice(&provisional_len.to_be_bytes());

    let hmac_key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, key);
    hmac::verify(&hmac_key, &signed, &attr.value).map_err(|_| Error::ErrIntegrityMismatch)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stun::header::{TransactionId, BINDING_REQUEST};
    use crate::stun::message::Message;

    #[test]
    fn test_message_integrity_round_trip() {
        let tid = TransactionId([3; 12]);
        let mut m = Message::build(&[&BINDING_REQUEST, &tid]).unwrap();
        add_message_integrity(&mut m, b"pass").unwrap();

        let decoded = Message::decode(&m.raw).unwrap();
        assert!(verify_message_integrity(&decoded, b"pass").is_ok());
    }

    #[test]
    fn test_message_integrity_rejects_wrong_key() {
        let tid = TransactionId([4; 12]);
        let mut m = Message::build(&[&BINDING_REQUEST, &tid]).unwrap();
        add_message_integrity(&mut m, b"pass").unwrap();

        let decoded = Message::decode(&m.raw).unwrap();
        assert!(verify_message_integrity(&decoded, b"wrong").is_err());
    }

    #[test]
    fn test_long_term_key_is_deterministic() {
        let a = long_term_key("alice", "example.org", "secret");
        let b = long_term_key("alice", "example.org", "secret");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }
}
