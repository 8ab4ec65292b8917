use super::attributes::{is_comprehension_required, AttrType, FINGERPRINT, MESSAGE_INTEGRITY};
use super::header::{MessageType, TransactionId, ATTRIBUTE_HEADER_SIZE, MAGIC_COOKIE, MESSAGE_HEADER_SIZE};
use crate::error::{Error, Result};

/// A single decoded TLV attribute, padded length and all. Kept around in
/// undecoded form so unknown attributes still round-trip through
/// [`Message::encode`] untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute {
    pub typ: AttrType,
    pub value: Vec<u8>,
    /// Offset of this attribute's header within `Message::raw`, used by
    /// [`super::integrity`]/[`super::fingerprint`] to slice the signed span.
    pub offset: usize,
}

/// Applies a value to an in-progress [`Message`]. Implemented by every
/// concrete attribute type and by [`MessageType`]/[`TransactionId`]
/// themselves, so `Message::build` reads as a flat list of ingredients the
/// way the sibling `webrtc-rs/stun` crate's `Setter` trait does.
pub trait Setter {
    fn add_to(&self, m: &mut Message) -> Result<()>;
}

/// The read side of [`Setter`]: parses a value back out of a decoded
/// [`Message`].
pub trait Getter: Sized {
    fn get_from(m: &Message) -> Result<Self>;
}

impl Setter for MessageType {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.typ = *self;
        Ok(())
    }
}

impl Setter for TransactionId {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.transaction_id = *self;
        Ok(())
    }
}

/// A STUN message: 20-byte header plus a TLV attribute list (RFC 5389 §6).
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub typ: MessageType,
    pub transaction_id: TransactionId,
    pub attributes: Vec<RawAttribute>,
    /// Owns the encoded bytes once `encode`/`decode` has run, the way the
    /// teacher's `stun::message::Message` keeps `raw` alongside the parsed
    /// fields so a message can be re-validated without re-encoding.
    pub raw: Vec<u8>,
}

impl Default for MessageType {
    fn default() -> Self {
        super::header::BINDING_REQUEST
    }
}

impl Message {
    pub fn new() -> Self {
        Message::default()
    }

    /// Builds a message in place from an ordered list of setters, matching
    /// the attribute ordering RFC 5389 §15 requires (anything set after
    /// MESSAGE-INTEGRITY besides FINGERPRINT, and anything after
    /// FINGERPRINT, is not produced here at all -- callers append integrity
    /// and fingerprint last via `StunAgent::finish_message`).
    pub fn build(setters: &[&dyn Setter]) -> Result<Self> {
        let mut m = Message::new();
        for s in setters {
            s.add_to(&mut m)?;
        }
        m.encode();
        Ok(m)
    }

    /// Appends a raw attribute, TLV-encoded with RFC 5389 4-byte padding.
    pub fn add_raw(&mut self, typ: AttrType, value: &[u8]) {
        self.attributes.push(RawAttribute {
            typ,
            value: value.to_vec(),
            offset: 0,
        });
    }

    pub fn get(&self, typ: AttrType) -> Result<&RawAttribute> {
        self.attributes
            .iter()
            .find(|a| a.typ == typ)
            .ok_or_else(|| Error::new(format!("attribute {typ} not present")))
    }

    pub fn contains(&self, typ: AttrType) -> bool {
        self.attributes.iter().any(|a| a.typ == typ)
    }

    /// Serializes `typ`, `transaction_id` and `attributes` into `raw`,
    /// overwriting any previous encoding. Always pads attribute values up to
    /// a 4-byte boundary; the "no-aligned-attributes" `rfc3489` profile pads
    /// at the agent layer instead (see [`super::compat`]).
    pub fn encode(&mut self) {
        let mut raw = Vec::with_capacity(MESSAGE_HEADER_SIZE);
        raw.extend_from_slice(&self.typ.value().to_be_bytes());
        raw.extend_from_slice(&[0, 0]); // length patched below
        raw.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        raw.extend_from_slice(&self.transaction_id.0);

        for attr in &mut self.attributes {
            attr.offset = raw.len();
            raw.extend_from_slice(&attr.typ.0.to_be_bytes());
            raw.extend_from_slice(&(attr.value.len() as u16).to_be_bytes());
            raw.extend_from_slice(&attr.value);
            let pad = (4 - (attr.value.len() % 4)) % 4;
            raw.extend(std::iter::repeat(0u8).take(pad));
        }

        let len = (raw.len() - MESSAGE_HEADER_SIZE) as u16;
        raw[2..4].copy_from_slice(&len.to_be_bytes());
        self.raw = raw;
    }

    /// Patches the length field in `raw` to reflect `attributes` without a
    /// full re-encode; used by [`super::agent::StunAgent::finish_message`]'s
    /// legacy-profile length-override trick.
    pub fn write_length(&mut self, len: u16) {
        if self.raw.len() >= 4 {
            self.raw[2..4].copy_from_slice(&len.to_be_bytes());
        }
    }

    pub fn message_length(&self) -> u16 {
        if self.raw.len() >= 4 {
            u16::from_be_bytes([self.raw[2], self.raw[3]])
        } else {
            0
        }
    }

    /// Parses `bytes` into a fresh [`Message`]. Only structural validity
    /// (header length, declared-length consistency, attribute framing) is
    /// checked here; cookie/fingerprint/integrity validation is the
    /// [`super::agent::StunAgent`]'s job (RFC 5389 §6 vs §7.3).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MESSAGE_HEADER_SIZE {
            return Err(Error::ErrIncomplete);
        }
        let type_value = u16::from_be_bytes([bytes[0], bytes[1]]);
        if type_value & 0xC000 != 0 {
            // RFC 5389 §6: the top two bits of the type field must be zero.
            return Err(Error::ErrNotStun);
        }
        let length = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
        if bytes.len() < MESSAGE_HEADER_SIZE + length {
            return Err(Error::ErrIncomplete);
        }

        let mut transaction_id = [0u8; 12];
        transaction_id.copy_from_slice(&bytes[8..20]);

        let mut m = Message {
            typ: MessageType::from_value(type_value),
            transaction_id: TransactionId(transaction_id),
            attributes: Vec::new(),
            raw: bytes[..MESSAGE_HEADER_SIZE + length].to_vec(),
        };

        let mut offset = MESSAGE_HEADER_SIZE;
        let end = MESSAGE_HEADER_SIZE + length;
        while offset + ATTRIBUTE_HEADER_SIZE <= end {
            let attr_type = AttrType(u16::from_be_bytes([bytes[offset], bytes[offset + 1]]));
            let attr_len =
                u16::from_be_bytes([bytes[offset + 2], bytes[offset + 3]]) as usize;
            let val_start = offset + ATTRIBUTE_HEADER_SIZE;
            let val_end = val_start + attr_len;
            if val_end > end {
                return Err(Error::ErrMalformed("attribute overruns message".into()));
            }
            m.attributes.push(RawAttribute {
                typ: attr_type,
                value: bytes[val_start..val_end].to_vec(),
                offset,
            });

            let padded = attr_len + ((4 - (attr_len % 4)) % 4);
            offset = val_start + padded;

            // FINGERPRINT terminates attribute processing: anything after it
            // is ignored (RFC 5389 §15.5).
            if attr_type == FINGERPRINT {
                break;
            }
        }

        Ok(m)
    }

    /// Attributes appearing after MESSAGE-INTEGRITY, other than FINGERPRINT,
    /// must be ignored per RFC 5389 §15.4. Call after `decode` once
    /// integrity has been verified.
    pub fn drop_after_integrity(&mut self) {
        if let Some(idx) = self
            .attributes
            .iter()
            .position(|a| a.typ == MESSAGE_INTEGRITY)
        {
            let fingerprint = self
                .attributes
                .iter()
                .find(|a| a.typ == FINGERPRINT)
                .cloned();
            self.attributes.truncate(idx + 1);
            if let Some(fp) = fingerprint {
                self.attributes.push(fp);
            }
        }
    }

    /// Slice of `raw` up to (not including) the attribute at `typ`, used to
    /// compute MESSAGE-INTEGRITY/FINGERPRINT over "everything before me".
    pub fn span_before(&self, typ: AttrType) -> Option<&[u8]> {
        self.attributes
            .iter()
            .find(|a| a.typ == typ)
            .map(|a| &self.raw[..a.offset])
    }

    pub fn unknown_comprehension_required(&self, known: &[AttrType]) -> Vec<AttrType> {
        self.attributes
            .iter()
            .map(|a| a.typ)
            .filter(|t| is_comprehension_required(*t) && !known.contains(t))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stun::header::BINDING_REQUEST;

    #[test]
    fn test_encode_decode_round_trip() {
        let tid = TransactionId([1; 12]);
        let mut m = Message::build(&[&BINDING_REQUEST, &tid]).unwrap();
        m.add_raw(AttrType(0x4000), b"hello");
        m.encode();

        let decoded = Message::decode(&m.raw).unwrap();
        assert_eq!(decoded.typ, BINDING_REQUEST);
        assert_eq!(decoded.transaction_id, tid);
        assert_eq!(decoded.get(AttrType(0x4000)).unwrap().value, b"hello");
    }

    #[test]
    fn test_decode_incomplete() {
        assert_eq!(Message::decode(&[0u8; 4]), Err(Error::ErrIncomplete));
    }

    #[test]
    fn test_decode_not_stun_top_bits() {
        let mut raw = vec![0xC0, 0x01, 0, 0];
        raw.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        raw.extend_from_slice(&[0; 12]);
        assert_eq!(Message::decode(&raw), Err(Error::ErrNotStun));
    }
}
