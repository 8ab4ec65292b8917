use super::{
    AttrType, ERROR_CODE, NONCE, REALM, SOFTWARE, UNKNOWN_ATTRIBUTES, USERNAME,
};
use crate::error::{Error, Result};
use crate::stun::message::{Getter, Message, Setter};

/// Caps SOFTWARE at 128 UTF-8 code points (RFC 5389 §15.10).
const MAX_SOFTWARE_LEN: usize = 128;

macro_rules! text_attr {
    ($name:ident, $attr:expr) => {
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name(pub String);

        impl Setter for $name {
            fn add_to(&self, m: &mut Message) -> Result<()> {
                m.add_raw($attr, self.0.as_bytes());
                Ok(())
            }
        }

        impl Getter for $name {
            fn get_from(m: &Message) -> Result<Self> {
                let raw = &m.get($attr)?.value;
                let s = String::from_utf8(raw.clone())
                    .map_err(|_| Error::ErrMalformed(format!("{} is not utf-8", $attr)))?;
                Ok($name(s))
            }
        }
    };
}

text_attr!(Username, USERNAME);
text_attr!(Realm, REALM);
text_attr!(Nonce, NONCE);

/// SOFTWARE (RFC 5389 §15.10). Truncated to `MAX_SOFTWARE_LEN` code points
/// on write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Software(pub String);

impl Setter for Software {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        let truncated: String = self.0.chars().take(MAX_SOFTWARE_LEN).collect();
        m.add_raw(SOFTWARE, truncated.as_bytes());
        Ok(())
    }
}

impl Getter for Software {
    fn get_from(m: &Message) -> Result<Self> {
        let raw = &m.get(SOFTWARE)?.value;
        let s = String::from_utf8_lossy(raw).into_owned();
        Ok(Software(s))
    }
}

/// ERROR-CODE (RFC 5389 §15.6): a 3-digit class/number plus a UTF-8 reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCodeAttribute {
    pub code: u16,
    pub reason: String,
}

impl ErrorCodeAttribute {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        ErrorCodeAttribute {
            code,
            reason: reason.into(),
        }
    }
}

impl Setter for ErrorCodeAttribute {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        let class = (self.code / 100) as u8;
        let number = (self.code % 100) as u8;
        let mut v = vec![0u8, 0u8, class, number];
        v.extend_from_slice(self.reason.as_bytes());
        m.add_raw(ERROR_CODE, &v);
        Ok(())
    }
}

impl Getter for ErrorCodeAttribute {
    fn get_from(m: &Message) -> Result<Self> {
        let raw = &m.get(ERROR_CODE)?.value;
        if raw.len() < 4 {
            return Err(Error::ErrMalformed("error-code too short".into()));
        }
        let class = raw[2] as u16;
        let number = raw[3] as u16;
        let reason = String::from_utf8_lossy(&raw[4..]).into_owned();
        Ok(ErrorCodeAttribute {
            code: class * 100 + number,
            reason,
        })
    }
}

/// UNKNOWN-ATTRIBUTES (RFC 5389 §15.9): a list of attribute types the
/// responder did not understand, used to build a 420 error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAttributes(pub Vec<AttrType>);

impl Setter for UnknownAttributes {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        let mut v = Vec::with_capacity(self.0.len() * 2);
        for t in &self.0 {
            v.extend_from_slice(&t.0.to_be_bytes());
        }
        m.add_raw(UNKNOWN_ATTRIBUTES, &v);
        Ok(())
    }
}

impl Getter for UnknownAttributes {
    fn get_from(m: &Message) -> Result<Self> {
        let raw = &m.get(UNKNOWN_ATTRIBUTES)?.value;
        let types = raw
            .chunks_exact(2)
            .map(|c| AttrType(u16::from_be_bytes([c[0], c[1]])))
            .collect();
        Ok(UnknownAttributes(types))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stun::header::BINDING_REQUEST;

    #[test]
    fn test_username_round_trip() {
        let attr = Username("alice:bob".to_owned());
        let mut m = Message::build(&[&BINDING_REQUEST, &attr]).unwrap();
        m.encode();
        let decoded = Message::decode(&m.raw).unwrap();
        assert_eq!(Username::get_from(&decoded).unwrap().0, "alice:bob");
    }

    #[test]
    fn test_error_code_round_trip() {
        let attr = ErrorCodeAttribute::new(420, "Unknown Attribute");
        let mut m = Message::build(&[&BINDING_REQUEST, &attr]).unwrap();
        m.encode();
        let decoded = Message::decode(&m.raw).unwrap();
        let got = ErrorCodeAttribute::get_from(&decoded).unwrap();
        assert_eq!(got.code, 420);
        assert_eq!(got.reason, "Unknown Attribute");
    }

    #[test]
    fn test_software_truncated() {
        let long = "x".repeat(200);
        let attr = Software(long);
        let mut m = Message::build(&[&BINDING_REQUEST, &attr]).unwrap();
        m.encode();
        let decoded = Message::decode(&m.raw).unwrap();
        assert_eq!(Software::get_from(&decoded).unwrap().0.chars().count(), 128);
    }

    #[test]
    fn test_unknown_attributes_round_trip() {
        let attr = UnknownAttributes(vec![AttrType(0x4001), AttrType(0x4002)]);
        let mut m = Message::build(&[&BINDING_REQUEST, &attr]).unwrap();
        m.encode();
        let decoded = Message::decode(&m.raw).unwrap();
        assert_eq!(
            UnknownAttributes::get_from(&decoded).unwrap().0,
            vec![AttrType(0x4001), AttrType(0x4002)]
        );
    }
}
