use super::{ICE_CONTROLLED, ICE_CONTROLLING, PRIORITY, USE_CANDIDATE};
use crate::error::{Error, Result};
use crate::stun::message::{Getter, Message, Setter};

/// PRIORITY (RFC 5245 §19.1): the would-be priority of a peer-reflexive
/// candidate discovered via this check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Priority(pub u32);

impl Setter for Priority {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.add_raw(PRIORITY, &self.0.to_be_bytes());
        Ok(())
    }
}

impl Getter for Priority {
    fn get_from(m: &Message) -> Result<Self> {
        let raw = &m.get(PRIORITY)?.value;
        if raw.len() < 4 {
            return Err(Error::ErrMalformed("priority too short".into()));
        }
        Ok(Priority(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]])))
    }
}

/// USE-CANDIDATE (RFC 5245 §19.1): zero-length flag attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UseCandidate;

impl Setter for UseCandidate {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.add_raw(USE_CANDIDATE, &[]);
        Ok(())
    }
}

impl Getter for UseCandidate {
    fn get_from(m: &Message) -> Result<Self> {
        m.get(USE_CANDIDATE)?;
        Ok(UseCandidate)
    }
}

macro_rules! tie_breaker_attr {
    ($name:ident, $attr:expr) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name(pub u64);

        impl Setter for $name {
            fn add_to(&self, m: &mut Message) -> Result<()> {
                m.add_raw($attr, &self.0.to_be_bytes());
                Ok(())
            }
        }

        impl Getter for $name {
            fn get_from(m: &Message) -> Result<Self> {
                let raw = &m.get($attr)?.value;
                if raw.len() < 8 {
                    return Err(Error::ErrMalformed("tie-breaker too short".into()));
                }
                let mut b = [0u8; 8];
                b.copy_from_slice(&raw[..8]);
                Ok($name(u64::from_be_bytes(b)))
            }
        }
    };
}

tie_breaker_attr!(IceControlling, ICE_CONTROLLING);
tie_breaker_attr!(IceControlled, ICE_CONTROLLED);

#[cfg(test)]
mod test {
    use super::*;
    use crate::stun::header::BINDING_REQUEST;

    #[test]
    fn test_priority_round_trip() {
        let attr = Priority(2_130_706_431);
        let mut m = Message::build(&[&BINDING_REQUEST, &attr]).unwrap();
        m.encode();
        let decoded = Message::decode(&m.raw).unwrap();
        assert_eq!(Priority::get_from(&decoded).unwrap().0, 2_130_706_431);
    }

    #[test]
    fn test_use_candidate_presence() {
        let mut m = Message::build(&[&BINDING_REQUEST, &UseCandidate]).unwrap();
        m.encode();
        let decoded = Message::decode(&m.raw).unwrap();
        assert!(UseCandidate::get_from(&decoded).is_ok());
    }

    #[test]
    fn test_ice_controlling_round_trip() {
        let attr = IceControlling(0xDEAD_BEEF_0000_0001);
        let mut m = Message::build(&[&BINDING_REQUEST, &attr]).unwrap();
        m.encode();
        let decoded = Message::decode(&m.raw).unwrap();
        assert_eq!(
            IceControlling::get_from(&decoded).unwrap().0,
            0xDEAD_BEEF_0000_0001
        );
    }
}
