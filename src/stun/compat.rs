/// STUN compatibility profile, distinguishing RFC 3489's classic STUN from
/// RFC 5389's. A closed enum, not a trait object: the set of interop quirks
/// is fixed and every operation over it is exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompatibilityProfile {
    /// No magic cookie, no FINGERPRINT, MESSAGE-INTEGRITY computed over
    /// 64-byte-padded attribute blocks, attribute lengths padded to 4 bytes.
    Rfc3489,
    /// RFC 5389: magic cookie, XOR-MAPPED-ADDRESS, optional FINGERPRINT,
    /// attribute lengths not padded within the MESSAGE-INTEGRITY span.
    Rfc5389,
    /// RFC 5389 plus a vendor CRC32 byte-swap quirk in FINGERPRINT.
    Wlm2009,
}

impl Default for CompatibilityProfile {
    fn default() -> Self {
        CompatibilityProfile::Rfc5389
    }
}

impl CompatibilityProfile {
    pub fn requires_cookie(&self) -> bool {
        !matches!(self, CompatibilityProfile::Rfc3489)
    }

    pub fn supports_fingerprint(&self) -> bool {
        !matches!(self, CompatibilityProfile::Rfc3489)
    }

    pub fn wlm2009_fingerprint_quirk(&self) -> bool {
        matches!(self, CompatibilityProfile::Wlm2009)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_is_rfc5389() {
        assert_eq!(CompatibilityProfile::default(), CompatibilityProfile::Rfc5389);
    }

    #[test]
    fn test_rfc3489_has_no_cookie_or_fingerprint() {
        let p = CompatibilityProfile::Rfc3489;
        assert!(!p.requires_cookie());
        assert!(!p.supports_fingerprint());
    }
}
