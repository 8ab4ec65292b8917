pub mod address;
pub mod control;
pub mod textattrs;
pub mod turn;

/// A STUN attribute type. Plain newtype over `u16` (not a closed enum)
/// because RFC 5389 §18.2 reserves the space for future IANA registration;
/// unknown values still have to round-trip through [`crate::stun::message::RawAttribute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttrType(pub u16);

impl std::fmt::Display for AttrType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match *self {
            MAPPED_ADDRESS => "MAPPED-ADDRESS",
            USERNAME => "USERNAME",
            MESSAGE_INTEGRITY => "MESSAGE-INTEGRITY",
            ERROR_CODE => "ERROR-CODE",
            UNKNOWN_ATTRIBUTES => "UNKNOWN-ATTRIBUTES",
            REALM => "REALM",
            NONCE => "NONCE",
            XOR_MAPPED_ADDRESS => "XOR-MAPPED-ADDRESS",
            SOFTWARE => "SOFTWARE",
            ALTERNATE_SERVER => "ALTERNATE-SERVER",
            FINGERPRINT => "FINGERPRINT",
            PRIORITY => "PRIORITY",
            USE_CANDIDATE => "USE-CANDIDATE",
            ICE_CONTROLLED => "ICE-CONTROLLED",
            ICE_CONTROLLING => "ICE-CONTROLLING",
            CHANNEL_NUMBER => "CHANNEL-NUMBER",
            LIFETIME => "LIFETIME",
            XOR_PEER_ADDRESS => "XOR-PEER-ADDRESS",
            DATA => "DATA",
            XOR_RELAYED_ADDRESS => "XOR-RELAYED-ADDRESS",
            EVEN_PORT => "EVEN-PORT",
            REQUESTED_TRANSPORT => "REQUESTED-TRANSPORT",
            DONT_FRAGMENT => "DONT-FRAGMENT",
            RESERVATION_TOKEN => "RESERVATION-TOKEN",
            _ => "UNKNOWN",
        };
        write!(f, "{name}(0x{:04x})", self.0)
    }
}

/// `true` for attribute types in [0x0000, 0x7FFF]: unrecognized ones MUST be
/// rejected with a 420 (RFC 5389 §15, "comprehension-required" range).
pub fn is_comprehension_required(t: AttrType) -> bool {
    t.0 < 0x8000
}

// STUN (RFC 5389 §18.2).
pub const MAPPED_ADDRESS: AttrType = AttrType(0x0001);
pub const USERNAME: AttrType = AttrType(0x0006);
pub const MESSAGE_INTEGRITY: AttrType = AttrType(0x0008);
pub const ERROR_CODE: AttrType = AttrType(0x0009);
pub const UNKNOWN_ATTRIBUTES: AttrType = AttrType(0x000A);
pub const REALM: AttrType = AttrType(0x0014);
pub const NONCE: AttrType = AttrType(0x0015);
pub const XOR_MAPPED_ADDRESS: AttrType = AttrType(0x0020);

pub const SOFTWARE: AttrType = AttrType(0x8022);
pub const ALTERNATE_SERVER: AttrType = AttrType(0x8023);
pub const FINGERPRINT: AttrType = AttrType(0x8028);

// ICE (RFC 5245 §19.1).
pub const PRIORITY: AttrType = AttrType(0x0024);
pub const USE_CANDIDATE: AttrType = AttrType(0x0025);
pub const ICE_CONTROLLED: AttrType = AttrType(0x8029);
pub const ICE_CONTROLLING: AttrType = AttrType(0x802A);

// TURN (RFC 5766 §14).
pub const CHANNEL_NUMBER: AttrType = AttrType(0x000C);
pub const LIFETIME: AttrType = AttrType(0x000D);
pub const XOR_PEER_ADDRESS: AttrType = AttrType(0x0012);
pub const DATA: AttrType = AttrType(0x0013);
pub const XOR_RELAYED_ADDRESS: AttrType = AttrType(0x0016);
pub const EVEN_PORT: AttrType = AttrType(0x0018);
pub const REQUESTED_TRANSPORT: AttrType = AttrType(0x0019);
pub const DONT_FRAGMENT: AttrType = AttrType(0x001A);
pub const RESERVATION_TOKEN: AttrType = AttrType(0x0022);

// Legacy `rfc3489`/vendor codepoints the `wlm2009` compatibility profile
// remaps REALM/NONCE to.
pub const LEGACY_REALM: AttrType = AttrType(0x0014);
pub const LEGACY_NONCE: AttrType = AttrType(0x0015);
