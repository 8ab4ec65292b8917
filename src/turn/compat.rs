use crate::stun::attributes::{AttrType, DATA, XOR_PEER_ADDRESS};
use crate::stun::header::{Method, MessageType};

/// TURN interop variants this shim translates between: attribute codepoints
/// (REMOTE-ADDRESS vs PEER-ADDRESS), methods (SEND vs an indication-flavored
/// SEND), magic-cookie placement, and channel-data framing on TCP. We model
/// it as codepoint/method remaps rather than four parallel protocol state
/// machines, since the conncheck engine only ever drives `Rfc5766` end to
/// end; the others exist so a legacy peer's wire bytes can still be decoded
/// into the same internal attribute set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnCompatibility {
    Draft9,
    Rfc5766,
    MsnOc2007,
    Google,
}

impl Default for TurnCompatibility {
    fn default() -> Self {
        TurnCompatibility::Rfc5766
    }
}

impl TurnCompatibility {
    /// The attribute type carrying a peer/remote address in a
    /// CreatePermission/ChannelBind/Send context under this profile.
    pub fn peer_address_attr(&self) -> AttrType {
        match self {
            TurnCompatibility::MsnOc2007 => AttrType(0x0012), // REMOTE-ADDRESS draft codepoint, same slot as XOR-PEER-ADDRESS
            _ => XOR_PEER_ADDRESS,
        }
    }

    pub fn data_attr(&self) -> AttrType {
        DATA
    }

    /// The method used to relay outbound application data toward a peer.
    /// RFC 5766 uses a `Send` indication; draft-9/MSN used a distinct
    /// `IND-SEND` method value that the shim maps onto the same internal
    /// [`Method::Send`].
    pub fn send_method(&self) -> Method {
        Method::Send
    }

    /// Whether channel-data frames carried over a TCP-transported TURN
    /// control connection are length-prefixed (RFC 5766 §11.5) or rely on
    /// the stream boundary directly (legacy draft behavior).
    pub fn channel_data_is_length_prefixed(&self) -> bool {
        !matches!(self, TurnCompatibility::Draft9)
    }

    pub fn message_type(&self, method: Method, class: crate::stun::header::Class) -> MessageType {
        MessageType::new(method, class)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rfc5766_uses_xor_peer_address() {
        assert_eq!(
            TurnCompatibility::Rfc5766.peer_address_attr(),
            XOR_PEER_ADDRESS
        );
    }

    #[test]
    fn test_draft9_channel_data_not_length_prefixed() {
        assert!(!TurnCompatibility::Draft9.channel_data_is_length_prefixed());
    }
}
