use std::fmt;

/// RFC 5389 magic cookie. `rfc3489` compatibility messages carry an
/// arbitrary transaction-id prefix here instead (see [`crate::stun::compat`]).
pub const MAGIC_COOKIE: u32 = 0x2112_A442;

pub const TRANSACTION_ID_SIZE: usize = 12; // 96 bit
pub const MESSAGE_HEADER_SIZE: usize = 20;
pub const ATTRIBUTE_HEADER_SIZE: usize = 4;

/// 96-bit transaction id correlating a request with its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(pub [u8; TRANSACTION_ID_SIZE]);

impl Default for TransactionId {
    fn default() -> Self {
        TransactionId(crate::rand::generate_transaction_id())
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// STUN message class (RFC 5389 §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Request,
    Indication,
    SuccessResponse,
    ErrorResponse,
}

impl Class {
    fn bits(self) -> u16 {
        match self {
            Class::Request => 0b00,
            Class::Indication => 0b01,
            Class::SuccessResponse => 0b10,
            Class::ErrorResponse => 0b11,
        }
    }

    fn from_bits(bits: u16) -> Self {
        match bits {
            0b00 => Class::Request,
            0b01 => Class::Indication,
            0b10 => Class::SuccessResponse,
            _ => Class::ErrorResponse,
        }
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Class::Request => "request",
            Class::Indication => "indication",
            Class::SuccessResponse => "success response",
            Class::ErrorResponse => "error response",
        };
        write!(f, "{s}")
    }
}

/// STUN/TURN method (the low 12 bits of the message type, minus class bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Binding,
    Allocate,
    Refresh,
    Send,
    Data,
    CreatePermission,
    ChannelBind,
    Unknown(u16),
}

impl Method {
    fn value(self) -> u16 {
        match self {
            Method::Binding => 0x001,
            Method::Allocate => 0x003,
            Method::Refresh => 0x004,
            Method::Send => 0x006,
            Method::Data => 0x007,
            Method::CreatePermission => 0x008,
            Method::ChannelBind => 0x009,
            Method::Unknown(v) => v,
        }
    }

    fn from_value(v: u16) -> Self {
        match v {
            0x001 => Method::Binding,
            0x003 => Method::Allocate,
            0x004 => Method::Refresh,
            0x006 => Method::Send,
            0x007 => Method::Data,
            0x008 => Method::CreatePermission,
            0x009 => Method::ChannelBind,
            other => Method::Unknown(other),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Binding => "binding".to_owned(),
            Method::Allocate => "allocate".to_owned(),
            Method::Refresh => "refresh".to_owned(),
            Method::Send => "send".to_owned(),
            Method::Data => "data".to_owned(),
            Method::CreatePermission => "create permission".to_owned(),
            Method::ChannelBind => "channel bind".to_owned(),
            Method::Unknown(v) => format!("0x{v:03x}"),
        };
        write!(f, "{s}")
    }
}

/// Packed (method, class) pair, encoded on the wire as a single 14-bit field
/// per RFC 5389 §6 ("M" bits interleaved with the two class bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageType {
    pub method: Method,
    pub class: Class,
}

impl MessageType {
    pub const fn new(method: Method, class: Class) -> Self {
        MessageType { method, class }
    }

    pub fn value(&self) -> u16 {
        let m = self.method.value();
        let c = self.class.bits();
        let a = m & 0b0000_0000_1111; // M0..M3
        let b = (m & 0b0000_0111_0000) >> 4; // M4..M6
        let d = (m & 0b1111_1000_0000) >> 7; // M7..M11
        (d << 9) | ((c >> 1 & 0b1) << 8) | (b << 5) | ((c & 0b1) << 4) | a
    }

    pub fn from_value(v: u16) -> Self {
        let a = v & 0b0000_0000_1111;
        let b = (v >> 5) & 0b0000_0000_0111;
        let d = (v >> 9) & 0b0000_0001_1111;
        let m = (d << 7) | (b << 4) | a;
        let c1 = (v >> 8) & 0b1;
        let c0 = (v >> 4) & 0b1;
        let class = Class::from_bits((c1 << 1) | c0);
        MessageType {
            method: Method::from_value(m),
            class,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.class)
    }
}

pub const BINDING_REQUEST: MessageType = MessageType::new(Method::Binding, Class::Request);
pub const BINDING_SUCCESS: MessageType = MessageType::new(Method::Binding, Class::SuccessResponse);
pub const BINDING_ERROR: MessageType = MessageType::new(Method::Binding, Class::ErrorResponse);
pub const BINDING_INDICATION: MessageType = MessageType::new(Method::Binding, Class::Indication);

pub const ALLOCATE_REQUEST: MessageType = MessageType::new(Method::Allocate, Class::Request);
pub const ALLOCATE_SUCCESS: MessageType =
    MessageType::new(Method::Allocate, Class::SuccessResponse);
pub const ALLOCATE_ERROR: MessageType = MessageType::new(Method::Allocate, Class::ErrorResponse);

pub const REFRESH_REQUEST: MessageType = MessageType::new(Method::Refresh, Class::Request);
pub const REFRESH_SUCCESS: MessageType = MessageType::new(Method::Refresh, Class::SuccessResponse);
pub const REFRESH_ERROR: MessageType = MessageType::new(Method::Refresh, Class::ErrorResponse);

pub const CREATE_PERMISSION_REQUEST: MessageType =
    MessageType::new(Method::CreatePermission, Class::Request);
pub const CREATE_PERMISSION_SUCCESS: MessageType =
    MessageType::new(Method::CreatePermission, Class::SuccessResponse);
pub const CREATE_PERMISSION_ERROR: MessageType =
    MessageType::new(Method::CreatePermission, Class::ErrorResponse);

pub const CHANNEL_BIND_REQUEST: MessageType =
    MessageType::new(Method::ChannelBind, Class::Request);
pub const CHANNEL_BIND_SUCCESS: MessageType =
    MessageType::new(Method::ChannelBind, Class::SuccessResponse);
pub const CHANNEL_BIND_ERROR: MessageType =
    MessageType::new(Method::ChannelBind, Class::ErrorResponse);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_message_type_round_trip() {
        for mt in [
            BINDING_REQUEST,
            BINDING_SUCCESS,
            BINDING_ERROR,
            BINDING_INDICATION,
            ALLOCATE_REQUEST,
            ALLOCATE_SUCCESS,
            REFRESH_REQUEST,
            CREATE_PERMISSION_REQUEST,
            CHANNEL_BIND_REQUEST,
        ] {
            let v = mt.value();
            let back = MessageType::from_value(v);
            assert_eq!(mt, back);
        }
    }
}
