//! STUN (RFC 5389) message codec and agent, plus the TURN (RFC 5766) and
//! ICE connectivity-check usage layers built on top of it.
//!
//! This module is self-contained: it knows nothing about candidates or
//! pseudo-TCP. The ICE engine in [`crate::agent`] and the TURN client in
//! [`crate::turn`] are its two consumers.

pub mod agent;
pub mod attributes;
pub mod compat;
pub mod fingerprint;
pub mod header;
pub mod integrity;
pub mod message;
pub mod transaction;

pub use header::{Class, Method, MessageType, TransactionId, MAGIC_COOKIE, TRANSACTION_ID_SIZE};
pub use message::{Message, RawAttribute, Setter, Getter};
pub use attributes::AttrType;

/// Outcome of [`message::Message::decode_validate`] / [`agent::StunAgent::validate`],
/// matching the codec error taxonomy in the design (§4.1/§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidateStatus {
    Ok,
    NotStun,
    Incomplete,
    Malformed,
}
