//! TURN (RFC 5766) usage layer: request builders and response parsing for
//! the allocate/refresh/permission/channel-bind cycle, built directly on
//! [`crate::stun`].

pub mod allocation;
pub mod client;
pub mod compat;

pub use allocation::{RelayKind, TurnAllocation};
