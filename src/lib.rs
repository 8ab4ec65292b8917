//! STUN (RFC 5389), TURN (RFC 5766) and ICE (RFC 8445) connectivity
//! establishment, with a pseudo-TCP reliable stream layer on top of the
//! established pair.
//!
//! [`stun`] and [`turn`] implement the wire protocols; [`candidate`] and
//! [`agent`] build the ICE gathering/connectivity-check engine on top of
//! them; [`pseudotcp`] provides the reliable stream abstraction that runs
//! over a selected pair; [`socket`] is the transport-agnostic interface the
//! rest of the crate programs against.

pub mod agent;
pub mod candidate;
pub mod error;
pub mod network_type;
pub mod pseudotcp;
pub mod rand;
pub mod socket;
pub mod state;
pub mod stream;
pub mod stun;
pub mod turn;

pub use agent::{Agent, AgentConfig, AgentEvent};
pub use error::{Error, Result};
