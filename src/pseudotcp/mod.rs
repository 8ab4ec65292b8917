//! Reliable, ordered byte stream on top of an already-selected ICE pair,
//! modeled on TCP's segment format and state machine (RFC 793) run over an
//! unreliable datagram transport. This module knows nothing about STUN,
//! TURN or ICE: it is driven purely through
//! [`socket::PseudoTcpSocket::notify_packet`] and
//! [`socket::PseudoTcpSocket::notify_clock`], and emits bytes through the
//! [`socket::PseudoTcpCallbacks::write_packet`] it was constructed with.
//! Everything here runs under whatever lock the embedder already holds; the
//! socket itself performs no locking and spawns no tasks — it is its own
//! lock domain, separate from the ICE agent's.

pub mod buffers;
pub mod congestion;
pub mod segment;
pub mod socket;

pub use socket::{PseudoTcpCallbacks, PseudoTcpSocket, PseudoTcpState, ShutdownMode, WriteResult};
