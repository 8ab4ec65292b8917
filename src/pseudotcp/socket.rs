use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::buffers::RingBuffer;
use super::congestion::{seq_ge, seq_gt, CongestionState};
use super::segment::{Segment, CTL_CONNECT, FLAG_CTL, FLAG_RST, MIN_PACKET, PACKET_MAXIMUMS, PACKET_OVERHEAD};
use crate::error::{Error, Result};

pub const ENOTCONN: i32 = 107;
pub const EWOULDBLOCK: i32 = 11;
pub const EPIPE: i32 = 32;
pub const ECONNRESET: i32 = 104;
pub const ECONNABORTED: i32 = 103;
pub const ETIMEDOUT: i32 = 110;

const MIN_RTO: u32 = 250;
const DEF_RTO: u32 = 3000;
const MAX_RTO: u32 = 60_000;
const ACK_DELAY: u32 = 100;
const IDLE_TIMEOUT: u32 = 4000;
const PROBE_IDLE_TIMEOUT: u32 = 15_000;

const CTL_FIN: u8 = 1;

const MAX_RETRIES_HANDSHAKE: u32 = 30;
const MAX_RETRIES_ESTABLISHED: u32 = 15;

const DEFAULT_SEND_BUFFER: usize = 1 << 16;
const DEFAULT_RECV_BUFFER: usize = 1 << 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoTcpState {
    Listen,
    SynSent,
    SynReceived,
    Established,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    NotShutdown,
    Graceful,
    Forceful,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteResult {
    Success,
    TooLarge,
    Fail,
}

/// Small capability struct the embedder supplies at construction: a trait
/// rather than a raw function-pointer table, but the same idea as the
/// callback table a C implementation would pass in. Invoked synchronously,
/// no reference back into the socket.
pub trait PseudoTcpCallbacks {
    fn on_opened(&self) {}
    fn on_readable(&self) {}
    fn on_writable(&self) {}
    fn on_closed(&self, _error: i32) {}
    fn write_packet(&self, buf: &[u8]) -> WriteResult;
}

struct InFlightSegment {
    seq: u32,
    len: u32,
    xmit: u32,
    is_ctl: bool,
}

/// One out-of-order segment held for reassembly ahead of `rcv_nxt`.
struct PendingSegment {
    seq: u32,
    data: Vec<u8>,
}

pub struct PseudoTcpSocket {
    callbacks: Box<dyn PseudoTcpCallbacks + Send>,
    conv: u32,
    state: PseudoTcpState,
    error: i32,
    closed_fired: bool,
    start: Instant,

    supports_fin_ack_local: bool,
    fin_ack_enabled: bool,

    // Send side.
    send_buffer: RingBuffer,
    snd_una: u32,
    snd_nxt: u32,
    snd_wnd: u32,
    in_flight: VecDeque<InFlightSegment>,
    syn_sent: bool,
    syn_seq: u32,
    syn_xmit: u32,
    fin_sent: bool,
    fin_seq: u32,
    fin_xmit: u32,
    fin_acked: bool,

    // Receive side.
    recv_buffer: RingBuffer,
    rcv_nxt: u32,
    rcv_wnd: u32,
    reassembly: Vec<PendingSegment>,
    received_fin: bool,

    // Congestion / RTO.
    cong: CongestionState,
    mss: u32,
    msslevel: usize,
    rx_srtt: u32,
    rx_rttvar: u32,
    rx_rto: u32,
    rto_base: Option<Instant>,
    ts_recent: u32,

    t_ack: Option<Instant>,
    lastsend: Instant,
    lastrecv: Instant,
    probing: bool,

    shutdown: ShutdownMode,
    time_wait_until: Option<Instant>,
}

impl PseudoTcpSocket {
    /// `conversation = 0` means this socket is a passive listener that will
    /// adopt its peer's conversation id from the first CONNECT it sees;
    /// otherwise the opener picks the conversation id (RFC 793 §3.1's
    /// connection-identification role, here a 32-bit id instead of a port
    /// pair).
    pub fn new(conversation: u32, callbacks: Box<dyn PseudoTcpCallbacks + Send>, support_fin_ack: bool) -> Self {
        let now = Instant::now();
        let mss = MIN_PACKET as u32 - PACKET_OVERHEAD;
        PseudoTcpSocket {
            callbacks,
            conv: conversation,
            state: PseudoTcpState::Listen,
            error: 0,
            closed_fired: false,
            start: now,
            supports_fin_ack_local: support_fin_ack,
            fin_ack_enabled: false,
            send_buffer: RingBuffer::new(DEFAULT_SEND_BUFFER),
            snd_una: 0,
            snd_nxt: 0,
            snd_wnd: MIN_PACKET as u32,
            in_flight: VecDeque::new(),
            syn_sent: false,
            syn_seq: 0,
            syn_xmit: 0,
            fin_sent: false,
            fin_seq: 0,
            fin_xmit: 0,
            fin_acked: false,
            recv_buffer: RingBuffer::new(DEFAULT_RECV_BUFFER),
            rcv_nxt: 0,
            rcv_wnd: DEFAULT_RECV_BUFFER as u32,
            reassembly: Vec::new(),
            received_fin: false,
            cong: CongestionState::new(mss),
            mss,
            msslevel: 0,
            rx_srtt: 0,
            rx_rttvar: 0,
            rx_rto: DEF_RTO,
            rto_base: None,
            ts_recent: 0,
            t_ack: None,
            lastsend: now,
            lastrecv: now,
            probing: false,
            shutdown: ShutdownMode::NotShutdown,
            time_wait_until: None,
        }
    }

    pub fn state(&self) -> PseudoTcpState {
        self.state
    }

    pub fn get_error(&self) -> i32 {
        self.error
    }

    fn now_ms(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }

    // ---- connect / send / recv / close -------------------------------------

    /// Actively opens the connection: emits a CONNECT segment and moves to
    /// `SynSent`, the SYN-SENT state of RFC 793's TCP state machine (§3.2).
    pub fn connect(&mut self) -> Result<()> {
        if self.state != PseudoTcpState::Listen {
            return Err(Error::ErrNotConnected);
        }
        if self.conv == 0 {
            self.conv = crate::rand::generate_tie_breaker() as u32 | 1;
        }
        self.state = PseudoTcpState::SynSent;
        self.send_syn()?;
        Ok(())
    }

    fn send_syn(&mut self) -> Result<()> {
        self.syn_seq = self.snd_nxt;
        self.syn_sent = true;
        self.syn_xmit = 0;
        let seg = self.build_segment(self.syn_seq, FLAG_CTL, CTL_CONNECT, self.syn_options());
        self.snd_nxt = self.snd_nxt.wrapping_add(seg.seq_len());
        self.send_now(&seg)
    }

    fn syn_options(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(5);
        data.extend_from_slice(&self.mss.to_be_bytes());
        data.push(if self.supports_fin_ack_local { 1 } else { 0 });
        data
    }

    fn transmit_syn(&mut self) -> Result<()> {
        let data = self.syn_options();
        let seg = self.build_segment(self.syn_seq, FLAG_CTL, CTL_CONNECT, data);
        self.send_now(&seg)
    }

    /// Queues `bytes` for transmission. Returns the number of bytes
    /// accepted; `Err(ErrWouldBlock)` if the send buffer is already full.
    pub fn send(&mut self, bytes: &[u8]) -> Result<usize> {
        if self.shutdown != ShutdownMode::NotShutdown {
            return Err(Error::ErrPipe);
        }
        if self.state == PseudoTcpState::Closed {
            return Err(Error::ErrPipe);
        }
        let available = self.send_buffer.available_space();
        if available == 0 && !bytes.is_empty() {
            return Err(Error::ErrWouldBlock);
        }
        let n = available.min(bytes.len());
        self.send_buffer.write(&bytes[..n]);
        self.attempt_send()?;
        Ok(n)
    }

    /// Reads up to `buf.len()` bytes of already-reassembled, in-order data.
    /// `Ok(0)` signals end-of-stream after the peer's FIN has been
    /// processed; otherwise an empty buffer is `Err(ErrWouldBlock)`.
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.recv_buffer.is_empty() {
            if self.received_fin {
                return Ok(0);
            }
            if self.state != PseudoTcpState::Established {
                return Err(Error::ErrNotConnected);
            }
            return Err(Error::ErrWouldBlock);
        }
        let n = self.recv_buffer.read(buf);
        self.rcv_wnd = self.recv_buffer.available_space() as u32;
        Ok(n)
    }

    /// `force=false` drains outstanding data (and, if negotiated, runs the
    /// FIN/ACK four-way close, RFC 793 §3.5); `force=true` aborts immediately
    /// with an RST. Idempotent: a second call while already shut down is a
    /// no-op.
    pub fn close(&mut self, force: bool) {
        if self.state == PseudoTcpState::Closed {
            return;
        }
        if force {
            self.shutdown = ShutdownMode::Forceful;
            self.send_rst();
            self.closedown(0);
            return;
        }
        if self.shutdown == ShutdownMode::Graceful {
            return;
        }
        if !self.recv_buffer.is_empty() {
            self.send_rst();
            self.closedown(0);
            return;
        }
        self.shutdown = ShutdownMode::Graceful;
        self.fin_ack_enabled = self.supports_fin_ack_local && self.fin_ack_enabled;
        let _ = self.attempt_send();
        self.try_finish_close();
    }

    fn send_rst(&mut self) {
        let seg = self.build_segment(self.snd_nxt, FLAG_RST, 0, Vec::new());
        let _ = self.transmit_raw(&seg.encode());
    }

    fn closedown(&mut self, error: i32) {
        self.state = PseudoTcpState::Closed;
        self.error = error;
        if !self.closed_fired {
            self.closed_fired = true;
            self.callbacks.on_closed(error);
        }
    }

    // ---- inbound ------------------------------------------------------------

    /// Feeds one inbound datagram into the state machine. Malformed or
    /// mismatched-conversation segments are dropped silently rather than
    /// torn down, since on an unreliable transport they are as likely to be
    /// a stray retransmit or an unrelated peer as an attack.
    pub fn notify_packet(&mut self, buf: &[u8]) -> Result<()> {
        let seg = match Segment::decode(buf) {
            Ok(s) => s,
            Err(_) => return Ok(()),
        };
        if self.conv == 0 && self.state == PseudoTcpState::Listen && seg.is_ctl() && seg.control == CTL_CONNECT {
            self.conv = seg.conv;
        } else if seg.conv != self.conv {
            return Ok(());
        }

        self.lastrecv = Instant::now();

        if seg.is_rst() {
            self.closedown(ECONNRESET);
            return Ok(());
        }

        if seg.is_ctl() && seg.control == CTL_CONNECT {
            self.handle_connect(&seg)?;
        } else if seg.is_ctl() && seg.control == CTL_FIN {
            self.handle_fin(&seg);
        }

        self.snd_wnd = seg.wnd as u32;
        self.ts_recent = seg.ts_send;
        self.handle_ack(seg.ack, seg.ts_echo);

        if !seg.is_ctl() && !seg.data.is_empty() {
            if self.shutdown != ShutdownMode::NotShutdown {
                self.send_rst();
                self.closedown(0);
                return Ok(());
            }
            self.handle_data(seg.seq, seg.data);
        } else if !seg.is_ctl() {
            // Pure ACK: no in-order/no-data special-casing needed beyond handle_ack above.
        }

        self.maybe_establish();
        self.try_finish_close();
        Ok(())
    }

    fn handle_connect(&mut self, seg: &Segment) -> Result<()> {
        if seg.data.len() >= 5 {
            let peer_mss = u32::from_be_bytes(seg.data[0..4].try_into().unwrap());
            self.mss = self.mss.min(peer_mss.max(1));
            let peer_fin_ack = seg.data[4] != 0;
            self.fin_ack_enabled = self.supports_fin_ack_local && peer_fin_ack;
        }
        if self.state == PseudoTcpState::Listen {
            self.rcv_nxt = seg.seq.wrapping_add(1);
            self.state = PseudoTcpState::SynReceived;
            // The reply CONNECT segment already carries ack=rcv_nxt, so it
            // doubles as the ack for this SYN; no separate ack needed.
            self.send_syn()?;
        } else if self.state == PseudoTcpState::SynSent {
            self.rcv_nxt = seg.seq.wrapping_add(1);
            self.send_ack_now();
        }
        Ok(())
    }

    fn handle_fin(&mut self, seg: &Segment) {
        if seg.seq == self.rcv_nxt {
            self.rcv_nxt = self.rcv_nxt.wrapping_add(1);
        }
        self.received_fin = true;
        self.send_ack_now();
    }

    fn handle_ack(&mut self, ack: u32, ts_echo: u32) {
        if seq_gt(self.snd_una, ack) {
            return; // Stale ack, below what's already acknowledged.
        }
        if ack == self.snd_una {
            // Duplicate ack: only meaningful once something is outstanding.
            if self.snd_nxt != self.snd_una {
                let outstanding = self.snd_nxt.wrapping_sub(self.snd_una);
                if self.cong.on_duplicate_ack(outstanding, self.mss, self.snd_nxt) {
                    self.retransmit_head();
                }
            }
            return;
        }
        if self.syn_sent && seq_ge(ack, self.syn_seq.wrapping_add(1)) {
            self.syn_sent = false;
        }
        if self.fin_sent && seq_ge(ack, self.fin_seq.wrapping_add(1)) {
            self.fin_acked = true;
        }

        let advanced = ack.wrapping_sub(self.snd_una);
        self.snd_una = ack;
        self.send_buffer.consume(advanced as usize);

        while let Some(front) = self.in_flight.front() {
            if seq_ge(ack, front.seq.wrapping_add(front.len)) {
                self.in_flight.pop_front();
            } else if seq_gt(ack, front.seq) {
                let consumed = ack.wrapping_sub(front.seq);
                let front = self.in_flight.front_mut().unwrap();
                front.seq = front.seq.wrapping_add(consumed);
                front.len -= consumed;
                break;
            } else {
                break;
            }
        }

        if ts_echo != 0 {
            self.update_rtt(ts_echo);
        }

        let outstanding = self.snd_nxt.wrapping_sub(self.snd_una);
        if self.cong.in_fast_recovery() {
            self.cong.on_new_ack(ack, outstanding, self.mss);
        } else {
            self.cong.dup_acks = 0;
            self.cong.on_ack_growth(self.mss);
        }
        self.rto_base = if outstanding == 0 { None } else { Some(Instant::now()) };
        self.callbacks.on_writable();
        let _ = self.attempt_send();
    }

    fn update_rtt(&mut self, ts_echo: u32) {
        let now = self.now_ms();
        let rtt = now.wrapping_sub(ts_echo) as i64;
        if rtt < 0 {
            return;
        }
        let rtt = rtt as u32;
        if self.rx_srtt == 0 {
            self.rx_srtt = rtt;
            self.rx_rttvar = rtt / 2;
        } else {
            let delta = (rtt as i64 - self.rx_srtt as i64).unsigned_abs() as u32;
            self.rx_rttvar = (3 * self.rx_rttvar + delta) / 4;
            self.rx_srtt = (7 * self.rx_srtt + rtt) / 8;
        }
        self.rx_rto = (self.rx_srtt + std::cmp::max(1, 4 * self.rx_rttvar)).clamp(MIN_RTO, MAX_RTO);
    }

    fn handle_data(&mut self, seq: u32, data: Vec<u8>) {
        let ordered = seq == self.rcv_nxt;
        if seq_gt(self.rcv_nxt, seq) {
            // Old duplicate; ack immediately, don't store.
            self.send_ack_now();
            return;
        }
        if ordered {
            let len = data.len() as u32;
            self.recv_buffer.write(&data);
            self.rcv_nxt = self.rcv_nxt.wrapping_add(len);
            self.drain_reassembly();
            self.rcv_wnd = self.recv_buffer.available_space() as u32;
            self.callbacks.on_readable();
            self.arm_delayed_ack();
        } else {
            if !self.reassembly.iter().any(|p| p.seq == seq) {
                self.reassembly.push(PendingSegment { seq, data });
            }
            self.send_ack_now();
        }
    }

    fn drain_reassembly(&mut self) {
        loop {
            let idx = self.reassembly.iter().position(|p| p.seq == self.rcv_nxt);
            let Some(idx) = idx else { break };
            let pending = self.reassembly.remove(idx);
            let len = pending.data.len() as u32;
            self.recv_buffer.write(&pending.data);
            self.rcv_nxt = self.rcv_nxt.wrapping_add(len);
        }
    }

    fn arm_delayed_ack(&mut self) {
        self.t_ack = Some(Instant::now() + Duration::from_millis(ACK_DELAY as u64));
    }

    fn maybe_establish(&mut self) {
        if matches!(self.state, PseudoTcpState::SynSent | PseudoTcpState::SynReceived) && !self.syn_sent {
            self.state = PseudoTcpState::Established;
            self.callbacks.on_opened();
        }
    }

    fn try_finish_close(&mut self) {
        if self.state == PseudoTcpState::Closed {
            return;
        }
        let locally_done = if self.fin_ack_enabled {
            self.fin_sent && self.fin_acked
        } else {
            self.shutdown == ShutdownMode::Graceful && self.snd_una == self.snd_nxt && self.t_ack.is_none()
        };
        if !locally_done {
            return;
        }
        if !self.fin_ack_enabled {
            self.closedown(0);
            return;
        }
        if self.received_fin && self.time_wait_until.is_none() {
            self.time_wait_until = Some(Instant::now() + 2 * Duration::from_millis(self.rx_rto as u64));
        }
    }

    // ---- outbound -------------------------------------------------------------

    /// Segments `send_buffer` into MSS-sized chunks and transmits as many as
    /// the congestion/advertised window allow. Chunking happens lazily here
    /// rather than eagerly per `send()` call, which gets the same
    /// on-the-wire coalescing TCP's own Nagle-ish buffering provides
    /// without a separate merge step.
    fn attempt_send(&mut self) -> Result<()> {
        loop {
            let outstanding = self.snd_nxt.wrapping_sub(self.snd_una);
            let window = self.cong.cwnd.min(self.snd_wnd);
            let useable = window.saturating_sub(outstanding);
            if useable < window / 4 && window > 0 {
                break;
            }
            let unsent_offset = (self.snd_nxt.wrapping_sub(self.snd_una)) as usize;
            let unsent_len = self.send_buffer.len().saturating_sub(unsent_offset);
            if unsent_len == 0 {
                break;
            }
            if unsent_len < self.mss as usize && self.in_flight.iter().any(|s| !s.is_ctl) {
                break; // Nagle: wait for more data or an ACK before sending a runt segment.
            }
            let chunk_len = unsent_len.min(self.mss as usize).min(useable as usize).max(1);
            if chunk_len == 0 {
                break;
            }
            let mut chunk = vec![0u8; chunk_len];
            self.send_buffer.peek(unsent_offset, &mut chunk);
            let seq = self.snd_nxt;
            let seg = self.build_segment(seq, 0, 0, chunk);
            self.snd_nxt = self.snd_nxt.wrapping_add(seg.seq_len());
            self.in_flight.push_back(InFlightSegment { seq, len: seg.seq_len(), xmit: 0, is_ctl: false });
            if self.rto_base.is_none() {
                self.rto_base = Some(Instant::now());
            }
            self.send_now(&seg)?;
        }

        if self.shutdown == ShutdownMode::Graceful
            && self.fin_ack_enabled
            && !self.fin_sent
            && self.snd_una == self.snd_nxt
        {
            self.fin_seq = self.snd_nxt;
            self.fin_sent = true;
            self.fin_xmit = 0;
            let seg = self.build_segment(self.fin_seq, FLAG_CTL, CTL_FIN, Vec::new());
            self.snd_nxt = self.snd_nxt.wrapping_add(seg.seq_len());
            self.send_now(&seg)?;
        }
        Ok(())
    }

    fn build_segment(&self, seq: u32, flags: u8, control: u8, data: Vec<u8>) -> Segment {
        Segment {
            conv: self.conv,
            seq,
            ack: self.rcv_nxt,
            control,
            flags,
            wnd: self.rcv_wnd.min(u16::MAX as u32) as u16,
            ts_send: self.now_ms(),
            ts_echo: self.ts_recent,
            data,
            xmit: 0,
        }
    }

    fn send_now(&mut self, seg: &Segment) -> Result<()> {
        self.lastsend = Instant::now();
        self.transmit_raw(&seg.encode())
    }

    fn send_ack_now(&mut self) {
        self.t_ack = None;
        let seg = self.build_segment(self.snd_nxt, 0, 0, Vec::new());
        let _ = self.transmit_raw(&seg.encode());
    }

    fn transmit_raw(&mut self, bytes: &[u8]) -> Result<()> {
        match self.callbacks.write_packet(bytes) {
            WriteResult::Success => Ok(()),
            WriteResult::TooLarge => {
                self.step_down_mss();
                Ok(())
            }
            WriteResult::Fail => Err(Error::Other("write_packet failed".into())),
        }
    }

    fn step_down_mss(&mut self) {
        while self.msslevel + 1 < PACKET_MAXIMUMS.len() && PACKET_MAXIMUMS[self.msslevel + 1] != 0 {
            self.msslevel += 1;
            let candidate = PACKET_MAXIMUMS[self.msslevel] as u32;
            if candidate > PACKET_OVERHEAD {
                self.mss = candidate - PACKET_OVERHEAD;
                return;
            }
        }
    }

    /// Caps the MSS to whatever path MTU the embedder has learned about
    /// out of band (RFC 1191 §7.1, path MTU discovery).
    pub fn notify_mtu(&mut self, mtu: u16) {
        let budget = mtu as u32;
        if budget > PACKET_OVERHEAD {
            self.mss = self.mss.min(budget - PACKET_OVERHEAD);
        }
    }

    // ---- clock ----------------------------------------------------------------

    /// Computes the minimum deadline this socket needs to be woken at
    /// again. `None` only when the socket is already closed and idle.
    pub fn get_next_clock(&self, now: Instant) -> Option<Duration> {
        if self.state == PseudoTcpState::Closed {
            return None;
        }
        let mut deadline = now + Duration::from_millis(IDLE_TIMEOUT as u64);
        if let Some(t_ack) = self.t_ack {
            deadline = deadline.min(t_ack);
        }
        if let Some(rto_base) = self.rto_base {
            deadline = deadline.min(rto_base + Duration::from_millis(self.rx_rto as u64));
        }
        if self.probing {
            deadline = deadline.min(self.lastsend + Duration::from_millis(self.rx_rto as u64));
        }
        if let Some(tw) = self.time_wait_until {
            deadline = deadline.min(tw);
        }
        Some(deadline.saturating_duration_since(now))
    }

    /// Drives retransmission (RFC 793 §3.7), delayed-ACK flush, zero-window
    /// probing and the FIN/ACK TIME-WAIT expiry.
    pub fn notify_clock(&mut self) {
        if self.state == PseudoTcpState::Closed {
            return;
        }
        let now = Instant::now();

        if let Some(tw) = self.time_wait_until {
            if now >= tw {
                self.closedown(0);
                return;
            }
        }

        if let Some(t_ack) = self.t_ack {
            if now >= t_ack {
                self.send_ack_now();
            }
        }

        if self.snd_wnd == 0 {
            if now.duration_since(self.lastsend).as_millis() as u32 >= self.rx_rto {
                if self.probing && now.duration_since(self.lastrecv).as_millis() as u32 >= PROBE_IDLE_TIMEOUT {
                    self.closedown(ECONNABORTED);
                    return;
                }
                self.probing = true;
                self.send_zero_window_probe();
            }
        } else {
            self.probing = false;
        }

        if let Some(rto_base) = self.rto_base {
            let rto_limit = if self.state == PseudoTcpState::Established { MAX_RTO } else { DEF_RTO };
            if now.duration_since(rto_base).as_millis() as u32 >= self.rx_rto {
                self.on_retransmit_timeout(rto_limit);
            }
        }

        let _ = self.attempt_send();
        self.try_finish_close();
    }

    fn send_zero_window_probe(&mut self) {
        let seq = self.snd_nxt.wrapping_sub(1);
        let mut probe = vec![0u8];
        self.send_buffer.peek(0, &mut probe);
        let seg = self.build_segment(seq, 0, 0, probe);
        let _ = self.send_now(&seg);
    }

    fn on_retransmit_timeout(&mut self, rto_limit: u32) {
        let retries = self.syn_xmit.max(self.fin_xmit).max(self.in_flight.front().map(|s| s.xmit).unwrap_or(0));
        let retry_cap = if self.state == PseudoTcpState::Established { MAX_RETRIES_ESTABLISHED } else { MAX_RETRIES_HANDSHAKE };
        if retries >= retry_cap {
            self.closedown(ETIMEDOUT);
            return;
        }

        let outstanding = self.snd_nxt.wrapping_sub(self.snd_una);
        self.cong.on_rto_timeout(outstanding, self.mss);
        self.rx_rto = (self.rx_rto * 2).min(rto_limit);
        self.rto_base = Some(Instant::now());

        if self.syn_sent {
            self.syn_xmit += 1;
            let _ = self.transmit_syn();
        } else if !self.in_flight.is_empty() {
            self.retransmit_head();
        } else if self.fin_sent && !self.fin_acked {
            self.fin_xmit += 1;
            let seg = self.build_segment(self.fin_seq, FLAG_CTL, CTL_FIN, Vec::new());
            let _ = self.send_now(&seg);
        }
    }

    /// Resends the earliest still-unacked data segment without changing its
    /// sequence number, shared by the RTO path and fast retransmit (RFC 5681
    /// §3.2).
    fn retransmit_head(&mut self) {
        let Some(front) = self.in_flight.front() else { return };
        let seq = front.seq;
        let len = front.len as usize;
        let offset = seq.wrapping_sub(self.snd_una) as usize;
        let mut data = vec![0u8; len];
        self.send_buffer.peek(offset, &mut data);
        if let Some(front) = self.in_flight.front_mut() {
            front.xmit += 1;
        }
        let seg = self.build_segment(seq, 0, 0, data);
        let _ = self.send_now(&seg);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct LoopbackCallbacks {
        outbox: Arc<Mutex<VecDeque<Vec<u8>>>>,
    }

    impl PseudoTcpCallbacks for LoopbackCallbacks {
        fn write_packet(&self, buf: &[u8]) -> WriteResult {
            self.outbox.lock().unwrap().push_back(buf.to_vec());
            WriteResult::Success
        }
    }

    fn new_pair() -> (PseudoTcpSocket, Arc<Mutex<VecDeque<Vec<u8>>>>, PseudoTcpSocket, Arc<Mutex<VecDeque<Vec<u8>>>>) {
        let a_out = Arc::new(Mutex::new(VecDeque::new()));
        let b_out = Arc::new(Mutex::new(VecDeque::new()));
        let a = PseudoTcpSocket::new(12345, Box::new(LoopbackCallbacks { outbox: a_out.clone() }), false);
        let b = PseudoTcpSocket::new(0, Box::new(LoopbackCallbacks { outbox: b_out.clone() }), false);
        (a, a_out, b, b_out)
    }

    fn pump(a: &mut PseudoTcpSocket, a_out: &Arc<Mutex<VecDeque<Vec<u8>>>>, b: &mut PseudoTcpSocket, b_out: &Arc<Mutex<VecDeque<Vec<u8>>>>) {
        for _ in 0..50 {
            let mut progressed = false;
            while let Some(pkt) = a_out.lock().unwrap().pop_front() {
                b.notify_packet(&pkt).unwrap();
                progressed = true;
            }
            while let Some(pkt) = b_out.lock().unwrap().pop_front() {
                a.notify_packet(&pkt).unwrap();
                progressed = true;
            }
            if !progressed {
                break;
            }
        }
    }

    #[test]
    fn test_handshake_reaches_established() {
        let (mut a, a_out, mut b, b_out) = new_pair();
        a.connect().unwrap();
        pump(&mut a, &a_out, &mut b, &b_out);
        assert_eq!(a.state(), PseudoTcpState::Established);
        assert_eq!(b.state(), PseudoTcpState::Established);
    }

    #[test]
    fn test_send_recv_round_trip() {
        let (mut a, a_out, mut b, b_out) = new_pair();
        a.connect().unwrap();
        pump(&mut a, &a_out, &mut b, &b_out);
        a.send(b"hello pseudo-tcp").unwrap();
        pump(&mut a, &a_out, &mut b, &b_out);
        let mut buf = [0u8; 64];
        let n = b.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello pseudo-tcp");
    }

    #[test]
    fn test_send_after_close_is_epipe() {
        let (mut a, a_out, mut b, b_out) = new_pair();
        a.connect().unwrap();
        pump(&mut a, &a_out, &mut b, &b_out);
        a.close(false);
        let err = a.send(b"x").unwrap_err();
        assert_eq!(err, Error::ErrPipe);
    }

    #[test]
    fn test_double_close_is_idempotent() {
        let (mut a, a_out, mut b, b_out) = new_pair();
        a.connect().unwrap();
        pump(&mut a, &a_out, &mut b, &b_out);
        a.close(false);
        a.close(false);
    }

    #[test]
    fn test_recv_is_would_block_before_data() {
        let (mut a, a_out, mut b, b_out) = new_pair();
        a.connect().unwrap();
        pump(&mut a, &a_out, &mut b, &b_out);
        let mut buf = [0u8; 8];
        assert_eq!(b.recv(&mut buf).unwrap_err(), Error::ErrWouldBlock);
    }
}
