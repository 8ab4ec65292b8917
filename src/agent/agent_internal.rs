use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};

use super::agent_config::AgentConfig;
use crate::candidate::candidate_pair::{pair_foundation, pair_priority_for_role, CandidatePair};
use crate::candidate::candidate_peer_reflexive::{new_candidate_peer_reflexive, CandidatePeerReflexiveConfig};
use crate::candidate::candidate_base::CandidateBaseConfig;
use crate::candidate::Candidate;
use crate::error::{Error, Result};
use crate::state::{ConnectionState, GatheringState, PairState};
use crate::stream::{Component, Stream};
use crate::stun::agent::{AgentUsage, StunAgent};
use crate::stun::attributes::control::{IceControlled, IceControlling, Priority, UseCandidate};
use crate::stun::attributes::address::XorMappedAddress;
use crate::stun::header::{Class, Method};
use crate::stun::integrity;
use crate::stun::message::{Getter, Message, Setter};
use crate::stun::transaction::TimerEvent;

/// Among a component's `Frozen`/`Waiting` pairs, unfreezes only the
/// highest-priority pair of each distinct foundation (RFC 8445 §6.1.2.6:
/// the top pair of each distinct foundation is unfrozen to waiting). Called
/// after the checklist gains new pairs.
/// Pairs already `InProgress`/`Succeeded`/`Failed` are left alone.
pub(crate) fn rebuild_foundation_waiting(component: &mut Component) {
    let mut best: HashMap<String, (usize, u64)> = HashMap::new();
    for (idx, pair) in component.checklist.iter().enumerate() {
        if !matches!(pair.state, PairState::Frozen | PairState::Waiting) {
            continue;
        }
        best.entry(pair.foundation.clone())
            .and_modify(|(best_idx, best_priority)| {
                if pair.priority > *best_priority {
                    *best_idx = idx;
                    *best_priority = pair.priority;
                }
            })
            .or_insert((idx, pair.priority));
    }
    let winners: HashSet<usize> = best.values().map(|(idx, _)| *idx).collect();
    for (idx, pair) in component.checklist.iter_mut().enumerate() {
        if !matches!(pair.state, PairState::Frozen | PairState::Waiting) {
            continue;
        }
        pair.state = if winners.contains(&idx) { PairState::Waiting } else { PairState::Frozen };
    }
}

/// Events an [`super::Agent`] hands out over its broadcast channel.
/// `stream`/`component` name which checklist the event concerns;
/// `Gathering` is stream/component-independent.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    GatheringStateChange(GatheringState),
    ConnectionStateChange { stream: u16, component: u16, state: ConnectionState },
    SelectedPairChange { stream: u16, component: u16, pair: usize },
    CandidateGathered { stream: u16, component: u16, marshaled: String },
}

/// Owns every piece of mutable agent state: role, streams/components,
/// checklists, the STUN agent used for connectivity checks, and the
/// triggered-check queue. Always reached through `Arc<Mutex<AgentInternal>>`
/// so a single lock serializes gathering, conncheck pacing and inbound
/// message handling: one internal lock per agent.
pub struct AgentInternal {
    pub config: AgentConfig,
    pub is_controlling: bool,
    pub tie_breaker: u64,
    pub stun_agent: StunAgent,
    /// Separate agent used only for gathering transactions (Binding probes
    /// to a STUN server, Allocate/Refresh/CreatePermission/ChannelBind to a
    /// TURN server). These exchanges carry no short-term ICE credentials,
    /// unlike connectivity checks on `stun_agent`, so the two must not share
    /// a usage policy (RFC 5389 §10 short-term vs RFC 5766 §6.2 long-term
    /// TURN credentials).
    pub(crate) gather_agent: StunAgent,
    pub streams: HashMap<u16, Stream>,
    pub gathering_state: GatheringState,
    pub event_tx: broadcast::Sender<AgentEvent>,
    pub triggered_queue: VecDeque<(u16, u16, usize)>,
    pub last_ta_tick: Instant,
    pub closed: bool,
    pub(crate) data_tx: mpsc::UnboundedSender<Vec<u8>>,
    /// Gathering-time STUN/TURN requests waiting on a response, keyed by
    /// transaction id. Consulted before treating a response as a
    /// connectivity-check reply, since gathering requests never have a
    /// checklist pair to match against (RFC 8445 §5.1).
    pub(crate) pending_gather: HashMap<crate::stun::header::TransactionId, oneshot::Sender<Message>>,
}

impl AgentInternal {
    pub fn new(config: AgentConfig, is_controlling: bool, event_tx: broadcast::Sender<AgentEvent>, data_tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        let usage = AgentUsage {
            short_term_credentials: true,
            long_term_credentials: false,
            require_fingerprint: false,
            add_software: true,
            ignore_credentials: false,
            no_auth_on_indications: true,
            force_validater_callback: false,
        };
        AgentInternal {
            stun_agent: StunAgent::new(config.compatibility, usage).with_software("ice-core"),
            gather_agent: StunAgent::new(config.compatibility, AgentUsage::default()).with_software("ice-core"),
            tie_breaker: crate::rand::generate_tie_breaker(),
            config,
            is_controlling,
            streams: HashMap::new(),
            gathering_state: GatheringState::New,
            event_tx,
            triggered_queue: VecDeque::new(),
            last_ta_tick: Instant::now(),
            closed: false,
            data_tx,
            pending_gather: HashMap::new(),
        }
    }

    fn emit(&self, ev: AgentEvent) {
        let _ = self.event_tx.send(ev);
    }

    /// Locates the (stream, component) owning a local candidate by id, and
    /// that candidate's index within the component's local candidate list.
    fn find_owner(&self, candidate_id: &str) -> Option<(u16, u16, usize)> {
        for stream in self.streams.values() {
            for component in stream.components.values() {
                if let Some(idx) = component.local_candidates.iter().position(|c| c.id() == candidate_id) {
                    return Some((stream.id, component.id, idx));
                }
            }
        }
        None
    }

    /// Only accept post-handshake application data from the address of the
    /// component's currently selected pair (RFC 8445 §7.2: unsolicited
    /// traffic from addresses outside the checklist must not reach the
    /// application).
    pub fn validate_non_stun_traffic(&self, c: &Arc<dyn Candidate + Send + Sync>, src_addr: SocketAddr) -> bool {
        let Some((stream_id, component_id, _)) = self.find_owner(&c.id()) else {
            return false;
        };
        let Some(stream) = self.streams.get(&stream_id) else { return false };
        let Some(component) = stream.components.get(&component_id) else { return false };
        match component.selected_pair {
            Some(pair_idx) => component
                .checklist
                .get(pair_idx)
                .and_then(|p| component.remote_candidates.get(p.remote_idx))
                .map(|remote| remote.port() == src_addr.port() && remote.address().parse::<std::net::IpAddr>() == Ok(src_addr.ip()))
                .unwrap_or(false),
            None => false,
        }
    }

    /// Forwards already-authorized application data to whoever is reading
    /// from the agent's virtual connection.
    pub async fn agent_conn_write(&self, buf: &[u8]) -> Result<()> {
        self.data_tx.send(buf.to_vec()).map_err(|_| Error::ErrClosed)
    }

    /// Entry point for every inbound STUN message received on a local
    /// candidate's socket (RFC 8445 §7.2/§7.3). `c` is the local candidate
    /// the message arrived on; `src_addr` is where it came from.
    pub async fn handle_inbound(
        &mut self,
        m: Message,
        c: &Arc<dyn Candidate + Send + Sync>,
        src_addr: SocketAddr,
        _agent_internal: Arc<Mutex<AgentInternal>>,
    ) {
        let tid = m.transaction_id;
        if self.gather_agent.outstanding(&tid) {
            match self.gather_agent.validate(&m.raw, |_| None) {
                Ok(msg) => {
                    if let Some(tx) = self.pending_gather.remove(&tid) {
                        let _ = tx.send(msg);
                    }
                }
                Err(err) => log::warn!("gathering response from {src_addr} failed validation: {err}"),
            }
            return;
        }

        let owner = self.find_owner(&c.id());
        let Some((stream_id, component_id, local_idx)) = owner else {
            log::warn!("stun message on candidate with no owning component");
            return;
        };

        let remote_pwd = self
            .streams
            .get(&stream_id)
            .and_then(|s| s.remote_pwd.clone());

        let raw = m.raw.clone();
        let validated = self.stun_agent.validate(&raw, |_msg: &Message| remote_pwd.clone().map(|p| p.into_bytes()));

        match validated {
            Ok(msg) if msg.typ.class == Class::Request => {
                self.process_binding_request(msg, c, src_addr, stream_id, component_id, local_idx).await;
            }
            Ok(msg) => {
                self.process_binding_response(msg, stream_id, component_id).await;
            }
            Err(Error::ErrUnmatchedResponse) => {
                log::debug!("dropped unmatched STUN response from {src_addr}");
            }
            Err(err) => {
                log::warn!("rejected STUN message from {src_addr}: {err}");
            }
        }
    }

    async fn process_binding_request(
        &mut self,
        req: Message,
        c: &Arc<dyn Candidate + Send + Sync>,
        src_addr: SocketAddr,
        stream_id: u16,
        component_id: u16,
        local_idx: usize,
    ) {
        let their_controlling = IceControlling::get_from(&req).ok();
        let their_controlled = IceControlled::get_from(&req).ok();
        if let Some(IceControlling(their_tie)) = their_controlling {
            if self.is_controlling {
                if self.tie_breaker >= their_tie {
                    self.reply_role_conflict(&req, c, src_addr).await;
                    return;
                }
                log::info!("role conflict: switching to controlled");
                self.is_controlling = false;
            }
        }
        if let Some(IceControlled(their_tie)) = their_controlled {
            if !self.is_controlling && self.tie_breaker < their_tie {
                log::info!("role conflict: switching to controlling");
                self.is_controlling = true;
            }
        }

        let use_candidate = UseCandidate::get_from(&req).is_ok();
        let priority = Priority::get_from(&req).map(|p| p.0).unwrap_or(0);

        let local_pwd = match self.streams.get(&stream_id).map(|s| s.local_pwd.clone()) {
            Some(p) => p,
            None => return,
        };

        let resp = self
            .stun_agent
            .init_response(Method::Binding, &req, &[&XorMappedAddress(src_addr)]);
        let mut resp = match resp {
            Ok(r) => r,
            Err(err) => {
                log::warn!("failed to build binding success response: {err}");
                return;
            }
        };
        if let Err(err) = integrity::add_message_integrity(&mut resp, local_pwd.as_bytes()) {
            log::warn!("failed to sign binding response: {err}");
            return;
        }
        resp.encode();
        if let Some(conn) = c.get_conn() {
            if let Err(err) = conn.send_to(&resp.raw, src_addr).await {
                log::warn!("failed to send binding response: {err}");
            }
        }

        let remote_idx = {
            let stream = self.streams.get_mut(&stream_id).unwrap();
            let component = stream.component_mut(component_id);
            match component.find_remote_by_addr(src_addr) {
                Some(idx) => idx,
                None => {
                    let prflx = match new_candidate_peer_reflexive(CandidatePeerReflexiveConfig {
                        base_config: CandidateBaseConfig {
                            network: "udp".into(),
                            address: src_addr.ip().to_string(),
                            port: src_addr.port(),
                            component: component_id,
                            priority,
                            ..Default::default()
                        },
                        rel_addr: String::new(),
                        rel_port: 0,
                    })
                    .await
                    {
                        Ok(cand) => cand,
                        Err(err) => {
                            log::warn!("failed to synthesize peer-reflexive candidate: {err}");
                            return;
                        }
                    };
                    component.remote_candidates.push(Arc::new(prflx));
                    component.remote_candidates.len() - 1
                }
            }
        };

        self.ensure_pair(stream_id, component_id, local_idx, remote_idx);
        self.triggered_queue.push_back((stream_id, component_id, remote_idx));

        if use_candidate && !self.is_controlling {
            self.nominate(stream_id, component_id, local_idx, remote_idx).await;
        }
    }

    async fn reply_role_conflict(&mut self, req: &Message, c: &Arc<dyn Candidate + Send + Sync>, src_addr: SocketAddr) {
        if let Ok(mut err_resp) = self.stun_agent.init_error(
            Method::Binding,
            req,
            &[&crate::stun::attributes::textattrs::ErrorCodeAttribute::new(487, "Role Conflict")],
        ) {
            err_resp.encode();
            if let Some(conn) = c.get_conn() {
                let _ = conn.send_to(&err_resp.raw, src_addr).await;
            }
        }
    }

    fn ensure_pair(&mut self, stream_id: u16, component_id: u16, local_idx: usize, remote_idx: usize) -> usize {
        let is_controlling = self.is_controlling;
        let stream = self.streams.get_mut(&stream_id).unwrap();
        let component = stream.component_mut(component_id);
        if let Some(idx) = component
            .checklist
            .iter()
            .position(|p| p.local_idx == local_idx && p.remote_idx == remote_idx)
        {
            return idx;
        }
        let local = Candidate::priority(component.local_candidates[local_idx].as_ref());
        let remote = Candidate::priority(component.remote_candidates[remote_idx].as_ref());
        let priority = pair_priority_for_role(is_controlling, local, remote);
        let foundation = pair_foundation(
            component.local_candidates[local_idx].as_ref(),
            component.remote_candidates[remote_idx].as_ref(),
        );
        component.checklist.push(CandidatePair::new(local_idx, remote_idx, priority, foundation));
        component.checklist.len() - 1
    }

    async fn process_binding_response(&mut self, resp: Message, stream_id: u16, component_id: u16) {
        let is_success = resp.typ.class == Class::SuccessResponse;
        let tid = resp.transaction_id;

        let pair_idx = self.streams.get(&stream_id).and_then(|stream| {
            stream.components.get(&component_id).and_then(|component| {
                component
                    .checklist
                    .iter()
                    .position(|p| p.transaction_id == Some(tid))
            })
        });
        let Some(pair_idx) = pair_idx else { return };

        if !is_success {
            let is_role_conflict = crate::stun::attributes::textattrs::ErrorCodeAttribute::get_from(&resp)
                .map(|e| e.code == 487)
                .unwrap_or(false);
            if is_role_conflict {
                log::info!("role conflict on outgoing check: switching to {}", if self.is_controlling { "controlled" } else { "controlling" });
                self.is_controlling = !self.is_controlling;
                let remote_idx = {
                    let stream = self.streams.get_mut(&stream_id).unwrap();
                    let component = stream.component_mut(component_id);
                    let pair = &mut component.checklist[pair_idx];
                    pair.state = PairState::Waiting;
                    pair.timer = None;
                    pair.transaction_id = None;
                    pair.remote_idx
                };
                self.triggered_queue.push_back((stream_id, component_id, remote_idx));
                return;
            }
            let stream = self.streams.get_mut(&stream_id).unwrap();
            let component = stream.component_mut(component_id);
            component.checklist[pair_idx].state = PairState::Failed;
            component.checklist[pair_idx].timer = None;
            self.maybe_fail_component(stream_id, component_id).await;
            return;
        }

        let (local_idx, remote_idx, use_candidate_sent, foundation) = {
            let stream = self.streams.get_mut(&stream_id).unwrap();
            let component = stream.component_mut(component_id);
            let pair = &mut component.checklist[pair_idx];
            pair.state = PairState::Succeeded;
            pair.timer = None;
            (pair.local_idx, pair.remote_idx, pair.use_candidate_sent, pair.foundation.clone())
        };

        // A succeeded check unfreezes every frozen pair sharing its
        // foundation across *all* components of the stream, not just this
        // one (RFC 8445 §7.3.1.5).
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            for component in stream.components.values_mut() {
                for pair in component.checklist.iter_mut() {
                    if pair.state == PairState::Frozen && pair.foundation == foundation {
                        pair.state = PairState::Waiting;
                    }
                }
            }
        }

        if use_candidate_sent || (self.is_controlling && self.config.aggressive_nomination) {
            self.nominate(stream_id, component_id, local_idx, remote_idx).await;
        }

        self.emit(AgentEvent::ConnectionStateChange {
            stream: stream_id,
            component: component_id,
            state: ConnectionState::Connected,
        });
    }

    async fn nominate(&mut self, stream_id: u16, component_id: u16, local_idx: usize, remote_idx: usize) {
        let pair_idx = self.ensure_pair(stream_id, component_id, local_idx, remote_idx);
        let stream = self.streams.get_mut(&stream_id).unwrap();
        let component = stream.component_mut(component_id);
        component.checklist[pair_idx].nominated = true;
        component.checklist[pair_idx].state = PairState::Succeeded;
        component.selected_pair = Some(pair_idx);
        component.state = ConnectionState::Completed;
        component.next_keepalive_at = Some(Instant::now() + self.jittered_keepalive_interval());
        self.emit(AgentEvent::SelectedPairChange { stream: stream_id, component: component_id, pair: pair_idx });
        self.emit(AgentEvent::ConnectionStateChange { stream: stream_id, component: component_id, state: ConnectionState::Completed });
    }

    fn jittered_keepalive_interval(&self) -> Duration {
        let jitter = self.config.keepalive_jitter.clamp(0.0, 1.0);
        let factor = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);
        self.config.keepalive_interval.mul_f64(factor.max(0.0))
    }

    /// A component is `failed` once its checklist is frozen-free, nothing
    /// is `waiting`/`in-progress`, and no pair has been nominated (RFC 8445
    /// §7.1.3.3, §8). Called after any pair transitions to `Failed`.
    async fn maybe_fail_component(&mut self, stream_id: u16, component_id: u16) {
        let should_fail = {
            let Some(stream) = self.streams.get(&stream_id) else { return };
            let Some(component) = stream.components.get(&component_id) else { return };
            component.selected_pair.is_none()
                && !component.checklist.is_empty()
                && !component
                    .checklist
                    .iter()
                    .any(|p| matches!(p.state, PairState::Frozen | PairState::Waiting | PairState::InProgress))
        };
        if !should_fail {
            return;
        }
        let stream = self.streams.get_mut(&stream_id).unwrap();
        let component = stream.component_mut(component_id);
        if component.state == ConnectionState::Failed {
            return;
        }
        component.state = ConnectionState::Failed;
        self.emit(AgentEvent::ConnectionStateChange { stream: stream_id, component: component_id, state: ConnectionState::Failed });
    }

    /// Scans every `in-progress` pair's STUN transaction timer and, for
    /// whichever are due, either retransmits the original request or marks
    /// the pair `failed` (RFC 5389 §7.2.1 retransmission timer, one per
    /// `in-progress` pair per RFC 8445 §14.3). Called once per Ta tick,
    /// ahead of picking the next pair to probe.
    async fn check_pair_timers(&mut self) {
        let mut due = Vec::new();
        for stream in self.streams.values() {
            for component in stream.components.values() {
                for (idx, pair) in component.checklist.iter().enumerate() {
                    if pair.state != PairState::InProgress {
                        continue;
                    }
                    if let Some(timer) = &pair.timer {
                        if timer.remainder() == Duration::ZERO {
                            due.push((stream.id, component.id, idx));
                        }
                    }
                }
            }
        }
        for (stream_id, component_id, pair_idx) in due {
            self.fire_pair_timer(stream_id, component_id, pair_idx).await;
        }
    }

    async fn fire_pair_timer(&mut self, stream_id: u16, component_id: u16, pair_idx: usize) {
        let event = {
            let Some(stream) = self.streams.get_mut(&stream_id) else { return };
            let component = stream.component_mut(component_id);
            let Some(pair) = component.checklist.get_mut(pair_idx) else { return };
            match pair.timer.as_mut() {
                Some(timer) => timer.refresh(),
                None => return,
            }
        };

        match event {
            TimerEvent::Retransmit => {
                let resend = {
                    let Some(stream) = self.streams.get(&stream_id) else { return };
                    let Some(component) = stream.components.get(&component_id) else { return };
                    let Some(pair) = component.checklist.get(pair_idx) else { return };
                    pair.last_request.clone().map(|bytes| {
                        (
                            bytes,
                            Arc::clone(&component.local_candidates[pair.local_idx]),
                            Arc::clone(&component.remote_candidates[pair.remote_idx]),
                        )
                    })
                };
                if let Some((bytes, local, remote)) = resend {
                    if let Some(conn) = local.get_conn() {
                        let addr = remote.addr().await;
                        if let Err(err) = conn.send_to(&bytes, addr).await {
                            log::warn!("failed to retransmit connectivity check: {err}");
                        }
                    }
                }
            }
            TimerEvent::Timeout => {
                if let Some(stream) = self.streams.get_mut(&stream_id) {
                    let component = stream.component_mut(component_id);
                    if let Some(pair) = component.checklist.get_mut(pair_idx) {
                        pair.state = PairState::Failed;
                        pair.timer = None;
                    }
                }
                self.maybe_fail_component(stream_id, component_id).await;
            }
        }
    }

    /// Sends a STUN Binding indication on every `ready` component's
    /// selected pair once its keepalive interval elapses, and demotes the
    /// component when no traffic has arrived for `max_missed_keepalives`
    /// worth of intervals (RFC 8445 §11).
    async fn send_keepalives(&mut self) {
        let now = Instant::now();
        let stream_ids: Vec<u16> = self.streams.keys().copied().collect();
        for stream_id in stream_ids {
            let component_ids: Vec<u16> = self.streams[&stream_id].components.keys().copied().collect();
            for component_id in component_ids {
                self.maybe_send_keepalive(stream_id, component_id, now).await;
            }
        }
    }

    async fn maybe_send_keepalive(&mut self, stream_id: u16, component_id: u16, now: Instant) {
        let send_info = {
            let Some(stream) = self.streams.get_mut(&stream_id) else { return };
            let component = stream.component_mut(component_id);
            let Some(pair_idx) = component.selected_pair else { return };
            if component.state.is_terminal() {
                return;
            }
            match component.next_keepalive_at {
                Some(deadline) if now >= deadline => {}
                Some(_) => return,
                None => return,
            }
            let pair = &component.checklist[pair_idx];
            let local = Arc::clone(&component.local_candidates[pair.local_idx]);
            let remote = Arc::clone(&component.remote_candidates[pair.remote_idx]);
            (local, remote)
        };
        let (local, remote) = send_info;

        if let Ok(mut indication) = self.stun_agent.init_indication(Method::Binding, &[]) {
            indication.encode();
            if let Some(conn) = local.get_conn() {
                let addr = remote.addr().await;
                if let Err(err) = conn.send_to(&indication.raw, addr).await {
                    log::warn!("failed to send keepalive: {err}");
                }
            }
        }

        let jittered = self.jittered_keepalive_interval();
        let last_received = local.last_received();
        let lost_window = self.config.keepalive_interval * self.config.max_missed_keepalives.max(1);
        let silent_for = std::time::SystemTime::now().duration_since(last_received).unwrap_or_default();

        let Some(stream) = self.streams.get_mut(&stream_id) else { return };
        let component = stream.component_mut(component_id);
        component.next_keepalive_at = Some(now + jittered);

        let current = component.state;
        if silent_for >= lost_window {
            let next = if current == ConnectionState::Disconnected { ConnectionState::Failed } else { ConnectionState::Disconnected };
            if next != current {
                component.state = next;
                self.emit(AgentEvent::ConnectionStateChange { stream: stream_id, component: component_id, state: next });
            }
        } else if current == ConnectionState::Disconnected {
            component.state = ConnectionState::Completed;
            self.emit(AgentEvent::ConnectionStateChange { stream: stream_id, component: component_id, state: ConnectionState::Completed });
        }
    }

    /// One pacing tick: service outstanding per-pair STUN timers and
    /// keepalives, then pop the highest-priority waiting pair (preferring
    /// the triggered-check queue) and send a connectivity check on it
    /// (RFC 8445 §6.1.4, §7.3). Called by the agent's Ta timer loop.
    pub async fn pace_tick(&mut self) {
        if self.closed {
            return;
        }
        self.check_pair_timers().await;
        self.send_keepalives().await;
        if let Some((stream_id, component_id, remote_idx)) = self.triggered_queue.pop_front() {
            self.send_next_check(stream_id, component_id, Some(remote_idx)).await;
            return;
        }

        let stream_ids: Vec<u16> = self.streams.keys().copied().collect();
        for stream_id in stream_ids {
            let component_ids: Vec<u16> = self.streams[&stream_id].components.keys().copied().collect();
            for component_id in component_ids {
                if self.send_next_check(stream_id, component_id, None).await {
                    return;
                }
            }
        }
    }

    async fn send_next_check(&mut self, stream_id: u16, component_id: u16, only_remote_idx: Option<usize>) -> bool {
        let candidate = {
            let stream = match self.streams.get_mut(&stream_id) {
                Some(s) => s,
                None => return false,
            };
            let component = stream.component_mut(component_id);
            let pair_idx = component
                .checklist
                .iter()
                .enumerate()
                .filter(|(_idx, p)| {
                    p.state == PairState::Waiting || p.state == PairState::Frozen || (only_remote_idx == Some(p.remote_idx) && p.state != PairState::Succeeded)
                })
                .max_by_key(|(_, p)| p.priority)
                .map(|(idx, _)| idx);
            let pair_idx = match pair_idx {
                Some(idx) => idx,
                None => return false,
            };
            component.checklist[pair_idx].state = PairState::InProgress;
            component.checklist[pair_idx].binding_request_count += 1;
            let nominate_now = self.is_controlling && self.config.aggressive_nomination;
            component.checklist[pair_idx].use_candidate_sent = nominate_now;
            let local = Arc::clone(&component.local_candidates[component.checklist[pair_idx].local_idx]);
            let remote = Arc::clone(&component.remote_candidates[component.checklist[pair_idx].remote_idx]);
            let local_priority = Candidate::priority(local.as_ref());
            Some((pair_idx, local, remote, local_priority, nominate_now))
        };

        let Some((pair_idx, local, remote, local_priority, nominate_now)) = candidate else {
            return false;
        };

        let local_ufrag_pwd = self.streams.get(&stream_id).map(|s| (s.local_ufrag.clone(), s.local_pwd.clone()));
        let remote_ufrag = self.streams.get(&stream_id).and_then(|s| s.remote_ufrag.clone());
        let remote_pwd = self.streams.get(&stream_id).and_then(|s| s.remote_pwd.clone());
        let (local_ufrag, remote_ufrag, remote_pwd) = match (local_ufrag_pwd, remote_ufrag, remote_pwd) {
            (Some((lu, _lp)), Some(ru), Some(rp)) => (lu, ru, rp),
            _ => return false,
        };

        let username = format!("{remote_ufrag}:{local_ufrag}");
        let mut setters: Vec<Box<dyn Setter>> = vec![
            Box::new(crate::stun::attributes::textattrs::Username(username)),
            Box::new(Priority(local_priority)),
        ];
        if self.is_controlling {
            setters.push(Box::new(IceControlling(self.tie_breaker)));
            if nominate_now {
                setters.push(Box::new(UseCandidate));
            }
        } else {
            setters.push(Box::new(IceControlled(self.tie_breaker)));
        }
        let setter_refs: Vec<&dyn Setter> = setters.iter().map(|s| s.as_ref()).collect();

        let mut req = match self.stun_agent.init_request(Method::Binding, &setter_refs) {
            Ok(r) => r,
            Err(err) => {
                log::warn!("failed to build binding request: {err}");
                return false;
            }
        };
        let tid = req.transaction_id;
        if let Err(err) = self.stun_agent.finish_message(&mut req, remote_pwd.as_bytes()) {
            log::warn!("failed to sign binding request: {err}");
            return false;
        }

        {
            let stream = self.streams.get_mut(&stream_id).unwrap();
            let component = stream.component_mut(component_id);
            component.checklist[pair_idx].transaction_id = Some(tid);
            component.checklist[pair_idx].last_check_sent = Some(Instant::now());
            component.checklist[pair_idx].last_request = Some(req.raw.clone());
            component.checklist[pair_idx].timer = Some(crate::stun::transaction::TransactionTimer::new(
                self.config.stun_initial_rto,
                self.config.stun_max_retries,
                false,
            ));
        }

        if let Some(conn) = local.get_conn() {
            let dst = remote.addr().await;
            if let Err(err) = conn.send_to(&req.raw, dst).await {
                log::warn!("failed to send connectivity check: {err}");
            }
        }
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn pair(foundation: &str, priority: u64) -> CandidatePair {
        CandidatePair::new(0, 0, priority, foundation.to_string())
    }

    #[test]
    fn test_rebuild_foundation_waiting_unfreezes_top_per_foundation() {
        let mut component = Component::new(1);
        component.checklist.push(pair("f1", 10));
        component.checklist.push(pair("f1", 20));
        component.checklist.push(pair("f2", 5));

        rebuild_foundation_waiting(&mut component);

        assert_eq!(component.checklist[0].state, PairState::Frozen);
        assert_eq!(component.checklist[1].state, PairState::Waiting);
        assert_eq!(component.checklist[2].state, PairState::Waiting);
    }

    #[test]
    fn test_rebuild_foundation_waiting_leaves_in_progress_pairs_alone() {
        let mut component = Component::new(1);
        let mut p = pair("f1", 10);
        p.state = PairState::InProgress;
        component.checklist.push(p);
        component.checklist.push(pair("f1", 5));

        rebuild_foundation_waiting(&mut component);

        assert_eq!(component.checklist[0].state, PairState::InProgress);
        assert_eq!(component.checklist[1].state, PairState::Waiting);
    }

    #[test]
    fn test_rebuild_foundation_waiting_is_idempotent() {
        let mut component = Component::new(1);
        component.checklist.push(pair("f1", 10));
        component.checklist.push(pair("f1", 20));

        rebuild_foundation_waiting(&mut component);
        rebuild_foundation_waiting(&mut component);

        assert_eq!(component.checklist[0].state, PairState::Frozen);
        assert_eq!(component.checklist[1].state, PairState::Waiting);
    }
}
