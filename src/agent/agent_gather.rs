use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, oneshot, Mutex};

use super::agent_internal::AgentInternal;
use crate::candidate::candidate_base::{CandidateBase, CandidateBaseConfig};
use crate::candidate::candidate_host::{new_candidate_host, CandidateHostConfig};
use crate::candidate::candidate_relay::{new_candidate_relay, CandidateRelayConfig};
use crate::candidate::candidate_server_reflexive::{new_candidate_server_reflexive, CandidateServerReflexiveConfig};
use crate::candidate::{same_foundation, Candidate, TcpType};
use crate::error::{Error, Result};
use crate::rand::generate_cand_id;
use crate::state::GatheringState;
use crate::stun::attributes::address::XorMappedAddress;
use crate::stun::header::Method;
use crate::stun::message::{Getter, Message};
use crate::turn::allocation::{RelayKind, TurnAllocation};
use crate::turn::client::{create_allocate, process_allocate_response, AllocateOutcome};

/// A local base this agent listens on: the network conn/address pair a host
/// candidate and any reflexive/relayed candidate discovered from it share
/// (RFC 8445 §2, base address).
pub struct LocalBase {
    pub network: String,
    pub address: SocketAddr,
    pub conn: Arc<dyn util::Conn + Send + Sync>,
}

/// Registers `candidate` with its component and starts its inbound-message
/// loop (RFC 8445 §5.1). Every candidate, regardless of kind, goes through
/// this once it has a usable `conn`.
async fn spawn_candidate(
    agent_internal: &Arc<Mutex<AgentInternal>>,
    stream_id: u16,
    component_id: u16,
    candidate: CandidateBase,
    conn: Arc<dyn util::Conn + Send + Sync>,
    local_addr: SocketAddr,
) -> Arc<dyn Candidate + Send + Sync> {
    let candidate: Arc<CandidateBase> = Arc::new(candidate);
    let (closed_tx, closed_rx) = broadcast::channel(1);
    *candidate.closed_ch.lock().await = Some(closed_tx);

    let dyn_candidate: Arc<dyn Candidate + Send + Sync> = candidate.clone();
    let ai = Arc::clone(agent_internal);
    let conn_clone = Arc::clone(&conn);
    tokio::spawn(async move {
        if let Err(err) = CandidateBase::recv_loop(dyn_candidate, ai, closed_rx, None, conn_clone, local_addr).await {
            log::debug!("candidate recv loop ended: {err}");
        }
    });

    {
        let mut ai = agent_internal.lock().await;
        let stream = ai.streams.get_mut(&stream_id).expect("stream must exist before gathering");
        let component = stream.component_mut(component_id);
        component.local_candidates.push(candidate.clone());
    }

    candidate
}

/// Builds one host candidate per supplied local base and starts it
/// (RFC 8445 §5.1.1 — host candidates are the always-available first
/// tier). Returns the gathered candidates for the caller to marshal/signal.
pub async fn gather_host_candidates(
    agent_internal: &Arc<Mutex<AgentInternal>>,
    stream_id: u16,
    component_id: u16,
    bases: &[LocalBase],
) -> Result<Vec<Arc<dyn Candidate + Send + Sync>>> {
    let mut out = Vec::with_capacity(bases.len());
    for base in bases {
        let c = new_candidate_host(CandidateHostConfig {
            base_config: CandidateBaseConfig {
                candidate_id: generate_cand_id(),
                network: base.network.clone(),
                address: base.address.ip().to_string(),
                port: base.address.port(),
                component: component_id,
                conn: Some(Arc::clone(&base.conn)),
                ..Default::default()
            },
            tcp_type: TcpType::Unspecified,
        })
        .await?;
        let dyn_c = spawn_candidate(agent_internal, stream_id, component_id, c, Arc::clone(&base.conn), base.address).await;
        out.push(dyn_c);
    }
    Ok(out)
}

/// Sends one STUN Binding request on `base.conn` to `stun_server`, retrying
/// per the gathering agent's retransmission schedule, and folds the
/// XOR-MAPPED-ADDRESS into a server-reflexive candidate (RFC 8445 §5.1.1.2,
/// retransmission schedule per RFC 5389 §7.2.1). Returns `Ok(None)` instead
/// of erroring on a foundation clash with an existing candidate (two bases
/// reflexing to the same public mapping), matching the redundant-candidate
/// elimination rule in RFC 8445 §5.1.3.
pub async fn gather_server_reflexive(
    agent_internal: &Arc<Mutex<AgentInternal>>,
    stream_id: u16,
    component_id: u16,
    base: &LocalBase,
    stun_server: SocketAddr,
) -> Result<Option<Arc<dyn Candidate + Send + Sync>>> {
    let resp = send_gather_request(agent_internal, Method::Binding, &[], b"", &base.conn, stun_server).await?;
    let mapped = XorMappedAddress::get_from(&resp).map_err(|_| Error::new("srflx response missing xor-mapped-address".into()))?;

    let c = new_candidate_server_reflexive(CandidateServerReflexiveConfig {
        base_config: CandidateBaseConfig {
            candidate_id: generate_cand_id(),
            network: base.network.clone(),
            address: mapped.0.ip().to_string(),
            port: mapped.0.port(),
            component: component_id,
            conn: Some(Arc::clone(&base.conn)),
            ..Default::default()
        },
        rel_addr: base.address.ip().to_string(),
        rel_port: base.address.port(),
    })
    .await?;

    {
        let ai = agent_internal.lock().await;
        let stream = ai.streams.get(&stream_id).ok_or(Error::ErrUnknownStream(stream_id))?;
        let component = stream.components.get(&component_id).ok_or(Error::ErrUnknownComponent(component_id))?;
        if component.local_candidates.iter().any(|existing| same_foundation(existing.as_ref(), &c)) {
            return Ok(None);
        }
    }

    let dyn_c = spawn_candidate(agent_internal, stream_id, component_id, c, Arc::clone(&base.conn), base.address).await;
    Ok(Some(dyn_c))
}

/// A 3xx Allocate response may redirect at most this many times before
/// `gather_relay` gives up; RFC 5766 doesn't bound it, but an unbounded
/// chain of ALTERNATE-SERVERs is a server misconfiguration, not a case
/// worth looping on forever.
const MAX_ALLOCATE_REDIRECTS: u32 = 2;

/// Runs the TURN Allocate handshake (unauthenticated attempt, then
/// re-attempt once challenged with REALM/NONCE per RFC 5766 §6.2) and folds
/// the result into a relayed candidate (RFC 8445 §5.1.1.2).
/// `username`/`password` are long-term TURN credentials, not the ICE
/// ufrag/pwd. A 300/301/302 response retargets the allocation to the
/// ALTERNATE-SERVER address and restarts the challenge handshake there
/// (RFC 5766 §6.3), up to [`MAX_ALLOCATE_REDIRECTS`] times.
pub async fn gather_relay(
    agent_internal: &Arc<Mutex<AgentInternal>>,
    stream_id: u16,
    component_id: u16,
    base: &LocalBase,
    turn_server: SocketAddr,
    username: String,
    password: String,
) -> Result<Arc<dyn Candidate + Send + Sync>> {
    let mut server = turn_server;
    let mut allocation = TurnAllocation::new(server, username, password, RelayKind::Udp);

    for redirects in 0.. {
        let outcome = run_allocate(agent_internal, &base.conn, server, &allocation).await?;
        let outcome = match outcome {
            AllocateOutcome::Challenged { realm, nonce } => {
                allocation.realm = realm;
                allocation.nonce = nonce;
                run_allocate(agent_internal, &base.conn, server, &allocation).await?
            }
            other => other,
        };

        match outcome {
            AllocateOutcome::Success { relayed_address, mapped_address, lifetime } => {
                allocation.mark_allocated(relayed_address, mapped_address, lifetime);
                let allocation = Arc::new(Mutex::new(allocation));
                let c = new_candidate_relay(CandidateRelayConfig {
                    base_config: CandidateBaseConfig {
                        candidate_id: generate_cand_id(),
                        network: base.network.clone(),
                        address: relayed_address.ip().to_string(),
                        port: relayed_address.port(),
                        component: component_id,
                        conn: Some(Arc::clone(&base.conn)),
                        ..Default::default()
                    },
                    rel_addr: server.ip().to_string(),
                    rel_port: server.port(),
                    relay_client: Some(allocation),
                })
                .await?;
                return Ok(spawn_candidate(agent_internal, stream_id, component_id, c, Arc::clone(&base.conn), base.address).await);
            }
            AllocateOutcome::Error(code, reason) => return Err(Error::ErrTurnAllocationFailed(format!("{code} {reason}"))),
            AllocateOutcome::Redirect(addr) => {
                if redirects >= MAX_ALLOCATE_REDIRECTS {
                    return Err(Error::ErrTurnAllocationFailed(format!("too many allocate redirects, last target {addr}")));
                }
                log::debug!("turn allocate redirected from {server} to {addr}");
                server = addr;
                allocation = TurnAllocation::new(server, allocation.username, allocation.password, allocation.relay_kind);
            }
            AllocateOutcome::Challenged { .. } => return Err(Error::ErrTurnAllocationFailed("server challenged twice".into())),
        }
    }
    unreachable!("loop only exits via return")
}

async fn run_allocate(
    agent_internal: &Arc<Mutex<AgentInternal>>,
    conn: &Arc<dyn util::Conn + Send + Sync>,
    turn_server: SocketAddr,
    allocation: &TurnAllocation,
) -> Result<AllocateOutcome> {
    let (req_bytes, tid) = {
        let mut ai = agent_internal.lock().await;
        let m = create_allocate(&mut ai.gather_agent, allocation, None)?;
        (m.raw.clone(), m.transaction_id)
    };
    let resp = send_raw_and_await(agent_internal, tid, &req_bytes, conn, turn_server).await?;
    process_allocate_response(&resp)
}

/// Sends one STUN request and awaits its response through the gathering
/// transaction table, retransmitting per [`crate::stun::transaction::TransactionTimer`]
/// until the response arrives or retries are exhausted (RFC 5389 §7.2.1).
async fn send_gather_request(
    agent_internal: &Arc<Mutex<AgentInternal>>,
    method: Method,
    setters: &[&dyn crate::stun::message::Setter],
    key: &[u8],
    conn: &Arc<dyn util::Conn + Send + Sync>,
    dst: SocketAddr,
) -> Result<Message> {
    let (req_bytes, tid) = {
        let mut ai = agent_internal.lock().await;
        let mut m = ai.gather_agent.init_request(method, setters)?;
        ai.gather_agent.finish_message(&mut m, key)?;
        (m.raw.clone(), m.transaction_id)
    };
    send_raw_and_await(agent_internal, tid, &req_bytes, conn, dst).await
}

async fn send_raw_and_await(
    agent_internal: &Arc<Mutex<AgentInternal>>,
    tid: crate::stun::header::TransactionId,
    req_bytes: &[u8],
    conn: &Arc<dyn util::Conn + Send + Sync>,
    dst: SocketAddr,
) -> Result<Message> {
    let mut timer = crate::stun::transaction::TransactionTimer::new(Duration::from_millis(500), 7, false);

    loop {
        let (tx, rx) = oneshot::channel();
        {
            let mut ai = agent_internal.lock().await;
            ai.pending_gather.insert(tid, tx);
        }
        conn.send_to(req_bytes, dst).await?;

        match tokio::time::timeout(timer.remainder().max(Duration::from_millis(1)), rx).await {
            Ok(Ok(msg)) => return Ok(msg),
            _ => {
                let mut ai = agent_internal.lock().await;
                ai.pending_gather.remove(&tid);
                drop(ai);
                if timer.refresh() == crate::stun::transaction::TimerEvent::Timeout {
                    return Err(Error::ErrTransactionTimeout);
                }
            }
        }
    }
}

/// Marks gathering complete and signals it, once every base/server
/// combination the caller asked for has been attempted (RFC 8445 §5.1.1.2,
/// "complete" state).
pub async fn finish_gathering(agent_internal: &Arc<Mutex<AgentInternal>>) {
    let mut ai = agent_internal.lock().await;
    ai.gathering_state = GatheringState::Complete;
    let ev = super::agent_internal::AgentEvent::GatheringStateChange(GatheringState::Complete);
    let _ = ai.event_tx.send(ev);
}
