pub mod agent_config;
pub mod agent_gather;
pub mod agent_internal;
pub mod agent_stats;
pub mod agent_transport;
pub mod mdns;

use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex};

pub use agent_config::AgentConfig;
pub use agent_internal::AgentEvent;
pub use agent_stats::ComponentStats;

use crate::candidate::Candidate;
use crate::error::{Error, Result};
use crate::rand::{generate_pwd, generate_ufrag};
use crate::state::GatheringState;
use crate::stream::Stream;
use agent_gather::LocalBase;
use agent_internal::AgentInternal;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Public handle to an ICE agent (RFC 8445 §2). Every operation locks the
/// shared [`AgentInternal`] briefly and returns; the pacing timer and
/// gathering run as background tasks so the caller never blocks on network
/// activity beyond what each call explicitly awaits.
pub struct Agent {
    inner: Arc<Mutex<AgentInternal>>,
    data_rx: Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
    bases: Mutex<HashMap<(u16, u16), Vec<LocalBase>>>,
    stun_servers: Mutex<Vec<SocketAddr>>,
    turn_servers: Mutex<Vec<(SocketAddr, String, String)>>,
    pacing_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Agent {
    /// Creates an agent in the given ICE role (RFC 8445 §4); it can flip at
    /// runtime on a detected role conflict (RFC 8445 §7.3.1.1).
    pub fn new(config: AgentConfig, is_controlling: bool) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (data_tx, data_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Mutex::new(AgentInternal::new(config, is_controlling, event_tx, data_tx)));
        Arc::new(Agent {
            inner,
            data_rx: Mutex::new(Some(data_rx)),
            bases: Mutex::new(HashMap::new()),
            stun_servers: Mutex::new(Vec::new()),
            turn_servers: Mutex::new(Vec::new()),
            pacing_handle: Mutex::new(None),
        })
    }

    /// Subscribes to gathering/connection-state/selected-pair events.
    pub async fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.inner.lock().await.event_tx.subscribe()
    }

    /// Registers a new stream, returning its freshly generated local
    /// ufrag/pwd (RFC 8445 §5.3).
    pub async fn add_stream(&self, stream_id: u16) -> (String, String) {
        let ufrag = generate_ufrag();
        let pwd = generate_pwd();
        let mut ai = self.inner.lock().await;
        ai.streams.insert(stream_id, Stream::new(stream_id, ufrag.clone(), pwd.clone()));
        (ufrag, pwd)
    }

    /// Registers a local network base (an already-bound socket and the
    /// address it's bound to) that gathering should build a host candidate
    /// from (RFC 8445 §5.1.1). Must be called before `gather_candidates`.
    pub async fn add_local_address(
        &self,
        stream_id: u16,
        component_id: u16,
        network: impl Into<String>,
        address: SocketAddr,
        conn: Arc<dyn util::Conn + Send + Sync>,
    ) {
        let mut bases = self.bases.lock().await;
        bases.entry((stream_id, component_id)).or_default().push(LocalBase {
            network: network.into(),
            address,
            conn,
        });
    }

    pub async fn set_stun_server(&self, server: SocketAddr) {
        self.stun_servers.lock().await.push(server);
    }

    pub async fn set_turn_server(&self, server: SocketAddr, username: impl Into<String>, password: impl Into<String>) {
        self.turn_servers.lock().await.push((server, username.into(), password.into()));
    }

    /// Same as [`Self::set_stun_server`] but takes a `stun:`/`stuns:` URI
    /// (RFC 7064 §3.1), e.g. `stun:stun1.example.com:19302`.
    pub async fn set_stun_server_url(&self, url: &str) -> Result<()> {
        let server = parse_server_url(url, &["stun", "stuns"])?;
        self.set_stun_server(server).await;
        Ok(())
    }

    /// Same as [`Self::set_turn_server`] but takes a `turn:`/`turns:` URI
    /// (RFC 7065 §3.1), e.g. `turn:turn.example.com:3478?transport=udp`.
    pub async fn set_turn_server_url(
        &self,
        url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<()> {
        let server = parse_server_url(url, &["turn", "turns"])?;
        self.set_turn_server(server, username, password).await;
        Ok(())
    }

    /// Gathers host, server-reflexive and relayed candidates for every
    /// registered base, then marks gathering complete (RFC 8445 §5.1). Also
    /// starts the Ta pacing loop on first call, so connectivity checks begin
    /// as soon as remote candidates are known.
    ///
    /// Host candidates for a base are created first since srflx/relay
    /// gathering needs the base's `conn` already registered; the srflx and
    /// relay probes against every configured server then all run
    /// concurrently, one task per probe, and `gather_candidates` returns
    /// only once every probe has resolved or failed, firing
    /// `GatheringStateChange(Complete)` at that point. `waitgroup` is the
    /// completion-tracking primitive used for this fan-out/fan-in shape.
    pub async fn gather_candidates(self: &Arc<Self>) -> Result<()> {
        {
            let mut ai = self.inner.lock().await;
            ai.gathering_state = GatheringState::Gathering;
            let _ = ai.event_tx.send(AgentEvent::GatheringStateChange(GatheringState::Gathering));
        }

        let bases = self.bases.lock().await.clone_keys_and_bases();
        let stun_servers = self.stun_servers.lock().await.clone();
        let turn_servers = self.turn_servers.lock().await.clone();

        let wg = waitgroup::WaitGroup::new();

        for ((stream_id, component_id), local_bases) in bases {
            agent_gather::gather_host_candidates(&self.inner, stream_id, component_id, &local_bases).await?;

            for base in local_bases {
                let base = Arc::new(base);
                for stun_server in stun_servers.clone() {
                    let worker = wg.worker();
                    let inner = Arc::clone(&self.inner);
                    let base = Arc::clone(&base);
                    tokio::spawn(async move {
                        let _worker = worker;
                        if let Err(err) = agent_gather::gather_server_reflexive(&inner, stream_id, component_id, &base, stun_server).await {
                            log::warn!("srflx gathering against {stun_server} failed: {err}");
                        }
                    });
                }
                for (turn_server, username, password) in turn_servers.clone() {
                    let worker = wg.worker();
                    let inner = Arc::clone(&self.inner);
                    let base = Arc::clone(&base);
                    tokio::spawn(async move {
                        let _worker = worker;
                        if let Err(err) = agent_gather::gather_relay(&inner, stream_id, component_id, &base, turn_server, username, password).await {
                            log::warn!("relay gathering against {turn_server} failed: {err}");
                        }
                    });
                }
            }
        }

        wg.wait().await;
        agent_gather::finish_gathering(&self.inner).await;
        self.ensure_pacing_started().await;
        Ok(())
    }

    async fn ensure_pacing_started(self: &Arc<Self>) {
        let mut handle = self.pacing_handle.lock().await;
        if handle.is_some() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let ta = self.inner.lock().await.config.ta;
        *handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(ta);
            loop {
                interval.tick().await;
                let mut ai = inner.lock().await;
                if ai.closed {
                    break;
                }
                ai.pace_tick().await;
            }
        }));
    }

    /// All currently gathered local candidates for one component, marshaled
    /// for exchange with the remote peer (RFC 8445 §5.5).
    pub async fn get_local_candidates(&self, stream_id: u16, component_id: u16) -> Vec<String> {
        let ai = self.inner.lock().await;
        match ai.streams.get(&stream_id).and_then(|s| s.components.get(&component_id)) {
            Some(component) => component.local_candidates.iter().map(|c| c.marshal()).collect(),
            None => Vec::new(),
        }
    }

    pub async fn get_local_credentials(&self, stream_id: u16) -> Option<(String, String)> {
        let ai = self.inner.lock().await;
        ai.streams.get(&stream_id).map(|s| (s.local_ufrag.clone(), s.local_pwd.clone()))
    }

    pub async fn set_remote_credentials(&self, stream_id: u16, ufrag: String, pwd: String) -> Result<()> {
        let mut ai = self.inner.lock().await;
        let stream = ai.streams.get_mut(&stream_id).ok_or(Error::ErrUnknownStream(stream_id))?;
        stream.remote_ufrag = Some(ufrag);
        stream.remote_pwd = Some(pwd);
        Ok(())
    }

    /// Adds a remote candidate and forms pairs against every known local
    /// candidate on the same component (RFC 8445 §6.1.2). Requires remote
    /// credentials to already be set.
    pub async fn set_remote_candidates(&self, stream_id: u16, component_id: u16, remote: Arc<dyn Candidate + Send + Sync>) -> Result<()> {
        let mut ai = self.inner.lock().await;
        if ai.streams.get(&stream_id).and_then(|s| s.remote_pwd.as_ref()).is_none() {
            return Err(Error::ErrRemoteCredentialsNotSet);
        }
        let is_controlling = ai.is_controlling;
        let stream = ai.streams.get_mut(&stream_id).ok_or(Error::ErrUnknownStream(stream_id))?;
        let component = stream.component_mut(component_id);
        let remote_idx = component.remote_candidates.len();
        let remote_priority = crate::candidate::Candidate::priority(remote.as_ref());
        component.remote_candidates.push(remote);

        let local_count = component.local_candidates.len();
        for local_idx in 0..local_count {
            let local_priority = crate::candidate::Candidate::priority(component.local_candidates[local_idx].as_ref());
            let priority = crate::candidate::candidate_pair::pair_priority_for_role(is_controlling, local_priority, remote_priority);
            let foundation = crate::candidate::candidate_pair::pair_foundation(
                component.local_candidates[local_idx].as_ref(),
                component.remote_candidates[remote_idx].as_ref(),
            );
            component.checklist.push(crate::candidate::candidate_pair::CandidatePair::new(local_idx, remote_idx, priority, foundation));
        }
        agent_internal::rebuild_foundation_waiting(component);
        Ok(())
    }

    /// Sends application data over the component's selected pair.
    pub async fn send(&self, stream_id: u16, component_id: u16, buf: &[u8]) -> Result<usize> {
        agent_transport::send(&self.inner, stream_id, component_id, buf).await
    }

    /// Takes ownership of the agent's inbound application-data stream.
    /// Returns `None` if already attached. Only one reader is supported,
    /// matching `agent_conn_write`'s single-sink design (see DESIGN.md).
    pub async fn attach_recv(&self) -> Option<mpsc::UnboundedReceiver<Vec<u8>>> {
        self.data_rx.lock().await.take()
    }

    pub async fn component_stats(&self, stream_id: u16, component_id: u16) -> Option<ComponentStats> {
        agent_stats::component_stats(&self.inner, stream_id, component_id).await
    }

    /// Tears down the agent: stops the pacing loop and closes every local
    /// candidate.
    pub async fn close(&self) -> Result<()> {
        {
            let mut ai = self.inner.lock().await;
            ai.closed = true;
        }
        if let Some(handle) = self.pacing_handle.lock().await.take() {
            handle.abort();
        }
        let ai = self.inner.lock().await;
        for stream in ai.streams.values() {
            for component in stream.components.values() {
                for c in &component.local_candidates {
                    let _ = c.close().await;
                }
            }
        }
        Ok(())
    }
}

/// Resolves a `stun:`/`turn:` style server URI to a socket address,
/// rejecting any scheme other than those in `allowed_schemes`.
fn parse_server_url(raw: &str, allowed_schemes: &[&str]) -> Result<SocketAddr> {
    let url = url::Url::parse(raw).map_err(|err| Error::ErrMalformed(format!("invalid server url {raw:?}: {err}")))?;
    if !allowed_schemes.contains(&url.scheme()) {
        return Err(Error::ErrMalformed(format!("unsupported server url scheme {:?}", url.scheme())));
    }
    let host = url.host_str().ok_or_else(|| Error::ErrMalformed(format!("server url {raw:?} has no host")))?;
    let port = url.port().unwrap_or(3478);
    (host, port)
        .to_socket_addrs()
        .map_err(|err| Error::ErrMalformed(format!("failed to resolve {host}:{port}: {err}")))?
        .next()
        .ok_or_else(|| Error::ErrMalformed(format!("{host}:{port} resolved to no addresses")))
}

trait CloneKeysAndBases {
    fn clone_keys_and_bases(&self) -> Vec<((u16, u16), Vec<LocalBase>)>;
}

impl CloneKeysAndBases for HashMap<(u16, u16), Vec<LocalBase>> {
    fn clone_keys_and_bases(&self) -> Vec<((u16, u16), Vec<LocalBase>)> {
        self.iter()
            .map(|(k, v)| {
                (
                    *k,
                    v.iter()
                        .map(|b| LocalBase { network: b.network.clone(), address: b.address, conn: Arc::clone(&b.conn) })
                        .collect(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_server_url_rejects_wrong_scheme() {
        let err = parse_server_url("turn:example.com:3478", &["stun", "stuns"]).unwrap_err();
        assert!(matches!(err, Error::ErrMalformed(_)));
    }

    #[test]
    fn test_parse_server_url_resolves_numeric_host() {
        let addr = parse_server_url("stun:203.0.113.1:19302", &["stun", "stuns"]).unwrap();
        assert_eq!(addr, "203.0.113.1:19302".parse().unwrap());
    }

    #[test]
    fn test_parse_server_url_defaults_port_to_3478() {
        let addr = parse_server_url("turn:203.0.113.1", &["turn", "turns"]).unwrap();
        assert_eq!(addr.port(), 3478);
    }

    #[test]
    fn test_parse_server_url_rejects_garbage() {
        assert!(parse_server_url("not a url", &["stun"]).is_err());
    }
}
