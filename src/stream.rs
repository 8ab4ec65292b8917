use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::candidate::candidate_pair::CandidatePair;
use crate::candidate::Candidate;
use crate::state::ConnectionState;

/// One RTP/RTCP-style component within a stream (RFC 8445 §2). Candidates
/// are owned here and referenced elsewhere by index; `checklist` pairs
/// index into `local_candidates`/`remote_candidates`.
pub struct Component {
    pub id: u16,
    pub local_candidates: Vec<Arc<dyn Candidate + Send + Sync>>,
    pub remote_candidates: Vec<Arc<dyn Candidate + Send + Sync>>,
    pub checklist: Vec<CandidatePair>,
    pub selected_pair: Option<usize>,
    pub state: ConnectionState,
    pub missed_keepalives: u32,
    /// Deadline for this component's next STUN Binding-indication keepalive
    /// once `selected_pair` is set, jittered per RFC 8445 §11 (default
    /// 15s ± 20%). `None` until a pair is first nominated.
    pub next_keepalive_at: Option<Instant>,
}

impl Component {
    pub fn new(id: u16) -> Self {
        Component {
            id,
            local_candidates: Vec::new(),
            remote_candidates: Vec::new(),
            checklist: Vec::new(),
            selected_pair: None,
            state: ConnectionState::New,
            missed_keepalives: 0,
            next_keepalive_at: None,
        }
    }

    pub fn find_local_by_addr(&self, addr: std::net::SocketAddr) -> Option<usize> {
        self.local_candidates
            .iter()
            .position(|c| c.port() == addr.port() && c.address().parse::<std::net::IpAddr>() == Ok(addr.ip()))
    }

    pub fn find_remote_by_addr(&self, addr: std::net::SocketAddr) -> Option<usize> {
        self.remote_candidates
            .iter()
            .position(|c| c.port() == addr.port() && c.address().parse::<std::net::IpAddr>() == Ok(addr.ip()))
    }
}

/// A group of components sharing one ICE ufrag/pwd pair (RFC 8445 §2).
/// Most callers run a single stream with one or two components (RTP,
/// optionally RTCP), but the model does not assume that.
pub struct Stream {
    pub id: u16,
    pub local_ufrag: String,
    pub local_pwd: String,
    pub remote_ufrag: Option<String>,
    pub remote_pwd: Option<String>,
    pub components: HashMap<u16, Component>,
}

impl Stream {
    pub fn new(id: u16, local_ufrag: String, local_pwd: String) -> Self {
        Stream {
            id,
            local_ufrag,
            local_pwd,
            remote_ufrag: None,
            remote_pwd: None,
            components: HashMap::new(),
        }
    }

    pub fn component_mut(&mut self, id: u16) -> &mut Component {
        self.components.entry(id).or_insert_with(|| Component::new(id))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::candidate::candidate_base::CandidateBaseConfig;
    use crate::candidate::candidate_host::{new_candidate_host, CandidateHostConfig};

    async fn host(address: &str, port: u16) -> Arc<dyn Candidate + Send + Sync> {
        let c = new_candidate_host(CandidateHostConfig {
            base_config: CandidateBaseConfig {
                network: "udp".into(),
                address: address.into(),
                port,
                component: 1,
                ..Default::default()
            },
            tcp_type: Default::default(),
        })
        .await
        .unwrap();
        Arc::new(c)
    }

    #[tokio::test]
    async fn test_find_local_by_addr_matches_ip_and_port() {
        let mut component = Component::new(1);
        component.local_candidates.push(host("192.168.1.5", 5000).await);
        component.local_candidates.push(host("192.168.1.6", 5001).await);

        let found = component.find_local_by_addr("192.168.1.6:5001".parse().unwrap());
        assert_eq!(found, Some(1));
    }

    #[tokio::test]
    async fn test_find_local_by_addr_misses_unknown_address() {
        let mut component = Component::new(1);
        component.local_candidates.push(host("192.168.1.5", 5000).await);

        assert_eq!(component.find_local_by_addr("10.0.0.1:9999".parse().unwrap()), None);
    }

    #[tokio::test]
    async fn test_find_remote_by_addr_matches_ip_and_port() {
        let mut component = Component::new(1);
        component.remote_candidates.push(host("203.0.113.9", 6000).await);

        assert_eq!(component.find_remote_by_addr("203.0.113.9:6000".parse().unwrap()), Some(0));
    }

    #[test]
    fn test_component_mut_inserts_on_first_access() {
        let mut stream = Stream::new(1, "ufrag".into(), "pwd".into());
        assert!(stream.components.is_empty());
        let _ = stream.component_mut(7);
        assert!(stream.components.contains_key(&7));
    }
}
