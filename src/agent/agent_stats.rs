use std::sync::Arc;

use tokio::sync::Mutex;

use super::agent_internal::AgentInternal;
use crate::state::{ConnectionState, PairState};

/// Snapshot of one candidate, suitable for diagnostics/marshaling to an
/// application.
#[derive(Debug, Clone)]
pub struct CandidateStats {
    pub id: String,
    pub marshaled: String,
    pub priority: u32,
}

/// Snapshot of one checklist pair.
#[derive(Debug, Clone)]
pub struct PairStats {
    pub local_id: String,
    pub remote_id: String,
    pub priority: u64,
    pub state: PairState,
    pub nominated: bool,
    pub binding_request_count: u32,
}

/// Snapshot of one component: its candidates, checklist and connection
/// state, all copied out from under the agent lock so the caller can hold
/// onto it after the lock is released.
#[derive(Debug, Clone)]
pub struct ComponentStats {
    pub component_id: u16,
    pub state: ConnectionState,
    pub local_candidates: Vec<CandidateStats>,
    pub remote_candidates: Vec<CandidateStats>,
    pub pairs: Vec<PairStats>,
    pub selected_pair: Option<usize>,
}

pub async fn component_stats(agent_internal: &Arc<Mutex<AgentInternal>>, stream_id: u16, component_id: u16) -> Option<ComponentStats> {
    let ai = agent_internal.lock().await;
    let stream = ai.streams.get(&stream_id)?;
    let component = stream.components.get(&component_id)?;

    let local_candidates = component
        .local_candidates
        .iter()
        .map(|c| CandidateStats { id: c.id(), marshaled: c.marshal(), priority: c.priority() })
        .collect();
    let remote_candidates = component
        .remote_candidates
        .iter()
        .map(|c| CandidateStats { id: c.id(), marshaled: c.marshal(), priority: c.priority() })
        .collect();
    let pairs = component
        .checklist
        .iter()
        .map(|p| PairStats {
            local_id: component.local_candidates[p.local_idx].id(),
            remote_id: component.remote_candidates[p.remote_idx].id(),
            priority: p.priority,
            state: p.state,
            nominated: p.nominated,
            binding_request_count: p.binding_request_count,
        })
        .collect();

    Some(ComponentStats {
        component_id,
        state: component.state,
        local_candidates,
        remote_candidates,
        pairs,
        selected_pair: component.selected_pair,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::agent::agent_config::AgentConfig;
    use crate::agent::agent_internal::AgentInternal;
    use crate::candidate::candidate_base::CandidateBaseConfig;
    use crate::candidate::candidate_host::{new_candidate_host, CandidateHostConfig};
    use crate::candidate::candidate_pair::CandidatePair;
    use crate::candidate::Candidate;
    use crate::stream::Stream;

    async fn new_test_agent() -> Arc<Mutex<AgentInternal>> {
        let (event_tx, _event_rx) = tokio::sync::broadcast::channel(16);
        let (data_tx, _data_rx) = tokio::sync::mpsc::unbounded_channel();
        Arc::new(Mutex::new(AgentInternal::new(AgentConfig::default(), true, event_tx, data_tx)))
    }

    async fn host(address: &str, port: u16, component: u16) -> Arc<dyn crate::candidate::Candidate + Send + Sync> {
        let c = new_candidate_host(CandidateHostConfig {
            base_config: CandidateBaseConfig {
                network: "udp".into(),
                address: address.into(),
                port,
                component,
                ..Default::default()
            },
            tcp_type: Default::default(),
        })
        .await
        .unwrap();
        Arc::new(c)
    }

    #[tokio::test]
    async fn test_component_stats_unknown_stream_is_none() {
        let ai = new_test_agent().await;
        assert!(component_stats(&ai, 1, 1).await.is_none());
    }

    #[tokio::test]
    async fn test_component_stats_unknown_component_is_none() {
        let ai = new_test_agent().await;
        {
            let mut guard = ai.lock().await;
            guard.streams.insert(1, Stream::new(1, "ufrag".into(), "pwd".into()));
        }
        assert!(component_stats(&ai, 1, 1).await.is_none());
    }

    #[tokio::test]
    async fn test_component_stats_reflects_candidates_and_pairs() {
        let ai = new_test_agent().await;
        let local = host("192.168.1.5", 5000, 1).await;
        let remote = host("203.0.113.9", 6000, 1).await;
        {
            let mut guard = ai.lock().await;
            let mut stream = Stream::new(1, "ufrag".into(), "pwd".into());
            let component = stream.component_mut(1);
            component.local_candidates.push(local.clone());
            component.remote_candidates.push(remote.clone());
            let mut pair = CandidatePair::new(0, 0, 1234, "f1".into());
            pair.nominated = true;
            component.checklist.push(pair);
            component.selected_pair = Some(0);
            guard.streams.insert(1, stream);
        }

        let stats = component_stats(&ai, 1, 1).await.expect("component exists");
        assert_eq!(stats.component_id, 1);
        assert_eq!(stats.local_candidates.len(), 1);
        assert_eq!(stats.remote_candidates.len(), 1);
        assert_eq!(stats.local_candidates[0].id, local.id());
        assert_eq!(stats.pairs.len(), 1);
        assert!(stats.pairs[0].nominated);
        assert_eq!(stats.selected_pair, Some(0));
    }
}
