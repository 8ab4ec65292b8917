use std::sync::Arc;

use tokio::sync::Mutex;

use super::agent_internal::AgentInternal;
use crate::error::{Error, Result};

/// Writes `buf` out the component's currently selected pair. Fails with
/// [`Error::ErrNoCandidatePairs`] before a pair has nominated.
pub async fn send(
    agent_internal: &Arc<Mutex<AgentInternal>>,
    stream_id: u16,
    component_id: u16,
    buf: &[u8],
) -> Result<usize> {
    let ai = agent_internal.lock().await;
    let stream = ai.streams.get(&stream_id).ok_or(Error::ErrUnknownStream(stream_id))?;
    let component = stream.components.get(&component_id).ok_or(Error::ErrUnknownComponent(component_id))?;
    let pair_idx = component.selected_pair.ok_or(Error::ErrNoCandidatePairs)?;
    let pair = &component.checklist[pair_idx];
    let local = Arc::clone(&component.local_candidates[pair.local_idx]);
    let remote = Arc::clone(&component.remote_candidates[pair.remote_idx]);
    drop(ai);

    local.write_to(buf, remote.as_ref()).await
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::agent::agent_config::AgentConfig;
    use crate::candidate::candidate_base::CandidateBaseConfig;
    use crate::candidate::candidate_host::{new_candidate_host, CandidateHostConfig};
    use crate::candidate::candidate_pair::CandidatePair;
    use crate::stream::Stream;

    async fn new_test_agent() -> Arc<Mutex<AgentInternal>> {
        let (event_tx, _event_rx) = tokio::sync::broadcast::channel(16);
        let (data_tx, _data_rx) = tokio::sync::mpsc::unbounded_channel();
        Arc::new(Mutex::new(AgentInternal::new(AgentConfig::default(), true, event_tx, data_tx)))
    }

    async fn host(address: &str, port: u16, component: u16) -> crate::candidate::candidate_base::CandidateBase {
        new_candidate_host(CandidateHostConfig {
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
        .unwrap()
    }

    #[tokio::test]
    async fn test_send_on_unknown_stream_errors() {
        let ai = new_test_agent().await;
        let err = send(&ai, 1, 1, b"hello").await.unwrap_err();
        assert_eq!(err, Error::ErrUnknownStream(1));
    }

    #[tokio::test]
    async fn test_send_on_unknown_component_errors() {
        let ai = new_test_agent().await;
        {
            let mut guard = ai.lock().await;
            guard.streams.insert(1, Stream::new(1, "ufrag".into(), "pwd".into()));
        }
        let err = send(&ai, 1, 1, b"hello").await.unwrap_err();
        assert_eq!(err, Error::ErrUnknownComponent(1));
    }

    #[tokio::test]
    async fn test_send_before_nomination_errors() {
        let ai = new_test_agent().await;
        {
            let mut guard = ai.lock().await;
            let mut stream = Stream::new(1, "ufrag".into(), "pwd".into());
            let _ = stream.component_mut(1);
            guard.streams.insert(1, stream);
        }
        let err = send(&ai, 1, 1, b"hello").await.unwrap_err();
        assert_eq!(err, Error::ErrNoCandidatePairs);
    }

    #[tokio::test]
    async fn test_send_over_selected_pair_without_conn_is_noop_ok() {
        let ai = new_test_agent().await;
        let local = Arc::new(host("192.168.1.5", 5000, 1).await);
        let remote = Arc::new(host("203.0.113.9", 6000, 1).await);
        {
            let mut guard = ai.lock().await;
            let mut stream = Stream::new(1, "ufrag".into(), "pwd".into());
            let component = stream.component_mut(1);
            component.local_candidates.push(local);
            component.remote_candidates.push(remote);
            component.checklist.push(CandidatePair::new(0, 0, 1234, "f1".into()));
            component.selected_pair = Some(0);
            guard.streams.insert(1, stream);
        }

        let n = send(&ai, 1, 1, b"hello").await.unwrap();
        assert_eq!(n, 0);
    }
}
