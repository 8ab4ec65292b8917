use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, AtomicU8};
use std::sync::Arc;

use tokio::sync::Mutex;

use super::candidate_base::CandidateBaseConfig;
use super::{CandidateBase, CandidateRelatedAddress, CandidateType, TcpType};
use crate::error::Result;
use crate::network_type::determine_network_type;
use crate::rand::generate_cand_id;
use crate::turn::TurnAllocation;

#[derive(Default)]
pub struct CandidateRelayConfig {
    pub base_config: CandidateBaseConfig,
    pub rel_addr: String,
    pub rel_port: u16,
    pub relay_client: Option<Arc<Mutex<TurnAllocation>>>,
}

/// A relayed candidate owned by a [`TurnAllocation`] (RFC 8445 §5.1.1.2).
/// Its `address`/`port` are the relayed transport address XOR-RELAYED-ADDRESS
/// carried; `rel_addr`/`rel_port` are the TURN server's own address, which
/// is what the foundation and priority-preference terms are keyed on.
pub async fn new_candidate_relay(config: CandidateRelayConfig) -> Result<CandidateBase> {
    let ip: IpAddr = config
        .base_config
        .address
        .parse()
        .map_err(|_| crate::error::Error::new(format!("invalid relay address {}", config.base_config.address)))?;
    let network_type = determine_network_type(&config.base_config.network, &ip)?;

    let rel_ip: IpAddr = config
        .rel_addr
        .parse()
        .map_err(|_| crate::error::Error::new(format!("invalid turn server address {}", config.rel_addr)))?;

    let candidate_id = if config.base_config.candidate_id.is_empty() {
        generate_cand_id()
    } else {
        config.base_config.candidate_id.clone()
    };

    let c = CandidateBase {
        id: candidate_id,
        network_type: AtomicU8::new(network_type as u8),
        candidate_type: CandidateType::Relay,
        component: AtomicU16::new(config.base_config.component),
        address: config.base_config.address.clone(),
        port: config.base_config.port,
        related_address: Some(CandidateRelatedAddress {
            address: rel_ip,
            port: config.rel_port,
        }),
        tcp_type: TcpType::Unspecified,
        resolved_addr: Mutex::new(std::net::SocketAddr::new(ip, config.base_config.port)),
        conn: config.base_config.conn.clone(),
        foundation_override: config.base_config.foundation.clone(),
        priority_override: config.base_config.priority,
        network: config.base_config.network.clone(),
        turn_allocation: config.relay_client,
        ..Default::default()
    };
    Ok(c)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::candidate::Candidate;

    #[tokio::test]
    async fn test_new_candidate_relay() {
        let config = CandidateRelayConfig {
            base_config: CandidateBaseConfig {
                network: "udp".into(),
                address: "203.0.113.9".into(),
                port: 44000,
                component: 1,
                ..Default::default()
            },
            rel_addr: "192.0.2.15".into(),
            rel_port: 3478,
            relay_client: None,
        };
        let c = new_candidate_relay(config).await.unwrap();
        assert_eq!(c.candidate_type, CandidateType::Relay);
        assert_eq!(Candidate::priority(&c) >> 24, 20);
    }
}
