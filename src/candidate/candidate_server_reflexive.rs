use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, AtomicU8};

use tokio::sync::Mutex;

use super::candidate_base::CandidateBaseConfig;
use super::{CandidateBase, CandidateRelatedAddress, CandidateType, TcpType};
use crate::error::Result;
use crate::network_type::determine_network_type;
use crate::rand::generate_cand_id;

#[derive(Default)]
pub struct CandidateServerReflexiveConfig {
    pub base_config: CandidateBaseConfig,
    pub rel_addr: String,
    pub rel_port: u16,
}

/// A server-reflexive candidate learned from a STUN Binding response during
/// gathering (RFC 8445 §5.1.1.2). `base_config.address`/`port` carry the
/// mapped address; `rel_addr`/`rel_port` are the local base it was
/// discovered from.
pub async fn new_candidate_server_reflexive(
    config: CandidateServerReflexiveConfig,
) -> Result<CandidateBase> {
    let ip: IpAddr = config
        .base_config
        .address
        .parse()
        .map_err(|_| crate::error::Error::new(format!("invalid srflx address {}", config.base_config.address)))?;
    let network_type = determine_network_type(&config.base_config.network, &ip)?;

    let rel_ip: IpAddr = config
        .rel_addr
        .parse()
        .map_err(|_| crate::error::Error::new(format!("invalid related address {}", config.rel_addr)))?;

    let candidate_id = if config.base_config.candidate_id.is_empty() {
        generate_cand_id()
    } else {
        config.base_config.candidate_id.clone()
    };

    let c = CandidateBase {
        id: candidate_id,
        network_type: AtomicU8::new(network_type as u8),
        candidate_type: CandidateType::ServerReflexive,
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
        ..Default::default()
    };
    Ok(c)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::candidate::Candidate;

    #[tokio::test]
    async fn test_new_candidate_server_reflexive() {
        let config = CandidateServerReflexiveConfig {
            base_config: CandidateBaseConfig {
                network: "udp".into(),
                address: "203.0.113.1".into(),
                port: 54321,
                component: 1,
                ..Default::default()
            },
            rel_addr: "192.168.0.2".into(),
            rel_port: 12345,
        };
        let c = new_candidate_server_reflexive(config).await.unwrap();
        assert_eq!(c.candidate_type, CandidateType::ServerReflexive);
        assert!(Candidate::related_address(&c).is_some());
    }
}
