use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, AtomicU8};
use std::sync::Arc;

use tokio::sync::Mutex;

use super::candidate_base::CandidateBaseConfig;
use super::{Candidate, CandidateBase, CandidateType, TcpType};
use crate::error::Result;
use crate::network_type::determine_network_type;
use crate::rand::generate_cand_id;

#[derive(Default)]
pub struct CandidateHostConfig {
    pub base_config: CandidateBaseConfig,
    pub tcp_type: TcpType,
}

/// One host candidate per local interface IP, per component (RFC 8445
/// §5.1.1.1). The cheapest candidate kind: its base address and its mapped
/// address are the same thing.
pub async fn new_candidate_host(config: CandidateHostConfig) -> Result<CandidateBase> {
    let ip: IpAddr = config
        .base_config
        .address
        .parse()
        .map_err(|_| crate::error::Error::new(format!("invalid host address {}", config.base_config.address)))?;
    let network_type = determine_network_type(&config.base_config.network, &ip)?;

    let candidate_id = if config.base_config.candidate_id.is_empty() {
        generate_cand_id()
    } else {
        config.base_config.candidate_id.clone()
    };

    let c = CandidateBase {
        id: candidate_id,
        network_type: AtomicU8::new(network_type as u8),
        candidate_type: CandidateType::Host,
        component: AtomicU16::new(config.base_config.component),
        address: config.base_config.address.clone(),
        port: config.base_config.port,
        related_address: None,
        tcp_type: config.tcp_type,
        resolved_addr: Mutex::new(std::net::SocketAddr::new(ip, config.base_config.port)),
        conn: config.base_config.conn.clone(),
        foundation_override: config.base_config.foundation.clone(),
        priority_override: config.base_config.priority,
        network: config.base_config.network.clone(),
        ..Default::default()
    };
    Ok(c)
}

#[allow(dead_code)]
fn assert_candidate(_: &dyn Candidate) {}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_new_candidate_host() {
        let config = CandidateHostConfig {
            base_config: CandidateBaseConfig {
                network: "udp".into(),
                address: "127.0.0.1".into(),
                port: 12345,
                component: 1,
                ..Default::default()
            },
            tcp_type: TcpType::Unspecified,
        };
        let c = new_candidate_host(config).await.unwrap();
        assert_eq!(c.candidate_type, CandidateType::Host);
        assert_eq!(c.port, 12345);
        assert_eq!(Candidate::priority(&c), 2_130_706_431);
    }
}
