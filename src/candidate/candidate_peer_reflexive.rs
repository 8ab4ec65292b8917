use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, AtomicU8};

use tokio::sync::Mutex;

use super::candidate_base::CandidateBaseConfig;
use super::{CandidateBase, CandidateRelatedAddress, CandidateType, TcpType};
use crate::error::Result;
use crate::network_type::determine_network_type;
use crate::rand::generate_cand_id;

#[derive(Default)]
pub struct CandidatePeerReflexiveConfig {
    pub base_config: CandidateBaseConfig,
    pub rel_addr: String,
    pub rel_port: u16,
}

/// A peer-reflexive candidate synthesized either from a STUN response's
/// mapped address not matching a known local candidate, or from an
/// unrecognized incoming check's source address (RFC 8445 §7.2.5.3.1,
/// §7.3.1.3). Its foundation is derived purely from the mapped address,
/// not from a base/server pair, since none is known.
pub async fn new_candidate_peer_reflexive(
    config: CandidatePeerReflexiveConfig,
) -> Result<CandidateBase> {
    let ip: IpAddr = config
        .base_config
        .address
        .parse()
        .map_err(|_| crate::error::Error::new(format!("invalid prflx address {}", config.base_config.address)))?;
    let network_type = determine_network_type(&config.base_config.network, &ip)?;

    let related_address = if config.rel_addr.is_empty() {
        None
    } else {
        Some(CandidateRelatedAddress {
            address: config
                .rel_addr
                .parse()
                .map_err(|_| crate::error::Error::new(format!("invalid related address {}", config.rel_addr)))?,
            port: config.rel_port,
        })
    };

    let candidate_id = if config.base_config.candidate_id.is_empty() {
        generate_cand_id()
    } else {
        config.base_config.candidate_id.clone()
    };

    let c = CandidateBase {
        id: candidate_id,
        network_type: AtomicU8::new(network_type as u8),
        candidate_type: CandidateType::PeerReflexive,
        component: AtomicU16::new(config.base_config.component),
        address: config.base_config.address.clone(),
        port: config.base_config.port,
        related_address,
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

    #[tokio::test]
    async fn test_new_candidate_peer_reflexive() {
        let config = CandidatePeerReflexiveConfig {
            base_config: CandidateBaseConfig {
                network: "udp".into(),
                address: "198.51.100.7".into(),
                port: 9000,
                component: 1,
                priority: 1_694_498_815,
                ..Default::default()
            },
            rel_addr: String::new(),
            rel_port: 0,
        };
        let c = new_candidate_peer_reflexive(config).await.unwrap();
        assert_eq!(c.candidate_type, CandidateType::PeerReflexive);
        assert_eq!(c.priority_override, 1_694_498_815);
    }
}
