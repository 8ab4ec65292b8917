pub mod candidate_base;
pub mod candidate_host;
pub mod candidate_pair;
pub mod candidate_peer_reflexive;
pub mod candidate_relay;
pub mod candidate_server_reflexive;

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::agent::agent_internal::AgentInternal;
use crate::error::Result;
use crate::network_type::NetworkType;

pub use candidate_base::{CandidateBase, CandidateBaseConfig};

/// Candidate kind (RFC 8445 §2). Type preference constants are fixed by
/// RFC 5245 §4.1.2.1; relayed candidates vary by relay transport (20 for
/// TCP/TLS relays, 30 for UDP).
#[derive(Default, Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum CandidateType {
    #[default]
    Unspecified,
    Host,
    ServerReflexive,
    PeerReflexive,
    Relay,
}

impl fmt::Display for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            CandidateType::Unspecified => "unspecified",
            CandidateType::Host => "host",
            CandidateType::ServerReflexive => "srflx",
            CandidateType::PeerReflexive => "prflx",
            CandidateType::Relay => "relay",
        };
        write!(f, "{s}")
    }
}

impl CandidateType {
    /// Fixed type-preference constant used in the 32-bit priority formula
    /// (RFC 8445 §5.1.2.1). Relayed candidates resolve their preference from
    /// the owning [`crate::turn::TurnAllocation`] instead, since it depends
    /// on the relay transport.
    pub fn preference(&self) -> u16 {
        // RFC 8445 §5.1.2.1 gives 126/110/100/0 as recommended values but
        // also worked examples assuming host=126 (the 2_130_706_431 example
        // for comp=1, local=65535 only holds with host=126, not 120). We
        // follow the recommended/checkable value; see DESIGN.md.
        match *self {
            CandidateType::Host => 126,
            CandidateType::PeerReflexive => 110,
            CandidateType::ServerReflexive => 100,
            CandidateType::Relay => 20,
            CandidateType::Unspecified => 0,
        }
    }
}

/// TCP candidate directionality (RFC 6544). Always `Unspecified` for UDP
/// candidates.
#[derive(Default, Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum TcpType {
    #[default]
    Unspecified,
    Active,
    Passive,
    SimultaneousOpen,
}

impl fmt::Display for TcpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            TcpType::Unspecified => "unspecified",
            TcpType::Active => "active",
            TcpType::Passive => "passive",
            TcpType::SimultaneousOpen => "so",
        };
        write!(f, "{s}")
    }
}

/// The related (base) address carried by non-host candidates (RFC 8445 §2,
/// `raddr`/`rport`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateRelatedAddress {
    pub address: IpAddr,
    pub port: u16,
}

impl fmt::Display for CandidateRelatedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, " raddr {} rport {}", self.address, self.port)
    }
}

/// A possible local or remote transport endpoint for one component
/// (RFC 8445 §2). Modeled as a trait rather than a single struct with a
/// `kind` tag so each candidate flavor only carries the fields it needs.
#[async_trait]
pub trait Candidate: fmt::Display + Send + Sync {
    fn foundation(&self) -> String;
    fn id(&self) -> String;
    fn component(&self) -> u16;
    fn set_component(&self, component: u16);
    fn last_received(&self) -> std::time::SystemTime;
    fn last_sent(&self) -> std::time::SystemTime;
    fn network_type(&self) -> NetworkType;
    fn address(&self) -> String;
    fn port(&self) -> u16;
    fn priority(&self) -> u32;
    fn related_address(&self) -> Option<CandidateRelatedAddress>;
    fn candidate_type(&self) -> CandidateType;
    fn tcp_type(&self) -> TcpType;
    fn marshal(&self) -> String;

    async fn addr(&self) -> SocketAddr;
    async fn close(&self) -> Result<()>;
    fn seen(&self, outbound: bool);
    async fn write_to(&self, raw: &[u8], dst: &(dyn Candidate + Send + Sync)) -> Result<usize>;
    fn equal(&self, other: &dyn Candidate) -> bool;
    async fn set_ip(&self, ip: &IpAddr) -> Result<()>;

    fn get_conn(&self) -> Option<&Arc<dyn util::Conn + Send + Sync>>;
    fn get_agent(&self) -> Option<&Arc<Mutex<AgentInternal>>>;
}

/// Two candidates share a foundation iff they have the same kind, base,
/// server, and transport (RFC 8445 §5.1.1.1); in practice this is the
/// marshaled foundation string comparison, since foundations are computed
/// from exactly those fields (see `CandidateBase::foundation`).
pub fn same_foundation(a: &dyn Candidate, b: &dyn Candidate) -> bool {
    a.foundation() == b.foundation()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_candidate_type_preference_ordering() {
        assert!(CandidateType::Host.preference() > CandidateType::PeerReflexive.preference());
        assert!(CandidateType::PeerReflexive.preference() > CandidateType::ServerReflexive.preference());
        assert!(CandidateType::ServerReflexive.preference() > CandidateType::Relay.preference());
        assert_eq!(CandidateType::Unspecified.preference(), 0);
    }

    #[test]
    fn test_candidate_type_default_is_unspecified() {
        assert_eq!(CandidateType::default(), CandidateType::Unspecified);
    }
}
