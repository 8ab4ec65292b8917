use std::time::Duration;

use crate::stun::compat::CompatibilityProfile;

/// Every ICE/STUN tunable the agent needs, collected as named fields with
/// RFC-recommended defaults — no field is ever read from the environment;
/// the caller builds and passes this in, collecting
/// `network_types`/`urls`/`disconnected_timeout` and the rest in one place.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub compatibility: CompatibilityProfile,

    /// Ta: the ICE pacing interval between outbound connectivity checks
    /// (RFC 8445 §14.2, default 20ms).
    pub ta: Duration,
    /// Initial STUN retransmit timeout (RFC 5389 §7.2.1, default 500ms).
    pub stun_initial_rto: Duration,
    /// Maximum STUN retries before a transaction times out (RFC 5389
    /// §7.2.1, default 7).
    pub stun_max_retries: u32,

    /// Keepalive interval once a component is `ready` (RFC 8445 §11,
    /// default 15s ± 20% jitter).
    pub keepalive_interval: Duration,
    pub keepalive_jitter: f64,
    /// Consecutive missed keepalive windows before a component is
    /// considered disconnected (default 3).
    pub max_missed_keepalives: u32,

    /// Aggressive nomination: controlling side sets USE-CANDIDATE on every
    /// check rather than running the two-phase regular-nomination
    /// procedure (RFC 8445 §8.1.1).
    pub aggressive_nomination: bool,

    /// Size of the STUN agent's transaction slot table (default 50).
    pub max_stun_transactions: usize,

    pub disconnected_timeout: Duration,
    pub failed_timeout: Duration,

    /// Whether to resolve `.local` mDNS remote candidates before pairing
    /// (RFC 8445 §5.1.1.3, privacy-preserving mDNS candidates).
    pub resolve_mdns: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            compatibility: CompatibilityProfile::Rfc5389,
            ta: Duration::from_millis(20),
            stun_initial_rto: Duration::from_millis(500),
            stun_max_retries: 7,
            keepalive_interval: Duration::from_secs(15),
            keepalive_jitter: 0.20,
            max_missed_keepalives: 3,
            aggressive_nomination: false,
            max_stun_transactions: crate::stun::agent::DEFAULT_AGENT_TRANSACTIONS,
            disconnected_timeout: Duration::from_secs(5),
            failed_timeout: Duration::from_secs(25),
            resolve_mdns: true,
        }
    }
}
