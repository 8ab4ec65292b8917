use std::time::Instant;

use super::Candidate;
use crate::state::PairState;
use crate::stun::header::TransactionId;
use crate::stun::transaction::TransactionTimer;

/// (local, remote) candidate pair on a component's checklist (RFC 8445
/// §6.1.2). Candidates are referenced by index into the component's
/// local/remote candidate lists rather than by pointer — `local_idx`/
/// `remote_idx` index into
/// `Component::local_candidates`/`Component::remote_candidates`.
pub struct CandidatePair {
    pub local_idx: usize,
    pub remote_idx: usize,
    pub priority: u64,
    pub foundation: String,
    pub nominated: bool,
    pub state: PairState,
    pub binding_request_count: u32,
    pub transaction_id: Option<TransactionId>,
    pub timer: Option<TransactionTimer>,
    pub last_check_sent: Option<Instant>,
    /// Set when the outstanding check on this pair carried USE-CANDIDATE, so
    /// the matching response knows to nominate on success (RFC 8445
    /// §8.1.1).
    pub use_candidate_sent: bool,
    /// Encoded bytes of the last Binding request sent for this pair's
    /// outstanding check, kept so a retransmit (RFC 5389 §7.2.1) resends
    /// the identical message rather than building a new one with a
    /// different transaction id.
    pub last_request: Option<Vec<u8>>,
}

impl CandidatePair {
    pub fn new(local_idx: usize, remote_idx: usize, priority: u64, foundation: String) -> Self {
        CandidatePair {
            local_idx,
            remote_idx,
            priority,
            foundation,
            nominated: false,
            state: PairState::Frozen,
            binding_request_count: 0,
            transaction_id: None,
            timer: None,
            last_check_sent: None,
            use_candidate_sent: false,
            last_request: None,
        }
    }
}

/// `(2^32 · min(G,D)) + 2 · max(G,D) + (G > D ? 1 : 0)` (RFC 8445 §6.1.2.3).
/// `controlling_priority` is the controlling side's candidate priority
/// (`G`); `controlled_priority` is the controlled side's (`D`). Monotone in
/// both inputs and not symmetric under a role swap except at a tie.
pub fn pair_priority(controlling_priority: u32, controlled_priority: u32) -> u64 {
    let g = controlling_priority as u64;
    let d = controlled_priority as u64;
    let min = g.min(d);
    let max = g.max(d);
    let extra = if g > d { 1 } else { 0 };
    (1u64 << 32) * min + 2 * max + extra
}

/// Computes `pair_priority` from the local agent's role: when we are
/// controlling, our candidate's priority plays `G`; when controlled, the
/// remote candidate's priority plays `G`.
pub fn pair_priority_for_role(is_controlling: bool, local_priority: u32, remote_priority: u32) -> u64 {
    if is_controlling {
        pair_priority(local_priority, remote_priority)
    } else {
        pair_priority(remote_priority, local_priority)
    }
}

/// Foundation of a pair is the concatenation of its endpoints' foundations
/// (RFC 8445 §6.1.2.6).
pub fn pair_foundation(local: &dyn Candidate, remote: &dyn Candidate) -> String {
    format!("{}:{}", local.foundation(), remote.foundation())
}

#[allow(dead_code)]
fn assert_send_sync<T: Send + Sync>() {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_pair_priority_formula() {
        let g = 2_130_706_431u32;
        let d = 1_694_498_815u32;
        let got = pair_priority(g, d);
        let min = d as u64;
        let max = g as u64;
        let expected = (1u64 << 32) * min + 2 * max + 1;
        assert_eq!(got, expected);
    }

    #[test]
    fn test_pair_priority_role_dependent() {
        let a = 100u32;
        let b = 200u32;
        let controlling = pair_priority_for_role(true, a, b);
        let controlled = pair_priority_for_role(false, a, b);
        assert_ne!(controlling, controlled);
    }

    #[test]
    fn test_pair_priority_monotone() {
        let base = pair_priority(100, 100);
        let higher_g = pair_priority(200, 100);
        let higher_d = pair_priority(100, 200);
        assert!(higher_g > base);
        assert!(higher_d > base);
    }

    #[test]
    fn test_pair_priority_tie_symmetric() {
        let a = pair_priority_for_role(true, 500, 500);
        let b = pair_priority_for_role(false, 500, 500);
        assert_eq!(a, b);
    }
}
