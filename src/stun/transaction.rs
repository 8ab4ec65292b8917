use std::time::{Duration, Instant};

/// Result of [`TransactionTimer::refresh`] firing at its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Retransmit,
    Timeout,
}

/// Retransmission schedule for one outstanding STUN transaction (RFC 5389
/// §7.2.1). Two profiles share this struct: unreliable transports double the
/// RTO on every retransmit up to `max_retries`; reliable transports set
/// `max_retries = 0` and rely solely on the final-wait deadline.
#[derive(Debug, Clone)]
pub struct TransactionTimer {
    initial_rto: Duration,
    current_rto: Duration,
    max_retries: u32,
    retries: u32,
    reliable: bool,
    last_fire: Instant,
}

pub const DEFAULT_RTO: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_RETRIES: u32 = 7;
/// Reliable transports still need a bound on how long a response can be
/// outstanding before we give up; libnice uses 7.9s, we keep the same
/// final-wait budget in multiples of the configured RTO.
const RELIABLE_FINAL_WAIT_MULTIPLIER: u32 = 16;

impl TransactionTimer {
    pub fn new(initial_rto: Duration, max_retries: u32, reliable: bool) -> Self {
        TransactionTimer {
            initial_rto,
            current_rto: initial_rto,
            max_retries: if reliable { 0 } else { max_retries },
            retries: 0,
            reliable,
            last_fire: Instant::now(),
        }
    }

    pub fn default_unreliable() -> Self {
        Self::new(DEFAULT_RTO, DEFAULT_MAX_RETRIES, false)
    }

    pub fn default_reliable() -> Self {
        Self::new(DEFAULT_RTO, 0, true)
    }

    /// Milliseconds until the next retransmit/timeout event, for the
    /// embedder's `get_next_clock`-style polling loop.
    pub fn remainder(&self) -> Duration {
        let deadline = if self.reliable {
            self.initial_rto * RELIABLE_FINAL_WAIT_MULTIPLIER
        } else {
            self.current_rto
        };
        let elapsed = self.last_fire.elapsed();
        deadline.saturating_sub(elapsed)
    }

    /// Advances the timer past its deadline: doubles the RTO (unreliable
    /// case) and returns whether the caller should retransmit or give up.
    pub fn refresh(&mut self) -> TimerEvent {
        if self.reliable {
            return TimerEvent::Timeout;
        }
        self.retries += 1;
        self.last_fire = Instant::now();
        if self.retries > self.max_retries {
            TimerEvent::Timeout
        } else {
            self.current_rto *= 2;
            TimerEvent::Retransmit
        }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_unreliable_doubles_rto_then_times_out() {
        let mut t = TransactionTimer::new(Duration::from_millis(100), 2, false);
        assert_eq!(t.refresh(), TimerEvent::Retransmit);
        assert_eq!(t.refresh(), TimerEvent::Retransmit);
        assert_eq!(t.refresh(), TimerEvent::Timeout);
    }

    #[test]
    fn test_reliable_has_no_retransmits() {
        let mut t = TransactionTimer::default_reliable();
        assert_eq!(t.refresh(), TimerEvent::Timeout);
    }
}
