use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Transport a relayed candidate's TURN allocation runs over (RFC 5766 §2).
/// Only UDP is actually driven end to end by the conncheck engine; TCP/TLS
/// are modeled so the compatibility shim in [`super::compat`] has somewhere
/// to route their codepoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayKind {
    Udp,
    Tcp,
    Tls,
}

/// State owned by a relayed candidate once its Allocate request succeeds.
#[derive(Debug, Clone)]
pub struct TurnAllocation {
    pub server: SocketAddr,
    pub username: String,
    /// Raw password exactly as configured by the caller.
    pub password: String,
    /// Base64-decoded form of `password` (TURN REST API / coturn deliver
    /// time-limited credentials this way). Falls back to `password`'s raw
    /// UTF-8 bytes when it isn't valid base64, so a plain static password
    /// still works.
    pub password_decoded: Vec<u8>,
    pub realm: String,
    pub nonce: String,
    pub relay_kind: RelayKind,
    /// The address the TURN server will relay to peers: advertised as the
    /// relayed candidate's mapped address.
    pub relayed_address: Option<SocketAddr>,
    /// A free server-reflexive mapping the Allocate response also carries.
    pub mapped_address: Option<SocketAddr>,
    pub lifetime: Duration,
    allocated_at: Option<Instant>,
}

impl TurnAllocation {
    pub fn new(server: SocketAddr, username: String, password: String, relay_kind: RelayKind) -> Self {
        let password_decoded = base64::decode(&password).unwrap_or_else(|_| password.as_bytes().to_vec());
        TurnAllocation {
            server,
            username,
            password,
            password_decoded,
            realm: String::new(),
            nonce: String::new(),
            relay_kind,
            relayed_address: None,
            mapped_address: None,
            lifetime: Duration::from_secs(600),
            allocated_at: None,
        }
    }

    /// Priority tag used to rank this allocation's candidate against other
    /// relayed candidates when computing ICE candidate priority (RFC 8445
    /// §5.1.2.1).
    pub fn preference(&self) -> u16 {
        match self.relay_kind {
            RelayKind::Udp => 2,
            RelayKind::Tcp => 1,
            RelayKind::Tls => 0,
        }
    }

    pub fn mark_allocated(&mut self, relayed: SocketAddr, mapped: Option<SocketAddr>, lifetime: Duration) {
        self.relayed_address = Some(relayed);
        self.mapped_address = mapped;
        self.lifetime = lifetime;
        self.allocated_at = Some(Instant::now());
    }

    pub fn expires_in(&self) -> Option<Duration> {
        let allocated_at = self.allocated_at?;
        Some(self.lifetime.saturating_sub(allocated_at.elapsed()))
    }

    pub fn needs_refresh(&self) -> bool {
        match self.expires_in() {
            Some(remaining) => remaining < self.lifetime / 4,
            None => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn allocation(kind: RelayKind) -> TurnAllocation {
        TurnAllocation::new("203.0.113.1:3478".parse().unwrap(), "user".into(), "pass".into(), kind)
    }

    #[test]
    fn test_preference_ranks_udp_over_tcp_over_tls() {
        assert!(allocation(RelayKind::Udp).preference() > allocation(RelayKind::Tcp).preference());
        assert!(allocation(RelayKind::Tcp).preference() > allocation(RelayKind::Tls).preference());
    }

    #[test]
    fn test_needs_refresh_before_allocation_is_false() {
        assert!(!allocation(RelayKind::Udp).needs_refresh());
    }

    #[test]
    fn test_mark_allocated_sets_relayed_and_mapped_addresses() {
        let mut a = allocation(RelayKind::Udp);
        let relayed: SocketAddr = "203.0.113.1:51000".parse().unwrap();
        let mapped: SocketAddr = "198.51.100.2:4000".parse().unwrap();
        a.mark_allocated(relayed, Some(mapped), Duration::from_secs(600));
        assert_eq!(a.relayed_address, Some(relayed));
        assert_eq!(a.mapped_address, Some(mapped));
        assert!(!a.needs_refresh());
    }

    #[test]
    fn test_needs_refresh_once_past_three_quarters_of_lifetime() {
        let mut a = allocation(RelayKind::Udp);
        a.mark_allocated("203.0.113.1:51000".parse().unwrap(), None, Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(20));
        assert!(a.needs_refresh());
    }

    #[test]
    fn test_password_decoded_base64_when_valid() {
        let encoded = base64::encode("hunter2");
        let a = TurnAllocation::new("203.0.113.1:3478".parse().unwrap(), "user".into(), encoded, RelayKind::Udp);
        assert_eq!(a.password_decoded, b"hunter2");
    }

    #[test]
    fn test_password_decoded_falls_back_to_raw_bytes_when_not_base64() {
        // '!' and '-' fall outside the base64 alphabet, so this must fall
        // back to the password's raw UTF-8 bytes rather than decode.
        let a = TurnAllocation::new("203.0.113.1:3478".parse().unwrap(), "user".into(), "not-b64!".into(), RelayKind::Udp);
        assert_eq!(a.password_decoded, b"not-b64!");
    }
}
