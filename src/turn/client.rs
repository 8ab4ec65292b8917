use std::net::SocketAddr;
use std::time::Duration;

use super::allocation::TurnAllocation;
use crate::error::{Error, Result};
use crate::stun::attributes::address::{MappedAddress, XorPeerAddress, XorRelayedAddress};
use crate::stun::attributes::control::{IceControlled, IceControlling};
use crate::stun::attributes::textattrs::{ErrorCodeAttribute, Nonce, Realm, Username};
use crate::stun::attributes::turn::{
    ChannelNumber, DontFragment, EvenPort, Lifetime, RequestedTransport, PROTO_UDP,
};
use crate::stun::agent::StunAgent;
use crate::stun::header::{Class, Method};
use crate::stun::integrity::long_term_key;
use crate::stun::message::{Getter, Message, Setter};

/// EVEN-PORT request options (RFC 5766 §14.6): whether to ask the server
/// for an even port, and whether to also reserve the next one.
#[derive(Debug, Clone, Copy, Default)]
pub struct PortProps {
    pub even: bool,
    pub reserve_next: bool,
}

fn long_term_setters<'a>(
    allocation: &'a TurnAllocation,
    key: &'a [u8],
) -> (Username, Realm, Nonce) {
    let _ = key;
    (
        Username(allocation.username.clone()),
        Realm(allocation.realm.clone()),
        Nonce(allocation.nonce.clone()),
    )
}

/// Builds an Allocate request. Before the first 401 challenge, `realm`/`nonce`
/// on `allocation` are empty and the request carries no credentials; the
/// caller resubmits with the echoed REALM/NONCE once challenged (RFC 5766
/// §6.2, long-term credential mechanism).
pub fn create_allocate(
    agent: &mut StunAgent,
    allocation: &TurnAllocation,
    port_props: Option<PortProps>,
) -> Result<Message> {
    let mut setters: Vec<&dyn Setter> = vec![&RequestedTransport(PROTO_UDP)];
    let even_port;
    let dont_frag = DontFragment;
    if let Some(props) = port_props {
        even_port = EvenPort { reserve_next: props.reserve_next };
        if props.even {
            setters.push(&even_port);
        }
    }
    setters.push(&dont_frag);

    let (username, realm, nonce) = long_term_setters(allocation, &[]);
    let challenged = !allocation.realm.is_empty();
    if challenged {
        setters.push(&username);
        setters.push(&realm);
        setters.push(&nonce);
    }

    let mut m = agent.init_request(Method::Allocate, &setters)?;
    let key = if challenged {
        long_term_key(&allocation.username, &allocation.realm, &allocation.password)
    } else {
        Vec::new()
    };
    agent.finish_message(&mut m, &key)?;
    Ok(m)
}

pub fn create_refresh(
    agent: &mut StunAgent,
    allocation: &TurnAllocation,
    lifetime: Duration,
) -> Result<Message> {
    let lifetime_attr = Lifetime(lifetime.as_secs() as u32);
    let (username, realm, nonce) = long_term_setters(allocation, &[]);
    let setters: Vec<&dyn Setter> = vec![&lifetime_attr, &username, &realm, &nonce];

    let mut m = agent.init_request(Method::Refresh, &setters)?;
    let key = long_term_key(&allocation.username, &allocation.realm, &allocation.password);
    agent.finish_message(&mut m, &key)?;
    Ok(m)
}

pub fn create_permission(
    agent: &mut StunAgent,
    allocation: &TurnAllocation,
    peer: SocketAddr,
) -> Result<Message> {
    let peer_attr = XorPeerAddress(peer);
    let (username, realm, nonce) = long_term_setters(allocation, &[]);
    let setters: Vec<&dyn Setter> = vec![&peer_attr, &username, &realm, &nonce];

    let mut m = agent.init_request(Method::CreatePermission, &setters)?;
    let key = long_term_key(&allocation.username, &allocation.realm, &allocation.password);
    agent.finish_message(&mut m, &key)?;
    Ok(m)
}

pub fn create_channel_bind(
    agent: &mut StunAgent,
    allocation: &TurnAllocation,
    channel: u16,
    peer: SocketAddr,
) -> Result<Message> {
    let channel_attr = ChannelNumber(channel);
    let peer_attr = XorPeerAddress(peer);
    let (username, realm, nonce) = long_term_setters(allocation, &[]);
    let setters: Vec<&dyn Setter> = vec![&channel_attr, &peer_attr, &username, &realm, &nonce];

    let mut m = agent.init_request(Method::ChannelBind, &setters)?;
    let key = long_term_key(&allocation.username, &allocation.realm, &allocation.password);
    agent.finish_message(&mut m, &key)?;
    Ok(m)
}

/// Outcome of processing an Allocate response (RFC 5766 §6.3/§6.4).
#[derive(Debug, Clone)]
pub enum AllocateOutcome {
    /// Server challenged us; re-issue with REALM/NONCE copied in.
    Challenged { realm: String, nonce: String },
    /// Server redirected us to another address (3xx + ALTERNATE-SERVER).
    Redirect(SocketAddr),
    Success {
        relayed_address: SocketAddr,
        mapped_address: Option<SocketAddr>,
        lifetime: Duration,
    },
    Error(u16, String),
}

pub fn process_allocate_response(m: &Message) -> Result<AllocateOutcome> {
    match m.typ.class {
        Class::ErrorResponse => {
            let ec = ErrorCodeAttribute::get_from(m)?;
            if ec.code == 401 {
                let realm = Realm::get_from(m).map(|r| r.0).unwrap_or_default();
                let nonce = Nonce::get_from(m).map(|n| n.0).unwrap_or_default();
                return Ok(AllocateOutcome::Challenged { realm, nonce });
            }
            if ec.code / 100 == 3 {
                if let Ok(alt) = MappedAddress::get_from(m) {
                    return Ok(AllocateOutcome::Redirect(alt.0));
                }
            }
            Ok(AllocateOutcome::Error(ec.code, ec.reason))
        }
        Class::SuccessResponse => {
            let relayed = XorRelayedAddress::get_from(m)
                .map_err(|_| Error::ErrTurnAllocationFailed("missing xor-relayed-address".into()))?;
            let mapped = crate::stun::attributes::address::XorMappedAddress::get_from(m)
                .ok()
                .map(|a| a.0);
            let lifetime = Lifetime::get_from(m)
                .map(|l| Duration::from_secs(l.0 as u64))
                .unwrap_or(Duration::from_secs(600));
            Ok(AllocateOutcome::Success {
                relayed_address: relayed.0,
                mapped_address: mapped,
                lifetime,
            })
        }
        _ => Err(Error::new("unexpected message class for allocate response".into())),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stun::agent::AgentUsage;
    use crate::stun::compat::CompatibilityProfile;

    fn fresh_agent() -> StunAgent {
        StunAgent::new(CompatibilityProfile::Rfc5389, AgentUsage::default())
    }

    #[test]
    fn test_create_allocate_before_challenge_has_no_credentials() {
        let mut agent = fresh_agent();
        let allocation = TurnAllocation::new(
            "127.0.0.1:3478".parse().unwrap(),
            "user".into(),
            "pass".into(),
            super::super::allocation::RelayKind::Udp,
        );
        let m = create_allocate(&mut agent, &allocation, None).unwrap();
        assert!(!m.contains(crate::stun::attributes::USERNAME));
    }

    #[test]
    fn test_create_allocate_after_challenge_has_credentials() {
        let mut agent = fresh_agent();
        let mut allocation = TurnAllocation::new(
            "127.0.0.1:3478".parse().unwrap(),
            "user".into(),
            "pass".into(),
            super::super::allocation::RelayKind::Udp,
        );
        allocation.realm = "example.org".into();
        allocation.nonce = "abc123".into();
        let m = create_allocate(&mut agent, &allocation, None).unwrap();
        assert!(m.contains(crate::stun::attributes::USERNAME));
        assert!(m.contains(crate::stun::attributes::MESSAGE_INTEGRITY));
    }
}
