use std::time::{SystemTime, UNIX_EPOCH};

use super::attributes::textattrs::{Software, UnknownAttributes};
use super::attributes::{is_comprehension_required, AttrType, FINGERPRINT, MESSAGE_INTEGRITY};
use super::compat::CompatibilityProfile;
use super::fingerprint;
use super::header::{Class, Method, MessageType, TransactionId};
use super::integrity;
use super::message::{Message, Setter};
use crate::error::{Error, Result};

/// Size of the fixed transaction-slot table (RFC 5389 §7.2.1, client
/// transaction bookkeeping). A closed array, not a `HashMap`: the slot
/// count is a hard agent limit, not an incidental implementation detail.
pub const DEFAULT_AGENT_TRANSACTIONS: usize = 50;

/// Usage flags controlling what a [`StunAgent`] demands of inbound/outbound
/// messages (RFC 5389 §10 short-term, §15.4 long-term credentials).
#[derive(Debug, Clone, Default)]
pub struct AgentUsage {
    pub short_term_credentials: bool,
    pub long_term_credentials: bool,
    pub require_fingerprint: bool,
    pub add_software: bool,
    pub ignore_credentials: bool,
    pub no_auth_on_indications: bool,
    pub force_validater_callback: bool,
}

#[derive(Debug, Clone)]
struct TransactionSlot {
    transaction_id: TransactionId,
    method: Method,
    key: Vec<u8>,
    created_at: u64,
}

/// Tracks outstanding STUN transactions, builds requests/responses/errors
/// and dispatches inbound messages to the right pending transaction
/// (RFC 5389 §7).
pub struct StunAgent {
    pub compatibility: CompatibilityProfile,
    pub usage: AgentUsage,
    software: Option<String>,
    slots: Vec<Option<TransactionSlot>>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl StunAgent {
    pub fn new(compatibility: CompatibilityProfile, usage: AgentUsage) -> Self {
        StunAgent {
            compatibility,
            usage,
            software: None,
            slots: vec![None; DEFAULT_AGENT_TRANSACTIONS],
        }
    }

    pub fn with_software(mut self, software: impl Into<String>) -> Self {
        self.software = Some(software.into());
        self
    }

    /// Builds a fresh request with a random transaction id, optionally
    /// prepending SOFTWARE (RFC 5389 §15.10).
    pub fn init_request(&self, method: Method, setters: &[&dyn Setter]) -> Result<Message> {
        let mt = MessageType::new(method, Class::Request);
        let tid = TransactionId::default();
        self.build_with_header(mt, tid, setters)
    }

    pub fn init_indication(&self, method: Method, setters: &[&dyn Setter]) -> Result<Message> {
        let mt = MessageType::new(method, Class::Indication);
        let tid = TransactionId::default();
        self.build_with_header(mt, tid, setters)
    }

    /// Builds a response echoing `request`'s transaction id.
    pub fn init_response(
        &self,
        method: Method,
        request: &Message,
        setters: &[&dyn Setter],
    ) -> Result<Message> {
        let mt = MessageType::new(method, Class::SuccessResponse);
        self.build_with_header(mt, request.transaction_id, setters)
    }

    pub fn init_error(
        &self,
        method: Method,
        request: &Message,
        setters: &[&dyn Setter],
    ) -> Result<Message> {
        let mt = MessageType::new(method, Class::ErrorResponse);
        self.build_with_header(mt, request.transaction_id, setters)
    }

    fn build_with_header(
        &self,
        mt: MessageType,
        tid: TransactionId,
        setters: &[&dyn Setter],
    ) -> Result<Message> {
        let mut m = Message::new();
        mt.add_to(&mut m)?;
        tid.add_to(&mut m)?;
        for s in setters {
            s.add_to(&mut m)?;
        }
        if self.usage.add_software {
            if let Some(sw) = &self.software {
                Software(sw.clone()).add_to(&mut m)?;
            }
        }
        m.encode();
        Ok(m)
    }

    /// Appends MESSAGE-INTEGRITY and, if enabled, FINGERPRINT; for outgoing
    /// requests, records the transaction in the first free slot. Drops the
    /// message (returns `Err`) if the slot table is full.
    pub fn finish_message(&mut self, m: &mut Message, key: &[u8]) -> Result<()> {
        if !key.is_empty() || self.usage.short_term_credentials || self.usage.long_term_credentials {
            integrity::add_message_integrity(m, key)?;
        }
        if self.compatibility.supports_fingerprint() {
            fingerprint::add_fingerprint(m, self.compatibility.wlm2009_fingerprint_quirk())?;
        }

        if m.typ.class == Class::Request {
            self.store_transaction(m.transaction_id, m.typ.method, key.to_vec())?;
        }
        Ok(())
    }

    fn store_transaction(&mut self, tid: TransactionId, method: Method, key: Vec<u8>) -> Result<()> {
        for slot in self.slots.iter_mut() {
            if slot.is_none() {
                *slot = Some(TransactionSlot {
                    transaction_id: tid,
                    method,
                    key,
                    created_at: now_ms(),
                });
                return Ok(());
            }
        }
        log::warn!("stun agent: no free transaction slot, dropping request");
        Err(Error::ErrTransactionSlotsFull)
    }

    fn find_slot(&self, tid: &TransactionId) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| matches!(s, Some(slot) if slot.transaction_id == *tid))
    }

    /// Frees the slot matching `tid`, if any. Used on success, error and
    /// timeout so a stale slot never blocks a future transaction.
    pub fn free_transaction(&mut self, tid: &TransactionId) {
        if let Some(idx) = self.find_slot(tid) {
            self.slots[idx] = None;
        }
    }

    pub fn outstanding(&self, tid: &TransactionId) -> bool {
        self.find_slot(tid).is_some()
    }

    /// Validates an inbound message per RFC 5389 §7.3/§10: structural
    /// decode, magic cookie, FINGERPRINT, MESSAGE-INTEGRITY (via
    /// `validater`, which looks up the key for a username/realm), and for
    /// responses, matches against the transaction-slot table.
    ///
    /// `validater` receives the raw USERNAME (short-term) or
    /// (username, realm) pair already extracted by the caller and returns
    /// the key to verify with, or `None` if no such credential is known.
    pub fn validate(
        &mut self,
        bytes: &[u8],
        validater: impl FnOnce(&Message) -> Option<Vec<u8>>,
    ) -> Result<Message> {
        let m = Message::decode(bytes)?;

        if self.compatibility.requires_cookie() {
            let cookie = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
            if cookie != super::header::MAGIC_COOKIE {
                return Err(Error::ErrNotStun);
            }
        }

        if self.compatibility.supports_fingerprint() && m.contains(FINGERPRINT) {
            fingerprint::verify_fingerprint(&m, self.compatibility.wlm2009_fingerprint_quirk())
                .map_err(|_| Error::ErrBadRequest)?;
        } else if self.usage.require_fingerprint {
            return Err(Error::ErrBadRequest);
        }

        let is_indication = m.typ.class == Class::Indication;
        let needs_auth = !(is_indication && self.usage.no_auth_on_indications)
            && !self.usage.ignore_credentials
            && (self.usage.short_term_credentials || self.usage.long_term_credentials);

        if needs_auth && m.contains(MESSAGE_INTEGRITY) {
            match validater(&m) {
                Some(key) => {
                    if integrity::verify_message_integrity(&m, &key).is_err() {
                        return Err(Error::ErrUnauthorized);
                    }
                }
                None => return Err(Error::ErrUnauthorizedBadRequest),
            }
        } else if needs_auth && !is_indication {
            return Err(Error::ErrUnauthorized);
        }

        if matches!(m.typ.class, Class::SuccessResponse | Class::ErrorResponse) {
            match self.find_slot(&m.transaction_id) {
                Some(idx) => {
                    self.slots[idx] = None;
                }
                None => return Err(Error::ErrUnmatchedResponse),
            }
        }

        let mut m = m;
        m.drop_after_integrity();
        Ok(m)
    }

    /// Builds a 420 error reply carrying UNKNOWN-ATTRIBUTES, enumerating
    /// the comprehension-required attributes `known` does not cover
    /// (RFC 5389 §7.3.1).
    pub fn build_unknown_attributes_error(
        &self,
        request: &Message,
        known: &[AttrType],
    ) -> Result<Option<Message>> {
        let unknown: Vec<AttrType> = request
            .attributes
            .iter()
            .map(|a| a.typ)
            .filter(|t| is_comprehension_required(*t) && !known.contains(t))
            .collect();

        if unknown.is_empty() {
            return Ok(None);
        }

        let list = UnknownAttributes(unknown);
        let m = self.init_error(
            request.typ.method,
            request,
            &[&super::attributes::textattrs::ErrorCodeAttribute::new(420, "Unknown Attribute"), &list],
        )?;
        Ok(Some(m))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stun::header::Method;

    #[test]
    fn test_request_round_trip_stores_and_frees_slot() {
        let mut agent = StunAgent::new(CompatibilityProfile::Rfc5389, AgentUsage::default());
        let mut req = agent.init_request(Method::Binding, &[]).unwrap();
        agent.finish_message(&mut req, b"").unwrap();
        assert!(agent.outstanding(&req.transaction_id));

        let resp = agent.init_response(Method::Binding, &req, &[]).unwrap();
        let mut resp_bytes = resp.clone();
        resp_bytes.encode();
        let validated = agent.validate(&resp_bytes.raw, |_| None);
        assert!(validated.is_ok());
        assert!(!agent.outstanding(&req.transaction_id));
    }

    #[test]
    fn test_unmatched_response_rejected() {
        let mut agent = StunAgent::new(CompatibilityProfile::Rfc5389, AgentUsage::default());
        let req = agent.init_request(Method::Binding, &[]).unwrap();
        let mut resp = agent.init_response(Method::Binding, &req, &[]).unwrap();
        resp.encode();
        let result = agent.validate(&resp.raw, |_| None);
        assert_eq!(result, Err(Error::ErrUnmatchedResponse));
    }

    #[test]
    fn test_slot_table_fills_up() {
        let mut agent = StunAgent::new(CompatibilityProfile::Rfc5389, AgentUsage::default());
        for _ in 0..DEFAULT_AGENT_TRANSACTIONS {
            let mut req = agent.init_request(Method::Binding, &[]).unwrap();
            agent.finish_message(&mut req, b"").unwrap();
        }
        let mut one_more = agent.init_request(Method::Binding, &[]).unwrap();
        assert_eq!(
            agent.finish_message(&mut one_more, b""),
            Err(Error::ErrTransactionSlotsFull)
        );
    }
}
