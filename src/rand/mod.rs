use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

/// Candidate ids, ICE ufrag/pwd and tie-breakers all need ASCII-safe random
/// strings of a given length; centralizing generation here keeps the
/// process-wide RNG usage in one place.
pub(crate) const RUNES_ALPHA: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
pub(crate) const RUNES_DIGIT: &str = "0123456789";

pub const LEN_UFRAG: usize = 16;
pub const LEN_PWD: usize = 32;

fn generate_rand_string(n: usize, runes: &str) -> String {
    let mut rng = rand::thread_rng();
    let runes: Vec<char> = runes.chars().collect();
    (0..n).map(|_| runes[rng.gen_range(0..runes.len())]).collect()
}

/// Generates a random string of length `n` consisting of only capital and
/// lowercase ASCII letters.
pub fn generate_rand_string_alpha(n: usize) -> String {
    generate_rand_string(n, RUNES_ALPHA)
}

/// Generates a candidate id. Foundations only need to be stable and unique
/// within a single gathering pass, so a v4 UUID (RFC 4122) is overkill on
/// entropy but saves us from rolling yet another alphabet/length pair.
pub fn generate_cand_id() -> String {
    format!("candidate:{}", Uuid::new_v4())
}

/// Generates a local ufrag per RFC 5245 §15.4 (at least 24 bits of
/// randomness, ICE-char alphabet); we use a fixed 16-char alphanumeric
/// string, comfortably above the minimum.
pub fn generate_ufrag() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(LEN_UFRAG)
        .map(char::from)
        .collect()
}

/// Generates a local password per RFC 5245 §15.4 (at least 128 bits).
pub fn generate_pwd() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(LEN_PWD)
        .map(char::from)
        .collect()
}

/// A fresh 64-bit ICE role tie-breaker used in controlling/controlled
/// conflict resolution (RFC 8445 §8.1.1).
pub fn generate_tie_breaker() -> u64 {
    rand::thread_rng().gen()
}

/// A fresh 96-bit STUN transaction id (RFC 5389 §6).
pub fn generate_transaction_id() -> [u8; 12] {
    let mut id = [0u8; 12];
    rand::thread_rng().fill(&mut id);
    id
}

#[allow(dead_code)]
fn digits() -> &'static str {
    RUNES_DIGIT
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_generate_lengths() {
        assert_eq!(generate_ufrag().len(), LEN_UFRAG);
        assert_eq!(generate_pwd().len(), LEN_PWD);
        assert_eq!(generate_transaction_id().len(), 12);
    }

    #[test]
    fn test_tie_breaker_varies() {
        // Not a proof of randomness, just a smoke test that two draws differ
        // with overwhelming probability.
        let a = generate_tie_breaker();
        let b = generate_tie_breaker();
        assert_ne!(a, b);
    }
}
