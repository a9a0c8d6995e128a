//! Proof-of-work hash engine
//!
//! SHA-256 over `payload + decimal(nonce)`; a digest wins when its lowercase hex
//! form starts with `difficulty` zero characters. Searching costs about 16^d
//! digests, verifying costs one.

use crate::{Difficulty, Solution};
use sha2::{Digest, Sha256};

/// Nonces hashed between cancellation checks
pub const SEARCH_BATCH_SIZE: u64 = 4_096;

/// Reusable SHA-256 hasher for nonce searches
pub struct Sha256Hasher {
    hasher: Sha256,
}

impl Sha256Hasher {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    /// Digest of `payload` followed by the decimal nonce, as lowercase hex
    pub fn hash_with_nonce(&mut self, payload: &[u8], nonce: u64) -> String {
        self.hasher.update(payload);
        self.hasher.update(nonce.to_string().as_bytes());
        hex::encode(self.hasher.finalize_reset())
    }
}

impl Default for Sha256Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercase hex SHA-256 digest of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Whether a hex digest carries the required leading zero characters
pub fn meets_difficulty(hash: &str, difficulty: Difficulty) -> bool {
    let d = difficulty.value() as usize;
    hash.len() >= d && hash.as_bytes()[..d].iter().all(|&b| b == b'0')
}

/// Search nonces 1, 2, 3, ... until a digest meets `difficulty`.
///
/// `on_batch` is called after every [`SEARCH_BATCH_SIZE`] nonces with the number
/// of digests computed in that batch; returning `false` abandons the search.
/// Returns `None` when abandoned or when the nonce space is exhausted.
pub fn search_with<F>(payload: &str, difficulty: Difficulty, mut on_batch: F) -> Option<Solution>
where
    F: FnMut(u64) -> bool,
{
    let payload = payload.as_bytes();
    let mut hasher = Sha256Hasher::new();
    let mut nonce: u64 = 1;
    let mut in_batch: u64 = 0;

    loop {
        let hash = hasher.hash_with_nonce(payload, nonce);
        in_batch += 1;
        if meets_difficulty(&hash, difficulty) {
            on_batch(in_batch);
            return Some(Solution { hash, nonce });
        }

        if in_batch == SEARCH_BATCH_SIZE {
            if !on_batch(in_batch) {
                return None;
            }
            in_batch = 0;
        }

        nonce = nonce.checked_add(1)?;
    }
}

/// Uncancellable search
pub fn search(payload: &str, difficulty: Difficulty) -> Option<Solution> {
    search_with(payload, difficulty, |_| true)
}

/// Recompute the digest for `nonce` and check it against the claim and the prefix
pub fn verify(payload: &str, nonce: u64, claimed_hash: &str, difficulty: Difficulty) -> bool {
    let hash = Sha256Hasher::new().hash_with_nonce(payload.as_bytes(), nonce);
    hash.eq_ignore_ascii_case(claimed_hash) && meets_difficulty(&hash, difficulty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn difficulty(d: u8) -> Difficulty {
        Difficulty::new(d).unwrap()
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hash_with_nonce_appends_decimal() {
        let mut hasher = Sha256Hasher::new();
        assert_eq!(hasher.hash_with_nonce(b"abc", 1), sha256_hex(b"abc1"));
        // finalize_reset leaves the hasher clean for the next nonce
        assert_eq!(hasher.hash_with_nonce(b"abc", 12), sha256_hex(b"abc12"));
    }

    #[test]
    fn test_difficulty_zero_returns_first_nonce() {
        let solution = search("abc", difficulty(0)).unwrap();
        assert_eq!(solution.nonce, 1);
        assert_eq!(solution.hash, sha256_hex(b"abc1"));
    }

    #[test]
    fn test_search_stops_at_first_winning_nonce() {
        let d = difficulty(1);
        let first = (1u64..)
            .find(|n| sha256_hex(format!("abc{}", n).as_bytes()).starts_with('0'))
            .unwrap();
        let solution = search("abc", d).unwrap();
        assert_eq!(solution.nonce, first);
    }

    #[test]
    fn test_meets_difficulty() {
        assert!(meets_difficulty("00ab", difficulty(2)));
        assert!(!meets_difficulty("0fab", difficulty(2)));
        assert!(meets_difficulty("anything", difficulty(0)));
        assert!(!meets_difficulty("0", difficulty(2)));
    }

    #[test]
    fn test_search_abandoned_by_callback() {
        let mut batches = 0;
        let result = search_with("abc", difficulty(64), |_| {
            batches += 1;
            batches < 3
        });
        assert!(result.is_none());
        assert_eq!(batches, 3);
    }

    #[test]
    fn test_verify_rejects_wrong_claims() {
        let d = difficulty(1);
        let solution = search("payload", d).unwrap();
        assert!(verify("payload", solution.nonce, &solution.hash, d));
        assert!(verify("payload", solution.nonce, &solution.hash.to_uppercase(), d));
        assert!(!verify("payload", solution.nonce + 1, &solution.hash, d));
        assert!(!verify("other", solution.nonce, &solution.hash, d));
        assert!(!verify("payload", solution.nonce, &solution.hash, difficulty(64)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_solution_meets_difficulty_and_verifies(payload in "[a-z0-9]{0,24}", d in 0u8..=2) {
            let d = difficulty(d);
            let solution = search(&payload, d).unwrap();
            prop_assert!(meets_difficulty(&solution.hash, d));
            prop_assert!(verify(&payload, solution.nonce, &solution.hash, d));
            prop_assert_eq!(
                sha256_hex(format!("{}{}", payload, solution.nonce).as_bytes()),
                solution.hash
            );
        }
    }
}
