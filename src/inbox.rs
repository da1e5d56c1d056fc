//! Reply-token generation for the multiplexed request inbox.
//!
//! Each connection owns its own generator instead of sharing process-wide
//! state, so connections stay independently testable: seed the generator and
//! token sequences become deterministic.

use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;

/// Subject prefix reserved for request/reply inboxes.
pub const INBOX_PREFIX: &str = "_INBOX";

/// Length of generated reply tokens.
const TOKEN_LEN: usize = 22;

/// Per-connection random token generator.
pub struct TokenGenerator {
    rng: StdRng,
}

impl TokenGenerator {
    /// Generator seeded from OS entropy.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic generator for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Produce the next alphanumeric token.
    pub fn next_token(&mut self) -> String {
        (&mut self.rng)
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect()
    }

    /// Produce a connection-unique inbox prefix, e.g. `_INBOX.x4f…`.
    pub fn next_inbox_prefix(&mut self) -> String {
        format!("{}.{}", INBOX_PREFIX, self.next_token())
    }
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TokenGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGenerator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shape() {
        let mut tokens = TokenGenerator::new();
        let token = tokens.next_token();
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_seeded_generator_is_deterministic() {
        let mut a = TokenGenerator::with_seed(42);
        let mut b = TokenGenerator::with_seed(42);
        assert_eq!(a.next_token(), b.next_token());
        assert_eq!(a.next_token(), b.next_token());
    }

    #[test]
    fn test_tokens_differ_within_a_generator() {
        let mut tokens = TokenGenerator::with_seed(7);
        assert_ne!(tokens.next_token(), tokens.next_token());
    }

    #[test]
    fn test_inbox_prefix() {
        let mut tokens = TokenGenerator::with_seed(1);
        let prefix = tokens.next_inbox_prefix();
        assert!(prefix.starts_with("_INBOX."));
        assert_eq!(prefix.len(), INBOX_PREFIX.len() + 1 + TOKEN_LEN);
    }
}
