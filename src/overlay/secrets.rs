//! Fresh secret material.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use secrecy::SecretString;

/// Length of generated passwords.
pub const PASSWORD_LEN: usize = 32;

const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
// No quotes, backslashes or `$` so values survive shells and connection strings.
const SYMBOLS: &[u8] = b"!#%*+-=?@^_";

/// Generates secret values from a cryptographically secure RNG.
#[derive(Debug)]
pub struct SecretGenerator {
    rng: StdRng,
}

impl Default for SecretGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretGenerator {
    /// Creates a generator seeded from the operating system.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Creates a generator with a fixed seed, for reproducible output.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generates a password containing every character class.
    ///
    /// `len` is clamped to at least 4 so every class fits.
    pub fn password(&mut self, len: usize) -> SecretString {
        let len = len.max(4);
        let alphabet = [LOWER, UPPER, DIGITS, SYMBOLS].concat();
        loop {
            let candidate: String = (0..len)
                .map(|_| char::from(alphabet[self.rng.random_range(0..alphabet.len())]))
                .collect();
            let complete = [LOWER, UPPER, DIGITS, SYMBOLS]
                .iter()
                .all(|class| candidate.bytes().any(|b| class.contains(&b)));
            if complete {
                return SecretString::from(candidate);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_password_classes_and_length() {
        let mut generator = SecretGenerator::new();
        for _ in 0..20 {
            let password = generator.password(PASSWORD_LEN);
            let value = password.expose_secret();
            assert_eq!(value.len(), PASSWORD_LEN);
            assert!(value.bytes().any(|b| b.is_ascii_lowercase()));
            assert!(value.bytes().any(|b| b.is_ascii_uppercase()));
            assert!(value.bytes().any(|b| b.is_ascii_digit()));
            assert!(value.bytes().any(|b| SYMBOLS.contains(&b)));
        }
    }

    #[test]
    fn test_seeded_is_reproducible() {
        let a = SecretGenerator::seeded(7).password(PASSWORD_LEN);
        let b = SecretGenerator::seeded(7).password(PASSWORD_LEN);
        let c = SecretGenerator::seeded(8).password(PASSWORD_LEN);
        assert_eq!(a.expose_secret(), b.expose_secret());
        assert_ne!(a.expose_secret(), c.expose_secret());
    }

    #[test]
    fn test_short_lengths_are_clamped() {
        let password = SecretGenerator::seeded(1).password(1);
        assert_eq!(password.expose_secret().len(), 4);
    }
}
