//! Cryptographic utilities for token handling
//!
//! ## Security Patterns
//!
//! - **Constant-Time Comparison**: Prevents timing attacks on secret comparisons
//! - **One-Way Token Digests**: Refresh tokens are persisted as SHA-256 digests,
//!   never as plaintext
//! - **High-Entropy Identifiers**: Family IDs and `jti` values come from a
//!   cryptographically secure generator

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Performs constant-time comparison of two byte slices.
///
/// Standard comparison (`==`) exits on the first mismatching byte, which
/// creates a timing side-channel on secret values. The `subtle` crate takes
/// the same time regardless of where (or if) the inputs differ.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Performs constant-time comparison of two strings.
///
/// Convenience wrapper around [`constant_time_eq`] for string comparisons.
pub fn constant_time_str_eq(a: &str, b: &str) -> bool {
    constant_time_eq(a.as_bytes(), b.as_bytes())
}

/// One-way digest of a token's opaque string: lowercase SHA-256 hex (64 chars).
///
/// The session store persists this digest, never the token itself. Lookups
/// hash the presented token and match on the digest column, so a database
/// leak does not hand out usable refresh tokens.
pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

/// Generate a random lowercase hex string of `len` characters.
///
/// Used for token family identifiers (64 chars = 256 bits) and `jti`
/// claims (32 chars = 128 bits).
pub fn random_hex(len: usize) -> String {
    use rand::Rng;

    const CHARSET: &[u8] = b"0123456789abcdef";

    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq_same() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(constant_time_str_eq("secret123", "secret123"));
    }

    #[test]
    fn test_constant_time_eq_different() {
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }

    #[test]
    fn test_token_digest_shape() {
        let digest = token_digest("some-refresh-token");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_token_digest_known_value() {
        // sha256("abc")
        assert_eq!(
            token_digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_token_digest_deterministic() {
        assert_eq!(token_digest("token"), token_digest("token"));
        assert_ne!(token_digest("token-a"), token_digest("token-b"));
    }

    #[test]
    fn test_random_hex() {
        let a = random_hex(64);
        let b = random_hex(64);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
