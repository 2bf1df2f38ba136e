//! Secret generation and hashing
//!
//! Secrets are random alphanumeric strings handed out exactly once. Only
//! their Argon2id hash (PHC string format) is ever stored.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use gamelink_core::HashCost;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use thiserror::Error;

/// Length of generated secrets in characters (~190 bits of entropy)
pub const SECRET_LENGTH: usize = 32;

/// Secret hashing errors
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Invalid hash parameters: {0}")]
    Params(String),
    #[error("Failed to hash secret: {0}")]
    Hash(String),
}

pub type TokenResult<T> = Result<T, TokenError>;

/// A plaintext secret. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Generates secrets and checks presented secrets against stored hashes
#[derive(Clone)]
pub struct TokenCodec {
    params: Params,
    /// Hash of a throwaway secret, verified against when there is nothing real to check
    decoy_hash: String,
}

impl TokenCodec {
    /// Create a codec with the given hashing cost
    pub fn new(cost: HashCost) -> TokenResult<Self> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|e| TokenError::Params(e.to_string()))?;

        let mut codec = Self {
            params,
            decoy_hash: String::new(),
        };
        let decoy = codec.generate();
        codec.decoy_hash = codec.hash(&decoy)?;
        Ok(codec)
    }

    fn hasher(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Generate a fresh random secret
    pub fn generate(&self) -> Secret {
        let value: String = OsRng
            .sample_iter(&Alphanumeric)
            .take(SECRET_LENGTH)
            .map(char::from)
            .collect();
        Secret(value)
    }

    /// Hash a secret with a fresh random salt
    pub fn hash(&self, secret: &Secret) -> TokenResult<String> {
        let mut salt = [0u8; 16];
        OsRng.fill_bytes(&mut salt);
        let salt = SaltString::encode_b64(&salt).map_err(|e| TokenError::Hash(e.to_string()))?;

        self.hasher()
            .hash_password(secret.expose().as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| TokenError::Hash(e.to_string()))
    }

    /// Check a presented secret against a stored hash
    ///
    /// Malformed hashes never verify.
    pub fn verify(&self, presented: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self
                .hasher()
                .verify_password(presented.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    /// Spend one verification on the decoy hash.
    ///
    /// Callers use this when an ID is unknown so the miss costs the same
    /// time as a wrong secret.
    pub fn verify_decoy(&self, presented: &str) {
        let _ = self.verify(presented, &self.decoy_hash);
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new(HashCost::minimal()).unwrap()
    }

    #[test]
    fn test_generated_secrets() {
        let codec = codec();
        let a = codec.generate();
        let b = codec.generate();
        assert_eq!(a.expose().len(), SECRET_LENGTH);
        assert!(a.expose().chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_and_verify() {
        let codec = codec();
        let secret = codec.generate();
        let hash = codec.hash(&secret).unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains(secret.expose()));
        assert!(codec.verify(secret.expose(), &hash));
        assert!(!codec.verify("wrong", &hash));
    }

    #[test]
    fn test_hashes_are_salted() {
        let codec = codec();
        let secret = Secret::new("same-secret");
        let first = codec.hash(&secret).unwrap();
        let second = codec.hash(&secret).unwrap();
        assert_ne!(first, second);
        assert!(codec.verify("same-secret", &first));
        assert!(codec.verify("same-secret", &second));
    }

    #[test]
    fn test_malformed_hash_does_not_verify() {
        let codec = codec();
        assert!(!codec.verify("anything", "not a phc string"));
        assert!(!codec.verify("anything", ""));
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::new("hunter2");
        assert!(!format!("{:?}", secret).contains("hunter2"));
    }

    #[test]
    fn test_invalid_cost_rejected() {
        let cost = HashCost {
            memory_kib: 1,
            iterations: 1,
            parallelism: 1,
        };
        assert!(matches!(TokenCodec::new(cost), Err(TokenError::Params(_))));
    }
}
