use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

// OWASP minimum for argon2id: 19 MiB, 2 passes, 1 lane.
const ARGON2_MEMORY_KIB: u32 = 19 * 1024;
const ARGON2_ITERATIONS: u32 = 2;
const ARGON2_PARALLELISM: u32 = 1;
const ARGON2_OUTPUT_LEN: usize = 32;

const TOKEN_BYTES: usize = 32;
const ACCESS_PREFIX: &str = "sl_at";
const REFRESH_PREFIX: &str = "sl_rt";

pub const MIN_PASSWORD_LEN: usize = 6;

pub struct PasswordHashing {
    argon2: Argon2<'static>,
}

impl Default for PasswordHashing {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordHashing {
    #[must_use]
    pub fn new() -> Self {
        let params = Params::new(
            ARGON2_MEMORY_KIB,
            ARGON2_ITERATIONS,
            ARGON2_PARALLELISM,
            Some(ARGON2_OUTPUT_LEN),
        )
        .unwrap_or_default();

        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }

    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| Error::Config(format!("failed to hash password: {e}")))?;
        Ok(hash.to_string())
    }

    pub fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| Error::Config(format!("invalid hash format: {e}")))?;

        match self.argon2.verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(Error::Config(format!("failed to verify password: {e}"))),
        }
    }
}

/// Raw session tokens plus the digests stored in the database.
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub access_digest: String,
    pub refresh_digest: String,
}

impl IssuedTokens {
    #[must_use]
    pub fn generate() -> Self {
        let access_token = random_token(ACCESS_PREFIX);
        let refresh_token = random_token(REFRESH_PREFIX);
        Self {
            access_digest: token_digest(&access_token),
            refresh_digest: token_digest(&refresh_token),
            access_token,
            refresh_token,
        }
    }
}

fn random_token(prefix: &str) -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill(&mut bytes);
    format!("{prefix}_{}", hex::encode(bytes))
}

/// Lookup key for a raw token. Tokens are high-entropy so a plain digest is enough.
#[must_use]
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Lowercased, trimmed email, or an error when it can't be an address.
pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_ascii_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(Error::BadRequest(format!("invalid email address: {email}"))),
    }
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hashing = PasswordHashing::new();
        let hash = hashing.hash("hunter22").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hashing.verify("hunter22", &hash).unwrap());
        assert!(!hashing.verify("hunter23", &hash).unwrap());
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        let hashing = PasswordHashing::new();
        assert!(hashing.verify("x", "not-a-hash").is_err());
    }

    #[test]
    fn test_issued_tokens_are_unique_and_digested() {
        let a = IssuedTokens::generate();
        let b = IssuedTokens::generate();

        assert_ne!(a.access_token, b.access_token);
        assert_ne!(a.access_token, a.refresh_token);
        assert!(a.access_token.starts_with("sl_at_"));
        assert!(a.refresh_token.starts_with("sl_rt_"));
        assert_eq!(a.access_digest, token_digest(&a.access_token));
        assert_eq!(a.access_digest.len(), 64);
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(
            normalize_email("  Foreman@Example.COM ").unwrap(),
            "foreman@example.com"
        );
        assert!(normalize_email("nobody").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("a@localhost").is_err());
    }

    #[test]
    fn test_password_length() {
        assert!(validate_password("12345").is_err());
        assert!(validate_password("123456").is_ok());
    }
}
