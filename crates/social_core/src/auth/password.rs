//! Password hashing.
//!
//! # Invariants
//! - Hashes are PHC strings (`$argon2id$v=19$...`) carrying their own salt
//!   and cost parameters.
//! - Plaintext is never logged.

use argon2::password_hash::{
    Error as PhcError, PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use std::error::Error;
use std::fmt::{Display, Formatter};

const SALT_LEN: usize = 16;

/// Error from a hashing backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashError(String);

impl HashError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl Display for HashError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "password hashing failed: {}", self.0)
    }
}

impl Error for HashError {}

impl From<PhcError> for HashError {
    fn from(value: PhcError) -> Self {
        Self(value.to_string())
    }
}

/// Turns a plaintext password into a storable hash.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plain: &str) -> Result<String, HashError>;

    /// `Ok(false)` for a wrong password; `Err` only for malformed hashes.
    fn verify(&self, plain: &str, hashed: &str) -> Result<bool, HashError>;
}

/// Argon2id hasher with a random per-password salt.
#[derive(Clone)]
pub struct Argon2PasswordHasher {
    argon2: Argon2<'static>,
}

impl Default for Argon2PasswordHasher {
    fn default() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }
}

impl Argon2PasswordHasher {
    /// Argon2id v0x13 with custom cost parameters.
    pub fn with_params(params: Params) -> Self {
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }
}

impl PasswordHasher for Argon2PasswordHasher {
    fn hash(&self, plain: &str) -> Result<String, HashError> {
        let mut salt = [0_u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let salt = SaltString::encode_b64(&salt)?;
        let hashed = self.argon2.hash_password(plain.as_bytes(), &salt)?;
        Ok(hashed.to_string())
    }

    fn verify(&self, plain: &str, hashed: &str) -> Result<bool, HashError> {
        let parsed = PasswordHash::new(hashed)?;
        match self.argon2.verify_password(plain.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(PhcError::Password) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}
