//! Argon2 password hashing

use crate::StorageError;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, PasswordHash,
};

/// Hash a password into a PHC string with a random salt.
pub fn hash_password(password: &str) -> Result<String, StorageError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StorageError::HashPassword(e.to_string()))
}

/// Verify a password against a PHC string.
///
/// An empty hash never verifies; externally authenticated users have none.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, StorageError> {
    if hash.is_empty() {
        return Ok(false);
    }

    let parsed =
        PasswordHash::new(hash).map_err(|e| StorageError::HashPassword(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
