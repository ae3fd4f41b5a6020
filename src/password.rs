//! One-way password hashing with Argon2.

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use rand::RngCore;
use std::sync::LazyLock;

/// Hash of a random throwaway password, checked when there is no real hash
/// so a failed login costs the same either way.
static DUMMY_HASH: LazyLock<Option<String>> = LazyLock::new(|| {
    let mut throwaway = [0u8; 32];
    rand::rng().fill_bytes(&mut throwaway);
    hash_password(&hex::encode(throwaway)).ok()
});

/// Hash a password into a PHC string.
pub fn hash_password(plain: &str) -> Result<String, argon2::password_hash::Error> {
    let mut salt = [0u8; 16];
    rand::rng().fill_bytes(&mut salt);
    let salt = SaltString::encode_b64(&salt)?;

    Ok(Argon2::default()
        .hash_password(plain.as_bytes(), &salt)?
        .to_string())
}

/// Check a candidate password against a stored PHC string.
/// An unparseable hash never verifies.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Spend one verification on the dummy hash. Always false.
pub fn verify_dummy(plain: &str) -> bool {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        verify_password(plain, hash);
    }
    false
}
