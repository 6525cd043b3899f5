//! Password generation and hashing.
//!
//! Generated passwords draw from character sets with the lookalikes
//! (`I`, `O`, `l`, `0`, `1`) removed, since voters typically retype them
//! from an email. Every password carries at least one character from each
//! set. Hashing is Argon2 with a random per-password salt.

use rand::{seq::SliceRandom, Rng};

use crate::error::Result;

const UPPERCASE: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const LOWERCASE: &[u8] = b"abcdefghijkmnpqrstuvwxyz";
const DIGITS: &[u8] = b"23456789";
const SPECIAL: &[u8] = b"!@#$%^&*_-+=?";

pub const DEFAULT_LENGTH: usize = 10;
const SALT_LEN: usize = 16;

/// Generate a random password of at least four characters.
pub fn generate(length: usize) -> String {
    let length = length.max(4);
    let mut rng = rand::thread_rng();

    // One from each set so no class is missing, then fill from the union.
    let mut chars = Vec::with_capacity(length);
    for set in [UPPERCASE, LOWERCASE, DIGITS, SPECIAL] {
        chars.push(set[rng.gen_range(0..set.len())]);
    }
    let union: Vec<u8> = [UPPERCASE, LOWERCASE, DIGITS, SPECIAL].concat();
    while chars.len() < length {
        chars.push(union[rng.gen_range(0..union.len())]);
    }
    chars.shuffle(&mut rng);

    chars.into_iter().map(char::from).collect()
}

/// Hash a password for storage.
pub fn hash(password: &str) -> Result<String> {
    let salt: [u8; SALT_LEN] = rand::thread_rng().gen();
    let encoded = argon2::hash_encoded(password.as_bytes(), &salt, &argon2::Config::default())?;
    Ok(encoded)
}

/// Check a password against a stored hash. A malformed hash verifies as
/// false rather than erroring.
pub fn verify(encoded: &str, password: &str) -> bool {
    argon2::verify_encoded(encoded, password.as_bytes()).unwrap_or(false)
}
