//! Password verifier hashing and the small amount of randomness the relay
//! needs (account salts, add codes).

use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub const SALT_SIZE: usize = 32;
pub const VERIFIER_SIZE: usize = 32;

/// A fresh 32-byte random salt for a new account.
#[inline]
pub fn random_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// verifier = SHA-256(password ∥ salt)
#[inline]
pub fn verifier(password: &[u8], salt: &[u8]) -> [u8; VERIFIER_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(password);
    hasher.update(salt);
    hasher.finalize().into()
}

/// Constant-time comparison of a submitted password against the stored
/// verifier, so a timing side channel can't be used to brute-force it byte
/// by byte.
#[inline]
pub fn verify(password: &[u8], salt: &[u8], expected: &[u8; VERIFIER_SIZE]) -> bool {
    let computed = verifier(password, salt);
    computed.ct_eq(expected).into()
}

/// A short random token (4 random bytes, hex-encoded) used by `CreateAddCode`
/// to let a second party initiate contact without knowing the first party's
/// name. 32 random bits are not collision-resistant under heavy load — the
/// store enforces uniqueness and callers retry on collision (`spec.md` §9).
#[inline]
pub fn random_add_code() -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode_upper(bytes)
}
