use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// SHA-256 of an opaque credential, hex encoded. Only this digest is ever
/// persisted for client secrets, authorization codes and refresh tokens.
pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Constant-time check of a presented credential against a stored digest.
pub fn verify_secret(presented: &str, expected_hash: &str) -> bool {
    let presented_hash = hash_secret(presented);
    let a = presented_hash.as_bytes();
    let b = expected_hash.as_bytes();

    if a.len() != b.len() {
        return false;
    }

    a.ct_eq(b).into()
}

/// 32 random bytes, hex encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
