use sha2::{Digest, Sha256};

/// Derive a stable UUID-v4-shaped identifier from `input`.
///
/// The first 16 bytes of the SHA-256 digest are used with the version
/// nibble set to 4 and the RFC 4122 variant bits set, so the result is
/// indistinguishable from a random v4 UUID but reproducible.
pub fn deterministic_uuid(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    uuid::Builder::from_random_bytes(bytes)
        .into_uuid()
        .hyphenated()
        .to_string()
}
