//! Device fingerprint.
//!
//! A SHA-256 hash over stable host attributes plus a random salt generated
//! on first use. The backend uses it to recognize the same device across
//! MAC address randomization. It is a correlation key, not a credential.

use sha2::{Digest, Sha256};

use super::store::{SessionStore, StoreError};

/// Return the cached fingerprint, generating and persisting one if the
/// store does not have it yet.
pub fn ensure_fingerprint(store: &SessionStore) -> Result<String, StoreError> {
    if let Some(existing) = store.device_fingerprint() {
        return Ok(existing);
    }

    let fingerprint = generate();
    store.set_device_fingerprint(&fingerprint)?;
    Ok(fingerprint)
}

fn generate() -> String {
    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown-host".to_string());
    // The salt makes the hash unique per install even on identical hardware.
    let salt = uuid::Uuid::new_v4();

    let mut hasher = Sha256::new();
    hasher.update(hostname.as_bytes());
    hasher.update(std::env::consts::OS.as_bytes());
    hasher.update(std::env::consts::ARCH.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_sha256_hex() {
        let fp = generate();
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_is_generated_once_and_cached() {
        let store = SessionStore::in_memory();
        let first = ensure_fingerprint(&store).unwrap();
        let second = ensure_fingerprint(&store).unwrap();
        assert_eq!(first, second);
    }
}
