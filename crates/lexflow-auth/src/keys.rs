//! API key generation and hashing.

use sha2::{Digest, Sha256};

/// Default public prefix for issued credentials.
pub const DEFAULT_CREDENTIAL_PREFIX: &str = "ms_";

/// Length of the random hex portion of a key (24 random bytes).
pub const KEY_HEX_LENGTH: usize = 48;

/// A freshly generated key. The plaintext is shown to the caller once;
/// only the hash is stored.
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    pub plaintext: String,
    pub prefix: String,
    pub hash: String,
}

/// Generate a new API key under the given public prefix.
///
/// SECURITY: random bytes come straight from the operating system's
/// CSPRNG.
#[must_use]
pub fn generate_key(prefix: &str) -> KeyMaterial {
    use rand::rngs::OsRng;
    use rand::RngCore;

    let mut random_bytes = [0u8; KEY_HEX_LENGTH / 2];
    OsRng.fill_bytes(&mut random_bytes);
    let plaintext = format!("{prefix}{}", hex::encode(random_bytes));
    let hash = hash_key(&plaintext);

    KeyMaterial {
        plaintext,
        prefix: prefix.to_string(),
        hash,
    }
}

/// SHA-256 hash of a plaintext key, hex-encoded for storage.
#[must_use]
pub fn hash_key(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}
