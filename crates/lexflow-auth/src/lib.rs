//! Credential store: key generation, hashing, and resolution.
//!
//! Presented keys are opaque tokens with a fixed public prefix. Only the
//! SHA-256 hash is stored; the plaintext exists exactly once, in the
//! issuance response. Resolution maps a presented key to a
//! [`TenantContext`] or one of the ordered [`AuthFailure`] reasons.

mod keys;
mod resolver;

pub use keys::{generate_key, hash_key, KeyMaterial, DEFAULT_CREDENTIAL_PREFIX, KEY_HEX_LENGTH};
pub use resolver::{AuthFailure, CredentialResolver, TenantContext};
