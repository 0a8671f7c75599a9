//! Object-store seam and the in-process implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::BlobError;

/// Issued upload URLs stop working 24 h after minting.
pub const UPLOAD_URL_TTL: Duration = Duration::from_secs(24 * 3600);

type HmacSha256 = Hmac<Sha256>;

/// Metadata from a HEAD on a stored blob.
#[derive(Debug, Clone)]
pub struct BlobMeta {
    pub size_bytes: i64,
    pub content_type: Option<String>,
}

/// The object-store contract the capability issuer and the reactor
/// consume. Implementations are pluggable; the core never talks to a
/// store SDK directly.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create the uploads container if absent. Idempotent.
    async fn ensure_container(&self) -> Result<(), BlobError>;

    /// Mint a write-and-create-only URL bound to exactly this path and
    /// content type, valid until `expires_at`.
    async fn issue_upload_url(
        &self,
        blob_path: &str,
        content_type: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String, BlobError>;

    /// Mint a read-only URL for an existing blob.
    async fn issue_download_url(
        &self,
        blob_path: &str,
        ttl: Duration,
    ) -> Result<String, BlobError>;

    /// Blob metadata, `None` when the blob does not exist.
    async fn head(&self, blob_path: &str) -> Result<Option<BlobMeta>, BlobError>;
}

/// In-process object store with real capability semantics.
///
/// URLs carry an HMAC over `(path, content-type, permission, expiry)` and
/// uploads through [`MemoryObjectStore::upload_via_url`] verify it, so
/// expiry and binding behave as they would against a real store. Every
/// minted URL is tagged `x-lexflow-store=memory`; this implementation is
/// for tests and development only.
pub struct MemoryObjectStore {
    signing_key: Vec<u8>,
    container: Mutex<Option<()>>,
    blobs: Mutex<HashMap<String, BlobMeta>>,
    events: Option<tokio::sync::mpsc::UnboundedSender<String>>,
}

impl MemoryObjectStore {
    #[must_use]
    pub fn new(signing_key: impl Into<Vec<u8>>) -> Self {
        Self {
            signing_key: signing_key.into(),
            container: Mutex::new(None),
            blobs: Mutex::new(HashMap::new()),
            events: None,
        }
    }

    /// Like [`MemoryObjectStore::new`], but every completed upload also
    /// emits its blob path on the returned channel — the in-process
    /// stand-in for a real store's event feed.
    #[must_use]
    pub fn with_events(
        signing_key: impl Into<Vec<u8>>,
    ) -> (Self, tokio::sync::mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let mut store = Self::new(signing_key);
        store.events = Some(tx);
        (store, rx)
    }

    fn emit_written(&self, blob_path: &str) {
        if let Some(events) = &self.events {
            let _ = events.send(blob_path.to_string());
        }
    }

    fn sign(&self, blob_path: &str, content_type: &str, permission: &str, expires: i64) -> String {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.signing_key)
            .expect("HMAC accepts any key length");
        mac.update(blob_path.as_bytes());
        mac.update(b"\n");
        mac.update(content_type.as_bytes());
        mac.update(b"\n");
        mac.update(permission.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Simulate a client PUT against an issued upload URL. Verifies the
    /// signature, expiry, content-type binding, and create-only rule.
    pub fn upload_via_url(
        &self,
        url: &str,
        content_type: &str,
        bytes: usize,
    ) -> Result<(), BlobError> {
        let (path, query) = url
            .strip_prefix("https://blobs.lexflow.local/uploads/")
            .and_then(|rest| rest.split_once('?'))
            .ok_or_else(|| BlobError::InvalidPath(url.to_string()))?;

        let mut expires = None;
        let mut sig = None;
        let mut perm = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("se", v)) => expires = v.parse::<i64>().ok(),
                Some(("sig", v)) => sig = Some(v.to_string()),
                Some(("sp", v)) => perm = Some(v.to_string()),
                _ => {}
            }
        }
        let expires = expires.ok_or(BlobError::SignatureMismatch)?;
        let sig = sig.ok_or(BlobError::SignatureMismatch)?;
        let perm = perm.ok_or(BlobError::SignatureMismatch)?;

        if perm != "cw" {
            return Err(BlobError::SignatureMismatch);
        }
        if Utc::now().timestamp() > expires {
            return Err(BlobError::UrlExpired);
        }
        // Covers both forged tokens and content types the URL was not
        // bound to, since the content type is part of the signed string.
        if self.sign(path, content_type, &perm, expires) != sig {
            return Err(BlobError::SignatureMismatch);
        }

        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| BlobError::Store("store poisoned".to_string()))?;
        if blobs.contains_key(path) {
            return Err(BlobError::AlreadyExists(path.to_string()));
        }
        blobs.insert(
            path.to_string(),
            BlobMeta {
                size_bytes: bytes as i64,
                content_type: Some(content_type.to_string()),
            },
        );
        drop(blobs);
        self.emit_written(path);
        Ok(())
    }

    /// Place a blob directly, bypassing URL verification (test setup).
    pub fn put_direct(&self, blob_path: &str, size_bytes: i64, content_type: &str) {
        if let Ok(mut blobs) = self.blobs.lock() {
            blobs.insert(
                blob_path.to_string(),
                BlobMeta {
                    size_bytes,
                    content_type: Some(content_type.to_string()),
                },
            );
        }
        self.emit_written(blob_path);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn ensure_container(&self) -> Result<(), BlobError> {
        let mut container = self
            .container
            .lock()
            .map_err(|_| BlobError::Store("store poisoned".to_string()))?;
        container.get_or_insert(());
        Ok(())
    }

    async fn issue_upload_url(
        &self,
        blob_path: &str,
        content_type: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String, BlobError> {
        let expires = expires_at.timestamp();
        let sig = self.sign(blob_path, content_type, "cw", expires);
        Ok(format!(
            "https://blobs.lexflow.local/uploads/{blob_path}?sp=cw&se={expires}&sig={sig}&x-lexflow-store=memory"
        ))
    }

    async fn issue_download_url(
        &self,
        blob_path: &str,
        ttl: Duration,
    ) -> Result<String, BlobError> {
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        let sig = self.sign(blob_path, "", "r", expires);
        Ok(format!(
            "https://blobs.lexflow.local/uploads/{blob_path}?sp=r&se={expires}&sig={sig}&x-lexflow-store=memory"
        ))
    }

    async fn head(&self, blob_path: &str) -> Result<Option<BlobMeta>, BlobError> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|_| BlobError::Store("store poisoned".to_string()))?;
        Ok(blobs.get(blob_path).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryObjectStore {
        MemoryObjectStore::new(b"test-signing-key".to_vec())
    }

    #[tokio::test]
    async fn upload_url_round_trip() {
        let store = store();
        let expires = Utc::now() + chrono::Duration::hours(24);
        let url = store
            .issue_upload_url("acme/2026-03-14/abc_file.pdf", "application/pdf", expires)
            .await
            .unwrap();

        assert!(url.contains("x-lexflow-store=memory"));
        store
            .upload_via_url(&url, "application/pdf", 1024)
            .unwrap();

        let meta = store
            .head("acme/2026-03-14/abc_file.pdf")
            .await
            .unwrap()
            .expect("blob should exist");
        assert_eq!(meta.size_bytes, 1024);
    }

    #[tokio::test]
    async fn expired_url_is_rejected() {
        let store = store();
        let expires = Utc::now() - chrono::Duration::seconds(1);
        let url = store
            .issue_upload_url("p/2026-01-01/x_f.pdf", "application/pdf", expires)
            .await
            .unwrap();

        assert!(matches!(
            store.upload_via_url(&url, "application/pdf", 10),
            Err(BlobError::UrlExpired)
        ));
    }

    #[tokio::test]
    async fn wrong_content_type_is_rejected() {
        let store = store();
        let expires = Utc::now() + chrono::Duration::hours(1);
        let url = store
            .issue_upload_url("p/2026-01-01/x_f.pdf", "application/pdf", expires)
            .await
            .unwrap();

        assert!(matches!(
            store.upload_via_url(&url, "image/png", 10),
            Err(BlobError::SignatureMismatch)
        ));
    }

    #[tokio::test]
    async fn create_only_rejects_second_upload() {
        let store = store();
        let expires = Utc::now() + chrono::Duration::hours(1);
        let url = store
            .issue_upload_url("p/2026-01-01/x_f.pdf", "application/pdf", expires)
            .await
            .unwrap();

        store.upload_via_url(&url, "application/pdf", 10).unwrap();
        assert!(matches!(
            store.upload_via_url(&url, "application/pdf", 10),
            Err(BlobError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn tampered_signature_is_rejected() {
        let store = store();
        let expires = Utc::now() + chrono::Duration::hours(1);
        let url = store
            .issue_upload_url("p/2026-01-01/x_f.pdf", "application/pdf", expires)
            .await
            .unwrap();
        let tampered = url.replace("x_f.pdf", "y_f.pdf");

        assert!(matches!(
            store.upload_via_url(&tampered, "application/pdf", 10),
            Err(BlobError::SignatureMismatch)
        ));
    }

    #[tokio::test]
    async fn missing_blob_heads_none() {
        let store = store();
        assert!(store.head("nope/2026-01-01/x_f.pdf").await.unwrap().is_none());
    }
}
