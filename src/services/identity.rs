//! Deterministic identities for vendors and documents.
//!
//! Every identity is a SHA-256 over length-prefixed fields, so equal inputs
//! always map to the same key and re-crawling unchanged content rewrites the
//! same items.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, error};

use crate::config::DocumentsLocation;
use crate::models::{Document, Vendor};
use crate::storage::{BlobChecksums, BlobStore, StoreResult};

fn update_u32_prefixed(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u32).to_le_bytes());
    hasher.update(bytes);
}

fn update_u64_prefixed(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Identity of a vendor.
///
/// Status codes are sorted before hashing, so the order the portal lists them
/// in never changes the result.
pub fn vendor_id(vendor: &Vendor) -> String {
    let mut status: Vec<&str> = vendor.status.iter().map(String::as_str).collect();
    status.sort_unstable();

    let mut hasher = Sha256::new();
    update_u32_prefixed(&mut hasher, vendor.company_name.as_bytes());
    update_u32_prefixed(&mut hasher, vendor.email.as_bytes());
    update_u32_prefixed(&mut hasher, vendor.phone.as_bytes());
    hasher.update((status.len() as u32).to_le_bytes());
    for code in status {
        update_u32_prefixed(&mut hasher, code.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Content digest of a document payload.
///
/// Keeps the running hash state so the record identity can be extended from
/// the blob digest without hashing the bytes twice.
#[derive(Clone)]
pub struct BlobDigest {
    state: Sha256,
    digest: [u8; 32],
    md5: [u8; 16],
    content_length: u64,
}

impl BlobDigest {
    pub fn compute(contents: &[u8]) -> Self {
        let mut state = Sha256::new();
        state.update(contents);
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&state.clone().finalize());
        Self {
            state,
            digest,
            md5: md5::compute(contents).0,
            content_length: contents.len() as u64,
        }
    }

    pub fn hex(&self) -> String {
        hex::encode(self.digest)
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    pub fn checksums(&self) -> BlobChecksums {
        BlobChecksums::from_digests(&self.digest, &self.md5, self.content_length)
    }

    /// Record identity: the payload digest extended with the length, URL,
    /// filename and content type.
    pub fn record_id(&self, original_url: &str, filename: &str, content_type: &str) -> String {
        let mut hasher = self.state.clone();
        hasher.update(self.content_length.to_le_bytes());
        update_u64_prefixed(&mut hasher, original_url.as_bytes());
        update_u64_prefixed(&mut hasher, filename.as_bytes());
        update_u64_prefixed(&mut hasher, content_type.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// A document whose blob is known to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDocument {
    /// Metadata key.
    pub document_id: String,
    pub blob_key: String,
    pub blob_url: String,
    /// False when the blob already existed.
    pub uploaded: bool,
}

/// Stores document blobs at most once per distinct payload.
///
/// The existence check is an optimization and takes no lock: two concurrent
/// uploads of the same payload write identical bytes to the same key.
pub struct DedupEngine {
    blobs: Arc<dyn BlobStore>,
    location: DocumentsLocation,
}

impl DedupEngine {
    pub fn new(blobs: Arc<dyn BlobStore>, location: DocumentsLocation) -> Self {
        Self { blobs, location }
    }

    pub fn location(&self) -> &DocumentsLocation {
        &self.location
    }

    /// Ensure the document's bytes are stored, then compute its record identity.
    pub async fn resolve_document(&self, doc: &Document) -> StoreResult<ResolvedDocument> {
        let digest = BlobDigest::compute(&doc.contents);
        let bucket = &self.location.bucket;
        let blob_key = self.location.key_for(&digest.hex());

        let exists = match self.blobs.exists(bucket, &blob_key).await {
            Ok(exists) => exists,
            Err(e) => {
                error!(
                    "Failed to check blob {}/{} for document {} of {}: {}",
                    bucket, blob_key, doc.filename, doc.system_id, e
                );
                return Err(e);
            }
        };

        if exists {
            debug!("Blob {}/{} already stored; skipping upload", bucket, blob_key);
        } else if let Err(e) = self
            .blobs
            .put(bucket, &blob_key, &doc.contents, &digest.checksums())
            .await
        {
            error!(
                "Failed to write document {} to {}: {}",
                doc.filename,
                self.location.url_for(&blob_key),
                e
            );
            return Err(e);
        }

        Ok(ResolvedDocument {
            document_id: digest.record_id(&doc.original_url, &doc.filename, &doc.content_type),
            blob_url: self.location.url_for(&blob_key),
            blob_key,
            uploaded: !exists,
        })
    }
}
