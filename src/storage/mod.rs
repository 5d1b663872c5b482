//! Pluggable key-value and blob storage.
//!
//! The crawler writes metadata to a key-value store with set-union updates
//! and document bytes to a content-addressed blob store. Both are traits so
//! the in-memory backends can stand in for a remote service in tests.

mod fs;
mod memory;

pub use fs::{FsBlobStore, FsKvStore};
pub use memory::{InMemoryBlobStore, InMemoryKvStore};

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from store backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Key-value operation on {table} ({key}) failed: {message}")]
    Kv {
        table: String,
        key: String,
        message: String,
    },
    #[error("Blob operation on {bucket}/{key} failed: {message}")]
    Blob {
        bucket: String,
        key: String,
        message: String,
    },
    #[error("Item for {table} has no {attribute} key attribute")]
    MissingKey { table: String, attribute: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A typed attribute value, shaped like DynamoDB's wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    S(String),
    N(String),
    SS(BTreeSet<String>),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::S(s) | Self::N(s) => Some(s),
            Self::SS(_) => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::SS(set) => Some(set),
            _ => None,
        }
    }
}

/// A stored item: attribute name to value.
pub type Item = BTreeMap<String, AttributeValue>;

/// Key of a single item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemKey {
    pub attribute: String,
    pub value: String,
}

impl ItemKey {
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }
}

/// Read the key value out of an item.
pub(crate) fn item_key(table: &str, key_attribute: &str, item: &Item) -> StoreResult<ItemKey> {
    match item.get(key_attribute).and_then(|v| v.as_str()) {
        Some(value) => Ok(ItemKey::new(key_attribute, value)),
        None => Err(StoreError::MissingKey {
            table: table.to_string(),
            attribute: key_attribute.to_string(),
        }),
    }
}

/// Build the replacement for `existing`, keeping the `preserve` attributes.
pub(crate) fn merge_preserved(existing: Option<&Item>, mut item: Item, preserve: &[&str]) -> Item {
    if let Some(existing) = existing {
        for attr in preserve {
            if item.contains_key(*attr) {
                continue;
            }
            if let Some(value) = existing.get(*attr) {
                item.insert(attr.to_string(), value.clone());
            }
        }
    }
    item
}

/// Apply a set-union to `attribute`, creating the item when absent.
pub(crate) fn union_into(
    item: &mut Item,
    table: &str,
    key: &ItemKey,
    attribute: &str,
    values: &BTreeSet<String>,
) -> StoreResult<()> {
    item.entry(key.attribute.clone())
        .or_insert_with(|| AttributeValue::S(key.value.clone()));

    match item
        .entry(attribute.to_string())
        .or_insert_with(|| AttributeValue::SS(BTreeSet::new()))
    {
        AttributeValue::SS(set) => {
            set.extend(values.iter().cloned());
            Ok(())
        }
        _ => Err(StoreError::Kv {
            table: table.to_string(),
            key: key.value.clone(),
            message: format!("attribute {} is not a string set", attribute),
        }),
    }
}

/// Key-value metadata store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Replace the item keyed by `key_attribute`.
    ///
    /// Attributes named in `preserve` survive the overwrite when the new item
    /// does not carry them.
    async fn put_item(
        &self,
        table: &str,
        key_attribute: &str,
        item: Item,
        preserve: &[&str],
    ) -> StoreResult<()>;

    /// Add `values` to the string set `attribute` without reading it first.
    async fn add_to_set(
        &self,
        table: &str,
        key: &ItemKey,
        attribute: &str,
        values: BTreeSet<String>,
    ) -> StoreResult<()>;

    /// Fetch an item, if present.
    async fn get_item(&self, table: &str, key: &ItemKey) -> StoreResult<Option<Item>>;
}

/// Integrity checksums sent along with a blob upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobChecksums {
    /// Base64 SHA-256 of the payload.
    pub sha256_b64: String,
    /// Base64 MD5 of the payload, as carried in a `Content-MD5` header.
    pub content_md5_b64: String,
    pub content_length: u64,
}

impl BlobChecksums {
    pub fn compute(bytes: &[u8]) -> Self {
        Self::from_digests(&Sha256::digest(bytes), &md5::compute(bytes).0, bytes.len() as u64)
    }

    pub fn from_digests(sha256: &[u8], md5: &[u8], content_length: u64) -> Self {
        let b64 = &base64::engine::general_purpose::STANDARD;
        Self {
            sha256_b64: b64.encode(sha256),
            content_md5_b64: b64.encode(md5),
            content_length,
        }
    }

    /// Check a payload against these checksums.
    pub fn verify(&self, bytes: &[u8]) -> bool {
        bytes.len() as u64 == self.content_length && Self::compute(bytes) == *self
    }
}

/// Content-addressed blob store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn exists(&self, bucket: &str, key: &str) -> StoreResult<bool>;

    /// Upload `bytes`, rejecting payloads that fail `checksums`.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        checksums: &BlobChecksums,
    ) -> StoreResult<()>;
}

pub(crate) fn checksum_mismatch(bucket: &str, key: &str) -> StoreError {
    StoreError::Blob {
        bucket: bucket.to_string(),
        key: key.to_string(),
        message: "payload does not match its checksums".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_union_into_creates_item() {
        let mut item = Item::new();
        let key = ItemKey::new("SystemId", "ABC123");
        union_into(&mut item, "Opportunities", &key, "Vendors", &set(&["v1"])).unwrap();
        union_into(&mut item, "Opportunities", &key, "Vendors", &set(&["v1"])).unwrap();

        assert_eq!(item.get("SystemId"), Some(&AttributeValue::S("ABC123".into())));
        assert_eq!(item.get("Vendors").and_then(|v| v.as_set()).map(|s| s.len()), Some(1));
    }

    #[test]
    fn test_union_into_rejects_scalar() {
        let mut item = Item::new();
        item.insert("Vendors".into(), AttributeValue::S("oops".into()));
        let key = ItemKey::new("SystemId", "ABC123");
        assert!(union_into(&mut item, "Opportunities", &key, "Vendors", &set(&["v1"])).is_err());
    }

    #[test]
    fn test_merge_preserved_keeps_sets() {
        let mut existing = Item::new();
        existing.insert("Title".into(), AttributeValue::S("old".into()));
        existing.insert("Vendors".into(), AttributeValue::SS(set(&["v1"])));

        let mut item = Item::new();
        item.insert("SystemId".into(), AttributeValue::S("ABC123".into()));

        let merged = merge_preserved(Some(&existing), item, &["Vendors", "Documents"]);
        assert!(merged.get("Title").is_none());
        assert_eq!(merged.get("Vendors"), Some(&AttributeValue::SS(set(&["v1"]))));
        assert!(merged.get("Documents").is_none());
    }

    #[test]
    fn test_checksums_verify() {
        let checksums = BlobChecksums::compute(b"hello");
        assert!(checksums.verify(b"hello"));
        assert!(!checksums.verify(b"hellp"));
        assert_eq!(checksums.sha256_b64, "LPJNul+wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ=");
        assert_eq!(checksums.content_md5_b64, "XUFAKrxLKna5cZ2REBfFkg==");
    }

    #[test]
    fn test_checksums_reject_md5_mismatch() {
        let mut checksums = BlobChecksums::compute(b"hello");
        checksums.content_md5_b64 = BlobChecksums::compute(b"world").content_md5_b64;
        assert!(!checksums.verify(b"hello"));
    }
}
