//! Filesystem store backends for local runs.
//!
//! Key-value items live at `{root}/{table}/{key}.json`; blobs at
//! `{root}/{bucket}/{key}`.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    checksum_mismatch, item_key, merge_preserved, union_into, BlobChecksums, BlobStore, Item,
    ItemKey, KvStore, StoreError, StoreResult,
};

/// Key-value store keeping one JSON document per item.
pub struct FsKvStore {
    root: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FsKvStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Mutex::new(()),
        }
    }

    fn item_path(&self, table: &str, key: &str) -> PathBuf {
        self.root
            .join(urlencoding::encode(table).as_ref())
            .join(format!("{}.json", urlencoding::encode(key)))
    }

    async fn read(&self, path: &Path) -> StoreResult<Option<Item>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, path: &Path, item: &Item) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(item)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for FsKvStore {
    async fn put_item(
        &self,
        table: &str,
        key_attribute: &str,
        item: Item,
        preserve: &[&str],
    ) -> StoreResult<()> {
        let key = item_key(table, key_attribute, &item)?;
        let path = self.item_path(table, &key.value);

        let _guard = self.lock.lock().await;
        let existing = if preserve.is_empty() {
            None
        } else {
            self.read(&path).await?
        };
        let merged = merge_preserved(existing.as_ref(), item, preserve);
        debug!("Writing {} to {:?}", key.value, path);
        self.write(&path, &merged).await
    }

    async fn add_to_set(
        &self,
        table: &str,
        key: &ItemKey,
        attribute: &str,
        values: BTreeSet<String>,
    ) -> StoreResult<()> {
        let path = self.item_path(table, &key.value);

        let _guard = self.lock.lock().await;
        let mut item = self.read(&path).await?.unwrap_or_default();
        union_into(&mut item, table, key, attribute, &values)?;
        self.write(&path, &item).await
    }

    async fn get_item(&self, table: &str, key: &ItemKey) -> StoreResult<Option<Item>> {
        self.read(&self.item_path(table, &key.value)).await
    }
}

/// Blob store writing each object to a file.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the object path, refusing keys that escape the bucket.
    fn blob_path(&self, bucket: &str, key: &str) -> StoreResult<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(StoreError::Blob {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: "invalid object key".to_string(),
            });
        }
        Ok(self
            .root
            .join(urlencoding::encode(bucket).as_ref())
            .join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn exists(&self, bucket: &str, key: &str) -> StoreResult<bool> {
        let path = self.blob_path(bucket, key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        checksums: &BlobChecksums,
    ) -> StoreResult<()> {
        if !checksums.verify(bytes) {
            return Err(checksum_mismatch(bucket, key));
        }
        let path = self.blob_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::AttributeValue;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_fs_kv_roundtrip_and_union() {
        let dir = tempdir().unwrap();
        let store = FsKvStore::new(dir.path());
        let key = ItemKey::new("VendorId", "abc/def");

        let mut item = Item::new();
        item.insert("VendorId".into(), AttributeValue::S("abc/def".into()));
        item.insert("CompanyName".into(), AttributeValue::S("Acme".into()));
        store.put_item("Vendors", "VendorId", item, &[]).await.unwrap();

        store
            .add_to_set("Vendors", &key, "Status", ["A".to_string()].into())
            .await
            .unwrap();

        let stored = store.get_item("Vendors", &key).await.unwrap().unwrap();
        assert_eq!(stored["CompanyName"], AttributeValue::S("Acme".into()));
        assert!(stored["Status"].as_set().unwrap().contains("A"));
    }

    #[tokio::test]
    async fn test_fs_kv_missing_item() {
        let dir = tempdir().unwrap();
        let store = FsKvStore::new(dir.path());
        let key = ItemKey::new("SystemId", "nope");
        assert!(store.get_item("Opportunities", &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fs_blob_put_and_exists() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let checksums = BlobChecksums::compute(b"pdf bytes");

        assert!(!store.exists("docs", "webs/abcd").await.unwrap());
        store.put("docs", "webs/abcd", b"pdf bytes", &checksums).await.unwrap();
        assert!(store.exists("docs", "webs/abcd").await.unwrap());
        assert_eq!(
            std::fs::read(dir.path().join("docs/webs/abcd")).unwrap(),
            b"pdf bytes"
        );
    }

    #[tokio::test]
    async fn test_fs_blob_rejects_escaping_key() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert!(store.exists("docs", "../etc/passwd").await.is_err());
    }
}
