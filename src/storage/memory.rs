//! In-memory store backends.
//!
//! Used for tests and dry runs. Operation counters let callers check how
//! many writes a crawl actually issued.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    checksum_mismatch, item_key, merge_preserved, union_into, BlobChecksums, BlobStore, Item,
    ItemKey, KvStore, StoreResult,
};

type Tables = HashMap<String, HashMap<String, Item>>;

/// In-memory key-value store.
#[derive(Clone, Default)]
pub struct InMemoryKvStore {
    tables: Arc<RwLock<Tables>>,
    puts: Arc<AtomicUsize>,
    set_adds: Arc<AtomicUsize>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `put_item` calls, per the whole store.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::Relaxed)
    }

    /// Number of `add_to_set` calls.
    pub fn set_add_count(&self) -> usize {
        self.set_adds.load(Ordering::Relaxed)
    }

    /// Number of items in `table`.
    pub async fn len(&self, table: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table)
            .map(|t| t.len())
            .unwrap_or(0)
    }

    /// All items in `table`, in no particular order.
    pub async fn items(&self, table: &str) -> Vec<Item> {
        self.tables
            .read()
            .await
            .get(table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn put_item(
        &self,
        table: &str,
        key_attribute: &str,
        item: Item,
        preserve: &[&str],
    ) -> StoreResult<()> {
        let key = item_key(table, key_attribute, &item)?;
        self.puts.fetch_add(1, Ordering::Relaxed);

        let mut tables = self.tables.write().await;
        let entries = tables.entry(table.to_string()).or_default();
        let merged = merge_preserved(entries.get(&key.value), item, preserve);
        entries.insert(key.value, merged);
        Ok(())
    }

    async fn add_to_set(
        &self,
        table: &str,
        key: &ItemKey,
        attribute: &str,
        values: BTreeSet<String>,
    ) -> StoreResult<()> {
        self.set_adds.fetch_add(1, Ordering::Relaxed);

        let mut tables = self.tables.write().await;
        let item = tables
            .entry(table.to_string())
            .or_default()
            .entry(key.value.clone())
            .or_default();
        union_into(item, table, key, attribute, &values)
    }

    async fn get_item(&self, table: &str, key: &ItemKey) -> StoreResult<Option<Item>> {
        Ok(self
            .tables
            .read()
            .await
            .get(table)
            .and_then(|t| t.get(&key.value))
            .cloned())
    }
}

/// In-memory blob store.
#[derive(Clone, Default)]
pub struct InMemoryBlobStore {
    blobs: Arc<RwLock<HashMap<(String, String), Vec<u8>>>>,
    puts: Arc<AtomicUsize>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of uploads issued.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::Relaxed)
    }

    /// Number of distinct stored blobs.
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.blobs
            .read()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn exists(&self, bucket: &str, key: &str) -> StoreResult<bool> {
        Ok(self
            .blobs
            .read()
            .await
            .contains_key(&(bucket.to_string(), key.to_string())))
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
        self.puts.fetch_add(1, Ordering::Relaxed);
        self.blobs
            .write()
            .await
            .insert((bucket.to_string(), key.to_string()), bytes.to_vec());
        Ok(())
    }
}
