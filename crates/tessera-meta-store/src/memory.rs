//! In-process metadata store.

use crate::store::{KeyEntry, ListOptions, MetaStoreError, MetaStoreResult, MetadataStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

/// Volatile metadata store: one ordered map per bucket id
#[derive(Default)]
pub struct MemoryStore {
    buckets: RwLock<HashMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys stored under `bucket_id`
    #[must_use]
    pub fn len(&self, bucket_id: &str) -> usize {
        self.buckets.read().get(bucket_id).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn get(&self, bucket_id: &str, key: &str) -> MetaStoreResult<Vec<u8>> {
        self.buckets
            .read()
            .get(bucket_id)
            .and_then(|entries| entries.get(key))
            .cloned()
            .ok_or_else(|| MetaStoreError::no_such_key(bucket_id, key))
    }

    async fn put(&self, bucket_id: &str, key: &str, value: Vec<u8>) -> MetaStoreResult<()> {
        self.buckets
            .write()
            .entry(bucket_id.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, bucket_id: &str, key: &str) -> MetaStoreResult<()> {
        let mut buckets = self.buckets.write();
        if let Some(entries) = buckets.get_mut(bucket_id) {
            entries.remove(key);
            if entries.is_empty() {
                buckets.remove(bucket_id);
            }
        }
        Ok(())
    }

    async fn list(
        &self,
        bucket_id: &str,
        options: &ListOptions,
    ) -> MetaStoreResult<Vec<KeyEntry>> {
        let buckets = self.buckets.read();
        let Some(entries) = buckets.get(bucket_id) else {
            return Ok(Vec::new());
        };

        let bounds = (Bound::Included(options.lower_bound()), Bound::Unbounded);
        let result = entries
            .range::<str, _>(bounds)
            .take_while(|(key, _)| key.starts_with(&options.prefix))
            .filter(|(key, _)| options.admits(key))
            .take(options.limit)
            .map(|(key, value)| KeyEntry::new(key.clone(), value.clone()))
            .collect();
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        for key in ["a/1", "a/2", "b/1", "b/2", "c"] {
            store.put("bkt", key, key.as_bytes().to_vec()).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let store = seeded().await;
        let err = store.get("bkt", "zzz").await.unwrap_err();
        assert!(err.is_no_such_key());
        let err = store.get("other", "a/1").await.unwrap_err();
        assert!(err.is_no_such_key());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = seeded().await;
        store.put("bkt", "c", b"new".to_vec()).await.unwrap();
        assert_eq!(store.get("bkt", "c").await.unwrap(), b"new");
        assert_eq!(store.len("bkt"), 5);
    }

    #[tokio::test]
    async fn test_list_prefix_and_start_after() {
        let store = seeded().await;

        let all = store.list("bkt", &ListOptions::new("", 100)).await.unwrap();
        let keys: Vec<_> = all.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["a/1", "a/2", "b/1", "b/2", "c"]);

        let b = store.list("bkt", &ListOptions::new("b/", 100)).await.unwrap();
        assert_eq!(b.len(), 2);

        let resumed = store
            .list("bkt", &ListOptions::new("", 2).start_after("a/2"))
            .await
            .unwrap();
        let keys: Vec<_> = resumed.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["b/1", "b/2"]);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = seeded().await;
        store.delete("bkt", "a/1").await.unwrap();
        store.delete("bkt", "a/1").await.unwrap();
        store.delete("nope", "a/1").await.unwrap();
        assert_eq!(store.len("bkt"), 4);
    }
}
