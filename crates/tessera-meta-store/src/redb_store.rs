//! Persistent metadata store backed by redb.
//!
//! All bucket keyspaces share one table; a stored key is the bucket id, a
//! `/` and the caller's key. Bucket ids never contain `/`, so each bucket's
//! entries form one contiguous, correctly ordered range. Writes are
//! synchronous (write txn + commit).

use crate::store::{KeyEntry, ListOptions, MetaStoreError, MetaStoreResult, MetadataStore};
use crate::tables;
use async_trait::async_trait;
use redb::{Database, ReadableTable};
use std::path::Path;
use tracing::{debug, error};

/// Persistent metadata store backed by redb.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open (or create) the redb database at the given path.
    pub fn open(path: impl AsRef<Path>) -> MetaStoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Create the table eagerly so later read txns don't fail
        let write_txn = db.begin_write()?;
        {
            let _t = write_txn.open_table(tables::ENTRIES)?;
        }
        write_txn.commit()?;

        debug!("Opened redb metadata store at {}", path.display());
        Ok(Self { db })
    }

    fn scoped(bucket_id: &str, key: &str) -> String {
        format!("{bucket_id}/{key}")
    }
}

#[async_trait]
impl MetadataStore for RedbStore {
    async fn get(&self, bucket_id: &str, key: &str) -> MetaStoreResult<Vec<u8>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::ENTRIES)?;
        match table.get(Self::scoped(bucket_id, key).as_str())? {
            Some(val) => Ok(val.value().to_vec()),
            None => Err(MetaStoreError::no_such_key(bucket_id, key)),
        }
    }

    async fn put(&self, bucket_id: &str, key: &str, value: Vec<u8>) -> MetaStoreResult<()> {
        let scoped = Self::scoped(bucket_id, key);
        let result = (|| -> MetaStoreResult<()> {
            let write_txn = self.db.begin_write()?;
            {
                let mut table = write_txn.open_table(tables::ENTRIES)?;
                table.insert(scoped.as_str(), value.as_slice())?;
            }
            write_txn.commit()?;
            Ok(())
        })();
        if let Err(e) = &result {
            error!("Failed to persist '{}': {}", scoped, e);
        }
        result
    }

    async fn delete(&self, bucket_id: &str, key: &str) -> MetaStoreResult<()> {
        let scoped = Self::scoped(bucket_id, key);
        let result = (|| -> MetaStoreResult<()> {
            let write_txn = self.db.begin_write()?;
            {
                let mut table = write_txn.open_table(tables::ENTRIES)?;
                table.remove(scoped.as_str())?;
            }
            write_txn.commit()?;
            Ok(())
        })();
        if let Err(e) = &result {
            error!("Failed to delete '{}': {}", scoped, e);
        }
        result
    }

    async fn list(
        &self,
        bucket_id: &str,
        options: &ListOptions,
    ) -> MetaStoreResult<Vec<KeyEntry>> {
        let mut result = Vec::new();
        if options.limit == 0 {
            return Ok(result);
        }

        let scope = Self::scoped(bucket_id, "");
        let wanted = Self::scoped(bucket_id, &options.prefix);
        let start = Self::scoped(bucket_id, options.lower_bound());

        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::ENTRIES)?;
        for entry in table.range(start.as_str()..)? {
            let entry = entry?;
            let scoped_key = entry.0.value();
            if !scoped_key.starts_with(&wanted) {
                break;
            }
            let key = &scoped_key[scope.len()..];
            if !options.admits(key) {
                continue;
            }
            result.push(KeyEntry::new(key, entry.1.value().to_vec()));
            if result.len() >= options.limit {
                break;
            }
        }
        Ok(result)
    }
}
