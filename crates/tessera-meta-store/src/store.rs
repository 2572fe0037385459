//! The metadata store contract shared by every backend.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Error type for metadata store operations
#[derive(Debug, thiserror::Error)]
pub enum MetaStoreError {
    #[error("no such key: {bucket_id}/{key}")]
    NoSuchKey { bucket_id: String, key: String },
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redb::TransactionError> for MetaStoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl MetaStoreError {
    pub(crate) fn no_such_key(bucket_id: &str, key: &str) -> Self {
        Self::NoSuchKey {
            bucket_id: bucket_id.to_string(),
            key: key.to_string(),
        }
    }

    /// Check if the lookup simply missed
    #[must_use]
    pub const fn is_no_such_key(&self) -> bool {
        matches!(self, Self::NoSuchKey { .. })
    }
}

impl From<MetaStoreError> for tessera_common::Error {
    fn from(e: MetaStoreError) -> Self {
        match e {
            MetaStoreError::NoSuchKey { bucket_id, key } => Self::ObjectNotFound {
                bucket: bucket_id,
                key,
            },
            MetaStoreError::Bincode(e) => Self::Serialization(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

pub type MetaStoreResult<T> = Result<T, MetaStoreError>;

/// One stored key and its value, as returned by [`MetadataStore::list`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyEntry {
    pub key: String,
    pub value: Vec<u8>,
}

impl KeyEntry {
    pub fn new(key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// Decode the value as a bincode record
    pub fn decode<T: DeserializeOwned>(&self) -> MetaStoreResult<T> {
        decode_record(&self.value)
    }
}

/// Range selection for [`MetadataStore::list`]
#[derive(Clone, Debug, Default)]
pub struct ListOptions {
    /// Only keys starting with this prefix
    pub prefix: String,
    /// Only keys strictly greater than this one
    pub start_after: Option<String>,
    /// Maximum number of entries to return
    pub limit: usize,
}

impl ListOptions {
    pub fn new(prefix: impl Into<String>, limit: usize) -> Self {
        Self {
            prefix: prefix.into(),
            start_after: None,
            limit,
        }
    }

    #[must_use]
    pub fn start_after(mut self, key: impl Into<String>) -> Self {
        self.start_after = Some(key.into());
        self
    }

    /// Whether `key` falls inside this selection (ignoring the limit)
    pub(crate) fn admits(&self, key: &str) -> bool {
        key.starts_with(&self.prefix)
            && self.start_after.as_deref().is_none_or(|after| key > after)
    }

    /// The smallest key the selection can return
    pub(crate) fn lower_bound(&self) -> &str {
        match self.start_after.as_deref() {
            Some(after) if after > self.prefix.as_str() => after,
            _ => &self.prefix,
        }
    }
}

/// Key-value interface the API layer is written against.
///
/// Each single-key operation is atomic; nothing spans keys.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Fetch the value stored under `key`, failing with `NoSuchKey`
    async fn get(&self, bucket_id: &str, key: &str) -> MetaStoreResult<Vec<u8>>;

    /// Store `value` under `key`, replacing any previous value
    async fn put(&self, bucket_id: &str, key: &str, value: Vec<u8>) -> MetaStoreResult<()>;

    /// Remove `key`; removing an absent key is not an error
    async fn delete(&self, bucket_id: &str, key: &str) -> MetaStoreResult<()>;

    /// Entries selected by `options`, ascending by key
    async fn list(&self, bucket_id: &str, options: &ListOptions)
    -> MetaStoreResult<Vec<KeyEntry>>;
}

/// Serialize a record for storage
pub fn encode_record<T: Serialize>(value: &T) -> MetaStoreResult<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

/// Deserialize a stored record
pub fn decode_record<T: DeserializeOwned>(bytes: &[u8]) -> MetaStoreResult<T> {
    Ok(bincode::deserialize(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_options_admits() {
        let opts = ListOptions::new("photos/", 10).start_after("photos/b");
        assert!(!opts.admits("photos/a"));
        assert!(!opts.admits("photos/b"));
        assert!(opts.admits("photos/c"));
        assert!(!opts.admits("video/c"));
    }

    #[test]
    fn test_list_options_lower_bound() {
        let opts = ListOptions::new("m", 10);
        assert_eq!(opts.lower_bound(), "m");
        assert_eq!(opts.clone().start_after("a").lower_bound(), "m");
        assert_eq!(opts.start_after("mz").lower_bound(), "mz");
    }

    #[test]
    fn test_no_such_key_maps_to_not_found() {
        let err: tessera_common::Error = MetaStoreError::no_such_key("b", "k").into();
        assert!(err.is_not_found());
        assert_eq!(err.s3_error_code(), "NoSuchKey");
    }
}
