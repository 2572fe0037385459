//! Metadata records persisted in the key-value store

use crate::listing::Listable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_auth::Acl;
use tessera_common::{Owner, ResourceUid};

/// Keyspace of the bucket directory (bucket name -> [`BucketRecord`])
pub const BUCKET_DIRECTORY: &str = "..buckets";

/// Default storage class reported for objects and uploads
pub const STANDARD_STORAGE_CLASS: &str = "STANDARD";

/// A bucket and its access control list
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRecord {
    pub name: String,
    pub uid: ResourceUid,
    pub owner: Owner,
    pub acl: Acl,
    pub created_at: DateTime<Utc>,
}

/// Object metadata, keyed by object key in the bucket's keyspace
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: u64,
    /// Hex digest, without quotes
    pub etag: String,
    pub last_modified: DateTime<Utc>,
    pub owner: Owner,
    pub content_type: Option<String>,
    pub storage_class: String,
    pub acl: Acl,
}

impl Listable for ObjectMetadata {
    fn listing_key(&self) -> &str {
        &self.key
    }
}

/// An in-flight multipart upload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub upload_id: String,
    pub key: String,
    pub initiator: Owner,
    pub owner: Owner,
    pub storage_class: String,
    pub initiated_at: DateTime<Utc>,
    /// ACL the completed object receives
    pub acl: Acl,
    pub content_type: Option<String>,
}

/// One uploaded part
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartRecord {
    pub part_number: u32,
    /// Hex digest, without quotes
    pub etag: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Quote a hex digest the way `ETag` values are sent
#[must_use]
pub fn quote_etag(etag: &str) -> String {
    format!("\"{etag}\"")
}

/// Strip surrounding quotes from a client-supplied `ETag`
#[must_use]
pub fn unquote_etag(etag: &str) -> &str {
    let etag = etag.trim();
    etag.strip_prefix('"')
        .and_then(|e| e.strip_suffix('"'))
        .unwrap_or(etag)
}

/// S3 timestamp format, e.g. `2010-11-10T20:48:33.000Z`
#[must_use]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
