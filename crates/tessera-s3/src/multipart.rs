//! Multipart upload registry
//!
//! Upload and part records live in the bucket's shadow keyspace (see
//! [`crate::mpu_key`]). Listing uploads runs the shared listing engine over
//! the overview keys, so uploads page exactly like objects do.

use crate::listing::{Listable, Listing, ListingParams, ListingResult};
use crate::mpu_key;
use crate::records::{PartRecord, UploadRecord};
use crate::scan::{decode_entry, run_listing};
use std::sync::Arc;
use tessera_common::{Error, ResourceUid, Result};
use tessera_meta_store::{ListOptions, MetadataStore, decode_record, encode_record};
use tracing::{debug, warn};

/// An upload as seen by the listing engine
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadEntry {
    listing_key: String,
    pub record: UploadRecord,
}

impl Listable for UploadEntry {
    fn listing_key(&self) -> &str {
        &self.listing_key
    }

    fn secondary_key(&self) -> Option<&str> {
        Some(&self.record.upload_id)
    }
}

/// Registry of in-flight multipart uploads
pub struct MultipartRegistry {
    store: Arc<dyn MetadataStore>,
    batch_size: usize,
}

impl MultipartRegistry {
    pub fn new(store: Arc<dyn MetadataStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Record a new upload
    pub async fn initiate(&self, uid: &ResourceUid, upload: &UploadRecord) -> Result<()> {
        let key = mpu_key::encode_overview_key(&upload.key, &upload.upload_id)?;
        self.store
            .put(&mpu_key::shadow_bucket_id(uid), &key, encode_record(upload)?)
            .await?;
        debug!(upload_id = %upload.upload_id, key = %upload.key, "Initiated multipart upload");
        Ok(())
    }

    /// Look up an upload, failing `NoSuchUpload`
    pub async fn get_upload(
        &self,
        uid: &ResourceUid,
        object_key: &str,
        upload_id: &str,
    ) -> Result<UploadRecord> {
        let no_such_upload = || Error::NoSuchUpload {
            upload_id: upload_id.to_string(),
        };
        let Ok(key) = mpu_key::encode_overview_key(object_key, upload_id) else {
            return Err(no_such_upload());
        };
        match self.store.get(&mpu_key::shadow_bucket_id(uid), &key).await {
            Ok(bytes) => Ok(decode_record(&bytes)?),
            Err(e) if e.is_no_such_key() => Err(no_such_upload()),
            Err(e) => Err(e.into()),
        }
    }

    /// Store a part, replacing any earlier upload of the same number
    pub async fn put_part(&self, uid: &ResourceUid, upload_id: &str, part: &PartRecord) -> Result<()> {
        let key = mpu_key::encode_part_key(upload_id, part.part_number)?;
        self.store
            .put(&mpu_key::shadow_bucket_id(uid), &key, encode_record(part)?)
            .await?;
        Ok(())
    }

    /// All parts of an upload in part-number order
    pub async fn parts(&self, uid: &ResourceUid, upload_id: &str) -> Result<Vec<PartRecord>> {
        let bucket_id = mpu_key::shadow_bucket_id(uid);
        let prefix = mpu_key::part_prefix(upload_id)?;
        let mut parts = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut options = ListOptions::new(prefix.clone(), self.batch_size);
            if let Some(after) = cursor.take() {
                options = options.start_after(after);
            }
            let entries = self.store.list(&bucket_id, &options).await?;
            let exhausted = entries.len() < self.batch_size;
            for entry in entries {
                parts.push(decode_entry::<PartRecord>(&bucket_id, &entry)?);
                cursor = Some(entry.key);
            }
            if exhausted {
                break;
            }
        }
        Ok(parts)
    }

    /// Forget an upload and its parts.
    ///
    /// Parts go first and the overview record last, so a failed removal
    /// leaves the upload visible and the caller can retry it.
    pub async fn remove(&self, uid: &ResourceUid, object_key: &str, upload_id: &str) -> Result<()> {
        let bucket_id = mpu_key::shadow_bucket_id(uid);
        let key = mpu_key::encode_overview_key(object_key, upload_id)?;

        for part in self.parts(uid, upload_id).await? {
            let part_key = mpu_key::encode_part_key(upload_id, part.part_number)?;
            self.store.delete(&bucket_id, &part_key).await.map_err(|e| {
                warn!(upload_id, part = part.part_number, "Failed to delete part record: {}", e);
                Error::from(e)
            })?;
        }
        self.store.delete(&bucket_id, &key).await?;
        debug!(upload_id, key = %object_key, "Removed multipart upload");
        Ok(())
    }

    /// One page of uploads
    pub async fn list_uploads(
        &self,
        uid: &ResourceUid,
        params: ListingParams,
    ) -> Result<ListingResult<UploadEntry>> {
        let bucket_id = mpu_key::shadow_bucket_id(uid);
        let start_after = match &params.marker {
            Some(marker) => Some(mpu_key::upload_scan_start(
                &marker.key,
                marker.secondary.as_deref(),
            )?),
            None => None,
        };
        let listing = Listing::new(params);
        run_listing(
            self.store.as_ref(),
            &bucket_id,
            listing,
            start_after,
            self.batch_size,
            |entry| {
                let (object_key, _) = mpu_key::decode_overview_key(&entry.key).ok_or_else(|| {
                    Error::Internal(format!("malformed upload key {:?}", entry.key))
                })?;
                let listing_key = mpu_key::overview_listing_key(object_key)?;
                let record = decode_entry::<UploadRecord>(&bucket_id, &entry)?;
                Ok(UploadEntry {
                    listing_key,
                    record,
                })
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::Marker;
    use chrono::Utc;
    use tessera_auth::Acl;
    use tessera_common::{BucketName, Owner};
    use async_trait::async_trait;
    use tessera_meta_store::{KeyEntry, MemoryStore, MetaStoreError, MetaStoreResult};

    /// Memory store whose deletes of part records fail
    struct PartDeleteFails(MemoryStore);

    #[async_trait]
    impl MetadataStore for PartDeleteFails {
        async fn get(&self, bucket_id: &str, key: &str) -> MetaStoreResult<Vec<u8>> {
            self.0.get(bucket_id, key).await
        }

        async fn put(&self, bucket_id: &str, key: &str, value: Vec<u8>) -> MetaStoreResult<()> {
            self.0.put(bucket_id, key, value).await
        }

        async fn delete(&self, bucket_id: &str, key: &str) -> MetaStoreResult<()> {
            if key.starts_with("part") {
                return Err(MetaStoreError::Io(std::io::Error::other("disk full")));
            }
            self.0.delete(bucket_id, key).await
        }

        async fn list(
            &self,
            bucket_id: &str,
            options: &ListOptions,
        ) -> MetaStoreResult<Vec<KeyEntry>> {
            self.0.list(bucket_id, options).await
        }
    }

    fn uid() -> ResourceUid {
        ResourceUid::derive("default", &BucketName::new("bucket").unwrap())
    }

    fn upload(key: &str, upload_id: &str) -> UploadRecord {
        let owner = Owner::new("owner-id", "owner");
        UploadRecord {
            upload_id: upload_id.to_string(),
            key: key.to_string(),
            initiator: owner.clone(),
            owner,
            storage_class: "STANDARD".into(),
            initiated_at: Utc::now(),
            acl: Acl::private(),
            content_type: None,
        }
    }

    fn part(part_number: u32) -> PartRecord {
        PartRecord {
            part_number,
            etag: format!("{part_number:032x}"),
            size: 5,
            last_modified: Utc::now(),
        }
    }

    fn registry(batch_size: usize) -> (Arc<MemoryStore>, MultipartRegistry) {
        let store = Arc::new(MemoryStore::new());
        let registry = MultipartRegistry::new(store.clone(), batch_size);
        (store, registry)
    }

    fn params(max_keys: usize) -> ListingParams {
        ListingParams {
            namespace: mpu_key::overview_namespace(),
            max_keys,
            ..ListingParams::default()
        }
    }

    #[tokio::test]
    async fn test_initiate_and_get() {
        let (_, registry) = registry(10);
        registry.initiate(&uid(), &upload("k", "u1")).await.unwrap();
        let record = registry.get_upload(&uid(), "k", "u1").await.unwrap();
        assert_eq!(record.upload_id, "u1");

        let err = registry.get_upload(&uid(), "k", "u2").await.unwrap_err();
        assert!(matches!(err, Error::NoSuchUpload { .. }));
        let err = registry.get_upload(&uid(), "other", "u1").await.unwrap_err();
        assert!(matches!(err, Error::NoSuchUpload { .. }));
    }

    #[tokio::test]
    async fn test_parts_in_order_across_batches() {
        let (_, registry) = registry(2);
        for n in [3, 1, 12, 2, 5] {
            registry.put_part(&uid(), "u1", &part(n)).await.unwrap();
        }
        registry.put_part(&uid(), "u2", &part(4)).await.unwrap();

        let numbers: Vec<_> = registry
            .parts(&uid(), "u1")
            .await
            .unwrap()
            .iter()
            .map(|p| p.part_number)
            .collect();
        assert_eq!(numbers, [1, 2, 3, 5, 12]);
    }

    #[tokio::test]
    async fn test_remove_clears_shadow_keys() {
        let (store, registry) = registry(10);
        registry.initiate(&uid(), &upload("k", "u1")).await.unwrap();
        registry.put_part(&uid(), "u1", &part(1)).await.unwrap();
        registry.put_part(&uid(), "u1", &part(2)).await.unwrap();

        registry.remove(&uid(), "k", "u1").await.unwrap();
        assert_eq!(store.len(&mpu_key::shadow_bucket_id(&uid())), 0);
        assert!(registry.get_upload(&uid(), "k", "u1").await.is_err());
    }

    #[tokio::test]
    async fn test_remove_propagates_part_delete_failure() {
        let store = Arc::new(PartDeleteFails(MemoryStore::new()));
        let registry = MultipartRegistry::new(store, 10);
        registry.initiate(&uid(), &upload("k", "u1")).await.unwrap();
        registry.put_part(&uid(), "u1", &part(1)).await.unwrap();

        let err = registry.remove(&uid(), "k", "u1").await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        // The upload stays visible so the removal can be retried
        assert!(registry.get_upload(&uid(), "k", "u1").await.is_ok());
        assert_eq!(registry.parts(&uid(), "u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_uploads_rejects_corrupt_record() {
        let (store, registry) = registry(10);
        registry.initiate(&uid(), &upload("a", "1")).await.unwrap();
        let key = mpu_key::encode_overview_key("b", "1").unwrap();
        store
            .put(&mpu_key::shadow_bucket_id(&uid()), &key, vec![0xff, 0x01])
            .await
            .unwrap();

        let err = registry.list_uploads(&uid(), params(1000)).await.unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[tokio::test]
    async fn test_list_uploads_order_and_markers() {
        let (_, registry) = registry(2);
        for (key, id) in [("b", "1"), ("a", "2"), ("a", "1"), ("c/x", "1"), ("c/y", "1")] {
            registry.initiate(&uid(), &upload(key, id)).await.unwrap();
        }
        registry.put_part(&uid(), "1", &part(1)).await.unwrap();

        let result = registry.list_uploads(&uid(), params(1000)).await.unwrap();
        let listed: Vec<_> = result
            .contents
            .iter()
            .map(|m| (m.key.as_str(), m.entry.record.upload_id.as_str()))
            .collect();
        assert_eq!(listed, [("a", "1"), ("a", "2"), ("b", "1"), ("c/x", "1"), ("c/y", "1")]);

        let mut p = params(1000);
        p.delimiter = Some("/".into());
        p.marker = Some(Marker::new("a").with_secondary("1"));
        let result = registry.list_uploads(&uid(), p).await.unwrap();
        let keys: Vec<_> = result.contents.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, ["a", "b"]);
        assert_eq!(result.common_prefixes, ["c/"]);

        let mut p = params(1000);
        p.marker = Some(Marker::new("a"));
        let result = registry.list_uploads(&uid(), p).await.unwrap();
        assert_eq!(result.contents[0].key, "b");
    }

    #[tokio::test]
    async fn test_list_uploads_truncation() {
        let (_, registry) = registry(10);
        for id in ["1", "2", "3"] {
            registry.initiate(&uid(), &upload("k", id)).await.unwrap();
        }
        let result = registry.list_uploads(&uid(), params(2)).await.unwrap();
        assert!(result.is_truncated);
        assert_eq!(result.next_marker, Some(Marker::new("k").with_secondary("2")));
    }
}
