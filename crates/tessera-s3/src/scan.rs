//! Feeds a [`Listing`] from the metadata store in batches

use crate::listing::{Listable, Listing, ListingResult, Step};
use tessera_common::Result;
use tessera_meta_store::{KeyEntry, ListOptions, MetadataStore};
use tracing::{debug, error};

/// Scan `bucket_id` from `start_after` and run `listing` to completion.
///
/// `decode` turns a store entry into a listable value; the first entry it
/// fails on aborts the scan with that error. The scan stops as soon as the
/// listing is done, so a truncated page costs at most one extra batch.
pub async fn run_listing<T, F>(
    store: &dyn MetadataStore,
    bucket_id: &str,
    mut listing: Listing<T>,
    start_after: Option<String>,
    batch_size: usize,
    mut decode: F,
) -> Result<ListingResult<T>>
where
    T: Listable,
    F: FnMut(KeyEntry) -> Result<T>,
{
    let batch_size = batch_size.max(1);
    let prefix = listing.store_prefix().to_string();
    let mut cursor = start_after;
    let mut batches = 0usize;

    'scan: loop {
        let mut options = ListOptions::new(prefix.clone(), batch_size);
        if let Some(after) = cursor.take() {
            options = options.start_after(after);
        }
        let entries = store.list(bucket_id, &options).await?;
        batches += 1;
        let exhausted = entries.len() < batch_size;

        for entry in entries {
            cursor = Some(entry.key.clone());
            if listing.push(decode(entry)?) == Step::Done {
                break 'scan;
            }
        }

        if exhausted {
            break;
        }
    }

    debug!(bucket_id, batches, prefix = %prefix.escape_debug(), "Listing scan finished");
    Ok(listing.finish())
}

/// Decode a bincode record stored under `entry.key`
pub fn decode_entry<T: serde::de::DeserializeOwned>(bucket_id: &str, entry: &KeyEntry) -> Result<T> {
    entry.decode().map_err(|e| {
        error!(bucket_id, key = %entry.key.escape_debug(), "Undecodable record: {}", e);
        e.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::ListingParams;
    use serde::{Deserialize, Serialize};
    use tessera_common::Error;
    use tessera_meta_store::{MemoryStore, encode_record};

    #[derive(Debug)]
    struct Key(String);

    impl Listable for Key {
        fn listing_key(&self) -> &str {
            &self.0
        }
    }

    async fn store_with(keys: &[&str]) -> MemoryStore {
        let store = MemoryStore::new();
        for key in keys {
            store.put("b", key, Vec::new()).await.unwrap();
        }
        store
    }

    fn decode(entry: KeyEntry) -> Result<Key> {
        Ok(Key(entry.key))
    }

    #[tokio::test]
    async fn test_scan_across_batches() {
        let keys: Vec<String> = (0..25).map(|i| format!("k{i:02}")).collect();
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let store = store_with(&refs).await;

        let params = ListingParams {
            max_keys: 1000,
            ..ListingParams::default()
        };
        let result = run_listing(&store, "b", Listing::new(params), None, 4, decode)
            .await
            .unwrap();
        assert_eq!(result.contents.len(), 25);
        assert!(!result.is_truncated);
    }

    #[tokio::test]
    async fn test_scan_stops_when_page_full() {
        let store = store_with(&["a", "b", "c", "d", "e"]).await;
        let params = ListingParams {
            max_keys: 2,
            ..ListingParams::default()
        };
        let result = run_listing(&store, "b", Listing::new(params), None, 2, decode)
            .await
            .unwrap();
        let keys: Vec<_> = result.contents.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, ["a", "b"]);
        assert!(result.is_truncated);
    }

    #[tokio::test]
    async fn test_group_spanning_batches() {
        let store = store_with(&["d/1", "d/2", "d/3", "d/4", "d/5", "e"]).await;
        let params = ListingParams {
            delimiter: Some("/".into()),
            max_keys: 1,
            ..ListingParams::default()
        };
        let result = run_listing(&store, "b", Listing::new(params), None, 2, decode)
            .await
            .unwrap();
        assert_eq!(result.common_prefixes, ["d/"]);
        assert!(result.is_truncated);
        assert_eq!(result.next_marker.unwrap().key, "d/5");
    }

    #[tokio::test]
    async fn test_scan_honors_start_after_and_prefix() {
        let store = store_with(&["x/1", "x/2", "x/3", "y/1"]).await;
        let params = ListingParams {
            prefix: "x/".into(),
            max_keys: 1000,
            ..ListingParams::default()
        };
        let result = run_listing(
            &store,
            "b",
            Listing::new(params),
            Some("x/1".into()),
            10,
            decode,
        )
        .await
        .unwrap();
        let keys: Vec<_> = result.contents.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, ["x/2", "x/3"]);
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Record {
        size: u64,
    }

    impl Listable for (String, Record) {
        fn listing_key(&self) -> &str {
            &self.0
        }
    }

    #[tokio::test]
    async fn test_corrupt_record_fails_scan() {
        let store = MemoryStore::new();
        store
            .put("b", "a", encode_record(&Record { size: 1 }).unwrap())
            .await
            .unwrap();
        store.put("b", "b", vec![0xff, 0x01]).await.unwrap();

        let params = ListingParams {
            max_keys: 1000,
            ..ListingParams::default()
        };
        let result = run_listing(&store, "b", Listing::new(params), None, 10, |entry| {
            let value = decode_entry::<Record>("b", &entry)?;
            Ok((entry.key, value))
        })
        .await;
        assert!(matches!(result, Err(Error::Serialization(_))));
    }
}
