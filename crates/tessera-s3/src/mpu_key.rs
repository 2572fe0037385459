//! Key layout of the multipart shadow bucket
//!
//! Every bucket has a shadow keyspace, `mpu...<bucket uid>`, holding its
//! in-flight multipart uploads:
//!
//! ```text
//! overview\0<object key>\0<upload id>            upload record
//! part\0<upload id>\0<part number, 5 digits>     part record
//! ```
//!
//! Byte order of overview keys equals `(object key, upload id)` order
//! because the splitter sorts below every other byte. Object keys that
//! contain the splitter cannot be represented and are rejected.

use tessera_common::{Error, ResourceUid, Result};

/// Separator between key components
pub const SPLITTER: char = '\0';

/// Prefix of shadow keyspace ids
pub const SHADOW_BUCKET_PREFIX: &str = "mpu...";

const OVERVIEW: &str = "overview";
const PART: &str = "part";

/// Keyspace holding the multipart state of the bucket `uid`
#[must_use]
pub fn shadow_bucket_id(uid: &ResourceUid) -> String {
    format!("{SHADOW_BUCKET_PREFIX}{}", uid.as_str())
}

/// Namespace every overview key starts with
#[must_use]
pub fn overview_namespace() -> String {
    format!("{OVERVIEW}{SPLITTER}")
}

fn check_component(what: &str, value: &str) -> Result<()> {
    if value.contains(SPLITTER) {
        return Err(Error::invalid_argument(format!(
            "{what} cannot contain a NUL character"
        )));
    }
    Ok(())
}

/// Listing key of an upload: `overview\0<object key>`
pub fn overview_listing_key(object_key: &str) -> Result<String> {
    check_component("object key", object_key)?;
    Ok(format!("{OVERVIEW}{SPLITTER}{object_key}"))
}

/// Store key of an upload record
pub fn encode_overview_key(object_key: &str, upload_id: &str) -> Result<String> {
    check_component("upload id", upload_id)?;
    Ok(format!(
        "{}{SPLITTER}{upload_id}",
        overview_listing_key(object_key)?
    ))
}

/// Split an overview key into `(object key, upload id)`
#[must_use]
pub fn decode_overview_key(key: &str) -> Option<(&str, &str)> {
    let rest = key.strip_prefix(OVERVIEW)?.strip_prefix(SPLITTER)?;
    rest.rsplit_once(SPLITTER)
}

/// Prefix of every part key of `upload_id`
pub fn part_prefix(upload_id: &str) -> Result<String> {
    check_component("upload id", upload_id)?;
    Ok(format!("{PART}{SPLITTER}{upload_id}{SPLITTER}"))
}

/// Store key of a part record
pub fn encode_part_key(upload_id: &str, part_number: u32) -> Result<String> {
    Ok(format!("{}{part_number:05}", part_prefix(upload_id)?))
}

/// Split a part key into `(upload id, part number)`
#[must_use]
pub fn decode_part_key(key: &str) -> Option<(&str, u32)> {
    let rest = key.strip_prefix(PART)?.strip_prefix(SPLITTER)?;
    let (upload_id, number) = rest.rsplit_once(SPLITTER)?;
    Some((upload_id, number.parse().ok()?))
}

/// Store position an upload listing resumes after.
///
/// With only a key marker, every upload of that key is skipped; the
/// splitter appended to the listing key sorts before all of them, so the
/// scan must start after the key's whole range. With an upload-id marker
/// the scan resumes after that exact upload.
pub fn upload_scan_start(key_marker: &str, upload_id_marker: Option<&str>) -> Result<String> {
    let listing_key = overview_listing_key(key_marker)?;
    Ok(match upload_id_marker {
        Some(upload_id) => format!("{listing_key}{SPLITTER}{upload_id}"),
        None => format!("{listing_key}{SPLITTER}\u{10FFFF}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_common::BucketName;

    #[test]
    fn test_shadow_bucket_id() {
        let uid = ResourceUid::derive("default", &BucketName::new("photos").unwrap());
        let id = shadow_bucket_id(&uid);
        assert!(id.starts_with("mpu..."));
        assert!(id.ends_with(uid.as_str()));
    }

    #[test]
    fn test_overview_key_layout() {
        let key = encode_overview_key("a/b.txt", "u1").unwrap();
        assert_eq!(key, "overview\0a/b.txt\0u1");
        assert_eq!(decode_overview_key(&key), Some(("a/b.txt", "u1")));
        assert!(key.starts_with(&overview_namespace()));
    }

    #[test]
    fn test_overview_order_matches_key_then_id() {
        let mut keys = vec![
            encode_overview_key("a-b", "1").unwrap(),
            encode_overview_key("a", "2").unwrap(),
            encode_overview_key("a", "1").unwrap(),
        ];
        keys.sort();
        let decoded: Vec<_> = keys.iter().filter_map(|k| decode_overview_key(k)).collect();
        assert_eq!(decoded, [("a", "1"), ("a", "2"), ("a-b", "1")]);
    }

    #[test]
    fn test_part_keys_sort_numerically() {
        let k2 = encode_part_key("u1", 2).unwrap();
        let k10 = encode_part_key("u1", 10).unwrap();
        assert!(k2 < k10);
        assert_eq!(decode_part_key(&k10), Some(("u1", 10)));
        assert!(k10.starts_with(&part_prefix("u1").unwrap()));
    }

    #[test]
    fn test_nul_in_key_rejected() {
        assert!(matches!(
            encode_overview_key("bad\0key", "u1"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(encode_part_key("bad\0id", 1).is_err());
    }

    #[test]
    fn test_scan_start_positions() {
        let first = encode_overview_key("a", "1").unwrap();
        let second = encode_overview_key("a", "2").unwrap();
        let next = encode_overview_key("a0", "1").unwrap();

        let after_key = upload_scan_start("a", None).unwrap();
        assert!(after_key > second);
        assert!(after_key < next);

        let after_id = upload_scan_start("a", Some("1")).unwrap();
        assert_eq!(after_id, first);
        assert!(second > after_id);
    }
}
