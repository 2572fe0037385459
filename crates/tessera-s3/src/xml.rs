//! S3 XML documents
//!
//! Renders listing pages, ACLs and multipart results into the wire XML the
//! S3 protocol fixes, and parses the `CompleteMultipartUpload` request body.
//! Element names and order follow the protocol exactly; nothing here makes
//! decisions about what to include.

use crate::listing::EncodingType;
use crate::records::{format_timestamp, quote_etag};
use crate::service::{AclPolicy, ObjectListing, PartListing, UploadListing};
use quick_xml::se::to_string as to_xml;
use serde::{Deserialize, Serialize};
use tessera_auth::Permission;
use tessera_common::{Error, Owner, Result};

/// S3 document namespace
pub const S3_XMLNS: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

const XSI_XMLNS: &str = "http://www.w3.org/2001/XMLSchema-instance";

fn document<T: Serialize>(value: &T) -> Result<String> {
    let body = to_xml(value).map_err(|e| Error::Serialization(e.to_string()))?;
    Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{body}"))
}

#[derive(Serialize)]
pub struct OwnerXml {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "DisplayName")]
    pub display_name: String,
}

impl From<&Owner> for OwnerXml {
    fn from(owner: &Owner) -> Self {
        Self {
            id: owner.id.clone(),
            display_name: owner.display_name.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct CommonPrefix {
    #[serde(rename = "Prefix")]
    pub prefix: String,
}

// ============================================================================
// ListObjects
// ============================================================================

#[derive(Serialize)]
#[serde(rename = "ListBucketResult")]
pub struct ListBucketResult {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Prefix")]
    pub prefix: String,
    #[serde(rename = "Marker")]
    pub marker: String,
    #[serde(rename = "NextMarker")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_marker: Option<String>,
    #[serde(rename = "MaxKeys")]
    pub max_keys: usize,
    #[serde(rename = "Delimiter")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(rename = "EncodingType")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding_type: Option<&'static str>,
    #[serde(rename = "IsTruncated")]
    pub is_truncated: bool,
    #[serde(rename = "Contents")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contents: Vec<ObjectContent>,
    #[serde(rename = "CommonPrefixes")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub common_prefixes: Vec<CommonPrefix>,
}

#[derive(Serialize)]
pub struct ObjectContent {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "LastModified")]
    pub last_modified: String,
    #[serde(rename = "ETag")]
    pub etag: String,
    #[serde(rename = "Size")]
    pub size: u64,
    #[serde(rename = "Owner")]
    pub owner: OwnerXml,
    #[serde(rename = "StorageClass")]
    pub storage_class: String,
}

/// `ListBucketResult` for one page of objects
pub fn list_objects_result(listing: &ObjectListing) -> Result<String> {
    let params = &listing.params;
    let encoding = params.encoding;
    let result = &listing.result;
    document(&ListBucketResult {
        xmlns: S3_XMLNS,
        name: listing.bucket.clone(),
        prefix: params.prefix.clone(),
        marker: params
            .marker
            .as_ref()
            .map(|m| m.key.clone())
            .unwrap_or_default(),
        next_marker: result.next_marker.as_ref().map(|m| m.key.clone()),
        max_keys: params.max_keys,
        delimiter: params
            .delimiter
            .as_deref()
            .filter(|d| !d.is_empty())
            .map(str::to_string),
        encoding_type: encoding.map(EncodingType::as_str),
        is_truncated: result.is_truncated,
        contents: result
            .contents
            .iter()
            .map(|matched| ObjectContent {
                key: matched.key.clone(),
                last_modified: format_timestamp(&matched.entry.last_modified),
                etag: quote_etag(&matched.entry.etag),
                size: matched.entry.size,
                owner: OwnerXml::from(&matched.entry.owner),
                storage_class: matched.entry.storage_class.clone(),
            })
            .collect(),
        common_prefixes: result
            .common_prefixes
            .iter()
            .map(|prefix| CommonPrefix {
                prefix: prefix.clone(),
            })
            .collect(),
    })
}

// ============================================================================
// ListMultipartUploads
// ============================================================================

#[derive(Serialize)]
#[serde(rename = "ListMultipartUploadsResult")]
pub struct ListMultipartUploadsResult {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "KeyMarker")]
    pub key_marker: String,
    #[serde(rename = "UploadIdMarker")]
    pub upload_id_marker: String,
    #[serde(rename = "NextKeyMarker")]
    pub next_key_marker: String,
    #[serde(rename = "NextUploadIdMarker")]
    pub next_upload_id_marker: String,
    #[serde(rename = "Delimiter")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(rename = "Prefix")]
    pub prefix: String,
    #[serde(rename = "MaxUploads")]
    pub max_uploads: usize,
    #[serde(rename = "EncodingType")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding_type: Option<&'static str>,
    #[serde(rename = "IsTruncated")]
    pub is_truncated: bool,
    #[serde(rename = "Upload")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub uploads: Vec<UploadItem>,
    #[serde(rename = "CommonPrefixes")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub common_prefixes: Vec<CommonPrefix>,
}

#[derive(Serialize)]
pub struct UploadItem {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "UploadId")]
    pub upload_id: String,
    #[serde(rename = "Initiator")]
    pub initiator: OwnerXml,
    #[serde(rename = "Owner")]
    pub owner: OwnerXml,
    #[serde(rename = "StorageClass")]
    pub storage_class: String,
    #[serde(rename = "Initiated")]
    pub initiated: String,
}

/// `ListMultipartUploadsResult` for one page of uploads
pub fn list_uploads_result(listing: &UploadListing) -> Result<String> {
    let params = &listing.params;
    let encoding = params.encoding;
    let result = &listing.result;
    let (key_marker, upload_id_marker) = params.marker.as_ref().map_or_else(
        || (String::new(), String::new()),
        |m| {
            (
                m.key.clone(),
                m.secondary.clone().unwrap_or_default(),
            )
        },
    );
    let (next_key_marker, next_upload_id_marker) = result.next_marker.as_ref().map_or_else(
        || (String::new(), String::new()),
        |m| {
            (
                m.key.clone(),
                m.secondary.clone().unwrap_or_default(),
            )
        },
    );
    document(&ListMultipartUploadsResult {
        xmlns: S3_XMLNS,
        bucket: listing.bucket.clone(),
        key_marker,
        upload_id_marker,
        next_key_marker,
        next_upload_id_marker,
        delimiter: params
            .delimiter
            .as_deref()
            .filter(|d| !d.is_empty())
            .map(str::to_string),
        prefix: params.prefix.clone(),
        max_uploads: params.max_keys,
        encoding_type: encoding.map(EncodingType::as_str),
        is_truncated: result.is_truncated,
        uploads: result
            .contents
            .iter()
            .map(|matched| {
                let upload = &matched.entry.record;
                UploadItem {
                    key: matched.key.clone(),
                    upload_id: upload.upload_id.clone(),
                    initiator: OwnerXml::from(&upload.initiator),
                    owner: OwnerXml::from(&upload.owner),
                    storage_class: upload.storage_class.clone(),
                    initiated: format_timestamp(&upload.initiated_at),
                }
            })
            .collect(),
        common_prefixes: result
            .common_prefixes
            .iter()
            .map(|prefix| CommonPrefix {
                prefix: prefix.clone(),
            })
            .collect(),
    })
}

// ============================================================================
// AccessControlPolicy
// ============================================================================

#[derive(Serialize)]
#[serde(rename = "AccessControlPolicy")]
pub struct AccessControlPolicyXml {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    #[serde(rename = "Owner")]
    pub owner: OwnerXml,
    #[serde(rename = "AccessControlList")]
    pub access_control_list: AccessControlListXml,
}

#[derive(Serialize)]
pub struct AccessControlListXml {
    #[serde(rename = "Grant")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub grants: Vec<GrantXml>,
}

#[derive(Serialize)]
pub struct GrantXml {
    #[serde(rename = "Grantee")]
    pub grantee: GranteeXml,
    #[serde(rename = "Permission")]
    pub permission: &'static str,
}

#[derive(Serialize)]
pub struct GranteeXml {
    #[serde(rename = "@xmlns:xsi")]
    pub xmlns_xsi: &'static str,
    #[serde(rename = "@xsi:type")]
    pub kind: &'static str,
    #[serde(rename = "ID")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "DisplayName")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "URI")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// `AccessControlPolicy` for a bucket or object ACL
pub fn access_control_policy(policy: &AclPolicy) -> Result<String> {
    document(&AccessControlPolicyXml {
        xmlns: S3_XMLNS,
        owner: OwnerXml::from(&policy.owner),
        access_control_list: AccessControlListXml {
            grants: policy
                .grants
                .iter()
                .map(|entry| {
                    let grantee = if entry.grant.is_group() {
                        GranteeXml {
                            xmlns_xsi: XSI_XMLNS,
                            kind: "Group",
                            id: None,
                            display_name: None,
                            uri: Some(entry.grant.grantee.clone()),
                        }
                    } else {
                        GranteeXml {
                            xmlns_xsi: XSI_XMLNS,
                            kind: "CanonicalUser",
                            id: Some(entry.grant.grantee.clone()),
                            display_name: entry.display_name.clone(),
                            uri: None,
                        }
                    };
                    GrantXml {
                        grantee,
                        permission: Permission::as_str(entry.grant.permission),
                    }
                })
                .collect(),
        },
    })
}

// ============================================================================
// Multipart uploads
// ============================================================================

#[derive(Serialize)]
#[serde(rename = "InitiateMultipartUploadResult")]
pub struct InitiateMultipartUploadResult {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "UploadId")]
    pub upload_id: String,
}

/// `InitiateMultipartUploadResult`
pub fn initiate_multipart_upload_result(bucket: &str, key: &str, upload_id: &str) -> Result<String> {
    document(&InitiateMultipartUploadResult {
        xmlns: S3_XMLNS,
        bucket: bucket.to_string(),
        key: key.to_string(),
        upload_id: upload_id.to_string(),
    })
}

#[derive(Serialize)]
#[serde(rename = "CompleteMultipartUploadResult")]
pub struct CompleteMultipartUploadResult {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    #[serde(rename = "Location")]
    pub location: String,
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "ETag")]
    pub etag: String,
}

/// `CompleteMultipartUploadResult`; `location` is the object URL
pub fn complete_multipart_upload_result(
    location: &str,
    bucket: &str,
    key: &str,
    etag: &str,
) -> Result<String> {
    document(&CompleteMultipartUploadResult {
        xmlns: S3_XMLNS,
        location: location.to_string(),
        bucket: bucket.to_string(),
        key: key.to_string(),
        etag: quote_etag(etag),
    })
}

#[derive(Serialize)]
#[serde(rename = "ListPartsResult")]
pub struct ListPartsResult {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "UploadId")]
    pub upload_id: String,
    #[serde(rename = "Initiator")]
    pub initiator: OwnerXml,
    #[serde(rename = "Owner")]
    pub owner: OwnerXml,
    #[serde(rename = "StorageClass")]
    pub storage_class: String,
    #[serde(rename = "PartNumberMarker")]
    pub part_number_marker: u32,
    #[serde(rename = "NextPartNumberMarker")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_part_number_marker: Option<u32>,
    #[serde(rename = "MaxParts")]
    pub max_parts: usize,
    #[serde(rename = "IsTruncated")]
    pub is_truncated: bool,
    #[serde(rename = "Part")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<PartItem>,
}

#[derive(Serialize)]
pub struct PartItem {
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    #[serde(rename = "LastModified")]
    pub last_modified: String,
    #[serde(rename = "ETag")]
    pub etag: String,
    #[serde(rename = "Size")]
    pub size: u64,
}

/// `ListPartsResult` for one page of parts
pub fn list_parts_result(listing: &PartListing) -> Result<String> {
    let upload = &listing.upload;
    document(&ListPartsResult {
        xmlns: S3_XMLNS,
        bucket: listing.bucket.clone(),
        key: upload.key.clone(),
        upload_id: upload.upload_id.clone(),
        initiator: OwnerXml::from(&upload.initiator),
        owner: OwnerXml::from(&upload.owner),
        storage_class: upload.storage_class.clone(),
        part_number_marker: listing.part_number_marker,
        next_part_number_marker: listing.next_part_number_marker,
        max_parts: listing.max_parts,
        is_truncated: listing.is_truncated,
        parts: listing
            .parts
            .iter()
            .map(|part| PartItem {
                part_number: part.part_number,
                last_modified: format_timestamp(&part.last_modified),
                etag: quote_etag(&part.etag),
                size: part.size,
            })
            .collect(),
    })
}

/// Request body for CompleteMultipartUpload
#[derive(Debug, Deserialize)]
#[serde(rename = "CompleteMultipartUpload")]
pub struct CompleteMultipartUploadXml {
    #[serde(rename = "Part", default)]
    pub parts: Vec<CompletePart>,
}

#[derive(Debug, Deserialize)]
pub struct CompletePart {
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    #[serde(rename = "ETag")]
    pub etag: String,
}

/// Parse the part list of a CompleteMultipartUpload request
pub fn parse_complete_multipart_upload(body: &[u8]) -> Result<Vec<CompletePart>> {
    let text = std::str::from_utf8(body).map_err(|e| Error::MalformedXml(e.to_string()))?;
    let request: CompleteMultipartUploadXml =
        quick_xml::de::from_str(text).map_err(|e| Error::MalformedXml(e.to_string()))?;
    if request.parts.is_empty() {
        return Err(Error::MalformedXml(
            "CompleteMultipartUpload must list at least one part".into(),
        ));
    }
    Ok(request.parts)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Serialize)]
#[serde(rename = "Error")]
pub struct ErrorDocument {
    #[serde(rename = "Code")]
    pub code: &'static str,
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "Resource")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(rename = "RequestId")]
    pub request_id: String,
}

/// `<Error>` document for a failed request
#[must_use]
pub fn error_document(err: &Error, resource: Option<&str>, request_id: &str) -> String {
    let doc = ErrorDocument {
        code: err.s3_error_code(),
        message: err.to_string(),
        resource: resource.map(str::to_string),
        request_id: request_id.to_string(),
    };
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}",
        to_xml(&doc).unwrap_or_default()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::{ListingParams, ListingResult, Marker, Matched};
    use crate::records::ObjectMetadata;
    use crate::service::PolicyGrant;
    use chrono::{TimeZone, Utc};
    use tessera_auth::{ALL_USERS, Acl, Grant};

    fn object(key: &str) -> ObjectMetadata {
        ObjectMetadata {
            key: key.to_string(),
            size: 11,
            etag: "5eb63bbbe01eeed093cb22bb8f5acdc3".into(),
            last_modified: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            owner: Owner::new("owner-id", "owner"),
            content_type: None,
            storage_class: "STANDARD".into(),
            acl: Acl::private(),
        }
    }

    #[test]
    fn test_list_objects_document() {
        let listing = ObjectListing {
            bucket: "photos".into(),
            params: ListingParams {
                prefix: "2024/".into(),
                delimiter: Some("/".into()),
                max_keys: 2,
                ..ListingParams::default()
            },
            result: ListingResult {
                contents: vec![Matched {
                    key: "2024/a.jpg".into(),
                    entry: object("2024/a.jpg"),
                }],
                common_prefixes: vec!["2024/05/".into()],
                is_truncated: true,
                next_marker: Some(Marker::new("2024/05/z.jpg")),
            },
        };
        let xml = list_objects_result(&listing).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<ListBucketResult"));
        assert!(xml.contains("<Name>photos</Name>"));
        assert!(xml.contains("<NextMarker>2024/05/z.jpg</NextMarker>"));
        assert!(xml.contains("<MaxKeys>2</MaxKeys>"));
        assert!(xml.contains("<IsTruncated>true</IsTruncated>"));
        assert!(xml.contains("<Key>2024/a.jpg</Key>"));
        assert!(xml.contains("<LastModified>2024-05-01T12:00:00.000Z</LastModified>"));
        assert!(xml.contains("<Owner><ID>owner-id</ID><DisplayName>owner</DisplayName></Owner>"));
        assert!(xml.contains("<CommonPrefixes><Prefix>2024/05/</Prefix></CommonPrefixes>"));
        assert!(!xml.contains("EncodingType"));
    }

    #[test]
    fn test_list_objects_url_encoding_echo() {
        let listing = ObjectListing {
            bucket: "b".into(),
            params: ListingParams {
                prefix: "a b/".into(),
                delimiter: Some("/".into()),
                marker: Some(Marker::new("a b/x y")),
                max_keys: 1000,
                encoding: Some(EncodingType::Url),
                ..ListingParams::default()
            },
            result: ListingResult {
                contents: vec![Matched {
                    key: "a%20b%2Fz%20z".into(),
                    entry: object("a b/z z"),
                }],
                common_prefixes: Vec::new(),
                is_truncated: false,
                next_marker: None,
            },
        };
        let xml = list_objects_result(&listing).unwrap();
        assert!(xml.contains("<Prefix>a b/</Prefix>"));
        assert!(xml.contains("<Marker>a b/x y</Marker>"));
        assert!(xml.contains("<Delimiter>/</Delimiter>"));
        assert!(xml.contains("<Key>a%20b%2Fz%20z</Key>"));
        assert!(xml.contains("<EncodingType>url</EncodingType>"));
        assert!(!xml.contains("NextMarker"));
    }

    #[test]
    fn test_access_control_policy_document() {
        let policy = AclPolicy {
            owner: Owner::new("owner-id", "owner"),
            grants: vec![
                PolicyGrant {
                    grant: Grant::new("owner-id", Permission::FullControl),
                    display_name: Some("owner".into()),
                },
                PolicyGrant {
                    grant: Grant::new(ALL_USERS, Permission::Read),
                    display_name: None,
                },
            ],
        };
        let xml = access_control_policy(&policy).unwrap();
        assert!(xml.contains("xsi:type=\"CanonicalUser\""));
        assert!(xml.contains("xsi:type=\"Group\""));
        assert!(xml.contains(&format!("<URI>{ALL_USERS}</URI>")));
        assert!(xml.contains("<Permission>FULL_CONTROL</Permission>"));
        assert!(xml.contains("<Permission>READ</Permission>"));
    }

    #[test]
    fn test_parse_complete_multipart_upload() {
        let body = br#"<CompleteMultipartUpload>
            <Part><PartNumber>1</PartNumber><ETag>"aaa"</ETag></Part>
            <Part><PartNumber>2</PartNumber><ETag>"bbb"</ETag></Part>
        </CompleteMultipartUpload>"#;
        let parts = parse_complete_multipart_upload(body).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].part_number, 2);
        assert_eq!(parts[1].etag, "\"bbb\"");

        assert!(matches!(
            parse_complete_multipart_upload(b"<CompleteMultipartUpload><Part>"),
            Err(Error::MalformedXml(_))
        ));
        assert!(matches!(
            parse_complete_multipart_upload(b"<CompleteMultipartUpload></CompleteMultipartUpload>"),
            Err(Error::MalformedXml(_))
        ));
    }

    #[test]
    fn test_error_document() {
        let xml = error_document(&Error::AccessDenied, Some("/bucket"), "req-1");
        assert!(xml.contains("<Code>AccessDenied</Code>"));
        assert!(xml.contains("<Resource>/bucket</Resource>"));
        assert!(xml.contains("<RequestId>req-1</RequestId>"));
    }
}
