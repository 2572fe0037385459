//! S3 operation layer
//!
//! [`S3Service`] ties the pieces together for each API call: it loads the
//! bucket (and object) records, asks the authorization engine, runs the
//! listing engine or ACL model, and persists the outcome. Every call is
//! independent; nothing is cached between requests.

use crate::listing::{Listing, ListingParams, ListingResult};
use crate::metrics::s3_metrics;
use crate::multipart::{MultipartRegistry, UploadEntry};
use crate::params::{ListObjectsQuery, ListPartsQuery, ListUploadsQuery, PageLimits};
use crate::records::{
    BUCKET_DIRECTORY, BucketRecord, ObjectMetadata, PartRecord, STANDARD_STORAGE_CLASS,
    UploadRecord, unquote_etag,
};
use crate::scan::{decode_entry, run_listing};
use crate::xml::CompletePart;
use chrono::Utc;
use std::sync::Arc;
use tessera_auth::{
    Acl, AclHeaders, AclTarget, Grant, RequestType, Requester, Resource, UserStore, authorize,
    list_permission, parse_access_control_policy, parse_grant_headers, resolve_grants,
};
use tessera_common::config::S3Config;
use tessera_common::{BucketName, Error, ObjectKey, Owner, ResourceUid, Result};
use tessera_meta_store::{MetadataStore, decode_record, encode_record};
use tracing::{debug, info};
use uuid::Uuid;

/// Highest part number a multipart upload accepts
pub const MAX_PART_NUMBER: u32 = 10_000;

/// ACL-related input of a request: headers plus optional XML body
#[derive(Clone, Debug, Default)]
pub struct AclInput {
    pub headers: AclHeaders,
    pub body: Vec<u8>,
}

impl AclInput {
    pub fn from_headers(headers: AclHeaders) -> Self {
        Self {
            headers,
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    fn has_body(&self) -> bool {
        self.body.iter().any(|b| !b.is_ascii_whitespace())
    }
}

/// A page of objects with the request parameters it answers
#[derive(Debug)]
pub struct ObjectListing {
    pub bucket: String,
    pub params: ListingParams,
    pub result: ListingResult<ObjectMetadata>,
}

/// A page of multipart uploads with the request parameters it answers
#[derive(Debug)]
pub struct UploadListing {
    pub bucket: String,
    pub params: ListingParams,
    pub result: ListingResult<UploadEntry>,
}

/// A page of parts of one upload
#[derive(Debug)]
pub struct PartListing {
    pub bucket: String,
    pub upload: UploadRecord,
    pub part_number_marker: u32,
    pub next_part_number_marker: Option<u32>,
    pub max_parts: usize,
    pub is_truncated: bool,
    pub parts: Vec<PartRecord>,
}

/// A grant as displayed, with the grantee's display name when known
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyGrant {
    pub grant: Grant,
    pub display_name: Option<String>,
}

/// Owner and effective grants of a bucket or object
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AclPolicy {
    pub owner: Owner,
    pub grants: Vec<PolicyGrant>,
}

/// The S3 API operations
pub struct S3Service {
    store: Arc<dyn MetadataStore>,
    users: Arc<UserStore>,
    multipart: MultipartRegistry,
    namespace: String,
    limits: PageLimits,
    batch_size: usize,
}

impl S3Service {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        users: Arc<UserStore>,
        namespace: impl Into<String>,
        config: &S3Config,
    ) -> Self {
        let batch_size = config.listing_batch_size.max(1);
        Self {
            multipart: MultipartRegistry::new(store.clone(), batch_size),
            store,
            users,
            namespace: namespace.into(),
            limits: PageLimits {
                default: config.default_max_keys.min(config.max_keys_limit) as usize,
                max: config.max_keys_limit as usize,
            },
            batch_size,
        }
    }

    // =========== Helpers ===========

    fn owner_of(&self, requester: &Requester) -> Result<Owner> {
        let id = requester.canonical_id().ok_or(Error::AccessDenied)?;
        let display_name = self
            .users
            .get_user(id)
            .map_or_else(|_| id.to_string(), |user| user.display_name);
        Ok(Owner::new(id, display_name))
    }

    fn check(&self, requester: &Requester, resource: &Resource<'_>, request: RequestType) -> Result<()> {
        let decision = authorize(requester, resource, request);
        s3_metrics().record_authorization(request, decision);
        if decision.is_allowed() {
            Ok(())
        } else {
            debug!(?requester, %request, "Access denied");
            Err(Error::AccessDenied)
        }
    }

    async fn load_bucket(&self, name: &str) -> Result<BucketRecord> {
        let name = BucketName::new(name)?;
        match self.store.get(BUCKET_DIRECTORY, name.as_str()).await {
            Ok(bytes) => Ok(decode_record(&bytes)?),
            Err(e) if e.is_no_such_key() => Err(Error::BucketNotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_bucket(&self, record: &BucketRecord) -> Result<()> {
        self.store
            .put(BUCKET_DIRECTORY, &record.name, encode_record(record)?)
            .await?;
        Ok(())
    }

    /// Load an object, hiding its absence from requesters who cannot list
    async fn load_object(
        &self,
        requester: &Requester,
        bucket: &BucketRecord,
        key: &str,
    ) -> Result<ObjectMetadata> {
        match self.store.get(bucket.uid.as_str(), key).await {
            Ok(bytes) => Ok(decode_record(&bytes)?),
            Err(e) if e.is_no_such_key() => {
                let resource = Resource::bucket(&bucket.acl, &bucket.owner.id);
                if list_permission(requester, &resource).is_allowed() {
                    Err(Error::ObjectNotFound {
                        bucket: bucket.name.clone(),
                        key: key.to_string(),
                    })
                } else {
                    Err(Error::AccessDenied)
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save_object(&self, bucket: &BucketRecord, object: &ObjectMetadata) -> Result<()> {
        self.store
            .put(bucket.uid.as_str(), &object.key, encode_record(object)?)
            .await?;
        Ok(())
    }

    /// Build an ACL from request input.
    ///
    /// Precedence is `x-amz-acl`, then grant headers, then the body. With no
    /// input at all, `required` inputs fail `MalformedACLError` and optional
    /// ones default to `private`.
    async fn acl_from_input(&self, input: &AclInput, target: AclTarget, required: bool) -> Result<Acl> {
        let headers = &input.headers;
        if headers.canned.is_some() && headers.has_grants() {
            return Err(Error::invalid_argument(
                "x-amz-acl cannot be combined with x-amz-grant-* headers",
            ));
        }
        if let Some(name) = &headers.canned {
            return Acl::from_canned_name(name);
        }
        let grants = if headers.has_grants() {
            parse_grant_headers(headers)?
        } else if input.has_body() {
            parse_access_control_policy(&input.body)?
        } else if required {
            return Err(Error::MalformedAcl("no ACL supplied".into()));
        } else {
            return Ok(Acl::private());
        };
        resolve_grants(grants, target, self.users.as_ref()).await
    }

    fn policy(&self, owner: &Owner, acl: &Acl, bucket_owner: Option<&str>) -> AclPolicy {
        let grants = acl
            .effective_grants(&owner.id, bucket_owner)
            .into_iter()
            .map(|grant| {
                let display_name = if grant.is_group() {
                    None
                } else if grant.grantee == owner.id {
                    Some(owner.display_name.clone())
                } else {
                    self.users
                        .get_user(&grant.grantee)
                        .ok()
                        .map(|user| user.display_name)
                };
                PolicyGrant {
                    grant,
                    display_name,
                }
            })
            .collect();
        AclPolicy {
            owner: owner.clone(),
            grants,
        }
    }

    // =========== Buckets ===========

    /// Create a bucket owned by the requester
    pub async fn create_bucket(
        &self,
        requester: &Requester,
        name: &str,
        input: &AclInput,
    ) -> Result<BucketRecord> {
        let owner = self.owner_of(requester)?;
        let name = BucketName::new(name)?;
        match self.store.get(BUCKET_DIRECTORY, name.as_str()).await {
            Ok(_) => return Err(Error::BucketAlreadyExists(name.to_string())),
            Err(e) if e.is_no_such_key() => {}
            Err(e) => return Err(e.into()),
        }

        let acl = self.acl_from_input(input, AclTarget::Bucket, false).await?;
        let record = BucketRecord {
            name: name.to_string(),
            uid: ResourceUid::derive(&self.namespace, &name),
            owner,
            acl,
            created_at: Utc::now(),
        };
        self.save_bucket(&record).await?;
        info!(bucket = %record.name, owner = %record.owner.id, "Created bucket");
        Ok(record)
    }

    /// One page of a bucket's objects
    pub async fn list_objects(
        &self,
        requester: &Requester,
        bucket: &str,
        query: &ListObjectsQuery,
    ) -> Result<ObjectListing> {
        let record = self.load_bucket(bucket).await?;
        self.check(
            requester,
            &Resource::bucket(&record.acl, &record.owner.id),
            RequestType::ListObjects,
        )?;
        let params = query.to_params(self.limits)?;

        let start_after = params.marker.as_ref().map(|m| m.key.clone());
        let bucket_id = record.uid.as_str();
        let result = run_listing(
            self.store.as_ref(),
            bucket_id,
            Listing::new(params.clone()),
            start_after,
            self.batch_size,
            |entry| decode_entry::<ObjectMetadata>(bucket_id, &entry),
        )
        .await?;

        s3_metrics().record_listing_page(
            result.contents.len() + result.common_prefixes.len(),
            result.is_truncated,
        );
        debug!(
            bucket = %record.name,
            contents = result.contents.len(),
            prefixes = result.common_prefixes.len(),
            truncated = result.is_truncated,
            "Listed objects"
        );
        Ok(ObjectListing {
            bucket: record.name,
            params,
            result,
        })
    }

    // =========== Objects ===========

    /// Record object metadata; the body is only hashed and measured
    pub async fn put_object(
        &self,
        requester: &Requester,
        bucket: &str,
        key: &str,
        body: &[u8],
        content_type: Option<String>,
        input: &AclInput,
    ) -> Result<ObjectMetadata> {
        let key = ObjectKey::new(key)?;
        let record = self.load_bucket(bucket).await?;
        self.check(
            requester,
            &Resource::bucket(&record.acl, &record.owner.id),
            RequestType::PutObject,
        )?;
        let owner = self.owner_of(requester).unwrap_or_else(|_| record.owner.clone());
        let acl = self.acl_from_input(input, AclTarget::Object, false).await?;

        let object = ObjectMetadata {
            key: key.into_inner(),
            size: body.len() as u64,
            etag: format!("{:x}", md5::compute(body)),
            last_modified: Utc::now(),
            owner,
            content_type,
            storage_class: STANDARD_STORAGE_CLASS.to_string(),
            acl,
        };
        self.save_object(&record, &object).await?;
        debug!(bucket = %record.name, key = %object.key, size = object.size, "Stored object metadata");
        Ok(object)
    }

    /// Metadata of one object
    pub async fn head_object(&self, requester: &Requester, bucket: &str, key: &str) -> Result<ObjectMetadata> {
        let record = self.load_bucket(bucket).await?;
        let object = self.load_object(requester, &record, key).await?;
        self.check(
            requester,
            &Resource::object(&object.acl, &object.owner.id, &record.owner.id),
            RequestType::GetObject,
        )?;
        Ok(object)
    }

    // =========== ACLs ===========

    pub async fn get_bucket_acl(&self, requester: &Requester, bucket: &str) -> Result<AclPolicy> {
        let record = self.load_bucket(bucket).await?;
        self.check(
            requester,
            &Resource::bucket(&record.acl, &record.owner.id),
            RequestType::GetAcl,
        )?;
        Ok(self.policy(&record.owner, &record.acl, None))
    }

    /// Replace a bucket's ACL; nothing changes unless the new ACL is valid
    pub async fn put_bucket_acl(&self, requester: &Requester, bucket: &str, input: &AclInput) -> Result<()> {
        let mut record = self.load_bucket(bucket).await?;
        self.check(
            requester,
            &Resource::bucket(&record.acl, &record.owner.id),
            RequestType::PutAcl,
        )?;
        record.acl = self.acl_from_input(input, AclTarget::Bucket, true).await?;
        self.save_bucket(&record).await?;
        info!(bucket = %record.name, "Updated bucket ACL");
        Ok(())
    }

    pub async fn get_object_acl(&self, requester: &Requester, bucket: &str, key: &str) -> Result<AclPolicy> {
        let record = self.load_bucket(bucket).await?;
        let object = self.load_object(requester, &record, key).await?;
        self.check(
            requester,
            &Resource::object(&object.acl, &object.owner.id, &record.owner.id),
            RequestType::GetAcl,
        )?;
        Ok(self.policy(&object.owner, &object.acl, Some(&record.owner.id)))
    }

    /// Replace an object's ACL; nothing changes unless the new ACL is valid
    pub async fn put_object_acl(
        &self,
        requester: &Requester,
        bucket: &str,
        key: &str,
        input: &AclInput,
    ) -> Result<()> {
        let record = self.load_bucket(bucket).await?;
        let mut object = self.load_object(requester, &record, key).await?;
        self.check(
            requester,
            &Resource::object(&object.acl, &object.owner.id, &record.owner.id),
            RequestType::PutAcl,
        )?;
        object.acl = self.acl_from_input(input, AclTarget::Object, true).await?;
        self.save_object(&record, &object).await?;
        info!(bucket = %record.name, key = %object.key, "Updated object ACL");
        Ok(())
    }

    // =========== Multipart uploads ===========

    pub async fn initiate_multipart_upload(
        &self,
        requester: &Requester,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        input: &AclInput,
    ) -> Result<UploadRecord> {
        let key = ObjectKey::new(key)?;
        let record = self.load_bucket(bucket).await?;
        self.check(
            requester,
            &Resource::bucket(&record.acl, &record.owner.id),
            RequestType::InitiateMultipartUpload,
        )?;
        let owner = self.owner_of(requester).unwrap_or_else(|_| record.owner.clone());
        let acl = self.acl_from_input(input, AclTarget::Object, false).await?;

        let upload = UploadRecord {
            upload_id: Uuid::new_v4().simple().to_string(),
            key: key.into_inner(),
            initiator: owner.clone(),
            owner,
            storage_class: STANDARD_STORAGE_CLASS.to_string(),
            initiated_at: Utc::now(),
            acl,
            content_type,
        };
        self.multipart.initiate(&record.uid, &upload).await?;
        info!(bucket = %record.name, key = %upload.key, upload_id = %upload.upload_id, "Initiated multipart upload");
        Ok(upload)
    }

    pub async fn upload_part(
        &self,
        requester: &Requester,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: &[u8],
    ) -> Result<PartRecord> {
        if !(1..=MAX_PART_NUMBER).contains(&part_number) {
            return Err(Error::invalid_argument(format!(
                "part number must be between 1 and {MAX_PART_NUMBER}"
            )));
        }
        let record = self.load_bucket(bucket).await?;
        self.check(
            requester,
            &Resource::bucket(&record.acl, &record.owner.id),
            RequestType::UploadPart,
        )?;
        self.multipart.get_upload(&record.uid, key, upload_id).await?;

        let part = PartRecord {
            part_number,
            etag: format!("{:x}", md5::compute(body)),
            size: body.len() as u64,
            last_modified: Utc::now(),
        };
        self.multipart.put_part(&record.uid, upload_id, &part).await?;
        debug!(upload_id, part_number, size = part.size, "Stored part");
        Ok(part)
    }

    pub async fn list_parts(
        &self,
        requester: &Requester,
        bucket: &str,
        key: &str,
        upload_id: &str,
        query: &ListPartsQuery,
    ) -> Result<PartListing> {
        let record = self.load_bucket(bucket).await?;
        self.check(
            requester,
            &Resource::bucket(&record.acl, &record.owner.id),
            RequestType::ListParts,
        )?;
        let (part_number_marker, max_parts) = query.resolve(self.limits)?;
        let upload = self.multipart.get_upload(&record.uid, key, upload_id).await?;

        let mut remaining: Vec<_> = self
            .multipart
            .parts(&record.uid, upload_id)
            .await?
            .into_iter()
            .filter(|part| part.part_number > part_number_marker)
            .collect();
        let is_truncated = remaining.len() > max_parts;
        remaining.truncate(max_parts);
        let next_part_number_marker = if is_truncated {
            remaining.last().map(|part| part.part_number)
        } else {
            None
        };

        Ok(PartListing {
            bucket: record.name,
            upload,
            part_number_marker,
            next_part_number_marker,
            max_parts,
            is_truncated,
            parts: remaining,
        })
    }

    /// Abort an upload; the initiator may always abort their own upload
    pub async fn abort_multipart_upload(
        &self,
        requester: &Requester,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<()> {
        let record = self.load_bucket(bucket).await?;
        let resource = Resource::bucket(&record.acl, &record.owner.id);
        let decision = authorize(requester, &resource, RequestType::AbortMultipartUpload);
        s3_metrics().record_authorization(RequestType::AbortMultipartUpload, decision);

        let upload = match self.multipart.get_upload(&record.uid, key, upload_id).await {
            Ok(upload) => upload,
            Err(e) if decision.is_allowed() => return Err(e),
            Err(_) => return Err(Error::AccessDenied),
        };
        if !decision.is_allowed() && !requester.is_owner(&upload.initiator.id) {
            debug!(?requester, upload_id, "Access denied");
            return Err(Error::AccessDenied);
        }

        self.multipart.remove(&record.uid, key, upload_id).await?;
        info!(bucket = %record.name, key, upload_id, "Aborted multipart upload");
        Ok(())
    }

    /// Assemble the listed parts into an object and retire the upload
    pub async fn complete_multipart_upload(
        &self,
        requester: &Requester,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletePart],
    ) -> Result<ObjectMetadata> {
        let record = self.load_bucket(bucket).await?;
        self.check(
            requester,
            &Resource::bucket(&record.acl, &record.owner.id),
            RequestType::CompleteMultipartUpload,
        )?;
        let upload = self.multipart.get_upload(&record.uid, key, upload_id).await?;

        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(Error::InvalidPartOrder);
        }
        let stored = self.multipart.parts(&record.uid, upload_id).await?;
        let mut chosen = Vec::with_capacity(parts.len());
        for requested in parts {
            let part = stored
                .iter()
                .find(|p| p.part_number == requested.part_number)
                .filter(|p| p.etag == unquote_etag(&requested.etag))
                .ok_or(Error::InvalidPart {
                    part_number: requested.part_number,
                })?;
            chosen.push(part);
        }

        let mut digests = Vec::with_capacity(chosen.len() * 16);
        for part in &chosen {
            digests.extend(hex::decode(&part.etag).map_err(|e| Error::internal(e.to_string()))?);
        }
        let object = ObjectMetadata {
            key: upload.key.clone(),
            size: chosen.iter().map(|p| p.size).sum(),
            etag: format!("{:x}-{}", md5::compute(&digests), chosen.len()),
            last_modified: Utc::now(),
            owner: upload.owner.clone(),
            content_type: upload.content_type.clone(),
            storage_class: upload.storage_class.clone(),
            acl: upload.acl.clone(),
        };
        self.save_object(&record, &object).await?;
        self.multipart.remove(&record.uid, key, upload_id).await?;
        info!(bucket = %record.name, key, upload_id, parts = chosen.len(), "Completed multipart upload");
        Ok(object)
    }

    /// One page of a bucket's in-flight uploads
    pub async fn list_multipart_uploads(
        &self,
        requester: &Requester,
        bucket: &str,
        query: &ListUploadsQuery,
    ) -> Result<UploadListing> {
        let record = self.load_bucket(bucket).await?;
        self.check(
            requester,
            &Resource::bucket(&record.acl, &record.owner.id),
            RequestType::ListMultipartUploads,
        )?;
        let params = query.to_params(self.limits)?;
        let result = self.multipart.list_uploads(&record.uid, params.clone()).await?;
        s3_metrics().record_listing_page(
            result.contents.len() + result.common_prefixes.len(),
            result.is_truncated,
        );
        Ok(UploadListing {
            bucket: record.name,
            params,
            result,
        })
    }
}
