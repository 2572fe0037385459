//! Authorization decisions against resource ACLs

use crate::acl::{ALL_USERS, AUTHENTICATED_USERS, Acl, LOG_DELIVERY, Permission};
use derive_more::Display;

/// The principal behind a request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Requester {
    /// No credentials presented
    Anonymous,
    /// An authenticated user, by canonical id
    User { canonical_id: String },
    /// The access log writer
    LogDelivery,
}

impl Requester {
    pub fn user(canonical_id: impl Into<String>) -> Self {
        Self::User {
            canonical_id: canonical_id.into(),
        }
    }

    /// Canonical id, for authenticated users
    #[must_use]
    pub fn canonical_id(&self) -> Option<&str> {
        match self {
            Self::User { canonical_id } => Some(canonical_id),
            Self::Anonymous | Self::LogDelivery => None,
        }
    }

    /// Grantee identifiers that apply to this requester
    fn identities(&self) -> Vec<&str> {
        match self {
            Self::Anonymous => vec![ALL_USERS],
            Self::User { canonical_id } => vec![canonical_id.as_str(), ALL_USERS, AUTHENTICATED_USERS],
            Self::LogDelivery => vec![LOG_DELIVERY, ALL_USERS, AUTHENTICATED_USERS],
        }
    }

    /// Whether this requester owns a resource owned by `owner_id`
    #[must_use]
    pub fn is_owner(&self, owner_id: &str) -> bool {
        self.canonical_id() == Some(owner_id)
    }
}

/// A bucket or object as seen by the authorization engine
#[derive(Clone, Copy, Debug)]
pub struct Resource<'a> {
    pub acl: &'a Acl,
    pub owner_id: &'a str,
    /// Owner of the enclosing bucket, for objects
    pub bucket_owner_id: Option<&'a str>,
}

impl<'a> Resource<'a> {
    pub const fn bucket(acl: &'a Acl, owner_id: &'a str) -> Self {
        Self {
            acl,
            owner_id,
            bucket_owner_id: None,
        }
    }

    pub const fn object(acl: &'a Acl, owner_id: &'a str, bucket_owner_id: &'a str) -> Self {
        Self {
            acl,
            owner_id,
            bucket_owner_id: Some(bucket_owner_id),
        }
    }
}

/// Operation being authorized
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum RequestType {
    #[display("ListObjects")]
    ListObjects,
    #[display("ListMultipartUploads")]
    ListMultipartUploads,
    #[display("GetObject")]
    GetObject,
    #[display("PutObject")]
    PutObject,
    #[display("InitiateMultipartUpload")]
    InitiateMultipartUpload,
    #[display("UploadPart")]
    UploadPart,
    #[display("CompleteMultipartUpload")]
    CompleteMultipartUpload,
    #[display("AbortMultipartUpload")]
    AbortMultipartUpload,
    #[display("ListParts")]
    ListParts,
    #[display("GetAcl")]
    GetAcl,
    #[display("PutAcl")]
    PutAcl,
}

impl RequestType {
    /// Permission the requester must hold on the target resource.
    ///
    /// Object writes and multipart traffic are checked against the bucket;
    /// reads and ACL operations against the resource named in the request.
    #[must_use]
    pub const fn required_permission(self) -> Permission {
        match self {
            Self::ListObjects | Self::ListMultipartUploads | Self::GetObject => Permission::Read,
            Self::PutObject
            | Self::InitiateMultipartUpload
            | Self::UploadPart
            | Self::CompleteMultipartUpload
            | Self::AbortMultipartUpload
            | Self::ListParts => Permission::Write,
            Self::GetAcl => Permission::ReadAcp,
            Self::PutAcl => Permission::WriteAcp,
        }
    }
}

/// Outcome of an authorization check
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }

    const fn from_bool(allowed: bool) -> Self {
        if allowed { Self::Allow } else { Self::Deny }
    }
}

/// Whether `requester` holds `permission` on `resource`.
///
/// The owner implicitly holds `FULL_CONTROL`; everyone else needs a grant
/// (canned presets expanded) for one of their identities.
#[must_use]
pub fn holds(requester: &Requester, resource: &Resource<'_>, permission: Permission) -> bool {
    if requester.is_owner(resource.owner_id) {
        return true;
    }
    let identities = requester.identities();
    resource
        .acl
        .effective_grants(resource.owner_id, resource.bucket_owner_id)
        .iter()
        .any(|grant| {
            grant.permission.satisfies(permission) && identities.contains(&grant.grantee.as_str())
        })
}

/// Permission to list a bucket's contents.
///
/// Object listings and multipart-upload listings share this check: listing
/// a bucket requires the same `READ` grant as reading it, and there is no
/// separate list capability.
#[must_use]
pub fn list_permission(requester: &Requester, bucket: &Resource<'_>) -> Decision {
    Decision::from_bool(holds(requester, bucket, Permission::Read))
}

/// Decide whether `requester` may perform `request` on `resource`
#[must_use]
pub fn authorize(requester: &Requester, resource: &Resource<'_>, request: RequestType) -> Decision {
    match request {
        RequestType::ListObjects | RequestType::ListMultipartUploads => {
            list_permission(requester, resource)
        }
        other => Decision::from_bool(holds(requester, resource, other.required_permission())),
    }
}
