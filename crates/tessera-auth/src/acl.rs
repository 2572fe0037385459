//! Access control lists for buckets and objects
//!
//! An [`Acl`] is either a canned preset or an explicit set of grants, never
//! both. Canned presets are stored by name and only expanded into grants
//! when they are evaluated or displayed, because the expansion depends on
//! who owns the resource (and, for objects, who owns the bucket).
//!
//! Grantees in a stored ACL are always canonical user ids or one of the
//! reserved group URIs. Email grantees are resolved before an ACL is built
//! (see [`crate::resolve`]).

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tessera_common::{Error, Result};

/// Every principal, authenticated or not
pub const ALL_USERS: &str = "http://acs.amazonaws.com/groups/global/AllUsers";
/// Every principal holding a valid identity
pub const AUTHENTICATED_USERS: &str = "http://acs.amazonaws.com/groups/global/AuthenticatedUsers";
/// The server access log writer
pub const LOG_DELIVERY: &str = "http://acs.amazonaws.com/groups/s3/LogDelivery";

/// Check whether `uri` names one of the reserved groups
#[must_use]
pub fn is_group_uri(uri: &str) -> bool {
    matches!(uri, ALL_USERS | AUTHENTICATED_USERS | LOG_DELIVERY)
}

/// A grantable permission
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum Permission {
    #[display("FULL_CONTROL")]
    FullControl,
    #[display("WRITE")]
    Write,
    #[display("WRITE_ACP")]
    WriteAcp,
    #[display("READ")]
    Read,
    #[display("READ_ACP")]
    ReadAcp,
}

impl Permission {
    /// All permissions in wire order
    pub const ALL: [Self; 5] = [
        Self::FullControl,
        Self::Write,
        Self::WriteAcp,
        Self::Read,
        Self::ReadAcp,
    ];

    /// Wire name (`FULL_CONTROL`, `READ`, ...)
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FullControl => "FULL_CONTROL",
            Self::Write => "WRITE",
            Self::WriteAcp => "WRITE_ACP",
            Self::Read => "READ",
            Self::ReadAcp => "READ_ACP",
        }
    }

    /// Request header carrying grants of this permission
    #[must_use]
    pub const fn header_name(self) -> &'static str {
        match self {
            Self::FullControl => "x-amz-grant-full-control",
            Self::Write => "x-amz-grant-write",
            Self::WriteAcp => "x-amz-grant-write-acp",
            Self::Read => "x-amz-grant-read",
            Self::ReadAcp => "x-amz-grant-read-acp",
        }
    }

    /// Parse a wire name; `None` for anything else
    #[must_use]
    pub fn from_wire(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }

    /// Whether holding `self` satisfies a check for `required`
    #[must_use]
    pub fn satisfies(self, required: Self) -> bool {
        self == Self::FullControl || self == required
    }
}

/// Named ACL presets (`x-amz-acl`)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum CannedAcl {
    #[display("private")]
    Private,
    #[display("public-read")]
    PublicRead,
    #[display("public-read-write")]
    PublicReadWrite,
    #[display("authenticated-read")]
    AuthenticatedRead,
    #[display("bucket-owner-read")]
    BucketOwnerRead,
    #[display("bucket-owner-full-control")]
    BucketOwnerFullControl,
    #[display("log-delivery-write")]
    LogDeliveryWrite,
}

impl CannedAcl {
    const ALL: [Self; 7] = [
        Self::Private,
        Self::PublicRead,
        Self::PublicReadWrite,
        Self::AuthenticatedRead,
        Self::BucketOwnerRead,
        Self::BucketOwnerFullControl,
        Self::LogDeliveryWrite,
    ];

    /// Grants implied by the preset, on top of the owner's `FULL_CONTROL`.
    ///
    /// `bucket_owner` is only consulted by the `bucket-owner-*` presets and
    /// contributes nothing when it is absent or equal to the owner.
    fn expand(self, owner: &str, bucket_owner: Option<&str>) -> Vec<Grant> {
        let other_bucket_owner = bucket_owner.filter(|b| *b != owner);
        match self {
            Self::Private => Vec::new(),
            Self::PublicRead => vec![Grant::new(ALL_USERS, Permission::Read)],
            Self::PublicReadWrite => vec![
                Grant::new(ALL_USERS, Permission::Read),
                Grant::new(ALL_USERS, Permission::Write),
            ],
            Self::AuthenticatedRead => vec![Grant::new(AUTHENTICATED_USERS, Permission::Read)],
            Self::BucketOwnerRead => other_bucket_owner
                .map(|b| Grant::new(b, Permission::Read))
                .into_iter()
                .collect(),
            Self::BucketOwnerFullControl => other_bucket_owner
                .map(|b| Grant::new(b, Permission::FullControl))
                .into_iter()
                .collect(),
            Self::LogDeliveryWrite => vec![
                Grant::new(LOG_DELIVERY, Permission::Write),
                Grant::new(LOG_DELIVERY, Permission::ReadAcp),
            ],
        }
    }
}

impl FromStr for CannedAcl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.to_string() == s)
            .ok_or_else(|| Error::invalid_argument(format!("unknown canned ACL: {s}")))
    }
}

/// Kind of resource an ACL is attached to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AclTarget {
    Bucket,
    Object,
}

impl AclTarget {
    /// Whether grants of `permission` are stored for this kind of resource.
    ///
    /// Objects drop `WRITE` grants: an existing object cannot be written.
    #[must_use]
    pub fn stores(self, permission: Permission) -> bool {
        !(self == Self::Object && permission == Permission::Write)
    }
}

/// One (grantee, permission) pair; the grantee is a canonical id or group URI
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grant {
    pub grantee: String,
    pub permission: Permission,
}

impl Grant {
    pub fn new(grantee: impl Into<String>, permission: Permission) -> Self {
        Self {
            grantee: grantee.into(),
            permission,
        }
    }

    /// Whether the grantee is a group rather than a single user
    #[must_use]
    pub fn is_group(&self) -> bool {
        is_group_uri(&self.grantee)
    }
}

/// ACL attached to a bucket or an object
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    canned: Option<CannedAcl>,
    full_control: Vec<String>,
    write: Vec<String>,
    write_acp: Vec<String>,
    read: Vec<String>,
    read_acp: Vec<String>,
}

impl Acl {
    /// ACL holding only a canned preset
    #[must_use]
    pub fn canned(canned: CannedAcl) -> Self {
        Self {
            canned: Some(canned),
            ..Self::default()
        }
    }

    /// The default ACL of new resources
    #[must_use]
    pub fn private() -> Self {
        Self::canned(CannedAcl::Private)
    }

    /// Parse a canned ACL name into an ACL, failing `InvalidArgument`
    pub fn from_canned_name(name: &str) -> Result<Self> {
        Ok(Self::canned(name.parse()?))
    }

    /// ACL made of explicit grants.
    ///
    /// Grants the target does not store are dropped, and repeated
    /// (grantee, permission) pairs collapse into one.
    pub fn from_grants(target: AclTarget, grants: impl IntoIterator<Item = Grant>) -> Self {
        let mut acl = Self::default();
        for grant in grants {
            if !target.stores(grant.permission) {
                continue;
            }
            let list = acl.list_mut(grant.permission);
            if !list.contains(&grant.grantee) {
                list.push(grant.grantee);
            }
        }
        acl
    }

    /// The canned preset, if this ACL is one
    #[must_use]
    pub const fn canned_acl(&self) -> Option<CannedAcl> {
        self.canned
    }

    /// Stored grantees for `permission` (empty for canned ACLs)
    #[must_use]
    pub fn grantees(&self, permission: Permission) -> &[String] {
        match permission {
            Permission::FullControl => &self.full_control,
            Permission::Write => &self.write,
            Permission::WriteAcp => &self.write_acp,
            Permission::Read => &self.read,
            Permission::ReadAcp => &self.read_acp,
        }
    }

    fn list_mut(&mut self, permission: Permission) -> &mut Vec<String> {
        match permission {
            Permission::FullControl => &mut self.full_control,
            Permission::Write => &mut self.write,
            Permission::WriteAcp => &mut self.write_acp,
            Permission::Read => &mut self.read,
            Permission::ReadAcp => &mut self.read_acp,
        }
    }

    /// Stored explicit grants in wire order
    pub fn explicit_grants(&self) -> impl Iterator<Item = Grant> + '_ {
        Permission::ALL.into_iter().flat_map(move |permission| {
            self.grantees(permission)
                .iter()
                .map(move |grantee| Grant::new(grantee.clone(), permission))
        })
    }

    /// Grants in force, with canned presets expanded.
    ///
    /// A canned ACL always starts with the owner's `FULL_CONTROL`; explicit
    /// ACLs are returned as stored. `bucket_owner` is the owning bucket's
    /// owner when this ACL belongs to an object.
    #[must_use]
    pub fn effective_grants(&self, owner: &str, bucket_owner: Option<&str>) -> Vec<Grant> {
        match self.canned {
            Some(canned) => {
                let mut grants = vec![Grant::new(owner, Permission::FullControl)];
                grants.extend(canned.expand(owner, bucket_owner));
                grants
            }
            None => self.explicit_grants().collect(),
        }
    }
}
