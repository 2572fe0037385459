//! Tessera access control
//!
//! This crate provides:
//! - The ACL model attached to buckets and objects, with canned presets
//! - Parsers for `x-amz-grant-*` headers and `AccessControlPolicy` bodies
//! - Email grantee resolution
//! - The authorization engine deciding allow/deny per request type
//! - The in-memory identity directory (users and access keys)
//!
//! # Example
//!
//! ```rust,ignore
//! use tessera_auth::{AclHeaders, AclTarget, UserStore, parse_grant_headers, resolve_grants};
//!
//! let headers = AclHeaders::from_pairs([("x-amz-grant-read", "emailaddress=\"a@b.c\"")]);
//! let grants = parse_grant_headers(&headers)?;
//! let acl = resolve_grants(grants, AclTarget::Object, &user_store).await?;
//! ```

pub mod acl;
pub mod acl_xml;
pub mod authorize;
pub mod error;
pub mod grant_headers;
pub mod resolve;
pub mod store;
pub mod user;

// Re-export core types
pub use acl::{
    ALL_USERS, AUTHENTICATED_USERS, Acl, AclTarget, CannedAcl, Grant, LOG_DELIVERY, Permission,
    is_group_uri,
};
pub use acl_xml::parse_access_control_policy;
pub use authorize::{Decision, RequestType, Requester, Resource, authorize, holds, list_permission};
pub use error::AuthError;
pub use grant_headers::{
    AclHeaders, CANNED_ACL_HEADER, is_acl_header, parse_grant_headers, parse_grant_value,
};
pub use resolve::{EmailResolver, Grantee, ParsedGrant, resolve_grants};
pub use store::UserStore;
pub use user::{AccessKey, User};
