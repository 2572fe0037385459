//! Grantee resolution
//!
//! Header and XML parsers produce [`ParsedGrant`]s whose grantees may still
//! be email addresses. [`resolve_grants`] maps every email to a canonical id
//! through an [`EmailResolver`] and only then builds the [`Acl`], so a
//! single unknown address leaves nothing behind.

use crate::acl::{Acl, AclTarget, Grant, Permission};
use async_trait::async_trait;
use tessera_common::Result;

/// A grantee as written by the client
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Grantee {
    CanonicalUser { id: String },
    Group { uri: String },
    Email { address: String },
}

/// A grant straight out of a parser
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedGrant {
    pub grantee: Grantee,
    pub permission: Permission,
}

impl ParsedGrant {
    pub const fn new(grantee: Grantee, permission: Permission) -> Self {
        Self {
            grantee,
            permission,
        }
    }
}

/// Maps email addresses to canonical user ids
#[async_trait]
pub trait EmailResolver: Send + Sync {
    /// Fails `UnresolvableGrantByEmailAddress` for unknown addresses
    async fn resolve_email(&self, address: &str) -> Result<String>;
}

/// Resolve every grantee and build the explicit ACL for `target`
pub async fn resolve_grants(
    grants: Vec<ParsedGrant>,
    target: AclTarget,
    resolver: &dyn EmailResolver,
) -> Result<Acl> {
    let mut resolved = Vec::with_capacity(grants.len());
    for grant in grants {
        let grantee = match grant.grantee {
            Grantee::CanonicalUser { id } => id,
            Grantee::Group { uri } => uri,
            Grantee::Email { address } => resolver.resolve_email(&address).await?,
        };
        resolved.push(Grant::new(grantee, grant.permission));
    }
    Ok(Acl::from_grants(target, resolved))
}
