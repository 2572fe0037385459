//! `x-amz-acl` and `x-amz-grant-*` request headers

use crate::acl::{Permission, is_group_uri};
use crate::resolve::{Grantee, ParsedGrant};
use tessera_common::{Error, Result};

/// Canned ACL header
pub const CANNED_ACL_HEADER: &str = "x-amz-acl";

/// ACL-related header values lifted from a request
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AclHeaders {
    /// `x-amz-acl`
    pub canned: Option<String>,
    /// `x-amz-grant-*`, one entry per header occurrence
    pub grants: Vec<(Permission, String)>,
}

/// Whether `name` is `x-amz-acl` or one of the `x-amz-grant-*` headers
#[must_use]
pub fn is_acl_header(name: &str) -> bool {
    name.eq_ignore_ascii_case(CANNED_ACL_HEADER)
        || Permission::ALL
            .into_iter()
            .any(|p| name.eq_ignore_ascii_case(p.header_name()))
}

impl AclHeaders {
    /// Collect ACL headers from (name, value) pairs; names match case-insensitively
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut headers = Self::default();
        for (name, value) in pairs {
            let name = name.to_ascii_lowercase();
            if name == CANNED_ACL_HEADER {
                headers.canned = Some(value.to_string());
            } else if let Some(permission) =
                Permission::ALL.into_iter().find(|p| p.header_name() == name)
            {
                headers.grants.push((permission, value.to_string()));
            }
        }
        headers
    }

    /// Whether any grant header was supplied
    #[must_use]
    pub fn has_grants(&self) -> bool {
        !self.grants.is_empty()
    }

    /// Whether no ACL header at all was supplied
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.canned.is_none() && self.grants.is_empty()
    }
}

/// Parse every grant header into unresolved grants
pub fn parse_grant_headers(headers: &AclHeaders) -> Result<Vec<ParsedGrant>> {
    let mut grants = Vec::new();
    for (permission, value) in &headers.grants {
        grants.extend(parse_grant_value(*permission, value)?);
    }
    Ok(grants)
}

/// Split a header value on commas that sit outside double quotes
fn split_tokens(value: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in value.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                tokens.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    tokens.push(&value[start..]);
    tokens
}

/// Parse one header value: comma-separated `type="value"` tokens
pub fn parse_grant_value(permission: Permission, value: &str) -> Result<Vec<ParsedGrant>> {
    split_tokens(value)
        .into_iter()
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| parse_token(token).map(|grantee| ParsedGrant::new(grantee, permission)))
        .collect()
}

fn parse_token(token: &str) -> Result<Grantee> {
    let (kind, value) = token
        .split_once('=')
        .ok_or_else(|| Error::invalid_argument(format!("malformed grant: {token}")))?;
    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    if value.is_empty() {
        return Err(Error::invalid_argument(format!("empty grantee: {token}")));
    }

    match kind.trim().to_ascii_lowercase().as_str() {
        "id" => Ok(Grantee::CanonicalUser {
            id: value.to_string(),
        }),
        "emailaddress" => Ok(Grantee::Email {
            address: value.to_string(),
        }),
        "uri" if is_group_uri(value) => Ok(Grantee::Group {
            uri: value.to_string(),
        }),
        "uri" => Err(Error::invalid_argument(format!("invalid group uri: {value}"))),
        other => Err(Error::invalid_argument(format!("invalid grantee type: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::LOG_DELIVERY;

    #[test]
    fn test_from_pairs() {
        let headers = AclHeaders::from_pairs([
            ("X-Amz-Acl", "public-read"),
            ("x-amz-grant-read", "uri=\"http://acs.amazonaws.com/groups/s3/LogDelivery\""),
            ("content-type", "text/plain"),
        ]);
        assert_eq!(headers.canned.as_deref(), Some("public-read"));
        assert_eq!(headers.grants.len(), 1);
        assert_eq!(headers.grants[0].0, Permission::Read);
        assert!(AclHeaders::from_pairs([("host", "localhost")]).is_empty());
    }

    #[test]
    fn test_quoted_comma_stays_in_token() {
        let grants = parse_grant_value(
            Permission::Read,
            "emailAddress=\"last, first@example.com\", id=\"abc\"",
        )
        .unwrap();
        assert_eq!(grants.len(), 2);
        assert_eq!(
            grants[0].grantee,
            Grantee::Email {
                address: "last, first@example.com".into()
            }
        );
        assert_eq!(grants[1].grantee, Grantee::CanonicalUser { id: "abc".into() });
    }

    #[test]
    fn test_is_acl_header() {
        assert!(is_acl_header("x-amz-acl"));
        assert!(is_acl_header("X-Amz-Grant-Full-Control"));
        assert!(!is_acl_header("x-amz-grant"));
        assert!(!is_acl_header("content-type"));
    }

    #[test]
    fn test_parse_multiple_emails() {
        let grants = parse_grant_value(
            Permission::FullControl,
            "emailaddress=\"sampleaccount1@sampling.com\",emailaddress=\"sampleaccount2@sampling.com\"",
        )
        .unwrap();
        assert_eq!(grants.len(), 2);
        assert_eq!(
            grants[1].grantee,
            Grantee::Email {
                address: "sampleaccount2@sampling.com".to_string()
            }
        );
        assert!(grants.iter().all(|g| g.permission == Permission::FullControl));
    }

    #[test]
    fn test_parse_mixed_headers() {
        let headers = AclHeaders::from_pairs([
            ("x-amz-grant-read", "uri=\"http://acs.amazonaws.com/groups/s3/LogDelivery\""),
            (
                "x-amz-grant-read-acp",
                "ID=\"79a59df900b949e55d96a1e698fbacedfd6e09d98eacf8f8d5218e7cd47ef2be\"",
            ),
        ]);
        let grants = parse_grant_headers(&headers).unwrap();
        assert_eq!(
            grants[0].grantee,
            Grantee::Group {
                uri: LOG_DELIVERY.to_string()
            }
        );
        assert!(matches!(&grants[1].grantee, Grantee::CanonicalUser { id } if id.ends_with("ef2be")));
    }

    #[test]
    fn test_invalid_group_uri_is_invalid_argument() {
        let err = parse_grant_value(
            Permission::FullControl,
            "uri=\"http://acs.amazonaws.com/groups/global/NOTAVALIDGROUP\"",
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_malformed_tokens() {
        assert!(parse_grant_value(Permission::Read, "nonsense").is_err());
        assert!(parse_grant_value(Permission::Read, "id=\"\"").is_err());
        assert!(parse_grant_value(Permission::Read, "account=\"x\"").is_err());
    }
}
