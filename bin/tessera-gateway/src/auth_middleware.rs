//! Identity middleware for the S3 gateway
//!
//! Maps the access key in a V2 or V4 `Authorization` header to a canonical
//! user through the identity directory and attaches the resulting
//! [`Requester`] to the request. Signature verification happens in front
//! of the gateway; requests without an `Authorization` header are anonymous.

use crate::s3::error_response;
use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use std::sync::Arc;
use tessera_auth::{Requester, UserStore};
use tessera_common::Error;
use tracing::{debug, warn};

/// Identity state shared across requests
pub struct AuthState {
    users: Arc<UserStore>,
    /// Every request runs as this user when set (`--no-auth`)
    fixed_identity: Option<String>,
}

impl AuthState {
    pub fn new(users: Arc<UserStore>) -> Self {
        Self {
            users,
            fixed_identity: None,
        }
    }

    /// Treat every request as `canonical_id`
    #[must_use]
    pub fn with_fixed_identity(mut self, canonical_id: impl Into<String>) -> Self {
        self.fixed_identity = Some(canonical_id.into());
        self
    }

    /// Resolve the requester behind an optional `Authorization` header
    pub fn requester(&self, authorization: Option<&str>) -> Result<Requester, Error> {
        if let Some(id) = &self.fixed_identity {
            return Ok(Requester::user(id.clone()));
        }
        let Some(header) = authorization else {
            return Ok(Requester::Anonymous);
        };
        let access_key_id = parse_access_key_id(header)?;
        let user = self.users.lookup_for_auth(access_key_id).map_err(|e| {
            debug!(access_key_id, "Rejected credentials: {}", e);
            Error::AccessDenied
        })?;
        Ok(Requester::user(user.canonical_id))
    }
}

/// Access key id from a V4 (`Credential=AK/...`) or V2 (`AWS AK:sig`) header
fn parse_access_key_id(header: &str) -> Result<&str, Error> {
    let header = header.trim();
    let access_key_id = if let Some(rest) = header.strip_prefix("AWS4-HMAC-SHA256") {
        rest.split(',')
            .find_map(|part| part.trim().strip_prefix("Credential="))
            .and_then(|credential| credential.split('/').next())
    } else if let Some(rest) = header.strip_prefix("AWS ") {
        rest.split_once(':').map(|(key, _)| key)
    } else {
        None
    };
    match access_key_id.map(str::trim) {
        Some(key) if !key.is_empty() => Ok(key),
        _ => {
            warn!("Unsupported authorization header");
            Err(Error::AccessDenied)
        }
    }
}

/// Identity middleware layer
pub async fn auth_layer(
    State(auth_state): State<Arc<AuthState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path();

    // Skip identity for health checks and metrics
    if path == "/health" || path == "/metrics" {
        return next.run(request).await;
    }

    let authorization = request
        .headers()
        .get("authorization")
        .map(|value| value.to_str().map_err(|_| Error::AccessDenied))
        .transpose();
    let requester = authorization.and_then(|header| auth_state.requester(header));

    match requester {
        Ok(requester) => {
            request.extensions_mut().insert(requester);
            next.run(request).await
        }
        Err(e) => error_response(&e, request.uri().path()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_auth::{AccessKey, User};

    const SAMPLE1: &str = "79a59df900b949e55d96a1e698fbacedfd6e09d98eacf8f8d5218e7cd47ef2be";

    fn state() -> AuthState {
        let users = UserStore::new();
        users.add_user(User::with_id(SAMPLE1, "sampleaccount1")).unwrap();
        users
            .add_access_key(AccessKey::with_id("AKIDSAMPLE1", SAMPLE1))
            .unwrap();
        AuthState::new(Arc::new(users))
    }

    #[test]
    fn test_parse_v4_header() {
        let header = "AWS4-HMAC-SHA256 Credential=AKIDSAMPLE1/20250101/us-east-1/s3/aws4_request, \
                      SignedHeaders=host;x-amz-date, Signature=abcdef";
        assert_eq!(parse_access_key_id(header).unwrap(), "AKIDSAMPLE1");
    }

    #[test]
    fn test_parse_v2_header() {
        assert_eq!(parse_access_key_id("AWS AKIDSAMPLE1:c2lnbmF0dXJl").unwrap(), "AKIDSAMPLE1");
        assert!(parse_access_key_id("Bearer token").is_err());
        assert!(parse_access_key_id("AWS :sig").is_err());
    }

    #[test]
    fn test_requester_resolution() {
        let state = state();
        assert_eq!(state.requester(None).unwrap(), Requester::Anonymous);
        assert_eq!(
            state.requester(Some("AWS AKIDSAMPLE1:sig")).unwrap(),
            Requester::user(SAMPLE1)
        );
        assert!(matches!(
            state.requester(Some("AWS UNKNOWN:sig")),
            Err(Error::AccessDenied)
        ));
    }

    #[test]
    fn test_fixed_identity() {
        let state = state().with_fixed_identity(SAMPLE1);
        assert_eq!(state.requester(None).unwrap(), Requester::user(SAMPLE1));
    }
}
