//! User and access key types

/// A user account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Canonical user id (64 hex characters)
    pub canonical_id: String,
    /// Display name
    pub display_name: String,
    /// Email address, used to resolve email grants
    pub email: Option<String>,
}

impl User {
    pub fn with_id(canonical_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            canonical_id: canonical_id.into(),
            display_name: display_name.into(),
            email: None,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// An access key identifying a user in request credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessKey {
    pub access_key_id: String,
    /// Owning user's canonical id
    pub canonical_id: String,
}

impl AccessKey {
    pub fn with_id(access_key_id: impl Into<String>, canonical_id: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            canonical_id: canonical_id.into(),
        }
    }
}
