//! Identity directory error types

use thiserror::Error;

/// Identity lookup and registration errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("access key not found: {0}")]
    AccessKeyNotFound(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("user already exists: {0}")]
    UserAlreadyExists(String),

    #[error("email address already registered: {0}")]
    EmailAlreadyRegistered(String),
}

impl From<AuthError> for tessera_common::Error {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::AccessKeyNotFound(_) | AuthError::UserNotFound(_) => Self::AccessDenied,
            AuthError::UserAlreadyExists(_) | AuthError::EmailAlreadyRegistered(_) => {
                Self::Configuration(e.to_string())
            }
        }
    }
}
