//! Error types for Tessera
//!
//! This module defines the common error type shared by the metadata,
//! authorization and API layers.

use crate::types::{BucketNameError, ObjectKeyError};
use thiserror::Error;

/// Common result type for Tessera operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Tessera
#[derive(Debug, Error)]
pub enum Error {
    // Metadata errors
    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    #[error("bucket already exists: {0}")]
    BucketAlreadyExists(String),

    #[error("object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    #[error("invalid bucket name: {0}")]
    InvalidBucketName(#[from] BucketNameError),

    #[error("invalid object key: {0}")]
    InvalidObjectKey(#[from] ObjectKeyError),

    // Access control errors
    #[error("access denied")]
    AccessDenied,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unresolvable grant by email address: {0}")]
    UnresolvableGrantByEmailAddress(String),

    #[error("malformed ACL: {0}")]
    MalformedAcl(String),

    #[error("malformed XML: {0}")]
    MalformedXml(String),

    // Multipart upload errors
    #[error("no such upload: {upload_id}")]
    NoSuchUpload { upload_id: String },

    #[error("invalid part: {part_number}")]
    InvalidPart { part_number: u32 },

    #[error("invalid part order")]
    InvalidPartOrder,

    // Internal errors
    #[error("internal error: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::BucketNotFound(_) | Self::ObjectNotFound { .. } | Self::NoSuchUpload { .. }
        )
    }

    /// Get HTTP status code for S3 API compatibility
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidArgument(_)
            | Self::InvalidBucketName(_)
            | Self::InvalidObjectKey(_)
            | Self::UnresolvableGrantByEmailAddress(_)
            | Self::MalformedAcl(_)
            | Self::MalformedXml(_)
            | Self::InvalidPart { .. }
            | Self::InvalidPartOrder => 400,

            Self::AccessDenied => 403,

            Self::BucketNotFound(_) | Self::ObjectNotFound { .. } | Self::NoSuchUpload { .. } => {
                404
            }

            Self::BucketAlreadyExists(_) => 409,

            Self::Internal(_) | Self::Configuration(_) | Self::Serialization(_) => 500,
        }
    }

    /// Get S3 error code for API compatibility
    #[must_use]
    pub fn s3_error_code(&self) -> &'static str {
        match self {
            Self::AccessDenied => "AccessDenied",
            Self::BucketNotFound(_) => "NoSuchBucket",
            Self::BucketAlreadyExists(_) => "BucketAlreadyExists",
            Self::ObjectNotFound { .. } => "NoSuchKey",
            Self::InvalidBucketName(_) => "InvalidBucketName",
            Self::InvalidObjectKey(_) | Self::InvalidArgument(_) => "InvalidArgument",
            Self::UnresolvableGrantByEmailAddress(_) => "UnresolvableGrantByEmailAddress",
            Self::MalformedAcl(_) => "MalformedACLError",
            Self::MalformedXml(_) => "MalformedXML",
            Self::NoSuchUpload { .. } => "NoSuchUpload",
            Self::InvalidPart { .. } => "InvalidPart",
            Self::InvalidPartOrder => "InvalidPartOrder",
            Self::Internal(_) | Self::Configuration(_) | Self::Serialization(_) => {
                "InternalError"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_not_found() {
        assert!(Error::BucketNotFound("test".into()).is_not_found());
        assert!(
            Error::ObjectNotFound {
                bucket: "b".into(),
                key: "k".into()
            }
            .is_not_found()
        );
        assert!(!Error::AccessDenied.is_not_found());
    }

    #[test]
    fn test_error_http_status() {
        assert_eq!(Error::AccessDenied.http_status_code(), 403);
        assert_eq!(Error::BucketNotFound("test".into()).http_status_code(), 404);
        assert_eq!(Error::MalformedXml("x".into()).http_status_code(), 400);
        assert_eq!(Error::Internal("test".into()).http_status_code(), 500);
    }

    #[test]
    fn test_acl_error_codes_are_distinct() {
        let codes = [
            Error::invalid_argument("x").s3_error_code(),
            Error::UnresolvableGrantByEmailAddress("a@b.c".into()).s3_error_code(),
            Error::MalformedAcl("x".into()).s3_error_code(),
            Error::MalformedXml("x".into()).s3_error_code(),
            Error::AccessDenied.s3_error_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
