//! Tessera S3 API - bucket, object and multipart semantics
//!
//! This crate implements the S3 request semantics for Tessera on top of the
//! metadata store: the prefix/delimiter listing engine, the multipart upload
//! registry kept in a shadow keyspace, and the XML documents exchanged with
//! clients. HTTP routing lives in the gateway binary.

pub mod listing;
pub mod metrics;
pub mod mpu_key;
pub mod multipart;
pub mod params;
pub mod records;
pub mod scan;
pub mod service;
pub mod xml;

// Re-exports
pub use listing::{EncodingType, Listable, Listing, ListingParams, ListingResult, Marker};
pub use metrics::{OperationTimer, S3Metrics, S3Operation, s3_metrics};
pub use multipart::{MultipartRegistry, UploadEntry};
pub use params::{ListObjectsQuery, ListPartsQuery, ListUploadsQuery, PageLimits};
pub use records::{BucketRecord, ObjectMetadata, PartRecord, UploadRecord};
pub use service::{AclInput, AclPolicy, ObjectListing, PartListing, S3Service, UploadListing};
