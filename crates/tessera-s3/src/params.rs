//! Query-string parameters of the listing and multipart operations

use crate::listing::{EncodingType, ListingParams, Marker};
use crate::mpu_key;
use serde::Deserialize;
use tessera_common::{Error, Result};

/// Limits applied to client page sizes
#[derive(Clone, Copy, Debug)]
pub struct PageLimits {
    pub default: usize,
    pub max: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default: 1000,
            max: 1000,
        }
    }
}

impl PageLimits {
    /// Validate a raw page size: absent means default, larger values clamp
    pub fn resolve(self, name: &str, raw: Option<&str>) -> Result<usize> {
        let Some(raw) = raw else {
            return Ok(self.default);
        };
        let value: i64 = raw
            .trim()
            .parse()
            .map_err(|_| Error::invalid_argument(format!("{name} must be an integer")))?;
        if value < 0 {
            return Err(Error::invalid_argument(format!(
                "{name} must be non-negative"
            )));
        }
        Ok(usize::try_from(value).map_or(self.max, |v| v.min(self.max)))
    }
}

fn parse_encoding(raw: Option<&str>) -> Result<Option<EncodingType>> {
    raw.map(str::parse).transpose()
}

/// `GET /{bucket}` query
#[derive(Debug, Deserialize, Default)]
pub struct ListObjectsQuery {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub marker: Option<String>,
    #[serde(rename = "max-keys")]
    pub max_keys: Option<String>,
    #[serde(rename = "encoding-type")]
    pub encoding_type: Option<String>,
}

impl ListObjectsQuery {
    /// Validate into listing parameters over the bucket keyspace
    pub fn to_params(&self, limits: PageLimits) -> Result<ListingParams> {
        Ok(ListingParams {
            namespace: String::new(),
            prefix: self.prefix.clone().unwrap_or_default(),
            delimiter: self.delimiter.clone(),
            marker: self.marker.clone().filter(|m| !m.is_empty()).map(Marker::new),
            max_keys: limits.resolve("max-keys", self.max_keys.as_deref())?,
            encoding: parse_encoding(self.encoding_type.as_deref())?,
        })
    }
}

/// `GET /{bucket}?uploads` query
#[derive(Debug, Deserialize, Default)]
pub struct ListUploadsQuery {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    #[serde(rename = "key-marker")]
    pub key_marker: Option<String>,
    #[serde(rename = "upload-id-marker")]
    pub upload_id_marker: Option<String>,
    #[serde(rename = "max-uploads")]
    pub max_uploads: Option<String>,
    #[serde(rename = "encoding-type")]
    pub encoding_type: Option<String>,
}

impl ListUploadsQuery {
    /// Validate into listing parameters over the shadow keyspace.
    ///
    /// An upload-id marker only applies together with a key marker.
    pub fn to_params(&self, limits: PageLimits) -> Result<ListingParams> {
        let prefix = self.prefix.clone().unwrap_or_default();
        if prefix.contains(mpu_key::SPLITTER) {
            return Err(Error::invalid_argument("prefix cannot contain a NUL character"));
        }
        let marker = self
            .key_marker
            .clone()
            .filter(|m| !m.is_empty())
            .map(|key| {
                let marker = Marker::new(key);
                match self.upload_id_marker.as_deref().filter(|m| !m.is_empty()) {
                    Some(id) => marker.with_secondary(id),
                    None => marker,
                }
            });
        Ok(ListingParams {
            namespace: mpu_key::overview_namespace(),
            prefix,
            delimiter: self.delimiter.clone(),
            marker,
            max_keys: limits.resolve("max-uploads", self.max_uploads.as_deref())?,
            encoding: parse_encoding(self.encoding_type.as_deref())?,
        })
    }
}

/// `GET /{bucket}/{key}?uploadId=` query
#[derive(Debug, Deserialize, Default)]
pub struct ListPartsQuery {
    #[serde(rename = "max-parts")]
    pub max_parts: Option<String>,
    #[serde(rename = "part-number-marker")]
    pub part_number_marker: Option<String>,
}

impl ListPartsQuery {
    /// `(part number marker, max parts)`
    pub fn resolve(&self, limits: PageLimits) -> Result<(u32, usize)> {
        let marker = match self.part_number_marker.as_deref() {
            None | Some("") => 0,
            Some(raw) => raw.trim().parse().map_err(|_| {
                Error::invalid_argument("part-number-marker must be a non-negative integer")
            })?,
        };
        Ok((marker, limits.resolve("max-parts", self.max_parts.as_deref())?))
    }
}
