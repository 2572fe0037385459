//! Hierarchical listing over an ordered key stream
//!
//! [`Listing`] consumes entries in ascending key order, one at a time, and
//! builds a page of results: entries matching the prefix are either
//! returned as contents or folded into a common prefix when the remainder
//! after the prefix contains the delimiter. Every common prefix counts as
//! one unit against `max_keys`.
//!
//! The listing never splits a common-prefix group across pages. Once the
//! page is full, the rest of the open group is still consumed, and the
//! page is only declared truncated when the next matching entry falls
//! outside it. `NextMarker` is the last consumed key, so resuming strictly
//! after it neither repeats nor skips anything.
//!
//! The same engine lists multipart uploads. There, keys are namespaced
//! inside the shadow bucket and each entry carries a secondary key (the
//! upload id) that orders uploads of the same object. The namespace is
//! stripped from every surfaced key.
//!
//! The engine does no I/O; [`crate::scan`] drives it from a store.

use std::cmp::Ordering;
use std::str::FromStr;
use tessera_common::{Error, Result};

/// An entry the listing engine can consume
pub trait Listable {
    /// Key used for prefix matching, delimiter grouping and marker comparison
    fn listing_key(&self) -> &str;

    /// Tie-breaker among entries sharing a listing key
    fn secondary_key(&self) -> Option<&str> {
        None
    }
}

/// Pagination cursor: resume strictly after `(key, secondary)`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Marker {
    pub key: String,
    pub secondary: Option<String>,
}

impl Marker {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secondary: None,
        }
    }

    #[must_use]
    pub fn with_secondary(mut self, secondary: impl Into<String>) -> Self {
        self.secondary = Some(secondary.into());
        self
    }
}

/// `encoding-type` request parameter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncodingType {
    Url,
}

impl EncodingType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Url => "url",
        }
    }

    /// Apply the encoding to a key surfaced to the client
    #[must_use]
    pub fn encode(self, key: &str) -> String {
        match self {
            Self::Url => urlencoding::encode(key).into_owned(),
        }
    }
}

impl FromStr for EncodingType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "url" => Ok(Self::Url),
            other => Err(Error::invalid_argument(format!(
                "invalid encoding type: {other}"
            ))),
        }
    }
}

/// Parameters of one listing request
#[derive(Clone, Debug, Default)]
pub struct ListingParams {
    /// Internal key namespace, never surfaced to the caller
    pub namespace: String,
    /// Caller-supplied prefix
    pub prefix: String,
    /// Grouping delimiter; empty delimiters are ignored
    pub delimiter: Option<String>,
    /// Resume strictly after this position (caller key space)
    pub marker: Option<Marker>,
    /// Page budget shared by contents and common prefixes
    pub max_keys: usize,
    /// Encoding applied to surfaced keys
    pub encoding: Option<EncodingType>,
}

impl ListingParams {
    /// Prefix of every store key the listing can match
    #[must_use]
    pub fn store_prefix(&self) -> String {
        format!("{}{}", self.namespace, self.prefix)
    }
}

/// A listed entry and its surfaced key
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Matched<T> {
    /// Key without namespace, encoded when requested
    pub key: String,
    pub entry: T,
}

/// One page of listing results
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingResult<T> {
    pub contents: Vec<Matched<T>>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    /// Set only when truncated and something was consumed
    pub next_marker: Option<Marker>,
}

/// Whether the listing wants more input
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Continue,
    Done,
}

/// Incremental listing accumulator
#[derive(Debug)]
pub struct Listing<T> {
    params: ListingParams,
    full_prefix: String,
    /// Marker moved into store key space
    marker: Option<Marker>,
    contents: Vec<Matched<T>>,
    common_prefixes: Vec<String>,
    /// The most recent common prefix; later members of it are absorbed
    open_group: Option<String>,
    last_consumed: Option<Marker>,
    truncated: bool,
}

impl<T: Listable> Listing<T> {
    #[must_use]
    pub fn new(mut params: ListingParams) -> Self {
        if params.delimiter.as_deref() == Some("") {
            params.delimiter = None;
        }
        let full_prefix = params.store_prefix();
        let marker = params.marker.as_ref().map(|m| Marker {
            key: format!("{}{}", params.namespace, m.key),
            secondary: m.secondary.clone(),
        });
        Self {
            params,
            full_prefix,
            marker,
            contents: Vec::new(),
            common_prefixes: Vec::new(),
            open_group: None,
            last_consumed: None,
            truncated: false,
        }
    }

    /// Prefix of every store key the listing can match
    #[must_use]
    pub fn store_prefix(&self) -> &str {
        &self.full_prefix
    }

    fn len(&self) -> usize {
        self.contents.len() + self.common_prefixes.len()
    }

    fn after_marker(&self, key: &str, secondary: Option<&str>) -> bool {
        let Some(marker) = &self.marker else {
            return true;
        };
        match key.cmp(marker.key.as_str()) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => match (marker.secondary.as_deref(), secondary) {
                (Some(after), Some(secondary)) => secondary > after,
                _ => false,
            },
        }
    }

    /// Common prefix `key` folds into, in store key space
    fn group_of(&self, key: &str) -> Option<String> {
        let delimiter = self.params.delimiter.as_deref()?;
        let rest = key.strip_prefix(&self.full_prefix)?;
        let end = rest.find(delimiter)? + delimiter.len();
        Some(format!("{}{}", self.full_prefix, &rest[..end]))
    }

    fn strip_namespace<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(&self.params.namespace).unwrap_or(key)
    }

    /// Content key as surfaced to the caller
    fn surface(&self, key: &str) -> String {
        let key = self.strip_namespace(key);
        match self.params.encoding {
            Some(encoding) => encoding.encode(key),
            None => key.to_string(),
        }
    }

    fn consume(&mut self, key: &str, secondary: Option<&str>) {
        self.last_consumed = Some(Marker {
            key: key.to_string(),
            secondary: secondary.map(str::to_string),
        });
    }

    /// Feed the next entry in ascending order
    pub fn push(&mut self, entry: T) -> Step {
        if self.truncated {
            return Step::Done;
        }

        let key = entry.listing_key();
        let secondary = entry.secondary_key();
        if !key.starts_with(&self.full_prefix) || !self.after_marker(key, secondary) {
            return Step::Continue;
        }

        let group = self.group_of(key);
        if group.is_some() && group == self.open_group {
            let (key, secondary) = (key.to_string(), secondary.map(str::to_string));
            self.consume(&key, secondary.as_deref());
            return Step::Continue;
        }

        if self.len() >= self.params.max_keys {
            self.truncated = true;
            return Step::Done;
        }

        let (key, secondary) = (key.to_string(), secondary.map(str::to_string));
        self.consume(&key, secondary.as_deref());
        match group {
            Some(group) => {
                self.common_prefixes.push(group.clone());
                self.open_group = Some(group);
            }
            None => {
                let surfaced = self.surface(&key);
                self.contents.push(Matched {
                    key: surfaced,
                    entry,
                });
                self.open_group = None;
            }
        }
        Step::Continue
    }

    /// Close the page
    #[must_use]
    pub fn finish(self) -> ListingResult<T> {
        let common_prefixes = self
            .common_prefixes
            .iter()
            .map(|prefix| self.strip_namespace(prefix).to_string())
            .collect();
        let next_marker = if self.truncated {
            self.last_consumed.map(|m| Marker {
                key: m
                    .key
                    .strip_prefix(&self.params.namespace)
                    .unwrap_or(&m.key)
                    .to_string(),
                secondary: m.secondary,
            })
        } else {
            None
        };
        ListingResult {
            contents: self.contents,
            common_prefixes,
            is_truncated: self.truncated,
            next_marker,
        }
    }
}

/// List a fully materialized, sorted sequence in one call
pub fn list_all<T: Listable>(
    params: ListingParams,
    entries: impl IntoIterator<Item = T>,
) -> ListingResult<T> {
    let mut listing = Listing::new(params);
    for entry in entries {
        if listing.push(entry) == Step::Done {
            break;
        }
    }
    listing.finish()
}
