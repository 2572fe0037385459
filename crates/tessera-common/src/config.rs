//! Configuration types for Tessera
//!
//! The gateway reads an optional TOML file and then applies `TESSERA__*`
//! environment overrides (e.g. `TESSERA__SERVER__LISTEN=0.0.0.0:9100`).
//! Every section has defaults, so an empty file is a valid configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration for Tessera
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Metadata store configuration
    pub store: StoreConfig,
    /// S3 API configuration
    pub s3: S3Config,
    /// Seed identities for the user directory
    pub users: Vec<UserConfig>,
}

impl Config {
    /// Load configuration from an optional file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("TESSERA")
                .prefix_separator("__")
                .separator("__"),
        );

        builder
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| Error::Configuration(e.to_string()))
    }
}

/// HTTP server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address for the S3 API
    pub listen: SocketAddr,
    /// Namespace mixed into every bucket UID
    pub namespace: String,
    /// Maximum accepted request body (bytes)
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 9000)),
            namespace: "default".to_string(),
            max_body_size: 100 * 1024 * 1024, // 100 MB
        }
    }
}

/// Metadata store backend selection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Volatile in-process store
    #[default]
    Memory,
    /// Persistent redb database
    Redb,
}

/// Metadata store configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Database file (redb backend only)
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: PathBuf::from("/var/lib/tessera/meta.redb"),
        }
    }
}

/// S3 API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// `max-keys` / `max-uploads` when the request omits it
    pub default_max_keys: u32,
    /// Upper bound applied to `max-keys` / `max-uploads`
    pub max_keys_limit: u32,
    /// Entries fetched from the metadata store per round trip while listing
    pub listing_batch_size: usize,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            default_max_keys: 1000,
            max_keys_limit: 1000,
            listing_batch_size: 1000,
        }
    }
}

/// A seed identity
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserConfig {
    pub display_name: String,
    /// 64-hex canonical user id
    pub canonical_id: String,
    pub email: String,
    pub access_key_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.listen.port(), 9000);
        assert_eq!(config.server.namespace, "default");
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.s3.max_keys_limit, 1000);
        assert!(config.users.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
namespace = "tenant-a"

[store]
backend = "redb"
path = "/tmp/meta.redb"

[[users]]
display_name = "alice"
canonical_id = "79a59df900b949e55d96a1e698fbacedfd6e09d98eacf8f8d5218e7cd47ef2be"
email = "alice@example.com"
access_key_id = "accessKey1"
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.server.namespace, "tenant-a");
        assert_eq!(config.server.listen.port(), 9000);
        assert_eq!(config.store.backend, StoreBackend::Redb);
        assert_eq!(config.users.len(), 1);
        assert_eq!(config.users[0].access_key_id, "accessKey1");
        assert_eq!(config.s3.default_max_keys, 1000);
    }
}
