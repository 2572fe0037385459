//! User and access key storage

use crate::error::AuthError;
use crate::resolve::EmailResolver;
use crate::user::{AccessKey, User};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tessera_common::config::UserConfig;
use tracing::{debug, info};

/// In-memory identity directory
///
/// Seeded from configuration at startup; also resolves email grantees.
#[derive(Default)]
pub struct UserStore {
    /// Users indexed by canonical id
    users: RwLock<HashMap<String, User>>,
    /// Access keys indexed by access_key_id
    keys: RwLock<HashMap<String, AccessKey>>,
    /// Lowercased email address to canonical id
    emails: RwLock<HashMap<String, String>>,
}

impl UserStore {
    /// Create a new empty user store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a user store holding the configured identities
    pub fn from_config(seeds: &[UserConfig]) -> Result<Self, AuthError> {
        let store = Self::new();
        for seed in seeds {
            let user = User::with_id(&seed.canonical_id, &seed.display_name).with_email(&seed.email);
            store.add_user(user)?;
            store.add_access_key(AccessKey::with_id(&seed.access_key_id, &seed.canonical_id))?;
        }
        info!("Loaded {} configured identities", seeds.len());
        Ok(store)
    }

    // =========== Users ===========

    /// Register a user with a known canonical id
    pub fn add_user(&self, user: User) -> Result<(), AuthError> {
        let mut users = self.users.write();
        if users.contains_key(&user.canonical_id) {
            return Err(AuthError::UserAlreadyExists(user.canonical_id));
        }

        if let Some(email) = &user.email {
            let mut emails = self.emails.write();
            let normalized = email.to_ascii_lowercase();
            if emails.contains_key(&normalized) {
                return Err(AuthError::EmailAlreadyRegistered(email.clone()));
            }
            emails.insert(normalized, user.canonical_id.clone());
        }

        debug!(canonical_id = %user.canonical_id, "Registered user {}", user.display_name);
        users.insert(user.canonical_id.clone(), user);
        Ok(())
    }

    /// Get user by canonical id
    pub fn get_user(&self, canonical_id: &str) -> Result<User, AuthError> {
        self.users
            .read()
            .get(canonical_id)
            .cloned()
            .ok_or_else(|| AuthError::UserNotFound(canonical_id.to_string()))
    }

    /// Get user by email address (case-insensitive)
    pub fn get_user_by_email(&self, email: &str) -> Result<User, AuthError> {
        let canonical_id = self
            .emails
            .read()
            .get(&email.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| AuthError::UserNotFound(email.to_string()))?;
        self.get_user(&canonical_id)
    }

    // =========== Access Keys ===========

    /// Register an access key for an existing user
    pub fn add_access_key(&self, key: AccessKey) -> Result<(), AuthError> {
        self.get_user(&key.canonical_id)?;
        self.keys.write().insert(key.access_key_id.clone(), key);
        Ok(())
    }

    /// Get access key by ID
    pub fn get_access_key(&self, access_key_id: &str) -> Result<AccessKey, AuthError> {
        self.keys
            .read()
            .get(access_key_id)
            .cloned()
            .ok_or_else(|| AuthError::AccessKeyNotFound(access_key_id.to_string()))
    }

    // =========== Lookup for Auth ===========

    /// Look up the user behind an access key
    pub fn lookup_for_auth(&self, access_key_id: &str) -> Result<User, AuthError> {
        let key = self.get_access_key(access_key_id)?;
        self.get_user(&key.canonical_id)
    }
}

#[async_trait]
impl EmailResolver for UserStore {
    async fn resolve_email(&self, address: &str) -> tessera_common::Result<String> {
        self.get_user_by_email(address)
            .map(|user| user.canonical_id)
            .map_err(|_| tessera_common::Error::UnresolvableGrantByEmailAddress(address.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE1: &str = "79a59df900b949e55d96a1e698fbacedfd6e09d98eacf8f8d5218e7cd47ef2be";

    fn seeded() -> UserStore {
        UserStore::from_config(&[UserConfig {
            display_name: "sampleaccount1".to_string(),
            canonical_id: SAMPLE1.to_string(),
            email: "sampleaccount1@sampling.com".to_string(),
            access_key_id: "accessKey1".to_string(),
        }])
        .unwrap()
    }

    #[test]
    fn test_duplicate_user() {
        let store = seeded();
        let result = store.add_user(User::with_id(SAMPLE1, "again"));
        assert!(matches!(result, Err(AuthError::UserAlreadyExists(_))));
    }

    #[test]
    fn test_duplicate_email() {
        let store = seeded();
        let result = store
            .add_user(User::with_id("other-id", "other").with_email("SampleAccount1@sampling.com"));
        assert!(matches!(result, Err(AuthError::EmailAlreadyRegistered(_))));
    }

    #[test]
    fn test_access_key_requires_user() {
        let store = seeded();
        let result = store.add_access_key(AccessKey::with_id("accessKey2", "missing"));
        assert!(matches!(result, Err(AuthError::UserNotFound(_))));
    }

    #[test]
    fn test_lookup_for_auth() {
        let store = seeded();
        let user = store.lookup_for_auth("accessKey1").unwrap();
        assert_eq!(user.canonical_id, SAMPLE1);
        assert_eq!(user.display_name, "sampleaccount1");
        assert!(matches!(
            store.lookup_for_auth("nope"),
            Err(AuthError::AccessKeyNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_email() {
        let store = seeded();
        assert_eq!(
            store
                .resolve_email("sampleaccount1@sampling.com")
                .await
                .unwrap(),
            SAMPLE1
        );
        let err = store.resolve_email("xyz@amazon.com").await.unwrap_err();
        assert_eq!(err.s3_error_code(), "UnresolvableGrantByEmailAddress");
    }
}
