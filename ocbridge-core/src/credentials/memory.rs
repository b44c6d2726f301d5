//! In-memory credential store
//!
//! Backs tests and hosts that already hold credentials in memory, such as a
//! service that received them over its own IPC.

use crate::credentials::CredentialStore;
use crate::error::CredentialError;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::RwLock;

/// Credential store backed by a `HashMap`
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, SecretString>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(self, key: &str, value: &str) -> Self {
        self.insert(key, SecretString::new(value.to_string()));
        self
    }

    /// Insert or replace the value under `key`
    pub fn insert(&self, key: &str, value: SecretString) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value);
    }

    /// Remove the value under `key`
    pub fn remove(&self, key: &str) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.remove(key);
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<SecretString>, CredentialError> {
        let values = self.values.read().map_err(|_| CredentialError::RetrieveFailed {
            key: key.to_string(),
        })?;
        Ok(values
            .get(key)
            .map(|v| SecretString::new(v.expose_secret().clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let store = MemoryStore::new().with("username", "alice");
        assert_eq!(
            store.get("username").unwrap().unwrap().expose_secret(),
            "alice"
        );
        assert!(store.get("password").unwrap().is_none());

        store.remove("username");
        assert!(store.get("username").unwrap().is_none());
    }
}
