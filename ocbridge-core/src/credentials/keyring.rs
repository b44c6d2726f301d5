//! Keyring-backed credential storage
//!
//! Uses the system keyring (Secret Service on Linux). Every profile gets its
//! own service name, `ocbridge:<uuid>`, and each key is stored as an account
//! under it.

use crate::credentials::CredentialStore;
use crate::error::CredentialError;
use ::keyring::{Entry, Error as KeyringError};
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

/// Prefix of the per-profile keyring service name
pub const KEYRING_SERVICE_PREFIX: &str = "ocbridge";

/// Credential store backed by the system keyring
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    /// Store scoped to the profile `uuid`
    pub fn new(uuid: &Uuid) -> Self {
        Self {
            service: format!("{}:{}", KEYRING_SERVICE_PREFIX, uuid),
        }
    }

    /// Keyring service name for this profile
    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, key: &str) -> Result<Entry, CredentialError> {
        Entry::new(&self.service, key).map_err(|_| CredentialError::ServiceUnavailable)
    }

    /// Store a value under `key`
    pub fn set(&self, key: &str, value: &SecretString) -> Result<(), CredentialError> {
        self.entry(key)?
            .set_password(value.expose_secret())
            .map_err(|e| match e {
                KeyringError::NoStorageAccess(_) => CredentialError::Locked,
                _ => CredentialError::StoreFailed,
            })
    }

    /// Remove the value under `key`; removing a missing key succeeds
    pub fn delete(&self, key: &str) -> Result<(), CredentialError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(KeyringError::NoEntry) => Ok(()),
            Err(_) => Err(CredentialError::StoreFailed),
        }
    }
}

impl CredentialStore for KeyringStore {
    fn get(&self, key: &str) -> Result<Option<SecretString>, CredentialError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(SecretString::new(value))),
            Err(KeyringError::NoEntry) => Ok(None),
            Err(KeyringError::NoStorageAccess(_)) => Err(CredentialError::Locked),
            Err(_) => Err(CredentialError::RetrieveFailed {
                key: key.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_is_scoped_by_profile() {
        let id = Uuid::parse_str("6f1c9a52-3a57-4a0e-9d7c-1b8f9a0b2c3d").unwrap();
        let store = KeyringStore::new(&id);
        assert_eq!(
            store.service(),
            "ocbridge:6f1c9a52-3a57-4a0e-9d7c-1b8f9a0b2c3d"
        );
        assert_ne!(store.service(), KeyringStore::new(&Uuid::new_v4()).service());
    }
}
