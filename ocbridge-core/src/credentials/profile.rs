//! Profile-backed credential store
//!
//! Serves the non-secret keys straight from a [`SessionProfile`] and defers
//! everything else, the password in particular, to an inner store.

use crate::credentials::{CredentialStore, KEY_SERVER_ADDRESS, KEY_USERNAME};
use crate::error::CredentialError;
use crate::types::SessionProfile;
use secrecy::SecretString;

/// Layers a profile's plain fields over another store
pub struct ProfileStore<S> {
    profile: SessionProfile,
    inner: S,
}

impl<S: CredentialStore> ProfileStore<S> {
    pub fn new(profile: SessionProfile, inner: S) -> Self {
        Self { profile, inner }
    }
}

impl<S: CredentialStore> CredentialStore for ProfileStore<S> {
    fn get(&self, key: &str) -> Result<Option<SecretString>, CredentialError> {
        match key {
            KEY_SERVER_ADDRESS => Ok(Some(SecretString::new(self.profile.server_url()))),
            KEY_USERNAME => Ok(Some(SecretString::new(self.profile.username.clone()))),
            _ => self.inner.get(key),
        }
    }
}
