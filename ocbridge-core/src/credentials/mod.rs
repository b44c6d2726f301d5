//! Credential stores
//!
//! Key-value read access to the values the driver needs during a session,
//! scoped by the profile identifier. Reads return `SecretString` so values
//! never show up in logs or debug output.

use crate::error::CredentialError;
use secrecy::SecretString;

pub mod keyring;
pub mod memory;
pub mod profile;

pub use self::keyring::KeyringStore;
pub use memory::MemoryStore;
pub use profile::ProfileStore;

/// Key holding the VPN server address
pub const KEY_SERVER_ADDRESS: &str = "server_address";

/// Key holding the login username
pub const KEY_USERNAME: &str = "username";

/// Key holding the login password
pub const KEY_PASSWORD: &str = "password";

/// Read-only credential lookup for one profile
pub trait CredentialStore: Send + Sync {
    /// Look up `key`, `Ok(None)` when nothing is stored under it
    fn get(&self, key: &str) -> Result<Option<SecretString>, CredentialError>;
}
