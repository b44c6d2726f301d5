//! Configuration module
//!
//! Driver tunables and the callback policies, plus TOML profile file I/O in
//! [`toml_config`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod toml_config;

/// Seconds between DTLS connection attempts
pub const DEFAULT_DTLS_ATTEMPT_PERIOD: u32 = 60;

/// Seconds the engine keeps trying to reconnect before giving up
pub const DEFAULT_RECONNECT_TIMEOUT: u32 = 300;

/// Lowest reconnect interval the engine accepts
pub const RECONNECT_INTERVAL_MIN: u32 = 10;

/// How the certificate validation hook decides
///
/// The default accepts every certificate the engine questions. This is a
/// known weakness kept for compatibility with existing deployments and is
/// logged at WARN on every use; set `pinned` or `reject_all` to tighten it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CertPolicy {
    #[default]
    AcceptAll,
    RejectAll,
    /// Accept only when the engine-reported certificate hash is listed
    Pinned { hashes: Vec<String> },
}

/// What to do with auth form fields the driver has no value for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnhandledFieldPolicy {
    /// Fail the form instead of submitting it with blanks
    #[default]
    Reject,
    /// Leave the fields unset and submit anyway
    Ignore,
}

/// What to do with configuration blobs the engine hands back
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ConfigWritePolicy {
    #[default]
    Discard,
    /// Write `<dir>/<profile uuid>.xml`
    Persist { dir: PathBuf },
}

/// Tunables for one driver instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Period passed to the engine's DTLS setup
    #[serde(default = "default_dtls_attempt_period")]
    pub dtls_attempt_period_secs: u32,

    /// Reconnect timeout handed to the engine mainloop
    #[serde(default = "default_reconnect_timeout")]
    pub reconnect_timeout_secs: u32,

    /// Reconnect interval handed to the engine mainloop
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_secs: u32,

    #[serde(default)]
    pub cert_policy: CertPolicy,

    #[serde(default)]
    pub unhandled_field_policy: UnhandledFieldPolicy,

    #[serde(default)]
    pub config_write: ConfigWritePolicy,
}

fn default_dtls_attempt_period() -> u32 {
    DEFAULT_DTLS_ATTEMPT_PERIOD
}
fn default_reconnect_timeout() -> u32 {
    DEFAULT_RECONNECT_TIMEOUT
}
fn default_reconnect_interval() -> u32 {
    RECONNECT_INTERVAL_MIN
}

impl DriverConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.reconnect_timeout_secs == 0 {
            return Err("reconnect_timeout_secs cannot be zero".to_string());
        }

        if self.reconnect_interval_secs < RECONNECT_INTERVAL_MIN {
            return Err(format!(
                "reconnect_interval_secs must be at least {}, got {}",
                RECONNECT_INTERVAL_MIN, self.reconnect_interval_secs
            ));
        }

        if self.reconnect_interval_secs > self.reconnect_timeout_secs {
            return Err(format!(
                "reconnect_interval_secs ({}) cannot exceed reconnect_timeout_secs ({})",
                self.reconnect_interval_secs, self.reconnect_timeout_secs
            ));
        }

        if let CertPolicy::Pinned { hashes } = &self.cert_policy {
            if hashes.is_empty() {
                return Err("Pinned certificate policy needs at least one hash".to_string());
            }
        }

        Ok(())
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            dtls_attempt_period_secs: DEFAULT_DTLS_ATTEMPT_PERIOD,
            reconnect_timeout_secs: DEFAULT_RECONNECT_TIMEOUT,
            reconnect_interval_secs: RECONNECT_INTERVAL_MIN,
            cert_policy: CertPolicy::default(),
            unhandled_field_policy: UnhandledFieldPolicy::default(),
            config_write: ConfigWritePolicy::default(),
        }
    }
}
