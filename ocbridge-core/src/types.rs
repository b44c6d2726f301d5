//! Shared data types
//!
//! Profiles, the outward connection status and lifecycle hints. Sensitive
//! values never live here; they stay in a credential store and travel as
//! `secrecy` wrappers.

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// A configured VPN endpoint
///
/// Owned by the surrounding application and read-only to the driver. The
/// password is not part of the profile; it is looked up in the credential
/// store namespaced by `uuid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProfile {
    /// Stable identifier used to namespace stored credentials
    pub uuid: Uuid,

    /// Human readable profile name
    #[serde(default)]
    pub name: String,

    /// VPN server hostname, IP address or URL
    pub server_address: String,

    /// Username for the VPN login form
    pub username: String,
}

impl SessionProfile {
    /// Create a new profile with a fresh identifier
    pub fn new(name: String, server_address: String, username: String) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name,
            server_address,
            username,
        }
    }

    /// URL handed to the engine's address parser
    ///
    /// Bare hostnames get an `https://` scheme, as the OpenConnect CLI does.
    pub fn server_url(&self) -> String {
        normalize_server_url(&self.server_address)
    }

    /// Validate the profile
    pub fn validate(&self) -> Result<(), String> {
        if self.server_address.trim().is_empty() {
            return Err("Server address cannot be empty".to_string());
        }

        let url = Url::parse(&self.server_url())
            .map_err(|e| format!("Invalid server address '{}': {}", self.server_address, e))?;

        match url.scheme() {
            "https" | "http" => {}
            scheme => return Err(format!("Unsupported server scheme: {}", scheme)),
        }

        if url.host_str().map_or(true, str::is_empty) {
            return Err("Server address has no host".to_string());
        }

        if self.username.is_empty() {
            return Err("Username cannot be empty".to_string());
        }

        Ok(())
    }
}

/// Prefix scheme-less server addresses with `https://`
pub fn normalize_server_url(server: &str) -> String {
    let server = server.trim();
    if server.contains("://") {
        server.to_string()
    } else {
        format!("https://{}", server)
    }
}

/// Connection status reported to the host service
///
/// Single current value, last write wins. `Init` is the state before the
/// driver has reported anything and is never reported itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionStatus {
    #[default]
    Init,
    WaitingForUserInput,
    AuthFailed,
    Connected,
    NotConnected,
}

impl ConnectionStatus {
    /// State name carried in the status report
    pub fn state_name(self) -> &'static str {
        match self {
            ConnectionStatus::Init => "INIT",
            ConnectionStatus::WaitingForUserInput => "USER_VPN_PASSWORD",
            ConnectionStatus::AuthFailed => "AUTH_FAILED",
            ConnectionStatus::Connected => "CONNECTED",
            ConnectionStatus::NotConnected => "NOPROCESS",
        }
    }

    /// Resource identifier for the localized status text
    pub fn resource_id(self) -> &'static str {
        match self {
            ConnectionStatus::Init => "state_init",
            ConnectionStatus::WaitingForUserInput => "state_user_vpn_password",
            ConnectionStatus::AuthFailed => "state_auth_failed",
            ConnectionStatus::Connected => "state_connected",
            ConnectionStatus::NotConnected => "state_noprocess",
        }
    }

    /// Terminal states end a driver's life
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConnectionStatus::AuthFailed | ConnectionStatus::NotConnected
        )
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Init => write!(f, "initializing"),
            ConnectionStatus::WaitingForUserInput => write!(f, "waiting for user input"),
            ConnectionStatus::AuthFailed => write!(f, "authentication failed"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::NotConnected => write!(f, "not connected"),
        }
    }
}

/// Why the host asked the session to pause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PauseReason {
    NoNetwork,
    UserPause,
    ScreenOff,
}

impl std::fmt::Display for PauseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PauseReason::NoNetwork => write!(f, "no network"),
            PauseReason::UserPause => write!(f, "user pause"),
            PauseReason::ScreenOff => write!(f, "screen off"),
        }
    }
}
