//! Error types for the ocbridge connection driver
//!
//! This module defines all error types used throughout the crate. None of
//! them cross `ConnectionDriver::run`, which turns every failure into a
//! status report; they surface through the CLI, the configuration layer and
//! the collaborator traits.

use thiserror::Error;

/// Main error type for ocbridge
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Errors related to profile/configuration loading or parsing
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Errors raised by a credential store
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Errors reported by the protocol engine
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Errors from the UI-affinity rendezvous
    #[error("UI dispatch error: {0}")]
    Ui(#[from] UiError),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load profile file: {path}")]
    LoadFailed { path: String },

    #[error("Failed to save profile file: {path}")]
    SaveFailed { path: String },

    #[error("Configuration validation error: {message}")]
    ValidationError { message: String },

    #[error("I/O error: {message}")]
    IoError { message: String },
}

/// Credential store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Keyring service unavailable")]
    ServiceUnavailable,

    #[error("Failed to store credential")]
    StoreFailed,

    #[error("Failed to retrieve credential '{key}'")]
    RetrieveFailed { key: String },

    #[error("No stored value for '{key}'")]
    NotFound { key: String },

    #[error("Credential store is locked")]
    Locked,
}

/// Protocol engine operation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("{op} failed with code {code}")]
    Failed { op: &'static str, code: i32 },

    #[error("Failed to initialize engine library: {reason}")]
    InitFailed { reason: String },

    #[error("Failed to create engine session: {reason}")]
    CreateFailed { reason: String },

    #[error("Invalid argument for {op}: {reason}")]
    InvalidArgument { op: &'static str, reason: String },

    #[error("Engine returned no IP configuration")]
    NoIpInfo,
}

impl EngineError {
    /// Build a failure for an engine call that returned a non-zero code
    pub fn failed(op: &'static str, code: i32) -> Self {
        Self::Failed { op, code }
    }
}

/// UI rendezvous errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiError {
    #[error("UI context has shut down")]
    Closed,

    #[error("UI task was dropped before completing")]
    Dropped,
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, BridgeError>;
