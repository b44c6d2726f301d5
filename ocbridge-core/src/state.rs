//! Host-side connection status tracking
//!
//! The driver keeps no status history of its own; hosts that want to answer
//! "what is the session doing" record the reports they receive here.

use crate::types::ConnectionStatus;
use std::sync::{Arc, Mutex, PoisonError};

/// Last reported status with its message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub status: ConnectionStatus,
    pub message: String,
}

/// Thread-safe, last-write-wins status cell
#[derive(Debug, Clone, Default)]
pub struct SharedStatus(Arc<Mutex<StatusSnapshot>>);

impl SharedStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current snapshot
    pub fn get(&self) -> StatusSnapshot {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Record a new status
    pub fn set(&self, status: ConnectionStatus, message: &str) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = StatusSnapshot {
            status,
            message: message.to_string(),
        };
    }

    pub fn status(&self) -> ConnectionStatus {
        self.get().status
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Whether the session reached a terminal status
    pub fn is_finished(&self) -> bool {
        self.status().is_terminal()
    }
}
