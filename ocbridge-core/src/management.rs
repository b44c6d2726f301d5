//! Management interface the host service drives a session through

use crate::types::PauseReason;

/// Lifecycle requests from the host to a running session
///
/// Every method may be called from any thread at any time and must not block
/// on session teardown.
pub trait Management: Send + Sync {
    /// Hint that the session should pause
    fn pause(&self, reason: PauseReason);

    /// Hint that a paused session may continue
    fn resume(&self);

    /// Request the session to stop; returns once the request is recorded
    fn stop_vpn(&self) -> bool;

    /// Administrative reconnect hint
    fn reconnect(&self);
}
