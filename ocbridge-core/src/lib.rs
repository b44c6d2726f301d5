//! Core library for the ocbridge connection driver
//!
//! This crate drives one OpenConnect session on behalf of a host service:
//! it supplies credentials and callbacks to the protocol engine, programs the
//! tunnel interface through the host and reports connection status.

pub mod error;
pub mod types;

pub mod config;
pub mod credentials;
pub mod driver;
pub mod engine;
pub mod host;
pub mod management;
pub mod state;
pub mod ui;

pub use driver::{ConnectionDriver, DriverHandle};
pub use management::Management;

/// Initialize logging infrastructure
///
/// Sets up tracing with systemd journal logging when running under systemd.
/// Otherwise logs to stderr with pretty formatting.
pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    #[cfg(target_os = "linux")]
    {
        if std::env::var("JOURNAL_STREAM").is_ok() {
            let journal_layer = tracing_journald::layer()?;
            tracing_subscriber::registry()
                .with(journal_layer)
                .with(tracing_subscriber::filter::LevelFilter::INFO)
                .init();
            return Ok(());
        }
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().pretty())
        .with(tracing_subscriber::filter::LevelFilter::INFO)
        .init();

    Ok(())
}
