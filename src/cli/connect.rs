//! Connect command implementation
//!
//! Runs one connection driver for a profile in the foreground. Ctrl-C stops
//! the session; the command returns the last reported status.

use crate::cli::console_host::ConsoleHost;
use ocbridge_core::config::toml_config;
use ocbridge_core::credentials::{KeyringStore, ProfileStore};
use ocbridge_core::engine::EngineFactory;
use ocbridge_core::error::{BridgeError, ConfigError};
use ocbridge_core::state::SharedStatus;
use ocbridge_core::types::ConnectionStatus;
use ocbridge_core::ui::UiContext;
use ocbridge_core::{ConnectionDriver, Management};
use std::os::fd::RawFd;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Run the connect command
pub fn run_connect(uuid: &Uuid, tun_fd: RawFd) -> Result<ConnectionStatus, BridgeError> {
    let file = toml_config::load_profile(uuid)?;
    check_tun_fd(tun_fd)?;
    let factory = engine_factory()?;

    let ui = UiContext::spawn()?;
    let status = SharedStatus::new();
    let host = Arc::new(ConsoleHost::new(status.clone(), tun_fd));
    let store = Arc::new(ProfileStore::new(
        file.profile.clone(),
        KeyringStore::new(uuid),
    ));

    info!("Connecting profile {} ({})", file.profile.uuid, file.profile.name);
    let driver = ConnectionDriver::new(
        file.profile,
        file.driver,
        factory,
        host,
        store,
        ui.handle(),
    );
    let (handle, worker) = driver.spawn()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let finished = runtime.block_on(async move {
        let mut worker = tokio::task::spawn_blocking(move || worker.join().is_ok());
        tokio::select! {
            done = &mut worker => done,
            signal = tokio::signal::ctrl_c() => {
                if should_stop(signal) {
                    println!("Stopping...");
                    handle.stop_vpn();
                }
                worker.await
            }
        }
    });

    if !matches!(finished, Ok(true)) {
        error!("Driver thread terminated abnormally");
    }
    ui.shutdown();

    Ok(status.status())
}

/// Whether a resolved Ctrl-C listener means the user asked to stop
///
/// A listener that failed to install leaves the session running.
fn should_stop(signal: std::io::Result<()>) -> bool {
    match signal {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to listen for Ctrl-C, session keeps running: {}", e);
            false
        }
    }
}

/// Make sure `fd` is an open descriptor before handing it to the engine
fn check_tun_fd(fd: RawFd) -> Result<(), BridgeError> {
    nix::fcntl::fcntl(fd, nix::fcntl::FcntlArg::F_GETFD).map_err(|e| {
        ConfigError::ValidationError {
            message: format!("--tun-fd {} is not an open descriptor: {}", fd, e),
        }
    })?;
    Ok(())
}

#[cfg(feature = "libopenconnect")]
fn engine_factory() -> Result<Arc<dyn EngineFactory>, BridgeError> {
    use ocbridge_core::engine::libopenconnect::{OpenConnectFactory, DEFAULT_USER_AGENT};

    Ok(Arc::new(OpenConnectFactory::new(DEFAULT_USER_AGENT)?))
}

#[cfg(not(feature = "libopenconnect"))]
fn engine_factory() -> Result<Arc<dyn EngineFactory>, BridgeError> {
    Err(ConfigError::ValidationError {
        message: "ocbridge was built without the libopenconnect feature".to_string(),
    }
    .into())
}
