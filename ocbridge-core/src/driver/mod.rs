//! Connection driver
//!
//! Owns the lifecycle of one connection attempt: initialize the engine
//! library, create the engine with the callback adapter, negotiate, program
//! the tunnel interface through the host, hand over the TUN descriptor and
//! run the engine mainloop until the session ends. Every outcome is reported
//! through [`HostService::update_state`]; `run` itself never fails.
//!
//! Reported status sequences:
//!
//! ```text
//! USER_VPN_PASSWORD -> AUTH_FAILED                  negotiation failed
//! USER_VPN_PASSWORD -> NOPROCESS                    device setup failed or stopped
//! USER_VPN_PASSWORD -> CONNECTED -> NOPROCESS       session ran and ended
//! NOPROCESS                                         engine could not be created
//! ```

use crate::config::DriverConfig;
use crate::credentials::{CredentialStore, KEY_SERVER_ADDRESS};
use crate::engine::{Canceller, Engine, EngineCallbacks, EngineFactory, IpInfo};
use crate::error::BridgeError;
use crate::host::HostService;
use crate::management::Management;
use crate::types::{ConnectionStatus, PauseReason, SessionProfile};
use crate::ui::UiHandle;
use secrecy::{ExposeSecret, SecretString};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub mod callbacks;
pub mod routes;

pub use callbacks::DriverCallbacks;
pub use routes::{plan_routes, Route};

/// Read `key` from `store` on the UI thread
pub(crate) fn read_credential(
    ui: &UiHandle,
    store: &Arc<dyn CredentialStore>,
    key: &'static str,
) -> Result<Option<SecretString>, BridgeError> {
    let store = Arc::clone(store);
    Ok(ui.run_sync(move || store.get(key))??)
}

#[derive(Default)]
struct CancelInner {
    requested: bool,
    canceller: Option<Arc<dyn Canceller>>,
}

/// Stop requests shared between the worker and every handle
#[derive(Default)]
struct CancelState {
    inner: Mutex<CancelInner>,
}

impl CancelState {
    fn lock(&self) -> std::sync::MutexGuard<'_, CancelInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a stop request and signal the live engine, if any
    fn request(&self) {
        let canceller = {
            let mut inner = self.lock();
            inner.requested = true;
            inner.canceller.clone()
        };
        if let Some(canceller) = canceller {
            canceller.cancel();
        }
    }

    fn is_requested(&self) -> bool {
        self.lock().requested
    }

    /// Make the engine reachable for stop requests until the guard drops
    fn attach(&self, canceller: Arc<dyn Canceller>) -> CancelRegistration<'_> {
        let already_requested = {
            let mut inner = self.lock();
            inner.canceller = Some(Arc::clone(&canceller));
            inner.requested
        };
        if already_requested {
            canceller.cancel();
        }
        CancelRegistration { state: self }
    }
}

struct CancelRegistration<'a> {
    state: &'a CancelState,
}

impl Drop for CancelRegistration<'_> {
    fn drop(&mut self) {
        self.state.lock().canceller = None;
    }
}

/// Handle for managing a driver from other threads
#[derive(Clone)]
pub struct DriverHandle {
    profile_id: Uuid,
    cancel: Arc<CancelState>,
}

impl DriverHandle {
    pub fn profile_id(&self) -> Uuid {
        self.profile_id
    }

    /// Whether a stop has been requested
    pub fn stop_requested(&self) -> bool {
        self.cancel.is_requested()
    }
}

impl Management for DriverHandle {
    fn pause(&self, reason: PauseReason) {
        info!(profile = %self.profile_id, "PAUSE ({})", reason);
    }

    fn resume(&self) {
        info!(profile = %self.profile_id, "RESUME");
    }

    fn stop_vpn(&self) -> bool {
        info!(profile = %self.profile_id, "STOP");
        self.cancel.request();
        true
    }

    fn reconnect(&self) {
        info!(profile = %self.profile_id, "RECONNECT");
    }
}

/// Drives one connection attempt; consumed by [`ConnectionDriver::run`]
pub struct ConnectionDriver {
    profile: SessionProfile,
    config: DriverConfig,
    factory: Arc<dyn EngineFactory>,
    host: Arc<dyn HostService>,
    store: Arc<dyn CredentialStore>,
    ui: UiHandle,
    cancel: Arc<CancelState>,
}

impl ConnectionDriver {
    pub fn new(
        profile: SessionProfile,
        config: DriverConfig,
        factory: Arc<dyn EngineFactory>,
        host: Arc<dyn HostService>,
        store: Arc<dyn CredentialStore>,
        ui: UiHandle,
    ) -> Self {
        Self {
            profile,
            config,
            factory,
            host,
            store,
            ui,
            cancel: Arc::new(CancelState::default()),
        }
    }

    pub fn handle(&self) -> DriverHandle {
        DriverHandle {
            profile_id: self.profile.uuid,
            cancel: Arc::clone(&self.cancel),
        }
    }

    /// Run on a dedicated worker thread
    pub fn spawn(self) -> std::io::Result<(DriverHandle, JoinHandle<()>)> {
        let handle = self.handle();
        let worker = thread::Builder::new()
            .name("ocbridge-driver".to_string())
            .spawn(move || self.run())?;
        Ok((handle, worker))
    }

    /// Run the connection attempt to completion; blocks for the whole session
    #[tracing::instrument(skip(self), fields(profile = %self.profile.uuid))]
    pub fn run(self) {
        if let Err(e) = self.factory.ensure_initialized() {
            error!("Failed to initialize engine library: {}", e);
            self.report(ConnectionStatus::NotConnected, &e.to_string());
            return;
        }

        let callbacks: Arc<dyn EngineCallbacks> = Arc::new(DriverCallbacks::new(
            self.profile.uuid,
            Arc::clone(&self.store),
            self.ui.clone(),
            Arc::clone(&self.host),
            &self.config,
        ));

        let mut engine = match self.factory.create(callbacks) {
            Ok(engine) => engine,
            Err(e) => {
                error!("Failed to create engine session: {}", e);
                self.report(ConnectionStatus::NotConnected, &e.to_string());
                return;
            }
        };

        let outcome = {
            let _registration = self.cancel.attach(engine.canceller());
            self.drive(engine.as_mut())
        };
        drop(engine);

        self.report(outcome, "");
        debug!("Driver finished with {}", outcome);
    }

    /// Negotiate and run the session, returning the terminal status
    fn drive(&self, engine: &mut dyn Engine) -> ConnectionStatus {
        if self.stopped("before negotiation") {
            return ConnectionStatus::NotConnected;
        }

        self.report(ConnectionStatus::WaitingForUserInput, "");

        if let Err(e) = self.negotiate(engine) {
            if self.stopped("during negotiation") {
                return ConnectionStatus::NotConnected;
            }
            error!("Negotiation failed: {}", e);
            return ConnectionStatus::AuthFailed;
        }

        let ip = match engine.ip_info() {
            Ok(ip) => ip,
            Err(e) => {
                error!("No IP configuration after negotiation: {}", e);
                return ConnectionStatus::NotConnected;
            }
        };
        self.configure_interface(&ip);

        let Some(fd) = self.host.open_tun() else {
            error!("Host could not open a TUN device");
            return ConnectionStatus::NotConnected;
        };
        if let Err(e) = engine.setup_tun_fd(fd) {
            error!("Engine rejected TUN descriptor {}: {}", fd, e);
            return ConnectionStatus::NotConnected;
        }

        if self.stopped("before the session started") {
            return ConnectionStatus::NotConnected;
        }

        self.report(ConnectionStatus::Connected, "");

        if let Err(e) = engine.setup_dtls(self.config.dtls_attempt_period_secs) {
            warn!("DTLS setup failed, continuing over CSTP: {}", e);
        }

        match engine.mainloop(
            self.config.reconnect_timeout_secs,
            self.config.reconnect_interval_secs,
        ) {
            Ok(()) => info!("Session ended"),
            Err(_) if self.cancel.is_requested() => info!("Session stopped on request"),
            Err(e) => warn!("Session ended: {}", e),
        }

        ConnectionStatus::NotConnected
    }

    /// Parse the server address, authenticate and bring up CSTP
    fn negotiate(&self, engine: &mut dyn Engine) -> Result<(), BridgeError> {
        let server = match read_credential(&self.ui, &self.store, KEY_SERVER_ADDRESS)? {
            Some(server) => server,
            None => SecretString::new(self.profile.server_url()),
        };

        info!("Connecting to {}", server.expose_secret());
        engine.parse_url(server.expose_secret())?;

        engine.obtain_cookie()?;
        info!("Authentication successful");

        engine.make_cstp_connection()?;
        info!("CSTP connection established");
        Ok(())
    }

    fn configure_interface(&self, ip: &IpInfo) {
        info!(
            "Configured as {}/{} mtu {} with {} DNS server(s)",
            ip.addr,
            ip.netmask,
            ip.mtu,
            ip.dns.len()
        );
        self.host.set_local_ip(&ip.addr, &ip.netmask, ip.mtu, "");

        for dns in &ip.dns {
            self.host.add_dns(dns);
        }

        let routes = plan_routes(ip);
        debug!("Installing {} route(s)", routes.len());
        for route in routes {
            self.host.add_route(&route.dest, &route.mask);
        }
    }

    fn stopped(&self, when: &str) -> bool {
        let stopped = self.cancel.is_requested();
        if stopped {
            info!("Stop requested {}, abandoning connection attempt", when);
        }
        stopped
    }

    fn report(&self, status: ConnectionStatus, message: &str) {
        info!("Status: {} ({})", status.state_name(), status);
        self.host
            .update_state(status.state_name(), message, status.resource_id(), status);
    }
}
