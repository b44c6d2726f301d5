//! Engine callback adapter
//!
//! [`DriverCallbacks`] is what the engine sees of the driver while it
//! negotiates: certificate decisions, configuration blobs, login forms,
//! progress messages and socket protection. Credentials are fetched through
//! the UI rendezvous inside the form callback and dropped when it returns.

use crate::config::{CertPolicy, ConfigWritePolicy, DriverConfig, UnhandledFieldPolicy};
use crate::credentials::{CredentialStore, KEY_PASSWORD, KEY_USERNAME};
use crate::driver::read_credential;
use crate::engine::{
    AuthForm, AuthFormResult, CertDecision, EngineCallbacks, FormOptKind, PeerCert,
    ProgressLevel,
};
use crate::error::{BridgeError, CredentialError};
use crate::host::HostService;
use crate::ui::UiHandle;
use secrecy::SecretString;
use std::os::fd::RawFd;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Log target for messages forwarded from the engine
pub const ENGINE_LOG_TARGET: &str = "ocbridge::engine";

/// Callback surface handed to the engine
pub struct DriverCallbacks {
    profile_id: Uuid,
    store: Arc<dyn CredentialStore>,
    ui: UiHandle,
    host: Arc<dyn HostService>,
    cert_policy: CertPolicy,
    unhandled_field_policy: UnhandledFieldPolicy,
    config_write: ConfigWritePolicy,
}

impl DriverCallbacks {
    pub fn new(
        profile_id: Uuid,
        store: Arc<dyn CredentialStore>,
        ui: UiHandle,
        host: Arc<dyn HostService>,
        config: &DriverConfig,
    ) -> Self {
        Self {
            profile_id,
            store,
            ui,
            host,
            cert_policy: config.cert_policy.clone(),
            unhandled_field_policy: config.unhandled_field_policy,
            config_write: config.config_write.clone(),
        }
    }

    /// Fetch `key` once per form, reusing it for later fields of that form
    fn form_value(
        &self,
        cache: &mut Option<SecretString>,
        key: &'static str,
    ) -> Result<SecretString, BridgeError> {
        if let Some(value) = cache {
            return Ok(value.clone());
        }

        let value = read_credential(&self.ui, &self.store, key)?
            .ok_or_else(|| CredentialError::NotFound {
                key: key.to_string(),
            })?;
        *cache = Some(value.clone());
        Ok(value)
    }

    fn fill_form(&self, form: &mut AuthForm) -> Result<AuthFormResult, BridgeError> {
        let mut username = None;
        let mut password = None;
        let mut unhandled = Vec::new();

        for opt in form.opts.iter_mut() {
            if opt.is_ignored() {
                trace!("Skipping ignored form field '{}'", opt.name);
                continue;
            }

            match opt.kind {
                FormOptKind::Text => {
                    debug!("Filling text field '{}' with username", opt.name);
                    opt.value = Some(self.form_value(&mut username, KEY_USERNAME)?);
                }
                FormOptKind::Password => {
                    debug!("Filling password field '{}' with ****", opt.name);
                    opt.value = Some(self.form_value(&mut password, KEY_PASSWORD)?);
                }
                // Server-provided defaults
                FormOptKind::Select | FormOptKind::Hidden => {}
                FormOptKind::Token | FormOptKind::Unknown(_) => {
                    if opt.value.is_none() {
                        unhandled.push(opt.name.clone());
                    }
                }
            }
        }

        if unhandled.is_empty() {
            return Ok(AuthFormResult::Ok);
        }

        match self.unhandled_field_policy {
            UnhandledFieldPolicy::Reject => {
                error!(
                    "Auth form '{}' has required fields without a value: {}",
                    form.auth_id,
                    unhandled.join(", ")
                );
                Ok(AuthFormResult::Error)
            }
            UnhandledFieldPolicy::Ignore => {
                warn!(
                    "Submitting auth form '{}' with blank fields: {}",
                    form.auth_id,
                    unhandled.join(", ")
                );
                Ok(AuthFormResult::Ok)
            }
        }
    }
}

impl EngineCallbacks for DriverCallbacks {
    fn validate_peer_cert(&self, cert: &PeerCert) -> CertDecision {
        match &self.cert_policy {
            CertPolicy::AcceptAll => {
                warn!(
                    "Accepting unverified server certificate ({}) under accept_all policy",
                    cert.reason
                );
                CertDecision::Accept
            }
            CertPolicy::RejectAll => {
                error!("Rejecting unverified server certificate: {}", cert.reason);
                CertDecision::Reject
            }
            CertPolicy::Pinned { hashes } => match &cert.hash {
                Some(hash) if hashes.iter().any(|h| h.eq_ignore_ascii_case(hash)) => {
                    info!("Server certificate matches pinned hash {}", hash);
                    CertDecision::Accept
                }
                hash => {
                    error!(
                        "Rejecting server certificate ({}): hash {} is not pinned",
                        cert.reason,
                        hash.as_deref().unwrap_or("<unknown>")
                    );
                    CertDecision::Reject
                }
            },
        }
    }

    fn write_new_config(&self, config: &[u8]) -> std::io::Result<()> {
        match &self.config_write {
            ConfigWritePolicy::Discard => {
                debug!("Discarding {} byte configuration update", config.len());
                Ok(())
            }
            ConfigWritePolicy::Persist { dir } => {
                std::fs::create_dir_all(dir)?;
                let path = dir.join(format!("{}.xml", self.profile_id));
                std::fs::write(&path, config)?;
                info!("Saved {} byte configuration update to {:?}", config.len(), path);
                Ok(())
            }
        }
    }

    fn process_auth_form(&self, form: &mut AuthForm) -> AuthFormResult {
        debug!(
            auth_id = %form.auth_id,
            fields = form.opts.len(),
            "Processing auth form"
        );
        if let Some(message) = form.error.as_deref() {
            warn!("Server reported: {}", message.trim());
        }

        match self.fill_form(form) {
            Ok(result) => result,
            Err(e) => {
                error!("Could not fill auth form '{}': {}", form.auth_id, e);
                AuthFormResult::Error
            }
        }
    }

    fn progress(&self, level: ProgressLevel, message: &str) {
        let message = message.trim();
        match level {
            ProgressLevel::Error => error!(target: ENGINE_LOG_TARGET, "{}", message),
            ProgressLevel::Info => info!(target: ENGINE_LOG_TARGET, "{}", message),
            ProgressLevel::Debug => debug!(target: ENGINE_LOG_TARGET, "{}", message),
            ProgressLevel::Trace => trace!(target: ENGINE_LOG_TARGET, "{}", message),
        }
    }

    fn protect_socket(&self, fd: RawFd) {
        if self.host.protect(fd) {
            trace!("Protected fd {}", fd);
        } else {
            error!("Error protecting fd {}", fd);
        }
    }
}
