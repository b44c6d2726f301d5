//! Protocol engine seam
//!
//! The driver talks to the VPN protocol implementation only through the
//! traits in this module. [`Engine`] is the session handle, [`EngineFactory`]
//! creates sessions and owns the process-wide library initialization, and
//! [`EngineCallbacks`] is the capability interface the engine calls back into
//! while it negotiates. Callbacks may run on engine-managed threads and must
//! be safe to call concurrently with the driver worker.

use crate::error::EngineError;
use secrecy::SecretString;
use std::os::fd::RawFd;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

#[cfg(feature = "libopenconnect")]
pub mod libopenconnect;

/// Form option flag: the engine does not need a value for this field
pub const FORM_OPT_IGNORE: u32 = 0x0001;

/// One VPN session inside the engine
pub trait Engine: Send {
    /// Parse the server URL into host, port and path
    fn parse_url(&mut self, url: &str) -> Result<(), EngineError>;

    /// Run the authentication exchange and obtain a session cookie
    fn obtain_cookie(&mut self) -> Result<(), EngineError>;

    /// Establish the CSTP transport
    fn make_cstp_connection(&mut self) -> Result<(), EngineError>;

    /// IP configuration negotiated by the transport
    fn ip_info(&self) -> Result<IpInfo, EngineError>;

    /// Hand the TUN descriptor to the engine
    fn setup_tun_fd(&mut self, fd: RawFd) -> Result<(), EngineError>;

    /// Configure the DTLS attempt period
    fn setup_dtls(&mut self, attempt_period_secs: u32) -> Result<(), EngineError>;

    /// Run the session until it ends; blocks
    fn mainloop(
        &mut self,
        reconnect_timeout_secs: u32,
        reconnect_interval_secs: u32,
    ) -> Result<(), EngineError>;

    /// Thread-safe handle that makes the running or next engine call return
    fn canceller(&self) -> Arc<dyn Canceller>;
}

/// Cancellation signal for an engine session
pub trait Canceller: Send + Sync {
    /// Request cancellation; idempotent and non-blocking
    fn cancel(&self);
}

/// Creates engine sessions
pub trait EngineFactory: Send + Sync {
    /// Process-wide guard for [`EngineFactory::init_library`]
    fn library(&self) -> &LibraryInit;

    /// One-time native library setup; only ever called through
    /// [`EngineFactory::ensure_initialized`]
    fn init_library(&self) -> Result<(), EngineError>;

    /// Create a session wired to `callbacks`
    fn create(&self, callbacks: Arc<dyn EngineCallbacks>) -> Result<Box<dyn Engine>, EngineError>;

    /// Initialize the library unless that already happened in this process
    fn ensure_initialized(&self) -> Result<(), EngineError> {
        self.library().ensure_initialized(|| self.init_library())
    }
}

/// Callback surface the engine uses during a session
pub trait EngineCallbacks: Send + Sync {
    /// Decide on a certificate the engine could not verify
    fn validate_peer_cert(&self, cert: &PeerCert) -> CertDecision;

    /// Configuration blob pushed by the server
    fn write_new_config(&self, config: &[u8]) -> std::io::Result<()>;

    /// Fill in a login form
    fn process_auth_form(&self, form: &mut AuthForm) -> AuthFormResult;

    /// Progress and log messages
    fn progress(&self, level: ProgressLevel, message: &str);

    /// Keep the engine's own transport socket out of the tunnel
    fn protect_socket(&self, fd: RawFd);
}

/// Guarded once-only initializer
///
/// Unlike `std::sync::Once`, a failed initialization is not remembered: the
/// next caller tries again.
#[derive(Debug)]
pub struct LibraryInit {
    done: Mutex<bool>,
}

impl LibraryInit {
    pub const fn new() -> Self {
        Self {
            done: Mutex::new(false),
        }
    }

    /// Run `init` unless a previous call already succeeded
    pub fn ensure_initialized<F>(&self, init: F) -> Result<(), EngineError>
    where
        F: FnOnce() -> Result<(), EngineError>,
    {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        if *done {
            return Ok(());
        }

        init()?;
        *done = true;
        debug!("Engine library initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        *self.done.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LibraryInit {
    fn default() -> Self {
        Self::new()
    }
}

/// Network configuration negotiated by the engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpInfo {
    pub addr: String,
    pub netmask: String,
    pub mtu: u32,
    pub dns: Vec<String>,
    /// Split-include routes as `address/mask`, mask dotted or a prefix length
    pub split_includes: Vec<String>,
}

/// Certificate the engine asks about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCert {
    /// Why the engine's own verification failed
    pub reason: String,
    /// Engine-formatted certificate hash, e.g. `pin-sha256:...`
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertDecision {
    Accept,
    Reject,
}

/// Kind of a login form field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormOptKind {
    Text,
    Password,
    Select,
    Hidden,
    Token,
    Unknown(i32),
}

impl FormOptKind {
    /// Map the engine's numeric field type
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => FormOptKind::Text,
            2 => FormOptKind::Password,
            3 => FormOptKind::Select,
            4 => FormOptKind::Hidden,
            5 => FormOptKind::Token,
            other => FormOptKind::Unknown(other),
        }
    }
}

/// One field of a login form
#[derive(Debug, Clone)]
pub struct FormOpt {
    pub kind: FormOptKind,
    pub name: String,
    pub label: String,
    pub value: Option<SecretString>,
    pub flags: u32,
}

impl FormOpt {
    pub fn new(kind: FormOptKind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            label: String::new(),
            value: None,
            flags: 0,
        }
    }

    pub fn is_ignored(&self) -> bool {
        self.flags & FORM_OPT_IGNORE != 0
    }
}

/// Login form presented by the server
#[derive(Debug, Clone, Default)]
pub struct AuthForm {
    pub auth_id: String,
    pub banner: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub opts: Vec<FormOpt>,
}

/// Outcome of filling in a form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFormResult {
    Error,
    Ok,
}

impl AuthFormResult {
    /// Value the engine expects back from its form callback
    pub fn as_raw(self) -> i32 {
        match self {
            AuthFormResult::Error => -1,
            AuthFormResult::Ok => 0,
        }
    }
}

/// Severity of an engine progress message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProgressLevel {
    Error,
    Info,
    Debug,
    Trace,
}

impl ProgressLevel {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            i32::MIN..=0 => ProgressLevel::Error,
            1 => ProgressLevel::Info,
            2 => ProgressLevel::Debug,
            _ => ProgressLevel::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_library_init_runs_once() {
        let init = LibraryInit::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            init.ensure_initialized(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(init.is_initialized());
    }

    #[test]
    fn test_library_init_retries_after_failure() {
        let init = LibraryInit::new();

        let err = init
            .ensure_initialized(|| {
                Err(EngineError::InitFailed {
                    reason: "missing".to_string(),
                })
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::InitFailed { .. }));
        assert!(!init.is_initialized());

        init.ensure_initialized(|| Ok(())).unwrap();
        assert!(init.is_initialized());
    }

    #[test]
    fn test_library_init_concurrent_callers() {
        static INIT: LibraryInit = LibraryInit::new();
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let threads: Vec<_> = (0..16)
            .map(|_| {
                thread::spawn(|| {
                    INIT.ensure_initialized(|| {
                        CALLS.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(std::time::Duration::from_millis(5));
                        Ok(())
                    })
                })
            })
            .collect();

        for t in threads {
            t.join().unwrap().unwrap();
        }
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_form_opt_kinds() {
        assert_eq!(FormOptKind::from_raw(1), FormOptKind::Text);
        assert_eq!(FormOptKind::from_raw(2), FormOptKind::Password);
        assert_eq!(FormOptKind::from_raw(5), FormOptKind::Token);
        assert_eq!(FormOptKind::from_raw(42), FormOptKind::Unknown(42));
    }

    #[test]
    fn test_progress_levels() {
        assert_eq!(ProgressLevel::from_raw(0), ProgressLevel::Error);
        assert_eq!(ProgressLevel::from_raw(1), ProgressLevel::Info);
        assert_eq!(ProgressLevel::from_raw(2), ProgressLevel::Debug);
        assert_eq!(ProgressLevel::from_raw(9), ProgressLevel::Trace);
        assert_eq!(AuthFormResult::Error.as_raw(), -1);
        assert_eq!(AuthFormResult::Ok.as_raw(), 0);
    }
}
