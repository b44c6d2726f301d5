//! libopenconnect engine
//!
//! Safe wrapper around the OpenConnect C library. One [`OpenConnectEngine`]
//! owns one `openconnect_info`; the callback adapter lives in a boxed context
//! passed to the library as privdata and is reclaimed on drop.
//!
//! Cancellation goes through the library's command pipe: writing
//! `OC_CMD_CANCEL` makes a blocking `obtain_cookie`, `make_cstp_connection`
//! or `mainloop` return.

use crate::engine::{
    AuthForm, Canceller, CertDecision, Engine, EngineCallbacks, EngineFactory, FormOpt,
    FormOptKind, IpInfo, LibraryInit, PeerCert, ProgressLevel,
};
use crate::error::EngineError;
use secrecy::{ExposeSecret, SecretString};
use std::ffi::{CStr, CString};
use std::os::fd::RawFd;
use std::os::raw::{c_char, c_int, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, warn};

#[allow(non_camel_case_types)]
#[allow(non_upper_case_globals)]
#[allow(non_snake_case)]
#[allow(dead_code)]
mod bindings {
    include!(concat!(env!("OUT_DIR"), "/bindings.rs"));
}

use bindings::*;

/// Command byte that aborts the running library call
const OC_CMD_CANCEL: u8 = b'x';

/// Netmask used when the server assigns an address without one
const HOST_NETMASK: &str = "255.255.255.255";

/// User agent announced to the server
pub const DEFAULT_USER_AGENT: &str = concat!("ocbridge/", env!("CARGO_PKG_VERSION"));

static LIBRARY: LibraryInit = LibraryInit::new();

// Compiled from csrc/progress_shim.c; formats and forwards to ocbridge_progress
extern "C" {
    fn progress_shim(privdata: *mut c_void, level: c_int, fmt: *const c_char, ...);
}

/// Progress level requested from the library (PRG_INFO)
const LIBRARY_LOG_LEVEL: c_int = 1;

/// Factory for libopenconnect sessions
pub struct OpenConnectFactory {
    user_agent: CString,
}

impl OpenConnectFactory {
    pub fn new(user_agent: &str) -> Result<Self, EngineError> {
        let user_agent = CString::new(user_agent).map_err(|_| EngineError::InvalidArgument {
            op: "user agent",
            reason: "contains a NUL byte".to_string(),
        })?;
        Ok(Self { user_agent })
    }
}

impl EngineFactory for OpenConnectFactory {
    fn library(&self) -> &LibraryInit {
        &LIBRARY
    }

    fn init_library(&self) -> Result<(), EngineError> {
        let ret = unsafe { openconnect_init_ssl() };
        if ret != 0 {
            return Err(EngineError::InitFailed {
                reason: format!("openconnect_init_ssl returned {}", ret),
            });
        }
        Ok(())
    }

    fn create(&self, callbacks: Arc<dyn EngineCallbacks>) -> Result<Box<dyn Engine>, EngineError> {
        let engine = OpenConnectEngine::new(&self.user_agent, callbacks)?;
        Ok(Box::new(engine))
    }
}

/// State reachable from the C callbacks through privdata
struct CallbackContext {
    callbacks: Arc<dyn EngineCallbacks>,
    vpninfo: AtomicPtr<openconnect_info>,
}

/// Writes the cancel command into the library's command pipe
struct CmdPipeCanceller {
    fd: Mutex<Option<c_int>>,
}

impl CmdPipeCanceller {
    /// Forget the descriptor before the library closes it
    fn close(&self) {
        *self.fd.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Canceller for CmdPipeCanceller {
    fn cancel(&self) {
        let fd = self.fd.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(fd) = *fd {
            let cmd = OC_CMD_CANCEL;
            let written = unsafe { libc::write(fd, &cmd as *const u8 as *const c_void, 1) };
            if written != 1 {
                warn!("Failed to write cancel command to fd {}", fd);
            }
        }
    }
}

/// One libopenconnect session
pub struct OpenConnectEngine {
    vpn: *mut openconnect_info,
    context: *mut CallbackContext,
    canceller: Arc<CmdPipeCanceller>,
}

// The raw pointers are owned by this value and only used from the thread
// currently holding it; the library serializes its own callbacks.
unsafe impl Send for OpenConnectEngine {}

impl OpenConnectEngine {
    fn new(user_agent: &CStr, callbacks: Arc<dyn EngineCallbacks>) -> Result<Self, EngineError> {
        let context = Box::into_raw(Box::new(CallbackContext {
            callbacks,
            vpninfo: AtomicPtr::new(ptr::null_mut()),
        }));

        let vpn = unsafe {
            openconnect_vpninfo_new(
                user_agent.as_ptr(),
                Some(validate_peer_cert),
                Some(write_new_config),
                Some(process_auth_form),
                Some(progress_shim),
                context as *mut c_void,
            )
        };

        if vpn.is_null() {
            drop(unsafe { Box::from_raw(context) });
            return Err(EngineError::CreateFailed {
                reason: "openconnect_vpninfo_new returned null".to_string(),
            });
        }

        unsafe {
            (*context).vpninfo.store(vpn, Ordering::SeqCst);
            openconnect_set_loglevel(vpn, LIBRARY_LOG_LEVEL);
            openconnect_set_protect_socket_handler(vpn, Some(protect_socket));
        }

        let cmd_fd = unsafe { openconnect_setup_cmd_pipe(vpn) };
        if cmd_fd < 0 {
            unsafe {
                openconnect_vpninfo_free(vpn);
                drop(Box::from_raw(context));
            }
            return Err(EngineError::CreateFailed {
                reason: format!("openconnect_setup_cmd_pipe returned {}", cmd_fd),
            });
        }

        debug!("Created libopenconnect session");
        Ok(Self {
            vpn,
            context,
            canceller: Arc::new(CmdPipeCanceller {
                fd: Mutex::new(Some(cmd_fd)),
            }),
        })
    }

    fn check(op: &'static str, ret: c_int) -> Result<(), EngineError> {
        if ret == 0 {
            Ok(())
        } else {
            Err(EngineError::failed(op, ret))
        }
    }
}

impl Engine for OpenConnectEngine {
    fn parse_url(&mut self, url: &str) -> Result<(), EngineError> {
        let url = CString::new(url).map_err(|_| EngineError::InvalidArgument {
            op: "openconnect_parse_url",
            reason: "URL contains a NUL byte".to_string(),
        })?;
        let ret = unsafe { openconnect_parse_url(self.vpn, url.as_ptr()) };
        Self::check("openconnect_parse_url", ret)
    }

    fn obtain_cookie(&mut self) -> Result<(), EngineError> {
        let ret = unsafe { openconnect_obtain_cookie(self.vpn) };
        Self::check("openconnect_obtain_cookie", ret)
    }

    fn make_cstp_connection(&mut self) -> Result<(), EngineError> {
        let ret = unsafe { openconnect_make_cstp_connection(self.vpn) };
        Self::check("openconnect_make_cstp_connection", ret)
    }

    fn ip_info(&self) -> Result<IpInfo, EngineError> {
        let mut info: *const oc_ip_info = ptr::null();
        let ret =
            unsafe { openconnect_get_ip_info(self.vpn, &mut info, ptr::null_mut(), ptr::null_mut()) };
        Self::check("openconnect_get_ip_info", ret)?;
        if info.is_null() {
            return Err(EngineError::NoIpInfo);
        }

        unsafe {
            let info = &*info;
            let addr = opt_string(info.addr).ok_or(EngineError::NoIpInfo)?;
            let netmask = opt_string(info.netmask).unwrap_or_else(|| HOST_NETMASK.to_string());
            let dns = info.dns.iter().filter_map(|p| opt_string(*p)).collect();

            let mut split_includes = Vec::new();
            let mut node = info.split_includes;
            while !node.is_null() {
                if let Some(route) = opt_string((*node).route) {
                    split_includes.push(route);
                }
                node = (*node).next;
            }

            Ok(IpInfo {
                addr,
                netmask,
                mtu: info.mtu.max(0) as u32,
                dns,
                split_includes,
            })
        }
    }

    fn setup_tun_fd(&mut self, fd: RawFd) -> Result<(), EngineError> {
        let ret = unsafe { openconnect_setup_tun_fd(self.vpn, fd) };
        Self::check("openconnect_setup_tun_fd", ret)
    }

    fn setup_dtls(&mut self, attempt_period_secs: u32) -> Result<(), EngineError> {
        let period = c_int::try_from(attempt_period_secs).unwrap_or(c_int::MAX);
        let ret = unsafe { openconnect_setup_dtls(self.vpn, period) };
        Self::check("openconnect_setup_dtls", ret)
    }

    fn mainloop(
        &mut self,
        reconnect_timeout_secs: u32,
        reconnect_interval_secs: u32,
    ) -> Result<(), EngineError> {
        let timeout = c_int::try_from(reconnect_timeout_secs).unwrap_or(c_int::MAX);
        let interval = c_int::try_from(reconnect_interval_secs).unwrap_or(c_int::MAX);
        let ret = unsafe { openconnect_mainloop(self.vpn, timeout, interval) };
        Self::check("openconnect_mainloop", ret)
    }

    fn canceller(&self) -> Arc<dyn Canceller> {
        self.canceller.clone()
    }
}

impl Drop for OpenConnectEngine {
    fn drop(&mut self) {
        self.canceller.close();
        unsafe {
            openconnect_vpninfo_free(self.vpn);
            drop(Box::from_raw(self.context));
        }
        debug!("Freed libopenconnect session");
    }
}

unsafe fn opt_string(p: *const c_char) -> Option<String> {
    if p.is_null() {
        None
    } else {
        Some(CStr::from_ptr(p).to_string_lossy().into_owned())
    }
}

unsafe fn context<'a>(privdata: *mut c_void) -> Option<&'a CallbackContext> {
    (privdata as *const CallbackContext).as_ref()
}

/// Run a callback body, turning a panic into `fallback`
fn guarded<T>(name: &str, fallback: T, f: impl FnOnce() -> T) -> T {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        error!("Panic in {} callback", name);
        fallback
    })
}

unsafe extern "C" fn validate_peer_cert(privdata: *mut c_void, reason: *const c_char) -> c_int {
    let Some(ctx) = context(privdata) else {
        return 1;
    };
    guarded("validate_peer_cert", 1, || {
        let vpn = ctx.vpninfo.load(Ordering::SeqCst);
        let hash = if vpn.is_null() {
            None
        } else {
            opt_string(openconnect_get_peer_cert_hash(vpn))
        };
        let cert = PeerCert {
            reason: opt_string(reason).unwrap_or_default(),
            hash,
        };
        match ctx.callbacks.validate_peer_cert(&cert) {
            CertDecision::Accept => 0,
            CertDecision::Reject => 1,
        }
    })
}

unsafe extern "C" fn write_new_config(
    privdata: *mut c_void,
    buf: *const c_char,
    buflen: c_int,
) -> c_int {
    let Some(ctx) = context(privdata) else {
        return -1;
    };
    if buf.is_null() || buflen < 0 {
        return -1;
    }
    guarded("write_new_config", -1, || {
        let config = std::slice::from_raw_parts(buf as *const u8, buflen as usize);
        match ctx.callbacks.write_new_config(config) {
            Ok(()) => 0,
            Err(e) => {
                error!("Failed to write configuration update: {}", e);
                -1
            }
        }
    })
}

unsafe extern "C" fn process_auth_form(privdata: *mut c_void, form: *mut oc_auth_form) -> c_int {
    let Some(ctx) = context(privdata) else {
        return -1;
    };
    if form.is_null() {
        return -1;
    }
    guarded("process_auth_form", -1, || {
        let raw = &*form;
        let mut opts = Vec::new();
        let mut originals = Vec::new();
        let mut opt = raw.opts;
        while !opt.is_null() {
            let value = opt_string((*opt)._value);
            opts.push(FormOpt {
                kind: FormOptKind::from_raw((*opt).type_),
                name: opt_string((*opt).name).unwrap_or_default(),
                label: opt_string((*opt).label).unwrap_or_default(),
                value: value.clone().map(SecretString::new),
                flags: (*opt).flags,
            });
            originals.push((opt, value));
            opt = (*opt).next;
        }

        let mut auth_form = AuthForm {
            auth_id: opt_string(raw.auth_id).unwrap_or_default(),
            banner: opt_string(raw.banner),
            message: opt_string(raw.message),
            error: opt_string(raw.error),
            opts,
        };

        let result = ctx.callbacks.process_auth_form(&mut auth_form);

        for ((opt, original), filled) in originals.into_iter().zip(&auth_form.opts) {
            let Some(value) = &filled.value else {
                continue;
            };
            if original.as_deref() == Some(value.expose_secret().as_str()) {
                continue;
            }
            let Ok(value) = CString::new(value.expose_secret().as_str()) else {
                error!("Value for form field '{}' contains a NUL byte", filled.name);
                return -1;
            };
            if openconnect_set_option_value(opt, value.as_ptr()) != 0 {
                error!("Library rejected value for form field '{}'", filled.name);
                return -1;
            }
        }

        result.as_raw()
    })
}

unsafe extern "C" fn protect_socket(privdata: *mut c_void, fd: c_int) {
    if let Some(ctx) = context(privdata) {
        guarded("protect_socket", (), || ctx.callbacks.protect_socket(fd));
    }
}

/// Receives formatted progress messages from the C shim
#[no_mangle]
pub unsafe extern "C" fn ocbridge_progress(
    privdata: *mut c_void,
    level: c_int,
    message: *const c_char,
) {
    let Some(ctx) = context(privdata) else {
        return;
    };
    if let Some(message) = opt_string(message) {
        guarded("progress", (), || {
            ctx.callbacks
                .progress(ProgressLevel::from_raw(level), &message)
        });
    }
}
