//! Test doubles shared by the driver integration tests
//!
//! `ScriptedEngine` replays a configurable negotiation and calls back into
//! the driver the way a real engine would; `RecordingHost` records every
//! host call for assertions.

#![allow(dead_code)]

use ocbridge_core::engine::{
    AuthForm, AuthFormResult, Canceller, CertDecision, Engine, EngineCallbacks, EngineFactory,
    IpInfo, LibraryInit, PeerCert, ProgressLevel,
};
use ocbridge_core::error::EngineError;
use ocbridge_core::host::HostService;
use ocbridge_core::types::ConnectionStatus;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Engine step to fail or block in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    ParseUrl,
    ObtainCookie,
    MakeCstp,
    IpInfo,
    SetupTunFd,
    SetupDtls,
}

/// Behavior of every engine created by a [`ScriptedFactory`]
#[derive(Debug, Clone)]
pub struct Script {
    pub fail_at: Option<Step>,
    /// Step that blocks until the engine is cancelled
    pub block_at: Option<Step>,
    pub ip: IpInfo,
    /// Form presented during `obtain_cookie`
    pub form: Option<AuthForm>,
    /// Certificate presented during `obtain_cookie`
    pub cert: Option<PeerCert>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            fail_at: None,
            block_at: None,
            ip: IpInfo {
                addr: "10.1.2.3".to_string(),
                netmask: "255.255.255.0".to_string(),
                mtu: 1400,
                dns: vec!["10.0.0.53".to_string()],
                split_includes: Vec::new(),
            },
            form: None,
            cert: None,
        }
    }
}

/// What the engine saw during a run
#[derive(Debug, Default)]
pub struct EngineLog {
    pub calls: Vec<&'static str>,
    pub url: Option<String>,
    pub filled_form: Option<AuthForm>,
    pub form_result: Option<AuthFormResult>,
    pub cert_decision: Option<CertDecision>,
    pub tun_fd: Option<RawFd>,
    pub dtls_period: Option<u32>,
    pub mainloop_args: Option<(u32, u32)>,
}

/// Sticky cancel flag; waiters wake on cancel
#[derive(Default)]
pub struct ScriptCanceller {
    cancelled: Mutex<bool>,
    cv: Condvar,
}

impl ScriptCanceller {
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.lock().unwrap()
    }

    /// Block until cancelled; false on timeout
    fn wait(&self, timeout: Duration) -> bool {
        let guard = self.cancelled.lock().unwrap();
        let (guard, _) = self
            .cv
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap();
        *guard
    }
}

impl Canceller for ScriptCanceller {
    fn cancel(&self) {
        *self.cancelled.lock().unwrap() = true;
        self.cv.notify_all();
    }
}

pub struct ScriptedEngine {
    script: Script,
    callbacks: Arc<dyn EngineCallbacks>,
    canceller: Arc<ScriptCanceller>,
    log: Arc<Mutex<EngineLog>>,
    drops: Arc<AtomicUsize>,
}

impl ScriptedEngine {
    fn step(&self, step: Step, name: &'static str) -> Result<(), EngineError> {
        self.log.lock().unwrap().calls.push(name);

        if self.script.block_at == Some(step) && !self.canceller.wait(Duration::from_secs(10)) {
            panic!("{} was never cancelled", name);
        }
        if self.canceller.is_cancelled() {
            return Err(EngineError::failed(name, -4));
        }
        if self.script.fail_at == Some(step) {
            return Err(EngineError::failed(name, -1));
        }
        Ok(())
    }
}

impl Engine for ScriptedEngine {
    fn parse_url(&mut self, url: &str) -> Result<(), EngineError> {
        self.log.lock().unwrap().url = Some(url.to_string());
        self.step(Step::ParseUrl, "parse_url")
    }

    fn obtain_cookie(&mut self) -> Result<(), EngineError> {
        if let Some(cert) = &self.script.cert {
            let decision = self.callbacks.validate_peer_cert(cert);
            self.log.lock().unwrap().cert_decision = Some(decision);
            if decision == CertDecision::Reject {
                return Err(EngineError::failed("obtain_cookie", -2));
            }
        }

        if let Some(form) = &self.script.form {
            let mut form = form.clone();
            let result = self.callbacks.process_auth_form(&mut form);
            {
                let mut log = self.log.lock().unwrap();
                log.filled_form = Some(form);
                log.form_result = Some(result);
            }
            if result != AuthFormResult::Ok {
                return Err(EngineError::failed("obtain_cookie", -3));
            }
        }

        self.callbacks
            .progress(ProgressLevel::Info, "Got CONNECT response: HTTP/1.1 200 OK\n");
        self.step(Step::ObtainCookie, "obtain_cookie")
    }

    fn make_cstp_connection(&mut self) -> Result<(), EngineError> {
        self.callbacks.protect_socket(99);
        self.step(Step::MakeCstp, "make_cstp_connection")
    }

    fn ip_info(&self) -> Result<IpInfo, EngineError> {
        self.log.lock().unwrap().calls.push("ip_info");
        if self.script.fail_at == Some(Step::IpInfo) {
            return Err(EngineError::NoIpInfo);
        }
        Ok(self.script.ip.clone())
    }

    fn setup_tun_fd(&mut self, fd: RawFd) -> Result<(), EngineError> {
        self.log.lock().unwrap().tun_fd = Some(fd);
        self.step(Step::SetupTunFd, "setup_tun_fd")
    }

    fn setup_dtls(&mut self, attempt_period_secs: u32) -> Result<(), EngineError> {
        self.log.lock().unwrap().dtls_period = Some(attempt_period_secs);
        self.step(Step::SetupDtls, "setup_dtls")
    }

    fn mainloop(
        &mut self,
        reconnect_timeout_secs: u32,
        reconnect_interval_secs: u32,
    ) -> Result<(), EngineError> {
        {
            let mut log = self.log.lock().unwrap();
            log.calls.push("mainloop");
            log.mainloop_args = Some((reconnect_timeout_secs, reconnect_interval_secs));
        }
        if !self.canceller.wait(Duration::from_secs(10)) {
            panic!("mainloop was never cancelled");
        }
        Err(EngineError::failed("mainloop", -4))
    }

    fn canceller(&self) -> Arc<dyn Canceller> {
        self.canceller.clone()
    }
}

impl Drop for ScriptedEngine {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Factory producing [`ScriptedEngine`]s
pub struct ScriptedFactory {
    pub script: Script,
    pub log: Arc<Mutex<EngineLog>>,
    pub init_calls: AtomicUsize,
    pub created: AtomicUsize,
    pub drops: Arc<AtomicUsize>,
    pub fail_init: AtomicBool,
    pub fail_create: bool,
    library: LibraryInit,
}

impl ScriptedFactory {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            log: Arc::new(Mutex::new(EngineLog::default())),
            init_calls: AtomicUsize::new(0),
            created: AtomicUsize::new(0),
            drops: Arc::new(AtomicUsize::new(0)),
            fail_init: AtomicBool::new(false),
            fail_create: false,
            library: LibraryInit::new(),
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.log.lock().unwrap().calls.clone()
    }
}

impl EngineFactory for ScriptedFactory {
    fn library(&self) -> &LibraryInit {
        &self.library
    }

    fn init_library(&self) -> Result<(), EngineError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(EngineError::InitFailed {
                reason: "scripted".to_string(),
            });
        }
        Ok(())
    }

    fn create(&self, callbacks: Arc<dyn EngineCallbacks>) -> Result<Box<dyn Engine>, EngineError> {
        if self.fail_create {
            return Err(EngineError::CreateFailed {
                reason: "scripted".to_string(),
            });
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedEngine {
            script: self.script.clone(),
            callbacks,
            canceller: Arc::new(ScriptCanceller::default()),
            log: Arc::clone(&self.log),
            drops: Arc::clone(&self.drops),
        }))
    }
}

/// One call into the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    State {
        state: String,
        resource_id: String,
        status: ConnectionStatus,
    },
    LocalIp {
        addr: String,
        netmask: String,
        mtu: u32,
    },
    Dns(String),
    Route(String, String),
    OpenTun,
    Protect(RawFd),
}

/// Host double recording every call
pub struct RecordingHost {
    events: Mutex<Vec<HostEvent>>,
    changed: Condvar,
    tun_fd: Option<RawFd>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::with_tun(Some(42))
    }

    pub fn with_tun(tun_fd: Option<RawFd>) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            changed: Condvar::new(),
            tun_fd,
        }
    }

    fn record(&self, event: HostEvent) {
        self.events.lock().unwrap().push(event);
        self.changed.notify_all();
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<ConnectionStatus> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                HostEvent::State { status, .. } => Some(status),
                _ => None,
            })
            .collect()
    }

    pub fn routes(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                HostEvent::Route(dest, mask) => Some((dest, mask)),
                _ => None,
            })
            .collect()
    }

    pub fn dns(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                HostEvent::Dns(addr) => Some(addr),
                _ => None,
            })
            .collect()
    }

    /// Block until `status` has been reported
    pub fn wait_for(&self, status: ConnectionStatus) {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut events = self.events.lock().unwrap();
        loop {
            let seen = events
                .iter()
                .any(|e| matches!(e, HostEvent::State { status: s, .. } if *s == status));
            if seen {
                return;
            }
            let now = Instant::now();
            assert!(now < deadline, "timed out waiting for {:?}", status);
            events = self.changed.wait_timeout(events, deadline - now).unwrap().0;
        }
    }
}

impl HostService for RecordingHost {
    fn update_state(&self, state: &str, _message: &str, resource_id: &str, level: ConnectionStatus) {
        self.record(HostEvent::State {
            state: state.to_string(),
            resource_id: resource_id.to_string(),
            status: level,
        });
    }

    fn set_local_ip(&self, addr: &str, netmask: &str, mtu: u32, _mode: &str) {
        self.record(HostEvent::LocalIp {
            addr: addr.to_string(),
            netmask: netmask.to_string(),
            mtu,
        });
    }

    fn add_dns(&self, addr: &str) {
        self.record(HostEvent::Dns(addr.to_string()));
    }

    fn add_route(&self, dest: &str, mask: &str) {
        self.record(HostEvent::Route(dest.to_string(), mask.to_string()));
    }

    fn open_tun(&self) -> Option<RawFd> {
        self.record(HostEvent::OpenTun);
        self.tun_fd
    }

    fn protect(&self, fd: RawFd) -> bool {
        self.record(HostEvent::Protect(fd));
        true
    }
}
