//! Terminal host for `ocbridge connect`
//!
//! Prints status changes and the negotiated interface settings, and hands
//! the inherited TUN descriptor to the driver. Interface addressing and
//! routing are left to whoever opened the TUN device.

use chrono::Local;
use colored::Colorize;
use ocbridge_core::host::HostService;
use ocbridge_core::state::SharedStatus;
use ocbridge_core::types::ConnectionStatus;
use std::os::fd::RawFd;
use std::sync::Mutex;
use tracing::debug;

pub struct ConsoleHost {
    status: SharedStatus,
    tun_fd: Mutex<Option<RawFd>>,
}

impl ConsoleHost {
    pub fn new(status: SharedStatus, tun_fd: RawFd) -> Self {
        Self {
            status,
            tun_fd: Mutex::new(Some(tun_fd)),
        }
    }

    fn line(&self, text: &str) {
        println!("[{}] {}", Local::now().format("%H:%M:%S"), text);
    }
}

impl HostService for ConsoleHost {
    fn update_state(&self, state: &str, message: &str, _resource_id: &str, level: ConnectionStatus) {
        self.status.set(level, message);

        let state = match level {
            ConnectionStatus::Connected => state.green().bold(),
            ConnectionStatus::AuthFailed => state.red().bold(),
            ConnectionStatus::NotConnected => state.yellow(),
            _ => state.normal(),
        };
        if message.is_empty() {
            self.line(&format!("{} ({})", state, level));
        } else {
            self.line(&format!("{} ({}): {}", state, level, message));
        }
    }

    fn set_local_ip(&self, addr: &str, netmask: &str, mtu: u32, _mode: &str) {
        self.line(&format!("Address {}/{} mtu {}", addr, netmask, mtu));
    }

    fn add_dns(&self, addr: &str) {
        self.line(&format!("DNS server {}", addr));
    }

    fn add_route(&self, dest: &str, mask: &str) {
        self.line(&format!("Route {}/{}", dest, mask));
    }

    fn open_tun(&self) -> Option<RawFd> {
        self.tun_fd
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    fn protect(&self, fd: RawFd) -> bool {
        // Nothing to exclude: the engine socket is not routed into the tunnel
        // by this host
        debug!("Socket {} needs no protection", fd);
        true
    }
}
