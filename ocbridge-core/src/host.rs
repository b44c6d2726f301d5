//! Host service collaborator
//!
//! The platform side of a session: status reporting, interface addressing,
//! routes and DNS, the TUN descriptor and socket protection. The driver only
//! consumes this interface; implementations live with the host.

use crate::types::ConnectionStatus;
use std::os::fd::RawFd;

/// Services the host platform provides to the driver
pub trait HostService: Send + Sync {
    /// Report a status change
    fn update_state(&self, state: &str, message: &str, resource_id: &str, level: ConnectionStatus);

    /// Set the tunnel interface address, netmask and MTU
    fn set_local_ip(&self, addr: &str, netmask: &str, mtu: u32, mode: &str);

    /// Register a DNS server for the tunnel
    fn add_dns(&self, addr: &str);

    /// Route `dest`/`mask` through the tunnel
    fn add_route(&self, dest: &str, mask: &str);

    /// Create the TUN device with everything configured so far
    ///
    /// The host keeps ownership of the returned descriptor.
    fn open_tun(&self) -> Option<RawFd>;

    /// Exclude `fd` from the tunnel; `false` when that failed
    fn protect(&self, fd: RawFd) -> bool;
}
