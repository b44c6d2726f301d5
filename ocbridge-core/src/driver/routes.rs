//! Route planning for a negotiated session
//!
//! Full tunnel when the server sends no split-include routes; otherwise one
//! route per split include plus a host route per DNS server, so name lookups
//! keep going through the tunnel. IPv6 host routes use prefix length 128.

use crate::engine::IpInfo;
use std::net::{IpAddr, Ipv4Addr};
use tracing::warn;

/// Netmask of an IPv4 host route
pub const HOST_MASK_V4: &str = "255.255.255.255";

/// Prefix length of an IPv6 host route
const HOST_PREFIX_V6: &str = "128";

/// A route to install through the tunnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub dest: String,
    pub mask: String,
}

impl Route {
    pub fn new(dest: impl Into<String>, mask: impl Into<String>) -> Self {
        Self {
            dest: dest.into(),
            mask: mask.into(),
        }
    }

    /// Catch-all IPv4 route
    pub fn default_route() -> Self {
        Self::new("0.0.0.0", "0.0.0.0")
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default_route()
    }
}

/// Routes to install for `ip`
pub fn plan_routes(ip: &IpInfo) -> Vec<Route> {
    if ip.split_includes.is_empty() {
        return vec![Route::default_route()];
    }

    let mut routes = Vec::with_capacity(ip.split_includes.len() + ip.dns.len());

    for entry in &ip.split_includes {
        match parse_split_include(entry) {
            Some(route) => routes.push(route),
            None => warn!("Ignoring malformed split-include route '{}'", entry),
        }
    }

    for dns in &ip.dns {
        match dns.trim().parse::<IpAddr>() {
            Ok(IpAddr::V4(addr)) => routes.push(Route::new(addr.to_string(), HOST_MASK_V4)),
            Ok(IpAddr::V6(addr)) => routes.push(Route::new(addr.to_string(), HOST_PREFIX_V6)),
            Err(_) => warn!("Ignoring malformed DNS server address '{}'", dns),
        }
    }

    routes
}

/// Parse `address/mask`; a missing mask means a host route
///
/// IPv4 masks may be dotted or a prefix length and come out dotted. IPv6
/// masks stay prefix lengths.
pub fn parse_split_include(entry: &str) -> Option<Route> {
    let entry = entry.trim();
    let (dest, mask) = match entry.split_once('/') {
        Some((dest, mask)) => (dest.trim(), Some(mask.trim())),
        None => (entry, None),
    };

    match dest.parse::<IpAddr>().ok()? {
        IpAddr::V4(addr) => {
            let mask = match mask {
                None => HOST_MASK_V4.to_string(),
                Some(mask) => ipv4_mask(mask)?,
            };
            Some(Route::new(addr.to_string(), mask))
        }
        IpAddr::V6(addr) => {
            let prefix = match mask {
                None => HOST_PREFIX_V6.to_string(),
                Some(mask) => {
                    let prefix: u8 = mask.parse().ok()?;
                    if prefix > 128 {
                        return None;
                    }
                    prefix.to_string()
                }
            };
            Some(Route::new(addr.to_string(), prefix))
        }
    }
}

fn ipv4_mask(mask: &str) -> Option<String> {
    if let Ok(dotted) = mask.parse::<Ipv4Addr>() {
        return Some(dotted.to_string());
    }

    let prefix: u32 = mask.parse().ok()?;
    if prefix > 32 {
        return None;
    }
    let bits = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    Some(Ipv4Addr::from(bits).to_string())
}
