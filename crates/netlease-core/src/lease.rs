//! Lease data model
//!
//! A [`Lease`] is the set of network parameters negotiated for one
//! interface: address, netmask, broadcast, routes, MTU, name/time/directory
//! servers and assorted identity strings. It is immutable input to the
//! reconciler; ownership stays with the caller.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// A single route offered by a lease or installed on the host.
///
/// Equality is structural: two routes are the same route when all three
/// fields match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Destination network
    pub destination: Ipv4Addr,
    /// Netmask for the destination
    pub netmask: Ipv4Addr,
    /// Gateway to reach the destination through
    pub gateway: Ipv4Addr,
}

impl Route {
    /// Create a new route
    pub fn new(destination: Ipv4Addr, netmask: Ipv4Addr, gateway: Ipv4Addr) -> Self {
        Self {
            destination,
            netmask,
            gateway,
        }
    }

    /// A default route has destination and netmask both 0.0.0.0.
    ///
    /// Default routes are only installed when the policy allows it.
    pub fn is_default(&self) -> bool {
        self.destination.is_unspecified() && self.netmask.is_unspecified()
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} via {}", self.destination, self.netmask, self.gateway)
    }
}

/// FQDN option payload carried by some leases, exported verbatim in the
/// info file for external tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FqdnOption {
    /// Option flags byte
    pub flags: u8,
    /// First response code
    pub rcode1: u8,
    /// Second response code
    pub rcode2: u8,
    /// The fully qualified name
    pub name: String,
}

/// Negotiated network state for one interface.
///
/// A lease with an unspecified (0.0.0.0) address means the interface lost
/// its lease: reconciling it tears down everything previously applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lease {
    /// Offered interface address; 0.0.0.0 means released/expired
    #[serde(default = "unspecified")]
    pub address: Ipv4Addr,
    /// Netmask for the address
    #[serde(default = "unspecified")]
    pub netmask: Ipv4Addr,
    /// Broadcast address
    #[serde(default = "unspecified")]
    pub broadcast: Ipv4Addr,
    /// Interface MTU requested by the server, if any
    #[serde(default)]
    pub mtu: Option<u32>,
    /// Routes to install, in offer order
    #[serde(default)]
    pub routes: Vec<Route>,
    /// DNS servers, in offer order
    #[serde(default)]
    pub dns_servers: Vec<Ipv4Addr>,
    /// DNS domain name
    #[serde(default)]
    pub dns_domain: Option<String>,
    /// DNS search list, space separated
    #[serde(default)]
    pub dns_search: Option<String>,
    /// NTP servers
    #[serde(default)]
    pub ntp_servers: Vec<Ipv4Addr>,
    /// NIS servers
    #[serde(default)]
    pub nis_servers: Vec<Ipv4Addr>,
    /// NIS domain
    #[serde(default)]
    pub nis_domain: Option<String>,
    /// Hostname offered by the server
    #[serde(default)]
    pub hostname: Option<String>,
    /// Root path option
    #[serde(default)]
    pub root_path: Option<String>,
    /// FQDN option payload
    #[serde(default)]
    pub fqdn: Option<FqdnOption>,
    /// Lease duration in seconds
    #[serde(default)]
    pub lease_time: u32,
    /// Renewal (T1) time in seconds
    #[serde(default)]
    pub renewal_time: u32,
    /// Rebind (T2) time in seconds
    #[serde(default)]
    pub rebind_time: u32,
    /// Identity of the server that granted the lease
    #[serde(default = "unspecified")]
    pub server_id: Ipv4Addr,
    /// Server host name, if it sent one
    #[serde(default)]
    pub server_name: Option<String>,
}

fn unspecified() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

impl Lease {
    /// A lease representing loss of the lease: reconciling it removes
    /// everything this system applied to the interface.
    pub fn released() -> Self {
        Self {
            address: Ipv4Addr::UNSPECIFIED,
            netmask: Ipv4Addr::UNSPECIFIED,
            broadcast: Ipv4Addr::UNSPECIFIED,
            mtu: None,
            routes: Vec::new(),
            dns_servers: Vec::new(),
            dns_domain: None,
            dns_search: None,
            ntp_servers: Vec::new(),
            nis_servers: Vec::new(),
            nis_domain: None,
            hostname: None,
            root_path: None,
            fqdn: None,
            lease_time: 0,
            renewal_time: 0,
            rebind_time: 0,
            server_id: Ipv4Addr::UNSPECIFIED,
            server_name: None,
        }
    }

    /// Whether this lease carries no address (released or expired)
    pub fn is_released(&self) -> bool {
        self.address.is_unspecified()
    }

    /// The network this lease's address lives on
    pub fn subnet(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.address) & u32::from(self.netmask))
    }

    /// Validate the lease before any side effect is attempted.
    ///
    /// A released lease is always valid. A lease carrying an address must
    /// also carry a usable netmask.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.is_released() {
            return Ok(());
        }
        if self.netmask.is_unspecified() {
            return Err(crate::Error::invalid_lease(format!(
                "lease for {} has no netmask",
                self.address
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_route_detection() {
        let default = Route::new(
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::UNSPECIFIED,
            "10.0.0.1".parse().unwrap(),
        );
        assert!(default.is_default());

        let subnet = Route::new(
            "10.0.0.0".parse().unwrap(),
            "255.255.255.0".parse().unwrap(),
            Ipv4Addr::UNSPECIFIED,
        );
        assert!(!subnet.is_default());
    }

    #[test]
    fn route_equality_is_structural() {
        let a = Route::new(
            "10.0.0.0".parse().unwrap(),
            "255.255.255.0".parse().unwrap(),
            "10.0.0.1".parse().unwrap(),
        );
        let b = a;
        assert_eq!(a, b);

        let c = Route::new(
            "10.0.0.0".parse().unwrap(),
            "255.255.255.0".parse().unwrap(),
            "10.0.0.2".parse().unwrap(),
        );
        assert_ne!(a, c);
    }

    #[test]
    fn subnet_derivation() {
        let mut lease = Lease::released();
        lease.address = "192.168.3.17".parse().unwrap();
        lease.netmask = "255.255.255.0".parse().unwrap();
        assert_eq!(lease.subnet(), "192.168.3.0".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn lease_without_netmask_is_rejected() {
        let mut lease = Lease::released();
        lease.address = "10.0.0.5".parse().unwrap();
        assert!(lease.validate().is_err());

        lease.netmask = "255.255.255.0".parse().unwrap();
        assert!(lease.validate().is_ok());
    }

    #[test]
    fn released_lease_is_valid() {
        assert!(Lease::released().validate().is_ok());
        assert!(Lease::released().is_released());
    }

    #[test]
    fn lease_document_parses_with_defaults() {
        let doc = r#"{
            "address": "10.0.0.6",
            "netmask": "255.255.255.0",
            "broadcast": "10.0.0.255",
            "routes": [
                {"destination": "0.0.0.0", "netmask": "0.0.0.0", "gateway": "10.0.0.1"}
            ],
            "dns_servers": ["10.0.0.1"],
            "lease_time": 3600
        }"#;

        let lease: Lease = serde_json::from_str(doc).unwrap();
        assert_eq!(lease.address, "10.0.0.6".parse::<Ipv4Addr>().unwrap());
        assert_eq!(lease.routes.len(), 1);
        assert!(lease.routes[0].is_default());
        assert!(lease.mtu.is_none());
        assert_eq!(lease.lease_time, 3600);
    }
}
