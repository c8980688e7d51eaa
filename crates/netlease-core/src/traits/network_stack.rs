// # Network Stack Trait
//
// OS mutation primitives the reconciler sequences. Implementations are
// expected to be atomic per call and idempotent on duplicates: adding
// something that is already present reports `AlreadyPresent` instead of
// failing, so a crashed-and-restarted reconciliation can safely repeat
// itself.

use crate::error::Result;
use crate::lease::Route;
use async_trait::async_trait;
use std::net::Ipv4Addr;

/// Outcome of an add-style mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The change was applied
    Applied,
    /// The target was already in place; treated as success
    AlreadyPresent,
}

/// Trait for OS network-mutation backends
///
/// Implementations must be thread-safe. Every operation is independently
/// retryable; none of them is expected to roll anything back.
#[async_trait]
pub trait NetworkStack: Send + Sync {
    /// Install an address on an interface
    async fn add_address(
        &self,
        ifname: &str,
        address: Ipv4Addr,
        netmask: Ipv4Addr,
        broadcast: Ipv4Addr,
    ) -> Result<MutationOutcome>;

    /// Remove an address from an interface
    async fn del_address(&self, ifname: &str, address: Ipv4Addr, netmask: Ipv4Addr) -> Result<()>;

    /// Install a route through an interface
    async fn add_route(&self, ifname: &str, route: &Route, metric: u32) -> Result<MutationOutcome>;

    /// Remove a route from an interface
    async fn del_route(&self, ifname: &str, route: &Route, metric: u32) -> Result<()>;

    /// Set the interface MTU
    async fn set_mtu(&self, ifname: &str, mtu: u32) -> Result<()>;

    /// Whether the platform needs the subnet route re-registered at the
    /// configured metric after an address change (add-with-metric then
    /// delete-without, so a peer subnet route cannot shadow it).
    fn wants_subnet_route_refresh(&self) -> bool {
        false
    }
}
