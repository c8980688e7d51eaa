// # Host Control Trait
//
// Hostname read/write and reverse lookup. The reconciler only sets the
// hostname when policy asks for it or the current name is a known
// placeholder; that decision lives in the reconciler, not here.

use crate::error::Result;
use async_trait::async_trait;
use std::net::Ipv4Addr;

/// System hostname access
#[async_trait]
pub trait HostControl: Send + Sync {
    /// Current system hostname
    async fn hostname(&self) -> Result<String>;

    /// Set the system hostname
    async fn set_hostname(&self, name: &str) -> Result<()>;

    /// Best-effort reverse lookup of an address. `None` on any failure;
    /// the reconciler simply proceeds without a derived name.
    async fn reverse_lookup(&self, address: Ipv4Addr) -> Option<String>;
}
