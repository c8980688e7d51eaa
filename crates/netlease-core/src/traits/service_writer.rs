// # Service Writer Traits
//
// Downstream consumers of a resolved lease: name resolution, time sync
// and directory service configuration. Each writer reports whether it
// actually changed anything so the dispatcher can avoid restarting a
// service whose configuration is already current.
//
// Writers never decide *whether* to run; gating on policy and on lease
// data presence is owned by the reconciler.

use crate::config::TimeSyncBackend;
use crate::error::Result;
use async_trait::async_trait;
use std::net::Ipv4Addr;

/// Regenerates name-resolution configuration
#[async_trait]
pub trait ResolverWriter: Send + Sync {
    /// Write resolver configuration for an interface.
    ///
    /// `search` wins over `domain` when both are present. Returns whether
    /// the on-disk configuration changed.
    async fn write(
        &self,
        ifname: &str,
        domain: Option<&str>,
        search: Option<&str>,
        servers: &[Ipv4Addr],
    ) -> Result<bool>;

    /// Withdraw this interface's resolver configuration (lease lost)
    async fn restore(&self, ifname: &str) -> Result<()>;
}

/// Regenerates time-sync configuration, one backend at a time
#[async_trait]
pub trait TimeSyncWriter: Send + Sync {
    /// Write one backend's configuration file. Returns whether the file
    /// changed (a restart is only warranted when it did).
    async fn write(
        &self,
        backend: &TimeSyncBackend,
        ifname: &str,
        servers: &[Ipv4Addr],
    ) -> Result<bool>;

    /// Restart a time service. Fire-and-forget; the restart is not
    /// awaited for completion.
    async fn restart(&self, service: &str) -> Result<()>;
}

/// Regenerates directory-service (NIS) configuration
#[async_trait]
pub trait DirectoryWriter: Send + Sync {
    /// Write directory-service configuration. Returns whether the
    /// on-disk configuration changed.
    async fn write(
        &self,
        ifname: &str,
        domain: Option<&str>,
        servers: &[Ipv4Addr],
    ) -> Result<bool>;

    /// Restart the directory service. Fire-and-forget.
    async fn restart(&self) -> Result<()>;
}
