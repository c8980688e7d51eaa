// # Session Store Trait
//
// Persistence for the per-interface applied-state snapshot. The snapshot
// is what every future reconciliation diffs against, so it is committed
// after each successful pass and cleared when an interface loses its
// lease. Implementations must be thread-safe.

use crate::error::Result;
use crate::session::AppliedState;
use async_trait::async_trait;

/// Trait for snapshot persistence backends
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the snapshot for an interface, if one was persisted
    async fn load(&self, ifname: &str) -> Result<Option<AppliedState>>;

    /// Persist an interface's snapshot, replacing any previous one
    async fn store(&self, ifname: &str, state: &AppliedState) -> Result<()>;

    /// Remove an interface's snapshot (lease lost or unmanaged)
    async fn clear(&self, ifname: &str) -> Result<()>;

    /// List interfaces with a persisted snapshot
    async fn list(&self) -> Result<Vec<String>>;

    /// Persist any buffered changes
    async fn flush(&self) -> Result<()>;
}
