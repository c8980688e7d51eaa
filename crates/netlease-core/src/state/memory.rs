// # Memory Session Store
//
// In-memory implementation of SessionStore.
//
// All snapshots are lost on restart: the first reconciliation after a
// crash sees no previous state and treats the whole lease as new, which
// is safe (add primitives are idempotent) but not minimal. Use the file
// store when the process is expected to restart under live leases.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::session::AppliedState;
use crate::traits::session_store::SessionStore;

/// In-memory session store implementation
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<RwLock<HashMap<String, AppliedState>>>,
}

impl MemorySessionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, ifname: &str) -> Result<Option<AppliedState>, Error> {
        let inner = self.inner.read().await;
        Ok(inner.get(ifname).cloned())
    }

    async fn store(&self, ifname: &str, state: &AppliedState) -> Result<(), Error> {
        let mut inner = self.inner.write().await;
        inner.insert(ifname.to_string(), state.clone());
        Ok(())
    }

    async fn clear(&self, ifname: &str) -> Result<(), Error> {
        let mut inner = self.inner.write().await;
        inner.remove(ifname);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, Error> {
        let inner = self.inner.read().await;
        Ok(inner.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}
