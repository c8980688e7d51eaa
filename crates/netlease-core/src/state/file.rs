// # File Session Store
//
// File-based implementation of SessionStore with crash recovery.
//
// The snapshot is the only state that outlives a process: losing it means
// the next reconciliation cannot know which routes it owns. Writes are
// atomic (write to a temp file, rename over the target) and the last
// known good file is kept as a `.backup`; a corrupted main file falls
// back to the backup on load.
//
// ## File Format
//
// ```json
// {
//   "version": "1",
//   "interfaces": {
//     "eth0": {
//       "address": "10.0.0.5",
//       "netmask": "255.255.255.0",
//       "mtu": null,
//       "routes": [],
//       "applied_at": "2025-01-09T12:00:00Z"
//     }
//   }
// }
// ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::session::AppliedState;
use crate::traits::session_store::SessionStore;

/// Snapshot file format version
const STATE_FILE_VERSION: &str = "1";

/// File-backed session store
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    state: Arc<RwLock<StoreState>>,
}

#[derive(Debug)]
struct StoreState {
    interfaces: HashMap<String, AppliedState>,
    dirty: bool,
}

/// Serializable snapshot file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StateFileFormat {
    version: String,
    interfaces: HashMap<String, AppliedState>,
}

impl FileSessionStore {
    /// Create or load a file session store.
    ///
    /// Creates parent directories as needed, loads the existing snapshot
    /// file and falls back to the backup when the main file is corrupted.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::session(format!(
                        "failed to create state directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let interfaces = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(StoreState {
                interfaces,
                dirty: false,
            })),
        })
    }

    /// Load the snapshot, recovering from the backup on corruption
    async fn load_with_recovery(path: &Path) -> Result<HashMap<String, AppliedState>, Error> {
        match Self::load(path).await {
            Ok(interfaces) => {
                tracing::debug!("loaded snapshots for {} interface(s)", interfaces.len());
                Ok(interfaces)
            }
            Err(Error::Json(e)) => {
                tracing::warn!("snapshot file corrupted ({}), trying backup", e);

                let backup = Self::backup_path(path);
                if !backup.exists() {
                    tracing::warn!("no backup snapshot, starting empty");
                    return Ok(HashMap::new());
                }

                match Self::load(&backup).await {
                    Ok(interfaces) => {
                        tracing::info!(
                            "recovered snapshots for {} interface(s) from backup",
                            interfaces.len()
                        );
                        if let Err(e) = fs::copy(&backup, path).await {
                            tracing::error!("failed to restore snapshot from backup: {}", e);
                        }
                        Ok(interfaces)
                    }
                    Err(e) => {
                        tracing::error!("backup also unreadable ({}), starting empty", e);
                        Ok(HashMap::new())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn load(path: &Path) -> Result<HashMap<String, AppliedState>, Error> {
        if !path.exists() {
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::session(format!("failed to read {}: {}", path.display(), e))
        })?;

        let file: StateFileFormat = serde_json::from_str(&content)?;

        if file.version != STATE_FILE_VERSION {
            tracing::warn!(
                "snapshot file version mismatch: expected {}, got {}",
                STATE_FILE_VERSION,
                file.version
            );
        }

        Ok(file.interfaces)
    }

    /// Write the snapshot atomically: temp file, backup, rename
    async fn write_state(&self) -> Result<(), Error> {
        let json = {
            let state = self.state.read().await;
            let file = StateFileFormat {
                version: STATE_FILE_VERSION.to_string(),
                interfaces: state.interfaces.clone(),
            };
            serde_json::to_string_pretty(&file)?
        };

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::session(format!(
                    "failed to create {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::session(format!("failed to write {}: {}", temp_path.display(), e))
            })?;
            file.flush().await.map_err(|e| {
                Error::session(format!("failed to flush {}: {}", temp_path.display(), e))
            })?;
        }

        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await {
                tracing::warn!("failed to create snapshot backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::session(format!(
                "failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        let mut state = self.state.write().await;
        state.dirty = false;

        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, ifname: &str) -> Result<Option<AppliedState>, Error> {
        let state = self.state.read().await;
        Ok(state.interfaces.get(ifname).cloned())
    }

    async fn store(&self, ifname: &str, applied: &AppliedState) -> Result<(), Error> {
        {
            let mut state = self.state.write().await;
            state.interfaces.insert(ifname.to_string(), applied.clone());
            state.dirty = true;
        }

        // Immediate write; the snapshot must survive a crash between
        // reconciliations
        self.write_state().await
    }

    async fn clear(&self, ifname: &str) -> Result<(), Error> {
        {
            let mut state = self.state.write().await;
            state.interfaces.remove(ifname);
            state.dirty = true;
        }

        self.write_state().await
    }

    async fn list(&self) -> Result<Vec<String>, Error> {
        let state = self.state.read().await;
        Ok(state.interfaces.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        let dirty = self.state.read().await.dirty;
        if dirty { self.write_state().await } else { Ok(()) }
    }
}
