use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use proxbot_common::{ProxbotError, Result};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::resolver::ResourceResolver;
use crate::DispatchError;

pub const DEFAULT_WATCHLIST_PATH: &str = "monitor_list.json";

/// Durable home of the watchlist. Reads and writes are whole-list.
#[async_trait]
pub trait WatchlistStorage: Send + Sync {
    async fn load(&self) -> Result<Vec<u32>>;
    async fn save(&self, ids: &[u32]) -> Result<()>;
}

/// A JSON array of integers on disk, e.g. `[100,101,105]`.
///
/// A missing file is seeded with the configured defaults, which are written
/// out on first load. If that write fails the seed is still served.
/// Saves replace the file atomically.
pub struct JsonFileWatchlist {
    path: PathBuf,
    seed: Vec<u32>,
}

impl JsonFileWatchlist {
    pub fn new(path: impl Into<PathBuf>, seed: Vec<u32>) -> Self {
        Self {
            path: path.into(),
            seed,
        }
    }
}

#[async_trait]
impl WatchlistStorage for JsonFileWatchlist {
    async fn load(&self) -> Result<Vec<u32>> {
        if !tokio::fs::try_exists(&self.path).await? {
            info!(path = %self.path.display(), seed = ?self.seed, "Watchlist file absent, seeding defaults");
            if let Err(e) = self.save(&self.seed).await {
                warn!(path = %self.path.display(), error = %e, "Failed to write seeded watchlist");
            }
            return Ok(self.seed.clone());
        }
        let raw = tokio::fs::read(&self.path).await?;
        serde_json::from_slice(&raw).map_err(|e| {
            ProxbotError::Decode(format!("{}: {e}", self.path.display()))
        })
    }

    async fn save(&self, ids: &[u32]) -> Result<()> {
        let body = serde_json::to_vec(ids).map_err(|e| ProxbotError::Internal(e.to_string()))?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &body))
            .await
            .map_err(|e| ProxbotError::Internal(e.to_string()))?
    }
}

/// Writes to a temp file beside `path` and renames it into place. Readers see
/// the previous list or the new one, never a partial file.
fn write_atomic(path: &Path, body: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(body)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Process-local storage for tests and file-less deployments.
pub struct InMemoryWatchlist {
    ids: Arc<RwLock<Vec<u32>>>,
}

impl InMemoryWatchlist {
    pub fn new(ids: Vec<u32>) -> Self {
        Self {
            ids: Arc::new(RwLock::new(ids)),
        }
    }
}

impl Default for InMemoryWatchlist {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl WatchlistStorage for InMemoryWatchlist {
    async fn load(&self) -> Result<Vec<u32>> {
        Ok(self.ids.read().await.clone())
    }

    async fn save(&self, ids: &[u32]) -> Result<()> {
        *self.ids.write().await = ids.to_vec();
        Ok(())
    }
}

/// The monitored ids. Storage failures are logged, never raised: a failed
/// read is an empty list and a failed write changes nothing.
///
/// Add and remove run under one mutex so concurrent edits cannot drop each
/// other's update.
pub struct Watchlist {
    storage: Arc<dyn WatchlistStorage>,
    edit: Mutex<()>,
}

impl Watchlist {
    pub fn new(storage: Arc<dyn WatchlistStorage>) -> Self {
        Self {
            storage,
            edit: Mutex::new(()),
        }
    }

    /// Current ids in insertion order, duplicates dropped.
    pub async fn ids(&self) -> Vec<u32> {
        match self.storage.load().await {
            Ok(ids) => dedup(ids),
            Err(e) => {
                error!(error = %e, "Failed to load watchlist");
                Vec::new()
            }
        }
    }

    /// Appends `id` if it is not yet watched and resolves to a live machine.
    pub async fn add(&self, id: u32, resolver: &ResourceResolver) -> crate::Result<()> {
        let _guard = self.edit.lock().await;
        let mut ids = self.ids().await;
        if ids.contains(&id) {
            return Err(DispatchError::AlreadyMonitored(id));
        }
        if resolver.resolve(id).await.is_none() {
            return Err(DispatchError::MachineNotFound(id));
        }
        ids.push(id);
        self.persist(&ids).await;
        info!(vmid = id, "Added to watchlist");
        Ok(())
    }

    pub async fn remove(&self, id: u32) -> crate::Result<()> {
        let _guard = self.edit.lock().await;
        let mut ids = self.ids().await;
        let Some(pos) = ids.iter().position(|&v| v == id) else {
            return Err(DispatchError::NotMonitored(id));
        };
        ids.remove(pos);
        self.persist(&ids).await;
        info!(vmid = id, "Removed from watchlist");
        Ok(())
    }

    async fn persist(&self, ids: &[u32]) {
        if let Err(e) = self.storage.save(ids).await {
            warn!(error = %e, "Failed to persist watchlist");
        }
    }
}

fn dedup(ids: Vec<u32>) -> Vec<u32> {
    let mut seen = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}
