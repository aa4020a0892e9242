use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::errors::Result;
use crate::models::DownloadJob;
use crate::services::json_store;

/// Persisted snapshot of the jobs being tracked, written whenever the active
/// set changes and read once at startup to rebuild tracking after a restart.
/// Same whole-file JSON-array discipline as the completion ledger.
#[derive(Clone)]
pub struct TrackedJobStore {
    path: PathBuf,
    guard: Arc<Mutex<()>>,
}

impl TrackedJobStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            guard: Arc::new(Mutex::new(())),
        }
    }

    pub async fn load(&self) -> Vec<DownloadJob> {
        let _lock = self.guard.lock().await;
        json_store::load_array(&self.path)
    }

    pub async fn save(&self, jobs: &[DownloadJob]) -> Result<()> {
        let _lock = self.guard.lock().await;
        json_store::store_array(&self.path, jobs)
    }
}
