use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::errors::Result;
use crate::models::{CompletionRecord, DownloadJob};
use crate::services::json_store;

/// Persisted ledger of finished downloads.
///
/// The ledger is a whole-file JSON array with read-modify-write semantics,
/// so every access goes through one async mutex. Two jobs finishing in
/// overlapping async windows would otherwise both read the same stale array
/// and one append would be lost.
#[derive(Clone)]
pub struct CompletionLedger {
    path: PathBuf,
    guard: Arc<Mutex<()>>,
}

impl CompletionLedger {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            guard: Arc::new(Mutex::new(())),
        }
    }

    pub async fn list(&self) -> Vec<CompletionRecord> {
        let _lock = self.guard.lock().await;
        json_store::load_array(&self.path)
    }

    /// Append a completion record for the job unless one with the same title
    /// already exists. Returns `true` when a record was appended.
    ///
    /// A missing or unreadable ledger file bootstraps as empty; a failed
    /// write propagates, because silently dropping it would lose the
    /// download from history.
    pub async fn record_completion(&self, job: &DownloadJob) -> Result<bool> {
        let _lock = self.guard.lock().await;

        let mut records: Vec<CompletionRecord> = json_store::load_array(&self.path);
        if records.iter().any(|record| record.title == job.title) {
            tracing::debug!(
                "completion already recorded title={} job_id={}",
                job.title,
                job.id
            );
            return Ok(false);
        }

        records.push(CompletionRecord {
            title: job.title.clone(),
            image_url: job.image_url.clone(),
            description: job.description.clone(),
            source_link: job.source_link.clone(),
            completed_at: chrono::Utc::now().timestamp(),
            installed_path: String::new(),
        });
        json_store::store_array(&self.path, &records)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StartJobRequest;
    use std::path::Path;
    use uuid::Uuid;

    fn temp_ledger_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("harbor-ledger-test-{}", Uuid::new_v4()))
            .join("completed_downloads.json")
    }

    fn job(id: &str, title: &str) -> DownloadJob {
        DownloadJob::from_request(
            id.to_string(),
            &StartJobRequest {
                title: title.to_string(),
                source_link: format!("magnet:?xt={id}"),
                output_folder: "/tmp/games".to_string(),
                file_selection: Vec::new(),
                size_limit: false,
                image_url: None,
                description: None,
            },
        )
    }

    fn cleanup(path: &Path) {
        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[tokio::test]
    async fn missing_ledger_bootstraps_empty() {
        let path = temp_ledger_path();
        let ledger = CompletionLedger::new(path.clone());
        assert!(ledger.list().await.is_empty());
        cleanup(&path);
    }

    #[tokio::test]
    async fn records_once_per_title() {
        let path = temp_ledger_path();
        let ledger = CompletionLedger::new(path.clone());

        assert!(ledger.record_completion(&job("t1", "Game X")).await.unwrap());
        assert!(!ledger.record_completion(&job("t1", "Game X")).await.unwrap());
        // Same title under a different job id is still a duplicate.
        assert!(!ledger.record_completion(&job("t2", "Game X")).await.unwrap());

        let records = ledger.list().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Game X");
        assert_eq!(records[0].installed_path, "");
        cleanup(&path);
    }

    #[tokio::test]
    async fn concurrent_duplicate_finish_yields_one_record() {
        let path = temp_ledger_path();
        let ledger = CompletionLedger::new(path.clone());

        let first = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.record_completion(&job("t1", "Game X")).await })
        };
        let second = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.record_completion(&job("t1", "Game X")).await })
        };

        let appended_first = first.await.unwrap().unwrap();
        let appended_second = second.await.unwrap().unwrap();
        assert!(appended_first ^ appended_second);
        assert_eq!(ledger.list().await.len(), 1);
        cleanup(&path);
    }

    #[tokio::test]
    async fn malformed_ledger_bootstraps_empty() {
        let path = temp_ledger_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json at all").unwrap();

        let ledger = CompletionLedger::new(path.clone());
        assert!(ledger.list().await.is_empty());
        assert!(ledger.record_completion(&job("t1", "Game X")).await.unwrap());
        assert_eq!(ledger.list().await.len(), 1);
        cleanup(&path);
    }
}
