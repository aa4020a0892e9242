use std::sync::{Arc, Mutex};

use crate::errors::{LauncherError, Result};
use crate::models::DownloadJob;

/// Single source of truth for "what is currently downloading".
///
/// Jobs keep insertion order, so `primary()` (the one job surfaced to the
/// minimized sidebar view) stays stable while other jobs come and go.
/// Re-adding an existing id overwrites the entry in place, which preserves
/// its position.
#[derive(Clone, Default)]
pub struct ActiveJobSet {
    jobs: Arc<Mutex<Vec<DownloadJob>>>,
}

impl ActiveJobSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> Result<std::sync::MutexGuard<'_, Vec<DownloadJob>>> {
        self.jobs
            .lock()
            .map_err(|_| LauncherError::Config("active job set lock poisoned".to_string()))
    }

    pub fn add(&self, job: DownloadJob) -> Result<()> {
        let mut jobs = self.locked()?;
        if let Some(existing) = jobs.iter_mut().find(|item| item.id == job.id) {
            *existing = job;
        } else {
            jobs.push(job);
        }
        Ok(())
    }

    /// Removes the job; absent ids are a no-op.
    pub fn remove(&self, job_id: &str) -> Result<bool> {
        let mut jobs = self.locked()?;
        let before = jobs.len();
        jobs.retain(|item| item.id != job_id);
        Ok(jobs.len() != before)
    }

    /// Bulk reset from the persisted snapshot at startup.
    pub fn replace_all(&self, replacement: Vec<DownloadJob>) -> Result<()> {
        let mut jobs = self.locked()?;
        *jobs = replacement;
        Ok(())
    }

    pub fn get(&self, job_id: &str) -> Result<Option<DownloadJob>> {
        let jobs = self.locked()?;
        Ok(jobs.iter().find(|item| item.id == job_id).cloned())
    }

    /// Applies `mutate` to the job in place and returns the updated copy, or
    /// `None` if the job is no longer tracked.
    pub fn update<F>(&self, job_id: &str, mutate: F) -> Result<Option<DownloadJob>>
    where
        F: FnOnce(&mut DownloadJob),
    {
        let mut jobs = self.locked()?;
        let Some(job) = jobs.iter_mut().find(|item| item.id == job_id) else {
            return Ok(None);
        };
        mutate(job);
        Ok(Some(job.clone()))
    }

    /// First job in insertion order, for single-slot UI surfaces.
    pub fn primary(&self) -> Result<Option<DownloadJob>> {
        let jobs = self.locked()?;
        Ok(jobs.first().cloned())
    }

    pub fn list(&self) -> Result<Vec<DownloadJob>> {
        let jobs = self.locked()?;
        Ok(jobs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobLifecycleState, StartJobRequest};

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

    #[test]
    fn add_then_primary() {
        let set = ActiveJobSet::new();
        set.add(job("a", "Game A")).unwrap();
        assert_eq!(set.primary().unwrap().unwrap().id, "a");
    }

    #[test]
    fn primary_is_stable_across_additions() {
        let set = ActiveJobSet::new();
        set.add(job("a", "Game A")).unwrap();
        set.add(job("b", "Game B")).unwrap();
        assert_eq!(set.primary().unwrap().unwrap().id, "a");

        // Re-adding the primary (reconciliation overwrite) keeps its slot.
        let mut refreshed = job("a", "Game A");
        refreshed.last_known_state = JobLifecycleState::Live;
        set.add(refreshed).unwrap();
        assert_eq!(set.primary().unwrap().unwrap().id, "a");

        set.remove("a").unwrap();
        assert_eq!(set.primary().unwrap().unwrap().id, "b");
    }

    #[test]
    fn add_replaces_by_id() {
        let set = ActiveJobSet::new();
        set.add(job("a", "Game A")).unwrap();
        let mut updated = job("a", "Game A");
        updated.progress_percent = 40.0;
        set.add(updated).unwrap();

        let jobs = set.list().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].progress_percent, 40.0);
    }

    #[test]
    fn remove_absent_is_noop() {
        let set = ActiveJobSet::new();
        assert!(!set.remove("missing").unwrap());
    }

    #[test]
    fn replace_all_resets_contents() {
        let set = ActiveJobSet::new();
        set.add(job("a", "Game A")).unwrap();
        set.replace_all(vec![job("b", "Game B"), job("c", "Game C")])
            .unwrap();

        let ids: Vec<String> = set.list().unwrap().into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn update_mutates_in_place() {
        let set = ActiveJobSet::new();
        set.add(job("a", "Game A")).unwrap();
        let updated = set
            .update("a", |item| item.progress_percent = 75.0)
            .unwrap()
            .unwrap();
        assert_eq!(updated.progress_percent, 75.0);
        assert!(set.update("missing", |_| {}).unwrap().is_none());
    }
}
