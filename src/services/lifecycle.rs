use std::sync::Arc;

use tokio::sync::mpsc;

use crate::errors::Result;
use crate::models::{
    CompletionRecord, DownloadJob, DownloadRuntimeErrorPayload, JobLifecycleState,
    StartJobRequest,
};
use crate::services::{
    job_state, ActiveJobSet, BackendRpc, CompletionLedger, JobEventSink, PollEvent,
    StatusPoller, TrackedJobStore,
};

const POLL_CHANNEL_CAPACITY: usize = 32;

/// Glue between the backend client, the poller, the in-memory job set and
/// the persisted stores. Commands call into this; the poller feeds it.
#[derive(Clone)]
pub struct LifecycleOrchestrator {
    backend: Arc<dyn BackendRpc>,
    poller: StatusPoller,
    jobs: ActiveJobSet,
    ledger: CompletionLedger,
    tracked: TrackedJobStore,
    events: Arc<dyn JobEventSink>,
}

impl LifecycleOrchestrator {
    pub fn new(
        backend: Arc<dyn BackendRpc>,
        poller: StatusPoller,
        ledger: CompletionLedger,
        tracked: TrackedJobStore,
        events: Arc<dyn JobEventSink>,
    ) -> Self {
        Self {
            backend,
            poller,
            jobs: ActiveJobSet::new(),
            ledger,
            tracked,
            events,
        }
    }

    /// Submit the download to the backend, register it and start polling.
    pub async fn start_download(&self, request: StartJobRequest) -> Result<DownloadJob> {
        let job_id = self.backend.start_job(&request).await?;
        tracing::info!("download started job_id={} title={}", job_id, request.title);

        let job = DownloadJob::from_request(job_id.clone(), &request);
        self.jobs.add(job.clone())?;
        self.persist_tracked().await;
        self.emit_list_and_primary();
        self.begin_tracking(&job_id)?;
        Ok(job)
    }

    pub async fn pause_download(&self, job_id: &str) -> Result<()> {
        self.backend.pause_job(job_id).await?;
        if let Some(job) = self.jobs.update(job_id, |job| {
            job.last_known_state = JobLifecycleState::Paused;
        })? {
            self.emit_job_update(&job);
        }
        Ok(())
    }

    pub async fn resume_download(&self, job_id: &str) -> Result<()> {
        self.backend.resume_job(job_id).await?;
        if let Some(job) = self.jobs.update(job_id, |job| {
            job.last_known_state = JobLifecycleState::Live;
        })? {
            self.emit_job_update(&job);
        }
        Ok(())
    }

    /// User-initiated cancel: stop polling first so a late snapshot cannot
    /// resurrect the job, then drop it from the backend and the tracked set.
    pub async fn stop_download(&self, job_id: &str) -> Result<()> {
        self.poller.stop(job_id);
        if let Err(err) = self.backend.delete_job(job_id).await {
            tracing::warn!("backend delete failed job_id={} error={}", job_id, err);
        }
        self.jobs.remove(job_id)?;
        self.persist_tracked().await;
        self.emit_list_and_primary();
        tracing::info!("download stopped job_id={}", job_id);
        Ok(())
    }

    pub fn active_downloads(&self) -> Result<Vec<DownloadJob>> {
        self.jobs.list()
    }

    pub fn primary_download(&self) -> Result<Option<DownloadJob>> {
        self.jobs.primary()
    }

    pub async fn completed_downloads(&self) -> Vec<CompletionRecord> {
        self.ledger.list().await
    }

    /// Rebuild tracking from the persisted snapshot at startup. Jobs that
    /// already finished get their ledger write retried (it may have failed
    /// before the previous shutdown); everything else resumes polling.
    pub async fn restore_tracked(&self) -> Result<()> {
        let persisted = self.tracked.load().await;
        if persisted.is_empty() {
            return Ok(());
        }
        tracing::info!("restoring {} tracked download(s)", persisted.len());
        self.jobs.replace_all(persisted.clone())?;
        self.emit_list_and_primary();

        for job in &persisted {
            if job.last_known_state.is_finished() {
                self.finalize_job(job).await;
            } else {
                self.begin_tracking(&job.id)?;
            }
        }
        Ok(())
    }

    /// Start polling `job_id` and spawn the consumer for its events. Safe to
    /// call for a job that is already tracked.
    pub fn begin_tracking(&self, job_id: &str) -> Result<bool> {
        let (tx, mut rx) = mpsc::channel(POLL_CHANNEL_CAPACITY);
        if !self.poller.start(job_id, tx)? {
            return Ok(false);
        }

        let orchestrator = self.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    PollEvent::Snapshot { job_id, snapshot } => {
                        orchestrator.apply_snapshot(&job_id, snapshot).await;
                    }
                    PollEvent::Fatal { job_id, message } => {
                        orchestrator.handle_fatal(&job_id, message).await;
                    }
                }
            }
        });
        Ok(true)
    }

    async fn apply_snapshot(&self, job_id: &str, snapshot: crate::models::StatusSnapshot) {
        let previous = match self.jobs.get(job_id) {
            Ok(Some(job)) => job.last_known_state,
            // Removed while the snapshot was in flight (user stop); drop it.
            Ok(None) => {
                self.poller.stop(job_id);
                return;
            }
            Err(err) => {
                tracing::error!("job set unavailable job_id={} error={}", job_id, err);
                return;
            }
        };

        let next_state = job_state::classify(&snapshot);
        let newly_finished = job_state::is_newly_finished(previous, &snapshot);

        let updated = match self.jobs.update(job_id, |job| {
            job.last_known_state = next_state;
            job.progress_percent =
                job_state::progress_percent(snapshot.progress_bytes, snapshot.total_bytes);
            job.downloaded_bytes = snapshot.progress_bytes;
            job.total_bytes = snapshot.total_bytes;
            job.download_speed = snapshot.live.as_ref().map(|live| live.download_speed.clone());
            job.eta = snapshot.live.as_ref().map(|live| live.time_remaining.clone());
            job.updated_at = chrono::Utc::now().timestamp();
        }) {
            Ok(Some(job)) => job,
            Ok(None) => return,
            Err(err) => {
                tracing::error!("job update failed job_id={} error={}", job_id, err);
                return;
            }
        };

        if next_state != previous {
            tracing::info!(
                "job state changed job_id={} {:?} -> {:?}",
                job_id,
                previous,
                next_state
            );
            self.persist_tracked().await;
        }
        self.emit_job_update(&updated);

        if newly_finished {
            // The poller already self-stopped on the finished snapshot; this
            // covers restore paths where it did not.
            self.poller.stop(job_id);
            self.finalize_job(&updated).await;
        }
    }

    /// Record the completion and retire the job. The job leaves the tracked
    /// set only after the ledger write is confirmed; on failure it stays
    /// marked finished so the write is retried at next startup.
    async fn finalize_job(&self, job: &DownloadJob) {
        match self.ledger.record_completion(job).await {
            Ok(appended) => {
                if appended {
                    tracing::info!(
                        "download completed job_id={} title={}",
                        job.id,
                        job.title
                    );
                }
                if let Err(err) = self.jobs.remove(&job.id) {
                    tracing::error!("failed to retire job_id={} error={}", job.id, err);
                }
                self.persist_tracked().await;
                self.emit_list_and_primary();
            }
            Err(err) => {
                tracing::error!(
                    "completion write failed job_id={} title={} error={}",
                    job.id,
                    job.title,
                    err
                );
                self.events.runtime_error(&DownloadRuntimeErrorPayload {
                    job_id: job.id.clone(),
                    title: job.title.clone(),
                    message: format!("Could not save completed download: {err}"),
                });
            }
        }
    }

    /// The backend no longer tracks the job. Polling already halted; the job
    /// keeps its last known state so the user can decide what to do with it.
    async fn handle_fatal(&self, job_id: &str, message: String) {
        tracing::error!("tracking stopped job_id={} message={}", job_id, message);
        let Ok(Some(job)) = self.jobs.get(job_id) else {
            return;
        };
        self.events.runtime_error(&DownloadRuntimeErrorPayload {
            job_id: job.id.clone(),
            title: job.title.clone(),
            message: if message.trim().is_empty() {
                "The download backend stopped tracking this job.".to_string()
            } else {
                message
            },
        });
    }

    async fn persist_tracked(&self) {
        let jobs = match self.jobs.list() {
            Ok(jobs) => jobs,
            Err(err) => {
                tracing::error!("cannot snapshot tracked jobs: {}", err);
                return;
            }
        };
        if let Err(err) = self.tracked.save(&jobs).await {
            tracing::error!("tracked snapshot write failed: {}", err);
        }
    }

    fn emit_list_and_primary(&self) {
        if let Ok(jobs) = self.jobs.list() {
            self.events.job_list_changed(&jobs);
        }
        if let Ok(primary) = self.jobs.primary() {
            self.events.primary_changed(primary.as_ref());
        }
    }

    fn emit_job_update(&self, job: &DownloadJob) {
        if let Ok(jobs) = self.jobs.list() {
            self.events.job_list_changed(&jobs);
        }
        if let Ok(Some(primary)) = self.jobs.primary() {
            if primary.id == job.id {
                self.events.primary_changed(Some(&primary));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LauncherError;
    use crate::models::{LiveStats, StatusSnapshot};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};
    use uuid::Uuid;

    struct FakeBackend {
        script: StdMutex<Vec<std::result::Result<StatusSnapshot, LauncherError>>>,
        next_id: StdMutex<String>,
        deletes: AtomicUsize,
    }

    impl FakeBackend {
        fn new(script: Vec<std::result::Result<StatusSnapshot, LauncherError>>) -> Arc<Self> {
            Arc::new(Self {
                script: StdMutex::new(script),
                next_id: StdMutex::new("job-1".to_string()),
                deletes: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl BackendRpc for FakeBackend {
        async fn start_job(&self, _request: &StartJobRequest) -> Result<String> {
            Ok(self.next_id.lock().unwrap().clone())
        }

        async fn fetch_job_stats(&self, _job_id: &str) -> Result<StatusSnapshot> {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                return script.remove(0);
            }
            match script.first() {
                Some(Ok(snapshot)) => Ok(snapshot.clone()),
                Some(Err(LauncherError::TrackingStopped(message))) => {
                    Err(LauncherError::TrackingStopped(message.clone()))
                }
                Some(Err(other)) => Err(LauncherError::Http(other.to_string())),
                None => Err(LauncherError::Http("script exhausted".to_string())),
            }
        }

        async fn pause_job(&self, _job_id: &str) -> Result<()> {
            Ok(())
        }

        async fn resume_job(&self, _job_id: &str) -> Result<()> {
            Ok(())
        }

        async fn delete_job(&self, _job_id: &str) -> Result<()> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        primaries: StdMutex<Vec<Option<String>>>,
        errors: StdMutex<Vec<DownloadRuntimeErrorPayload>>,
    }

    impl JobEventSink for RecordingSink {
        fn primary_changed(&self, job: Option<&DownloadJob>) {
            self.primaries
                .lock()
                .unwrap()
                .push(job.map(|item| item.id.clone()));
        }

        fn job_list_changed(&self, _jobs: &[DownloadJob]) {}

        fn runtime_error(&self, payload: &DownloadRuntimeErrorPayload) {
            self.errors.lock().unwrap().push(payload.clone());
        }
    }

    fn live_snapshot(progress: u64) -> StatusSnapshot {
        StatusSnapshot {
            state: "live".to_string(),
            progress_bytes: progress,
            total_bytes: 100,
            live: Some(LiveStats {
                download_speed: "2 MB/s".to_string(),
                upload_speed: "0 B/s".to_string(),
                time_remaining: "1m".to_string(),
            }),
            ..StatusSnapshot::default()
        }
    }

    fn finished_snapshot() -> StatusSnapshot {
        StatusSnapshot {
            state: "live".to_string(),
            finished: true,
            progress_bytes: 100,
            total_bytes: 100,
            ..StatusSnapshot::default()
        }
    }

    fn request(title: &str) -> StartJobRequest {
        StartJobRequest {
            title: title.to_string(),
            source_link: format!("magnet:?xt={title}"),
            output_folder: "/tmp/games".to_string(),
            file_selection: Vec::new(),
            size_limit: false,
            image_url: None,
            description: None,
        }
    }

    struct Fixture {
        orchestrator: LifecycleOrchestrator,
        sink: Arc<RecordingSink>,
        backend: Arc<FakeBackend>,
        root: PathBuf,
    }

    impl Fixture {
        fn new(script: Vec<std::result::Result<StatusSnapshot, LauncherError>>) -> Self {
            let root = std::env::temp_dir().join(format!("harbor-lifecycle-{}", Uuid::new_v4()));
            let backend = FakeBackend::new(script);
            let sink = Arc::new(RecordingSink::default());
            let poller =
                StatusPoller::new(backend.clone(), Duration::from_millis(10));
            let orchestrator = LifecycleOrchestrator::new(
                backend.clone(),
                poller,
                CompletionLedger::new(root.join("completed_downloads.json")),
                TrackedJobStore::new(root.join("tracked_downloads.json")),
                sink.clone(),
            );
            Self {
                orchestrator,
                sink,
                backend,
                root,
            }
        }

        async fn wait_until<F: Fn() -> bool>(&self, condition: F) {
            timeout(Duration::from_secs(5), async {
                while !condition() {
                    sleep(Duration::from_millis(10)).await;
                }
            })
            .await
            .expect("condition not reached in time");
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }

    #[tokio::test]
    async fn finished_download_is_recorded_then_retired() {
        let fixture = Fixture::new(vec![
            Ok(live_snapshot(40)),
            Ok(live_snapshot(80)),
            Ok(finished_snapshot()),
        ]);
        let job = fixture
            .orchestrator
            .start_download(request("Game X"))
            .await
            .unwrap();
        assert_eq!(job.id, "job-1");

        let orchestrator = fixture.orchestrator.clone();
        fixture
            .wait_until(|| orchestrator.active_downloads().unwrap().is_empty())
            .await;

        let completed = fixture.orchestrator.completed_downloads().await;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].title, "Game X");
        // Retirement also clears the primary slot.
        assert!(fixture.orchestrator.primary_download().unwrap().is_none());
        assert_eq!(
            fixture.sink.primaries.lock().unwrap().last(),
            Some(&None)
        );
    }

    #[tokio::test]
    async fn snapshot_updates_progress_and_rates() {
        let fixture = Fixture::new(vec![Ok(live_snapshot(40))]);
        fixture
            .orchestrator
            .start_download(request("Game X"))
            .await
            .unwrap();

        let orchestrator = fixture.orchestrator.clone();
        fixture
            .wait_until(|| {
                orchestrator
                    .primary_download()
                    .unwrap()
                    .map(|job| job.progress_percent > 0.0)
                    .unwrap_or(false)
            })
            .await;

        let job = fixture.orchestrator.primary_download().unwrap().unwrap();
        assert_eq!(job.last_known_state, JobLifecycleState::Live);
        assert_eq!(job.progress_percent, 40.0);
        assert_eq!(job.download_speed.as_deref(), Some("2 MB/s"));
        assert_eq!(job.eta.as_deref(), Some("1m"));
        fixture.orchestrator.stop_download("job-1").await.unwrap();
    }

    #[tokio::test]
    async fn ledger_write_failure_keeps_job_tracked() {
        let fixture = Fixture::new(vec![Ok(finished_snapshot())]);
        // A directory at the ledger path makes the rename step fail.
        std::fs::create_dir_all(fixture.root.join("completed_downloads.json")).unwrap();

        fixture
            .orchestrator
            .start_download(request("Game X"))
            .await
            .unwrap();

        let sink = fixture.sink.clone();
        fixture
            .wait_until(|| !sink.errors.lock().unwrap().is_empty())
            .await;

        // The job survives so the write can be retried after restart.
        let jobs = fixture.orchestrator.active_downloads().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].last_known_state, JobLifecycleState::Finished);
        let errors = fixture.sink.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("Could not save"));
    }

    #[tokio::test]
    async fn tracking_stopped_keeps_job_and_emits_error_once() {
        let fixture = Fixture::new(vec![
            Ok(live_snapshot(40)),
            Err(LauncherError::TrackingStopped("job dropped".to_string())),
        ]);
        fixture
            .orchestrator
            .start_download(request("Game X"))
            .await
            .unwrap();

        let sink = fixture.sink.clone();
        fixture
            .wait_until(|| !sink.errors.lock().unwrap().is_empty())
            .await;
        sleep(Duration::from_millis(60)).await;

        // The job stays in its last known state; the user decides what next.
        let jobs = fixture.orchestrator.active_downloads().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].last_known_state, JobLifecycleState::Live);
        assert_eq!(fixture.sink.errors.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stop_download_removes_job_and_deletes_backend_job() {
        let fixture = Fixture::new(vec![Ok(live_snapshot(40))]);
        fixture
            .orchestrator
            .start_download(request("Game X"))
            .await
            .unwrap();

        fixture.orchestrator.stop_download("job-1").await.unwrap();
        assert!(fixture.orchestrator.active_downloads().unwrap().is_empty());
        assert_eq!(fixture.backend.deletes.load(Ordering::SeqCst), 1);

        // Stopping again is harmless.
        fixture.orchestrator.stop_download("job-1").await.unwrap();
    }

    #[tokio::test]
    async fn restore_resumes_unfinished_and_retries_finished() {
        let fixture = Fixture::new(vec![Ok(live_snapshot(60))]);

        let mut finished_job = DownloadJob::from_request("job-done".to_string(), &request("Done"));
        finished_job.last_known_state = JobLifecycleState::Finished;
        let live_job = DownloadJob::from_request("job-live".to_string(), &request("Live"));
        fixture
            .orchestrator
            .tracked
            .save(&[finished_job, live_job])
            .await
            .unwrap();

        fixture.orchestrator.restore_tracked().await.unwrap();

        // The finished job goes straight to the ledger and out of the set.
        let orchestrator = fixture.orchestrator.clone();
        fixture
            .wait_until(|| {
                orchestrator
                    .active_downloads()
                    .map(|jobs| jobs.len() == 1 && jobs[0].id == "job-live")
                    .unwrap_or(false)
            })
            .await;
        let completed = fixture.orchestrator.completed_downloads().await;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].title, "Done");

        // The live job is being polled again.
        fixture
            .wait_until(|| {
                orchestrator
                    .active_downloads()
                    .map(|jobs| jobs.iter().any(|job| job.progress_percent == 60.0))
                    .unwrap_or(false)
            })
            .await;
        fixture.orchestrator.stop_download("job-live").await.unwrap();
    }

    #[tokio::test]
    async fn restore_with_no_snapshot_is_a_noop() {
        let fixture = Fixture::new(vec![Ok(live_snapshot(10))]);
        fixture.orchestrator.restore_tracked().await.unwrap();
        assert!(fixture.orchestrator.active_downloads().unwrap().is_empty());
    }
}
