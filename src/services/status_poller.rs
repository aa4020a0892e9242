use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::sleep;

use crate::errors::{LauncherError, Result};
use crate::models::StatusSnapshot;
use crate::services::BackendRpc;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PollControl {
    Running,
    Stopped,
}

/// What a poll task reports back to the orchestrator for one job.
#[derive(Debug)]
pub enum PollEvent {
    Snapshot {
        job_id: String,
        snapshot: StatusSnapshot,
    },
    /// The backend signalled it no longer tracks the job. Sent at most once,
    /// after which the poll task exits.
    Fatal { job_id: String, message: String },
}

/// Per-job polling of the backend stats endpoint on a fixed cadence.
///
/// One tokio task per job id. The fetch happens inline in the loop, so a
/// slow backend call can never pile up overlapping requests for the same
/// job; the next tick simply starts late. `start` is idempotent and `stop`
/// is a no-op for unknown ids. A fetch that resolves after `stop` has its
/// result discarded.
#[derive(Clone)]
pub struct StatusPoller {
    backend: Arc<dyn BackendRpc>,
    interval: Duration,
    registry: Arc<Mutex<HashMap<String, watch::Sender<PollControl>>>>,
}

impl StatusPoller {
    pub fn new(backend: Arc<dyn BackendRpc>, interval: Duration) -> Self {
        Self {
            backend,
            interval,
            registry: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn is_polling(&self, job_id: &str) -> bool {
        self.registry
            .lock()
            .map(|registry| registry.contains_key(job_id))
            .unwrap_or(false)
    }

    /// Begin polling `job_id`, delivering results on `events`. Returns
    /// `false` without side effects when a poller for the id is already
    /// running.
    pub fn start(&self, job_id: &str, events: mpsc::Sender<PollEvent>) -> Result<bool> {
        let mut registry = self
            .registry
            .lock()
            .map_err(|_| LauncherError::Config("poller registry lock poisoned".to_string()))?;
        if registry.contains_key(job_id) {
            return Ok(false);
        }

        let (control_tx, control_rx) = watch::channel(PollControl::Running);
        registry.insert(job_id.to_string(), control_tx);
        drop(registry);

        let poller = self.clone();
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            poller.run_poll_loop(job_id, control_rx, events).await;
        });
        Ok(true)
    }

    /// Cancel polling for `job_id`. Safe to call when no poller is running.
    pub fn stop(&self, job_id: &str) {
        if let Ok(mut registry) = self.registry.lock() {
            if let Some(control) = registry.remove(job_id) {
                let _ = control.send(PollControl::Stopped);
            }
        }
    }

    fn deregister(&self, job_id: &str) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.remove(job_id);
        }
    }

    async fn run_poll_loop(
        self,
        job_id: String,
        control: watch::Receiver<PollControl>,
        events: mpsc::Sender<PollEvent>,
    ) {
        loop {
            sleep(self.interval).await;
            if *control.borrow() == PollControl::Stopped {
                return;
            }

            match self.backend.fetch_job_stats(&job_id).await {
                Ok(snapshot) => {
                    // Stopped while the fetch was in flight: discard.
                    if *control.borrow() == PollControl::Stopped {
                        return;
                    }
                    let finished = snapshot.finished;
                    if finished {
                        // Deregister before the final delivery so the job can
                        // be re-tracked immediately without racing cleanup.
                        self.deregister(&job_id);
                    }
                    let delivered = events
                        .send(PollEvent::Snapshot {
                            job_id: job_id.clone(),
                            snapshot,
                        })
                        .await
                        .is_ok();
                    if finished || !delivered {
                        if !finished {
                            self.deregister(&job_id);
                        }
                        return;
                    }
                }
                Err(err) if err.is_tracking_stopped() => {
                    if *control.borrow() == PollControl::Stopped {
                        return;
                    }
                    self.deregister(&job_id);
                    let _ = events
                        .send(PollEvent::Fatal {
                            job_id: job_id.clone(),
                            message: err.to_string(),
                        })
                        .await;
                    return;
                }
                Err(err) => {
                    // Transient failure: keep the cadence and try again.
                    tracing::warn!(
                        "job stats fetch failed job_id={} error={}",
                        job_id,
                        err
                    );
                }
            }
        }
    }
}
