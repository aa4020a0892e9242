use crate::models::{DownloadJob, DownloadRuntimeErrorPayload};

/// Outbound notifications about tracked downloads. The production sink
/// forwards these to the webview as Tauri events; tests plug in a recorder.
pub trait JobEventSink: Send + Sync {
    /// The job shown in the "current download" slot changed, or cleared.
    fn primary_changed(&self, job: Option<&DownloadJob>);
    /// Membership or ordering of the tracked set changed.
    fn job_list_changed(&self, jobs: &[DownloadJob]);
    /// A job hit a fatal runtime problem the user should see.
    fn runtime_error(&self, payload: &DownloadRuntimeErrorPayload);
}
