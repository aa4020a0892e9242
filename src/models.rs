use serde::{Deserialize, Serialize};

/// Closed set of lifecycle states a tracked download can be in. The backend
/// reports free-form state strings; anything outside the known set maps to
/// `Errored` so the UI never shows progress for a state it cannot interpret.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobLifecycleState {
    #[default]
    Uninitialized,
    Initializing,
    Live,
    Paused,
    Finished,
    Errored,
}

impl JobLifecycleState {
    pub fn is_finished(self) -> bool {
        self == Self::Finished
    }
}

/// One tracked download. Created when the user starts a download (or when the
/// persisted snapshot is reloaded at startup) and mutated only by the poll
/// pipeline until it finishes or is explicitly stopped.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DownloadJob {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub source_link: String,
    pub output_folder: String,
    #[serde(default)]
    pub file_list: Vec<String>,
    #[serde(default)]
    pub size_limit: bool,
    #[serde(default)]
    pub last_known_state: JobLifecycleState,
    #[serde(default)]
    pub progress_percent: f64,
    #[serde(default)]
    pub downloaded_bytes: u64,
    #[serde(default)]
    pub total_bytes: u64,
    #[serde(default)]
    pub download_speed: Option<String>,
    #[serde(default)]
    pub eta: Option<String>,
    #[serde(default)]
    pub updated_at: i64,
}

impl DownloadJob {
    pub fn from_request(id: String, request: &StartJobRequest) -> Self {
        Self {
            id,
            title: request.title.clone(),
            image_url: request.image_url.clone(),
            description: request.description.clone(),
            source_link: request.source_link.clone(),
            output_folder: request.output_folder.clone(),
            file_list: request.file_selection.clone(),
            size_limit: request.size_limit,
            last_known_state: JobLifecycleState::Uninitialized,
            progress_percent: 0.0,
            downloaded_bytes: 0,
            total_bytes: 0,
            download_speed: None,
            eta: None,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Transfer-rate block nested inside a stats payload while a job is live.
/// Values are human-readable strings formatted by the backend.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct LiveStats {
    #[serde(default)]
    pub download_speed: String,
    #[serde(default)]
    pub upload_speed: String,
    #[serde(default)]
    pub time_remaining: String,
}

/// Raw stats payload for one poll tick. Consumed once and discarded; only
/// derived fields are retained on the job.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct StatusSnapshot {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub finished: bool,
    #[serde(default)]
    pub progress_bytes: u64,
    #[serde(default)]
    pub total_bytes: u64,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub live: Option<LiveStats>,
}

/// Persisted entry for a finished download. At most one record exists per
/// title; `installed_path` is filled in later by the installer flow.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    pub title: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub source_link: String,
    pub completed_at: i64,
    #[serde(default)]
    pub installed_path: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StartJobRequest {
    pub title: String,
    pub source_link: String,
    pub output_folder: String,
    #[serde(default)]
    pub file_selection: Vec<String>,
    #[serde(default)]
    pub size_limit: bool,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Backend response to a job-start request.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StartedJob {
    pub id: String,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRuntimeErrorPayload {
    pub job_id: String,
    pub title: String,
    pub message: String,
}
