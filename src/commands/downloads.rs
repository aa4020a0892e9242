use std::sync::Arc;

use tauri::State;

use crate::models::{CompletionRecord, DownloadJob, StartJobRequest};
use crate::AppState;

#[tauri::command]
pub async fn start_download(
    payload: StartJobRequest,
    state: State<'_, Arc<AppState>>,
) -> Result<DownloadJob, String> {
    state
        .lifecycle
        .start_download(payload)
        .await
        .map_err(|err| err.to_string())
}

#[tauri::command]
pub async fn pause_download(
    job_id: String,
    state: State<'_, Arc<AppState>>,
) -> Result<(), String> {
    state
        .lifecycle
        .pause_download(&job_id)
        .await
        .map_err(|err| err.to_string())
}

#[tauri::command]
pub async fn resume_download(
    job_id: String,
    state: State<'_, Arc<AppState>>,
) -> Result<(), String> {
    state
        .lifecycle
        .resume_download(&job_id)
        .await
        .map_err(|err| err.to_string())
}

#[tauri::command]
pub async fn stop_download(
    job_id: String,
    state: State<'_, Arc<AppState>>,
) -> Result<(), String> {
    state
        .lifecycle
        .stop_download(&job_id)
        .await
        .map_err(|err| err.to_string())
}

#[tauri::command]
pub fn get_active_downloads(
    state: State<'_, Arc<AppState>>,
) -> Result<Vec<DownloadJob>, String> {
    state
        .lifecycle
        .active_downloads()
        .map_err(|err| err.to_string())
}

#[tauri::command]
pub fn get_primary_download(
    state: State<'_, Arc<AppState>>,
) -> Result<Option<DownloadJob>, String> {
    state
        .lifecycle
        .primary_download()
        .map_err(|err| err.to_string())
}

#[tauri::command]
pub async fn get_completed_downloads(
    state: State<'_, Arc<AppState>>,
) -> Result<Vec<CompletionRecord>, String> {
    Ok(state.lifecycle.completed_downloads().await)
}

#[tauri::command]
pub async fn restore_tracked_downloads(
    state: State<'_, Arc<AppState>>,
) -> Result<(), String> {
    state
        .lifecycle
        .restore_tracked()
        .await
        .map_err(|err| err.to_string())
}
