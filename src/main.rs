#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod backend_sidecar;
mod commands;
mod errors;
mod logging;
mod models;
mod services;
mod utils;

use std::sync::Arc;
use std::time::Duration;

use tauri::{Emitter, Manager};

use crate::errors::Result;
use crate::models::{DownloadJob, DownloadRuntimeErrorPayload};
use crate::services::{
    CompletionLedger, HttpBackendRpc, JobEventSink, LifecycleOrchestrator, StatusPoller,
    TrackedJobStore, DEFAULT_POLL_INTERVAL_MS,
};
use crate::utils::paths::resolve_data_dir;

const COMPLETED_DOWNLOADS_FILE: &str = "completed_downloads.json";
const TRACKED_DOWNLOADS_FILE: &str = "tracked_downloads.json";

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: LifecycleOrchestrator,
}

/// Forwards lifecycle notifications to the webview as Tauri events.
struct TauriEventSink {
    app: tauri::AppHandle,
}

impl JobEventSink for TauriEventSink {
    fn primary_changed(&self, job: Option<&DownloadJob>) {
        if let Err(err) = self.app.emit("download-primary-changed", job) {
            tracing::warn!("failed to emit download-primary-changed: {}", err);
        }
    }

    fn job_list_changed(&self, jobs: &[DownloadJob]) {
        if let Err(err) = self.app.emit("download-list-changed", jobs) {
            tracing::warn!("failed to emit download-list-changed: {}", err);
        }
    }

    fn runtime_error(&self, payload: &DownloadRuntimeErrorPayload) {
        if let Err(err) = self.app.emit("download-runtime-error", payload) {
            tracing::warn!("failed to emit download-runtime-error: {}", err);
        }
    }
}

fn show_main_window(app: &tauri::AppHandle) {
    if let Some(main_window) = app.get_webview_window("main") {
        let _ = main_window.show();
        let _ = main_window.unminimize();
        let _ = main_window.set_focus();
    }
}

fn poll_interval() -> Duration {
    let millis = std::env::var("HARBOR_POLL_INTERVAL_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
    Duration::from_millis(millis)
}

fn build_state(app: &tauri::AppHandle) -> Result<AppState> {
    let data_dir = resolve_data_dir(app);

    let api_url =
        std::env::var("HARBOR_API_URL").unwrap_or_else(|_| "http://127.0.0.1:7800".to_string());
    let backend = Arc::new(HttpBackendRpc::new(api_url));

    let poller = StatusPoller::new(backend.clone(), poll_interval());
    let ledger = CompletionLedger::new(data_dir.join(COMPLETED_DOWNLOADS_FILE));
    let tracked = TrackedJobStore::new(data_dir.join(TRACKED_DOWNLOADS_FILE));
    let events = Arc::new(TauriEventSink { app: app.clone() });

    let lifecycle = LifecycleOrchestrator::new(backend, poller, ledger, tracked, events);
    Ok(AppState { lifecycle })
}

fn main() {
    tauri::Builder::default()
        .plugin(tauri_plugin_single_instance::init(|app, _args, _cwd| {
            show_main_window(app);
        }))
        .plugin(tauri_plugin_dialog::init())
        .setup(|app| {
            let handle = app.handle();

            // Initialize logging first so setup failures are recorded.
            let log_dir = utils::paths::resolve_log_dir(handle);
            logging::init(&log_dir)?;

            // Start the bundled backend (if present) before the HTTP client
            // reads HARBOR_API_URL.
            let backend_child = backend_sidecar::spawn_backend(handle)?;

            let state = Arc::new(build_state(handle)?);
            app.manage(state.clone());

            // The guard kills the backend when the app exits.
            if let Some(child) = backend_child {
                app.manage(backend_sidecar::BackendProcess::new(child));
            }

            // Resume tracking of downloads that were in flight at last exit.
            tauri::async_runtime::spawn(async move {
                if let Err(err) = state.lifecycle.restore_tracked().await {
                    tracing::error!("failed to restore tracked downloads: {}", err);
                }
            });
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::downloads::start_download,
            commands::downloads::pause_download,
            commands::downloads::resume_download,
            commands::downloads::stop_download,
            commands::downloads::get_active_downloads,
            commands::downloads::get_primary_download,
            commands::downloads::get_completed_downloads,
            commands::downloads::restore_tracked_downloads,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
