use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;

use tauri::Manager;

use crate::errors::{LauncherError, Result};
use crate::utils::paths::{resolve_data_dir, resolve_log_dir};

/// Windows flag to create process without a visible console window.
#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

#[cfg(target_os = "windows")]
const BACKEND_EXE_NAME: &str = "harbor-backend.exe";
#[cfg(not(target_os = "windows"))]
const BACKEND_EXE_NAME: &str = "harbor-backend";

const DEFAULT_BACKEND_PORT: u16 = 7800;

/// Holds the backend child process and guarantees it is terminated when the
/// app exits.
pub struct BackendProcess(std::sync::Mutex<Option<Child>>);

impl BackendProcess {
    pub fn new(child: Child) -> Self {
        Self(std::sync::Mutex::new(Some(child)))
    }

    pub fn terminate(&self) {
        if let Ok(mut guard) = self.0.lock() {
            if let Some(mut child) = guard.take() {
                // Kill the full process tree on Windows; the backend may
                // spawn its own children.
                #[cfg(target_os = "windows")]
                {
                    let _ = Command::new("taskkill")
                        .args(["/PID", &child.id().to_string(), "/T", "/F"])
                        .creation_flags(CREATE_NO_WINDOW)
                        .status();
                }
                let _ = child.kill();
            }
        }
    }
}

impl Drop for BackendProcess {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn is_running(host: &str, port: u16) -> bool {
    let url = format!("http://{host}:{port}/health");
    reqwest::blocking::get(url)
        .map(|response| response.status().is_success())
        .unwrap_or(false)
}

fn can_bind_local_port(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_ok()
}

fn pick_fallback_port(preferred: u16) -> Option<u16> {
    for candidate in preferred.saturating_add(1)..=preferred.saturating_add(16) {
        if can_bind_local_port(candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Start the bundled download backend unless one is already reachable.
/// Publishes the resulting base URL through `HARBOR_API_URL` so the HTTP
/// client picks it up.
pub fn spawn_backend(app: &tauri::AppHandle) -> Result<Option<Child>> {
    // A custom URL means the user manages the backend themselves.
    if std::env::var("HARBOR_API_URL").is_ok() {
        tracing::info!("HARBOR_API_URL is set, skipping backend auto-start");
        return Ok(None);
    }

    let base_port: u16 = std::env::var("HARBOR_BACKEND_PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(DEFAULT_BACKEND_PORT);
    let mut spawn_port = base_port;

    if is_running("127.0.0.1", base_port) {
        tracing::info!(
            "backend already running on port {}, skipping spawn",
            base_port
        );
        std::env::set_var("HARBOR_API_URL", format!("http://127.0.0.1:{base_port}"));
        return Ok(None);
    }

    if !can_bind_local_port(base_port) {
        if let Some(fallback_port) = pick_fallback_port(base_port) {
            tracing::warn!(
                "port {} is unavailable; switching backend sidecar to fallback port {}",
                base_port,
                fallback_port
            );
            spawn_port = fallback_port;
        } else {
            tracing::warn!(
                "port {} is unavailable and no fallback port is free; keeping default API URL",
                base_port
            );
        }
    }

    let resource_dir = app
        .path()
        .resource_dir()
        .map_err(|_| LauncherError::Config("resource dir unavailable".to_string()))?;
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|path| path.parent().map(|dir| dir.to_path_buf()));

    let mut exe_candidates = vec![
        resource_dir.join(BACKEND_EXE_NAME),
        resource_dir.join("backend").join(BACKEND_EXE_NAME),
    ];
    if let Some(dir) = &exe_dir {
        exe_candidates.push(dir.join("backend").join(BACKEND_EXE_NAME));
        exe_candidates.push(dir.join("resources").join("backend").join(BACKEND_EXE_NAME));
    }
    if let Ok(app_local) = app.path().app_local_data_dir() {
        exe_candidates.push(app_local.join(BACKEND_EXE_NAME));
    }

    let exe_path = match exe_candidates.iter().find(|path| path.exists()) {
        Some(path) => {
            tracing::info!("found backend executable at {:?}", path);
            path.clone()
        }
        None => {
            // The launcher stays usable without the sidecar; the UI just
            // shows the API as offline.
            tracing::warn!(
                "backend sidecar missing, searched {:?}, skipping auto-start",
                exe_candidates
                    .iter()
                    .map(|path| path.display().to_string())
                    .collect::<Vec<_>>()
            );
            return Ok(None);
        }
    };

    let data_dir = resolve_data_dir(app);
    std::fs::create_dir_all(&data_dir)
        .map_err(|err| LauncherError::Config(format!("failed to create data dir: {err}")))?;

    let log_dir = resolve_log_dir(app);
    let log_path = log_dir.join("backend.log");
    let stdout_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|err| LauncherError::Config(format!("failed to open backend.log: {err}")))?;
    let stderr_file = stdout_file
        .try_clone()
        .map_err(|err| LauncherError::Config(format!("failed to clone backend.log handle: {err}")))?;

    let mut cmd = Command::new(exe_path);
    cmd.arg("--host")
        .arg("127.0.0.1")
        .arg("--port")
        .arg(spawn_port.to_string())
        .current_dir(&data_dir)
        .env("HARBOR_DATA_DIR", data_dir.to_string_lossy().to_string())
        .env("HARBOR_BACKEND_PORT", spawn_port.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout_file))
        .stderr(Stdio::from(stderr_file));

    #[cfg(target_os = "windows")]
    cmd.creation_flags(CREATE_NO_WINDOW);

    tracing::info!("spawning backend sidecar on port {}", spawn_port);
    let child = cmd
        .spawn()
        .map_err(|err| LauncherError::Config(format!("failed to spawn backend: {err}")))?;

    for _ in 0..40 {
        if is_running("127.0.0.1", spawn_port) {
            std::env::set_var("HARBOR_API_URL", format!("http://127.0.0.1:{spawn_port}"));
            tracing::info!("backend sidecar is ready on 127.0.0.1:{}", spawn_port);
            return Ok(Some(child));
        }
        std::thread::sleep(Duration::from_millis(250));
    }

    if let Ok(log_content) = std::fs::read_to_string(&log_path) {
        let last_lines: Vec<&str> = log_content.lines().rev().take(20).collect();
        let tail: Vec<&str> = last_lines.into_iter().rev().collect();
        tracing::error!("backend log tail:\n{}", tail.join("\n"));
    }

    // Not ready yet; keep the launcher running and let the client retry.
    tracing::warn!(
        "backend sidecar started but did not become ready in time (port {})",
        spawn_port
    );
    Ok(Some(child))
}
