use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LauncherError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Storage error: {0}")]
    Storage(String),
    /// The backend reports it no longer tracks the job. This is the one
    /// fatal poll signal; every other fetch failure is transient.
    #[error("Tracking stopped: {0}")]
    TrackingStopped(String),
}

impl LauncherError {
    pub fn is_tracking_stopped(&self) -> bool {
        matches!(self, Self::TrackingStopped(_))
    }
}

pub type Result<T> = std::result::Result<T, LauncherError>;
