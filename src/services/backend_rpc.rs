use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::errors::{LauncherError, Result};
use crate::models::{StartJobRequest, StartedJob, StatusSnapshot};

/// Invocation boundary to the external download backend. Everything the
/// tracker needs from the backend goes through this trait, so the lifecycle
/// code and its tests never depend on the HTTP transport.
#[async_trait]
pub trait BackendRpc: Send + Sync {
    async fn start_job(&self, request: &StartJobRequest) -> Result<String>;
    async fn fetch_job_stats(&self, job_id: &str) -> Result<StatusSnapshot>;
    async fn pause_job(&self, job_id: &str) -> Result<()>;
    async fn resume_job(&self, job_id: &str) -> Result<()>;
    async fn delete_job(&self, job_id: &str) -> Result<()>;
}

/// HTTP client for the local backend sidecar.
#[derive(Clone)]
pub struct HttpBackendRpc {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackendRpc {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .connect_timeout(Duration::from_secs(6))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let mut request = self.client.request(method, self.url(path));
        if let Some(payload) = body {
            request = request.json(&payload);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            // 410 from the stats endpoint means the backend dropped the job
            // (typically after a backend restart). That is the one fatal
            // signal the poller must react to.
            if status == StatusCode::GONE {
                return Err(LauncherError::TrackingStopped(text));
            }
            return Err(LauncherError::Http(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text
            )));
        }

        let value = response.json::<T>().await?;
        Ok(value)
    }
}

#[async_trait]
impl BackendRpc for HttpBackendRpc {
    async fn start_job(&self, request: &StartJobRequest) -> Result<String> {
        let payload = serde_json::to_value(request)?;
        let started: StartedJob = self.request(Method::POST, "jobs", Some(payload)).await?;
        Ok(started.id)
    }

    async fn fetch_job_stats(&self, job_id: &str) -> Result<StatusSnapshot> {
        self.request(Method::GET, &format!("jobs/{job_id}/stats"), None)
            .await
    }

    async fn pause_job(&self, job_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .request(
                Method::POST,
                &format!("jobs/{job_id}/pause"),
                Some(serde_json::json!({})),
            )
            .await?;
        Ok(())
    }

    async fn resume_job(&self, job_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .request(
                Method::POST,
                &format!("jobs/{job_id}/resume"),
                Some(serde_json::json!({})),
            )
            .await?;
        Ok(())
    }

    async fn delete_job(&self, job_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .request(Method::DELETE, &format!("jobs/{job_id}"), None)
            .await?;
        Ok(())
    }
}
