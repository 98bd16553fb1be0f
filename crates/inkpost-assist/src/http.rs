//! HTTP client for the discrete-job endpoints.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use inkpost_core::{JobStatus, JobSubmission, JobSubmitted, TaskId};

use crate::error::AssistError;
use crate::transport::JobClient;

/// [`JobClient`] over the REST job API.
///
/// - `POST {base}/api/ai/jobs` submits a job.
/// - `GET {base}/api/ai/jobs/{taskId}` reads its status.
#[derive(Debug, Clone)]
pub struct HttpJobClient {
    inner: reqwest::Client,
    base_url: String,
}

impl HttpJobClient {
    /// Create a new HTTP client.
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Use a preconfigured reqwest client (timeouts, headers).
    pub fn with_client(inner: reqwest::Client, base_url: &str) -> Self {
        Self {
            inner,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if the API is healthy.
    pub async fn health(&self) -> Result<bool, AssistError> {
        let url = format!("{}/health", self.base_url);
        debug!(url = %url, "Checking health");

        let response = self.inner.get(&url).send().await?;
        Ok(response.status().is_success())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AssistError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "GET request");

        let response = self.inner.get(&url).send().await?;
        Self::decode(response, path).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AssistError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "POST request");

        let response = self.inner.post(&url).json(body).send().await?;
        Self::decode(response, path).await
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
        path: &str,
    ) -> Result<T, AssistError> {
        let status = response.status();
        if !status.is_success() {
            return Err(AssistError::HttpStatus {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl JobClient for HttpJobClient {
    async fn submit(&self, submission: &JobSubmission) -> Result<TaskId, AssistError> {
        let submitted: JobSubmitted = self.post_json("/api/ai/jobs", submission).await?;
        debug!(task_id = %submitted.task_id, kind = %submission.kind, "Job submitted");
        Ok(submitted.task_id)
    }

    async fn status(&self, task_id: &TaskId) -> Result<JobStatus, AssistError> {
        self.get_json(&format!("/api/ai/jobs/{}", task_id)).await
    }
}
