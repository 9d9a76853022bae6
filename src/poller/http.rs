// Job API client for a remote research server

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::JobApi;
use crate::models::{
    CreateJobRequest, CreateJobResponse, ErrorResponse, JobStatusResponse, ResearchError,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Talks to the research server's REST endpoints
pub struct HttpJobApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpJobApi {
    pub fn new(base_url: &str) -> Result<Self, ResearchError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ResearchError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn jobs_url(&self) -> String {
        format!("{}/api/research/jobs", self.base_url)
    }

    pub fn job_url(&self, job_id: &str) -> String {
        format!("{}/{}", self.jobs_url(), job_id)
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
        job_id: Option<&str>,
    ) -> Result<T, ResearchError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ResearchError::Transport(e.to_string()))?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| {
                ResearchError::MalformedResponse(format!("unexpected server response: {}", e))
            });
        }

        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error)
            .unwrap_or_else(|_| format!("HTTP {}", status.as_u16()));
        Err(error_for_status(status, message, job_id))
    }
}

/// Map the server's status codes back onto the error taxonomy
fn error_for_status(status: StatusCode, message: String, job_id: Option<&str>) -> ResearchError {
    match status {
        StatusCode::BAD_REQUEST => ResearchError::Validation(message),
        StatusCode::NOT_FOUND => {
            ResearchError::JobNotFound(job_id.map(str::to_string).unwrap_or(message))
        }
        StatusCode::SERVICE_UNAVAILABLE => ResearchError::Configuration(message),
        StatusCode::INTERNAL_SERVER_ERROR => ResearchError::Internal(message),
        // Gateways and proxies in front of the server
        s if s.is_server_error() || s == StatusCode::REQUEST_TIMEOUT => {
            ResearchError::Transport(format!("HTTP {}: {}", s.as_u16(), message))
        }
        _ => ResearchError::Internal(message),
    }
}

#[async_trait]
impl JobApi for HttpJobApi {
    async fn create_job(&self, request: &CreateJobRequest) -> Result<String, ResearchError> {
        let response = self
            .http
            .post(self.jobs_url())
            .json(request)
            .send()
            .await
            .map_err(|e| ResearchError::Transport(e.to_string()))?;

        let created: CreateJobResponse = Self::decode(response, None).await?;
        Ok(created.job_id)
    }

    async fn get_status(&self, job_id: &str) -> Result<JobStatusResponse, ResearchError> {
        let response = self
            .http
            .get(self.job_url(job_id))
            .send()
            .await
            .map_err(|e| ResearchError::Transport(e.to_string()))?;

        Self::decode(response, Some(job_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let api = HttpJobApi::new("http://localhost:3420/").unwrap();
        assert_eq!(api.jobs_url(), "http://localhost:3420/api/research/jobs");
        assert_eq!(
            api.job_url("research-1"),
            "http://localhost:3420/api/research/jobs/research-1"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            error_for_status(StatusCode::BAD_REQUEST, "empty".into(), None),
            ResearchError::Validation(_)
        ));
        assert_eq!(
            error_for_status(StatusCode::NOT_FOUND, "nope".into(), Some("research-1")),
            ResearchError::JobNotFound("research-1".to_string())
        );
        assert!(matches!(
            error_for_status(StatusCode::SERVICE_UNAVAILABLE, "no key".into(), None),
            ResearchError::Configuration(_)
        ));
        assert!(error_for_status(StatusCode::BAD_GATEWAY, "proxy".into(), None).is_transport());
        assert!(!error_for_status(StatusCode::INTERNAL_SERVER_ERROR, "bug".into(), None).is_transport());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport() {
        let api = HttpJobApi::new("http://127.0.0.1:9").unwrap();
        let err = api.get_status("research-1").await.unwrap_err();
        assert!(err.is_transport());
    }
}
