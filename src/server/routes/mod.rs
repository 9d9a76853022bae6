//! HTTP routes
//!
//! - research_routes: job creation, status and event streams

pub mod research_routes;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use super::ServerAppState;
use crate::models::{ErrorResponse, ResearchError};

/// Error returned by route handlers, rendered as `{ "error": "..." }`
#[derive(Debug)]
pub struct ApiError(pub ResearchError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            ResearchError::Validation(_) => StatusCode::BAD_REQUEST,
            ResearchError::JobNotFound(_) => StatusCode::NOT_FOUND,
            ResearchError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ResearchError> for ApiError {
    fn from(err: ResearchError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::warn!("Request failed: {}", self.0);
        } else {
            log::debug!("Request rejected: {}", self.0);
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Research job routes
pub fn research_router() -> Router<ServerAppState> {
    Router::new()
        .route("/api/research/jobs", post(research_routes::create_job_handler))
        .route(
            "/api/research/jobs/:job_id",
            get(research_routes::get_status_handler),
        )
        .route(
            "/api/research/jobs/:job_id/events",
            get(research_routes::job_events_handler),
        )
        .route(
            "/api/research/stream",
            post(research_routes::stream_create_handler),
        )
}
