//! Research job routes
//!
//! - `POST /api/research/jobs`              create a job, returns `{jobId}`
//! - `GET  /api/research/jobs/:job_id`      job status
//! - `GET  /api/research/jobs/:job_id/events` SSE stream of an existing job
//! - `POST /api/research/stream`            create a job and stream it

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{sse::Event, Sse},
    Json,
};
use futures_util::stream::Stream;
use std::convert::Infallible;

use super::ApiError;
use crate::models::{CreateJobRequest, CreateJobResponse, JobStatusResponse, ResearchError};
use crate::server::stream::job_event_stream;
use crate::server::ServerAppState;

fn parse_request(
    body: Result<Json<CreateJobRequest>, JsonRejection>,
) -> Result<CreateJobRequest, ApiError> {
    match body {
        Ok(Json(request)) => Ok(request),
        Err(rejection) => Err(ResearchError::Validation(rejection.body_text()).into()),
    }
}

pub async fn create_job_handler(
    State(state): State<ServerAppState>,
    body: Result<Json<CreateJobRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateJobResponse>), ApiError> {
    let request = parse_request(body)?;
    let job_id = state.service.create_job(&request)?;
    Ok((StatusCode::ACCEPTED, Json(CreateJobResponse { job_id })))
}

pub async fn get_status_handler(
    State(state): State<ServerAppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    Ok(Json(state.service.get_status(&job_id)?))
}

pub async fn job_events_handler(
    State(state): State<ServerAppState>,
    Path(job_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let rx = state.service.subscribe(&job_id)?;
    Ok(job_event_stream(None, rx))
}

pub async fn stream_create_handler(
    State(state): State<ServerAppState>,
    body: Result<Json<CreateJobRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let request = parse_request(body)?;
    let subscription = state.service.create_job_subscribed(&request)?;
    log::info!("Streaming research job {}", subscription.job_id);
    Ok(job_event_stream(
        Some(subscription.snapshot),
        subscription.receiver,
    ))
}
