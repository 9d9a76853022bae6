//! Server-sent event stream for a single job
//!
//! Named events: `progress {percent, status}` while the job runs, then
//! exactly one `complete {research}` or `error {error}`, after which the
//! stream ends. A completed job always reports `progress` at 100 before
//! `complete`. A subscriber attaching late first receives the job's
//! current state.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream};
use serde_json::{json, Value};
use std::convert::Infallible;
use tokio::sync::{mpsc, watch};

use crate::models::{JobStatus, ProgressEvent, ResearchJob};

/// One event on a job stream
#[derive(Debug, Clone, PartialEq)]
pub enum JobStreamEvent {
    Progress(ProgressEvent),
    Complete { research: String },
    Error { error: String },
}

impl JobStreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            JobStreamEvent::Progress(_) => "progress",
            JobStreamEvent::Complete { .. } => "complete",
            JobStreamEvent::Error { .. } => "error",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            JobStreamEvent::Progress(progress) => {
                json!({ "percent": progress.percent, "status": progress.message })
            }
            JobStreamEvent::Complete { research } => json!({ "research": research }),
            JobStreamEvent::Error { error } => json!({ "error": error }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStreamEvent::Progress(_))
    }

    fn into_sse(self) -> Event {
        Event::default().event(self.name()).data(self.payload().to_string())
    }
}

/// Events implied by a job snapshot, given the last percent already sent
pub fn events_for(job: &ResearchJob, last_percent: &mut Option<u8>) -> Vec<JobStreamEvent> {
    let mut events = Vec::new();

    match job.status {
        JobStatus::Completed => {
            if last_percent.map_or(true, |p| p < job.progress) {
                *last_percent = Some(job.progress);
                events.push(JobStreamEvent::Progress(job.progress_event()));
            }
            events.push(JobStreamEvent::Complete {
                research: job.result.clone().unwrap_or_default(),
            });
        }
        JobStatus::Failed => {
            events.push(JobStreamEvent::Error {
                error: job
                    .error
                    .clone()
                    .unwrap_or_else(|| "Research failed".to_string()),
            });
        }
        JobStatus::Pending | JobStatus::Processing => {
            if last_percent.map_or(true, |p| job.progress > p) {
                *last_percent = Some(job.progress);
                events.push(JobStreamEvent::Progress(job.progress_event()));
            }
        }
    }

    events
}

/// Send the events implied by `job`; false once the client has gone away
async fn forward(
    tx: &mpsc::Sender<JobStreamEvent>,
    job: &ResearchJob,
    last_percent: &mut Option<u8>,
) -> bool {
    for event in events_for(job, last_percent) {
        if tx.send(event).await.is_err() {
            log::debug!("Event stream for {} closed by client", job.id);
            return false;
        }
    }
    true
}

/// Follow a job until its terminal event. `initial` is a snapshot taken
/// before the receiver could observe later changes, and is sent first.
pub fn job_event_stream(
    initial: Option<ResearchJob>,
    mut rx: watch::Receiver<ResearchJob>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, out_rx) = mpsc::channel::<JobStreamEvent>(32);

    tokio::spawn(async move {
        let mut last_percent = None;
        if let Some(job) = initial {
            if !forward(&tx, &job, &mut last_percent).await || job.is_terminal() {
                return;
            }
        }
        loop {
            let job = rx.borrow_and_update().clone();
            if !forward(&tx, &job, &mut last_percent).await {
                return;
            }
            if job.is_terminal() || rx.changed().await.is_err() {
                return;
            }
        }
    });

    let events = stream::unfold(out_rx, |mut out_rx| async move {
        out_rx
            .recv()
            .await
            .map(|event| (Ok(event.into_sse()), out_rx))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
