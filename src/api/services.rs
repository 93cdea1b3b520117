use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use tokio_stream::{Stream, StreamExt};

use crate::domain::{Job, JobEvent, JobStatus};
use crate::supervisor::SubmitOutcome;

use super::error::ApiError;
use super::models::{HealthResponse, JobStatusResponse, SubmitRequest, SubmitResponse};
use super::state::AppState;

pub async fn submit(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.supervisor.submit(req.into()).await?;
    Ok(submit_response(outcome))
}

pub async fn force_new(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<SubmitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let origin = addr.ip().to_string();
    let outcome = state.supervisor.force_new(req.into(), &origin).await?;
    Ok(submit_response(outcome))
}

fn submit_response(outcome: SubmitOutcome) -> (StatusCode, Json<SubmitResponse>) {
    match outcome {
        SubmitOutcome::Admitted { job_id } => (
            StatusCode::ACCEPTED,
            Json(SubmitResponse { job_id, status: crate::domain::JobStatus::Pending, result: None }),
        ),
        SubmitOutcome::Replayed { job_id, result } => (
            StatusCode::OK,
            Json(SubmitResponse { job_id, status: crate::domain::JobStatus::Completed, result: Some(result) }),
        ),
    }
}

pub async fn status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job = state.supervisor.status(&job_id)?;
    Ok(Json(job.into()))
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.supervisor.cancel(&job_id)?;
    Ok(StatusCode::ACCEPTED)
}

/// The terminal event a job's persisted row implies, if any. Used to replay
/// completion to a subscriber who connects after the job's live broadcast
/// channel has already been retired (spec §4.11: a late subscriber "MUST
/// still receive that terminal event by reading the persisted job state").
fn terminal_event_for(job: &Job) -> Option<JobEvent> {
    match job.status {
        JobStatus::Completed => job.result.clone().map(|result| JobEvent::Completed { result }),
        JobStatus::Failed => job.error.clone().map(|error| JobEvent::Failed { error }),
        JobStatus::Pending | JobStatus::Running => None,
    }
}

pub async fn stream(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    // Confirm the job exists before opening a stream; an unknown job_id is
    // a 404, not a stream that silently never emits anything.
    let job = state.supervisor.status(&job_id)?;

    // A job that already reached a terminal state no longer has a live
    // broadcast channel (the supervisor retires it once the worker is done),
    // so subscribing now would open a fresh, empty channel that never fires.
    // Replay the terminal event from the durable job row instead and close.
    if let Some(event) = terminal_event_for(&job) {
        let replay = tokio_stream::iter(Event::default().json_data(event).ok().map(Ok));
        return Ok(Sse::new(Box::pin(replay) as std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>)
            .keep_alive(KeepAlive::default()));
    }

    let events = state.events.subscribe(&job_id).filter_map(|item| match item {
        Ok(event) => Event::default().json_data(event).ok().map(Ok),
        Err(_lagged) => None,
    });

    Ok(Sse::new(Box::pin(events) as std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>)
        .keep_alive(KeepAlive::default()))
}

pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let document_store_reachable = state.supervisor.ledger().stats().is_ok();
    let stats = state
        .supervisor
        .ledger()
        .stats()
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    let broker_reachable = state.supervisor.broker().health_check();
    let available_providers =
        state.supervisor.providers().registry().select_order().len();
    let quota_utilization = state.supervisor.providers().max_quota_utilization();

    let status = if !broker_reachable || !document_store_reachable || available_providers == 0 {
        "unhealthy"
    } else if quota_utilization >= 1.0 {
        "degraded"
    } else {
        "healthy"
    };

    Ok(Json(HealthResponse {
        status,
        broker_reachable,
        document_store_reachable,
        available_providers,
        quota_utilization,
        job_count: stats.job_count,
        idempotency_count: stats.idem_count,
        degradation_count: stats.degradation_count,
    }))
}
