use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::{self, Stream};
use serde::Deserialize;
use tracing::{debug, info, warn};

use sifter_core::types::JobId;
use sifter_pipeline::JobInfo;

use crate::state::AppState;

// GET /api/health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Deserialize)]
pub struct SubmitBody {
    pub query: String,
}

// POST /api/jobs
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), StatusCode> {
    let query = body.query.trim();
    if query.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let job_id = state.runner.submit(query);
    info!(job_id = %job_id, "Job submitted via gateway");
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "job_id": job_id.to_string() })),
    ))
}

// GET /api/jobs
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<JobInfo>> {
    Json(state.runner.registry().list())
}

// GET /api/jobs/{id} (includes the candidates once the job has finished)
pub async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobInfo>, StatusCode> {
    state
        .runner
        .registry()
        .get(&JobId::from_string(&id))
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

// GET /api/jobs/{id}/events (one SSE message per job event, until `complete`)
pub async fn job_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let job_id = JobId::from_string(&id);
    let rx = state
        .runner
        .bus()
        .subscribe(&job_id)
        .ok_or(StatusCode::NOT_FOUND)?;
    debug!(job_id = %job_id, "Event stream opened");

    let events = stream::unfold(rx, |mut rx| async move {
        let envelope = rx.recv().await?;
        let data = match serde_json::to_string(&envelope.event) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize job event");
                String::from("{}")
            }
        };
        let event = Event::default()
            .event(envelope.event.kind())
            .id(envelope.seq.to_string())
            .data(data);
        Some((Ok(event), rx))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
