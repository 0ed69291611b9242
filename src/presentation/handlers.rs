// HTTP request handlers
use crate::application::dashboard_service::ServiceStopped;
use crate::domain::dashboard::DashboardSnapshot;
use crate::domain::telemetry::LogEvent;
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::Stream;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[derive(Deserialize)]
pub struct ConnectRequest {
    pub url: Option<String>,
}

#[derive(Deserialize)]
pub struct ServerUrlRequest {
    pub url: String,
}

#[derive(Deserialize)]
pub struct LimitRequest {
    pub limit: i64,
}

#[derive(Deserialize)]
pub struct ClearQuery {
    #[serde(default)]
    pub confirm: bool,
}

fn unavailable(e: ServiceStopped) -> StatusCode {
    tracing::error!("Request failed: {}", e);
    StatusCode::SERVICE_UNAVAILABLE
}

fn accepted(result: Result<(), ServiceStopped>) -> StatusCode {
    match result {
        Ok(()) => StatusCode::ACCEPTED,
        Err(e) => unavailable(e),
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Current dashboard snapshot
pub async fn get_snapshot(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DashboardSnapshot>, StatusCode> {
    state.dashboard.snapshot().await.map(Json).map_err(unavailable)
}

/// Server-sent events: the current snapshot, then every snapshot and log entry
pub async fn stream_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let mut snapshots = state.sink.subscribe_snapshots();
    let mut logs = state.sink.subscribe_logs();

    let stream = async_stream::stream! {
        let initial = snapshots.borrow_and_update().clone();
        yield Event::default().event("snapshot").json_data(&initial);

        loop {
            let event = tokio::select! {
                changed = snapshots.changed() => match changed {
                    Ok(()) => {
                        let snapshot = snapshots.borrow_and_update().clone();
                        Event::default().event("snapshot").json_data(&snapshot)
                    }
                    Err(_) => break,
                },
                entry = logs.recv() => match entry {
                    Ok(entry) => Event::default().event("log").json_data(&entry),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Event stream lagged, skipped {} log entries", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };
            yield event;
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Connect, optionally switching to a new server URL first
pub async fn connect(
    State(state): State<Arc<AppState>>,
    body: Option<Json<ConnectRequest>>,
) -> StatusCode {
    let url = body.and_then(|Json(request)| request.url);
    accepted(state.dashboard.connect(url).await)
}

pub async fn disconnect(State(state): State<Arc<AppState>>) -> StatusCode {
    accepted(state.dashboard.disconnect().await)
}

pub async fn set_server_url(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ServerUrlRequest>,
) -> StatusCode {
    accepted(state.dashboard.set_server_url(request.url).await)
}

pub async fn set_limit(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LimitRequest>,
) -> StatusCode {
    accepted(state.dashboard.set_capacity(request.limit).await)
}

/// Clear all retained readings. Requires `?confirm=true`.
pub async fn clear_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ClearQuery>,
) -> Response {
    if !query.confirm {
        return (
            StatusCode::BAD_REQUEST,
            "Pass confirm=true to clear all weight data",
        )
            .into_response();
    }

    accepted(state.dashboard.clear_history().await).into_response()
}

/// Download the retained history as CSV
pub async fn export_history(State(state): State<Arc<AppState>>) -> Response {
    match state.dashboard.export().await {
        Ok(Some(export)) => (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", export.filename),
                ),
            ],
            export.body,
        )
            .into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => unavailable(e).into_response(),
    }
}

/// Activity log, newest first
pub async fn activity_log(State(state): State<Arc<AppState>>) -> Json<Vec<LogEvent>> {
    Json(state.sink.activity())
}

pub async fn clear_activity_log(State(state): State<Arc<AppState>>) -> StatusCode {
    state.sink.clear_activity();
    StatusCode::NO_CONTENT
}
