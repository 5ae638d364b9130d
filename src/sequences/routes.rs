//! REST endpoints for step submissions, page events, and the day-off
//! override.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::Error;
use crate::routing::routes::identity_from;
use crate::sequences::step::StepKey;
use crate::sequences::tracker::StepTracker;
use crate::store::model::PageEventKind;
use crate::support;

/// Shared state for sequence routes.
#[derive(Clone)]
pub struct SequenceRouteState {
    pub tracker: Arc<StepTracker>,
    pub support_chat_url: String,
}

#[derive(Debug, Deserialize)]
struct RespondBody {
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventBody {
    kind: String,
}

fn error_response(error: Error) -> axum::response::Response {
    let status = match &error {
        Error::Step(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({"error": error.to_string()}))).into_response()
}

fn bad_request(message: String) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": message})),
    )
        .into_response()
}

/// POST /api/steps/{key}/respond
///
/// Record a step response and return the next visible step (or sequence
/// completion).
async fn respond(
    State(state): State<SequenceRouteState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    Json(body): Json<RespondBody>,
) -> impl IntoResponse {
    let Some(identity) = identity_from(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let key: StepKey = match key.parse() {
        Ok(key) => key,
        Err(e) => return bad_request(e),
    };
    match state
        .tracker
        .respond(&identity.user_id, key, body.value.as_deref())
        .await
    {
        Ok(outcome) => Json(outcome).into_response(),
        Err(error) => error_response(error),
    }
}

/// POST /api/steps/{key}/events
///
/// Append a view/interaction event. Help-class events return the support
/// deep link for the client to open.
async fn record_event(
    State(state): State<SequenceRouteState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    Json(body): Json<EventBody>,
) -> impl IntoResponse {
    let Some(identity) = identity_from(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let key: StepKey = match key.parse() {
        Ok(key) => key,
        Err(e) => return bad_request(e),
    };
    let Some(kind) = PageEventKind::parse(&body.kind) else {
        return bad_request(format!("unknown event kind: {}", body.kind));
    };

    if let Err(error) = state.tracker.record_event(&identity.user_id, key, kind).await {
        return error_response(error);
    }

    let support_url = kind
        .wants_support()
        .then(|| support::support_link(&state.support_chat_url, &identity.email, key, kind));
    Json(serde_json::json!({"support_url": support_url})).into_response()
}

/// POST /api/day-off/override
///
/// Mark today's scheduled day off as a work day.
async fn override_day_off(
    State(state): State<SequenceRouteState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let Some(identity) = identity_from(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match state.tracker.override_day_off(&identity.user_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

/// Build the sequence REST routes.
pub fn sequence_routes(state: SequenceRouteState) -> Router {
    Router::new()
        .route("/api/steps/{key}/respond", post(respond))
        .route("/api/steps/{key}/events", post(record_event))
        .route("/api/day-off/override", post(override_day_off))
        .with_state(state)
}
