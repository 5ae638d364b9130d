//! REST endpoints for the routing check and the user profile.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::store::Database;
use crate::store::model::UserProfile;

use super::resolver::{Identity, Resolver};

/// Shared state for routing routes.
#[derive(Clone)]
pub struct RoutingRouteState {
    pub resolver: Arc<Resolver>,
    pub db: Arc<dyn Database>,
}

/// Pull the caller's identity from the request headers.
///
/// Session/token validation is fully external; by the time a request
/// reaches us, the reverse proxy has resolved it to these headers.
pub fn identity_from(headers: &HeaderMap) -> Option<Identity> {
    let user_id = headers.get("x-user-id")?.to_str().ok()?.to_string();
    if user_id.is_empty() {
        return None;
    }
    let email = headers
        .get("x-user-email")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    Some(Identity { user_id, email })
}

/// GET /api/route
///
/// The routing check: `{ "redirect": string|null, "reason": string }`.
/// Called by the client poll and by server-rendered entry pages.
async fn get_route(State(state): State<RoutingRouteState>, headers: HeaderMap) -> impl IntoResponse {
    let identity = identity_from(&headers);
    let decision = state.resolver.resolve(identity.as_ref()).await;
    Json(decision)
}

/// POST /api/profile
///
/// Signup: create (or refresh) the profile row for the authenticated user.
async fn post_profile(
    State(state): State<RoutingRouteState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let Some(identity) = identity_from(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    // Keep an existing row (and its creation timestamp) intact.
    match state.db.get_profile(&identity.user_id).await {
        Ok(Some(existing)) => return (StatusCode::OK, Json(existing)).into_response(),
        Ok(None) => {}
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response();
        }
    }

    let profile = UserProfile::new(identity.user_id, identity.email);
    match state.db.upsert_profile(&profile).await {
        Ok(()) => (StatusCode::CREATED, Json(profile)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

/// GET /api/profile
async fn get_profile(
    State(state): State<RoutingRouteState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let Some(identity) = identity_from(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match state.db.get_profile(&identity.user_id).await {
        Ok(Some(profile)) => Json(profile).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "No profile exists yet"})),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

/// Build the routing REST routes.
pub fn routing_routes(state: RoutingRouteState) -> Router {
    Router::new()
        .route("/api/route", get(get_route))
        .route("/api/profile", post(post_profile).get(get_profile))
        .with_state(state)
}
