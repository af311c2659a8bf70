use axum::{Json, extract::State, http::StatusCode};
use serde_json::json;

use super::super::AppState;
use super::{Reply, failure, ok};
use crate::core::now_ms;

pub async fn get_overview(State(state): State<AppState>) -> Reply {
    let cache = &state.services.cache;
    let Some(snapshot) = cache.current() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "ok": false,
                "error": "Cache is warming up, retry shortly.",
                "lastError": cache.last_error().map(|e| (*e).clone()),
            })),
        );
    };
    let staleness = cache.staleness(now_ms(), state.stale_after_ms);

    ok(json!({
        "ok": true,
        "cached": true,
        "version": snapshot.version,
        "updatedAtMs": snapshot.updated_at_ms,
        "refreshDurationMs": snapshot.refresh_duration_ms,
        "activeMinutes": snapshot.active_minutes,
        "agents": snapshot.overview,
        "stale": staleness.as_ref().is_some_and(|s| s.stale),
        "ageMs": staleness.as_ref().map(|s| s.age_ms),
        "lastError": staleness.and_then(|s| s.last_error),
    }))
}

pub async fn get_agents(State(state): State<AppState>) -> Reply {
    if let Some(snapshot) = state.services.cache.current() {
        return ok(json!({
            "ok": true,
            "cached": true,
            "updatedAtMs": snapshot.updated_at_ms,
            "agents": snapshot.agents,
        }));
    }
    match state.services.gateway.list_agents().await {
        Ok(agents) => ok(json!({ "ok": true, "cached": false, "agents": agents })),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}
