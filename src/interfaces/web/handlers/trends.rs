use axum::{
    extract::{Query, State},
    http::StatusCode,
};
use serde_json::json;

use super::super::AppState;
use super::{Reply, failure, ok};
use crate::core::error::ValidationError;
use crate::core::now_ms;
use crate::core::store::{MetricsStore, window_start};

const DEFAULT_DAYS: u32 = 7;

#[derive(serde::Deserialize)]
pub struct TrendsQuery {
    days: Option<String>,
}

fn parse_days(raw: Option<&str>) -> Result<u32, ValidationError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(DEFAULT_DAYS),
        Some(s) => s
            .parse::<u32>()
            .ok()
            .filter(|d| *d > 0)
            .ok_or(ValidationError::InvalidDays),
    }
}

/// Validates the request and resolves the store, or produces the error reply.
fn prepare<'a>(state: &'a AppState, query: &TrendsQuery) -> Result<(u32, &'a MetricsStore), Reply> {
    let days = parse_days(query.days.as_deref()).map_err(|e| failure(StatusCode::BAD_REQUEST, e))?;
    let store = state
        .services
        .store
        .as_ref()
        .ok_or_else(|| failure(StatusCode::SERVICE_UNAVAILABLE, "metrics store unavailable"))?;
    Ok((days, store))
}

pub async fn agent_metrics(
    State(state): State<AppState>,
    Query(query): Query<TrendsQuery>,
) -> Reply {
    let (days, store) = match prepare(&state, &query) {
        Ok(found) => found,
        Err(reply) => return reply,
    };
    match store.query_agent_metrics(window_start(days, now_ms())).await {
        Ok(rows) => ok(json!({ "ok": true, "days": days, "rows": rows })),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

pub async fn cron_job_metrics(
    State(state): State<AppState>,
    Query(query): Query<TrendsQuery>,
) -> Reply {
    let (days, store) = match prepare(&state, &query) {
        Ok(found) => found,
        Err(reply) => return reply,
    };
    match store.query_cron_job_metrics(window_start(days, now_ms())).await {
        Ok(rows) => ok(json!({ "ok": true, "days": days, "rows": rows })),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

pub async fn alert_events(
    State(state): State<AppState>,
    Query(query): Query<TrendsQuery>,
) -> Reply {
    let (days, store) = match prepare(&state, &query) {
        Ok(found) => found,
        Err(reply) => return reply,
    };
    match store.query_alert_events(window_start(days, now_ms())).await {
        Ok(rows) => ok(json!({ "ok": true, "days": days, "rows": rows })),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_default_and_validation() {
        assert_eq!(parse_days(None), Ok(7));
        assert_eq!(parse_days(Some("")), Ok(7));
        assert_eq!(parse_days(Some("30")), Ok(30));
        assert_eq!(parse_days(Some("0")), Err(ValidationError::InvalidDays));
        assert_eq!(parse_days(Some("-2")), Err(ValidationError::InvalidDays));
        assert_eq!(parse_days(Some("week")), Err(ValidationError::InvalidDays));
    }
}
