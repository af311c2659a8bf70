use axum::{
    extract::{Query, State},
    http::StatusCode,
};
use serde_json::{Value, json};

use super::super::AppState;
use super::{Reply, failure, merged, ok};
use crate::core::model::{SessionList, SessionWindow};

#[derive(serde::Deserialize)]
pub struct SessionsQuery {
    window: Option<String>,
}

/// Serialized list with each row tagged by the kind its key encodes.
fn with_key_kinds(list: &SessionList) -> Value {
    let mut value = json!(list);
    if let Some(rows) = value.get_mut("sessions").and_then(Value::as_array_mut) {
        for (row, session) in rows.iter_mut().zip(&list.sessions) {
            row["keyKind"] = json!(session.key_kind());
        }
    }
    value
}

/// Cached sessions for the window, or a direct fetch when that window has not
/// been collected yet.
pub async fn get_sessions(
    State(state): State<AppState>,
    Query(query): Query<SessionsQuery>,
) -> Reply {
    let window = SessionWindow::parse_lenient(query.window.as_deref());
    let head = json!({
        "ok": true,
        "window": window.as_str(),
        "activeMinutes": window.active_minutes(),
    });

    if let Some(entry) = state.services.cache.sessions(window) {
        let body = merged(
            head,
            json!({ "cached": true, "updatedAtMs": entry.updated_at_ms }),
        );
        return ok(merged(body, with_key_kinds(&entry.list)));
    }

    match state.services.gateway.list_sessions(window).await {
        Ok(list) => ok(merged(merged(head, json!({ "cached": false })), with_key_kinds(&list))),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}
