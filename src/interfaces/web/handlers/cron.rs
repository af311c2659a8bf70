use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::json;
use tracing::info;

use super::super::AppState;
use super::{Reply, failure, ok};
use crate::core::model::{CronAction, RedactedCronList};

pub async fn get_cron(State(state): State<AppState>) -> Reply {
    if let Some(snapshot) = state.services.cache.current() {
        return ok(json!({
            "ok": true,
            "cached": true,
            "updatedAtMs": snapshot.updated_at_ms,
            "jobs": snapshot.cron.jobs,
            "total": snapshot.cron.total,
        }));
    }
    match state.services.gateway.list_cron_jobs().await {
        Ok(list) => {
            let redacted = RedactedCronList::from_list(&list);
            ok(json!({
                "ok": true,
                "cached": false,
                "jobs": redacted.jobs,
                "total": redacted.total,
            }))
        }
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

pub async fn mutate_cron(
    Path((id, action)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Reply {
    let action: CronAction = match action.parse() {
        Ok(action) => action,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e),
    };

    info!("Cron {} requested for job {}", action.as_str(), id);
    match state.services.gateway.mutate_cron_job(&id, action).await {
        Ok(mutation) => {
            let mut body = json!({ "ok": true, "result": mutation.result });
            if let Some(stderr) = mutation.stderr {
                body["stderr"] = json!(stderr);
            }
            ok(body)
        }
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}
