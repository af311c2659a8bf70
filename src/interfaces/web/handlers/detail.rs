use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use tracing::warn;

use super::super::AppState;
use crate::core::anomaly::DETAIL_LINES;
use crate::core::error::ValidationError;

const TASK_SESSION_PREFIX: &str = "cc-";

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn render_page(session: &str, log: &str) -> String {
    format!(
        "<!doctype html><meta charset=\"utf-8\" />\n<title>{} detail log</title>\n\
         <pre style=\"white-space:pre-wrap;word-break:break-word;font-family:ui-monospace, Menlo, Consolas, monospace;\">{}</pre>",
        escape_html(session),
        escape_html(log)
    )
}

/// Full trailing log of one coding session, linked from idle-input alerts.
pub async fn session_detail(
    Path(session): Path<String>,
    State(state): State<AppState>,
) -> Response {
    if !session.starts_with(TASK_SESSION_PREFIX) {
        return (
            StatusCode::BAD_REQUEST,
            ValidationError::InvalidSessionName.to_string(),
        )
            .into_response();
    }

    match state.services.gateway.capture_log(&session, DETAIL_LINES).await {
        Ok(log) => Html(render_page(&session, &log)).into_response(),
        Err(e) => {
            warn!("Log capture for {} failed: {}", session, e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
