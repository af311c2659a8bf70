pub mod cron;
pub mod detail;
pub mod overview;
pub mod routing;
pub mod sessions;
pub mod trends;

use axum::{Json, http::StatusCode};
use serde_json::{Value, json};
use std::fmt::Display;

pub(crate) type Reply = (StatusCode, Json<Value>);

pub(crate) fn ok(body: Value) -> Reply {
    (StatusCode::OK, Json(body))
}

pub(crate) fn failure(status: StatusCode, error: impl Display) -> Reply {
    (
        status,
        Json(json!({ "ok": false, "error": error.to_string() })),
    )
}

/// Merges `extra` fields into a JSON object body.
pub(crate) fn merged(mut body: Value, extra: Value) -> Value {
    if let (Some(target), Value::Object(fields)) = (body.as_object_mut(), extra) {
        for (key, value) in fields {
            target.entry(key).or_insert(value);
        }
    }
    body
}
