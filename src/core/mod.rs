pub mod anomaly;
pub mod cache;
pub mod command;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod model;
pub mod monitor;
pub mod notify;
pub mod refresh;
pub mod store;
pub mod terminal;

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
