use serde::Serialize;

use crate::core::model::{AgentSnapshot, CronJobRecord};

/// One per-agent aggregate sample, keyed by `(ts_ms, agent_id)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentMetricRow {
    pub ts_ms: i64,
    pub agent_id: String,
    pub sessions_active: i64,
    pub tokens_24h_total: i64,
    pub cron_jobs: i64,
    pub cron_errors: i64,
}

impl AgentMetricRow {
    pub fn sample(ts_ms: i64, agent: &AgentSnapshot) -> Self {
        Self {
            ts_ms,
            agent_id: agent.agent_id.clone(),
            sessions_active: clamp(agent.sessions_active),
            tokens_24h_total: clamp(agent.tokens_24h),
            cron_jobs: clamp(agent.cron_jobs),
            cron_errors: clamp(agent.cron_errors),
        }
    }
}

/// Full job state at one tick, keyed by `(ts_ms, job_id)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CronJobMetricRow {
    pub ts_ms: i64,
    pub job_id: String,
    pub agent_id: Option<String>,
    pub enabled: bool,
    pub schedule_kind: Option<String>,
    pub schedule_expr: Option<String>,
    pub last_status: Option<String>,
    pub last_run_status: Option<String>,
    pub consecutive_errors: i64,
    pub last_error: Option<String>,
    pub next_run_at_ms: Option<i64>,
    pub last_run_at_ms: Option<i64>,
}

impl CronJobMetricRow {
    pub fn sample(ts_ms: i64, job: &CronJobRecord) -> Self {
        let state = &job.state;
        let schedule = job.schedule.as_ref();
        Self {
            ts_ms,
            job_id: job.id.clone(),
            agent_id: job.agent_id.clone(),
            enabled: job.enabled,
            schedule_kind: schedule.and_then(|s| s.kind.clone()),
            schedule_expr: schedule.and_then(|s| s.expr.clone()),
            last_status: state.last_status.clone(),
            last_run_status: state.last_run_status.clone(),
            consecutive_errors: i64::from(state.consecutive_errors.unwrap_or(0)),
            last_error: state.last_error().map(str::to_string),
            next_run_at_ms: state.next_run_at_ms,
            last_run_at_ms: state.last_run_at_ms,
        }
    }
}

/// Write-once audit record of an issued alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEventRow {
    pub ts_ms: i64,
    pub event_key: String,
    pub kind: String,
    pub agent_id: Option<String>,
    pub title: Option<String>,
    pub message: String,
}

fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
