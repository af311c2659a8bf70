//! Records reported by the automation tool and the views derived from them.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

use crate::core::error::ValidationError;

/// Reads an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Named retention horizon for session queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionWindow {
    Day,
    Week,
    Month,
}

impl SessionWindow {
    pub const SECONDARY: [SessionWindow; 2] = [Self::Week, Self::Month];

    pub fn active_minutes(self) -> u32 {
        match self {
            Self::Day => 1440,
            Self::Week => 10080,
            Self::Month => 43200,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "24h",
            Self::Week => "7d",
            Self::Month => "30d",
        }
    }

    /// Unknown names fall back to the primary window.
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("7d") => Self::Week,
            Some("30d") => Self::Month,
            _ => Self::Day,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bindings: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding_details: Option<Vec<Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentRecord {
    pub fn display_name(&self) -> &str {
        self.identity_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.id)
    }

    /// Binding descriptors, preferring the detailed form.
    pub fn binding_descriptors(&self) -> &[Value] {
        self.binding_details
            .as_deref()
            .or(self.bindings.as_deref())
            .unwrap_or(&[])
    }
}

/// Kind encoded in a session key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    Direct,
    Cron,
    Run,
    Group,
    Channel,
}

impl KeyKind {
    pub fn of_key(key: &str) -> Self {
        if key.contains(":cron:") && key.contains(":run:") {
            Self::Run
        } else if key.contains(":cron:") {
            Self::Cron
        } else if key.contains(":group:") {
            Self::Group
        } else if key.contains(":channel:") {
            Self::Channel
        } else {
            Self::Direct
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub key: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub updated_at: Option<i64>,
    #[serde(default)]
    pub age_ms: Option<i64>,
    #[serde(default)]
    pub model_provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionRecord {
    pub fn key_kind(&self) -> KeyKind {
        KeyKind::of_key(&self.key)
    }

    pub fn tokens(&self) -> u64 {
        self.total_tokens.unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionList {
    #[serde(default, deserialize_with = "null_as_default")]
    pub sessions: Vec<SessionRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CronSchedule {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub expr: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronJobState {
    #[serde(default)]
    pub last_status: Option<String>,
    #[serde(default)]
    pub last_run_status: Option<String>,
    #[serde(default)]
    pub consecutive_errors: Option<u32>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub next_run_at_ms: Option<i64>,
    #[serde(default)]
    pub last_run_at_ms: Option<i64>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

impl CronJobState {
    /// Any one signal marks the job as failing.
    pub fn is_failing(&self) -> bool {
        self.last_status.as_deref() == Some("error")
            || self.last_run_status.as_deref() == Some("error")
            || self.consecutive_errors.unwrap_or(0) > 0
    }

    pub fn status_label(&self) -> &str {
        non_empty(&self.last_status)
            .or(non_empty(&self.last_run_status))
            .unwrap_or("error")
    }

    pub fn last_error(&self) -> Option<&str> {
        non_empty(&self.last_error)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronPayload {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronJobRecord {
    pub id: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub enabled: bool,
    #[serde(default)]
    pub schedule: Option<CronSchedule>,
    #[serde(default)]
    pub session_target: Option<Value>,
    #[serde(default)]
    pub wake_mode: Option<Value>,
    #[serde(default)]
    pub delivery: Option<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub state: CronJobState,
    #[serde(default)]
    pub payload: Option<CronPayload>,
}

impl CronJobRecord {
    pub fn title(&self) -> &str {
        non_empty(&self.name).unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CronJobList {
    #[serde(default, deserialize_with = "null_as_default")]
    pub jobs: Vec<CronJobRecord>,
    #[serde(default)]
    pub total: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactedPayload {
    pub kind: Option<String>,
    pub model: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// Cron job as exposed to readers: the payload body never leaves the process.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactedCronJob {
    pub id: String,
    pub agent_id: Option<String>,
    pub name: Option<String>,
    pub enabled: bool,
    pub schedule: Option<CronSchedule>,
    pub session_target: Option<Value>,
    pub wake_mode: Option<Value>,
    pub delivery: Option<Value>,
    pub state: CronJobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<RedactedPayload>,
}

impl From<&CronJobRecord> for RedactedCronJob {
    fn from(job: &CronJobRecord) -> Self {
        Self {
            id: job.id.clone(),
            agent_id: job.agent_id.clone(),
            name: job.name.clone(),
            enabled: job.enabled,
            schedule: job.schedule.clone(),
            session_target: job.session_target.clone(),
            wake_mode: job.wake_mode.clone(),
            delivery: job.delivery.clone(),
            state: job.state.clone(),
            payload: job.payload.as_ref().map(|p| RedactedPayload {
                kind: p.kind.clone(),
                model: p.model.clone(),
                timeout_seconds: p.timeout_seconds,
            }),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RedactedCronList {
    pub jobs: Vec<RedactedCronJob>,
    pub total: u64,
}

impl RedactedCronList {
    pub fn from_list(list: &CronJobList) -> Self {
        Self {
            jobs: list.jobs.iter().map(RedactedCronJob::from).collect(),
            total: list.total.unwrap_or(list.jobs.len() as u64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronAction {
    Enable,
    Disable,
    Run,
}

impl CronAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Run => "run",
        }
    }
}

impl FromStr for CronAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enable" => Ok(Self::Enable),
            "disable" => Ok(Self::Disable),
            "run" => Ok(Self::Run),
            _ => Err(ValidationError::InvalidCronAction),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CronMutation {
    pub result: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

/// Interactive coding session reported by the task lister.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub last_lines: Option<String>,
}

/// Per-agent aggregate shown on the overview.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSnapshot {
    pub agent_id: String,
    pub name: String,
    pub emoji: Option<String>,
    pub workspace: Option<String>,
    pub model: Option<String>,
    pub sessions_active: u64,
    pub tokens_24h: u64,
    pub cron_jobs: u64,
    pub cron_errors: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    CronError,
    TokenSpike,
    IdleInput,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CronError => "cron_error",
            Self::TokenSpike => "token_spike",
            Self::IdleInput => "idle_input",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkButton {
    pub text: String,
    pub url: String,
}
