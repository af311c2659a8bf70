//! Alert rules evaluated on every anomaly tick.
//!
//! The detector re-queries live state instead of reading the snapshot cache, so a
//! stalled refresh cycle cannot hide a failing job. Rules are pure functions over
//! the observed state; only the idle rule touches the cooldown document, and only
//! its idle timers.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::warn;

use crate::core::cooldown::CooldownState;
use crate::core::gateway::OpsGateway;
use crate::core::model::{
    AlertKind, CronJobRecord, LinkButton, SessionRecord, SessionWindow, TaskDescriptor,
};

const PROMPT_GLYPH: &str = "❯";
const TOKEN_BUCKET: u64 = 10_000;
const SNIPPET_LINES: usize = 10;
pub const DETAIL_LINES: usize = 200;

/// Logical delivery target; resolved to an account by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    General,
    /// Coding-session channel; renders link buttons.
    Secondary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertCandidate {
    pub dedup_key: String,
    pub kind: AlertKind,
    pub agent_id: Option<String>,
    pub title: String,
    pub message: String,
    pub destination: Destination,
    pub buttons: Option<Vec<Vec<LinkButton>>>,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub token_threshold: u64,
    pub idle_threshold_ms: i64,
    pub public_url: String,
    pub coding_agent_id: String,
}

/// Live state gathered at the start of a tick. Failed sources are empty.
#[derive(Debug, Clone, Default)]
pub struct Observation {
    pub jobs: Vec<CronJobRecord>,
    pub sessions: Vec<SessionRecord>,
    pub tasks: Vec<TaskDescriptor>,
}

/// The last non-blank line is the prompt glyph alone, or the glyph and a space.
pub fn looks_idle_prompt(last_lines: &str) -> bool {
    last_lines
        .lines()
        .map(str::trim)
        .rev()
        .find(|l| !l.is_empty())
        .is_some_and(|last| last == PROMPT_GLYPH || last.starts_with("❯ "))
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n").trim_end().to_string()
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn human_duration(ms: i64) -> String {
    if ms >= 60_000 && ms % 60_000 == 0 {
        format!("{}m", ms / 60_000)
    } else {
        format!("{}s", ms / 1000)
    }
}

fn dashboard_url(public_url: &str) -> String {
    format!("{}/", public_url.trim_end_matches('/'))
}

pub fn cron_failures(jobs: &[CronJobRecord], public_url: &str) -> Vec<AlertCandidate> {
    jobs.iter()
        .filter(|job| job.state.is_failing())
        .map(|job| {
            let state = &job.state;
            let label = state.status_label();
            let agent = job.agent_id.as_deref().unwrap_or("-");
            AlertCandidate {
                dedup_key: format!(
                    "p0:cron:{}:{}:{}",
                    job.id,
                    state.last_run_at_ms.unwrap_or(0),
                    label
                ),
                kind: AlertKind::CronError,
                agent_id: job.agent_id.clone(),
                title: format!("Cron job failing: {}", job.title()),
                message: format!(
                    "[P0] Cron job failing: {}\n- job: {}\n- agent: {}\n- status: {} ({} consecutive errors)\n- cause: {}\n- dashboard: {} (cron tab)",
                    job.title(),
                    job.id,
                    agent,
                    label,
                    state.consecutive_errors.unwrap_or(0),
                    state.last_error().unwrap_or("unknown"),
                    dashboard_url(public_url),
                ),
                destination: Destination::General,
                buttons: None,
            }
        })
        .collect()
}

pub fn token_spikes(
    sessions: &[SessionRecord],
    threshold: u64,
    public_url: &str,
) -> Vec<AlertCandidate> {
    let mut by_agent: BTreeMap<&str, u64> = BTreeMap::new();
    for session in sessions.iter().filter(|s| !s.agent_id.is_empty()) {
        *by_agent.entry(session.agent_id.as_str()).or_default() += session.tokens();
    }

    by_agent
        .into_iter()
        .filter(|(_, total)| *total >= threshold)
        .map(|(agent, total)| AlertCandidate {
            dedup_key: format!("p0:tokens:{}:{}", agent, total / TOKEN_BUCKET),
            kind: AlertKind::TokenSpike,
            agent_id: Some(agent.to_string()),
            title: format!("Token spike: {agent}"),
            message: format!(
                "[P0] Token usage spike: {}\n- tokens (24h): {}\n- threshold: {}\n- dashboard: {} (usage tab)",
                agent,
                group_thousands(total),
                group_thousands(threshold),
                dashboard_url(public_url),
            ),
            destination: Destination::General,
            buttons: None,
        })
        .collect()
}

/// Tracks idle timers in `state` and alerts on sessions idle past the threshold.
///
/// Timers of sessions missing from this poll are cleared, including when the
/// task lister failed and produced nothing.
pub fn idle_inputs(
    tasks: &[TaskDescriptor],
    state: &mut CooldownState,
    now_ms: i64,
    settings: &DetectorSettings,
) -> Vec<AlertCandidate> {
    let mut idle_now = HashSet::new();
    let mut candidates = Vec::new();

    for task in tasks {
        let Some(session) = task.session.as_deref().filter(|s| !s.is_empty()) else {
            continue;
        };
        let last_lines = task.last_lines.as_deref().unwrap_or("");
        if !looks_idle_prompt(last_lines) {
            continue;
        }
        idle_now.insert(session.to_string());

        let first_seen = state.idle_since(session, now_ms);
        if now_ms - first_seen < settings.idle_threshold_ms {
            continue;
        }

        let label = task.label.as_deref().filter(|l| !l.is_empty()).unwrap_or(session);
        let snippet = tail_lines(last_lines, SNIPPET_LINES);
        let snippet = if snippet.is_empty() {
            "(none)".to_string()
        } else {
            format!("```\n{snippet}\n```")
        };
        let dashboard = dashboard_url(&settings.public_url);
        let detail = format!("{}detail/{}", dashboard, urlencoding::encode(session));

        candidates.push(AlertCandidate {
            dedup_key: format!("p0:idle:{}:{}", session, first_seen.div_euclid(1000)),
            kind: AlertKind::IdleInput,
            agent_id: Some(settings.coding_agent_id.clone()),
            title: format!("Waiting for input: {label}"),
            message: format!(
                "[P0] Coding session waiting for input ({}+)\n- session: {}\n- label: {}\n- last log ({} lines):\n\n{}\n\nOpen the detail button for the last {} lines.",
                human_duration(settings.idle_threshold_ms),
                session,
                label,
                SNIPPET_LINES,
                snippet,
                DETAIL_LINES,
            ),
            destination: Destination::Secondary,
            buttons: Some(vec![vec![
                LinkButton {
                    text: format!("detail ({DETAIL_LINES} lines)"),
                    url: detail,
                },
                LinkButton {
                    text: "open dashboard".to_string(),
                    url: dashboard,
                },
            ]]),
        });
    }

    state.retain_idle(&idle_now);
    candidates
}

pub struct AnomalyDetector {
    gateway: Arc<dyn OpsGateway>,
    settings: DetectorSettings,
}

impl AnomalyDetector {
    pub fn new(gateway: Arc<dyn OpsGateway>, settings: DetectorSettings) -> Self {
        Self { gateway, settings }
    }

    /// Queries live state. A failing source yields an empty list and a warning.
    pub async fn observe(&self) -> Observation {
        let (jobs, sessions, tasks) = tokio::join!(
            self.gateway.list_cron_jobs(),
            self.gateway.list_sessions(SessionWindow::Day),
            self.gateway.list_tasks(),
        );
        Observation {
            jobs: jobs
                .map(|list| list.jobs)
                .unwrap_or_else(|e| {
                    warn!("Anomaly tick: cron listing failed: {}", e);
                    Vec::new()
                }),
            sessions: sessions
                .map(|list| list.sessions)
                .unwrap_or_else(|e| {
                    warn!("Anomaly tick: session listing failed: {}", e);
                    Vec::new()
                }),
            tasks: tasks.unwrap_or_else(|e| {
                warn!("Anomaly tick: task listing failed: {}", e);
                Vec::new()
            }),
        }
    }

    pub fn detect(
        &self,
        observation: &Observation,
        state: &mut CooldownState,
        now_ms: i64,
    ) -> Vec<AlertCandidate> {
        let mut candidates = cron_failures(&observation.jobs, &self.settings.public_url);
        candidates.extend(token_spikes(
            &observation.sessions,
            self.settings.token_threshold,
            &self.settings.public_url,
        ));
        candidates.extend(idle_inputs(&observation.tasks, state, now_ms, &self.settings));
        candidates
    }
}
