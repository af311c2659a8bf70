//! Scripted [`OpsGateway`] used by the core tests.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Mutex;

use super::{OpsGateway, OutboundMessage};
use crate::core::command::CommandLimits;
use crate::core::error::{CommandError, GatewayError};
use crate::core::model::{
    AgentRecord, CronAction, CronJobList, CronJobRecord, CronMutation, SessionList,
    SessionRecord, SessionWindow, TaskDescriptor,
};

#[derive(Default)]
struct Script {
    agents: Vec<AgentRecord>,
    sessions: Vec<SessionRecord>,
    window_sessions: Vec<(SessionWindow, Vec<SessionRecord>)>,
    jobs: Vec<CronJobRecord>,
    tasks: Vec<TaskDescriptor>,
    log: String,
    fail_agents: bool,
    fail_sessions: Vec<SessionWindow>,
    fail_cron: bool,
    fail_tasks: bool,
    fail_send: bool,
    fail_parse: bool,
}

#[derive(Default)]
pub struct MockGateway {
    script: Mutex<Script>,
    sent: Mutex<Vec<OutboundMessage>>,
    mutations: Mutex<Vec<(String, CronAction)>>,
}

pub fn agent(id: &str) -> AgentRecord {
    serde_json::from_value(json!({ "id": id, "identityName": id.to_uppercase() }))
        .unwrap_or_else(|e| panic!("agent fixture: {e}"))
}

pub fn session(key: &str, agent_id: &str, total_tokens: u64) -> SessionRecord {
    SessionRecord {
        key: key.to_string(),
        agent_id: agent_id.to_string(),
        total_tokens: Some(total_tokens),
        ..Default::default()
    }
}

pub fn job(id: &str, agent_id: &str, state: Value) -> CronJobRecord {
    serde_json::from_value(json!({
        "id": id,
        "agentId": agent_id,
        "name": format!("job {id}"),
        "enabled": true,
        "schedule": { "kind": "cron", "expr": "*/5 * * * *" },
        "state": state,
        "payload": { "kind": "agentTurn", "message": "secret" }
    }))
    .unwrap_or_else(|e| panic!("job fixture: {e}"))
}

pub fn task(session: &str, last_lines: &str) -> TaskDescriptor {
    TaskDescriptor {
        session: Some(session.to_string()),
        label: Some(format!("{session} label")),
        last_lines: Some(last_lines.to_string()),
    }
}

fn scripted_failure(program: &str) -> GatewayError {
    GatewayError::Command(CommandError::Timeout {
        program: program.to_string(),
        after: CommandLimits::QUERY.timeout,
    })
}

fn scripted_parse_failure(what: &'static str) -> GatewayError {
    let source = serde_json::from_str::<Value>("Error: gateway not running")
        .expect_err("canned text is not JSON");
    GatewayError::parse(what, source)
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn edit(&self, f: impl FnOnce(&mut Script)) {
        f(&mut self.script.lock().unwrap());
    }

    pub fn set_agents(&self, agents: Vec<AgentRecord>) {
        self.edit(|s| s.agents = agents);
    }

    pub fn set_sessions(&self, sessions: Vec<SessionRecord>) {
        self.edit(|s| s.sessions = sessions);
    }

    pub fn set_window_sessions(&self, window: SessionWindow, sessions: Vec<SessionRecord>) {
        self.edit(|s| {
            s.window_sessions.retain(|(w, _)| *w != window);
            s.window_sessions.push((window, sessions));
        });
    }

    pub fn set_jobs(&self, jobs: Vec<CronJobRecord>) {
        self.edit(|s| s.jobs = jobs);
    }

    pub fn set_tasks(&self, tasks: Vec<TaskDescriptor>) {
        self.edit(|s| s.tasks = tasks);
    }

    pub fn set_log(&self, log: &str) {
        self.edit(|s| s.log = log.to_string());
    }

    pub fn fail_agents(&self, fail: bool) {
        self.edit(|s| s.fail_agents = fail);
    }

    pub fn fail_sessions(&self, window: SessionWindow, fail: bool) {
        self.edit(|s| {
            s.fail_sessions.retain(|w| *w != window);
            if fail {
                s.fail_sessions.push(window);
            }
        });
    }

    pub fn fail_cron(&self, fail: bool) {
        self.edit(|s| s.fail_cron = fail);
    }

    pub fn fail_tasks(&self, fail: bool) {
        self.edit(|s| s.fail_tasks = fail);
    }

    /// Primary listings answer with unparseable output.
    pub fn fail_parse(&self, fail: bool) {
        self.edit(|s| s.fail_parse = fail);
    }

    pub fn fail_send(&self, fail: bool) {
        self.edit(|s| s.fail_send = fail);
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn mutations(&self) -> Vec<(String, CronAction)> {
        self.mutations.lock().unwrap().clone()
    }
}

#[async_trait]
impl OpsGateway for MockGateway {
    async fn list_agents(&self) -> Result<Vec<AgentRecord>, GatewayError> {
        let script = self.script.lock().unwrap();
        if script.fail_agents {
            return Err(scripted_failure("agents"));
        }
        Ok(script.agents.clone())
    }

    async fn list_sessions(&self, window: SessionWindow) -> Result<SessionList, GatewayError> {
        let script = self.script.lock().unwrap();
        if script.fail_sessions.contains(&window) {
            return Err(scripted_failure("sessions"));
        }
        if script.fail_parse {
            return Err(scripted_parse_failure("sessions"));
        }
        let sessions = script
            .window_sessions
            .iter()
            .find(|(w, _)| *w == window)
            .map(|(_, s)| s.clone())
            .unwrap_or_else(|| script.sessions.clone());
        Ok(SessionList {
            sessions,
            ..Default::default()
        })
    }

    async fn list_cron_jobs(&self) -> Result<CronJobList, GatewayError> {
        let script = self.script.lock().unwrap();
        if script.fail_cron {
            return Err(scripted_failure("cron"));
        }
        if script.fail_parse {
            return Err(scripted_parse_failure("cron"));
        }
        Ok(CronJobList {
            jobs: script.jobs.clone(),
            total: None,
        })
    }

    async fn mutate_cron_job(
        &self,
        id: &str,
        action: CronAction,
    ) -> Result<CronMutation, GatewayError> {
        self.mutations
            .lock()
            .unwrap()
            .push((id.to_string(), action));
        Ok(CronMutation {
            result: json!({ "id": id, "action": action.as_str() }),
            stderr: None,
        })
    }

    async fn list_channels(&self) -> Result<Value, GatewayError> {
        Ok(json!({ "chat": { "telegram": ["default", "coding"] } }))
    }

    async fn send_message(&self, message: &OutboundMessage) -> Result<(), GatewayError> {
        self.sent.lock().unwrap().push(message.clone());
        if self.script.lock().unwrap().fail_send {
            return Err(scripted_failure("message"));
        }
        Ok(())
    }

    async fn list_tasks(&self) -> Result<Vec<TaskDescriptor>, GatewayError> {
        let script = self.script.lock().unwrap();
        if script.fail_tasks {
            return Err(scripted_failure("tasks"));
        }
        Ok(script.tasks.clone())
    }

    async fn capture_log(&self, _session: &str, _lines: usize) -> Result<String, GatewayError> {
        Ok(self.script.lock().unwrap().log.clone())
    }
}
