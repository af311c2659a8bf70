use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use super::{OpsGateway, OutboundMessage};
use crate::core::command::{CommandLimits, CommandRunner};
use crate::core::config::ToolConfig;
use crate::core::error::GatewayError;
use crate::core::model::{
    AgentRecord, CronAction, CronJobList, CronMutation, SessionList, SessionWindow,
    TaskDescriptor,
};

/// Talks to the automation tool's CLI and the task scripts through a [`CommandRunner`].
pub struct CliGateway {
    runner: Arc<dyn CommandRunner>,
    tool: ToolConfig,
}

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

impl CliGateway {
    pub fn new(runner: Arc<dyn CommandRunner>, tool: ToolConfig) -> Self {
        Self { runner, tool }
    }

    async fn query<T: DeserializeOwned>(
        &self,
        what: &'static str,
        args: Vec<String>,
    ) -> Result<T, GatewayError> {
        let out = self
            .runner
            .execute(&self.tool.binary, &args, CommandLimits::QUERY)
            .await?;
        serde_json::from_str(&out.stdout).map_err(|e| GatewayError::parse(what, e))
    }
}

#[async_trait]
impl OpsGateway for CliGateway {
    async fn list_agents(&self) -> Result<Vec<AgentRecord>, GatewayError> {
        self.query("agents", owned(&["agents", "list", "--json", "--bindings"]))
            .await
    }

    async fn list_sessions(&self, window: SessionWindow) -> Result<SessionList, GatewayError> {
        let minutes = window.active_minutes().to_string();
        self.query(
            "sessions",
            owned(&["sessions", "--all-agents", "--json", "--active", &minutes]),
        )
        .await
    }

    async fn list_cron_jobs(&self) -> Result<CronJobList, GatewayError> {
        self.query("cron", owned(&["cron", "list", "--all", "--json"]))
            .await
    }

    async fn mutate_cron_job(
        &self,
        id: &str,
        action: CronAction,
    ) -> Result<CronMutation, GatewayError> {
        let args = owned(&["cron", action.as_str(), id, "--json"]);
        let out = self
            .runner
            .execute(&self.tool.binary, &args, CommandLimits::QUERY)
            .await?;
        let result = serde_json::from_str(&out.stdout)
            .map_err(|e| GatewayError::parse("cron mutation", e))?;
        let stderr = out.stderr.trim();
        Ok(CronMutation {
            result,
            stderr: (!stderr.is_empty()).then(|| stderr.to_string()),
        })
    }

    async fn list_channels(&self) -> Result<Value, GatewayError> {
        self.query("channels", owned(&["channels", "list", "--json", "--no-usage"]))
            .await
    }

    async fn send_message(&self, message: &OutboundMessage) -> Result<(), GatewayError> {
        let mut args = owned(&[
            "message",
            "send",
            "--channel",
            &message.channel,
            "--account",
            &message.account,
            "--target",
            &message.target,
            "--message",
            &message.text,
        ]);
        if let Some(buttons) = &message.buttons {
            let encoded = serde_json::to_string(buttons)
                .map_err(|e| GatewayError::parse("buttons", e))?;
            args.push("--buttons".to_string());
            args.push(encoded);
        }
        self.runner
            .execute(&self.tool.binary, &args, CommandLimits::SEND)
            .await?;
        Ok(())
    }

    async fn list_tasks(&self) -> Result<Vec<TaskDescriptor>, GatewayError> {
        let Some(script) = &self.tool.task_list_script else {
            return Ok(Vec::new());
        };
        let args = vec![
            script.to_string_lossy().into_owned(),
            "--json".to_string(),
            "--lines".to_string(),
            self.tool.task_lines.to_string(),
        ];
        let out = self
            .runner
            .execute(&self.tool.shell, &args, CommandLimits::TASKS)
            .await?;
        serde_json::from_str(&out.stdout).map_err(|e| GatewayError::parse("tasks", e))
    }

    async fn capture_log(&self, session: &str, lines: usize) -> Result<String, GatewayError> {
        let script = self
            .tool
            .task_capture_script
            .as_ref()
            .ok_or(GatewayError::Unavailable("task capture script"))?;
        let args = vec![
            script.to_string_lossy().into_owned(),
            "--session".to_string(),
            session.to_string(),
            "--lines".to_string(),
            lines.to_string(),
        ];
        let out = self
            .runner
            .execute(&self.tool.shell, &args, CommandLimits::TASKS)
            .await?;
        Ok(out.stdout)
    }
}
