//! Narrow capability interface over the automation tool and the task lister.
//!
//! Everything the refresh scheduler, the anomaly detector and the API handlers
//! need from the outside world goes through [`OpsGateway`], so the core can be
//! exercised against a scripted substitute instead of real processes.

mod cli;
#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::error::GatewayError;
use crate::core::model::{
    AgentRecord, CronAction, CronJobList, CronMutation, LinkButton, SessionList, SessionWindow,
    TaskDescriptor,
};

pub use cli::CliGateway;

/// A message addressed to one channel/account/target triple.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub channel: String,
    pub account: String,
    pub target: String,
    pub text: String,
    /// Rows of link buttons; only honoured by channels that render them.
    pub buttons: Option<Vec<Vec<LinkButton>>>,
}

#[async_trait]
pub trait OpsGateway: Send + Sync {
    async fn list_agents(&self) -> Result<Vec<AgentRecord>, GatewayError>;

    async fn list_sessions(&self, window: SessionWindow) -> Result<SessionList, GatewayError>;

    async fn list_cron_jobs(&self) -> Result<CronJobList, GatewayError>;

    async fn mutate_cron_job(
        &self,
        id: &str,
        action: CronAction,
    ) -> Result<CronMutation, GatewayError>;

    async fn list_channels(&self) -> Result<Value, GatewayError>;

    async fn send_message(&self, message: &OutboundMessage) -> Result<(), GatewayError>;

    /// Interactive sessions with their trailing log text.
    async fn list_tasks(&self) -> Result<Vec<TaskDescriptor>, GatewayError>;

    async fn capture_log(&self, session: &str, lines: usize) -> Result<String, GatewayError>;
}
