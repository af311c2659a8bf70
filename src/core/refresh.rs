//! Periodic collection of fleet state into the snapshot cache and the metrics store.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::cache::{Snapshot, SnapshotCache};
use crate::core::error::GatewayError;
use crate::core::gateway::OpsGateway;
use crate::core::model::{
    AgentRecord, AgentSnapshot, CronJobRecord, RedactedCronList, SessionRecord, SessionWindow,
};
use crate::core::now_ms;
use crate::core::store::MetricsStore;
use crate::core::store::types::{AgentMetricRow, CronJobMetricRow};

/// Per-agent aggregates in the order the tool listed the agents.
/// Sessions and jobs of unknown agents are ignored.
pub fn build_overview(
    agents: &[AgentRecord],
    sessions: &[SessionRecord],
    jobs: &[CronJobRecord],
) -> Vec<AgentSnapshot> {
    let mut overview: Vec<AgentSnapshot> = agents
        .iter()
        .map(|a| AgentSnapshot {
            agent_id: a.id.clone(),
            name: a.display_name().to_string(),
            emoji: a.identity_emoji.clone(),
            workspace: a.workspace.clone(),
            model: a.model.clone(),
            sessions_active: 0,
            tokens_24h: 0,
            cron_jobs: 0,
            cron_errors: 0,
        })
        .collect();
    let index: HashMap<String, usize> = overview
        .iter()
        .enumerate()
        .map(|(i, a)| (a.agent_id.clone(), i))
        .collect();

    for session in sessions {
        if let Some(&i) = index.get(&session.agent_id) {
            overview[i].sessions_active += 1;
            overview[i].tokens_24h += session.tokens();
        }
    }

    for job in jobs {
        let Some(&i) = job.agent_id.as_ref().and_then(|id| index.get(id)) else {
            continue;
        };
        overview[i].cron_jobs += 1;
        if job.state.is_failing() {
            overview[i].cron_errors += 1;
        }
    }

    overview
}

#[derive(Clone)]
pub struct RefreshScheduler {
    gateway: Arc<dyn OpsGateway>,
    cache: Arc<SnapshotCache>,
    store: Option<MetricsStore>,
    active_minutes: u32,
}

impl RefreshScheduler {
    pub fn new(
        gateway: Arc<dyn OpsGateway>,
        cache: Arc<SnapshotCache>,
        store: Option<MetricsStore>,
        active_minutes: u32,
    ) -> Self {
        Self {
            gateway,
            cache,
            store,
            active_minutes,
        }
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    /// One primary cycle: all three collections apply together or not at all.
    pub async fn refresh_primary(&self) -> Result<Arc<Snapshot>, GatewayError> {
        let started = now_ms();
        let collected = tokio::try_join!(
            self.gateway.list_agents(),
            self.gateway.list_sessions(SessionWindow::Day),
            self.gateway.list_cron_jobs(),
        );
        let (agents, sessions, cron) = match collected {
            Ok(parts) => parts,
            Err(e) => {
                warn!("Refresh failed, keeping previous snapshot: {}", e);
                self.cache.record_failure(now_ms(), e.to_string());
                return Err(e);
            }
        };

        let overview = build_overview(&agents, &sessions.sessions, &cron.jobs);
        let updated_at_ms = now_ms();
        let snapshot = self.cache.publish(Snapshot {
            version: 0,
            updated_at_ms,
            refresh_duration_ms: updated_at_ms - started,
            cron: RedactedCronList::from_list(&cron),
            agents,
            overview,
            active_minutes: self.active_minutes,
            sessions,
        });
        info!(
            "Refresh applied v{}: {} agents, {} sessions, {} jobs in {}ms",
            snapshot.version,
            snapshot.agents.len(),
            snapshot.sessions.sessions.len(),
            cron.jobs.len(),
            snapshot.refresh_duration_ms
        );

        if let Some(store) = &self.store {
            let agent_rows: Vec<AgentMetricRow> = snapshot
                .overview
                .iter()
                .map(|a| AgentMetricRow::sample(updated_at_ms, a))
                .collect();
            let job_rows: Vec<CronJobMetricRow> = cron
                .jobs
                .iter()
                .map(|j| CronJobMetricRow::sample(updated_at_ms, j))
                .collect();
            if let Err(e) = store.record_tick(&agent_rows, &job_rows).await {
                warn!("Failed to persist refresh metrics: {}", e);
            }
        }

        Ok(snapshot)
    }

    pub async fn refresh_window(&self, window: SessionWindow) -> Result<(), GatewayError> {
        match self.gateway.list_sessions(window).await {
            Ok(list) => {
                debug!(
                    "Window {} refreshed: {} sessions",
                    window.as_str(),
                    list.sessions.len()
                );
                self.cache.store_window(window, now_ms(), list);
                Ok(())
            }
            Err(e) => {
                warn!("Window {} refresh failed: {}", window.as_str(), e);
                Err(e)
            }
        }
    }

    /// Refreshes the slow windows side by side; each one succeeds or fails alone.
    pub async fn refresh_secondary(&self) {
        let [week, month] = SessionWindow::SECONDARY;
        let _ = tokio::join!(self.refresh_window(week), self.refresh_window(month));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gateway::mock::{MockGateway, agent, job, session};
    use crate::core::store::test_store;
    use serde_json::json;

    fn seeded() -> Arc<MockGateway> {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_agents(vec![agent("main"), agent("coding")]);
        gateway.set_sessions(vec![
            session("agent:main:main", "main", 1_000),
            session("agent:main:cron:j1:run:1", "main", 500),
            session("agent:coding:main", "coding", 42),
            session("agent:ghost:main", "ghost", 9_999),
        ]);
        gateway.set_jobs(vec![
            job(
                "j1",
                "main",
                json!({ "lastStatus": "ok", "consecutiveErrors": 2, "lastRunAtMs": 10 }),
            ),
            job("j2", "main", json!({ "lastStatus": "ok", "consecutiveErrors": 0 })),
            job("j3", "coding", json!({ "lastRunStatus": "error" })),
        ]);
        gateway
    }

    fn scheduler(gateway: Arc<MockGateway>, store: Option<MetricsStore>) -> RefreshScheduler {
        RefreshScheduler::new(gateway, Arc::new(SnapshotCache::new()), store, 1440)
    }

    #[tokio::test]
    async fn applied_cycle_builds_aggregates_and_persists() {
        let (store, _dir) = test_store().await;
        let refresher = scheduler(seeded(), Some(store.clone()));

        let snapshot = refresher.refresh_primary().await.unwrap();

        assert_eq!(snapshot.version, 1);
        let main = &snapshot.overview[0];
        assert_eq!(main.agent_id, "main");
        assert_eq!(main.name, "MAIN");
        assert_eq!(main.sessions_active, 2);
        assert_eq!(main.tokens_24h, 1_500);
        assert_eq!(main.cron_jobs, 2);
        assert_eq!(main.cron_errors, 1);
        assert_eq!(snapshot.overview[1].cron_errors, 1);
        assert_eq!(snapshot.cron.total, 3);

        let metrics = store.query_agent_metrics(0).await.unwrap();
        assert_eq!(metrics.len(), 2);
        assert!(metrics.iter().all(|m| m.ts_ms == snapshot.updated_at_ms));
        assert_eq!(store.query_cron_job_metrics(0).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn redacted_cron_view_hides_payload_message() {
        let refresher = scheduler(seeded(), None);
        let snapshot = refresher.refresh_primary().await.unwrap();
        let body = serde_json::to_string(&snapshot.cron).unwrap();
        assert!(body.contains("agentTurn"));
        assert!(!body.contains("secret"));
    }

    #[tokio::test]
    async fn failed_collection_leaves_snapshot_untouched() {
        let gateway = seeded();
        let refresher = scheduler(gateway.clone(), None);
        let before = refresher.refresh_primary().await.unwrap();

        gateway.set_sessions(Vec::new());
        gateway.fail_cron(true);
        assert!(refresher.refresh_primary().await.is_err());

        let after = refresher.cache().current().unwrap();
        assert_eq!(after.version, before.version);
        assert_eq!(after.updated_at_ms, before.updated_at_ms);
        assert_eq!(after.sessions.sessions.len(), 4);
        assert_eq!(after.cron.jobs.len(), 3);
        assert!(refresher.cache().last_error().is_some());
    }

    #[tokio::test]
    async fn unparseable_listing_leaves_snapshot_untouched() {
        let gateway = seeded();
        let refresher = scheduler(gateway.clone(), None);
        let before = refresher.refresh_primary().await.unwrap();

        gateway.fail_parse(true);
        let err = refresher.refresh_primary().await.unwrap_err();
        assert!(matches!(err, GatewayError::Parse { .. }));

        let after = refresher.cache().current().unwrap();
        assert_eq!(after.version, before.version);
        assert_eq!(after.cron.jobs.len(), 3);
        assert!(refresher.cache().last_error().unwrap().reason.contains("parse failed"));
    }

    #[tokio::test]
    async fn first_cycle_failure_publishes_nothing() {
        let gateway = seeded();
        gateway.fail_agents(true);
        let refresher = scheduler(gateway, None);

        assert!(refresher.refresh_primary().await.is_err());
        assert!(refresher.cache().current().is_none());
        assert!(refresher.cache().last_error().is_some());
    }

    #[tokio::test]
    async fn window_failure_does_not_touch_other_windows() {
        let gateway = seeded();
        gateway.set_window_sessions(SessionWindow::Week, vec![session("a:w", "main", 1)]);
        gateway.set_window_sessions(
            SessionWindow::Month,
            vec![session("a:m1", "main", 1), session("a:m2", "main", 1)],
        );
        let refresher = scheduler(gateway.clone(), None);
        refresher.refresh_secondary().await;

        gateway.fail_sessions(SessionWindow::Week, true);
        gateway.set_window_sessions(SessionWindow::Month, Vec::new());
        refresher.refresh_secondary().await;

        let cache = refresher.cache();
        assert_eq!(cache.sessions(SessionWindow::Week).unwrap().list.sessions.len(), 1);
        assert!(cache.sessions(SessionWindow::Month).unwrap().list.sessions.is_empty());
        assert!(cache.sessions(SessionWindow::Day).is_none());
    }
}
