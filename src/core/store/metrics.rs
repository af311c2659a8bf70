use rusqlite::params;

use super::MetricsStore;
use super::types::{AgentMetricRow, CronJobMetricRow};
use crate::core::error::PersistenceError;

const INSERT_AGENT_METRIC: &str = "INSERT OR REPLACE INTO agent_metrics
    (ts_ms, agent_id, sessions_active, tokens_24h_total, cron_jobs, cron_errors)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

const INSERT_CRON_JOB_METRIC: &str = "INSERT OR REPLACE INTO cron_job_metrics
    (ts_ms, job_id, agent_id, enabled, schedule_kind, schedule_expr, last_status,
     last_run_status, consecutive_errors, last_error, next_run_at_ms, last_run_at_ms)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)";

impl MetricsStore {
    /// Writes every sample of one refresh tick in a single transaction.
    pub async fn record_tick(
        &self,
        agents: &[AgentMetricRow],
        jobs: &[CronJobMetricRow],
    ) -> Result<(), PersistenceError> {
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        {
            let mut agent_stmt = tx.prepare_cached(INSERT_AGENT_METRIC)?;
            for row in agents {
                agent_stmt.execute(params![
                    row.ts_ms,
                    row.agent_id,
                    row.sessions_active,
                    row.tokens_24h_total,
                    row.cron_jobs,
                    row.cron_errors
                ])?;
            }
            let mut job_stmt = tx.prepare_cached(INSERT_CRON_JOB_METRIC)?;
            for row in jobs {
                job_stmt.execute(params![
                    row.ts_ms,
                    row.job_id,
                    row.agent_id,
                    row.enabled,
                    row.schedule_kind,
                    row.schedule_expr,
                    row.last_status,
                    row.last_run_status,
                    row.consecutive_errors,
                    row.last_error,
                    row.next_run_at_ms,
                    row.last_run_at_ms
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub async fn query_agent_metrics(
        &self,
        since_ms: i64,
    ) -> Result<Vec<AgentMetricRow>, PersistenceError> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT ts_ms, agent_id, sessions_active, tokens_24h_total, cron_jobs, cron_errors
             FROM agent_metrics
             WHERE ts_ms >= ?1
             ORDER BY ts_ms ASC",
        )?;
        let rows = stmt.query_map(params![since_ms], |row| {
            Ok(AgentMetricRow {
                ts_ms: row.get(0)?,
                agent_id: row.get(1)?,
                sessions_active: row.get(2)?,
                tokens_24h_total: row.get(3)?,
                cron_jobs: row.get(4)?,
                cron_errors: row.get(5)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub async fn query_cron_job_metrics(
        &self,
        since_ms: i64,
    ) -> Result<Vec<CronJobMetricRow>, PersistenceError> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT ts_ms, job_id, agent_id, enabled, schedule_kind, schedule_expr,
                    last_status, last_run_status, consecutive_errors, last_error,
                    next_run_at_ms, last_run_at_ms
             FROM cron_job_metrics
             WHERE ts_ms >= ?1
             ORDER BY ts_ms ASC",
        )?;
        let rows = stmt.query_map(params![since_ms], |row| {
            Ok(CronJobMetricRow {
                ts_ms: row.get(0)?,
                job_id: row.get(1)?,
                agent_id: row.get(2)?,
                enabled: row.get(3)?,
                schedule_kind: row.get(4)?,
                schedule_expr: row.get(5)?,
                last_status: row.get(6)?,
                last_run_status: row.get(7)?,
                consecutive_errors: row.get::<_, Option<i64>>(8)?.unwrap_or(0),
                last_error: row.get(9)?,
                next_run_at_ms: row.get(10)?,
                last_run_at_ms: row.get(11)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_store;
    use super::super::types::{AgentMetricRow, CronJobMetricRow};
    use crate::core::gateway::mock::job;
    use serde_json::json;

    #[tokio::test]
    async fn tick_writes_agents_and_jobs_together() {
        let (store, _dir) = test_store().await;
        let failing = job(
            "j1",
            "main",
            json!({ "lastStatus": "ok", "consecutiveErrors": 2, "lastRunAtMs": 500 }),
        );
        let agents = vec![AgentMetricRow {
            ts_ms: 1000,
            agent_id: "main".into(),
            sessions_active: 3,
            tokens_24h_total: 42,
            cron_jobs: 1,
            cron_errors: 1,
        }];
        let jobs = vec![CronJobMetricRow::sample(1000, &failing)];

        store.record_tick(&agents, &jobs).await.unwrap();

        assert_eq!(store.query_agent_metrics(0).await.unwrap(), agents);
        let stored = store.query_cron_job_metrics(0).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].job_id, "j1");
        assert!(stored[0].enabled);
        assert_eq!(stored[0].schedule_expr.as_deref(), Some("*/5 * * * *"));
        assert_eq!(stored[0].consecutive_errors, 2);
        assert_eq!(stored[0].last_run_at_ms, Some(500));
    }

    #[tokio::test]
    async fn single_job_metric_replaces_on_same_key() {
        let (store, _dir) = test_store().await;
        let mut row = CronJobMetricRow::sample(1000, &job("j1", "main", json!({})));
        store.record_tick(&[], std::slice::from_ref(&row)).await.unwrap();
        row.last_status = Some("error".into());
        store.record_tick(&[], std::slice::from_ref(&row)).await.unwrap();

        let stored = store.query_cron_job_metrics(0).await.unwrap();
        assert_eq!(stored, vec![row]);
    }
}
