//! Local time-series store: per-agent samples, per-job samples and the alert audit log.

mod events;
mod metrics;
pub mod types;

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::info;

use crate::core::error::PersistenceError;
use crate::platform::{NativePlatform, Platform};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Lower bound of a trailing `days` window ending at `now_ms`.
pub fn window_start(days: u32, now_ms: i64) -> i64 {
    now_ms - i64::from(days) * DAY_MS
}

#[derive(Clone)]
pub struct MetricsStore {
    db: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl MetricsStore {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
            NativePlatform::restrict_dir_permissions(parent);
        }

        let db = Connection::open(&path)?;
        NativePlatform::restrict_file_permissions(&path);
        let _mode: String =
            db.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        db.pragma_update(None, "synchronous", "NORMAL")?;
        migrate(&db)?;
        info!("Metrics store ready at {}", path.display());

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn migrate(db: &Connection) -> Result<(), rusqlite::Error> {
    db.execute_batch(
        "CREATE TABLE IF NOT EXISTS agent_metrics (
            ts_ms INTEGER NOT NULL,
            agent_id TEXT NOT NULL,
            sessions_active INTEGER NOT NULL,
            tokens_24h_total INTEGER NOT NULL,
            cron_jobs INTEGER NOT NULL,
            cron_errors INTEGER NOT NULL,
            PRIMARY KEY (ts_ms, agent_id)
        );
        CREATE INDEX IF NOT EXISTS idx_agent_metrics_ts ON agent_metrics (ts_ms);
        CREATE INDEX IF NOT EXISTS idx_agent_metrics_agent_ts ON agent_metrics (agent_id, ts_ms);

        CREATE TABLE IF NOT EXISTS p0_events (
            ts_ms INTEGER NOT NULL,
            event_key TEXT NOT NULL PRIMARY KEY,
            kind TEXT NOT NULL,
            agent_id TEXT,
            title TEXT,
            message TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_p0_events_ts ON p0_events (ts_ms);

        CREATE TABLE IF NOT EXISTS cron_job_metrics (
            ts_ms INTEGER NOT NULL,
            job_id TEXT NOT NULL,
            agent_id TEXT,
            enabled INTEGER NOT NULL,
            schedule_kind TEXT,
            schedule_expr TEXT,
            last_status TEXT,
            last_run_status TEXT,
            consecutive_errors INTEGER,
            last_error TEXT,
            next_run_at_ms INTEGER,
            last_run_at_ms INTEGER,
            PRIMARY KEY (ts_ms, job_id)
        );
        CREATE INDEX IF NOT EXISTS idx_cron_job_metrics_ts ON cron_job_metrics (ts_ms);
        CREATE INDEX IF NOT EXISTS idx_cron_job_metrics_job_ts ON cron_job_metrics (job_id, ts_ms);",
    )
}

/// Store on a throwaway file, kept alive by the returned guard.
#[cfg(test)]
pub async fn test_store() -> (MetricsStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let store = MetricsStore::open(dir.path().join("state").join("ops.db"))
        .await
        .expect("open test store");
    (store, dir)
}
