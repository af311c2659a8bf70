use rusqlite::params;

use super::MetricsStore;
use super::types::AlertEventRow;
use crate::core::error::PersistenceError;

impl MetricsStore {
    /// Returns `false` when the key was already recorded; the existing row is left untouched.
    pub async fn insert_alert_event(&self, row: &AlertEventRow) -> Result<bool, PersistenceError> {
        let db = self.db.lock().await;
        let inserted = db.execute(
            "INSERT OR IGNORE INTO p0_events (ts_ms, event_key, kind, agent_id, title, message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                row.ts_ms,
                row.event_key,
                row.kind,
                row.agent_id,
                row.title,
                row.message
            ],
        )?;
        Ok(inserted > 0)
    }

    pub async fn query_alert_events(
        &self,
        since_ms: i64,
    ) -> Result<Vec<AlertEventRow>, PersistenceError> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT ts_ms, event_key, kind, agent_id, title, message
             FROM p0_events
             WHERE ts_ms >= ?1
             ORDER BY ts_ms DESC",
        )?;
        let rows = stmt.query_map(params![since_ms], |row| {
            Ok(AlertEventRow {
                ts_ms: row.get(0)?,
                event_key: row.get(1)?,
                kind: row.get(2)?,
                agent_id: row.get(3)?,
                title: row.get(4)?,
                message: row.get(5)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}
