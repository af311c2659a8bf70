//! Durable cooldown and idle-timer document.
//!
//! Only the anomaly tick writes it: load, mutate, save, all inside one tick.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::core::error::PersistenceError;
use crate::platform::{NativePlatform, Platform};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CooldownState {
    #[serde(default)]
    pub last_sent_at_by_key: BTreeMap<String, i64>,
    #[serde(default, alias = "idleFirstSeenAtBySession")]
    pub idle_first_seen_by_session: BTreeMap<String, i64>,
}

impl CooldownState {
    pub fn should_send(&self, key: &str, now_ms: i64, cooldown_ms: i64) -> bool {
        match self.last_sent_at_by_key.get(key) {
            Some(last) => now_ms - last >= cooldown_ms,
            None => true,
        }
    }

    pub fn mark_sent(&mut self, key: &str, now_ms: i64) {
        self.last_sent_at_by_key.insert(key.to_string(), now_ms);
    }

    /// First time `session` was seen idle, recording `now_ms` if it is new.
    pub fn idle_since(&mut self, session: &str, now_ms: i64) -> i64 {
        *self
            .idle_first_seen_by_session
            .entry(session.to_string())
            .or_insert(now_ms)
    }

    /// Drops idle timers for every session not in `idle_now`.
    pub fn retain_idle(&mut self, idle_now: &HashSet<String>) {
        self.idle_first_seen_by_session
            .retain(|session, _| idle_now.contains(session));
    }

    fn prune(&mut self, now_ms: i64, keep_ms: i64) -> usize {
        let before = self.last_sent_at_by_key.len();
        self.last_sent_at_by_key
            .retain(|_, sent_at| now_ms - *sent_at < keep_ms);
        before - self.last_sent_at_by_key.len()
    }
}

pub struct CooldownStore {
    path: PathBuf,
    cooldown_ms: i64,
    retention_ms: i64,
}

impl CooldownStore {
    pub fn new<P: AsRef<Path>>(path: P, cooldown_ms: i64, retention_ms: i64) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            cooldown_ms,
            retention_ms,
        }
    }

    pub fn cooldown_ms(&self) -> i64 {
        self.cooldown_ms
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or unreadable document starts a fresh state.
    pub async fn load(&self) -> CooldownState {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return CooldownState::default(),
            Err(e) => {
                warn!("Cooldown state at {} unreadable: {}", self.path.display(), e);
                return CooldownState::default();
            }
        };
        match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                warn!("Cooldown state at {} is corrupt, starting fresh: {}", self.path.display(), e);
                CooldownState::default()
            }
        }
    }

    /// Prunes stale sent-at entries and writes the document atomically.
    pub async fn save(&self, state: &mut CooldownState, now_ms: i64) -> Result<(), PersistenceError> {
        let pruned = state.prune(now_ms, self.retention_ms.max(self.cooldown_ms));
        if pruned > 0 {
            debug!("Pruned {} expired cooldown keys", pruned);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).await?;
        NativePlatform::restrict_file_permissions(&tmp);
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
