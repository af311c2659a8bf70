//! Latest-good view of the fleet, swapped whole on every applied refresh.

use arc_swap::ArcSwapOption;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::model::{AgentRecord, AgentSnapshot, RedactedCronList, SessionList, SessionWindow};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u64,
    pub updated_at_ms: i64,
    pub refresh_duration_ms: i64,
    pub agents: Vec<AgentRecord>,
    pub overview: Vec<AgentSnapshot>,
    pub active_minutes: u32,
    pub sessions: SessionList,
    pub cron: RedactedCronList,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSessions {
    pub updated_at_ms: i64,
    pub list: SessionList,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleFailure {
    pub at_ms: i64,
    pub reason: String,
}

/// Freshness report attached to cached reads.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Staleness {
    pub age_ms: i64,
    pub stale: bool,
    pub last_error: Option<CycleFailure>,
}

/// Slot of a secondary window; the primary window lives in the snapshot.
fn slot(window: SessionWindow) -> Option<usize> {
    match window {
        SessionWindow::Day => None,
        SessionWindow::Week => Some(0),
        SessionWindow::Month => Some(1),
    }
}

#[derive(Default)]
pub struct SnapshotCache {
    current: ArcSwapOption<Snapshot>,
    windows: [ArcSwapOption<WindowSessions>; 2],
    last_error: ArcSwapOption<CycleFailure>,
    version: AtomicU64,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.load_full()
    }

    /// Stamps a new version and makes `snapshot` the current view.
    pub fn publish(&self, mut snapshot: Snapshot) -> Arc<Snapshot> {
        snapshot.version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(snapshot);
        self.current.store(Some(snapshot.clone()));
        self.last_error.store(None);
        snapshot
    }

    pub fn record_failure(&self, at_ms: i64, reason: impl Into<String>) {
        self.last_error.store(Some(Arc::new(CycleFailure {
            at_ms,
            reason: reason.into(),
        })));
    }

    pub fn last_error(&self) -> Option<Arc<CycleFailure>> {
        self.last_error.load_full()
    }

    /// Cached sessions for `window`. The primary window is read from the
    /// current snapshot, so it always matches the overview beside it.
    pub fn sessions(&self, window: SessionWindow) -> Option<Arc<WindowSessions>> {
        match slot(window) {
            Some(i) => self.windows[i].load_full(),
            None => self.current().map(|snapshot| {
                Arc::new(WindowSessions {
                    updated_at_ms: snapshot.updated_at_ms,
                    list: snapshot.sessions.clone(),
                })
            }),
        }
    }

    /// Replaces one secondary window's entry; other windows are untouched.
    /// The primary window only changes through [`Self::publish`].
    pub fn store_window(&self, window: SessionWindow, updated_at_ms: i64, list: SessionList) {
        if let Some(i) = slot(window) {
            self.windows[i].store(Some(Arc::new(WindowSessions {
                updated_at_ms,
                list,
            })));
        }
    }

    pub fn staleness(&self, now_ms: i64, stale_after_ms: i64) -> Option<Staleness> {
        let snapshot = self.current()?;
        let age_ms = now_ms - snapshot.updated_at_ms;
        let last_error = self.last_error().map(|e| (*e).clone());
        let failed_since = last_error
            .as_ref()
            .is_some_and(|e| e.at_ms >= snapshot.updated_at_ms);
        Some(Staleness {
            age_ms,
            stale: failed_since || age_ms > stale_after_ms,
            last_error,
        })
    }
}
