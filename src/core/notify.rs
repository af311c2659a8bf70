//! Cooldown-gated delivery of alert candidates, and the anomaly tick that feeds it.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::core::anomaly::{AlertCandidate, AnomalyDetector, Destination};
use crate::core::config::NotifyConfig;
use crate::core::cooldown::{CooldownState, CooldownStore};
use crate::core::gateway::{OpsGateway, OutboundMessage};
use crate::core::now_ms;
use crate::core::store::MetricsStore;
use crate::core::store::types::AlertEventRow;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub candidates: usize,
    pub sent: usize,
    pub suppressed: usize,
    pub failed: usize,
}

pub struct Dispatcher {
    gateway: Arc<dyn OpsGateway>,
    store: Option<MetricsStore>,
    notify: NotifyConfig,
}

impl Dispatcher {
    pub fn new(
        gateway: Arc<dyn OpsGateway>,
        store: Option<MetricsStore>,
        notify: NotifyConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            notify,
        }
    }

    fn message_for(&self, candidate: &AlertCandidate) -> OutboundMessage {
        let account = match candidate.destination {
            Destination::General => &self.notify.general_account,
            Destination::Secondary => &self.notify.secondary_account,
        };
        OutboundMessage {
            channel: self.notify.channel.clone(),
            account: account.clone(),
            target: self.notify.target.clone(),
            text: candidate.message.clone(),
            buttons: match candidate.destination {
                Destination::Secondary => candidate.buttons.clone(),
                Destination::General => None,
            },
        }
    }

    /// Sends every candidate outside its cooldown window.
    ///
    /// The key is marked sent and the document saved before delivery is tried, so a
    /// crash or failed send never produces a duplicate within the window.
    pub async fn dispatch(
        &self,
        candidates: Vec<AlertCandidate>,
        state: &mut CooldownState,
        cooldown: &CooldownStore,
        now_ms: i64,
    ) -> DispatchReport {
        let mut report = DispatchReport {
            candidates: candidates.len(),
            ..Default::default()
        };

        for candidate in candidates {
            if !state.should_send(&candidate.dedup_key, now_ms, cooldown.cooldown_ms()) {
                debug!("Suppressed {} (cooldown)", candidate.dedup_key);
                report.suppressed += 1;
                continue;
            }

            state.mark_sent(&candidate.dedup_key, now_ms);
            if let Err(e) = cooldown.save(state, now_ms).await {
                warn!("Failed to save cooldown state: {}", e);
            }

            if let Some(store) = &self.store {
                let event = AlertEventRow {
                    ts_ms: now_ms,
                    event_key: candidate.dedup_key.clone(),
                    kind: candidate.kind.as_str().to_string(),
                    agent_id: candidate.agent_id.clone(),
                    title: Some(candidate.title.clone()),
                    message: candidate.message.clone(),
                };
                if let Err(e) = store.insert_alert_event(&event).await {
                    warn!("Failed to record alert event {}: {}", candidate.dedup_key, e);
                }
            }

            if self.notify.target.is_empty() {
                warn!(
                    "No notification target configured; {} not delivered",
                    candidate.dedup_key
                );
                report.failed += 1;
                continue;
            }

            match self.gateway.send_message(&self.message_for(&candidate)).await {
                Ok(()) => {
                    info!("Alert sent: {}", candidate.dedup_key);
                    report.sent += 1;
                }
                Err(e) => {
                    warn!("Alert delivery failed for {}: {}", candidate.dedup_key, e);
                    report.failed += 1;
                }
            }
        }

        report
    }
}

/// One anomaly tick: observe, detect, dispatch. Ticks are serialized on the
/// cooldown store, which makes the tick the only writer of that document.
pub struct AlertMonitor {
    detector: AnomalyDetector,
    dispatcher: Dispatcher,
    cooldown: Mutex<CooldownStore>,
}

impl AlertMonitor {
    pub fn new(detector: AnomalyDetector, dispatcher: Dispatcher, cooldown: CooldownStore) -> Self {
        Self {
            detector,
            dispatcher,
            cooldown: Mutex::new(cooldown),
        }
    }

    pub async fn tick(&self) -> DispatchReport {
        self.tick_at(now_ms()).await
    }

    pub async fn tick_at(&self, now_ms: i64) -> DispatchReport {
        let cooldown = self.cooldown.lock().await;
        let observation = self.detector.observe().await;

        let mut state = cooldown.load().await;
        let candidates = self.detector.detect(&observation, &mut state, now_ms);
        if let Err(e) = cooldown.save(&mut state, now_ms).await {
            warn!("Failed to save idle timers: {}", e);
        }

        let report = self
            .dispatcher
            .dispatch(candidates, &mut state, &cooldown, now_ms)
            .await;
        info!(
            "Anomaly tick: {} candidates, {} sent, {} suppressed, {} failed",
            report.candidates, report.sent, report.suppressed, report.failed
        );
        report
    }

    /// Evaluates the rules without sending or touching the cooldown document.
    pub async fn preview(&self) -> Vec<(AlertCandidate, bool)> {
        let cooldown = self.cooldown.lock().await;
        let observation = self.detector.observe().await;
        let now = now_ms();
        let mut state = cooldown.load().await;
        let candidates = self.detector.detect(&observation, &mut state, now);
        candidates
            .into_iter()
            .map(|c| {
                let due = state.should_send(&c.dedup_key, now, cooldown.cooldown_ms());
                (c, due)
            })
            .collect()
    }
}
