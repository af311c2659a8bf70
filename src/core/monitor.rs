//! Wiring of the collectors and the alert tick, and their fixed-interval timers.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::core::anomaly::{AnomalyDetector, DetectorSettings};
use crate::core::cache::SnapshotCache;
use crate::core::command::ProcessRunner;
use crate::core::config::OpsConfig;
use crate::core::cooldown::CooldownStore;
use crate::core::gateway::{CliGateway, OpsGateway};
use crate::core::lifecycle::LifecycleComponent;
use crate::core::model::SessionWindow;
use crate::core::notify::{AlertMonitor, Dispatcher};
use crate::core::refresh::RefreshScheduler;
use crate::core::store::MetricsStore;

/// Everything the background timers and the API handlers share.
#[derive(Clone)]
pub struct Services {
    pub gateway: Arc<dyn OpsGateway>,
    pub cache: Arc<SnapshotCache>,
    pub store: Option<MetricsStore>,
    pub refresher: RefreshScheduler,
    pub alerts: Arc<AlertMonitor>,
}

impl Services {
    /// Builds services around the real tool. A store that cannot be opened is
    /// logged and left out; snapshots and alerts keep working without it.
    pub async fn from_config(config: &OpsConfig) -> Self {
        let gateway: Arc<dyn OpsGateway> = Arc::new(CliGateway::new(
            Arc::new(ProcessRunner),
            config.tool.clone(),
        ));
        let store = match MetricsStore::open(&config.storage.db_path).await {
            Ok(store) => Some(store),
            Err(e) => {
                error!(
                    "Metrics store at {} unavailable, trends disabled: {}",
                    config.storage.db_path.display(),
                    e
                );
                None
            }
        };
        Self::assemble(config, gateway, store)
    }

    pub fn assemble(
        config: &OpsConfig,
        gateway: Arc<dyn OpsGateway>,
        store: Option<MetricsStore>,
    ) -> Self {
        let cache = Arc::new(SnapshotCache::new());
        let refresher = RefreshScheduler::new(
            gateway.clone(),
            cache.clone(),
            store.clone(),
            config.refresh.active_minutes,
        );
        let detector = AnomalyDetector::new(
            gateway.clone(),
            DetectorSettings {
                token_threshold: config.alerts.token_threshold,
                idle_threshold_ms: config.alerts.idle_threshold_ms,
                public_url: config.server.public_url.clone(),
                coding_agent_id: config.notify.coding_agent_id.clone(),
            },
        );
        let dispatcher = Dispatcher::new(gateway.clone(), store.clone(), config.notify.clone());
        let cooldown = CooldownStore::new(
            &config.storage.cooldown_path,
            config.alerts.cooldown_ms,
            config.alerts.cooldown_retention_ms,
        );
        Self {
            gateway,
            cache,
            store,
            refresher,
            alerts: Arc::new(AlertMonitor::new(detector, dispatcher, cooldown)),
        }
    }
}

/// Registers the three timers on the lifecycle scheduler when started.
pub struct MonitorService {
    services: Services,
    scheduler: JobScheduler,
    primary_every: Duration,
    secondary_every: Duration,
    alert_every: Duration,
}

impl MonitorService {
    pub fn new(services: Services, scheduler: JobScheduler, config: &OpsConfig) -> Self {
        Self {
            services,
            scheduler,
            primary_every: config.refresh.primary_every(),
            secondary_every: config.refresh.secondary_every(),
            alert_every: config.alerts.every(),
        }
    }
}

#[async_trait]
impl LifecycleComponent for MonitorService {
    async fn on_init(&mut self) -> Result<()> {
        info!(
            "Monitor initializing (refresh {:?}, windows {:?}, alerts {:?})",
            self.primary_every, self.secondary_every, self.alert_every
        );
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        // First refresh runs now without holding up the listener.
        let boot = self.services.refresher.clone();
        tokio::spawn(async move {
            let _ = boot.refresh_primary().await;
        });

        let refresher = self.services.refresher.clone();
        let primary = Job::new_repeated_async(self.primary_every, move |_uuid, _l| {
            let refresher = refresher.clone();
            Box::pin(async move {
                let _ = refresher.refresh_primary().await;
            })
        })?;
        self.scheduler.add(primary).await?;

        let refresher = self.services.refresher.clone();
        let secondary = Job::new_repeated_async(self.secondary_every, move |_uuid, _l| {
            let refresher = refresher.clone();
            Box::pin(async move {
                refresher.refresh_secondary().await;
            })
        })?;
        self.scheduler.add(secondary).await?;

        let alerts = self.services.alerts.clone();
        let anomaly = Job::new_repeated_async(self.alert_every, move |_uuid, _l| {
            let alerts = alerts.clone();
            Box::pin(async move {
                alerts.tick().await;
            })
        })?;
        self.scheduler.add(anomaly).await?;

        info!(
            "Monitor scheduled: primary window {}, secondary windows {}",
            SessionWindow::Day.as_str(),
            SessionWindow::SECONDARY.map(SessionWindow::as_str).join("/")
        );
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        if let Err(e) = self.scheduler.shutdown().await {
            warn!("Monitor scheduler shutdown error: {}", e);
        }
        info!("Monitor stopped.");
        Ok(())
    }
}
