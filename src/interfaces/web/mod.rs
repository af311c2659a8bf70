mod handlers;
mod router;

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use std::convert::Infallible;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{error, info};

use crate::core::lifecycle::LifecycleComponent;
use crate::core::monitor::Services;

pub struct ApiServer {
    config: ApiServerConfig,
    handle: Option<JoinHandle<()>>,
}

pub struct ApiServerConfig {
    pub services: Services,
    pub log_tx: tokio::sync::broadcast::Sender<String>,
    pub host: String,
    pub port: u16,
    pub client_dist: Option<PathBuf>,
    /// Cached reads older than this are reported as stale.
    pub stale_after_ms: i64,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) services: Services,
    pub(crate) log_tx: tokio::sync::broadcast::Sender<String>,
    pub(crate) api_port: u16,
    pub(crate) stale_after_ms: i64,
    pub(crate) client_dist: Option<PathBuf>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig) -> Self {
        Self {
            config,
            handle: None,
        }
    }
}

// --- SSE Logs (used by router) ---

async fn sse_logs_endpoint(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_tx.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| match msg {
        Ok(line) => Ok(Event::default().data(line)),
        Err(_) => Ok(Event::default().data("Log stream lagged")),
    });

    Sse::new(stream)
}

// --- Lifecycle Implementations ---

#[async_trait]
impl LifecycleComponent for ApiServer {
    async fn on_init(&mut self) -> Result<()> {
        info!("API Server initializing...");
        let missing = self
            .config
            .client_dist
            .as_ref()
            .filter(|dist| !dist.join("index.html").is_file());
        if let Some(dist) = missing {
            info!(
                "No dashboard build at {}, serving the API only.",
                dist.display()
            );
        }
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let state = AppState {
            services: self.config.services.clone(),
            log_tx: self.config.log_tx.clone(),
            api_port: self.config.port,
            stale_after_ms: self.config.stale_after_ms,
            client_dist: self
                .config
                .client_dist
                .clone()
                .filter(|dist| dist.join("index.html").is_file()),
        };
        let app = router::build_api_router(state);

        // Bind before returning so a taken port fails startup.
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("API Server running at http://{addr}");
        self.handle = Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("API Server crashed: {}", e);
            }
        }));
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("API Server shutting down...");
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        Ok(())
    }
}
