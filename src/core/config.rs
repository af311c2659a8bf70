use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::platform::{NativePlatform, Platform};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Built dashboard assets served at `/`; absent means API only.
    pub client_dist: Option<PathBuf>,
    /// Externally reachable base URL used in alert link buttons.
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3412,
            client_dist: None,
            public_url: "http://127.0.0.1:3412".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Automation tool binary (looked up on PATH).
    pub binary: String,
    pub shell: String,
    pub task_list_script: Option<PathBuf>,
    pub task_capture_script: Option<PathBuf>,
    /// Trailing log lines requested per task from the lister.
    pub task_lines: usize,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            binary: "openclaw".to_string(),
            shell: NativePlatform::default_shell().to_string(),
            task_list_script: None,
            task_capture_script: None,
            task_lines: 40,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub primary_every_ms: u64,
    pub secondary_every_ms: u64,
    /// Reported alongside the overview.
    pub active_minutes: u32,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            primary_every_ms: 10_000,
            secondary_every_ms: 60_000,
            active_minutes: 1440,
        }
    }
}

impl RefreshConfig {
    pub fn primary_every(&self) -> Duration {
        Duration::from_millis(self.primary_every_ms.max(1_000))
    }

    pub fn secondary_every(&self) -> Duration {
        Duration::from_millis(self.secondary_every_ms.max(1_000))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub every_ms: u64,
    pub token_threshold: u64,
    pub idle_threshold_ms: i64,
    pub cooldown_ms: i64,
    /// How long sent-at entries are kept in the cooldown document.
    pub cooldown_retention_ms: i64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            every_ms: 60_000,
            token_threshold: 3_000_000,
            idle_threshold_ms: 2 * 60 * 1000,
            cooldown_ms: 30 * 60 * 1000,
            cooldown_retention_ms: 7 * 24 * 60 * 60 * 1000,
        }
    }
}

impl AlertConfig {
    pub fn every(&self) -> Duration {
        Duration::from_millis(self.every_ms.max(1_000))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub channel: String,
    pub target: String,
    /// Account used for the general alert channel.
    pub general_account: String,
    /// Account used for coding-session alerts; supports link buttons.
    pub secondary_account: String,
    /// Agent id recorded on idle-input alert events.
    pub coding_agent_id: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            channel: "telegram".to_string(),
            target: String::new(),
            general_account: "default".to_string(),
            secondary_account: "coding".to_string(),
            coding_agent_id: "coding".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    pub cooldown_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let state_dir = NativePlatform::data_dir().join("state");
        Self {
            db_path: state_dir.join("ops.db"),
            cooldown_path: state_dir.join("notify-state.json"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    pub server: ServerConfig,
    pub tool: ToolConfig,
    pub refresh: RefreshConfig,
    pub alerts: AlertConfig,
    pub notify: NotifyConfig,
    pub storage: StorageConfig,
}

impl OpsConfig {
    pub fn default_path() -> PathBuf {
        match std::env::var_os("OPSDECK_CONFIG") {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => NativePlatform::data_dir().join("opsdeck.toml"),
        }
    }

    /// Reads the TOML file when present, then layers environment overrides on top.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        let mut config = if path.exists() {
            let content = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let parsed: OpsConfig = toml::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            info!("Loaded config from {}", path.display());
            parsed
        } else {
            info!("No config at {}, using defaults.", path.display());
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(raw: Option<String>) -> Option<T> {
            raw.and_then(|v| v.trim().parse().ok())
        }

        if let Some(host) = lookup("HOST").filter(|v| !v.is_empty()) {
            self.server.host = host;
        }
        if let Some(port) = parsed(lookup("PORT")) {
            self.server.port = port;
        }
        if let Some(dist) = lookup("OPSDECK_CLIENT_DIST").filter(|v| !v.is_empty()) {
            self.server.client_dist = Some(PathBuf::from(dist));
        }
        if let Some(url) = lookup("OPSDECK_PUBLIC_URL").filter(|v| !v.is_empty()) {
            self.server.public_url = url;
        }
        if let Some(tool) = lookup("OPSDECK_TOOL").filter(|v| !v.is_empty()) {
            self.tool.binary = tool;
        }
        if let Some(ms) = parsed(lookup("REFRESH_EVERY_MS")) {
            self.refresh.primary_every_ms = ms;
        }
        if let Some(ms) = parsed(lookup("REFRESH_LONG_EVERY_MS")) {
            self.refresh.secondary_every_ms = ms;
        }
        if let Some(minutes) = parsed(lookup("ACTIVE_MINUTES")) {
            self.refresh.active_minutes = minutes;
        }
        if let Some(ms) = parsed(lookup("NOTIFY_EVERY_MS")) {
            self.alerts.every_ms = ms;
        }
        if let Some(tokens) = parsed(lookup("TOKEN_P0")) {
            self.alerts.token_threshold = tokens;
        }
        if let Some(ms) = parsed(lookup("IDLE_P0_MS")) {
            self.alerts.idle_threshold_ms = ms;
        }
        if let Some(ms) = parsed(lookup("NOTIFY_COOLDOWN_MS")) {
            self.alerts.cooldown_ms = ms;
        }
        if let Some(path) = lookup("DB_PATH").filter(|v| !v.is_empty()) {
            self.storage.db_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("NOTIFY_STATE_PATH").filter(|v| !v.is_empty()) {
            self.storage.cooldown_path = PathBuf::from(path);
        }
    }
}
