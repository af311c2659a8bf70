use anyhow::Result;
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use crate::core::config::OpsConfig;
use crate::core::lifecycle::LifecycleManager;
use crate::core::monitor::{MonitorService, Services};
use crate::core::terminal::{self, GuideSection, print_error};
use crate::interfaces::web::{ApiServer, ApiServerConfig};
use crate::logging::LogFanout;

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Commands")
        .command("serve", "Run the collectors, the alert notifier and the API")
        .command("snapshot", "Collect once and print the per-agent overview")
        .command("check", "Evaluate the alert rules once without sending")
        .command("help", "Show this screen")
        .print();

    GuideSection::new("Flags")
        .command("--config <file>", "TOML config (default: $OPSDECK_CONFIG or data dir)")
        .command("--host <addr>", "Listen address for serve")
        .command("--port <port>", "Listen port for serve")
        .print();

    println!(
        "\n {} {} <command> [flags]\n",
        style("Usage:").bold(),
        style("opsdeck").green()
    );
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ServeFlags {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub config: Option<PathBuf>,
}

pub(crate) fn parse_serve_flags(args: &[String], start: usize) -> ServeFlags {
    let mut flags = ServeFlags::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                if i + 1 < args.len() {
                    flags.host = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--port" => {
                if i + 1 < args.len() {
                    flags.port = args[i + 1].parse().ok();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    flags.config = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    flags
}

pub(crate) fn parse_config_flag(args: &[String], start: usize) -> Option<PathBuf> {
    parse_serve_flags(args, start).config
}

fn init_quiet_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::WARN)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

async fn run_serve(flags: ServeFlags) -> Result<()> {
    let (make_writer, log_tx) = LogFanout::new(500);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(make_writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let mut config = OpsConfig::load(flags.config.as_deref()).await?;
    if let Some(host) = flags.host {
        config.server.host = host;
    }
    if let Some(port) = flags.port {
        config.server.port = port;
    }

    terminal::print_banner();
    info!("Starting opsdeck (tool: {})", config.tool.binary);

    let services = Services::from_config(&config).await;
    let mut lifecycle = LifecycleManager::new().await?;

    let monitor = MonitorService::new(services.clone(), lifecycle.scheduler.clone(), &config);
    lifecycle.attach(Arc::new(Mutex::new(monitor)));

    let stale_after_ms = i64::try_from(config.refresh.primary_every().as_millis())
        .unwrap_or(i64::MAX / 3)
        .saturating_mul(3);
    let api = ApiServer::new(ApiServerConfig {
        services,
        log_tx,
        host: config.server.host.clone(),
        port: config.server.port,
        client_dist: config.server.client_dist.clone(),
        stale_after_ms,
    });
    lifecycle.attach(Arc::new(Mutex::new(api)));

    lifecycle.start().await?;

    GuideSection::new("opsdeck")
        .status(
            "Dashboard",
            &format!(
                "{}",
                style(format!("http://{}:{}", config.server.host, config.server.port))
                    .underlined()
                    .cyan()
            ),
        )
        .status("Metrics DB", &config.storage.db_path.display().to_string())
        .blank()
        .status(
            "Press Ctrl+C to stop.",
            &format!("{}", style("Ctrl+C").bold().yellow()),
        )
        .print();
    println!();

    tokio::signal::ctrl_c().await?;
    lifecycle.shutdown().await?;
    terminal::print_goodbye();
    Ok(())
}

async fn run_snapshot(config_path: Option<PathBuf>) -> Result<()> {
    init_quiet_logging();
    let config = OpsConfig::load(config_path.as_deref()).await?;
    let services = Services::from_config(&config).await;
    let snapshot = services.refresher.refresh_primary().await?;

    let mut section = GuideSection::new(&format!(
        "Agents ({} ms, active window {} min)",
        snapshot.refresh_duration_ms, snapshot.active_minutes
    ));
    for agent in &snapshot.overview {
        let errors = if agent.cron_errors > 0 {
            style(format!("{} failing", agent.cron_errors)).red().to_string()
        } else {
            style("ok".to_string()).green().to_string()
        };
        section = section.status(
            &agent.name,
            &format!(
                "{} sessions, {} tokens, {} cron jobs, {}",
                agent.sessions_active, agent.tokens_24h, agent.cron_jobs, errors
            ),
        );
    }
    section.print();

    if let Some(store) = &services.store {
        terminal::print_info(&format!("Sample written to {}", store.path().display()));
    }
    Ok(())
}

async fn run_check(config_path: Option<PathBuf>) -> Result<()> {
    init_quiet_logging();
    let config = OpsConfig::load(config_path.as_deref()).await?;
    let services = Services::from_config(&config).await;
    let candidates = services.alerts.preview().await;

    if candidates.is_empty() {
        terminal::print_success("No alert conditions.");
        return Ok(());
    }

    let mut section = GuideSection::new("Alert candidates");
    for (candidate, due) in &candidates {
        let gate = if *due {
            style("due").red().bold().to_string()
        } else {
            style("cooling down").yellow().to_string()
        };
        section = section.status(
            candidate.kind.as_str(),
            &format!("{} [{}] {}", candidate.title, gate, candidate.dedup_key),
        );
    }
    section.print();
    Ok(())
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let Some(cmd) = args.get(1) else {
        print_help();
        return Ok(());
    };

    match cmd.as_str() {
        "serve" => run_serve(parse_serve_flags(&args, 2)).await,
        "snapshot" => run_snapshot(parse_config_flag(&args, 2)).await,
        "check" => run_check(parse_config_flag(&args, 2)).await,
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        _ => {
            print_error(&format!("Unknown command: {}", cmd));
            print_help();
            Ok(())
        }
    }
}
