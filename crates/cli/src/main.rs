mod logging;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use reelay_core::item::short_id;
use reelay_core::{
    load_config, validate_config, Alerter, Announcer, DiscordWebhook, Publisher,
    RecordingSource, RetentionSweeper, RunConfig, RunOrchestrator, RunReport,
    SqliteTrackingStore, TrackingStore, YouTubeClient, ZoomClient,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Move new cloud recordings to YouTube and announce them on Discord.
#[derive(Debug, Parser)]
#[command(name = "reelay", version, about)]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "REELAY_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Maximum number of items to process in this run
    #[arg(long, value_name = "N")]
    max_items: Option<usize>,

    /// Show what would happen without downloading, uploading, announcing or
    /// changing the database
    #[arg(long)]
    dry_run: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(report) if report.is_healthy() => ExitCode::SUCCESS,
        Ok(report) => {
            error!(
                "Run finished unhealthy: {}",
                report.run_failure.as_deref().unwrap_or("unknown failure")
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            if tracing::dispatcher::has_been_set() {
                error!("Fatal error: {:#}", e);
            } else {
                eprintln!("Fatal error: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<RunReport> {
    let mut config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    if let Some(max_items) = cli.max_items {
        config.pipeline.max_items_per_run = max_items;
    }
    validate_config(&config).context("Configuration validation failed")?;

    logging::init(&config.logging, cli.verbose)?;

    info!("reelay {} starting", VERSION);
    info!("Database path: {:?}", config.database.path);
    info!("Download directory: {:?}", config.pipeline.download_dir);
    info!(
        "Max items per run: {}, alert threshold: {}, retention: {} days",
        config.pipeline.max_items_per_run,
        config.pipeline.alert_threshold,
        config.pipeline.retention_days
    );
    if cli.dry_run {
        warn!("DRY RUN: no changes will be made");
    }

    let store = if cli.dry_run {
        SqliteTrackingStore::open_read_only(&config.database.path)
    } else {
        SqliteTrackingStore::new(&config.database.path)
    };
    let store: Arc<dyn TrackingStore> =
        Arc::new(store.context("Failed to open tracking store")?);

    let source: Arc<dyn RecordingSource> =
        Arc::new(ZoomClient::new(config.zoom.clone()).context("Failed to create Zoom client")?);
    let publisher: Arc<dyn Publisher> = Arc::new(
        YouTubeClient::new(config.youtube.clone()).context("Failed to create YouTube client")?,
    );
    let discord = Arc::new(
        DiscordWebhook::new(config.discord.clone()).context("Failed to create Discord webhook")?,
    );
    let announcer: Arc<dyn Announcer> = discord.clone();
    let alerter: Arc<dyn Alerter> = discord;

    let run_config = RunConfig {
        dry_run: cli.dry_run,
        ..RunConfig::from_config(&config)
    };
    let sweeper = RetentionSweeper::from_days(
        config.pipeline.retention_days,
        config.pipeline.download_dir.clone(),
    );

    let orchestrator =
        RunOrchestrator::new(run_config, store, source, publisher, announcer, alerter)
            .with_retention(sweeper);

    let report = orchestrator.run().await.context("Run failed")?;
    log_report(&report);
    Ok(report)
}

fn log_report(report: &RunReport) {
    for planned in &report.planned {
        info!(
            "Planned: {} ({}) -> {}",
            planned.title,
            short_id(&planned.item_id),
            planned.action
        );
    }

    if let Some(sweep) = &report.sweep {
        if report.dry_run {
            for path in &sweep.would_delete {
                info!("Would delete: {}", path.display());
            }
        } else if sweep.failed > 0 {
            warn!("{} old artifacts could not be deleted", sweep.failed);
        }
    }

    if report.alerts_failed > 0 {
        warn!("{} alerts could not be delivered", report.alerts_failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "reelay",
            "--config",
            "/etc/reelay.toml",
            "--max-items",
            "5",
            "--dry-run",
            "-v",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("/etc/reelay.toml"));
        assert_eq!(cli.max_items, Some(5));
        assert!(cli.dry_run);
        assert!(cli.verbose);
    }

    #[test]
    fn test_rejects_non_numeric_max_items() {
        assert!(Cli::try_parse_from(["reelay", "--max-items", "many"]).is_err());
    }

    #[tokio::test]
    async fn test_missing_config_is_error() {
        let cli = Cli::try_parse_from(["reelay", "--config", "/nonexistent/reelay.toml"]).unwrap();
        let err = run(cli).await.unwrap_err();
        assert!(format!("{:#}", err).contains("not found"));
    }

    #[tokio::test]
    async fn test_zero_max_items_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[zoom]
client_id = "z"
client_secret = "z"

[youtube]
client_id = "y"
client_secret = "y"

[discord]
webhook_url = "https://discord.example/hook"
"#,
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "reelay",
            "--config",
            path.to_str().unwrap(),
            "--max-items",
            "0",
        ])
        .unwrap();
        let err = run(cli).await.unwrap_err();
        assert!(format!("{:#}", err).contains("max_items_per_run"));
    }
}
