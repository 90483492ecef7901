//! logward-daemon entry point.
//!
//! Wires configuration, persistence, the analysis service, and the
//! recovery scheduler, then blocks until a shutdown signal arrives.
//!
//! Startup order: config -> tracing -> metrics -> store -> pattern
//! library -> analysis service -> recovery scheduler (which immediately
//! sweeps uploads left ANALYZING by a previous process).

mod cli;
mod logging;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;

use logward_analysis::PatternLibrary;
use logward_core::config::LogwardConfig;
use logward_core::metrics as m;
use logward_pipeline::{AnalysisService, FsContentSource, RecoveryScheduler};
use logward_store::SqliteStore;

use cli::DaemonCli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = load_config(&cli).await?;
    apply_cli_overrides(&mut config, &cli);
    config
        .validate()
        .context("configuration validation failed")?;

    if cli.validate {
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "logward-daemon starting");

    if config.metrics.enabled {
        install_metrics_recorder(config.metrics.port)?;
        tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
    }

    // Persistence
    let store = Arc::new(
        SqliteStore::new(&config.storage.database_url)
            .await
            .context("failed to initialize sqlite store")?,
    );

    // Pattern library: builtin + optional custom directory
    let mut library = PatternLibrary::builtin().context("failed to compile builtin patterns")?;
    if let Some(ref pattern_dir) = config.analysis.pattern_dir {
        match library.load_dir(pattern_dir).await {
            Ok(added) => tracing::info!(dir = %pattern_dir, added, "custom patterns loaded"),
            Err(e) => tracing::warn!(
                dir = %pattern_dir,
                error = %e,
                "failed to load custom pattern directory, continuing with builtins"
            ),
        }
    }

    let content = Arc::new(FsContentSource::new(
        config.storage.uploads_dir.clone(),
        config.storage.max_content_bytes,
    ));

    let service = AnalysisService::builder(config.clone())
        .store(store)
        .content_source(content)
        .pattern_library(library)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build analysis service: {e}"))?;
    tracing::info!("analysis service initialized");

    // Recovery scheduler: startup sweep now, stall sweep periodically
    let mut scheduler = RecoveryScheduler::new(service.clone(), &config.recovery);
    scheduler.start();

    let start_time = Instant::now();
    if config.metrics.enabled {
        metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    }

    tracing::info!("logward-daemon running");
    let signal = wait_for_shutdown_signal().await?;
    tracing::info!(signal, "shutdown signal received");

    scheduler.stop().await;

    if config.metrics.enabled {
        metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(start_time.elapsed().as_secs() as f64);
    }
    tracing::info!("logward-daemon shut down");
    Ok(())
}

/// Load the configuration file, falling back to defaults (plus
/// environment overrides) when the file does not exist.
async fn load_config(cli: &DaemonCli) -> Result<LogwardConfig> {
    if cli.config.exists() {
        LogwardConfig::load(&cli.config)
            .await
            .with_context(|| format!("failed to load config: {}", cli.config.display()))
    } else {
        eprintln!(
            "config file {} not found, using defaults with environment overrides",
            cli.config.display()
        );
        let mut config = LogwardConfig::default();
        config.apply_env_overrides();
        Ok(config)
    }
}

/// CLI flags take precedence over file and environment values.
fn apply_cli_overrides(config: &mut LogwardConfig, cli: &DaemonCli) {
    if let Some(ref level) = cli.log_level {
        config.general.log_level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.general.log_format = format.clone();
    }
    if let Some(ref uploads_dir) = cli.uploads_dir {
        config.storage.uploads_dir = uploads_dir.clone();
    }
}

/// Install the Prometheus metrics recorder with an HTTP listener.
fn install_metrics_recorder(port: u16) -> Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_take_precedence() {
        let mut config = LogwardConfig::default();
        let cli = DaemonCli {
            config: "logward.toml".into(),
            log_level: Some("debug".to_owned()),
            log_format: Some("pretty".to_owned()),
            uploads_dir: Some("/tmp/uploads".to_owned()),
            validate: false,
        };
        apply_cli_overrides(&mut config, &cli);
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.log_format, "pretty");
        assert_eq!(config.storage.uploads_dir, "/tmp/uploads");
    }

    #[tokio::test]
    async fn missing_config_file_falls_back_to_defaults() {
        let cli = DaemonCli {
            config: "/nonexistent/logward.toml".into(),
            log_level: None,
            log_format: None,
            uploads_dir: None,
            validate: false,
        };
        let config = load_config(&cli).await.unwrap();
        assert_eq!(config.general.log_level, "info");
    }
}
