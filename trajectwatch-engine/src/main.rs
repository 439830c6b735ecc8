use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use trajectwatch_core::logging::init_tracing;
use trajectwatch_core::WatchConfig;
use trajectwatch_engine::{
    build_provider, ConfigSummary, MeasurementLog, TrajectApiBuilder, TrajectDefaults,
    TrajectScheduler, TrajectService, TrajectStore,
};

/// Polls travel times for every registered traject and serves their history.
#[derive(Debug, Parser)]
#[command(name = "trajectwatch", version, about)]
struct Args {
    /// Address the HTTP API listens on.
    #[arg(long)]
    bind: Option<String>,

    /// Directory holding the traject store and the measurement logs.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory with static dashboard files served at `/`.
    #[arg(long)]
    public_dir: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, env = "TRAJECTWATCH_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Err(err) = init_tracing(args.log_level.as_deref()) {
        eprintln!("failed to initialise tracing: {err}");
    }

    let mut config = WatchConfig::from_env().context("failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.http_bind = bind;
    }
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if args.public_dir.is_some() {
        config.public_dir = args.public_dir;
    }

    let provider = build_provider(&config).context("failed to configure route provider")?;
    info!(
        provider = config.provider.as_str(),
        data_dir = %config.data_dir.display(),
        environment = ?config.environment,
        "configuration loaded"
    );

    let log = MeasurementLog::new(config.data_dir.clone());
    let store = TrajectStore::new(config.store_path(), TrajectDefaults::from(&config));
    let scheduler = TrajectScheduler::new(Arc::clone(&provider), log);
    let service = TrajectService::new(store, scheduler.clone());

    if let Some(seed) = &config.seed {
        if let Err(err) = service.seed_if_empty(seed).await {
            warn!(error = %err, "failed to seed traject from configuration");
        }
    }
    service.start_all().await;

    let result = TrajectApiBuilder::new(service)
        .config_summary(ConfigSummary::from(&config))
        .public_dir(config.public_dir.clone())
        .serve(&config.http_bind, shutdown_signal())
        .await
        .context("http server terminated with error");

    scheduler.shutdown();
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sigterm) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
