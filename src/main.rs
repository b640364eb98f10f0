use anyhow::{bail, Context};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use vigil::cli::{self, Cli, Commands};
use vigil::config::AppConfig;
use vigil::services::{HistoryRecorder, Metrics, StatusServer, StatusState};
use vigil::supervisor::{AlertManager, EventDispatcher, StateStore, Watchdog};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;

    match cli.command {
        Commands::Run => {
            init_logging(&config);
            run_daemon(config).await
        }
        Commands::Check => {
            init_logging(&config);
            run_check(config).await
        }
        Commands::Validate => {
            init_logging_simple();
            let targets = config.resolve_targets();
            println!("{}", cli::targets_table(&targets));
            println!(
                "configuration OK: {} target(s), {} notification channel(s)",
                targets.len(),
                config.notifications.len()
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status => {
            init_logging_simple();
            show_status(&config).await
        }
    }
}

fn init_logging(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter()));

    // `rolling::daily` panics when the first file cannot be created, so probe the directory first.
    let file_layer = config.log_dir.as_ref().and_then(|log_dir| {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!(
                "Warning: Could not create log directory {} ({}), file logging disabled",
                log_dir.display(),
                e
            );
            return None;
        }
        let probe = log_dir.join(".vigil_write_test");
        if let Err(e) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&probe)
        {
            eprintln!(
                "Warning: Could not write to log directory {} ({}), file logging disabled",
                log_dir.display(),
                e
            );
            return None;
        }
        let _ = std::fs::remove_file(&probe);

        let file_appender = tracing_appender::rolling::daily(log_dir, "vigil.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // The writer flushes on drop; the daemon lives until exit.
        Box::leak(Box::new(guard));

        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
    });

    let json_layer = config
        .log_json
        .then(|| tracing_subscriber::fmt::layer().json().with_target(true));
    let console_layer = (!config.log_json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .with(file_layer)
        .init();
}

fn init_logging_simple() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Engine with notification and history sinks wired in
async fn build_watchdog(
    config: &AppConfig,
    metrics: Arc<Metrics>,
) -> anyhow::Result<(Arc<Watchdog>, Option<Arc<HistoryRecorder>>)> {
    let mut dispatcher = EventDispatcher::new();

    let alerts = AlertManager::from_config(&config.notifications)
        .context("failed to set up notification channels")?;
    if !alerts.is_empty() {
        dispatcher.add_sink(Arc::new(alerts));
    }

    let history = match &config.history {
        Some(history_config) => Some(Arc::new(HistoryRecorder::open(history_config).await)),
        None => None,
    };
    if let Some(history) = &history {
        dispatcher.add_sink(history.clone());
    }

    let watchdog = Watchdog::from_config(config)
        .with_dispatcher(dispatcher)
        .with_metrics(metrics);
    watchdog
        .load_state()
        .await
        .context("failed to restore state")?;

    Ok((Arc::new(watchdog), history))
}

async fn run_daemon(config: AppConfig) -> anyhow::Result<ExitCode> {
    if config.interval_seconds == 0 {
        bail!("interval_seconds must be > 0 for daemon mode");
    }

    let metrics = Arc::new(Metrics::new());
    let (watchdog, history) = build_watchdog(&config, metrics.clone()).await?;

    if config.status.enabled {
        let mut state = StatusState::new(watchdog.clone())
            .with_metrics(metrics)
            .with_auth(config.status.auth.clone());
        if let Some(history) = history {
            state = state.with_history(history);
        }
        let server = StatusServer::new(Arc::new(state), &config.status.bind, config.status.port)?;
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!(error = %e, "status server stopped");
            }
        });
    }

    let mut engine = tokio::spawn({
        let watchdog = watchdog.clone();
        async move { watchdog.run().await }
    });

    tokio::select! {
        result = &mut engine => {
            result.context("watchdog task panicked")??;
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received, stopping watchdog");
            watchdog.stop();
            engine.await.context("watchdog task panicked")??;
        }
    }

    watchdog.flush_events().await;
    info!("vigil stopped");
    Ok(ExitCode::SUCCESS)
}

async fn run_check(config: AppConfig) -> anyhow::Result<ExitCode> {
    let (watchdog, _history) = build_watchdog(&config, Arc::new(Metrics::new())).await?;

    let healthy = watchdog.run_once().await;
    watchdog.flush_events().await;

    if healthy {
        info!("all targets healthy");
        Ok(ExitCode::SUCCESS)
    } else {
        warn!("one or more targets unhealthy");
        Ok(ExitCode::from(1))
    }
}

async fn show_status(config: &AppConfig) -> anyhow::Result<ExitCode> {
    let Some(path) = &config.state_file else {
        bail!("state_file is not configured");
    };

    match StateStore::new(path).load().await? {
        Some(snapshot) if !snapshot.targets.is_empty() => {
            println!("{}", cli::state_table(&snapshot));
            let unhealthy = snapshot.targets.values().filter(|s| !s.is_healthy).count();
            println!("{} target(s), {} unhealthy", snapshot.targets.len(), unhealthy);
        }
        _ => println!("no state recorded yet at {}", path.display()),
    }
    Ok(ExitCode::SUCCESS)
}
