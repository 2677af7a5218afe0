use anyhow::Result;
use cadmon_notify::plugin::ChannelRegistry;
use cadmon_server::api::{self, AppState};
use cadmon_server::builder;
use cadmon_server::config::ServerConfig;
use cadmon_storage::StateStore;
use chrono::Utc;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::signal;
use tokio::time::{interval, Duration};
use tracing_subscriber::EnvFilter;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cadmon-server [config.toml]          Start the server");
    eprintln!("  cadmon-server check <config.toml>    Validate configuration and exit");
}

#[tokio::main]
async fn main() -> Result<()> {
    cadmon_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("cadmon=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("check") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("check requires a <config.toml> argument")
            })?;
            run_check(config_path)
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            let config_path = args
                .get(1)
                .map(|s| s.as_str())
                .unwrap_or("config/cadmon.toml");
            run_server(config_path).await
        }
    }
}

/// Validates the configuration the same way startup does, without touching
/// the data directory.
fn run_check(config_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let engine = builder::build_engine(&config, None)?;
    let registry = ChannelRegistry::default();
    let notifier = builder::build_notifier(&config, &registry)?;

    tracing::info!(
        series = config.series.len(),
        alarms = engine.alarms().count(),
        composites = config.composites.len(),
        channels = notifier.channel_count(),
        "configuration OK"
    );
    Ok(())
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;

    tracing::info!(
        http_port = config.http_port,
        data_dir = %config.data_dir,
        series = config.series.len(),
        alarms = config.alarms.len(),
        composites = config.composites.len(),
        "cadmon-server starting"
    );

    // Configuration errors are fatal: never run with an invalid alarm.
    let store = Arc::new(StateStore::open(Path::new(&config.data_dir))?);
    let engine = builder::build_engine(&config, Some(&store))?;
    let registry = ChannelRegistry::default();
    let notifier = Arc::new(builder::build_notifier(&config, &registry)?);

    let state = AppState {
        engine: Arc::new(Mutex::new(engine)),
        store: store.clone(),
        notifier,
        start_time: Utc::now(),
    };

    // Periodic cleanup of aged buckets and transition history
    let retention_days = config.retention_days;
    let cleanup_store = store.clone();
    let cleanup_handle = tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(3600));
        loop {
            tick.tick().await;
            match cleanup_store.cleanup(retention_days) {
                Ok(removed) if removed > 0 => {
                    tracing::info!(removed, "cleaned up expired rows")
                }
                Err(e) => tracing::error!(error = %e, "cleanup failed"),
                _ => {}
            }
        }
    });

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let app = api::build_router(state);
    let listener = tokio::net::TcpListener::bind(http_addr).await?;

    tracing::info!(http = %http_addr, "server started");

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
        });

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server error");
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("shutting down gracefully");
        }
    }

    cleanup_handle.abort();
    tracing::info!("server stopped");

    Ok(())
}
