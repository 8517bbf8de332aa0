//! Greenhouse Server - telemetry store and query API
//!
//! Usage:
//!   greenhouse [OPTIONS]
//!
//! Options:
//!   --config <PATH>     Configuration file (default: greenhouse.yml)
//!   --data-dir <PATH>   Data directory (overrides config)
//!   --port <PORT>       HTTP port (overrides config)
//!   --host <HOST>       Bind address (overrides config)
//!   --static-dir <PATH> Frontend directory served at / (overrides config)

mod config;
mod telemetry;

use clap::Parser;
use config::{ServerConfig, DEFAULT_CONFIG_FILE};
use greenhouse_api::{create_router, with_static_dir, AppState, StartupPhase, StartupState};
use greenhouse_ingest::IngestPipeline;
use greenhouse_storage::StorageEngine;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "greenhouse")]
#[command(about = "Greenhouse telemetry store: sensor ingestion and downsampled range queries")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Data directory (overrides config)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// HTTP port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Frontend directory served at / (overrides config)
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Write the default configuration to the config path and exit
    #[arg(long)]
    generate_config: bool,
}

impl Cli {
    /// Load the config file (defaults if absent) and apply overrides
    fn load_config(&self) -> anyhow::Result<ServerConfig> {
        let mut config = if self.config.exists() {
            ServerConfig::from_file(&self.config)?
        } else {
            ServerConfig::default()
        };

        if let Some(data_dir) = &self.data_dir {
            config.storage.data_dir = data_dir.clone();
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(static_dir) = &self.static_dir {
            config.server.static_dir = Some(static_dir.clone());
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.generate_config {
        ServerConfig::write_default(&cli.config)?;
        println!("Generated default configuration: {}", cli.config.display());
        return Ok(());
    }

    let config = cli.load_config()?;
    telemetry::init_logging(&config.logging)?;

    info!("Starting greenhouse v{}", env!("CARGO_PKG_VERSION"));
    if cli.config.exists() {
        info!("Loaded configuration from {}", cli.config.display());
    }
    info!("Data directory: {:?}", config.storage.data_dir);
    info!("WAL durability: {}", config.storage.wal_durability);
    info!(
        target_points = config.query.target_points,
        ladder = ?config.query.ladder.steps(),
        "Query settings"
    );
    info!("Query timeout: {} seconds", config.server.query_timeout_secs);
    info!("Max concurrent queries: {}", config.server.max_concurrent_queries);

    let startup_state = Arc::new(StartupState::new());
    let shutdown = CancellationToken::new();

    // Health/ready answer while the store is still recovering
    let app_state = Arc::new(AppState::new_initializing(
        config.query.clone(),
        Duration::from_secs(config.server.query_timeout_secs),
        config.server.max_concurrent_queries,
        Arc::clone(&startup_state),
    ));

    let request_timeout = Duration::from_secs(config.server.request_timeout_secs);
    let mut app = create_router(Arc::clone(&app_state), request_timeout);
    if let Some(static_dir) = &config.server.static_dir {
        if !static_dir.is_dir() {
            warn!("Static directory {} does not exist", static_dir.display());
        }
        info!("Serving frontend from {}", static_dir.display());
        app = with_static_dir(app, static_dir);
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Ingest endpoint: POST http://{}/api/ingest", addr);
    info!("Range endpoint: GET http://{}/api/range?from=&to=", addr);

    let init = tokio::spawn(initialize(
        config.clone(),
        Arc::clone(&app_state),
        Arc::clone(&startup_state),
        shutdown.clone(),
    ));

    tokio::spawn(wait_for_signal(shutdown.clone()));

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await?;

    // The ingestion consumer drains its queue once the token fires
    let startup_error = match init.await {
        Ok(Ok(ingest_task)) => {
            if let Err(e) = ingest_task.await {
                error!("Ingestion task failed: {}", e);
            }
            None
        }
        Ok(Err(e)) => Some(e),
        Err(e) => Some(e.into()),
    };

    if let Some(storage) = app_state.get_storage() {
        if let Err(e) = storage.shutdown() {
            error!("Error during shutdown: {}", e);
        }
    }
    info!("Shutdown complete");

    match startup_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Recover the store, start ingestion and mark the server ready
///
/// On failure the shutdown token is cancelled so the listener stops.
async fn initialize(
    config: ServerConfig,
    app_state: Arc<AppState>,
    startup_state: Arc<StartupState>,
    shutdown: CancellationToken,
) -> anyhow::Result<JoinHandle<()>> {
    startup_state.set_phase(StartupPhase::WalRecovery);
    info!("Initializing storage engine...");

    let storage_config = config.to_storage_config();
    let storage_result =
        tokio::task::spawn_blocking(move || StorageEngine::new(storage_config)).await;

    let storage = match storage_result {
        Ok(Ok(storage)) => Arc::new(storage),
        Ok(Err(e)) => {
            error!("Failed to initialize storage engine: {}", e);
            shutdown.cancel();
            return Err(e.into());
        }
        Err(e) => {
            error!("Storage initialization task panicked: {}", e);
            shutdown.cancel();
            return Err(e.into());
        }
    };
    info!(samples = storage.stats().sample_count, "Storage engine initialized");

    let (ingest, ingest_task) =
        IngestPipeline::start(storage.clone(), config.ingest.clone(), shutdown);

    app_state.set_storage(storage, ingest);
    startup_state.set_phase(StartupPhase::Ready);
    info!("Server is ready to accept requests");

    Ok(ingest_task)
}

/// Cancel `shutdown` on SIGINT or SIGTERM
async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("SIGINT received, shutting down gracefully...");
        }
        _ = terminate => {
            info!("SIGTERM received, shutting down gracefully...");
        }
        _ = shutdown.cancelled() => return,
    }

    shutdown.cancel();
}
