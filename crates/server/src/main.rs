//! clipdock server binary.

use anyhow::{Context, Result};
use clap::Parser;
use clipdock_core::config::{AppConfig, RegistryConfig};
use clipdock_registry::{SessionRegistry, SqliteRegistry};
use clipdock_server::{create_router, AppState};
use clipdock_storage::ChunkStore;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// clipdock - chunked media upload server
#[derive(Parser, Debug)]
#[command(name = "clipdockd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "CLIPDOCK_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("clipdock v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration: optional TOML file, env vars override everything.
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    if config_path.exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("CLIPDOCK_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    clipdock_server::metrics::register_metrics();

    // Initialize storage and verify it before accepting requests; a
    // misconfigured backend should fail here, not mid-upload.
    let backend = clipdock_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    backend
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backend = backend.backend_name(), "Storage backend ready");

    // Initialize the session registry (runs migrations).
    let registry: Arc<dyn SessionRegistry> = match &config.registry {
        RegistryConfig::Sqlite { path } => Arc::new(
            SqliteRegistry::new(path)
                .await
                .context("failed to initialize session registry")?,
        ),
    };
    registry
        .health_check()
        .await
        .context("registry health check failed")?;
    tracing::info!("Session registry ready");

    let state = AppState::new(config.clone(), registry, ChunkStore::new(backend));

    // Background expiry sweep for abandoned sessions.
    let _sweeper = clipdock_server::sweep::spawn_sweeper(state.clone());
    tracing::info!(
        interval_secs = config.server.sweep_interval_secs,
        timeout_secs = config.server.session_timeout_secs,
        "Expiry sweeper spawned"
    );

    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
