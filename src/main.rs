//! palaverd - Palaver collaboration daemon.
//!
//! A real-time hub server relaying chat, presence, voice, screen
//! share and content-feed events between many concurrent clients.

use std::path::Path;
use std::sync::Arc;

use palaverd::auth::InMemoryAuthProvider;
use palaverd::config::Config;
use palaverd::handlers::Registry;
use palaverd::network::Gateway;
use palaverd::repo::MemoryRepository;
use palaverd::state::Fabric;
use tracing::{error, info};

/// Resolve the configuration path from CLI arguments.
/// Supports `-c <path>`, `--config <path>`, or a bare path.
/// Falls back to `config.toml` when no argument is provided.
fn resolve_config_path() -> String {
    let mut args = std::env::args().skip(1);

    let raw_path = match args.next() {
        Some(flag) if flag == "-c" || flag == "--config" => args.next().unwrap_or_else(|| {
            eprintln!("Missing path after {}", flag);
            std::process::exit(1);
        }),
        Some(path) => path,
        None => "config.toml".to_string(),
    };

    match std::fs::canonicalize(Path::new(&raw_path)) {
        Ok(p) => p.to_string_lossy().into_owned(),
        Err(_) => raw_path,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first (before tracing, so we can use log_format)
    let config_path = resolve_config_path();

    let config = if Path::new(&config_path).exists() {
        Config::load(&config_path).map_err(|e| {
            eprintln!("ERROR: Failed to load config from {}: {}", config_path, e);
            e
        })?
    } else {
        eprintln!("No config at {}; using defaults", config_path);
        Config::default()
    };

    // Initialize tracing based on config
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match config.server.log_format {
        palaverd::config::LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .json()
                .init();
        }
        palaverd::config::LogFormat::Pretty => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .init();
        }
    }

    // Validate configuration
    if let Err(errors) = palaverd::config::validate(&config) {
        for err in &errors {
            error!(error = %err, "Configuration validation failed");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    info!(
        server = %config.server.name,
        listen = %config.listen.address,
        "Starting palaverd"
    );

    // Metrics registry + exporter
    palaverd::metrics::init();
    if config.server.metrics_port != 0 {
        let port = config.server.metrics_port;
        tokio::spawn(palaverd::http::run_http_server(port));
    }

    // Collaborators: in-process implementations for the single-binary
    // deployment. Embedders inject their own through Fabric::new.
    let repo = Arc::new(MemoryRepository::new());
    let auth = Arc::new(InMemoryAuthProvider::from_token_blocks(&config.tokens));
    if config.tokens.is_empty() {
        info!("No [[tokens]] configured - clients cannot authenticate until a provider is wired");
    } else {
        info!(count = config.tokens.len(), "Loaded auth tokens");
    }

    let fabric = Fabric::new(&config, repo, auth);
    let registry = Arc::new(Registry::new());
    info!("Fabric initialized");

    // Graceful shutdown on SIGINT/SIGTERM.
    {
        let lifecycle_fabric = fabric.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Shutdown signal - notifying connections");
            lifecycle_fabric.lifecycle.shutdown();
        });
    }

    let listener = tokio::net::TcpListener::bind(config.listen.address).await?;
    Gateway::new(fabric, registry).serve(listener).await
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
