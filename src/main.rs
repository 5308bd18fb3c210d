use lotgate::config::Config;
use lotgate::server::{GatewayServer, GatewayState, PKG_NAME, VERSION};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lotgate=debug".parse().expect("valid log directive")),
        )
        .init();

    // Load configuration: a file argument wins, the process environment
    // otherwise
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => {
            let config = Config::load(&path).map_err(|e| {
                error!(path = %path.display(), error = %e, "Failed to load configuration");
                e
            })?;
            info!(path = %path.display(), "Configuration loaded from file");
            config
        }
        None => {
            let config = Config::from_env().map_err(|e| {
                error!(error = %e, "Failed to read configuration from environment");
                e
            })?;
            info!("Configuration loaded from environment");
            config
        }
    };

    // Print startup banner
    print_startup_banner(&config);

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let bind_addr: SocketAddr = config.server.listen_addr().parse().map_err(|e| {
        error!(bind = %config.server.bind, port = config.server.port, error = %e, "Invalid bind address");
        anyhow::anyhow!("Invalid bind address: {}", e)
    })?;

    let state = Arc::new(GatewayState::from_config(&config)?);
    let server = GatewayServer::new(bind_addr, state, shutdown_rx.clone());

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!(error = %e, "Gateway server error");
        }
    });

    // Wait for shutdown signal (Ctrl+C or SIGTERM)
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT (Ctrl+C), shutting down...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        info!("Received Ctrl+C, shutting down...");
    }

    // Signal shutdown
    let _ = shutdown_tx.send(true);

    // Wait for the server to stop (with timeout)
    let _ = tokio::time::timeout(Duration::from_secs(5), server_handle).await;

    info!("Shutdown complete");
    Ok(())
}

fn print_startup_banner(config: &Config) {
    info!(name = PKG_NAME, version = VERSION, "Starting gateway");
    info!(
        bind = %config.server.bind,
        port = config.server.port,
        max_body_bytes = config.server.max_body_bytes,
        upstream_timeout_secs = config.upstream.timeout_secs,
        "Server configuration"
    );
    info!(
        inventory_base_url = %config.upstream.inventory_base_url,
        adf_ingest_url = %config.upstream.adf_ingest_url,
        client_keys = config.access.client_keys.len(),
        allowed_origins = ?config.access.allowed_origins,
        "Upstream and access configuration"
    );

    // Key material itself never reaches the logs
    if config.upstream.api_key.is_empty() {
        warn!("api_key is empty; inventory resolve calls will go out unauthenticated");
    }
    if config.access.client_keys.is_empty() {
        warn!("client_keys is empty; every request will be rejected");
    }
    if config.access.allowed_origins.is_empty() {
        warn!("allowed_origins is empty; browser callers will get no CORS grant");
    }
    if config.upstream.inventory_base_url.is_empty() {
        warn!("inventory_base_url is empty; inventory requests will fail");
    }
    if config.upstream.adf_ingest_url.is_empty() {
        warn!("adf_ingest_url is empty; ADF forwarding will fail");
    }
}
