//! Fireside gateway
//!
//! Serves the chat API on a local port and makes it reachable from the
//! internet through a supervised `cloudflared` tunnel.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use fireside_core::config::{Config, load_config};
use fireside_core::tracing_init::{default_filter, init_tracing};
use fireside_server::server::{AppState, build_router};
use fireside_server::storage::Database;
use fireside_server::tunnel::{RegistrationClient, TunnelConfig, TunnelOrchestrator};

#[derive(Parser, Debug)]
#[command(name = "fireside")]
#[command(version, about = "Fireside - self-hosted chat gateway with a managed public tunnel")]
struct Args {
    /// HTTP port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Data directory (database lives here)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Do not start a tunnel; the operator exposes the server themselves
    #[arg(long)]
    no_tunnel: bool,

    /// Tunnel binary name or path
    #[arg(long)]
    tunnel_bin: Option<String>,

    /// Name registration service base URL
    #[arg(long)]
    registration_url: Option<String>,

    /// Log level filter (e.g. "info", "debug", "warn")
    #[arg(long)]
    log_level: Option<String>,

    /// Shorthand for debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "FIRESIDE_LOG_JSON")]
    log_json: bool,

    /// Config file (defaults to ~/.fireside/settings.json)
    #[arg(long, env = "FIRESIDE_CONFIG")]
    config: Option<PathBuf>,
}

impl Args {
    /// Flags win over file and environment.
    fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(dir) = &self.data_dir {
            config.server.data_dir = Some(dir.clone());
        }
        if let Some(level) = &self.log_level {
            config.server.log_level.clone_from(level);
        }
        if let Some(bin) = &self.tunnel_bin {
            config.tunnel.binary.clone_from(bin);
        }
        if let Some(url) = &self.registration_url {
            config.tunnel.registration_url.clone_from(url);
        }
        if self.no_tunnel {
            config.tunnel.disabled = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;
    args.apply(&mut config);

    init_tracing(
        &default_filter(
            &["fireside", "fireside_server"],
            &config.server.log_level,
            args.verbose,
        ),
        args.log_json,
    );

    let port = config.server.port;
    info!(version = env!("CARGO_PKG_VERSION"), port, "Starting fireside");

    let db_path = config.server.resolved_data_dir().join("data.db");
    info!(path = %db_path.display(), "Opening database");
    let db = Database::open(&db_path).await?;
    let paused = db.is_paused().await?;

    let registration = RegistrationClient::new(&config.tunnel.registration_url)?;
    let tunnel = Arc::new(TunnelOrchestrator::new(
        TunnelConfig::from_settings(&config.tunnel, port),
        db.clone(),
        Some(registration.clone()),
    ));

    match tunnel.boot().await {
        Some(url) => info!(url = %url, "Public URL ready"),
        None => match tunnel.public_url().await {
            Ok(Some(url)) => info!(url = %url, mode = %tunnel.mode().await, "Using last known public URL"),
            Ok(None) => info!(mode = %tunnel.mode().await, "No public URL, reachable on the local network only"),
            Err(e) => warn!(error = %e, "Could not read stored public URL"),
        },
    }

    let app = build_router(AppState::new(db, Arc::clone(&tunnel), registration, paused));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Notify systemd that the gateway is ready to serve (unix only).
    #[cfg(unix)]
    sd_notify::notify(true, &[sd_notify::NotifyState::Ready])?;

    info!(addr = %addr, paused, "HTTP server ready");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tunnel.shutdown().await;
    info!("Fireside stopped");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Could not install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C shutdown signal"),
        () = sigterm => info!("Received SIGTERM shutdown signal"),
    }
}
