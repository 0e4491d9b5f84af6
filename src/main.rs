//! Polystore -- multi-model store server.
//!
//! Serves the public API on `server.host:server.port` and, with clustering
//! enabled, the peer protocol on `0.0.0.0:cluster.listen_port`. SIGTERM and
//! SIGINT stop both listeners, then the cluster loops, within
//! `server.shutdown_timeout` seconds.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use polystore::cluster::{ClusterController, HttpTransport};
use polystore::config::{resolve_config, LoggingConfig};
use polystore::store::MultiModelStore;
use polystore::AppState;

/// Command-line arguments for the Polystore server.
#[derive(Parser, Debug)]
#[command(
    name = "polystore",
    version,
    about = "Multi-model store with peer clustering"
)]
struct Cli {
    /// Path to a YAML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<String>,

    /// Override the public bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    if logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = resolve_config(cli.config.as_deref())?;
    init_tracing(&config.logging);
    if let Some(path) = &cli.config {
        info!("Loaded configuration from {path}");
    }

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    if config.observability.metrics {
        polystore::metrics::init_metrics();
        polystore::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let store = Arc::new(MultiModelStore::new());

    let cluster = if config.cluster.enabled {
        let timeout = Duration::from_secs(config.cluster.request_timeout_secs);
        let transport = Arc::new(HttpTransport::new(timeout)?);
        let controller = Arc::new(ClusterController::new(&config.cluster, transport));
        controller.start(
            Duration::from_secs(config.cluster.heartbeat_interval_secs),
            Duration::from_secs(config.cluster.gossip_interval_secs),
        );
        Some(controller)
    } else {
        info!("Clustering disabled");
        None
    };

    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        cluster: cluster.clone(),
    });

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let mut servers = tokio::task::JoinSet::new();

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Polystore listening on {bind_addr}");
    let public = polystore::server::app(state.clone());
    let token = shutdown.clone();
    servers.spawn(async move {
        axum::serve(listener, public)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
    });

    if let Some(controller) = &cluster {
        let cluster_addr = format!("0.0.0.0:{}", config.cluster.listen_port);
        let listener = tokio::net::TcpListener::bind(&cluster_addr).await?;
        info!(node_id = %controller.self_node().id, "Cluster listener on {cluster_addr}");
        let peer = polystore::server::cluster_app(state.clone());
        let token = shutdown.clone();
        servers.spawn(async move {
            axum::serve(listener, peer)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
        });

        controller.join_seeds(&config.cluster.seeds).await;
    }

    // A listener that exits on its own takes the whole process down.
    tokio::select! {
        _ = shutdown.cancelled() => {}
        Some(result) = servers.join_next() => {
            warn!("listener exited unexpectedly: {result:?}");
            shutdown.cancel();
        }
    }

    let drain = async {
        while let Some(result) = servers.join_next().await {
            match result {
                Ok(Err(e)) => warn!("listener error: {e}"),
                Err(e) => warn!("listener task failed: {e}"),
                Ok(Ok(())) => {}
            }
        }
        if let Some(controller) = &cluster {
            controller.stop().await;
        }
    };
    let grace = Duration::from_secs(config.server.shutdown_timeout);
    if tokio::time::timeout(grace, drain).await.is_err() {
        warn!("shutdown timed out after {}s", grace.as_secs());
    }

    info!("Polystore shut down");
    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
}
