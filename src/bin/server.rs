//! txwatch server
//!
//! Runs the indexer against a JSON-RPC node and serves the HTTP surface.

use std::future::IntoFuture;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use txwatch::chain::JsonRpcClient;
use txwatch::config::{self, IndexerConfig};
use txwatch::indexer::{Engine, EngineConfig};
use txwatch::store::InMemoryTransactionStore;
use txwatch::subscriptions::SubscriptionRegistry;

// ═══════════════════════════════════════════════════════════════════════════════
// CLI
// ═══════════════════════════════════════════════════════════════════════════════

/// Subscription-gated Ethereum transaction indexer
#[derive(Parser)]
#[command(name = "txwatch-server")]
#[command(version = txwatch::VERSION)]
#[command(about = "Index transactions for subscribed addresses and serve them over HTTP", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, env = "TXWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// JSON-RPC endpoint of the chain node
    #[arg(long)]
    rpc_url: Option<String>,

    /// HTTP listen address
    #[arg(short, long)]
    bind: Option<String>,

    /// Seconds between polling ticks
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Blocks behind the head scanned at startup and on subscribe
    #[arg(long)]
    lookback: Option<u64>,
}

impl Cli {
    /// Defaults, then file, then environment, then flags
    fn into_config(self) -> anyhow::Result<IndexerConfig> {
        let base = match &self.config {
            Some(path) => IndexerConfig::load(path)?,
            None => IndexerConfig::default(),
        };

        let mut config = base.with_env();
        if let Some(url) = self.rpc_url {
            config.rpc_url = url;
        }
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(secs) = self.poll_interval {
            config.poll_interval_secs = secs;
        }
        if let Some(blocks) = self.lookback {
            config.lookback_blocks = blocks;
        }

        config.validate()?;
        Ok(config)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIGNALS
// ═══════════════════════════════════════════════════════════════════════════════

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAIN
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let rust_log = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_env_filter(config::log_filter(rust_log.as_deref()))
        .init();

    let config = cli.into_config()?;
    let addr = config.socket_addr()?;
    let grace = config.shutdown_grace();

    let reader = Arc::new(JsonRpcClient::new(config.rpc_client())?);
    let engine = Engine::new(
        EngineConfig::from(&config),
        reader,
        Arc::new(SubscriptionRegistry::new()),
        Arc::new(InMemoryTransactionStore::new()),
    );

    info!(rpc_url = %config.rpc_url, lookback = config.lookback_blocks, "Initializing indexer");
    engine
        .initialize()
        .await
        .context("indexer initialization failed")?;

    let (stop_polling, polling_stopped) = watch::channel(false);
    let poller = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run(polling_stopped).await }
    });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {}", addr))?;

    info!("Starting txwatch server on {}", addr);
    info!("API endpoints:");
    info!("  GET    /currentBlock          - Last indexed block");
    info!("  POST   /subscribe?address=    - Watch an address");
    info!("  DELETE /subscribe?address=    - Stop watching an address");
    info!("  GET    /transactions?address= - Transactions of a watched address");
    info!("  GET    /health                - Health check");
    info!("  GET    /status                - Indexer statistics");

    let (signalled_tx, mut signalled) = watch::channel(false);
    let server = axum::serve(listener, txwatch::rpc::router(engine.clone()))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = signalled_tx.send(true);
        })
        .into_future();

    let grace_elapsed = async {
        while !*signalled.borrow() {
            if signalled.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server => result.context("HTTP server failed")?,
        _ = grace_elapsed => warn!(?grace, "In-flight requests did not finish in time, closing"),
    }

    let _ = stop_polling.send(true);
    if let Err(e) = poller.await {
        error!(error = %e, "Polling task panicked");
    }

    engine.stop_backfills();
    if !engine.drain_backfills(grace).await {
        warn!("Backfills still running at shutdown, abandoning them");
    }

    info!("txwatch server shutdown complete");
    Ok(())
}
