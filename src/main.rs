//! lrucached - memcached-compatible in-memory cache server
//!
//! Keeps entries in memory under a byte budget, reclaiming expired entries
//! first and then the least recently used ones.

// Use jemalloc for better multi-threaded performance
#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use lrucached::config::Config;
use lrucached::metrics::Metrics;
use lrucached::server::Server;
use lrucached::storage::{EntryStore, SystemClock, spawn_sweeper};
use std::sync::Arc;
use tokio::runtime::Builder;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting lrucached");

    // Load configuration
    let config = if let Some(config_path) = std::env::args().nth(1) {
        info!("Loading configuration from {}", config_path);
        Config::from_file(&config_path)?
    } else {
        info!("Using default configuration (set LRUCACHED_* env vars to customize)");
        Config::from_env()
    };
    config.validate()?;

    info!("Configuration: {:?}", config);

    // Build tokio runtime with configured worker threads
    let mut runtime_builder = Builder::new_multi_thread();
    if config.server.worker_threads > 0 {
        runtime_builder.worker_threads(config.server.worker_threads);
        info!("Using {} worker threads", config.server.worker_threads);
    } else {
        info!("Using default worker threads (auto-detected)");
    }
    let runtime = runtime_builder.enable_all().build()?;

    runtime.block_on(async_main(config))
}

async fn async_main(config: Config) -> anyhow::Result<()> {
    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    let metrics = Arc::new(Metrics::new());
    let store = Arc::new(EntryStore::new(
        &config.storage,
        Arc::new(SystemClock),
        metrics.clone(),
    ));

    let sweeper = config.storage.sweep_interval().map(|interval| {
        spawn_sweeper(Arc::clone(&store), interval, cancel_token.clone())
    });

    let server = Server::bind(
        config.server.clone(),
        Arc::clone(&store),
        Arc::clone(&metrics),
        cancel_token.clone(),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to bind {}: {e}", config.server.listen_addr()))?;

    // Setup signal handlers
    let cancel_for_signal = cancel_token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down...");
            }
            _ = async {
                #[cfg(unix)]
                {
                    use tokio::signal::unix::{signal, SignalKind};
                    match signal(SignalKind::terminate()) {
                        Ok(mut sigterm) => sigterm.recv().await,
                        Err(e) => {
                            error!("Failed to install SIGTERM handler: {}", e);
                            std::future::pending::<Option<()>>().await
                        }
                    }
                }
                #[cfg(not(unix))]
                {
                    std::future::pending::<Option<()>>().await
                }
            } => {
                info!("Received SIGTERM, shutting down...");
            }
        }
        cancel_for_signal.cancel();
    });

    // Run the main server
    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
    }

    if let Some(sweeper) = sweeper {
        if let Err(e) = sweeper.await {
            error!("Expiry sweeper failed: {}", e);
        }
    }
    store.shutdown();

    info!("lrucached stopped");
    Ok(())
}
