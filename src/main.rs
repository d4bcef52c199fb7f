use std::sync::Arc;

use merkle_bridge_relayer::checkpoint::{CheckpointStore, FileCheckpointStore};
use merkle_bridge_relayer::config::Config;
use merkle_bridge_relayer::processor::EventProcessor;
use merkle_bridge_relayer::relayer::Relayer;
use merkle_bridge_relayer::scheduler::{CleanupScheduler, RetryScheduler};
use merkle_bridge_relayer::watchers::WatcherManager;
use merkle_bridge_relayer::{api, types::BridgeEvent};

fn main() -> eyre::Result<()> {
    // Install color-eyre for better error reporting
    color_eyre::install()?;

    // Run the async main
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    tracing::info!("Starting Merkle bridge relayer");

    let config = Config::load()?;
    tracing::info!(
        chains = ?config.chain_names(),
        checkpoint_path = %config.checkpoint_path.display(),
        "Configuration loaded"
    );

    let checkpoints: Arc<dyn CheckpointStore> =
        Arc::new(FileCheckpointStore::new(config.checkpoint_path.clone()));
    checkpoints.init(&config.chain_names()).await?;
    tracing::info!("Checkpoint store initialized");

    let api_port = config.api_port;
    let relayer = Arc::new(Relayer::new(config)?);

    // Create shutdown channels
    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    let (shutdown_tx2, shutdown_rx2) = tokio::sync::mpsc::channel::<()>(1);
    let (shutdown_tx3, shutdown_rx3) = tokio::sync::mpsc::channel::<()>(1);
    let (shutdown_tx4, shutdown_rx4) = tokio::sync::mpsc::channel::<()>(1);

    // Setup signal handlers
    let shutdown_tx_signal = shutdown_tx.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx_signal.send(()).await;
        let _ = shutdown_tx2.send(()).await;
        let _ = shutdown_tx3.send(()).await;
        let _ = shutdown_tx4.send(()).await;
    });

    // Event pipeline: watchers -> processor -> relayer workers
    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel::<(String, BridgeEvent)>();
    let watcher_manager = WatcherManager::new(&relayer, checkpoints, events_tx)?;
    let processor = EventProcessor::new(relayer.clone());
    let retry_scheduler = RetryScheduler::new(relayer.clone());
    let cleanup_scheduler = CleanupScheduler::new(relayer.clone());

    tracing::info!("Managers initialized, starting processing");

    // Start metrics/API server
    let api_addr = std::net::SocketAddr::from(([0, 0, 0, 0], api_port));
    let api_relayer = relayer.clone();
    tokio::spawn(async move {
        if let Err(e) = api::start_api_server(api_addr, api_relayer).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    // Run watchers, processor, and schedulers concurrently
    tokio::select! {
        result = watcher_manager.run(shutdown_rx) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Watcher manager error");
            }
        }
        _ = processor.run(events_rx, shutdown_rx2) => {}
        _ = retry_scheduler.run(shutdown_rx3) => {}
        _ = cleanup_scheduler.run(shutdown_rx4) => {}
    }

    tracing::info!("Merkle bridge relayer stopped");
    Ok(())
}

/// Initialize tracing/logging with structured output
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,merkle_bridge_relayer=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(filter)
        .init();
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
