use anyhow::Result;
use tokio::signal;
use tokio::sync::{broadcast, mpsc};

mod alpaca_logic;
use alpaca_logic::{config, downstream, logger, upstream};

/// Frames buffered between the feed and the writer before the feed blocks.
const FRAME_BUFFER: usize = 1024;

#[tokio::main]
async fn main() -> Result<()> {
    // Explicitly install the default crypto provider for rustls
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = config::load_config();
    let log_dir = config.log_dir.clone().unwrap_or_else(|| "./logs".into());
    let log_level = config.log_level.clone().unwrap_or_else(|| "info".to_string());
    logger::setup_logging(&log_dir, &log_level)?;

    let client = config.client_config()?;
    let policy = upstream::ReconnectPolicy::from_config(&config);
    let output = downstream::open_output(config.output_path.as_deref()).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let (frame_tx, frame_rx) = mpsc::channel(FRAME_BUFFER);

    let upstream_handle = tokio::spawn(upstream::run(
        client,
        policy,
        frame_tx,
        shutdown_tx.subscribe(),
    ));

    let mut downstream_handle = tokio::spawn(downstream::run(
        output,
        frame_rx,
        shutdown_tx.subscribe(),
    ));

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = terminate() => {
            log::info!("SIGTERM received, initiating shutdown.");
        }
        res = &mut downstream_handle => {
            match res {
                Ok(Ok(count)) => log::info!("Downstream finished after {} frames.", count),
                Ok(Err(e)) => log::error!("Downstream failed: {:#}", e),
                Err(e) => log::error!("Downstream task panicked: {}", e),
            }
            let _ = shutdown_tx.send(());
            let _ = upstream_handle.await;
            log::info!("Shutdown complete.");
            return Ok(());
        }
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());

    // Wait for components to shut down
    let (_, downstream_res) = tokio::try_join!(upstream_handle, downstream_handle)?;
    if let Err(e) = downstream_res {
        log::error!("Downstream failed: {:#}", e);
    }

    log::info!("Shutdown complete.");
    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut term_signal) => {
            term_signal.recv().await;
        }
        Err(e) => {
            log::warn!("Unable to listen for SIGTERM: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    // On non-unix platforms, just wait forever.
    std::future::pending::<()>().await;
}
