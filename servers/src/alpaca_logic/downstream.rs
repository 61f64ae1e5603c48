use anyhow::{Context, Result};
use std::path::Path;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};

pub type Output = Box<dyn AsyncWrite + Unpin + Send>;

/// Opens the frame destination: an append-mode file, or stdout when no path is set.
pub async fn open_output(path: Option<&Path>) -> Result<Output> {
    match path {
        Some(path) => {
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .with_context(|| format!("opening output file {}", path.display()))?;
            log::info!("Writing frames to {}", path.display());
            Ok(Box::new(file))
        }
        None => {
            log::info!("Writing frames to stdout");
            Ok(Box::new(tokio::io::stdout()))
        }
    }
}

/// Writes every frame as one line until the feed ends or shutdown is signalled.
/// Returns the number of frames written.
pub async fn run<W>(
    mut out: W,
    mut frames: mpsc::Receiver<Vec<u8>>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Downstream shutting down.");
                break;
            }
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    log::info!("Upstream feed closed.");
                    break;
                };
                out.write_all(&frame).await?;
                out.write_all(b"\n").await?;
                out.flush().await?;
                written += 1;
                log::debug!("Frame {} written ({} bytes)", written, frame.len());
            }
        }
    }
    out.flush().await?;
    log::info!("Downstream wrote {} frames", written);
    Ok(written)
}
