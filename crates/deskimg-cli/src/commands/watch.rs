use super::EXIT_SUCCESS;
use deskimg_engine::ImageProcessor;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

/// Activate the processor, mark the cluster ready, and print every event as a
/// JSON line until interrupted.
pub async fn run(processor: &ImageProcessor) -> Result<u8, String> {
    let mut events = processor.hub().subscribe();
    processor.start();
    processor.hub().publish_readiness(true);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    warn!("cannot listen for Ctrl-C: {e}");
                }
                debug!("interrupted, stopping watch");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    let line = serde_json::to_string(&event)
                        .map_err(|e| format!("JSON serialization failed: {e}"))?;
                    println!("{line}");
                }
                Err(RecvError::Lagged(n)) => warn!("dropped {n} events"),
                Err(RecvError::Closed) => break,
            }
        }
    }

    processor.stop();
    Ok(EXIT_SUCCESS)
}
