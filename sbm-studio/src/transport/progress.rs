//! Progress forwarding
//!
//! Relays every `SbmEvent` on the bus to the transport writer as a
//! `{"type": "progress", "event": {...}}` line.

use super::command::ProgressMessage;
use sbm_common::events::EventBus;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Spawn the forwarder; it ends when `shutdown` fires or the writer is gone
pub fn spawn_progress_forwarder(
    event_bus: &EventBus,
    lines: mpsc::Sender<String>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = event_bus.subscribe();

    tokio::spawn(async move {
        debug!("Progress forwarder started");
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Progress forwarder lagged, events dropped");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            let event_type = event.event_type();
            match serde_json::to_string(&ProgressMessage::new(event)) {
                Ok(line) => {
                    if lines.send(line).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(event_type, error = %e, "Failed to serialize progress event"),
            }
        }
        debug!("Progress forwarder stopped");
    })
}
