//! Newline-delimited JSON over a reader/writer pair
//!
//! One command per input line. Each command runs in its own task, so a
//! slow command never blocks the next line; responses and progress lines
//! share one writer task and may interleave.

use super::command::{Command, Response};
use super::progress::spawn_progress_forwarder;
use super::router::dispatch;
use crate::error::StudioError;
use crate::AppState;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const OUTBOUND_CAPACITY: usize = 256;

/// Serve commands from `reader` until EOF, writing every line to `writer`
pub async fn serve<R, W>(state: AppState, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);

    let writer_task = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let shutdown = CancellationToken::new();
    let forwarder = spawn_progress_forwarder(&state.event_bus, tx.clone(), shutdown.clone());

    info!("Command transport ready");
    let mut lines = reader.lines();
    let mut in_flight = JoinSet::new();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let command: Command = match serde_json::from_str(line) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "Malformed command line");
                let err = StudioError::InvalidPayload(format!("malformed command: {}", e));
                send(&tx, &Response::failure("", "", &err)).await;
                continue;
            }
        };

        let state = state.clone();
        let tx = tx.clone();
        in_flight.spawn(async move {
            let response = dispatch(&state, command).await;
            send(&tx, &response).await;
        });
    }

    debug!("Input closed, waiting for in-flight commands");
    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Command task panicked");
        }
    }

    shutdown.cancel();
    let _ = forwarder.await;
    drop(tx);

    match writer_task.await {
        Ok(result) => result,
        Err(e) => Err(std::io::Error::other(e)),
    }
}

async fn send(tx: &mpsc::Sender<String>, response: &Response) {
    match serde_json::to_string(response) {
        Ok(line) => {
            if tx.send(line).await.is_err() {
                warn!(id = %response.id, "Writer closed, response dropped");
            }
        }
        Err(e) => error!(id = %response.id, error = %e, "Failed to serialize response"),
    }
}
