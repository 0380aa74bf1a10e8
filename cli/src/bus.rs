//! JSON-lines bus host.
//!
//! Each input line is `{"id": <any>, "action": ..., ...}`. Every line is
//! dispatched on its own task, so an `abortChatRequest` can overtake the chat
//! call it cancels. Replies go through a single writer task and carry the
//! request's `id` back unchanged; order follows completion, not arrival.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use glimpse_engine::Gateway;
use glimpse_types::{BusRequest, BusResponse};

const REPLY_CHANNEL_CAPACITY: usize = 64;

pub async fn serve<R, W>(gateway: Arc<Gateway>, input: R, output: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<String>(REPLY_CHANNEL_CAPACITY);

    let writer = tokio::spawn(async move {
        let mut output = output;
        while let Some(line) = rx.recv().await {
            output.write_all(line.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }
        Ok::<(), std::io::Error>(())
    });

    tracing::info!("Bus host ready");

    let mut tasks = JoinSet::new();
    let mut lines = BufReader::new(input).lines();
    while let Some(line) = lines.next_line().await.context("failed to read bus input")? {
        if line.trim().is_empty() {
            continue;
        }
        let gateway = Arc::clone(&gateway);
        let tx = tx.clone();
        tasks.spawn(async move {
            let reply = handle_line(&gateway, &line).await;
            if tx.send(reply).await.is_err() {
                tracing::warn!("Bus writer closed; dropping reply");
            }
        });
    }

    tracing::info!(in_flight = tasks.len(), "Bus input closed; draining");
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::warn!("Bus task failed: {e}");
        }
    }

    drop(tx);
    writer
        .await
        .context("bus writer task panicked")?
        .context("failed to write bus output")?;
    Ok(())
}

async fn handle_line(gateway: &Gateway, line: &str) -> String {
    let envelope: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            return encode(None, &BusResponse::error(format!("Malformed request: {e}")));
        }
    };
    let id = envelope.get("id").cloned();

    let request: BusRequest = match serde_json::from_value(envelope) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!("Rejected bus request: {e}");
            return encode(id, &BusResponse::error(format!("Invalid request: {e}")));
        }
    };

    let response = gateway.dispatch(request).await;
    encode(id, &response)
}

fn encode(id: Option<Value>, response: &BusResponse) -> String {
    let mut value = match serde_json::to_value(response) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!("Failed to encode bus response: {e}");
            serde_json::json!({"status": "error", "message": "internal encoding failure"})
        }
    };
    if let (Some(id), Some(object)) = (id, value.as_object_mut()) {
        object.insert("id".to_string(), id);
    }
    value.to_string()
}
