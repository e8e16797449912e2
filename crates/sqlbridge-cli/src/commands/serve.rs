//! Serve command: newline-delimited JSON over stdio
//!
//! Each stdin line is one request; each stdout line is one reply. Replies
//! are written as they complete, which is not necessarily arrival order.
//! A line that is not a valid request still gets an error reply when it
//! carries a usable `id`; otherwise it is logged and skipped.

use sqlbridge_core::config::BridgeConfig;
use sqlbridge_core::protocol::{Request, Response};
use sqlbridge_core_types::RequestId;
use sqlbridge_engine::Worker;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

pub fn execute(config: BridgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(config))
}

async fn serve(config: BridgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let (mut port, handle) = Worker::new(config).spawn()?;
    let (reject_tx, mut reject_rx) = mpsc::unbounded_channel::<Response>();

    let requests = port.requests;
    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "stdin read failed");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            match Request::from_json(&line) {
                Ok(request) => {
                    if requests.send(request).is_err() {
                        break;
                    }
                }
                Err(err) => match salvage_id(&line) {
                    Some(id) => {
                        let _ = reject_tx.send(Response::from_outcome(id, Err(err)));
                    }
                    None => tracing::warn!(error = %err, "skipping request without an id"),
                },
            }
        }
        // Dropping `requests` lets the context drain and stop
    });

    let mut stdout = tokio::io::stdout();
    loop {
        let response = tokio::select! {
            Some(response) = port.responses.recv() => response,
            Some(response) = reject_rx.recv() => response,
            else => break,
        };
        let mut line = response.to_json()?;
        line.push('\n');
        stdout.write_all(line.as_bytes()).await?;
        stdout.flush().await?;
    }

    reader.await?;
    handle.join()?;
    Ok(())
}

/// Best-effort id recovery from a line that failed to decode as a request
fn salvage_id(line: &str) -> Option<RequestId> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    serde_json::from_value(value.get("id")?.clone()).ok()
}
