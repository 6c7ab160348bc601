//! Network listeners fronting the shared bridge
//!
//! Two entry points, one behavior: the persistent UI socket keeps a session
//! open and receives state-change pushes; the per-request endpoint serves
//! external callers one JSON document per connection. Both are thin
//! translators over [`Bridge::dispatch`].

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use super::Bridge;
use super::session::{respond_to_line, run_session};

/// Accept loop for the persistent embedded-UI socket.
///
/// Each connection gets its own session task and its own subscription to
/// service state events.
pub async fn serve_ui(bridge: Arc<Bridge>, listener: TcpListener) -> io::Result<()> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                tracing::warn!(error = %err, "failed to accept UI connection");
                continue;
            }
        };
        let bridge = bridge.clone();
        let events = bridge.supervisor().subscribe();
        tokio::spawn(async move {
            let (read_half, write_half) = stream.into_split();
            let reader = BufReader::new(read_half);
            if let Err(err) = run_session(bridge, reader, write_half, Some(events)).await {
                tracing::info!(peer = %peer, error = %err, "UI session ended with error");
            }
        });
    }
}

/// Accept loop for the per-request document endpoint used by external
/// callers: read one request, write one response, close.
pub async fn serve_rpc(bridge: Arc<Bridge>, listener: TcpListener) -> io::Result<()> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                tracing::warn!(error = %err, "failed to accept RPC connection");
                continue;
            }
        };
        let bridge = bridge.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_one_request(bridge, stream).await {
                tracing::info!(peer = %peer, error = %err, "RPC request failed");
            }
        });
    }
}

async fn handle_one_request(bridge: Arc<Bridge>, stream: TcpStream) -> io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    // One JSON document, terminated by newline or EOF.
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    if line.trim().is_empty() {
        return Ok(());
    }

    let response = respond_to_line(&bridge, &line).await;
    let mut buf = serde_json::to_vec(&response)?;
    buf.push(b'\n');
    write_half.write_all(&buf).await?;
    write_half.shutdown().await
}
