//! NDJSON session over one logical connection
//!
//! One request line in, one response line out. Malformed lines produce a
//! parse-error response with a null id rather than dropping the connection.
//! When an event receiver is supplied, service state changes are pushed to
//! the peer as id-less notification lines between responses.

use std::io;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;

use super::Bridge;
use super::command::{RequestEnvelope, ResponseEnvelope};
use crate::error::BridgeError;
use crate::supervisor::StateEvent;

/// Drive one connection until the peer disconnects.
///
/// `events` enables state-change pushes; pass `None` for request/response
/// only sessions.
pub async fn run_session<R, W>(
    bridge: Arc<Bridge>,
    reader: R,
    mut writer: W,
    mut events: Option<broadcast::Receiver<StateEvent>>,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let response = respond_to_line(&bridge, &line).await;
                write_json_line(&mut writer, &response).await?;
            }
            event = next_event(&mut events) => {
                match event {
                    Some(event) => {
                        let push = json!({
                            "event": "service_state",
                            "service": event.service,
                            "state": event.state,
                        });
                        write_json_line(&mut writer, &push).await?;
                    }
                    // Event source closed; keep serving requests.
                    None => events = None,
                }
            }
        }
    }
    Ok(())
}

/// Decode one request line and dispatch it. Never fails: undecodable input
/// becomes a parse-error response.
pub async fn respond_to_line(bridge: &Bridge, line: &str) -> ResponseEnvelope {
    match serde_json::from_str::<RequestEnvelope>(line) {
        Ok(request) => bridge.dispatch(request).await,
        Err(err) => ResponseEnvelope::failure(
            Value::Null,
            BridgeError::Parse(err.to_string()).to_wire(),
        ),
    }
}

async fn next_event(
    events: &mut Option<broadcast::Receiver<StateEvent>>,
) -> Option<StateEvent> {
    let Some(receiver) = events.as_mut() else {
        return futures::future::pending().await;
    };
    loop {
        match receiver.recv().await {
            Ok(event) => return Some(event),
            // A slow session may drop events; resume from the current tail.
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "session lagged behind state events");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

async fn write_json_line<W, T>(writer: &mut W, payload: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut buf = serde_json::to_vec(payload)?;
    buf.push(b'\n');
    writer.write_all(&buf).await?;
    writer.flush().await
}
