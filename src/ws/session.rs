//! Per-connection streaming loop.
//!
//! A session alternates between polling the store (sending exactly one frame
//! per poll) and waiting for the client's next pull message. An idle wait
//! sends a keep-alive `{"type":"ping"}` and keeps waiting; it never triggers a
//! poll on its own.

use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;

use super::poller::Poller;
use crate::feeds::Feed;

const PING_FRAME: &str = r#"{"type":"ping"}"#;

/// Why a session reached `CLOSED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Client sent a close frame or the stream ended.
    ClientClosed,
    /// A frame could not be delivered.
    SendFailed,
    /// A poll failed; an error frame was sent best-effort.
    StoreError,
    /// The process is shutting down.
    Shutdown,
}

/// Outcome of one `AWAITING_CLIENT` phase.
enum Wake {
    Pull,
    End(SessionEnd),
}

async fn send_json<S>(tx: &mut S, value: &Value) -> bool
where
    S: Sink<Message> + Unpin,
{
    tx.send(Message::Text(value.to_string().into())).await.is_ok()
}

/// Resolves once the shutdown flag is set. Never resolves if the flag's
/// sender is gone without having set it.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let stop = *shutdown.borrow_and_update();
        if stop {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Drive one connection until it closes.
pub async fn run<F, S, R, E>(
    mut poller: Poller<F>,
    mut tx: S,
    mut rx: R,
    idle_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> SessionEnd
where
    F: Feed,
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let feed = poller.feed().name();
    let selector = poller.feed().selector();
    tracing::info!(feed, %selector, "session opened");

    let end = loop {
        // POLLING
        let frame = match poller.poll().await {
            Ok(records) => Value::Array(records),
            Err(e) => {
                tracing::error!(feed, %selector, "poll failed: {e}");
                let _ = send_json(&mut tx, &json!({ "error": e.client_message() })).await;
                let _ = tx.send(Message::Close(None)).await;
                break SessionEnd::StoreError;
            }
        };
        if !send_json(&mut tx, &frame).await {
            break SessionEnd::SendFailed;
        }

        // AWAITING_CLIENT
        match await_client(&mut tx, &mut rx, idle_timeout, &mut shutdown).await {
            Wake::Pull => continue,
            Wake::End(end) => break end,
        }
    };

    tracing::info!(feed, %selector, ?end, cursor = ?poller.cursor(), "session closed");
    end
}

async fn await_client<S, R, E>(
    tx: &mut S,
    rx: &mut R,
    idle_timeout: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> Wake
where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    loop {
        tokio::select! {
            _ = shutdown_requested(shutdown) => {
                let _ = tx.send(Message::Close(None)).await;
                return Wake::End(SessionEnd::Shutdown);
            }
            msg = tokio::time::timeout(idle_timeout, rx.next()) => match msg {
                Err(_) => {
                    tracing::debug!("client idle, sending keep-alive");
                    if tx.send(Message::Text(PING_FRAME.into())).await.is_err() {
                        return Wake::End(SessionEnd::SendFailed);
                    }
                }
                Ok(Some(Ok(Message::Text(text)))) if !text.as_str().is_empty() => {
                    return Wake::Pull;
                }
                Ok(Some(Ok(Message::Binary(bytes)))) if !bytes.is_empty() => {
                    return Wake::Pull;
                }
                Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                    return Wake::End(SessionEnd::ClientClosed);
                }
                Ok(Some(Err(e))) => {
                    tracing::debug!("client receive error: {e}");
                    return Wake::End(SessionEnd::ClientClosed);
                }
                // Empty pulls and control frames.
                Ok(Some(Ok(_))) => {}
            }
        }
    }
}
