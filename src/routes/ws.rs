// WebSocket feed stream: welcome snapshot, then every published update

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use tokio::sync::broadcast;
use tokio::time::{Duration, timeout};

use super::AppState;
use crate::models::FeedUpdate;

pub(super) const WS_PING_INTERVAL: Duration = Duration::from_secs(30);
pub(super) const WS_SEND_TIMEOUT: Duration = Duration::from_secs(10);

pub(super) async fn ws_feed(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let feed = state.feed.clone();
    ws.on_upgrade(move |socket| async move {
        // Subscribe before the welcome snapshot so nothing published in between is lost.
        let mut rx = feed.updates();
        let welcome = FeedUpdate::Snapshot(Box::new(feed.current_snapshot()));
        if let Err(e) = stream_feed(socket, welcome, &mut rx).await {
            tracing::info!("Feed stream error: {}", e);
        }
    })
}

/// Sends one text frame; false once the client is gone or too slow.
async fn send_json(
    sink: &mut SplitSink<WebSocket, Message>,
    update: &FeedUpdate,
) -> anyhow::Result<bool> {
    let json = serde_json::to_string(update)?;
    let r = timeout(WS_SEND_TIMEOUT, sink.send(Message::Text(json.into()))).await;
    Ok(matches!(r, Ok(Ok(()))))
}

async fn stream_feed(
    socket: WebSocket,
    welcome: FeedUpdate,
    rx: &mut broadcast::Receiver<FeedUpdate>,
) -> anyhow::Result<()> {
    tracing::info!("Client connected to feed stream");
    let (mut sink, mut incoming) = socket.split();

    if !send_json(&mut sink, &welcome).await? {
        return Ok(());
    }

    let mut ping_interval = tokio::time::interval(WS_PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(update) => {
                        if !send_json(&mut sink, &update).await? {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("WebSocket /ws/feed client lagged, skipped {} messages", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            message = incoming.next() => {
                match message {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            _ = ping_interval.tick() => {
                let r = timeout(WS_SEND_TIMEOUT, sink.send(Message::Ping(Bytes::new()))).await;
                if !matches!(r, Ok(Ok(()))) {
                    break;
                }
            }
        }
    }
    tracing::info!("Client disconnected from feed stream");
    Ok(())
}
