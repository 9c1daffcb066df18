use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tracing::debug;

use crate::app_state::AppState;
use crate::services::hub::QueueHub;
use crate::services::subscription::Subscription;

/// Heartbeat ping interval in seconds.
const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// GET /ws/queue: live queue snapshots.
///
/// Sends the current queue as a JSON array on connect, then the full queue
/// again after every change. Client messages are read and ignored.
pub async fn queue_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let hub = Arc::clone(state.hub());
    ws.on_upgrade(move |socket| stream_queue(socket, hub))
}

async fn stream_queue(socket: WebSocket, hub: Arc<QueueHub>) {
    let (sender, mut receiver) = socket.split();
    let subscription = hub.subscribe();
    let subscriber_id = subscription.id();
    debug!(subscriber_id, "Queue observer connected");

    // A peer that stops reading stalls only the writer task; the hub detaches
    // its subscription once the buffer fills.
    let mut writer = tokio::spawn(forward_snapshots(sender, subscription));

    loop {
        tokio::select! {
            _ = &mut writer => break,
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    writer.abort();
    hub.detach(subscriber_id);
    debug!(subscriber_id, "Queue observer disconnected");
}

async fn forward_snapshots(
    mut sender: SplitSink<WebSocket, Message>,
    mut subscription: Subscription,
) {
    let mut heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    heartbeat.tick().await;

    loop {
        tokio::select! {
            snapshot = subscription.recv() => {
                let Some(snapshot) = snapshot else {
                    debug!(subscriber_id = subscription.id(), "Subscription ended by hub");
                    break;
                };
                let payload = match serde_json::to_string(snapshot.as_ref()) {
                    Ok(payload) => payload,
                    Err(e) => {
                        debug!(error = %e, "Failed to encode queue snapshot");
                        continue;
                    }
                };
                if sender.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }

            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = sender.close().await;
}
