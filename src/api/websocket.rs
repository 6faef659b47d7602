//! WebSocket handler for real-time log streaming
//!
//! Each connection registers a sink with the [`LogBroadcaster`] and then
//! steers its own subscriptions with `subscribe`/`unsubscribe` control
//! messages. Only services the client subscribed to are streamed.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    api::state::ApiState,
    broadcast::{ControlMessage, LogPush, LogSink, SinkError},
    model::LogRecord,
};

/// Outbound frames buffered per connection before the sink counts as stalled
const OUTBOUND_BUFFER: usize = 64;

/// Bridges the broadcaster to one WebSocket connection
struct WsSink {
    tx: mpsc::Sender<String>,
}

#[async_trait]
impl LogSink for WsSink {
    async fn send_logs(&self, service_id: u64, records: &[LogRecord]) -> Result<(), SinkError> {
        let frame = serde_json::to_string(&LogPush::new(service_id, records))
            .map_err(|_| SinkError::Closed)?;
        self.tx.send(frame).await.map_err(|_| SinkError::Closed)
    }
}

/// WebSocket upgrade handler
///
/// GET /api/v1/stream/logs
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, state: ApiState) {
    info!("WebSocket client connected");

    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
    let connection = state.broadcaster.register(Arc::new(WsSink { tx })).await;

    // Forward frames queued by the broadcaster to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame)).await.is_err() {
                debug!("WebSocket send failed, client disconnected");
                break;
            }
        }
    });

    // Handle subscription control messages from the client
    let broadcaster = state.broadcaster.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ControlMessage>(&text) {
                    Ok(control) => broadcaster.handle_control(connection, control).await,
                    Err(err) => {
                        warn!("Ignoring malformed control message: {err}");
                    }
                },
                Message::Close(_) => break,
                Message::Ping(_) => {
                    // Pong is automatically sent by axum
                    debug!("Received ping");
                }
                _ => {
                    // Ignore other message types
                }
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    state.broadcaster.on_connection_closed(connection).await;
    info!("WebSocket client disconnected");
}
