//! WebSocket channel that pushes live visit events to the dashboard

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use super::handlers::AppState;
use crate::live::LiveBroadcaster;

pub async fn live_socket(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let live = Arc::clone(&state.live);
    ws.on_upgrade(move |socket| forward_events(socket, live))
}

/// Relay broadcast events until either side goes away
///
/// The subscription lives as long as this task, so the connection leaves the
/// registry on every exit path.
async fn forward_events(mut socket: WebSocket, live: Arc<LiveBroadcaster>) {
    let mut subscription = live.subscribe();

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(payload) = event else { break };
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    // Inbound messages carry no meaning on this channel
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    debug!(connection = subscription.id(), "live socket finished");
}
