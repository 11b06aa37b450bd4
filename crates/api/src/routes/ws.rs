//! WebSocket endpoint for realtime task deltas
//!
//! One socket per session. The server pushes `task-updates` envelopes and
//! pings every 30 s; a client that misses the 10 s pong grace or lets its
//! outbound buffer fill is disconnected and expected to reconnect with
//! backoff, re-fetching current state over REST.

use crate::auth::AuthUser;
use crate::server::AppState;
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tasklane_common::{SessionId, UserId};
use tokio::time::Instant;
use tracing::{debug, info, instrument};

const PING_INTERVAL: Duration = Duration::from_secs(30);
const PONG_GRACE: Duration = Duration::from_secs(10);

#[instrument(skip(state, ws), fields(user_id = %auth.0))]
pub async fn ws_upgrade(
    State(state): State<AppState>,
    auth: AuthUser,
    ws: WebSocketUpgrade,
) -> Response {
    let user_id = auth.0;
    ws.on_upgrade(move |socket| drive_session(state, user_id, socket))
}

async fn drive_session(state: AppState, user_id: UserId, socket: WebSocket) {
    let session_id = SessionId::new();
    let mut outbound = state.registry.register(user_id, session_id);
    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut ping = tokio::time::interval(PING_INTERVAL);
    let mut last_pong = Instant::now();

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if ws_tx.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                // Registry closed the channel: we were evicted as slow.
                None => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            },
            _ = ping.tick() => {
                if last_pong.elapsed() > PING_INTERVAL + PONG_GRACE {
                    info!(session_id = %session_id, "Missed pong; closing session");
                    break;
                }
                if ws_tx.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            },
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Pong(_))) => last_pong = Instant::now(),
                Some(Ok(Message::Close(_))) | None => break,
                // Client frames carry only control traffic; data frames are
                // ignored rather than treated as errors.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(session_id = %session_id, error = %e, "WebSocket read error");
                    break;
                }
            },
        }
    }

    state.registry.deregister(user_id, session_id);
}
