//! WebSocket upgrade handler.

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use seatmeter_core::error::AppError;
use seatmeter_core::types::{ClientInfo, Identity};
use seatmeter_realtime::{Connected, ConnectionHandle, OutboundMessage};

use crate::error::ApiError;
use crate::extractors::PeerAddr;
use crate::state::AppState;

/// Query parameter for WebSocket authentication.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT access token.
    pub token: Option<String>,
}

/// GET /ws?token={jwt}
///
/// The credential is verified before the upgrade. A bad credential gets a
/// plain 401 and leaves no trace in the registry.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    PeerAddr(peer): PeerAddr,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some(token) = query.token.as_deref().filter(|t| !t.is_empty()) else {
        return ApiError::from(AppError::authentication("Missing token")).into_response();
    };

    let identity = match state.engine.authenticate(token).await {
        Ok(identity) => identity,
        Err(e) => {
            debug!(error = %e, "WebSocket credential rejected");
            return ApiError::from(e).into_response();
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let client = state.engine.admission.sessions().client_info(
        peer.as_deref(),
        header_str(&headers, "x-forwarded-for"),
        header_str(&headers, "user-agent"),
    );

    ws.on_upgrade(move |socket| handle_ws_connection(state, identity, client, socket))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Handles an established WebSocket connection.
async fn handle_ws_connection(
    state: AppState,
    identity: Identity,
    client: ClientInfo,
    socket: WebSocket,
) {
    let Connected {
        handle,
        outbound,
        evicted,
        meter,
    } = state.engine.connect(identity, client).await;

    info!(
        conn_id = %handle.id,
        user_id = %handle.user_id,
        evicted = evicted.len(),
        meter = ?meter,
        "WebSocket connection established"
    );

    let (ws_tx, mut ws_rx) = socket.split();
    let writer = tokio::spawn(forward_outbound(Arc::clone(&handle), ws_tx, outbound));
    let closed = handle.close_signal();

    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    state.engine.handle_inbound(&handle, text.as_str()).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(conn_id = %handle.id, error = %e, "WebSocket error");
                    break;
                }
            },
        }
    }

    state.engine.disconnect(&handle).await;
    if let Err(e) = writer.await {
        warn!(conn_id = %handle.id, error = %e, "Outbound writer failed");
    }

    info!(
        conn_id = %handle.id,
        user_id = %handle.user_id,
        "WebSocket connection closed"
    );
}

/// Writes queued messages until the connection is closed, then flushes
/// whatever is still queued so a close reason always goes out first.
async fn forward_outbound(
    handle: Arc<ConnectionHandle>,
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<OutboundMessage>,
) {
    let closed = handle.close_signal();

    loop {
        tokio::select! {
            biased;

            msg = outbound.recv() => match msg {
                Some(msg) => {
                    if !send_json(&mut ws_tx, &msg).await {
                        handle.mark_dead();
                        return;
                    }
                }
                None => break,
            },
            _ = closed.cancelled() => {
                while let Ok(msg) = outbound.try_recv() {
                    if !send_json(&mut ws_tx, &msg).await {
                        return;
                    }
                }
                break;
            }
        }
    }

    if ws_tx.send(Message::Close(None)).await.is_err() {
        debug!(conn_id = %handle.id, "Peer gone before close frame");
    }
}

async fn send_json(ws_tx: &mut SplitSink<WebSocket, Message>, msg: &OutboundMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(text) => ws_tx.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            warn!(kind = msg.kind(), error = %e, "Failed to serialize outbound message");
            true
        }
    }
}
