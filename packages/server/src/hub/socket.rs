use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info};

use super::{Hub, InboundContext, UserId};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// `GET /api/v1/ws?token=...`: upgrade and attach the socket to the hub.
///
/// The token is checked before the upgrade so a bad one gets a plain 401.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Result<Response, AppError> {
    let token = query.token.ok_or(AppError::TokenMissing)?;
    let user_id = state
        .authenticator
        .user_id(&token)
        .map_err(|_| AppError::TokenInvalid)?;

    let hub = Arc::clone(&state.hub);
    Ok(ws.on_upgrade(move |socket| serve_socket(hub, user_id, socket)))
}

/// Pump frames between one socket and the hub until either side goes away.
pub async fn serve_socket(hub: Arc<Hub>, user_id: UserId, socket: WebSocket) {
    let (connection, mut outbound) = hub.new_connection();
    let connection_id = connection.id();
    hub.register(user_id, connection);
    info!(user_id, connection_id, "Socket connected");

    let (mut sink, mut inbound) = socket.split();

    // Ends when the hub drops the connection (evicted or dead) or the peer
    // stops accepting writes.
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let ctx = InboundContext {
        user_id,
        connection_id,
    };

    loop {
        tokio::select! {
            _ = &mut writer => break,
            frame = inbound.next() => match frame {
                Some(Ok(Message::Text(text))) => hub.dispatch_inbound(ctx, text.as_str()).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(user_id, connection_id, error = %e, "Socket read failed");
                    break;
                }
            },
        }
    }

    hub.unregister(user_id, connection_id);
    writer.abort();
    info!(user_id, connection_id, "Socket disconnected");
}
