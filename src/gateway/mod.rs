//! Streaming gateway
//!
//! One WebSocket per session at `/ws` (new) or `/ws/{session_id}` (resume),
//! plus the auxiliary REST surface for sessions and workspace files.

mod connection;
mod http;
pub mod protocol;

pub use connection::{Connection, GatewayState, SandboxSessionBinder, SessionBinder};
pub use protocol::{ClientMessage, ConnectionEvent, ServerMessage};

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::Result;

/// Build the full gateway router.
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/ws", get(ws_connect))
        .route("/ws/{session_id}", get(ws_resume))
        .merge(http::routes())
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

/// Serve the gateway until the process is stopped.
pub async fn serve(state: Arc<GatewayState>) -> Result<()> {
    let address = format!(
        "{}:{}",
        state.config.server.bind, state.config.server.port
    );
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Gateway listening on {}", address);
    axum::serve(listener, router(state))
        .await
        .map_err(crate::error::Error::Io)?;
    Ok(())
}

async fn ws_connect(ws: WebSocketUpgrade, State(state): State<Arc<GatewayState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, None, state))
}

async fn ws_resume(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<Arc<GatewayState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, Some(session_id), state))
}

/// Drive one socket: spawn the writer, loop over client frames, and on the
/// way out cancel any running task and close the session.
async fn handle_socket(socket: WebSocket, requested: Option<String>, state: Arc<GatewayState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(e) => {
                    debug!("Failed to serialize frame: {}", e);
                    continue;
                }
            };
            if ws_tx.send(WsMessage::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.send(WsMessage::Close(None)).await;
    });

    let mut connection = Connection::new(state, tx, requested);
    connection.send_connected();

    while let Some(Ok(frame)) = ws_rx.next().await {
        match frame {
            WsMessage::Text(text) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(message) => connection.handle(message).await,
                Err(e) => {
                    debug!("Bad client frame: {}", e);
                    connection.handle_invalid_frame();
                }
            },
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    connection.shutdown().await;
    drop(connection);
    let _ = writer.await;
}
