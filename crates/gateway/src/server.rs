//! HTTP/WebSocket server surface for the fanout gateway.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info};

use crate::commands::ServerMessage;
use crate::error::{GatewayError, Result};
use crate::fanout::Emission;
use crate::gateway::Gateway;

/// Build the gateway router: health probe plus the websocket endpoint.
pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(gateway)
}

/// GET /ws - websocket upgrade endpoint.
async fn ws_handler(ws: WebSocketUpgrade, State(gateway): State<Arc<Gateway>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, gateway))
}

/// Drive one websocket connection until either side closes it.
///
/// The socket is split so inbound commands and outbound emissions run
/// concurrently; registry cleanup happens on every exit path.
async fn handle_socket(socket: WebSocket, gateway: Arc<Gateway>) {
    let (mut sender, mut receiver) = socket.split();

    let (emission_tx, mut emission_rx) = tokio::sync::mpsc::unbounded_channel();
    let connection = gateway.registry().register(emission_tx).await;
    info!(%connection, "websocket connection established");

    loop {
        tokio::select! {
            frame = receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = gateway.apply_raw_command(connection, &text).await {
                            if let Err(e) = send_control(&mut sender, reply).await {
                                error!(%connection, error = %e, "failed to send reply");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Binary(_))) => {
                        let msg = ServerMessage::Error {
                            message: "binary frames not supported".to_string(),
                        };
                        if send_control(&mut sender, msg).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(%connection, "client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!(%connection, error = %e, "websocket read error");
                        break;
                    }
                }
            }
            emission = emission_rx.recv() => {
                match emission {
                    Some(emission) => {
                        if let Err(e) = send_emission(&mut sender, &emission).await {
                            error!(%connection, error = %e, "failed to deliver emission");
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    gateway.registry().deregister(connection).await;
    info!(%connection, "websocket connection closed");
}

async fn send_control(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let json =
        serde_json::to_string(&msg).map_err(|e| GatewayError::Serialization(e.to_string()))?;
    sender
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| GatewayError::Send(e.to_string()))
}

async fn send_emission(
    sender: &mut SplitSink<WebSocket, Message>,
    emission: &Emission,
) -> Result<()> {
    let json =
        serde_json::to_string(emission).map_err(|e| GatewayError::Serialization(e.to_string()))?;
    sender
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| GatewayError::Send(e.to_string()))
}
