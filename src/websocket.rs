use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::dispatch::dispatch;
use crate::session::SessionState;
use crate::traits::Warehouse;
use crate::types::{Outcome, Request};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub warehouse: Arc<dyn Warehouse>,
}

/// Handle WebSocket upgrade
pub async fn handle_websocket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// One connection's receive/dispatch/reply loop. The session lives exactly as
/// long as the socket; a malformed or failed request drops its reply and the
/// loop continues with the next message.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut session = SessionState::new(Arc::clone(&state.config));

    info!("new client connection established");

    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                warn!("websocket receive error: {e}");
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                let Some(reply) =
                    handle_text(text.as_str(), &mut session, state.warehouse.as_ref()).await
                else {
                    continue;
                };
                if let Err(e) = sender.send(Message::Text(reply.into())).await {
                    error!("failed to send reply: {e}");
                    break;
                }
            }
            Message::Close(_) => {
                info!("connection closed by client");
                break;
            }
            Message::Ping(data) => {
                if let Err(e) = sender.send(Message::Pong(data)).await {
                    error!("failed to send pong: {e}");
                    break;
                }
            }
            _ => {}
        }
    }

    info!("client connection terminated");
}

/// Decode, dispatch, and encode one inbound text message. `None` means no
/// reply goes out: undecodable input, side-effect-only requests, unmet
/// preconditions, and upstream failures all end here without disturbing the
/// session.
pub async fn handle_text(
    text: &str,
    session: &mut SessionState,
    warehouse: &dyn Warehouse,
) -> Option<String> {
    let request = match serde_json::from_str::<Request>(text) {
        Ok(request) => request,
        Err(e) => {
            debug!("dropping undecodable message: {e}");
            return None;
        }
    };
    let kind = request.kind();

    match dispatch(request, session, warehouse).await {
        Ok(Outcome::Reply(reply)) => match reply.into_text() {
            Ok(encoded) => Some(encoded),
            Err(e) => {
                error!("failed to encode {kind} reply: {e}");
                None
            }
        },
        Ok(Outcome::SideEffectOnly) | Ok(Outcome::Drop) => None,
        Err(e) => {
            warn!("{kind} request failed: {e}");
            None
        }
    }
}
