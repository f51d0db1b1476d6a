//! WebSocket connection lifecycle.
//!
//! A socket belongs to one verified member of one room. It pushes that
//! member's own view after every committed change plus each new log entry,
//! and accepts the same actions as the HTTP endpoint.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::game::cards::Card;
use crate::game::log::LogEntry;
use crate::game::state::{DrawSource, PlayerId};
use crate::game::view::{GameStateView, RoomView};
use crate::game::GameError;
use crate::http::error::ApiError;
use crate::http::routes::{ActionName, ActionRequest, AppState};
use crate::room::{RoomEvent, RoomManager};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ClientKind { Ping, Draw, Swap, Discard, Dutch }

/// Same field rules as the HTTP body: the held card is never taken from
/// the client.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ClientMessage {
    #[serde(rename = "type")]
    kind: ClientKind,
    #[serde(default)]
    source: Option<DrawSource>,
    #[serde(default)]
    hand_index: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    /// Sent until the game is dealt.
    Room { room: RoomView },
    State { state: GameStateView },
    Log { entry: LogEntry },
    ActionResult {
        success: bool,
        #[serde(rename = "drawnCard", skip_serializing_if = "Option::is_none")]
        drawn_card: Option<Card>,
        version: u64,
    },
    Error { error: String, code: &'static str },
    Pong,
}

impl ServerMessage {
    fn from_error(err: &GameError) -> Self {
        ServerMessage::Error { error: err.public_message(), code: err.code() }
    }
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(WsQuery { token }): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let claims = state.tokens.verify(&token).map_err(|_| ApiError::Unauthenticated)?;
    // members only
    state.rooms.room(&room_id, claims.player).await?;
    let rooms = state.rooms.clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(rooms, room_id, claims.player, socket)))
}

async fn snapshot(rooms: &RoomManager, room_id: &str, player: PlayerId) -> Result<ServerMessage, GameError> {
    match rooms.state_for(room_id, player).await {
        Ok(state) => Ok(ServerMessage::State { state }),
        Err(GameError::NotFound(_)) => rooms.room(room_id, player).await.map(|room| ServerMessage::Room { room }),
        Err(err) => Err(err),
    }
}

async fn handle_socket(rooms: RoomManager, room_id: String, player: PlayerId, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (sv_tx, mut sv_rx) = mpsc::unbounded_channel::<ServerMessage>();
    // subscribe before the first snapshot so no change slips in between
    let mut events = rooms.subscribe(&room_id);

    let writer = tokio::spawn(async move {
        while let Some(msg) = sv_rx.recv().await {
            let Ok(text) = serde_json::to_string(&msg) else { continue };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    match snapshot(&rooms, &room_id, player).await {
        Ok(msg) => {
            let _ = sv_tx.send(msg);
        }
        Err(err) => {
            let _ = sv_tx.send(ServerMessage::from_error(&err));
            drop(sv_tx);
            let _ = writer.await;
            return;
        }
    }
    debug!(%room_id, %player, "ws connected");

    loop {
        tokio::select! {
            incoming = ws_rx.next() => {
                let Some(Ok(msg)) = incoming else { break };
                match msg {
                    Message::Text(txt) => {
                        let reply = on_client_text(&rooms, &room_id, player, &txt).await;
                        let _ = sv_tx.send(reply);
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            event = events.recv() => {
                match event {
                    Ok(RoomEvent::ActionAppended(entry)) => {
                        let _ = sv_tx.send(ServerMessage::Log { entry });
                    }
                    Ok(RoomEvent::StateChanged { .. }) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        match snapshot(&rooms, &room_id, player).await {
                            Ok(msg) => {
                                let _ = sv_tx.send(msg);
                            }
                            Err(err) => {
                                debug!(%room_id, %player, %err, "room gone, closing socket");
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    drop(sv_tx);
    let _ = writer.await;
    debug!(%room_id, %player, "ws closed");
}

async fn on_client_text(rooms: &RoomManager, room_id: &str, player: PlayerId, txt: &str) -> ServerMessage {
    let msg = match serde_json::from_str::<ClientMessage>(txt) {
        Ok(msg) => msg,
        Err(err) => return ServerMessage::from_error(&GameError::validation(format!("bad message: {err}"))),
    };
    let action = match msg.kind {
        ClientKind::Ping => return ServerMessage::Pong,
        ClientKind::Draw => ActionName::Draw,
        ClientKind::Swap => ActionName::Swap,
        ClientKind::Discard => ActionName::Discard,
        ClientKind::Dutch => ActionName::Dutch,
    };
    let request = ActionRequest { action, source: msg.source, hand_index: msg.hand_index };
    let result = match request.into_action() {
        Ok(action) => rooms.submit(room_id, player, action).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(receipt) => ServerMessage::ActionResult { success: true, drawn_card: receipt.drawn_card, version: receipt.version },
        Err(err) => ServerMessage::from_error(&err),
    }
}
