//! HTTP routes: players, rooms, actions, state and log queries, health.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{self, StatusCode, header};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::game::actions::Action;
use crate::game::cards::Card;
use crate::game::deal::MAX_PLAYERS;
use crate::game::log::LogEntry;
use crate::game::state::{DrawSource, PlayerId};
use crate::game::view::{GameStateView, RoomView};
use crate::game::GameError;
use crate::http::auth::Identity;
use crate::http::error::ApiError;
use crate::room::RoomManager;
use crate::util::token::TokenSigner;
use crate::ws;

const MAX_NAME_LEN: usize = 32;

#[derive(Clone)]
pub struct AppState {
    pub rooms: RoomManager,
    pub tokens: Arc<TokenSigner>,
}

impl AppState {
    pub fn new(rooms: RoomManager, hmac_key: [u8; 32]) -> Self {
        Self { rooms, tokens: Arc::new(TokenSigner::new(hmac_key)) }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/api/players", post(register))
        .route("/api/rooms", post(create_room))
        .route("/api/rooms/join", post(join_room))
        .route("/api/rooms/:room_id", get(get_room).delete(delete_room))
        .route("/api/rooms/:room_id/start", post(start_game))
        .route("/api/rooms/:room_id/memorized", post(end_memorizing))
        .route("/api/rooms/:room_id/actions", post(submit_action))
        .route("/api/rooms/:room_id/state", get(game_state))
        .route("/api/rooms/:room_id/log", get(action_log))
        .route("/api/rooms/:room_id/ws", get(ws::connection::ws_handler))
        .layer(
            CorsLayer::new()
                .allow_methods([http::Method::GET, http::Method::POST, http::Method::DELETE])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str { "ok" }

/// Turns a body rejection into the common error shape.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(v)| v)
        .map_err(|rejection| GameError::validation(rejection.body_text()).into())
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub player_id: PlayerId,
    pub name: String,
    pub token: String,
}

async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let req = body(payload)?;
    let name = req.name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(GameError::validation(format!("name must be 1..={MAX_NAME_LEN} characters")).into());
    }
    let player_id = Uuid::new_v4();
    let token = state.tokens.issue(player_id, name);
    tracing::info!(%player_id, "player registered");
    Ok(Json(RegisterResponse { player_id, name: name.to_string(), token }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub max_players: Option<usize>,
}

async fn create_room(
    State(state): State<AppState>,
    Identity(me): Identity,
    payload: Result<Json<CreateRoomRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RoomView>), ApiError> {
    let req = body(payload)?;
    let max_players = req.max_players.unwrap_or(MAX_PLAYERS);
    let room = state.rooms.create_room(me.player, &me.name, max_players).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

#[derive(Debug, Deserialize)]
pub struct JoinRoomRequest {
    pub code: String,
}

async fn join_room(
    State(state): State<AppState>,
    Identity(me): Identity,
    payload: Result<Json<JoinRoomRequest>, JsonRejection>,
) -> Result<Json<RoomView>, ApiError> {
    let req = body(payload)?;
    let code = req.code.trim().to_ascii_uppercase();
    Ok(Json(state.rooms.join_room(&code, me.player, &me.name).await?))
}

async fn get_room(
    State(state): State<AppState>,
    Identity(me): Identity,
    Path(room_id): Path<String>,
) -> Result<Json<RoomView>, ApiError> {
    Ok(Json(state.rooms.room(&room_id, me.player).await?))
}

async fn delete_room(
    State(state): State<AppState>,
    Identity(me): Identity,
    Path(room_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.rooms.delete_room(&room_id, me.player).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start_game(
    State(state): State<AppState>,
    Identity(me): Identity,
    Path(room_id): Path<String>,
) -> Result<Json<RoomView>, ApiError> {
    Ok(Json(state.rooms.start_game(&room_id, me.player).await?))
}

async fn end_memorizing(
    State(state): State<AppState>,
    Identity(me): Identity,
    Path(room_id): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    let version = state.rooms.end_memorizing(&room_id, me.player).await?;
    Ok(Json(ActionResponse { success: true, drawn_card: None, version }))
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionName { Draw, Swap, Discard, Dutch }

/// Body of an action submission. Held-card fields are not part of it: the
/// server already knows what the caller holds.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ActionRequest {
    pub action: ActionName,
    #[serde(default)]
    pub source: Option<DrawSource>,
    #[serde(default)]
    pub hand_index: Option<usize>,
}

impl ActionRequest {
    pub fn into_action(self) -> Result<Action, GameError> {
        match self.action {
            ActionName::Draw => {
                let source = self.source.ok_or_else(|| GameError::validation("draw needs a source: deck or discard"))?;
                Ok(Action::Draw { source })
            }
            ActionName::Swap => {
                let hand_index = self.hand_index.ok_or_else(|| GameError::validation("swap needs a handIndex"))?;
                Ok(Action::Swap { hand_index })
            }
            ActionName::Discard => Ok(Action::Discard),
            ActionName::Dutch => Ok(Action::CallDutch),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drawn_card: Option<Card>,
    pub version: u64,
}

async fn submit_action(
    State(state): State<AppState>,
    Identity(me): Identity,
    Path(room_id): Path<String>,
    payload: Result<Json<ActionRequest>, JsonRejection>,
) -> Result<Json<ActionResponse>, ApiError> {
    let action = body(payload)?.into_action()?;
    let receipt = state.rooms.submit(&room_id, me.player, action).await?;
    Ok(Json(ActionResponse { success: true, drawn_card: receipt.drawn_card, version: receipt.version }))
}

async fn game_state(
    State(state): State<AppState>,
    Identity(me): Identity,
    Path(room_id): Path<String>,
) -> Result<Json<GameStateView>, ApiError> {
    Ok(Json(state.rooms.state_for(&room_id, me.player).await?))
}

async fn action_log(
    State(state): State<AppState>,
    Identity(me): Identity,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    Ok(Json(state.rooms.action_log(&room_id, me.player).await?))
}
