//! External AI HTTP surface
//!
//! The only boundary that is not the main transport: registration of
//! external computer players, binding them to games, and their move
//! submissions. Tokens are opaque capabilities issued at registration and
//! checked on every call.

use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};

use shaktris_core::chess::ChessPiece;
use shaktris_core::tetromino::{Tetromino, TetrominoKind};
use shaktris_core::{AiLevel, GameError, GameId, PieceId, PlayerId, Pos};
use shared::WireError;

use crate::ai::{self, AiRegistry};
use crate::coordinator::Coordinator;
use crate::error::ServerError;
use crate::worker::PlayerDescriptor;
use crate::ws;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub ai: Arc<AiRegistry>,
}

impl AppState {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self {
            coordinator,
            ai: Arc::new(AiRegistry::new()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/computer-players/register", post(register_computer_player))
        .route("/games/{game_id}/add-computer-player", post(add_computer_player))
        .route("/games/{game_id}/computer-move", post(computer_move))
        .route(
            "/games/{game_id}/available-tetrominos",
            get(available_tetrominos),
        )
        .route("/games/{game_id}/chess-pieces", get(chess_pieces))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}

type Rejection = (StatusCode, Json<WireError>);

fn reject(err: ServerError) -> Rejection {
    let status = match &err {
        ServerError::Rule(GameError::TooSoon { .. }) => StatusCode::TOO_MANY_REQUESTS,
        ServerError::Rule(_) => StatusCode::BAD_REQUEST,
        ServerError::InvalidApiToken => StatusCode::UNAUTHORIZED,
        ServerError::Backpressure { .. } => StatusCode::SERVICE_UNAVAILABLE,
        ServerError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ServerError::GameClosed => StatusCode::INTERNAL_SERVER_ERROR,
        ServerError::Protocol(_) => StatusCode::UNPROCESSABLE_ENTITY,
    };
    (status, Json(err.to_wire()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub player_id: PlayerId,
    pub api_token: String,
}

async fn register_computer_player(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> (StatusCode, Json<RegisterResponse>) {
    let (player_id, api_token) = state.ai.register(payload.name);
    (
        StatusCode::CREATED,
        Json(RegisterResponse {
            player_id,
            api_token,
        }),
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddComputerPlayerRequest {
    /// Registered external player; omitted for a server-hosted one.
    #[serde(default)]
    pub player_id: Option<PlayerId>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub difficulty: Option<AiLevel>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddComputerPlayerResponse {
    pub player_id: PlayerId,
    pub game_id: GameId,
}

async fn add_computer_player(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
    Json(payload): Json<AddComputerPlayerRequest>,
) -> Result<Json<AddComputerPlayerResponse>, Rejection> {
    let difficulty = payload.difficulty.unwrap_or(AiLevel::Medium);

    let descriptor = match (payload.player_id, payload.api_token.as_deref()) {
        (Some(player_id), Some(token)) => {
            state.ai.validate(player_id, token).map_err(reject)?;
            let name = state
                .ai
                .name_of(player_id)
                .unwrap_or_else(|| "external-ai".to_string());
            PlayerDescriptor {
                player_id,
                name,
                is_computer: true,
                is_external: true,
                difficulty: Some(difficulty),
            }
        }
        _ => PlayerDescriptor {
            player_id: PlayerId::new_v4(),
            name: payload.name.unwrap_or_else(|| "computer".to_string()),
            is_computer: true,
            is_external: false,
            difficulty: Some(difficulty),
        },
    };

    let is_builtin = !descriptor.is_external;
    let player_id = descriptor.player_id;
    let (game_id, _) = state
        .coordinator
        .join_game(Some(game_id), descriptor)
        .await
        .map_err(reject)?;

    if is_builtin {
        ai::spawn_builtin(state.coordinator.clone(), player_id, difficulty);
    }

    Ok(Json(AddComputerPlayerResponse { player_id, game_id }))
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveType {
    Tetromino,
    Chess,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputerMoveRequest {
    pub player_id: PlayerId,
    pub api_token: String,
    pub move_type: MoveType,
    pub move_data: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChessMoveData {
    piece_id: PieceId,
    target_position: Pos,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveAcceptedResponse {
    pub accepted: bool,
}

/// External move submission. Funnels into the same per-player pacing floor
/// as every other move; there is no separate HTTP rate limit.
async fn computer_move(
    State(state): State<AppState>,
    Path(_game_id): Path<GameId>,
    Json(payload): Json<ComputerMoveRequest>,
) -> Result<Json<MoveAcceptedResponse>, Rejection> {
    state
        .ai
        .validate(payload.player_id, &payload.api_token)
        .map_err(reject)?;

    match payload.move_type {
        MoveType::Tetromino => {
            let tetromino: Tetromino = serde_json::from_value(payload.move_data)
                .map_err(|err| reject(ServerError::Protocol(err.to_string())))?;
            state
                .coordinator
                .place_tetromino(payload.player_id, tetromino)
                .await
                .map_err(reject)?;
        }
        MoveType::Chess => {
            let data: ChessMoveData = serde_json::from_value(payload.move_data)
                .map_err(|err| reject(ServerError::Protocol(err.to_string())))?;
            state
                .coordinator
                .move_chess(payload.player_id, data.piece_id, data.target_position)
                .await
                .map_err(reject)?;
        }
    }
    Ok(Json(MoveAcceptedResponse { accepted: true }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiQuery {
    pub player_id: PlayerId,
    pub api_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableTetrominosResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<TetrominoKind>,
    pub next_tetromino: TetrominoKind,
}

async fn available_tetrominos(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
    Query(query): Query<AiQuery>,
) -> Result<Json<AvailableTetrominosResponse>, Rejection> {
    state
        .ai
        .validate(query.player_id, &query.api_token)
        .map_err(reject)?;

    let snapshot = state
        .coordinator
        .get_game_state(Some(game_id))
        .await
        .map_err(reject)?;
    let current = snapshot
        .players
        .get(&query.player_id)
        .and_then(|player| player.current_turn.active_tetromino);
    Ok(Json(AvailableTetrominosResponse {
        current,
        next_tetromino: snapshot.next_tetromino,
    }))
}

async fn chess_pieces(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
    Query(query): Query<AiQuery>,
) -> Result<Json<Vec<ChessPiece>>, Rejection> {
    state
        .ai
        .validate(query.player_id, &query.api_token)
        .map_err(reject)?;

    let snapshot = state
        .coordinator
        .get_game_state(Some(game_id))
        .await
        .map_err(reject)?;
    let pieces = snapshot
        .chess_pieces
        .into_iter()
        .filter(|piece| piece.player_id == query.player_id)
        .collect();
    Ok(Json(pieces))
}
