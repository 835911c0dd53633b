//! Main-transport protocol
//!
//! JSON documents over the bidirectional transport: a request/response
//! channel with correlation ids, and server-push game events. Requests are
//! `{id, type, payload}`; responses echo the id and carry either `data` or a
//! structured `error`.

use serde::{Deserialize, Serialize};

use shaktris_core::error::GameError;
use shaktris_core::game::Snapshot;
use shaktris_core::tetromino::{ClearPolicy, Tetromino, TetrominoKind};
use shaktris_core::{GameEvent, GameId, PieceId, PlayerId, Pos};

/// Client→server request with a correlation id.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ClientRequest {
    pub id: u64,
    #[serde(flatten)]
    pub message: ClientMessage,
}

/// Options accepted by `create_game`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GameOpts {
    pub min_move_ms: Option<u64>,
    pub clear_policy: Option<ClearPolicy>,
    pub seed: Option<u64>,
}

/// Client→server messages.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Binds the caller to a game; unknown or absent ids fall back to the
    /// global game.
    #[serde(rename_all = "camelCase")]
    JoinGame {
        #[serde(default)]
        game_id: Option<GameId>,
        player_name: String,
        /// Present on reconnect; reattaches instead of re-registering.
        #[serde(default)]
        player_id: Option<PlayerId>,
    },
    CreateGame {
        #[serde(default)]
        opts: GameOpts,
    },
    TetrominoPlaced(Tetromino),
    #[serde(rename_all = "camelCase")]
    ChessMove {
        piece_id: PieceId,
        target_position: Pos,
    },
    RequestTetromino,
    #[serde(rename_all = "camelCase")]
    GetGameState {
        #[serde(default)]
        game_id: Option<GameId>,
    },
    #[serde(rename_all = "camelCase")]
    RequestSpectate { target_player_id: PlayerId },
    StopSpectating,
    RestartGame,
}

/// Server→client traffic: correlated responses and pushed game events.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum ServerMessage {
    Response(ResponseEnvelope),
    Event(GameEvent),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<ResponseData>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<WireError>,
}

impl ResponseEnvelope {
    pub fn ok(id: u64, data: ResponseData) -> Self {
        Self {
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(id: u64, error: WireError) -> Self {
        Self {
            id,
            data: None,
            error: Some(error),
        }
    }
}

/// Successful response payloads.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ResponseData {
    #[serde(rename_all = "camelCase")]
    Joined {
        game_id: GameId,
        player_id: PlayerId,
    },
    #[serde(rename_all = "camelCase")]
    GameCreated { game_id: GameId },
    MoveAccepted,
    #[serde(rename_all = "camelCase")]
    Tetromino {
        current: TetrominoKind,
        next: TetrominoKind,
    },
    Snapshot(Box<Snapshot>),
    #[serde(rename_all = "camelCase")]
    SpectateStarted { target_player_id: PlayerId },
    SpectateStopped,
    Restarted,
}

/// Stable error codes of the taxonomy; clients switch on these, not on
/// message text.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    Collision,
    OutOfBounds,
    NotAdjacent,
    NoPathToKing,
    IllegalChessMove,
    WrongPhase,
    NotYourTurn,
    TooSoon,
    NotYourPiece,
    PlayerNotInGame,
    InvalidApiToken,
    Protocol,
    Backpressure,
    Timeout,
    Internal,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireError {
    pub code: ErrorCode,
    pub message: String,
    /// Present on transient errors; the caller may retry after this delay.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub retry_after_ms: Option<u64>,
}

impl WireError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retry_after_ms: None,
        }
    }

    pub fn with_retry(code: ErrorCode, message: impl Into<String>, retry_after_ms: u64) -> Self {
        Self {
            code,
            message: message.into(),
            retry_after_ms: Some(retry_after_ms),
        }
    }
}

impl From<&GameError> for WireError {
    fn from(err: &GameError) -> Self {
        let code = match err {
            GameError::Collision { .. } => ErrorCode::Collision,
            GameError::OutOfBounds { .. } => ErrorCode::OutOfBounds,
            GameError::NotAdjacent => ErrorCode::NotAdjacent,
            GameError::NoPathToKing => ErrorCode::NoPathToKing,
            GameError::IllegalChessMove { .. } => ErrorCode::IllegalChessMove,
            GameError::WrongPhase { .. } => ErrorCode::WrongPhase,
            GameError::NotYourTurn => ErrorCode::NotYourTurn,
            GameError::TooSoon { .. } => ErrorCode::TooSoon,
            GameError::NotYourPiece { .. } => ErrorCode::NotYourPiece,
            GameError::PlayerNotInGame { .. } => ErrorCode::PlayerNotInGame,
        };
        let retry_after_ms = match err {
            GameError::TooSoon { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        };
        Self {
            code,
            message: err.to_string(),
            retry_after_ms,
        }
    }
}

impl From<GameError> for WireError {
    fn from(err: GameError) -> Self {
        Self::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn join_game_round_trips_with_correlation_id() {
        let request = ClientRequest {
            id: 7,
            message: ClientMessage::JoinGame {
                game_id: None,
                player_name: "ada".to_string(),
                player_id: None,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["type"], "join_game");
        assert_eq!(json["payload"]["playerName"], "ada");

        let decoded: ClientRequest = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn tetromino_placed_uses_the_wire_field_names() {
        let request = ClientRequest {
            id: 1,
            message: ClientMessage::TetrominoPlaced(Tetromino::new(
                TetrominoKind::I,
                0,
                Pos::new(1, 0),
            )),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "tetromino_placed");
        assert_eq!(json["payload"]["type"], "I");
        assert_eq!(json["payload"]["position"]["x"], 1);
        assert_eq!(json["payload"]["heightAboveBoard"], 0);
    }

    #[test]
    fn create_game_carries_the_clearing_policy() {
        let request = ClientRequest {
            id: 5,
            message: ClientMessage::CreateGame {
                opts: GameOpts {
                    min_move_ms: Some(0),
                    clear_policy: Some(ClearPolicy::FixedWindow { width: 4 }),
                    seed: None,
                },
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["payload"]["opts"]["clearPolicy"]["mode"], "fixedWindow");
        assert_eq!(json["payload"]["opts"]["clearPolicy"]["width"], 4);

        let decoded: ClientRequest = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, request);

        // Omitted options still parse.
        let decoded: ClientRequest =
            serde_json::from_str(r#"{"id":6,"type":"create_game","payload":{"opts":{}}}"#)
                .unwrap();
        assert_eq!(
            decoded.message,
            ClientMessage::CreateGame {
                opts: GameOpts::default()
            }
        );
    }

    #[test]
    fn chess_move_round_trips() {
        let request = ClientRequest {
            id: 2,
            message: ClientMessage::ChessMove {
                piece_id: Uuid::new_v4(),
                target_position: Pos::new(3, 5),
            },
        };
        let bytes = serde_json::to_string(&request).unwrap();
        let decoded: ClientRequest = serde_json::from_str(&bytes).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn payloadless_messages_parse_without_payload() {
        let decoded: ClientRequest =
            serde_json::from_str(r#"{"id":3,"type":"request_tetromino"}"#).unwrap();
        assert_eq!(decoded.message, ClientMessage::RequestTetromino);

        let decoded: ClientRequest =
            serde_json::from_str(r#"{"id":4,"type":"stop_spectating"}"#).unwrap();
        assert_eq!(decoded.message, ClientMessage::StopSpectating);
    }

    #[test]
    fn error_response_carries_code_and_retry_hint() {
        let envelope = ResponseEnvelope::err(
            9,
            WireError::from(GameError::TooSoon {
                retry_after_ms: 4_200,
            }),
        );
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["error"]["code"], "tooSoon");
        assert_eq!(json["error"]["retryAfterMs"], 4_200);
        assert!(json.get("data").is_none());
    }

    #[test]
    fn ok_response_omits_the_error_field() {
        let envelope = ResponseEnvelope::ok(
            1,
            ResponseData::Tetromino {
                current: TetrominoKind::S,
                next: TetrominoKind::Z,
            },
        );
        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["data"]["kind"], "tetromino");
        assert_eq!(json["data"]["current"], "S");
    }

    #[test]
    fn server_messages_distinguish_responses_from_events() {
        let response = ServerMessage::Response(ResponseEnvelope::ok(5, ResponseData::MoveAccepted));
        let event = ServerMessage::Event(GameEvent::SkipChess {
            player_id: Uuid::new_v4(),
        });

        let response_json = serde_json::to_string(&response).unwrap();
        let event_json = serde_json::to_string(&event).unwrap();

        assert!(matches!(
            serde_json::from_str::<ServerMessage>(&response_json).unwrap(),
            ServerMessage::Response(_)
        ));
        assert!(matches!(
            serde_json::from_str::<ServerMessage>(&event_json).unwrap(),
            ServerMessage::Event(_)
        ));
    }

    #[test]
    fn every_rule_error_maps_to_a_stable_code() {
        let cases: Vec<(GameError, ErrorCode)> = vec![
            (
                GameError::Collision { at: Pos::new(1, 2) },
                ErrorCode::Collision,
            ),
            (GameError::NotAdjacent, ErrorCode::NotAdjacent),
            (GameError::NoPathToKing, ErrorCode::NoPathToKing),
            (GameError::NotYourTurn, ErrorCode::NotYourTurn),
            (
                GameError::PlayerNotInGame {
                    player_id: Uuid::new_v4(),
                },
                ErrorCode::PlayerNotInGame,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(WireError::from(&err).code, code);
        }
    }
}
