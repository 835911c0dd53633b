//! Game event model
//!
//! Everything observers learn about a game flows through these events. A
//! game's worker broadcasts them in the order the instance emitted them;
//! ordering across games is undefined.

use serde::{Deserialize, Serialize};

use crate::board::Pos;
use crate::chess::ChessPieceKind;
use crate::game::{EndReason, Snapshot};
use crate::tetromino::TetrominoKind;
use crate::{GameId, PieceId, PlayerId};

/// Per-game broadcast events, wire-shaped as `{type, payload}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum GameEvent {
    #[serde(rename_all = "camelCase")]
    PlayerJoined {
        player_id: PlayerId,
        name: String,
        is_computer: bool,
    },
    #[serde(rename_all = "camelCase")]
    PlayerLeft { player_id: PlayerId },
    #[serde(rename_all = "camelCase")]
    GameStarted { game_id: GameId },
    #[serde(rename_all = "camelCase")]
    TetrominoPlaced {
        player_id: PlayerId,
        piece_type: TetrominoKind,
        rotation: u8,
        cells: Vec<Pos>,
    },
    #[serde(rename_all = "camelCase")]
    RowsCleared { rows: Vec<i32>, cols: Vec<i32> },
    #[serde(rename_all = "camelCase")]
    ChessMoved {
        player_id: PlayerId,
        piece_id: PieceId,
        from: Pos,
        to: Pos,
        promoted: bool,
    },
    #[serde(rename_all = "camelCase")]
    PieceCaptured {
        piece_id: PieceId,
        piece_type: ChessPieceKind,
        player_id: PlayerId,
        /// Capturing player; `None` when the piece fell with an island.
        by: Option<PlayerId>,
    },
    #[serde(rename_all = "camelCase")]
    SkipChess { player_id: PlayerId },
    #[serde(rename_all = "camelCase")]
    GameEnded {
        winner: Option<PlayerId>,
        end_reason: EndReason,
    },
    StateSnapshot(Box<Snapshot>),
}
