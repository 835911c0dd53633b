//! Error types for the rules engine
//!
//! Rule rejections are ordinary values: a failed placement or chess move
//! leaves the game untouched and surfaces one of these kinds to the caller.

use thiserror::Error;

use crate::board::Pos;
use crate::turn::TurnPhase;
use crate::{PieceId, PlayerId};

/// Errors produced by move validation and game-level checks.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GameError {
    /// A filled cell of the piece collides with a chess piece or a foreign block
    #[error("placement collides with an occupied cell at {at}")]
    Collision { at: Pos },

    /// Rotation, height or coordinates outside the accepted range
    #[error("placement out of bounds: {reason}")]
    OutOfBounds { reason: String },

    /// No filled cell touches one of the player's occupied cells
    #[error("placement is not adjacent to any of the player's cells")]
    NotAdjacent,

    /// The placed piece would have no eight-connected path back to the king
    #[error("no path from the placement to the player's king")]
    NoPathToKing,

    /// Destination unreachable for this piece on the current board
    #[error("illegal chess move for piece {piece_id} to {to}")]
    IllegalChessMove { piece_id: PieceId, to: Pos },

    /// Action submitted in the wrong half of the turn
    #[error("wrong turn phase: expected {expected:?}")]
    WrongPhase { expected: TurnPhase },

    /// The player is inactive or the game is not accepting moves
    #[error("player may not act now")]
    NotYourTurn,

    /// Second action inside the minimum move window
    #[error("move submitted too soon, retry in {retry_after_ms} ms")]
    TooSoon { retry_after_ms: u64 },

    /// The piece belongs to another player
    #[error("piece {piece_id} does not belong to the mover")]
    NotYourPiece { piece_id: PieceId },

    /// The player is not registered in this game
    #[error("player {player_id} is not in this game")]
    PlayerNotInGame { player_id: PlayerId },
}

/// Result type alias for rules-engine operations
pub type GameResult<T> = Result<T, GameError>;
