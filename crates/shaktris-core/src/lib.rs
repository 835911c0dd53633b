//! Shaktris game engine.
//!
//! Pure rules core for the hybrid block-placement / chess game: the sparse
//! board store, the tetromino and chess rule engines, island connectivity,
//! per-player turn phases and the composed [`game::Game`] instance.
//!
//! The crate does no I/O and owns no clocks: wall time enters every mutating
//! operation as an epoch-millisecond argument, which keeps the rules
//! deterministic under test and leaves scheduling to the server.

pub mod ai;
pub mod board;
pub mod chess;
pub mod connectivity;
pub mod error;
pub mod events;
pub mod game;
pub mod tetromino;
pub mod turn;

pub use ai::{AiDecision, AiLevel, AiParams};
pub use board::{Board, Bounds, CellItem, ChessItem, HomeItem, Pos, TetrominoItem};
pub use chess::{ChessPiece, ChessPieceKind};
pub use error::{GameError, GameResult};
pub use events::GameEvent;
pub use game::{Game, GameConfig, GameStatus, HomeZone, Player, Snapshot};
pub use tetromino::{Tetromino, TetrominoBag, TetrominoKind};
pub use turn::{Turn, TurnPhase};

/// Server-issued identifier of a player.
pub type PlayerId = uuid::Uuid;
/// Identifier of a game instance.
pub type GameId = uuid::Uuid;
/// Identifier of a chess piece, stable from spawn to capture.
pub type PieceId = uuid::Uuid;
