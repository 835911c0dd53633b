//! Per-player turn state machine
//!
//! A turn alternates between two halves: place a piece, then move a piece.
//! Every accepted action also starts a pacing window of `min_duration_ms`;
//! an action inside the window is rejected with `TooSoon`. The floor is
//! enforced server-side and is not a client hint.

use serde::{Deserialize, Serialize};

use crate::error::{GameError, GameResult};
use crate::tetromino::TetrominoKind;

/// Default pacing floor for humans and medium-difficulty computer players.
pub const DEFAULT_MIN_MOVE_MS: u64 = 10_000;

/// Which half of the turn the player is in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnPhase {
    Tetris,
    Chess,
}

/// Turn state carried by each player.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub phase: TurnPhase,
    /// Epoch milliseconds when this phase was entered.
    pub started_at: u64,
    pub min_duration_ms: u64,
    /// Kind handed out by the last `request_tetromino`, if any.
    pub active_tetromino: Option<TetrominoKind>,
}

impl Turn {
    pub fn new(now_ms: u64, min_duration_ms: u64) -> Self {
        Self {
            phase: TurnPhase::Tetris,
            started_at: now_ms,
            min_duration_ms,
            active_tetromino: None,
        }
    }

    /// Reject actions in the wrong half of the turn.
    pub fn expect_phase(&self, phase: TurnPhase) -> GameResult<()> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(GameError::WrongPhase { expected: self.phase })
        }
    }

    /// Enforce the pacing floor against the player's last accepted action.
    pub fn check_pacing(&self, last_move_at: Option<u64>, now_ms: u64) -> GameResult<()> {
        let Some(last) = last_move_at else {
            return Ok(());
        };
        let ready_at = last.saturating_add(self.min_duration_ms);
        if now_ms < ready_at {
            return Err(GameError::TooSoon {
                retry_after_ms: ready_at - now_ms,
            });
        }
        Ok(())
    }

    /// A legal placement hands the turn to the chess half.
    pub fn advance_to_chess(&mut self, now_ms: u64) {
        self.phase = TurnPhase::Chess;
        self.started_at = now_ms;
        self.active_tetromino = None;
    }

    /// A legal chess move, or a forced skip, returns to the tetris half.
    pub fn advance_to_tetris(&mut self, now_ms: u64) {
        self.phase = TurnPhase::Tetris;
        self.started_at = now_ms;
    }
}
