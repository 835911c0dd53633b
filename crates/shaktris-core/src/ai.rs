//! Built-in computer player policy
//!
//! A small heuristic policy parameterised by the difficulty tuple. The
//! scheduler in the server ticks each computer player and submits whatever
//! this module decides through the same move path as humans; nothing here
//! bypasses rule enforcement.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::board::Pos;
use crate::chess::{self, ChessPieceKind};
use crate::connectivity::DIRS8;
use crate::game::Game;
use crate::tetromino::{self, Tetromino};
use crate::turn::TurnPhase;
use crate::{PieceId, PlayerId};

/// Difficulty label of a built-in computer player. Difficulty affects only
/// the pacing floor and the decision policy, never rule enforcement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiLevel {
    Easy,
    Medium,
    Hard,
}

impl AiLevel {
    /// Easier computer players wait longer between moves.
    pub fn min_move_ms(self) -> u64 {
        match self {
            AiLevel::Easy => 15_000,
            AiLevel::Medium => 10_000,
            AiLevel::Hard => 5_000,
        }
    }

    pub fn params(self) -> AiParams {
        match self {
            AiLevel::Easy => AiParams {
                aggressiveness: 0.2,
                defensiveness: 0.5,
                build_speed: 0.4,
                king_protection: 0.6,
                exploration_rate: 0.5,
            },
            AiLevel::Medium => AiParams {
                aggressiveness: 0.5,
                defensiveness: 0.5,
                build_speed: 0.6,
                king_protection: 0.5,
                exploration_rate: 0.25,
            },
            AiLevel::Hard => AiParams {
                aggressiveness: 0.85,
                defensiveness: 0.6,
                build_speed: 0.9,
                king_protection: 0.4,
                exploration_rate: 0.1,
            },
        }
    }
}

/// The difficulty tuple, each weight in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiParams {
    pub aggressiveness: f64,
    pub defensiveness: f64,
    pub build_speed: f64,
    pub king_protection: f64,
    pub exploration_rate: f64,
}

/// What the policy wants to do this tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AiDecision {
    Place(Tetromino),
    MoveChess { piece_id: PieceId, to: Pos },
}

/// Decide the next action for a computer player, or `None` when nothing is
/// currently possible (not this player's phase to act in, or no candidates).
pub fn decide<R: Rng>(
    game: &Game,
    player_id: PlayerId,
    params: &AiParams,
    rng: &mut R,
) -> Option<AiDecision> {
    let player = game.player(player_id)?;
    match player.turn.phase {
        TurnPhase::Tetris => {
            let kind = player
                .turn
                .active_tetromino
                .unwrap_or_else(|| game.next_tetromino());
            choose_placement(game, player_id, kind, params, rng).map(AiDecision::Place)
        }
        TurnPhase::Chess => choose_chess_move(game, player_id, params, rng)
            .map(|(piece_id, to)| AiDecision::MoveChess { piece_id, to }),
    }
}

fn choose_placement<R: Rng>(
    game: &Game,
    player_id: PlayerId,
    kind: crate::tetromino::TetrominoKind,
    params: &AiParams,
    rng: &mut R,
) -> Option<Tetromino> {
    let king = game.king_of(player_id)?;
    let enemy_king = nearest_enemy_king(game, player_id, king);

    let mut anchors: Vec<Pos> = game
        .board
        .iter_occupied()
        .filter(|(_, items)| items.iter().any(|item| item.player_id() == player_id))
        .flat_map(|(pos, _)| DIRS8.iter().map(move |&(dx, dz)| pos.offset(dx, dz)))
        .collect();
    anchors.sort();
    anchors.dedup();

    let mut best: Option<(f64, Tetromino)> = None;
    for anchor in anchors {
        for rotation in 0..4 {
            // Shift so different shape cells get a chance to land on the
            // anchor, not just the piece origin.
            for (dx, dz) in tetromino::shape(kind, rotation) {
                let tet = Tetromino::new(kind, rotation, anchor.offset(-dx, -dz));
                if tetromino::can_place(&game.board, player_id, king, &tet).is_err() {
                    continue;
                }
                let centre = tet.cells()[0];
                let mut score = 0.0;
                if let Some(target) = enemy_king {
                    score -= distance(centre, target) as f64 * params.aggressiveness;
                }
                score -= distance(centre, king) as f64 * params.king_protection * 0.5;
                score += params.build_speed;
                score += rng.random::<f64>() * params.exploration_rate * 4.0;
                if best.as_ref().is_none_or(|(s, _)| score > *s) {
                    best = Some((score, tet));
                }
            }
        }
    }
    best.map(|(_, tet)| tet)
}

fn choose_chess_move<R: Rng>(
    game: &Game,
    player_id: PlayerId,
    params: &AiParams,
    rng: &mut R,
) -> Option<(PieceId, Pos)> {
    let king = game.king_of(player_id)?;
    let enemy_king = nearest_enemy_king(game, player_id, king);

    let mut best: Option<(f64, PieceId, Pos)> = None;
    for piece in game.pieces_of(player_id) {
        for to in chess::legal_moves(&game.board, piece) {
            let mut score = 0.0;
            if let Some(target) = game.board.chess_at(to) {
                score += piece_value(target.piece_type) * 10.0 * params.aggressiveness.max(0.1);
            }
            if let Some(target) = enemy_king {
                let closing = distance(piece.position, target) - distance(to, target);
                score += closing as f64 * params.aggressiveness;
            }
            // Keep defenders near the king, and do not wander off with it.
            score -= distance(to, king) as f64 * params.defensiveness * 0.1;
            if piece.kind == ChessPieceKind::King {
                score -= params.king_protection * 5.0;
            }
            score += rng.random::<f64>() * params.exploration_rate * 2.0;
            if best.as_ref().is_none_or(|(s, _, _)| score > *s) {
                best = Some((score, piece.id, to));
            }
        }
    }
    best.map(|(_, id, to)| (id, to))
}

fn nearest_enemy_king(game: &Game, player_id: PlayerId, own_king: Pos) -> Option<Pos> {
    game.players
        .keys()
        .filter(|id| **id != player_id)
        .filter_map(|id| game.king_of(*id))
        .min_by_key(|pos| distance(*pos, own_king))
}

fn distance(a: Pos, b: Pos) -> i32 {
    (a.x - b.x).abs().max((a.z - b.z).abs())
}

fn piece_value(kind: ChessPieceKind) -> f64 {
    match kind {
        ChessPieceKind::Pawn => 1.0,
        ChessPieceKind::Knight | ChessPieceKind::Bishop => 3.0,
        ChessPieceKind::Rook => 5.0,
        ChessPieceKind::Queen => 9.0,
        ChessPieceKind::King => 1000.0,
    }
}
