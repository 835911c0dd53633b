//! Tetromino rule engine
//!
//! Shape catalogue for the seven canonical pieces, the 7-bag generator,
//! placement validation (collision, adjacency, path-to-king) and row/column
//! clearing. Application of a placement appends board items only; island
//! sweeping after destructive events lives with the game instance.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::board::{Board, CellItem, Pos, TetrominoItem};
use crate::connectivity::{self, DIRS8};
use crate::error::{GameError, GameResult};
use crate::PlayerId;

/// Highest point of the client-visible falling animation. The server only
/// range-checks the reported height; placement lands on the ground plane.
pub const TETROMINO_START_HEIGHT: u8 = 10;

/// The seven canonical piece kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TetrominoKind {
    I,
    J,
    L,
    O,
    S,
    T,
    Z,
}

impl TetrominoKind {
    pub const ALL: [TetrominoKind; 7] = [
        TetrominoKind::I,
        TetrominoKind::J,
        TetrominoKind::L,
        TetrominoKind::O,
        TetrominoKind::S,
        TetrominoKind::T,
        TetrominoKind::Z,
    ];

    fn index(self) -> usize {
        match self {
            TetrominoKind::I => 0,
            TetrominoKind::J => 1,
            TetrominoKind::L => 2,
            TetrominoKind::O => 3,
            TetrominoKind::S => 4,
            TetrominoKind::T => 5,
            TetrominoKind::Z => 6,
        }
    }
}

/// Cell offsets of each `(kind, rotation)` inside its 4×4 box, anchored at
/// the piece position. Rotations are clockwise.
const SHAPES: [[[(i32, i32); 4]; 4]; 7] = [
    // I
    [
        [(0, 0), (0, 1), (0, 2), (0, 3)],
        [(0, 0), (1, 0), (2, 0), (3, 0)],
        [(0, 0), (0, 1), (0, 2), (0, 3)],
        [(0, 0), (1, 0), (2, 0), (3, 0)],
    ],
    // J
    [
        [(0, 0), (1, 0), (2, 0), (2, 1)],
        [(1, 0), (1, 1), (0, 2), (1, 2)],
        [(0, 0), (0, 1), (1, 1), (2, 1)],
        [(0, 0), (1, 0), (0, 1), (0, 2)],
    ],
    // L
    [
        [(0, 0), (1, 0), (2, 0), (0, 1)],
        [(0, 0), (0, 1), (0, 2), (1, 2)],
        [(2, 0), (0, 1), (1, 1), (2, 1)],
        [(0, 0), (1, 0), (1, 1), (1, 2)],
    ],
    // O
    [
        [(0, 0), (1, 0), (0, 1), (1, 1)],
        [(0, 0), (1, 0), (0, 1), (1, 1)],
        [(0, 0), (1, 0), (0, 1), (1, 1)],
        [(0, 0), (1, 0), (0, 1), (1, 1)],
    ],
    // S
    [
        [(1, 0), (2, 0), (0, 1), (1, 1)],
        [(0, 0), (0, 1), (1, 1), (1, 2)],
        [(1, 0), (2, 0), (0, 1), (1, 1)],
        [(0, 0), (0, 1), (1, 1), (1, 2)],
    ],
    // T
    [
        [(0, 0), (1, 0), (2, 0), (1, 1)],
        [(0, 0), (0, 1), (1, 1), (0, 2)],
        [(1, 0), (0, 1), (1, 1), (2, 1)],
        [(1, 0), (0, 1), (1, 1), (1, 2)],
    ],
    // Z
    [
        [(0, 0), (1, 0), (1, 1), (2, 1)],
        [(1, 0), (0, 1), (1, 1), (0, 2)],
        [(0, 0), (1, 0), (1, 1), (2, 1)],
        [(1, 0), (0, 1), (1, 1), (0, 2)],
    ],
];

/// Cell offsets for a kind and rotation (rotation taken modulo 4).
pub fn shape(kind: TetrominoKind, rotation: u8) -> [(i32, i32); 4] {
    SHAPES[kind.index()][(rotation % 4) as usize]
}

/// A falling piece as submitted for placement.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tetromino {
    #[serde(rename = "type")]
    pub kind: TetrominoKind,
    pub rotation: u8,
    pub position: Pos,
    pub height_above_board: u8,
}

impl Tetromino {
    pub fn new(kind: TetrominoKind, rotation: u8, position: Pos) -> Self {
        Self {
            kind,
            rotation,
            position,
            height_above_board: 0,
        }
    }

    /// Absolute board cells the piece would fill.
    pub fn cells(&self) -> [Pos; 4] {
        let offsets = shape(self.kind, self.rotation);
        offsets.map(|(dx, dz)| self.position.offset(dx, dz))
    }
}

/// Infinite 7-bag generator: concatenated Fisher–Yates shuffles of the seven
/// kinds, so every consecutive window of 7 draws is a permutation.
#[derive(Clone, Debug)]
pub struct TetrominoBag {
    rng: StdRng,
    queue: VecDeque<TetrominoKind>,
}

impl TetrominoBag {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            queue: VecDeque::with_capacity(7),
        }
    }

    /// Bag seeded from a caller-provided entropy source.
    pub fn from_rng<R: Rng>(rng: &mut R) -> Self {
        Self::new(rng.random())
    }

    pub fn draw(&mut self) -> TetrominoKind {
        if self.queue.is_empty() {
            let mut kinds = TetrominoKind::ALL;
            kinds.shuffle(&mut self.rng);
            self.queue.extend(kinds);
        }
        self.queue.pop_front().expect("bag was just refilled")
    }
}

impl Iterator for TetrominoBag {
    type Item = TetrominoKind;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.draw())
    }
}

/// How a line counts as full for clearing.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum ClearPolicy {
    /// The bounding interval of tetromino items in the line must be at least
    /// `min_span` long and fully tetromino-occupied; the whole line clears.
    #[serde(rename_all = "camelCase")]
    BoundingSpan { min_span: i32 },
    /// Any run of at least `width` consecutive tetromino cells clears,
    /// whoever owns the blocks; only the run itself is removed.
    #[serde(rename_all = "camelCase")]
    FixedWindow { width: i32 },
}

impl Default for ClearPolicy {
    fn default() -> Self {
        ClearPolicy::BoundingSpan { min_span: 8 }
    }
}

/// Result of a clearing pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClearedLines {
    pub rows: Vec<i32>,
    pub cols: Vec<i32>,
    /// Cells whose tetromino items were removed.
    pub cells: Vec<Pos>,
}

impl ClearedLines {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.cols.is_empty()
    }
}

/// Validate a placement without mutating the board.
///
/// Checks, in order: parameter ranges, collision with chess items or foreign
/// blocks, eight-neighbourhood adjacency to one of the player's occupied
/// cells, and the connectivity invariant on a simulated copy.
pub fn can_place(board: &Board, player: PlayerId, king: Pos, tet: &Tetromino) -> GameResult<()> {
    if tet.rotation > 3 {
        return Err(GameError::OutOfBounds {
            reason: format!("rotation {} not in 0..=3", tet.rotation),
        });
    }
    if tet.height_above_board > TETROMINO_START_HEIGHT {
        return Err(GameError::OutOfBounds {
            reason: format!(
                "height {} above start height {}",
                tet.height_above_board, TETROMINO_START_HEIGHT
            ),
        });
    }

    let cells = tet.cells();
    for &cell in &cells {
        if board.chess_at(cell).is_some() {
            return Err(GameError::Collision { at: cell });
        }
        if let Some(owner) = board.tetromino_owner(cell) {
            if owner != player {
                return Err(GameError::Collision { at: cell });
            }
        }
    }

    let adjacent = cells.iter().any(|&cell| {
        DIRS8
            .iter()
            .any(|&(dx, dz)| board.player_occupies(cell.offset(dx, dz), player))
    });
    if !adjacent {
        return Err(GameError::NotAdjacent);
    }

    let mut sim = board.clone();
    stamp(&mut sim, player, tet, 0);
    let connected = cells
        .iter()
        .any(|&cell| connectivity::path_to_king(&sim, cell, player, king).is_some());
    if !connected {
        return Err(GameError::NoPathToKing);
    }

    Ok(())
}

/// Append the piece's items to the board. Callers validate first.
pub fn apply_placement(board: &mut Board, player: PlayerId, tet: &Tetromino, now_ms: u64) {
    stamp(board, player, tet, now_ms);
}

fn stamp(board: &mut Board, player: PlayerId, tet: &Tetromino, now_ms: u64) {
    for cell in tet.cells() {
        board.push_item(
            cell,
            CellItem::Tetromino(TetrominoItem {
                player_id: player,
                piece_type: tet.kind,
                placed_at: now_ms,
            }),
        );
    }
}

/// Remove tetromino items of every full row and column per the policy.
/// Chess and home items stay in place.
pub fn clear_full_lines(board: &mut Board, policy: ClearPolicy) -> ClearedLines {
    let Some(bounds) = board.bounds() else {
        return ClearedLines::default();
    };

    let mut cleared = ClearedLines::default();
    let mut doomed: Vec<Pos> = Vec::new();

    for z in bounds.min_z..=bounds.max_z {
        let line: Vec<i32> = (bounds.min_x..=bounds.max_x)
            .filter(|&x| board.has_tetromino(Pos::new(x, z)))
            .collect();
        if let Some(span) = full_span(&line, policy) {
            cleared.rows.push(z);
            doomed.extend(span.into_iter().map(|x| Pos::new(x, z)));
        }
    }
    for x in bounds.min_x..=bounds.max_x {
        let line: Vec<i32> = (bounds.min_z..=bounds.max_z)
            .filter(|&z| board.has_tetromino(Pos::new(x, z)))
            .collect();
        if let Some(span) = full_span(&line, policy) {
            cleared.cols.push(x);
            doomed.extend(span.into_iter().map(|z| Pos::new(x, z)));
        }
    }

    doomed.sort();
    doomed.dedup();
    for pos in doomed {
        let removed = board.retain_items(pos, |item| !item.is_tetromino());
        if !removed.is_empty() {
            cleared.cells.push(pos);
        }
    }
    cleared
}

/// The coordinates to clear when `occupied` (sorted line coordinates of
/// tetromino cells) counts as full under the policy.
fn full_span(occupied: &[i32], policy: ClearPolicy) -> Option<Vec<i32>> {
    let (&first, &last) = (occupied.first()?, occupied.last()?);
    match policy {
        ClearPolicy::BoundingSpan { min_span } => {
            let span = last - first + 1;
            let contiguous = occupied.len() as i32 == span;
            (contiguous && span >= min_span).then(|| (first..=last).collect())
        }
        ClearPolicy::FixedWindow { width } => {
            let mut run = vec![occupied[0]];
            for &x in &occupied[1..] {
                if x == run[run.len() - 1] + 1 {
                    run.push(x);
                } else if run.len() as i32 >= width {
                    break;
                } else {
                    run = vec![x];
                }
            }
            (run.len() as i32 >= width).then_some(run)
        }
    }
}
