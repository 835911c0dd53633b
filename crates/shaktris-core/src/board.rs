//! Sparse board store
//!
//! The board is a mapping from `(x, z)` to a non-empty list of cell items,
//! unbounded in principle. Tracked extremes grow monotonically and only serve
//! fast iteration; removing cells never shrinks them.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chess::ChessPieceKind;
use crate::tetromino::TetrominoKind;
use crate::{PieceId, PlayerId};

/// A board coordinate on the ground plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pos {
    pub x: i32,
    pub z: i32,
}

impl Pos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub const fn offset(self, dx: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            z: self.z + dz,
        }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.z)
    }
}

/// A block laid down by a placed tetromino.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TetrominoItem {
    pub player_id: PlayerId,
    pub piece_type: TetrominoKind,
    /// Epoch milliseconds at placement time.
    pub placed_at: u64,
}

/// A chess piece standing in the cell.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChessItem {
    pub piece_id: PieceId,
    pub piece_type: ChessPieceKind,
    pub player_id: PlayerId,
}

/// Home-zone marker.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeItem {
    pub player_id: PlayerId,
}

/// One item of a cell's ordered list. Multiple items may coexist, e.g. a
/// chess piece standing on a block inside its home zone.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellItem {
    Tetromino(TetrominoItem),
    Chess(ChessItem),
    Home(HomeItem),
}

impl CellItem {
    /// Owner of the item, whatever its kind.
    pub fn player_id(&self) -> PlayerId {
        match self {
            CellItem::Tetromino(t) => t.player_id,
            CellItem::Chess(c) => c.player_id,
            CellItem::Home(h) => h.player_id,
        }
    }

    pub fn is_tetromino(&self) -> bool {
        matches!(self, CellItem::Tetromino(_))
    }

    pub fn is_chess(&self) -> bool {
        matches!(self, CellItem::Chess(_))
    }

    pub fn is_home(&self) -> bool {
        matches!(self, CellItem::Home(_))
    }

    pub fn as_chess(&self) -> Option<&ChessItem> {
        match self {
            CellItem::Chess(c) => Some(c),
            _ => None,
        }
    }
}

/// Occupied extremes of the board. Grow-only hints, not a minimal cover.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub min_x: i32,
    pub max_x: i32,
    pub min_z: i32,
    pub max_z: i32,
}

impl Bounds {
    fn single(pos: Pos) -> Self {
        Self {
            min_x: pos.x,
            max_x: pos.x,
            min_z: pos.z,
            max_z: pos.z,
        }
    }

    fn include(&mut self, pos: Pos) {
        self.min_x = self.min_x.min(pos.x);
        self.max_x = self.max_x.max(pos.x);
        self.min_z = self.min_z.min(pos.z);
        self.max_z = self.max_z.max(pos.z);
    }

    pub fn contains(&self, pos: Pos) -> bool {
        pos.x >= self.min_x && pos.x <= self.max_x && pos.z >= self.min_z && pos.z <= self.max_z
    }
}

/// Sparse coordinate → item-list map with boundary tracking.
#[derive(Clone, Debug, Default)]
pub struct Board {
    cells: HashMap<Pos, Vec<CellItem>>,
    bounds: Option<Bounds>,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pos: Pos) -> Option<&[CellItem]> {
        self.cells.get(&pos).map(Vec::as_slice)
    }

    /// Replace a cell's item list. An empty list deletes the cell.
    pub fn set(&mut self, pos: Pos, items: Vec<CellItem>) {
        if items.is_empty() {
            self.cells.remove(&pos);
            return;
        }
        self.grow(pos);
        self.cells.insert(pos, items);
    }

    /// Delete a cell. Extremes are hints and never shrink.
    pub fn remove(&mut self, pos: Pos) -> Option<Vec<CellItem>> {
        self.cells.remove(&pos)
    }

    /// Append one item to a cell, creating it if needed.
    pub fn push_item(&mut self, pos: Pos, item: CellItem) {
        self.grow(pos);
        self.cells.entry(pos).or_default().push(item);
    }

    /// Drop the items of a cell that fail the predicate, removing the cell
    /// when its list empties. Returns the dropped items.
    pub fn retain_items<F>(&mut self, pos: Pos, mut keep: F) -> Vec<CellItem>
    where
        F: FnMut(&CellItem) -> bool,
    {
        let Some(items) = self.cells.get_mut(&pos) else {
            return Vec::new();
        };
        let mut dropped = Vec::new();
        items.retain(|item| {
            if keep(item) {
                true
            } else {
                dropped.push(*item);
                false
            }
        });
        if items.is_empty() {
            self.cells.remove(&pos);
        }
        dropped
    }

    pub fn iter_occupied(&self) -> impl Iterator<Item = (Pos, &[CellItem])> {
        self.cells.iter().map(|(pos, items)| (*pos, items.as_slice()))
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    pub fn is_occupied(&self, pos: Pos) -> bool {
        self.cells.contains_key(&pos)
    }

    pub fn has_tetromino(&self, pos: Pos) -> bool {
        self.item_at(pos, CellItem::is_tetromino)
    }

    pub fn has_home(&self, pos: Pos) -> bool {
        self.item_at(pos, CellItem::is_home)
    }

    /// Chess pieces walk on blocks; home-zone ground counts as support too.
    pub fn is_passable(&self, pos: Pos) -> bool {
        self.item_at(pos, |item| item.is_tetromino() || item.is_home())
    }

    pub fn chess_at(&self, pos: Pos) -> Option<&ChessItem> {
        self.get(pos)?.iter().find_map(CellItem::as_chess)
    }

    /// Owner of the first block in the cell, if any.
    pub fn tetromino_owner(&self, pos: Pos) -> Option<PlayerId> {
        self.get(pos)?.iter().find_map(|item| match item {
            CellItem::Tetromino(t) => Some(t.player_id),
            _ => None,
        })
    }

    /// Whether any item in the cell belongs to `player`.
    pub fn player_occupies(&self, pos: Pos, player: PlayerId) -> bool {
        self.get(pos)
            .is_some_and(|items| items.iter().any(|item| item.player_id() == player))
    }

    fn item_at<F>(&self, pos: Pos, pred: F) -> bool
    where
        F: Fn(&CellItem) -> bool,
    {
        self.get(pos).is_some_and(|items| items.iter().any(pred))
    }

    fn grow(&mut self, pos: Pos) {
        match &mut self.bounds {
            Some(bounds) => bounds.include(pos),
            None => self.bounds = Some(Bounds::single(pos)),
        }
    }
}
