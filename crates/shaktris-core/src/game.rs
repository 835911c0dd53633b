//! Game instance
//!
//! Composes the board store, rule engines, connectivity service and turn
//! machine into one authoritative game. All mutation funnels through the
//! methods here; the server serializes calls per game, so the instance
//! itself is single-threaded and returns the events each mutation produced.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::ai::AiLevel;
use crate::board::{Board, CellItem, ChessItem, HomeItem, Pos};
use crate::chess::{self, ChessPiece, ChessPieceKind};
use crate::connectivity;
use crate::error::{GameError, GameResult};
use crate::events::GameEvent;
use crate::tetromino::{self, ClearPolicy, Tetromino, TetrominoBag, TetrominoKind};
use crate::turn::{Turn, TurnPhase, DEFAULT_MIN_MOVE_MS};
use crate::{GameId, PieceId, PlayerId};

/// Home zones are eight cells wide and two deep, like a chess player's own
/// two ranks.
pub const HOME_ZONE_WIDTH: i32 = 8;
pub const HOME_ZONE_DEPTH: i32 = 2;
/// Distance between home-zone anchors on the allocation grid.
pub const HOME_ZONE_SPACING: i32 = 16;

const BACK_RANK: [ChessPieceKind; 8] = [
    ChessPieceKind::Rook,
    ChessPieceKind::Knight,
    ChessPieceKind::Bishop,
    ChessPieceKind::Queen,
    ChessPieceKind::King,
    ChessPieceKind::Bishop,
    ChessPieceKind::Knight,
    ChessPieceKind::Rook,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Waiting,
    Playing,
    Ended,
}

/// Why a game ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    KingCaptured,
    /// A king fell with an island; nobody wins.
    KingLost,
    OpponentsLeft,
    InternalError,
}

/// A player's rectangular anchor region. Orientation fixes which rank is the
/// back rank and which way pawns march.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeZone {
    pub min_x: i32,
    pub min_z: i32,
    pub width: i32,
    pub height: i32,
    pub orientation: u8,
}

impl HomeZone {
    pub fn max_x(&self) -> i32 {
        self.min_x + self.width - 1
    }

    pub fn max_z(&self) -> i32 {
        self.min_z + self.height - 1
    }

    pub fn contains(&self, pos: Pos) -> bool {
        pos.x >= self.min_x && pos.x <= self.max_x() && pos.z >= self.min_z && pos.z <= self.max_z()
    }

    pub fn cells(&self) -> Vec<Pos> {
        let mut cells = Vec::with_capacity((self.width * self.height) as usize);
        for x in self.min_x..=self.max_x() {
            for z in self.min_z..=self.max_z() {
                cells.push(Pos::new(x, z));
            }
        }
        cells
    }

    /// The king's rank, ordered ascending along the rank axis.
    pub fn back_rank(&self) -> Vec<Pos> {
        match self.orientation % 4 {
            0 => (self.min_x..=self.max_x())
                .map(|x| Pos::new(x, self.min_z))
                .collect(),
            2 => (self.min_x..=self.max_x())
                .map(|x| Pos::new(x, self.max_z()))
                .collect(),
            1 => (self.min_z..=self.max_z())
                .map(|z| Pos::new(self.min_x, z))
                .collect(),
            _ => (self.min_z..=self.max_z())
                .map(|z| Pos::new(self.max_x(), z))
                .collect(),
        }
    }

    /// The pawn rank, one step toward the zone's forward direction.
    pub fn pawn_rank(&self) -> Vec<Pos> {
        let (fx, fz) = chess::forward(self.orientation);
        self.back_rank()
            .into_iter()
            .map(|pos| pos.offset(fx, fz))
            .collect()
    }
}

/// A registered participant. Leaving only flags the player inactive; pieces
/// stay on the board until the king is gone.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub display_name: String,
    pub is_computer: bool,
    pub is_external: bool,
    pub difficulty: Option<AiLevel>,
    pub is_active: bool,
    pub last_move_at: Option<u64>,
    pub turn: Turn,
}

/// Tunables fixed at game creation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameConfig {
    pub min_move_ms: u64,
    pub clear_policy: ClearPolicy,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            min_move_ms: DEFAULT_MIN_MOVE_MS,
            clear_policy: ClearPolicy::default(),
        }
    }
}

/// Wire snapshot of a game, stable on-wire format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: GameId,
    pub status: GameStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<PlayerId>,
    pub board: BoardSnapshot,
    pub chess_pieces: Vec<ChessPiece>,
    pub home_zones: HashMap<PlayerId, ZoneSnapshot>,
    pub players: HashMap<PlayerId, PlayerSnapshot>,
    pub next_tetromino: TetrominoKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSnapshot {
    pub cells: BTreeMap<String, Vec<CellItem>>,
    pub min_x: i32,
    pub max_x: i32,
    pub min_z: i32,
    pub max_z: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSnapshot {
    pub min_x: i32,
    pub min_z: i32,
    pub max_x: i32,
    pub max_z: i32,
    pub orientation: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub name: String,
    pub is_computer: bool,
    pub is_active: bool,
    pub current_turn: Turn,
}

/// The authoritative state of one game.
#[derive(Clone, Debug)]
pub struct Game {
    pub id: GameId,
    pub board: Board,
    pub pieces: Vec<ChessPiece>,
    pub players: HashMap<PlayerId, Player>,
    pub home_zones: HashMap<PlayerId, HomeZone>,
    pub status: GameStatus,
    pub winner: Option<PlayerId>,
    pub end_reason: Option<EndReason>,
    bag: TetrominoBag,
    next: TetrominoKind,
    config: GameConfig,
    /// Join order, which fixes home-zone slots. Survives leaves so slots are
    /// never reallocated under a returning player.
    join_order: Vec<PlayerId>,
}

impl Game {
    pub fn new(id: GameId, config: GameConfig, seed: u64) -> Self {
        let mut bag = TetrominoBag::new(seed);
        let next = bag.draw();
        Self {
            id,
            board: Board::new(),
            pieces: Vec::new(),
            players: HashMap::new(),
            home_zones: HashMap::new(),
            status: GameStatus::Waiting,
            winner: None,
            end_reason: None,
            bag,
            next,
            config,
            join_order: Vec::new(),
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Preview of the next piece the bag will hand out.
    pub fn next_tetromino(&self) -> TetrominoKind {
        self.next
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn pieces_of(&self, player: PlayerId) -> impl Iterator<Item = &ChessPiece> {
        self.pieces.iter().filter(move |p| p.player_id == player)
    }

    pub fn king_of(&self, player: PlayerId) -> Option<Pos> {
        self.pieces
            .iter()
            .find(|p| p.player_id == player && p.kind == ChessPieceKind::King)
            .map(|p| p.position)
    }

    /// Register a player, or reactivate a returning one. New players get the
    /// next home-zone slot, the standard piece set and a tetris-phase turn.
    pub fn add_player(
        &mut self,
        id: PlayerId,
        display_name: String,
        is_computer: bool,
        is_external: bool,
        difficulty: Option<AiLevel>,
        now_ms: u64,
    ) -> GameResult<Vec<GameEvent>> {
        if self.status == GameStatus::Ended {
            return Err(GameError::NotYourTurn);
        }

        let mut events = Vec::new();

        if let Some(player) = self.players.get_mut(&id) {
            // Rejoin: reattach without rebuilding pieces or zone.
            player.is_active = true;
            events.push(GameEvent::PlayerJoined {
                player_id: id,
                name: player.display_name.clone(),
                is_computer: player.is_computer,
            });
            return Ok(events);
        }

        let slot = self.join_order.len();
        let zone = zone_for_slot(slot);
        for cell in zone.cells() {
            self.board
                .push_item(cell, CellItem::Home(HomeItem { player_id: id }));
        }
        self.spawn_piece_set(id, &zone);
        self.home_zones.insert(id, zone);

        let min_move_ms = difficulty
            .map(AiLevel::min_move_ms)
            .unwrap_or(self.config.min_move_ms);
        self.players.insert(
            id,
            Player {
                id,
                display_name: display_name.clone(),
                is_computer,
                is_external,
                difficulty,
                is_active: true,
                last_move_at: None,
                turn: Turn::new(now_ms, min_move_ms),
            },
        );
        self.join_order.push(id);

        events.push(GameEvent::PlayerJoined {
            player_id: id,
            name: display_name,
            is_computer,
        });
        if self.status == GameStatus::Waiting {
            self.status = GameStatus::Playing;
            events.push(GameEvent::GameStarted { game_id: self.id });
        }
        Ok(events)
    }

    /// Explicitly leave the game. The player goes inactive but their pieces
    /// stay; when only one active player is left in a multiplayer game,
    /// that player wins.
    pub fn remove_player(&mut self, id: PlayerId) -> GameResult<Vec<GameEvent>> {
        let mut events = self.mark_disconnected(id)?;

        if self.status == GameStatus::Playing && self.players.len() > 1 {
            let mut active = self.players.values().filter(|p| p.is_active);
            if let (Some(last), None) = (active.next(), active.next()) {
                let winner = last.id;
                self.end(Some(winner), EndReason::OpponentsLeft, &mut events);
            }
        }
        Ok(events)
    }

    /// A dropped transport flags the player inactive without the
    /// abandonment check, so a rejoin can pick the game back up.
    pub fn mark_disconnected(&mut self, id: PlayerId) -> GameResult<Vec<GameEvent>> {
        let player = self
            .players
            .get_mut(&id)
            .ok_or(GameError::PlayerNotInGame { player_id: id })?;
        player.is_active = false;
        Ok(vec![GameEvent::PlayerLeft { player_id: id }])
    }

    /// Hand out the current piece and draw the bag forward.
    pub fn request_tetromino(
        &mut self,
        player_id: PlayerId,
    ) -> GameResult<(TetrominoKind, TetrominoKind)> {
        if self.status != GameStatus::Playing {
            return Err(GameError::NotYourTurn);
        }
        let player = self
            .players
            .get_mut(&player_id)
            .ok_or(GameError::PlayerNotInGame { player_id })?;

        let current = self.next;
        self.next = self.bag.draw();
        player.turn.active_tetromino = Some(current);
        Ok((current, self.next))
    }

    /// Validate and apply a tetromino placement, then run clearing, the
    /// island sweep and the phase transition. On error the game is unchanged.
    pub fn place_tetromino(
        &mut self,
        player_id: PlayerId,
        tet: &Tetromino,
        now_ms: u64,
    ) -> GameResult<Vec<GameEvent>> {
        let king = self.check_actor(player_id, TurnPhase::Tetris, now_ms)?;
        tetromino::can_place(&self.board, player_id, king, tet)?;

        tetromino::apply_placement(&mut self.board, player_id, tet, now_ms);
        let mut events = vec![GameEvent::TetrominoPlaced {
            player_id,
            piece_type: tet.kind,
            rotation: tet.rotation,
            cells: tet.cells().to_vec(),
        }];

        let cleared = tetromino::clear_full_lines(&mut self.board, self.config.clear_policy);
        if !cleared.is_empty() {
            events.push(GameEvent::RowsCleared {
                rows: cleared.rows.clone(),
                cols: cleared.cols.clone(),
            });
            self.sweep_islands(&mut events);
        }

        let player = self.players.get_mut(&player_id).expect("actor checked");
        player.last_move_at = Some(now_ms);

        if self.status == GameStatus::Playing {
            let player = self.players.get_mut(&player_id).expect("actor checked");
            player.turn.advance_to_chess(now_ms);
            if !chess::has_any_legal_move(&self.board, self.pieces.iter(), player_id) {
                events.push(GameEvent::SkipChess { player_id });
                let player = self.players.get_mut(&player_id).expect("actor checked");
                player.turn.advance_to_tetris(now_ms);
            }
        }
        Ok(events)
    }

    /// Validate and apply a chess move, handling capture, promotion and the
    /// game-ending king capture.
    pub fn move_chess(
        &mut self,
        player_id: PlayerId,
        piece_id: PieceId,
        to: Pos,
        now_ms: u64,
    ) -> GameResult<Vec<GameEvent>> {
        self.check_actor(player_id, TurnPhase::Chess, now_ms)?;

        let piece = *self
            .pieces
            .iter()
            .find(|p| p.id == piece_id)
            .ok_or(GameError::IllegalChessMove { piece_id, to })?;
        if piece.player_id != player_id {
            return Err(GameError::NotYourPiece { piece_id });
        }
        if !chess::is_valid_move(&self.board, &piece, to) {
            return Err(GameError::IllegalChessMove { piece_id, to });
        }

        let mut events = Vec::new();
        let from = piece.position;
        let captured = self.board.chess_at(to).copied();

        // Lift the mover off its source cell.
        self.board
            .retain_items(from, |item| item.as_chess().map(|c| c.piece_id) != Some(piece_id));

        let promoted = piece.kind == ChessPieceKind::Pawn && self.is_promotion_cell(player_id, to);
        let new_kind = if promoted {
            ChessPieceKind::Queen
        } else {
            piece.kind
        };

        if let Some(target) = captured {
            self.board
                .retain_items(to, |item| item.as_chess().map(|c| c.piece_id) != Some(target.piece_id));
            self.pieces.retain(|p| p.id != target.piece_id);
        }

        self.board.push_item(
            to,
            CellItem::Chess(ChessItem {
                piece_id,
                piece_type: new_kind,
                player_id,
            }),
        );
        if let Some(record) = self.pieces.iter_mut().find(|p| p.id == piece_id) {
            record.position = to;
            record.has_moved = true;
            record.kind = new_kind;
        }

        events.push(GameEvent::ChessMoved {
            player_id,
            piece_id,
            from,
            to,
            promoted,
        });

        if let Some(target) = captured {
            events.push(GameEvent::PieceCaptured {
                piece_id: target.piece_id,
                piece_type: target.piece_type,
                player_id: target.player_id,
                by: Some(player_id),
            });
            if target.piece_type == ChessPieceKind::King {
                self.end(Some(player_id), EndReason::KingCaptured, &mut events);
            }
        }

        let player = self.players.get_mut(&player_id).expect("actor checked");
        player.last_move_at = Some(now_ms);
        if self.status == GameStatus::Playing {
            player.turn.advance_to_tetris(now_ms);
        }
        Ok(events)
    }

    /// Rebuild board, zones, pieces and bag while preserving the roster.
    pub fn restart(&mut self, seed: u64, now_ms: u64) -> Vec<GameEvent> {
        self.board = Board::new();
        self.pieces.clear();
        self.home_zones.clear();
        self.bag = TetrominoBag::new(seed);
        self.next = self.bag.draw();
        self.status = GameStatus::Playing;
        self.winner = None;
        self.end_reason = None;

        for (slot, player_id) in self.join_order.clone().into_iter().enumerate() {
            let zone = zone_for_slot(slot);
            for cell in zone.cells() {
                self.board
                    .push_item(cell, CellItem::Home(HomeItem { player_id }));
            }
            self.spawn_piece_set(player_id, &zone);
            self.home_zones.insert(player_id, zone);

            let player = self.players.get_mut(&player_id).expect("roster preserved");
            player.last_move_at = None;
            player.turn = Turn::new(now_ms, player.turn.min_duration_ms);
        }

        vec![GameEvent::GameStarted { game_id: self.id }]
    }

    /// Move the game to its terminal state. Ending is monotone.
    pub fn end(
        &mut self,
        winner: Option<PlayerId>,
        reason: EndReason,
        events: &mut Vec<GameEvent>,
    ) {
        if self.status == GameStatus::Ended {
            return;
        }
        self.status = GameStatus::Ended;
        self.winner = winner;
        self.end_reason = Some(reason);
        events.push(GameEvent::GameEnded {
            winner,
            end_reason: reason,
        });
    }

    pub fn snapshot(&self) -> Snapshot {
        let bounds = self.board.bounds();
        let mut cells = BTreeMap::new();
        for (pos, items) in self.board.iter_occupied() {
            cells.insert(pos.to_string(), items.to_vec());
        }
        Snapshot {
            id: self.id,
            status: self.status,
            winner: self.winner,
            board: BoardSnapshot {
                cells,
                min_x: bounds.map_or(0, |b| b.min_x),
                max_x: bounds.map_or(0, |b| b.max_x),
                min_z: bounds.map_or(0, |b| b.min_z),
                max_z: bounds.map_or(0, |b| b.max_z),
            },
            chess_pieces: self.pieces.clone(),
            home_zones: self
                .home_zones
                .iter()
                .map(|(id, zone)| {
                    (
                        *id,
                        ZoneSnapshot {
                            min_x: zone.min_x,
                            min_z: zone.min_z,
                            max_x: zone.max_x(),
                            max_z: zone.max_z(),
                            orientation: zone.orientation,
                        },
                    )
                })
                .collect(),
            players: self
                .players
                .iter()
                .map(|(id, player)| {
                    (
                        *id,
                        PlayerSnapshot {
                            name: player.display_name.clone(),
                            is_computer: player.is_computer,
                            is_active: player.is_active,
                            current_turn: player.turn,
                        },
                    )
                })
                .collect(),
            next_tetromino: self.next,
        }
    }

    /// Cross-check the redundant state representations. A failure here is a
    /// fatal internal error, not a rule rejection.
    pub fn audit(&self) -> Result<(), String> {
        for piece in &self.pieces {
            match self.board.chess_at(piece.position) {
                Some(item) if item.piece_id == piece.id => {}
                _ => {
                    return Err(format!(
                        "piece {} missing from board cell {}",
                        piece.id, piece.position
                    ))
                }
            }
        }
        let mut on_board = 0usize;
        for (pos, items) in self.board.iter_occupied() {
            let chess_here = items.iter().filter(|item| item.is_chess()).count();
            if chess_here > 1 {
                return Err(format!("two chess items share cell {pos}"));
            }
            on_board += chess_here;
            if let Some(bounds) = self.board.bounds() {
                if !bounds.contains(pos) {
                    return Err(format!("cell {pos} outside tracked bounds"));
                }
            }
        }
        if on_board != self.pieces.len() {
            return Err(format!(
                "{} chess items on board, {} piece records",
                on_board,
                self.pieces.len()
            ));
        }
        Ok(())
    }

    /// Common validation for both move kinds: membership, liveness, phase
    /// and pacing. Returns the player's king position.
    fn check_actor(
        &self,
        player_id: PlayerId,
        phase: TurnPhase,
        now_ms: u64,
    ) -> GameResult<Pos> {
        if self.status != GameStatus::Playing {
            return Err(GameError::NotYourTurn);
        }
        let player = self
            .players
            .get(&player_id)
            .ok_or(GameError::PlayerNotInGame { player_id })?;
        if !player.is_active {
            return Err(GameError::NotYourTurn);
        }
        player.turn.expect_phase(phase)?;
        player.turn.check_pacing(player.last_move_at, now_ms)?;
        self.king_of(player_id).ok_or(GameError::NotYourTurn)
    }

    fn spawn_piece_set(&mut self, player_id: PlayerId, zone: &HomeZone) {
        let back = zone.back_rank();
        let pawns = zone.pawn_rank();
        for (kind, pos) in BACK_RANK.iter().zip(back) {
            self.spawn_piece(player_id, *kind, pos, zone.orientation);
        }
        for pos in pawns {
            self.spawn_piece(player_id, ChessPieceKind::Pawn, pos, zone.orientation);
        }
    }

    fn spawn_piece(&mut self, player_id: PlayerId, kind: ChessPieceKind, pos: Pos, orientation: u8) {
        let piece = ChessPiece {
            id: PieceId::new_v4(),
            kind,
            player_id,
            position: pos,
            orientation,
            has_moved: false,
        };
        self.board.push_item(
            pos,
            CellItem::Chess(ChessItem {
                piece_id: piece.id,
                piece_type: kind,
                player_id,
            }),
        );
        self.pieces.push(piece);
    }

    /// Remove every tetromino component disconnected from its owner's king,
    /// destroying chess pieces left without support. A king going down this
    /// way ends the game with no winner.
    fn sweep_islands(&mut self, events: &mut Vec<GameEvent>) {
        let mut kings_lost = false;
        for player_id in self.join_order.clone() {
            let Some(king) = self.king_of(player_id) else {
                continue;
            };
            for island in connectivity::find_islands(&self.board, player_id) {
                if island.contains(&king) {
                    continue;
                }
                for pos in island {
                    let removed = self.board.retain_items(pos, |item| {
                        !(item.is_tetromino() && item.player_id() == player_id)
                    });
                    if removed.is_empty() || self.board.is_passable(pos) {
                        continue;
                    }
                    // The block under this cell is gone; anything standing
                    // there falls into the void.
                    if let Some(chess) = self.board.chess_at(pos).copied() {
                        self.board.retain_items(pos, |item| !item.is_chess());
                        self.pieces.retain(|p| p.id != chess.piece_id);
                        events.push(GameEvent::PieceCaptured {
                            piece_id: chess.piece_id,
                            piece_type: chess.piece_type,
                            player_id: chess.player_id,
                            by: None,
                        });
                        if chess.piece_type == ChessPieceKind::King {
                            kings_lost = true;
                        }
                    }
                }
            }
        }
        if kings_lost {
            self.end(None, EndReason::KingLost, events);
        }
    }

    fn is_promotion_cell(&self, mover: PlayerId, pos: Pos) -> bool {
        self.home_zones
            .iter()
            .filter(|(owner, _)| **owner != mover)
            .any(|(_, zone)| zone.back_rank().contains(&pos))
    }
}

/// Grid slot of the n-th player: origin first, then rings outward, each ring
/// in ascending `(gx, gz)` order, so allocation is deterministic.
fn grid_slot(index: usize) -> (i32, i32) {
    let mut seen = 0usize;
    let mut ring = 0i32;
    loop {
        let mut cells: Vec<(i32, i32)> = Vec::new();
        for gx in -ring..=ring {
            for gz in -ring..=ring {
                if gx.abs().max(gz.abs()) == ring {
                    cells.push((gx, gz));
                }
            }
        }
        if index < seen + cells.len() {
            return cells[index - seen];
        }
        seen += cells.len();
        ring += 1;
    }
}

/// Home zone for a join slot: anchored on the allocation grid, oriented so
/// pawns march toward the origin.
fn zone_for_slot(slot: usize) -> HomeZone {
    let (gx, gz) = grid_slot(slot);
    let orientation = match (gx, gz) {
        (0, 0) => 0,
        (_, gz) if gz > 0 => 2,
        (_, gz) if gz < 0 => 0,
        (gx, _) if gx > 0 => 3,
        _ => 1,
    };
    let (width, height) = match orientation {
        0 | 2 => (HOME_ZONE_WIDTH, HOME_ZONE_DEPTH),
        _ => (HOME_ZONE_DEPTH, HOME_ZONE_WIDTH),
    };
    HomeZone {
        min_x: gx * HOME_ZONE_SPACING,
        min_z: gz * HOME_ZONE_SPACING,
        width,
        height,
        orientation,
    }
}
