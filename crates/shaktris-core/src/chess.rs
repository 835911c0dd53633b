//! Chess piece movement rules
//!
//! Standard chess geometry adapted to the sparse board: pieces walk on
//! blocks, so an empty cell is impassable, and pawn direction comes from the
//! owner's home-zone orientation instead of global coordinates.
//!
//! Pure functions with no side effects - easy to test.

use serde::{Deserialize, Serialize};

use crate::board::{Board, Pos};
use crate::{PieceId, PlayerId};

/// The six chess piece kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChessPieceKind {
    King,
    Queen,
    Rook,
    Bishop,
    Knight,
    Pawn,
}

/// A chess piece, alive from game creation until capture.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChessPiece {
    pub id: PieceId,
    #[serde(rename = "type")]
    pub kind: ChessPieceKind,
    pub player_id: PlayerId,
    pub position: Pos,
    /// Home-zone orientation inherited at spawn; fixes the pawn's forward
    /// direction.
    pub orientation: u8,
    pub has_moved: bool,
}

/// Forward direction of a home-zone orientation.
pub fn forward(orientation: u8) -> (i32, i32) {
    [(0, 1), (1, 0), (0, -1), (-1, 0)][(orientation % 4) as usize]
}

/// Check if a move is valid for a given piece on the current board.
pub fn is_valid_move(board: &Board, piece: &ChessPiece, to: Pos) -> bool {
    let from = piece.position;

    // Can't stand still.
    if from == to {
        return false;
    }

    // Destination needs ground under it or an enemy piece to capture.
    let capture = match board.chess_at(to) {
        Some(target) => {
            if target.player_id == piece.player_id {
                return false;
            }
            true
        }
        None => false,
    };
    if !capture && !board.is_passable(to) {
        return false;
    }

    match piece.kind {
        ChessPieceKind::Pawn => is_valid_pawn_move(board, piece, to, capture),
        ChessPieceKind::Knight => is_valid_knight_move(from, to),
        ChessPieceKind::Bishop => is_valid_bishop_move(board, from, to),
        ChessPieceKind::Rook => is_valid_rook_move(board, from, to),
        ChessPieceKind::Queen => {
            is_valid_rook_move(board, from, to) || is_valid_bishop_move(board, from, to)
        }
        ChessPieceKind::King => is_valid_king_move(from, to),
    }
}

/// All destinations currently legal for the piece. The scan is bounded by
/// the board's occupied extremes; everything outside is impassable anyway.
pub fn legal_moves(board: &Board, piece: &ChessPiece) -> Vec<Pos> {
    let Some(bounds) = board.bounds() else {
        return Vec::new();
    };
    let mut moves = Vec::new();
    for x in bounds.min_x..=bounds.max_x {
        for z in bounds.min_z..=bounds.max_z {
            let to = Pos::new(x, z);
            if is_valid_move(board, piece, to) {
                moves.push(to);
            }
        }
    }
    moves
}

/// Whether the player has at least one legal chess move. Drives the forced
/// skip of the chess phase.
pub fn has_any_legal_move<'a, I>(board: &Board, pieces: I, player: PlayerId) -> bool
where
    I: IntoIterator<Item = &'a ChessPiece>,
{
    pieces
        .into_iter()
        .filter(|piece| piece.player_id == player)
        .any(|piece| !legal_moves(board, piece).is_empty())
}

fn is_valid_pawn_move(board: &Board, piece: &ChessPiece, to: Pos, capture: bool) -> bool {
    let (fx, fz) = forward(piece.orientation);
    let dx = to.x - piece.position.x;
    let dz = to.z - piece.position.z;

    if capture {
        // Diagonal-forward by one.
        return dx * fx + dz * fz == 1 && dx.abs().max(dz.abs()) == 1 && (dx, dz) != (fx, fz);
    }

    // Forward by one onto free ground.
    (dx, dz) == (fx, fz) && board.chess_at(to).is_none()
}

fn is_valid_knight_move(from: Pos, to: Pos) -> bool {
    let dx = (to.x - from.x).abs();
    let dz = (to.z - from.z).abs();
    (dx == 2 && dz == 1) || (dx == 1 && dz == 2)
}

fn is_valid_bishop_move(board: &Board, from: Pos, to: Pos) -> bool {
    let dx = (to.x - from.x).abs();
    let dz = (to.z - from.z).abs();

    // Must move diagonally
    if dx != dz {
        return false;
    }

    is_path_walkable(board, from, to)
}

fn is_valid_rook_move(board: &Board, from: Pos, to: Pos) -> bool {
    // Must move horizontally or vertically
    if from.x != to.x && from.z != to.z {
        return false;
    }

    is_path_walkable(board, from, to)
}

fn is_valid_king_move(from: Pos, to: Pos) -> bool {
    let dx = (to.x - from.x).abs();
    let dz = (to.z - from.z).abs();

    // King moves one cell in any direction
    dx <= 1 && dz <= 1
}

/// Every intermediate cell must carry ground and be free of chess pieces.
fn is_path_walkable(board: &Board, from: Pos, to: Pos) -> bool {
    let dx = (to.x - from.x).signum();
    let dz = (to.z - from.z).signum();

    let mut cursor = from.offset(dx, dz);
    while cursor != to {
        if !board.is_passable(cursor) || board.chess_at(cursor).is_some() {
            return false;
        }
        cursor = cursor.offset(dx, dz);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{CellItem, ChessItem, HomeItem, TetrominoItem};
    use crate::tetromino::TetrominoKind;
    use uuid::Uuid;

    fn ground(board: &mut Board, owner: PlayerId, cells: &[(i32, i32)]) {
        for &(x, z) in cells {
            board.push_item(
                Pos::new(x, z),
                CellItem::Tetromino(TetrominoItem {
                    player_id: owner,
                    piece_type: TetrominoKind::I,
                    placed_at: 0,
                }),
            );
        }
    }

    fn stand(board: &mut Board, piece: &ChessPiece) {
        board.push_item(
            piece.position,
            CellItem::Chess(ChessItem {
                piece_id: piece.id,
                piece_type: piece.kind,
                player_id: piece.player_id,
            }),
        );
    }

    fn piece(kind: ChessPieceKind, player: PlayerId, x: i32, z: i32) -> ChessPiece {
        ChessPiece {
            id: Uuid::new_v4(),
            kind,
            player_id: player,
            position: Pos::new(x, z),
            orientation: 0,
            has_moved: false,
        }
    }

    #[test]
    fn rook_slides_over_blocks_only() {
        let player = Uuid::new_v4();
        let mut board = Board::new();
        ground(&mut board, player, &[(0, 0), (1, 0), (2, 0), (3, 0)]);
        let rook = piece(ChessPieceKind::Rook, player, 0, 0);
        stand(&mut board, &rook);

        assert!(is_valid_move(&board, &rook, Pos::new(3, 0)));
        // Off the strip there is no ground.
        assert!(!is_valid_move(&board, &rook, Pos::new(0, 2)));
    }

    #[test]
    fn rook_path_is_blocked_by_gap() {
        let player = Uuid::new_v4();
        let mut board = Board::new();
        ground(&mut board, player, &[(0, 0), (1, 0), (3, 0)]);
        let rook = piece(ChessPieceKind::Rook, player, 0, 0);
        stand(&mut board, &rook);

        // (2, 0) is a void; the rook cannot cross it.
        assert!(!is_valid_move(&board, &rook, Pos::new(3, 0)));
    }

    #[test]
    fn rook_path_is_blocked_by_piece() {
        let player = Uuid::new_v4();
        let mut board = Board::new();
        ground(&mut board, player, &[(0, 0), (1, 0), (2, 0), (3, 0)]);
        let rook = piece(ChessPieceKind::Rook, player, 0, 0);
        let pawn = piece(ChessPieceKind::Pawn, player, 2, 0);
        stand(&mut board, &rook);
        stand(&mut board, &pawn);

        assert!(is_valid_move(&board, &rook, Pos::new(1, 0)));
        assert!(!is_valid_move(&board, &rook, Pos::new(3, 0)));
    }

    #[test]
    fn bishop_moves_diagonally() {
        let player = Uuid::new_v4();
        let mut board = Board::new();
        ground(&mut board, player, &[(0, 0), (1, 1), (2, 2)]);
        let bishop = piece(ChessPieceKind::Bishop, player, 0, 0);
        stand(&mut board, &bishop);

        assert!(is_valid_move(&board, &bishop, Pos::new(2, 2)));
        assert!(!is_valid_move(&board, &bishop, Pos::new(2, 1)));
    }

    #[test]
    fn knight_jumps_over_voids() {
        let player = Uuid::new_v4();
        let mut board = Board::new();
        // Only the landing cell carries ground.
        ground(&mut board, player, &[(0, 0), (1, 2)]);
        let knight = piece(ChessPieceKind::Knight, player, 0, 0);
        stand(&mut board, &knight);

        assert!(is_valid_move(&board, &knight, Pos::new(1, 2)));
        assert!(!is_valid_move(&board, &knight, Pos::new(2, 2)));
    }

    #[test]
    fn king_steps_one_cell() {
        let player = Uuid::new_v4();
        let mut board = Board::new();
        ground(&mut board, player, &[(0, 0), (1, 0), (1, 1), (2, 0)]);
        let king = piece(ChessPieceKind::King, player, 0, 0);
        stand(&mut board, &king);

        assert!(is_valid_move(&board, &king, Pos::new(1, 1)));
        assert!(!is_valid_move(&board, &king, Pos::new(2, 0)));
    }

    #[test]
    fn no_capture_of_own_piece() {
        let player = Uuid::new_v4();
        let mut board = Board::new();
        ground(&mut board, player, &[(0, 0), (1, 0)]);
        let rook = piece(ChessPieceKind::Rook, player, 0, 0);
        let own_pawn = piece(ChessPieceKind::Pawn, player, 1, 0);
        stand(&mut board, &rook);
        stand(&mut board, &own_pawn);

        assert!(!is_valid_move(&board, &rook, Pos::new(1, 0)));
    }

    #[test]
    fn capture_of_enemy_piece() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut board = Board::new();
        ground(&mut board, a, &[(0, 0), (1, 0), (2, 0)]);
        let rook = piece(ChessPieceKind::Rook, a, 0, 0);
        let enemy = piece(ChessPieceKind::Knight, b, 2, 0);
        stand(&mut board, &rook);
        stand(&mut board, &enemy);

        assert!(is_valid_move(&board, &rook, Pos::new(2, 0)));
    }

    #[test]
    fn pawn_moves_along_home_orientation() {
        let player = Uuid::new_v4();
        let mut board = Board::new();
        ground(&mut board, player, &[(0, 0), (0, 1), (0, -1), (1, 0)]);

        let mut pawn = piece(ChessPieceKind::Pawn, player, 0, 0);
        stand(&mut board, &pawn);

        // Orientation 0 faces +z.
        assert!(is_valid_move(&board, &pawn, Pos::new(0, 1)));
        assert!(!is_valid_move(&board, &pawn, Pos::new(0, -1)));
        assert!(!is_valid_move(&board, &pawn, Pos::new(1, 0)));

        // Orientation 2 faces -z.
        pawn.orientation = 2;
        assert!(is_valid_move(&board, &pawn, Pos::new(0, -1)));
        assert!(!is_valid_move(&board, &pawn, Pos::new(0, 1)));
    }

    #[test]
    fn pawn_captures_diagonally_forward_only() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut board = Board::new();
        ground(&mut board, a, &[(1, 0), (1, 1), (0, 1), (2, 1), (0, 0)]);

        let pawn = piece(ChessPieceKind::Pawn, a, 1, 0);
        let target = piece(ChessPieceKind::Knight, b, 2, 1);
        let straight = piece(ChessPieceKind::Bishop, b, 1, 1);
        let behind = piece(ChessPieceKind::Rook, b, 0, 0);
        stand(&mut board, &pawn);
        stand(&mut board, &target);
        stand(&mut board, &straight);
        stand(&mut board, &behind);

        // Diagonal-forward capture works.
        assert!(is_valid_move(&board, &pawn, Pos::new(2, 1)));
        // Straight-ahead capture does not.
        assert!(!is_valid_move(&board, &pawn, Pos::new(1, 1)));
        // Sideways-or-back capture does not.
        assert!(!is_valid_move(&board, &pawn, Pos::new(0, 0)));
    }

    #[test]
    fn legal_moves_match_is_valid_move() {
        let player = Uuid::new_v4();
        let mut board = Board::new();
        ground(
            &mut board,
            player,
            &[(0, 0), (1, 0), (2, 0), (0, 1), (1, 1), (2, 1)],
        );
        let queen = piece(ChessPieceKind::Queen, player, 0, 0);
        stand(&mut board, &queen);

        let enumerated = legal_moves(&board, &queen);
        let bounds = board.bounds().unwrap();
        for x in bounds.min_x..=bounds.max_x {
            for z in bounds.min_z..=bounds.max_z {
                let to = Pos::new(x, z);
                assert_eq!(
                    enumerated.contains(&to),
                    is_valid_move(&board, &queen, to),
                    "mismatch at {to}"
                );
            }
        }
    }

    #[test]
    fn stranded_piece_has_no_moves() {
        let player = Uuid::new_v4();
        let mut board = Board::new();
        ground(&mut board, player, &[(0, 0)]);
        let rook = piece(ChessPieceKind::Rook, player, 0, 0);
        stand(&mut board, &rook);

        assert!(legal_moves(&board, &rook).is_empty());
        assert!(!has_any_legal_move(&board, [rook].iter(), player));
    }
}
