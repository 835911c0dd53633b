//! Island / connectivity service
//!
//! Breadth-first search over the eight-neighbourhood, restricted to cells
//! holding any item of the querying player (their king cell included). Used
//! by the tetromino engine for the path-to-king check and by the game
//! instance to find islands after destructive events.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::board::{Board, Pos};
use crate::PlayerId;

/// Eight-neighbourhood directions in lexicographic `(dx, dz)` order. The
/// fixed order keeps shortest-path tie-breaks deterministic.
pub const DIRS8: [(i32, i32); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Shortest eight-connected path from `start` to `king` across the player's
/// occupied cells, endpoints included. `None` when no path exists.
pub fn path_to_king(board: &Board, start: Pos, player: PlayerId, king: Pos) -> Option<Vec<Pos>> {
    if !board.player_occupies(start, player) {
        return None;
    }
    if start == king {
        return Some(vec![start]);
    }

    let mut parents: HashMap<Pos, Pos> = HashMap::new();
    let mut queue = VecDeque::new();
    parents.insert(start, start);
    queue.push_back(start);

    while let Some(pos) = queue.pop_front() {
        for (dx, dz) in DIRS8 {
            let next = pos.offset(dx, dz);
            if parents.contains_key(&next) || !board.player_occupies(next, player) {
                continue;
            }
            parents.insert(next, pos);
            if next == king {
                return Some(backtrack(&parents, start, king));
            }
            queue.push_back(next);
        }
    }
    None
}

/// Maximal eight-connected components of the player's occupied cells.
/// Components come out in ascending order of their smallest coordinate, and
/// each component's cells are sorted, so results are stable under test.
pub fn find_islands(board: &Board, player: PlayerId) -> Vec<Vec<Pos>> {
    let mut mine: Vec<Pos> = board
        .iter_occupied()
        .filter(|(_, items)| items.iter().any(|item| item.player_id() == player))
        .map(|(pos, _)| pos)
        .collect();
    mine.sort();

    let mut seen: HashSet<Pos> = HashSet::new();
    let mut islands = Vec::new();

    for &seed in &mine {
        if seen.contains(&seed) {
            continue;
        }
        let mut component = Vec::new();
        let mut queue = VecDeque::new();
        seen.insert(seed);
        queue.push_back(seed);
        while let Some(pos) = queue.pop_front() {
            component.push(pos);
            for (dx, dz) in DIRS8 {
                let next = pos.offset(dx, dz);
                if !seen.contains(&next) && board.player_occupies(next, player) {
                    seen.insert(next);
                    queue.push_back(next);
                }
            }
        }
        component.sort();
        islands.push(component);
    }
    islands
}

fn backtrack(parents: &HashMap<Pos, Pos>, start: Pos, end: Pos) -> Vec<Pos> {
    let mut path = vec![end];
    let mut cursor = end;
    while cursor != start {
        cursor = parents[&cursor];
        path.push(cursor);
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{CellItem, ChessItem, HomeItem, TetrominoItem};
    use crate::chess::ChessPieceKind;
    use crate::tetromino::TetrominoKind;
    use uuid::Uuid;

    fn board_with_blocks(player: PlayerId, cells: &[(i32, i32)]) -> Board {
        let mut board = Board::new();
        for &(x, z) in cells {
            board.push_item(
                Pos::new(x, z),
                CellItem::Tetromino(TetrominoItem {
                    player_id: player,
                    piece_type: TetrominoKind::I,
                    placed_at: 0,
                }),
            );
        }
        board
    }

    fn put_king(board: &mut Board, player: PlayerId, pos: Pos) {
        board.push_item(pos, CellItem::Home(HomeItem { player_id: player }));
        board.push_item(
            pos,
            CellItem::Chess(ChessItem {
                piece_id: Uuid::new_v4(),
                piece_type: ChessPieceKind::King,
                player_id: player,
            }),
        );
    }

    #[test]
    fn straight_line_path_is_found() {
        let player = Uuid::new_v4();
        let mut board = board_with_blocks(player, &[(1, 0), (2, 0), (3, 0)]);
        put_king(&mut board, player, Pos::new(0, 0));

        let path = path_to_king(&board, Pos::new(3, 0), player, Pos::new(0, 0))
            .expect("path exists");
        assert_eq!(path.first(), Some(&Pos::new(3, 0)));
        assert_eq!(path.last(), Some(&Pos::new(0, 0)));
        assert_eq!(path.len(), 4);
    }

    #[test]
    fn diagonals_count_as_connected() {
        let player = Uuid::new_v4();
        let mut board = board_with_blocks(player, &[(1, 1), (2, 2)]);
        put_king(&mut board, player, Pos::new(0, 0));

        let path = path_to_king(&board, Pos::new(2, 2), player, Pos::new(0, 0))
            .expect("diagonal steps allowed");
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn foreign_cells_do_not_carry_the_path() {
        let player = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut board = board_with_blocks(player, &[(3, 0)]);
        // A bridge owned by someone else.
        board.push_item(
            Pos::new(1, 0),
            CellItem::Tetromino(TetrominoItem {
                player_id: other,
                piece_type: TetrominoKind::O,
                placed_at: 0,
            }),
        );
        board.push_item(
            Pos::new(2, 0),
            CellItem::Tetromino(TetrominoItem {
                player_id: other,
                piece_type: TetrominoKind::O,
                placed_at: 0,
            }),
        );
        put_king(&mut board, player, Pos::new(0, 0));

        assert!(path_to_king(&board, Pos::new(3, 0), player, Pos::new(0, 0)).is_none());
    }

    #[test]
    fn islands_split_on_gaps() {
        let player = Uuid::new_v4();
        let board = board_with_blocks(player, &[(0, 0), (1, 0), (5, 5), (6, 6)]);

        let islands = find_islands(&board, player);
        assert_eq!(islands.len(), 2);
        assert_eq!(islands[0], vec![Pos::new(0, 0), Pos::new(1, 0)]);
        assert_eq!(islands[1], vec![Pos::new(5, 5), Pos::new(6, 6)]);
    }

    #[test]
    fn shortest_path_ties_are_deterministic() {
        let player = Uuid::new_v4();
        // Two equally short routes around a ring; BFS with the fixed
        // direction order must always pick the same one.
        let mut board = board_with_blocks(
            player,
            &[(1, -1), (1, 0), (1, 1), (2, -1), (2, 1), (3, -1), (3, 0), (3, 1)],
        );
        put_king(&mut board, player, Pos::new(0, 0));

        let a = path_to_king(&board, Pos::new(3, 0), player, Pos::new(0, 0)).unwrap();
        let b = path_to_king(&board, Pos::new(3, 0), player, Pos::new(0, 0)).unwrap();
        assert_eq!(a, b);
    }
}
