//! Coordinator flow tests
//!
//! End-to-end behavior of the session coordinator and game workers:
//! ordering of accepted moves on the event bus, the pacing floor, fallback
//! routing, spectating and reconnection.

use uuid::Uuid;

use backend::coordinator::Coordinator;
use backend::error::ServerError;
use backend::worker::PlayerDescriptor;
use shaktris_core::game::GameConfig;
use shaktris_core::tetromino::{ClearPolicy, Tetromino, TetrominoKind};
use shaktris_core::turn::TurnPhase;
use shaktris_core::{GameError, GameEvent, PlayerId, Pos};
use shared::GameOpts;

fn human(name: &str) -> PlayerDescriptor {
    PlayerDescriptor {
        player_id: Uuid::new_v4(),
        name: name.to_string(),
        is_computer: false,
        is_external: false,
        difficulty: None,
    }
}

fn fast_opts() -> GameOpts {
    GameOpts {
        min_move_ms: Some(0),
        clear_policy: None,
        seed: Some(7),
    }
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<GameEvent>) -> Vec<GameEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn accepted_moves_appear_on_the_bus_in_submission_order() {
    let coordinator = Coordinator::new(GameConfig::default());
    let game_id = coordinator.create_game(&fast_opts());
    let handle = coordinator.resolve(Some(game_id));
    let mut events = handle.subscribe();

    let descriptor = human("ada");
    let (_, player) = coordinator
        .join_game(Some(game_id), descriptor)
        .await
        .unwrap();

    // 100 accepted moves from one player: per round, a four-cell strip on
    // a fresh row (staggered left/right so no line ever fills) and a knight
    // oscillating between its back-rank cell and a strip cell.
    let mut expected: Vec<&str> = vec!["joined", "started"];
    let knight = coordinator
        .get_game_state(Some(game_id))
        .await
        .unwrap()
        .chess_pieces
        .into_iter()
        .find(|p| p.player_id == player && p.position == Pos::new(1, 0))
        .expect("knight on the back rank");

    for round in 0..50 {
        let z = 2 + round;
        let x = if z % 2 == 0 { 0 } else { 4 };
        let strip = Tetromino::new(TetrominoKind::I, 1, Pos::new(x, z));
        coordinator
            .place_tetromino(player, strip)
            .await
            .unwrap_or_else(|err| panic!("round {round} placement failed: {err}"));
        expected.push("placed");

        let hop = if round % 2 == 0 {
            Pos::new(0, 2)
        } else {
            Pos::new(1, 0)
        };
        coordinator
            .move_chess(player, knight.id, hop)
            .await
            .unwrap_or_else(|err| panic!("round {round} knight hop failed: {err}"));
        expected.push("moved");
    }

    let seen: Vec<&str> = drain(&mut events)
        .into_iter()
        .map(|event| match event {
            GameEvent::PlayerJoined { .. } => "joined",
            GameEvent::GameStarted { .. } => "started",
            GameEvent::TetrominoPlaced { .. } => "placed",
            GameEvent::ChessMoved { .. } => "moved",
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn sequential_joins_broadcast_in_order() {
    let coordinator = Coordinator::new(GameConfig::default());
    let game_id = coordinator.create_game(&fast_opts());
    let handle = coordinator.resolve(Some(game_id));
    let mut events = handle.subscribe();

    let mut expected: Vec<PlayerId> = Vec::new();
    for i in 0..8 {
        let descriptor = human(&format!("p{i}"));
        let (_, player) = coordinator
            .join_game(Some(game_id), descriptor)
            .await
            .unwrap();
        expected.push(player);
    }

    let joined: Vec<PlayerId> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            GameEvent::PlayerJoined { player_id, .. } => Some(player_id),
            _ => None,
        })
        .collect();
    assert_eq!(joined, expected);
}

#[tokio::test]
async fn second_move_inside_the_window_is_too_soon() {
    let coordinator = Coordinator::new(GameConfig::default());
    // Default pacing: 10 s floor.
    let game_id = coordinator.create_game(&GameOpts {
        seed: Some(1),
        ..GameOpts::default()
    });
    let handle = coordinator.resolve(Some(game_id));
    let mut events = handle.subscribe();

    let (_, player) = coordinator
        .join_game(Some(game_id), human("hasty"))
        .await
        .unwrap();

    let first = Tetromino::new(TetrominoKind::I, 0, Pos::new(4, 2));
    coordinator.place_tetromino(player, first).await.unwrap();

    // The turn is now in its chess half, so the follow-up is phase-legal
    // and fails purely on pacing.
    let pawn = coordinator
        .get_game_state(Some(game_id))
        .await
        .unwrap()
        .chess_pieces
        .into_iter()
        .find(|p| p.player_id == player && p.position == Pos::new(4, 1))
        .unwrap();
    let result = coordinator.move_chess(player, pawn.id, Pos::new(4, 2)).await;
    match result {
        Err(ServerError::Rule(GameError::TooSoon { retry_after_ms })) => {
            assert!(retry_after_ms > 0 && retry_after_ms <= 10_000);
        }
        other => panic!("expected TooSoon, got {other:?}"),
    }

    // Exactly one accepted placement reached the bus.
    let placements = drain(&mut events)
        .into_iter()
        .filter(|event| matches!(event, GameEvent::TetrominoPlaced { .. }))
        .count();
    assert_eq!(placements, 1);
}

#[tokio::test]
async fn unknown_game_ids_route_to_the_global_game() {
    let coordinator = Coordinator::new(GameConfig::default());

    let snapshot = coordinator
        .get_game_state(Some(Uuid::new_v4()))
        .await
        .unwrap();
    assert_eq!(snapshot.id, coordinator.global_game());

    let (game_id, _) = coordinator
        .join_game(Some(Uuid::new_v4()), human("lost"))
        .await
        .unwrap();
    assert_eq!(game_id, coordinator.global_game());
}

#[tokio::test]
async fn reconnection_preserves_pieces_zone_and_phase() {
    let coordinator = Coordinator::new(GameConfig::default());
    let game_id = coordinator.create_game(&fast_opts());

    let descriptor = human("comeback");
    let player = descriptor.player_id;
    coordinator
        .join_game(Some(game_id), descriptor)
        .await
        .unwrap();
    // A second player keeps the game alive across the disconnect.
    coordinator
        .join_game(Some(game_id), human("other"))
        .await
        .unwrap();

    let strip = Tetromino::new(TetrominoKind::I, 0, Pos::new(4, 2));
    coordinator.place_tetromino(player, strip).await.unwrap();

    let before = coordinator.get_game_state(Some(game_id)).await.unwrap();
    let zone_before = before.home_zones[&player];
    assert_eq!(
        before.players[&player].current_turn.phase,
        TurnPhase::Chess
    );

    coordinator.mark_disconnected(player).await;
    let during = coordinator.get_game_state(Some(game_id)).await.unwrap();
    assert!(!during.players[&player].is_active);

    // Rejoin with the same id, even against a bogus game id.
    let (rejoined_game, rejoined_id) = coordinator
        .join_game(
            Some(Uuid::new_v4()),
            PlayerDescriptor {
                player_id: player,
                name: "comeback".to_string(),
                is_computer: false,
                is_external: false,
                difficulty: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(rejoined_game, game_id);
    assert_eq!(rejoined_id, player);

    let after = coordinator.get_game_state(Some(game_id)).await.unwrap();
    assert!(after.players[&player].is_active);
    assert_eq!(after.home_zones[&player], zone_before);
    assert_eq!(after.players[&player].current_turn.phase, TurnPhase::Chess);
    assert_eq!(
        after
            .chess_pieces
            .iter()
            .filter(|p| p.player_id == player)
            .count(),
        16
    );
}

#[tokio::test]
async fn spectators_bind_to_the_target_players_game() {
    let coordinator = Coordinator::new(GameConfig::default());
    let game_id = coordinator.create_game(&fast_opts());
    let (_, player) = coordinator
        .join_game(Some(game_id), human("star"))
        .await
        .unwrap();

    let spectator = Uuid::new_v4();
    let handle = coordinator.request_spectate(spectator, player).unwrap();
    assert_eq!(handle.id, game_id);
    assert_eq!(coordinator.spectate_target(spectator), Some(player));

    // Spectator sees the target's game events.
    let mut events = handle.subscribe();
    let strip = Tetromino::new(TetrominoKind::I, 0, Pos::new(4, 2));
    coordinator.place_tetromino(player, strip).await.unwrap();
    assert!(matches!(
        events.try_recv(),
        Ok(GameEvent::TetrominoPlaced { .. })
    ));

    coordinator.stop_spectating(spectator);
    assert_eq!(coordinator.spectate_target(spectator), None);

    // Spectating an unknown player is an authorisation failure.
    assert!(matches!(
        coordinator.request_spectate(spectator, Uuid::new_v4()),
        Err(ServerError::Rule(GameError::PlayerNotInGame { .. }))
    ));
}

#[tokio::test]
async fn created_games_honor_the_requested_clearing_policy() {
    let coordinator = Coordinator::new(GameConfig::default());
    let game_id = coordinator.create_game(&GameOpts {
        min_move_ms: Some(0),
        clear_policy: Some(ClearPolicy::FixedWindow { width: 4 }),
        seed: Some(11),
    });
    let handle = coordinator.resolve(Some(game_id));
    let mut events = handle.subscribe();

    let (_, player) = coordinator
        .join_game(Some(game_id), human("window"))
        .await
        .unwrap();

    // A four-cell strip is a full window under this policy, so the very
    // first placement clears its own row; under the default bounding-span
    // policy it would be four cells short.
    let strip = Tetromino::new(TetrominoKind::I, 1, Pos::new(0, 2));
    coordinator.place_tetromino(player, strip).await.unwrap();

    let cleared = drain(&mut events).into_iter().find_map(|event| match event {
        GameEvent::RowsCleared { rows, .. } => Some(rows),
        _ => None,
    });
    assert_eq!(cleared, Some(vec![2]));

    let snapshot = coordinator.get_game_state(Some(game_id)).await.unwrap();
    assert!(!snapshot.board.cells.contains_key("0,2"));
}

#[tokio::test]
async fn restart_preserves_players_and_resets_the_board() {
    let coordinator = Coordinator::new(GameConfig::default());
    let game_id = coordinator.create_game(&fast_opts());
    let (_, player) = coordinator
        .join_game(Some(game_id), human("again"))
        .await
        .unwrap();

    let strip = Tetromino::new(TetrominoKind::I, 0, Pos::new(4, 2));
    coordinator.place_tetromino(player, strip).await.unwrap();

    coordinator.restart_game(Some(game_id)).await.unwrap();

    let snapshot = coordinator.get_game_state(Some(game_id)).await.unwrap();
    assert!(snapshot.players.contains_key(&player));
    assert_eq!(
        snapshot.players[&player].current_turn.phase,
        TurnPhase::Tetris
    );
    assert!(!snapshot.board.cells.contains_key("4,2"));
    assert_eq!(snapshot.chess_pieces.len(), 16);
}
