//! Per-game worker
//!
//! Each game runs on its own task that owns the [`Game`] value outright.
//! Producers never touch game state: they enqueue commands on a bounded
//! queue and await a oneshot reply under a deadline. Accepted mutations
//! broadcast their events in emission order, which is what gives one game a
//! total order of observable moves.

use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{error, info};

use shaktris_core::ai::{AiDecision, AiParams};
use shaktris_core::game::{EndReason, GameConfig, Snapshot};
use shaktris_core::tetromino::{Tetromino, TetrominoKind};
use shaktris_core::{AiLevel, Game, GameEvent, GameId, PieceId, PlayerId, Pos};

use crate::error::{ServerError, ServerResult};

/// Bounded depth of a game's command queue; a full queue is backpressure.
pub const COMMAND_QUEUE_DEPTH: usize = 64;
/// Depth of the per-game event fan-out channel. Subscribers that fall more
/// than this far behind are coalesced onto a fresh snapshot.
pub const EVENT_CHANNEL_DEPTH: usize = 256;
/// Deadline for validation work on the worker.
pub const REPLY_DEADLINE: Duration = Duration::from_secs(2);
/// Hint returned with backpressure rejections.
const BACKPRESSURE_RETRY_MS: u64 = 250;

/// Wall clock in epoch milliseconds; the only clock the engine ever sees.
pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Player description carried by a join.
#[derive(Clone, Debug)]
pub struct PlayerDescriptor {
    pub player_id: PlayerId,
    pub name: String,
    pub is_computer: bool,
    pub is_external: bool,
    pub difficulty: Option<AiLevel>,
}

type Responder<T> = oneshot::Sender<ServerResult<T>>;

/// Commands accepted by a game worker.
pub enum GameCommand {
    Join {
        descriptor: PlayerDescriptor,
        respond: Responder<()>,
    },
    Leave {
        player_id: PlayerId,
        respond: Responder<()>,
    },
    Disconnect {
        player_id: PlayerId,
        respond: Responder<()>,
    },
    Place {
        player_id: PlayerId,
        tetromino: Tetromino,
        respond: Responder<()>,
    },
    MoveChess {
        player_id: PlayerId,
        piece_id: PieceId,
        to: Pos,
        respond: Responder<()>,
    },
    RequestTetromino {
        player_id: PlayerId,
        respond: Responder<(TetrominoKind, TetrominoKind)>,
    },
    Snapshot {
        respond: Responder<Snapshot>,
    },
    Restart {
        respond: Responder<()>,
    },
    /// Run the built-in policy against the live state. Read-only: whatever
    /// it proposes still goes through the normal submit path.
    Decide {
        player_id: PlayerId,
        params: AiParams,
        respond: Responder<Option<AiDecision>>,
    },
}

/// Cheap cloneable handle to a running game worker.
#[derive(Clone)]
pub struct GameHandle {
    pub id: GameId,
    commands: mpsc::Sender<GameCommand>,
    events: broadcast::Sender<GameEvent>,
}

impl GameHandle {
    /// Create the game and its dedicated worker task.
    pub fn spawn(id: GameId, config: GameConfig, seed: u64) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_DEPTH);
        let game = Game::new(id, config, seed);
        let fan_out = events.clone();
        tokio::spawn(run(game, rx, fan_out));
        Self {
            id,
            commands,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.events.subscribe()
    }

    pub async fn join(&self, descriptor: PlayerDescriptor) -> ServerResult<()> {
        self.call(|respond| GameCommand::Join { descriptor, respond })
            .await
    }

    pub async fn leave(&self, player_id: PlayerId) -> ServerResult<()> {
        self.call(|respond| GameCommand::Leave { player_id, respond })
            .await
    }

    pub async fn disconnect(&self, player_id: PlayerId) -> ServerResult<()> {
        self.call(|respond| GameCommand::Disconnect { player_id, respond })
            .await
    }

    pub async fn place(&self, player_id: PlayerId, tetromino: Tetromino) -> ServerResult<()> {
        self.call(|respond| GameCommand::Place {
            player_id,
            tetromino,
            respond,
        })
        .await
    }

    pub async fn move_chess(
        &self,
        player_id: PlayerId,
        piece_id: PieceId,
        to: Pos,
    ) -> ServerResult<()> {
        self.call(|respond| GameCommand::MoveChess {
            player_id,
            piece_id,
            to,
            respond,
        })
        .await
    }

    pub async fn request_tetromino(
        &self,
        player_id: PlayerId,
    ) -> ServerResult<(TetrominoKind, TetrominoKind)> {
        self.call(|respond| GameCommand::RequestTetromino { player_id, respond })
            .await
    }

    pub async fn snapshot(&self) -> ServerResult<Snapshot> {
        self.call(|respond| GameCommand::Snapshot { respond }).await
    }

    pub async fn restart(&self) -> ServerResult<()> {
        self.call(|respond| GameCommand::Restart { respond }).await
    }

    pub async fn decide(
        &self,
        player_id: PlayerId,
        params: AiParams,
    ) -> ServerResult<Option<AiDecision>> {
        self.call(|respond| GameCommand::Decide {
            player_id,
            params,
            respond,
        })
        .await
    }

    /// Enqueue with bounded backpressure, then await the reply under the
    /// validation deadline.
    async fn call<T, F>(&self, build: F) -> ServerResult<T>
    where
        F: FnOnce(Responder<T>) -> GameCommand,
    {
        let (respond, rx) = oneshot::channel();
        self.commands
            .try_send(build(respond))
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => ServerError::Backpressure {
                    retry_after_ms: BACKPRESSURE_RETRY_MS,
                },
                mpsc::error::TrySendError::Closed(_) => ServerError::GameClosed,
            })?;
        match tokio::time::timeout(REPLY_DEADLINE, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ServerError::GameClosed),
            Err(_) => Err(ServerError::Timeout),
        }
    }
}

/// The worker loop: the only code that ever mutates this game.
async fn run(
    mut game: Game,
    mut commands: mpsc::Receiver<GameCommand>,
    events: broadcast::Sender<GameEvent>,
) {
    let game_id = game.id;
    let mut rng = StdRng::from_os_rng();
    info!(%game_id, "game worker started");

    while let Some(command) = commands.recv().await {
        match command {
            GameCommand::Join { descriptor, respond } => {
                let result = game.add_player(
                    descriptor.player_id,
                    descriptor.name,
                    descriptor.is_computer,
                    descriptor.is_external,
                    descriptor.difficulty,
                    now_ms(),
                );
                let _ = respond.send(finish(&mut game, result.map_err(Into::into), &events));
            }
            GameCommand::Leave { player_id, respond } => {
                let result = game.remove_player(player_id);
                let _ = respond.send(finish(&mut game, result.map_err(Into::into), &events));
            }
            GameCommand::Disconnect { player_id, respond } => {
                let result = game.mark_disconnected(player_id);
                let _ = respond.send(finish(&mut game, result.map_err(Into::into), &events));
            }
            GameCommand::Place {
                player_id,
                tetromino,
                respond,
            } => {
                let result = game.place_tetromino(player_id, &tetromino, now_ms());
                let _ = respond.send(finish(&mut game, result.map_err(Into::into), &events));
            }
            GameCommand::MoveChess {
                player_id,
                piece_id,
                to,
                respond,
            } => {
                let result = game.move_chess(player_id, piece_id, to, now_ms());
                let _ = respond.send(finish(&mut game, result.map_err(Into::into), &events));
            }
            GameCommand::RequestTetromino { player_id, respond } => {
                let result = game.request_tetromino(player_id).map_err(Into::into);
                let _ = respond.send(result);
            }
            GameCommand::Snapshot { respond } => {
                let _ = respond.send(Ok(game.snapshot()));
            }
            GameCommand::Restart { respond } => {
                let emitted = game.restart(rng.random(), now_ms());
                broadcast_all(&events, emitted);
                let snapshot = game.snapshot();
                broadcast_all(
                    &events,
                    vec![GameEvent::StateSnapshot(Box::new(snapshot))],
                );
                let _ = respond.send(Ok(()));
            }
            GameCommand::Decide {
                player_id,
                params,
                respond,
            } => {
                let decision = shaktris_core::ai::decide(&game, player_id, &params, &mut rng);
                let _ = respond.send(Ok(decision));
            }
        }
    }
    info!(%game_id, "game worker stopped");
}

/// Broadcast an accepted mutation's events, then cross-check the state
/// representations. An audit failure is fatal for this game only.
fn finish(
    game: &mut Game,
    result: ServerResult<Vec<GameEvent>>,
    events: &broadcast::Sender<GameEvent>,
) -> ServerResult<()> {
    let emitted = match result {
        Ok(emitted) => emitted,
        Err(err) => return Err(err),
    };
    broadcast_all(events, emitted);

    if let Err(violation) = game.audit() {
        error!(game_id = %game.id, %violation, "invariant violation; ending game");
        let mut closing = Vec::new();
        game.end(None, EndReason::InternalError, &mut closing);
        broadcast_all(events, closing);
    }
    Ok(())
}

fn broadcast_all(events: &broadcast::Sender<GameEvent>, emitted: Vec<GameEvent>) {
    for event in emitted {
        // Send only fails with zero subscribers, which is fine.
        let _ = events.send(event);
    }
}
