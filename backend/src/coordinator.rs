//! Session coordinator
//!
//! Multiplexes many concurrent games: the game registry with its
//! distinguished global game, player↔game bindings, and spectator bindings.
//! The registries are the only cross-game shared state; their lock is held
//! for lookup and insert only, never across a game operation.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rand::Rng;
use tracing::info;
use uuid::Uuid;

use shaktris_core::game::{GameConfig, Snapshot};
use shaktris_core::tetromino::{Tetromino, TetrominoKind};
use shaktris_core::{GameId, PieceId, PlayerId, Pos};
use shared::GameOpts;

use crate::error::{ServerError, ServerResult};
use crate::worker::{GameHandle, PlayerDescriptor};

/// Cross-game view of one player.
#[derive(Clone, Copy, Debug)]
pub struct PlayerEntry {
    pub game_id: GameId,
    pub is_connected: bool,
}

/// The multi-game registry and router.
pub struct Coordinator {
    games: RwLock<HashMap<GameId, GameHandle>>,
    players: RwLock<HashMap<PlayerId, PlayerEntry>>,
    /// spectator id → target player id
    spectators: RwLock<HashMap<PlayerId, PlayerId>>,
    global_game: GameId,
    default_config: GameConfig,
}

impl Coordinator {
    /// Build the coordinator and its global game, which new players join by
    /// default.
    pub fn new(default_config: GameConfig) -> Arc<Self> {
        let global_game = Uuid::new_v4();
        let handle = GameHandle::spawn(global_game, default_config, rand::rng().random());
        let mut games = HashMap::new();
        games.insert(global_game, handle);
        info!(%global_game, "coordinator ready");
        Arc::new(Self {
            games: RwLock::new(games),
            players: RwLock::new(HashMap::new()),
            spectators: RwLock::new(HashMap::new()),
            global_game,
            default_config,
        })
    }

    pub fn global_game(&self) -> GameId {
        self.global_game
    }

    /// Resolve a game id, falling back to the global game for unknown or
    /// absent ids. Lookups never error out on a bad id.
    pub fn resolve(&self, game_id: Option<GameId>) -> GameHandle {
        let games = self.games.read();
        game_id
            .and_then(|id| games.get(&id))
            .unwrap_or_else(|| games.get(&self.global_game).expect("global game exists"))
            .clone()
    }

    /// Handle for the game a player is bound to, if any.
    pub fn game_of(&self, player_id: PlayerId) -> Option<GameHandle> {
        let entry = *self.players.read().get(&player_id)?;
        self.games.read().get(&entry.game_id).cloned()
    }

    pub fn player_entry(&self, player_id: PlayerId) -> Option<PlayerEntry> {
        self.players.read().get(&player_id).copied()
    }

    /// Create a fresh game and register it.
    pub fn create_game(&self, opts: &GameOpts) -> GameId {
        let id = Uuid::new_v4();
        let config = GameConfig {
            min_move_ms: opts.min_move_ms.unwrap_or(self.default_config.min_move_ms),
            clear_policy: opts
                .clear_policy
                .unwrap_or(self.default_config.clear_policy),
        };
        let seed = opts.seed.unwrap_or_else(|| rand::rng().random());
        let handle = GameHandle::spawn(id, config, seed);
        self.games.write().insert(id, handle);
        info!(game_id = %id, "game created");
        id
    }

    /// Bind a player to a game. A known player id reattaches to its
    /// existing game regardless of the requested id; pieces, home zone and
    /// turn phase survive the round trip.
    pub async fn join_game(
        &self,
        game_id: Option<GameId>,
        descriptor: PlayerDescriptor,
    ) -> ServerResult<(GameId, PlayerId)> {
        let player_id = descriptor.player_id;
        let handle = match self.game_of(player_id) {
            Some(existing) => existing,
            None => self.resolve(game_id),
        };

        handle.join(descriptor).await?;
        self.players.write().insert(
            player_id,
            PlayerEntry {
                game_id: handle.id,
                is_connected: true,
            },
        );
        Ok((handle.id, player_id))
    }

    /// Flag the player inactive in their game and unbind the transport.
    pub async fn leave_game(&self, player_id: PlayerId) -> ServerResult<()> {
        let Some(handle) = self.game_of(player_id) else {
            return Err(ServerError::Rule(
                shaktris_core::GameError::PlayerNotInGame { player_id },
            ));
        };
        handle.leave(player_id).await?;
        if let Some(entry) = self.players.write().get_mut(&player_id) {
            entry.is_connected = false;
        }
        Ok(())
    }

    /// A dropped transport flags the player inactive without the
    /// abandonment check; the player record stays for reconnection.
    pub async fn mark_disconnected(&self, player_id: PlayerId) {
        if let Some(handle) = self.game_of(player_id) {
            let _ = handle.disconnect(player_id).await;
        }
        if let Some(entry) = self.players.write().get_mut(&player_id) {
            entry.is_connected = false;
        }
    }

    pub async fn place_tetromino(
        &self,
        player_id: PlayerId,
        tetromino: Tetromino,
    ) -> ServerResult<()> {
        let handle = self.require_game(player_id)?;
        handle.place(player_id, tetromino).await
    }

    pub async fn move_chess(
        &self,
        player_id: PlayerId,
        piece_id: PieceId,
        to: Pos,
    ) -> ServerResult<()> {
        let handle = self.require_game(player_id)?;
        handle.move_chess(player_id, piece_id, to).await
    }

    pub async fn request_tetromino(
        &self,
        player_id: PlayerId,
    ) -> ServerResult<(TetrominoKind, TetrominoKind)> {
        let handle = self.require_game(player_id)?;
        handle.request_tetromino(player_id).await
    }

    pub async fn get_game_state(&self, game_id: Option<GameId>) -> ServerResult<Snapshot> {
        self.resolve(game_id).snapshot().await
    }

    pub async fn restart_game(&self, game_id: Option<GameId>) -> ServerResult<()> {
        self.resolve(game_id).restart().await
    }

    /// Bind a spectator to a target player's game stream. Returns the handle
    /// so the transport can subscribe.
    pub fn request_spectate(
        &self,
        spectator_id: PlayerId,
        target_player_id: PlayerId,
    ) -> ServerResult<GameHandle> {
        let Some(handle) = self.game_of(target_player_id) else {
            return Err(ServerError::Rule(
                shaktris_core::GameError::PlayerNotInGame {
                    player_id: target_player_id,
                },
            ));
        };
        self.spectators
            .write()
            .insert(spectator_id, target_player_id);
        Ok(handle)
    }

    pub fn stop_spectating(&self, spectator_id: PlayerId) {
        self.spectators.write().remove(&spectator_id);
    }

    pub fn spectate_target(&self, spectator_id: PlayerId) -> Option<PlayerId> {
        self.spectators.read().get(&spectator_id).copied()
    }

    fn require_game(&self, player_id: PlayerId) -> ServerResult<GameHandle> {
        self.game_of(player_id).ok_or(ServerError::Rule(
            shaktris_core::GameError::PlayerNotInGame { player_id },
        ))
    }
}
