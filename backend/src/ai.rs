//! AI scheduler
//!
//! Hosts the built-in computer players and the token registry for external
//! ones. Both kinds submit through the same coordinator paths as humans;
//! the scheduler holds no privileged access, and difficulty never relaxes
//! rule enforcement. External moves are gated by the same per-player pacing
//! floor as built-ins.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::prelude::*;
use parking_lot::RwLock;
use rand::RngCore;
use tokio::sync::broadcast::error::RecvError;
use tokio::time;
use tracing::{debug, info};
use uuid::Uuid;

use shaktris_core::ai::AiDecision;
use shaktris_core::{AiLevel, GameEvent, PlayerId};

use crate::coordinator::Coordinator;
use crate::error::{ServerError, ServerResult};

/// Built-in players tick at most once a second.
pub const AI_TICK: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
struct RegisteredAi {
    name: String,
    token: String,
}

/// Registry of external computer players and their capability tokens.
#[derive(Default)]
pub struct AiRegistry {
    registered: RwLock<HashMap<PlayerId, RegisteredAi>>,
}

impl AiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a player id and an opaque capability token bound to it.
    pub fn register(&self, name: String) -> (PlayerId, String) {
        let player_id = Uuid::new_v4();
        let token = generate_token();
        self.registered.write().insert(
            player_id,
            RegisteredAi {
                name,
                token: token.clone(),
            },
        );
        info!(%player_id, "external computer player registered");
        (player_id, token)
    }

    pub fn validate(&self, player_id: PlayerId, token: &str) -> ServerResult<()> {
        match self.registered.read().get(&player_id) {
            Some(entry) if entry.token == token => Ok(()),
            _ => Err(ServerError::InvalidApiToken),
        }
    }

    pub fn name_of(&self, player_id: PlayerId) -> Option<String> {
        self.registered
            .read()
            .get(&player_id)
            .map(|entry| entry.name.clone())
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Run a built-in computer player until its game ends. Each tick asks the
/// game worker for a read-only policy decision and submits it through the
/// ordinary move path, so pacing and rules apply unchanged.
pub fn spawn_builtin(coordinator: Arc<Coordinator>, player_id: PlayerId, level: AiLevel) {
    tokio::spawn(async move {
        let params = level.params();
        let Some(handle) = coordinator.game_of(player_id) else {
            return;
        };
        let mut events = handle.subscribe();
        let mut tick = time::interval(AI_TICK);
        tick.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let decision = match handle.decide(player_id, params).await {
                        Ok(decision) => decision,
                        Err(_) => break,
                    };
                    match decision {
                        Some(AiDecision::Place(tetromino)) => {
                            if let Err(err) = coordinator.place_tetromino(player_id, tetromino).await {
                                debug!(%player_id, %err, "builtin placement rejected");
                            }
                        }
                        Some(AiDecision::MoveChess { piece_id, to }) => {
                            if let Err(err) = coordinator.move_chess(player_id, piece_id, to).await {
                                debug!(%player_id, %err, "builtin chess move rejected");
                            }
                        }
                        None => {}
                    }
                }
                event = events.recv() => match event {
                    // A game ending cancels all pending ticks targeted at it.
                    Ok(GameEvent::GameEnded { .. }) => break,
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                },
            }
        }
        info!(%player_id, "builtin computer player stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_issues_a_valid_token() {
        let registry = AiRegistry::new();
        let (player_id, token) = registry.register("bot-one".into());

        assert!(registry.validate(player_id, &token).is_ok());
        assert!(base64::engine::general_purpose::STANDARD
            .decode(&token)
            .is_ok());
        assert_eq!(registry.name_of(player_id).as_deref(), Some("bot-one"));
    }

    #[test]
    fn wrong_token_or_unknown_player_is_rejected() {
        let registry = AiRegistry::new();
        let (player_id, token) = registry.register("bot".into());

        assert!(matches!(
            registry.validate(player_id, "not-the-token"),
            Err(ServerError::InvalidApiToken)
        ));
        assert!(matches!(
            registry.validate(Uuid::new_v4(), &token),
            Err(ServerError::InvalidApiToken)
        ));
    }

    #[test]
    fn tokens_are_unique_per_registration() {
        let registry = AiRegistry::new();
        let (_, a) = registry.register("a".into());
        let (_, b) = registry.register("b".into());
        assert_ne!(a, b);
    }
}
