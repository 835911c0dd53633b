//! Main transport: WebSocket request/response plus server-push events
//!
//! Each connection carries JSON frames. Requests come in with a correlation
//! id and are answered on the same id; game events are pushed as they are
//! broadcast. A subscriber that falls behind the event channel is coalesced
//! onto one fresh snapshot instead of replaying everything it missed.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use shaktris_core::{GameEvent, GameId, PlayerId};
use shared::{
    ClientMessage, ClientRequest, ErrorCode, ResponseData, ResponseEnvelope, ServerMessage,
    WireError,
};

use crate::api::AppState;
use crate::error::{ServerError, ServerResult};
use crate::worker::{GameHandle, PlayerDescriptor};

/// A connection with no traffic for this long is considered stale.
pub const STALE_AFTER: Duration = Duration::from_secs(30);
/// Outbound queue per connection; the writer drains it into the socket.
const OUTBOUND_DEPTH: usize = 64;

pub async fn ws_handler(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (out, mut out_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_DEPTH);

    let writer: JoinHandle<()> = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let Ok(text) = serde_json::to_string(&message) else {
                continue;
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut session = Session {
        state,
        out,
        player_id: None,
        spectator_id: Uuid::new_v4(),
        forward: None,
    };

    loop {
        match tokio::time::timeout(STALE_AFTER, stream.next()).await {
            // Stale: no traffic inside the window.
            Err(_) => {
                debug!("connection idle past the stale threshold");
                break;
            }
            Ok(None) | Ok(Some(Err(_))) => break,
            Ok(Some(Ok(Message::Text(text)))) => session.handle_text(text.as_str()).await,
            Ok(Some(Ok(Message::Close(_)))) => break,
            // Pings and pongs count as traffic and need no reply from us.
            Ok(Some(Ok(_))) => {}
        }
    }

    if let Some(task) = session.forward.take() {
        task.abort();
    }
    if let Some(player_id) = session.player_id {
        info!(%player_id, "transport dropped");
        session.state.coordinator.mark_disconnected(player_id).await;
    }
    session.state.coordinator.stop_spectating(session.spectator_id);
    writer.abort();
}

struct Session {
    state: AppState,
    out: mpsc::Sender<ServerMessage>,
    player_id: Option<PlayerId>,
    spectator_id: PlayerId,
    forward: Option<JoinHandle<()>>,
}

impl Session {
    async fn handle_text(&mut self, text: &str) {
        let request: ClientRequest = match serde_json::from_str(text) {
            Ok(request) => request,
            Err(err) => {
                // Malformed frame: error response, connection stays open.
                let envelope = ResponseEnvelope::err(
                    0,
                    WireError::new(ErrorCode::Protocol, err.to_string()),
                );
                let _ = self.out.send(ServerMessage::Response(envelope)).await;
                return;
            }
        };

        let id = request.id;
        let envelope = match self.dispatch(request.message).await {
            Ok(data) => ResponseEnvelope::ok(id, data),
            Err(err) => ResponseEnvelope::err(id, err.to_wire()),
        };
        let _ = self.out.send(ServerMessage::Response(envelope)).await;
    }

    async fn dispatch(&mut self, message: ClientMessage) -> ServerResult<ResponseData> {
        match message {
            ClientMessage::JoinGame {
                game_id,
                player_name,
                player_id,
            } => {
                let descriptor = PlayerDescriptor {
                    player_id: player_id.unwrap_or_else(Uuid::new_v4),
                    name: player_name,
                    is_computer: false,
                    is_external: false,
                    difficulty: None,
                };
                let (game_id, player_id) =
                    self.state.coordinator.join_game(game_id, descriptor).await?;
                self.player_id = Some(player_id);
                self.subscribe_to(game_id).await?;
                Ok(ResponseData::Joined { game_id, player_id })
            }
            ClientMessage::CreateGame { opts } => {
                let game_id = self.state.coordinator.create_game(&opts);
                Ok(ResponseData::GameCreated { game_id })
            }
            ClientMessage::TetrominoPlaced(tetromino) => {
                let player_id = self.need_player()?;
                self.state
                    .coordinator
                    .place_tetromino(player_id, tetromino)
                    .await?;
                Ok(ResponseData::MoveAccepted)
            }
            ClientMessage::ChessMove {
                piece_id,
                target_position,
            } => {
                let player_id = self.need_player()?;
                self.state
                    .coordinator
                    .move_chess(player_id, piece_id, target_position)
                    .await?;
                Ok(ResponseData::MoveAccepted)
            }
            ClientMessage::RequestTetromino => {
                let player_id = self.need_player()?;
                let (current, next) = self
                    .state
                    .coordinator
                    .request_tetromino(player_id)
                    .await?;
                Ok(ResponseData::Tetromino { current, next })
            }
            ClientMessage::GetGameState { game_id } => {
                let game_id = game_id.or_else(|| {
                    self.player_id
                        .and_then(|id| self.state.coordinator.player_entry(id))
                        .map(|entry| entry.game_id)
                });
                let snapshot = self.state.coordinator.get_game_state(game_id).await?;
                Ok(ResponseData::Snapshot(Box::new(snapshot)))
            }
            ClientMessage::RequestSpectate { target_player_id } => {
                let handle = self
                    .state
                    .coordinator
                    .request_spectate(self.spectator_id, target_player_id)?;
                self.start_forwarding(handle).await?;
                Ok(ResponseData::SpectateStarted { target_player_id })
            }
            ClientMessage::StopSpectating => {
                self.state.coordinator.stop_spectating(self.spectator_id);
                // Fall back to the caller's own game stream, if any.
                let own_game = self
                    .player_id
                    .and_then(|id| self.state.coordinator.player_entry(id))
                    .map(|entry| entry.game_id);
                match own_game {
                    Some(game_id) => self.subscribe_to(game_id).await?,
                    None => {
                        if let Some(task) = self.forward.take() {
                            task.abort();
                        }
                    }
                }
                Ok(ResponseData::SpectateStopped)
            }
            ClientMessage::RestartGame => {
                let game_id = self
                    .player_id
                    .and_then(|id| self.state.coordinator.player_entry(id))
                    .map(|entry| entry.game_id);
                self.state.coordinator.restart_game(game_id).await?;
                Ok(ResponseData::Restarted)
            }
        }
    }

    fn need_player(&self) -> ServerResult<PlayerId> {
        self.player_id
            .ok_or_else(|| ServerError::Protocol("join a game first".to_string()))
    }

    async fn subscribe_to(&mut self, game_id: GameId) -> ServerResult<()> {
        let handle = self.state.coordinator.resolve(Some(game_id));
        self.start_forwarding(handle).await
    }

    /// Subscribe to a game's stream, pushing a snapshot first. Replaces any
    /// previous subscription of this connection.
    async fn start_forwarding(&mut self, handle: GameHandle) -> ServerResult<()> {
        if let Some(task) = self.forward.take() {
            task.abort();
        }
        let events = handle.subscribe();
        let snapshot = handle.snapshot().await?;
        let _ = self
            .out
            .send(ServerMessage::Event(GameEvent::StateSnapshot(Box::new(
                snapshot,
            ))))
            .await;
        self.forward = Some(tokio::spawn(forward_events(
            events,
            self.out.clone(),
            handle,
        )));
        Ok(())
    }
}

/// Pump one game's broadcast into a connection. Lag is resolved by sending
/// a single fresh snapshot in place of everything that was missed.
async fn forward_events(
    mut events: tokio::sync::broadcast::Receiver<GameEvent>,
    out: mpsc::Sender<ServerMessage>,
    handle: GameHandle,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if out.send(ServerMessage::Event(event)).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, game_id = %handle.id, "subscriber lagged; coalescing");
                let Ok(snapshot) = handle.snapshot().await else {
                    break;
                };
                let message =
                    ServerMessage::Event(GameEvent::StateSnapshot(Box::new(snapshot)));
                if out.send(message).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
}
