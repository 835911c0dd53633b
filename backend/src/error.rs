//! Server-side error type
//!
//! Wraps rule rejections from the engine and adds the transport-level kinds:
//! authorisation, backpressure, timeouts and protocol failures. Everything a
//! client can see goes out as a [`WireError`] with a stable code.

use thiserror::Error;

use shaktris_core::GameError;
use shared::{ErrorCode, WireError};

/// Errors surfaced by the coordinator and transports.
#[derive(Error, Debug)]
pub enum ServerError {
    /// A rule-engine rejection; state is unchanged.
    #[error(transparent)]
    Rule(#[from] GameError),

    /// The target game's queue is full; retry after backing off.
    #[error("game queue is full")]
    Backpressure { retry_after_ms: u64 },

    /// The game worker missed the reply deadline.
    #[error("game worker timed out")]
    Timeout,

    /// The game worker is gone; treated as an internal fault.
    #[error("game is no longer running")]
    GameClosed,

    #[error("invalid api token")]
    InvalidApiToken,

    #[error("malformed request: {0}")]
    Protocol(String),
}

impl ServerError {
    pub fn to_wire(&self) -> WireError {
        match self {
            ServerError::Rule(err) => WireError::from(err),
            ServerError::Backpressure { retry_after_ms } => WireError::with_retry(
                ErrorCode::Backpressure,
                self.to_string(),
                *retry_after_ms,
            ),
            ServerError::Timeout => {
                WireError::with_retry(ErrorCode::Timeout, self.to_string(), 1_000)
            }
            ServerError::GameClosed => WireError::new(ErrorCode::Internal, self.to_string()),
            ServerError::InvalidApiToken => {
                WireError::new(ErrorCode::InvalidApiToken, self.to_string())
            }
            ServerError::Protocol(_) => WireError::new(ErrorCode::Protocol, self.to_string()),
        }
    }
}

/// Result type alias for server operations
pub type ServerResult<T> = Result<T, ServerError>;
