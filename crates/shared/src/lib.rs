//! Wire types shared between the server and its clients.

pub mod protocol;

pub use protocol::{
    ClientMessage, ClientRequest, ErrorCode, GameOpts, ResponseData, ResponseEnvelope,
    ServerMessage, WireError,
};
