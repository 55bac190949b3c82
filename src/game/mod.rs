//! Authoritative match simulation

pub mod boundary;
pub mod contact;
pub mod goal;
pub mod input;
pub mod r#match;
pub mod player;
pub mod powerup;
pub mod snapshot;
pub mod tuning;
pub mod world;

pub use r#match::{MatchHandle, MatchRegistry, SoccerMatch};

use crate::ws::protocol::ClientMsg;
use uuid::Uuid;

/// A client message routed onto a match task
#[derive(Debug, Clone)]
pub struct PlayerInput {
    pub session_id: Uuid,
    pub msg: ClientMsg,
    pub received_at: u64,
}
