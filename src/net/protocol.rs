//! Semantic payloads exchanged with clients
//!
//! The byte layout is owned by the transport; these types describe what a
//! message means. `encode`/`decode` use bincode so the transport and the
//! metrics layer agree on sizes.

use serde::{Deserialize, Serialize};

use crate::game::objects::{ObjectId, ObjectKind, SessionId, WorldObject};
use crate::session::CoordinateScramble;
use crate::util::vec2::Vec2;

/// Events a client pushes between ticks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientInput {
    /// Protocol handshake; a version of 0 means "not ready"
    Handshake { protocol: u32 },
    /// Mouse target in client coordinates; the session removes its scramble
    Mouse(Vec2),
    /// Split key
    Split,
    /// Eject-mass key
    Eject,
    /// Secondary action key (toggles free-roam while spectating in the stock modes)
    Secondary,
    /// Enter the game with a display name
    Join { name: String },
    /// Start spectating
    Spectate,
}

/// Messages from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Camera position and zoom, scrambled
    UpdatePosition { x: f32, y: f32, zoom: f32 },
    /// Visibility diff for this tick
    UpdateNodes {
        updated: Vec<NodeUpdate>,
        removed: Vec<ObjectId>,
    },
    /// Leaderboard snapshot
    UpdateLeaderboard {
        entries: Vec<LeaderboardEntry>,
        own_id: SessionId,
    },
    /// Drop everything the client currently shows
    ClearNodes,
}

/// One visible object as sent to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeUpdate {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub owner: Option<SessionId>,
}

impl NodeUpdate {
    pub fn from_object(id: ObjectId, object: &WorldObject, scramble: CoordinateScramble) -> Self {
        let position = scramble.apply(object.position());
        Self {
            id,
            kind: object.kind(),
            x: position.x,
            y: position.y,
            size: object.size(),
            owner: object.owner(),
        }
    }
}

/// Leaderboard row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub id: SessionId,
    pub name: String,
    pub score: u32,
}

/// Encode a message using bincode
/// Uses legacy config for fixed-size integers
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(message, bincode::config::legacy())
        .map_err(|e| EncodeError(e.to_string()))
}

/// Decode a message using bincode
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);
