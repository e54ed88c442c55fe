use thiserror::Error;

use crate::game::objects::ObjectId;

/// Conditions the per-tick core runs into.
///
/// None of these are fatal: callers inside the session absorb them by
/// skipping, clamping, falling back or idling for a tick.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SessionError {
    /// A referenced object is no longer live in the world
    #[error("stale object reference {0}")]
    StaleReference(ObjectId),
    /// Total size too small for `sqrt(s) / ln(s)`
    #[error("degenerate zoom for total size {0}")]
    DegenerateZoom(f32),
    /// No session holds any cells, so there is nobody to follow
    #[error("no spectate target available")]
    NoSpectateTarget,
    /// The client has not completed the protocol handshake
    #[error("transport not ready")]
    TransportNotReady,
}
