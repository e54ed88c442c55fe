//! Graceful disconnect countdown
//!
//! A closed connection does not remove the player at once: its cells stay in
//! the world for a grace period (visible to others, still edible), and the
//! session is torn down when the countdown runs out or the cells are gone.

/// Lifecycle of a session with respect to its connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisconnectState {
    #[default]
    Connected,
    /// Counting down; `remaining >= 0`
    Disconnecting { remaining: i32 },
    /// Terminal
    Removed,
}

impl DisconnectState {
    /// Countdown reported while the connection is open
    pub const CONNECTED_COUNTDOWN: i32 = -1;
    /// Countdown reported once the session has been torn down
    pub const REMOVED_COUNTDOWN: i32 = -2;

    /// Countdown value: `remaining` while disconnecting, otherwise one of
    /// the two negative sentinels above
    pub fn countdown(&self) -> i32 {
        match self {
            DisconnectState::Connected => Self::CONNECTED_COUNTDOWN,
            DisconnectState::Disconnecting { remaining } => *remaining,
            DisconnectState::Removed => Self::REMOVED_COUNTDOWN,
        }
    }

    /// Connection closed. Only the first call has an effect; the countdown
    /// is never restarted.
    pub fn begin(&mut self, grace_ticks: u32) -> bool {
        if *self != DisconnectState::Connected {
            return false;
        }
        *self = DisconnectState::Disconnecting {
            remaining: i32::try_from(grace_ticks).unwrap_or(i32::MAX),
        };
        true
    }

    /// Per-tick step. Returns true on the tick the session must be torn down.
    pub fn advance(&mut self, owns_cells: bool) -> bool {
        let DisconnectState::Disconnecting { remaining } = *self else {
            return false;
        };

        let remaining = remaining - 1;
        if remaining < 0 || !owns_cells {
            *self = DisconnectState::Removed;
            true
        } else {
            *self = DisconnectState::Disconnecting { remaining };
            false
        }
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, DisconnectState::Connected)
    }

    #[inline]
    pub fn is_disconnecting(&self) -> bool {
        matches!(self, DisconnectState::Disconnecting { .. })
    }

    #[inline]
    pub fn is_removed(&self) -> bool {
        matches!(self, DisconnectState::Removed)
    }
}
