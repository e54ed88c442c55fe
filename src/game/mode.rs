//! Game-mode hooks
//!
//! The session calls into the active mode when a client presses split, eject
//! or the secondary key, and once when the session is created. Hooks do not
//! mutate the world directly: they queue [`WorldRequest`]s which the world
//! hands to the simulation at the end of the tick.

use crate::config::GameModeKind;
use crate::game::constants::teams;
use crate::game::objects::SessionId;
use crate::session::{Color, PlayerSession};

/// Work the simulation should perform on a session's behalf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldRequest {
    /// Spawn a fresh cell for the session
    Spawn { session: SessionId },
    /// Split every cell large enough to split
    Split { session: SessionId },
    /// Eject mass from every cell toward the mouse target
    Eject { session: SessionId },
}

impl WorldRequest {
    pub fn session(&self) -> SessionId {
        match *self {
            WorldRequest::Spawn { session }
            | WorldRequest::Split { session }
            | WorldRequest::Eject { session } => session,
        }
    }
}

/// Requests queued during one tick
#[derive(Debug, Default)]
pub struct WorldRequests {
    queue: Vec<WorldRequest>,
}

impl WorldRequests {
    pub fn push(&mut self, request: WorldRequest) {
        self.queue.push(request);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn into_vec(self) -> Vec<WorldRequest> {
        self.queue
    }
}

/// Rules hooks a game mode exposes to sessions
pub trait GameMode: Send + Sync {
    fn name(&self) -> &'static str;

    /// Called once when a session joins the world
    fn on_session_init(&self, _session: &mut PlayerSession) {}

    fn on_split_pressed(&self, session: &mut PlayerSession, requests: &mut WorldRequests) {
        if !session.cells().is_empty() {
            requests.push(WorldRequest::Split { session: session.id() });
        }
    }

    fn on_eject_pressed(&self, session: &mut PlayerSession, requests: &mut WorldRequests) {
        if !session.cells().is_empty() {
            requests.push(WorldRequest::Eject { session: session.id() });
        }
    }

    /// Secondary key: toggles free-roam while spectating
    fn on_secondary_pressed(&self, session: &mut PlayerSession, _requests: &mut WorldRequests) {
        session.toggle_free_roam();
    }
}

/// Every player for themselves
#[derive(Debug, Clone, Copy, Default)]
pub struct FreeForAll;

impl GameMode for FreeForAll {
    fn name(&self) -> &'static str {
        "Free For All"
    }
}

/// Sessions are dealt round-robin into fixed teams
#[derive(Debug, Clone, Copy)]
pub struct Teams {
    count: u8,
}

impl Teams {
    const COLORS: [Color; 3] = [
        Color { r: 223, g: 0, b: 0 },
        Color { r: 0, g: 223, b: 0 },
        Color { r: 0, g: 0, b: 223 },
    ];

    pub fn new(count: u8) -> Self {
        Self { count: count.max(1) }
    }

    pub fn team_for(&self, session: SessionId) -> u8 {
        (session % self.count as u32) as u8
    }
}

impl Default for Teams {
    fn default() -> Self {
        Self::new(teams::COUNT)
    }
}

impl GameMode for Teams {
    fn name(&self) -> &'static str {
        "Teams"
    }

    fn on_session_init(&self, session: &mut PlayerSession) {
        let team = self.team_for(session.id());
        session.set_team(Some(team));
        session.set_color(Self::COLORS[team as usize % Self::COLORS.len()]);
    }
}

/// Build the mode selected in config
pub fn from_kind(kind: GameModeKind) -> Box<dyn GameMode> {
    match kind {
        GameModeKind::FreeForAll => Box::new(FreeForAll),
        GameModeKind::Teams => Box::new(Teams::default()),
    }
}
