//! Per-connection player session
//!
//! [`PlayerSession::update`] is the single per-tick entry point. In order it:
//! 1. drains buffered client input
//! 2. prunes dead cell references and decays the anti-teaming accumulators
//! 3. (handshake complete only) dispatches key presses to the game mode,
//!    runs the camera, computes the visibility diff and sends the results
//! 4. advances the disconnect countdown and hands back cells on teardown
//!
//! Steps 1-2 and the dispatch are [`PlayerSession::prepare_tick`]; the rest is
//! [`PlayerSession::finish_tick`]. The world runs the halves separately so
//! spectators see the players' state from the same tick.

pub mod anti_teaming;
pub mod camera;
pub mod disconnect;
pub mod error;
pub mod visibility;

use rand::Rng;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, info, trace};

use crate::config::SessionConfig;
use crate::game::constants::scramble;
use crate::game::mode::{GameMode, WorldRequest, WorldRequests};
use crate::game::objects::{ObjectArena, ObjectId, SessionId};
use crate::net::client_link::{ClientLink, LinkError};
use crate::net::protocol::{ClientInput, LeaderboardEntry, NodeUpdate, ServerMessage};
use crate::util::rect::Rect;
use crate::util::vec2::Vec2;

use self::anti_teaming::{AntiTeaming, TeamingEventKind};
use self::camera::{CameraController, CameraFrame, CameraMode, SpectateTarget, ViewSource};
use self::disconnect::DisconnectState;
use self::visibility::VisibilityTracker;

/// Fixed per-session offset added to every outbound coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoordinateScramble {
    pub x: i32,
    pub y: i32,
}

impl CoordinateScramble {
    pub const NONE: CoordinateScramble = CoordinateScramble { x: 0, y: 0 };

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            x: rng.gen_range(0..scramble::RANGE),
            y: rng.gen_range(0..scramble::RANGE),
        }
    }

    /// World -> client coordinates
    #[inline]
    pub fn apply(&self, point: Vec2) -> Vec2 {
        Vec2::new(point.x + self.x as f32, point.y + self.y as f32)
    }

    /// Client -> world coordinates
    #[inline]
    pub fn remove(&self, point: Vec2) -> Vec2 {
        Vec2::new(point.x - self.x as f32, point.y - self.y as f32)
    }
}

/// Aggregate over a session's cells.
///
/// Stale references are skipped and counted, never folded into the sums.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CellTotals {
    pub mass: f32,
    pub size: f32,
    pub center_sum: Vec2,
    pub live: usize,
    pub stale: usize,
}

impl CellTotals {
    pub fn collect(cells: &[ObjectId], objects: &ObjectArena) -> Self {
        let mut totals = Self::default();
        for &id in cells {
            match objects.resolve(id) {
                Ok(object) => totals.add(object.position(), object.size(), object.mass()),
                Err(e) => {
                    trace!("{}", e);
                    totals.stale += 1;
                }
            }
        }
        totals
    }

    pub fn add(&mut self, position: Vec2, size: f32, mass: f32) {
        self.center_sum += position;
        self.size += size;
        self.mass += mass;
        self.live += 1;
    }

    /// Mean position of the live cells
    pub fn centroid(&self) -> Option<Vec2> {
        (self.live > 0).then(|| self.center_sum * (1.0 / self.live as f32))
    }

    /// Total mass truncated toward zero
    pub fn score(&self) -> u32 {
        self.mass as u32
    }
}

/// RGB colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Key presses buffered between ticks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputFlags {
    pub split: bool,
    pub eject: bool,
    pub secondary: bool,
}

/// Everything a session reads from the world during `update`
pub struct TickContext<'a> {
    pub objects: &'a ObjectArena,
    pub config: &'a SessionConfig,
    pub game_mode: &'a dyn GameMode,
    /// Largest session right now, if any session is spectating
    pub spectate_target: Option<&'a SpectateTarget>,
    pub leaderboard: &'a [LeaderboardEntry],
}

/// What one `update` did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    /// Handshake complete and the view pipeline ran
    pub ready: bool,
    pub full_refresh: bool,
    pub nodes_updated: usize,
    pub nodes_removed: usize,
    pub messages_sent: usize,
    pub messages_dropped: usize,
    /// Set on the tick the session is torn down: cells to release to the world
    pub teardown: Option<Vec<ObjectId>>,
}

impl TickOutcome {
    fn record_send(&mut self, delivered: bool) {
        if delivered {
            self.messages_sent += 1;
        } else {
            self.messages_dropped += 1;
        }
    }
}

/// Server-side state of one connected player
#[derive(Debug)]
pub struct PlayerSession {
    id: SessionId,
    name: String,
    team: Option<u8>,
    color: Color,
    /// Non-owning references into the world's arena
    cells: SmallVec<[ObjectId; 16]>,
    score: u32,
    link: ClientLink,
    scramble: CoordinateScramble,
    camera: CameraController,
    viewport: Rect,
    visibility: VisibilityTracker,
    teaming: AntiTeaming,
    disconnect: DisconnectState,
    /// Ticks until the next leaderboard send, in `0..=leaderboard_period`
    leaderboard_counter: u32,
    leaderboard_period: u32,
    flags: InputFlags,
    merge_override: bool,
    ejected_this_tick: bool,
}

impl PlayerSession {
    pub fn new(id: SessionId, link: ClientLink, scramble: CoordinateScramble, config: &SessionConfig) -> Self {
        Self {
            id,
            name: String::new(),
            team: None,
            color: Color::default(),
            cells: SmallVec::new(),
            score: 0,
            link,
            scramble,
            camera: CameraController::new(),
            viewport: Rect::default(),
            visibility: VisibilityTracker::new(config.view_refresh_period),
            teaming: AntiTeaming::new(),
            disconnect: DisconnectState::Connected,
            leaderboard_counter: 0,
            leaderboard_period: config.leaderboard_refresh_period,
            flags: InputFlags::default(),
            merge_override: false,
            ejected_this_tick: false,
        }
    }

    // ------------------------------------------------------------------
    // Per-tick entry point
    // ------------------------------------------------------------------

    pub fn update(&mut self, ctx: &TickContext<'_>, requests: &mut WorldRequests) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        self.prepare_tick(ctx, requests, &mut outcome);
        self.finish_tick(ctx, &mut outcome);
        outcome
    }

    /// First half of `update`: inputs, pruning, anti-teaming decay and key
    /// dispatch. The camera mode is settled for the tick once this returns.
    pub fn prepare_tick(&mut self, ctx: &TickContext<'_>, requests: &mut WorldRequests, outcome: &mut TickOutcome) {
        self.ejected_this_tick = false;

        let pruned = self.prune_cells(ctx.objects);
        if pruned > 0 {
            trace!("Session {}: dropped {} dead cell references", self.id, pruned);
        }

        self.process_inputs(requests, outcome);
        if self.link.is_closed() && self.disconnect.begin(ctx.config.disconnect_grace_ticks) {
            info!(
                "Session {} ({}) disconnected, {} cells linger for {} ticks",
                self.id,
                self.name,
                self.cells.len(),
                ctx.config.disconnect_grace_ticks
            );
        }

        self.score = CellTotals::collect(&self.cells, ctx.objects).score();
        self.teaming.tick(self.score);

        match self.link.ensure_ready() {
            Ok(()) => {
                outcome.ready = true;
                self.dispatch_actions(ctx.game_mode, requests);
            }
            Err(e) => trace!("Session {}: {}, idling", self.id, e),
        }
    }

    /// Second half of `update`: camera, visibility, leaderboard and the
    /// disconnect countdown. Spectators read `ctx.spectate_target` here.
    pub fn finish_tick(&mut self, ctx: &TickContext<'_>, outcome: &mut TickOutcome) {
        if outcome.ready {
            let totals = CellTotals::collect(&self.cells, ctx.objects);
            self.run_view(ctx, &totals, outcome);
            self.tick_leaderboard(ctx.leaderboard, outcome);
        }

        if self.disconnect.advance(!self.cells.is_empty()) {
            info!("Session {} torn down, releasing {} cells", self.id, self.cells.len());
            outcome.teardown = Some(std::mem::take(&mut self.cells).into_vec());
        }
    }

    fn prune_cells(&mut self, objects: &ObjectArena) -> usize {
        let before = self.cells.len();
        self.cells.retain(|id| objects.is_live(*id));
        before - self.cells.len()
    }

    fn process_inputs(&mut self, requests: &mut WorldRequests, outcome: &mut TickOutcome) {
        for input in self.link.drain() {
            match input {
                ClientInput::Handshake { protocol } => {
                    debug!("Session {} negotiated protocol {}", self.id, protocol);
                    self.link.set_protocol(protocol);
                }
                ClientInput::Mouse(target) => self.camera.set_mouse(self.scramble.remove(target)),
                ClientInput::Split => self.flags.split = true,
                ClientInput::Eject => self.flags.eject = true,
                ClientInput::Secondary => self.flags.secondary = true,
                ClientInput::Join { name } => self.join(name, requests, outcome),
                ClientInput::Spectate => self.spectate(outcome),
            }
        }
    }

    fn join(&mut self, name: String, requests: &mut WorldRequests, outcome: &mut TickOutcome) {
        if self.link.ensure_ready().is_err() || !self.cells.is_empty() {
            trace!("Session {}: join ignored", self.id);
            return;
        }
        self.set_name(name);
        if self.camera.mode().is_spectating() {
            self.camera.leave_spectate();
            debug!("Session {} left spectate mode", self.id);
        }
        self.clear_view(outcome);
        requests.push(WorldRequest::Spawn { session: self.id });
    }

    fn spectate(&mut self, outcome: &mut TickOutcome) {
        if self.link.ensure_ready().is_err() || !self.cells.is_empty() {
            trace!("Session {}: spectate ignored", self.id);
            return;
        }
        if !self.camera.mode().is_spectating() {
            self.camera.enter_spectate();
            self.clear_view(outcome);
            debug!("Session {} is spectating", self.id);
        }
    }

    fn clear_view(&mut self, outcome: &mut TickOutcome) {
        self.visibility.reset();
        let delivered = self.deliver(ServerMessage::ClearNodes);
        outcome.record_send(delivered);
    }

    fn dispatch_actions(&mut self, game_mode: &dyn GameMode, requests: &mut WorldRequests) {
        let flags = std::mem::take(&mut self.flags);
        if flags.split && !self.merge_override {
            game_mode.on_split_pressed(self, requests);
        }
        if flags.eject {
            game_mode.on_eject_pressed(self, requests);
            self.ejected_this_tick = true;
        }
        if flags.secondary {
            game_mode.on_secondary_pressed(self, requests);
        }
    }

    fn run_view(&mut self, ctx: &TickContext<'_>, totals: &CellTotals, outcome: &mut TickOutcome) {
        let target = ctx.spectate_target.filter(|target| target.id != self.id);
        let frame = self.camera.step(totals, target, ctx.config);
        self.viewport = frame.viewport;

        let delivered = self.send_frame(&frame);
        outcome.record_send(delivered);

        let mirror = match frame.source {
            ViewSource::Mirror(_) => target.map(|target| target.visible.as_slice()),
            ViewSource::Own => None,
        };
        let diff = self.visibility.tick(ctx.objects, &frame.viewport, self.id, mirror);

        let updated: Vec<NodeUpdate> = diff
            .updated
            .iter()
            .filter_map(|&id| {
                ctx.objects
                    .get(id)
                    .map(|object| NodeUpdate::from_object(id, object, self.scramble))
            })
            .collect();

        outcome.full_refresh = diff.full_refresh;
        outcome.nodes_updated = updated.len();
        outcome.nodes_removed = diff.removed.len();

        let delivered = self.deliver(ServerMessage::UpdateNodes {
            updated,
            removed: diff.removed,
        });
        outcome.record_send(delivered);
    }

    fn tick_leaderboard(&mut self, leaderboard: &[LeaderboardEntry], outcome: &mut TickOutcome) {
        if self.leaderboard_counter > 0 {
            self.leaderboard_counter -= 1;
            return;
        }
        let delivered = self.deliver(ServerMessage::UpdateLeaderboard {
            entries: leaderboard.to_vec(),
            own_id: self.id,
        });
        outcome.record_send(delivered);
        self.leaderboard_counter = self.leaderboard_period;
    }

    fn send_frame(&mut self, frame: &CameraFrame) -> bool {
        let position = self.scramble.apply(frame.center);
        self.deliver(ServerMessage::UpdatePosition {
            x: position.x,
            y: position.y,
            zoom: frame.zoom,
        })
    }

    /// Non-blocking send; a full queue drops the message
    fn deliver(&mut self, message: ServerMessage) -> bool {
        match self.link.send(message) {
            Ok(()) => true,
            Err(LinkError::Full) => {
                debug!("Session {}: outbound queue full, dropping message", self.id);
                false
            }
            Err(LinkError::Closed) => false,
        }
    }

    // ------------------------------------------------------------------
    // World-facing operations
    // ------------------------------------------------------------------

    /// Record a player-attributable mass transfer
    pub fn apply_teaming_event(&mut self, amount: f32, kind: TeamingEventKind, objects: &ObjectArena) {
        let score = self.recalculate_score(objects);
        self.teaming.apply_event(amount, kind, score);
    }

    /// Connection closed: start the disconnect countdown
    pub fn begin_disconnect(&mut self, grace_ticks: u32) -> bool {
        self.disconnect.begin(grace_ticks)
    }

    /// World fan-out: an object spawned
    pub fn notify_spawned(&mut self, id: ObjectId) {
        self.visibility.notify_spawned(id);
    }

    /// World fan-out: an object was removed
    pub fn notify_despawned(&mut self, id: ObjectId) {
        self.visibility.notify_despawned(id);
    }

    pub fn add_cell(&mut self, id: ObjectId) {
        if !self.cells.contains(&id) {
            self.cells.push(id);
        }
    }

    pub fn remove_cell(&mut self, id: ObjectId) -> bool {
        let before = self.cells.len();
        self.cells.retain(|cell| *cell != id);
        before != self.cells.len()
    }

    /// What a spectator following this session needs
    pub fn spectate_target(&self, objects: &ObjectArena) -> SpectateTarget {
        SpectateTarget {
            id: self.id,
            center: self.camera.center(),
            total_size: self.total_size(objects),
            visible: self.visibility.visible_ids(),
        }
    }

    // ------------------------------------------------------------------
    // Mode hooks
    // ------------------------------------------------------------------

    /// Switch spectate-follow <-> free-roam; no-op while playing
    pub fn toggle_free_roam(&mut self) -> bool {
        let toggled = self.camera.toggle_free_roam();
        if toggled {
            debug!("Session {} camera mode {:?}", self.id, self.camera.mode());
        }
        toggled
    }

    /// Move the camera directly (clamped to the border while free-roaming)
    pub fn set_view_center(&mut self, center: Vec2, border: &Rect) {
        self.camera.set_center(center, border);
    }

    /// Send a position/zoom update for an arbitrary point
    pub fn send_custom_position(&mut self, x: f32, y: f32, zoom: f32) -> bool {
        let position = self.scramble.apply(Vec2::new(x, y));
        self.deliver(ServerMessage::UpdatePosition {
            x: position.x,
            y: position.y,
            zoom,
        })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[inline]
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn team(&self) -> Option<u8> {
        self.team
    }

    pub fn set_team(&mut self, team: Option<u8>) {
        self.team = team;
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    #[inline]
    pub fn cells(&self) -> &[ObjectId] {
        &self.cells
    }

    /// Score cached by the last update or recalculation
    #[inline]
    pub fn score(&self) -> u32 {
        self.score
    }

    /// Recompute the score from live cells (sum of mass, truncated)
    pub fn recalculate_score(&mut self, objects: &ObjectArena) -> u32 {
        self.score = CellTotals::collect(&self.cells, objects).score();
        self.score
    }

    /// Sum of live cells' size
    pub fn total_size(&self, objects: &ObjectArena) -> f32 {
        CellTotals::collect(&self.cells, objects).size
    }

    pub fn cell_totals(&self, objects: &ObjectArena) -> CellTotals {
        CellTotals::collect(&self.cells, objects)
    }

    #[inline]
    pub fn view_center(&self) -> Vec2 {
        self.camera.center()
    }

    #[inline]
    pub fn viewport(&self) -> Rect {
        self.viewport
    }

    #[inline]
    pub fn mouse_target(&self) -> Vec2 {
        self.camera.mouse()
    }

    #[inline]
    pub fn camera_mode(&self) -> CameraMode {
        self.camera.mode()
    }

    #[inline]
    pub fn scramble(&self) -> CoordinateScramble {
        self.scramble
    }

    #[inline]
    pub fn decay_multiplier(&self) -> f32 {
        self.teaming.decay_multiplier()
    }

    pub fn anti_teaming(&self) -> &AntiTeaming {
        &self.teaming
    }

    pub fn visibility(&self) -> &VisibilityTracker {
        &self.visibility
    }

    pub fn disconnect_state(&self) -> DisconnectState {
        self.disconnect
    }

    /// Ticks left before teardown, or -1 while connected and -2 once removed
    pub fn disconnect_countdown(&self) -> i32 {
        self.disconnect.countdown()
    }

    #[inline]
    pub fn is_removed(&self) -> bool {
        self.disconnect.is_removed()
    }

    pub fn leaderboard_counter(&self) -> u32 {
        self.leaderboard_counter
    }

    pub fn merge_override(&self) -> bool {
        self.merge_override
    }

    pub fn set_merge_override(&mut self, enabled: bool) {
        self.merge_override = enabled;
    }

    /// Whether an eject was dispatched during the last update
    pub fn ejected_this_tick(&self) -> bool {
        self.ejected_this_tick
    }

    pub fn is_ready(&self) -> bool {
        self.link.ensure_ready().is_ok()
    }
}
