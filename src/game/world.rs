//! World driver
//!
//! Owns the object arena and the session registry and runs the per-tick
//! session pass. Object lifecycle events are fanned out to every session's
//! visibility queue as they happen; session teardown releases cells only
//! after the pass so no session observes a half-removed world.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use hashbrown::HashMap;
use tracing::{debug, info, trace};

use crate::config::{ServerConfig, SessionConfig};
use crate::game::mode::{self, GameMode, WorldRequest, WorldRequests};
use crate::game::objects::{ObjectArena, ObjectId, SessionId, WorldObject};
use crate::metrics::Metrics;
use crate::net::client_link::{pair, ClientHandle, ClientLink};
use crate::net::protocol::LeaderboardEntry;
use crate::session::anti_teaming::TeamingEventKind;
use crate::session::camera::SpectateTarget;
use crate::session::{CoordinateScramble, PlayerSession, TickContext, TickOutcome};

/// Result of one world tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    /// Work the simulation should perform
    pub requests: Vec<WorldRequest>,
    /// Sessions removed this tick
    pub torn_down: Vec<SessionId>,
}

pub struct World {
    config: ServerConfig,
    session_config: SessionConfig,
    objects: ObjectArena,
    sessions: HashMap<SessionId, PlayerSession>,
    game_mode: Box<dyn GameMode>,
    leaderboard: Vec<LeaderboardEntry>,
    next_session_id: SessionId,
    tick: u64,
    metrics: Arc<Metrics>,
}

impl World {
    pub fn new(config: ServerConfig, metrics: Arc<Metrics>) -> Self {
        let game_mode = mode::from_kind(config.game_mode);
        Self::with_game_mode(config, game_mode, metrics)
    }

    pub fn with_game_mode(config: ServerConfig, game_mode: Box<dyn GameMode>, metrics: Arc<Metrics>) -> Self {
        info!("World created, game mode: {}", game_mode.name());
        Self {
            session_config: config.session_config(),
            config,
            objects: ObjectArena::with_capacity(1024),
            sessions: HashMap::with_capacity(64),
            game_mode,
            leaderboard: Vec::new(),
            next_session_id: 1,
            tick: 0,
            metrics,
        }
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Register a session for an established transport link
    pub fn connect(&mut self, link: ClientLink) -> SessionId {
        let id = self.next_session_id;
        self.next_session_id = self.next_session_id.wrapping_add(1).max(1);

        let scramble = if self.config.scramble_coords {
            CoordinateScramble::random(&mut rand::thread_rng())
        } else {
            CoordinateScramble::NONE
        };

        let mut session = PlayerSession::new(id, link, scramble, &self.session_config);
        self.game_mode.on_session_init(&mut session);
        self.sessions.insert(id, session);

        self.metrics.sessions_connected_total.fetch_add(1, Ordering::Relaxed);
        info!("Session {} connected ({} total)", id, self.sessions.len());
        id
    }

    /// Create a link pair and register its session; the handle goes to the transport
    pub fn connect_client(&mut self) -> (SessionId, ClientHandle) {
        let (link, handle) = pair(
            crate::game::constants::queue::INPUT_CAPACITY,
            self.config.outbound_queue_capacity,
        );
        (self.connect(link), handle)
    }

    /// Transport reported the connection closed
    pub fn disconnect(&mut self, id: SessionId) -> bool {
        let grace = self.session_config.disconnect_grace_ticks;
        self.session_mut(id)
            .map(|session| session.begin_disconnect(grace))
            .unwrap_or(false)
    }

    pub fn session(&self, id: SessionId) -> Option<&PlayerSession> {
        self.sessions.get(&id)
    }

    pub fn session_mut(&mut self, id: SessionId) -> Option<&mut PlayerSession> {
        self.sessions.get_mut(&id)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &PlayerSession> {
        self.sessions.values()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Session with the greatest total cell size, if any owns a live cell.
    /// Ties go to the lower id.
    pub fn largest_session(&self) -> Option<&PlayerSession> {
        let mut best: Option<(&PlayerSession, f32)> = None;
        for session in self.sessions.values() {
            if session.is_removed() {
                continue;
            }
            let totals = session.cell_totals(&self.objects);
            if totals.live == 0 {
                continue;
            }
            let better = best.map_or(true, |(current, size)| {
                totals.size > size || (totals.size == size && session.id() < current.id())
            });
            if better {
                best = Some((session, totals.size));
            }
        }
        best.map(|(session, _)| session)
    }

    /// Route a mass-transfer event to the session that owns it
    pub fn apply_teaming_event(&mut self, id: SessionId, amount: f32, kind: TeamingEventKind) -> bool {
        if !self.config.anti_teaming_enabled {
            return false;
        }
        match self.sessions.get_mut(&id) {
            Some(session) => {
                session.apply_teaming_event(amount, kind, &self.objects);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    pub fn objects(&self) -> &ObjectArena {
        &self.objects
    }

    /// Mutable access for the simulation; setters flag the object changed
    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut WorldObject> {
        self.objects.get_mut(id)
    }

    pub fn spawn_object(&mut self, object: WorldObject) -> ObjectId {
        let owner = object.owner();
        let id = self.objects.insert(object);

        if let Some(owner) = owner {
            match self.session_mut(owner) {
                Some(session) => session.add_cell(id),
                None => debug!("Object {} spawned for unknown session {}", id, owner),
            }
        }
        for session in self.sessions.values_mut() {
            session.notify_spawned(id);
        }
        trace!("Spawned object {}", id);
        id
    }

    /// Remove an object; stale ids are a no-op
    pub fn remove_object(&mut self, id: ObjectId) -> Option<WorldObject> {
        let object = self.objects.remove(id)?;
        if let Some(owner) = object.owner() {
            if let Some(session) = self.session_mut(owner) {
                session.remove_cell(id);
            }
        }
        for session in self.sessions.values_mut() {
            session.notify_despawned(id);
        }
        trace!("Removed object {}", id);
        Some(object)
    }

    /// Hand an object to another session, or to nobody
    pub fn assign_owner(&mut self, id: ObjectId, owner: Option<SessionId>) -> bool {
        let previous = match self.objects.get_mut(id) {
            Some(object) => {
                let previous = object.owner();
                object.set_owner(owner);
                previous
            }
            None => return false,
        };

        if let Some(previous) = previous {
            if let Some(session) = self.session_mut(previous) {
                session.remove_cell(id);
            }
        }
        if let Some(owner) = owner {
            if let Some(session) = self.session_mut(owner) {
                session.add_cell(id);
            }
        }
        true
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    pub fn leaderboard(&self) -> &[LeaderboardEntry] {
        &self.leaderboard
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn rebuild_leaderboard(&mut self) {
        for session in self.sessions.values_mut() {
            session.recalculate_score(&self.objects);
        }

        let mut ranked: Vec<&PlayerSession> = self
            .sessions
            .values()
            .filter(|session| !session.cells().is_empty())
            .collect();
        ranked.sort_by(|a, b| b.score().cmp(&a.score()).then(a.id().cmp(&b.id())));

        self.leaderboard = ranked
            .into_iter()
            .take(self.config.leaderboard_size)
            .map(|session| LeaderboardEntry {
                id: session.id(),
                name: session.name().to_string(),
                score: session.score(),
            })
            .collect();
    }

    fn spectate_target(&self) -> Option<SpectateTarget> {
        if !self.sessions.values().any(|s| s.camera_mode().is_spectating()) {
            return None;
        }
        self.largest_session()
            .map(|session| session.spectate_target(&self.objects))
    }

    /// Run every session once, then release cells of torn-down sessions.
    ///
    /// Every session prepares first, which settles its camera mode. Players
    /// then run their view, and spectators run theirs last against a target
    /// snapshot taken from this tick's state.
    pub fn tick(&mut self) -> TickReport {
        let start = Instant::now();
        self.tick += 1;

        self.rebuild_leaderboard();

        let mut requests = WorldRequests::default();
        let mut outcomes: HashMap<SessionId, TickOutcome> = HashMap::with_capacity(self.sessions.len());
        {
            let ctx = TickContext {
                objects: &self.objects,
                config: &self.session_config,
                game_mode: self.game_mode.as_ref(),
                spectate_target: None,
                leaderboard: &self.leaderboard,
            };
            for (id, session) in self.sessions.iter_mut() {
                let outcome = outcomes.entry(*id).or_default();
                session.prepare_tick(&ctx, &mut requests, outcome);
            }
            for (id, session) in self.sessions.iter_mut() {
                if session.camera_mode().is_spectating() {
                    continue;
                }
                if let Some(outcome) = outcomes.get_mut(id) {
                    session.finish_tick(&ctx, outcome);
                }
            }
        }

        let target = self.spectate_target();
        {
            let ctx = TickContext {
                objects: &self.objects,
                config: &self.session_config,
                game_mode: self.game_mode.as_ref(),
                spectate_target: target.as_ref(),
                leaderboard: &self.leaderboard,
            };
            for (id, session) in self.sessions.iter_mut() {
                if !session.camera_mode().is_spectating() {
                    continue;
                }
                if let Some(outcome) = outcomes.get_mut(id) {
                    session.finish_tick(&ctx, outcome);
                }
            }
        }

        let mut report = TickReport {
            tick: self.tick,
            ..Default::default()
        };
        let mut released = Vec::new();
        for (id, outcome) in outcomes.iter_mut() {
            if let Some(cells) = outcome.teardown.take() {
                report.torn_down.push(*id);
                released.extend(cells);
            }
        }
        report.torn_down.sort_unstable();

        for id in released {
            self.remove_object(id);
        }
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_removed());
        if before != self.sessions.len() {
            info!(
                "Tick {}: tore down {:?}, {} sessions remain",
                self.tick,
                report.torn_down,
                self.sessions.len()
            );
        }

        self.objects.clear_changed();
        report.requests = requests.into_vec();
        self.record_metrics(&outcomes, &report, start);
        report
    }

    fn record_metrics(&self, outcomes: &HashMap<SessionId, TickOutcome>, report: &TickReport, start: Instant) {
        let spectating = self
            .sessions
            .values()
            .filter(|s| s.camera_mode().is_spectating())
            .count();
        let playing = self.sessions.values().filter(|s| !s.cells().is_empty()).count();
        let disconnecting = self
            .sessions
            .values()
            .filter(|s| s.disconnect_state().is_disconnecting())
            .count();

        let m = &self.metrics;
        m.sessions_active.store(self.sessions.len() as u64, Ordering::Relaxed);
        m.sessions_playing.store(playing as u64, Ordering::Relaxed);
        m.sessions_spectating.store(spectating as u64, Ordering::Relaxed);
        m.sessions_disconnecting.store(disconnecting as u64, Ordering::Relaxed);
        m.sessions_torn_down_total
            .fetch_add(report.torn_down.len() as u64, Ordering::Relaxed);
        m.objects_live.store(self.objects.len() as u64, Ordering::Relaxed);
        m.world_requests_total
            .fetch_add(report.requests.len() as u64, Ordering::Relaxed);

        let (sent, dropped) = outcomes.values().fold((0, 0), |(sent, dropped), o| {
            (sent + o.messages_sent, dropped + o.messages_dropped)
        });
        m.messages_sent.fetch_add(sent as u64, Ordering::Relaxed);
        m.messages_dropped.fetch_add(dropped as u64, Ordering::Relaxed);

        #[cfg(feature = "metrics_extended")]
        {
            let mut refreshes = 0u64;
            let mut updated = 0u64;
            let mut removed = 0u64;
            for outcome in outcomes.values() {
                refreshes += outcome.full_refresh as u64;
                updated += outcome.nodes_updated as u64;
                removed += outcome.nodes_removed as u64;
            }
            m.full_refreshes.fetch_add(refreshes, Ordering::Relaxed);
            m.nodes_updated.fetch_add(updated, Ordering::Relaxed);
            m.nodes_removed.fetch_add(removed, Ordering::Relaxed);
        }

        m.record_tick_time(start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::objects::ObjectKind;
    use crate::net::protocol::{ClientInput, ServerMessage};
    use crate::session::camera::CameraMode;
    use crate::util::vec2::Vec2;

    fn world() -> World {
        let config = ServerConfig {
            scramble_coords: false,
            disconnect_grace_ticks: 5,
            ..ServerConfig::default()
        };
        World::new(config, Arc::new(Metrics::new()))
    }

    fn ready_client(world: &mut World) -> (SessionId, ClientHandle) {
        let (id, handle) = world.connect_client();
        handle.push(ClientInput::Handshake { protocol: 6 }).unwrap();
        (id, handle)
    }

    fn cell(owner: SessionId, x: f32, y: f32, size: f32) -> WorldObject {
        WorldObject::new(ObjectKind::PlayerCell, Vec2::new(x, y), size).with_owner(owner)
    }

    fn updated_ids(messages: &[ServerMessage]) -> Vec<ObjectId> {
        messages
            .iter()
            .filter_map(|m| match m {
                ServerMessage::UpdateNodes { updated, .. } => Some(updated.iter().map(|n| n.id)),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn removed_ids(messages: &[ServerMessage]) -> Vec<ObjectId> {
        messages
            .iter()
            .filter_map(|m| match m {
                ServerMessage::UpdateNodes { removed, .. } => Some(removed.iter().copied()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    #[test]
    fn test_connect_assigns_unique_ids() {
        let mut world = world();
        let (a, _ha) = world.connect_client();
        let (b, _hb) = world.connect_client();
        assert_ne!(a, b);
        assert_eq!(world.session_count(), 2);
    }

    #[test]
    fn test_spawn_links_owner_and_notifies() {
        let mut world = world();
        let (id, handle) = ready_client(&mut world);
        world.tick();
        handle.drain();

        let far = world.spawn_object(cell(id, 9000.0, 9000.0, 30.0));
        assert_eq!(world.session(id).unwrap().cells(), &[far]);

        world.tick();
        assert!(updated_ids(&handle.drain()).contains(&far), "own cell is visible anywhere");
    }

    #[test]
    fn test_remove_object_fans_out_and_unlinks() {
        let mut world = world();
        let (id, handle) = ready_client(&mut world);
        let own = world.spawn_object(cell(id, 0.0, 0.0, 30.0));
        let food = world.spawn_object(WorldObject::new(ObjectKind::Food, Vec2::new(10.0, 10.0), 5.0));
        world.tick();
        assert!(world.session(id).unwrap().visibility().is_visible(food));
        handle.drain();

        assert!(world.remove_object(food).is_some());
        assert!(world.remove_object(food).is_none(), "second removal is a no-op");
        world.tick();
        assert_eq!(removed_ids(&handle.drain()), vec![food]);

        world.remove_object(own);
        assert!(world.session(id).unwrap().cells().is_empty());
    }

    #[test]
    fn test_changed_flags_cleared_after_tick() {
        let mut world = world();
        let (id, handle) = ready_client(&mut world);
        let own = world.spawn_object(cell(id, 0.0, 0.0, 30.0));
        world.tick();
        handle.drain();

        world.object_mut(own).unwrap().set_position(Vec2::new(5.0, 0.0));
        world.tick();
        assert_eq!(updated_ids(&handle.drain()), vec![own]);
        assert!(!world.objects().get(own).unwrap().is_changed());

        world.tick();
        assert!(updated_ids(&handle.drain()).is_empty());
    }

    #[test]
    fn test_assign_owner_moves_cell() {
        let mut world = world();
        let (a, _ha) = world.connect_client();
        let (b, _hb) = world.connect_client();
        let id = world.spawn_object(cell(a, 0.0, 0.0, 30.0));

        assert!(world.assign_owner(id, Some(b)));
        assert!(world.session(a).unwrap().cells().is_empty());
        assert_eq!(world.session(b).unwrap().cells(), &[id]);
        assert_eq!(world.objects().get(id).unwrap().owner(), Some(b));
    }

    #[test]
    fn test_largest_session() {
        let mut world = world();
        let (a, _ha) = world.connect_client();
        let (b, _hb) = world.connect_client();
        let (_c, _hc) = world.connect_client();
        world.spawn_object(cell(a, 0.0, 0.0, 30.0));
        world.spawn_object(cell(b, 0.0, 0.0, 40.0));
        world.spawn_object(cell(a, 0.0, 0.0, 5.0));

        assert_eq!(world.largest_session().map(|s| s.id()), Some(b));
    }

    #[test]
    fn test_spectator_follows_largest() {
        let mut world = world();
        let (player, _hp) = ready_client(&mut world);
        let (spectator, hs) = ready_client(&mut world);
        world.spawn_object(cell(player, 3000.0, 2000.0, 80.0));
        hs.push(ClientInput::Spectate).unwrap();

        world.tick();
        world.tick();

        let s = world.session(spectator).unwrap();
        assert_eq!(s.camera_mode(), CameraMode::SpectateFollow);
        assert_eq!(s.view_center(), Vec2::new(3000.0, 2000.0));
        let p = world.session(player).unwrap();
        for id in p.visibility().visible() {
            assert!(s.visibility().is_visible(*id));
        }
    }

    #[test]
    fn test_spectator_tracks_target_moved_between_ticks() {
        let mut world = world();
        let (player, _hp) = ready_client(&mut world);
        let (spectator, hs) = ready_client(&mut world);
        let c = world.spawn_object(cell(player, 1000.0, 1000.0, 80.0));
        hs.push(ClientInput::Spectate).unwrap();
        world.tick();
        world.tick();

        world.object_mut(c).unwrap().set_position(Vec2::new(2000.0, 1500.0));
        world.tick();

        let target = Vec2::new(2000.0, 1500.0);
        assert_eq!(world.session(player).unwrap().view_center(), target);
        assert_eq!(world.session(spectator).unwrap().view_center(), target);
    }

    #[test]
    fn test_spectator_follows_on_first_tick() {
        let mut world = world();
        let (player, _hp) = ready_client(&mut world);
        let (spectator, hs) = ready_client(&mut world);
        world.spawn_object(cell(player, 3000.0, 2000.0, 80.0));
        hs.push(ClientInput::Spectate).unwrap();

        world.tick();

        let s = world.session(spectator).unwrap();
        assert_eq!(s.view_center(), Vec2::new(3000.0, 2000.0));
        let total = world.session(player).unwrap().total_size(world.objects());
        let zooms: Vec<f32> = hs
            .drain()
            .iter()
            .filter_map(|m| match m {
                ServerMessage::UpdatePosition { zoom, .. } => Some(*zoom),
                _ => None,
            })
            .collect();
        assert_eq!(zooms.len(), 1);
        assert!((zooms[0] - 1.5 / crate::session::camera::view_scale(total)).abs() < 1e-5);
    }

    #[test]
    fn test_disconnect_tears_down_after_grace() {
        let mut world = world();
        let (id, handle) = ready_client(&mut world);
        let (_other, other_handle) = ready_client(&mut world);
        let own = world.spawn_object(cell(id, 0.0, 0.0, 30.0));
        world.tick();
        other_handle.drain();

        drop(handle);
        for _ in 0..5 {
            let report = world.tick();
            assert!(report.torn_down.is_empty());
        }
        let report = world.tick();
        assert_eq!(report.torn_down, vec![id]);
        assert!(world.session(id).is_none());
        assert!(!world.objects().is_live(own));

        world.tick();
        assert!(removed_ids(&other_handle.drain()).contains(&own));
    }

    #[test]
    fn test_join_produces_spawn_request() {
        let mut world = world();
        let (id, handle) = ready_client(&mut world);
        handle.push(ClientInput::Join { name: "cell".into() }).unwrap();
        let report = world.tick();
        assert_eq!(report.requests, vec![WorldRequest::Spawn { session: id }]);
    }

    #[test]
    fn test_leaderboard_ranks_by_score() {
        let mut world = world();
        let (a, _ha) = world.connect_client();
        let (b, _hb) = world.connect_client();
        world.spawn_object(cell(a, 0.0, 0.0, 50.0));
        world.spawn_object(cell(b, 0.0, 0.0, 100.0));
        world.tick();

        let ids: Vec<SessionId> = world.leaderboard().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![b, a]);
        assert_eq!(world.leaderboard()[0].score, 100);
    }

    #[test]
    fn test_teaming_event_routed() {
        let mut world = world();
        let (id, _h) = world.connect_client();
        world.spawn_object(cell(id, 0.0, 0.0, 100.0));
        assert!(world.apply_teaming_event(id, 400.0, TeamingEventKind::Loss));
        assert!(!world.apply_teaming_event(999, 1.0, TeamingEventKind::Loss));
        world.tick();
        assert!(world.session(id).unwrap().decay_multiplier() > 1.0);
    }

    #[test]
    fn test_tick_metrics() {
        let metrics = Arc::new(Metrics::new());
        let mut world = World::new(ServerConfig::default(), metrics.clone());
        let (_id, _h) = ready_client(&mut world);
        world.tick();
        assert_eq!(metrics.sessions_active.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 1);
        assert!(metrics.messages_sent.load(Ordering::Relaxed) >= 2);
    }
}
