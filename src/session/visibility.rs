//! Per-session visibility tracking
//!
//! Keeps the set of world objects a client knows about and produces the
//! per-tick diff (objects to (re)send, objects to drop):
//! - every `refresh_period + 1` ticks: full scan of the world (O(objects))
//! - in between: incremental updates from the world's spawn/despawn fan-out
//! - every tick: visible objects flagged as changed are resent
//! - spectators mirror the followed session's set instead of computing one

use rustc_hash::FxHashSet;
use tracing::trace;

use crate::game::objects::{ObjectArena, ObjectId, SessionId};
use crate::util::rect::Rect;

/// Result of one visibility tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisibilityDiff {
    /// Objects the client must be (re)sent
    pub updated: Vec<ObjectId>,
    /// Objects the client must drop
    pub removed: Vec<ObjectId>,
    /// Whether this tick rescanned the whole world
    pub full_refresh: bool,
}

impl VisibilityDiff {
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct VisibilityTracker {
    visible: FxHashSet<ObjectId>,
    pending_spawns: Vec<ObjectId>,
    pending_despawns: Vec<ObjectId>,
    /// Ticks until the next full refresh, in `0..=refresh_period`
    refresh_counter: u32,
    refresh_period: u32,
}

impl VisibilityTracker {
    /// New tracker; the first tick always does a full refresh
    pub fn new(refresh_period: u32) -> Self {
        Self {
            visible: FxHashSet::default(),
            pending_spawns: Vec::new(),
            pending_despawns: Vec::new(),
            refresh_counter: 0,
            refresh_period,
        }
    }

    /// World fan-out: an object was spawned
    pub fn notify_spawned(&mut self, id: ObjectId) {
        self.pending_spawns.push(id);
    }

    /// World fan-out: an object was removed
    pub fn notify_despawned(&mut self, id: ObjectId) {
        self.pending_despawns.push(id);
    }

    #[inline]
    pub fn is_visible(&self, id: ObjectId) -> bool {
        self.visible.contains(&id)
    }

    #[inline]
    pub fn visible(&self) -> &FxHashSet<ObjectId> {
        &self.visible
    }

    pub fn visible_ids(&self) -> Vec<ObjectId> {
        self.visible.iter().copied().collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.visible.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    #[inline]
    pub fn refresh_counter(&self) -> u32 {
        self.refresh_counter
    }

    /// Make the next tick a full refresh
    pub fn force_refresh(&mut self) {
        self.refresh_counter = 0;
    }

    /// Forget everything (the client was told to clear its view)
    pub fn reset(&mut self) {
        self.visible.clear();
        self.pending_spawns.clear();
        self.pending_despawns.clear();
        self.refresh_counter = 0;
    }

    /// Compute this tick's diff.
    ///
    /// `mirror` carries the followed session's visible set when spectating;
    /// it replaces the refresh/incremental machinery for the tick.
    pub fn tick(
        &mut self,
        objects: &ObjectArena,
        viewport: &Rect,
        viewer: SessionId,
        mirror: Option<&[ObjectId]>,
    ) -> VisibilityDiff {
        let mut diff = VisibilityDiff::default();

        match mirror {
            Some(target_visible) => self.adopt(objects, target_visible, &mut diff),
            None if self.refresh_counter == 0 => {
                self.full_refresh(objects, viewport, viewer, &mut diff);
                self.refresh_counter = self.refresh_period;
            }
            None => {
                self.incremental(objects, viewport, viewer, &mut diff);
                self.refresh_counter -= 1;
            }
        }

        self.collect_changed(objects, &mut diff);
        diff
    }

    /// Full scan: visible = { o : viewport ∩ range(o) ≠ ∅ or owner(o) = viewer }
    fn full_refresh(
        &mut self,
        objects: &ObjectArena,
        viewport: &Rect,
        viewer: SessionId,
        diff: &mut VisibilityDiff,
    ) {
        let mut next = FxHashSet::with_capacity_and_hasher(self.visible.len(), Default::default());
        for (id, object) in objects.iter() {
            if viewport.intersects(&object.range()) || object.owner() == Some(viewer) {
                next.insert(id);
            }
        }

        // Queued events are subsumed by the scan
        self.pending_spawns.clear();
        self.pending_despawns.clear();

        self.reconcile(next, diff);
        diff.full_refresh = true;
    }

    fn incremental(
        &mut self,
        objects: &ObjectArena,
        viewport: &Rect,
        viewer: SessionId,
        diff: &mut VisibilityDiff,
    ) {
        for id in self.pending_despawns.drain(..) {
            // Despawns of objects this client never saw are dropped
            if self.visible.remove(&id) {
                diff.removed.push(id);
            }
        }

        for id in self.pending_spawns.drain(..) {
            let object = match objects.resolve(id) {
                Ok(object) => object,
                Err(e) => {
                    trace!("skipping spawn: {}", e);
                    continue;
                }
            };
            if !viewport.intersects(&object.range()) && object.owner() != Some(viewer) {
                continue;
            }
            if self.visible.insert(id) {
                diff.updated.push(id);
            }
            // Addition wins over a same-tick removal
            diff.removed.retain(|removed| *removed != id);
        }
    }

    fn adopt(&mut self, objects: &ObjectArena, target_visible: &[ObjectId], diff: &mut VisibilityDiff) {
        let next: FxHashSet<ObjectId> = target_visible
            .iter()
            .copied()
            .filter(|id| objects.is_live(*id))
            .collect();

        self.pending_spawns.clear();
        self.pending_despawns.clear();
        self.reconcile(next, diff);
    }

    /// Swap in a new visible set, recording entries and exits
    fn reconcile(&mut self, next: FxHashSet<ObjectId>, diff: &mut VisibilityDiff) {
        diff.updated
            .extend(next.iter().copied().filter(|id| !self.visible.contains(id)));
        diff.removed
            .extend(self.visible.iter().copied().filter(|id| !next.contains(id)));
        self.visible = next;
    }

    /// Resend visible objects that changed and are not already in the diff
    fn collect_changed(&self, objects: &ObjectArena, diff: &mut VisibilityDiff) {
        let already: FxHashSet<ObjectId> = diff.updated.iter().copied().collect();
        for &id in &self.visible {
            if already.contains(&id) {
                continue;
            }
            if objects.get(id).is_some_and(|object| object.is_changed()) {
                diff.updated.push(id);
            }
        }
    }
}
