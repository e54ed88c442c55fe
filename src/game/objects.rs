//! World object arena
//!
//! The world is the sole owner of game objects. Everyone else holds
//! [`ObjectId`]s, which carry a generation so that a slot reused after a
//! removal never resolves for an old id.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::session::error::SessionError;
use crate::util::rect::Rect;
use crate::util::vec2::Vec2;

/// Session identifier, assigned once by the world
pub type SessionId = u32;

/// Generational handle to a world object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    index: u32,
    generation: u32,
}

impl ObjectId {
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// What kind of object this is (only used for outbound payloads)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    PlayerCell,
    Food,
    Virus,
    EjectedMass,
}

/// A game object as the world stores it.
///
/// Fields are read through getters and written through setters so every
/// observable mutation raises the changed flag. Ownership moves only via
/// `World::assign_owner`, which keeps sessions' cell lists in step.
#[derive(Debug, Clone)]
pub struct WorldObject {
    kind: ObjectKind,
    position: Vec2,
    /// Radius; the size metric used for zoom
    size: f32,
    /// Mass; the metric used for score
    mass: f32,
    owner: Option<SessionId>,
    changed: bool,
}

impl WorldObject {
    /// New object with mass derived from size (`size^2 / 100`)
    pub fn new(kind: ObjectKind, position: Vec2, size: f32) -> Self {
        Self {
            kind,
            position,
            size,
            mass: size * size / 100.0,
            owner: None,
            changed: false,
        }
    }

    pub fn with_owner(mut self, owner: SessionId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    #[inline]
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    #[inline]
    pub fn position(&self) -> Vec2 {
        self.position
    }

    #[inline]
    pub fn size(&self) -> f32 {
        self.size
    }

    #[inline]
    pub fn mass(&self) -> f32 {
        self.mass
    }

    #[inline]
    pub fn owner(&self) -> Option<SessionId> {
        self.owner
    }

    /// Bounding range used for visibility tests
    #[inline]
    pub fn range(&self) -> Rect {
        Rect::around(self.position, self.size)
    }

    /// Whether anything observable changed since the flags were last cleared
    #[inline]
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    #[inline]
    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    pub fn set_position(&mut self, position: Vec2) {
        if self.position != position {
            self.position = position;
            self.changed = true;
        }
    }

    pub fn set_size(&mut self, size: f32) {
        if self.size != size {
            self.size = size;
            self.changed = true;
        }
    }

    pub fn set_mass(&mut self, mass: f32) {
        if self.mass != mass {
            self.mass = mass;
            self.changed = true;
        }
    }

    /// Owner change without cell-list bookkeeping; the world wraps this
    pub(crate) fn set_owner(&mut self, owner: Option<SessionId>) {
        if self.owner != owner {
            self.owner = owner;
            self.changed = true;
        }
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    object: Option<WorldObject>,
}

/// Slot arena of world objects.
///
/// Iteration is in slot order and skips empty (tombstoned) slots.
#[derive(Debug, Default)]
pub struct ObjectArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl ObjectArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Insert an object and return its handle
    pub fn insert(&mut self, object: WorldObject) -> ObjectId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            return ObjectId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            object: Some(object),
        });
        ObjectId { index, generation: 0 }
    }

    /// Remove an object. Removing a stale id is a no-op returning `None`.
    pub fn remove(&mut self, id: ObjectId) -> Option<WorldObject> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let object = slot.object.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(object)
    }

    #[inline]
    pub fn get(&self, id: ObjectId) -> Option<&WorldObject> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.object.as_ref())
    }

    #[inline]
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut WorldObject> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.object.as_mut())
    }

    /// Liveness-checked dereference
    #[inline]
    pub fn resolve(&self, id: ObjectId) -> Result<&WorldObject, SessionError> {
        self.get(id).ok_or(SessionError::StaleReference(id))
    }

    #[inline]
    pub fn is_live(&self, id: ObjectId) -> bool {
        self.get(id).is_some()
    }

    /// Live objects in slot order
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &WorldObject)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.object.as_ref().map(|object| {
                (
                    ObjectId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    object,
                )
            })
        })
    }

    /// Reset every changed flag; the world calls this once all sessions ran
    pub fn clear_changed(&mut self) {
        for object in self.slots.iter_mut().filter_map(|slot| slot.object.as_mut()) {
            object.changed = false;
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn food(x: f32, y: f32) -> WorldObject {
        WorldObject::new(ObjectKind::Food, Vec2::new(x, y), 10.0)
    }

    #[test]
    fn test_insert_and_get() {
        let mut arena = ObjectArena::new();
        let id = arena.insert(food(1.0, 2.0));
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.get(id).map(|o| o.position()), Some(Vec2::new(1.0, 2.0)));
    }

    #[test]
    fn test_removed_id_is_stale_after_slot_reuse() {
        let mut arena = ObjectArena::new();
        let old = arena.insert(food(0.0, 0.0));
        assert!(arena.remove(old).is_some());

        let new = arena.insert(food(5.0, 5.0));
        assert_eq!(new.index(), old.index(), "slot should be reused");
        assert_ne!(new, old);

        assert!(arena.get(old).is_none());
        assert_eq!(arena.resolve(old).err(), Some(SessionError::StaleReference(old)));
        assert!(arena.is_live(new));
    }

    #[test]
    fn test_double_remove_is_noop() {
        let mut arena = ObjectArena::new();
        let id = arena.insert(food(0.0, 0.0));
        assert!(arena.remove(id).is_some());
        assert!(arena.remove(id).is_none());
        assert_eq!(arena.len(), 0);
        assert!(arena.is_empty());
    }

    #[test]
    fn test_iter_skips_tombstones() {
        let mut arena = ObjectArena::new();
        let a = arena.insert(food(0.0, 0.0));
        let b = arena.insert(food(1.0, 0.0));
        let c = arena.insert(food(2.0, 0.0));
        arena.remove(b);

        let ids: Vec<_> = arena.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![a, c]);
    }

    #[test]
    fn test_changed_flags() {
        let mut arena = ObjectArena::new();
        let id = arena.insert(food(0.0, 0.0));
        assert!(!arena.get(id).map_or(true, |o| o.is_changed()));

        if let Some(object) = arena.get_mut(id) {
            object.set_position(Vec2::new(3.0, 3.0));
        }
        assert!(arena.get(id).map_or(false, |o| o.is_changed()));

        arena.clear_changed();
        assert!(!arena.get(id).map_or(true, |o| o.is_changed()));
    }

    #[test]
    fn test_unchanged_setter_keeps_flag_clear() {
        let mut object = food(1.0, 1.0);
        object.set_position(Vec2::new(1.0, 1.0));
        object.set_size(10.0);
        assert!(!object.is_changed());
    }

    #[test]
    fn test_range_and_mass() {
        let object = WorldObject::new(ObjectKind::PlayerCell, Vec2::new(10.0, 10.0), 20.0);
        assert_eq!(object.range(), Rect::new(-10.0, -10.0, 30.0, 30.0));
        assert!((object.mass() - 4.0).abs() < 1e-5);
        assert_eq!(object.with_mass(7.5).mass(), 7.5);
    }

    #[test]
    fn test_every_setter_raises_changed_flag() {
        let mut arena = ObjectArena::new();
        let id = arena.insert(WorldObject::new(ObjectKind::PlayerCell, Vec2::ZERO, 20.0));

        let steps: [fn(&mut WorldObject); 4] = [
            |o| o.set_position(Vec2::new(10.0, 0.0)),
            |o| o.set_size(25.0),
            |o| o.set_mass(9.0),
            |o| o.set_owner(Some(3)),
        ];
        for step in steps {
            arena.clear_changed();
            let object = arena.get_mut(id).unwrap();
            step(object);
            assert!(object.is_changed());
        }

        let object = arena.get(id).unwrap();
        assert_eq!(object.position(), Vec2::new(10.0, 0.0));
        assert_eq!(object.size(), 25.0);
        assert_eq!(object.mass(), 9.0);
        assert_eq!(object.owner(), Some(3));
    }
}
