//! The entity registry: sole authority for identity, liveness and location.
//!
//! The registry owns one [`Record`] per issued ID slot. A live record holds
//! the entity's [`Location`]; a dead record is a link in an intrusive FIFO
//! free list. Storages never decide whether an entity lives; they only report
//! where its data moved to, and the registry destroys the entity when asked
//! to relocate it to the `INVALID` store.
//!
//! Freed IDs are recycled least-recently-freed first. Together with the
//! per-slot generation counter this delays, but cannot rule out, a stale
//! handle colliding with a recycled slot.

use std::fmt;

use tracing::{debug, trace};

use crate::config::{DefaultConfig, RegistryConfig, RegistrySettings};
use crate::entity::{GenerationCounter, Handle, Location, SequentialId};

// ---------------------------------------------------------------------------
// EntityKey
// ---------------------------------------------------------------------------

/// Anything that names an entity: a raw ID or a [`Handle`].
///
/// Raw IDs resolve when the slot is alive. Handles additionally require the
/// slot's generation to match, so only they detect a recycled ID.
pub trait EntityKey<C: RegistryConfig>: Copy {
    /// The ID this key names, whether or not it is still valid.
    fn id(self) -> C::Id;

    /// The ID if the key currently names a live entity.
    fn resolve(self, registry: &EntityRegistry<C>) -> Option<C::Id>;
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot<I, S> {
    Live(Location<S>),
    /// Dead slot; `next` is the following entry of the free list.
    Free { next: Option<I> },
}

/// Bookkeeping for one ID slot.
pub struct Record<C: RegistryConfig> {
    slot: Slot<C::Id, C::StoreId>,
    generation: C::Generation,
    metadata: C::Metadata,
}

impl<C: RegistryConfig> Record<C> {
    fn vacant() -> Self {
        Self {
            slot: Slot::Free { next: None },
            generation: C::Generation::INITIAL,
            metadata: C::Metadata::default(),
        }
    }

    /// Whether the slot currently holds a living entity.
    #[inline]
    pub fn is_live(&self) -> bool {
        matches!(self.slot, Slot::Live(_))
    }

    /// The entity's location, or `None` for a dead slot.
    #[inline]
    pub fn location(&self) -> Option<Location<C::StoreId>> {
        match self.slot {
            Slot::Live(location) => Some(location),
            Slot::Free { .. } => None,
        }
    }

    /// The slot's current generation.
    #[inline]
    pub fn generation(&self) -> C::Generation {
        self.generation
    }

    /// The entity's metadata.
    #[inline]
    pub fn metadata(&self) -> &C::Metadata {
        &self.metadata
    }
}

impl<C: RegistryConfig> fmt::Debug for Record<C>
where
    C::Metadata: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("slot", &self.slot)
            .field("generation", &self.generation)
            .field("metadata", &self.metadata)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EntityRegistry
// ---------------------------------------------------------------------------

/// Issues, recycles and locates entity IDs.
///
/// The record array may contain holes (dead slots); [`len`](Self::len) counts
/// only living entities.
pub struct EntityRegistry<C: RegistryConfig = DefaultConfig> {
    records: Vec<Record<C>>,
    /// Least-recently-freed slot, allocated next.
    free_head: Option<C::Id>,
    /// Most-recently-freed slot.
    free_tail: Option<C::Id>,
    live: usize,
    /// One past the highest ID ever handed out.
    high_water: usize,
    id_limit: usize,
}

impl<C: RegistryConfig> EntityRegistry<C> {
    /// Create an empty registry spanning the whole ID range.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            free_head: None,
            free_tail: None,
            live: 0,
            high_water: 0,
            id_limit: Self::max_id_limit(),
        }
    }

    /// Create a registry and apply `settings` to it.
    pub fn with_settings(settings: &RegistrySettings) -> Self {
        let mut registry = Self::new();
        if let Some(limit) = settings.id_limit {
            registry.set_id_limit(limit);
        }
        registry.reserve(settings.reserve, settings.prefill);
        registry
    }

    /// Number of slots the ID type can address (every value but `INVALID`).
    fn max_id_limit() -> usize {
        C::Id::INVALID.index()
    }

    // -- creation -----------------------------------------------------------

    /// Allocate an ID for a new entity placed at `location`.
    ///
    /// The least-recently-freed slot is reused first; otherwise the record
    /// array grows by one. Returns `None` when the ID limit is reached or
    /// when `location` names the `INVALID` store.
    pub fn create_id(
        &mut self,
        location: Location<C::StoreId>,
        metadata: C::Metadata,
    ) -> Option<C::Id> {
        if location.is_destroyed() {
            debug!("refusing to create an entity in the invalid store");
            return None;
        }
        let id = match self.pop_free() {
            Some(id) => id,
            None => self.grow()?,
        };
        let record = &mut self.records[id.index()];
        record.slot = Slot::Live(location);
        record.metadata = metadata;
        self.live += 1;
        self.high_water = self.high_water.max(id.index() + 1);
        Some(id)
    }

    /// Like [`create_id`](Self::create_id) but returns a generation-checked
    /// handle.
    pub fn create_handle(
        &mut self,
        location: Location<C::StoreId>,
        metadata: C::Metadata,
    ) -> Option<Handle<C>> {
        let id = self.create_id(location, metadata)?;
        Some(Handle::new(id, self.records[id.index()].generation))
    }

    fn pop_free(&mut self) -> Option<C::Id> {
        let head = self.free_head?;
        let next = match self.records[head.index()].slot {
            Slot::Free { next } => next,
            Slot::Live(_) => unreachable!("free list links a live slot"),
        };
        self.free_head = next;
        if next.is_none() {
            self.free_tail = None;
        }
        Some(head)
    }

    fn push_free(&mut self, id: C::Id) {
        match self.free_tail {
            Some(tail) => self.records[tail.index()].slot = Slot::Free { next: Some(id) },
            None => self.free_head = Some(id),
        }
        self.free_tail = Some(id);
    }

    fn grow(&mut self) -> Option<C::Id> {
        let index = self.records.len();
        if index >= self.id_limit {
            debug!(id_limit = self.id_limit, "entity registry is full");
            return None;
        }
        let id = C::Id::from_index(index)?;
        self.records.push(Record::vacant());
        Some(id)
    }

    // -- validity -----------------------------------------------------------

    /// Whether the slot `id` currently holds a living entity.
    ///
    /// This cannot tell whether the ID was recycled since it was obtained;
    /// use a [`Handle`] for that.
    #[inline]
    pub fn is_alive(&self, id: C::Id) -> bool {
        self.records.get(id.index()).is_some_and(Record::is_live)
    }

    /// Whether `handle` names a living entity of the same generation.
    #[inline]
    pub fn is_valid_handle(&self, handle: Handle<C>) -> bool {
        self.records
            .get(handle.id().index())
            .is_some_and(|record| record.is_live() && record.generation == handle.generation())
    }

    /// Whether `key` (an ID or a handle) names a living entity.
    #[inline]
    pub fn is_valid<K: EntityKey<C>>(&self, key: K) -> bool {
        key.resolve(self).is_some()
    }

    /// The current handle for a living `id`.
    pub fn handle(&self, id: C::Id) -> Option<Handle<C>> {
        let record = self.records.get(id.index())?;
        record
            .is_live()
            .then(|| Handle::new(id, record.generation))
    }

    // -- location -----------------------------------------------------------

    /// Where the entity named by `key` lives.
    pub fn location<K: EntityKey<C>>(&self, key: K) -> Option<Location<C::StoreId>> {
        let id = key.resolve(self)?;
        self.records[id.index()].location()
    }

    /// Move the entity named by `key` to `location`.
    ///
    /// Writing a location in the `INVALID` store destroys the entity: its
    /// generation is bumped and its slot is appended to the free list.
    /// Returns `false` if `key` is not valid.
    pub fn set_location<K: EntityKey<C>>(
        &mut self,
        key: K,
        location: Location<C::StoreId>,
    ) -> bool {
        match key.resolve(self) {
            Some(id) => {
                self.relocate(id, location);
                true
            }
            None => false,
        }
    }

    /// Location of a living `id`, without a generation check.
    #[inline]
    pub(crate) fn location_of(&self, id: C::Id) -> Option<Location<C::StoreId>> {
        self.records.get(id.index())?.location()
    }

    /// Location write for an ID whose validity the caller has established.
    pub(crate) fn relocate(&mut self, id: C::Id, location: Location<C::StoreId>) {
        debug_assert!(self.is_alive(id), "relocating dead entity {id:?}");
        if location.is_destroyed() {
            self.destroy(id);
        } else {
            self.records[id.index()].slot = Slot::Live(location);
        }
    }

    fn destroy(&mut self, id: C::Id) {
        let record = &mut self.records[id.index()];
        record.generation = record.generation.bump();
        record.metadata = C::Metadata::default();
        record.slot = Slot::Free { next: None };
        self.live -= 1;
        self.push_free(id);
        trace!(entity = ?id, "entity destroyed");
    }

    // -- erasure ------------------------------------------------------------

    /// Destroy the entity named by `key`. Returns `false` if it is not valid.
    ///
    /// Storages still holding the entity's data are not notified; erase
    /// through the storage to keep both sides consistent.
    pub fn erase<K: EntityKey<C>>(&mut self, key: K) -> bool {
        self.set_location(key, Location::destroyed())
    }

    /// Destroy every living entity whose record satisfies `pred`.
    ///
    /// Returns the number of entities erased. Typically used to sweep
    /// entities left behind in the staging store.
    pub fn erase_if<F>(&mut self, mut pred: F) -> usize
    where
        F: FnMut(C::Id, &Record<C>) -> bool,
    {
        let mut erased = 0;
        for index in 0..self.records.len() {
            let record = &self.records[index];
            if !record.is_live() {
                continue;
            }
            let Some(id) = C::Id::from_index(index) else {
                break;
            };
            if pred(id, record) {
                self.destroy(id);
                erased += 1;
            }
        }
        erased
    }

    // -- metadata -----------------------------------------------------------

    /// Metadata of the entity named by `key`.
    pub fn metadata<K: EntityKey<C>>(&self, key: K) -> Option<&C::Metadata> {
        let id = key.resolve(self)?;
        Some(&self.records[id.index()].metadata)
    }

    /// Mutable metadata of the entity named by `key`.
    pub fn metadata_mut<K: EntityKey<C>>(&mut self, key: K) -> Option<&mut C::Metadata> {
        let id = key.resolve(self)?;
        Some(&mut self.records[id.index()].metadata)
    }

    // -- inspection ---------------------------------------------------------

    /// Number of living entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether no entity is alive.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Highest ID ever handed out, if any.
    pub fn max_id(&self) -> Option<C::Id> {
        self.high_water.checked_sub(1).and_then(C::Id::from_index)
    }

    /// Number of record slots allocated without reallocating.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.records.capacity()
    }

    /// Maximum number of ID slots.
    #[inline]
    pub fn id_limit(&self) -> usize {
        self.id_limit
    }

    /// Living entities and their records, in ID order.
    pub fn iter(&self) -> impl Iterator<Item = (C::Id, &Record<C>)> + '_ {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.is_live())
            .filter_map(|(index, record)| C::Id::from_index(index).map(|id| (id, record)))
    }

    // -- capacity management ------------------------------------------------

    /// Reserve room for `n` record slots in total.
    ///
    /// With `prefill`, the slots are created right away as free slots queued
    /// in ascending order, so the record array never reallocates while the
    /// entity count stays within `n`.
    pub fn reserve(&mut self, n: usize, prefill: bool) {
        let target = n.min(self.id_limit);
        self.records
            .reserve(target.saturating_sub(self.records.len()));
        if prefill {
            while self.records.len() < target {
                let Some(id) = C::Id::from_index(self.records.len()) else {
                    break;
                };
                self.records.push(Record::vacant());
                self.push_free(id);
            }
        }
    }

    /// Limit the number of ID slots to `limit`.
    ///
    /// Fails if a living entity has an ID at or beyond `limit`. Dead slots
    /// beyond the limit are dropped, which forgets their generations.
    pub fn set_id_limit(&mut self, limit: usize) -> bool {
        let limit = limit.min(Self::max_id_limit());
        if self.records.iter().skip(limit).any(Record::is_live) {
            debug!(limit, "cannot lower the id limit below a living entity");
            return false;
        }
        self.id_limit = limit;
        if self.records.len() > limit {
            self.truncate_records(limit);
        }
        true
    }

    /// Drop trailing dead slots and release unused memory.
    ///
    /// Generations of the dropped slots are forgotten: a stale handle to one
    /// of them may validate again once the ID is reissued.
    pub fn shrink_to_fit(&mut self) {
        let len = self
            .records
            .iter()
            .rposition(Record::is_live)
            .map_or(0, |last| last + 1);
        self.truncate_records(len);
        self.records.shrink_to_fit();
    }

    /// Destroy every living entity.
    ///
    /// With `shrink == false` each entity goes through the normal destroy
    /// path, so outstanding handles stay detectably stale. With
    /// `shrink == true` all records are dropped and generations restart.
    pub fn clear(&mut self, shrink: bool) {
        if shrink {
            self.records.clear();
            self.records.shrink_to_fit();
            self.free_head = None;
            self.free_tail = None;
            self.live = 0;
            self.high_water = 0;
            return;
        }
        for index in 0..self.records.len() {
            if !self.records[index].is_live() {
                continue;
            }
            if let Some(id) = C::Id::from_index(index) {
                self.destroy(id);
            }
        }
    }

    /// Keep the first `len` records, relinking the surviving free slots in
    /// their original order.
    fn truncate_records(&mut self, len: usize) {
        let mut survivors = Vec::new();
        let mut cursor = self.free_head;
        while let Some(id) = cursor {
            cursor = match self.records[id.index()].slot {
                Slot::Free { next } => next,
                Slot::Live(_) => None,
            };
            if id.index() < len {
                survivors.push(id);
            }
        }
        self.records.truncate(len);
        self.free_head = None;
        self.free_tail = None;
        for id in survivors {
            self.records[id.index()].slot = Slot::Free { next: None };
            self.push_free(id);
        }
        self.high_water = self.high_water.min(len);
    }
}

impl<C: RegistryConfig> Default for EntityRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: RegistryConfig> fmt::Debug for EntityRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("live", &self.live)
            .field("slots", &self.records.len())
            .field("id_limit", &self.id_limit)
            .field("free_head", &self.free_head)
            .field("free_tail", &self.free_tail)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UncheckedConfig;
    use crate::entity::{EntityId, StoreId};

    type Registry = EntityRegistry<DefaultConfig>;

    struct Tagged;

    impl RegistryConfig for Tagged {
        type Id = u16;
        type StoreId = u8;
        type Generation = u8;
        type Metadata = &'static str;
    }

    fn staged() -> Location<StoreId> {
        Location::staged()
    }

    #[test]
    fn ids_are_sequential() {
        let mut reg = Registry::new();
        let ids: Vec<EntityId> = (0..4).map(|_| reg.create_id(staged(), ()).unwrap()).collect();
        assert_eq!(ids, vec![EntityId(0), EntityId(1), EntityId(2), EntityId(3)]);
        assert_eq!(reg.len(), 4);
        assert_eq!(reg.max_id(), Some(EntityId(3)));
    }

    #[test]
    fn id_limit_and_reuse_with_generation() {
        let mut reg = Registry::new();
        assert!(reg.set_id_limit(4));
        let handles: Vec<_> = (0..4)
            .map(|_| reg.create_handle(staged(), ()).unwrap())
            .collect();
        assert!(reg.create_id(staged(), ()).is_none(), "fifth id must fail");

        assert!(reg.erase(handles[1]));
        let reused = reg.create_handle(staged(), ()).unwrap();
        assert_eq!(reused.id(), EntityId(1));
        assert_eq!(reused.generation(), handles[1].generation() + 1);
        assert!(!reg.is_valid(handles[1]));
        assert!(reg.is_valid(reused));
        assert!(reg.is_valid(EntityId(1)));
    }

    #[test]
    fn free_list_is_fifo() {
        let mut reg = Registry::new();
        for _ in 0..6 {
            reg.create_id(staged(), ()).unwrap();
        }
        for id in [4, 1, 3] {
            assert!(reg.erase(EntityId(id)));
        }
        let recycled: Vec<u32> = (0..3).map(|_| reg.create_id(staged(), ()).unwrap().0).collect();
        assert_eq!(recycled, vec![4, 1, 3]);
        assert_eq!(reg.create_id(staged(), ()), Some(EntityId(6)));
    }

    #[test]
    fn invalid_store_is_rejected_on_create() {
        let mut reg = Registry::new();
        assert!(reg.create_id(Location::destroyed(), ()).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn set_location_to_invalid_destroys() {
        let mut reg = Registry::new();
        let h = reg.create_handle(Location::pending(StoreId(3)), ()).unwrap();
        assert_eq!(reg.location(h), Some(Location::pending(StoreId(3))));
        assert!(reg.set_location(h, Location::at(StoreId(3), 0)));
        assert_eq!(reg.location(h.id()), Some(Location::at(StoreId(3), 0)));
        assert!(reg.set_location(h, Location::destroyed()));
        assert!(!reg.is_valid(h));
        assert!(!reg.erase(h), "double erase fails");
        assert!(reg.location(h).is_none());
    }

    #[test]
    fn erase_if_sweeps_staged_entities() {
        let mut reg = Registry::new();
        let a = reg.create_id(staged(), ()).unwrap();
        let b = reg.create_id(Location::at(StoreId(1), 0), ()).unwrap();
        let c = reg.create_id(staged(), ()).unwrap();
        let erased = reg.erase_if(|_, record| record.location().is_some_and(|l| l.is_staged()));
        assert_eq!(erased, 2);
        assert!(!reg.is_alive(a));
        assert!(reg.is_alive(b));
        assert!(!reg.is_alive(c));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn metadata_is_stored_and_reset() {
        let mut reg = EntityRegistry::<Tagged>::new();
        let h = reg.create_handle(Location::staged(), "player").unwrap();
        assert_eq!(reg.metadata(h), Some(&"player"));
        *reg.metadata_mut(h).unwrap() = "boss";
        assert_eq!(reg.iter().next().map(|(_, r)| *r.metadata()), Some("boss"));
        assert!(reg.erase(h));
        assert_eq!(reg.metadata(h), None);
        let next = reg.create_handle(Location::staged(), "").unwrap();
        assert_eq!(next.id(), h.id());
        assert_eq!(reg.metadata(next), Some(&""));
    }

    #[test]
    fn narrow_generation_wraps() {
        let mut reg = EntityRegistry::<Tagged>::new();
        let first = reg.create_handle(Location::staged(), "").unwrap();
        let mut last = first;
        for _ in 0..256 {
            assert!(reg.erase(last));
            last = reg.create_handle(Location::staged(), "").unwrap();
        }
        assert_eq!(last.id(), first.id());
        assert_eq!(last.generation(), first.generation());
        assert!(reg.is_valid(first), "wrapped generation collides");
    }

    #[test]
    fn unchecked_handles_cannot_detect_reuse() {
        let mut reg = EntityRegistry::<UncheckedConfig>::new();
        let old = reg.create_handle(Location::staged(), ()).unwrap();
        assert!(reg.erase(old));
        assert!(!reg.is_valid(old));
        let new = reg.create_handle(Location::staged(), ()).unwrap();
        assert_eq!(old, new);
        assert!(reg.is_valid(old));
    }

    #[test]
    fn prefill_queues_slots_in_order() {
        let mut reg = Registry::new();
        reg.reserve(8, true);
        assert!(reg.capacity() >= 8);
        assert!(reg.is_empty());
        assert_eq!(reg.max_id(), None);
        let ids: Vec<u32> = (0..8).map(|_| reg.create_id(staged(), ()).unwrap().0).collect();
        assert_eq!(ids, (0..8).collect::<Vec<_>>());
        assert_eq!(reg.create_id(staged(), ()), Some(EntityId(8)));
    }

    #[test]
    fn lowering_id_limit_trims_dead_slots() {
        let mut reg = Registry::new();
        for _ in 0..6 {
            reg.create_id(staged(), ()).unwrap();
        }
        assert!(!reg.set_id_limit(3), "entity 5 is still alive");
        for id in [5, 1, 4, 3] {
            reg.erase(EntityId(id));
        }
        assert!(reg.set_id_limit(3));
        assert_eq!(reg.id_limit(), 3);
        assert_eq!(reg.create_id(staged(), ()), Some(EntityId(1)));
        assert_eq!(reg.create_id(staged(), ()), None);
    }

    #[test]
    fn shrink_to_fit_drops_trailing_dead_slots() {
        let mut reg = Registry::new();
        for _ in 0..5 {
            reg.create_id(staged(), ()).unwrap();
        }
        for id in [3, 1, 4] {
            reg.erase(EntityId(id));
        }
        reg.shrink_to_fit();
        assert_eq!(reg.max_id(), Some(EntityId(2)));
        assert_eq!(reg.create_id(staged(), ()), Some(EntityId(1)));
        assert_eq!(reg.create_id(staged(), ()), Some(EntityId(3)));
    }

    #[test]
    fn clear_keeps_generations_unless_shrinking() {
        let mut reg = Registry::new();
        let h = reg.create_handle(staged(), ()).unwrap();
        reg.create_handle(staged(), ()).unwrap();
        reg.clear(false);
        assert!(reg.is_empty());
        let again = reg.create_handle(staged(), ()).unwrap();
        assert_eq!(again.id(), h.id());
        assert!(!reg.is_valid(h));

        reg.clear(true);
        assert_eq!(reg.max_id(), None);
        let fresh = reg.create_handle(staged(), ()).unwrap();
        assert_eq!(fresh, h, "generations restart after a shrinking clear");
    }

    #[test]
    fn settings_apply_limit_and_prefill() {
        let settings = RegistrySettings {
            id_limit: Some(2),
            reserve: 2,
            prefill: true,
        };
        let mut reg = Registry::with_settings(&settings);
        assert_eq!(reg.id_limit(), 2);
        assert!(reg.create_id(staged(), ()).is_some());
        assert!(reg.create_id(staged(), ()).is_some());
        assert!(reg.create_id(staged(), ()).is_none());
    }

    #[test]
    fn handle_lookup_reflects_current_generation() {
        let mut reg = Registry::new();
        let id = reg.create_id(staged(), ()).unwrap();
        assert_eq!(reg.handle(id).map(|h| h.generation()), Some(0));
        reg.erase(id);
        assert!(reg.handle(id).is_none());
        assert!(reg.handle(EntityId::INVALID).is_none());
    }
}
