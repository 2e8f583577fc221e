//! Dense storage for a single component type.
//!
//! Components live in one `Vec<T>` with a parallel `Vec` of handles, so row
//! `i` always belongs to `handles[i]`. The registry maps each entity to its
//! row; removal is swap-and-pop and re-points the moved entity.

use std::fmt;
use std::ops::{Index, IndexMut};

use tracing::{debug, trace};

use crate::config::{DefaultConfig, RegistryConfig, StorageSettings};
use crate::entity::{ensure_storage_id, Handle, Location, SequentialId};
use crate::registry::{EntityKey, EntityRegistry};
use crate::EcsError;

/// One component of type `T` per housed entity, packed densely.
pub struct ComponentStorage<T, C: RegistryConfig = DefaultConfig> {
    store_id: C::StoreId,
    limit: usize,
    components: Vec<T>,
    handles: Vec<Handle<C>>,
}

impl<T, C: RegistryConfig> ComponentStorage<T, C> {
    /// Create an empty storage identified by `store_id`.
    ///
    /// Fails if `store_id` is the staging store or `INVALID`.
    pub fn new(store_id: C::StoreId) -> Result<Self, EcsError> {
        Ok(Self {
            store_id: ensure_storage_id(store_id)?,
            limit: usize::MAX,
            components: Vec::new(),
            handles: Vec::new(),
        })
    }

    /// Create a storage and apply `settings` to it.
    pub fn with_settings(
        store_id: C::StoreId,
        settings: &StorageSettings,
    ) -> Result<Self, EcsError> {
        let mut storage = Self::new(store_id)?;
        storage.set_limit(settings.limit.unwrap_or(usize::MAX));
        storage.reserve(settings.reserve);
        Ok(storage)
    }

    /// The ID this storage is known by in the registry.
    #[inline]
    pub fn store_id(&self) -> C::StoreId {
        self.store_id
    }

    /// Maximum number of entities this storage accepts.
    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Cap the number of housed entities.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    /// Number of housed entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether no entity is housed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Rows that fit in both columns without allocating.
    pub fn capacity(&self) -> usize {
        self.components.capacity().min(self.handles.capacity())
    }

    /// Make room for `additional` more rows.
    pub fn reserve(&mut self, additional: usize) {
        self.components.reserve(additional);
        self.handles.reserve(additional);
    }

    /// Release unused memory.
    pub fn shrink_to_fit(&mut self) {
        self.components.shrink_to_fit();
        self.handles.shrink_to_fit();
    }

    /// Handles of the housed entities, in row order.
    #[inline]
    pub fn handles(&self) -> &[Handle<C>] {
        &self.handles
    }

    /// The packed components, in row order.
    #[inline]
    pub fn components(&self) -> &[T] {
        &self.components
    }

    /// The packed components, mutably. Rows cannot be added or removed
    /// through the slice, so handles stay aligned.
    #[inline]
    pub fn components_mut(&mut self) -> &mut [T] {
        &mut self.components
    }

    /// `(handle, component)` pairs in row order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (Handle<C>, &T)> + ExactSizeIterator + '_ {
        self.handles.iter().copied().zip(self.components.iter())
    }

    /// `(handle, component)` pairs in row order, with mutable components.
    pub fn iter_mut(
        &mut self,
    ) -> impl DoubleEndedIterator<Item = (Handle<C>, &mut T)> + ExactSizeIterator + '_ {
        self.handles.iter().copied().zip(self.components.iter_mut())
    }

    // -- lookup -------------------------------------------------------------

    /// Row of the entity named by `key`, if housed here.
    pub fn index_of(&self, registry: &EntityRegistry<C>, key: impl EntityKey<C>) -> Option<usize> {
        let id = key.resolve(registry)?;
        let location = registry.location_of(id)?;
        if location.store_id != self.store_id {
            return None;
        }
        let index = location.index?;
        (self.handles.get(index).map(|h| h.id()) == Some(id)).then_some(index)
    }

    /// Whether the entity named by `key` is housed here.
    #[inline]
    pub fn contains(&self, registry: &EntityRegistry<C>, key: impl EntityKey<C>) -> bool {
        self.index_of(registry, key).is_some()
    }

    /// Component of the entity named by `key`, if housed here.
    pub fn get(&self, registry: &EntityRegistry<C>, key: impl EntityKey<C>) -> Option<&T> {
        let index = self.index_of(registry, key)?;
        Some(&self.components[index])
    }

    /// Component of the entity named by `key`, mutably.
    pub fn get_mut(&mut self, registry: &EntityRegistry<C>, key: impl EntityKey<C>) -> Option<&mut T> {
        let index = self.index_of(registry, key)?;
        Some(&mut self.components[index])
    }

    /// Checked access that explains a miss.
    pub fn at<K: EntityKey<C>>(&self, registry: &EntityRegistry<C>, key: K) -> Result<&T, EcsError> {
        match self.index_of(registry, key) {
            Some(index) => Ok(&self.components[index]),
            None => Err(self.miss(registry, key)),
        }
    }

    /// Mutable variant of [`at`](Self::at).
    pub fn at_mut<K: EntityKey<C>>(
        &mut self,
        registry: &EntityRegistry<C>,
        key: K,
    ) -> Result<&mut T, EcsError> {
        match self.index_of(registry, key) {
            Some(index) => Ok(&mut self.components[index]),
            None => Err(self.miss(registry, key)),
        }
    }

    fn miss<K: EntityKey<C>>(&self, registry: &EntityRegistry<C>, key: K) -> EcsError {
        let id = key.id().index();
        if registry.is_valid(key) {
            EcsError::NotHoused {
                id,
                store_id: self.store_id.index(),
            }
        } else {
            EcsError::StaleEntity { id }
        }
    }

    // -- insertion ----------------------------------------------------------

    /// Add `component` for the entity named by `key`.
    ///
    /// The entity must be pending in this storage, i.e. its location names
    /// this store with no row yet (see [`Location::pending`]). Staged
    /// entities and entities pending elsewhere are refused, as are invalid or
    /// already housed ones. Fails as well when the storage is full.
    pub fn add(
        &mut self,
        registry: &mut EntityRegistry<C>,
        key: impl EntityKey<C>,
        component: T,
    ) -> bool {
        let Some(id) = key.resolve(registry) else {
            debug!(entity = ?key.id(), "add rejected: entity is not valid");
            return false;
        };
        if self.components.len() >= self.limit {
            debug!(store = ?self.store_id, limit = self.limit, "storage limit reached");
            return false;
        }
        let (Some(location), Some(handle)) = (registry.location_of(id), registry.handle(id)) else {
            return false;
        };
        if !location.is_pending_in(self.store_id) {
            debug!(
                entity = ?id,
                store = ?self.store_id,
                location = ?location,
                "add rejected: entity is not pending in this storage"
            );
            return false;
        }
        let index = self.components.len();
        self.components.push(component);
        self.handles.push(handle);
        registry.relocate(id, Location::at(self.store_id, index));
        true
    }

    /// Create an entity in the registry and add `component` for it.
    pub fn add_new(
        &mut self,
        registry: &mut EntityRegistry<C>,
        metadata: C::Metadata,
        component: T,
    ) -> Option<Handle<C>> {
        if self.components.len() >= self.limit {
            debug!(store = ?self.store_id, limit = self.limit, "storage limit reached");
            return None;
        }
        let handle = registry.create_handle(Location::pending(self.store_id), metadata)?;
        if !self.add(registry, handle, component) {
            registry.erase(handle);
            return None;
        }
        Some(handle)
    }

    // -- removal ------------------------------------------------------------

    /// Remove the entity named by `key` and return its component, leaving
    /// the entity pending in `new_store_id`.
    pub fn take(
        &mut self,
        registry: &mut EntityRegistry<C>,
        key: impl EntityKey<C>,
        new_store_id: C::StoreId,
    ) -> Option<T> {
        let index = self.index_of(registry, key)?;
        let (handle, component) = self.remove_at(registry, index);
        registry.relocate(handle.id(), Location::pending(new_store_id));
        Some(component)
    }

    /// Remove the entity named by `key`, leaving it pending in
    /// `new_store_id`.
    pub fn remove(
        &mut self,
        registry: &mut EntityRegistry<C>,
        key: impl EntityKey<C>,
        new_store_id: C::StoreId,
    ) -> bool {
        self.take(registry, key, new_store_id).is_some()
    }

    /// Remove the entity named by `key` and destroy it.
    pub fn erase(&mut self, registry: &mut EntityRegistry<C>, key: impl EntityKey<C>) -> bool {
        self.remove(registry, key, C::StoreId::INVALID)
    }

    /// Erase every entity whose component satisfies `pred`.
    pub fn erase_if<F>(&mut self, registry: &mut EntityRegistry<C>, mut pred: F) -> usize
    where
        F: FnMut(&T, C::Id) -> bool,
    {
        let mut erased = 0;
        let mut index = 0;
        while index < self.components.len() {
            if pred(&self.components[index], self.handles[index].id()) {
                let (handle, _) = self.remove_at(registry, index);
                registry.relocate(handle.id(), Location::destroyed());
                erased += 1;
            } else {
                index += 1;
            }
        }
        erased
    }

    /// Remove every entity, leaving each pending in `new_store_id`.
    pub fn remove_all(&mut self, registry: &mut EntityRegistry<C>, new_store_id: C::StoreId) -> usize {
        let removed = self.handles.len();
        for handle in self.handles.drain(..) {
            registry.relocate(handle.id(), Location::pending(new_store_id));
        }
        self.components.clear();
        removed
    }

    /// Erase every housed entity.
    pub fn clear(&mut self, registry: &mut EntityRegistry<C>) -> usize {
        self.remove_all(registry, C::StoreId::INVALID)
    }

    fn remove_at(&mut self, registry: &mut EntityRegistry<C>, index: usize) -> (Handle<C>, T) {
        let handle = self.handles.swap_remove(index);
        let component = self.components.swap_remove(index);
        if let Some(moved) = self.handles.get(index) {
            registry.relocate(moved.id(), Location::at(self.store_id, index));
            trace!(entity = ?moved.id(), index, "component moved by swap-and-pop");
        }
        (handle, component)
    }
}

/// Positional access by row index, not by entity.
///
/// `storage[i]` is the component of `storage.handles()[i]`. Panics if `i` is
/// out of range. Entity-keyed access goes through [`get`] or [`at`]; turn an
/// entity into a row with [`index_of`].
///
/// [`get`]: ComponentStorage::get
/// [`at`]: ComponentStorage::at
/// [`index_of`]: ComponentStorage::index_of
impl<T, C: RegistryConfig> Index<usize> for ComponentStorage<T, C> {
    type Output = T;

    #[inline]
    fn index(&self, index: usize) -> &T {
        &self.components[index]
    }
}

impl<T, C: RegistryConfig> IndexMut<usize> for ComponentStorage<T, C> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.components[index]
    }
}

impl<T: fmt::Debug, C: RegistryConfig> fmt::Debug for ComponentStorage<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentStorage")
            .field("store_id", &self.store_id)
            .field("limit", &self.limit)
            .field("handles", &self.handles)
            .field("components", &self.components)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityId, StoreId};

    type Health = ComponentStorage<i32>;

    fn pending(reg: &mut EntityRegistry) -> Handle<DefaultConfig> {
        reg.create_handle(Location::pending(StoreId(1)), ()).unwrap()
    }

    #[test]
    fn swap_and_pop_moves_last_into_hole() {
        let mut reg = EntityRegistry::new();
        let mut health = Health::new(StoreId(1)).unwrap();
        let [a, b, c] = [pending(&mut reg), pending(&mut reg), pending(&mut reg)];
        assert!(health.add(&mut reg, a, 10));
        assert!(health.add(&mut reg, b, 20));
        assert!(health.add(&mut reg, c, 30));

        assert!(health.remove(&mut reg, a, StoreId::ZERO));
        assert_eq!(health.components(), &[30, 20]);
        assert_eq!(health.handles(), &[c, b]);
        assert_eq!(reg.location(c).and_then(|l| l.index), Some(0));
        assert_eq!(reg.location(a), Some(Location::staged()));
        assert_eq!(health[0], 30);

        assert!(!health.add(&mut reg, a, 40), "staged in store 0");
        assert!(health.remove(&mut reg, b, StoreId(1)));
        assert!(health.add(&mut reg, b, 20));
        assert_eq!(health.handles(), &[c, b]);
    }

    #[test]
    fn add_preconditions() {
        let mut reg = EntityRegistry::new();
        let mut health = Health::new(StoreId(1)).unwrap();
        let other = reg.create_handle(Location::pending(StoreId(2)), ()).unwrap();
        let first = pending(&mut reg);
        let second = pending(&mut reg);

        assert!(!health.add(&mut reg, other, 1), "pending elsewhere");
        assert!(health.add(&mut reg, first, 2));
        assert!(health.add(&mut reg, second.id(), 3));
        assert!(!health.add(&mut reg, second, 4), "already housed");
        assert!(reg.erase(other));
        assert!(!health.add(&mut reg, other, 5), "stale handle");
        assert_eq!(health.len(), 2);
    }

    #[test]
    fn add_rejects_entity_staged_in_store_zero() {
        let mut reg = EntityRegistry::new();
        let mut health = Health::new(StoreId(1)).unwrap();
        let staged = reg.create_handle(Location::staged(), ()).unwrap();

        assert!(!health.add(&mut reg, staged, 1));
        assert!(!health.add(&mut reg, staged.id(), 1));
        assert!(health.is_empty());
        assert_eq!(reg.location(staged), Some(Location::staged()));

        assert!(reg.set_location(staged, Location::pending(StoreId(1))));
        assert!(health.add(&mut reg, staged, 1));
        assert_eq!(reg.location(staged), Some(Location::at(StoreId(1), 0)));
    }

    #[test]
    fn index_is_by_row_not_by_entity() {
        let mut reg = EntityRegistry::new();
        let mut health = Health::new(StoreId(1)).unwrap();
        let handles: Vec<_> = (0..4)
            .map(|hp| health.add_new(&mut reg, (), hp * 10).unwrap())
            .collect();
        assert!(health.erase(&mut reg, handles[0]));

        // Row 0 now holds the entity that was last.
        assert_eq!(health[0], 30);
        assert_eq!(health.handles()[0], handles[3]);
        for &h in &handles[1..] {
            let row = health.index_of(&reg, h).unwrap();
            assert_eq!(health[row], *health.get(&reg, h).unwrap());
        }

        let row = health.index_of(&reg, handles[2]).unwrap();
        health[row] += 1;
        assert_eq!(health.get(&reg, handles[2]), Some(&21));
    }

    #[test]
    fn ids_and_handles_both_resolve() {
        let mut reg = EntityRegistry::new();
        let mut health = Health::new(StoreId(1)).unwrap();
        let h = health.add_new(&mut reg, (), 7).unwrap();
        assert_eq!(health.get(&reg, h), Some(&7));
        assert_eq!(health.get(&reg, h.id()), Some(&7));
        *health.get_mut(&reg, h).unwrap() += 1;
        assert_eq!(*health.at(&reg, h).unwrap(), 8);
        *health.at_mut(&reg, h.id()).unwrap() = 9;
        assert_eq!(health.index_of(&reg, h), Some(0));

        assert!(health.erase(&mut reg, h));
        assert!(!reg.is_valid(h));
        assert!(health.get(&reg, h).is_none());
        assert!(matches!(health.at(&reg, h), Err(EcsError::StaleEntity { .. })));

        let recycled = reg.create_handle(Location::staged(), ()).unwrap();
        assert_eq!(recycled.id(), h.id());
        assert!(matches!(
            health.at(&reg, recycled),
            Err(EcsError::NotHoused { store_id: 1, .. })
        ));
        assert!(!health.contains(&reg, EntityId(42)));
    }

    #[test]
    fn take_moves_component_out() {
        let mut reg = EntityRegistry::new();
        let mut health = Health::new(StoreId(1)).unwrap();
        let h = health.add_new(&mut reg, (), 5).unwrap();
        assert_eq!(health.take(&mut reg, h, StoreId(2)), Some(5));
        assert_eq!(reg.location(h), Some(Location::pending(StoreId(2))));
        assert_eq!(health.take(&mut reg, h, StoreId(2)), None);
    }

    #[test]
    fn erase_if_and_iteration() {
        let mut reg = EntityRegistry::new();
        let mut health = Health::new(StoreId(1)).unwrap();
        let handles: Vec<_> = (0..6)
            .map(|hp| health.add_new(&mut reg, (), hp).unwrap())
            .collect();

        assert_eq!(health.erase_if(&mut reg, |hp, _| *hp < 3), 3);
        assert_eq!(reg.len(), 3);
        for (index, (handle, _)) in health.iter().enumerate() {
            assert_eq!(reg.location(handle).and_then(|l| l.index), Some(index));
        }
        for (_, hp) in health.iter_mut() {
            *hp *= 10;
        }
        let mut values: Vec<i32> = health.components().to_vec();
        values.sort_unstable();
        assert_eq!(values, vec![30, 40, 50]);
        assert!(!reg.is_valid(handles[0]));
    }

    #[test]
    fn limit_and_bulk_removal() {
        let mut reg = EntityRegistry::new();
        let mut health = Health::with_settings(
            StoreId(1),
            &StorageSettings {
                limit: Some(2),
                reserve: 4,
            },
        )
        .unwrap();
        assert!(health.capacity() >= 4);
        assert!(health.add_new(&mut reg, (), 1).is_some());
        assert!(health.add_new(&mut reg, (), 2).is_some());
        assert!(health.add_new(&mut reg, (), 3).is_none());
        assert_eq!(reg.len(), 2);

        assert_eq!(health.remove_all(&mut reg, StoreId::ZERO), 2);
        assert!(health.is_empty());
        assert_eq!(reg.len(), 2, "remove_all keeps entities alive");

        let h = health.add_new(&mut reg, (), 4).unwrap();
        assert_eq!(health.clear(&mut reg), 1);
        assert!(!reg.is_valid(h));
    }

    #[test]
    fn reserved_store_ids_are_refused() {
        assert!(Health::new(StoreId::ZERO).is_err());
        assert!(Health::new(StoreId::INVALID).is_err());
    }
}
