//! Dense struct-of-arrays storage for one archetype.
//!
//! An [`ArchetypeStorage`] keeps one column per component type of its
//! [`Archetype`] plus a parallel `ids` column, all index-aligned: row `i`
//! holds the components of entity `ids[i]`. The registry records, for every
//! housed entity, `Location { store_id, index: Some(i) }`.
//!
//! The physical placement of rows is delegated to a [`RowLayout`]. [`Dense`]
//! keeps one contiguous `Vec` per component; the chunked layout in
//! [`chunked_archetype_storage`](crate::chunked_archetype_storage) groups
//! rows into fixed-size blocks. Both share every algorithm below, so their
//! observable behaviour is identical.
//!
//! Removal is swap-and-pop across every column in lock-step, followed by a
//! registry update for the row that moved.

use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;

use tracing::{debug, trace};

use crate::archetype::{Archetype, ComponentAt};
use crate::config::{DefaultConfig, RegistryConfig, StorageSettings};
use crate::entity::{ensure_storage_id, Handle, Location, SequentialId};
use crate::registry::{EntityKey, EntityRegistry};
use crate::EcsError;

// ---------------------------------------------------------------------------
// RowLayout
// ---------------------------------------------------------------------------

/// Physical placement of an archetype's rows.
///
/// Rows are addressed by a dense logical index `0..len()`. [`locate`]
/// translates it into the column set holding the row and the slot inside
/// that column set.
///
/// [`locate`]: RowLayout::locate
pub trait RowLayout<A: Archetype>: Default {
    /// Number of rows.
    fn len(&self) -> usize;

    /// Whether there are no rows.
    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows that fit without allocating.
    fn capacity(&self) -> usize;

    /// Make room for `additional` more rows.
    fn reserve(&mut self, additional: usize);

    /// Append a row at index `len()`.
    fn push(&mut self, row: A);

    /// Remove row `index`, moving the last row into its place.
    fn swap_remove(&mut self, index: usize) -> A;

    /// Column set and slot of row `index`.
    fn locate(&self, index: usize) -> (&A::Columns, usize);

    /// Column set and slot of row `index`, mutably.
    fn locate_mut(&mut self, index: usize) -> (&mut A::Columns, usize);

    /// Drop every row.
    fn clear(&mut self);

    /// Release unused memory.
    fn shrink_to_fit(&mut self);
}

/// One contiguous `Vec` per component type.
pub struct Dense<A: Archetype> {
    columns: A::Columns,
}

impl<A: Archetype> Dense<A> {
    /// The column set.
    #[inline]
    pub fn columns(&self) -> &A::Columns {
        &self.columns
    }
}

impl<A: Archetype> Default for Dense<A> {
    fn default() -> Self {
        Self {
            columns: A::with_capacity(0),
        }
    }
}

impl<A: Archetype> RowLayout<A> for Dense<A> {
    #[inline]
    fn len(&self) -> usize {
        A::len(&self.columns)
    }

    #[inline]
    fn capacity(&self) -> usize {
        A::capacity(&self.columns)
    }

    fn reserve(&mut self, additional: usize) {
        A::reserve(&mut self.columns, additional);
    }

    #[inline]
    fn push(&mut self, row: A) {
        A::push(&mut self.columns, row);
    }

    #[inline]
    fn swap_remove(&mut self, index: usize) -> A {
        A::swap_remove(&mut self.columns, index)
    }

    #[inline]
    fn locate(&self, index: usize) -> (&A::Columns, usize) {
        (&self.columns, index)
    }

    #[inline]
    fn locate_mut(&mut self, index: usize) -> (&mut A::Columns, usize) {
        (&mut self.columns, index)
    }

    fn clear(&mut self) {
        A::clear(&mut self.columns);
    }

    fn shrink_to_fit(&mut self) {
        A::shrink_to_fit(&mut self.columns);
    }
}

// ---------------------------------------------------------------------------
// ArchetypeStorage
// ---------------------------------------------------------------------------

/// Dense storage for every entity of archetype `A`.
///
/// `C` is the registry configuration the storage is bound to and `L` the
/// physical layout. All mutating operations take the registry explicitly so
/// that entity locations are updated before they return.
pub struct ArchetypeStorage<A, C = DefaultConfig, L = Dense<A>>
where
    A: Archetype,
    C: RegistryConfig,
    L: RowLayout<A>,
{
    store_id: C::StoreId,
    limit: usize,
    ids: Vec<C::Id>,
    layout: L,
    _archetype: PhantomData<fn() -> A>,
}

impl<A, C, L> ArchetypeStorage<A, C, L>
where
    A: Archetype,
    C: RegistryConfig,
    L: RowLayout<A>,
{
    /// Create an empty storage identified by `store_id`.
    ///
    /// Fails if `store_id` is the staging store or `INVALID`.
    pub fn new(store_id: C::StoreId) -> Result<Self, EcsError> {
        Ok(Self {
            store_id: ensure_storage_id(store_id)?,
            limit: usize::MAX,
            ids: Vec::new(),
            layout: L::default(),
            _archetype: PhantomData,
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

    // -- configuration ------------------------------------------------------

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

    /// Cap the number of entities, independently of the registry's ID limit.
    ///
    /// Entities already housed beyond the new cap stay; only further adds
    /// are refused.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    // -- size and capacity --------------------------------------------------

    /// Number of housed entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether no entity is housed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Rows that fit in every column (and the ID column) without allocating.
    pub fn capacity(&self) -> usize {
        self.layout.capacity().min(self.id_capacity())
    }

    /// Make room for `additional` more rows.
    pub fn reserve(&mut self, additional: usize) {
        self.ids.reserve(additional);
        self.layout.reserve(additional);
    }

    /// Release unused memory.
    pub fn shrink_to_fit(&mut self) {
        self.ids.shrink_to_fit();
        self.layout.shrink_to_fit();
    }

    /// Housed entity IDs in row order.
    #[inline]
    pub fn ids(&self) -> &[C::Id] {
        &self.ids
    }

    #[inline]
    pub(crate) fn layout(&self) -> &L {
        &self.layout
    }

    #[inline]
    pub(crate) fn id_capacity(&self) -> usize {
        self.ids.capacity()
    }

    #[inline]
    pub(crate) fn split_mut(&mut self) -> (&[C::Id], &mut L) {
        (&self.ids, &mut self.layout)
    }

    // -- lookup -------------------------------------------------------------

    /// Row index of the entity named by `key`, if this storage houses it.
    pub fn index_of(&self, registry: &EntityRegistry<C>, key: impl EntityKey<C>) -> Option<usize> {
        let id = key.resolve(registry)?;
        let location = registry.location_of(id)?;
        if location.store_id != self.store_id {
            return None;
        }
        let index = location.index?;
        (self.ids.get(index) == Some(&id)).then_some(index)
    }

    /// Whether this storage houses the entity named by `key`.
    #[inline]
    pub fn contains(&self, registry: &EntityRegistry<C>, key: impl EntityKey<C>) -> bool {
        self.index_of(registry, key).is_some()
    }

    /// Borrow the components of the entity named by `key`.
    pub fn get(&self, registry: &EntityRegistry<C>, key: impl EntityKey<C>) -> Option<A::Refs<'_>> {
        let index = self.index_of(registry, key)?;
        let (columns, slot) = self.layout.locate(index);
        Some(A::get(columns, slot))
    }

    /// Mutably borrow the components of the entity named by `key`.
    pub fn get_mut(
        &mut self,
        registry: &EntityRegistry<C>,
        key: impl EntityKey<C>,
    ) -> Option<A::Muts<'_>> {
        let index = self.index_of(registry, key)?;
        let (columns, slot) = self.layout.locate_mut(index);
        Some(A::get_mut(columns, slot))
    }

    /// Checked access: like [`get`](Self::get) but explains a miss.
    pub fn at<K: EntityKey<C>>(
        &self,
        registry: &EntityRegistry<C>,
        key: K,
    ) -> Result<A::Refs<'_>, EcsError> {
        match self.index_of(registry, key) {
            Some(index) => {
                let (columns, slot) = self.layout.locate(index);
                Ok(A::get(columns, slot))
            }
            None => Err(self.miss(registry, key)),
        }
    }

    /// Checked mutable access.
    pub fn at_mut<K: EntityKey<C>>(
        &mut self,
        registry: &EntityRegistry<C>,
        key: K,
    ) -> Result<A::Muts<'_>, EcsError> {
        match self.index_of(registry, key) {
            Some(index) => {
                let (columns, slot) = self.layout.locate_mut(index);
                Ok(A::get_mut(columns, slot))
            }
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

    /// One component of the entity named by `key`, looked up by type.
    pub fn component<T: 'static>(
        &self,
        registry: &EntityRegistry<C>,
        key: impl EntityKey<C>,
    ) -> Option<&T> {
        let index = self.index_of(registry, key)?;
        let (columns, slot) = self.layout.locate(index);
        A::column_of::<T>(columns).map(|column| &column[slot])
    }

    /// One component of the entity named by `key`, mutably.
    pub fn component_mut<T: 'static>(
        &mut self,
        registry: &EntityRegistry<C>,
        key: impl EntityKey<C>,
    ) -> Option<&mut T> {
        let index = self.index_of(registry, key)?;
        let (columns, slot) = self.layout.locate_mut(index);
        A::column_of_mut::<T>(columns).map(|column| &mut column[slot])
    }

    // -- rows ---------------------------------------------------------------

    /// Row `index`, if in range.
    pub fn row(&self, index: usize) -> Option<Row<'_, A, C>> {
        (index < self.ids.len()).then(|| self.row_at(index))
    }

    fn row_at(&self, index: usize) -> Row<'_, A, C> {
        let (columns, slot) = self.layout.locate(index);
        Row {
            columns,
            slot,
            index,
            id: self.ids[index],
        }
    }

    /// Row `index` with mutable components, if in range.
    pub fn row_mut(&mut self, index: usize) -> Option<(C::Id, A::Muts<'_>)> {
        let id = *self.ids.get(index)?;
        let (columns, slot) = self.layout.locate_mut(index);
        Some((id, A::get_mut(columns, slot)))
    }

    /// Iterate over all rows in storage order.
    #[inline]
    pub fn rows(&self) -> Rows<'_, A, C, L> {
        Rows {
            storage: self,
            front: 0,
            back: self.ids.len(),
        }
    }

    /// Call `f` with every entity and mutable access to its components.
    pub fn for_each_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(C::Id, A::Muts<'_>),
    {
        for index in 0..self.ids.len() {
            let id = self.ids[index];
            let (columns, slot) = self.layout.locate_mut(index);
            f(id, A::get_mut(columns, slot));
        }
    }

    // -- insertion ----------------------------------------------------------

    /// Create an entity in the registry and add it with `row`.
    ///
    /// Returns `None` if the storage limit or the registry's ID limit is
    /// reached.
    pub fn add_new(
        &mut self,
        registry: &mut EntityRegistry<C>,
        metadata: C::Metadata,
        row: A,
    ) -> Option<Handle<C>> {
        if self.ids.len() >= self.limit {
            debug!(store = ?self.store_id, limit = self.limit, "storage limit reached");
            return None;
        }
        let handle = registry.create_handle(Location::pending(self.store_id), metadata)?;
        if !self.add(registry, handle, row) {
            registry.erase(handle);
            return None;
        }
        Some(handle)
    }

    /// Add the entity named by `key` with its components.
    ///
    /// The entity must be pending in this storage, i.e. its location names
    /// this store with no row yet (see [`Location::pending`]). Staged
    /// entities and entities pending elsewhere are refused, as are invalid or
    /// already housed ones. Fails as well when the storage is full.
    pub fn add(&mut self, registry: &mut EntityRegistry<C>, key: impl EntityKey<C>, row: A) -> bool {
        let Some(id) = key.resolve(registry) else {
            debug!(entity = ?key.id(), "add rejected: entity is not valid");
            return false;
        };
        if self.ids.len() >= self.limit {
            debug!(store = ?self.store_id, limit = self.limit, "storage limit reached");
            return false;
        }
        let Some(location) = registry.location_of(id) else {
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
        let index = self.ids.len();
        self.ids.push(id);
        self.layout.push(row);
        registry.relocate(id, Location::at(self.store_id, index));
        true
    }

    // -- removal ------------------------------------------------------------

    /// Remove the entity named by `key` and return its components.
    ///
    /// The entity is left pending in `new_store_id` (staged when it is the
    /// staging store, destroyed when it is `INVALID`).
    pub fn take(
        &mut self,
        registry: &mut EntityRegistry<C>,
        key: impl EntityKey<C>,
        new_store_id: C::StoreId,
    ) -> Option<A> {
        let index = self.index_of(registry, key)?;
        let (id, row) = self.remove_at(registry, index);
        registry.relocate(id, Location::pending(new_store_id));
        Some(row)
    }

    /// Remove the entity named by `key`, leaving it pending in
    /// `new_store_id`. Returns `false` if this storage does not house it.
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

    /// Remove every entity, leaving each pending in `new_store_id`.
    ///
    /// Returns the number of entities removed.
    pub fn remove_all(&mut self, registry: &mut EntityRegistry<C>, new_store_id: C::StoreId) -> usize {
        let removed = self.ids.len();
        for id in self.ids.drain(..) {
            registry.relocate(id, Location::pending(new_store_id));
        }
        self.layout.clear();
        removed
    }

    /// Erase (destroy) every housed entity. Returns the number erased.
    pub fn clear(&mut self, registry: &mut EntityRegistry<C>) -> usize {
        self.remove_all(registry, C::StoreId::INVALID)
    }

    /// Erase every entity whose component of type `T` satisfies `pred`.
    ///
    /// Erases nothing if the archetype has no `T` column.
    pub fn erase_if_component<T, F>(&mut self, registry: &mut EntityRegistry<C>, mut pred: F) -> usize
    where
        T: 'static,
        F: FnMut(&T, C::Id) -> bool,
    {
        let Some(position) = A::position_of::<T>() else {
            debug!(
                component = std::any::type_name::<T>(),
                "archetype has no such component"
            );
            return 0;
        };
        self.sweep(registry, |storage, index| {
            let (columns, slot) = storage.layout.locate(index);
            A::column_any(columns, position)
                .and_then(|column| column.downcast_ref::<Vec<T>>())
                .is_some_and(|column| pred(&column[slot], storage.ids[index]))
        })
    }

    /// Erase every entity whose component in column `N` satisfies `pred`.
    pub fn erase_if_column<const N: usize, F>(
        &mut self,
        registry: &mut EntityRegistry<C>,
        mut pred: F,
    ) -> usize
    where
        A: ComponentAt<N>,
        F: FnMut(&<A as ComponentAt<N>>::Component, C::Id) -> bool,
    {
        self.sweep(registry, |storage, index| {
            let (columns, slot) = storage.layout.locate(index);
            pred(&<A as ComponentAt<N>>::column(columns)[slot], storage.ids[index])
        })
    }

    /// Erase every entity whose row satisfies `pred`.
    pub fn erase_if<F>(&mut self, registry: &mut EntityRegistry<C>, mut pred: F) -> usize
    where
        F: FnMut(Row<'_, A, C>) -> bool,
    {
        self.sweep(registry, |storage, index| pred(storage.row_at(index)))
    }

    /// Erase every row for which `hit` holds, re-testing each slot after a
    /// swap-and-pop moved another row into it.
    fn sweep<F>(&mut self, registry: &mut EntityRegistry<C>, mut hit: F) -> usize
    where
        F: FnMut(&Self, usize) -> bool,
    {
        let mut erased = 0;
        let mut index = 0;
        while index < self.ids.len() {
            if hit(self, index) {
                let (id, _) = self.remove_at(registry, index);
                registry.relocate(id, Location::destroyed());
                erased += 1;
            } else {
                index += 1;
            }
        }
        erased
    }

    /// Swap-and-pop row `index`. The caller decides the removed entity's new
    /// location; the entity moved into `index` is relocated here.
    fn remove_at(&mut self, registry: &mut EntityRegistry<C>, index: usize) -> (C::Id, A) {
        let id = self.ids.swap_remove(index);
        let row = self.layout.swap_remove(index);
        if let Some(&moved) = self.ids.get(index) {
            registry.relocate(moved, Location::at(self.store_id, index));
            trace!(entity = ?moved, index, "row moved by swap-and-pop");
        }
        (id, row)
    }
}

impl<A: Archetype, C: RegistryConfig> ArchetypeStorage<A, C, Dense<A>> {
    /// The column set.
    #[inline]
    pub fn columns(&self) -> &A::Columns {
        self.layout.columns()
    }

    /// The whole column of components of type `T`.
    pub fn column<T: 'static>(&self) -> Option<&[T]> {
        A::column_of::<T>(&self.layout.columns).map(Vec::as_slice)
    }

    /// The whole column of components of type `T`, mutably.
    pub fn column_mut<T: 'static>(&mut self) -> Option<&mut [T]> {
        A::column_of_mut::<T>(&mut self.layout.columns).map(Vec::as_mut_slice)
    }

    /// Column `N`, checked at compile time.
    pub fn column_at<const N: usize>(&self) -> &[<A as ComponentAt<N>>::Component]
    where
        A: ComponentAt<N>,
    {
        <A as ComponentAt<N>>::column(&self.layout.columns)
    }
}

impl<A, C, L> fmt::Debug for ArchetypeStorage<A, C, L>
where
    A: Archetype,
    C: RegistryConfig,
    L: RowLayout<A>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchetypeStorage")
            .field("store_id", &self.store_id)
            .field("len", &self.ids.len())
            .field("limit", &self.limit)
            .field("components", &A::COUNT)
            .finish()
    }
}

impl<'a, A, C, L> IntoIterator for &'a ArchetypeStorage<A, C, L>
where
    A: Archetype,
    C: RegistryConfig,
    L: RowLayout<A>,
{
    type Item = Row<'a, A, C>;
    type IntoIter = Rows<'a, A, C, L>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows()
    }
}

// ---------------------------------------------------------------------------
// Row
// ---------------------------------------------------------------------------

/// Read-only view of one row, borrowed from its storage.
///
/// Components are reachable by type ([`component`](Self::component)), by
/// position ([`at`](Self::at)) or all at once ([`get`](Self::get)).
pub struct Row<'a, A: Archetype, C: RegistryConfig> {
    columns: &'a A::Columns,
    slot: usize,
    index: usize,
    id: C::Id,
}

impl<'a, A: Archetype, C: RegistryConfig> Row<'a, A, C> {
    /// Logical row index inside the storage.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The entity this row belongs to.
    #[inline]
    pub fn id(&self) -> C::Id {
        self.id
    }

    /// All components of the row.
    #[inline]
    pub fn get(&self) -> A::Refs<'a> {
        A::get(self.columns, self.slot)
    }

    /// The component of type `T`, if the archetype has one.
    pub fn component<T: 'static>(&self) -> Option<&'a T> {
        A::column_of::<T>(self.columns).map(|column| &column[self.slot])
    }

    /// The component in column `N`.
    #[inline]
    pub fn at<const N: usize>(&self) -> &'a <A as ComponentAt<N>>::Component
    where
        A: ComponentAt<N>,
    {
        &<A as ComponentAt<N>>::column(self.columns)[self.slot]
    }
}

impl<A: Archetype, C: RegistryConfig> Clone for Row<'_, A, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: Archetype, C: RegistryConfig> Copy for Row<'_, A, C> {}

impl<A: Archetype, C: RegistryConfig> fmt::Debug for Row<'_, A, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Row")
            .field("index", &self.index)
            .field("id", &self.id)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// Double-ended iterator over the rows of an [`ArchetypeStorage`].
pub struct Rows<'a, A, C, L>
where
    A: Archetype,
    C: RegistryConfig,
    L: RowLayout<A>,
{
    storage: &'a ArchetypeStorage<A, C, L>,
    front: usize,
    back: usize,
}

impl<'a, A, C, L> Iterator for Rows<'a, A, C, L>
where
    A: Archetype,
    C: RegistryConfig,
    L: RowLayout<A>,
{
    type Item = Row<'a, A, C>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        let row = self.storage.row_at(self.front);
        self.front += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }
}

impl<A, C, L> DoubleEndedIterator for Rows<'_, A, C, L>
where
    A: Archetype,
    C: RegistryConfig,
    L: RowLayout<A>,
{
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        Some(self.storage.row_at(self.back))
    }
}

impl<A, C, L> ExactSizeIterator for Rows<'_, A, C, L>
where
    A: Archetype,
    C: RegistryConfig,
    L: RowLayout<A>,
{
}

impl<A, C, L> FusedIterator for Rows<'_, A, C, L>
where
    A: Archetype,
    C: RegistryConfig,
    L: RowLayout<A>,
{
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
