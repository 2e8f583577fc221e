//! Entity identifiers, generation counters, handles and locations.
//!
//! An entity is nothing but an ID. The ID type is any [`SequentialId`]: an
//! unsigned, densely numbered index whose maximum value is reserved as
//! [`SequentialId::INVALID`]. Store IDs use the same abstraction, with `0`
//! additionally reserved for the *staging* store.
//!
//! A [`Handle`] pairs an ID with the generation of its slot at the time the
//! handle was issued. The generation is bumped every time the slot is
//! destroyed, so a handle outlived by its entity is detected even after the
//! ID has been recycled.

use std::fmt;
use std::hash::{Hash, Hasher};

use tracing::debug;

use crate::config::RegistryConfig;
use crate::registry::{EntityKey, EntityRegistry};
use crate::EcsError;

// ---------------------------------------------------------------------------
// SequentialId
// ---------------------------------------------------------------------------

/// An opaque, unsigned, sequentially numbered identifier.
///
/// The maximum representable value is reserved as [`INVALID`](Self::INVALID)
/// and is never handed out as a real ID.
pub trait SequentialId:
    Copy + Eq + Ord + Hash + fmt::Debug + Send + Sync + 'static
{
    /// The reserved "no such ID" value (the backing type's maximum).
    const INVALID: Self;
    /// The first ID. For store IDs this is the staging store.
    const ZERO: Self;

    /// Convert a zero-based index into an ID.
    ///
    /// Returns `None` if the index does not fit or would collide with
    /// [`INVALID`](Self::INVALID).
    fn from_index(index: usize) -> Option<Self>;

    /// The zero-based index of this ID.
    fn index(self) -> usize;

    /// Whether this is anything other than [`INVALID`](Self::INVALID).
    #[inline]
    fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    /// The following ID, or `None` once the range is exhausted.
    #[inline]
    fn next(self) -> Option<Self> {
        if self == Self::INVALID {
            return None;
        }
        Self::from_index(self.index() + 1)
    }

    /// The preceding ID, or `None` below [`ZERO`](Self::ZERO).
    #[inline]
    fn prev(self) -> Option<Self> {
        if self == Self::INVALID {
            return None;
        }
        self.index().checked_sub(1).and_then(Self::from_index)
    }
}

macro_rules! impl_sequential_id_for_primitive {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl SequentialId for $ty {
                const INVALID: Self = <$ty>::MAX;
                const ZERO: Self = 0;

                #[inline]
                fn from_index(index: usize) -> Option<Self> {
                    <$ty>::try_from(index).ok().filter(|id| *id != <$ty>::MAX)
                }

                #[inline]
                fn index(self) -> usize {
                    self as usize
                }
            }

            impl<C: RegistryConfig<Id = $ty>> EntityKey<C> for $ty {
                #[inline]
                fn id(self) -> $ty {
                    self
                }

                #[inline]
                fn resolve(self, registry: &EntityRegistry<C>) -> Option<$ty> {
                    registry.is_alive(self).then_some(self)
                }
            }
        )+
    };
}

impl_sequential_id_for_primitive!(u8, u16, u32, u64, usize);

/// Declare a newtype over an unsigned integer that implements
/// [`SequentialId`] and can be used directly as an entity key.
///
/// ```
/// tessera_ecs::sequential_id! {
///     /// Identifies a particle.
///     pub struct ParticleId(u16);
/// }
///
/// use tessera_ecs::entity::SequentialId;
/// assert_eq!(ParticleId::INVALID, ParticleId(u16::MAX));
/// assert_eq!(ParticleId::from_index(3), Some(ParticleId(3)));
/// ```
#[macro_export]
macro_rules! sequential_id {
    ($(#[$meta:meta])* $vis:vis struct $name:ident($repr:ty);) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        $vis struct $name(pub $repr);

        impl $crate::entity::SequentialId for $name {
            const INVALID: Self = Self(<$repr>::MAX);
            const ZERO: Self = Self(0);

            #[inline]
            fn from_index(index: usize) -> ::std::option::Option<Self> {
                <$repr>::try_from(index)
                    .ok()
                    .filter(|raw| *raw != <$repr>::MAX)
                    .map(Self)
            }

            #[inline]
            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl<C> $crate::registry::EntityKey<C> for $name
        where
            C: $crate::config::RegistryConfig<Id = $name>,
        {
            #[inline]
            fn id(self) -> $name {
                self
            }

            #[inline]
            fn resolve(
                self,
                registry: &$crate::registry::EntityRegistry<C>,
            ) -> ::std::option::Option<$name> {
                registry.is_alive(self).then_some(self)
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                if self.0 == <$repr>::MAX {
                    write!(f, "{}(invalid)", stringify!($name))
                } else {
                    write!(f, "{}({})", stringify!($name), self.0)
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                ::std::fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

sequential_id! {
    /// Default entity identifier: a 32-bit index, `u32::MAX` is invalid.
    pub struct EntityId(u32);
}

sequential_id! {
    /// Default store identifier. `0` is the staging store and `u16::MAX`
    /// marks a destroyed entity; neither may name a real storage.
    pub struct StoreId(u16);
}

// ---------------------------------------------------------------------------
// GenerationCounter
// ---------------------------------------------------------------------------

/// Per-slot counter bumped every time the slot's entity is destroyed.
///
/// Counters wrap on overflow. A narrow counter reuses generations sooner; the
/// width is a tuning parameter, not a guarantee against collisions.
pub trait GenerationCounter:
    Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static
{
    /// Generation of a slot that has never been destroyed.
    const INITIAL: Self;
    /// Whether handles carry a meaningful generation.
    const ENABLED: bool;

    /// The generation following `self`.
    fn bump(self) -> Self;
}

macro_rules! impl_generation_counter {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl GenerationCounter for $ty {
                const INITIAL: Self = 0;
                const ENABLED: bool = true;

                #[inline]
                fn bump(self) -> Self {
                    self.wrapping_add(1)
                }
            }
        )+
    };
}

impl_generation_counter!(u8, u16, u32, u64);

/// Zero-sized generation used when generation checking is disabled.
///
/// Handles built on it degrade to checked aliases for IDs: they still fail
/// [`is_valid`](EntityRegistry::is_valid) once the entity is gone, but cannot
/// tell a recycled ID from the original.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NoGeneration;

impl GenerationCounter for NoGeneration {
    const INITIAL: Self = NoGeneration;
    const ENABLED: bool = false;

    #[inline]
    fn bump(self) -> Self {
        self
    }
}

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// Where an entity's data lives: which store and which row inside it.
///
/// - `store_id == INVALID`: the entity is destroyed.
/// - `store_id == ZERO`: the entity is staged, not housed by any storage.
/// - otherwise the entity belongs to that store; `index` is `None` while the
///   entity is pending there and `Some(row)` once a storage has added it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location<S> {
    /// The store holding (or about to hold) the entity.
    pub store_id: S,
    /// Row inside the store, if resolved.
    pub index: Option<usize>,
}

impl<S: SequentialId> Location<S> {
    /// Alive but not assigned to any storage.
    #[inline]
    pub fn staged() -> Self {
        Self {
            store_id: S::ZERO,
            index: None,
        }
    }

    /// Assigned to `store_id` without a row yet.
    #[inline]
    pub fn pending(store_id: S) -> Self {
        Self {
            store_id,
            index: None,
        }
    }

    /// Housed at `index` inside `store_id`.
    #[inline]
    pub fn at(store_id: S, index: usize) -> Self {
        Self {
            store_id,
            index: Some(index),
        }
    }

    /// The location that destroys an entity when written to the registry.
    #[inline]
    pub fn destroyed() -> Self {
        Self {
            store_id: S::INVALID,
            index: None,
        }
    }

    /// Whether this location means "destroyed".
    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.store_id == S::INVALID
    }

    /// Whether this is the staging store.
    #[inline]
    pub fn is_staged(&self) -> bool {
        self.store_id == S::ZERO
    }

    /// Whether the entity waits in `store_id` for a row to be assigned.
    #[inline]
    pub fn is_pending_in(&self, store_id: S) -> bool {
        self.store_id == store_id && self.index.is_none()
    }
}

/// Reject the two store IDs no storage may own: staging and `INVALID`.
pub(crate) fn ensure_storage_id<S: SequentialId>(store_id: S) -> Result<S, EcsError> {
    if store_id == S::ZERO || store_id == S::INVALID {
        debug!(store = ?store_id, "store id is reserved");
        return Err(EcsError::ReservedStoreId {
            store_id: store_id.index(),
        });
    }
    Ok(store_id)
}

impl<S: SequentialId> Default for Location<S> {
    fn default() -> Self {
        Self::staged()
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// An ID plus the generation of its slot when the handle was issued.
///
/// Two handles are equal only when both ID and generation match.
pub struct Handle<C: RegistryConfig> {
    id: C::Id,
    generation: C::Generation,
}

impl<C: RegistryConfig> Handle<C> {
    #[inline]
    pub(crate) fn new(id: C::Id, generation: C::Generation) -> Self {
        Self { id, generation }
    }

    /// A handle that never resolves to an entity.
    #[inline]
    pub fn empty() -> Self {
        Self::new(C::Id::INVALID, C::Generation::INITIAL)
    }

    /// The entity ID.
    #[inline]
    pub fn id(self) -> C::Id {
        self.id
    }

    /// The generation snapshot.
    #[inline]
    pub fn generation(self) -> C::Generation {
        self.generation
    }

    /// Whether this is the empty handle.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.id == C::Id::INVALID
    }
}

impl<C: RegistryConfig> Clone for Handle<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C: RegistryConfig> Copy for Handle<C> {}

impl<C: RegistryConfig> PartialEq for Handle<C> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.generation == other.generation
    }
}

impl<C: RegistryConfig> Eq for Handle<C> {}

impl<C: RegistryConfig> Hash for Handle<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.generation.hash(state);
    }
}

impl<C: RegistryConfig> Default for Handle<C> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<C: RegistryConfig> fmt::Debug for Handle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if C::Generation::ENABLED {
            write!(f, "Handle({:?}v{:?})", self.id, self.generation)
        } else {
            write!(f, "Handle({:?})", self.id)
        }
    }
}

impl<C: RegistryConfig> EntityKey<C> for Handle<C> {
    #[inline]
    fn id(self) -> C::Id {
        self.id
    }

    #[inline]
    fn resolve(self, registry: &EntityRegistry<C>) -> Option<C::Id> {
        registry.is_valid_handle(self).then_some(self.id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
