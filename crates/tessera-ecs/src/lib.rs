//! Tessera ECS -- entity registry and dense component storages.
//!
//! This crate is the storage core of an Entity-Component-System. An
//! [`EntityRegistry`](registry::EntityRegistry) owns every entity ID, its
//! generation counter and its current location. Storages hold the component
//! data densely and use the registry purely as a location directory:
//!
//! - [`ComponentStorage`](component_storage::ComponentStorage): one component
//!   type, one dense array.
//! - [`ArchetypeStorage`](archetype_storage::ArchetypeStorage): a fixed tuple
//!   of component types in struct-of-arrays layout.
//! - [`ChunkedArchetypeStorage`](chunked_archetype_storage::ChunkedArchetypeStorage):
//!   the same contract, with rows grouped into fixed-size chunks.
//!
//! Removal is swap-and-pop: the last row moves into the hole and the registry
//! is told its new index before the call returns. Row order is therefore not
//! creation order and is only stable between mutations.
//!
//! Nothing here is synchronized. A registry and the storages bound to it are
//! mutated through `&mut` borrows passed explicitly to every operation.
//!
//! # Quick Start
//!
//! ```
//! use tessera_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Velocity { dx: f32, dy: f32 }
//!
//! let mut registry: EntityRegistry = EntityRegistry::new();
//! let mut bodies: ArchetypeStorage<(Position, Velocity)> =
//!     ArchetypeStorage::new(StoreId(1)).unwrap();
//!
//! let ball = bodies
//!     .add_new(&mut registry, (), (Position { x: 0.0, y: 0.0 }, Velocity { dx: 1.0, dy: 0.0 }))
//!     .unwrap();
//!
//! bodies.for_each_mut(|_, row| {
//!     let (pos, vel) = row;
//!     pos.x += vel.dx;
//! });
//!
//! assert_eq!(bodies.component::<Position>(&registry, ball), Some(&Position { x: 1.0, y: 0.0 }));
//! assert!(bodies.erase(&mut registry, ball));
//! assert!(!registry.is_valid(ball));
//! ```

#![deny(unsafe_code)]

pub mod archetype;
pub mod archetype_storage;
pub mod chunked_archetype_storage;
pub mod component_storage;
pub mod config;
pub mod entity;
pub mod registry;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by checked accessors, constructors and settings parsing.
///
/// Hot-path operations never return this; they report expected failures as
/// `bool` or `Option`.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity does not exist (stale generation, destroyed or never allocated).
    #[error("entity {id} does not exist (stale, destroyed or never allocated)")]
    StaleEntity {
        /// Index of the entity ID.
        id: usize,
    },

    /// The entity is alive but its data is not in the queried storage.
    #[error("entity {id} is not housed in store {store_id}")]
    NotHoused {
        /// Index of the entity ID.
        id: usize,
        /// Index of the queried store ID.
        store_id: usize,
    },

    /// A storage was given a store ID reserved for staging or destruction.
    #[error("store id {store_id} is reserved (0 is staging, the maximum value marks destroyed entities)")]
    ReservedStoreId {
        /// Index of the rejected store ID.
        store_id: usize,
    },

    /// Settings could not be parsed.
    #[error("invalid settings: {0}")]
    Settings(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::archetype::{Archetype, ComponentAt};
    pub use crate::archetype_storage::{ArchetypeStorage, Dense, Row, RowLayout, Rows};
    pub use crate::chunked_archetype_storage::{Chunked, ChunkedArchetypeStorage};
    pub use crate::component_storage::ComponentStorage;
    pub use crate::config::{
        DefaultConfig, RegistryConfig, RegistrySettings, StorageSettings, UncheckedConfig,
    };
    pub use crate::entity::{
        EntityId, GenerationCounter, Handle, Location, NoGeneration, SequentialId, StoreId,
    };
    pub use crate::registry::{EntityKey, EntityRegistry, Record};
    pub use crate::EcsError;
}
