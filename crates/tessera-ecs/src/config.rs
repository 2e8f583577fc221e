//! Compile-time registry configuration and runtime settings.
//!
//! A [`RegistryConfig`] fixes the types a registry and its storages agree on:
//! the entity ID, the store ID, the generation counter and the per-entity
//! metadata. Runtime knobs (ID limit, storage limit, up-front reservation)
//! live in [`RegistrySettings`] and [`StorageSettings`], which can be loaded
//! from JSON.

use serde::{Deserialize, Serialize};

use crate::entity::{EntityId, GenerationCounter, NoGeneration, SequentialId, StoreId};
use crate::EcsError;

// ---------------------------------------------------------------------------
// RegistryConfig
// ---------------------------------------------------------------------------

/// Type-level configuration shared by a registry and the storages bound to it.
///
/// `Id` and `StoreId` should be distinct types so that an entity ID can never
/// be passed where a store ID is expected.
pub trait RegistryConfig: Sized + 'static {
    /// Entity identifier.
    type Id: SequentialId;
    /// Storage identifier. `ZERO` is staging, `INVALID` is destroyed.
    type StoreId: SequentialId;
    /// Generation counter; [`NoGeneration`] disables stale-handle detection.
    type Generation: GenerationCounter;
    /// Per-entity metadata; `()` for none.
    type Metadata: Default;
}

/// [`EntityId`] entities, [`StoreId`] stores, `u32` generations, no metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultConfig;

impl RegistryConfig for DefaultConfig {
    type Id = EntityId;
    type StoreId = StoreId;
    type Generation = u32;
    type Metadata = ();
}

/// Like [`DefaultConfig`] but without generation checking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UncheckedConfig;

impl RegistryConfig for UncheckedConfig {
    type Id = EntityId;
    type StoreId = StoreId;
    type Generation = NoGeneration;
    type Metadata = ();
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Runtime settings for an [`EntityRegistry`](crate::registry::EntityRegistry).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Maximum number of ID slots. `None` means the whole ID range.
    pub id_limit: Option<usize>,
    /// Number of record slots to reserve up front.
    pub reserve: usize,
    /// Create the reserved slots immediately so record addresses never move.
    pub prefill: bool,
}

impl RegistrySettings {
    /// Parse settings from a JSON document. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, EcsError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Runtime settings for a component or archetype storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Maximum number of entities the storage accepts. `None` is unlimited.
    pub limit: Option<usize>,
    /// Number of rows to reserve up front.
    pub reserve: usize,
}

impl StorageSettings {
    /// Parse settings from a JSON document. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, EcsError> {
        Ok(serde_json::from_str(json)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
