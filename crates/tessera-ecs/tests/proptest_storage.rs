//! Property tests for the storages.
//!
//! The same random operation sequence drives a dense archetype storage, a
//! chunked one and a single-component storage, each bound to its own
//! registry. After every step the registry locations must match the rows,
//! and the dense and chunked storages must be indistinguishable.

use proptest::prelude::*;
use tessera_ecs::prelude::*;

type Row = (u32, i64);
type DenseBodies = ArchetypeStorage<Row>;
type ChunkedBodies = ChunkedArchetypeStorage<Row, 4>;
type Handles = Vec<Handle<DefaultConfig>>;

const STORE: StoreId = StoreId(1);

#[derive(Debug, Clone)]
enum StorageOp {
    AddNew(u32),
    Remove(usize),
    ReAdd(usize),
    Erase(usize),
    EraseIfBelow(u32),
    EraseIfRowOdd,
}

fn storage_op_strategy() -> impl Strategy<Value = StorageOp> {
    prop_oneof![
        4 => (0..1_000u32).prop_map(StorageOp::AddNew),
        2 => (0..64usize).prop_map(StorageOp::Remove),
        1 => (0..64usize).prop_map(StorageOp::ReAdd),
        2 => (0..64usize).prop_map(StorageOp::Erase),
        1 => (0..200u32).prop_map(StorageOp::EraseIfBelow),
        1 => Just(StorageOp::EraseIfRowOdd),
    ]
}

fn row_for(value: u32) -> Row {
    (value, -(value as i64))
}

/// Every housed entity's location points back at its own row.
fn assert_locations<L: RowLayout<Row>>(
    reg: &EntityRegistry,
    storage: &ArchetypeStorage<Row, DefaultConfig, L>,
) -> Result<(), TestCaseError> {
    for (index, &id) in storage.ids().iter().enumerate() {
        prop_assert_eq!(reg.location(id), Some(Location::at(STORE, index)));
        prop_assert_eq!(storage.index_of(reg, id), Some(index));
    }
    Ok(())
}

/// Apply one operation to a storage and its registry.
///
/// `housed` and `pending` track which handles are in the storage and which
/// were removed back into its store, alive and waiting for a row.
fn apply<L: RowLayout<Row>>(
    op: &StorageOp,
    reg: &mut EntityRegistry,
    storage: &mut ArchetypeStorage<Row, DefaultConfig, L>,
    housed: &mut Handles,
    pending: &mut Handles,
) -> Result<(), TestCaseError> {
    match *op {
        StorageOp::AddNew(value) => {
            let h = storage.add_new(reg, (), row_for(value)).unwrap();
            housed.push(h);
        }
        StorageOp::Remove(idx) => {
            if !housed.is_empty() {
                let h = housed.remove(idx % housed.len());
                prop_assert!(storage.remove(reg, h, STORE));
                prop_assert!(!storage.contains(reg, h));
                pending.push(h);
            }
        }
        StorageOp::ReAdd(idx) => {
            if !pending.is_empty() {
                let h = pending.remove(idx % pending.len());
                prop_assert!(storage.add(reg, h, row_for(7)));
                housed.push(h);
            }
        }
        StorageOp::Erase(idx) => {
            if !housed.is_empty() {
                let h = housed.remove(idx % housed.len());
                prop_assert!(storage.erase(reg, h));
                prop_assert!(!reg.is_valid(h));
            }
        }
        StorageOp::EraseIfBelow(threshold) => {
            let erased = storage.erase_if_component::<u32, _>(reg, |value, _| *value < threshold);
            let before = housed.len();
            housed.retain(|h| reg.is_valid(*h));
            prop_assert_eq!(before - housed.len(), erased);
        }
        StorageOp::EraseIfRowOdd => {
            let erased = storage.erase_if(reg, |row| row.index() % 2 == 1);
            let before = housed.len();
            housed.retain(|h| reg.is_valid(*h));
            prop_assert_eq!(before - housed.len(), erased);
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1_000))]

    /// Locations stay consistent with rows through any mix of operations.
    #[test]
    fn swap_and_pop_keeps_locations_consistent(
        ops in prop::collection::vec(storage_op_strategy(), 1..80),
    ) {
        let mut reg = EntityRegistry::new();
        let mut storage = DenseBodies::new(STORE).unwrap();
        let (mut housed, mut pending) = (Vec::new(), Vec::new());

        for op in &ops {
            apply(op, &mut reg, &mut storage, &mut housed, &mut pending)?;
            assert_locations(&reg, &storage)?;
            prop_assert_eq!(storage.len(), housed.len());
            prop_assert_eq!(reg.len(), housed.len() + pending.len());
            for &h in &pending {
                prop_assert_eq!(reg.location(h), Some(Location::pending(STORE)));
            }
        }
    }

    /// Dense and chunked storages behave identically.
    #[test]
    fn dense_and_chunked_are_equivalent(
        ops in prop::collection::vec(storage_op_strategy(), 1..80),
    ) {
        let mut dense_reg = EntityRegistry::new();
        let mut chunked_reg = EntityRegistry::new();
        let mut dense = DenseBodies::new(STORE).unwrap();
        let mut chunked = ChunkedBodies::new(STORE).unwrap();
        let (mut dense_housed, mut dense_pending) = (Vec::new(), Vec::new());
        let (mut chunked_housed, mut chunked_pending) = (Vec::new(), Vec::new());

        for op in &ops {
            apply(op, &mut dense_reg, &mut dense, &mut dense_housed, &mut dense_pending)?;
            apply(op, &mut chunked_reg, &mut chunked, &mut chunked_housed, &mut chunked_pending)?;
            assert_locations(&chunked_reg, &chunked)?;

            prop_assert_eq!(dense.len(), chunked.len());
            prop_assert_eq!(dense.ids(), chunked.ids());
            prop_assert_eq!(&dense_housed, &chunked_housed);
            for &h in dense_housed.iter().chain(&dense_pending) {
                prop_assert_eq!(dense.contains(&dense_reg, h), chunked.contains(&chunked_reg, h));
            }

            let dense_rows: Vec<Row> = dense.rows().map(|r| (*r.at::<0>(), *r.at::<1>())).collect();
            let chunked_rows: Vec<Row> = chunked.rows().map(|r| (*r.at::<0>(), *r.at::<1>())).collect();
            prop_assert_eq!(dense_rows, chunked_rows);
            prop_assert_eq!(chunked.chunk_count(), chunked.len().div_ceil(4));
        }
    }

    /// The single-component storage keeps handles and rows aligned.
    #[test]
    fn component_storage_keeps_handles_aligned(
        values in prop::collection::vec(0..100i32, 1..60),
        removals in prop::collection::vec(any::<prop::sample::Index>(), 0..40),
    ) {
        let mut reg = EntityRegistry::new();
        let mut storage: ComponentStorage<i32> = ComponentStorage::new(STORE).unwrap();
        let mut housed: Handles = values
            .iter()
            .map(|&v| storage.add_new(&mut reg, (), v).unwrap())
            .collect();

        for pick in removals {
            if housed.is_empty() {
                break;
            }
            let h = housed.remove(pick.index(housed.len()));
            prop_assert!(storage.erase(&mut reg, h));

            prop_assert_eq!(storage.len(), housed.len());
            for (index, &handle) in storage.handles().iter().enumerate() {
                prop_assert_eq!(reg.location(handle), Some(Location::at(STORE, index)));
            }
            for &h in &housed {
                prop_assert!(storage.contains(&reg, h));
            }
        }
    }
}
