//! Archetypes: fixed tuples of component types stored column by column.
//!
//! An [`Archetype`] is implemented for every tuple of `'static` component
//! types up to eight elements. The tuple itself is the row value: adding
//! `(Position, Velocity)` to an archetype storage pushes the position into
//! the position column and the velocity into the velocity column. The column
//! set ([`Archetype::Columns`]) is the matching tuple of `Vec`s, which keeps
//! every column contiguous (struct-of-arrays) without any type erasure.
//!
//! Columns are addressed positionally through [`ComponentAt`], checked at
//! compile time, or by type through [`Archetype::column_any`], checked at
//! run time.

use std::any::{Any, TypeId};

// ---------------------------------------------------------------------------
// Archetype
// ---------------------------------------------------------------------------

/// A fixed set of component types stored together, one row per entity.
///
/// Every function taking a column set assumes all of its columns have the
/// same length; the storages maintain that invariant.
pub trait Archetype: Sized + 'static {
    /// One `Vec` per component type.
    type Columns: 'static;
    /// Shared references to one row's components.
    type Refs<'a>
    where
        Self: 'a;
    /// Mutable references to one row's components.
    type Muts<'a>
    where
        Self: 'a;

    /// Number of component types.
    const COUNT: usize;

    /// An empty column set with room for `capacity` rows in every column.
    fn with_capacity(capacity: usize) -> Self::Columns;

    /// Number of rows.
    fn len(columns: &Self::Columns) -> usize;

    /// Rows every column can hold without reallocating (the minimum).
    fn capacity(columns: &Self::Columns) -> usize;

    /// Reserve room for `additional` rows in every column.
    fn reserve(columns: &mut Self::Columns, additional: usize);

    /// Append a row.
    fn push(columns: &mut Self::Columns, row: Self);

    /// Remove and return the last row.
    fn pop(columns: &mut Self::Columns) -> Option<Self>;

    /// Remove row `index`, moving the last row into its place.
    fn swap_remove(columns: &mut Self::Columns, index: usize) -> Self;

    /// Overwrite row `index` with `row`, returning the previous row.
    fn replace(columns: &mut Self::Columns, index: usize, row: Self) -> Self;

    /// Borrow row `index`.
    fn get(columns: &Self::Columns, index: usize) -> Self::Refs<'_>;

    /// Mutably borrow row `index`.
    fn get_mut(columns: &mut Self::Columns, index: usize) -> Self::Muts<'_>;

    /// Drop every row, keeping the allocations.
    fn clear(columns: &mut Self::Columns);

    /// Release unused capacity in every column.
    fn shrink_to_fit(columns: &mut Self::Columns);

    /// Position of the first column holding components of type `T`.
    fn position_of<T: 'static>() -> Option<usize>;

    /// Column `position` as `&Vec<T>` behind `dyn Any`.
    fn column_any(columns: &Self::Columns, position: usize) -> Option<&dyn Any>;

    /// Column `position` as `&mut Vec<T>` behind `dyn Any`.
    fn column_any_mut(columns: &mut Self::Columns, position: usize) -> Option<&mut dyn Any>;

    /// The first column holding components of type `T`.
    fn column_of<T: 'static>(columns: &Self::Columns) -> Option<&Vec<T>> {
        Self::column_any(columns, Self::position_of::<T>()?)?.downcast_ref::<Vec<T>>()
    }

    /// The first column holding components of type `T`, mutably.
    fn column_of_mut<T: 'static>(columns: &mut Self::Columns) -> Option<&mut Vec<T>> {
        Self::column_any_mut(columns, Self::position_of::<T>()?)?.downcast_mut::<Vec<T>>()
    }
}

/// Compile-time positional access to column `N` of an archetype.
pub trait ComponentAt<const N: usize>: Archetype {
    /// The component type stored in column `N`.
    type Component: 'static;

    /// Column `N`.
    fn column(columns: &Self::Columns) -> &Vec<Self::Component>;

    /// Column `N`, mutably.
    fn column_mut(columns: &mut Self::Columns) -> &mut Vec<Self::Component>;
}

// ---------------------------------------------------------------------------
// Tuple implementations
// ---------------------------------------------------------------------------

macro_rules! impl_component_at {
    ([$($all:ident),+] $name:ident $idx:tt) => {
        impl<$($all: 'static),+> ComponentAt<$idx> for ($($all,)+) {
            type Component = $name;

            #[inline]
            fn column(columns: &Self::Columns) -> &Vec<$name> {
                &columns.$idx
            }

            #[inline]
            fn column_mut(columns: &mut Self::Columns) -> &mut Vec<$name> {
                &mut columns.$idx
            }
        }
    };
}

macro_rules! impl_archetype {
    ($all:tt => $($name:ident : $idx:tt),+) => {
        impl<$($name: 'static),+> Archetype for ($($name,)+) {
            type Columns = ($(Vec<$name>,)+);
            type Refs<'a> = ($(&'a $name,)+) where Self: 'a;
            type Muts<'a> = ($(&'a mut $name,)+) where Self: 'a;

            const COUNT: usize = [$($idx),+].len();

            #[inline]
            fn with_capacity(capacity: usize) -> Self::Columns {
                ($(Vec::<$name>::with_capacity(capacity),)+)
            }

            #[inline]
            fn len(columns: &Self::Columns) -> usize {
                columns.0.len()
            }

            fn capacity(columns: &Self::Columns) -> usize {
                let mut capacity = usize::MAX;
                $(capacity = capacity.min(columns.$idx.capacity());)+
                capacity
            }

            fn reserve(columns: &mut Self::Columns, additional: usize) {
                $(columns.$idx.reserve(additional);)+
            }

            #[inline]
            fn push(columns: &mut Self::Columns, row: Self) {
                $(columns.$idx.push(row.$idx);)+
            }

            #[inline]
            fn pop(columns: &mut Self::Columns) -> Option<Self> {
                if columns.0.is_empty() {
                    return None;
                }
                Some(($(columns.$idx.pop()?,)+))
            }

            #[inline]
            fn swap_remove(columns: &mut Self::Columns, index: usize) -> Self {
                ($(columns.$idx.swap_remove(index),)+)
            }

            #[inline]
            fn replace(columns: &mut Self::Columns, index: usize, row: Self) -> Self {
                ($(std::mem::replace(&mut columns.$idx[index], row.$idx),)+)
            }

            #[inline]
            fn get(columns: &Self::Columns, index: usize) -> Self::Refs<'_> {
                ($(&columns.$idx[index],)+)
            }

            #[inline]
            fn get_mut(columns: &mut Self::Columns, index: usize) -> Self::Muts<'_> {
                ($(&mut columns.$idx[index],)+)
            }

            fn clear(columns: &mut Self::Columns) {
                $(columns.$idx.clear();)+
            }

            fn shrink_to_fit(columns: &mut Self::Columns) {
                $(columns.$idx.shrink_to_fit();)+
            }

            fn position_of<T: 'static>() -> Option<usize> {
                [$(TypeId::of::<$name>()),+]
                    .iter()
                    .position(|id| *id == TypeId::of::<T>())
            }

            fn column_any(columns: &Self::Columns, position: usize) -> Option<&dyn Any> {
                match position {
                    $($idx => Some(&columns.$idx as &dyn Any),)+
                    _ => None,
                }
            }

            fn column_any_mut(
                columns: &mut Self::Columns,
                position: usize,
            ) -> Option<&mut dyn Any> {
                match position {
                    $($idx => Some(&mut columns.$idx as &mut dyn Any),)+
                    _ => None,
                }
            }
        }

        $(impl_component_at!($all $name $idx);)+
    };
}

impl_archetype!([A] => A: 0);
impl_archetype!([A, B] => A: 0, B: 1);
impl_archetype!([A, B, C] => A: 0, B: 1, C: 2);
impl_archetype!([A, B, C, D] => A: 0, B: 1, C: 2, D: 3);
impl_archetype!([A, B, C, D, E] => A: 0, B: 1, C: 2, D: 3, E: 4);
impl_archetype!([A, B, C, D, E, F] => A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
impl_archetype!([A, B, C, D, E, F, G] => A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
impl_archetype!([A, B, C, D, E, F, G, H] => A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
