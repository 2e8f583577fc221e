//! Archetype storage with rows grouped into fixed-size chunks.
//!
//! Rows are written densely from the start of chunk 0 upward. Every chunk
//! but the last in use is full; row `i` lives in chunk `i / K` at slot
//! `i % K`. `K` must be a power of two so both are a shift and a mask.
//!
//! A chunk is allocated whole when the first row lands in it and dropped as
//! soon as its last row leaves, so growing the storage never moves an
//! existing component.
//!
//! All entity-level behaviour (add, remove, swap-and-pop, registry updates)
//! is shared with the dense layout through
//! [`ArchetypeStorage`](crate::archetype_storage::ArchetypeStorage).

use crate::archetype::Archetype;
use crate::archetype_storage::{ArchetypeStorage, RowLayout};
use crate::config::{DefaultConfig, RegistryConfig};

/// Archetype storage whose rows are grouped in chunks of `K` rows.
pub type ChunkedArchetypeStorage<A, const K: usize, C = DefaultConfig> =
    ArchetypeStorage<A, C, Chunked<A, K>>;

/// Chunked row layout: a list of column sets holding `K` rows each.
pub struct Chunked<A: Archetype, const K: usize> {
    chunks: Vec<A::Columns>,
    len: usize,
}

impl<A: Archetype, const K: usize> Chunked<A, K> {
    const SHIFT: u32 = {
        assert!(K.is_power_of_two(), "chunk size must be a power of two");
        K.trailing_zeros()
    };
    const MASK: usize = K - 1;

    /// Rows per chunk.
    pub const CHUNK_SIZE: usize = K;

    /// Number of allocated chunks.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Column set of chunk `n`.
    #[inline]
    pub fn chunk(&self, n: usize) -> Option<&A::Columns> {
        self.chunks.get(n)
    }

    #[inline]
    fn split(index: usize) -> (usize, usize) {
        (index >> Self::SHIFT, index & Self::MASK)
    }
}

impl<A: Archetype, const K: usize> Default for Chunked<A, K> {
    fn default() -> Self {
        let _ = Self::SHIFT;
        Self {
            chunks: Vec::new(),
            len: 0,
        }
    }
}

impl<A: Archetype, const K: usize> RowLayout<A> for Chunked<A, K> {
    #[inline]
    fn len(&self) -> usize {
        self.len
    }

    /// Chunk slots reserved in the chunk list, times `K`.
    #[inline]
    fn capacity(&self) -> usize {
        self.chunks.capacity().saturating_mul(K)
    }

    fn reserve(&mut self, additional: usize) {
        let needed = (self.len + additional).div_ceil(K);
        self.chunks.reserve(needed.saturating_sub(self.chunks.len()));
    }

    fn push(&mut self, row: A) {
        let (chunk, slot) = Self::split(self.len);
        if slot == 0 {
            self.chunks.push(A::with_capacity(K));
        }
        A::push(&mut self.chunks[chunk], row);
        self.len += 1;
    }

    fn swap_remove(&mut self, index: usize) -> A {
        assert!(
            index < self.len,
            "swap_remove index {index} out of bounds (len {})",
            self.len
        );
        let last = self.len - 1;
        let (last_chunk, _) = Self::split(last);
        let tail = A::pop(&mut self.chunks[last_chunk]).expect("last chunk holds the last row");
        self.len = last;
        if self.len & Self::MASK == 0 {
            self.chunks.pop();
        }
        if index == last {
            return tail;
        }
        let (chunk, slot) = Self::split(index);
        A::replace(&mut self.chunks[chunk], slot, tail)
    }

    #[inline]
    fn locate(&self, index: usize) -> (&A::Columns, usize) {
        let (chunk, slot) = Self::split(index);
        (&self.chunks[chunk], slot)
    }

    #[inline]
    fn locate_mut(&mut self, index: usize) -> (&mut A::Columns, usize) {
        let (chunk, slot) = Self::split(index);
        (&mut self.chunks[chunk], slot)
    }

    fn clear(&mut self) {
        self.chunks.clear();
        self.len = 0;
    }

    fn shrink_to_fit(&mut self) {
        self.chunks.shrink_to_fit();
    }
}

impl<A, C, const K: usize> ArchetypeStorage<A, C, Chunked<A, K>>
where
    A: Archetype,
    C: RegistryConfig,
{
    /// Number of allocated chunks; every one holds at least one row.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.layout().chunk_count()
    }

    /// Chunks in storage order, each paired with the IDs of its rows.
    ///
    /// Every chunk but the last holds exactly `K` rows.
    pub fn chunks(&self) -> impl Iterator<Item = (&[C::Id], &A::Columns)> + '_ {
        self.ids().chunks(K).zip(self.layout().chunks.iter())
    }

    /// Chunks with mutable column sets.
    pub fn chunks_mut(&mut self) -> impl Iterator<Item = (&[C::Id], &mut A::Columns)> + '_ {
        let (ids, layout) = self.split_mut();
        ids.chunks(K).zip(layout.chunks.iter_mut())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
