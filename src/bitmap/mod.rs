//! Bitmap & Chunk Model
//!
//! In-memory sparse representation of a bitmap: a set of non-negative integer
//! positions split into fixed-width chunks.
//!
//! ## Layout
//! - **Chunk**: 2048 positions, stored as 32 words of 64 bits. Chunk key is `position / 2048`.
//! - **Bitmap**: chunks ordered by ascending key, plus a cached population count.
//!
//! Ascending-key iteration is the invariant the persistence layer relies on
//! when decomposing a bitmap into rows.

pub mod chunk;

pub use chunk::{CHUNK_BITS, Chunk, WORD_BITS, WORDS_PER_CHUNK};

use std::collections::BTreeMap;

/// Sparse bitmap keyed by chunk index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bitmap {
    chunks: BTreeMap<u64, Chunk>,
    count: u64,
}

impl Bitmap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a bitmap from an arbitrary list of positions. Duplicates are ignored.
    pub fn from_positions<I: IntoIterator<Item = u64>>(positions: I) -> Self {
        let mut bitmap = Self::new();
        for position in positions {
            bitmap.set(position);
        }
        bitmap
    }

    /// Sets `position`. Returns `true` if the bit was previously clear.
    pub fn set(&mut self, position: u64) -> bool {
        let key = position / CHUNK_BITS;
        let chunk = self.chunks.entry(key).or_insert_with(|| Chunk::new(key));
        let changed = chunk.set(position % CHUNK_BITS);
        if changed {
            self.count += 1;
        }
        changed
    }

    /// Clears `position`, dropping its chunk if it became empty.
    pub fn clear(&mut self, position: u64) -> bool {
        let key = position / CHUNK_BITS;
        let Some(chunk) = self.chunks.get_mut(&key) else {
            return false;
        };
        let changed = chunk.clear(position % CHUNK_BITS);
        if changed {
            self.count = self.count.saturating_sub(1);
            if chunk.is_empty() {
                self.chunks.remove(&key);
            }
        }
        changed
    }

    pub fn contains(&self, position: u64) -> bool {
        self.chunks
            .get(&(position / CHUNK_BITS))
            .map(|chunk| chunk.contains(position % CHUNK_BITS))
            .unwrap_or(false)
    }

    /// Inserts a chunk, replacing any chunk already stored under the same key.
    ///
    /// The cached count is left untouched; callers rebuilding a bitmap from
    /// storage set it explicitly once all chunks are in.
    pub fn add_chunk(&mut self, chunk: Chunk) {
        self.chunks.insert(chunk.key, chunk);
    }

    pub fn chunk(&self, key: u64) -> Option<&Chunk> {
        self.chunks.get(&key)
    }

    /// Returns the chunk for `key`, allocating an all-zero chunk if none exists.
    ///
    /// An all-zero chunk may live here transiently; `prune` (or `chunks`) keeps
    /// it out of anything that gets persisted.
    pub fn chunk_mut(&mut self, key: u64) -> &mut Chunk {
        self.chunks.entry(key).or_insert_with(|| Chunk::new(key))
    }

    /// Populated chunks in ascending key order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> + '_ {
        self.chunks.values().filter(|chunk| !chunk.is_empty())
    }

    /// Drops chunks whose words are all zero.
    pub fn prune(&mut self) {
        self.chunks.retain(|_, chunk| !chunk.is_empty());
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks().count()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks().next().is_none()
    }

    /// Cached number of set positions.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn set_count(&mut self, count: u64) {
        self.count = count;
    }

    /// Population count recomputed from the chunk words.
    pub fn bit_count(&self) -> u64 {
        self.chunks.values().map(Chunk::bit_count).sum()
    }

    /// Set positions in ascending order.
    pub fn positions(&self) -> impl Iterator<Item = u64> + '_ {
        self.chunks().flat_map(Chunk::positions)
    }
}
