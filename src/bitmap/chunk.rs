/// Number of positions covered by one chunk.
pub const CHUNK_BITS: u64 = 2048;
/// Width of a single word (block).
pub const WORD_BITS: u64 = 64;
/// Words per chunk.
pub const WORDS_PER_CHUNK: usize = (CHUNK_BITS / WORD_BITS) as usize;

/// A fixed-width segment of a bitmap.
///
/// `words[i]` covers positions `[key * 2048 + i * 64, key * 2048 + i * 64 + 64)`;
/// bit `b` of a word is set iff the matching position is a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub key: u64,
    pub words: [u64; WORDS_PER_CHUNK],
}

impl Chunk {
    /// Creates an all-zero chunk.
    pub fn new(key: u64) -> Self {
        Self {
            key,
            words: [0; WORDS_PER_CHUNK],
        }
    }

    /// Sets the bit at `offset` (relative to the chunk start).
    pub fn set(&mut self, offset: u64) -> bool {
        let (word, mask) = locate(offset);
        let previous = self.words[word];
        self.words[word] |= mask;
        previous & mask == 0
    }

    pub fn clear(&mut self, offset: u64) -> bool {
        let (word, mask) = locate(offset);
        let previous = self.words[word];
        self.words[word] &= !mask;
        previous & mask != 0
    }

    pub fn contains(&self, offset: u64) -> bool {
        let (word, mask) = locate(offset);
        self.words[word] & mask != 0
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|word| *word == 0)
    }

    pub fn bit_count(&self) -> u64 {
        self.words.iter().map(|word| word.count_ones() as u64).sum()
    }

    /// Iterates `(block_index, word)` for every non-zero word.
    pub fn non_zero_words(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.words
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, word)| *word != 0)
    }

    /// Absolute positions set in this chunk, ascending.
    pub fn positions(&self) -> impl Iterator<Item = u64> + '_ {
        let base = self.key * CHUNK_BITS;
        self.non_zero_words().flat_map(move |(index, word)| {
            let word_base = base + index as u64 * WORD_BITS;
            (0..WORD_BITS)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| word_base + bit)
        })
    }
}

fn locate(offset: u64) -> (usize, u64) {
    debug_assert!(offset < CHUNK_BITS);
    ((offset / WORD_BITS) as usize, 1u64 << (offset % WORD_BITS))
}
