//! Byte-coverage bit set.
//!
//! The field aligner needs to know, byte by byte, which parts of an object are
//! covered by nullified field edges. This is a plain bit set over byte offsets
//! backed by a vector of u64 words, with range fill and intersection on top.

/// A bit set backed by a vector of u64 words.
///
/// Each bit corresponds to one byte offset inside an object. The set grows
/// automatically when bits beyond the current capacity are set.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct BitSet {
    /// Storage: each u64 holds 64 bits
    words: Vec<u64>,
    /// Number of set bits (cached for O(1) len())
    count: usize,
}

impl BitSet {
    /// Number of bits per word.
    const BITS_PER_WORD: usize = 64;

    /// Creates a new empty bit set with the given capacity (in bits).
    pub fn new(capacity: usize) -> Self {
        let num_words = (capacity + Self::BITS_PER_WORD - 1) / Self::BITS_PER_WORD;
        Self {
            words: vec![0; num_words],
            count: 0,
        }
    }

    /// Creates an empty bit set with no pre-allocated capacity.
    pub fn empty() -> Self {
        Self {
            words: Vec::new(),
            count: 0,
        }
    }

    /// Returns the number of set bits.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns true if no bits are set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Gets the word index and bit position for a given bit index.
    #[inline]
    fn word_and_bit(index: usize) -> (usize, usize) {
        let word = index / Self::BITS_PER_WORD;
        let bit = index % Self::BITS_PER_WORD;
        (word, bit)
    }

    /// Returns true if the bit at the given index is set.
    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        let (word_idx, bit_idx) = Self::word_and_bit(index);
        if word_idx >= self.words.len() {
            return false;
        }
        let mask = 1u64 << bit_idx;
        (self.words[word_idx] & mask) != 0
    }

    /// Sets the bit at the given index. Returns true if the bit was not previously set.
    #[inline]
    pub fn insert(&mut self, index: usize) -> bool {
        let (word_idx, bit_idx) = Self::word_and_bit(index);

        // Grow if necessary
        if word_idx >= self.words.len() {
            self.words.resize(word_idx + 1, 0);
        }

        let mask = 1u64 << bit_idx;
        let was_clear = (self.words[word_idx] & mask) == 0;

        if was_clear {
            self.words[word_idx] |= mask;
            self.count += 1;
        }

        was_clear
    }

    /// Sets all bits in `start..end` (half-open).
    pub fn set_range(&mut self, start: usize, end: usize) {
        for index in start..end {
            self.insert(index);
        }
    }

    /// Returns the bitwise intersection of two sets.
    pub fn intersection(&self, other: &BitSet) -> BitSet {
        let num_words = self.words.len().min(other.words.len());
        let mut words = Vec::with_capacity(num_words);
        let mut count = 0;
        for i in 0..num_words {
            let word = self.words[i] & other.words[i];
            count += word.count_ones() as usize;
            words.push(word);
        }
        BitSet { words, count }
    }

    /// Returns the index of the first set bit at or after `from`, if any.
    pub fn next_set_bit(&self, from: usize) -> Option<usize> {
        let (mut word_idx, bit_idx) = Self::word_and_bit(from);
        if word_idx >= self.words.len() {
            return None;
        }
        // Mask off bits below `from` in the first word
        let mut word = self.words[word_idx] & (u64::MAX << bit_idx);
        loop {
            if word != 0 {
                let bit = word.trailing_zeros() as usize;
                return Some(word_idx * Self::BITS_PER_WORD + bit);
            }
            word_idx += 1;
            if word_idx >= self.words.len() {
                return None;
            }
            word = self.words[word_idx];
        }
    }

    /// Returns the index of the first clear bit at or after `from`.
    ///
    /// Bits beyond the allocated words are clear, so this always succeeds.
    pub fn next_clear_bit(&self, from: usize) -> usize {
        let (mut word_idx, bit_idx) = Self::word_and_bit(from);
        if word_idx >= self.words.len() {
            return from;
        }
        // Pretend bits below `from` are set in the first word
        let mut word = self.words[word_idx] | !(u64::MAX << bit_idx);
        loop {
            if word != u64::MAX {
                let bit = (!word).trailing_zeros() as usize;
                return word_idx * Self::BITS_PER_WORD + bit;
            }
            word_idx += 1;
            if word_idx >= self.words.len() {
                return word_idx * Self::BITS_PER_WORD;
            }
            word = self.words[word_idx];
        }
    }

    /// Returns an iterator over all set bit indices.
    pub fn iter(&self) -> BitSetIter<'_> {
        BitSetIter {
            bitset: self,
            word_idx: 0,
            current_word: self.words.first().copied().unwrap_or(0),
        }
    }

    /// Returns an iterator over maximal runs of set bits as `start..end` ranges.
    pub fn runs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let mut pos = 0;
        std::iter::from_fn(move || {
            let start = self.next_set_bit(pos)?;
            let end = self.next_clear_bit(start);
            pos = end;
            Some((start, end))
        })
    }
}

/// Iterator over set bits in a BitSet.
pub struct BitSetIter<'a> {
    bitset: &'a BitSet,
    word_idx: usize,
    current_word: u64,
}

impl Iterator for BitSetIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current_word != 0 {
                let bit_idx = self.current_word.trailing_zeros() as usize;
                self.current_word &= self.current_word - 1; // Clear lowest set bit
                return Some(self.word_idx * BitSet::BITS_PER_WORD + bit_idx);
            }

            self.word_idx += 1;
            if self.word_idx >= self.bitset.words.len() {
                return None;
            }
            self.current_word = self.bitset.words[self.word_idx];
        }
    }
}
