//! Bit-packed array for storing fixed-width integer values in a compact `Vec<u64>`.
//!
//! Each entry occupies exactly `width` bits (1..=32). Entries are packed
//! tightly and may straddle `u64` word boundaries; no padding bits are
//! inserted, so `len` entries occupy exactly `ceil(len * width / 64)` words.

use serde::{Deserialize, Serialize};

/// A compact array where each entry is stored using a fixed number of bits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedArray {
    /// Raw storage. Entries are packed into 64-bit words, low bits first.
    words: Vec<u64>,
    /// Bits per entry (1..=32).
    width: u32,
    /// Total number of logical entries.
    len: usize,
}

impl PackedArray {
    /// Creates a new array with `len` entries, all initialized to zero.
    ///
    /// # Panics
    ///
    /// Panics if `width` is not in `1..=32`.
    pub fn new(width: u32, len: usize) -> Self {
        assert!(
            (1..=32).contains(&width),
            "entry width {width} out of range 1..=32"
        );
        Self {
            words: vec![0u64; Self::word_count(width, len)],
            width,
            len,
        }
    }

    /// Returns the number of 64-bit words needed for `len` entries of `width` bits.
    pub fn word_count(width: u32, len: usize) -> usize {
        (len as u64 * u64::from(width)).div_ceil(64) as usize
    }

    /// Returns the value at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn get(&self, index: usize) -> u64 {
        assert!(index < self.len, "index {index} out of bounds ({})", self.len);
        let bit = index as u64 * u64::from(self.width);
        let word = (bit / 64) as usize;
        let offset = (bit % 64) as u32;
        let mut value = self.words[word] >> offset;
        if offset + self.width > 64 {
            // Entry straddles into the next word; splice in its high bits.
            value |= self.words[word + 1] << (64 - offset);
        }
        value & self.mask()
    }

    /// Sets the value at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len` or if `value >= 2^width`. An out-of-range
    /// value is a caller bug and is never silently truncated.
    pub fn set(&mut self, index: usize, value: u64) {
        assert!(index < self.len, "index {index} out of bounds ({})", self.len);
        assert!(
            value <= self.mask(),
            "value {value} exceeds {}-bit capacity",
            self.width
        );
        let bit = index as u64 * u64::from(self.width);
        let word = (bit / 64) as usize;
        let offset = (bit % 64) as u32;
        self.words[word] &= !(self.mask() << offset);
        self.words[word] |= value << offset;
        if offset + self.width > 64 {
            let high_bits = offset + self.width - 64;
            let high_mask = (1u64 << high_bits) - 1;
            self.words[word + 1] &= !high_mask;
            self.words[word + 1] |= value >> (64 - offset);
        }
    }

    /// Returns a copy of this array repacked at a new (wider) entry width.
    ///
    /// Every logical value is preserved.
    ///
    /// # Panics
    ///
    /// Panics if `new_width` is not in `1..=32` or is narrower than the
    /// current width.
    pub fn resized(&self, new_width: u32) -> Self {
        assert!(
            new_width >= self.width,
            "repack would narrow entries from {} to {new_width} bits",
            self.width
        );
        let mut out = Self::new(new_width, self.len);
        for i in 0..self.len {
            out.set(i, self.get(i));
        }
        out
    }

    /// Returns the bits per entry.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the largest value an entry can hold.
    pub fn max_value(&self) -> u64 {
        self.mask()
    }

    /// Returns the number of logical entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the array has no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns a reference to the raw `u64` storage words.
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Consumes the array, returning the raw storage words.
    pub fn into_words(self) -> Vec<u64> {
        self.words
    }

    /// Constructs a `PackedArray` from raw words.
    ///
    /// The caller must ensure `words` holds exactly
    /// [`word_count`](Self::word_count) words and that every stored value
    /// fits within `width` bits.
    pub fn from_raw(width: u32, len: usize, words: Vec<u64>) -> Self {
        assert!(
            (1..=32).contains(&width),
            "entry width {width} out of range 1..=32"
        );
        assert_eq!(
            words.len(),
            Self::word_count(width, len),
            "word count inconsistent with width and length"
        );
        Self { words, width, len }
    }

    fn mask(&self) -> u64 {
        (1u64 << self.width) - 1
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
