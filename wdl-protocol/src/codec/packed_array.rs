//! Fixed-width unsigned values packed into 64-bit words.
//!
//! Before 1.16 the stream is continuous and a value may straddle two words
//! ([`PackedLayout::Spanning`]). From 1.16 on every word holds `64 / bits` whole
//! values and the leftover high bits are padding ([`PackedLayout::Aligned`]).

const WORD_BITS: usize = u64::BITS as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackedLayout {
    Spanning,
    Aligned,
}

#[inline]
const fn value_mask(bits: u8) -> u64 {
    (1u64 << bits) - 1
}

impl PackedLayout {
    /// Number of words needed to hold `entries` values of `bits` width.
    pub const fn word_count(self, bits: u8, entries: usize) -> usize {
        let bits = bits as usize;
        match self {
            Self::Spanning => (entries * bits).div_ceil(WORD_BITS),
            Self::Aligned => entries.div_ceil(WORD_BITS / bits),
        }
    }

    /// Reads the value at `index`, or `None` when the words end before it.
    pub fn get(self, words: &[i64], bits: u8, index: usize) -> Option<u32> {
        debug_assert!((1..=32).contains(&bits));
        let mask = value_mask(bits);
        let width = bits as usize;

        match self {
            Self::Spanning => {
                let bit_index = index * width;
                let start = bit_index / WORD_BITS;
                let offset = bit_index % WORD_BITS;
                let end = (bit_index + width - 1) / WORD_BITS;

                let mut value = (*words.get(start)? as u64) >> offset;
                if end != start {
                    value |= (*words.get(end)? as u64) << (WORD_BITS - offset);
                }
                Some((value & mask) as u32)
            }
            Self::Aligned => {
                let per_word = WORD_BITS / width;
                let word = *words.get(index / per_word)? as u64;
                let offset = (index % per_word) * width;
                Some(((word >> offset) & mask) as u32)
            }
        }
    }

    /// Reads `entries` values. Missing trailing words decode as zero.
    pub fn unpack(self, words: &[i64], bits: u8, entries: usize) -> Vec<u32> {
        (0..entries)
            .map(|index| self.get(words, bits, index).unwrap_or(0))
            .collect()
    }

    /// Packs `values` at `bits` width. Values wider than `bits` are truncated.
    pub fn pack(self, values: &[u32], bits: u8) -> Box<[i64]> {
        debug_assert!((1..=32).contains(&bits));
        let mask = value_mask(bits);
        let width = bits as usize;
        let mut words = vec![0u64; self.word_count(bits, values.len())];

        for (index, &value) in values.iter().enumerate() {
            let value = u64::from(value) & mask;
            match self {
                Self::Spanning => {
                    let bit_index = index * width;
                    let start = bit_index / WORD_BITS;
                    let offset = bit_index % WORD_BITS;
                    let end = (bit_index + width - 1) / WORD_BITS;

                    words[start] |= value << offset;
                    if end != start {
                        words[end] |= value >> (WORD_BITS - offset);
                    }
                }
                Self::Aligned => {
                    let per_word = WORD_BITS / width;
                    words[index / per_word] |= value << ((index % per_word) * width);
                }
            }
        }

        words.into_iter().map(|word| word as i64).collect()
    }
}
