//! Bloom filter for shard-level dedup screening
//!
//! Fixed-size bit array sized from an expected item count and a target
//! false-positive rate. Purely advisory: a positive answer must always be
//! confirmed against the authoritative secondary index before it is trusted.

/// Probabilistic set-membership structure with no false negatives
#[derive(Debug)]
pub struct BloomFilter {
    bits: Vec<u8>,
    bit_len: usize,
    hash_count: u32,
}

impl BloomFilter {
    /// Create a filter sized for `expected_count` items at `false_positive_rate`.
    ///
    /// Bit-array length is `ceil(n * |log2(p)| / ln 2)` and the hash fan-out
    /// is `ceil(log2(1/p))`.
    pub fn new(expected_count: usize, false_positive_rate: f64) -> Self {
        let bit_len = ((expected_count as f64 * false_positive_rate.log2().abs())
            / std::f64::consts::LN_2)
            .ceil() as usize;
        let bit_len = bit_len.max(1);

        let hash_count = (1.0 / false_positive_rate).log2().ceil() as u32;
        let hash_count = hash_count.max(1);

        Self {
            bits: vec![0u8; bit_len.div_ceil(8)],
            bit_len,
            hash_count,
        }
    }

    /// Register an item's string form
    pub fn add(&mut self, item: &str) {
        for seed in 0..self.hash_count {
            let pos = self.hash(item, seed);
            self.bits[pos >> 3] |= 1 << (pos & 7);
        }
    }

    /// False only if the item was never added; true may be a false positive
    pub fn might_contain(&self, item: &str) -> bool {
        for seed in 0..self.hash_count {
            let pos = self.hash(item, seed);
            if self.bits[pos >> 3] & (1 << (pos & 7)) == 0 {
                return false;
            }
        }
        true
    }

    /// Zero the whole bit array
    pub fn clear(&mut self) {
        self.bits.fill(0);
    }

    /// Number of addressable bits
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Number of seeded hashes per item
    pub fn hash_count(&self) -> u32 {
        self.hash_count
    }

    /// Seeded polynomial hash over the item's bytes, reduced to a bit position
    fn hash(&self, item: &str, seed: u32) -> usize {
        let mut h = seed as u64;
        for byte in item.as_bytes() {
            h = h.wrapping_mul(31).wrapping_add(*byte as u64);
        }
        (h % self.bit_len as u64) as usize
    }
}
