//! §4.3 Bloom-filter releasability index — 1024 bits, 3 SHA-256-derived
//! hash functions. Advisory only: the authoritative membership check is
//! always the plaintext `releasableTo` set.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const BITS: usize = 1024;
const BYTES: usize = BITS / 8;
const HASH_COUNT: u8 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BloomFilter {
    bits: Vec<u8>,
}

impl Default for BloomFilter {
    fn default() -> Self {
        Self { bits: vec![0u8; BYTES] }
    }
}

impl BloomFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_members<'a, I: IntoIterator<Item = &'a str>>(members: I) -> Self {
        let mut filter = Self::new();
        for m in members {
            filter.insert(m);
        }
        filter
    }

    pub fn insert(&mut self, value: &str) {
        for i in 0..HASH_COUNT {
            let bit = Self::hash(value, i) as usize % BITS;
            self.bits[bit / 8] |= 1 << (7 - (bit % 8));
        }
    }

    pub fn contains(&self, value: &str) -> bool {
        (0..HASH_COUNT).all(|i| {
            let bit = Self::hash(value, i) as usize % BITS;
            (self.bits[bit / 8] & (1 << (7 - (bit % 8)))) != 0
        })
    }

    fn hash(value: &str, seed: u8) -> u32 {
        let mut hasher = Sha256::new();
        hasher.update(value.as_bytes());
        hasher.update([seed]);
        let digest = hasher.finalize();
        u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
    }

    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(&self.bits)
    }

    pub fn from_base64(encoded: &str) -> Option<Self> {
        use base64::Engine;
        let bits = base64::engine::general_purpose::STANDARD.decode(encoded).ok()?;
        if bits.len() != BYTES {
            return None;
        }
        Some(Self { bits })
    }
}
