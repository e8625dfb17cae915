//! Deterministic in-process encoder for tests and dry runs.

use crate::tokenizer::{MarkerIds, MarkerTokens, SubwordEncoder};

/// Hash-based [`SubwordEncoder`] that needs no tokenizer file.
///
/// Each whitespace word maps to a stable id via FNV-1a, so identical text
/// always encodes identically within a vocabulary size. Ids 0..=2 are
/// reserved for the start/end/pad markers.
pub struct HashingEncoder {
    markers: MarkerTokens,
    vocab_size: usize,
}

const RESERVED: u32 = 3;

impl HashingEncoder {
    pub fn new(vocab_size: usize) -> Self {
        assert!(vocab_size > RESERVED as usize);
        Self {
            markers: MarkerTokens::default(),
            vocab_size,
        }
    }

    fn hash_word(&self, word: &str) -> u32 {
        // FNV-1a
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        for b in word.bytes() {
            h ^= b as u64;
            h = h.wrapping_mul(0x0000_0100_0000_01b3);
        }
        let span = self.vocab_size as u64 - RESERVED as u64;
        RESERVED + (h % span) as u32
    }
}

impl SubwordEncoder for HashingEncoder {
    fn encode(&self, text: &str, _prefix_space: bool) -> anyhow::Result<Vec<u32>> {
        let lowered = text.to_lowercase();
        Ok(lowered
            .split_whitespace()
            .map(|w| self.hash_word(w))
            .collect())
    }

    fn marker_ids(&self) -> MarkerIds {
        MarkerIds {
            start: 0,
            end: 1,
            pad: 2,
        }
    }

    fn markers(&self) -> &MarkerTokens {
        &self.markers
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }
}
