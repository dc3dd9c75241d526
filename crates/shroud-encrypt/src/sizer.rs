//! Chunk layout.
//!
//! Maps an item's total size and a content-derived seed to the plaintext
//! length of every chunk. Identical input always gives an identical layout.

use crate::{EncryptError, MAX_CHUNKS, MIN_CHUNKS};

/// Computes chunk boundaries for a given target chunk size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSizer {
    chunk_size: u64,
    max_inline_size: u64,
}

impl ChunkSizer {
    /// `chunk_size` is the preferred average; items of at most
    /// `max_inline_size` bytes are not chunked.
    pub fn new(chunk_size: u32, max_inline_size: usize) -> Self {
        Self {
            chunk_size: chunk_size as u64,
            max_inline_size: max_inline_size as u64,
        }
    }

    /// Returns true if an item of `total` bytes is kept inline.
    pub fn is_inline(&self, total: u64) -> bool {
        total <= self.max_inline_size
    }

    /// Chunk lengths for an item of `total` bytes.
    ///
    /// Empty for inline items. Otherwise between `MIN_CHUNKS` and
    /// `MAX_CHUNKS` lengths summing to `total`.
    pub fn chunk_sizes(&self, total: u64, seed: &[u8]) -> Result<Vec<u32>, EncryptError> {
        if total == 0 {
            return Err(EncryptError::Size("cannot chunk an empty item".to_string()));
        }
        if self.is_inline(total) {
            return Ok(Vec::new());
        }

        let max_chunks = MAX_CHUNKS as u64;
        let min_chunks = MIN_CHUNKS as u64;
        let (average, count) = if total / max_chunks > self.chunk_size {
            (total / max_chunks, max_chunks)
        } else if total == 4 {
            // Three chunks rather than two of two bytes
            (1, min_chunks)
        } else if total / min_chunks < self.chunk_size {
            (total.div_ceil(min_chunks), min_chunks)
        } else {
            // Even split so the last chunk is not a sliver
            let count = total / self.chunk_size;
            (total / count, count)
        };

        let mut sizes = Vec::with_capacity(count as usize);
        let mut assigned = 0u64;
        for index in 0..count as usize - 1 {
            let size = perturb(average, seed_offset(seed, index));
            sizes.push(to_u32(size)?);
            assigned += size;
        }

        if assigned >= total {
            return Err(EncryptError::Size(format!(
                "chunks before the last already cover {assigned} of {total} bytes"
            )));
        }
        sizes.push(to_u32(total - assigned)?);
        Ok(sizes)
    }
}

/// Signed adjustment in `-8..=7` taken from hex digit `index` of the seed.
fn seed_offset(seed: &[u8], index: usize) -> i64 {
    let nibble = match seed.get(index / 2) {
        Some(byte) if index % 2 == 0 => byte >> 4,
        Some(byte) => byte & 0x0F,
        None => 8,
    };
    nibble as i64 - 8
}

/// `average * (1 + offset / (MAX_CHUNKS * 16))`, at least 1.
///
/// The divisor caps every chunk's deviation at `average / MAX_CHUNKS / 2`,
/// so even if every chunk grows the last one stays positive.
fn perturb(average: u64, offset: i64) -> u64 {
    let delta = average as i128 * offset as i128 / (MAX_CHUNKS as i128 * 16);
    let size = average as i128 + delta;
    size.max(1) as u64
}

fn to_u32(size: u64) -> Result<u32, EncryptError> {
    u32::try_from(size)
        .map_err(|_| EncryptError::Size(format!("chunk of {size} bytes exceeds u32::MAX")))
}
