//! Per-block digests of an item's content.
//!
//! The item is cut into fixed-size blocks and the digest of each block is
//! kept until a write or resize touches it. The layout seed is the digest
//! of the block digests in order, so a commit only re-reads the blocks that
//! changed since the seed was last computed.

use shroud_core::crypto::{HashKind, Hasher, DIGEST_SIZE};

#[derive(Debug, Clone, Default)]
pub(crate) struct BlockDigests {
    block_size: u64,
    size: u64,
    digests: Vec<Option<[u8; DIGEST_SIZE]>>,
}

impl BlockDigests {
    /// Tracker for an item of `size` bytes with every digest unknown.
    pub(crate) fn new(block_size: u32, size: u64) -> Self {
        let block_size = u64::from(block_size.max(1));
        Self {
            block_size,
            size,
            digests: vec![None; block_count(size, block_size)],
        }
    }

    /// Forgets the digests of blocks overlapping `[start, end)`.
    pub(crate) fn invalidate(&mut self, start: u64, end: u64) {
        if start >= end {
            return;
        }
        let first = (start / self.block_size) as usize;
        let last = ((end - 1) / self.block_size) as usize;
        for digest in self.digests.iter_mut().take(last + 1).skip(first) {
            *digest = None;
        }
    }

    /// Follows a change of the item length.
    ///
    /// The block holding the old end changes length, so its digest goes too.
    pub(crate) fn resize(&mut self, size: u64) {
        if size == self.size {
            return;
        }
        let (low, high) = (self.size.min(size), self.size.max(size));
        self.digests.resize(block_count(size, self.block_size), None);
        self.size = size;
        self.invalidate(low, high);
    }

    /// `(index, start, end)` of every block whose digest is unknown.
    pub(crate) fn missing(&self) -> Vec<(usize, u64, u64)> {
        self.digests
            .iter()
            .enumerate()
            .filter(|(_, digest)| digest.is_none())
            .map(|(index, _)| {
                let (start, end) = self.bounds(index);
                (index, start, end)
            })
            .collect()
    }

    /// `(index, start, end)` of every block lying wholly inside
    /// `[position, position + len)`.
    pub(crate) fn covered(&self, position: u64, len: u64) -> Vec<(usize, u64, u64)> {
        let end = position.saturating_add(len).min(self.size);
        let first = position.div_ceil(self.block_size) as usize;
        (first..self.digests.len())
            .map(|index| {
                let (start, block_end) = self.bounds(index);
                (index, start, block_end)
            })
            .take_while(|&(_, _, block_end)| block_end <= end)
            .collect()
    }

    pub(crate) fn set(&mut self, index: usize, digest: [u8; DIGEST_SIZE]) {
        if let Some(slot) = self.digests.get_mut(index) {
            *slot = Some(digest);
        }
    }

    /// Seed over every block, or `None` while any digest is unknown.
    pub(crate) fn seed(&self, kind: HashKind) -> Option<[u8; DIGEST_SIZE]> {
        let mut hasher = Hasher::new(kind);
        for digest in &self.digests {
            hasher.update(digest.as_ref()?);
        }
        Some(hasher.finalize())
    }

    fn bounds(&self, index: usize) -> (u64, u64) {
        let start = index as u64 * self.block_size;
        (start, (start + self.block_size).min(self.size))
    }
}

fn block_count(size: u64, block_size: u64) -> usize {
    size.div_ceil(block_size) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(size: u64) -> BlockDigests {
        let mut blocks = BlockDigests::new(100, size);
        for (index, _, _) in blocks.missing() {
            blocks.set(index, [index as u8; DIGEST_SIZE]);
        }
        blocks
    }

    #[test]
    fn test_new_tracker_knows_nothing() {
        let blocks = BlockDigests::new(100, 250);
        assert_eq!(
            blocks.missing(),
            vec![(0, 0, 100), (1, 100, 200), (2, 200, 250)]
        );
        assert!(blocks.seed(HashKind::Sha512).is_none());
        assert!(BlockDigests::new(100, 0).seed(HashKind::Sha512).is_some());
    }

    #[test]
    fn test_invalidate_touches_only_overlapping_blocks() {
        let mut blocks = filled(500);
        blocks.invalidate(150, 201);
        let missing: Vec<usize> = blocks.missing().iter().map(|m| m.0).collect();
        assert_eq!(missing, vec![1, 2]);

        blocks.invalidate(300, 300);
        assert_eq!(blocks.missing().len(), 2);
    }

    #[test]
    fn test_resize_drops_the_partial_end_block() {
        let mut grown = filled(250);
        grown.resize(420);
        let missing: Vec<usize> = grown.missing().iter().map(|m| m.0).collect();
        assert_eq!(missing, vec![2, 3, 4]);

        let mut shrunk = filled(500);
        shrunk.resize(230);
        assert_eq!(shrunk.missing(), vec![(2, 200, 230)]);

        // Shrinking onto a block boundary keeps every remaining digest
        let mut aligned = filled(500);
        aligned.resize(300);
        assert!(aligned.missing().is_empty());
    }

    #[test]
    fn test_covered_blocks() {
        let blocks = BlockDigests::new(100, 450);
        let covered: Vec<usize> = blocks.covered(50, 300).iter().map(|c| c.0).collect();
        assert_eq!(covered, vec![1, 2]);
        // The short last block counts once the run reaches the item end
        let covered: Vec<usize> = blocks.covered(400, 1000).iter().map(|c| c.0).collect();
        assert_eq!(covered, vec![4]);
        assert!(blocks.covered(110, 80).is_empty());
    }

    #[test]
    fn test_seed_depends_on_every_block() {
        let a = filled(300);
        let mut b = filled(300);
        assert_eq!(a.seed(HashKind::Sha512), b.seed(HashKind::Sha512));
        b.set(1, [0xEE; DIGEST_SIZE]);
        assert_ne!(a.seed(HashKind::Sha512), b.seed(HashKind::Sha512));
        assert_ne!(a.seed(HashKind::Sha512), a.seed(HashKind::Blake3));
    }
}
