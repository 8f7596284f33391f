use crate::io::BlockNumber;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Free,
    Used,
}

/// In-memory free block map with one bit per disk block. It is never written to disk:
/// mount rebuilds it from the inode table and unmount drops it.
#[derive(Debug, Clone)]
pub struct Bitmap {
    /// Set bits are used blocks.
    words: Vec<u64>,
    len: usize,
}

impl Bitmap {
    /// A map of `len` blocks, all free.
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; (len + 63) / 64],
            len,
        }
    }

    /// State of `blocknr`, or `None` if the map does not cover it.
    pub fn get(&self, blocknr: BlockNumber) -> Option<State> {
        if blocknr >= self.len {
            return None;
        }
        let mask = 0b01_u64 << (blocknr % 64);
        if self.words[blocknr / 64] & mask == 0 {
            Some(State::Free)
        } else {
            Some(State::Used)
        }
    }

    /// Marks `blocknr` used. Returns false, changing nothing, when it is out of range.
    pub fn set_reserved(&mut self, blocknr: BlockNumber) -> bool {
        if blocknr >= self.len {
            return false;
        }
        self.words[blocknr / 64] |= 0b01_u64 << (blocknr % 64);
        true
    }

    /// Marks `blocknr` free. Returns false, changing nothing, when it is out of range.
    pub fn set_free(&mut self, blocknr: BlockNumber) -> bool {
        if blocknr >= self.len {
            return false;
        }
        self.words[blocknr / 64] &= !(0b01_u64 << (blocknr % 64));
        true
    }

    /// Free block numbers in ascending order.
    pub fn free_blocks(&self) -> impl Iterator<Item = BlockNumber> + '_ {
        (0..self.len).filter(move |&blocknr| self.get(blocknr) == Some(State::Free))
    }

    /// Implements a naive block allocation policy: the lowest numbered free block is
    /// reserved and returned. There is no compaction, so the simple policy is enough.
    pub fn allocate(&mut self) -> Option<BlockNumber> {
        let (word_idx, word) = self
            .words
            .iter()
            .enumerate()
            .find(|(_, word)| **word != u64::MAX)?;
        let blocknr = word_idx * 64 + word.trailing_ones() as usize;
        if blocknr >= self.len {
            return None;
        }
        self.set_reserved(blocknr);
        Some(blocknr)
    }
}
