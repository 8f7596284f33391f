//! Disk geometry. Everything here is a pure function of the device's block count.
//!
//! # Layout
//! ===========================================================================
//! | SuperBlock | Inode table (inode_blocks) | Data and indirect blocks ... |
//! ===========================================================================
//!
//! Block 0 always holds the superblock, so it can never be handed out as a data or
//! indirect block. On disk a block pointer of 0 therefore means "no block".

pub use fileblock::BLOCK_SIZE;

pub const MAGIC_NUMBER: u32 = 0xf0f0_3410;

/// Known locations.
pub const SUPERBLOCK_INDEX: usize = 0;
pub const INODE_TABLE_START: usize = 1;

pub const INODE_SIZE: usize = 32;
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;
pub const POINTERS_PER_INODE: usize = 5;
pub const POINTERS_PER_BLOCK: usize = BLOCK_SIZE / 4;

/// Largest number of data blocks a single inode can address: every direct slot plus
/// one full indirect block.
pub const MAX_FILE_BLOCKS: usize = POINTERS_PER_INODE + POINTERS_PER_BLOCK;
pub const MAX_FILE_SIZE: usize = MAX_FILE_BLOCKS * BLOCK_SIZE;

/// Ten percent of the disk, rounded up, is reserved for the inode table.
const INODE_TABLE_RATIO: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub total_blocks: usize,
    pub inode_blocks: usize,
    pub inodes: usize,
}

impl Layout {
    pub fn derive(total_blocks: usize) -> Self {
        let inode_blocks = inode_blocks_for(total_blocks);
        Self {
            total_blocks,
            inode_blocks,
            inodes: inode_blocks * INODES_PER_BLOCK,
        }
    }

    /// Range of block numbers holding the inode table.
    pub fn inode_table(&self) -> std::ops::Range<usize> {
        INODE_TABLE_START..INODE_TABLE_START + self.inode_blocks
    }

    /// First block number that may hold file data.
    pub fn data_start(&self) -> usize {
        INODE_TABLE_START + self.inode_blocks
    }
}

pub fn inode_blocks_for(total_blocks: usize) -> usize {
    (total_blocks + INODE_TABLE_RATIO - 1) / INODE_TABLE_RATIO
}

/// Where a logical file block lives within an inode's pointer tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Direct(usize),
    Indirect(usize),
}

impl Slot {
    /// Maps the n-th block of a file to its pointer slot, or `None` past the largest
    /// addressable file.
    pub fn of(file_block: usize) -> Option<Self> {
        if file_block < POINTERS_PER_INODE {
            Some(Slot::Direct(file_block))
        } else if file_block < MAX_FILE_BLOCKS {
            Some(Slot::Indirect(file_block - POINTERS_PER_INODE))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserves_a_tenth_of_the_disk_rounded_up() {
        assert_eq!(Layout::derive(1).inode_blocks, 1);
        assert_eq!(Layout::derive(10).inode_blocks, 1);
        assert_eq!(Layout::derive(11).inode_blocks, 2);
        assert_eq!(Layout::derive(20).inode_blocks, 2);
        assert_eq!(Layout::derive(200).inode_blocks, 20);
        assert_eq!(Layout::derive(201).inode_blocks, 21);
    }

    #[test]
    fn inode_capacity_follows_inode_blocks() {
        let layout = Layout::derive(20);
        assert_eq!(layout.inodes, 2 * INODES_PER_BLOCK);
        assert_eq!(layout.inode_table(), 1..3);
        assert_eq!(layout.data_start(), 3);
    }

    #[test]
    fn format_constants_match_on_disk_sizes() {
        assert_eq!(INODES_PER_BLOCK, 128);
        assert_eq!(POINTERS_PER_BLOCK, 1024);
        assert_eq!(MAX_FILE_SIZE, 1029 * 4096);
    }

    #[test]
    fn maps_file_blocks_to_direct_then_indirect_slots() {
        assert_eq!(Slot::of(0), Some(Slot::Direct(0)));
        assert_eq!(Slot::of(POINTERS_PER_INODE - 1), Some(Slot::Direct(4)));
        assert_eq!(Slot::of(POINTERS_PER_INODE), Some(Slot::Indirect(0)));
        assert_eq!(Slot::of(MAX_FILE_BLOCKS - 1), Some(Slot::Indirect(1023)));
        assert_eq!(Slot::of(MAX_FILE_BLOCKS), None);
    }
}
