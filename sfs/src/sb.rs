use std::convert::TryInto;

use crate::layout::{Layout, BLOCK_SIZE, MAGIC_NUMBER};

/// The first block of the file system storing information critical for mounting
/// the file system and verifying the underlying disk is formatted correctly.
///
/// Written once by format and treated as read-only afterwards. The number of inodes
/// ultimately sets the upper bound on how many files can exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    /// Identifies a formatted disk, see [`MAGIC_NUMBER`].
    pub magic_number: u32,
    /// Size of the whole device in blocks, superblock included.
    pub blocks: u32,
    /// Blocks reserved for the inode table, starting at block 1.
    pub inode_blocks: u32,
    /// Total inode capacity, `inode_blocks * INODES_PER_BLOCK`.
    pub inodes: u32,
}

impl SuperBlock {
    pub fn new(layout: &Layout) -> Self {
        Self {
            magic_number: MAGIC_NUMBER,
            blocks: layout.total_blocks as u32,
            inode_blocks: layout.inode_blocks as u32,
            inodes: layout.inodes as u32,
        }
    }

    pub fn has_valid_magic(&self) -> bool {
        self.magic_number == MAGIC_NUMBER
    }

    pub fn layout(&self) -> Layout {
        Layout {
            total_blocks: self.blocks as usize,
            inode_blocks: self.inode_blocks as usize,
            inodes: self.inodes as usize,
        }
    }

    /// Decodes the superblock fields from the start of block 0. No field is validated
    /// here, mount decides what is acceptable.
    pub fn parse(buf: &[u8]) -> Self {
        let field = |at: usize| u32::from_le_bytes(buf[at..at + 4].try_into().unwrap_or([0; 4]));
        Self {
            magic_number: field(0),
            blocks: field(4),
            inode_blocks: field(8),
            inodes: field(12),
        }
    }

    /// Serializes the SuperBlock into a BLOCK_SIZE buffer for writing to disk.
    /// The encoding is a series of struct fields with little endian byte order.
    pub fn serialize(&self) -> Vec<u8> {
        let mut sb_encoded = Vec::with_capacity(BLOCK_SIZE);
        sb_encoded.extend_from_slice(&self.magic_number.to_le_bytes());
        sb_encoded.extend_from_slice(&self.blocks.to_le_bytes());
        sb_encoded.extend_from_slice(&self.inode_blocks.to_le_bytes());
        sb_encoded.extend_from_slice(&self.inodes.to_le_bytes());
        // Pad out the rest of block 0.
        sb_encoded.resize(BLOCK_SIZE, 0);
        sb_encoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_encode_and_decode_superblocks() {
        let sb = SuperBlock::new(&Layout::derive(20));
        let encoded = sb.serialize();
        assert_eq!(encoded.len(), BLOCK_SIZE);

        let parsed = SuperBlock::parse(&encoded);
        assert_eq!(parsed, sb);
        assert!(parsed.has_valid_magic());
        assert_eq!(parsed.layout(), Layout::derive(20));
    }

    #[test]
    fn fields_are_little_endian_at_fixed_offsets() {
        let sb = SuperBlock::new(&Layout::derive(20));
        let encoded = sb.serialize();

        assert_eq!(&encoded[0..4], &[0x10, 0x34, 0xf0, 0xf0]);
        assert_eq!(&encoded[4..8], &20u32.to_le_bytes());
        assert_eq!(&encoded[8..12], &2u32.to_le_bytes());
        assert_eq!(&encoded[12..16], &256u32.to_le_bytes());
    }

    #[test]
    fn zeroed_block_has_invalid_magic() {
        let zero_buffer_with_right_size = vec![0; BLOCK_SIZE];
        let sb = SuperBlock::parse(&zero_buffer_with_right_size);
        assert!(!sb.has_valid_magic());
        assert_eq!(sb.blocks, 0);
    }
}
