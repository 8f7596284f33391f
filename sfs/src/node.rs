use std::convert::TryInto;

use crate::io::BlockNumber;
use crate::layout::{
  BLOCK_SIZE, INODES_PER_BLOCK, INODE_SIZE, INODE_TABLE_START, POINTERS_PER_BLOCK,
  POINTERS_PER_INODE,
};

use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Identifies an inode across the whole table, slot 0 of the first table block is 0.
pub type InodeNumber = u32;

#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Copy, Clone)]
/// On-disk image of an inode. This structure __must be exactly 32 bytes.__
struct RawInode {
  /// 1 when the slot holds a file, 0 when free.
  valid: U32<LittleEndian>,
  /// The total size of the file in bytes.
  size: U32<LittleEndian>,
  /// Pointers for the first data blocks of the file, 0 for unassigned.
  direct: [U32<LittleEndian>; POINTERS_PER_INODE],
  /// Block holding further data block pointers, 0 for none.
  indirect: U32<LittleEndian>,
}

const _: () = assert!(std::mem::size_of::<RawInode>() == INODE_SIZE);

/// Block 0 is the superblock, so a stored 0 can only mean "no block".
fn decode_ptr(raw: u32) -> Option<BlockNumber> {
  if raw == 0 {
    None
  } else {
    Some(raw as BlockNumber)
  }
}

fn encode_ptr(ptr: Option<BlockNumber>) -> u32 {
  ptr.map_or(0, |blocknr| blocknr as u32)
}

/// In-memory copy of one inode. Loading hands out a copy, so nothing changes on disk
/// until the value is explicitly saved back.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
  pub valid: bool,
  pub size: u32,
  pub direct: [Option<BlockNumber>; POINTERS_PER_INODE],
  pub indirect: Option<BlockNumber>,
}

impl Inode {
  /// A claimed inode describing an empty file.
  pub fn empty_file() -> Self {
    Self {
      valid: true,
      ..Self::default()
    }
  }

  /// Reads the inode in `slot` of an inode table block.
  pub fn read_slot(block: &[u8], slot: usize) -> Self {
    let start = slot * INODE_SIZE;
    let raw = RawInode::read_from(&block[start..start + INODE_SIZE]).unwrap_or_else(RawInode::new_zeroed);

    let mut direct = [None; POINTERS_PER_INODE];
    for (ptr, raw_ptr) in direct.iter_mut().zip(raw.direct.iter()) {
      *ptr = decode_ptr(raw_ptr.get());
    }
    Self {
      valid: raw.valid.get() != 0,
      size: raw.size.get(),
      direct,
      indirect: decode_ptr(raw.indirect.get()),
    }
  }

  /// Overwrites `slot` of an inode table block with this inode.
  pub fn write_slot(&self, block: &mut [u8], slot: usize) {
    let mut raw = RawInode::new_zeroed();
    raw.valid = U32::new(self.valid as u32);
    raw.size = U32::new(self.size);
    for (raw_ptr, ptr) in raw.direct.iter_mut().zip(self.direct.iter()) {
      *raw_ptr = U32::new(encode_ptr(*ptr));
    }
    raw.indirect = U32::new(encode_ptr(self.indirect));

    let start = slot * INODE_SIZE;
    block[start..start + INODE_SIZE].copy_from_slice(raw.as_bytes());
  }

  /// Assigned direct pointers in slot order.
  pub fn direct_blocks(&self) -> impl Iterator<Item = BlockNumber> + '_ {
    self.direct.iter().filter_map(|ptr| *ptr)
  }
}

/// Splits an inode number into the table block holding it and the slot inside that
/// block.
pub fn locate(inumber: InodeNumber) -> (BlockNumber, usize) {
  let inumber = inumber as usize;
  (
    inumber / INODES_PER_BLOCK + INODE_TABLE_START,
    inumber % INODES_PER_BLOCK,
  )
}

/// Block of data block pointers extending an inode past its direct slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndirectBlock {
  pointers: Vec<Option<BlockNumber>>,
}

impl IndirectBlock {
  pub fn new() -> Self {
    Self {
      pointers: vec![None; POINTERS_PER_BLOCK],
    }
  }

  pub fn parse(buf: &[u8]) -> Self {
    let pointers = buf
      .chunks_exact(4)
      .take(POINTERS_PER_BLOCK)
      .map(|raw| decode_ptr(u32::from_le_bytes(raw.try_into().unwrap_or([0; 4]))))
      .collect();
    Self { pointers }
  }

  pub fn serialize(&self) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(BLOCK_SIZE);
    for ptr in self.pointers.iter() {
      encoded.extend_from_slice(&encode_ptr(*ptr).to_le_bytes());
    }
    encoded
  }

  pub fn get(&self, index: usize) -> Option<BlockNumber> {
    self.pointers.get(index).copied().flatten()
  }

  pub fn set(&mut self, index: usize, ptr: Option<BlockNumber>) {
    self.pointers[index] = ptr;
  }

  /// Assigned pointers in slot order.
  pub fn blocks(&self) -> impl Iterator<Item = BlockNumber> + '_ {
    self.pointers.iter().filter_map(|ptr| *ptr)
  }
}

impl Default for IndirectBlock {
  fn default() -> Self {
    Self::new()
  }
}
