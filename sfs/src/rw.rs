//! Byte-range reads and writes on top of an inode's direct and indirect pointers.
//!
//! Both directions walk the file one block-sized stride at a time. A stride starts at
//! `offset % BLOCK_SIZE` inside its block and never crosses into the next block, so
//! every step is a single block transfer.

use log::{debug, trace, warn};

use crate::fs::{FileSystem, Mounted, SFSError};
use crate::io::{BlockNumber, BlockStorage};
use crate::layout::{Slot, BLOCK_SIZE, MAX_FILE_SIZE};
use crate::node::{locate, IndirectBlock, Inode, InodeNumber};

/// One step of a read or write: `len` bytes starting `start` bytes into file block
/// `file_block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stride {
    file_block: usize,
    start: usize,
    len: usize,
}

/// Splits `length` bytes at `offset` into per-block strides.
fn strides(offset: usize, length: usize) -> impl Iterator<Item = Stride> {
    let end = offset + length;
    let mut pos = offset;
    std::iter::from_fn(move || {
        if pos >= end {
            return None;
        }
        let start = pos % BLOCK_SIZE;
        let len = (BLOCK_SIZE - start).min(end - pos);
        let stride = Stride {
            file_block: pos / BLOCK_SIZE,
            start,
            len,
        };
        pos += len;
        Some(stride)
    })
}

impl<T: BlockStorage> FileSystem<T> {
    /// Copies up to `buf.len()` bytes of inode `inumber`, starting at byte `offset`,
    /// into `buf`. Reads are clamped to the file size, so the returned count is short
    /// near the end of the file and 0 at or past it.
    ///
    /// # Errors
    ///
    /// Fails on a free inode or any block read failure. A missing block below the file
    /// size is reported as [`SFSError::Corrupt`] rather than read as zeros.
    pub fn read(
        &mut self,
        inumber: InodeNumber,
        buf: &mut [u8],
        offset: usize,
    ) -> Result<usize, SFSError> {
        let disk = self.disk()?;
        if buf.is_empty() {
            return Ok(0);
        }
        let node = disk.load_valid(inumber)?;
        let size = node.size as usize;
        if offset >= size {
            return Ok(0);
        }
        let length = buf.len().min(size - offset);

        let mut indirect = None;
        let mut block_buf = vec![0; BLOCK_SIZE];
        let mut copied = 0;
        for stride in strides(offset, length) {
            let blocknr = disk
                .mapped_block(&node, stride.file_block, &mut indirect)?
                .ok_or_else(|| SFSError::Corrupt {
                    block: locate(inumber).0,
                    detail: format!(
                        "inode {} has no block for file block {} below its size of {} bytes",
                        inumber, stride.file_block, size
                    ),
                })?;
            trace!(
                "inode {}: reading file block {} from block {}",
                inumber,
                stride.file_block,
                blocknr
            );

            disk.dev.read_block(blocknr, &mut block_buf)?;
            let chunk = &block_buf[stride.start..stride.start + stride.len];
            buf[copied..copied + stride.len].copy_from_slice(chunk);
            copied += stride.len;
        }
        Ok(copied)
    }

    /// Writes `data` into inode `inumber` starting at byte `offset`, growing the file as
    /// needed, and returns how many bytes were stored.
    ///
    /// Blocks already assigned to the file are updated in place; blocks past the end of
    /// the file are allocated as the write reaches them. The inode is saved after every
    /// block, so an interrupted write never leaves it pointing at unwritten blocks.
    /// Writes are clamped to the largest addressable file. When the disk fills up part
    /// way through, the bytes written so far are kept and their count returned.
    ///
    /// # Errors
    ///
    /// Fails on a free inode, on an `offset` past the end of the file (holes are not
    /// supported), with [`SFSError::NoSpace`] when not a single byte could be stored,
    /// and on any block I/O failure.
    pub fn write(
        &mut self,
        inumber: InodeNumber,
        data: &[u8],
        offset: usize,
    ) -> Result<usize, SFSError> {
        let disk = self.disk()?;
        if data.is_empty() {
            return Ok(0);
        }
        let mut node = disk.load_valid(inumber)?;
        let size = node.size as usize;
        if offset > size {
            return Err(SFSError::InvalidOffset { offset, size });
        }
        let length = data.len().min(MAX_FILE_SIZE.saturating_sub(offset));
        if length == 0 {
            return Ok(0);
        }

        let mut indirect = None;
        let mut block_buf = vec![0; BLOCK_SIZE];
        let mut written = 0;
        for stride in strides(offset, length) {
            let src = &data[written..written + stride.len];
            let stored = match disk.mapped_block(&node, stride.file_block, &mut indirect)? {
                Some(blocknr) => {
                    disk.overwrite(blocknr, &stride, src, &mut block_buf)?;
                    trace!(
                        "inode {}: rewrote file block {} in block {}",
                        inumber,
                        stride.file_block,
                        blocknr
                    );
                    true
                }
                None => {
                    disk.append_block(inumber, &mut node, &stride, src, &mut indirect, &mut block_buf)?
                }
            };
            if !stored {
                break;
            }

            written += stride.len;
            let reached = (offset + written) as u32;
            if reached > node.size {
                node.size = reached;
            }
            disk.save_inode(inumber, &node)?;
        }

        if written == 0 {
            return Err(SFSError::NoSpace);
        }
        Ok(written)
    }
}

impl<T: BlockStorage> Mounted<T> {
    /// Physical block backing `file_block` of `node`, if one is assigned. The indirect
    /// block is read at most once per read or write and kept in `indirect`.
    fn mapped_block(
        &mut self,
        node: &Inode,
        file_block: usize,
        indirect: &mut Option<IndirectBlock>,
    ) -> Result<Option<BlockNumber>, SFSError> {
        match Slot::of(file_block) {
            Some(Slot::Direct(idx)) => Ok(node.direct[idx]),
            Some(Slot::Indirect(idx)) => {
                let table = self.indirect_table(node, indirect)?;
                Ok(table.and_then(|table| table.get(idx)))
            }
            None => Ok(None),
        }
    }

    fn indirect_table<'c>(
        &mut self,
        node: &Inode,
        cache: &'c mut Option<IndirectBlock>,
    ) -> Result<Option<&'c mut IndirectBlock>, SFSError> {
        let blocknr = match node.indirect {
            Some(blocknr) => blocknr,
            None => return Ok(None),
        };
        if cache.is_none() {
            let mut block_buf = vec![0; BLOCK_SIZE];
            self.dev.read_block(blocknr, &mut block_buf)?;
            *cache = Some(IndirectBlock::parse(&block_buf));
        }
        Ok(cache.as_mut())
    }

    /// Updates part or all of an already assigned block.
    fn overwrite(
        &mut self,
        blocknr: BlockNumber,
        stride: &Stride,
        src: &[u8],
        block_buf: &mut [u8],
    ) -> Result<(), SFSError> {
        if stride.len < BLOCK_SIZE {
            self.dev.read_block(blocknr, block_buf)?;
        }
        block_buf[stride.start..stride.start + stride.len].copy_from_slice(src);
        self.dev.write_block(blocknr, block_buf)?;
        Ok(())
    }

    /// Allocates a fresh block for the file block `stride` falls in, fills it and wires
    /// it into `node`. Returns false when the disk is full. `node` is saved right away
    /// when this creates its indirect block; the caller saves it after the data.
    fn append_block(
        &mut self,
        inumber: InodeNumber,
        node: &mut Inode,
        stride: &Stride,
        src: &[u8],
        indirect: &mut Option<IndirectBlock>,
        block_buf: &mut [u8],
    ) -> Result<bool, SFSError> {
        let slot = match Slot::of(stride.file_block) {
            Some(slot) => slot,
            None => return Ok(false),
        };

        if let (Slot::Indirect(_), None) = (slot, node.indirect) {
            let ind_blocknr = match self.allocate_block() {
                Some(blocknr) => blocknr,
                None => return Ok(false),
            };
            let table = IndirectBlock::new();
            self.dev.write_block(ind_blocknr, &table.serialize())?;
            node.indirect = Some(ind_blocknr);
            *indirect = Some(table);
            self.save_inode(inumber, node)?;
            debug!("inode {}: created indirect block {}", inumber, ind_blocknr);
        }

        let blocknr = match self.allocate_block() {
            Some(blocknr) => blocknr,
            None => {
                warn!("inode {}: disk full after {} bytes", inumber, node.size);
                return Ok(false);
            }
        };
        for byte in block_buf.iter_mut() {
            *byte = 0;
        }
        block_buf[stride.start..stride.start + stride.len].copy_from_slice(src);
        self.dev.write_block(blocknr, block_buf)?;

        match slot {
            Slot::Direct(idx) => node.direct[idx] = Some(blocknr),
            Slot::Indirect(idx) => {
                let (ind_blocknr, table) = match (node.indirect, self.indirect_table(node, indirect)?) {
                    (Some(ind_blocknr), Some(table)) => (ind_blocknr, table),
                    _ => return Ok(false),
                };
                table.set(idx, Some(blocknr));
                let encoded = table.serialize();
                self.dev.write_block(ind_blocknr, &encoded)?;
            }
        }
        trace!(
            "inode {}: file block {} stored in new block {}",
            inumber,
            stride.file_block,
            blocknr
        );
        Ok(true)
    }
}
