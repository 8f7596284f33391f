use log::{debug, info, warn};
use thiserror::Error;

use crate::alloc::{Bitmap, State};
use crate::io::{BlockNumber, BlockStorage, IoStats};
use crate::layout::{Layout, BLOCK_SIZE, INODES_PER_BLOCK, INODE_TABLE_START, SUPERBLOCK_INDEX};
use crate::node::{locate, IndirectBlock, Inode, InodeNumber};
use crate::sb::SuperBlock;

#[derive(Error, Debug)]
pub enum SFSError {
    #[error("block device I/O failed")]
    Io(#[from] std::io::Error),
    #[error("a disk is already mounted on this file system")]
    AlreadyMounted,
    #[error("no disk is mounted")]
    NotMounted,
    #[error("superblock magic number {found:#010x} is invalid")]
    BadMagic { found: u32 },
    #[error("superblock records {recorded} {field}, expected {expected}")]
    GeometryMismatch {
        field: &'static str,
        recorded: usize,
        expected: usize,
    },
    #[error("inode {inumber} is outside the inode table of {capacity} inodes")]
    InodeOutOfRange { inumber: InodeNumber, capacity: u32 },
    #[error("inode {0} is not in use")]
    InvalidInode(InodeNumber),
    #[error("write offset {offset} is past the end of a {size} byte file")]
    InvalidOffset { offset: usize, size: usize },
    #[error("inconsistent metadata at block {block}: {detail}")]
    Corrupt { block: BlockNumber, detail: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("no free inodes")]
    NoFreeInodes,
    #[error("no free blocks")]
    NoSpace,
}

/// State that only exists while a disk is mounted. Dropping it is unmounting.
pub(crate) struct Mounted<T: BlockStorage> {
    pub(crate) dev: T,
    pub(crate) super_block: SuperBlock,
    pub(crate) free_map: Bitmap,
}

/// Handle onto at most one mounted disk.
///
/// The disk is moved into the handle by [`FileSystem::mount`] and handed back by
/// [`FileSystem::unmount`], so nothing else can touch the blocks while the free block
/// map is live.
pub struct FileSystem<T: BlockStorage> {
    mounted: Option<Mounted<T>>,
}

impl<T: BlockStorage> Default for FileSystem<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: BlockStorage> FileSystem<T> {
    pub fn new() -> Self {
        Self { mounted: None }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.is_some()
    }

    /// Copy of the mounted disk's superblock.
    pub fn super_block(&self) -> Option<&SuperBlock> {
        self.mounted.as_ref().map(|disk| &disk.super_block)
    }

    /// Writes a fresh superblock and zeroes every other block of `dev`. All previous
    /// content of the disk is lost.
    ///
    /// # Errors
    ///
    /// Refuses to run while this handle has a disk mounted, and on devices too small
    /// to hold the superblock and one inode table block.
    pub fn format(&self, dev: &mut T) -> Result<(), SFSError> {
        if self.is_mounted() {
            return Err(SFSError::AlreadyMounted);
        }
        let total_blocks = dev.block_count();
        if total_blocks < INODE_TABLE_START + 1 {
            return Err(SFSError::InvalidArgument(format!(
                "{} blocks leave no room for the inode table",
                total_blocks
            )));
        }
        if total_blocks > u32::MAX as usize {
            return Err(SFSError::InvalidArgument(format!(
                "{} blocks cannot be addressed with 32 bit block numbers",
                total_blocks
            )));
        }

        let layout = Layout::derive(total_blocks);
        let super_block = SuperBlock::new(&layout);
        dev.write_block(SUPERBLOCK_INDEX, &super_block.serialize())?;

        let zero_block = vec![0; BLOCK_SIZE];
        for blocknr in SUPERBLOCK_INDEX + 1..total_blocks {
            dev.write_block(blocknr, &zero_block)?;
        }
        dev.sync_disk()?;

        info!(
            "formatted disk: {} blocks, {} inode blocks, {} inodes",
            layout.total_blocks, layout.inode_blocks, layout.inodes
        );
        Ok(())
    }

    /// Validates the superblock of `dev`, takes ownership of it and rebuilds the free
    /// block map from the inode table.
    ///
    /// # Errors
    ///
    /// Fails if this handle already holds a disk, if the superblock does not describe
    /// `dev`, or if any block read fails. The device is dropped on failure; for the
    /// file emulator the image stays on disk and can be reopened to inspect it with
    /// [`crate::debug`] or to format it again.
    pub fn mount(&mut self, mut dev: T) -> Result<(), SFSError> {
        if self.is_mounted() {
            warn!("mount rejected: a disk is already mounted");
            return Err(SFSError::AlreadyMounted);
        }

        let mut block_buf = vec![0; BLOCK_SIZE];
        dev.read_block(SUPERBLOCK_INDEX, &mut block_buf)?;
        let super_block = SuperBlock::parse(&block_buf);
        if let Err(err) = validate(&super_block, dev.block_count()) {
            warn!("mount rejected: {}", err);
            return Err(err);
        }

        let free_map = rebuild_free_map(&mut dev, &super_block.layout())?;
        info!(
            "mounted disk: {} blocks, {} free",
            super_block.blocks,
            free_map.free_blocks().count()
        );
        self.mounted = Some(Mounted {
            dev,
            super_block,
            free_map,
        });
        Ok(())
    }

    /// Releases the mounted disk and discards the free block map. Calling this on an
    /// unmounted handle does nothing and returns `None`.
    pub fn unmount(&mut self) -> Option<T> {
        let disk = self.mounted.take()?;
        info!("unmounted disk of {} blocks", disk.super_block.blocks);
        Some(disk.dev)
    }

    /// Block transfers performed by the mounted device so far.
    pub fn io_stats(&self) -> Option<IoStats> {
        self.mounted.as_ref().map(|disk| disk.dev.io_stats())
    }

    /// Allocation state of a block, or `None` when unmounted or out of range.
    pub fn block_state(&self, blocknr: BlockNumber) -> Option<State> {
        self.mounted.as_ref()?.free_map.get(blocknr)
    }

    pub fn free_block_count(&self) -> Option<usize> {
        Some(self.mounted.as_ref()?.free_map.free_blocks().count())
    }

    /// Loads a copy of inode `inumber`, valid or not.
    pub fn load_inode(&mut self, inumber: InodeNumber) -> Result<Inode, SFSError> {
        self.disk()?.load_inode(inumber)
    }

    /// Claims the first free inode in table order and returns its number.
    ///
    /// # Errors
    ///
    /// [`SFSError::NoFreeInodes`] when every slot of the inode table is in use.
    pub fn create(&mut self) -> Result<InodeNumber, SFSError> {
        let disk = self.disk()?;
        let mut block_buf = vec![0; BLOCK_SIZE];

        for (table_idx, blocknr) in disk.super_block.layout().inode_table().enumerate() {
            disk.dev.read_block(blocknr, &mut block_buf)?;
            let free_slot = (0..INODES_PER_BLOCK).find(|&slot| !Inode::read_slot(&block_buf, slot).valid);
            if let Some(slot) = free_slot {
                Inode::empty_file().write_slot(&mut block_buf, slot);
                disk.dev.write_block(blocknr, &block_buf)?;

                let inumber = (table_idx * INODES_PER_BLOCK + slot) as InodeNumber;
                debug!("created inode {}", inumber);
                return Ok(inumber);
            }
        }

        warn!("inode table is full");
        Err(SFSError::NoFreeInodes)
    }

    /// Size in bytes of the file held by `inumber`.
    pub fn stat(&mut self, inumber: InodeNumber) -> Result<usize, SFSError> {
        let node = self.disk()?.load_valid(inumber)?;
        Ok(node.size as usize)
    }

    /// Releases every block owned by `inumber` and marks the inode free.
    ///
    /// The inode is cleared on disk before any of its blocks return to the free map.
    /// If a block transfer fails part way, the blocks stay marked used until the next
    /// mount, and no block is ever shared by two files.
    ///
    /// # Errors
    ///
    /// [`SFSError::InvalidInode`] if the inode is already free; nothing changes in
    /// that case.
    pub fn remove(&mut self, inumber: InodeNumber) -> Result<(), SFSError> {
        let disk = self.disk()?;
        let node = disk.load_valid(inumber)?;

        let mut owned: Vec<BlockNumber> = node.direct_blocks().collect();
        if let Some(ind_blocknr) = node.indirect {
            let mut block_buf = vec![0; BLOCK_SIZE];
            disk.dev.read_block(ind_blocknr, &mut block_buf)?;
            owned.extend(IndirectBlock::parse(&block_buf).blocks());
        }

        disk.save_inode(inumber, &Inode::default())?;
        if let Some(ind_blocknr) = node.indirect {
            disk.dev.write_block(ind_blocknr, &IndirectBlock::new().serialize())?;
            owned.push(ind_blocknr);
        }
        for blocknr in owned {
            disk.free_block(blocknr);
        }
        debug!("removed inode {} ({} bytes)", inumber, node.size);
        Ok(())
    }

    pub(crate) fn disk(&mut self) -> Result<&mut Mounted<T>, SFSError> {
        self.mounted.as_mut().ok_or(SFSError::NotMounted)
    }
}

impl<T: BlockStorage> Mounted<T> {
    pub(crate) fn load_inode(&mut self, inumber: InodeNumber) -> Result<Inode, SFSError> {
        self.check_inumber(inumber)?;
        let (blocknr, slot) = locate(inumber);
        let mut block_buf = vec![0; BLOCK_SIZE];
        self.dev.read_block(blocknr, &mut block_buf)?;
        Ok(Inode::read_slot(&block_buf, slot))
    }

    /// Writes `node` back over inode `inumber`, leaving the rest of its table block as
    /// it is on disk.
    pub(crate) fn save_inode(&mut self, inumber: InodeNumber, node: &Inode) -> Result<(), SFSError> {
        self.check_inumber(inumber)?;
        let (blocknr, slot) = locate(inumber);
        let mut block_buf = vec![0; BLOCK_SIZE];
        self.dev.read_block(blocknr, &mut block_buf)?;
        node.write_slot(&mut block_buf, slot);
        self.dev.write_block(blocknr, &block_buf)?;
        Ok(())
    }

    pub(crate) fn load_valid(&mut self, inumber: InodeNumber) -> Result<Inode, SFSError> {
        let node = self.load_inode(inumber)?;
        if !node.valid {
            return Err(SFSError::InvalidInode(inumber));
        }
        Ok(node)
    }

    pub(crate) fn allocate_block(&mut self) -> Option<BlockNumber> {
        let blocknr = self.free_map.allocate();
        match blocknr {
            Some(blocknr) => debug!("allocated block {}", blocknr),
            None => warn!("no free blocks left"),
        }
        blocknr
    }

    /// Double frees are not detected, the map is rebuilt from the inode table on the
    /// next mount anyway.
    pub(crate) fn free_block(&mut self, blocknr: BlockNumber) {
        if self.free_map.set_free(blocknr) {
            debug!("freed block {}", blocknr);
        } else {
            warn!("ignoring free of block {} outside the disk", blocknr);
        }
    }

    fn check_inumber(&self, inumber: InodeNumber) -> Result<(), SFSError> {
        if inumber >= self.super_block.inodes {
            return Err(SFSError::InodeOutOfRange {
                inumber,
                capacity: self.super_block.inodes,
            });
        }
        Ok(())
    }
}

fn validate(super_block: &SuperBlock, block_count: usize) -> Result<(), SFSError> {
    if !super_block.has_valid_magic() {
        return Err(SFSError::BadMagic {
            found: super_block.magic_number,
        });
    }
    if super_block.blocks as usize != block_count {
        return Err(SFSError::GeometryMismatch {
            field: "blocks",
            recorded: super_block.blocks as usize,
            expected: block_count,
        });
    }
    let layout = Layout::derive(block_count);
    if super_block.inode_blocks as usize != layout.inode_blocks {
        return Err(SFSError::GeometryMismatch {
            field: "inode blocks",
            recorded: super_block.inode_blocks as usize,
            expected: layout.inode_blocks,
        });
    }
    if super_block.inodes as usize != layout.inodes {
        return Err(SFSError::GeometryMismatch {
            field: "inodes",
            recorded: super_block.inodes as usize,
            expected: layout.inodes,
        });
    }
    if layout.data_start() > block_count {
        return Err(SFSError::Corrupt {
            block: SUPERBLOCK_INDEX,
            detail: format!("inode table runs past the end of a {} block device", block_count),
        });
    }
    Ok(())
}

/// Marks the superblock, the inode table and every block reachable from a valid inode
/// as used. Everything else is free.
fn rebuild_free_map<T: BlockStorage>(dev: &mut T, layout: &Layout) -> Result<Bitmap, SFSError> {
    let mut free_map = Bitmap::new(layout.total_blocks);
    for blocknr in 0..layout.data_start().min(layout.total_blocks) {
        free_map.set_reserved(blocknr);
    }

    let reserve = |free_map: &mut Bitmap, blocknr: BlockNumber, inumber: usize| {
        if blocknr < layout.data_start() || !free_map.set_reserved(blocknr) {
            return Err(SFSError::Corrupt {
                block: blocknr,
                detail: format!("inode {} points outside the data region", inumber),
            });
        }
        Ok(())
    };

    let mut table_buf = vec![0; BLOCK_SIZE];
    let mut ind_buf = vec![0; BLOCK_SIZE];
    for (table_idx, blocknr) in layout.inode_table().enumerate() {
        dev.read_block(blocknr, &mut table_buf)?;
        for slot in 0..INODES_PER_BLOCK {
            let node = Inode::read_slot(&table_buf, slot);
            if !node.valid {
                continue;
            }
            let inumber = table_idx * INODES_PER_BLOCK + slot;
            for data_blocknr in node.direct_blocks() {
                reserve(&mut free_map, data_blocknr, inumber)?;
            }
            if let Some(ind_blocknr) = node.indirect {
                reserve(&mut free_map, ind_blocknr, inumber)?;
                dev.read_block(ind_blocknr, &mut ind_buf)?;
                for data_blocknr in IndirectBlock::parse(&ind_buf).blocks() {
                    reserve(&mut free_map, data_blocknr, inumber)?;
                }
            }
        }
    }
    Ok(free_map)
}
