use std::fmt;

use log::warn;

use crate::fs::SFSError;
use crate::io::{BlockNumber, BlockStorage};
use crate::layout::{BLOCK_SIZE, INODES_PER_BLOCK, SUPERBLOCK_INDEX};
use crate::node::{IndirectBlock, Inode, InodeNumber};
use crate::sb::SuperBlock;

/// Snapshot of a disk's superblock and every inode in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugReport {
    pub super_block: SuperBlock,
    pub inodes: Vec<InodeReport>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InodeReport {
    pub inumber: InodeNumber,
    pub size: u32,
    pub direct: Vec<BlockNumber>,
    /// The indirect block and the data blocks it points at.
    pub indirect: Option<(BlockNumber, Vec<BlockNumber>)>,
}

/// Reads the superblock and inode table of `dev` without mounting it. The inode
/// table is only walked when the magic number is valid, and never past the end of
/// the device. An indirect pointer outside the device is reported without the data
/// blocks behind it.
pub fn debug<T: BlockStorage>(dev: &mut T) -> Result<DebugReport, SFSError> {
    let mut block_buf = vec![0; BLOCK_SIZE];
    dev.read_block(SUPERBLOCK_INDEX, &mut block_buf)?;
    let super_block = SuperBlock::parse(&block_buf);

    let mut report = DebugReport {
        super_block,
        inodes: Vec::new(),
    };
    if !super_block.has_valid_magic() {
        return Ok(report);
    }

    let mut ind_buf = vec![0; BLOCK_SIZE];
    let table = super_block.layout().inode_table();
    let last = table.end.min(dev.block_count());
    for (table_idx, blocknr) in (table.start..last).enumerate() {
        dev.read_block(blocknr, &mut block_buf)?;
        for slot in 0..INODES_PER_BLOCK {
            let node = Inode::read_slot(&block_buf, slot);
            if !node.valid {
                continue;
            }
            let inumber = (table_idx * INODES_PER_BLOCK + slot) as InodeNumber;
            let indirect = match node.indirect {
                Some(ind_blocknr) if ind_blocknr >= dev.block_count() => {
                    warn!(
                        "inode {}: indirect block {} is past the end of the device",
                        inumber, ind_blocknr
                    );
                    Some((ind_blocknr, Vec::new()))
                }
                Some(ind_blocknr) => {
                    dev.read_block(ind_blocknr, &mut ind_buf)?;
                    let blocks = IndirectBlock::parse(&ind_buf).blocks().collect();
                    Some((ind_blocknr, blocks))
                }
                None => None,
            };
            report.inodes.push(InodeReport {
                inumber,
                size: node.size,
                direct: node.direct_blocks().collect(),
                indirect,
            });
        }
    }
    Ok(report)
}

fn write_blocks(f: &mut fmt::Formatter<'_>, label: &str, blocks: &[BlockNumber]) -> fmt::Result {
    write!(f, "    {}:", label)?;
    for blocknr in blocks {
        write!(f, " {}", blocknr)?;
    }
    writeln!(f)
}

impl fmt::Display for DebugReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sb = &self.super_block;
        writeln!(f, "SuperBlock:")?;
        if sb.has_valid_magic() {
            writeln!(f, "    magic number is valid")?;
        } else {
            writeln!(f, "    magic number is invalid")?;
        }
        writeln!(f, "    {} blocks", sb.blocks)?;
        writeln!(f, "    {} inode blocks", sb.inode_blocks)?;
        writeln!(f, "    {} inodes", sb.inodes)?;

        for node in &self.inodes {
            writeln!(f, "Inode {}:", node.inumber)?;
            writeln!(f, "    size: {} bytes", node.size)?;
            write_blocks(f, "direct blocks", &node.direct)?;
            if let Some((ind_blocknr, blocks)) = &node.indirect {
                writeln!(f, "    indirect block: {}", ind_blocknr)?;
                write_blocks(f, "indirect data blocks", blocks)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{FileBlockEmulator, FileBlockEmulatorBuilder};
    use crate::FileSystem;

    fn create_test_device(blocks: usize) -> FileBlockEmulator {
        FileBlockEmulatorBuilder::from(tempfile::tempfile().unwrap())
            .with_block_size(blocks)
            .build()
            .unwrap()
    }

    #[test]
    fn reports_unformatted_disk_as_invalid() {
        let mut dev = create_test_device(4);
        let report = debug(&mut dev).unwrap();
        assert!(report.inodes.is_empty());
        assert_eq!(
            report.to_string(),
            "SuperBlock:\n    magic number is invalid\n    0 blocks\n    0 inode blocks\n    0 inodes\n"
        );
    }

    #[test]
    fn reports_valid_inodes_with_their_blocks() {
        let mut dev = create_test_device(20);
        let mut fs = FileSystem::new();
        fs.format(&mut dev).unwrap();
        fs.mount(dev).unwrap();
        fs.create().unwrap();
        let inumber = fs.create().unwrap();
        fs.write(inumber, b"hello", 0).unwrap();
        let mut dev = fs.unmount().unwrap();

        let report = debug(&mut dev).unwrap();
        assert_eq!(report.inodes.len(), 2);
        assert_eq!(
            report.to_string(),
            "SuperBlock:\n    magic number is valid\n    20 blocks\n    2 inode blocks\n    256 inodes\n\
             Inode 0:\n    size: 0 bytes\n    direct blocks:\n\
             Inode 1:\n    size: 5 bytes\n    direct blocks: 3\n"
        );
    }

    #[test]
    fn reports_indirect_blocks() {
        let mut dev = create_test_device(20);
        let mut fs = FileSystem::new();
        fs.format(&mut dev).unwrap();
        fs.mount(dev).unwrap();
        let inumber = fs.create().unwrap();
        let data = vec![0xab; 6 * BLOCK_SIZE + 1];
        assert_eq!(fs.write(inumber, &data, 0).unwrap(), data.len());
        let mut dev = fs.unmount().unwrap();

        let report = debug(&mut dev).unwrap();
        let node = &report.inodes[0];
        assert_eq!(node.direct, vec![3, 4, 5, 6, 7]);
        // The indirect block is allocated before the first block it points at.
        assert_eq!(node.indirect, Some((8, vec![9, 10])));
        assert!(report
            .to_string()
            .ends_with("    indirect block: 8\n    indirect data blocks: 9 10\n"));
    }

    #[test]
    fn reports_indirect_pointer_outside_the_device() {
        let mut dev = create_test_device(20);
        FileSystem::new().format(&mut dev).unwrap();

        let mut node = Inode::empty_file();
        node.size = 6 * BLOCK_SIZE as u32;
        node.direct = [Some(3), Some(4), Some(5), Some(6), Some(7)];
        node.indirect = Some(500);
        let mut table = vec![0; BLOCK_SIZE];
        dev.read_block(1, &mut table).unwrap();
        node.write_slot(&mut table, 2);
        dev.write_block(1, &table).unwrap();

        let report = debug(&mut dev).unwrap();
        assert_eq!(report.inodes.len(), 1);
        assert_eq!(report.inodes[0].inumber, 2);
        assert_eq!(report.inodes[0].indirect, Some((500, vec![])));
        assert!(report
            .to_string()
            .ends_with("    indirect block: 500\n    indirect data blocks:\n"));
    }
}
