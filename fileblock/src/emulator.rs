use crate::blockio::{BlockNumber, BlockStorage, IoStats, BLOCK_SIZE};
use log::{debug, info};
use std::fs::{File, OpenOptions};
use std::io::prelude::*;
use std::io::{BufWriter, ErrorKind, SeekFrom};
use std::path::Path;

pub struct FileBlockEmulator {
    /// The file must be a fixed-size file some exact multiple of the size of a block.
    fd: File,
    /// The total number of blocks available in the file store.
    block_count: usize,
    stats: IoStats,
}

/// Emulates block disk/flash storage in userspace using a file as block storage.
/// This is only meant to be used for file system development and testing.
impl FileBlockEmulator {
    /// Returns ownership of the underlying file descriptor to the caller.
    pub fn into_file(self) -> File {
        self.fd
    }

    /// Flushes the device and reports how many transfers it served. The counts are
    /// also logged, mirroring what a physical disk driver reports on detach.
    pub fn close(mut self) -> std::io::Result<IoStats> {
        self.sync_disk()?;
        info!(
            "closing disk: {} reads, {} writes",
            self.stats.reads, self.stats.writes
        );
        Ok(self.stats)
    }

    fn sanity_check(&self, blocknr: BlockNumber, len: usize) -> std::io::Result<()> {
        if blocknr >= self.block_count {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "block {} out of range for disk of {} blocks",
                    blocknr, self.block_count
                ),
            ));
        }
        if len != BLOCK_SIZE {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("buffer of {} bytes is not exactly one block", len),
            ));
        }
        Ok(())
    }
}

impl BlockStorage for FileBlockEmulator {
    fn open_disk<P: AsRef<Path>>(dest: P, nblocks: usize) -> std::io::Result<Self>
    where
        Self: std::marker::Sized,
    {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(dest)?;
        file.set_len((nblocks * BLOCK_SIZE) as u64)?;
        debug!("opened disk image with {} blocks", nblocks);

        Ok(FileBlockEmulator {
            fd: file,
            block_count: nblocks,
            stats: IoStats::default(),
        })
    }

    fn block_count(&self) -> usize {
        self.block_count
    }

    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> std::io::Result<()> {
        self.sanity_check(blocknr, buf.len())?;
        self.fd
            .seek(SeekFrom::Start((blocknr * BLOCK_SIZE) as u64))?;
        self.fd.read_exact(buf)?;
        self.stats.reads += 1;
        Ok(())
    }

    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()> {
        self.sanity_check(blocknr, buf.len())?;
        self.fd
            .seek(SeekFrom::Start((blocknr * BLOCK_SIZE) as u64))?;
        self.fd.write_all(buf)?;
        self.stats.writes += 1;
        Ok(())
    }

    fn sync_disk(&mut self) -> std::io::Result<()> {
        self.fd.sync_all()?;
        Ok(())
    }

    fn io_stats(&self) -> IoStats {
        self.stats
    }
}

pub struct FileBlockEmulatorBuilder {
    fd: File,
    block_count: usize,
    clear_medium: bool,
}

impl From<File> for FileBlockEmulatorBuilder {
    fn from(fd: File) -> Self {
        FileBlockEmulatorBuilder {
            fd,
            // A better default here might be the size of the file rounded down
            // to the nearest block.
            block_count: 0,
            clear_medium: true,
        }
    }
}

impl FileBlockEmulatorBuilder {
    /// Sets the number of desired blocks in the block store device.
    pub fn with_block_size(mut self, blocks: usize) -> Self {
        self.block_count = blocks;
        self
    }

    /// Whether `build` zero fills the medium. Disable this to reattach to an image that
    /// already holds a file system.
    pub fn clear_medium(mut self, clear: bool) -> Self {
        self.clear_medium = clear;
        self
    }

    /// This builder assumed ownership of the file descriptor used and does
    /// destructive things to prepare the file for use. Additionally, ownership
    /// of the file is transfered to the emulator meaning this builder can only
    /// be used to create one emulator.
    pub fn build(mut self) -> std::io::Result<FileBlockEmulator> {
        if self.block_count == 0 {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "block device must have at least one block",
            ));
        }
        if self.clear_medium {
            self.zero_blocks()?;
        }
        self.fd.set_len((self.block_count * BLOCK_SIZE) as u64)?;
        Ok(FileBlockEmulator {
            fd: self.fd,
            block_count: self.block_count,
            stats: IoStats::default(),
        })
    }

    fn zero_blocks(&mut self) -> std::io::Result<()> {
        self.fd.seek(SeekFrom::Start(0))?;
        let zero_block = [0x00; BLOCK_SIZE];
        let mut bfd = BufWriter::new(&self.fd);
        // Zero out the "disk" block, buffering each write to prevent excessive writes.
        for _ in 0..self.block_count {
            bfd.write_all(&zero_block)?;
        }
        bfd.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_disk(blocks: usize) -> FileBlockEmulator {
        let fs_block = tempfile::tempfile().unwrap();
        FileBlockEmulatorBuilder::from(fs_block)
            .with_block_size(blocks)
            .build()
            .expect("failed to allocate file block")
    }

    #[test]
    fn file_emulator_allocates_correct_num_bytes() {
        let mut disk_emu = build_disk(4);
        disk_emu.sync_disk().unwrap();
        assert_eq!(disk_emu.block_count(), 4);
        assert_eq!(disk_emu.into_file().metadata().unwrap().len(), 4 * 4096);
    }

    #[test]
    fn can_read_and_write_blocks() {
        let mut disk_emu = build_disk(4);

        // Allocate a block with a non-zero character.
        let block = vec![0x55; 4096];
        disk_emu.write_block(2, &block).unwrap();
        disk_emu.sync_disk().unwrap();

        let mut read_block = vec![0x00; 4096];
        // Read a different block.
        disk_emu.read_block(3, read_block.as_mut_slice()).unwrap();
        assert_eq!(read_block, vec![0x00; 4096]);

        // Read the block with data.
        let mut filled_block = vec![0x00; 4096];
        disk_emu.read_block(2, filled_block.as_mut_slice()).unwrap();
        assert_eq!(filled_block, vec![0x55; 4096]);
    }

    #[test]
    fn can_read_and_write_start_and_end_blocks() {
        let mut disk_emu = build_disk(2);

        disk_emu.write_block(0, &[0x55; 4096]).unwrap();
        disk_emu.write_block(1, &[0xAA; 4096]).unwrap();

        let mut read_block = vec![0x00; 4096];
        disk_emu.read_block(0, read_block.as_mut_slice()).unwrap();
        assert_eq!(read_block, vec![0x55; 4096]);

        disk_emu.read_block(1, read_block.as_mut_slice()).unwrap();
        assert_eq!(read_block, vec![0xAA; 4096]);
    }

    #[test]
    fn read_and_write_beyond_range_return_error() {
        let mut disk_emu = build_disk(1);

        let block = vec![0x55; 4096];
        let err = disk_emu.write_block(1, &block).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let mut read_block = vec![0x00; 4096];
        let err = disk_emu.read_block(1, &mut read_block).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn partial_block_buffers_are_rejected() {
        let mut disk_emu = build_disk(1);

        assert!(disk_emu.write_block(0, &[0x55; 2048]).is_err());
        let mut short = vec![0; 512];
        assert!(disk_emu.read_block(0, &mut short).is_err());
        assert_eq!(disk_emu.io_stats(), IoStats::default());
    }

    #[test]
    fn counts_successful_transfers_only() {
        let mut disk_emu = build_disk(2);
        let mut buf = vec![0; 4096];

        disk_emu.write_block(0, &buf).unwrap();
        disk_emu.read_block(0, &mut buf).unwrap();
        disk_emu.read_block(1, &mut buf).unwrap();
        assert!(disk_emu.read_block(7, &mut buf).is_err());

        let stats = disk_emu.close().unwrap();
        assert_eq!(stats, IoStats { reads: 2, writes: 1 });
    }

    #[test]
    fn builder_can_keep_existing_content() {
        let disk = tempfile::NamedTempFile::new().unwrap();
        let mut dev = FileBlockEmulatorBuilder::from(disk.reopen().unwrap())
            .with_block_size(2)
            .build()
            .unwrap();
        dev.write_block(1, &[0x7f; 4096]).unwrap();
        dev.sync_disk().unwrap();

        let mut dev = FileBlockEmulatorBuilder::from(disk.reopen().unwrap())
            .with_block_size(2)
            // Don't reset initialized disk.
            .clear_medium(false)
            .build()
            .unwrap();
        let mut buf = vec![0; 4096];
        dev.read_block(1, &mut buf).unwrap();
        assert_eq!(buf, vec![0x7f; 4096]);
    }

    #[test]
    fn open_disk_creates_and_sizes_backing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.sfs");

        let mut dev = FileBlockEmulator::open_disk(&path, 3).unwrap();
        assert_eq!(dev.block_count(), 3);
        dev.write_block(2, &[0x11; 4096]).unwrap();
        dev.close().unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 3 * 4096);

        // Reopening keeps the content that fits.
        let mut dev = FileBlockEmulator::open_disk(&path, 3).unwrap();
        let mut buf = vec![0; 4096];
        dev.read_block(2, &mut buf).unwrap();
        assert_eq!(buf, vec![0x11; 4096]);
    }

    #[test]
    fn building_an_empty_device_fails() {
        let fs_block = tempfile::tempfile().unwrap();
        assert!(FileBlockEmulatorBuilder::from(fs_block).build().is_err());
    }
}
