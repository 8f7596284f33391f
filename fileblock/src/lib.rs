//! Fixed-size block storage backed by a regular file.
//!
//! The file system crate only talks to [`BlockStorage`]; [`FileBlockEmulator`] is the
//! implementation used for development and tests.
mod blockio;
mod emulator;

pub use blockio::{BlockNumber, BlockStorage, IoStats, BLOCK_SIZE};
pub use emulator::{FileBlockEmulator, FileBlockEmulatorBuilder};
