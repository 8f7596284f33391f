//! Block storage the file system runs on, provided by the `fileblock` crate.
pub use fileblock::{
    BlockNumber, BlockStorage, FileBlockEmulator, FileBlockEmulatorBuilder, IoStats,
};
