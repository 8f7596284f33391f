//! A small Unix-style file system on a block device.
//!
//! Files are identified by inode number only; there are no directories. Each inode
//! addresses its data through five direct block pointers and one indirect block, and
//! the free block map is kept in memory, rebuilt from the inode table on every mount.
//!
//! ```no_run
//! use sfs::io::{BlockStorage, FileBlockEmulator};
//! use sfs::FileSystem;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut dev = FileBlockEmulator::open_disk("disk.img", 20)?;
//! let mut fs = FileSystem::new();
//! fs.format(&mut dev)?;
//! fs.mount(dev)?;
//!
//! let inumber = fs.create()?;
//! fs.write(inumber, b"hello", 0)?;
//! let mut buf = [0; 5];
//! fs.read(inumber, &mut buf, 0)?;
//! # Ok(())
//! # }
//! ```
mod alloc;
mod debug;
mod fs;
pub mod io;
pub mod layout;
mod node;
mod rw;
mod sb;

pub use crate::alloc::State;
pub use crate::debug::{debug, DebugReport, InodeReport};
pub use crate::fs::{FileSystem, SFSError};
pub use crate::node::{Inode, InodeNumber};
pub use crate::sb::SuperBlock;
