//! Formats a small disk image, stores a greeting in it and prints the debug report.
//!
//! Usage: `cargo run --example hello [IMAGE]`
use std::env;

use sfs::io::{BlockStorage, FileBlockEmulator};
use sfs::{FileSystem, SFSError};

const DISK_BLOCKS: usize = 20;

fn main() -> Result<(), SFSError> {
    let path = env::args().nth(1).unwrap_or_else(|| "hello.sfs".to_string());

    let mut dev = FileBlockEmulator::open_disk(&path, DISK_BLOCKS)?;
    let mut fs = FileSystem::new();
    fs.format(&mut dev)?;
    fs.mount(dev)?;

    let inumber = fs.create()?;
    let written = fs.write(inumber, b"hello", 0)?;
    println!("wrote {} bytes to inode {}", written, inumber);

    let mut buf = vec![0; fs.stat(inumber)?];
    fs.read(inumber, &mut buf, 0)?;
    println!("read back {:?}", String::from_utf8_lossy(&buf));

    let mut dev = match fs.unmount() {
        Some(dev) => dev,
        None => return Err(SFSError::NotMounted),
    };
    print!("{}", sfs::debug(&mut dev)?);

    let stats = dev.close()?;
    println!("{} block reads, {} block writes", stats.reads, stats.writes);
    Ok(())
}
