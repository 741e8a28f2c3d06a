//! `mkfs-vvsfs`: formats a raw file or block device as a fresh VVSFS volume.
//!
//! Grounded on `maestro-os-maestro-utils/mkfs/src/ext2.rs` for the
//! "open/seek/write raw struct bytes" pattern, and on
//! `original_source/vvsfs/mkfs.vvsfs.c` for the operation itself (write
//! superblock + bitmaps + root inode, then exit).

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use vvsfs::volume::Volume;

#[derive(Parser)]
#[command(name = "mkfs-vvsfs", about = "Format a device as a VVSFS volume")]
struct Args {
    /// Path to the device or regular file to format.
    device: PathBuf,

    /// Format even if the device already looks like a valid VVSFS volume.
    #[arg(short, long)]
    force: bool,
}

fn run(args: Args) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&args.device)?;

    if !args.force && Volume::probe(&mut file) {
        error!(
            "{} already looks like a vvsfs volume; pass --force to reformat",
            args.device.display()
        );
        return Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "refusing to format an existing volume without --force",
        ));
    }

    Volume::format(file).map_err(std::io::Error::other)?;
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("mkfs-vvsfs: {}", e);
            ExitCode::FAILURE
        }
    }
}
