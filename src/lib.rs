//! VVSFS: a small, block-structured, POSIX-style filesystem image format.
//!
//! Five layers, following the teacher's own module split
//! (`kernel-rs/src/fs/mod.rs`):
//!   + `bitmap`: allocator for raw inode/data bitmap positions.
//!   + `volume`: the superblock, backing device, and bitmap ownership.
//!   + `inode`: on-disk inode records and their lifecycle.
//!   + `block_map`: direct + single-indirect logical-to-physical addressing.
//!   + `dir` / `namespace`: directory storage and the POSIX-style
//!     operations built on top of it.

pub mod bitmap;
pub mod block_map;
pub mod dir;
pub mod error;
pub mod inode;
pub mod layout;
pub mod namespace;
pub mod volume;

pub use dir::DirEntryLoc;
pub use error::{Error, Result};
pub use inode::Inode;
pub use namespace::RenameFlags;
pub use volume::{BlockDevice, Volume, VolumeStats};
