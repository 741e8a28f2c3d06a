//! On-disk layout constants for the VVSFS image format.
//!
//! Disk layout:
//! [ superblock | inode bitmap | data bitmap (2 blocks) | inode table | data blocks ]

use static_assertions::const_assert_eq;

pub const BLOCK_SIZE: usize = 1024;
pub const SECTOR_SIZE: usize = 512;
pub const INODE_SIZE: usize = 256;
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;

/// Number of direct block-address slots in an inode (`i_block[0..14]`).
pub const N_DIRECT: usize = 14;
/// Total number of block-address slots in an inode (direct + one indirect).
pub const N_BLOCK_SLOTS: usize = 15;

pub const IMAP_SIZE: usize = 512;
pub const DMAP_SIZE: usize = 2048;

pub const SUPERBLOCK_BLOCK: u32 = 0;
pub const IMAP_BLOCK: u32 = 1;
pub const DMAP_BLOCK: u32 = 2;
pub const DMAP_BLOCKS: u32 = 2;
pub const INODE_BLOCK_OFF: u32 = 4;
pub const INODE_TABLE_BLOCKS: u32 = 4096;
pub const DATA_BLOCK_OFF: u32 = INODE_BLOCK_OFF + INODE_TABLE_BLOCKS;

pub const MAX_BLOCKS: u32 = 20484;
pub const MAGIC: u32 = 0xCAFE_B0BA;
pub const MAX_NAME: usize = 123;

pub const DENTRY_SIZE: usize = 128;
pub const DENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DENTRY_SIZE;

/// Pointers-per-indirect-block: one block of big-endian u32 addresses.
pub const PTRS_PER_INDIRECT: usize = BLOCK_SIZE / core::mem::size_of::<u32>();

pub const MAX_INODE_BLOCKS: u32 = (N_DIRECT + PTRS_PER_INDIRECT) as u32;
pub const MAX_FILE_SIZE: u64 = MAX_INODE_BLOCKS as u64 * BLOCK_SIZE as u64;

const_assert_eq!(DENTRIES_PER_BLOCK, 8);
const_assert_eq!(PTRS_PER_INDIRECT, 256);
const_assert_eq!(MAX_INODE_BLOCKS, 270);

/// Root directory's inode number.
pub const ROOT_INO: u32 = 1;

/// Block containing inode `ino` (1-based).
pub const fn inode_block(ino: u32) -> u32 {
    INODE_BLOCK_OFF + (ino - 1) / INODES_PER_BLOCK as u32
}

/// Byte offset of inode `ino` within its block.
pub const fn inode_offset(ino: u32) -> usize {
    ((ino - 1) as usize % INODES_PER_BLOCK) * INODE_SIZE
}

/// Physical block number of data-bitmap position `pos`.
pub const fn data_block(pos: u32) -> u32 {
    DATA_BLOCK_OFF + pos
}
