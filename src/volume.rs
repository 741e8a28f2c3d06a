//! Volume & Superblock (component A).
//!
//! Grounded on the teacher's `Superblock::new` (`kernel-rs/src/fs/mod.rs`),
//! which reads a fixed-layout struct out of block 0 of the device; here the
//! device is any `BlockDevice` rather than the teacher's buffer cache, since
//! this crate has no kernel buffer layer to lean on.

use std::convert::TryInto;
use std::io::{Read, Seek, SeekFrom, Write};

use log::{debug, trace};

use crate::bitmap;
use crate::error::{Error, Result};
use crate::layout::*;

/// Abstraction over the backing store a volume is mounted on.
pub trait BlockDevice {
    fn read_block(&mut self, block: u32) -> std::io::Result<[u8; BLOCK_SIZE]>;
    fn write_block(&mut self, block: u32, data: &[u8; BLOCK_SIZE]) -> std::io::Result<()>;
}

impl<T: Read + Write + Seek> BlockDevice for T {
    fn read_block(&mut self, block: u32) -> std::io::Result<[u8; BLOCK_SIZE]> {
        let mut buf = [0u8; BLOCK_SIZE];
        self.seek(SeekFrom::Start(block as u64 * BLOCK_SIZE as u64))?;
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write_block(&mut self, block: u32, data: &[u8; BLOCK_SIZE]) -> std::io::Result<()> {
        self.seek(SeekFrom::Start(block as u64 * BLOCK_SIZE as u64))?;
        self.write_all(data)?;
        Ok(())
    }
}

/// An open VVSFS volume: the backing device plus the two in-memory bitmaps
/// mirroring blocks 1-3 on disk.
pub struct Volume<D: BlockDevice> {
    dev: D,
    imap: [u8; IMAP_SIZE],
    dmap: [u8; DMAP_SIZE],
}

impl<D: BlockDevice> Volume<D> {
    /// Format a fresh volume: zeroed bitmaps (bit 0 reserved in each),
    /// superblock magic, and a root directory inode occupying data block 0.
    pub fn format(mut dev: D) -> Result<Self> {
        debug!("formatting new vvsfs volume");
        let mut imap = [0u8; IMAP_SIZE];
        let mut dmap = [0u8; DMAP_SIZE];
        bitmap::init(&mut imap);
        bitmap::init(&mut dmap);

        let mut sb_block = [0u8; BLOCK_SIZE];
        sb_block[0..4].copy_from_slice(&MAGIC.to_ne_bytes());
        dev.write_block(SUPERBLOCK_BLOCK, &sb_block)?;

        for b in INODE_BLOCK_OFF..INODE_BLOCK_OFF + INODE_TABLE_BLOCKS {
            dev.write_block(b, &[0u8; BLOCK_SIZE])?;
        }

        let mut vol = Volume { dev, imap, dmap };
        vol.sync_bitmaps()?;

        // Root inode occupies bitmap bit 0, which `bitmap::init` already
        // reserved; with the `ino = bit_pos + 1` mapping that bit is shared
        // with inode 1 rather than consuming a second bit for it.
        let root_block = vol.reserve_data().ok_or(Error::NoSpace)?;
        let root = crate::inode::Inode::new_directory(ROOT_INO, root_block);
        vol.write_inode(&root)?;
        vol.sync_bitmaps()?;
        Ok(vol)
    }

    /// Open an existing volume, verifying the magic number.
    pub fn open(mut dev: D) -> Result<Self> {
        let sb_block = dev.read_block(SUPERBLOCK_BLOCK)?;
        let magic = u32::from_ne_bytes(sb_block[0..4].try_into().unwrap());
        if magic != MAGIC {
            return Err(Error::Invalid);
        }
        let mut imap = [0u8; IMAP_SIZE];
        let imap_block = dev.read_block(IMAP_BLOCK)?;
        imap.copy_from_slice(&imap_block[..IMAP_SIZE]);

        let mut dmap = [0u8; DMAP_SIZE];
        for i in 0..DMAP_BLOCKS {
            let block = dev.read_block(DMAP_BLOCK + i)?;
            let off = i as usize * BLOCK_SIZE;
            dmap[off..off + BLOCK_SIZE].copy_from_slice(&block);
        }
        Ok(Volume { dev, imap, dmap })
    }

    /// Does the device already look like a formatted VVSFS volume?
    pub fn probe(dev: &mut D) -> bool {
        match dev.read_block(SUPERBLOCK_BLOCK) {
            Ok(sb_block) => u32::from_ne_bytes(sb_block[0..4].try_into().unwrap()) == MAGIC,
            Err(_) => false,
        }
    }

    pub fn read_block(&mut self, block: u32) -> Result<[u8; BLOCK_SIZE]> {
        Ok(self.dev.read_block(block)?)
    }

    pub fn write_block(&mut self, block: u32, data: &[u8; BLOCK_SIZE]) -> Result<()> {
        trace!("write_block {}", block);
        Ok(self.dev.write_block(block, data)?)
    }

    /// Reserve an inode, returning its inode number. The inode bitmap is
    /// offset by one from inode numbers (`ino = bit_pos + 1`) so that inode
    /// 0 is never a valid inode number, matching the original format's
    /// `BNO_TO_INO`/`INO_TO_BNO` mapping.
    pub fn reserve_inode(&mut self) -> Option<u32> {
        bitmap::reserve(&mut self.imap).map(|pos| pos + 1)
    }

    pub fn free_inode(&mut self, ino: u32) {
        bitmap::free(&mut self.imap, ino - 1);
    }

    /// Reserve a data block, returning its data-bitmap *position* (not the
    /// physical block number; see `layout::data_block`).
    pub fn reserve_data(&mut self) -> Option<u32> {
        bitmap::reserve(&mut self.dmap)
    }

    pub fn free_data(&mut self, pos: u32) {
        bitmap::free(&mut self.dmap, pos);
    }

    pub fn read_data(&mut self, pos: u32) -> Result<[u8; BLOCK_SIZE]> {
        self.read_block(data_block(pos))
    }

    pub fn write_data(&mut self, pos: u32, data: &[u8; BLOCK_SIZE]) -> Result<()> {
        self.write_block(data_block(pos), data)
    }

    pub fn zero_data(&mut self, pos: u32) -> Result<()> {
        self.write_data(pos, &[0u8; BLOCK_SIZE])
    }

    /// Persist both bitmaps to their reserved blocks (component F `sync_fs`).
    pub fn sync_bitmaps(&mut self) -> Result<()> {
        let mut imap_block = [0u8; BLOCK_SIZE];
        imap_block[..IMAP_SIZE].copy_from_slice(&self.imap);
        self.write_block(IMAP_BLOCK, &imap_block)?;

        for i in 0..DMAP_BLOCKS {
            let off = i as usize * BLOCK_SIZE;
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(&self.dmap[off..off + BLOCK_SIZE]);
            self.write_block(DMAP_BLOCK + i, &block)?;
        }
        Ok(())
    }

    pub fn read_inode(&mut self, ino: u32) -> Result<crate::inode::Inode> {
        crate::inode::Inode::load(self, ino)
    }

    pub fn write_inode(&mut self, inode: &crate::inode::Inode) -> Result<()> {
        inode.write_back(self)
    }

    /// `statfs`: total/free inode and block counts.
    pub fn stats(&self) -> VolumeStats {
        let total_inodes = (IMAP_SIZE * 8) as u32;
        let total_blocks = (DMAP_SIZE * 8) as u32;
        VolumeStats {
            block_size: BLOCK_SIZE as u32,
            max_name: MAX_NAME as u32,
            magic: MAGIC,
            total_inodes,
            free_inodes: total_inodes - bitmap::count_set(&self.imap),
            total_blocks,
            free_blocks: total_blocks - bitmap::count_set(&self.dmap),
        }
    }

    /// `put_super`: release in-memory bitmap state. No further disk I/O is
    /// required since every mutation is already synced as it happens.
    pub fn put_super(self) {
        debug!("releasing vvsfs volume in-memory state");
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VolumeStats {
    pub block_size: u32,
    pub max_name: u32,
    pub magic: u32,
    pub total_inodes: u32,
    pub free_inodes: u32,
    pub total_blocks: u32,
    pub free_blocks: u32,
}
