//! Inode table and inode lifecycle (components C + G).
//!
//! `Dinode` is the on-disk record; grounded on the teacher's `Dinode`
//! (`kernel-rs/src/fs/ufs/inode.rs`), which is likewise a `repr(C)` struct
//! deriving `zerocopy`'s `AsBytes`/`FromBytes` for direct (de)serialization
//! to/from a raw block buffer. The in-memory `Inode` plays the role of the
//! teacher's `InodeInner` + `RcInode` pairing, simplified since this crate
//! has no arena/refcount cache: callers own their `Inode` values directly
//! and call `Volume::write_inode` to persist changes.

use std::convert::TryInto;

use zerocopy::{AsBytes, FromBytes};

use crate::error::{Error, Result};
use crate::layout::*;
use crate::volume::{BlockDevice, Volume};

/// Read a plain-old-data struct out of a byte buffer. `zerocopy` 0.5 has no
/// `read_from` helper (added in later versions); this mirrors what it does
/// under the hood for a `Copy` `repr(C)` type with no padding invariants.
fn read_struct<T: Copy>(buf: &[u8]) -> T {
    assert!(buf.len() >= core::mem::size_of::<T>());
    unsafe { std::ptr::read_unaligned(buf.as_ptr() as *const T) }
}

pub const S_IFMT: u32 = 0o170000;
pub const S_IFSOCK: u32 = 0o140000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFBLK: u32 = 0o060000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFCHR: u32 = 0o020000;
pub const S_IFIFO: u32 = 0o010000;

/// On-disk inode record (256 bytes). Only the leading fields are defined;
/// the remainder is reserved padding, kept zeroed.
#[repr(C)]
#[derive(Clone, Copy, Debug, AsBytes, FromBytes)]
pub struct Dinode {
    pub i_mode: u32,
    pub i_size: u32,
    pub i_links_count: u32,
    pub i_data_blocks_count: u32,
    pub i_block: [u32; N_BLOCK_SLOTS],
    pub i_uid: u32,
    pub i_gid: u32,
    pub i_atime: u32,
    pub i_mtime: u32,
    pub i_ctime: u32,
    pub i_rdev: u32,
    reserved: [u8; INODE_SIZE - 4 * (10 + N_BLOCK_SLOTS)],
}

static_assertions::const_assert_eq!(core::mem::size_of::<Dinode>(), INODE_SIZE);

impl Default for Dinode {
    fn default() -> Self {
        Dinode {
            i_mode: 0,
            i_size: 0,
            i_links_count: 0,
            i_data_blocks_count: 0,
            i_block: [0; N_BLOCK_SLOTS],
            i_uid: 0,
            i_gid: 0,
            i_atime: 0,
            i_mtime: 0,
            i_ctime: 0,
            i_rdev: 0,
            reserved: [0; INODE_SIZE - 4 * (10 + N_BLOCK_SLOTS)],
        }
    }
}

/// In-memory inode: a decoded `Dinode` plus its inode number.
#[derive(Clone, Debug)]
pub struct Inode {
    pub ino: u32,
    pub d: Dinode,
}

fn now() -> u32 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

impl Inode {
    pub fn is_dir(&self) -> bool {
        self.d.i_mode & S_IFMT == S_IFDIR
    }

    pub fn is_reg(&self) -> bool {
        self.d.i_mode & S_IFMT == S_IFREG
    }

    pub fn is_symlink(&self) -> bool {
        self.d.i_mode & S_IFMT == S_IFLNK
    }

    pub fn block_count(&self) -> u32 {
        self.d.i_data_blocks_count
    }

    /// Construct a fresh root directory inode occupying `data_block` as its
    /// sole (direct) data block.
    pub fn new_directory(ino: u32, data_block: u32) -> Self {
        let mut d = Dinode::default();
        d.i_mode = S_IFDIR | 0o777;
        d.i_links_count = 1;
        d.i_data_blocks_count = 1;
        d.i_block[0] = data_block;
        let t = now();
        d.i_atime = t;
        d.i_mtime = t;
        d.i_ctime = t;
        Inode { ino, d }
    }

    pub fn load<D: BlockDevice>(vol: &mut Volume<D>, ino: u32) -> Result<Inode> {
        let block = vol.read_block(inode_block(ino))?;
        let off = inode_offset(ino);
        let d: Dinode = read_struct(&block[off..off + INODE_SIZE]);
        if d.i_mode == 0 {
            return Err(Error::NotFound);
        }
        Ok(Inode { ino, d })
    }

    pub fn write_back<D: BlockDevice>(&self, vol: &mut Volume<D>) -> Result<()> {
        let mut block = vol.read_block(inode_block(self.ino))?;
        let off = inode_offset(self.ino);
        block[off..off + INODE_SIZE].copy_from_slice(self.d.as_bytes());
        vol.write_block(inode_block(self.ino), &block)
    }

    pub fn touch_mtime(&mut self) {
        let t = now();
        self.d.i_mtime = t;
        self.d.i_ctime = t;
    }

    pub fn touch_atime(&mut self) {
        self.d.i_atime = now();
    }
}

impl<D: BlockDevice> Volume<D> {
    /// Allocate a new inode of the given `mode`/`rdev` with a single initial
    /// data block (component G `allocate`, §4.5).
    pub fn allocate_inode(&mut self, mode: u32, rdev: u32) -> Result<Inode> {
        let ino = self.reserve_inode().ok_or(Error::NoSpace)?;
        let data = match self.reserve_data() {
            Some(pos) => pos,
            None => {
                self.free_inode(ino);
                return Err(Error::NoSpace);
            }
        };
        self.zero_data(data)?;

        let mut d = Dinode::default();
        d.i_mode = mode;
        d.i_links_count = 1;
        d.i_data_blocks_count = 1;
        d.i_block[0] = data;
        d.i_rdev = rdev;
        let t = now();
        d.i_atime = t;
        d.i_mtime = t;
        d.i_ctime = t;

        let inode = Inode { ino, d };
        self.write_inode(&inode)?;
        self.sync_bitmaps()?;
        log::debug!("allocated inode {} mode {:o}", ino, mode);
        Ok(inode)
    }

    /// Free every data block (direct, indirect payload, indirect block
    /// itself) and the inode-bitmap bit of `inode` (component G, §4.5).
    fn free_all_data_blocks(&mut self, inode: &Inode) -> Result<()> {
        let n = inode.d.i_data_blocks_count;
        let direct_n = n.min(N_DIRECT as u32);
        for i in 0..direct_n {
            self.free_data(inode.d.i_block[i as usize]);
        }
        if n > N_DIRECT as u32 {
            let indirect_pos = inode.d.i_block[N_DIRECT];
            let block = self.read_data(indirect_pos)?;
            let payload_count = n - N_DIRECT as u32;
            for k in 0..payload_count {
                let off = k as usize * 4;
                let ptr = u32::from_be_bytes(block[off..off + 4].try_into().unwrap());
                if ptr != 0 {
                    self.free_data(ptr);
                }
            }
            self.free_data(indirect_pos);
        }
        Ok(())
    }

    /// Decrement `inode`'s link count; when it reaches zero, reclaim all of
    /// its storage (component G `drop_link`, §4.5).
    pub fn drop_link(&mut self, inode: &mut Inode) -> Result<()> {
        if inode.d.i_links_count > 0 {
            inode.d.i_links_count -= 1;
        }
        if inode.d.i_links_count == 0 {
            log::info!("inode {} link count reached zero, reclaiming", inode.ino);
            self.free_all_data_blocks(inode)?;
            self.free_inode(inode.ino);
            inode.d.i_mode = 0;
            self.sync_bitmaps()?;
        } else {
            self.write_inode(inode)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Volume;

    fn mem_dev() -> std::io::Cursor<Vec<u8>> {
        std::io::Cursor::new(vec![0u8; BLOCK_SIZE * 4200])
    }

    #[test]
    fn inode_round_trip() {
        let mut vol = Volume::format(mem_dev()).unwrap();
        let inode = vol.allocate_inode(S_IFREG | 0o644, 0).unwrap();
        let loaded = vol.read_inode(inode.ino).unwrap();
        assert_eq!(loaded.d.i_mode, inode.d.i_mode);
        assert_eq!(loaded.d.i_data_blocks_count, inode.d.i_data_blocks_count);
        assert_eq!(loaded.d.i_block, inode.d.i_block);
    }

    #[test]
    fn addressing_bijection() {
        for ino in 1..=64u32 {
            let b = inode_block(ino);
            let o = inode_offset(ino);
            assert!(b >= INODE_BLOCK_OFF);
            assert!(o < BLOCK_SIZE);
        }
        assert_ne!(
            (inode_block(1), inode_offset(1)),
            (inode_block(2), inode_offset(2))
        );
    }
}
