//! Direct + single-indirect block addressing (component D).
//!
//! Grounded on the teacher's `bmap`/`bmap_or_alloc`/`bmap_internal`
//! (`kernel-rs/src/fs/ufs/inode.rs`), which dispatch between a direct
//! address array and a lazily-allocated indirect block the same way; the
//! teacher keeps indirect pointers in host order, but this format stores
//! them big-endian explicitly (see `read_ptr`/`write_ptr` below).

use std::convert::TryInto;

use crate::error::{Error, Result};
use crate::inode::Inode;
use crate::layout::*;
use crate::volume::{BlockDevice, Volume};

fn read_ptr(block: &[u8; BLOCK_SIZE], k: usize) -> u32 {
    let off = k * 4;
    u32::from_be_bytes(block[off..off + 4].try_into().unwrap())
}

fn write_ptr(block: &mut [u8; BLOCK_SIZE], k: usize, v: u32) {
    let off = k * 4;
    block[off..off + 4].copy_from_slice(&v.to_be_bytes());
}

impl<D: BlockDevice> Volume<D> {
    /// Return the data-bitmap position of logical block `b` of `inode`.
    pub fn block_index(&mut self, inode: &Inode, b: u32) -> Result<u32> {
        if b < N_DIRECT as u32 {
            return Ok(inode.d.i_block[b as usize]);
        }
        let indirect_pos = inode.d.i_block[N_DIRECT];
        if indirect_pos == 0 {
            return Ok(0);
        }
        let block = self.read_data(indirect_pos)?;
        Ok(read_ptr(&block, (b - N_DIRECT as u32) as usize))
    }

    /// Resolve (and, if `create`, allocate) the data-bitmap position backing
    /// logical block `b` of `inode` (§4.2). Returns 0 for a sparse read
    /// beyond the inode's current block count when `create` is false.
    pub fn block_index_or_create(
        &mut self,
        inode: &mut Inode,
        b: u32,
        create: bool,
    ) -> Result<u32> {
        if b >= MAX_INODE_BLOCKS {
            return Err(Error::TooBig);
        }
        let n = inode.d.i_data_blocks_count;
        if b > n {
            return Ok(0);
        }
        if b < n {
            return self.block_index(inode, b);
        }
        // b == n: grow by exactly one block.
        if !create {
            return Ok(0);
        }

        let new_block = self.reserve_data().ok_or(Error::NoSpace)?;
        self.zero_data(new_block)?;

        if b < N_DIRECT as u32 {
            inode.d.i_block[b as usize] = new_block;
            inode.d.i_data_blocks_count += 1;
            return Ok(new_block);
        }

        if n < N_BLOCK_SLOTS as u32 {
            // First block to go indirect: repurpose `new_block` as the
            // indirect block itself and reserve a second block for payload.
            let payload = match self.reserve_data() {
                Some(p) => p,
                None => {
                    self.free_data(new_block);
                    return Err(Error::NoSpace);
                }
            };
            if let Err(e) = self.zero_data(payload) {
                self.free_data(new_block);
                self.free_data(payload);
                return Err(e);
            }
            let mut indirect_block = [0u8; BLOCK_SIZE];
            write_ptr(&mut indirect_block, 0, payload);
            if let Err(e) = self.write_data(new_block, &indirect_block) {
                self.free_data(new_block);
                self.free_data(payload);
                return Err(e);
            }
            inode.d.i_block[N_DIRECT] = new_block;
            inode.d.i_data_blocks_count += 1;
            return Ok(payload);
        }

        let indirect_pos = inode.d.i_block[N_DIRECT];
        let mut indirect_block = self.read_data(indirect_pos)?;
        write_ptr(&mut indirect_block, (b - N_DIRECT as u32) as usize, new_block);
        self.write_data(indirect_pos, &indirect_block)?;
        inode.d.i_data_blocks_count += 1;
        Ok(new_block)
    }
}
