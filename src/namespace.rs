//! Namespace operations (component F): create, mkdir, mknod, symlink, link,
//! lookup, unlink, rmdir, readdir, rename.
//!
//! Grounded on the teacher's `impl FileSystem for Ufs`
//! (`kernel-rs/src/fs/ufs/mod.rs`: `create`, `link`, `unlink`, `namei`) for
//! the overall shape of each operation, and on
//! `original_source/vvsfs/namei.c` (`vvsfs_rename`, `vvsfs_mknod`,
//! `vvsfs_symlink`) for the POSIX error surface this format additionally
//! needs that the teacher's toy filesystem doesn't implement (rename flag
//! rejection, `NOREPLACE`/`EXCHANGE` handling, the `old_valid_dev` device
//! number check).

use bitflags::bitflags;
use log::{info, warn};

use crate::dir::DirEntryLoc;
use crate::error::{Error, Result};
use crate::inode::{Inode, S_IFDIR, S_IFLNK};
use crate::layout::{BLOCK_SIZE, MAX_NAME};
use crate::volume::{BlockDevice, Volume};

bitflags! {
    /// Mirrors the Linux `RENAME_*` flag bits this format recognizes.
    pub struct RenameFlags: u32 {
        const NOREPLACE = 0b001;
        const EXCHANGE  = 0b010;
        const WHITEOUT  = 0b100;
    }
}

impl<D: BlockDevice> Volume<D> {
    fn check_name(name: &str) -> Result<()> {
        if name.is_empty() || name.len() > MAX_NAME {
            return Err(Error::NameTooLong);
        }
        Ok(())
    }

    /// create / mknod, parameterized by mode and device number.
    pub fn create(
        &mut self,
        parent: &mut Inode,
        name: &str,
        mode: u32,
        rdev: u32,
    ) -> Result<Inode> {
        Self::check_name(name)?;
        if self.dir_find(parent, name)?.is_some() {
            return Err(Error::Exists);
        }
        let mut inode = self.allocate_inode(mode, rdev)?;
        if let Err(e) = self.dir_add(parent, name, inode.ino) {
            warn!("create {} failed, rolling back inode {}", name, inode.ino);
            self.drop_link(&mut inode)?;
            return Err(e);
        }
        self.write_inode(parent)?;
        info!("create {:?} -> inode {}", name, inode.ino);
        Ok(inode)
    }

    pub fn mkdir(&mut self, parent: &mut Inode, name: &str, mode: u32) -> Result<Inode> {
        self.create(parent, name, mode | S_IFDIR, 0)
    }

    /// mknod for device/special files; rejects device numbers that don't
    /// fit the historical 8-bit major/8-bit minor encoding, mirroring the
    /// original's `old_valid_dev()` guard.
    pub fn mknod(
        &mut self,
        parent: &mut Inode,
        name: &str,
        mode: u32,
        major: u32,
        minor: u32,
    ) -> Result<Inode> {
        if major >= 256 || minor >= 256 {
            return Err(Error::Invalid);
        }
        let rdev = (major << 8) | minor;
        self.create(parent, name, mode, rdev)
    }

    /// symlink: the target path is written into the new inode's first data
    /// block (already allocated by `allocate_inode`), NUL-terminated.
    pub fn symlink(&mut self, parent: &mut Inode, name: &str, target: &str) -> Result<Inode> {
        if target.len() + 1 > BLOCK_SIZE {
            return Err(Error::Invalid);
        }
        let mut inode = self.create(parent, name, S_IFLNK | 0o777, 0)?;
        let data_pos = inode.d.i_block[0];
        let mut block = [0u8; BLOCK_SIZE];
        let bytes = target.as_bytes();
        block[..bytes.len()].copy_from_slice(bytes);
        self.write_data(data_pos, &block)?;
        inode.d.i_size = bytes.len() as u32;
        self.write_inode(&inode)?;
        Ok(inode)
    }

    pub fn read_symlink(&mut self, inode: &Inode) -> Result<String> {
        if !inode.is_symlink() {
            return Err(Error::Invalid);
        }
        let block = self.read_data(inode.d.i_block[0])?;
        let len = inode.d.i_size as usize;
        Ok(String::from_utf8_lossy(&block[..len]).into_owned())
    }

    /// Hard-link `target` into `parent` under `name`.
    pub fn link(&mut self, target: &mut Inode, parent: &mut Inode, name: &str) -> Result<()> {
        Self::check_name(name)?;
        if self.dir_find(parent, name)?.is_some() {
            return Err(Error::Exists);
        }
        target.d.i_links_count += 1;
        self.write_inode(target)?;
        if let Err(e) = self.dir_add(parent, name, target.ino) {
            target.d.i_links_count -= 1;
            self.write_inode(target)?;
            return Err(e);
        }
        self.write_inode(parent)?;
        Ok(())
    }

    pub fn lookup(&mut self, parent: &Inode, name: &str) -> Result<Inode> {
        let (_, ino) = self.dir_find(parent, name)?.ok_or(Error::NotFound)?;
        self.read_inode(ino)
    }

    fn unlink_locked(&mut self, parent: &mut Inode, name: &str) -> Result<(Inode, DirEntryLoc)> {
        let (loc, ino) = self.dir_find(parent, name)?.ok_or(Error::NotFound)?;
        let victim = self.read_inode(ino)?;
        Ok((victim, loc))
    }

    pub fn unlink(&mut self, parent: &mut Inode, name: &str) -> Result<()> {
        let (mut victim, loc) = self.unlink_locked(parent, name)?;
        if victim.is_dir() {
            return Err(Error::IsDir);
        }
        self.dir_remove(parent, loc)?;
        self.write_inode(parent)?;
        self.drop_link(&mut victim)?;
        info!("unlink {:?}", name);
        Ok(())
    }

    pub fn rmdir(&mut self, parent: &mut Inode, name: &str) -> Result<()> {
        let (mut victim, loc) = self.unlink_locked(parent, name)?;
        if !victim.is_dir() {
            return Err(Error::NotDir);
        }
        if !self.dir_is_empty(&victim)? {
            return Err(Error::NotEmpty);
        }
        self.dir_remove(parent, loc)?;
        self.write_inode(parent)?;
        self.drop_link(&mut victim)?;
        info!("rmdir {:?}", name);
        Ok(())
    }

    /// Entries from `dir`, starting at byte `cursor` (a multiple of
    /// `DENTRY_SIZE`); pass 0 to list from the beginning.
    pub fn readdir(&mut self, dir: &Inode, cursor: u32) -> Result<Vec<(String, u32)>> {
        let all = self.dir_read_all(dir)?;
        let skip = (cursor / crate::layout::DENTRY_SIZE as u32) as usize;
        Ok(all.into_iter().skip(skip).collect())
    }

    pub fn rename(
        &mut self,
        old_parent: &mut Inode,
        old_name: &str,
        new_parent: &mut Inode,
        new_name: &str,
        flags: RenameFlags,
    ) -> Result<()> {
        if flags.intersects(RenameFlags::EXCHANGE | RenameFlags::WHITEOUT) {
            return Err(Error::Invalid);
        }
        Self::check_name(new_name)?;

        let (source_loc, source_ino) =
            self.dir_find(old_parent, old_name)?.ok_or(Error::NotFound)?;
        let target = self.dir_find(new_parent, new_name)?;

        if let Some((_, target_ino)) = target {
            if target_ino == source_ino {
                return Ok(());
            }
            if flags.contains(RenameFlags::NOREPLACE) {
                return Err(Error::Exists);
            }
        }

        let source_inode = self.read_inode(source_ino)?;
        let mut target_inode = match target {
            Some((_, ino)) => Some(self.read_inode(ino)?),
            None => None,
        };

        if source_inode.is_dir() {
            if let Some(t) = &target_inode {
                if !t.is_dir() {
                    return Err(Error::NotDir);
                }
                if !self.dir_is_empty(t)? {
                    return Err(Error::NotEmpty);
                }
            }
        } else if let Some(t) = &target_inode {
            if t.is_dir() {
                return Err(Error::IsDir);
            }
        }

        if let Some((target_loc, _)) = self.dir_find(new_parent, new_name)? {
            self.dir_exchange(new_parent, target_loc, source_ino)?;
            self.write_inode(new_parent)?;
            if let Some(t) = target_inode.as_mut() {
                t.touch_mtime();
                self.drop_link(t)?;
            }
        } else {
            self.dir_add(new_parent, new_name, source_ino)?;
            self.write_inode(new_parent)?;
        }

        self.dir_remove(old_parent, source_loc)?;
        self.write_inode(old_parent)?;
        info!("rename {:?} -> {:?}", old_name, new_name);
        Ok(())
    }
}
