//! End-to-end scenarios (S1-S6) against a tempfile-backed volume, grounded
//! on the pack's FUSE filesystem repos' integration-test style (a real file
//! on disk via `tempfile`, not just an in-memory cursor).

use std::io::{Read, Seek, SeekFrom};

use tempfile::tempfile;
use vvsfs::inode::S_IFREG;
use vvsfs::layout::{BLOCK_SIZE, DMAP_BLOCK, IMAP_BLOCK, MAGIC, ROOT_INO};
use vvsfs::namespace::RenameFlags;
use vvsfs::volume::Volume;
use vvsfs::Error;

fn volume_size_blocks() -> usize {
    4400
}

fn backing_file() -> std::fs::File {
    let f = tempfile().unwrap();
    f.set_len((volume_size_blocks() * BLOCK_SIZE) as u64).unwrap();
    f
}

#[test]
fn s1_format_then_mount() {
    let mut file = backing_file();
    let vol = Volume::format(file.try_clone().unwrap()).unwrap();
    drop(vol);

    file.seek(SeekFrom::Start(0)).unwrap();
    let mut magic_bytes = [0u8; 4];
    file.read_exact(&mut magic_bytes).unwrap();
    assert_eq!(u32::from_ne_bytes(magic_bytes), MAGIC);

    file.seek(SeekFrom::Start(IMAP_BLOCK as u64 * BLOCK_SIZE as u64))
        .unwrap();
    let mut imap_byte = [0u8; 1];
    file.read_exact(&mut imap_byte).unwrap();
    // bit 0 reserved and shared with the root inode (ino = bit_pos + 1).
    assert_eq!(imap_byte[0], 0x80);

    file.seek(SeekFrom::Start(DMAP_BLOCK as u64 * BLOCK_SIZE as u64))
        .unwrap();
    let mut dmap_byte = [0u8; 1];
    file.read_exact(&mut dmap_byte).unwrap();
    // bit 0 reserved, bit 1 set for the root directory's data block.
    assert_eq!(dmap_byte[0], 0xC0);

    let mut vol = Volume::open(file).unwrap();
    let root = vol.read_inode(ROOT_INO).unwrap();
    assert!(root.is_dir());
    assert_eq!(root.d.i_mode & 0o777, 0o777);
}

#[test]
fn s2_create_and_readdir() {
    let mut vol = Volume::format(backing_file()).unwrap();
    let mut root = vol.read_inode(ROOT_INO).unwrap();
    vol.create(&mut root, "a", S_IFREG | 0o644, 0).unwrap();
    vol.create(&mut root, "b", S_IFREG | 0o644, 0).unwrap();
    root = vol.read_inode(ROOT_INO).unwrap();

    let entries = vol.readdir(&root, 0).unwrap();
    assert_eq!(
        entries,
        vec![("a".to_string(), 2), ("b".to_string(), 3)]
    );
    assert_eq!(root.d.i_size, 256);
}

#[test]
fn s3_unlink_middle_compacts() {
    let mut vol = Volume::format(backing_file()).unwrap();
    let mut root = vol.read_inode(ROOT_INO).unwrap();
    vol.create(&mut root, "a", S_IFREG | 0o644, 0).unwrap();
    vol.create(&mut root, "b", S_IFREG | 0o644, 0).unwrap();
    vol.create(&mut root, "c", S_IFREG | 0o644, 0).unwrap();
    root = vol.read_inode(ROOT_INO).unwrap();

    vol.unlink(&mut root, "b").unwrap();
    root = vol.read_inode(ROOT_INO).unwrap();

    let names: Vec<String> = vol
        .readdir(&root, 0)
        .unwrap()
        .into_iter()
        .map(|(n, _)| n)
        .collect();
    assert_eq!(names, vec!["a".to_string(), "c".to_string()]);
}

#[test]
fn s4_grow_past_direct() {
    let mut vol = Volume::format(backing_file()).unwrap();
    let mut root = vol.read_inode(ROOT_INO).unwrap();
    for i in 0..113 {
        let name = format!("f{}", i);
        vol.create(&mut root, &name, S_IFREG | 0o644, 0).unwrap();
        root = vol.read_inode(ROOT_INO).unwrap();
    }
    assert_eq!(root.d.i_data_blocks_count, 15);
    assert_ne!(root.d.i_block[14], 0);
    let first_ptr = vol.block_index(&root, 14).unwrap();
    assert_ne!(first_ptr, 0);
}

#[test]
fn s5_rmdir_non_empty() {
    let mut vol = Volume::format(backing_file()).unwrap();
    let mut root = vol.read_inode(ROOT_INO).unwrap();
    vol.mkdir(&mut root, "d", 0o755).unwrap();
    root = vol.read_inode(ROOT_INO).unwrap();

    let mut d = vol.lookup(&root, "d").unwrap();
    vol.create(&mut d, "x", S_IFREG | 0o644, 0).unwrap();

    let err = vol.rmdir(&mut root, "d").unwrap_err();
    assert!(matches!(err, Error::NotEmpty));

    d = vol.lookup(&root, "d").unwrap();
    vol.unlink(&mut d, "x").unwrap();
    vol.rmdir(&mut root, "d").unwrap();

    root = vol.read_inode(ROOT_INO).unwrap();
    assert!(vol.lookup(&root, "d").is_err());
}

#[test]
fn s6_rename_over_existing_file() {
    let mut vol = Volume::format(backing_file()).unwrap();
    let mut root = vol.read_inode(ROOT_INO).unwrap();
    let a = vol.create(&mut root, "a", S_IFREG | 0o644, 0).unwrap();
    root = vol.read_inode(ROOT_INO).unwrap();
    vol.create(&mut root, "b", S_IFREG | 0o644, 0).unwrap();
    root = vol.read_inode(ROOT_INO).unwrap();

    let mut root2 = vol.read_inode(ROOT_INO).unwrap();
    vol.rename(&mut root, "a", &mut root2, "b", RenameFlags::empty())
        .unwrap();

    root = vol.read_inode(ROOT_INO).unwrap();
    assert!(vol.lookup(&root, "a").is_err());
    let b = vol.lookup(&root, "b").unwrap();
    assert_eq!(b.ino, a.ino);
}

#[test]
fn rename_is_noop_for_same_inode() {
    let mut vol = Volume::format(backing_file()).unwrap();
    let mut root = vol.read_inode(ROOT_INO).unwrap();
    vol.create(&mut root, "a", S_IFREG | 0o644, 0).unwrap();
    root = vol.read_inode(ROOT_INO).unwrap();

    let mut root2 = vol.read_inode(ROOT_INO).unwrap();
    vol.rename(&mut root, "a", &mut root2, "a", RenameFlags::empty())
        .unwrap();

    root = vol.read_inode(ROOT_INO).unwrap();
    assert!(vol.lookup(&root, "a").is_ok());
}

#[test]
fn rename_noreplace_rejects_existing_target() {
    let mut vol = Volume::format(backing_file()).unwrap();
    let mut root = vol.read_inode(ROOT_INO).unwrap();
    vol.create(&mut root, "a", S_IFREG | 0o644, 0).unwrap();
    root = vol.read_inode(ROOT_INO).unwrap();
    vol.create(&mut root, "b", S_IFREG | 0o644, 0).unwrap();
    root = vol.read_inode(ROOT_INO).unwrap();

    let mut root2 = vol.read_inode(ROOT_INO).unwrap();
    let err = vol
        .rename(&mut root, "a", &mut root2, "b", RenameFlags::NOREPLACE)
        .unwrap_err();
    assert!(matches!(err, Error::Exists));
}

#[test]
fn mknod_rejects_obsolete_device_numbers() {
    let mut vol = Volume::format(backing_file()).unwrap();
    let mut root = vol.read_inode(ROOT_INO).unwrap();
    let err = vol
        .mknod(&mut root, "dev0", vvsfs::inode::S_IFCHR | 0o600, 300, 0)
        .unwrap_err();
    assert!(matches!(err, Error::Invalid));
}

#[test]
fn symlink_round_trips_target() {
    let mut vol = Volume::format(backing_file()).unwrap();
    let mut root = vol.read_inode(ROOT_INO).unwrap();
    let link = vol.symlink(&mut root, "l", "/usr/bin/target").unwrap();
    assert_eq!(vol.read_symlink(&link).unwrap(), "/usr/bin/target");
}

#[test]
fn hardlink_shares_inode_and_unlink_reclaims_on_last_drop() {
    let mut vol = Volume::format(backing_file()).unwrap();
    let mut root = vol.read_inode(ROOT_INO).unwrap();
    let mut a = vol.create(&mut root, "a", S_IFREG | 0o644, 0).unwrap();
    root = vol.read_inode(ROOT_INO).unwrap();

    vol.link(&mut a, &mut root, "a2").unwrap();
    root = vol.read_inode(ROOT_INO).unwrap();

    let reloaded = vol.lookup(&root, "a2").unwrap();
    assert_eq!(reloaded.ino, a.ino);
    assert_eq!(reloaded.d.i_links_count, 2);

    vol.unlink(&mut root, "a").unwrap();
    root = vol.read_inode(ROOT_INO).unwrap();
    assert!(vol.lookup(&root, "a").is_err());
    let still_there = vol.lookup(&root, "a2").unwrap();
    assert_eq!(still_there.d.i_links_count, 1);
}

#[test]
fn statfs_reports_counts() {
    let vol = Volume::format(backing_file()).unwrap();
    let stats = vol.stats();
    assert_eq!(stats.block_size, BLOCK_SIZE as u32);
    assert_eq!(stats.magic, MAGIC);
    assert!(stats.free_inodes < stats.total_inodes);
    assert!(stats.free_blocks < stats.total_blocks);
}
