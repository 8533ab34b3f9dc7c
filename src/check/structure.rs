//! Checks that look at each inode on its own, or at an inode against the block bitmap.

use std::collections::HashSet;

use bitvec::prelude::*;

use crate::disk_format::{
    block::BlockNumber,
    directory_entry::DirectoryEntry,
    inode::{Inode, InodeNumber, InodeType, ROOT_INODE},
};
use crate::error::{Result, Violation};
use crate::image::Image;

/// Every inode must have a known type. Inode zero is reserved and never checked.
pub fn check_inode_types(image: &Image) -> Result<()> {
    for inum in image.inode_numbers() {
        image.read_inode(inum)?;
    }

    Ok(())
}

/// Every address of an allocated inode must name a data block. Zero marks an unused slot and
/// is always valid.
pub fn check_address_ranges(image: &Image) -> Result<()> {
    let nblocks = image.superblock().nblocks();
    let out_of_range = |b: &BlockNumber| *b != 0 && *b >= nblocks;

    for inode in image.allocated_inodes() {
        let (inum, inode) = inode?;

        if let Some(block) = inode.direct().find(out_of_range) {
            return Err(Violation::BadDirectAddress { inum, block }.into());
        }

        let Some(indirect_block_number) = inode.indirect() else {
            continue;
        };

        if out_of_range(&indirect_block_number) {
            return Err(Violation::BadIndirectAddress {
                inum,
                block: indirect_block_number,
            }
            .into());
        }

        let mut indirect_block_numbers =
            image.indirect_block_numbers(&inode)?.into_iter().flatten();
        if let Some(block) = indirect_block_numbers.find(out_of_range) {
            return Err(Violation::BadIndirectAddress { inum, block }.into());
        }
    }

    Ok(())
}

/// The root inode must be a directory whose `.` and `..` entries both name the root.
pub fn check_root_directory(image: &Image) -> Result<()> {
    if !image.contains_inode(ROOT_INODE) {
        return Err(Violation::MissingRootDirectory.into());
    }

    let root = image.read_inode(ROOT_INODE)?;
    let Some(entries) = first_directory_entries(image, &root)? else {
        return Err(Violation::MissingRootDirectory.into());
    };

    match entries.as_slice() {
        [dot, dot_dot, ..] if dot.inum == ROOT_INODE && dot_dot.inum == ROOT_INODE => Ok(()),
        _ => Err(Violation::MissingRootDirectory.into()),
    }
}

/// Every directory must start with a `.` entry naming itself and a `..` entry naming a
/// directory.
pub fn check_directory_format(image: &Image) -> Result<()> {
    for inode in image.allocated_inodes() {
        let (inum, inode) = inode?;

        if inode.type_ != InodeType::Directory {
            continue;
        }

        let entries = first_directory_entries(image, &inode)?.unwrap_or_default();
        let well_formed = match entries.as_slice() {
            [dot, dot_dot, ..] => {
                dot.name.as_bytes() == b"."
                    && dot.inum == inum
                    && dot_dot.name.as_bytes() == b".."
                    && is_directory(image, dot_dot.inum)
            }
            _ => false,
        };

        if !well_formed {
            return Err(Violation::MalformedDirectory { inum }.into());
        }
    }

    Ok(())
}

/// Every block an allocated inode points to must be marked in use.
pub fn check_blocks_marked_in_use(image: &Image, block_bitmap: &BitSlice) -> Result<()> {
    for inode in image.allocated_inodes() {
        let (inum, inode) = inode?;

        let free_block = image
            .block_pointers(&inode)?
            .into_iter()
            .find(|&b| !is_in_use(block_bitmap, b));

        if let Some(block) = free_block {
            return Err(Violation::UsedBlockMarkedFree { inum, block }.into());
        }
    }

    Ok(())
}

/// Every block marked in use must be reserved or pointed to by an allocated inode.
pub fn check_marked_blocks_used(image: &Image, block_bitmap: &BitSlice) -> Result<()> {
    let superblock = image.superblock();

    let mut used = BitVec::<usize, Lsb0>::repeat(false, superblock.size());
    used[..superblock.data_start()].fill(true);

    for inode in image.allocated_inodes() {
        let (_, inode) = inode?;

        for block_number in image.block_pointers(&inode)? {
            if block_number < used.len() {
                used.set(block_number, true);
            }
        }
    }

    match block_bitmap.iter_ones().find(|&b| !is_in_use(&used, b)) {
        Some(block) => Err(Violation::FreeBlockMarkedUsed { block }.into()),
        None => Ok(()),
    }
}

/// No inode may name the same block twice among the addresses stored in the inode itself.
pub fn check_duplicate_direct_addresses(image: &Image) -> Result<()> {
    for inode in image.allocated_inodes() {
        let (inum, inode) = inode?;

        let addresses = inode.direct().chain(inode.indirect());
        if let Some(block) = first_duplicate(addresses) {
            return Err(Violation::DuplicateDirectAddress { inum, block }.into());
        }
    }

    Ok(())
}

/// No inode may name the same block twice in its indirect block.
pub fn check_duplicate_indirect_addresses(image: &Image) -> Result<()> {
    for inode in image.allocated_inodes() {
        let (inum, inode) = inode?;

        let Some(indirect_block_numbers) = image.indirect_block_numbers(&inode)? else {
            continue;
        };

        if let Some(block) = first_duplicate(indirect_block_numbers) {
            return Err(Violation::DuplicateIndirectAddress { inum, block }.into());
        }
    }

    Ok(())
}

/// Reads every entry slot of the first data block of directory `inode`. Returns `None` if
/// `inode` is not a directory or has no first block.
fn first_directory_entries(image: &Image, inode: &Inode) -> Result<Option<Vec<DirectoryEntry>>> {
    if inode.type_ != InodeType::Directory || inode.addrs[0] == 0 {
        return Ok(None);
    }

    image.read_directory_block(inode.addrs[0] as BlockNumber).map(Some)
}

fn is_directory(image: &Image, inum: InodeNumber) -> bool {
    image.contains_inode(inum)
        && image
            .read_inode(inum)
            .is_ok_and(|inode| inode.type_ == InodeType::Directory)
}

fn is_in_use(block_bitmap: &BitSlice, block_number: BlockNumber) -> bool {
    block_bitmap.get(block_number).is_some_and(|bit| *bit)
}

/// Finds the first non-zero block number that was already seen.
fn first_duplicate(block_numbers: impl IntoIterator<Item = BlockNumber>) -> Option<BlockNumber> {
    let mut seen = HashSet::new();

    block_numbers
        .into_iter()
        .filter(|&b| b != 0)
        .find(|&b| !seen.insert(b))
}
