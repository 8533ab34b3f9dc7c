//! Checks that compare the directory tree against the link counts stored in inodes.

use std::collections::HashSet;

use bitvec::prelude::*;
use log::{debug, trace};

use crate::disk_format::inode::{InodeNumber, InodeType, ROOT_INODE};
use crate::error::{Result, Violation};
use crate::image::Image;

/// Counts, for every inode, the directory entries that name it. `.` and `..` are not counted,
/// and neither are entries naming an inode past the inode table.
pub fn count_references(image: &Image) -> Result<Vec<u32>> {
    let mut references = vec![0; image.superblock().ninodes()];

    for inode in image.allocated_inodes() {
        let (_, inode) = inode?;

        if inode.type_ != InodeType::Directory {
            continue;
        }

        for entry in image.read_directory(&inode)? {
            if entry.is_dot_or_dot_dot() || !image.contains_inode(entry.inum) {
                continue;
            }

            references[entry.inum as usize] += 1;
        }
    }

    Ok(references)
}

/// Finds every inode reachable from the root directory by following directory entries other
/// than `.` and `..`. Each directory is expanded once, so cyclic trees terminate.
pub fn reachable_inodes(image: &Image) -> Result<BitVec> {
    let mut reachable = BitVec::repeat(false, image.superblock().ninodes());
    reachable.set(ROOT_INODE as usize, true);

    let mut seen_directories = HashSet::<InodeNumber>::new();
    // (directory, the directory it was found in)
    let mut queue = vec![(ROOT_INODE, ROOT_INODE)];

    while let Some((inum, parent_inum)) = queue.pop() {
        if !seen_directories.insert(inum) {
            continue;
        }

        trace!("[inode #{inum}] walking directory found in #{parent_inum}");

        let inode = image.read_inode(inum)?;
        for entry in image.read_directory(&inode)? {
            if entry.is_dot_or_dot_dot() || !image.contains_inode(entry.inum) {
                continue;
            }

            reachable.set(entry.inum as usize, true);

            let entry_inode = image.read_inode(entry.inum)?;
            if entry_inode.type_ == InodeType::Directory && !seen_directories.contains(&entry.inum)
            {
                queue.push((entry.inum, inum));
            }
        }
    }

    debug!(
        "{} inodes reachable from the root directory",
        reachable.count_ones()
    );

    Ok(reachable)
}

/// Cross-checks every inode's type and stored link count against the directory tree.
pub fn check_references(image: &Image) -> Result<()> {
    let references = count_references(image)?;
    let reachable = reachable_inodes(image)?;

    for inum in image.inode_numbers() {
        let inode = image.read_inode(inum)?;
        if inode.is_allocated() && (inode.nlink == 0 || !reachable[inum as usize]) {
            return Err(Violation::OrphanedInode { inum }.into());
        }
    }

    for inum in image.inode_numbers() {
        let inode = image.read_inode(inum)?;
        if !inode.is_allocated() && references[inum as usize] != 0 {
            return Err(Violation::ReferenceToFreeInode { inum }.into());
        }
    }

    for inum in image.inode_numbers() {
        let inode = image.read_inode(inum)?;
        let references = references[inum as usize];
        if inode.type_ == InodeType::File && i64::from(inode.nlink) != i64::from(references) {
            return Err(Violation::BadFileReferenceCount {
                inum,
                nlink: inode.nlink,
                references,
            }
            .into());
        }
    }

    for inum in image.inode_numbers() {
        let inode = image.read_inode(inum)?;
        if inode.type_ == InodeType::Directory && references[inum as usize] > 1 {
            return Err(Violation::DuplicateDirectory { inum }.into());
        }
    }

    Ok(())
}
