//! Errors reported by the checker.
//!
//! A [`Violation`] is a broken structural invariant of an otherwise readable image. Its
//! `Display` output is the diagnostic printed by `fcheck` and must stay stable. An
//! [`ImageError`] means the image cannot be examined at all.

use thiserror::Error;

use crate::disk_format::{block::BlockNumber, inode::InodeNumber};

/// A structural invariant that does not hold.
///
/// The indices carried by each variant are for logging only; they are not part of the
/// diagnostic.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    #[error("bad inode")]
    BadInode { inum: InodeNumber },

    #[error("bad direct address in inode")]
    BadDirectAddress {
        inum: InodeNumber,
        block: BlockNumber,
    },

    #[error("bad indirect address in inode")]
    BadIndirectAddress {
        inum: InodeNumber,
        block: BlockNumber,
    },

    #[error("root directory does not exist")]
    MissingRootDirectory,

    #[error("directory not properly formatted")]
    MalformedDirectory { inum: InodeNumber },

    #[error("address used by inode but marked free in bitmap")]
    UsedBlockMarkedFree {
        inum: InodeNumber,
        block: BlockNumber,
    },

    #[error("bitmap marks block in use but it is not in use")]
    FreeBlockMarkedUsed { block: BlockNumber },

    #[error("direct address used more than once")]
    DuplicateDirectAddress {
        inum: InodeNumber,
        block: BlockNumber,
    },

    #[error("indirect address used more than once")]
    DuplicateIndirectAddress {
        inum: InodeNumber,
        block: BlockNumber,
    },

    #[error("inode marked use but not found in a directory")]
    OrphanedInode { inum: InodeNumber },

    #[error("inode referred to in directory but marked free")]
    ReferenceToFreeInode { inum: InodeNumber },

    #[error("bad reference count for file")]
    BadFileReferenceCount {
        inum: InodeNumber,
        nlink: i16,
        references: u32,
    },

    #[error("directory appears more than once in file system")]
    DuplicateDirectory { inum: InodeNumber },
}

/// The image is too damaged or too small to be checked.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("image is too small to hold a superblock ({0} bytes)")]
    TooSmall(usize),

    #[error("unable to parse superblock")]
    UnreadableSuperblock,

    #[error("superblock has no inodes")]
    NoInodes,

    #[error("superblock has more inodes ({0}) than directory entries can name")]
    TooManyInodes(usize),

    #[error("superblock has more data blocks ({nblocks}) than blocks ({size})")]
    TooManyDataBlocks { nblocks: usize, size: usize },

    #[error("inode table and bitmap do not fit before the data region")]
    MetadataOverlapsData,

    #[error("image holds {actual} bytes but the superblock describes {expected}")]
    Truncated { expected: usize, actual: usize },

    #[error("block {0} is outside the image")]
    BlockOutOfRange(BlockNumber),

    #[error("unable to decode block {0}")]
    Undecodable(BlockNumber),
}

/// The reason a check run stopped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error(transparent)]
    Violation(#[from] Violation),

    #[error(transparent)]
    Image(#[from] ImageError),
}

pub type Result<T> = std::result::Result<T, CheckError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_omit_indices() {
        let err: CheckError = Violation::BadFileReferenceCount {
            inum: 7,
            nlink: 2,
            references: 1,
        }
        .into();

        assert_eq!(err.to_string(), "bad reference count for file");
    }

    #[test]
    fn test_image_error_is_transparent() {
        let err: CheckError = ImageError::BlockOutOfRange(4096).into();
        assert_eq!(err.to_string(), "block 4096 is outside the image");
    }
}
