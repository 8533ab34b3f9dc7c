use std::mem::size_of;

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use super::block::{BlockNumber, BLOCK_NUMBER_SIZE, BLOCK_SIZE};

// inode numbers are stored as `u16`s in directory entries
pub type InodeNumber = u16;

pub const INODE_SIZE: usize = 64;
const_assert!(size_of::<Inode>() == INODE_SIZE);

pub const NUM_DIRECT: usize = 12;

const_assert!(BLOCK_SIZE % BLOCK_NUMBER_SIZE == 0);
pub const NUM_INDIRECT: usize = BLOCK_SIZE / BLOCK_NUMBER_SIZE;

const_assert!(BLOCK_SIZE % INODE_SIZE == 0);
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;

/// The block holding inode zero. The boot block and the superblock come before it.
pub const INODE_START_BLOCK: BlockNumber = 2;

pub const ROOT_INODE: InodeNumber = 1;

/// An inode that is not in use.
pub const FREE_INODE: Inode = Inode {
    type_: InodeType::Free,
    major: 0,
    minor: 0,
    nlink: 0,
    size: 0,
    addrs: [0; NUM_DIRECT + 1],
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct Inode {
    /// file type (e.g., directory or regular)
    pub type_: InodeType,
    /// major device number (devices only)
    pub major: i16,
    /// minor device number (devices only)
    pub minor: i16,
    /// number of directory entries naming this inode
    pub nlink: i16,
    /// file size in bytes
    pub size: u32,
    /// block #s for the 1st NUM_DIRECT blocks, followed by the indirect block
    pub addrs: [u32; NUM_DIRECT + 1],
}

impl Inode {
    /// Constructs an empty inode of the given type with a single link.
    #[must_use]
    pub fn new(type_: InodeType) -> Self {
        Self {
            type_,
            nlink: 1,
            ..FREE_INODE
        }
    }

    pub fn is_allocated(&self) -> bool {
        self.type_ != InodeType::Free
    }

    pub fn direct(&self) -> impl Iterator<Item = BlockNumber> + '_ {
        self.addrs[..NUM_DIRECT].iter().map(|&b| b as BlockNumber)
    }

    /// The block number of the indirect block, if the inode has one.
    pub fn indirect(&self) -> Option<BlockNumber> {
        match self.addrs[NUM_DIRECT] {
            0 => None,
            b => Some(b as BlockNumber),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(i16)]
pub enum InodeType {
    /// This inode is not in use for any file.
    Free = 0,
    /// This inode describes a directory.
    Directory = 1,
    /// This inode describes a regular data file.
    File = 2,
    /// This inode describes a special device.
    Device = 3,
}
