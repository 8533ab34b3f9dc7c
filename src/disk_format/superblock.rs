use std::mem::size_of;

use serde::{Deserialize, Serialize};

use super::{
    block::{BlockNumber, BITS_PER_BLOCK},
    inode::{INODES_PER_BLOCK, INODE_START_BLOCK},
};

/// The number of bytes occupied by the superblock at the start of its block.
pub const SUPERBLOCK_SIZE: usize = 12;
const_assert!(size_of::<Superblock>() == SUPERBLOCK_SIZE);

/// The block number that holds the superblock.
pub const SUPERBLOCK_BLOCK_NUMBER: BlockNumber = 1;

/// The superblock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct Superblock {
    /// The total number of blocks in the image.
    pub size: u32,
    /// The number of data blocks.
    pub nblocks: u32,
    /// The number of inodes.
    pub ninodes: u32,
}

impl Superblock {
    pub fn size(&self) -> usize {
        self.size as usize
    }

    pub fn nblocks(&self) -> usize {
        self.nblocks as usize
    }

    pub fn ninodes(&self) -> usize {
        self.ninodes as usize
    }

    /// The first block of the data region. Every block before it is reserved for the boot block,
    /// the superblock, the inode table and the bitmap.
    pub fn data_start(&self) -> BlockNumber {
        self.size().saturating_sub(self.nblocks())
    }

    /// The block that holds inode `inum`.
    pub fn inode_block(&self, inum: usize) -> BlockNumber {
        inum / INODES_PER_BLOCK + INODE_START_BLOCK
    }

    /// The block that holds the bitmap bit of `block_number`.
    pub fn bitmap_block(&self, block_number: BlockNumber) -> BlockNumber {
        block_number / BITS_PER_BLOCK + self.ninodes() / INODES_PER_BLOCK + INODE_START_BLOCK + 1
    }
}
