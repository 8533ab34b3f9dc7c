use std::mem::size_of;

/// size of a block in bytes
pub const BLOCK_SIZE: usize = 512;

/// The number of bitmap bits stored in one bitmap block.
pub const BITS_PER_BLOCK: usize = BLOCK_SIZE * 8;

/// The width of a block number as stored on disk.
pub const BLOCK_NUMBER_SIZE: usize = size_of::<u32>();

pub type Block = [u8; BLOCK_SIZE];
const_assert!(size_of::<Block>() == BLOCK_SIZE);

// block numbers are stored as `u32`s on the disk, but we use `usize`s to avoid littering
// the code with casts.
pub type BlockNumber = usize;
