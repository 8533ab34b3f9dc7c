use bitvec::prelude::*;
use log::debug;

use crate::disk_format::block::BITS_PER_BLOCK;
use crate::error::Result;
use crate::image::Image;

/// Loads the block bitmap. The result holds one bit per block of the image; `true` means
/// "in use".
///
/// The reserved region before the data blocks (boot block, superblock, inode table and the
/// bitmap itself) is always in use, whatever the on-disk bits say. Every other block takes its
/// on-disk bit.
pub fn load_block_bitmap(image: &Image) -> Result<BitVec> {
    let superblock = image.superblock();
    let data_start = superblock.data_start();

    let mut block_bitmap = BitVec::repeat(false, superblock.size());
    block_bitmap[..data_start].fill(true);

    for block_number in data_start..superblock.size() {
        let bitmap_block = image.block(superblock.bitmap_block(block_number))?;

        if bitmap_block.view_bits::<Lsb0>()[block_number % BITS_PER_BLOCK] {
            block_bitmap.set(block_number, true);
        }
    }

    debug!(
        "{} of {} blocks marked in use",
        block_bitmap.count_ones(),
        block_bitmap.len()
    );

    Ok(block_bitmap)
}
