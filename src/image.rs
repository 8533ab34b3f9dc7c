use log::{debug, info};

use crate::disk_format::{
    block::{Block, BlockNumber, BLOCK_NUMBER_SIZE, BLOCK_SIZE},
    directory_entry::{DirectoryEntry, DIRECTORY_ENTRIES_PER_BLOCK, DIRECTORY_ENTRY_SIZE},
    inode::{Inode, InodeNumber, INODES_PER_BLOCK, INODE_SIZE, NUM_INDIRECT},
    superblock::{Superblock, SUPERBLOCK_BLOCK_NUMBER, SUPERBLOCK_SIZE},
};
use crate::error::{ImageError, Result, Violation};

/// A read-only view of a file system image.
///
/// Constructing an [`Image`] validates the geometry described by the superblock, so every block
/// number below `size` can be read without going past the end of the buffer.
#[derive(Clone, Copy)]
pub struct Image<'a> {
    bytes: &'a [u8],
    superblock: Superblock,
}

impl<'a> Image<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        let superblock_start = SUPERBLOCK_BLOCK_NUMBER * BLOCK_SIZE;
        let superblock_bytes = bytes
            .get(superblock_start..superblock_start + SUPERBLOCK_SIZE)
            .ok_or(ImageError::TooSmall(bytes.len()))?;

        let superblock: Superblock = bincode::deserialize(superblock_bytes)
            .map_err(|_| ImageError::UnreadableSuperblock)?;

        info!("{} total blocks", superblock.size);
        info!("{} data blocks", superblock.nblocks);
        info!("{} total inodes", superblock.ninodes);

        check_geometry(&superblock, bytes.len())?;

        Ok(Self { bytes, superblock })
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    /// Returns a view of block `block_number`.
    pub fn block(&self, block_number: BlockNumber) -> Result<&'a Block> {
        if block_number >= self.superblock.size() {
            return Err(ImageError::BlockOutOfRange(block_number).into());
        }

        let start = block_number * BLOCK_SIZE;
        self.bytes
            .get(start..start + BLOCK_SIZE)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| ImageError::BlockOutOfRange(block_number).into())
    }

    /// The inode numbers that are checked: every inode but the reserved inode zero.
    pub fn inode_numbers(&self) -> impl Iterator<Item = InodeNumber> {
        // `check_geometry` guarantees that `ninodes` fits
        1..self.superblock.ninodes() as InodeNumber
    }

    pub fn contains_inode(&self, inum: InodeNumber) -> bool {
        (inum as usize) < self.superblock.ninodes()
    }

    /// Reads inode `inum`. An inode whose type is not a known type cannot be decoded.
    pub fn read_inode(&self, inum: InodeNumber) -> Result<Inode> {
        let block = self.block(self.superblock.inode_block(inum as usize))?;
        let offset = (inum as usize % INODES_PER_BLOCK) * INODE_SIZE;

        bincode::deserialize(&block[offset..offset + INODE_SIZE])
            .map_err(|_| Violation::BadInode { inum }.into())
    }

    /// Reads every allocated inode, skipping free ones.
    pub fn allocated_inodes(&self) -> impl Iterator<Item = Result<(InodeNumber, Inode)>> + 'a {
        let image = *self;

        image
            .inode_numbers()
            .filter_map(move |inum| match image.read_inode(inum) {
                Ok(inode) if inode.is_allocated() => Some(Ok((inum, inode))),
                Ok(_) => None,
                Err(err) => Some(Err(err)),
            })
    }

    /// Reads the block numbers stored in the indirect block of `inode`, if it has one.
    pub fn indirect_block_numbers(
        &self,
        inode: &Inode,
    ) -> Result<Option<[BlockNumber; NUM_INDIRECT]>> {
        let Some(indirect_block_number) = inode.indirect() else {
            return Ok(None);
        };

        let block = self.block(indirect_block_number)?;

        let mut block_numbers = [0; NUM_INDIRECT];
        for (block_number, bytes) in block_numbers
            .iter_mut()
            .zip(block.chunks_exact(BLOCK_NUMBER_SIZE))
        {
            *block_number = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        }

        Ok(Some(block_numbers))
    }

    /// The data blocks of `inode`: its non-zero direct pointers followed by the non-zero entries
    /// of its indirect block. The indirect block itself is not included.
    ///
    /// Callers must have checked the inode's addresses against `nblocks`.
    pub fn data_blocks(&self, inode: &Inode) -> Result<Vec<BlockNumber>> {
        let direct_blocks = inode.direct().filter(|&b| b != 0);

        let indirect_blocks = self
            .indirect_block_numbers(inode)?
            .unwrap_or([0; NUM_INDIRECT])
            .into_iter()
            .filter(|&b| b != 0);

        Ok(direct_blocks.chain(indirect_blocks).collect())
    }

    /// Every block `inode` points to: its data blocks plus its indirect block.
    pub fn block_pointers(&self, inode: &Inode) -> Result<Vec<BlockNumber>> {
        let mut pointers = self.data_blocks(inode)?;
        pointers.extend(inode.indirect());

        Ok(pointers)
    }

    /// Reads every entry slot of a directory block, including free ones.
    pub fn read_directory_block(&self, block_number: BlockNumber) -> Result<Vec<DirectoryEntry>> {
        let block = self.block(block_number)?;

        let entries = block
            .chunks_exact(DIRECTORY_ENTRY_SIZE)
            .map(bincode::deserialize::<DirectoryEntry>)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| ImageError::Undecodable(block_number))?;

        debug_assert_eq!(entries.len(), DIRECTORY_ENTRIES_PER_BLOCK);
        Ok(entries)
    }

    /// Reads the entries of directory `inode`. Within each block the entries end at the first
    /// free entry.
    pub fn read_directory(&self, inode: &Inode) -> Result<Vec<DirectoryEntry>> {
        let mut entries = vec![];

        for block_number in self.data_blocks(inode)? {
            entries.extend(
                self.read_directory_block(block_number)?
                    .into_iter()
                    .take_while(|entry| entry.inum != 0),
            );
        }

        Ok(entries)
    }
}

fn check_geometry(superblock: &Superblock, image_len: usize) -> Result<()> {
    let size = superblock.size();
    let nblocks = superblock.nblocks();
    let ninodes = superblock.ninodes();

    if ninodes == 0 {
        return Err(ImageError::NoInodes.into());
    }

    if ninodes > InodeNumber::MAX as usize {
        return Err(ImageError::TooManyInodes(ninodes).into());
    }

    if nblocks > size {
        return Err(ImageError::TooManyDataBlocks { nblocks, size }.into());
    }

    // the bitmap comes after the inode table, so it's enough to check where the bitmap ends
    let last_metadata_block = superblock.bitmap_block(size.saturating_sub(1));
    if last_metadata_block >= superblock.data_start() {
        return Err(ImageError::MetadataOverlapsData.into());
    }

    let expected = size.checked_mul(BLOCK_SIZE).unwrap_or(usize::MAX);
    if image_len < expected {
        return Err(ImageError::Truncated {
            expected,
            actual: image_len,
        }
        .into());
    }

    debug!(
        "inode table spans blocks {}..={}, bitmap spans blocks {}..={}",
        superblock.inode_block(0),
        superblock.inode_block(ninodes - 1),
        superblock.bitmap_block(0),
        last_metadata_block
    );

    Ok(())
}
