use anyhow::{anyhow, ensure, Context, Result};
use bitvec::prelude::*;

use crate::disk_format::{
    block::{Block, BlockNumber, BITS_PER_BLOCK, BLOCK_NUMBER_SIZE, BLOCK_SIZE},
    directory_entry::{DirectoryEntry, DIRECTORY_ENTRIES_PER_BLOCK, DIRECTORY_ENTRY_SIZE},
    inode::{
        Inode, InodeNumber, InodeType, FREE_INODE, INODES_PER_BLOCK, INODE_SIZE,
        INODE_START_BLOCK, NUM_DIRECT, NUM_INDIRECT, ROOT_INODE,
    },
    superblock::{Superblock, SUPERBLOCK_BLOCK_NUMBER, SUPERBLOCK_SIZE},
};

/// Assembles a consistent image in memory, laid out the way `mkfs` lays out a fresh file
/// system: boot block, superblock, inode table, bitmap, then data blocks. This is the write
/// side of the format that the checker reads, so it is part of the library rather than a test
/// helper.
///
/// Every operation keeps the image consistent. Tests corrupt it afterwards through
/// [`ImageBuilder::update_inode`], [`ImageBuilder::block_mut`] and
/// [`ImageBuilder::set_block_in_use`].
pub struct ImageBuilder {
    superblock: Superblock,
    /// Indexed by inode number, including the reserved inode zero.
    inodes: Vec<Inode>,
    /// Every block of the image. The superblock, inode table and bitmap blocks are filled in
    /// by [`ImageBuilder::build`].
    blocks: Vec<Block>,
    /// Tracks the allocation status of blocks.
    /// A value of `true` represents "occupied".
    block_bitmap: BitVec,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBuilder {
    pub const DEFAULT_SIZE: usize = 64;
    pub const DEFAULT_NUM_INODES: usize = 32;

    /// Constructs a [`ImageBuilder`] holding an empty root directory with the default geometry.
    ///
    /// # Panics
    ///
    /// Never in practice: the default geometry is fixed and always leaves room for the root
    /// directory. Use [`ImageBuilder::with_geometry`] for geometries that may not fit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_geometry(Self::DEFAULT_SIZE, Self::DEFAULT_NUM_INODES)
            .expect("the default geometry leaves room for the root directory")
    }

    /// Constructs a [`ImageBuilder`] for an image of `size` blocks and `ninodes` inodes, holding
    /// an empty root directory.
    pub fn with_geometry(size: usize, ninodes: usize) -> Result<Self> {
        ensure!(ninodes > ROOT_INODE as usize, "there must be room for the root inode");
        ensure!(
            ninodes <= InodeNumber::MAX as usize,
            "invalid number of inodes: {ninodes}"
        );

        let bitmap_blocks = size / BITS_PER_BLOCK + 1;
        let data_start = ninodes / INODES_PER_BLOCK + INODE_START_BLOCK + 1 + bitmap_blocks;
        ensure!(
            data_start < size,
            "not enough blocks to store inodes and the bitmap"
        );

        let superblock = Superblock {
            size: size.try_into().context("converting size")?,
            nblocks: (size - data_start).try_into().context("converting nblocks")?,
            ninodes: ninodes.try_into().context("converting ninodes")?,
        };

        let mut block_bitmap = BitVec::repeat(false, size);
        block_bitmap[..data_start].fill(true);

        let mut builder = Self {
            superblock,
            inodes: vec![FREE_INODE; ninodes],
            blocks: vec![[0; BLOCK_SIZE]; size],
            block_bitmap,
        };

        builder.inodes[ROOT_INODE as usize] = Inode::new(InodeType::Directory);
        builder.init_directory(ROOT_INODE, ROOT_INODE)?;

        Ok(builder)
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    /// Creates a regular file with `num_blocks` data blocks.
    pub fn add_file(
        &mut self,
        parent_inum: InodeNumber,
        name: &str,
        num_blocks: usize,
    ) -> Result<InodeNumber> {
        let inum = self.create(parent_inum, name, InodeType::File)?;

        for _ in 0..num_blocks {
            let block_number = self.append_block(inum)?;
            self.blocks[block_number].fill(inum as u8);
        }

        self.inode_mut(inum)?.size = (num_blocks * BLOCK_SIZE)
            .try_into()
            .context("file too large")?;

        Ok(inum)
    }

    pub fn add_directory(&mut self, parent_inum: InodeNumber, name: &str) -> Result<InodeNumber> {
        let inum = self.create(parent_inum, name, InodeType::Directory)?;
        self.init_directory(inum, parent_inum)?;

        self.update_inode(parent_inum, |parent| parent.nlink += 1)?;

        Ok(inum)
    }

    pub fn add_device(
        &mut self,
        parent_inum: InodeNumber,
        name: &str,
        major: i16,
        minor: i16,
    ) -> Result<InodeNumber> {
        let inum = self.create(parent_inum, name, InodeType::Device)?;
        self.update_inode(inum, |inode| {
            inode.major = major;
            inode.minor = minor;
        })?;

        Ok(inum)
    }

    /// Adds another name for `inum` to `parent_inum`.
    pub fn add_link(
        &mut self,
        parent_inum: InodeNumber,
        name: &str,
        inum: InodeNumber,
    ) -> Result<()> {
        ensure!(
            self.inode(inum)?.is_allocated(),
            "cannot link free inode {inum}"
        );

        self.add_directory_entry(parent_inum, DirectoryEntry::new(inum, name)?)?;
        self.update_inode(inum, |inode| inode.nlink += 1)
    }

    pub fn inode(&self, inum: InodeNumber) -> Result<&Inode> {
        self.inodes
            .get(inum as usize)
            .ok_or(anyhow!("invalid inode number: {inum}"))
    }

    pub fn update_inode<F>(&mut self, inum: InodeNumber, mut update_inode: F) -> Result<()>
    where
        F: FnMut(&mut Inode),
    {
        update_inode(self.inode_mut(inum)?);
        Ok(())
    }

    pub fn block_mut(&mut self, block_number: BlockNumber) -> Result<&mut Block> {
        self.blocks
            .get_mut(block_number)
            .ok_or(anyhow!("block number out of bounds: {block_number}"))
    }

    /// Overrides the bitmap bit of `block_number` without touching any inode.
    pub fn set_block_in_use(&mut self, block_number: BlockNumber, in_use: bool) -> Result<()> {
        ensure!(
            block_number < self.block_bitmap.len(),
            "block number out of bounds: {block_number}"
        );

        self.block_bitmap.set(block_number, in_use);
        Ok(())
    }

    /// Serializes the image.
    pub fn build(&self) -> Result<Vec<u8>> {
        let mut blocks = self.blocks.clone();

        bincode::serialize_into(
            &mut blocks[SUPERBLOCK_BLOCK_NUMBER][..SUPERBLOCK_SIZE],
            &self.superblock,
        )
        .context("serializing superblock")?;

        for (inum, inode) in self.inodes.iter().enumerate() {
            let block_number = self.superblock.inode_block(inum);
            let offset = (inum % INODES_PER_BLOCK) * INODE_SIZE;

            bincode::serialize_into(
                &mut blocks[block_number][offset..offset + INODE_SIZE],
                inode,
            )
            .context("serializing inode")?;
        }

        for block_number in self.block_bitmap.iter_ones() {
            let bitmap_block = self.superblock.bitmap_block(block_number);
            blocks[bitmap_block]
                .view_bits_mut::<Lsb0>()
                .set(block_number % BITS_PER_BLOCK, true);
        }

        Ok(blocks.concat())
    }

    fn inode_mut(&mut self, inum: InodeNumber) -> Result<&mut Inode> {
        self.inodes
            .get_mut(inum as usize)
            .ok_or(anyhow!("invalid inode number: {inum}"))
    }

    fn create(
        &mut self,
        parent_inum: InodeNumber,
        name: &str,
        inode_type: InodeType,
    ) -> Result<InodeNumber> {
        let entry_name = DirectoryEntry::new(0, name)?.name;
        ensure!(
            !entry_name.as_bytes().is_empty(),
            "invalid directory entry name: \"{name}\""
        );

        let inum = self.assign_free_inode().ok_or(anyhow!("no more free inodes"))?;
        self.inodes[inum as usize] = Inode::new(inode_type);

        self.add_directory_entry(parent_inum, DirectoryEntry::new(inum, name)?)?;

        Ok(inum)
    }

    /// Writes the `.` and `..` entries of a new directory.
    fn init_directory(&mut self, inum: InodeNumber, parent_inum: InodeNumber) -> Result<()> {
        self.add_directory_entry(inum, DirectoryEntry::new(inum, ".")?)?;
        self.add_directory_entry(inum, DirectoryEntry::new(parent_inum, "..")?)
    }

    fn add_directory_entry(&mut self, inum: InodeNumber, entry: DirectoryEntry) -> Result<()> {
        let inode = *self.inode(inum)?;
        ensure!(
            inode.type_ == InodeType::Directory,
            "inode is not a directory: {inum}"
        );

        let entry_index = inode.size as usize / DIRECTORY_ENTRY_SIZE;
        let block_index = entry_index / DIRECTORY_ENTRIES_PER_BLOCK;

        let block_number = match self.file_block_numbers(&inode).get(block_index) {
            Some(&block_number) => block_number,
            None => self.append_block(inum)?,
        };

        let offset = (entry_index % DIRECTORY_ENTRIES_PER_BLOCK) * DIRECTORY_ENTRY_SIZE;
        bincode::serialize_into(
            &mut self.blocks[block_number][offset..offset + DIRECTORY_ENTRY_SIZE],
            &entry,
        )
        .context("serializing directory entry")?;

        self.inode_mut(inum)?.size += DIRECTORY_ENTRY_SIZE as u32;

        Ok(())
    }

    /// Gives `inum` one more data block, allocating its indirect block when the direct blocks
    /// run out.
    fn append_block(&mut self, inum: InodeNumber) -> Result<BlockNumber> {
        let inode = *self.inode(inum)?;
        let num_blocks = self.file_block_numbers(&inode).len();
        ensure!(
            num_blocks < NUM_DIRECT + NUM_INDIRECT,
            "block index exceeds maximum block count"
        );

        let block_number = self.assign_free_block()?;

        if num_blocks < NUM_DIRECT {
            self.inode_mut(inum)?.addrs[num_blocks] = block_number as u32;
            return Ok(block_number);
        }

        let indirect_block_number = match inode.indirect() {
            Some(indirect_block_number) => indirect_block_number,
            None => {
                let indirect_block_number = self.assign_free_block()?;
                self.inode_mut(inum)?.addrs[NUM_DIRECT] = indirect_block_number as u32;
                indirect_block_number
            }
        };

        let offset = (num_blocks - NUM_DIRECT) * BLOCK_NUMBER_SIZE;
        self.blocks[indirect_block_number][offset..offset + BLOCK_NUMBER_SIZE]
            .copy_from_slice(&(block_number as u32).to_le_bytes());

        Ok(block_number)
    }

    fn file_block_numbers(&self, inode: &Inode) -> Vec<BlockNumber> {
        let direct_blocks = inode.direct().take_while(|&b| b != 0);

        let indirect_blocks = inode
            .indirect()
            .map(|b| {
                self.blocks[b]
                    .chunks_exact(BLOCK_NUMBER_SIZE)
                    .map(|bytes| {
                        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as BlockNumber
                    })
                    .take_while(|&b| b != 0)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        direct_blocks.chain(indirect_blocks).collect()
    }

    fn assign_free_block(&mut self) -> Result<BlockNumber> {
        // data block numbers must stay below `nblocks`
        let block_number = self
            .block_bitmap
            .first_zero()
            .filter(|&b| b < self.superblock.nblocks())
            .ok_or(anyhow!("no more free blocks"))?;

        self.block_bitmap.set(block_number, true);
        Ok(block_number)
    }

    fn assign_free_inode(&self) -> Option<InodeNumber> {
        self.inodes
            .iter()
            .enumerate()
            .skip(ROOT_INODE as usize + 1)
            .find(|(_, inode)| !inode.is_allocated())
            .map(|(inum, _)| inum as InodeNumber)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_geometry() {
        let builder = ImageBuilder::new();
        let superblock = builder.superblock();

        assert_eq!(superblock.size, 64);
        assert_eq!(superblock.ninodes, 32);
        assert_eq!(superblock.data_start(), 8);
        assert_eq!(superblock.nblocks, 56);
    }

    #[test]
    fn test_geometry_too_small() {
        assert!(ImageBuilder::with_geometry(8, 32).is_err());
        assert!(ImageBuilder::with_geometry(64, 1).is_err());
    }

    #[test]
    fn test_root_directory() {
        let builder = ImageBuilder::new();
        let root = builder.inode(ROOT_INODE).unwrap();

        assert_eq!(root.type_, InodeType::Directory);
        assert_eq!(root.nlink, 1);
        assert_eq!(root.size as usize, 2 * DIRECTORY_ENTRY_SIZE);
        assert_eq!(root.addrs[0], 8);
        assert!(builder.block_bitmap[8]);
    }

    #[test]
    fn test_new_directory_links_parent() {
        let mut builder = ImageBuilder::new();
        let inum = builder.add_directory(ROOT_INODE, "d").unwrap();

        assert_eq!(inum, 2);
        assert_eq!(builder.inode(inum).unwrap().nlink, 1);
        assert_eq!(builder.inode(ROOT_INODE).unwrap().nlink, 2);
    }

    #[test]
    fn test_directory_grows_into_second_block() {
        let mut builder = ImageBuilder::with_geometry(128, 64).unwrap();
        for i in 0..DIRECTORY_ENTRIES_PER_BLOCK - 1 {
            builder.add_file(ROOT_INODE, &format!("f{i}"), 0).unwrap();
        }

        let root = builder.inode(ROOT_INODE).unwrap();
        assert_ne!(root.addrs[0], 0);
        assert_ne!(root.addrs[1], 0);
        assert_eq!(root.addrs[2], 0);
    }

    #[test]
    fn test_large_file_uses_indirect_block() {
        let mut builder = ImageBuilder::new();
        let inum = builder.add_file(ROOT_INODE, "big", NUM_DIRECT + 3).unwrap();
        let inode = *builder.inode(inum).unwrap();

        let indirect = inode.indirect().unwrap();
        assert!(builder.block_bitmap[indirect]);
        assert_eq!(builder.file_block_numbers(&inode).len(), NUM_DIRECT + 3);
        assert_eq!(inode.size as usize, (NUM_DIRECT + 3) * BLOCK_SIZE);
    }

    #[test]
    fn test_no_more_free_blocks() {
        let mut builder = ImageBuilder::new();
        // blocks 8..56 are usable and the root directory holds block 8. the remaining 47 go to
        // 46 data blocks plus the indirect block.
        assert!(builder.add_file(ROOT_INODE, "a", 46).is_ok());
        assert!(builder.add_file(ROOT_INODE, "b", 0).is_ok());
        assert!(builder.add_file(ROOT_INODE, "c", 1).is_err());
    }

    #[test]
    fn test_link_free_inode() {
        let mut builder = ImageBuilder::new();
        assert!(builder.add_link(ROOT_INODE, "x", 5).is_err());
    }

    #[test]
    fn test_bitmap_is_serialized() {
        let mut builder = ImageBuilder::new();
        builder.add_file(ROOT_INODE, "f", 2).unwrap();
        let bytes = builder.build().unwrap();

        let bitmap_block = builder.superblock().bitmap_block(0);
        let bits = bytes[bitmap_block * BLOCK_SIZE..].view_bits::<Lsb0>();

        // boot block through the root directory and the two file blocks
        assert!(bits[..11].all());
        assert!(bits[11..64].not_any());
    }
}
