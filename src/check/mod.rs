use bitvec::vec::BitVec;
use log::{debug, info};

use crate::bitmap::load_block_bitmap;
use crate::error::Result;
use crate::image::Image;
use crate::storage::ImageStorage;

/// Checks that compare the directory tree against stored link counts.
pub mod references;
/// Checks of single inodes and of the block bitmap.
pub mod structure;

/// Runs every check over one image, stopping at the first failure.
///
/// The checks run in a fixed order. Later checks rely on what earlier ones established: once
/// every address is known to be in range, the block bitmap and the directory tree can be read
/// through those addresses.
pub struct Checker<'a> {
    image: Image<'a>,
    /// Tracks the allocation status of blocks, as recorded in the bitmap.
    /// A value of `true` represents "occupied".
    block_bitmap: BitVec,
}

impl<'a> Checker<'a> {
    pub fn new(image: Image<'a>) -> Result<Self> {
        let block_bitmap = load_block_bitmap(&image)?;

        Ok(Self {
            image,
            block_bitmap,
        })
    }

    pub fn run(&self) -> Result<()> {
        let image = &self.image;

        debug!("checking inode types");
        structure::check_inode_types(image)?;

        debug!("checking block addresses");
        structure::check_address_ranges(image)?;

        debug!("checking the root directory");
        structure::check_root_directory(image)?;

        debug!("checking directory format");
        structure::check_directory_format(image)?;

        debug!("checking the bitmap against inodes");
        structure::check_blocks_marked_in_use(image, &self.block_bitmap)?;
        structure::check_marked_blocks_used(image, &self.block_bitmap)?;

        debug!("checking for duplicate addresses");
        structure::check_duplicate_direct_addresses(image)?;
        structure::check_duplicate_indirect_addresses(image)?;

        debug!("checking directory references");
        references::check_references(image)?;

        info!("file system is consistent");
        Ok(())
    }
}

/// Checks the image held by `storage`.
pub fn check_image<S: ImageStorage + ?Sized>(storage: &S) -> Result<()> {
    let image = storage.image()?;
    Checker::new(image)?.run()
}

#[cfg(test)]
mod tests {
    use crate::disk_format::{
        block::{BlockNumber, BLOCK_SIZE},
        inode::{InodeType, INODE_SIZE, NUM_DIRECT, ROOT_INODE},
    };
    use crate::error::{CheckError, ImageError, Violation};
    use crate::storage::ImageBuilder;

    use super::*;

    fn check(builder: &ImageBuilder) -> Result<()> {
        check_image(&builder.build().unwrap())
    }

    fn populated() -> ImageBuilder {
        let mut builder = ImageBuilder::with_geometry(1024, 200).unwrap();
        let bin = builder.add_directory(ROOT_INODE, "bin").unwrap();
        let home = builder.add_directory(ROOT_INODE, "home").unwrap();
        let user = builder.add_directory(home, "user").unwrap();
        builder.add_device(ROOT_INODE, "console", 1, 1).unwrap();
        builder.add_file(ROOT_INODE, "README", 3).unwrap();
        builder.add_file(bin, "sh", NUM_DIRECT + 20).unwrap();
        let notes = builder.add_file(user, "notes", 1).unwrap();
        builder.add_link(ROOT_INODE, "notes", notes).unwrap();

        // enough entries to spill the root directory into a second block
        for i in 0..40 {
            builder.add_file(ROOT_INODE, &format!("f{i}"), 0).unwrap();
        }

        builder
    }

    #[test]
    fn test_root_only_image_is_consistent() {
        assert_eq!(check(&ImageBuilder::new()), Ok(()));
    }

    #[test]
    fn test_populated_image_is_consistent() {
        assert_eq!(check(&populated()), Ok(()));
    }

    #[test]
    fn test_check_is_idempotent() {
        let mut builder = populated();
        builder
            .update_inode(5, |inode| inode.type_ = InodeType::Free)
            .unwrap();
        let bytes = builder.build().unwrap();

        let first = check_image(&bytes);
        assert!(first.is_err());
        assert_eq!(first, check_image(&bytes));
    }

    #[test]
    fn test_root_block_cleared_in_bitmap() {
        let mut builder = ImageBuilder::new();
        let root_block = builder.inode(ROOT_INODE).unwrap().addrs[0] as BlockNumber;
        builder.set_block_in_use(root_block, false).unwrap();

        assert_eq!(
            check(&builder),
            Err(Violation::UsedBlockMarkedFree {
                inum: ROOT_INODE,
                block: root_block
            }
            .into())
        );
    }

    #[test]
    fn test_bad_inode_wins_over_later_failures() {
        let mut builder = ImageBuilder::new();
        builder.set_block_in_use(40, true).unwrap();
        let mut bytes = builder.build().unwrap();
        bytes[2 * BLOCK_SIZE + 9 * INODE_SIZE] = 0xff;

        assert_eq!(
            check_image(&bytes),
            Err(Violation::BadInode { inum: 9 }.into())
        );
    }

    #[test]
    fn test_address_ranges_checked_before_bitmap() {
        let mut builder = ImageBuilder::new();
        let file = builder.add_file(ROOT_INODE, "f", 1).unwrap();
        builder
            .update_inode(file, |inode| inode.addrs[1] = 56)
            .unwrap();

        assert_eq!(
            check(&builder),
            Err(Violation::BadDirectAddress {
                inum: file,
                block: 56
            }
            .into())
        );
    }

    #[test]
    fn test_direct_duplicates_checked_before_indirect_duplicates() {
        let mut builder = ImageBuilder::new();
        let a = builder.add_file(ROOT_INODE, "a", NUM_DIRECT + 2).unwrap();
        let b = builder.add_file(ROOT_INODE, "b", 2).unwrap();

        let indirect = builder.inode(a).unwrap().indirect().unwrap();
        let block = builder.block_mut(indirect).unwrap();
        let first = [block[0], block[1], block[2], block[3]];
        block[4..8].copy_from_slice(&first);
        builder
            .update_inode(b, |inode| inode.addrs[1] = inode.addrs[0])
            .unwrap();

        // the freed blocks would be reported as leaks; keep the bitmap in step
        let lost = [
            u32::from_le_bytes(first) as BlockNumber + 2,
            builder.inode(b).unwrap().addrs[0] as BlockNumber + 1,
        ];
        for block_number in lost {
            builder.set_block_in_use(block_number, false).unwrap();
        }

        assert!(matches!(
            check(&builder),
            Err(CheckError::Violation(Violation::DuplicateDirectAddress { .. }))
        ));
    }

    #[test]
    fn test_geometry_error_is_reported() {
        let bytes = vec![0; 4 * BLOCK_SIZE];
        assert_eq!(check_image(&bytes), Err(ImageError::NoInodes.into()));
    }
}
