use crate::error::Result;
use crate::image::Image;

/// Something that holds a whole file system image in memory.
pub trait ImageStorage {
    fn bytes(&self) -> &[u8];

    /// Parses the superblock and returns a view of the image.
    fn image(&self) -> Result<Image<'_>> {
        Image::new(self.bytes())
    }
}

impl ImageStorage for Vec<u8> {
    fn bytes(&self) -> &[u8] {
        self
    }
}

impl ImageStorage for [u8] {
    fn bytes(&self) -> &[u8] {
        self
    }
}
