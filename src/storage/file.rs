use std::fs::File;
use std::io::Read;

use anyhow::{Context, Result};
use log::debug;

use super::image_storage::ImageStorage;

/// An image read from a file. The file is read once and never written.
pub struct FileBackedImage(Vec<u8>);

impl FileBackedImage {
    pub fn new(mut file: File) -> Result<Self> {
        let mut bytes = vec![];
        file.read_to_end(&mut bytes)
            .context("reading image file")?;

        debug!("read {} bytes of image", bytes.len());

        Ok(FileBackedImage(bytes))
    }
}

impl ImageStorage for FileBackedImage {
    fn bytes(&self) -> &[u8] {
        &self.0
    }
}
