/// In-memory image assembly.
mod builder;
/// File-backed images.
mod file;
/// The image storage abstraction.
mod image_storage;

pub use builder::*;
pub use file::*;
pub use image_storage::*;
