mod bitmap;
pub mod check;
pub mod disk_format;
pub mod error;
pub mod image;
pub mod storage;

pub use check::check_image;
pub use error::{CheckError, ImageError, Violation};
