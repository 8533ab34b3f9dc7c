use std::{
    fmt::{self, Debug},
    mem::size_of,
};

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use super::{block::BLOCK_SIZE, inode::InodeNumber};

/// The number of bytes occupied by a directory entry.
pub const DIRECTORY_ENTRY_SIZE: usize = 16;
const_assert!(size_of::<DirectoryEntry>() == DIRECTORY_ENTRY_SIZE);

const_assert!(BLOCK_SIZE % DIRECTORY_ENTRY_SIZE == 0);
/// The number of directory entries that fit in a block.
pub const DIRECTORY_ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DIRECTORY_ENTRY_SIZE;

/// The maximum supported size of a file or directory name. Names of exactly this length are
/// not nul-terminated.
pub const MAX_NAME_LEN: usize = 14;
const_assert!(size_of::<DirectoryEntryName>() == MAX_NAME_LEN);

/// A free directory entry. Marks the logical end of the entries in a block.
pub const FREE_DIRECTORY_ENTRY: DirectoryEntry = DirectoryEntry {
    inum: 0,
    name: DirectoryEntryName([0; MAX_NAME_LEN]),
};

/// A directory entry.
#[derive(Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(C)]
pub struct DirectoryEntry {
    /// The inode number.
    pub inum: InodeNumber,
    /// The name of the entry.
    pub name: DirectoryEntryName,
}

impl DirectoryEntry {
    /// Constructs a new [`DirectoryEntry`] instance.
    pub fn new(inum: InodeNumber, name: &str) -> Result<DirectoryEntry> {
        Ok(DirectoryEntry {
            inum,
            name: name.try_into()?,
        })
    }

    /// Whether this is the `.` or `..` entry, which never count as a link.
    pub fn is_dot_or_dot_dot(&self) -> bool {
        matches!(self.name.as_bytes(), b"." | b"..")
    }
}

/// A name, as used in [`DirectoryEntry`].
#[derive(Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(C)]
pub struct DirectoryEntryName([u8; MAX_NAME_LEN]);

impl DirectoryEntryName {
    /// The bytes of the name up to, not including, the first nul byte.
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(MAX_NAME_LEN);
        &self.0[..len]
    }
}

impl Debug for DirectoryEntryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DirectoryEntryName")
            .field(&String::from_utf8_lossy(self.as_bytes()))
            .finish()
    }
}

impl TryFrom<&str> for DirectoryEntryName {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        ensure!(
            value.len() <= MAX_NAME_LEN,
            "string is more than {MAX_NAME_LEN} bytes long"
        );
        ensure!(!value.contains('\0'), "string contains a nul byte");

        let mut converted = [0; MAX_NAME_LEN];
        converted[..value.len()].copy_from_slice(value.as_bytes());

        Ok(DirectoryEntryName(converted))
    }
}

impl fmt::Display for DirectoryEntryName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.as_bytes()))
    }
}
