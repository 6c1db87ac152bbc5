use std::fs::File;
use std::io::Error;
use std::ops::Deref;
use std::path::Path;

use memmap2::Mmap;

/// The raw bytes of a loaded binary, either owned or memory-mapped.
///
/// A mapping is read-only and lives for the whole analysis; it may be
/// shared freely across forked states.
pub enum Image {
    Bytes(Vec<u8>),
    Mapping(Mmap),
}

impl AsRef<[u8]> for Image {
    fn as_ref(&self) -> &[u8] {
        match self {
            Self::Bytes(bytes) => bytes.as_ref(),
            Self::Mapping(mapping) => mapping.as_ref(),
        }
    }
}

impl Deref for Image {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_ref()
    }
}

impl Image {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(bytes.into())
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let mapping = unsafe { Mmap::map(&File::open(path)?)? };
        log::debug!("mapped {} ({} bytes)", path.display(), mapping.len());
        Ok(Self::Mapping(mapping))
    }

    pub fn len(&self) -> usize {
        self.as_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_ref().is_empty()
    }
}
