//! Archive container I/O consumed by the rewriter.
//!
//! The rewriter only sees [`EntrySource`] and [`EntrySink`]; opening and
//! closing the underlying container is the caller's job.

mod memory;
mod zip_io;

pub use memory::MemoryArchive;
pub use zip_io::{LimitedReader, ZipEntrySink, ZipEntrySource};

use zip::{CompressionMethod, DateTime};

use crate::error::ArchiveError;

/// Container metadata carried through a rewrite unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMetadata {
    pub compression: CompressionMethod,
    pub last_modified: Option<DateTime>,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

impl EntryMetadata {
    pub fn stored() -> Self {
        Self {
            compression: CompressionMethod::Stored,
            last_modified: None,
            unix_mode: None,
            is_dir: false,
        }
    }

    pub fn deflated() -> Self {
        Self {
            compression: CompressionMethod::Deflated,
            ..Self::stored()
        }
    }
}

/// One archive record: path, uncompressed bytes and container metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: String,
    pub data: Vec<u8>,
    pub metadata: EntryMetadata,
}

impl ArchiveEntry {
    pub fn new(path: impl Into<String>, data: impl Into<Vec<u8>>, metadata: EntryMetadata) -> Self {
        Self {
            path: path.into(),
            data: data.into(),
            metadata,
        }
    }

    /// Same path and metadata, different contents.
    pub fn with_data(self, data: Vec<u8>) -> Self {
        Self { data, ..self }
    }
}

/// Final component of an archive path.
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Ordered, random-access view of an input archive.
pub trait EntrySource {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_entry(&mut self, index: usize) -> Result<ArchiveEntry, ArchiveError>;

    /// Contents of the entry at `path`, or `None` if the archive has none.
    fn read_by_path(&mut self, path: &str) -> Result<Option<Vec<u8>>, ArchiveError>;
}

/// Append-only output archive.
pub trait EntrySink {
    fn write_entry(&mut self, entry: &ArchiveEntry) -> Result<(), ArchiveError>;
}
