use super::{ArchiveEntry, EntrySink, EntrySource};
use crate::error::ArchiveError;

/// Archive held entirely in memory. Works as both source and sink.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryArchive {
    entries: Vec<ArchiveEntry>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn paths(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.path.as_str()).collect()
    }

    pub fn get(&self, path: &str) -> Option<&ArchiveEntry> {
        self.entries.iter().find(|e| e.path == path)
    }
}

impl From<Vec<ArchiveEntry>> for MemoryArchive {
    fn from(entries: Vec<ArchiveEntry>) -> Self {
        Self { entries }
    }
}

impl EntrySource for MemoryArchive {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn read_entry(&mut self, index: usize) -> Result<ArchiveEntry, ArchiveError> {
        self.entries
            .get(index)
            .cloned()
            .ok_or(ArchiveError::OutOfRange {
                index,
                len: self.entries.len(),
            })
    }

    fn read_by_path(&mut self, path: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
        Ok(self.get(path).map(|e| e.data.clone()))
    }
}

impl EntrySink for MemoryArchive {
    fn write_entry(&mut self, entry: &ArchiveEntry) -> Result<(), ArchiveError> {
        self.entries.push(entry.clone());
        Ok(())
    }
}
