//! Zip-backed entry source and sink.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, Write};
use std::path::Path;

use tracing::debug;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::{ArchiveEntry, EntryMetadata, EntrySink, EntrySource};
use crate::error::ArchiveError;

/// Entries at or above this size need zip64 extensions.
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// A reader wrapper that fails once more than `limit` bytes come out.
/// Guards against entries that lie about their uncompressed size in headers.
pub struct LimitedReader<R> {
    inner: R,
    remaining: u64,
}

impl<R> LimitedReader<R> {
    pub fn new(inner: R, limit: u64) -> Self {
        Self {
            inner,
            remaining: limit,
        }
    }
}

impl<R: Read> Read for LimitedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.remaining == 0 {
            // Exactly at the limit is fine as long as the stream ends here
            let mut probe = [0u8; 1];
            return match self.inner.read(&mut probe)? {
                0 => Ok(0),
                _ => Err(io::Error::other(
                    "zip entry is larger than its declared size",
                )),
            };
        }

        let max_read = std::cmp::min(buf.len() as u64, self.remaining) as usize;
        let bytes_read = self.inner.read(&mut buf[..max_read])?;
        self.remaining = self.remaining.saturating_sub(bytes_read as u64);

        Ok(bytes_read)
    }
}

/// Input archive backed by a zip file.
pub struct ZipEntrySource<R: Read + Seek> {
    archive: ZipArchive<R>,
}

impl ZipEntrySource<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let file = File::open(path).map_err(|source| ArchiveError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> ZipEntrySource<R> {
    pub fn new(reader: R) -> Result<Self, ArchiveError> {
        let archive = ZipArchive::new(reader).map_err(ArchiveError::Open)?;
        Ok(Self { archive })
    }
}

impl<R: Read + Seek> EntrySource for ZipEntrySource<R> {
    fn len(&self) -> usize {
        self.archive.len()
    }

    fn read_entry(&mut self, index: usize) -> Result<ArchiveEntry, ArchiveError> {
        let len = self.archive.len();
        if index >= len {
            return Err(ArchiveError::OutOfRange { index, len });
        }

        let mut file = self
            .archive
            .by_index(index)
            .map_err(|source| ArchiveError::Read { index, source })?;

        let path = file.name().to_string();
        let metadata = EntryMetadata {
            compression: file.compression(),
            last_modified: file.last_modified(),
            unix_mode: file.unix_mode(),
            is_dir: file.is_dir(),
        };

        let declared = file.size();
        let mut data = Vec::with_capacity(usize::try_from(declared).unwrap_or(0));
        LimitedReader::new(&mut file, declared)
            .read_to_end(&mut data)
            .map_err(|source| ArchiveError::Io {
                path: path.clone(),
                source,
            })?;

        Ok(ArchiveEntry {
            path,
            data,
            metadata,
        })
    }

    fn read_by_path(&mut self, path: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
        let mut file = match self.archive.by_name(path) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(source) => {
                return Err(ArchiveError::ReadPath {
                    path: path.to_string(),
                    source,
                })
            }
        };

        let declared = file.size();
        let mut data = Vec::with_capacity(usize::try_from(declared).unwrap_or(0));
        LimitedReader::new(&mut file, declared)
            .read_to_end(&mut data)
            .map_err(|source| ArchiveError::Io {
                path: path.to_string(),
                source,
            })?;
        Ok(Some(data))
    }
}

/// Output archive backed by a zip writer.
pub struct ZipEntrySink<W: Write + Seek> {
    writer: ZipWriter<W>,
}

impl<W: Write + Seek> ZipEntrySink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: ZipWriter::new(inner),
        }
    }

    /// Write the central directory and hand back the underlying writer.
    pub fn finish(self) -> Result<W, ArchiveError> {
        self.writer.finish().map_err(ArchiveError::Finish)
    }
}

impl<W: Write + Seek> EntrySink for ZipEntrySink<W> {
    fn write_entry(&mut self, entry: &ArchiveEntry) -> Result<(), ArchiveError> {
        let options = file_options(entry);
        let write_error = |source| ArchiveError::Write {
            path: entry.path.clone(),
            source,
        };

        if entry.metadata.is_dir {
            return self
                .writer
                .add_directory(entry.path.as_str(), options)
                .map_err(write_error);
        }

        self.writer
            .start_file(entry.path.as_str(), options)
            .map_err(write_error)?;
        self.writer
            .write_all(&entry.data)
            .map_err(|source| ArchiveError::Io {
                path: entry.path.clone(),
                source,
            })
    }
}

fn file_options(entry: &ArchiveEntry) -> SimpleFileOptions {
    let metadata = &entry.metadata;
    let compression = match metadata.compression {
        CompressionMethod::Stored => CompressionMethod::Stored,
        CompressionMethod::Deflated => CompressionMethod::Deflated,
        other => {
            debug!(path = %entry.path, method = ?other, "re-encoding entry with deflate");
            CompressionMethod::Deflated
        }
    };

    let mut options = SimpleFileOptions::default()
        .compression_method(compression)
        .large_file(entry.data.len() as u64 >= ZIP64_THRESHOLD);
    if let Some(modified) = metadata.last_modified {
        options = options.last_modified_time(modified);
    }
    if let Some(mode) = metadata.unix_mode {
        options = options.unix_permissions(mode);
    }
    options
}
