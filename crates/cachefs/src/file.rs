//! Read-only file handles built from decoded records.

use std::io::{self, Cursor, Read, Seek, SeekFrom};

use bytes::Bytes;

use crate::codec::Record;
use crate::error::{CacheFsError, Result};
use crate::types::{DirEntry, Metadata};

/// An open, cached file or directory.
///
/// Every handle owns its own read position and directory cursor; two
/// handles opened on the same path never affect each other, even when they
/// were decoded from the same cached bytes. Content is held in memory as a
/// view of the cached record, so dropping or closing a handle releases
/// nothing but that view.
#[derive(Debug)]
pub struct CachedFile {
    metadata: Metadata,
    children: Vec<DirEntry>,
    content: Cursor<Bytes>,
    /// Next child to hand out from `read_dir`.
    cursor: usize,
}

impl CachedFile {
    pub(crate) fn from_record(record: Record) -> Self {
        Self {
            metadata: record.metadata,
            children: record.children,
            content: Cursor::new(record.content),
            cursor: 0,
        }
    }

    /// Returns the metadata of the file itself.
    pub fn stat(&self) -> &Metadata {
        &self.metadata
    }

    pub fn is_dir(&self) -> bool {
        self.metadata.is_dir()
    }

    /// The whole content, independent of the read position.
    ///
    /// Shares storage with the cached record.
    pub fn content(&self) -> &Bytes {
        self.content.get_ref()
    }

    /// Current read position within the content.
    pub fn position(&self) -> u64 {
        self.content.position()
    }

    /// Reads directory entries in load order.
    ///
    /// With `n == 0`, returns every remaining entry in one call and never
    /// fails for a directory, even an empty or fully read one.
    ///
    /// With `n > 0`, returns at most `n` entries and advances past them.
    /// Once every entry has been returned, the call fails with
    /// [`CacheFsError::EndOfDirectory`]; a successful call never returns an
    /// empty list.
    ///
    /// Entries carry the metadata recorded at load time; see
    /// [`DirEntry::metadata`].
    pub fn read_dir(&mut self, n: usize) -> Result<Vec<DirEntry>> {
        if !self.is_dir() {
            return Err(CacheFsError::NotADirectory(self.metadata.name().to_string()));
        }

        let remaining = self.children.len() - self.cursor;
        let take = if n == 0 { remaining } else { n.min(remaining) };
        if n > 0 && take == 0 {
            return Err(CacheFsError::EndOfDirectory);
        }

        let start = self.cursor;
        self.cursor += take;
        Ok(self.children[start..self.cursor].to_vec())
    }

    /// Closes the handle. Always succeeds.
    pub fn close(self) -> Result<()> {
        Ok(())
    }
}

impl Read for CachedFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is a directory", self.metadata.name()),
            ));
        }
        self.content.read(buf)
    }
}

/// Seeking past the end is allowed and leaves later reads at end of file.
/// Seeking before the start fails with `InvalidInput` and keeps the current
/// position.
impl Seek for CachedFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.content.seek(pos)
    }
}
