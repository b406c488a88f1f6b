//! The upstream file store wrapped by the cache.
//!
//! This module defines the narrow interface the loader reads through, plus
//! two implementations:
//! - `DirStore`: a view of a local directory
//! - `MemStore`: an in-memory tree for tests and deterministic setups

mod dir;
mod memory;

use std::io;

use crate::types::{FileMode, Metadata};

pub use dir::DirStore;
pub use memory::MemStore;

/// A hierarchical, read-only file store.
///
/// Paths are slash-separated and relative to the store root, with `.`
/// naming the root itself.
pub trait FileStore: Send + Sync {
    type File: StoreFile;

    fn open(&self, path: &str) -> io::Result<Self::File>;
}

/// An open entry of a [`FileStore`]. Dropping it closes it.
pub trait StoreFile {
    type Entry: StoreDirEntry + Send;

    fn stat(&self) -> io::Result<Metadata>;

    /// Lists the children of a directory in store order.
    fn read_dir(&mut self) -> io::Result<Vec<Self::Entry>>;

    /// Reads the whole content of a non-directory.
    fn read_all(&mut self) -> io::Result<Vec<u8>>;
}

/// A child returned by [`StoreFile::read_dir`].
pub trait StoreDirEntry {
    fn name(&self) -> &str;

    /// Type bits only; cheap, no extra store round trip.
    fn file_type(&self) -> FileMode;

    /// Full metadata for the child; may cost a stat call and may fail if
    /// the child changed after the listing.
    fn metadata(&self) -> io::Result<Metadata>;
}
