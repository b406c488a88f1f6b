//! The cached filesystem facade.
//!
//! `CacheFs` validates a path, turns it into a time-quantized key, asks the
//! cache group for the record and decodes it into a fresh [`CachedFile`].
//! Everything stateful about an open file lives in that handle; the facade
//! itself only holds the group and the expiration window.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;

use crate::cancel::CancellationToken;
use crate::codec;
use crate::config::Config;
use crate::error::{CacheFsError, Result};
use crate::file::CachedFile;
use crate::group::{CacheGroup, GroupStats, MokaGroup};
use crate::loader::Loader;
use crate::path;
use crate::quantize::CacheKey;
use crate::store::FileStore;
use crate::types::{DirEntry, Metadata};

/// Tells [`CacheFs::walk_dir`] how to proceed after visiting an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    Continue,
    /// Do not descend into the directory just visited. Ignored for files.
    SkipDir,
}

/// A read-only filesystem served from a cache group.
#[derive(Debug)]
pub struct CacheFs<G = MokaGroup> {
    group: G,
    window: Duration,
}

impl CacheFs<MokaGroup> {
    /// Builds a filesystem that caches `store` in a new in-process group.
    pub fn new<S>(store: S, config: Config) -> Result<Self>
    where
        S: FileStore + 'static,
    {
        config.validate()?;
        let loader = Arc::new(Loader::new(store, &config));
        let group = MokaGroup::new(config.group_name.clone(), config.size_in_bytes, loader);
        Ok(Self::with_group(group, config.expiration))
    }
}

impl<G: CacheGroup> CacheFs<G> {
    /// Serves files from an existing group.
    ///
    /// `window` must match the one the group's getter was configured with,
    /// or expiration hints and key rollover drift apart.
    pub fn with_group(group: G, window: Duration) -> Self {
        Self { group, window }
    }

    pub fn group(&self) -> &G {
        &self.group
    }

    pub fn stats(&self) -> GroupStats {
        self.group.stats()
    }

    /// Opens `name` for reading.
    pub fn open(&self, name: &str) -> Result<CachedFile> {
        self.open_with(name, &CancellationToken::noop())
    }

    /// Opens `name`, passing `cancel` through to the cache group and the
    /// loader.
    pub fn open_with(&self, name: &str, cancel: &CancellationToken) -> Result<CachedFile> {
        if !path::is_valid(name) {
            return Err(CacheFsError::InvalidPath(name.to_string()));
        }

        let key = CacheKey::at(SystemTime::now(), self.window, name);
        self.fetch(cancel, &key)
            .map(CachedFile::from_record)
            .map_err(|error| CacheFsError::open(name, error))
    }

    fn fetch(&self, cancel: &CancellationToken, key: &CacheKey) -> Result<codec::Record> {
        let bytes = self.group.get(cancel, &key.to_string())?;
        codec::decode(&bytes)
    }

    pub fn stat(&self, name: &str) -> Result<Metadata> {
        Ok(self.open(name)?.stat().clone())
    }

    /// Returns the whole content of a file, sharing storage with the cache.
    pub fn read_file(&self, name: &str) -> Result<Bytes> {
        let file = self.open(name)?;
        if file.is_dir() {
            return Err(CacheFsError::open(
                name,
                CacheFsError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "is a directory",
                )),
            ));
        }
        Ok(file.content().clone())
    }

    /// Lists every child of a directory.
    pub fn read_dir(&self, name: &str) -> Result<Vec<DirEntry>> {
        self.open(name)?.read_dir(0)
    }

    /// Visits `root` and everything below it in preorder.
    ///
    /// Directories are opened through the cache; files are reported from
    /// their parent's listing without being opened. Children are visited in
    /// listing order.
    pub fn walk_dir<F>(&self, root: &str, mut visit: F) -> Result<()>
    where
        F: FnMut(&str, &Metadata) -> Result<Walk>,
    {
        let metadata = self.stat(root)?;
        self.walk(root, &metadata, &mut visit)
    }

    fn walk<F>(&self, name: &str, metadata: &Metadata, visit: &mut F) -> Result<()>
    where
        F: FnMut(&str, &Metadata) -> Result<Walk>,
    {
        if visit(name, metadata)? == Walk::SkipDir || !metadata.is_dir() {
            return Ok(());
        }

        for entry in self.read_dir(name)? {
            let child = path::join(name, entry.name());
            if entry.is_dir() {
                let metadata = self.stat(&child)?;
                self.walk(&child, &metadata, visit)?;
            } else {
                visit(&child, entry.metadata())?;
            }
        }
        Ok(())
    }
}
