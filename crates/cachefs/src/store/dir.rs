//! A [`FileStore`] over a local directory.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use super::{FileStore, StoreDirEntry, StoreFile};
use crate::path;
use crate::types::{FileMode, Metadata};

/// Serves files below a root directory.
///
/// Symlinks are followed when opening a path. Directory listings are
/// sorted by name, and child metadata is read without following symlinks.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> io::Result<PathBuf> {
        if !path::is_valid(name) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid path {name:?}"),
            ));
        }
        if name == "." {
            return Ok(self.root.clone());
        }
        Ok(name.split('/').fold(self.root.clone(), |acc, part| acc.join(part)))
    }
}

impl FileStore for DirStore {
    type File = DirFile;

    fn open(&self, name: &str) -> io::Result<DirFile> {
        let full = self.resolve(name)?;
        let metadata = fs::metadata(&full)?;
        Ok(DirFile {
            name: path::base_name(name).to_string(),
            path: full,
            metadata,
        })
    }
}

/// An open entry of a [`DirStore`].
#[derive(Debug)]
pub struct DirFile {
    name: String,
    path: PathBuf,
    metadata: fs::Metadata,
}

impl StoreFile for DirFile {
    type Entry = DirStoreEntry;

    fn stat(&self) -> io::Result<Metadata> {
        Ok(Metadata::from_fs_metadata(self.name.clone(), &self.metadata))
    }

    fn read_dir(&mut self) -> io::Result<Vec<DirStoreEntry>> {
        let mut entries = fs::read_dir(&self.path)?
            .map(|entry| {
                let entry = entry?;
                Ok(DirStoreEntry {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    file_type: FileMode::from(entry.file_type()?),
                    path: entry.path(),
                })
            })
            .collect::<io::Result<Vec<_>>>()?;

        entries.sort_unstable_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn read_all(&mut self) -> io::Result<Vec<u8>> {
        let mut file = fs::File::open(&self.path)?;
        let mut buf = Vec::with_capacity(usize::try_from(self.metadata.len()).unwrap_or(0));
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

/// A child listed from a [`DirFile`].
#[derive(Debug)]
pub struct DirStoreEntry {
    name: String,
    file_type: FileMode,
    path: PathBuf,
}

impl StoreDirEntry for DirStoreEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn file_type(&self) -> FileMode {
        self.file_type
    }

    fn metadata(&self) -> io::Result<Metadata> {
        let metadata = fs::symlink_metadata(&self.path)?;
        Ok(Metadata::from_fs_metadata(self.name.clone(), &metadata))
    }
}
