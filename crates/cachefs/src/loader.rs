//! Turns a cache miss into an encoded record read from the upstream store.

use std::time::{Duration, SystemTime};

use bytes::Bytes;
use rayon::prelude::*;

use crate::cancel::CancellationToken;
use crate::codec;
use crate::config::{ChildErrorPolicy, Config};
use crate::error::{CacheFsError, Result};
use crate::group::{Getter, Loaded};
use crate::quantize::CacheKey;
use crate::store::{FileStore, StoreDirEntry, StoreFile};
use crate::types::{DirEntry, Metadata};

/// The [`Getter`] that reads through to a [`FileStore`].
///
/// Keys are parsed as [`CacheKey`]s; only the path part addresses the
/// store. The bucket part determines the expiration hint on the result.
#[derive(Debug)]
pub struct Loader<S> {
    store: S,
    window: Duration,
    no_stat: bool,
    child_errors: ChildErrorPolicy,
}

impl<S: FileStore> Loader<S> {
    pub fn new(store: S, config: &Config) -> Self {
        Self {
            store,
            window: config.expiration,
            no_stat: config.no_stat,
            child_errors: config.child_errors,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn load_path(&self, cancel: &CancellationToken, path: &str) -> Result<Vec<u8>> {
        let mut file = self.store.open(path)?;
        let metadata = file.stat()?;

        if metadata.is_dir() {
            let entries = file.read_dir()?;
            cancel.check()?;
            let children = self.children(path, entries)?;
            return codec::encode(&metadata, &children, &[]);
        }

        let content = file.read_all()?;
        if content.len() as u64 != metadata.size() {
            log::debug!(
                "{path}: read {} bytes, stat reported {}",
                content.len(),
                metadata.size()
            );
        }
        codec::encode(&metadata, &[], &content)
    }

    /// Summarizes directory children, keeping the store's order.
    fn children<E>(&self, dir: &str, entries: Vec<E>) -> Result<Vec<DirEntry>>
    where
        E: StoreDirEntry + Send,
    {
        if self.no_stat {
            return Ok(entries
                .iter()
                .map(|entry| DirEntry::new(Metadata::type_only(entry.name(), entry.file_type())))
                .collect());
        }

        let fetched: Vec<(String, std::io::Result<Metadata>)> = entries
            .into_par_iter()
            .map(|entry| (entry.name().to_string(), entry.metadata()))
            .collect();

        let mut children = Vec::with_capacity(fetched.len());
        for (name, metadata) in fetched {
            match metadata {
                Ok(metadata) => children.push(DirEntry::new(metadata)),
                Err(error) => match self.child_errors {
                    ChildErrorPolicy::Skip => {
                        log::warn!("{dir}: skipping child {name}: {error}");
                    }
                    ChildErrorPolicy::Fail => return Err(CacheFsError::Io(error)),
                },
            }
        }
        Ok(children)
    }
}

impl<S: FileStore> Getter for Loader<S> {
    fn get(&self, cancel: &CancellationToken, key: &str) -> Result<Loaded> {
        cancel.check()?;
        let key: CacheKey = key.parse()?;

        let record = self.load_path(cancel, key.path())?;
        log::debug!("loaded {key} ({} bytes)", record.len());

        Ok(Loaded {
            bytes: Bytes::from(record),
            expires_in: key.remaining(SystemTime::now(), self.window),
        })
    }
}
