//! The cache group: where encoded records live between lookups.
//!
//! A group maps string keys to immutable record bytes. On a miss it calls
//! its [`Getter`] exactly once per key, no matter how many callers are
//! waiting on that key, and hands the same result (or the same error) to all
//! of them. The getter is registered when the group is built, so a group is
//! always tied to one upstream.
//!
//! `MokaGroup` is the in-process implementation. Other backends (for
//! example one that replicates across peers) plug in through [`CacheGroup`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use moka::sync::Cache;
use moka::Expiry;

use crate::cancel::CancellationToken;
use crate::error::{CacheFsError, Result};

/// Record bytes produced by a [`Getter`], with an optional expiration hint.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub bytes: Bytes,
    /// How long the group may keep the record. `None` keeps it until
    /// capacity pressure evicts it.
    pub expires_in: Option<Duration>,
}

/// Produces the value for a key on a cache miss.
pub trait Getter: Send + Sync {
    fn get(&self, cancel: &CancellationToken, key: &str) -> Result<Loaded>;
}

/// A named cache of record bytes with a registered [`Getter`].
pub trait CacheGroup: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the bytes for `key`, loading them through the getter on a
    /// miss. Concurrent misses on one key share a single getter call.
    fn get(&self, cancel: &CancellationToken, key: &str) -> Result<Bytes>;

    fn stats(&self) -> GroupStats;
}

/// Counters describing a group's activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupStats {
    /// Lookups served, hits and misses alike.
    pub gets: u64,
    /// Getter calls.
    pub loads: u64,
    /// Getter calls that failed.
    pub load_errors: u64,
    /// Records currently held.
    pub entries: u64,
    /// Sum of key and record sizes currently held, in bytes.
    pub weighted_size: u64,
}

impl GroupStats {
    pub fn hits(&self) -> u64 {
        self.gets.saturating_sub(self.loads)
    }
}

// ---------------------------------------------------------------------------
// moka-backed group
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct CachedRecord {
    bytes: Bytes,
    expires_in: Option<Duration>,
}

/// Applies each record's own expiration hint.
struct RecordExpiry;

impl Expiry<String, CachedRecord> for RecordExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedRecord,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.expires_in
    }
}

#[derive(Default)]
struct Counters {
    gets: AtomicU64,
    loads: AtomicU64,
    load_errors: AtomicU64,
}

/// An in-process [`CacheGroup`] on `moka::sync::Cache`.
///
/// Capacity is measured in bytes (key plus record). Records expire after
/// their [`Loaded::expires_in`] hint when one is given.
pub struct MokaGroup {
    name: String,
    cache: Cache<String, CachedRecord>,
    getter: Arc<dyn Getter>,
    counters: Counters,
}

impl MokaGroup {
    pub fn new(name: impl Into<String>, size_in_bytes: u64, getter: Arc<dyn Getter>) -> Self {
        let name = name.into();
        let max_capacity = if size_in_bytes == 0 { 1 } else { size_in_bytes };
        let cache = Cache::builder()
            .name(&name)
            .max_capacity(max_capacity)
            .weigher(|key: &String, value: &CachedRecord| {
                u32::try_from(key.len() + value.bytes.len()).unwrap_or(u32::MAX)
            })
            .expire_after(RecordExpiry)
            .build();
        log::debug!("created cache group {name} ({max_capacity} bytes)");
        Self {
            name,
            cache,
            getter,
            counters: Counters::default(),
        }
    }

    /// Drops every cached record.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

impl fmt::Debug for MokaGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MokaGroup")
            .field("name", &self.name)
            .field("entries", &self.cache.entry_count())
            .finish_non_exhaustive()
    }
}

impl CacheGroup for MokaGroup {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, cancel: &CancellationToken, key: &str) -> Result<Bytes> {
        cancel.check()?;
        self.counters.gets.fetch_add(1, Ordering::Relaxed);

        let record = self
            .cache
            .try_get_with(key.to_string(), || {
                self.counters.loads.fetch_add(1, Ordering::Relaxed);
                log::debug!("cache group {}: miss for {key}", self.name);
                match self.getter.get(cancel, key) {
                    Ok(loaded) => Ok(CachedRecord {
                        bytes: loaded.bytes,
                        expires_in: loaded.expires_in,
                    }),
                    Err(err) => {
                        self.counters.load_errors.fetch_add(1, Ordering::Relaxed);
                        Err(err)
                    }
                }
            })
            .map_err(CacheFsError::Load)?;

        Ok(record.bytes)
    }

    fn stats(&self) -> GroupStats {
        self.cache.run_pending_tasks();
        GroupStats {
            gets: self.counters.gets.load(Ordering::Relaxed),
            loads: self.counters.loads.load(Ordering::Relaxed),
            load_errors: self.counters.load_errors.load(Ordering::Relaxed),
            entries: self.cache.entry_count(),
            weighted_size: self.cache.weighted_size(),
        }
    }
}
