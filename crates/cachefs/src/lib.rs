//! Read-only caching layer for hierarchical file stores.
//!
//! This crate provides:
//! - A filesystem facade that serves files and directories from a cache group
//! - Time-quantized cache keys with per-path jitter for expiration
//! - A compact record format with zero-copy content
//! - Local-directory and in-memory upstream stores

pub mod cancel;
pub mod codec;
pub mod config;
pub mod error;
pub mod file;
pub mod fs;
pub mod group;
pub mod loader;
pub mod path;
pub mod quantize;
pub mod store;
pub mod types;

// Re-export main types
pub use cancel::CancellationToken;
pub use config::{ChildErrorPolicy, Config};
pub use error::{CacheFsError, Result};
pub use file::CachedFile;
pub use fs::{CacheFs, Walk};
pub use group::{CacheGroup, Getter, GroupStats, Loaded, MokaGroup};
pub use loader::Loader;
pub use quantize::CacheKey;
pub use store::{DirStore, FileStore, MemStore, StoreDirEntry, StoreFile};
pub use types::{DirEntry, FileMode, Metadata};
