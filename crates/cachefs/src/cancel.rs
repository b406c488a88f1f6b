//! Cancellation tokens for cache lookups.
//!
//! A token is handed to [`CacheFs::open_with`](crate::CacheFs::open_with) and
//! passed unchanged into the cache group and, on a miss, into the loader.
//! Neither layer blocks on anything it can interrupt, so a token is only
//! observed at the boundaries: before the cache is consulted and before the
//! upstream store is touched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{CacheFsError, Result};

/// A cloneable cancellation flag.
///
/// Clones share the same flag, so cancelling any clone cancels all of them.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Option<Arc<AtomicBool>>,
}

impl CancellationToken {
    /// Creates a new, active token.
    pub fn new() -> Self {
        Self {
            flag: Some(Arc::new(AtomicBool::new(false))),
        }
    }

    /// Creates a token that can never be cancelled.
    ///
    /// Useful for tests or lookups that should not be interruptible.
    #[inline]
    pub fn noop() -> Self {
        Self { flag: None }
    }

    /// Marks the token (and every clone of it) as cancelled.
    ///
    /// Has no effect on a noop token.
    pub fn cancel(&self) {
        if let Some(flag) = &self.flag {
            flag.store(true, Ordering::SeqCst);
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Returns `Err(CacheFsError::Cancelled)` once the token is cancelled.
    ///
    /// This enables use with the `?` operator for early returns.
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(CacheFsError::Cancelled)
        } else {
            Ok(())
        }
    }
}
