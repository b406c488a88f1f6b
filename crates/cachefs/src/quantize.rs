//! Time-quantized cache keys.
//!
//! The cache group has no expiration clock of its own that every backend can
//! be relied on to honor. Instead, each key embeds a coarse time bucket: once
//! the bucket for a path rolls over, lookups map to a fresh key and the old
//! record is simply never asked for again.
//!
//! A bucket is `now / period`, where `period` is the configured window plus
//! a per-path offset in `[0, window / 4)` taken from an Adler-32 checksum of
//! the path. Records loaded at the same moment therefore roll over at
//! different times instead of all at once.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::CacheFsError;

/// Bucket used for every path when expiration is disabled.
pub const NO_EXPIRATION_BUCKET: i64 = 0;

/// Returns the Adler-32 checksum of `path`.
pub fn checksum(path: &str) -> u32 {
    adler2::adler32_slice(path.as_bytes())
}

/// Maps a checksum into an offset in `[0, window / 4)`.
pub fn quantize_offset(sum: u32, window: Duration) -> Duration {
    // sum / 2^32 / 4, in integer nanoseconds
    let nanos = (u128::from(sum) * window.as_nanos()) >> 34;
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// The jittered period after which keys for `path` roll over.
pub fn effective_period(window: Duration, path: &str) -> Duration {
    window.saturating_add(quantize_offset(checksum(path), window))
}

/// Returns the time bucket for `path` at `now`.
///
/// A zero `window` disables expiration and always yields
/// [`NO_EXPIRATION_BUCKET`].
pub fn quantize(now: SystemTime, window: Duration, path: &str) -> i64 {
    if window.is_zero() {
        return NO_EXPIRATION_BUCKET;
    }
    let period = period_nanos(window, path);
    let bucket = unix_nanos(now).div_euclid(period);
    i64::try_from(bucket).unwrap_or(if bucket < 0 { i64::MIN } else { i64::MAX })
}

/// Time left until `bucket` for `path` rolls over, measured from `now`.
///
/// Returns `None` when expiration is disabled. A bucket that has already
/// ended yields `Some(Duration::ZERO)`.
pub fn remaining_in_bucket(
    bucket: i64,
    now: SystemTime,
    window: Duration,
    path: &str,
) -> Option<Duration> {
    if window.is_zero() {
        return None;
    }
    let period = period_nanos(window, path);
    let end = (i128::from(bucket) + 1).saturating_mul(period);
    let left = end.saturating_sub(unix_nanos(now)).max(0);
    Some(Duration::from_nanos(u64::try_from(left).unwrap_or(u64::MAX)))
}

fn period_nanos(window: Duration, path: &str) -> i128 {
    // window is non-zero here, so the period is at least one nanosecond
    i128::try_from(effective_period(window, path).as_nanos())
        .unwrap_or(i128::MAX)
        .max(1)
}

fn unix_nanos(time: SystemTime) -> i128 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i128::try_from(after.as_nanos()).unwrap_or(i128::MAX),
        Err(err) => -i128::try_from(err.duration().as_nanos()).unwrap_or(i128::MAX),
    }
}

// ---------------------------------------------------------------------------
// Cache keys
// ---------------------------------------------------------------------------

/// A cache key: a time bucket paired with a store path.
///
/// The string form is `"{bucket}:{path}"`. The bucket never contains a
/// colon, so splitting at the first colon recovers the path exactly, even
/// when the path itself contains colons.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    bucket: i64,
    path: String,
}

impl CacheKey {
    pub fn new(bucket: i64, path: impl Into<String>) -> Self {
        Self {
            bucket,
            path: path.into(),
        }
    }

    /// Builds the key for `path` at `now`.
    pub fn at(now: SystemTime, window: Duration, path: &str) -> Self {
        Self::new(quantize(now, window, path), path)
    }

    pub fn bucket(&self) -> i64 {
        self.bucket
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Time left before this key is superseded by the next bucket.
    pub fn remaining(&self, now: SystemTime, window: Duration) -> Option<Duration> {
        remaining_in_bucket(self.bucket, now, window, &self.path)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bucket, self.path)
    }
}

impl FromStr for CacheKey {
    type Err = CacheFsError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let (bucket, path) = key
            .split_once(':')
            .ok_or_else(|| CacheFsError::InvalidKey(key.to_string()))?;
        let bucket = bucket
            .parse()
            .map_err(|_| CacheFsError::InvalidKey(key.to_string()))?;
        Ok(Self::new(bucket, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at_secs(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn zero_window_is_constant() {
        for secs in [0, 1, 59, 3_600, 1_700_000_000] {
            assert_eq!(quantize(at_secs(secs), Duration::ZERO, "a.txt"), 0);
        }
        assert_eq!(quantize(UNIX_EPOCH - Duration::from_secs(5), Duration::ZERO, "a"), 0);
    }

    #[test]
    fn buckets_never_decrease() {
        let window = Duration::from_secs(10);
        let mut last = i64::MIN;
        for secs in (1_700_000_000..1_700_000_100).step_by(3) {
            let bucket = quantize(at_secs(secs), window, "dir/file.txt");
            assert!(bucket >= last);
            last = bucket;
        }
    }

    #[test]
    fn bucket_changes_once_per_period() {
        let window = Duration::from_secs(10);
        let period = effective_period(window, "x");
        let start = UNIX_EPOCH + period * 1_000;

        assert_eq!(quantize(start, window, "x"), 1_000);
        assert_eq!(quantize(start + period - Duration::from_nanos(1), window, "x"), 1_000);
        assert_eq!(quantize(start + period, window, "x"), 1_001);
    }

    #[test]
    fn period_is_jittered_within_a_quarter_window() {
        let window = Duration::from_secs(60);
        let paths = ["a", "b.txt", "some/deeper/path.rs", "another/one"];
        for path in paths {
            let period = effective_period(window, path);
            assert!(period >= window);
            assert!(period < window + window / 4);
        }

        let a = effective_period(window, "a.txt");
        let b = effective_period(window, "zzz/b.bin");
        assert_ne!(checksum("a.txt"), checksum("zzz/b.bin"));
        assert_ne!(a, b);
    }

    #[test]
    fn offset_bounds() {
        let window = Duration::from_secs(100);
        assert_eq!(quantize_offset(0, window), Duration::ZERO);
        assert!(quantize_offset(u32::MAX, window) < window / 4);
        assert!(quantize_offset(u32::MAX, window) > window / 4 - Duration::from_micros(1));
    }

    #[test]
    fn remaining_reaches_zero_at_rollover() {
        let window = Duration::from_secs(10);
        let period = effective_period(window, "f");
        let start = UNIX_EPOCH + period * 7;
        let key = CacheKey::at(start, window, "f");

        assert_eq!(key.remaining(start, window), Some(period));
        assert_eq!(
            key.remaining(start + Duration::from_secs(1), window),
            Some(period - Duration::from_secs(1))
        );
        assert_eq!(key.remaining(start + period * 2, window), Some(Duration::ZERO));
        assert_eq!(key.remaining(start, Duration::ZERO), None);
    }

    #[test]
    fn key_round_trips_through_its_string_form() {
        let key = CacheKey::new(-42, "dir/with:colon.txt");
        let text = key.to_string();
        assert_eq!(text, "-42:dir/with:colon.txt");
        let parsed: CacheKey = text.parse().unwrap();
        assert_eq!(parsed, key);
        assert_eq!(parsed.path(), "dir/with:colon.txt");
    }

    #[test]
    fn malformed_keys_are_rejected() {
        assert!(matches!("nocolon".parse::<CacheKey>(), Err(CacheFsError::InvalidKey(_))));
        assert!(matches!("abc:path".parse::<CacheKey>(), Err(CacheFsError::InvalidKey(_))));
    }
}
