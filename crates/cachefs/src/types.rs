//! Metadata types carried inside cache records.
//!
//! These are plain values: they are decoded from a record once and then
//! handed out by reference or by clone. Nothing here reflects the live
//! upstream store beyond the moment the record was loaded.

use std::fs;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Mode bits
// ---------------------------------------------------------------------------

bitflags! {
    /// File type and permission bits.
    ///
    /// The high bits carry the entry type (a regular file has none of them
    /// set); the low nine bits are Unix-style permissions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct FileMode: u32 {
        const DIR         = 1 << 31;
        const SYMLINK     = 1 << 27;
        const DEVICE      = 1 << 26;
        const NAMED_PIPE  = 1 << 25;
        const SOCKET      = 1 << 24;
        const SETUID      = 1 << 23;
        const SETGID      = 1 << 22;
        const CHAR_DEVICE = 1 << 21;
        const STICKY      = 1 << 20;
        const IRREGULAR   = 1 << 19;

        const TYPE = Self::DIR.bits()
            | Self::SYMLINK.bits()
            | Self::DEVICE.bits()
            | Self::NAMED_PIPE.bits()
            | Self::SOCKET.bits()
            | Self::CHAR_DEVICE.bits()
            | Self::IRREGULAR.bits();
        const PERM = 0o777;
    }
}

impl FileMode {
    /// Returns only the type bits.
    #[inline]
    pub fn file_type(self) -> FileMode {
        self & FileMode::TYPE
    }

    /// Returns the Unix permission bits.
    #[inline]
    pub fn permissions(self) -> u32 {
        (self & FileMode::PERM).bits()
    }

    #[inline]
    pub fn is_dir(self) -> bool {
        self.contains(FileMode::DIR)
    }

    /// Returns true if no type bits are set.
    #[inline]
    pub fn is_regular(self) -> bool {
        self.file_type().is_empty()
    }

    /// Builds a mode from `std` metadata, including permission bits.
    pub fn from_fs_metadata(metadata: &fs::Metadata) -> Self {
        FileMode::from(metadata.file_type()) | permission_bits(metadata)
    }
}

impl From<fs::FileType> for FileMode {
    fn from(file_type: fs::FileType) -> Self {
        if file_type.is_dir() {
            return FileMode::DIR;
        }
        if file_type.is_symlink() {
            return FileMode::SYMLINK;
        }
        if file_type.is_file() {
            return FileMode::empty();
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;
            if file_type.is_fifo() {
                return FileMode::NAMED_PIPE;
            }
            if file_type.is_socket() {
                return FileMode::SOCKET;
            }
            if file_type.is_char_device() {
                return FileMode::DEVICE | FileMode::CHAR_DEVICE;
            }
            if file_type.is_block_device() {
                return FileMode::DEVICE;
            }
        }
        FileMode::IRREGULAR
    }
}

#[cfg(unix)]
fn permission_bits(metadata: &fs::Metadata) -> FileMode {
    use std::os::unix::fs::PermissionsExt;
    let raw = metadata.permissions().mode();
    let mut mode = FileMode::from_bits_retain(raw & 0o777);
    mode.set(FileMode::SETUID, raw & 0o4000 != 0);
    mode.set(FileMode::SETGID, raw & 0o2000 != 0);
    mode.set(FileMode::STICKY, raw & 0o1000 != 0);
    mode
}

#[cfg(not(unix))]
fn permission_bits(metadata: &fs::Metadata) -> FileMode {
    if metadata.permissions().readonly() {
        FileMode::from_bits_retain(0o444)
    } else {
        FileMode::from_bits_retain(0o666)
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Metadata describing one file or directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    name: String,
    size: u64,
    mode: FileMode,
    #[serde(with = "unix_time")]
    modified: Option<SystemTime>,
}

impl Metadata {
    pub fn new(
        name: impl Into<String>,
        size: u64,
        mode: FileMode,
        modified: Option<SystemTime>,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            mode,
            modified,
        }
    }

    /// Metadata carrying only a name and type bits.
    ///
    /// Size is zero and the modification time is absent. This is what a
    /// directory listing records when per-child stat calls are disabled.
    pub fn type_only(name: impl Into<String>, mode: FileMode) -> Self {
        Self::new(name, 0, mode.file_type(), None)
    }

    /// Builds metadata from `std` metadata under the given base name.
    pub fn from_fs_metadata(name: impl Into<String>, metadata: &fs::Metadata) -> Self {
        Self::new(
            name,
            metadata.len(),
            FileMode::from_fs_metadata(metadata),
            metadata.modified().ok(),
        )
    }

    /// The base name of the entry.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Length in bytes for regular files; store-dependent for others.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mode(&self) -> FileMode {
        self.mode
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    pub fn is_dir(&self) -> bool {
        self.mode.is_dir()
    }
}

// ---------------------------------------------------------------------------
// Directory entries
// ---------------------------------------------------------------------------

/// One child of a directory, as observed when the directory was loaded.
///
/// This is less complete than a full [`Metadata`] from a stat
/// of the child: when the cache runs with `no_stat` enabled only the name
/// and type bits are recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirEntry {
    info: Metadata,
}

impl DirEntry {
    pub fn new(info: Metadata) -> Self {
        Self { info }
    }

    /// The base name of the child, not the full path.
    pub fn name(&self) -> &str {
        self.info.name()
    }

    /// The type bits of the child.
    pub fn file_type(&self) -> FileMode {
        self.info.mode().file_type()
    }

    pub fn is_dir(&self) -> bool {
        self.info.is_dir()
    }

    /// The metadata recorded for this child at load time.
    ///
    /// In `no_stat` mode the size is zero and the modification time is
    /// `None`, and the mode holds only type bits. In either mode the
    /// values are a snapshot from when the directory was loaded, not the
    /// current state of the child upstream.
    pub fn metadata(&self) -> &Metadata {
        &self.info
    }
}

impl From<Metadata> for DirEntry {
    fn from(info: Metadata) -> Self {
        Self::new(info)
    }
}

// ---------------------------------------------------------------------------
// Timestamp encoding
// ---------------------------------------------------------------------------

/// Encodes `Option<SystemTime>` as signed seconds and nanoseconds from the
/// Unix epoch, so times before 1970 round-trip.
mod unix_time {
    use super::*;
    use serde::de::Error as _;
    use serde::{Deserializer, Serializer};

    const NANOS_PER_SEC: u32 = 1_000_000_000;

    pub fn serialize<S: Serializer>(
        value: &Option<SystemTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.map(to_parts).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<SystemTime>, D::Error> {
        let parts: Option<(i64, u32)> = Option::deserialize(deserializer)?;
        parts
            .map(|(secs, nanos)| {
                from_parts(secs, nanos).ok_or_else(|| {
                    D::Error::custom(format!("timestamp out of range: {secs}s {nanos}ns"))
                })
            })
            .transpose()
    }

    fn to_parts(time: SystemTime) -> (i64, u32) {
        match time.duration_since(UNIX_EPOCH) {
            Ok(after) => (
                i64::try_from(after.as_secs()).unwrap_or(i64::MAX),
                after.subsec_nanos(),
            ),
            Err(err) => {
                let before = err.duration();
                let secs = i64::try_from(before.as_secs()).unwrap_or(i64::MAX);
                match before.subsec_nanos() {
                    0 => (-secs, 0),
                    nanos => (-secs - 1, NANOS_PER_SEC - nanos),
                }
            }
        }
    }

    fn from_parts(secs: i64, nanos: u32) -> Option<SystemTime> {
        if nanos >= NANOS_PER_SEC {
            return None;
        }
        let base = if secs >= 0 {
            UNIX_EPOCH.checked_add(Duration::from_secs(secs.unsigned_abs()))?
        } else {
            UNIX_EPOCH.checked_sub(Duration::from_secs(secs.unsigned_abs()))?
        };
        base.checked_add(Duration::from_nanos(u64::from(nanos)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn mode_type_and_permissions_are_separate() {
        let mode = FileMode::DIR | FileMode::from_bits_retain(0o755);
        assert!(mode.is_dir());
        assert!(!mode.is_regular());
        assert_eq!(mode.file_type(), FileMode::DIR);
        assert_eq!(mode.permissions(), 0o755);

        let file = FileMode::from_bits_retain(0o644);
        assert!(file.is_regular());
        assert!(file.file_type().is_empty());
    }

    #[test]
    fn type_only_drops_size_time_and_permissions() {
        let mode = FileMode::DIR | FileMode::from_bits_retain(0o700);
        let meta = Metadata::type_only("sub", mode);
        assert_eq!(meta.name(), "sub");
        assert_eq!(meta.size(), 0);
        assert_eq!(meta.modified(), None);
        assert_eq!(meta.mode(), FileMode::DIR);
    }

    #[test]
    fn from_fs_metadata_reads_real_entries() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.txt");
        std::fs::write(&path, b"hello").unwrap();

        let meta = Metadata::from_fs_metadata("a.txt", &std::fs::metadata(&path).unwrap());
        assert_eq!(meta.size(), 5);
        assert!(meta.mode().is_regular());
        assert!(meta.modified().is_some());

        let dir = Metadata::from_fs_metadata("d", &std::fs::metadata(temp.path()).unwrap());
        assert!(dir.is_dir());
    }

    #[test]
    fn timestamps_before_epoch_survive_encoding() {
        let before = UNIX_EPOCH - Duration::new(10, 250);
        let meta = Metadata::new("old", 1, FileMode::empty(), Some(before));
        let bytes = postcard::to_stdvec(&meta).unwrap();
        let back: Metadata = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn dir_entry_exposes_recorded_metadata() {
        let entry = DirEntry::from(Metadata::type_only("b", FileMode::DIR));
        assert_eq!(entry.name(), "b");
        assert!(entry.is_dir());
        assert_eq!(entry.file_type(), FileMode::DIR);
        assert_eq!(entry.metadata().size(), 0);
    }
}
