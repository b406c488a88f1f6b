//! Record encoding - the byte layout of one cached entry.
//!
//! A record is a postcard-encoded header followed directly by the raw file
//! content:
//!
//! ```text
//! +--------------------------------------+---------------------------+
//! | header: { version, metadata,         | content (raw bytes,       |
//! |           children }  (postcard)     | no framing)               |
//! +--------------------------------------+---------------------------+
//! ```
//!
//! Postcard encodings are self-terminating, so decoding the header also
//! tells us exactly where it ends. Only the header is deserialized; the
//! content is handed back as a `Bytes` slice of the input buffer, which
//! shares its storage instead of copying it.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{CacheFsError, Result};
use crate::types::{DirEntry, Metadata};

/// Record format version - increment when changing the header layout.
pub const RECORD_VERSION: u32 = 1;

#[derive(Serialize)]
struct RecordHeaderRef<'a> {
    version: u32,
    metadata: &'a Metadata,
    children: &'a [DirEntry],
}

#[derive(Deserialize)]
struct RecordHeader {
    version: u32,
    metadata: Metadata,
    children: Vec<DirEntry>,
}

/// A decoded record.
#[derive(Debug, Clone)]
pub struct Record {
    pub metadata: Metadata,
    /// Directory children in load order. Empty for non-directories.
    pub children: Vec<DirEntry>,
    /// File content, sharing storage with the decoded buffer. Empty for
    /// directories.
    pub content: Bytes,
    /// Offset of the content within the decoded buffer.
    pub header_len: usize,
}

/// Encodes a record.
///
/// Directories must not carry content and non-directories must not carry
/// children; a record that breaks either rule would be rejected by
/// [`decode`], so it is rejected here instead.
pub fn encode(metadata: &Metadata, children: &[DirEntry], content: &[u8]) -> Result<Vec<u8>> {
    if let Some(problem) = shape_problem(metadata, children.len(), content.len()) {
        return Err(CacheFsError::Encode(problem));
    }

    let header = RecordHeaderRef {
        version: RECORD_VERSION,
        metadata,
        children,
    };
    let mut buf = postcard::to_stdvec(&header)
        .map_err(|error| CacheFsError::Encode(format!("failed to encode header: {error}")))?;

    // content goes after the header, unframed
    buf.reserve_exact(content.len());
    buf.extend_from_slice(content);
    Ok(buf)
}

/// Decodes a record without copying its content.
///
/// The content length is not checked against `metadata.size()`; the record
/// is trusted to describe whatever the loader actually read.
pub fn decode(buf: &Bytes) -> Result<Record> {
    let (header, rest): (RecordHeader, &[u8]) = postcard::take_from_bytes(buf)?;
    if header.version != RECORD_VERSION {
        return Err(CacheFsError::RecordVersion {
            found: header.version,
            expected: RECORD_VERSION,
        });
    }

    let header_len = buf.len() - rest.len();
    if let Some(problem) = shape_problem(&header.metadata, header.children.len(), rest.len()) {
        return Err(CacheFsError::Decode(problem));
    }

    Ok(Record {
        metadata: header.metadata,
        children: header.children,
        content: buf.slice(header_len..),
        header_len,
    })
}

fn shape_problem(metadata: &Metadata, children: usize, content: usize) -> Option<String> {
    if metadata.is_dir() && content != 0 {
        return Some(format!(
            "directory record {:?} carries {content} content bytes",
            metadata.name()
        ));
    }
    if !metadata.is_dir() && children != 0 {
        return Some(format!(
            "file record {:?} carries {children} children",
            metadata.name()
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileMode;
    use std::time::{Duration, UNIX_EPOCH};

    fn file_meta(name: &str, size: u64) -> Metadata {
        Metadata::new(
            name,
            size,
            FileMode::from_bits_retain(0o644),
            Some(UNIX_EPOCH + Duration::new(1_700_000_000, 123)),
        )
    }

    fn dir_meta(name: &str) -> Metadata {
        Metadata::new(name, 4096, FileMode::DIR | FileMode::from_bits_retain(0o755), None)
    }

    #[test]
    fn file_record_round_trips() {
        let meta = file_meta("a.txt", 11);
        let buf = Bytes::from(encode(&meta, &[], b"hello world").unwrap());

        let record = decode(&buf).unwrap();
        assert_eq!(record.metadata, meta);
        assert!(record.children.is_empty());
        assert_eq!(&record.content[..], b"hello world");
        assert_eq!(record.header_len + record.content.len(), buf.len());
    }

    #[test]
    fn directory_record_keeps_child_order() {
        let children = vec![
            DirEntry::new(file_meta("zeta", 3)),
            DirEntry::new(Metadata::type_only("alpha", FileMode::DIR)),
            DirEntry::new(file_meta("mid", 0)),
        ];
        let buf = Bytes::from(encode(&dir_meta("d"), &children, &[]).unwrap());

        let record = decode(&buf).unwrap();
        assert!(record.metadata.is_dir());
        assert_eq!(record.children, children);
        assert!(record.content.is_empty());
        assert_eq!(record.header_len, buf.len());
    }

    #[test]
    fn content_is_a_view_of_the_input() {
        let content: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
        let buf = Bytes::from(encode(&file_meta("big.bin", content.len() as u64), &[], &content).unwrap());

        let record = decode(&buf).unwrap();
        assert_eq!(record.content.as_ptr(), buf[record.header_len..].as_ptr());
        assert_eq!(record.content.len(), content.len());
        assert_eq!(&record.content[..], &content[..]);
    }

    #[test]
    fn content_that_looks_like_a_header_is_left_alone() {
        let meta = file_meta("nested.rec", 0);
        let inner = encode(&file_meta("inner", 2), &[], b"hi").unwrap();
        let buf = Bytes::from(encode(&meta, &[], &inner).unwrap());

        let record = decode(&buf).unwrap();
        assert_eq!(&record.content[..], &inner[..]);
    }

    #[test]
    fn size_mismatch_is_not_checked() {
        let buf = Bytes::from(encode(&file_meta("short", 1_000), &[], b"abc").unwrap());
        let record = decode(&buf).unwrap();
        assert_eq!(record.metadata.size(), 1_000);
        assert_eq!(record.content.len(), 3);
    }

    #[test]
    fn truncated_header_fails() {
        let buf = encode(&dir_meta("d"), &[DirEntry::new(file_meta("x", 1))], &[]).unwrap();
        for cut in [0, 1, buf.len() / 2, buf.len() - 1] {
            let truncated = Bytes::copy_from_slice(&buf[..cut]);
            assert!(matches!(decode(&truncated), Err(CacheFsError::Decode(_))), "cut at {cut}");
        }
    }

    #[test]
    fn unknown_version_fails() {
        let mut buf = encode(&file_meta("v", 0), &[], &[]).unwrap();
        // the version is the first varint of the header
        buf[0] = 9;
        let err = decode(&Bytes::from(buf)).unwrap_err();
        assert!(matches!(err, CacheFsError::RecordVersion { found: 9, expected: 1 }));
    }

    #[test]
    fn shape_violations_are_rejected() {
        let children = [DirEntry::new(file_meta("x", 1))];
        assert!(matches!(
            encode(&file_meta("f", 0), &children, &[]),
            Err(CacheFsError::Encode(_))
        ));
        assert!(matches!(
            encode(&dir_meta("d"), &[], b"data"),
            Err(CacheFsError::Encode(_))
        ));

        // a directory record with trailing bytes
        let mut buf = encode(&dir_meta("d"), &[], &[]).unwrap();
        buf.extend_from_slice(b"junk");
        assert!(matches!(decode(&Bytes::from(buf)), Err(CacheFsError::Decode(_))));
    }
}
