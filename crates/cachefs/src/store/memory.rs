//! An in-memory [`FileStore`].

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;

use super::{FileStore, StoreDirEntry, StoreFile};
use crate::path;
use crate::types::{FileMode, Metadata};

const FILE_PERM: u32 = 0o644;
const DIR_PERM: u32 = 0o755;

#[derive(Debug, Clone)]
enum Node {
    File { data: Vec<u8>, modified: SystemTime },
    Dir { modified: SystemTime },
}

impl Node {
    fn mode(&self) -> FileMode {
        match self {
            Node::File { .. } => FileMode::from_bits_retain(FILE_PERM),
            Node::Dir { .. } => FileMode::DIR | FileMode::from_bits_retain(DIR_PERM),
        }
    }

    fn metadata(&self, name: &str) -> Metadata {
        match self {
            Node::File { data, modified } => {
                Metadata::new(name, data.len() as u64, self.mode(), Some(*modified))
            }
            Node::Dir { modified } => Metadata::new(name, 0, self.mode(), Some(*modified)),
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, Node::Dir { .. })
    }
}

#[derive(Debug)]
struct Tree {
    nodes: BTreeMap<String, Node>,
    /// Paths whose metadata lookups from a listing fail.
    broken: HashSet<String>,
}

/// A mutable in-memory tree of files and directories.
///
/// Clones share the same tree, so a test can keep a handle while the cache
/// owns another. Every successful `open` is counted, which makes it easy to
/// observe how often the cache went to the store.
#[derive(Debug, Clone)]
pub struct MemStore {
    tree: Arc<RwLock<Tree>>,
    opens: Arc<AtomicU64>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    /// Creates a store holding only an empty root directory.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            ".".to_string(),
            Node::Dir {
                modified: SystemTime::now(),
            },
        );
        Self {
            tree: Arc::new(RwLock::new(Tree {
                nodes,
                broken: HashSet::new(),
            })),
            opens: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Adds or replaces a file, creating missing parent directories.
    pub fn add_file(&self, name: &str, data: impl Into<Vec<u8>>) -> &Self {
        let now = SystemTime::now();
        let mut tree = self.tree.write();
        add_parents(&mut tree, name, now);
        tree.nodes.insert(
            name.to_string(),
            Node::File {
                data: data.into(),
                modified: now,
            },
        );
        self
    }

    /// Adds a directory, creating missing parent directories.
    pub fn add_dir(&self, name: &str) -> &Self {
        let now = SystemTime::now();
        let mut tree = self.tree.write();
        add_parents(&mut tree, name, now);
        tree.nodes
            .entry(name.to_string())
            .or_insert(Node::Dir { modified: now });
        self
    }

    /// Removes an entry and everything below it.
    pub fn remove(&self, name: &str) -> &Self {
        let prefix = format!("{name}/");
        let mut tree = self.tree.write();
        tree.nodes
            .retain(|key, _| key != name && !key.starts_with(&prefix));
        self
    }

    /// Makes metadata lookups for `name` from a directory listing fail,
    /// while the entry itself keeps appearing in listings.
    pub fn break_metadata(&self, name: &str) -> &Self {
        self.tree.write().broken.insert(name.to_string());
        self
    }

    /// Number of successful `open` calls so far.
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::SeqCst)
    }
}

fn add_parents(tree: &mut Tree, name: &str, now: SystemTime) {
    let mut parent = String::new();
    let parts: Vec<&str> = name.split('/').collect();
    for part in &parts[..parts.len().saturating_sub(1)] {
        if !parent.is_empty() {
            parent.push('/');
        }
        parent.push_str(part);
        tree.nodes
            .entry(parent.clone())
            .or_insert(Node::Dir { modified: now });
    }
}

fn parent_of(name: &str) -> &str {
    name.rsplit_once('/').map(|(parent, _)| parent).unwrap_or(".")
}

fn not_found(name: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{name}: no such file or directory"))
}

impl FileStore for MemStore {
    type File = MemFile;

    fn open(&self, name: &str) -> io::Result<MemFile> {
        if !path::is_valid(name) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid path {name:?}"),
            ));
        }
        if !self.tree.read().nodes.contains_key(name) {
            return Err(not_found(name));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(MemFile {
            tree: Arc::clone(&self.tree),
            path: name.to_string(),
        })
    }
}

/// An open entry of a [`MemStore`].
#[derive(Debug)]
pub struct MemFile {
    tree: Arc<RwLock<Tree>>,
    path: String,
}

impl MemFile {
    fn node(&self) -> io::Result<Node> {
        self.tree
            .read()
            .nodes
            .get(&self.path)
            .cloned()
            .ok_or_else(|| not_found(&self.path))
    }
}

impl StoreFile for MemFile {
    type Entry = MemDirEntry;

    fn stat(&self) -> io::Result<Metadata> {
        Ok(self.node()?.metadata(path::base_name(&self.path)))
    }

    fn read_dir(&mut self) -> io::Result<Vec<MemDirEntry>> {
        let tree = self.tree.read();
        match tree.nodes.get(&self.path) {
            Some(node) if node.is_dir() => {}
            Some(_) => {
                return Err(io::Error::other(format!("{}: not a directory", self.path)));
            }
            None => return Err(not_found(&self.path)),
        }

        Ok(tree
            .nodes
            .iter()
            .filter(|(key, _)| key.as_str() != "." && parent_of(key) == self.path)
            .map(|(key, node)| MemDirEntry {
                tree: Arc::clone(&self.tree),
                name: path::base_name(key).to_string(),
                path: key.clone(),
                file_type: node.mode().file_type(),
            })
            .collect())
    }

    fn read_all(&mut self) -> io::Result<Vec<u8>> {
        match self.node()? {
            Node::File { data, .. } => Ok(data),
            Node::Dir { .. } => Err(io::Error::other(format!("{}: is a directory", self.path))),
        }
    }
}

/// A child listed from a [`MemFile`].
#[derive(Debug)]
pub struct MemDirEntry {
    tree: Arc<RwLock<Tree>>,
    name: String,
    path: String,
    file_type: FileMode,
}

impl StoreDirEntry for MemDirEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn file_type(&self) -> FileMode {
        self.file_type
    }

    fn metadata(&self) -> io::Result<Metadata> {
        let tree = self.tree.read();
        if tree.broken.contains(&self.path) {
            return Err(io::Error::other(format!("{}: metadata unavailable", self.path)));
        }
        tree.nodes
            .get(&self.path)
            .map(|node| node.metadata(&self.name))
            .ok_or_else(|| not_found(&self.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_parents_and_lists_children() {
        let store = MemStore::new();
        store.add_file("b/inner.txt", "x").add_file("a.txt", "hi");

        let mut root = store.open(".").unwrap();
        let entries = root.read_dir().unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["a.txt", "b"]);
        assert!(entries[1].file_type().is_dir());

        let mut sub = store.open("b").unwrap();
        let entries = sub.read_dir().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name(), "inner.txt");
        assert_eq!(store.opens(), 2);
    }

    #[test]
    fn reads_and_stats_files() {
        let store = MemStore::new();
        store.add_file("dir/f.bin", vec![1u8, 2, 3]);

        let mut file = store.open("dir/f.bin").unwrap();
        let meta = file.stat().unwrap();
        assert_eq!(meta.name(), "f.bin");
        assert_eq!(meta.size(), 3);
        assert_eq!(meta.mode().permissions(), 0o644);
        assert_eq!(file.read_all().unwrap(), vec![1, 2, 3]);
        assert!(file.read_dir().is_err());
    }

    #[test]
    fn removal_and_broken_metadata() {
        let store = MemStore::new();
        store.add_file("d/keep", "k").add_file("d/flaky", "f");
        store.break_metadata("d/flaky");

        let entries = store.open("d").unwrap().read_dir().unwrap();
        assert_eq!(entries.len(), 2);
        let flaky = entries.iter().find(|e| e.name() == "flaky").unwrap();
        assert!(flaky.metadata().is_err());

        store.remove("d");
        assert_eq!(store.open("d/keep").unwrap_err().kind(), io::ErrorKind::NotFound);
        assert_eq!(store.opens(), 1);
    }
}
