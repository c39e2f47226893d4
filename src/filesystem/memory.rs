//! In-memory storage backend

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use super::Storage;
use crate::error::{Error, Result};
use crate::path;

/// Represents a file with content and metadata
#[derive(Debug, Clone)]
pub struct File {
    /// File content as bytes
    pub content: Vec<u8>,
    /// File permissions (simplified as u32)
    pub permissions: u32,
    /// File modification time
    pub modified_time: SystemTime,
}

impl File {
    /// Create a new file with content
    pub fn new(content: Vec<u8>) -> Self {
        Self {
            content,
            permissions: 0o644, // Default permissions
            modified_time: SystemTime::now(),
        }
    }

    /// Get file size in bytes
    pub fn size(&self) -> usize {
        self.content.len()
    }
}

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(File),
}

/// In-memory filesystem.
///
/// Clones are handles onto the same tree: a write through one clone is visible
/// through every other. Use [`MemoryFs::snapshot`] to take an independent copy
/// of the content.
#[derive(Debug, Clone)]
pub struct MemoryFs {
    nodes: Arc<RwLock<BTreeMap<PathBuf, Node>>>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// Create a new empty filesystem containing only `/`
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(PathBuf::from("/"), Node::Dir);
        Self {
            nodes: Arc::new(RwLock::new(nodes)),
        }
    }

    /// Create a filesystem pre-populated with `(path, content)` pairs
    pub fn from_files<P, C, I>(files: I) -> Result<Self>
    where
        P: AsRef<Path>,
        C: AsRef<[u8]>,
        I: IntoIterator<Item = (P, C)>,
    {
        let fs = Self::new();
        for (file_path, content) in files {
            fs.write_file(file_path.as_ref(), content.as_ref())?;
        }
        Ok(fs)
    }

    /// Get a copy of a file with its metadata
    pub fn get_file<P: AsRef<Path>>(&self, file_path: P) -> Option<File> {
        let key = path::clean(file_path.as_ref());
        match self.read_nodes().ok()?.get(&key) {
            Some(Node::File(file)) => Some(file.clone()),
            _ => None,
        }
    }

    /// Get the number of files (directories are not counted)
    pub fn len(&self) -> usize {
        self.read_nodes()
            .map(|nodes| nodes.values().filter(|n| matches!(n, Node::File(_))).count())
            .unwrap_or(0)
    }

    /// Check if the filesystem holds no files
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Independent copy of every file's content, keyed by path
    pub fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        self.read_nodes()
            .map(|nodes| {
                nodes
                    .iter()
                    .filter_map(|(p, node)| match node {
                        Node::File(file) => Some((p.clone(), file.content.clone())),
                        Node::Dir => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn read_nodes(&self) -> Result<RwLockReadGuard<'_, BTreeMap<PathBuf, Node>>> {
        self.nodes.read().map_err(|_| Error::LockPoisoned {
            context: "memory filesystem".to_string(),
        })
    }

    fn write_nodes(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<PathBuf, Node>>> {
        self.nodes.write().map_err(|_| Error::LockPoisoned {
            context: "memory filesystem".to_string(),
        })
    }

    /// Insert directory nodes for `dir` and all of its ancestors.
    fn ensure_dirs(nodes: &mut BTreeMap<PathBuf, Node>, dir: &Path) -> Result<()> {
        for ancestor in dir.ancestors().collect::<Vec<_>>().into_iter().rev() {
            match nodes.get(ancestor) {
                Some(Node::Dir) => {}
                Some(Node::File(_)) => {
                    return Err(Error::Filesystem {
                        path: ancestor.to_path_buf(),
                        message: "not a directory".to_string(),
                    });
                }
                None => {
                    nodes.insert(ancestor.to_path_buf(), Node::Dir);
                }
            }
        }
        Ok(())
    }
}

impl Storage for MemoryFs {
    fn read_file(&self, file_path: &Path) -> Result<Vec<u8>> {
        let key = path::clean(file_path);
        match self.read_nodes()?.get(&key) {
            Some(Node::File(file)) => Ok(file.content.clone()),
            Some(Node::Dir) => Err(Error::Filesystem {
                path: key,
                message: "is a directory".to_string(),
            }),
            None => Err(Error::NotFound { path: key }),
        }
    }

    fn write_file(&self, file_path: &Path, content: &[u8]) -> Result<()> {
        let key = path::clean(file_path);
        let mut nodes = self.write_nodes()?;

        if let Some(Node::Dir) = nodes.get(&key) {
            return Err(Error::Filesystem {
                path: key,
                message: "is a directory".to_string(),
            });
        }
        if let Some(parent) = key.parent() {
            Self::ensure_dirs(&mut nodes, parent)?;
        }

        nodes.insert(key, Node::File(File::new(content.to_vec())));
        Ok(())
    }

    fn mkdir_all(&self, dir: &Path) -> Result<()> {
        let key = path::clean(dir);
        let mut nodes = self.write_nodes()?;
        Self::ensure_dirs(&mut nodes, &key)
    }

    fn remove_all(&self, target: &Path) -> Result<()> {
        let key = path::clean(target);
        let mut nodes = self.write_nodes()?;
        nodes.retain(|p, _| p == Path::new("/") || !p.starts_with(&key));
        Ok(())
    }

    fn read_dir(&self, dir: &Path) -> Result<Vec<String>> {
        let key = path::clean(dir);
        let nodes = self.read_nodes()?;
        match nodes.get(&key) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => {
                return Err(Error::Filesystem {
                    path: key,
                    message: "not a directory".to_string(),
                });
            }
            None => return Err(Error::NotFound { path: key }),
        }

        // BTreeMap ordering keeps the names sorted.
        Ok(nodes
            .keys()
            .filter(|p| p.parent() == Some(key.as_path()))
            .filter_map(|p| p.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect())
    }

    fn exists(&self, target: &Path) -> bool {
        let key = path::clean(target);
        self.read_nodes()
            .map(|nodes| nodes.contains_key(&key))
            .unwrap_or(false)
    }

    fn is_dir(&self, target: &Path) -> bool {
        let key = path::clean(target);
        self.read_nodes()
            .map(|nodes| matches!(nodes.get(&key), Some(Node::Dir)))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_read() {
        let fs = MemoryFs::new();
        fs.write_file(Path::new("/test.txt"), b"in memory").unwrap();
        assert_eq!(fs.read_file(Path::new("/test.txt")).unwrap(), b"in memory");
        assert_eq!(fs.len(), 1);
    }

    #[test]
    fn test_write_creates_parents() {
        let fs = MemoryFs::new();
        fs.write_file(Path::new("/a/b/c.txt"), b"x").unwrap();
        assert!(fs.is_dir(Path::new("/a")));
        assert!(fs.is_dir(Path::new("/a/b")));
        assert!(!fs.is_dir(Path::new("/a/b/c.txt")));
        assert!(fs.exists(Path::new("a/b/c.txt")));
    }

    #[test]
    fn test_write_under_file_fails() {
        let fs = MemoryFs::new();
        fs.write_file(Path::new("/a"), b"file").unwrap();
        let err = fs.write_file(Path::new("/a/b.txt"), b"x").unwrap_err();
        assert!(matches!(err, Error::Filesystem { .. }));
    }

    #[test]
    fn test_write_over_directory_fails() {
        let fs = MemoryFs::new();
        fs.mkdir_all(Path::new("/dir")).unwrap();
        assert!(fs.write_file(Path::new("/dir"), b"x").is_err());
    }

    #[test]
    fn test_read_missing() {
        let fs = MemoryFs::new();
        let err = fs.read_file(Path::new("/missing")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_read_dir_lists_direct_children_sorted() {
        let fs = MemoryFs::from_files([
            ("/testdir/file2.txt", "2"),
            ("/testdir/file1.txt", "1"),
            ("/testdir/sub/deep.txt", "3"),
        ])
        .unwrap();

        let names = fs.read_dir(Path::new("/testdir")).unwrap();
        assert_eq!(names, vec!["file1.txt", "file2.txt", "sub"]);
    }

    #[test]
    fn test_read_dir_on_file() {
        let fs = MemoryFs::from_files([("/f.txt", "x")]).unwrap();
        assert!(fs.read_dir(Path::new("/f.txt")).is_err());
        assert!(fs.read_dir(Path::new("/missing")).unwrap_err().is_not_found());
    }

    #[test]
    fn test_mkdir_all() {
        let fs = MemoryFs::new();
        fs.mkdir_all(Path::new("/test/dir")).unwrap();
        assert!(fs.is_dir(Path::new("/test")));
        assert!(fs.is_dir(Path::new("/test/dir")));
        assert!(fs.is_empty());
    }

    #[test]
    fn test_remove_all() {
        let fs = MemoryFs::from_files([("/dir/a.txt", "a"), ("/dir/sub/b.txt", "b"), ("/keep.txt", "k")])
            .unwrap();
        fs.remove_all(Path::new("/dir")).unwrap();
        assert!(!fs.exists(Path::new("/dir")));
        assert!(!fs.exists(Path::new("/dir/sub/b.txt")));
        assert!(fs.exists(Path::new("/keep.txt")));

        // Removing something that is not there is fine
        fs.remove_all(Path::new("/dir")).unwrap();
    }

    #[test]
    fn test_remove_all_does_not_touch_siblings_with_shared_prefix() {
        let fs = MemoryFs::from_files([("/app/a.txt", "a"), ("/application/b.txt", "b")]).unwrap();
        fs.remove_all(Path::new("/app")).unwrap();
        assert!(fs.exists(Path::new("/application/b.txt")));
    }

    #[test]
    fn test_clones_share_content() {
        let fs = MemoryFs::new();
        let handle = fs.clone();
        handle.write_file(Path::new("/shared.txt"), b"x").unwrap();
        assert!(fs.exists(Path::new("/shared.txt")));
    }

    #[test]
    fn test_snapshot_is_independent() {
        let fs = MemoryFs::from_files([("/a.txt", "a")]).unwrap();
        let before = fs.snapshot();
        fs.write_file(Path::new("/a.txt"), b"changed").unwrap();
        assert_eq!(before.get(Path::new("/a.txt")).unwrap(), b"a");
    }

    #[test]
    fn test_get_file_metadata() {
        let fs = MemoryFs::from_files([("/a.txt", "abc")]).unwrap();
        let file = fs.get_file("/a.txt").unwrap();
        assert_eq!(file.size(), 3);
        assert_eq!(file.permissions, 0o644);
        assert!(fs.get_file("/missing").is_none());
    }

    #[test]
    fn test_create_truncates() {
        let fs = MemoryFs::from_files([("/a.txt", "abc")]).unwrap();
        fs.create(Path::new("/a.txt")).unwrap();
        assert!(fs.read_file(Path::new("/a.txt")).unwrap().is_empty());
    }
}
