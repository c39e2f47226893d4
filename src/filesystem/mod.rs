//! # Storage Adapters
//!
//! This module defines the [`Storage`] trait, the single file-access contract
//! every backend implements, together with the backends themselves:
//!
//! - **[`DiskFs`]**: the host filesystem. The only backend that resolves
//!   symbolic links.
//! - **[`MemoryFs`]**: an in-memory tree. Handles are cheap to clone and share
//!   their content.
//! - **[`ReadOnlyFs`]**: wraps any backend and rejects every mutating call with
//!   [`Error::ReadOnly`](crate::error::Error::ReadOnly).
//! - **[`BasePathFs`]**: translates every path through a fixed prefix.
//! - **[`OverlayFs`]**: layers a writable overlay over a base backend.
//!
//! All backends accept relative paths and clean them against the backend's
//! working directory (the process working directory for [`DiskFs`], `/` for
//! everything else).
//!
//! ## Example
//!
//! ```
//! use overlay_render::filesystem::{self, OverlayFs, OverlayOptions, Storage};
//! use std::path::Path;
//!
//! let base = filesystem::in_memory();
//! base.write_file(Path::new("/app/cm.yaml"), b"original").unwrap();
//!
//! let composed = OverlayFs::compose(
//!     base.clone(),
//!     OverlayOptions::new().with_override("/app/cm.yaml", b"patched".to_vec()),
//! )
//! .unwrap();
//!
//! assert_eq!(composed.read_file(Path::new("/app/cm.yaml")).unwrap(), b"patched");
//! assert_eq!(base.read_file(Path::new("/app/cm.yaml")).unwrap(), b"original");
//! ```

use std::fmt;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glob::{MatchOptions, Pattern};

use crate::error::{Error, Result};
use crate::path;

mod base_path;
mod disk;
mod memory;
mod overlay;
mod readonly;

pub use base_path::BasePathFs;
pub use disk::DiskFs;
pub use memory::{File, MemoryFs};
pub use overlay::{OverlayFs, OverlayOptions};
pub use readonly::ReadOnlyFs;

/// A path split into its containing directory and, for files, the file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Absolute, cleaned directory.
    pub dir: PathBuf,
    /// File name when the path named a file, `None` when it named a directory.
    pub file: Option<String>,
}

/// One entry produced by [`Storage::walk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Uniform file-access contract over a hierarchical byte store.
///
/// Only `read_file`, `write_file`, `mkdir_all`, `remove_all`, `read_dir`,
/// `exists` and `is_dir` are required. The remaining operations have
/// default implementations expressed in terms of those, which is what gives
/// composed backends such as [`OverlayFs`] a consistent union view.
pub trait Storage: Send + Sync + fmt::Debug {
    /// Read the full content of a file.
    fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write a file, replacing any previous content and creating missing
    /// parent directories.
    fn write_file(&self, path: &Path, content: &[u8]) -> Result<()>;

    /// Create a directory and all of its missing parents.
    fn mkdir_all(&self, path: &Path) -> Result<()>;

    /// Remove a path and everything below it. Missing paths are not an error.
    fn remove_all(&self, path: &Path) -> Result<()>;

    /// List the names of the direct children of a directory, sorted.
    fn read_dir(&self, path: &Path) -> Result<Vec<String>>;

    /// Check whether a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Check whether a path exists and is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Whether every mutating call on this backend fails.
    fn is_read_only(&self) -> bool {
        false
    }

    /// The absolute directory relative paths are resolved against.
    fn working_dir(&self) -> Result<PathBuf> {
        Ok(PathBuf::from("/"))
    }

    /// Resolve symbolic links in an absolute path. Backends without links
    /// return the path unchanged.
    fn resolve_links(&self, path: &Path) -> Result<PathBuf> {
        Ok(path.to_path_buf())
    }

    /// Create an empty file, truncating any existing one.
    fn create(&self, path: &Path) -> Result<()> {
        self.write_file(path, &[])
    }

    /// Open a file for reading.
    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.read_file(path)?)))
    }

    /// Walk the tree rooted at `root`, depth first, parents before children,
    /// siblings in name order. The root itself is the first entry.
    fn walk(&self, root: &Path) -> Result<Vec<WalkEntry>> {
        let root = path::absolutize(&self.working_dir()?, root);
        if !self.exists(&root) {
            return Err(Error::NotFound { path: root });
        }

        let mut entries = Vec::new();
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            let is_dir = self.is_dir(&current);
            entries.push(WalkEntry {
                path: current.clone(),
                is_dir,
            });
            if is_dir {
                for name in self.read_dir(&current)?.into_iter().rev() {
                    stack.push(current.join(name));
                }
            }
        }
        Ok(entries)
    }

    /// Return every path matching a glob pattern, sorted. `*` does not cross
    /// directory separators.
    fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let absolute = path::absolutize(&self.working_dir()?, Path::new(pattern));
        let compiled = Pattern::new(&absolute.to_string_lossy())?;
        let options = MatchOptions {
            require_literal_separator: true,
            ..MatchOptions::default()
        };

        let root = path::glob_root(&absolute);
        if !self.exists(&root) {
            return Ok(Vec::new());
        }

        let mut matches: Vec<PathBuf> = self
            .walk(&root)?
            .into_iter()
            .map(|entry| entry.path)
            .filter(|p| compiled.matches_with(&p.to_string_lossy(), options))
            .collect();
        matches.sort();
        Ok(matches)
    }

    /// Split a path into its absolute directory and optional file name.
    ///
    /// Relative paths are cleaned against [`Storage::working_dir`], links are
    /// resolved through [`Storage::resolve_links`]. A missing path yields
    /// [`Error::NotFound`].
    fn resolve_dir_and_name(&self, path: &Path) -> Result<ResolvedPath> {
        let target = if path.as_os_str().is_empty() {
            Path::new(".")
        } else {
            path
        };
        let absolute = path::absolutize(&self.working_dir()?, target);
        let resolved = self.resolve_links(&absolute)?;

        if self.is_dir(&resolved) {
            return Ok(ResolvedPath {
                dir: resolved,
                file: None,
            });
        }
        if !self.exists(&resolved) {
            return Err(Error::NotFound {
                path: path.to_path_buf(),
            });
        }

        let dir = resolved
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        let file = resolved
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        Ok(ResolvedPath { dir, file })
    }
}

/// Create a storage adapter backed by the host filesystem.
pub fn on_disk() -> Arc<dyn Storage> {
    Arc::new(DiskFs::new())
}

/// Create an empty in-memory storage adapter.
pub fn in_memory() -> Arc<dyn Storage> {
    Arc::new(MemoryFs::new())
}

/// Wrap a storage adapter so every mutating call fails.
pub fn read_only(base: Arc<dyn Storage>) -> Arc<dyn Storage> {
    Arc::new(ReadOnlyFs::new(base))
}

/// Restrict a storage adapter to the subtree below `prefix`.
pub fn with_base_path(base: Arc<dyn Storage>, prefix: impl AsRef<Path>) -> Result<Arc<dyn Storage>> {
    Ok(Arc::new(BasePathFs::new(base, prefix)?))
}

/// Build a read-only adapter from files compiled into the binary (for example
/// with `include_bytes!`).
///
/// When `root` is given, the adapter exposes only that subtree, with `root`
/// appearing as `/`.
pub fn from_embedded(files: &[(&str, &[u8])], root: Option<&str>) -> Result<Arc<dyn Storage>> {
    let memory = MemoryFs::new();
    for (file_path, content) in files {
        memory.write_file(Path::new(file_path), content)?;
    }

    let tree: Arc<dyn Storage> = Arc::new(memory);
    let tree = match root.filter(|r| !r.is_empty()) {
        Some(root) => with_base_path(tree, root)?,
        None => tree,
    };
    Ok(read_only(tree))
}
