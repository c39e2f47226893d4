//! Storage restricted to a subtree

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{ResolvedPath, Storage, WalkEntry};
use crate::error::{Error, Result};
use crate::path;

/// Exposes the subtree below `prefix` of another adapter as its own `/`.
///
/// Every incoming path is cleaned against `/` before the prefix is applied, so
/// `..` can never climb above the prefix. Paths coming back out (walk, glob,
/// resolve) have the prefix stripped again.
#[derive(Debug, Clone)]
pub struct BasePathFs {
    inner: Arc<dyn Storage>,
    prefix: PathBuf,
}

impl BasePathFs {
    /// Restrict `inner` to `prefix`. The prefix must be an existing directory.
    pub fn new(inner: Arc<dyn Storage>, prefix: impl AsRef<Path>) -> Result<Self> {
        let prefix = path::absolutize(&inner.working_dir()?, prefix.as_ref());
        if !inner.is_dir(&prefix) {
            return Err(Error::NotFound { path: prefix });
        }
        Ok(Self { inner, prefix })
    }

    /// The directory of the wrapped adapter that appears as `/`.
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    fn translate(&self, target: &Path) -> PathBuf {
        let cleaned = path::clean(target);
        match cleaned.strip_prefix("/") {
            Ok(rest) if !rest.as_os_str().is_empty() => self.prefix.join(rest),
            _ => self.prefix.clone(),
        }
    }

    fn untranslate(&self, real: &Path) -> Result<PathBuf> {
        let rest = real
            .strip_prefix(&self.prefix)
            .map_err(|_| Error::Filesystem {
                path: real.to_path_buf(),
                message: format!("resolves outside base path {}", self.prefix.display()),
            })?;
        Ok(Path::new("/").join(rest))
    }
}

impl Storage for BasePathFs {
    fn read_file(&self, target: &Path) -> Result<Vec<u8>> {
        self.inner.read_file(&self.translate(target))
    }

    fn write_file(&self, target: &Path, content: &[u8]) -> Result<()> {
        self.inner.write_file(&self.translate(target), content)
    }

    fn mkdir_all(&self, target: &Path) -> Result<()> {
        self.inner.mkdir_all(&self.translate(target))
    }

    fn remove_all(&self, target: &Path) -> Result<()> {
        let real = self.translate(target);
        if real == self.prefix {
            return Err(Error::Filesystem {
                path: target.to_path_buf(),
                message: "refusing to remove the base path itself".to_string(),
            });
        }
        self.inner.remove_all(&real)
    }

    fn read_dir(&self, target: &Path) -> Result<Vec<String>> {
        self.inner.read_dir(&self.translate(target))
    }

    fn exists(&self, target: &Path) -> bool {
        self.inner.exists(&self.translate(target))
    }

    fn is_dir(&self, target: &Path) -> bool {
        self.inner.is_dir(&self.translate(target))
    }

    fn is_read_only(&self) -> bool {
        self.inner.is_read_only()
    }

    fn resolve_links(&self, target: &Path) -> Result<PathBuf> {
        let resolved = self.inner.resolve_links(&self.translate(target))?;
        self.untranslate(&resolved)
    }

    fn walk(&self, root: &Path) -> Result<Vec<WalkEntry>> {
        self.inner
            .walk(&self.translate(root))?
            .into_iter()
            .map(|entry| {
                Ok(WalkEntry {
                    path: self.untranslate(&entry.path)?,
                    is_dir: entry.is_dir,
                })
            })
            .collect()
    }

    fn resolve_dir_and_name(&self, target: &Path) -> Result<ResolvedPath> {
        let resolved = self
            .inner
            .resolve_dir_and_name(&self.translate(target))
            .map_err(|e| match e {
                Error::NotFound { .. } => Error::NotFound {
                    path: target.to_path_buf(),
                },
                other => other,
            })?;
        Ok(ResolvedPath {
            dir: self.untranslate(&resolved.dir)?,
            file: resolved.file,
        })
    }
}
