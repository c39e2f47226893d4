//! Read-only storage wrapper

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{ResolvedPath, Storage, WalkEntry};
use crate::error::{Error, Result};
use crate::path;

/// Wraps a storage adapter and fails every mutating call with
/// [`Error::ReadOnly`]. Reads are delegated unchanged.
#[derive(Debug, Clone)]
pub struct ReadOnlyFs {
    inner: Arc<dyn Storage>,
}

impl ReadOnlyFs {
    pub fn new(inner: Arc<dyn Storage>) -> Self {
        Self { inner }
    }

    fn reject(&self, operation: &'static str, target: &Path) -> Error {
        let absolute = self
            .inner
            .working_dir()
            .map(|cwd| path::absolutize(&cwd, target))
            .unwrap_or_else(|_| target.to_path_buf());
        Error::ReadOnly {
            operation,
            path: absolute,
        }
    }
}

impl Storage for ReadOnlyFs {
    fn read_file(&self, target: &Path) -> Result<Vec<u8>> {
        self.inner.read_file(target)
    }

    fn write_file(&self, target: &Path, _content: &[u8]) -> Result<()> {
        Err(self.reject("writefile", target))
    }

    fn mkdir_all(&self, target: &Path) -> Result<()> {
        Err(self.reject("mkdirall", target))
    }

    fn remove_all(&self, target: &Path) -> Result<()> {
        Err(self.reject("removeall", target))
    }

    fn create(&self, target: &Path) -> Result<()> {
        Err(self.reject("create", target))
    }

    fn read_dir(&self, target: &Path) -> Result<Vec<String>> {
        self.inner.read_dir(target)
    }

    fn exists(&self, target: &Path) -> bool {
        self.inner.exists(target)
    }

    fn is_dir(&self, target: &Path) -> bool {
        self.inner.is_dir(target)
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn working_dir(&self) -> Result<PathBuf> {
        self.inner.working_dir()
    }

    fn resolve_links(&self, target: &Path) -> Result<PathBuf> {
        self.inner.resolve_links(target)
    }

    fn open(&self, target: &Path) -> Result<Box<dyn Read + Send>> {
        self.inner.open(target)
    }

    fn walk(&self, root: &Path) -> Result<Vec<WalkEntry>> {
        self.inner.walk(root)
    }

    fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        self.inner.glob(pattern)
    }

    fn resolve_dir_and_name(&self, target: &Path) -> Result<ResolvedPath> {
        self.inner.resolve_dir_and_name(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::MemoryFs;

    fn wrapped() -> (MemoryFs, ReadOnlyFs) {
        let base = MemoryFs::from_files([("/readonly.txt", "readonly content")]).unwrap();
        let read_only = ReadOnlyFs::new(Arc::new(base.clone()));
        (base, read_only)
    }

    #[test]
    fn test_reads_are_delegated() {
        let (_, fs) = wrapped();
        assert_eq!(fs.read_file(Path::new("/readonly.txt")).unwrap(), b"readonly content");
        assert!(fs.exists(Path::new("/readonly.txt")));
        assert_eq!(fs.read_dir(Path::new("/")).unwrap(), vec!["readonly.txt"]);
    }

    #[test]
    fn test_every_mutation_is_rejected() {
        let (base, fs) = wrapped();
        let before = base.snapshot();

        let errors = [
            fs.write_file(Path::new("/newfile.txt"), b"should fail").unwrap_err(),
            fs.create(Path::new("/created.txt")).unwrap_err(),
            fs.mkdir_all(Path::new("/newdir")).unwrap_err(),
            fs.remove_all(Path::new("/readonly.txt")).unwrap_err(),
        ];
        for err in &errors {
            assert!(err.is_read_only(), "expected read-only error, got {err}");
        }

        assert_eq!(base.snapshot(), before);
        assert!(fs.is_read_only());
    }

    #[test]
    fn test_error_names_operation_and_path() {
        let (_, fs) = wrapped();
        let err = fs.write_file(Path::new("relative.txt"), b"x").unwrap_err();
        match err {
            Error::ReadOnly { operation, path } => {
                assert_eq!(operation, "writefile");
                assert_eq!(path, PathBuf::from("/relative.txt"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
