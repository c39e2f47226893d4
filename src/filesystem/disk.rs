//! Host filesystem backend

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{Storage, WalkEntry};
use crate::error::{Error, Result};
use crate::path;

/// Storage backed by the host filesystem.
///
/// Paths are used as given, so relative paths resolve against the process
/// working directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskFs;

impl DiskFs {
    pub fn new() -> Self {
        Self
    }
}

impl Storage for DiskFs {
    fn read_file(&self, file_path: &Path) -> Result<Vec<u8>> {
        fs::read(file_path).map_err(|e| Error::from_io(file_path, e))
    }

    fn write_file(&self, file_path: &Path, content: &[u8]) -> Result<()> {
        if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::from_io(parent, e))?;
        }
        fs::write(file_path, content).map_err(|e| Error::from_io(file_path, e))
    }

    fn mkdir_all(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| Error::from_io(dir, e))
    }

    fn remove_all(&self, target: &Path) -> Result<()> {
        let metadata = match fs::symlink_metadata(target) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::from_io(target, e)),
        };

        let removed = if metadata.is_dir() {
            fs::remove_dir_all(target)
        } else {
            fs::remove_file(target)
        };
        removed.map_err(|e| Error::from_io(target, e))
    }

    fn read_dir(&self, dir: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| Error::from_io(dir, e))? {
            let entry = entry.map_err(|e| Error::from_io(dir, e))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn exists(&self, target: &Path) -> bool {
        target.exists()
    }

    fn is_dir(&self, target: &Path) -> bool {
        target.is_dir()
    }

    fn working_dir(&self) -> Result<PathBuf> {
        std::env::current_dir().map_err(|e| Error::from_io(".", e))
    }

    fn resolve_links(&self, target: &Path) -> Result<PathBuf> {
        let resolved = fs::canonicalize(target).map_err(|e| Error::from_io(target, e))?;
        Ok(path::clean(&resolved))
    }

    fn walk(&self, root: &Path) -> Result<Vec<WalkEntry>> {
        let root = path::absolutize(&self.working_dir()?, root);
        if !root.exists() {
            return Err(Error::NotFound { path: root });
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let entry_path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                match e.into_io_error() {
                    Some(io) => Error::from_io(entry_path, io),
                    None => Error::Filesystem {
                        path: entry_path,
                        message: "filesystem loop detected".to_string(),
                    },
                }
            })?;
            entries.push(WalkEntry {
                path: entry.path().to_path_buf(),
                is_dir: entry.file_type().is_dir(),
            });
        }
        Ok(entries)
    }
}
