//! Copy-on-write composition of two storage adapters
//!
//! An [`OverlayFs`] layers a writable overlay over a base adapter:
//!
//! - **Reads** (`read_file`, `open`, `exists`, `is_dir`) consult the overlay
//!   first and fall back to the base only when the overlay has nothing at that
//!   path.
//! - **Listings** (`read_dir`, `glob`, `walk`) present the union of both
//!   layers, overlay entries shadowing base entries of the same name.
//! - **Writes** go to the overlay only. The base is never handed a mutating
//!   call, so callers can keep treating it as borrowed and read-only.
//!
//! Removing a path that exists in the base is rejected with
//! [`Error::ReadOnly`]: the overlay cannot hide base content.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;

use super::{MemoryFs, ResolvedPath, Storage};
use crate::error::{Error, Result};
use crate::path;

/// Construction options for [`OverlayFs::compose`].
#[derive(Debug, Default, Clone)]
pub struct OverlayOptions {
    overrides: BTreeMap<PathBuf, Vec<u8>>,
    overlay: Option<Arc<dyn Storage>>,
}

impl OverlayOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a virtual file shadowing any base file at the same path.
    pub fn with_override(mut self, file_path: impl Into<PathBuf>, content: Vec<u8>) -> Self {
        self.overrides.insert(file_path.into(), content);
        self
    }

    /// Add several virtual files at once.
    pub fn with_overrides<P, I>(mut self, overrides: I) -> Self
    where
        P: Into<PathBuf>,
        I: IntoIterator<Item = (P, Vec<u8>)>,
    {
        self.overrides
            .extend(overrides.into_iter().map(|(p, content)| (p.into(), content)));
        self
    }

    /// Use an existing adapter as the overlay layer. Takes precedence over
    /// any overrides, which are then ignored.
    pub fn with_overlay_fs(mut self, overlay: Arc<dyn Storage>) -> Self {
        self.overlay = Some(overlay);
        self
    }
}

/// A base adapter shadowed by an overlay adapter.
#[derive(Debug, Clone)]
pub struct OverlayFs {
    base: Arc<dyn Storage>,
    overlay: Arc<dyn Storage>,
    cwd: PathBuf,
}

impl OverlayFs {
    /// Compose `base` with the overlay described by `options`.
    ///
    /// Without an explicit overlay adapter a fresh in-memory one is created and
    /// the overrides are written into it. Fails when an override cannot be
    /// written, or when the overlay adapter is read-only.
    pub fn compose(base: Arc<dyn Storage>, options: OverlayOptions) -> Result<Self> {
        let cwd = base.working_dir()?;

        let overlay = match options.overlay {
            Some(overlay) => overlay,
            None => {
                let overlay: Arc<dyn Storage> = Arc::new(MemoryFs::new());
                for (file_path, content) in &options.overrides {
                    let target = path::absolutize(&cwd, file_path);
                    overlay
                        .write_file(&target, content)
                        .map_err(|e| Error::OverlayWrite {
                            path: file_path.clone(),
                            source: Box::new(e),
                        })?;
                }
                overlay
            }
        };

        if overlay.is_read_only() {
            return Err(Error::Overlay {
                message: "overlay filesystem must accept writes".to_string(),
            });
        }

        debug!(
            "composed overlay filesystem over {} ({} override(s))",
            cwd.display(),
            options.overrides.len()
        );
        Ok(Self { base, overlay, cwd })
    }

    /// The base layer.
    pub fn base(&self) -> &Arc<dyn Storage> {
        &self.base
    }

    /// The overlay layer.
    pub fn overlay(&self) -> &Arc<dyn Storage> {
        &self.overlay
    }

    fn locate(&self, target: &Path) -> PathBuf {
        path::absolutize(&self.cwd, target)
    }
}

impl Storage for OverlayFs {
    fn read_file(&self, target: &Path) -> Result<Vec<u8>> {
        let target = self.locate(target);
        if self.overlay.exists(&target) {
            return self.overlay.read_file(&target);
        }
        self.base.read_file(&target)
    }

    fn write_file(&self, target: &Path, content: &[u8]) -> Result<()> {
        self.overlay.write_file(&self.locate(target), content)
    }

    fn mkdir_all(&self, target: &Path) -> Result<()> {
        self.overlay.mkdir_all(&self.locate(target))
    }

    fn remove_all(&self, target: &Path) -> Result<()> {
        let target = self.locate(target);
        if self.base.exists(&target) {
            return Err(Error::ReadOnly {
                operation: "removeall",
                path: target,
            });
        }
        self.overlay.remove_all(&target)
    }

    fn read_dir(&self, target: &Path) -> Result<Vec<String>> {
        let target = self.locate(target);
        let in_overlay = self.overlay.is_dir(&target);
        let in_base = self.base.is_dir(&target);

        if !in_overlay && !in_base {
            return if self.overlay.exists(&target) {
                self.overlay.read_dir(&target)
            } else {
                self.base.read_dir(&target)
            };
        }

        let mut names = BTreeSet::new();
        if in_overlay {
            names.extend(self.overlay.read_dir(&target)?);
        }
        if in_base {
            names.extend(self.base.read_dir(&target)?);
        }
        Ok(names.into_iter().collect())
    }

    fn exists(&self, target: &Path) -> bool {
        let target = self.locate(target);
        self.overlay.exists(&target) || self.base.exists(&target)
    }

    fn is_dir(&self, target: &Path) -> bool {
        let target = self.locate(target);
        if self.overlay.exists(&target) {
            return self.overlay.is_dir(&target);
        }
        self.base.is_dir(&target)
    }

    fn working_dir(&self) -> Result<PathBuf> {
        Ok(self.cwd.clone())
    }

    fn resolve_links(&self, target: &Path) -> Result<PathBuf> {
        self.base.resolve_links(target)
    }

    fn resolve_dir_and_name(&self, target: &Path) -> Result<ResolvedPath> {
        let absolute = self.locate(target);
        if self.base.exists(&absolute) {
            return self.base.resolve_dir_and_name(&absolute);
        }
        self.overlay.resolve_dir_and_name(&absolute).map_err(|e| match e {
            Error::NotFound { .. } => Error::NotFound {
                path: target.to_path_buf(),
            },
            other => other,
        })
    }
}
