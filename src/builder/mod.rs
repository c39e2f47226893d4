//! # Builders
//!
//! A [`Builder`] turns an overlay directory into an ordered [`ResourceMap`].
//! The render orchestration only ever talks to this trait; the crate ships
//! [`Kustomizer`] as the reference implementation.
//!
//! ## Key Components
//!
//! - **[`Builder`]**: `build(fs, path, options, diagnostics)`. Everything the
//!   builder reads goes through the supplied [`Storage`], so an overlay
//!   filesystem is all it takes to inject generated files.
//! - **[`LoadRestrictions`]**: whether file resources must stay below the
//!   descriptor that references them.
//! - **[`Diagnostics`]**: a per-call sink for builder warnings and notes. It
//!   replaces any process-wide diagnostic stream, so concurrent renders never
//!   interfere with each other.
//! - **[`ResourceMap`]**: the ordered build result, rejecting duplicate ids.
//! - **[`BuildPlugin`]**: a hook that edits the raw build result before it is
//!   converted into documents.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::document::{Document, ResId};
use crate::error::{Error, Result};
use crate::filesystem::Storage;

mod kustomizer;
pub mod replacements;

pub use kustomizer::Kustomizer;

/// Where a builder may load file resources from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadRestrictions {
    /// File resources must lie inside the directory of their descriptor.
    RootOnly,
    /// File resources may live anywhere.
    #[serde(rename = "none")]
    Unrestricted,
    /// Defer to the renderer-level setting.
    #[default]
    Unspecified,
}

impl LoadRestrictions {
    /// `self` unless unspecified, else `fallback`.
    pub fn or(self, fallback: LoadRestrictions) -> LoadRestrictions {
        match self {
            LoadRestrictions::Unspecified => fallback,
            other => other,
        }
    }
}

impl fmt::Display for LoadRestrictions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadRestrictions::RootOnly => "root-only",
            LoadRestrictions::Unrestricted => "none",
            LoadRestrictions::Unspecified => "unspecified",
        };
        f.write_str(name)
    }
}

impl FromStr for LoadRestrictions {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "root-only" | "rootonly" | "loadrestrictionsrootonly" => Ok(LoadRestrictions::RootOnly),
            "none" | "loadrestrictionsnone" => Ok(LoadRestrictions::Unrestricted),
            other => Err(Error::Config {
                message: format!(
                    "unknown load restrictions {:?}, expected root-only or none",
                    other
                ),
            }),
        }
    }
}

/// Options for a single build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// Never `Unspecified` by the time a builder sees it.
    pub load_restrictions: LoadRestrictions,
}

/// Per-call collector for builder diagnostics.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    messages: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_messages(self) -> Vec<String> {
        self.messages
    }
}

/// One built resource plus the file it was loaded from.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub document: Document,
    /// Source file relative to the build root, when known.
    pub origin: Option<PathBuf>,
}

impl Resource {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            origin: None,
        }
    }

    pub fn with_origin(document: Document, origin: impl Into<PathBuf>) -> Self {
        Self {
            document,
            origin: Some(origin.into()),
        }
    }

    pub fn id(&self) -> ResId {
        self.document.id()
    }
}

/// Ordered build result. Ids are unique at insertion time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceMap {
    resources: Vec<Resource>,
}

impl ResourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resource, rejecting an id that is already present.
    pub fn append(&mut self, resource: Resource) -> Result<()> {
        let id = resource.id();
        if self.resources.iter().any(|existing| existing.id() == id) {
            return Err(Error::Build {
                message: format!("may not add resource with an already registered id: {}", id),
            });
        }
        self.resources.push(resource);
        Ok(())
    }

    /// Append every resource of `other`, in order.
    pub fn append_all(&mut self, other: ResourceMap) -> Result<()> {
        for resource in other.resources {
            self.append(resource)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Resource> {
        self.resources.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Resource> {
        self.resources.iter_mut()
    }

    pub fn retain(&mut self, keep: impl FnMut(&Resource) -> bool) {
        self.resources.retain(keep);
    }

    pub fn into_resources(self) -> Vec<Resource> {
        self.resources
    }
}

impl IntoIterator for ResourceMap {
    type Item = Resource;
    type IntoIter = std::vec::IntoIter<Resource>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.into_iter()
    }
}

/// Hook that edits a raw build result.
pub trait BuildPlugin: Send + Sync {
    /// Name used in error messages.
    fn name(&self) -> &str;

    fn transform(&self, resources: &mut ResourceMap) -> Result<()>;
}

/// Turns an overlay directory into resources.
pub trait Builder: Send + Sync {
    /// Build the overlay rooted at `path`. Every read goes through `fs`.
    fn build(
        &self,
        fs: &dyn Storage,
        path: &Path,
        options: &BuildOptions,
        diagnostics: &mut Diagnostics,
    ) -> Result<ResourceMap>;
}
