//! Render sources
//!
//! A [`Source`] names one overlay directory together with the values injected
//! into it. It is the unit of work of a renderer and the input of its cache
//! key.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::builder::LoadRestrictions;
use crate::cache::CacheSpec;
use crate::error::{Error, Result};
use crate::values;

/// One overlay to render.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    /// Overlay directory. Relative paths resolve against the storage
    /// adapter's working directory.
    pub path: PathBuf,
    /// Values published to the overlay through the generated values manifest.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, String>,
    /// `Unspecified` defers to the renderer default.
    #[serde(default)]
    pub load_restrictions: LoadRestrictions,
}

impl Source {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn with_values<K, V, I>(mut self, values: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.values
            .extend(values.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_load_restrictions(mut self, restrictions: LoadRestrictions) -> Self {
        self.load_restrictions = restrictions;
        self
    }

    /// Reject sources that can never render.
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(Error::InvalidSource {
                message: "path must not be empty".to_string(),
            });
        }
        values::validate_keys(self.values.keys())
    }

    /// The cache key input for this source with `extra` values laid over its own.
    pub fn cache_spec(&self, extra: &BTreeMap<String, String>) -> CacheSpec {
        CacheSpec::new(self.path.to_string_lossy(), self.merged_values(extra))
    }

    /// Own values with `extra` taking precedence per key.
    pub fn merged_values(&self, extra: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut merged = self.values.clone();
        merged.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    /// Resolve a relative path against `base`.
    pub fn relative_to(mut self, base: &Path) -> Self {
        if self.path.is_relative() {
            self.path = base.join(&self.path);
        }
        self
    }
}
