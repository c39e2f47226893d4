//! # Render Configuration Files
//!
//! This module defines the YAML file the `overlay-render` binary reads with
//! `--config`, and converts it into the sources and [`RendererOptions`] of a
//! [`Renderer`](crate::render::Renderer).
//!
//! ```yaml
//! sources:
//!   - path: overlays/prod
//!     values:
//!       replicas: "3"
//!     loadRestrictions: none
//! sourceAnnotations: true
//! loadRestrictions: root-only
//! warnings: fail
//! cache:
//!   ttlSeconds: 60
//!   key: path-only
//! ```
//!
//! Relative source paths resolve against the directory holding the file.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::builder::LoadRestrictions;
use crate::cache::{self, CacheOptions};
use crate::defaults::DEFAULT_CACHE_TTL;
use crate::error::{Error, Result};
use crate::options::RendererOptions;
use crate::source::Source;
use crate::warnings::{self, WarningHandler};

/// What to do with deprecation warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningPolicy {
    Ignore,
    #[default]
    Log,
    Fail,
}

impl WarningPolicy {
    pub fn handler(self) -> WarningHandler {
        match self {
            WarningPolicy::Ignore => warnings::warning_ignore(),
            WarningPolicy::Log => warnings::warning_log(),
            WarningPolicy::Fail => warnings::warning_fail(),
        }
    }
}

impl fmt::Display for WarningPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WarningPolicy::Ignore => "ignore",
            WarningPolicy::Log => "log",
            WarningPolicy::Fail => "fail",
        };
        f.write_str(name)
    }
}

impl FromStr for WarningPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ignore" => Ok(WarningPolicy::Ignore),
            "log" => Ok(WarningPolicy::Log),
            "fail" => Ok(WarningPolicy::Fail),
            other => Err(Error::Config {
                message: format!("unknown warning policy {:?}, expected ignore, log or fail", other),
            }),
        }
    }
}

/// Which key function the cache uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheKey {
    /// Path and values.
    #[default]
    Default,
    /// Path only.
    PathOnly,
}

/// Cache section of a render file. Present means enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(default)]
    pub key: CacheKey,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            key: CacheKey::default(),
        }
    }
}

impl CacheConfig {
    pub fn to_options(&self) -> CacheOptions {
        let options = CacheOptions::new().with_ttl(Duration::from_secs(self.ttl_seconds));
        match self.key {
            CacheKey::Default => options,
            CacheKey::PathOnly => options.with_key_fn(cache::path_only_key),
        }
    }
}

pub fn default_ttl_seconds() -> u64 {
    DEFAULT_CACHE_TTL.as_secs()
}

/// A parsed render file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RenderConfig {
    pub sources: Vec<Source>,
    #[serde(default)]
    pub source_annotations: bool,
    #[serde(default)]
    pub load_restrictions: LoadRestrictions,
    #[serde(default)]
    pub warnings: WarningPolicy,
    #[serde(default)]
    pub cache: Option<CacheConfig>,
}

impl RenderConfig {
    /// Split into renderer inputs. Relative source paths are joined to `base_dir`.
    pub fn into_parts(self, base_dir: &Path) -> (Vec<Source>, RendererOptions) {
        let sources = self
            .sources
            .into_iter()
            .map(|source| source.relative_to(base_dir))
            .collect();

        let mut options = RendererOptions::new()
            .with_source_annotations(self.source_annotations)
            .with_load_restrictions(self.load_restrictions)
            .with_warning_handler(self.warnings.handler());
        if let Some(cache) = &self.cache {
            options = options.with_cache(cache.to_options());
        }
        (sources, options)
    }
}

/// Parse a render file.
pub fn parse(yaml_content: &str) -> Result<RenderConfig> {
    let config: RenderConfig = serde_yaml::from_str(yaml_content).map_err(|e| {
        let message = e.to_string();
        let hint = hint_for(&message);
        Error::ConfigParse { message, hint }
    })?;

    if config.sources.is_empty() {
        return Err(Error::ConfigParse {
            message: "No sources configured".to_string(),
            hint: Some("Add at least one entry under 'sources:' with a 'path:'".to_string()),
        });
    }
    Ok(config)
}

/// Parse a render file from disk.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<RenderConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| Error::from_io(path, e))?;
    parse(&content)
}

fn hint_for(message: &str) -> Option<String> {
    if message.contains("missing field `path`") {
        Some("Every source needs a 'path:' naming an overlay directory".to_string())
    } else if message.contains("missing field `sources`") {
        Some("Add a top-level 'sources:' list".to_string())
    } else if message.contains("unknown field") {
        Some(
            "Valid top-level fields are sources, sourceAnnotations, loadRestrictions, warnings and cache"
                .to_string(),
        )
    } else if message.contains("unknown variant") {
        Some(
            "loadRestrictions takes root-only or none; warnings takes ignore, log or fail; cache.key takes default or path-only"
                .to_string(),
        )
    } else {
        None
    }
}
