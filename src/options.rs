//! # Renderer Options
//!
//! [`RendererOptions`] is the complete, explicit configuration of a
//! [`Renderer`](crate::render::Renderer). It is assembled with the `with_*`
//! methods, validated once when the renderer is constructed, and immutable
//! afterwards.
//!
//! Unset collaborators fall back to defaults at construction time: on-disk
//! storage, the [`Kustomizer`] builder, and the logging warning handler.

use std::fmt;
use std::sync::Arc;

use crate::builder::{BuildPlugin, Builder, Kustomizer, LoadRestrictions};
use crate::cache::CacheOptions;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::filesystem::{self, Storage};
use crate::warnings::{self, WarningHandler};

/// Keeps a document when it returns `Ok(true)`.
pub type Filter = Arc<dyn Fn(&Document) -> Result<bool> + Send + Sync>;

/// Rewrites a document.
pub type Transformer = Arc<dyn Fn(Document) -> Result<Document> + Send + Sync>;

/// Renderer configuration.
#[derive(Clone, Default)]
pub struct RendererOptions {
    pub filters: Vec<Filter>,
    pub transformers: Vec<Transformer>,
    pub plugins: Vec<Arc<dyn BuildPlugin>>,
    /// Caching is off unless set.
    pub cache: Option<CacheOptions>,
    /// Attach source type, path and file annotations to every document.
    pub source_annotations: bool,
    /// Applies to sources with unspecified restrictions. `Unspecified` here
    /// means root-only.
    pub load_restrictions: LoadRestrictions,
    pub warning_handler: Option<WarningHandler>,
    pub storage: Option<Arc<dyn Storage>>,
    pub builder: Option<Arc<dyn Builder>>,
}

impl RendererOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Document) -> Result<bool> + Send + Sync + 'static,
    {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn with_transformer<F>(mut self, transformer: F) -> Self
    where
        F: Fn(Document) -> Result<Document> + Send + Sync + 'static,
    {
        self.transformers.push(Arc::new(transformer));
        self
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn BuildPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn with_cache(mut self, cache: CacheOptions) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_source_annotations(mut self, enabled: bool) -> Self {
        self.source_annotations = enabled;
        self
    }

    pub fn with_load_restrictions(mut self, restrictions: LoadRestrictions) -> Self {
        self.load_restrictions = restrictions;
        self
    }

    pub fn with_warning_handler(mut self, handler: WarningHandler) -> Self {
        self.warning_handler = Some(handler);
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_builder(mut self, builder: Arc<dyn Builder>) -> Self {
        self.builder = Some(builder);
        self
    }

    /// Check the options for values no render could succeed with.
    pub fn validate(&self) -> Result<()> {
        if let Some(cache) = &self.cache {
            if cache.ttl.is_zero() {
                return Err(Error::Config {
                    message: "cache TTL must be greater than zero".to_string(),
                });
            }
        }
        for plugin in &self.plugins {
            if plugin.name().trim().is_empty() {
                return Err(Error::Config {
                    message: "build plugins must have a name".to_string(),
                });
            }
        }
        Ok(())
    }

    /// The renderer-level restriction with `Unspecified` resolved.
    pub fn effective_load_restrictions(&self) -> LoadRestrictions {
        self.load_restrictions.or(LoadRestrictions::RootOnly)
    }

    pub(crate) fn storage_or_default(&self) -> Arc<dyn Storage> {
        self.storage.clone().unwrap_or_else(filesystem::on_disk)
    }

    pub(crate) fn builder_or_default(&self) -> Arc<dyn Builder> {
        self.builder
            .clone()
            .unwrap_or_else(|| Arc::new(Kustomizer::new()))
    }

    pub(crate) fn warning_handler_or_default(&self) -> WarningHandler {
        self.warning_handler
            .clone()
            .unwrap_or_else(warnings::warning_log)
    }
}

impl fmt::Debug for RendererOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererOptions")
            .field("filters", &self.filters.len())
            .field("transformers", &self.transformers.len())
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.name().to_string()).collect::<Vec<_>>(),
            )
            .field("cache", &self.cache)
            .field("source_annotations", &self.source_annotations)
            .field("load_restrictions", &self.load_restrictions)
            .field("custom_warning_handler", &self.warning_handler.is_some())
            .field("storage", &self.storage)
            .field("custom_builder", &self.builder.is_some())
            .finish()
    }
}
