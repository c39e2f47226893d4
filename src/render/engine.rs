//! Single-source render orchestration
//!
//! [`Engine::run`] renders one [`Source`]:
//!
//! 1. Resolve the effective load restrictions.
//! 2. Load the root descriptor through the unmodified storage and hand its
//!    deprecation warnings to the warning handler.
//! 3. When origin tracking must be added or values are present, compose an
//!    [`OverlayFs`] holding the rewritten descriptor and the values manifest.
//!    Otherwise build straight from the original storage.
//! 4. Build, run plugins, and convert the result into documents, stripping
//!    the origin annotation added in step 3 and attaching source annotations.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;

use crate::builder::{BuildOptions, BuildPlugin, Builder, Diagnostics, LoadRestrictions, ResourceMap};
use crate::defaults::{
    ANNOTATION_SOURCE_FILE, ANNOTATION_SOURCE_PATH, ANNOTATION_SOURCE_TYPE, ORIGIN_ANNOTATION,
    RENDERER_TYPE, VALUES_FILE_NAME,
};
use crate::descriptor::{self, LoadedDescriptor};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::filesystem::{OverlayFs, OverlayOptions, Storage};
use crate::options::RendererOptions;
use crate::source::Source;
use crate::values;
use crate::warnings::WarningHandler;

/// Renders one source at a time. Holds no per-render state.
#[derive(Clone)]
pub struct Engine {
    storage: Arc<dyn Storage>,
    builder: Arc<dyn Builder>,
    plugins: Vec<Arc<dyn BuildPlugin>>,
    warning_handler: WarningHandler,
    source_annotations: bool,
    default_restrictions: LoadRestrictions,
}

/// The storage a build runs against.
struct Prepared {
    fs: Arc<dyn Storage>,
    /// Origin tracking was switched on by the engine, not the overlay author.
    added_origin: bool,
}

impl Engine {
    pub fn new(options: &RendererOptions) -> Self {
        Self {
            storage: options.storage_or_default(),
            builder: options.builder_or_default(),
            plugins: options.plugins.clone(),
            warning_handler: options.warning_handler_or_default(),
            source_annotations: options.source_annotations,
            default_restrictions: options.effective_load_restrictions(),
        }
    }

    /// Render `source` with `values`, which replace the source's own values.
    pub fn run(&self, source: &Source, values: &BTreeMap<String, String>) -> Result<Vec<Document>> {
        let restrictions = source.load_restrictions.or(self.default_restrictions);

        let loaded = descriptor::load(self.storage.as_ref(), &source.path)?;

        let warnings = loaded.descriptor.deprecated_warnings();
        if !warnings.is_empty() {
            (self.warning_handler)(&warnings)?;
        }

        let prepared = self.prepare(&loaded, values)?;

        let mut diagnostics = Diagnostics::new();
        let options = BuildOptions {
            load_restrictions: restrictions,
        };
        let mut resources = self
            .builder
            .build(prepared.fs.as_ref(), &source.path, &options, &mut diagnostics)
            .map_err(|e| Error::BuildFailed {
                path: source.path.clone(),
                source: Box::new(e),
            })?;
        for message in diagnostics.messages() {
            debug!("builder: {}", message);
        }

        for plugin in &self.plugins {
            plugin
                .transform(&mut resources)
                .map_err(|e| Error::PluginFailed {
                    path: source.path.clone(),
                    plugin: plugin.name().to_string(),
                    source: Box::new(e),
                })?;
        }

        Ok(self.finish(resources, source, prepared.added_origin))
    }

    fn prepare(&self, loaded: &LoadedDescriptor, values: &BTreeMap<String, String>) -> Result<Prepared> {
        let add_origin = self.source_annotations && !loaded.descriptor.requests_origin();
        if !add_origin && values.is_empty() {
            return Ok(Prepared {
                fs: Arc::clone(&self.storage),
                added_origin: false,
            });
        }

        let mut overlay = OverlayOptions::new();
        if add_origin {
            let rewritten = loaded.with_origin_tracking()?;
            overlay = overlay.with_override(loaded.file_path(), rewritten.into_bytes());
        }
        if !values.is_empty() {
            let manifest = values::manifest(values)?;
            overlay = overlay.with_override(loaded.dir.join(VALUES_FILE_NAME), manifest.into_bytes());
        }

        let fs = OverlayFs::compose(Arc::clone(&self.storage), overlay)?;
        debug!(
            "rendering {} through an overlay (origin tracking added: {}, values: {})",
            loaded.dir.display(),
            add_origin,
            values.len()
        );
        Ok(Prepared {
            fs: Arc::new(fs),
            added_origin: add_origin,
        })
    }

    fn finish(&self, resources: ResourceMap, source: &Source, added_origin: bool) -> Vec<Document> {
        let source_path = source.path.to_string_lossy();
        resources
            .into_iter()
            .map(|resource| {
                let mut document = resource.document;
                if added_origin {
                    document.remove_annotation(ORIGIN_ANNOTATION);
                }
                if self.source_annotations {
                    document.set_annotation(ANNOTATION_SOURCE_TYPE, RENDERER_TYPE);
                    document.set_annotation(ANNOTATION_SOURCE_PATH, &source_path);
                    if let Some(origin) = &resource.origin {
                        document.set_annotation(ANNOTATION_SOURCE_FILE, &origin.to_string_lossy());
                    }
                }
                document
            })
            .collect()
    }
}
