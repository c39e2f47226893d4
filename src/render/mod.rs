//! # Rendering
//!
//! The [`Renderer`] is the public entry point. It owns an ordered list of
//! [`Source`]s and, per call to [`Renderer::process`]:
//!
//! 1. Walks the sources in order, checking for cancellation before each one.
//! 2. Merges the call's values over the source's own values.
//! 3. Serves the source from the cache when an entry is live, otherwise runs
//!    the [`Engine`] and stores the result.
//! 4. Applies every filter, then every transformer, in registration order.
//!
//! The first failing source aborts the call. A renderer is immutable after
//! construction and can be shared between threads; only the cache is shared
//! state, and it synchronizes itself.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::cache::{Cache, KeyFn};
use crate::defaults::RENDERER_TYPE;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::options::{Filter, RendererOptions, Transformer};
use crate::source::Source;

mod engine;

pub use engine::Engine;

/// Cooperative cancellation flag shared between a caller and a render.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Per-call render input.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    /// Laid over every source's values; these win per key.
    pub values: BTreeMap<String, String>,
    pub cancellation: CancellationToken,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn with_values(mut self, values: BTreeMap<String, String>) -> Self {
        self.values.extend(values);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

struct CacheState {
    cache: Arc<dyn Cache>,
    key_fn: KeyFn,
    ttl: Duration,
}

/// Renders overlay sources into documents.
pub struct Renderer {
    sources: Vec<Source>,
    engine: Engine,
    filters: Vec<Filter>,
    transformers: Vec<Transformer>,
    cache: Option<CacheState>,
}

impl Renderer {
    /// Validate `sources` and `options` and build a renderer. Nothing is read
    /// from storage here.
    pub fn new(sources: Vec<Source>, options: RendererOptions) -> Result<Self> {
        for (index, source) in sources.iter().enumerate() {
            source.validate().map_err(|e| match e {
                Error::InvalidSource { message } => Error::InvalidSource {
                    message: format!("source {}: {}", index, message),
                },
                other => other,
            })?;
        }
        options.validate()?;

        let cache = options.cache.as_ref().map(|cache_options| CacheState {
            cache: cache_options.build(),
            key_fn: Arc::clone(&cache_options.key_fn),
            ttl: cache_options.ttl,
        });

        Ok(Self {
            engine: Engine::new(&options),
            filters: options.filters,
            transformers: options.transformers,
            sources,
            cache,
        })
    }

    /// A renderer for exactly one source.
    pub fn single(source: Source, options: RendererOptions) -> Result<Self> {
        Self::new(vec![source], options)
    }

    /// The renderer type, also written to the source type annotation.
    pub fn name(&self) -> &'static str {
        RENDERER_TYPE
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Render every source and post-process the combined result.
    pub fn process(&self, ctx: &RenderContext) -> Result<Vec<Document>> {
        let mut rendered = Vec::new();

        for source in &self.sources {
            if ctx.cancellation.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let values = source.merged_values(&ctx.values);
            let key = self.cache_key(source, &ctx.values);

            if let (Some(state), Some(key)) = (&self.cache, &key) {
                if let Some(hit) = state.cache.get(key) {
                    debug!("render cache hit for {}", source.path.display());
                    rendered.extend(hit);
                    continue;
                }
                debug!("render cache miss for {}", source.path.display());
            }

            let documents = self.engine.run(source, &values)?;

            if let (Some(state), Some(key)) = (&self.cache, &key) {
                state.cache.set(key, &documents, state.ttl);
            }
            rendered.extend(documents);
        }

        let filtered = self.apply_filters(rendered)?;
        self.apply_transformers(filtered)
    }

    fn cache_key(&self, source: &Source, extra: &BTreeMap<String, String>) -> Option<String> {
        let state = self.cache.as_ref()?;
        match (state.key_fn)(&source.cache_spec(extra)) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(
                    "unable to compute cache key for {}, rendering uncached: {}",
                    source.path.display(),
                    e
                );
                None
            }
        }
    }

    fn apply_filters(&self, documents: Vec<Document>) -> Result<Vec<Document>> {
        let mut kept = Vec::with_capacity(documents.len());
        'documents: for document in documents {
            for filter in &self.filters {
                let keep = filter(&document).map_err(|e| Error::Pipeline {
                    stage: "filter",
                    message: format!("{} {}: {}", document.kind(), document.name(), e),
                })?;
                if !keep {
                    continue 'documents;
                }
            }
            kept.push(document);
        }
        Ok(kept)
    }

    fn apply_transformers(&self, documents: Vec<Document>) -> Result<Vec<Document>> {
        documents
            .into_iter()
            .map(|document| {
                self.transformers.iter().try_fold(document, |document, transformer| {
                    let label = format!("{} {}", document.kind(), document.name());
                    transformer(document).map_err(|e| Error::Pipeline {
                        stage: "transformer",
                        message: format!("{}: {}", label, e),
                    })
                })
            })
            .collect()
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("sources", &self.sources)
            .field("filters", &self.filters.len())
            .field("transformers", &self.transformers.len())
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{path_only_key, CacheOptions};
    use crate::filesystem::MemoryFs;

    fn storage() -> Arc<MemoryFs> {
        Arc::new(
            MemoryFs::from_files([
                ("/a/kustomization.yaml", "resources: [cm.yaml]\n"),
                ("/a/cm.yaml", "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n"),
                ("/b/kustomization.yaml", "resources: [svc.yaml]\n"),
                ("/b/svc.yaml", "apiVersion: v1\nkind: Service\nmetadata:\n  name: b\n"),
            ])
            .unwrap(),
        )
    }

    fn renderer(options: RendererOptions) -> Renderer {
        Renderer::new(
            vec![Source::new("/a"), Source::new("/b")],
            options.with_storage(storage()),
        )
        .unwrap()
    }

    fn kinds(documents: &[Document]) -> Vec<&str> {
        documents.iter().map(Document::kind).collect()
    }

    #[test]
    fn test_renderer_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Renderer>();
    }

    #[test]
    fn test_sources_render_in_order() {
        let documents = renderer(RendererOptions::new())
            .process(&RenderContext::new())
            .unwrap();
        assert_eq!(kinds(&documents), vec!["ConfigMap", "Service"]);
    }

    #[test]
    fn test_new_rejects_invalid_source() {
        let err = Renderer::new(vec![Source::new("/a"), Source::new("")], RendererOptions::new())
            .unwrap_err();
        assert!(err.to_string().contains("source 1"));
    }

    #[test]
    fn test_single_and_name() {
        let renderer = Renderer::single(Source::new("/a"), RendererOptions::new()).unwrap();
        assert_eq!(renderer.name(), "kustomize");
        assert_eq!(renderer.sources().len(), 1);
    }

    #[test]
    fn test_filters_then_transformers() {
        let options = RendererOptions::new()
            .with_transformer(|mut d| {
                d.set_annotation("seen", "yes");
                Ok(d)
            })
            .with_filter(|d| Ok(d.kind() == "Service"));
        let documents = renderer(options).process(&RenderContext::new()).unwrap();
        assert_eq!(kinds(&documents), vec!["Service"]);
        assert_eq!(documents[0].annotation("seen"), Some("yes"));
    }

    #[test]
    fn test_filter_errors_abort() {
        let options = RendererOptions::new().with_filter(|_| {
            Err(Error::Build {
                message: "boom".to_string(),
            })
        });
        let err = renderer(options).process(&RenderContext::new()).unwrap_err();
        assert!(matches!(err, Error::Pipeline { stage: "filter", .. }));
    }

    #[test]
    fn test_cancelled_before_first_source() {
        let token = CancellationToken::new();
        token.cancel();
        let err = renderer(RendererOptions::new())
            .process(&RenderContext::new().with_cancellation(token))
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_failing_source_aborts_call() {
        let renderer = Renderer::new(
            vec![Source::new("/a"), Source::new("/missing")],
            RendererOptions::new().with_storage(storage()),
        )
        .unwrap();
        let err = renderer.process(&RenderContext::new()).unwrap_err();
        assert!(matches!(err, Error::DescriptorLoad { .. }));
    }

    #[test]
    fn test_cache_serves_copies() {
        let renderer = renderer(RendererOptions::new().with_cache(CacheOptions::new()));
        let mut first = renderer.process(&RenderContext::new()).unwrap();
        first[0].set_annotation("mutated", "true");
        let second = renderer.process(&RenderContext::new()).unwrap();
        assert_eq!(second[0].annotation("mutated"), None);
        assert_eq!(kinds(&second), vec!["ConfigMap", "Service"]);
    }

    #[test]
    fn test_failing_key_fn_renders_uncached() {
        let options = CacheOptions::new().with_key_fn(|_| {
            Err(Error::Build {
                message: "no key".to_string(),
            })
        });
        let documents = renderer(RendererOptions::new().with_cache(options))
            .process(&RenderContext::new())
            .unwrap();
        assert_eq!(documents.len(), 2);
    }

    #[test]
    fn test_path_only_key_shares_entries() {
        use crate::builder::{BuildOptions, Builder, Diagnostics, Kustomizer, ResourceMap};
        use crate::filesystem::Storage;
        use std::path::Path;
        use std::sync::atomic::AtomicUsize;

        #[derive(Default)]
        struct Counting(AtomicUsize);

        impl Builder for Counting {
            fn build(
                &self,
                fs: &dyn Storage,
                path: &Path,
                options: &BuildOptions,
                diagnostics: &mut Diagnostics,
            ) -> Result<ResourceMap> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Kustomizer::new().build(fs, path, options, diagnostics)
            }
        }

        let counting = Arc::new(Counting::default());
        let options = RendererOptions::new()
            .with_builder(counting.clone())
            .with_cache(CacheOptions::new().with_key_fn(path_only_key));
        let renderer = renderer(options);

        renderer.process(&RenderContext::new()).unwrap();
        renderer
            .process(&RenderContext::new().with_value("replicas", "3"))
            .unwrap();
        assert_eq!(counting.0.load(Ordering::SeqCst), 2, "one build per source");
    }
}
