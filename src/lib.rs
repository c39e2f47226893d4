//! # Overlay Render Library
//!
//! This library renders kustomize-style overlay directories into Kubernetes
//! manifests. It is used by the `overlay-render` command-line tool but is
//! designed to be embedded: every collaborator (storage, builder, cache,
//! warning handling) is pluggable through [`RendererOptions`].
//!
//! ## Quick Example
//!
//! ```
//! use std::sync::Arc;
//! use overlay_render::filesystem::MemoryFs;
//! use overlay_render::{RenderContext, Renderer, RendererOptions, Source};
//!
//! let storage = MemoryFs::from_files([
//!     ("/app/kustomization.yaml", "resources: [cm.yaml]\nnamePrefix: prod-\n"),
//!     ("/app/cm.yaml", "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: settings\n"),
//! ])
//! .unwrap();
//!
//! let renderer = Renderer::single(
//!     Source::new("/app"),
//!     RendererOptions::new().with_storage(Arc::new(storage)),
//! )
//! .unwrap();
//!
//! let documents = renderer.process(&RenderContext::new()).unwrap();
//! assert_eq!(documents.len(), 1);
//! assert_eq!(documents[0].name(), "prod-settings");
//! ```
//!
//! ## Core Concepts
//!
//! - **Storage (`filesystem`)**: A small filesystem abstraction with on-disk,
//!   in-memory, read-only, base-path and copy-on-write overlay backends.
//! - **Sources (`source`)**: An overlay directory plus the values injected into
//!   it through a generated `values.yaml` ConfigMap.
//! - **Builder (`builder`, `descriptor`)**: Reads `kustomization.yaml`
//!   descriptors, accumulates resources and applies the built-in transforms.
//! - **Rendering (`render`)**: Orchestrates one render per source, with
//!   optional caching (`cache`), warning policies (`warnings`), provenance
//!   annotations, filters and transformers.
//! - **Configuration (`config`)**: The YAML file read by the binary.
//!
//! ## Execution Flow
//!
//! For every source, in order:
//!
//! 1.  **Cache lookup**: Serve a live cached copy if caching is enabled.
//! 2.  **Descriptor**: Load the overlay's descriptor and report deprecations.
//! 3.  **Injection**: Layer the values manifest (and origin tracking) over the
//!     storage without touching the source tree.
//! 4.  **Build**: Run the builder, then every build plugin.
//! 5.  **Provenance**: Attach or strip source annotations.
//! 6.  **Post-processing**: Apply filters and transformers to the combined
//!     output.

pub mod builder;
pub mod cache;
pub mod config;
pub mod defaults;
pub mod descriptor;
pub mod document;
pub mod error;
pub mod filesystem;
pub mod options;
pub mod path;
pub mod render;
pub mod source;
pub mod values;
pub mod warnings;

#[cfg(test)]
mod path_proptest;

pub use document::Document;
pub use error::{Error, Result};
pub use options::RendererOptions;
pub use render::{CancellationToken, RenderContext, Renderer};
pub use source::Source;
