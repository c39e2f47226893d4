//! Default values and well-known names for overlay-render.
//!
//! This module provides centralized constants used across the renderer, the
//! builder and the CLI, ensuring consistency and avoiding duplication.

use std::time::Duration;

/// Renderer type reported by [`crate::render::Renderer::name`] and written to
/// the source type annotation.
pub const RENDERER_TYPE: &str = "kustomize";

/// Lifetime of a cache entry when the caller does not pick one.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Descriptor file names recognized in an overlay directory, in lookup order.
pub const DESCRIPTOR_FILE_NAMES: [&str; 3] =
    ["kustomization.yaml", "kustomization.yml", "Kustomization"];

/// File name of the generated values manifest inside the overlay root.
pub const VALUES_FILE_NAME: &str = "values.yaml";

/// Name of the generated values manifest object.
pub const VALUES_OBJECT_NAME: &str = "values";

/// Annotation carrying the renderer type.
pub const ANNOTATION_SOURCE_TYPE: &str = "manifests.k8s-manifests-lib/source.type";

/// Annotation carrying the render path the document came from.
pub const ANNOTATION_SOURCE_PATH: &str = "manifests.k8s-manifests-lib/source.path";

/// Annotation carrying the file, relative to the render path, the document came from.
pub const ANNOTATION_SOURCE_FILE: &str = "manifests.k8s-manifests-lib/source.file";

/// Provenance annotation written by the builder when origin tracking is requested.
pub const ORIGIN_ANNOTATION: &str = "config.kubernetes.io/origin";

/// Resources carrying this annotation with value `"true"` are build inputs only.
pub const LOCAL_CONFIG_ANNOTATION: &str = "config.kubernetes.io/local-config";

/// `buildMetadata` entry that asks the builder to record origins.
pub const ORIGIN_ANNOTATIONS_OPTION: &str = "originAnnotations";
