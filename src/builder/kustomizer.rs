//! Reference overlay builder
//!
//! [`Kustomizer`] builds an overlay directory the way `kustomize build` does
//! for a useful subset of the descriptor:
//!
//! - `resources` and `bases`: YAML files (multi-document, `List` kinds
//!   expanded) and nested overlay directories, accumulated in order.
//! - `replacements` (inline or loaded from a `path`), then `namespace`,
//!   `namePrefix`/`nameSuffix`, `commonLabels`/`labels` (including extra
//!   label `fields`) and `commonAnnotations`.
//! - `buildMetadata: [originAnnotations]`.
//!
//! Each directory level applies its own transforms to its own accumulated
//! resources, so an outer overlay always has the last word.

use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;
use serde_yaml::Value;

use super::replacements::{self, Replacement};
use super::{BuildOptions, Builder, Diagnostics, LoadRestrictions, Resource, ResourceMap};
use crate::defaults::{LOCAL_CONFIG_ANNOTATION, ORIGIN_ANNOTATION};
use crate::descriptor::{self, Descriptor, FieldSpec};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::filesystem::Storage;
use crate::path;

/// Kinds that never receive a namespace.
const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "APIService",
    "CSIDriver",
    "ClusterRole",
    "ClusterRoleBinding",
    "CustomResourceDefinition",
    "IngressClass",
    "MutatingWebhookConfiguration",
    "Namespace",
    "Node",
    "PersistentVolume",
    "PriorityClass",
    "RuntimeClass",
    "StorageClass",
    "ValidatingWebhookConfiguration",
];

/// The built-in [`Builder`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Kustomizer;

impl Kustomizer {
    pub fn new() -> Self {
        Self
    }
}

impl Builder for Kustomizer {
    fn build(
        &self,
        fs: &dyn Storage,
        path: &Path,
        options: &BuildOptions,
        diagnostics: &mut Diagnostics,
    ) -> Result<ResourceMap> {
        let resolved = fs.resolve_dir_and_name(path)?;
        if resolved.file.is_some() {
            return Err(Error::Build {
                message: format!("{} is not a directory", path.display()),
            });
        }

        let mut run = BuildRun {
            fs,
            restrictions: options.load_restrictions,
            root: resolved.dir.clone(),
            stack: Vec::new(),
            diagnostics,
        };
        let mut resources = run.accumulate(&resolved.dir)?;

        let before = resources.len();
        resources.retain(|r| r.document.annotation(LOCAL_CONFIG_ANNOTATION) != Some("true"));
        debug!(
            "built {} resources from {} ({} local-config resources dropped)",
            resources.len(),
            resolved.dir.display(),
            before - resources.len()
        );
        Ok(resources)
    }
}

/// State of one `build` call.
struct BuildRun<'a> {
    fs: &'a dyn Storage,
    restrictions: LoadRestrictions,
    root: PathBuf,
    /// Directories currently being accumulated, for cycle detection.
    stack: Vec<PathBuf>,
    diagnostics: &'a mut Diagnostics,
}

impl BuildRun<'_> {
    fn accumulate(&mut self, dir: &Path) -> Result<ResourceMap> {
        if self.stack.iter().any(|d| d == dir) {
            let chain: Vec<String> = self
                .stack
                .iter()
                .chain(std::iter::once(&dir.to_path_buf()))
                .map(|d| d.display().to_string())
                .collect();
            return Err(Error::Build {
                message: format!("cycle detected: {}", chain.join(" -> ")),
            });
        }

        self.stack.push(dir.to_path_buf());
        let result = self.accumulate_dir(dir);
        self.stack.pop();
        result
    }

    fn accumulate_dir(&mut self, dir: &Path) -> Result<ResourceMap> {
        let loaded = descriptor::load_from_dir(self.fs, dir)?;
        let descriptor = &loaded.descriptor;
        let label = self.relative(&loaded.file_path());

        for warning in descriptor.deprecated_warnings() {
            self.diagnostics.push(format!("{}: {}", label.display(), warning));
        }
        let unsupported = descriptor.unsupported_fields();
        if !unsupported.is_empty() {
            self.diagnostics.push(format!(
                "{}: ignoring unsupported fields: {}",
                label.display(),
                unsupported.join(", ")
            ));
        }

        let mut resources = ResourceMap::new();
        for entry in descriptor.all_resources() {
            let loaded = self.load_entry(dir, entry).map_err(|e| match e {
                Error::LoadRestriction { .. } => e,
                other => Error::Build {
                    message: format!("accumulating resources from '{}': {}", entry, other),
                },
            })?;
            resources.append_all(loaded)?;
        }

        let replacements = self.resolve_replacements(dir, &descriptor.replacements)?;
        replacements::apply(&replacements, &mut resources)?;
        apply_transforms(descriptor, &mut resources);

        if descriptor.requests_origin() {
            for resource in resources.iter_mut() {
                if resource.document.annotation(ORIGIN_ANNOTATION).is_some() {
                    continue;
                }
                if let Some(origin) = &resource.origin {
                    let value = format!("path: {}\n", origin.display());
                    resource.document.set_annotation(ORIGIN_ANNOTATION, &value);
                }
            }
        }

        Ok(resources)
    }

    fn load_entry(&mut self, dir: &Path, entry: &str) -> Result<ResourceMap> {
        if entry.contains("://") || entry.starts_with("github.com/") {
            return Err(Error::Build {
                message: "remote resources are not supported".to_string(),
            });
        }

        let target = path::absolutize(dir, Path::new(entry));
        let resolved = self.fs.resolve_dir_and_name(&target)?;
        match resolved.file {
            None => self.accumulate(&resolved.dir),
            Some(name) => {
                let file = resolved.dir.join(name);
                self.check_restrictions(&file, dir)?;
                self.load_file(&file)
            }
        }
    }

    fn check_restrictions(&self, file: &Path, dir: &Path) -> Result<()> {
        if self.restrictions == LoadRestrictions::RootOnly && !path::is_within(file, dir) {
            return Err(Error::LoadRestriction {
                path: file.to_path_buf(),
                root: dir.to_path_buf(),
            });
        }
        Ok(())
    }

    /// Inline entries as written, `path` entries replaced by the contents of
    /// their file.
    fn resolve_replacements(&mut self, dir: &Path, entries: &[Replacement]) -> Result<Vec<Replacement>> {
        let mut resolved = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(file) = entry.path.as_deref() else {
                resolved.push(entry.clone());
                continue;
            };
            if entry.source.is_some() || !entry.targets.is_empty() {
                return Err(Error::Build {
                    message: format!("replacement {}: cannot specify both path and inline replacement", file),
                });
            }

            let target = path::absolutize(dir, Path::new(file));
            self.check_restrictions(&target, dir)?;
            let bytes = self.fs.read_file(&target).map_err(|e| Error::Build {
                message: format!("loading replacement file '{}': {}", file, e),
            })?;
            let loaded = replacements::parse_file(&String::from_utf8_lossy(&bytes)).map_err(|e| Error::Build {
                message: format!("{}: {}", file, e),
            })?;

            let label = self.relative(&target);
            for (i, replacement) in loaded.iter().enumerate() {
                let unsupported = replacement.unsupported_fields(&format!("[{}]", i));
                if !unsupported.is_empty() {
                    self.diagnostics.push(format!(
                        "{}: ignoring unsupported fields: {}",
                        label.display(),
                        unsupported.join(", ")
                    ));
                }
            }
            resolved.extend(loaded);
        }
        Ok(resolved)
    }

    fn load_file(&self, file: &Path) -> Result<ResourceMap> {
        let bytes = self.fs.read_file(file)?;
        let text = String::from_utf8_lossy(&bytes);
        let origin = self.relative(file);

        let mut resources = ResourceMap::new();
        for document in serde_yaml::Deserializer::from_str(&text) {
            let value = Value::deserialize(document)?;
            for item in expand_lists(value) {
                let document = Document::from_value(item).map_err(|e| Error::Build {
                    message: format!("{}: {}", file.display(), e),
                })?;
                resources.append(Resource::with_origin(document, origin.clone()))?;
            }
        }
        Ok(resources)
    }

    fn relative(&self, target: &Path) -> PathBuf {
        path::relative_to(&self.root, target)
    }
}

/// Flatten `kind: *List` documents into their items and drop empty documents.
fn expand_lists(value: Value) -> Vec<Value> {
    if value.is_null() {
        return Vec::new();
    }
    let is_list = value
        .get("kind")
        .and_then(Value::as_str)
        .is_some_and(|kind| kind.ends_with("List"));
    if !is_list {
        return vec![value];
    }
    match value.get("items").and_then(Value::as_sequence) {
        Some(items) => items.iter().cloned().flat_map(expand_lists).collect(),
        None => Vec::new(),
    }
}

fn apply_transforms(descriptor: &Descriptor, resources: &mut ResourceMap) {
    for resource in resources.iter_mut() {
        let document = &mut resource.document;
        let kind = document.kind().to_string();

        if let Some(namespace) = descriptor.namespace.as_deref() {
            if !CLUSTER_SCOPED_KINDS.contains(&kind.as_str()) {
                document.set_namespace(namespace);
            }
        }

        if kind != "CustomResourceDefinition"
            && (descriptor.name_prefix.is_some() || descriptor.name_suffix.is_some())
        {
            let name = format!(
                "{}{}{}",
                descriptor.name_prefix.as_deref().unwrap_or(""),
                document.name(),
                descriptor.name_suffix.as_deref().unwrap_or("")
            );
            document.set_name(&name);
        }

        for (key, value) in &descriptor.common_labels {
            add_label(document, key, value, true, true);
        }
        for set in &descriptor.labels {
            for (key, value) in &set.pairs {
                add_label(document, key, value, set.include_selectors, set.include_templates);
                for spec in &set.fields {
                    add_label_to_field(document, spec, key, value);
                }
            }
        }

        let has_template = document.get_path("spec.template").is_some();
        for (key, value) in &descriptor.common_annotations {
            document.set_annotation(key, value);
            if has_template {
                set_ignoring_shape(document, &["spec", "template", "metadata", "annotations", key], value);
            }
        }
    }
}

fn add_label(document: &mut Document, key: &str, value: &str, selectors: bool, templates: bool) {
    document.set_label(key, value);

    if selectors {
        if document.kind() == "Service" {
            if document.get_path("spec").is_some() {
                set_ignoring_shape(document, &["spec", "selector", key], value);
            }
        } else if document.get_path("spec.selector.matchLabels").is_some() {
            set_ignoring_shape(document, &["spec", "selector", "matchLabels", key], value);
        }
    }

    if templates && document.get_path("spec.template").is_some() {
        set_ignoring_shape(document, &["spec", "template", "metadata", "labels", key], value);
    }
}

/// Write `key: value` into the map at `spec.path`, when `spec` selects the
/// document and the map exists or may be created.
fn add_label_to_field(document: &mut Document, spec: &FieldSpec, key: &str, value: &str) {
    if !spec.applies_to(document) {
        return;
    }
    let mut segments = spec.segments();
    if segments.is_empty() || (!spec.create && document.get_path(&segments.join(".")).is_none()) {
        return;
    }
    segments.push(key);
    set_ignoring_shape(document, &segments, value);
}

/// Best-effort write for transforms: documents with an unexpected shape at
/// `segments` are left alone.
fn set_ignoring_shape(document: &mut Document, segments: &[&str], value: &str) {
    if let Err(e) = document.set_at(segments, Value::from(value), true) {
        debug!("skipping {} on {}: {}", segments.join("."), document.id(), e);
    }
}
