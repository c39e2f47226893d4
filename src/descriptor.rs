//! # Overlay Descriptors
//!
//! The descriptor is the `kustomization.yaml` file at the root of every overlay
//! directory. This module defines its typed form, locates and parses it through
//! a [`Storage`] adapter, and implements the two descriptor-level concerns the
//! render orchestration needs before any build happens:
//!
//! - **Deprecation warnings**: [`Descriptor::deprecated_warnings`] reports
//!   fields that still work but have a modern replacement.
//! - **Origin tracking**: [`Descriptor::requests_origin`] inspects
//!   `buildMetadata`, and [`LoadedDescriptor::with_origin_tracking`] rewrites
//!   it on the descriptor text as written, leaving every other field alone.
//!
//! Fields the reference builder does not implement are collected in the
//! `extra` maps and named by [`Descriptor::unsupported_fields`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::builder::replacements::{extra_keys, Replacement};
use crate::defaults::{DESCRIPTOR_FILE_NAMES, ORIGIN_ANNOTATIONS_OPTION};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::filesystem::Storage;

const EDIT_FIX_HINT: &str = "Run 'kustomize edit fix' to update your Kustomization automatically.";
const EDIT_FIX_HINT_EXPERIMENTAL: &str =
    "[EXPERIMENTAL] Run 'kustomize edit fix' to update your Kustomization automatically.";

/// A label set from the `labels` field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSet {
    #[serde(default)]
    pub pairs: BTreeMap<String, String>,
    /// Also write the labels into selectors.
    #[serde(default, skip_serializing_if = "is_false")]
    pub include_selectors: bool,
    /// Also write the labels into pod templates.
    #[serde(default, skip_serializing_if = "is_false")]
    pub include_templates: bool,
    /// Further fields that receive the labels.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldSpec>,
    #[serde(flatten)]
    pub extra: Mapping,
}

/// A field location on resources of a given type. Unset type parts match any
/// resource; `path` is `/`-separated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub path: String,
    /// Create the field when the resource lacks it.
    #[serde(default, skip_serializing_if = "is_false")]
    pub create: bool,
    #[serde(flatten)]
    pub extra: Mapping,
}

impl FieldSpec {
    pub fn applies_to(&self, document: &Document) -> bool {
        fn field(expected: &Option<String>, actual: &str) -> bool {
            expected.as_deref().map_or(true, |e| e == actual)
        }
        field(&self.group, document.group())
            && field(&self.version, document.version())
            && field(&self.kind, document.kind())
    }

    pub fn segments(&self) -> Vec<&str> {
        self.path.split('/').filter(|s| !s.is_empty()).collect()
    }
}

/// Typed form of an overlay descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
    /// Deprecated alias of `resources`, accumulated after them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_suffix: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub common_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<LabelSet>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub common_annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replacements: Vec<Replacement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub build_metadata: Vec<String>,
    /// Every field without a typed counterpart, preserved as written.
    #[serde(flatten)]
    pub extra: Mapping,
}

/// A descriptor together with where it was found.
#[derive(Debug, Clone)]
pub struct LoadedDescriptor {
    /// Absolute overlay directory.
    pub dir: PathBuf,
    /// Which of the recognized file names was used.
    pub file_name: String,
    /// The file content as read.
    pub content: String,
    pub descriptor: Descriptor,
}

impl LoadedDescriptor {
    /// Absolute path of the descriptor file.
    pub fn file_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    /// The descriptor text with `originAnnotations` appended to
    /// `buildMetadata`. Everything else is carried over from the file as
    /// parsed YAML, including fields no typed struct models.
    pub fn with_origin_tracking(&self) -> Result<String> {
        add_origin_tracking(&self.content)
    }
}

/// Append `originAnnotations` to the `buildMetadata` of descriptor text.
pub fn add_origin_tracking(content: &str) -> Result<String> {
    let mut root = if content.trim().is_empty() {
        Mapping::new()
    } else {
        match serde_yaml::from_str::<Value>(content)? {
            Value::Mapping(map) => map,
            Value::Null => Mapping::new(),
            _ => {
                return Err(Error::Build {
                    message: "kustomization must be a mapping".to_string(),
                })
            }
        }
    };

    let option = Value::from(ORIGIN_ANNOTATIONS_OPTION);
    let metadata = root
        .entry(Value::from("buildMetadata"))
        .or_insert(Value::Null);
    if metadata.is_null() {
        *metadata = Value::Sequence(Vec::new());
    }
    match metadata {
        Value::Sequence(entries) => {
            if !entries.contains(&option) {
                entries.push(option);
            }
        }
        _ => {
            return Err(Error::Build {
                message: "buildMetadata must be a list".to_string(),
            })
        }
    }

    serde_yaml::to_string(&root).map_err(|e| Error::SerializationFailed {
        what: "kustomization".to_string(),
        message: e.to_string(),
    })
}

impl Descriptor {
    /// Parse descriptor text. An empty document is an empty descriptor.
    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let descriptor: Self = serde_yaml::from_str(content)?;
        if let Some(kind) = descriptor.kind.as_deref() {
            if kind != "Kustomization" {
                return Err(Error::Build {
                    message: format!("unsupported descriptor kind {:?}", kind),
                });
            }
        }
        Ok(descriptor)
    }

    /// All resource entries in accumulation order.
    pub fn all_resources(&self) -> impl Iterator<Item = &str> {
        self.resources
            .iter()
            .chain(self.bases.iter())
            .map(String::as_str)
    }

    /// Warnings for deprecated fields in use, in a fixed order.
    pub fn deprecated_warnings(&self) -> Vec<String> {
        let checks: [(&str, bool, &str, &str); 6] = [
            ("bases", !self.bases.is_empty(), "resources", EDIT_FIX_HINT),
            ("imageTags", self.has_extra("imageTags"), "images", EDIT_FIX_HINT),
            ("commonLabels", !self.common_labels.is_empty(), "labels", EDIT_FIX_HINT),
            ("patchesJson6902", self.has_extra("patchesJson6902"), "patches", EDIT_FIX_HINT),
            (
                "patchesStrategicMerge",
                self.has_extra("patchesStrategicMerge"),
                "patches",
                EDIT_FIX_HINT_EXPERIMENTAL,
            ),
            ("vars", self.has_extra("vars"), "replacements", EDIT_FIX_HINT_EXPERIMENTAL),
        ];

        checks
            .iter()
            .filter(|(_, present, _, _)| *present)
            .map(|(field, _, replacement, hint)| {
                format!(
                    "# Warning: '{}' is deprecated. Please use '{}' instead. {}",
                    field, replacement, hint
                )
            })
            .collect()
    }

    /// Names of fields the reference builder does not act on. Nested fields
    /// are named by their path, e.g. `labels[0].owner`.
    pub fn unsupported_fields(&self) -> Vec<String> {
        let mut fields = extra_keys("", &self.extra);
        for (i, set) in self.labels.iter().enumerate() {
            fields.extend(extra_keys(&format!("labels[{}]", i), &set.extra));
            for (j, spec) in set.fields.iter().enumerate() {
                fields.extend(extra_keys(&format!("labels[{}].fields[{}]", i, j), &spec.extra));
            }
        }
        for (i, replacement) in self.replacements.iter().enumerate() {
            fields.extend(replacement.unsupported_fields(&format!("replacements[{}]", i)));
        }
        fields
    }

    /// True when `buildMetadata` already asks for origin annotations.
    pub fn requests_origin(&self) -> bool {
        self.build_metadata
            .iter()
            .any(|entry| entry == ORIGIN_ANNOTATIONS_OPTION)
    }

    fn has_extra(&self, key: &str) -> bool {
        self.extra.contains_key(key)
    }
}

/// Locate and parse the descriptor of the overlay at `path`.
///
/// `path` is resolved through `fs` first. A path naming a file fails with
/// [`Error::PathMustBeDirectory`]; other failures are reported as
/// [`Error::DescriptorLoad`].
pub fn load(fs: &dyn Storage, path: &Path) -> Result<LoadedDescriptor> {
    let resolved = fs
        .resolve_dir_and_name(path)
        .map_err(|e| Error::DescriptorLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    if resolved.file.is_some() {
        return Err(Error::PathMustBeDirectory {
            path: path.to_path_buf(),
        });
    }
    load_from_dir(fs, &resolved.dir).map_err(|e| match e {
        Error::DescriptorLoad { .. } => e,
        other => Error::DescriptorLoad {
            path: path.to_path_buf(),
            message: other.to_string(),
        },
    })
}

/// Parse the descriptor inside an already resolved directory.
pub fn load_from_dir(fs: &dyn Storage, dir: &Path) -> Result<LoadedDescriptor> {
    let found: Vec<&str> = DESCRIPTOR_FILE_NAMES
        .iter()
        .copied()
        .filter(|name| {
            let candidate = dir.join(name);
            fs.exists(&candidate) && !fs.is_dir(&candidate)
        })
        .collect();

    let file_name = match found.as_slice() {
        [] => {
            return Err(Error::DescriptorLoad {
                path: dir.to_path_buf(),
                message: format!(
                    "unable to find one of {} in directory",
                    DESCRIPTOR_FILE_NAMES
                        .iter()
                        .map(|n| format!("'{}'", n))
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            })
        }
        [single] => *single,
        many => {
            return Err(Error::DescriptorLoad {
                path: dir.to_path_buf(),
                message: format!(
                    "found multiple kustomization files: {}",
                    many.join(", ")
                ),
            })
        }
    };

    let bytes = fs.read_file(&dir.join(file_name))?;
    let content = String::from_utf8_lossy(&bytes);
    let descriptor = Descriptor::parse(&content).map_err(|e| Error::DescriptorLoad {
        path: dir.join(file_name),
        message: e.to_string(),
    })?;

    Ok(LoadedDescriptor {
        dir: dir.to_path_buf(),
        file_name: file_name.to_string(),
        content: content.into_owned(),
        descriptor,
    })
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::MemoryFs;

    #[test]
    fn test_parse_typed_fields() {
        let descriptor = Descriptor::parse(
            r#"
apiVersion: kustomize.config.k8s.io/v1beta1
kind: Kustomization
namespace: prod
namePrefix: app-
resources:
  - deployment.yaml
commonAnnotations:
  team: platform
"#,
        )
        .unwrap();
        assert_eq!(descriptor.namespace.as_deref(), Some("prod"));
        assert_eq!(descriptor.name_prefix.as_deref(), Some("app-"));
        assert_eq!(descriptor.resources, vec!["deployment.yaml"]);
        assert_eq!(descriptor.common_annotations["team"], "platform");
        assert!(descriptor.extra.is_empty());
    }

    #[test]
    fn test_empty_descriptor() {
        assert_eq!(Descriptor::parse("  \n").unwrap(), Descriptor::default());
    }

    #[test]
    fn test_rejects_other_kinds() {
        let err = Descriptor::parse("kind: Component\n").unwrap_err();
        assert!(err.to_string().contains("Component"));
    }

    #[test]
    fn test_unknown_fields_are_named() {
        let descriptor = Descriptor::parse(
            "resources:\n  - a.yaml\nimages:\n  - name: nginx\n    newTag: '1.25'\nlabels:\n  - pairs: {app: web}\n    owner: team\n",
        )
        .unwrap();
        assert_eq!(descriptor.unsupported_fields(), vec!["images", "labels[0].owner"]);
    }

    #[test]
    fn test_origin_rewrite_preserves_every_field() {
        let content = r#"
resources:
  - deployment.yaml
labels:
  - pairs:
      app: web
    fields:
      - kind: Deployment
        path: spec/template/metadata/labels
        create: true
replacements:
  - path: replacement.yaml
  - source:
      kind: ConfigMap
      fieldPath: data.token
      options:
        encoding: base64
    targets:
      - select:
          kind: Deployment
          labelSelector: tier=web
          annotationSelector: scale=manual
        fieldPaths: [spec.replicas]
images:
  - name: nginx
    newTag: '1.25'
buildMetadata: [managedByLabel]
"#;
        let rewritten = add_origin_tracking(content).unwrap();

        let mut expected: Value = serde_yaml::from_str(content).unwrap();
        if let Some(Value::Sequence(entries)) = expected.get_mut("buildMetadata") {
            entries.push(Value::from("originAnnotations"));
        }
        let actual: Value = serde_yaml::from_str(&rewritten).unwrap();
        assert_eq!(actual, expected);

        let descriptor = Descriptor::parse(&rewritten).unwrap();
        assert!(descriptor.requests_origin());
        assert_eq!(descriptor.replacements[0].path.as_deref(), Some("replacement.yaml"));
        assert_eq!(descriptor.labels[0].fields[0].path, "spec/template/metadata/labels");
    }

    #[test]
    fn test_origin_rewrite_of_empty_and_tracked_descriptors() {
        let empty = Descriptor::parse(&add_origin_tracking("").unwrap()).unwrap();
        assert_eq!(empty.build_metadata, vec!["originAnnotations"]);

        let tracked = "buildMetadata: [originAnnotations]\n";
        let once = add_origin_tracking(tracked).unwrap();
        assert_eq!(
            Descriptor::parse(&once).unwrap().build_metadata,
            vec!["originAnnotations"]
        );

        assert!(add_origin_tracking("buildMetadata: originAnnotations\n").is_err());
        assert!(add_origin_tracking("- a\n- b\n").is_err());
    }

    #[test]
    fn test_deprecated_warnings() {
        let descriptor = Descriptor::parse(
            "bases:\n  - ../base\ncommonLabels:\n  app: web\nvars: []\n",
        )
        .unwrap();
        let warnings = descriptor.deprecated_warnings();
        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].starts_with("# Warning: 'bases' is deprecated. Please use 'resources' instead."));
        assert!(warnings[1].contains("'commonLabels'"));
        assert!(warnings[2].contains("'vars'"));
        assert!(warnings[2].contains("[EXPERIMENTAL]"));
    }

    #[test]
    fn test_no_warnings_for_modern_descriptor() {
        let descriptor = Descriptor::parse("resources:\n  - a.yaml\n").unwrap();
        assert!(descriptor.deprecated_warnings().is_empty());
    }

    #[test]
    fn test_resources_then_bases() {
        let descriptor = Descriptor::parse("bases: [b]\nresources: [a]\n").unwrap();
        assert_eq!(descriptor.all_resources().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_load_finds_alternate_name() {
        let fs = MemoryFs::from_files([("/app/kustomization.yml", "namespace: dev\n")]).unwrap();
        let loaded = load(&fs, Path::new("/app")).unwrap();
        assert_eq!(loaded.dir, PathBuf::from("/app"));
        assert_eq!(loaded.file_name, "kustomization.yml");
        assert_eq!(loaded.file_path(), PathBuf::from("/app/kustomization.yml"));
        assert_eq!(loaded.descriptor.namespace.as_deref(), Some("dev"));
        assert_eq!(loaded.content, "namespace: dev\n");
        assert!(loaded
            .with_origin_tracking()
            .unwrap()
            .contains("namespace: dev"));
    }

    #[test]
    fn test_load_file_path_must_be_directory() {
        let fs = MemoryFs::from_files([("/app/kustomization.yaml", "")]).unwrap();
        let err = load(&fs, Path::new("/app/kustomization.yaml")).unwrap_err();
        assert!(err.is_path_must_be_directory());
    }

    #[test]
    fn test_load_missing_descriptor() {
        let fs = MemoryFs::from_files([("/app/deployment.yaml", "kind: Deployment\n")]).unwrap();
        let err = load(&fs, Path::new("/app")).unwrap_err();
        assert!(matches!(err, Error::DescriptorLoad { .. }));
        assert!(err.to_string().contains("unable to find one of"));

        let err = load(&fs, Path::new("/missing")).unwrap_err();
        assert!(matches!(err, Error::DescriptorLoad { .. }));
    }

    #[test]
    fn test_load_rejects_multiple_descriptors() {
        let fs = MemoryFs::from_files([
            ("/app/kustomization.yaml", ""),
            ("/app/Kustomization", ""),
        ])
        .unwrap();
        let err = load(&fs, Path::new("/app")).unwrap_err();
        assert!(err.to_string().contains("multiple kustomization files"));
    }
}
