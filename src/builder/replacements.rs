//! Field replacements between resources
//!
//! A replacement copies one field of a single source resource into fields of
//! every selected target resource. This is how generated values reach the
//! rest of an overlay without templating.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use super::ResourceMap;
use crate::document::Document;
use crate::error::{Error, Result};

const DEFAULT_SOURCE_FIELD: &str = "metadata.name";

/// Matches resources by identity and metadata. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Kubernetes label selector, e.g. `tier=web,env in (prod,staging)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<String>,
    /// Same syntax as `label_selector`, matched against annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation_selector: Option<String>,
}

impl Selector {
    pub fn matches(&self, document: &Document) -> Result<bool> {
        fn field(expected: &Option<String>, actual: &str) -> bool {
            expected.as_deref().map_or(true, |e| e == actual)
        }
        let identity = field(&self.group, document.group())
            && field(&self.version, document.version())
            && field(&self.kind, document.kind())
            && field(&self.name, document.name())
            && field(&self.namespace, document.namespace());
        if !identity {
            return Ok(false);
        }
        if let Some(selector) = self.label_selector.as_deref() {
            if !selector_matches(selector, &document.labels())? {
                return Ok(false);
            }
        }
        if let Some(selector) = self.annotation_selector.as_deref() {
            if !selector_matches(selector, &document.annotations())? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn describe(&self) -> String {
        let parts: Vec<String> = [
            ("group", &self.group),
            ("version", &self.version),
            ("kind", &self.kind),
            ("name", &self.name),
            ("namespace", &self.namespace),
            ("labelSelector", &self.label_selector),
            ("annotationSelector", &self.annotation_selector),
        ]
        .iter()
        .filter_map(|(label, value)| value.as_ref().map(|v| format!("{}={}", label, v)))
        .collect();
        format!("[{}]", parts.join(", "))
    }
}

/// One term of a label selector.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    In(String, Vec<String>),
    NotIn(String, Vec<String>),
    Exists(String),
    DoesNotExist(String),
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Requirement::Equals(key, value) => labels.get(key) == Some(value),
            Requirement::NotEquals(key, value) => labels.get(key) != Some(value),
            Requirement::In(key, values) => labels.get(key).is_some_and(|v| values.contains(v)),
            Requirement::NotIn(key, values) => !labels.get(key).is_some_and(|v| values.contains(v)),
            Requirement::Exists(key) => labels.contains_key(key),
            Requirement::DoesNotExist(key) => !labels.contains_key(key),
        }
    }
}

fn selector_matches(selector: &str, labels: &BTreeMap<String, String>) -> Result<bool> {
    let requirements = parse_selector(selector)?;
    Ok(requirements.iter().all(|r| r.matches(labels)))
}

/// Parse the equality- and set-based selector syntax. An empty selector
/// matches everything.
fn parse_selector(selector: &str) -> Result<Vec<Requirement>> {
    let invalid = |term: &str| Error::Build {
        message: format!("invalid selector {:?}: cannot parse {:?}", selector, term),
    };

    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in selector.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1).ok_or_else(|| invalid(selector))?,
            ',' if depth == 0 => {
                terms.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if depth != 0 {
        return Err(invalid(selector));
    }
    terms.push(current);

    let mut requirements = Vec::new();
    for term in terms.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        let requirement = if let Some(key) = term.strip_prefix('!') {
            Requirement::DoesNotExist(key.trim().to_string())
        } else if let Some((key, value)) = term.split_once("!=") {
            Requirement::NotEquals(key.trim().to_string(), value.trim().to_string())
        } else if let Some((key, value)) = term.split_once("==") {
            Requirement::Equals(key.trim().to_string(), value.trim().to_string())
        } else if let Some((key, value)) = term.split_once('=') {
            Requirement::Equals(key.trim().to_string(), value.trim().to_string())
        } else if let Some(open) = term.find('(') {
            let (head, list) = term.split_at(open);
            let values: Vec<String> = list
                .trim_start_matches('(')
                .strip_suffix(')')
                .ok_or_else(|| invalid(term))?
                .split(',')
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect();
            let mut words = head.split_whitespace();
            match (words.next(), words.next(), words.next()) {
                (Some(key), Some("in"), None) => Requirement::In(key.to_string(), values),
                (Some(key), Some("notin"), None) => Requirement::NotIn(key.to_string(), values),
                _ => return Err(invalid(term)),
            }
        } else if term.split_whitespace().count() == 1 {
            Requirement::Exists(term.to_string())
        } else {
            return Err(invalid(term));
        };
        requirements.push(requirement);
    }
    Ok(requirements)
}

/// Splitting and creation behavior for a source or target field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldOptions {
    /// Treat the field as `delimiter`-separated parts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    /// Which part to read or replace when `delimiter` is set.
    #[serde(default)]
    pub index: usize,
    /// Accepted and ignored, as upstream kustomize does.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    /// Create missing target fields instead of failing.
    #[serde(default)]
    pub create: bool,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacementSource {
    #[serde(flatten)]
    pub selector: Selector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<FieldOptions>,
    #[serde(flatten)]
    pub extra: Mapping,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacementTarget {
    pub select: Selector,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reject: Vec<Selector>,
    #[serde(default)]
    pub field_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<FieldOptions>,
    #[serde(flatten)]
    pub extra: Mapping,
}

/// One entry of the `replacements` field: either inline, or a `path` to a
/// file holding one replacement or a list of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Replacement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ReplacementSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<ReplacementTarget>,
    #[serde(flatten)]
    pub extra: Mapping,
}

impl Replacement {
    /// Dotted names of fields nothing acts on, prefixed with `prefix`.
    pub fn unsupported_fields(&self, prefix: &str) -> Vec<String> {
        let mut fields = extra_keys(prefix, &self.extra);
        if let Some(source) = &self.source {
            let source_prefix = format!("{}.source", prefix);
            fields.extend(extra_keys(&source_prefix, &source.extra));
            if let Some(options) = &source.options {
                fields.extend(options_fields(&format!("{}.options", source_prefix), options));
            }
        }
        for (i, target) in self.targets.iter().enumerate() {
            let target_prefix = format!("{}.targets[{}]", prefix, i);
            fields.extend(extra_keys(&target_prefix, &target.extra));
            if let Some(options) = &target.options {
                fields.extend(options_fields(&format!("{}.options", target_prefix), options));
            }
        }
        fields
    }
}

fn options_fields(prefix: &str, options: &FieldOptions) -> Vec<String> {
    let mut fields = Vec::new();
    if options.encoding.is_some() {
        fields.push(format!("{}.encoding", prefix));
    }
    fields.extend(extra_keys(prefix, &options.extra));
    fields
}

/// `prefix.key` for every key of `extra`.
pub(crate) fn extra_keys(prefix: &str, extra: &Mapping) -> Vec<String> {
    extra
        .keys()
        .map(|key| {
            let name = match key.as_str() {
                Some(name) => name.to_string(),
                None => format!("{:?}", key),
            };
            if prefix.is_empty() {
                name
            } else {
                format!("{}.{}", prefix, name)
            }
        })
        .collect()
}

/// Parse a replacement file: a single replacement or a list of them.
pub fn parse_file(content: &str) -> Result<Vec<Replacement>> {
    let value: Value = serde_yaml::from_str(content)?;
    let replacements: Vec<Replacement> = match value {
        Value::Null => Vec::new(),
        Value::Sequence(_) => serde_yaml::from_value(value)?,
        other => vec![serde_yaml::from_value(other)?],
    };
    if replacements.iter().any(|r| r.path.is_some()) {
        return Err(Error::Build {
            message: "replacement files cannot reference other replacement files".to_string(),
        });
    }
    Ok(replacements)
}

/// Apply `replacements` in order. Later replacements see earlier results.
///
/// Entries must already be inline; `path` entries are expanded by the caller.
pub fn apply(replacements: &[Replacement], resources: &mut ResourceMap) -> Result<()> {
    for replacement in replacements {
        let source = match (&replacement.path, &replacement.source) {
            (None, Some(source)) => source,
            (Some(path), _) => {
                return Err(Error::Build {
                    message: format!("replacement file {} was not loaded", path),
                })
            }
            (None, None) => {
                return Err(Error::Build {
                    message: "replacement needs a source".to_string(),
                })
            }
        };
        let value = source_value(source, resources)?;
        for target in &replacement.targets {
            apply_target(target, &value, resources)?;
        }
    }
    Ok(())
}

fn source_value(source: &ReplacementSource, resources: &ResourceMap) -> Result<Value> {
    let mut matches: Vec<&Document> = Vec::new();
    for document in resources.iter().map(|r| &r.document) {
        if source.selector.matches(document)? {
            matches.push(document);
        }
    }

    let document = match matches.as_slice() {
        [single] => *single,
        [] => {
            return Err(Error::Build {
                message: format!(
                    "nothing selected by replacement source {}",
                    source.selector.describe()
                ),
            })
        }
        many => {
            return Err(Error::Build {
                message: format!(
                    "multiple matches for replacement source {}: {}",
                    source.selector.describe(),
                    many.iter()
                        .map(|d| d.id().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            })
        }
    };

    let field_path = source.field_path.as_deref().unwrap_or(DEFAULT_SOURCE_FIELD);
    let value = document.get_path(field_path).cloned().ok_or_else(|| Error::Build {
        message: format!("fieldPath `{}` is missing for replacement source {}", field_path, document.id()),
    })?;

    match source.options.as_ref().and_then(|o| o.delimiter.as_deref().map(|d| (d, o.index))) {
        Some((delimiter, index)) => {
            let text = scalar_text(&value, field_path)?;
            let part = text.split(delimiter).nth(index).ok_or_else(|| Error::Build {
                message: format!(
                    "options.index {} is out of bounds for value {:?} of {}",
                    index, text, field_path
                ),
            })?;
            Ok(Value::from(part))
        }
        None => Ok(value),
    }
}

fn apply_target(target: &ReplacementTarget, value: &Value, resources: &mut ResourceMap) -> Result<()> {
    let options = target.options.clone().unwrap_or_default();
    for resource in resources.iter_mut() {
        let document = &mut resource.document;
        if !target.select.matches(document)? || is_rejected(target, document)? {
            continue;
        }
        for field_path in &target.field_paths {
            let new_value = match options.delimiter.as_deref() {
                Some(delimiter) => splice(document, field_path, delimiter, options.index, value)?,
                None => value.clone(),
            };
            document
                .set_path(field_path, new_value, options.create)
                .map_err(|e| Error::Build {
                    message: format!("replacement target {}: {}", document_label(document), e),
                })?;
        }
    }
    Ok(())
}

fn is_rejected(target: &ReplacementTarget, document: &Document) -> Result<bool> {
    for reject in &target.reject {
        if reject.matches(document)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Replace one delimited part of the current target value.
fn splice(document: &Document, field_path: &str, delimiter: &str, index: usize, value: &Value) -> Result<Value> {
    let replacement = scalar_text(value, field_path)?;
    let current = match document.get_path(field_path) {
        Some(existing) => scalar_text(existing, field_path)?,
        None => return Ok(Value::from(replacement)),
    };
    let mut parts: Vec<String> = current.split(delimiter).map(str::to_string).collect();
    if index >= parts.len() {
        parts.resize(index + 1, String::new());
    }
    parts[index] = replacement;
    Ok(Value::from(parts.join(delimiter)))
}

fn scalar_text(value: &Value, field_path: &str) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(Error::Build {
            message: format!("delimiter option can only be used with scalar values, {} is not", field_path),
        }),
    }
}

fn document_label(document: &Document) -> String {
    document.id().to_string()
}
