//! # Structured Documents
//!
//! A [`Document`] is one rendered manifest: a YAML mapping with an identity
//! (`apiVersion`, `kind`, `metadata.namespace`, `metadata.name`) and a mutable
//! annotation map under `metadata.annotations`. The render pipeline only ever
//! adds or removes annotations; every other field is left as the builder
//! produced it.
//!
//! Field paths (`spec.template.spec.containers.0.image`) are dot separated.
//! Numeric segments index into sequences.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::error::{Error, Result};

/// Identity of a document, used for selection and duplicate detection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResId {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for ResId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gvk = if self.group.is_empty() {
            format!("{}.{}", self.kind, self.version)
        } else {
            format!("{}.{}.{}", self.kind, self.version, self.group)
        };
        if self.namespace.is_empty() {
            write!(f, "{}/{}", gvk, self.name)
        } else {
            write!(f, "{}/{}.{}", gvk, self.name, self.namespace)
        }
    }
}

/// One structured output document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    object: Mapping,
}

impl Document {
    /// Wrap a YAML value. The value must be a mapping with a non-empty `kind`.
    pub fn from_value(value: Value) -> Result<Self> {
        let object = match value {
            Value::Mapping(object) => object,
            other => {
                return Err(Error::Build {
                    message: format!("expected a mapping, got {}", kind_of(&other)),
                })
            }
        };
        let document = Self { object };
        if document.kind().is_empty() {
            return Err(Error::Build {
                message: "missing kind in resource".to_string(),
            });
        }
        Ok(document)
    }

    /// Parse a single YAML document.
    pub fn from_yaml(text: &str) -> Result<Self> {
        Self::from_value(serde_yaml::from_str(text)?)
    }

    /// Serialize back to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.object)?)
    }

    /// Borrow the underlying mapping.
    pub fn as_mapping(&self) -> &Mapping {
        &self.object
    }

    pub fn into_value(self) -> Value {
        Value::Mapping(self.object)
    }

    pub fn api_version(&self) -> &str {
        self.str_field(&["apiVersion"])
    }

    pub fn kind(&self) -> &str {
        self.str_field(&["kind"])
    }

    pub fn name(&self) -> &str {
        self.str_field(&["metadata", "name"])
    }

    pub fn namespace(&self) -> &str {
        self.str_field(&["metadata", "namespace"])
    }

    /// API group, the part of `apiVersion` before the slash (empty for core).
    pub fn group(&self) -> &str {
        match self.api_version().split_once('/') {
            Some((group, _)) => group,
            None => "",
        }
    }

    /// API version without the group.
    pub fn version(&self) -> &str {
        match self.api_version().split_once('/') {
            Some((_, version)) => version,
            None => self.api_version(),
        }
    }

    pub fn id(&self) -> ResId {
        ResId {
            group: self.group().to_string(),
            version: self.version().to_string(),
            kind: self.kind().to_string(),
            namespace: self.namespace().to_string(),
            name: self.name().to_string(),
        }
    }

    pub fn set_name(&mut self, name: &str) {
        self.metadata_mut()
            .insert(Value::from("name"), Value::from(name));
    }

    pub fn set_namespace(&mut self, namespace: &str) {
        self.metadata_mut()
            .insert(Value::from("namespace"), Value::from(namespace));
    }

    /// Copy of the annotation map. Non-string values are skipped.
    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.string_map("annotations")
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.object
            .get("metadata")?
            .get("annotations")?
            .get(key)?
            .as_str()
    }

    pub fn set_annotation(&mut self, key: &str, value: &str) {
        self.nested_map_mut("annotations")
            .insert(Value::from(key), Value::from(value));
    }

    /// Remove an annotation, dropping the annotation map once it is empty.
    pub fn remove_annotation(&mut self, key: &str) -> Option<String> {
        self.remove_from_nested("annotations", key)
    }

    /// Copy of the label map. Non-string values are skipped.
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.string_map("labels")
    }

    pub fn set_label(&mut self, key: &str, value: &str) {
        self.nested_map_mut("labels")
            .insert(Value::from(key), Value::from(value));
    }

    /// Look up a dot-separated field path.
    pub fn get_path(&self, field_path: &str) -> Option<&Value> {
        let mut current = self.object.get(first_segment(field_path)?)?;
        for segment in field_path.split('.').skip(1) {
            current = match current {
                Value::Mapping(map) => map.get(segment)?,
                Value::Sequence(seq) => seq.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Set a dot-separated field path. Missing mappings along the way are
    /// created only when `create` is true; sequence elements are never created.
    pub fn set_path(&mut self, field_path: &str, value: Value, create: bool) -> Result<()> {
        let segments: Vec<&str> = field_path.split('.').filter(|s| !s.is_empty()).collect();
        self.set_at(&segments, value, create)
    }

    /// Like [`Document::set_path`] with the segments already split, for keys
    /// that contain dots themselves.
    pub fn set_at(&mut self, segments: &[&str], value: Value, create: bool) -> Result<()> {
        if segments.is_empty() {
            return Err(Error::Build {
                message: "empty field path".to_string(),
            });
        }
        let field_path = segments.join(".");
        set_in_mapping(&mut self.object, segments, value, create, &field_path)
    }

    fn str_field(&self, keys: &[&str]) -> &str {
        let mut current = match self.object.get(keys[0]) {
            Some(value) => value,
            None => return "",
        };
        for key in &keys[1..] {
            current = match current.get(*key) {
                Some(value) => value,
                None => return "",
            };
        }
        current.as_str().unwrap_or("")
    }

    fn metadata_mut(&mut self) -> &mut Mapping {
        as_mapping_entry(
            self.object
                .entry(Value::from("metadata"))
                .or_insert_with(|| Value::Mapping(Mapping::new())),
        )
    }

    fn nested_map_mut(&mut self, key: &str) -> &mut Mapping {
        as_mapping_entry(
            self.metadata_mut()
                .entry(Value::from(key))
                .or_insert_with(|| Value::Mapping(Mapping::new())),
        )
    }

    fn remove_from_nested(&mut self, key: &str, entry: &str) -> Option<String> {
        let metadata = match self.object.get_mut("metadata") {
            Some(Value::Mapping(metadata)) => metadata,
            _ => return None,
        };
        let map = match metadata.get_mut(key) {
            Some(Value::Mapping(map)) => map,
            _ => return None,
        };
        let removed = map.remove(entry);
        if map.is_empty() {
            metadata.remove(key);
        }
        removed.and_then(|v| v.as_str().map(str::to_string))
    }

    fn string_map(&self, key: &str) -> BTreeMap<String, String> {
        self.object
            .get("metadata")
            .and_then(|m| m.get(key))
            .and_then(Value::as_mapping)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v.as_str()?.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn set_in_mapping(
    map: &mut Mapping,
    segments: &[&str],
    value: Value,
    create: bool,
    field_path: &str,
) -> Result<()> {
    let Some((head, rest)) = segments.split_first() else {
        return Ok(());
    };
    if !map.contains_key(*head) {
        if !create {
            return Err(missing_field(field_path));
        }
        if rest.is_empty() {
            map.insert(Value::from(*head), value);
            return Ok(());
        }
        map.insert(Value::from(*head), Value::Mapping(Mapping::new()));
    }
    if rest.is_empty() {
        map.insert(Value::from(*head), value);
        return Ok(());
    }
    match map.get_mut(*head) {
        Some(child) => set_in_value(child, rest, value, create, field_path),
        None => Err(missing_field(field_path)),
    }
}

fn set_in_value(
    node: &mut Value,
    segments: &[&str],
    value: Value,
    create: bool,
    field_path: &str,
) -> Result<()> {
    match node {
        Value::Mapping(map) => set_in_mapping(map, segments, value, create, field_path),
        Value::Sequence(seq) => {
            let Some((head, rest)) = segments.split_first() else {
                return Ok(());
            };
            let slot = head
                .parse::<usize>()
                .ok()
                .and_then(|index| seq.get_mut(index))
                .ok_or_else(|| missing_field(field_path))?;
            if rest.is_empty() {
                *slot = value;
                Ok(())
            } else {
                set_in_value(slot, rest, value, create, field_path)
            }
        }
        _ => Err(Error::Build {
            message: format!("field {:?} passes through a scalar value", field_path),
        }),
    }
}

fn missing_field(field_path: &str) -> Error {
    Error::Build {
        message: format!("unable to find field {:?} in resource", field_path),
    }
}

/// Replace a non-mapping value with an empty mapping and borrow it.
fn as_mapping_entry(value: &mut Value) -> &mut Mapping {
    if !value.is_mapping() {
        *value = Value::Mapping(Mapping::new());
    }
    match value {
        Value::Mapping(map) => map,
        _ => unreachable!("value was just replaced with a mapping"),
    }
}

fn first_segment(field_path: &str) -> Option<&str> {
    field_path.split('.').next().filter(|s| !s.is_empty())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
