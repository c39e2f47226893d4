//! # Values Manifest
//!
//! Render values reach an overlay as a generated ConfigMap named `values`,
//! written to `values.yaml` in the overlay root. Overlays list that file in
//! their `resources` and read from it with `replacements`. The manifest is
//! marked as local configuration, so the builder consumes it without
//! emitting it.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::defaults::{LOCAL_CONFIG_ANNOTATION, VALUES_OBJECT_NAME};
use crate::error::{Error, Result};

/// Keys must be usable as ConfigMap data keys.
const KEY_PATTERN: &str = r"^[-._a-zA-Z0-9]+$";
const MAX_KEY_LENGTH: usize = 253;

static KEY_REGEX: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(KEY_PATTERN));

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValuesManifest<'a> {
    api_version: &'static str,
    kind: &'static str,
    metadata: Metadata,
    data: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
struct Metadata {
    name: &'static str,
    annotations: BTreeMap<&'static str, &'static str>,
}

/// Check that every key is a valid ConfigMap data key.
pub fn validate_keys<'a>(keys: impl IntoIterator<Item = &'a String>) -> Result<()> {
    let pattern = KEY_REGEX.as_ref().map_err(|e| Error::Regex(e.clone()))?;
    for key in keys {
        if key.len() > MAX_KEY_LENGTH || !pattern.is_match(key) {
            return Err(Error::InvalidSource {
                message: format!(
                    "invalid values key {:?}: keys must be at most {} characters of alphanumerics, '-', '_' or '.'",
                    key, MAX_KEY_LENGTH
                ),
            });
        }
    }
    Ok(())
}

/// Render `values` as the YAML text of the values manifest.
pub fn manifest(values: &BTreeMap<String, String>) -> Result<String> {
    validate_keys(values.keys())?;

    let manifest = ValuesManifest {
        api_version: "v1",
        kind: "ConfigMap",
        metadata: Metadata {
            name: VALUES_OBJECT_NAME,
            annotations: BTreeMap::from([(LOCAL_CONFIG_ANNOTATION, "true")]),
        },
        data: values,
    };

    serde_yaml::to_string(&manifest).map_err(|e| Error::SerializationFailed {
        what: "values ConfigMap".to_string(),
        message: e.to_string(),
    })
}
